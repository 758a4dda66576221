//! Output targets and the options that configure them.

use std::ops::Deref;

/// What a [`RenderContext`] draws into.
///
/// [`RenderContext`]: crate::render_ctx::RenderContext
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TargetKind {
    Image(cairo::Format),
    Pdf,
    Ps,
    /// A surface that was handed in by the caller.
    External { is_vector: bool },
}

impl TargetKind {
    /// Whether the target records drawing operations instead of pixels.
    pub fn is_vector(&self) -> bool {
        match *self {
            TargetKind::Image(_) => false,
            TargetKind::Pdf | TargetKind::Ps => true,
            TargetKind::External { is_vector } => is_vector,
        }
    }
}

/// Options that are shared by a render context and all of its sub-contexts.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderOptions {
    pub dpi: f64,
    /// Resolution for content that has to be rasterized on vector targets.
    pub bitmap_resolution: f64,
    pub pdf_version: cairo::PdfVersion,
    pub ps_level: cairo::PsLevel,
    pub eps: bool,
    /// Draw text as paths instead of using fonts.
    pub text_to_path: bool,
    /// Leave text out of PDF pages, for LaTeX to typeset it.
    pub omit_text: bool,
    pub filter_to_bitmap: bool,
}

impl Default for RenderOptions {
    fn default() -> RenderOptions {
        RenderOptions {
            dpi: 72.0,
            bitmap_resolution: 72.0,
            pdf_version: cairo::PdfVersion::_1_5,
            ps_level: cairo::PsLevel::_3,
            eps: false,
            text_to_path: false,
            omit_text: false,
            filter_to_bitmap: false,
        }
    }
}

/// Size of one CSS pixel in PostScript points.
pub const PT_PER_PX: f64 = 0.75;

/// The surface that a top-level context owns.
#[derive(Debug)]
pub enum Surface {
    Image(cairo::ImageSurface),
    Pdf(cairo::PdfSurface),
    Ps(cairo::PsSurface),
    External(cairo::Surface),
}

impl Deref for Surface {
    type Target = cairo::Surface;

    fn deref(&self) -> &cairo::Surface {
        match self {
            Self::Image(surface) => surface,
            Self::Pdf(surface) => surface,
            Self::Ps(surface) => surface,
            Self::External(surface) => surface,
        }
    }
}

impl AsRef<cairo::Surface> for Surface {
    fn as_ref(&self) -> &cairo::Surface {
        self
    }
}

/// Converts a surface size to whole pixels, rounding up so that partially covered
/// pixels are kept.
pub fn checked_i32(x: f64) -> Result<i32, cairo::Error> {
    cast::i32(x.ceil()).map_err(|_| cairo::Error::InvalidSize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_targets() {
        assert!(TargetKind::Pdf.is_vector());
        assert!(TargetKind::Ps.is_vector());
        assert!(!TargetKind::Image(cairo::Format::ARgb32).is_vector());
        assert!(TargetKind::External { is_vector: true }.is_vector());
    }

    #[test]
    fn sizes_round_up() {
        assert_eq!(checked_i32(10.2), Ok(11));
        assert_eq!(checked_i32(10.0), Ok(10));
        assert_eq!(checked_i32(1e20), Err(cairo::Error::InvalidSize));
    }
}
