//! Pixel access for Cairo image surfaces.

use std::slice;

use crate::compositing::luminance_to_alpha;
use crate::error::RenderingError;

// These two are for Cairo's platform-endian 0xaarrggbb pixels

#[cfg(target_endian = "little")]
use rgb::alt::BGRA8;
#[cfg(target_endian = "little")]
#[allow(clippy::upper_case_acronyms)]
pub type CairoARGB = BGRA8;

#[cfg(target_endian = "big")]
use rgb::alt::ARGB8;
#[cfg(target_endian = "big")]
#[allow(clippy::upper_case_acronyms)]
pub type CairoARGB = ARGB8;

/// A pixel consisting of R, G, B and A values.
pub type Pixel = rgb::RGBA8;

/// Analogous to `rgb::FromSlice`, to convert from `[u32]` to `[CairoARGB]`
#[allow(clippy::upper_case_acronyms)]
pub trait AsCairoARGB {
    /// Reinterpret slice as `CairoARGB` pixels.
    fn as_cairo_argb(&self) -> &[CairoARGB];

    /// Reinterpret mutable slice as `CairoARGB` pixels.
    fn as_cairo_argb_mut(&mut self) -> &mut [CairoARGB];
}

// SAFETY: transmuting from u32 to CairoRGB is based on the following assumptions:
//  * there are no invalid bit representations for ARGB
//  * u32 and ARGB are the same size
//  * u32 is sufficiently aligned
impl AsCairoARGB for [u32] {
    fn as_cairo_argb(&self) -> &[CairoARGB] {
        unsafe { slice::from_raw_parts(self.as_ptr() as *const _, self.len()) }
    }

    fn as_cairo_argb_mut(&mut self) -> &mut [CairoARGB] {
        unsafe { slice::from_raw_parts_mut(self.as_mut_ptr() as *mut _, self.len()) }
    }
}

/// Views the bytes of an `ARgb32` surface as whole pixels.
fn as_u32_mut(data: &mut [u8]) -> &mut [u32] {
    // SAFETY: Cairo image data is suitably aligned for any kind of variable, as
    // documented for cairo_image_surface_create_for_data().
    #[allow(clippy::cast_ptr_alignment)]
    unsafe {
        slice::from_raw_parts_mut(data.as_mut_ptr() as *mut u32, data.len() / 4)
    }
}

fn as_u32(data: &[u8]) -> &[u32] {
    // SAFETY: see as_u32_mut()
    #[allow(clippy::cast_ptr_alignment)]
    unsafe {
        slice::from_raw_parts(data.as_ptr() as *const u32, data.len() / 4)
    }
}

pub trait PixelOps {
    fn to_u32(&self) -> u32;
    fn from_u32(x: u32) -> Self;
}

impl PixelOps for Pixel {
    /// Returns the pixel value as a `u32`, in the same format as `cairo::Format::ARgb32`.
    #[inline]
    fn to_u32(&self) -> u32 {
        (u32::from(self.a) << 24)
            | (u32::from(self.r) << 16)
            | (u32::from(self.g) << 8)
            | u32::from(self.b)
    }

    /// Converts a `u32` in the same format as `cairo::Format::ARgb32` into a `Pixel`.
    #[inline]
    fn from_u32(x: u32) -> Self {
        Self {
            r: ((x >> 16) & 0xFF) as u8,
            g: ((x >> 8) & 0xFF) as u8,
            b: (x & 0xFF) as u8,
            a: ((x >> 24) & 0xFF) as u8,
        }
    }
}

impl From<cairo::BorrowError> for RenderingError {
    fn from(e: cairo::BorrowError) -> RenderingError {
        match e {
            cairo::BorrowError::Cairo(e) => RenderingError::Cairo(e),
            cairo::BorrowError::NonExclusive => RenderingError::SharedSurface,
        }
    }
}

/// Replaces every pixel of an `ARgb32` surface with its luminance as alpha.
///
/// This turns a rendered `<mask>` into something that can be passed to
/// `cairo::Context::mask_surface()`.
pub fn luminance_to_alpha_mask(
    surface: &mut cairo::ImageSurface,
    opacity: f64,
) -> Result<(), RenderingError> {
    assert_eq!(surface.format(), cairo::Format::ARgb32);

    surface.flush();

    let stride = surface.stride() as usize / 4;
    let width = surface.width() as usize;
    let height = surface.height() as usize;

    {
        let mut data = surface.data()?;
        let pixels = as_u32_mut(&mut data);

        for row in pixels.chunks_mut(stride).take(height) {
            // mask contents are drawn over opaque black, so there is nothing to
            // unpremultiply
            for p in row[..width].as_cairo_argb_mut() {
                let a = luminance_to_alpha(p.r, p.g, p.b, opacity);
                *p = CairoARGB { r: 0, g: 0, b: 0, a };
            }
        }
    }

    surface.mark_dirty();

    Ok(())
}

/// Reads one pixel of an `ARgb32` surface, premultiplied as Cairo stores it.
pub fn pixel_at(surface: &cairo::ImageSurface, x: i32, y: i32) -> Result<Pixel, RenderingError> {
    assert!(x >= 0 && x < surface.width() && y >= 0 && y < surface.height());

    surface.flush();

    let stride = surface.stride() as usize / 4;
    let mut pixel = Pixel::default();

    surface.with_data(|data| {
        pixel = Pixel::from_u32(as_u32(data)[y as usize * stride + x as usize]);
    })?;

    Ok(pixel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn filled(r: f64, g: f64, b: f64) -> cairo::ImageSurface {
        let surface = cairo::ImageSurface::create(cairo::Format::ARgb32, 3, 2).unwrap();
        {
            let cr = cairo::Context::new(&surface).unwrap();
            cr.set_source_rgb(r, g, b);
            cr.paint().unwrap();
        }
        surface
    }

    #[test]
    fn white_becomes_opaque() {
        let mut surface = filled(1.0, 1.0, 1.0);
        luminance_to_alpha_mask(&mut surface, 1.0).unwrap();

        for y in 0..2 {
            for x in 0..3 {
                assert_eq!(pixel_at(&surface, x, y).unwrap(), Pixel::new(0, 0, 0, 255));
            }
        }
    }

    #[test]
    fn black_becomes_transparent() {
        let mut surface = filled(0.0, 0.0, 0.0);
        luminance_to_alpha_mask(&mut surface, 1.0).unwrap();
        assert_eq!(pixel_at(&surface, 2, 1).unwrap(), Pixel::new(0, 0, 0, 0));
    }

    #[test]
    fn opacity_scales_alpha() {
        let mut surface = filled(1.0, 1.0, 1.0);
        luminance_to_alpha_mask(&mut surface, 0.4).unwrap();
        assert_eq!(pixel_at(&surface, 0, 0).unwrap().a, 102);
    }

    #[test]
    fn shared_data_is_an_error() {
        let mut surface = filled(1.0, 1.0, 1.0);
        let cr = cairo::Context::new(&surface).unwrap();
        assert!(matches!(
            luminance_to_alpha_mask(&mut surface, 1.0),
            Err(RenderingError::SharedSurface)
        ));
        drop(cr);
    }

    proptest! {
        #[test]
        fn u32_conversion_is_lossless(x in any::<u32>()) {
            prop_assert_eq!(Pixel::from_u32(x).to_u32(), x);
        }

        #[test]
        fn mask_alpha_has_no_color(r in 0.0..=1.0f64, g in 0.0..=1.0f64, b in 0.0..=1.0f64) {
            let mut surface = filled(r, g, b);
            luminance_to_alpha_mask(&mut surface, 1.0).unwrap();
            let p = pixel_at(&surface, 1, 1).unwrap();
            prop_assert_eq!((p.r, p.g, p.b), (0, 0, 0));
        }
    }
}
