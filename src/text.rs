//! Text layout with Pango, down to positioned glyphs.
//!
//! The render context draws text one run of glyphs at a time, each run in a
//! single font.  This module turns a text element into those runs.

use glib::Cast;
use pango::prelude::*;
use pangocairo::traits::FontExt as PangoCairoFontExt;

use crate::error::RenderingError;
use crate::rect::Rect;
use crate::transform::Transform;

/// A glyph positioned in the user space of the text element.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Glyph {
    pub index: u32,
    pub x: f64,
    pub y: f64,
}

/// Glyphs that share one font.
#[derive(Debug, Clone)]
pub struct GlyphRun {
    pub font: pango::Font,
    /// Font size and orientation, as Cairo's font matrix.
    pub font_matrix: Transform,
    pub glyphs: Vec<Glyph>,
}

/// Laid-out text.
#[derive(Debug, Clone)]
pub struct TextLayout {
    pub runs: Vec<GlyphRun>,
    /// Logical extents, in user space.
    pub extents: Option<Rect>,
}

fn pango_units(v: i32) -> f64 {
    f64::from(v) / f64::from(pango::SCALE)
}

/// Creates a Pango context whose units are user-space pixels.
pub fn create_pango_context() -> Result<pango::Context, RenderingError> {
    let font_map = pangocairo::FontMap::default()
        .ok_or_else(|| RenderingError::Output(String::from("no Pango font map available")))?;

    let context = font_map
        .create_context()
        .ok_or_else(|| RenderingError::Output(String::from("cannot create Pango context")))?;

    context.set_round_glyph_positions(false);

    let mut options = cairo::FontOptions::new()?;
    options.set_hint_style(cairo::HintStyle::None);
    options.set_hint_metrics(cairo::HintMetrics::Off);
    pangocairo::functions::context_set_font_options(&context, Some(&options));

    // Font sizes in a PangoFontDescription are in points; at 72 dpi they are
    // also pixels, which is what user space measures in.
    pangocairo::functions::context_set_resolution(&context, 72.0);

    Ok(context)
}

/// Lays out `text` with its baseline starting at `(x, y)`.
///
/// Line breaks are treated as spaces; a text element is a single line.
pub fn layout_text(
    context: &pango::Context,
    text: &str,
    font: &str,
    x: f64,
    y: f64,
) -> Result<TextLayout, RenderingError> {
    let layout = pango::Layout::new(context);
    layout.set_font_description(Some(&pango::FontDescription::from_string(font)));
    layout.set_single_paragraph_mode(true);
    layout.set_text(text);

    let line = match layout.line_readonly(0) {
        Some(line) => line,
        None => {
            return Ok(TextLayout {
                runs: Vec::new(),
                extents: None,
            })
        }
    };

    let mut runs = Vec::new();
    let mut pen_x = 0;

    for run in line.runs() {
        let font = run.item().analysis().font();

        let scaled_font = font
            .dynamic_cast_ref::<pangocairo::Font>()
            .and_then(|f| f.scaled_font());

        let font_matrix = match scaled_font {
            Some(ref sf) => Transform::from(sf.font_matrix()),
            None => {
                // only fonts from a Cairo font map can be drawn
                pen_x += run.glyph_string().width();
                continue;
            }
        };

        let mut glyphs = Vec::new();

        for info in run.glyph_string().glyph_info() {
            let geometry = info.geometry();

            glyphs.push(Glyph {
                index: info.glyph(),
                x: x + pango_units(pen_x + geometry.x_offset()),
                y: y + pango_units(geometry.y_offset()),
            });

            pen_x += geometry.width();
        }

        runs.push(GlyphRun {
            font,
            font_matrix,
            glyphs,
        });
    }

    let (_, logical) = layout.extents();
    let baseline = pango_units(layout.baseline());

    let extents = Rect::from_xywh(
        x + pango_units(logical.x()),
        y - baseline + pango_units(logical.y()),
        pango_units(logical.width()),
        pango_units(logical.height()),
    );

    Ok(TextLayout {
        runs,
        extents: if extents.is_empty() {
            None
        } else {
            Some(extents)
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glyphs_advance_along_the_baseline() {
        let context = create_pango_context().unwrap();
        let layout = layout_text(&context, "AAA", "Sans 20", 10.0, 50.0).unwrap();

        let glyphs: Vec<Glyph> = layout
            .runs
            .iter()
            .flat_map(|r| r.glyphs.iter().copied())
            .collect();

        assert_eq!(glyphs.len(), 3);
        assert_eq!(glyphs[0].x, 10.0);
        assert!(glyphs[1].x > glyphs[0].x);
        assert!(glyphs[2].x > glyphs[1].x);
        assert!(glyphs.iter().all(|g| g.y == 50.0));

        let extents = layout.extents.unwrap();
        assert!(extents.y0 < 50.0);
        assert!(extents.y1 > 40.0);
    }

    #[test]
    fn empty_text_has_no_extents() {
        let context = create_pango_context().unwrap();
        let layout = layout_text(&context, "", "Sans 12", 0.0, 0.0).unwrap();
        assert!(layout.runs.iter().all(|r| r.glyphs.is_empty()));
        assert!(layout.extents.is_none());
    }
}
