//! Decisions that the render context makes about layers, tiles and passes.
//!
//! Nothing in here touches Cairo state; the functions only compute what should be
//! done, so that the render context can stay a thin executor and the decisions can be
//! tested on their own.

use crate::document::MAX_HATCH_REPEATS;
use crate::error::RenderingError;
use crate::state::RenderState;
use crate::style::{ComputedStyle, MixBlendMode, PaintOrder, PaintTarget, PathPaintOrder};

/// Whether drawing operations paint, or contribute to a clip.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RenderMode {
    #[default]
    Normal,
    Clip,
}

/// How clip paths are realized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ClipMode {
    /// Clip paths become Cairo clips.  Used on vector targets.
    Path,

    /// Clip paths are rasterized into an alpha mask.
    #[default]
    Mask,
}

/// What a layer needs when it is popped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LayerPlan {
    NoIsolation,
    ClipOnly,
    MaskOnly,
    ClipAndMask,
}

/// One operation of a layer pop, in execution order.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum LayerStep {
    /// Switch the context to [`ClipMode::Path`].
    UsePathClipping,

    /// Rasterize the clip path into an A8 surface, painting with this alpha.
    RenderClipMask { alpha: f64 },

    /// Render the mask contents into an ARGB surface over black.
    RenderMask,

    /// Multiply the rendered mask by the rasterized clip.
    ClipMaskOntoMask,

    /// Turn the rendered mask into an alpha mask, scaled by this opacity.
    ConvertMaskToAlpha { opacity: f64 },

    PopGroupToSource,

    SetOperator(cairo::Operator),

    /// Apply the clip path as a Cairo clip on the current context.
    ClipNative,

    Paint,

    PaintWithAlpha(f64),

    /// Paint the source through the rasterized clip.
    MaskWithClipMask,

    /// Paint the source through the converted mask, in device space.
    MaskWithMaskImage,
}

impl LayerPlan {
    /// Picks the plan from the references recorded in the popped frame.
    ///
    /// While a clip path is being rendered the mask is ignored.
    pub fn new(has_clip: bool, has_mask: bool, render_mode: RenderMode) -> LayerPlan {
        let has_mask = has_mask && render_mode != RenderMode::Clip;

        match (has_clip, has_mask) {
            (false, false) => LayerPlan::NoIsolation,
            (true, false) => LayerPlan::ClipOnly,
            (false, true) => LayerPlan::MaskOnly,
            (true, true) => LayerPlan::ClipAndMask,
        }
    }

    pub fn has_clip(&self) -> bool {
        matches!(self, LayerPlan::ClipOnly | LayerPlan::ClipAndMask)
    }

    pub fn has_mask(&self) -> bool {
        matches!(self, LayerPlan::MaskOnly | LayerPlan::ClipAndMask)
    }

    /// The operations that composite the layer onto its parent.
    ///
    /// `clip_mode` is the context's clip mode before the pop; vector targets switch
    /// it to [`ClipMode::Path`] as soon as a clip is involved.
    pub fn steps(
        &self,
        is_vector: bool,
        clip_mode: ClipMode,
        opacity: f64,
        composite: Option<cairo::Operator>,
    ) -> Vec<LayerStep> {
        let mut steps = Vec::new();
        let mut clip_mode = clip_mode;

        let paint = if opacity == 1.0 {
            LayerStep::Paint
        } else {
            LayerStep::PaintWithAlpha(opacity)
        };

        let push_operator = |steps: &mut Vec<LayerStep>| {
            if let Some(op) = composite {
                steps.push(LayerStep::SetOperator(op));
            }
        };

        if self.has_clip() {
            if is_vector {
                clip_mode = ClipMode::Path;
                steps.push(LayerStep::UsePathClipping);

                if !self.has_mask() {
                    steps.push(LayerStep::PopGroupToSource);
                    steps.push(LayerStep::ClipNative);
                    steps.push(paint);
                }
            } else {
                let alpha = if self.has_mask() { 1.0 } else { opacity };
                steps.push(LayerStep::RenderClipMask { alpha });

                if !self.has_mask() {
                    steps.push(LayerStep::PopGroupToSource);
                    push_operator(&mut steps);
                    steps.push(LayerStep::MaskWithClipMask);
                }
            }
        }

        if self.has_mask() {
            steps.push(LayerStep::RenderMask);

            if self.has_clip() && clip_mode == ClipMode::Mask {
                steps.push(LayerStep::ClipMaskOntoMask);
            }

            steps.push(LayerStep::ConvertMaskToAlpha { opacity });
            steps.push(LayerStep::PopGroupToSource);
            push_operator(&mut steps);

            if self.has_clip() && clip_mode == ClipMode::Path {
                steps.push(LayerStep::ClipNative);
            }

            steps.push(LayerStep::MaskWithMaskImage);
        }

        if *self == LayerPlan::NoIsolation {
            steps.push(LayerStep::PopGroupToSource);
            push_operator(&mut steps);
            steps.push(paint);
        }

        steps
    }
}

/// Luminance of a pixel, in `[0, 1]`, from 8-bit channels.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> f64 {
    f64::from(r) * 0.2125 / 255.0 + f64::from(g) * 0.7154 / 255.0 + f64::from(b) * 0.0721 / 255.0
}

/// Alpha for one mask pixel: its luminance scaled by the object opacity.
#[inline]
pub fn luminance_to_alpha(r: u8, g: u8, b: u8, opacity: f64) -> u8 {
    (255.0 * luminance(r, g, b) * opacity).round().clamp(0.0, 255.0) as u8
}

/// `alpha` with the object opacity multiplied in when the opacity can be merged.
#[inline]
pub fn merged_opacity(merge_opacity: bool, opacity: f64, alpha: f64) -> f64 {
    if merge_opacity {
        alpha * opacity
    } else {
        alpha
    }
}

/// Pattern tiles are rendered at this many device pixels per user unit.
pub const PATTERN_TILE_RESOLUTION: f64 = 100.0;

/// Hatch tiles are rendered at this many device pixels per user unit.
pub const HATCH_TILE_RESOLUTION: f64 = 10.0;

/// Size of the surface for a tile of `size` user units; at least one pixel.
pub fn tile_extent(size: f64, resolution: f64) -> Result<i32, RenderingError> {
    let pixels = (resolution * size - 0.5).ceil().max(1.0);
    cast::i32(pixels).map_err(|_| RenderingError::from(cairo::Error::InvalidSize))
}

/// Pixel size of a pattern tile and whether the tile content must be supersampled.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PatternTile {
    pub width: i32,
    pub height: i32,

    /// When set, the content is drawn at [`PATTERN_TILE_RESOLUTION`] and the pattern
    /// matrix scaled down by the same amount.
    pub supersample: bool,
}

impl PatternTile {
    /// `width` and `height` are the tile size in user units, already scaled to the
    /// bounding box if needed.
    pub fn new(width: f64, height: f64, is_vector: bool) -> Result<PatternTile, RenderingError> {
        let w = tile_extent(width, PATTERN_TILE_RESOLUTION)?;
        let h = tile_extent(height, PATTERN_TILE_RESOLUTION)?;

        let scale_width = f64::from(w) / width;
        let scale_height = f64::from(h) / height;

        Ok(PatternTile {
            width: w,
            height: h,
            supersample: scale_width != 1.0 || scale_height != 1.0 || is_vector,
        })
    }
}

/// How often hatch paths are repeated across the painted area.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct HatchOverflow {
    /// Start of the right-most strip, where drawing begins.
    pub right_strip: f64,

    /// Number of times the paths are drawn, each one pitch further.
    pub steps: u32,
}

impl HatchOverflow {
    /// `min` and `max` bound the x extent of the hatch paths in hatch space.
    ///
    /// With `overflow: visible` the paths spill into the neighboring strips, so they
    /// have to be drawn once per strip that they touch.  Paths spanning more than
    /// [`MAX_HATCH_REPEATS`] strips are an error.
    pub fn new(
        visible: bool,
        min: f64,
        max: f64,
        pitch: f64,
    ) -> Result<HatchOverflow, RenderingError> {
        if !visible || pitch <= 0.0 {
            return Ok(HatchOverflow {
                right_strip: 0.0,
                steps: 1,
            });
        }

        let right_strip = (max / pitch).floor() * pitch;
        let steps = ((right_strip - min) / pitch).ceil() + 1.0;
        let steps = cast::u32(steps).map_or(1, |s| s.max(1));

        if steps as usize > MAX_HATCH_REPEATS {
            return Err(RenderingError::LimitExceeded);
        }

        Ok(HatchOverflow { right_strip, steps })
    }
}

/// Which operations one call of glyph rendering performs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GlyphPasses {
    pub fill: bool,
    pub stroke: bool,

    /// Whether the caller has to call again with the second pass for the fill.
    pub needs_second_pass: bool,
}

impl GlyphPasses {
    /// Plans one pass of glyph rendering.
    ///
    /// When the fill is painted over the stroke, the stroke of every glyph run is
    /// drawn in the first pass and the fills in a second one.  Returns `None` when
    /// there is neither fill nor stroke.
    pub fn new(
        has_fill: bool,
        has_stroke: bool,
        order: &PaintOrder,
        second_pass: bool,
    ) -> Option<GlyphPasses> {
        if !has_fill && !has_stroke {
            return None;
        }

        let stroke_over_fill = order.get_order(PaintTarget::Stroke)
            > order.get_order(PaintTarget::Fill)
            || !has_fill
            || !has_stroke;

        Some(GlyphPasses {
            fill: has_fill && stroke_over_fill != second_pass,
            stroke: has_stroke && !second_pass,
            needs_second_pass: !stroke_over_fill && !second_pass,
        })
    }
}

/// What a path rendering call will draw.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PathPaint {
    pub fill: bool,
    pub stroke: bool,
}

impl PathPaint {
    pub fn new(style: &ComputedStyle, order: PathPaintOrder) -> PathPaint {
        let no_fill = style.fill.is_none()
            || style.fill.is_context()
            || style.fill_opacity == 0.0
            || order == PathPaintOrder::StrokeOnly;

        let no_stroke = style.stroke.is_none()
            || style.stroke.is_context()
            || (style.stroke_width < 1e-9 && !style.hairline)
            || style.stroke_opacity == 0.0
            || order == PathPaintOrder::FillOnly;

        PathPaint {
            fill: !no_fill,
            stroke: !no_stroke,
        }
    }

    pub fn is_empty(&self) -> bool {
        !self.fill && !self.stroke
    }
}

/// Whether a single path needs its own layer.
///
/// This happens when the item's opacity, clip or mask could not be merged into the
/// paint and no enclosing layer takes care of them, or for a non-normal blend mode.
pub fn path_needs_layer(state: &RenderState, blend: MixBlendMode) -> bool {
    let unmerged = !state.merge_opacity
        && !state.need_layer
        && (state.opacity != 1.0 || state.clip_path.is_some() || state.mask.is_some());

    unmerged || blend != MixBlendMode::Normal
}
