//! Cairo patterns for the paint servers: gradients, patterns and hatches.
//!
//! Patterns and hatches render their contents into a tile on a context similar to
//! the one being painted, and repeat that tile.

use itertools::Itertools;

use crate::compositing::{tile_extent, HatchOverflow, PatternTile, HATCH_TILE_RESOLUTION, PATTERN_TILE_RESOLUTION};
use crate::document::{
    AcquireError, CoordUnits, Document, Element, Gradient, GradientStop, GradientVariant, Hatch,
    HatchPath, NodeId, Pattern, MAX_HATCH_REPEATS,
};
use crate::error::RenderingError;
use crate::path::{Path, PathBuilder, PathCommand};
use crate::rect::Rect;
use crate::render_ctx::{ItemRenderer, RenderContext};
use crate::style::Overflow;
use crate::svgpaint_log;
use crate::transform::Transform;

/// Creates the Cairo pattern for `server`, for painting an item with bounding box
/// `bbox` and the given alpha.
///
/// Returns `None` when the server cannot produce a pattern, for example when it
/// references itself through its contents.
pub fn create_pattern(
    ctx: &RenderContext,
    renderer: &dyn ItemRenderer,
    server: NodeId,
    bbox: Option<&Rect>,
    alpha: f64,
) -> Result<Option<cairo::Pattern>, RenderingError> {
    let document = renderer.document();
    let node = document.node(server);

    let _acquired = match renderer.acquired_nodes().acquire_ref(server) {
        Ok(n) => n,

        Err(AcquireError::CircularReference(_)) => {
            svgpaint_log!(ctx.session(), "circular reference in paint server {}", node);
            return Ok(None);
        }

        Err(AcquireError::MaxReferencesExceeded) => return Err(RenderingError::LimitExceeded),
    };

    match node.element {
        Element::Gradient(ref gradient) => Ok(Some(cairo::Pattern::clone(&gradient_pattern(
            gradient,
            document.gradient_stops(server),
            bbox,
            alpha,
        )))),

        Element::Pattern(ref pattern) => pattern_painter(ctx, renderer, server, pattern, bbox),

        Element::Hatch(ref hatch) => hatch_painter(ctx, renderer, server, hatch, bbox),

        _ => Ok(None),
    }
}

fn gradient_pattern(
    gradient: &Gradient,
    stops: &[GradientStop],
    bbox: Option<&Rect>,
    alpha: f64,
) -> cairo::Gradient {
    let bbox2user = match bbox {
        Some(bbox) if gradient.units == CoordUnits::ObjectBoundingBox => {
            Some(Transform::from_bbox(bbox))
        }
        _ => None,
    };

    let (g, pattern_matrix) = match gradient.variant {
        GradientVariant::Linear { x1, y1, x2, y2 } => {
            // bounding box units are applied to the end points
            let ((x1, y1), (x2, y2)) = match bbox2user {
                Some(t) => (t.transform_point(x1, y1), t.transform_point(x2, y2)),
                None => ((x1, y1), (x2, y2)),
            };

            (
                cairo::Gradient::clone(&cairo::LinearGradient::new(x1, y1, x2, y2)),
                gradient.transform,
            )
        }

        GradientVariant::Radial {
            cx,
            cy,
            r,
            fx,
            fy,
            fr,
        } => {
            // and to the whole radial gradient
            let matrix = match bbox2user {
                Some(t) => Transform::multiply(&gradient.transform, &t),
                None => gradient.transform,
            };

            (
                cairo::Gradient::clone(&cairo::RadialGradient::new(fx, fy, fr, cx, cy, r)),
                matrix,
            )
        }
    };

    for stop in stops {
        let color = &stop.color;

        g.add_color_stop_rgba(
            stop.offset,
            f64::from(color.red) / 255.0,
            f64::from(color.green) / 255.0,
            f64::from(color.blue) / 255.0,
            f64::from(color.alpha_f32()) * stop.opacity * alpha,
        );
    }

    g.set_extend(gradient.spread.into());

    if let Some(m) = pattern_matrix.invert() {
        g.set_matrix(m.into());
    }

    g
}

fn pattern_painter(
    ctx: &RenderContext,
    renderer: &dyn ItemRenderer,
    server: NodeId,
    pattern: &Pattern,
    bbox: Option<&Rect>,
) -> Result<Option<cairo::Pattern>, RenderingError> {
    let document = renderer.document();

    let (bbox_width, bbox_height, x, y) = match bbox {
        Some(bbox) if pattern.units == CoordUnits::ObjectBoundingBox => (
            bbox.width(),
            bbox.height(),
            pattern.x * bbox.width() + bbox.x0,
            pattern.y * bbox.height() + bbox.y0,
        ),
        _ => (1.0, 1.0, pattern.x, pattern.y),
    };

    let width = pattern.width * bbox_width;
    let height = pattern.height * bbox_height;

    if !(width > 0.0 && height > 0.0) {
        return Ok(None);
    }

    // pattern space to user space
    let mut ps2user = Transform::multiply(&Transform::new_translate(x, y), &pattern.transform);
    let (ori_x, ori_y) = (ps2user.x0, ps2user.y0);

    // pattern contents to the tile's device space
    let mut pcs2dev = match pattern.view_box {
        Some(vb) if !vb.is_empty() => {
            let sx = width / vb.width();
            let sy = height / vb.height();
            Transform::new_unchecked(sx, 0.0, 0.0, sy, -vb.x0 * sx, -vb.y0 * sy)
        }

        _ => match bbox {
            Some(bbox) if pattern.content_units == CoordUnits::ObjectBoundingBox => {
                Transform::new_scale(bbox.width(), bbox.height())
            }
            _ => Transform::identity(),
        },
    };

    let tile = PatternTile::new(width, height, ctx.is_vector())?;

    if tile.supersample {
        let s = PATTERN_TILE_RESOLUTION;
        pcs2dev = Transform::multiply(&pcs2dev, &Transform::new_scale(s, s));
        ps2user = Transform::multiply(&ps2user, &Transform::new_scale(1.0 / s, 1.0 / s));
    }

    // the tile's origin stays where the pattern puts it
    ps2user = ps2user.with_translation(ori_x, ori_y);

    let mut pattern_ctx = ctx.create_similar(f64::from(tile.width), f64::from(tile.height))?;
    pattern_ctx.set_transform(&pcs2dev);
    pattern_ctx.push_state()?;

    let view_box_is_empty = pattern.view_box.map_or(false, |vb| vb.is_empty());

    if !view_box_is_empty {
        if let Some(content) = document.pattern_content_node(server) {
            for child in document.children(content) {
                renderer.render_item(&mut pattern_ctx, child)?;
            }
        }
    }

    pattern_ctx.pop_state()?;

    let surface_pattern = cairo::SurfacePattern::create(pattern_ctx.surface());
    surface_pattern.set_extend(cairo::Extend::Repeat);

    if let Some(m) = ps2user.invert() {
        surface_pattern.set_matrix(m.into());
    }

    Ok(Some(cairo::Pattern::clone(&surface_pattern)))
}

/// Where and how a hatch tile is drawn.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct HatchRenderInfo {
    /// The tile, in hatch space.
    pub tile_rect: Rect,

    /// Hatch contents to hatch space.
    pub child_transform: Transform,

    /// Hatch space to user space.
    pub pattern_to_user: Transform,

    /// Vertical extent of the painted area in hatch content units; hatch paths are
    /// drawn across all of it.
    pub strip: (f64, f64),
}

fn hatch_to_user(x: f64, y: f64, hatch: &Hatch) -> Transform {
    Transform::new_translate(x, y)
        .post_transform(&Transform::new_rotate(hatch.rotate))
        .post_transform(&hatch.transform)
}

impl HatchRenderInfo {
    /// Computes the tile for painting an item with bounding box `bbox`.
    ///
    /// Without a bounding box of non-zero area the strip is one pitch high.
    pub fn new(hatch: &Hatch, bbox: Option<&Rect>) -> HatchRenderInfo {
        let bbox = bbox.filter(|b| !b.is_empty());

        let strip = bbox
            .and_then(|b| strip_extents(hatch, b))
            .unwrap_or((0.0, hatch.pitch));

        let mut tile_x = hatch.x;
        let mut tile_y = hatch.y;
        let mut tile_width = hatch.pitch;
        let mut tile_height = strip.1 - strip.0;
        let mut tile_render_y = strip.0;
        let mut child_transform = Transform::identity();

        if let Some(bbox) = bbox {
            if hatch.units == CoordUnits::ObjectBoundingBox {
                tile_x *= bbox.width();
                tile_y *= bbox.height();
                tile_width *= bbox.width();
            }

            if hatch.content_units == CoordUnits::ObjectBoundingBox {
                tile_height *= bbox.height();
                tile_render_y *= bbox.height();
                child_transform = Transform::new_scale(bbox.width(), bbox.height());
            }
        }

        HatchRenderInfo {
            tile_rect: Rect::from_xywh(0.0, tile_render_y, tile_width, tile_height),
            child_transform,
            pattern_to_user: hatch_to_user(tile_x, tile_y, hatch),
            strip,
        }
    }
}

/// The vertical extent of `bbox` in hatch space, in content units.
fn strip_extents(hatch: &Hatch, bbox: &Rect) -> Option<(f64, f64)> {
    let user2ps = hatch_to_user(hatch.x, hatch.y, hatch).invert()?;

    let corners = [
        (bbox.x0, bbox.y0),
        (bbox.x1, bbox.y0),
        (bbox.x1, bbox.y1),
        (bbox.x0, bbox.y1),
    ];

    let (min, max) = corners
        .iter()
        .map(|&(x, y)| user2ps.transform_point(x, y).1)
        .minmax()
        .into_option()?;

    if hatch.content_units == CoordUnits::ObjectBoundingBox {
        Some((min / bbox.height(), max / bbox.height()))
    } else {
        Some((min, max))
    }
}

/// The hatch paths among the children of a hatch.
pub fn hatch_paths(document: &Document, hatch: NodeId) -> Vec<NodeId> {
    document
        .children(hatch)
        .filter(|&c| matches!(document.node(c).element, Element::HatchPath(_)))
        .collect()
}

/// Horizontal extent of the hatch paths, including their strokes.
pub fn hatch_bounds(
    document: &Document,
    paths: &[NodeId],
) -> Result<Option<(f64, f64)>, RenderingError> {
    let mut xs = Vec::with_capacity(paths.len() * 2);

    for &id in paths {
        let node = document.node(id);

        if let Element::HatchPath(ref hatch_path) = node.element {
            let (x0, x1) = match hatch_path.d {
                Some(ref d) => d
                    .extents(0.0)?
                    .path_only
                    .map_or((0.0, 0.0), |r| (r.x0, r.x1)),
                None => (0.0, 0.0),
            };

            let half_stroke = node.style.stroke_width / 2.0;
            xs.push(hatch_path.offset + x0 - half_stroke);
            xs.push(hatch_path.offset + x1 + half_stroke);
        }
    }

    Ok(xs.into_iter().minmax().into_option())
}

/// Where a path ends; it is repeated every that far down.
fn repeat_length(path: &Path) -> f64 {
    let mut start = (0.0, 0.0);
    let mut current = (0.0, 0.0);

    for cmd in path.iter() {
        match cmd {
            PathCommand::MoveTo(x, y) => {
                start = (x, y);
                current = start;
            }
            PathCommand::LineTo(x, y) => current = (x, y),
            PathCommand::CurveTo(c) => current = c.to,
            PathCommand::ClosePath => current = start,
        }
    }

    current.1
}

fn translate_command(cmd: PathCommand, dy: f64, builder: &mut PathBuilder) {
    match cmd {
        PathCommand::MoveTo(x, y) => builder.move_to(x, y + dy),
        PathCommand::LineTo(x, y) => builder.line_to(x, y + dy),
        PathCommand::CurveTo(c) => builder.curve_to(
            c.pt1.0,
            c.pt1.1 + dy,
            c.pt2.0,
            c.pt2.1 + dy,
            c.to.0,
            c.to.1 + dy,
        ),
        PathCommand::ClosePath => builder.close_path(),
    }
}

/// The curve that a hatch path draws across the strip `(min, max)`.
///
/// A hatch path without data is a vertical line through the strip.  One with data
/// is repeated downwards, every time shifted by the y of its end point, so that it
/// covers the strip; if that y is not positive the path draws nothing.  More than
/// [`MAX_HATCH_REPEATS`] repetitions is an error.
pub fn hatch_path_curve(
    hatch_path: &HatchPath,
    strip: (f64, f64),
) -> Result<Path, RenderingError> {
    let (min, max) = strip;
    let mut builder = PathBuilder::default();

    match hatch_path.d {
        None => {
            builder.move_to(0.0, min);
            builder.line_to(0.0, max);
        }

        Some(ref d) => {
            let repeat = repeat_length(d);

            if repeat > 0.0 {
                let initial_y = (min / repeat).floor() * repeat;
                let count = ((max - min) / repeat).ceil() + 1.0;
                let count = cast::usize(count).map_err(|_| RenderingError::LimitExceeded)?;

                if count > MAX_HATCH_REPEATS {
                    return Err(RenderingError::LimitExceeded);
                }

                for i in 0..count {
                    let dy = initial_y + i as f64 * repeat;

                    for cmd in d.iter() {
                        translate_command(cmd, dy, &mut builder);
                    }
                }
            }
        }
    }

    Ok(builder.into_path())
}

fn hatch_painter(
    ctx: &RenderContext,
    renderer: &dyn ItemRenderer,
    server: NodeId,
    hatch: &Hatch,
    bbox: Option<&Rect>,
) -> Result<Option<cairo::Pattern>, RenderingError> {
    let document = renderer.document();

    if !(hatch.pitch > 0.0) {
        return Ok(None);
    }

    let info = HatchRenderInfo::new(hatch, bbox);
    let tile = info.tile_rect;

    if tile.is_empty() {
        return Ok(None);
    }

    let surface_width = f64::from(tile_extent(tile.width(), HATCH_TILE_RESOLUTION)?);
    let surface_height = f64::from(tile_extent(tile.height(), HATCH_TILE_RESOLUTION)?);

    let drawing_transform = Transform::multiply(
        &Transform::new_translate(-tile.x0, -tile.y0),
        &Transform::new_scale(surface_width / tile.width(), surface_height / tile.height()),
    );

    let child_transform = Transform::multiply(&info.child_transform, &drawing_transform);

    let paths = hatch_paths(document, server);

    let visible = document.node(server).style.overflow == Some(Overflow::Visible);
    let overflow = match hatch_bounds(document, &paths)? {
        Some((min, max)) if visible => HatchOverflow::new(true, min, max, hatch.pitch)?,
        _ => HatchOverflow::new(false, 0.0, 0.0, hatch.pitch)?,
    };

    let mut pattern_ctx = ctx.create_similar(surface_width, surface_height)?;
    pattern_ctx.set_transform(&child_transform);
    pattern_ctx.transform(&Transform::new_translate(-overflow.right_strip, 0.0));
    pattern_ctx.push_state()?;

    // paths spilling over into neighboring strips are drawn once per strip, moving
    // one pitch at a time
    for _ in 0..overflow.steps {
        for &path in &paths {
            renderer.render_hatch_path(&mut pattern_ctx, path, info.strip)?;
        }

        pattern_ctx.transform(&Transform::new_translate(hatch.pitch, 0.0));
    }

    pattern_ctx.pop_state()?;

    let surface_pattern = cairo::SurfacePattern::create(pattern_ctx.surface());
    surface_pattern.set_extend(cairo::Extend::Repeat);

    if let Some(user2ps) = info.pattern_to_user.invert() {
        surface_pattern.set_matrix(Transform::multiply(&user2ps, &drawing_transform).into());
    }

    Ok(Some(cairo::Pattern::clone(&surface_pattern)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::RGBA;
    use crate::document::SpreadMethod;
    use crate::transform::tests::assert_transform_eq;

    fn linear(units: CoordUnits) -> Gradient {
        Gradient {
            variant: GradientVariant::Linear {
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 0.0,
            },
            units,
            spread: SpreadMethod::Reflect,
            transform: Transform::new_scale(2.0, 2.0),
            stops: Vec::new(),
            href: None,
        }
    }

    fn stops() -> Vec<GradientStop> {
        vec![
            GradientStop {
                offset: 0.0,
                color: RGBA::new(255, 0, 0, 255),
                opacity: 0.5,
            },
            GradientStop {
                offset: 1.0,
                color: RGBA::new(0, 0, 255, 255),
                opacity: 1.0,
            },
        ]
    }

    #[test]
    fn gradient_stops_carry_alpha() {
        let g = gradient_pattern(&linear(CoordUnits::UserSpaceOnUse), &stops(), None, 0.5);

        assert_eq!(g.color_stop_count().unwrap(), 2);

        let (offset, r, _, b, a) = g.color_stop_rgba(0).unwrap();
        assert_eq!((offset, r, b), (0.0, 1.0, 0.0));
        assert_eq!(a, 0.25);

        let (_, _, _, _, a) = g.color_stop_rgba(1).unwrap();
        assert_eq!(a, 0.5);

        assert_eq!(g.extend(), cairo::Extend::Reflect);
    }

    #[test]
    fn gradient_matrix_is_the_inverse_transform() {
        let g = gradient_pattern(&linear(CoordUnits::UserSpaceOnUse), &stops(), None, 1.0);
        assert_transform_eq(&Transform::from(g.matrix()), &Transform::new_scale(0.5, 0.5));
    }

    #[test]
    fn linear_bbox_units_do_not_change_the_matrix() {
        let bbox = Rect::new(10.0, 10.0, 30.0, 50.0);
        let g = gradient_pattern(
            &linear(CoordUnits::ObjectBoundingBox),
            &stops(),
            Some(&bbox),
            1.0,
        );
        assert_transform_eq(&Transform::from(g.matrix()), &Transform::new_scale(0.5, 0.5));
    }

    #[test]
    fn radial_bbox_units_go_into_the_matrix() {
        let bbox = Rect::new(10.0, 10.0, 30.0, 50.0);
        let gradient = Gradient {
            variant: GradientVariant::Radial {
                cx: 0.5,
                cy: 0.5,
                r: 0.5,
                fx: 0.5,
                fy: 0.5,
                fr: 0.0,
            },
            transform: Transform::identity(),
            ..linear(CoordUnits::ObjectBoundingBox)
        };

        let g = gradient_pattern(&gradient, &stops(), Some(&bbox), 1.0);
        let expected = Transform::from_bbox(&bbox).invert().unwrap();
        assert_transform_eq(&Transform::from(g.matrix()), &expected);
    }

    fn hatch(pitch: f64) -> Hatch {
        Hatch {
            x: 0.0,
            y: 0.0,
            pitch,
            rotate: 0.0,
            units: CoordUnits::UserSpaceOnUse,
            content_units: CoordUnits::UserSpaceOnUse,
            transform: Transform::identity(),
        }
    }

    #[test]
    fn hatch_tile_spans_the_bbox_vertically() {
        let info = HatchRenderInfo::new(&hatch(5.0), Some(&Rect::new(0.0, 10.0, 40.0, 30.0)));

        assert_eq!(info.strip, (10.0, 30.0));
        assert!(info.tile_rect.approx_eq(&Rect::new(0.0, 10.0, 5.0, 30.0)));
        assert_eq!(info.child_transform, Transform::identity());
    }

    #[test]
    fn rotated_hatch_strip_covers_the_corners() {
        let h = Hatch {
            rotate: 90.0,
            ..hatch(5.0)
        };
        let info = HatchRenderInfo::new(&h, Some(&Rect::new(0.0, 0.0, 40.0, 10.0)));

        // x in user space becomes -y in hatch space
        assert!((info.strip.0 - -40.0).abs() < 1e-9);
        assert!(info.strip.1.abs() < 1e-9);
    }

    #[test]
    fn hatch_bbox_units() {
        let h = Hatch {
            x: 0.5,
            units: CoordUnits::ObjectBoundingBox,
            content_units: CoordUnits::ObjectBoundingBox,
            ..hatch(0.1)
        };
        let bbox = Rect::new(0.0, 0.0, 100.0, 20.0);
        let info = HatchRenderInfo::new(&h, Some(&bbox));

        assert_eq!(info.strip, (0.0, 1.0));
        assert!(info.tile_rect.approx_eq(&Rect::new(0.0, 0.0, 10.0, 20.0)));
        assert_eq!(info.child_transform, Transform::new_scale(100.0, 20.0));
        assert_eq!(info.pattern_to_user, Transform::new_translate(50.0, 0.0));
    }

    #[test]
    fn hatch_without_bbox_is_one_pitch_high() {
        let info = HatchRenderInfo::new(&hatch(4.0), None);
        assert_eq!(info.strip, (0.0, 4.0));

        let info = HatchRenderInfo::new(&hatch(4.0), Some(&Rect::new(0.0, 0.0, 10.0, 0.0)));
        assert_eq!(info.strip, (0.0, 4.0));
    }

    #[test]
    fn hatch_path_without_data_is_a_line() {
        let hp = HatchPath { d: None, offset: 0.0 };
        let curve = hatch_path_curve(&hp, (-3.0, 7.0)).unwrap();

        let cmds: Vec<PathCommand> = curve.iter().collect();
        assert_eq!(
            cmds,
            vec![PathCommand::MoveTo(0.0, -3.0), PathCommand::LineTo(0.0, 7.0)]
        );
    }

    #[test]
    fn hatch_path_repeats_down_the_strip() {
        let hp = HatchPath {
            d: Some(Path::parse("M 0 0 L 2 5").unwrap()),
            offset: 0.0,
        };
        let curve = hatch_path_curve(&hp, (3.0, 12.0)).unwrap();

        let starts: Vec<(f64, f64)> = curve
            .iter()
            .filter_map(|c| match c {
                PathCommand::MoveTo(x, y) => Some((x, y)),
                _ => None,
            })
            .collect();

        // starts at the repeat boundary above the strip, and reaches past its end
        assert_eq!(starts, vec![(0.0, 0.0), (0.0, 5.0), (0.0, 10.0)]);
    }

    #[test]
    fn hatch_path_going_up_draws_nothing() {
        let hp = HatchPath {
            d: Some(Path::parse("M 0 0 L 2 -5").unwrap()),
            offset: 0.0,
        };
        assert!(hatch_path_curve(&hp, (0.0, 10.0)).unwrap().is_empty());
    }

    #[test]
    fn hatch_path_repeats_are_limited() {
        let hp = HatchPath {
            d: Some(Path::parse("M 0 0 L 2 0.001").unwrap()),
            offset: 0.0,
        };
        assert!(hatch_path_curve(&hp, (0.0, 10.0)).is_ok());
        assert!(matches!(
            hatch_path_curve(&hp, (0.0, 1000.0)),
            Err(RenderingError::LimitExceeded)
        ));
    }

    #[test]
    fn repeat_length_follows_close_path() {
        assert_eq!(repeat_length(&Path::parse("M 0 1 L 3 4").unwrap()), 4.0);
        assert_eq!(repeat_length(&Path::parse("M 0 1 L 3 4 Z").unwrap()), 1.0);
    }
}
