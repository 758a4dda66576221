//! Walks a [`Document`] and draws it through a [`RenderContext`].
//!
//! Every item gets its own state frame.  Items that are clipped, masked, blended or
//! translucent (where the opacity cannot be merged into the paint) are drawn into a
//! layer that the render context composites when the frame is done.

use std::borrow::Cow;

use crate::compositing::{ClipMode, RenderMode};
use crate::document::{
    AcquireError, AcquiredNode, AcquiredNodes, CoordUnits, Document, Element, NodeId,
};
use crate::error::RenderingError;
use crate::paint_server::hatch_path_curve;
use crate::rect::{union_opt, Rect};
use crate::render_ctx::{ItemRenderer, RenderContext};
use crate::session::Session;
use crate::state::ItemState;
use crate::style::{ComputedStyle, MixBlendMode, PathPaintOrder};
use crate::svgpaint_log;
use crate::text::{create_pango_context, layout_text, TextLayout};
use crate::transform::Transform;

/// Device units per inch on vector targets.
const POINTS_PER_INCH: f64 = 72.0;

/// Draws the items of one document.
pub struct Renderer<'a> {
    document: &'a Document,
    acquired: AcquiredNodes,
    pango_context: pango::Context,
    session: Session,
}

impl<'a> Renderer<'a> {
    pub fn new(document: &'a Document) -> Result<Renderer<'a>, RenderingError> {
        Renderer::with_session(document, Session::new())
    }

    pub fn with_session(
        document: &'a Document,
        session: Session,
    ) -> Result<Renderer<'a>, RenderingError> {
        Ok(Renderer {
            document,
            acquired: AcquiredNodes::new(),
            pango_context: create_pango_context()?,
            session,
        })
    }

    /// Draws the whole document onto the current page of `ctx`.
    pub fn render(&self, ctx: &mut RenderContext) -> Result<(), RenderingError> {
        self.render_item(ctx, self.document.root())
    }

    /// The bounding box of an item's fill, in the item's own user space.
    ///
    /// Groups take the union of their children, each mapped by the child's
    /// transform.  Resources have no bounding box.
    pub fn item_bbox(&self, id: NodeId) -> Result<Option<Rect>, RenderingError> {
        let node = self.document.node(id);

        match node.element {
            Element::Group => {
                let mut bbox = None;

                for child in self.document.children(id) {
                    let child_node = self.document.node(child);
                    if child_node.element.is_resource() {
                        continue;
                    }

                    let child_bbox = self
                        .item_bbox(child)?
                        .map(|r| child_node.transform.transform_rect(&r));

                    bbox = union_opt(bbox, child_bbox);
                }

                Ok(bbox)
            }

            Element::Path(ref path) => Ok(path.extents(0.0)?.path_only),

            Element::Image(ref image) => Ok(Some(image.rect)),

            Element::Text(_) => Ok(self.text_layout(id)?.and_then(|l| l.extents)),

            _ => Ok(None),
        }
    }

    fn text_layout(&self, id: NodeId) -> Result<Option<TextLayout>, RenderingError> {
        let node = self.document.node(id);

        match node.element {
            Element::Text(ref text) => Ok(Some(layout_text(
                &self.pango_context,
                &text.text,
                &node.style.font,
                text.x,
                text.y,
            )?)),

            _ => Ok(None),
        }
    }

    fn acquire(&self, id: NodeId) -> Result<AcquiredNode, RenderingError> {
        self.acquired.acquire_ref(id).map_err(|e| match e {
            AcquireError::CircularReference(_) => {
                let node = self.document.node(id);
                svgpaint_log!(self.session, "circular reference in {}", node);
                RenderingError::CircularReference(node.to_string())
            }

            AcquireError::MaxReferencesExceeded => RenderingError::LimitExceeded,
        })
    }

    /// Whether an item is drawn into its own layer.
    ///
    /// Paths and text merge their opacity into the paint when they can; everything
    /// else needs a layer for it.  Nothing gets a layer while a clip path is drawn.
    fn needs_layer(&self, ctx: &RenderContext, id: NodeId) -> bool {
        if ctx.render_mode() == RenderMode::Clip {
            return false;
        }

        let node = self.document.node(id);
        let state = ctx.current_state();

        let is_leaf = matches!(node.element, Element::Path(_) | Element::Text(_));
        let unmerged_opacity = state.opacity != 1.0 && !(is_leaf && state.merge_opacity);

        node.clip_path.is_some()
            || node.mask.is_some()
            || unmerged_opacity
            || node.style.mix_blend_mode != MixBlendMode::Normal
    }

    /// Whether an item is rasterized because of a filter.
    fn rasterizes_filter(&self, ctx: &RenderContext, style: &ComputedStyle) -> bool {
        style.filter
            && ctx.options().filter_to_bitmap
            && ctx.is_vector()
            && ctx.render_mode() == RenderMode::Normal
    }

    fn render_element(
        &self,
        ctx: &mut RenderContext,
        id: NodeId,
        style: &ComputedStyle,
        bbox: Option<&Rect>,
    ) -> Result<(), RenderingError> {
        let node = self.document.node(id);

        match node.element {
            Element::Group => {
                for child in self.document.children(id) {
                    self.render_item(ctx, child)?;
                }
            }

            Element::Path(ref path) => {
                ctx.render_path_vector(self, path, style, bbox, style.paint_order.path_order())?;
            }

            Element::Image(ref image) => {
                if !ctx.render_image(self, &image.surface, &image.image_transform(), style)? {
                    svgpaint_log!(self.session, "could not render {}", node);
                }
            }

            Element::Text(_) => {
                if let Some(layout) = self.text_layout(id)? {
                    self.render_text(ctx, &layout, style, bbox)?;
                }
            }

            _ => (),
        }

        Ok(())
    }

    fn render_text(
        &self,
        ctx: &mut RenderContext,
        layout: &TextLayout,
        style: &ComputedStyle,
        bbox: Option<&Rect>,
    ) -> Result<(), RenderingError> {
        let mut second_pass = false;

        for run in &layout.runs {
            second_pass |= ctx.render_glyphtext(self, run, style, bbox, false)?;
        }

        if second_pass {
            for run in &layout.runs {
                ctx.render_glyphtext(self, run, style, bbox, true)?;
            }
        }

        Ok(())
    }

    /// Draws an item into a bitmap at the bitmap resolution, and places the bitmap
    /// where the item would have been.
    fn render_rasterized(
        &self,
        ctx: &mut RenderContext,
        id: NodeId,
        style: &ComputedStyle,
        bbox: &Rect,
    ) -> Result<(), RenderingError> {
        let ctm = ctx.get_transform();
        let device = ctm.transform_rect(bbox);

        if device.is_empty() {
            return Ok(());
        }

        let scale = ctx.options().bitmap_resolution / POINTS_PER_INCH;

        let user_to_raster = Transform::multiply(
            &ctm,
            &Transform::multiply(
                &Transform::new_translate(-device.x0, -device.y0),
                &Transform::new_scale(scale, scale),
            ),
        );

        let raster_to_user = match user_to_raster.invert() {
            Some(t) => t,
            None => return Ok(()),
        };

        let surface = cairo::ImageSurface::create(
            cairo::Format::ARgb32,
            crate::target::checked_i32(device.width() * scale)?,
            crate::target::checked_i32(device.height() * scale)?,
        )?;

        {
            let mut raster = RenderContext::with_session(ctx.session().clone(), *ctx.options());
            raster.set_surface_target(&surface, false, Some(&user_to_raster))?;

            // image surfaces get a white background when they are set up
            let cr = cairo::Context::new(&surface)?;
            cr.set_operator(cairo::Operator::Clear);
            cr.paint()?;

            self.render_element(&mut raster, id, style, Some(bbox))?;
        }

        ctx.render_image(self, &surface, &raster_to_user, style)?;

        Ok(())
    }

    fn render_item_in_frame(
        &self,
        ctx: &mut RenderContext,
        id: NodeId,
        bbox: Option<Rect>,
    ) -> Result<(), RenderingError> {
        let node = self.document.node(id);

        ctx.set_state_for_item(&ItemState {
            style: &node.style,
            clip_path: node.clip_path,
            mask: node.mask,
            transform: node.transform,
            bbox,
            has_userspace: matches!(node.element, Element::Text(_) | Element::Image(_)),
        });

        ctx.transform(&node.transform);

        let rasterize = bbox.is_some() && self.rasterizes_filter(ctx, &node.style);
        if rasterize {
            // the bitmap is drawn without opacity; the layer applies it
            ctx.current_state_mut().merge_opacity = false;
        }

        let need_layer = self.needs_layer(ctx, id);

        {
            let state = ctx.current_state_mut();
            state.need_layer = need_layer;
            if need_layer {
                state.merge_opacity = false;
            }
        }

        // the layer does the blending, so the contents are drawn normally
        let style = if need_layer && node.style.mix_blend_mode != MixBlendMode::Normal {
            Cow::Owned(ComputedStyle {
                mix_blend_mode: MixBlendMode::Normal,
                ..node.style.clone()
            })
        } else {
            Cow::Borrowed(&node.style)
        };

        if need_layer {
            ctx.push_layer()?;
        }

        let res = match bbox {
            Some(ref bbox) if rasterize => self.render_rasterized(ctx, id, &style, bbox),
            _ => self.render_element(ctx, id, &style, bbox.as_ref()),
        };

        match res {
            Ok(()) if need_layer => ctx.pop_layer(self, node.style.mix_blend_mode.operator()),

            Err(e) if need_layer => {
                ctx.discard_layer();
                Err(e)
            }

            res => res,
        }
    }
}

impl<'a> ItemRenderer for Renderer<'a> {
    fn document(&self) -> &Document {
        self.document
    }

    fn acquired_nodes(&self) -> &AcquiredNodes {
        &self.acquired
    }

    fn render_item(&self, ctx: &mut RenderContext, id: NodeId) -> Result<(), RenderingError> {
        let node = self.document.node(id);

        if node.element.is_resource() {
            return Ok(());
        }

        let bbox = self.item_bbox(id)?;

        ctx.push_state()?;

        // the frame is popped even when drawing fails, so that the stack stays
        // balanced for the caller
        let res = self.render_item_in_frame(ctx, id, bbox);
        let popped = ctx.pop_state();

        res.and(popped)
    }

    fn apply_clip_path(
        &self,
        ctx: &mut RenderContext,
        clip: NodeId,
        bbox: Option<Rect>,
    ) -> Result<(), RenderingError> {
        let node = self.document.node(clip);

        let units = match node.element {
            Element::ClipPath(ref c) => c.units,
            _ => return Ok(()),
        };

        let _acquired = self.acquire(clip)?;

        let saved_mode = ctx.render_mode();
        let saved_transform = ctx.get_transform();

        if units == CoordUnits::ObjectBoundingBox {
            match bbox {
                Some(ref bbox) => ctx.transform(&Transform::from_bbox(bbox)),
                None => return Ok(()),
            }
        }

        ctx.transform(&node.transform);
        ctx.set_render_mode(RenderMode::Clip);

        let res = self
            .document
            .children(clip)
            .try_for_each(|child| self.render_item(ctx, child));

        // the paths of all children were added; a nested clip path leaves that to
        // the outermost one
        if res.is_ok() && ctx.clip_mode() == ClipMode::Path && saved_mode == RenderMode::Normal {
            ctx.clip();
        }

        ctx.restore_transform(&saved_transform);
        ctx.set_render_mode(saved_mode);

        res
    }

    fn apply_mask(
        &self,
        ctx: &mut RenderContext,
        mask: NodeId,
        bbox: Option<Rect>,
    ) -> Result<(), RenderingError> {
        let node = self.document.node(mask);

        let m = match node.element {
            Element::Mask(ref m) => m,
            _ => return Ok(()),
        };

        let _acquired = self.acquire(mask)?;

        let rect = match m.units.to_user(m.rect, bbox.as_ref()) {
            Some(r) => r,
            None => return Ok(()),
        };

        let content_transform = match (m.content_units, bbox) {
            (CoordUnits::ObjectBoundingBox, Some(ref bbox)) => Transform::from_bbox(bbox),
            (CoordUnits::ObjectBoundingBox, None) => return Ok(()),
            (CoordUnits::UserSpaceOnUse, _) => Transform::identity(),
        };

        ctx.push_state()?;
        ctx.add_clipping_rect(rect.x0, rect.y0, rect.width(), rect.height());
        ctx.transform(&content_transform);

        let res = self
            .document
            .children(mask)
            .try_for_each(|child| self.render_item(ctx, child));

        ctx.pop_state()?;

        res
    }

    fn render_hatch_path(
        &self,
        ctx: &mut RenderContext,
        path: NodeId,
        strip: (f64, f64),
    ) -> Result<(), RenderingError> {
        let node = self.document.node(path);

        let hatch_path = match node.element {
            Element::HatchPath(ref hp) => hp,
            _ => return Ok(()),
        };

        let curve = hatch_path_curve(hatch_path, strip)?;
        if curve.is_empty() {
            return Ok(());
        }

        ctx.push_state()?;
        ctx.set_state_for_style(&node.style);
        ctx.transform(&Transform::new_translate(hatch_path.offset, 0.0));

        // hatch paths are only ever stroked
        let res = ctx.render_path_vector(self, &curve, &node.style, None, PathPaintOrder::StrokeOnly);

        ctx.pop_state()?;

        res.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputStream;
    use crate::scene::Loader;
    use crate::surface_utils::{pixel_at, Pixel};
    use crate::target::{RenderOptions, TargetKind};

    const WHITE: Pixel = Pixel {
        r: 255,
        g: 255,
        b: 255,
        a: 255,
    };

    const BLACK: Pixel = Pixel {
        r: 0,
        g: 0,
        b: 0,
        a: 255,
    };

    fn load(json: &str) -> Document {
        Loader::new().read_str(json).unwrap()
    }

    fn render(doc: &Document) -> cairo::ImageSurface {
        let renderer = Renderer::with_session(doc, Session::new_for_test_suite()).unwrap();
        let (width, height) = doc.size();

        let mut ctx = RenderContext::with_session(Session::new_for_test_suite(), Default::default());
        ctx.set_image_target(cairo::Format::ARgb32).unwrap();
        ctx.setup_surface(width, height).unwrap();

        renderer.render(&mut ctx).unwrap();
        assert_eq!(ctx.state_depth(), 1);
        assert!(renderer.acquired_nodes().is_empty());

        ctx.into_image_surface().unwrap()
    }

    fn pixel(surface: &cairo::ImageSurface, x: i32, y: i32) -> Pixel {
        pixel_at(surface, x, y).unwrap()
    }

    #[test]
    fn group_bbox_maps_children() {
        let doc = load(
            r#"{ "width": 100, "height": 100, "root": { "type": "group", "children": [
                 { "type": "rect", "x": 10, "y": 10, "width": 10, "height": 10 },
                 { "type": "rect", "width": 10, "height": 10, "transform": "translate(50, 60)" },
                 { "type": "clip-path", "id": "c", "children": [
                   { "type": "rect", "x": -100, "width": 10, "height": 10 } ] }
               ] } }"#,
        );
        let renderer = Renderer::new(&doc).unwrap();

        let bbox = renderer.item_bbox(doc.root()).unwrap().unwrap();
        assert!(bbox.approx_eq(&Rect::new(10.0, 10.0, 60.0, 70.0)));
    }

    #[test]
    fn empty_group_has_no_bbox() {
        let doc = load(r#"{ "width": 10, "height": 10, "root": { "type": "group" } }"#);
        let renderer = Renderer::new(&doc).unwrap();
        assert_eq!(renderer.item_bbox(doc.root()).unwrap(), None);
    }

    #[test]
    fn paths_are_filled() {
        let doc = load(
            r#"{ "width": 20, "height": 20, "root": { "type": "group", "children": [
                 { "type": "rect", "x": 5, "y": 5, "width": 10, "height": 10,
                   "style": { "fill": "blue" } } ] } }"#,
        );
        let surface = render(&doc);

        assert_eq!(pixel(&surface, 10, 10), Pixel::new(0, 0, 255, 255));
        assert_eq!(pixel(&surface, 2, 2), WHITE);
    }

    #[test]
    fn group_opacity_uses_a_layer() {
        // two overlapping rectangles in a translucent group do not add up
        let doc = load(
            r#"{ "width": 20, "height": 10, "root": { "type": "group", "children": [
                 { "type": "group", "style": { "opacity": 0.5 }, "children": [
                   { "type": "rect", "width": 15, "height": 10 },
                   { "type": "rect", "x": 5, "width": 15, "height": 10 } ] } ] } }"#,
        );
        let surface = render(&doc);

        let single = pixel(&surface, 2, 5);
        let overlap = pixel(&surface, 10, 5);
        assert_eq!(single, overlap);
        assert!((127..=128).contains(&single.r));
    }

    #[test]
    fn clip_path_restricts_drawing() {
        let doc = load(
            r#"{ "width": 20, "height": 20, "root": { "type": "group", "children": [
                 { "type": "clip-path", "id": "c", "children": [
                   { "type": "rect", "width": 10, "height": 20 } ] },
                 { "type": "rect", "width": 20, "height": 20, "clip-path": "url(#c)" } ] } }"#,
        );
        let surface = render(&doc);

        assert_eq!(pixel(&surface, 5, 10), BLACK);
        assert_eq!(pixel(&surface, 15, 10), WHITE);
    }

    #[test]
    fn clip_path_in_bbox_units() {
        let doc = load(
            r#"{ "width": 40, "height": 40, "root": { "type": "group", "children": [
                 { "type": "clip-path", "id": "c", "clipPathUnits": "objectBoundingBox",
                   "children": [ { "type": "rect", "width": 0.5, "height": 1 } ] },
                 { "type": "rect", "x": 20, "width": 20, "height": 40, "clip-path": "url(#c)" } ] } }"#,
        );
        let surface = render(&doc);

        assert_eq!(pixel(&surface, 25, 20), BLACK);
        assert_eq!(pixel(&surface, 35, 20), WHITE);
        assert_eq!(pixel(&surface, 5, 20), WHITE);
    }

    #[test]
    fn mask_uses_luminance() {
        let doc = load(
            r#"{ "width": 20, "height": 10, "root": { "type": "group", "children": [
                 { "type": "mask", "id": "m", "maskUnits": "userSpaceOnUse",
                   "x": 0, "y": 0, "width": 20, "height": 10, "children": [
                   { "type": "rect", "width": 10, "height": 10, "style": { "fill": "white" } } ] },
                 { "type": "rect", "width": 20, "height": 10, "mask": "url(#m)" } ] } }"#,
        );
        let surface = render(&doc);

        assert_eq!(pixel(&surface, 5, 5), BLACK);
        assert_eq!(pixel(&surface, 15, 5), WHITE);
    }

    #[test]
    fn clip_path_and_mask_together_on_raster() {
        let doc = load(
            r#"{ "width": 20, "height": 20, "root": { "type": "group", "children": [
                 { "type": "clip-path", "id": "c", "children": [
                   { "type": "rect", "width": 10, "height": 20 } ] },
                 { "type": "mask", "id": "m", "maskUnits": "userSpaceOnUse",
                   "x": 0, "y": 0, "width": 20, "height": 20, "children": [
                   { "type": "rect", "width": 20, "height": 10, "style": { "fill": "white" } } ] },
                 { "type": "rect", "width": 20, "height": 20,
                   "clip-path": "url(#c)", "mask": "url(#m)" } ] } }"#,
        );
        let surface = render(&doc);

        // only where both the clip and the mask let it through
        assert_eq!(pixel(&surface, 5, 5), BLACK);
        assert_eq!(pixel(&surface, 15, 5), WHITE);
        assert_eq!(pixel(&surface, 5, 15), WHITE);
        assert_eq!(pixel(&surface, 15, 15), WHITE);
    }

    #[test]
    fn mask_on_pdf_target() {
        let doc = load(
            r#"{ "width": 20, "height": 10, "root": { "type": "group", "children": [
                 { "type": "mask", "id": "m", "maskUnits": "userSpaceOnUse",
                   "x": 0, "y": 0, "width": 20, "height": 10, "children": [
                   { "type": "rect", "width": 10, "height": 10, "style": { "fill": "white" } } ] },
                 { "type": "rect", "width": 20, "height": 10, "mask": "url(#m)" } ] } }"#,
        );
        let renderer = Renderer::with_session(&doc, Session::new_for_test_suite()).unwrap();

        // no object streams, so that the soft mask can be found in the output
        let (stream, buffer) = OutputStream::memory();
        let mut ctx = RenderContext::with_session(
            Session::new_for_test_suite(),
            RenderOptions {
                pdf_version: cairo::PdfVersion::_1_4,
                ..Default::default()
            },
        );
        ctx.set_vector_target(TargetKind::Pdf, stream).unwrap();
        ctx.setup_surface(20.0, 10.0).unwrap();

        renderer.render(&mut ctx).unwrap();
        assert_eq!(ctx.state_depth(), 1);
        assert!(renderer.acquired_nodes().is_empty());
        ctx.finish(true).unwrap();

        let pdf = String::from_utf8_lossy(&buffer.contents()).into_owned();
        assert!(pdf.starts_with("%PDF"));
        assert!(pdf.contains("/SMask"));
    }

    #[test]
    fn circular_mask_is_an_error() {
        let doc = load(
            r#"{ "width": 10, "height": 10, "root": { "type": "group", "children": [
                 { "type": "mask", "id": "m", "children": [
                   { "type": "rect", "width": 5, "height": 5, "mask": "url(#m)",
                     "style": { "fill": "white" } } ] },
                 { "type": "rect", "width": 10, "height": 10, "mask": "url(#m)" } ] } }"#,
        );
        let renderer = Renderer::new(&doc).unwrap();

        let mut ctx = RenderContext::new(Default::default());
        ctx.set_image_target(cairo::Format::ARgb32).unwrap();
        ctx.setup_surface(10.0, 10.0).unwrap();

        assert!(matches!(
            renderer.render(&mut ctx),
            Err(RenderingError::CircularReference(_))
        ));

        // the frames and the layer of the masked item were unwound
        assert_eq!(ctx.state_depth(), 1);
        assert!(renderer.acquired_nodes().is_empty());
        assert!(ctx.cr().status().is_ok());
        ctx.cr().paint().unwrap();
    }

    #[test]
    fn linear_gradient_fill() {
        let doc = load(
            r#"{ "width": 100, "height": 10, "root": { "type": "group", "children": [
                 { "type": "linear-gradient", "id": "g", "stops": [
                   { "offset": 0, "color": "black" }, { "offset": 1, "color": "white" } ] },
                 { "type": "rect", "width": 100, "height": 10, "style": { "fill": "url(#g)" } } ] } }"#,
        );
        let surface = render(&doc);

        let left = pixel(&surface, 1, 5);
        let middle = pixel(&surface, 50, 5);
        let right = pixel(&surface, 98, 5);

        assert!(left.r < 10);
        assert!((120..=135).contains(&middle.r));
        assert!(right.r > 245);
    }

    #[test]
    fn invalid_fill_server_is_black() {
        let doc = load(
            r#"{ "width": 10, "height": 10, "root": { "type": "group", "children": [
                 { "type": "linear-gradient", "id": "g" },
                 { "type": "rect", "width": 10, "height": 10,
                   "style": { "fill": "url(#g) lime" } } ] } }"#,
        );
        let surface = render(&doc);
        assert_eq!(pixel(&surface, 5, 5), BLACK);
    }

    #[test]
    fn invalid_stroke_server_uses_fallback() {
        let doc = load(
            r#"{ "width": 20, "height": 20, "root": { "type": "group", "children": [
                 { "type": "linear-gradient", "id": "g" },
                 { "type": "rect", "x": 5, "y": 5, "width": 10, "height": 10,
                   "style": { "fill": "none", "stroke": "url(#g) lime", "stroke-width": 4 } } ] } }"#,
        );
        let surface = render(&doc);
        assert_eq!(pixel(&surface, 5, 10), Pixel::new(0, 255, 0, 255));
        assert_eq!(pixel(&surface, 10, 10), WHITE);
    }

    #[test]
    fn pattern_tiles_repeat() {
        let doc = load(
            r#"{ "width": 40, "height": 10, "root": { "type": "group", "children": [
                 { "type": "pattern", "id": "p", "patternUnits": "userSpaceOnUse",
                   "width": 10, "height": 10, "children": [
                   { "type": "rect", "width": 5, "height": 10, "style": { "fill": "red" } } ] },
                 { "type": "rect", "width": 40, "height": 10, "style": { "fill": "url(#p)" } } ] } }"#,
        );
        let surface = render(&doc);

        for x in [2, 12, 22, 32] {
            assert_eq!(pixel(&surface, x, 5), Pixel::new(255, 0, 0, 255));
        }
        for x in [7, 17, 27, 37] {
            assert_eq!(pixel(&surface, x, 5), WHITE);
        }
    }

    #[test]
    fn small_pattern_tiles_are_scaled_back_to_user_space() {
        // a one-unit tile is drawn at the tile resolution, and the pattern matrix
        // scales it back down to one unit
        let doc = load(
            r#"{ "width": 40, "height": 10, "root": { "type": "group", "transform": "scale(10)",
                 "children": [
                 { "type": "pattern", "id": "p", "patternUnits": "userSpaceOnUse",
                   "width": 1, "height": 1, "children": [
                   { "type": "rect", "width": 0.5, "height": 1, "style": { "fill": "red" } } ] },
                 { "type": "rect", "width": 4, "height": 1, "style": { "fill": "url(#p)" } } ] } }"#,
        );
        let surface = render(&doc);

        for x in [2, 12, 22, 32] {
            assert_eq!(pixel(&surface, x, 5), Pixel::new(255, 0, 0, 255));
        }
        for x in [7, 17, 27, 37] {
            assert_eq!(pixel(&surface, x, 5), WHITE);
        }
    }

    #[test]
    fn self_referencing_pattern_renders_without_the_cycle() {
        let doc = load(
            r#"{ "width": 10, "height": 10, "root": { "type": "group", "children": [
                 { "type": "pattern", "id": "p", "patternUnits": "userSpaceOnUse",
                   "width": 10, "height": 10, "children": [
                   { "type": "rect", "width": 5, "height": 10, "style": { "fill": "url(#p) red" } },
                   { "type": "rect", "x": 5, "width": 5, "height": 10, "style": { "fill": "blue" } } ] },
                 { "type": "rect", "width": 10, "height": 10, "style": { "fill": "url(#p)" } } ] } }"#,
        );
        let surface = render(&doc);

        assert_eq!(pixel(&surface, 7, 5), Pixel::new(0, 0, 255, 255));
    }

    #[test]
    fn hatch_draws_vertical_lines() {
        let doc = load(
            r#"{ "width": 40, "height": 20, "root": { "type": "group", "children": [
                 { "type": "hatch", "id": "h", "hatchUnits": "userSpaceOnUse", "pitch": 10,
                   "children": [ { "type": "hatchpath", "offset": 5,
                                   "style": { "stroke": "black", "stroke-width": 4 } } ] },
                 { "type": "rect", "width": 40, "height": 20, "style": { "fill": "url(#h)" } } ] } }"#,
        );
        let surface = render(&doc);

        for x in [5, 15, 25, 35] {
            assert_eq!(pixel(&surface, x, 10), BLACK);
        }
        for x in [0, 10, 20, 30] {
            assert_eq!(pixel(&surface, x, 10), WHITE);
        }
    }

    #[test]
    fn images_do_not_add_to_clips() {
        let doc = load(r#"{ "width": 10, "height": 10, "root": { "type": "group" } }"#);
        let renderer = Renderer::new(&doc).unwrap();

        let mut ctx = RenderContext::new(Default::default());
        ctx.set_image_target(cairo::Format::ARgb32).unwrap();
        ctx.setup_surface(10.0, 10.0).unwrap();
        ctx.set_render_mode(RenderMode::Clip);

        let image = cairo::ImageSurface::create(cairo::Format::ARgb32, 2, 2).unwrap();
        assert!(ctx
            .render_image(&renderer, &image, &Transform::identity(), &ComputedStyle::default())
            .unwrap());
    }

    #[test]
    fn text_is_drawn() {
        let doc = load(
            r#"{ "width": 100, "height": 40, "root": { "type": "group", "children": [
                 { "type": "text", "x": 5, "y": 30, "text": "MMMM",
                   "style": { "font": "Sans Bold 24" } } ] } }"#,
        );
        let surface = render(&doc);

        let mut dark = 0;
        for y in 0..40 {
            for x in 0..100 {
                if pixel(&surface, x, y).r < 128 {
                    dark += 1;
                }
            }
        }
        assert!(dark > 50);
    }

    #[test]
    fn filters_are_rasterized_on_vector_targets() {
        let doc = load(
            r#"{ "width": 20, "height": 20, "root": { "type": "group", "children": [
                 { "type": "rect", "width": 10, "height": 10, "style": { "filter": "url(#blur)" } } ] } }"#,
        );
        let renderer = Renderer::new(&doc).unwrap();

        let (stream, buffer) = OutputStream::memory();
        let mut ctx = RenderContext::new(RenderOptions {
            filter_to_bitmap: true,
            pdf_version: cairo::PdfVersion::_1_4,
            ..Default::default()
        });
        ctx.set_vector_target(TargetKind::Pdf, stream).unwrap();
        ctx.setup_surface(15.0, 15.0).unwrap();

        renderer.render(&mut ctx).unwrap();
        ctx.finish(true).unwrap();

        let pdf = String::from_utf8_lossy(&buffer.contents()).into_owned();
        assert!(pdf.contains("/Subtype /Image"));
    }
}
