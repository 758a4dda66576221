//! The render context: a Cairo context plus the state that SVG compositing needs.
//!
//! A [`RenderContext`] owns its target surface and a stack of [`RenderState`]
//! frames.  Items are drawn by a [`ItemRenderer`], which calls back into the context
//! for every path, image and glyph run, and for the layers that isolate clipped,
//! masked or translucent items.
//!
//! Raster targets realize clip paths and masks by rendering them into separate image
//! contexts and compositing through those; vector targets turn clip paths into real
//! Cairo clips so that they stay vectors in the output.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};

use glib::Cast;
use once_cell::sync::Lazy;
use pango::prelude::FontExt;
use pangocairo::traits::FontExt as PangoCairoFontExt;
use regex::{Captures, Regex};

use crate::color::{set_source_color_on_cairo, BLACK};
use crate::compositing::{
    path_needs_layer, ClipMode, GlyphPasses, LayerPlan, LayerStep, PathPaint, RenderMode,
};
use crate::document::{AcquiredNodes, Document, Metadata, NodeId};
use crate::error::RenderingError;
use crate::output::{self, OutputSpec, OutputStream};
use crate::paint_server;
use crate::path::Path;
use crate::rect::Rect;
use crate::session::Session;
use crate::state::{ItemState, RenderState, StateStack};
use crate::style::{ComputedStyle, FillRule, Paint, PathPaintOrder, StrokeLinecap};
use crate::surface_utils::luminance_to_alpha_mask;
use crate::svgpaint_log;
use crate::target::{checked_i32, RenderOptions, Surface, TargetKind, PT_PER_PX};
use crate::text::{Glyph, GlyphRun};
use crate::transform::Transform;

const CAIRO_TAG_LINK: &str = "Link";
const CAIRO_TAG_DEST: &str = "cairo.dest";

const PANGO_GLYPH_EMPTY: u32 = 0x0FFF_FFFF;
const PANGO_GLYPH_UNKNOWN_FLAG: u32 = 0x1000_0000;

/// Draws document items into a [`RenderContext`].
///
/// The context calls back into this when it needs content that it does not know how
/// to draw by itself: clip paths and masks when a layer is popped, the tiles of
/// patterns and hatches, and the items inside them.
pub trait ItemRenderer {
    fn document(&self) -> &Document;

    /// Nodes currently being rendered through a reference, for cycle detection.
    fn acquired_nodes(&self) -> &AcquiredNodes;

    /// Renders one item and its descendants.
    fn render_item(&self, ctx: &mut RenderContext, node: NodeId) -> Result<(), RenderingError>;

    /// Renders the children of a clip path in [`RenderMode::Clip`].
    ///
    /// `bbox` is the bounding box of the clipped item, for `objectBoundingBox` units.
    fn apply_clip_path(
        &self,
        ctx: &mut RenderContext,
        clip: NodeId,
        bbox: Option<Rect>,
    ) -> Result<(), RenderingError>;

    /// Renders the contents of a mask.
    fn apply_mask(
        &self,
        ctx: &mut RenderContext,
        mask: NodeId,
        bbox: Option<Rect>,
    ) -> Result<(), RenderingError>;

    /// Renders one hatch path across the strip `(min, max)` of hatch space.
    fn render_hatch_path(
        &self,
        ctx: &mut RenderContext,
        path: NodeId,
        strip: (f64, f64),
    ) -> Result<(), RenderingError>;
}

/// Tracks whether text was drawn on top of graphics, for PDF output without text.
///
/// When text is omitted so that another tool can typeset it, graphics that are drawn
/// after some text must go on a new page; otherwise they would end up below the text
/// when the pages are stacked.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum OmitTextPageState {
    #[default]
    Empty,
    GraphicOnTop,
    NewPageOnGraphic,
}

pub struct RenderContext {
    session: Session,
    options: RenderOptions,
    target: TargetKind,
    metadata: Metadata,

    /// Where a PDF or PostScript surface will write, until the surface is created.
    stream: Option<OutputStream>,
    surface: Option<Surface>,
    cr: Option<cairo::Context>,

    width: f64,
    height: f64,
    is_show_page: bool,

    states: StateStack,
    render_mode: RenderMode,
    clip_mode: ClipMode,
    omit_text_state: OmitTextPageState,

    font_faces: HashMap<pango::Font, cairo::FontFace>,
}

impl RenderContext {
    pub fn new(options: RenderOptions) -> RenderContext {
        RenderContext::with_session(Session::new(), options)
    }

    pub fn with_session(session: Session, options: RenderOptions) -> RenderContext {
        RenderContext {
            session,
            options,
            target: TargetKind::Image(cairo::Format::ARgb32),
            metadata: Metadata::default(),
            stream: None,
            surface: None,
            cr: None,
            width: 0.0,
            height: 0.0,
            is_show_page: false,
            states: StateStack::new(),
            render_mode: RenderMode::Normal,
            clip_mode: ClipMode::Mask,
            omit_text_state: OmitTextPageState::Empty,
            font_faces: HashMap::new(),
        }
    }

    /// A context for clips, masks and tiles, sharing this one's session and options.
    fn new_sub_context(&self) -> RenderContext {
        RenderContext::with_session(self.session.clone(), self.options)
    }

    fn cr(&self) -> &cairo::Context {
        match self.cr {
            Some(ref cr) => cr,
            None => panic!("render context used before its surface was set up"),
        }
    }

    /// Whether the surface has been set up, and the context can be drawn on.
    pub fn is_valid(&self) -> bool {
        self.cr.is_some()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    pub fn target(&self) -> TargetKind {
        self.target
    }

    pub fn is_vector(&self) -> bool {
        self.target.is_vector()
    }

    /// Size of the current page, in device units of the target.
    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn omit_text_state(&self) -> OmitTextPageState {
        self.omit_text_state
    }

    // Targets and surface setup

    fn check_not_valid(&self) -> Result<(), RenderingError> {
        if self.is_valid() {
            Err(RenderingError::AlreadyValid)
        } else {
            Ok(())
        }
    }

    /// Makes [`setup_surface`](Self::setup_surface) create an image surface.
    pub fn set_image_target(&mut self, format: cairo::Format) -> Result<(), RenderingError> {
        self.check_not_valid()?;

        match format {
            cairo::Format::ARgb32 | cairo::Format::Rgb24 | cairo::Format::A8 | cairo::Format::A1 => {
                self.target = TargetKind::Image(format);
                Ok(())
            }

            _ => Err(RenderingError::InvalidTargetFormat(format)),
        }
    }

    pub fn set_pdf_target(&mut self, spec: &OutputSpec) -> Result<(), RenderingError> {
        self.check_not_valid()?;
        let stream = OutputStream::open(spec)?;
        self.set_vector_target(TargetKind::Pdf, stream)
    }

    pub fn set_ps_target(&mut self, spec: &OutputSpec) -> Result<(), RenderingError> {
        self.check_not_valid()?;
        let stream = OutputStream::open(spec)?;
        self.set_vector_target(TargetKind::Ps, stream)
    }

    /// Makes [`setup_surface`](Self::setup_surface) create a PDF or PostScript
    /// surface that writes into `stream`.
    pub fn set_vector_target(
        &mut self,
        kind: TargetKind,
        stream: OutputStream,
    ) -> Result<(), RenderingError> {
        self.check_not_valid()?;

        match kind {
            TargetKind::Pdf | TargetKind::Ps => {
                self.target = kind;
                self.stream = Some(stream);
                Ok(())
            }

            _ => Err(RenderingError::UnsupportedTarget),
        }
    }

    /// Draws onto a surface owned by the caller.
    ///
    /// `ctm` replaces the surface's initial transformation.
    pub fn set_surface_target(
        &mut self,
        surface: &cairo::Surface,
        is_vector: bool,
        ctm: Option<&Transform>,
    ) -> Result<(), RenderingError> {
        self.check_not_valid()?;

        self.target = TargetKind::External { is_vector };

        if let Ok(image) = cairo::ImageSurface::try_from(surface.clone()) {
            self.width = f64::from(image.width());
            self.height = f64::from(image.height());
        }

        self.finish_surface_setup(Surface::External(surface.clone()), ctm)
    }

    /// Metadata for PDF and PostScript targets; must be set before the surface.
    pub fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }

    /// Creates the target surface.
    ///
    /// The size is in device units of the target: pixels for images, points for PDF
    /// and PostScript.  Does nothing if the surface is already set up.
    pub fn setup_surface(&mut self, width: f64, height: f64) -> Result<(), RenderingError> {
        if self.is_valid() {
            return Ok(());
        }

        self.width = width;
        self.height = height;

        let surface = match self.target {
            TargetKind::Image(format) => Surface::Image(cairo::ImageSurface::create(
                format,
                checked_i32(width)?,
                checked_i32(height)?,
            )?),

            TargetKind::Pdf => {
                let stream = self.stream.take().ok_or(RenderingError::NoOutputStream)?;
                let surface = cairo::PdfSurface::for_stream(width, height, stream)?;
                surface.restrict(self.options.pdf_version)?;
                self.write_pdf_metadata(&surface)?;
                Surface::Pdf(surface)
            }

            TargetKind::Ps => {
                let stream = self.stream.take().ok_or(RenderingError::NoOutputStream)?;
                let surface = cairo::PsSurface::for_stream(width, height, stream)?;
                surface.restrict(self.options.ps_level);
                surface.set_eps(self.options.eps);
                self.write_ps_comments(&surface);
                Surface::Ps(surface)
            }

            TargetKind::External { .. } => return Err(RenderingError::UnsupportedTarget),
        };

        self.finish_surface_setup(surface, None)
    }

    fn write_pdf_metadata(&self, surface: &cairo::PdfSurface) -> Result<(), RenderingError> {
        let m = &self.metadata;

        let fields = [
            (cairo::PdfMetadata::Title, &m.title),
            (cairo::PdfMetadata::Author, &m.author),
            (cairo::PdfMetadata::Subject, &m.subject),
            (cairo::PdfMetadata::Keywords, &m.keywords),
            (cairo::PdfMetadata::Creator, &m.creator),
            (cairo::PdfMetadata::ModDate, &m.modification_date),
        ];

        for (key, value) in fields {
            if let Some(value) = value {
                surface.set_metadata(key, value)?;
            }
        }

        // SOURCE_DATE_EPOCH wins, for reproducible output
        let creation_date = output::creation_date()?.or_else(|| m.creation_date.clone());
        if let Some(date) = creation_date {
            surface.set_metadata(cairo::PdfMetadata::CreateDate, &date)?;
        }

        Ok(())
    }

    fn write_ps_comments(&self, surface: &cairo::PsSurface) {
        if let Some(ref title) = self.metadata.title {
            surface.dsc_comment(&format!("%%Title: {title}"));
        }

        if let Some(ref copyright) = self.metadata.copyright {
            surface.dsc_comment(&format!("%%Copyright: {copyright}"));
        }
    }

    fn finish_surface_setup(
        &mut self,
        surface: Surface,
        ctm: Option<&Transform>,
    ) -> Result<(), RenderingError> {
        surface.status()?;

        let cr = cairo::Context::new(&surface)?;

        if let Some(ctm) = ctm {
            cr.set_matrix((*ctm).into());
        }

        if self.target.is_vector() {
            // user space is in pixels, the page in points
            cr.scale(PT_PER_PX, PT_PER_PX);
            self.clip_mode = ClipMode::Path;
        } else if surface.content() != cairo::Content::Alpha {
            cr.set_source_rgb(1.0, 1.0, 1.0);
            cr.rectangle(0.0, 0.0, self.width, self.height);
            cr.fill()?;
        }

        self.states.current_mut().transform = Transform::from(cr.matrix());

        self.surface = Some(surface);
        self.cr = Some(cr);

        Ok(())
    }

    /// A context for a tile of `width` by `height` device units, on a surface similar
    /// to this one's.
    pub fn create_similar(&self, width: f64, height: f64) -> Result<RenderContext, RenderingError> {
        let surface = self.cr().target().create_similar(
            cairo::Content::ColorAlpha,
            checked_i32(width)?,
            checked_i32(height)?,
        )?;

        let cr = cairo::Context::new(&surface)?;

        let mut ctx = self.new_sub_context();
        ctx.target = TargetKind::External { is_vector: false };
        ctx.width = width;
        ctx.height = height;
        ctx.surface = Some(Surface::External(surface));
        ctx.cr = Some(cr);

        Ok(ctx)
    }

    /// The target surface.
    ///
    /// # Panics
    ///
    /// Panics if the surface has not been set up.
    pub fn surface(&self) -> &cairo::Surface {
        match self.surface {
            Some(ref s) => s,
            None => panic!("render context has no surface"),
        }
    }

    /// The target surface, if it is an image surface.
    pub fn image_surface(&self) -> Result<cairo::ImageSurface, RenderingError> {
        match self.surface {
            Some(Surface::Image(ref s)) => Ok(s.clone()),
            Some(Surface::External(ref s)) => cairo::ImageSurface::try_from(s.clone())
                .map_err(|_| RenderingError::UnsupportedTarget),
            _ => Err(RenderingError::UnsupportedTarget),
        }
    }

    /// Drops the context and returns its image surface as the only reference, so
    /// that its pixels can be modified.
    pub fn into_image_surface(mut self) -> Result<cairo::ImageSurface, RenderingError> {
        self.cr = None;

        match self.surface.take() {
            Some(Surface::Image(s)) => Ok(s),
            Some(Surface::External(s)) => {
                cairo::ImageSurface::try_from(s).map_err(|_| RenderingError::UnsupportedTarget)
            }
            _ => Err(RenderingError::UnsupportedTarget),
        }
    }

    // Pages

    /// Ends the current page of a vector target.
    ///
    /// Returns `Ok(false)` for raster targets, which have no pages.
    pub fn finish_page(&mut self) -> Result<bool, RenderingError> {
        if !self.target.is_vector() {
            return Ok(false);
        }

        let cr = self.cr().clone();

        if !self.is_show_page {
            cr.show_page()?;
            self.is_show_page = true;
        }

        if let Err(e) = cr.status() {
            svgpaint_log!(self.session, "error while rendering page: {}", e);
            return Err(e.into());
        }

        Ok(true)
    }

    /// Starts a new page of `width` by `height` points on a vector target.
    pub fn next_page(
        &mut self,
        width: f64,
        height: f64,
        label: Option<&str>,
    ) -> Result<bool, RenderingError> {
        if !self.target.is_vector() {
            return Ok(false);
        }

        self.width = width;
        self.height = height;
        self.is_show_page = false;

        match self.surface {
            Some(Surface::Pdf(ref s)) => s.set_size(width, height)?,
            Some(Surface::Ps(ref s)) => s.set_size(width, height),
            _ => (),
        }

        if let Some(label) = label {
            self.set_page_label(label)?;
        }

        if let Err(e) = self.surface().status() {
            svgpaint_log!(self.session, "error while sizing page: {}", e);
            return Err(e.into());
        }

        Ok(true)
    }

    /// Labels the current page; only PDF has page labels.
    pub fn set_page_label(&self, label: &str) -> Result<(), RenderingError> {
        if let Some(Surface::Pdf(ref s)) = self.surface {
            s.set_page_label(label)?;
        }

        Ok(())
    }

    /// Ends rendering.
    ///
    /// With `finish_surface`, vector targets get their last page shown and their
    /// output stream flushed and closed.  The context is not valid afterwards.
    pub fn finish(&mut self, finish_surface: bool) -> Result<(), RenderingError> {
        let cr = match self.cr.take() {
            Some(cr) => cr,
            None => return Ok(()),
        };

        if self.target.is_vector() && !self.is_show_page && finish_surface {
            cr.show_page()?;
            self.is_show_page = true;
        }

        let status = cr.status();
        if let Err(e) = status {
            svgpaint_log!(self.session, "error while rendering output: {}", e);
        }

        drop(cr);

        if let Some(surface) = self.surface.take() {
            if finish_surface {
                match surface {
                    Surface::Pdf(ref s) => close_output_stream(s)?,
                    Surface::Ps(ref s) => close_output_stream(s)?,
                    ref s => s.finish(),
                }
            }
        }

        status.map_err(Into::into)
    }

    /// Writes an image target as PNG.
    pub fn write_png<W: Write>(&self, stream: &mut W) -> Result<(), RenderingError> {
        let surface = self.image_surface()?;
        surface.flush();
        surface.write_to_png(stream)?;
        Ok(())
    }

    pub fn save_as_png(&self, path: &std::path::Path) -> Result<(), RenderingError> {
        let mut file = BufWriter::new(File::create(path)?);
        self.write_png(&mut file)?;
        file.flush()?;
        Ok(())
    }

    // State stack

    /// Saves the Cairo state and pushes a state frame.
    pub fn push_state(&mut self) -> Result<(), RenderingError> {
        self.cr().save()?;
        self.states.push();
        Ok(())
    }

    /// Pops a state frame and restores the Cairo state saved with it.
    ///
    /// # Panics
    ///
    /// Panics if only the bottom frame is left.
    pub fn pop_state(&mut self) -> Result<(), RenderingError> {
        self.states.pop();
        self.cr().restore()?;
        Ok(())
    }

    pub fn current_state(&self) -> &RenderState {
        self.states.current()
    }

    pub fn current_state_mut(&mut self) -> &mut RenderState {
        self.states.current_mut()
    }

    pub fn parent_state(&self) -> &RenderState {
        self.states.parent()
    }

    pub fn state_depth(&self) -> usize {
        self.states.len()
    }

    pub fn set_state_for_item(&mut self, item: &ItemState<'_>) {
        self.states.current_mut().set_state_for_item(item);
    }

    pub fn set_state_for_style(&mut self, style: &ComputedStyle) {
        self.states.current_mut().set_state_for_style(style);
    }

    // Layers

    /// Redirects drawing into a transparent group.
    pub fn push_layer(&mut self) -> Result<(), RenderingError> {
        let cr = self.cr();
        cr.push_group();

        if !self.target.is_vector() {
            cr.save()?;
            cr.set_operator(cairo::Operator::Clear);
            cr.paint()?;
            cr.restore()?;
        }

        Ok(())
    }

    /// Drops the current layer without compositing it.
    pub fn discard_layer(&mut self) {
        // a context in an error state has nothing left to pop
        let _ = self.cr().pop_group();
    }

    /// Composites the current layer onto its parent through the clip path, mask and
    /// opacity of the current frame.
    ///
    /// `composite` is the blend operator for the layer, if it is not `Over`.  When
    /// this fails the layer is discarded.
    pub fn pop_layer(
        &mut self,
        renderer: &dyn ItemRenderer,
        composite: Option<cairo::Operator>,
    ) -> Result<(), RenderingError> {
        let state = self.states.current().clone();
        let plan = LayerPlan::new(
            state.clip_path.is_some(),
            state.mask.is_some(),
            self.render_mode,
        );

        let mut clip_mask = None;
        let mut mask_image = None;
        let mut layer_popped = false;

        for step in plan.steps(self.target.is_vector(), self.clip_mode, state.opacity, composite) {
            let res = self.run_layer_step(
                renderer,
                step,
                &state,
                &mut clip_mask,
                &mut mask_image,
            );

            if let Err(e) = res {
                if !layer_popped {
                    self.discard_layer();
                }
                return Err(e);
            }

            layer_popped |= step == LayerStep::PopGroupToSource;
        }

        Ok(())
    }

    fn run_layer_step(
        &mut self,
        renderer: &dyn ItemRenderer,
        step: LayerStep,
        state: &RenderState,
        clip_mask: &mut Option<cairo::ImageSurface>,
        mask_image: &mut Option<cairo::ImageSurface>,
    ) -> Result<(), RenderingError> {
        let cr = self.cr().clone();

        match step {
            LayerStep::UsePathClipping => self.clip_mode = ClipMode::Path,

            LayerStep::RenderClipMask { alpha } => {
                if let Some(clip) = state.clip_path {
                    *clip_mask = Some(self.render_clip_mask(renderer, clip, state, alpha)?);
                }
            }

            LayerStep::RenderMask => {
                if let Some(mask) = state.mask {
                    *mask_image = Some(self.render_mask(renderer, mask, state)?);
                }
            }

            LayerStep::ClipMaskOntoMask => {
                if let (Some(mask), Some(clip)) = (mask_image.as_ref(), clip_mask.as_ref()) {
                    clip_mask_onto(mask, clip)?;
                }
            }

            LayerStep::ConvertMaskToAlpha { opacity } => {
                if let Some(mask) = mask_image.as_mut() {
                    luminance_to_alpha_mask(mask, opacity)?;
                }
            }

            LayerStep::PopGroupToSource => cr.pop_group_to_source()?,

            LayerStep::SetOperator(op) => cr.set_operator(op),

            LayerStep::ClipNative => {
                if let Some(clip) = state.clip_path {
                    renderer.apply_clip_path(self, clip, state.bbox)?;
                }
            }

            LayerStep::Paint => cr.paint()?,

            LayerStep::PaintWithAlpha(alpha) => cr.paint_with_alpha(alpha)?,

            LayerStep::MaskWithClipMask => {
                if let Some(clip) = clip_mask.as_ref() {
                    self.mask_in_device_space(clip)?;
                }
            }

            LayerStep::MaskWithMaskImage => {
                if let Some(mask) = mask_image.as_ref() {
                    self.mask_in_device_space(mask)?;
                }
            }
        }

        Ok(())
    }

    /// Where the clip path and mask of `state` are drawn from.
    fn layer_transform(&self, state: &RenderState) -> Transform {
        if state.parent_has_userspace {
            Transform::multiply(&state.item_transform, &self.states.parent().transform)
        } else {
            state.transform
        }
    }

    fn render_clip_mask(
        &self,
        renderer: &dyn ItemRenderer,
        clip: NodeId,
        state: &RenderState,
        alpha: f64,
    ) -> Result<cairo::ImageSurface, RenderingError> {
        let mut clip_ctx = self.new_sub_context();
        clip_ctx.set_image_target(cairo::Format::A8)?;
        clip_ctx.set_clip_mode(ClipMode::Mask);
        clip_ctx.setup_surface(self.width, self.height)?;

        {
            let cr = clip_ctx.cr();
            cr.save()?;
            cr.set_operator(cairo::Operator::Clear);
            cr.paint()?;
            cr.restore()?;

            // the clip is painted white with the layer's alpha
            cr.set_source_rgba(1.0, 1.0, 1.0, alpha);
        }

        clip_ctx.push_state()?;
        clip_ctx.set_transform(&self.layer_transform(state));
        renderer.apply_clip_path(&mut clip_ctx, clip, state.bbox)?;
        clip_ctx.pop_state()?;

        clip_ctx.into_image_surface()
    }

    fn render_mask(
        &mut self,
        renderer: &dyn ItemRenderer,
        mask: NodeId,
        state: &RenderState,
    ) -> Result<cairo::ImageSurface, RenderingError> {
        let mut mask_ctx = self.new_sub_context();
        mask_ctx.set_image_target(cairo::Format::ARgb32)?;
        mask_ctx.setup_surface(self.width, self.height)?;

        {
            let cr = mask_ctx.cr();
            cr.set_source_rgb(0.0, 0.0, 0.0);
            cr.rectangle(0.0, 0.0, self.width, self.height);
            cr.fill()?;
        }

        self.set_render_mode(RenderMode::Normal);

        mask_ctx.set_transform(&self.layer_transform(state));
        renderer.apply_mask(&mut mask_ctx, mask, state.bbox)?;

        mask_ctx.into_image_surface()
    }

    /// Paints the source through `mask`, which covers the surface pixel for pixel.
    fn mask_in_device_space(&self, mask: &cairo::ImageSurface) -> Result<(), RenderingError> {
        let cr = self.cr();
        let matrix = cr.matrix();

        cr.identity_matrix();
        let res = cr.mask_surface(mask, 0.0, 0.0);
        cr.set_matrix(matrix);

        res.map_err(Into::into)
    }

    // Tags

    /// Starts a PDF link to `link`.
    pub fn tag_begin(&self, link: &str) {
        let attributes = format!("uri='{}'", escape_link_target(link));
        self.cr().tag_begin(CAIRO_TAG_LINK, &attributes);
    }

    pub fn tag_end(&self) {
        self.cr().tag_end(CAIRO_TAG_LINK);
    }

    /// Starts a named destination that PDF links can point to.
    pub fn dest_begin(&self, name: &str) {
        let attributes = format!("name='{}'", escape_link_target(name));
        self.cr().tag_begin(CAIRO_TAG_DEST, &attributes);
    }

    pub fn dest_end(&self) {
        self.cr().tag_end(CAIRO_TAG_DEST);
    }

    // Clipping

    /// Adds `path` to the current clip.
    pub fn add_clip_path(&self, path: &Path, fill_rule: FillRule) -> Result<(), RenderingError> {
        let cr = self.cr();
        cr.set_fill_rule(fill_rule.into());
        path.to_cairo(cr, false)
    }

    pub fn add_clipping_rect(&self, x: f64, y: f64, width: f64, height: f64) {
        let cr = self.cr();
        cr.new_path();
        cr.rectangle(x, y, width, height);
        cr.clip();
    }

    /// Intersects the clip with the path that was added so far.
    pub fn clip(&self) {
        self.cr().clip();
    }

    // Transforms

    /// Concatenates `t` onto the CTM and stores the result in the current frame.
    ///
    /// Degenerate transforms are ignored.
    pub fn transform(&mut self, t: &Transform) {
        if t.is_degenerate() {
            return;
        }

        self.cr().transform((*t).into());
        self.states.current_mut().transform = self.get_transform();
    }

    /// Concatenates `t` onto the CTM and stores `t` itself in the current frame.
    pub fn set_transform(&mut self, t: &Transform) {
        if t.is_degenerate() {
            return;
        }

        self.cr().transform((*t).into());
        self.states.current_mut().transform = *t;
    }

    /// Replaces the CTM with `t`.
    pub fn restore_transform(&mut self, t: &Transform) {
        self.cr().set_matrix((*t).into());
        self.states.current_mut().transform = *t;
    }

    pub fn set_item_transform(&mut self, t: &Transform) {
        self.states.current_mut().item_transform = *t;
    }

    /// The current CTM.
    pub fn get_transform(&self) -> Transform {
        Transform::from(self.cr().matrix())
    }

    /// The item transform of the current frame, composed with the parent's transform
    /// for items that position themselves.
    pub fn get_item_transform(&self) -> Transform {
        let state = self.states.current();

        if state.parent_has_userspace {
            Transform::multiply(&state.item_transform, &self.states.parent().transform)
        } else {
            state.item_transform
        }
    }

    pub fn get_parent_transform(&self) -> Transform {
        self.states.parent().transform
    }

    // Modes

    pub fn set_render_mode(&mut self, mode: RenderMode) {
        self.render_mode = mode;
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn set_clip_mode(&mut self, mode: ClipMode) {
        self.clip_mode = mode;
    }

    pub fn clip_mode(&self) -> ClipMode {
        self.clip_mode
    }

    // Drawing

    fn set_path(&self, path: &Path, is_square_linecap: bool) -> Result<(), RenderingError> {
        let cr = self.cr();
        cr.new_path();
        path.to_cairo(cr, is_square_linecap)
    }

    /// Fills and strokes `path` in the order given, or adds it to the clip.
    ///
    /// `bbox` is the item's bounding box for paint servers in `objectBoundingBox`
    /// units.  Returns whether the path was handled.
    pub fn render_path_vector(
        &mut self,
        renderer: &dyn ItemRenderer,
        path: &Path,
        style: &ComputedStyle,
        bbox: Option<&Rect>,
        order: PathPaintOrder,
    ) -> Result<bool, RenderingError> {
        self.prepare_render_graphic(renderer)?;

        let cr = self.cr().clone();

        if self.render_mode == RenderMode::Clip {
            match self.clip_mode {
                ClipMode::Path => self.add_clip_path(path, style.clip_rule)?,
                ClipMode::Mask => {
                    self.set_path(path, false)?;
                    cr.set_fill_rule(style.clip_rule.into());
                    if let Some(op) = style.mix_blend_mode.operator() {
                        cr.set_operator(op);
                    }
                    cr.fill()?;
                }
            }

            return Ok(true);
        }

        let paint = PathPaint::new(style, order);
        if paint.is_empty() {
            return Ok(true);
        }

        let need_layer = path_needs_layer(self.states.current(), style.mix_blend_mode);

        if need_layer {
            self.push_layer()?;
        } else {
            cr.save()?;
        }

        if paint.fill {
            cr.set_fill_rule(style.fill_rule.into());
        }

        self.set_path(path, style.stroke_linecap == StrokeLinecap::Square)?;

        if paint.fill
            && matches!(
                order,
                PathPaintOrder::StrokeOverFill | PathPaintOrder::FillOnly
            )
        {
            self.set_fill_style(renderer, style, bbox)?;

            if paint.stroke {
                cr.fill_preserve()?;
            } else {
                cr.fill()?;
            }
        }

        if paint.stroke {
            self.set_stroke_style(renderer, style, bbox)?;

            if !paint.fill || order == PathPaintOrder::StrokeOverFill {
                cr.stroke()?;
            } else {
                cr.stroke_preserve()?;
            }
        }

        if paint.fill && order == PathPaintOrder::FillOverStroke {
            self.set_fill_style(renderer, style, bbox)?;
            cr.fill()?;
        }

        if need_layer {
            self.pop_layer(renderer, style.mix_blend_mode.operator())?;
        } else {
            cr.restore()?;
        }

        Ok(true)
    }

    /// Paints an image whose pixel grid is mapped to user space by `image_transform`.
    pub fn render_image(
        &mut self,
        renderer: &dyn ItemRenderer,
        image: &cairo::ImageSurface,
        image_transform: &Transform,
        style: &ComputedStyle,
    ) -> Result<bool, RenderingError> {
        if self.render_mode == RenderMode::Clip {
            // images have no shape to clip with
            return Ok(true);
        }

        self.prepare_render_graphic(renderer)?;

        if let Err(e) = image.status() {
            svgpaint_log!(self.session, "not rendering broken image: {}", e);
            return Ok(false);
        }

        if image_transform.is_degenerate() {
            return Ok(true);
        }

        let cr = self.cr().clone();
        cr.save()?;

        cr.transform((*image_transform).into());
        cr.set_source_surface(image, 0.0, 0.0)?;

        if self.target.is_vector() {
            // keep the image from bleeding out of its rectangle when it is scaled
            cr.new_path();
            cr.rectangle(0.0, 0.0, f64::from(image.width()), f64::from(image.height()));
            cr.clip();
        }

        cr.source().set_filter(style.image_rendering.into());

        if let Some(op) = style.mix_blend_mode.operator() {
            cr.set_operator(op);
        }

        cr.paint()?;
        cr.restore()?;

        Ok(true)
    }

    fn font_face(&mut self, font: &pango::Font) -> Option<cairo::FontFace> {
        if let Some(face) = self.font_faces.get(font) {
            return Some(face.clone());
        }

        let face = font
            .dynamic_cast_ref::<pangocairo::Font>()?
            .scaled_font()?
            .font_face();

        self.font_faces.insert(font.clone(), face.clone());
        Some(face)
    }

    /// The glyphs that Cairo can draw; empty and unknown glyphs are skipped.
    fn cairo_glyphs(&self, glyphs: &[Glyph]) -> Vec<cairo::Glyph> {
        let drawable: Vec<cairo::Glyph> = glyphs
            .iter()
            .filter(|g| g.index != PANGO_GLYPH_EMPTY && g.index & PANGO_GLYPH_UNKNOWN_FLAG == 0)
            .map(|g| cairo::Glyph::new(g.index.into(), g.x, g.y))
            .collect();

        let skipped = glyphs.len() - drawable.len();
        if skipped > 0 {
            svgpaint_log!(
                self.session,
                "skipping {} of {} glyphs that are empty or missing from the font",
                skipped,
                glyphs.len()
            );
        }

        drawable
    }

    /// Draws one run of glyphs.
    ///
    /// When the fill goes over the stroke, glyph runs are drawn in two passes: first
    /// all strokes, then, with `second_pass`, all fills.  Returns whether the caller
    /// has to make the second pass.
    pub fn render_glyphtext(
        &mut self,
        renderer: &dyn ItemRenderer,
        run: &GlyphRun,
        style: &ComputedStyle,
        bbox: Option<&Rect>,
        second_pass: bool,
    ) -> Result<bool, RenderingError> {
        self.prepare_render_text();

        if self.is_omit_text_target() {
            return Ok(false);
        }

        let face = match self.font_face(&run.font) {
            Some(face) => face,
            None => {
                svgpaint_log!(self.session, "no Cairo font face for {}", run.font.describe());
                return Ok(false);
            }
        };

        let glyphs = self.cairo_glyphs(&run.glyphs);

        let cr = self.cr().clone();
        cr.save()?;
        cr.set_font_face(&face);
        cr.set_font_matrix(run.font_matrix.into());

        if self.render_mode == RenderMode::Clip {
            if self.clip_mode == ClipMode::Mask {
                cr.set_fill_rule(style.clip_rule.into());
                cr.show_glyphs(&glyphs)?;
            } else {
                cr.glyph_path(&glyphs);
            }

            cr.restore()?;
            return Ok(false);
        }

        let has_fill = style.fill.is_color() || style.fill.is_server();
        let has_stroke = style.stroke.is_color() || style.stroke.is_server();

        let passes = match GlyphPasses::new(has_fill, has_stroke, &style.paint_order, second_pass) {
            Some(p) => p,
            None => {
                cr.restore()?;
                return Ok(false);
            }
        };

        if passes.fill {
            self.set_fill_style(renderer, style, bbox)?;

            if self.options.text_to_path {
                cr.glyph_path(&glyphs);

                if passes.stroke {
                    cr.fill_preserve()?;
                } else {
                    cr.fill()?;
                }
            } else {
                cr.show_glyphs(&glyphs)?;
            }
        }

        if passes.stroke {
            if !(passes.fill && self.options.text_to_path) {
                cr.glyph_path(&glyphs);
            }

            self.set_stroke_style(renderer, style, bbox)?;
            cr.stroke()?;
        }

        cr.restore()?;

        Ok(passes.needs_second_pass)
    }

    // Paint

    fn set_paint_server(
        &self,
        renderer: &dyn ItemRenderer,
        server: NodeId,
        bbox: Option<&Rect>,
        alpha: f64,
    ) -> Result<(), RenderingError> {
        // leave the source alone when the server produces nothing
        if let Some(pattern) = paint_server::create_pattern(self, renderer, server, bbox, alpha)? {
            self.cr().set_source(&pattern)?;
        }

        Ok(())
    }

    /// Sets the source for filling with `style`.
    pub fn set_fill_style(
        &self,
        renderer: &dyn ItemRenderer,
        style: &ComputedStyle,
        bbox: Option<&Rect>,
    ) -> Result<(), RenderingError> {
        let alpha = self.states.current().merged_opacity(style.fill_opacity);

        match style.fill {
            Paint::Context => Ok(()),

            Paint::Server { node, .. } if renderer.document().paint_server_is_valid(node) => {
                self.set_paint_server(renderer, node, bbox, alpha)
            }

            Paint::Color(c) => {
                set_source_color_on_cairo(self.cr(), &c, alpha);
                Ok(())
            }

            // a server that is not valid paints black; only strokes use the fallback
            _ => {
                set_source_color_on_cairo(self.cr(), &BLACK, alpha);
                Ok(())
            }
        }
    }

    /// Sets the source and line properties for stroking with `style`.
    pub fn set_stroke_style(
        &self,
        renderer: &dyn ItemRenderer,
        style: &ComputedStyle,
        bbox: Option<&Rect>,
    ) -> Result<(), RenderingError> {
        let cr = self.cr();
        let alpha = self.states.current().merged_opacity(style.stroke_opacity);

        match style.stroke {
            Paint::Context => (),

            Paint::Server { node, .. } if renderer.document().paint_server_is_valid(node) => {
                self.set_paint_server(renderer, node, bbox, alpha)?;
            }

            ref paint => set_source_color_on_cairo(cr, &paint.fallback_color(), alpha),
        }

        if style.stroke_dasharray.is_valid() {
            cr.set_dash(&style.stroke_dasharray.0, style.stroke_dashoffset);
        } else {
            cr.set_dash(&[], 0.0);
        }

        if style.hairline {
            // one device unit wide, whatever the CTM
            let (dx, dy) = cr.device_to_user_distance(1.0, 0.0)?;
            cr.set_line_width(dx.hypot(dy));
        } else {
            cr.set_line_width(style.stroke_width);
        }

        cr.set_line_join(style.stroke_linejoin.into());
        cr.set_line_cap(style.stroke_linecap.into());
        cr.set_miter_limit(style.stroke_miterlimit.max(1.0));

        Ok(())
    }

    // Omitted text

    fn is_omit_text_target(&self) -> bool {
        self.options.omit_text && self.target == TargetKind::Pdf
    }

    fn prepare_render_text(&mut self) {
        if self.is_omit_text_target() && self.omit_text_state == OmitTextPageState::GraphicOnTop {
            self.omit_text_state = OmitTextPageState::NewPageOnGraphic;
        }
    }

    /// Moves graphics that follow text onto a new page when text is omitted.
    ///
    /// The state stack is unwound, the page shown, and the stack rebuilt on the new
    /// page, with layers pushed again where there were layers.
    fn prepare_render_graphic(&mut self, renderer: &dyn ItemRenderer) -> Result<(), RenderingError> {
        if self.is_omit_text_target()
            && self.omit_text_state == OmitTextPageState::NewPageOnGraphic
            && self.render_mode != RenderMode::Clip
        {
            self.omit_text_state = OmitTextPageState::GraphicOnTop;

            let saved: Vec<RenderState> = self.states.iter().cloned().collect();

            while self.states.len() > 1 {
                if self.states.current().need_layer {
                    self.pop_layer(renderer, None)?;
                }

                self.cr().restore()?;
                self.states.pop();
            }

            self.cr().show_page()?;

            for frame in saved.into_iter().skip(1) {
                self.cr().save()?;

                let need_layer = frame.need_layer;
                let transform = frame.transform;
                *self.states.push() = frame;

                if need_layer {
                    self.push_layer()?;
                }

                self.restore_transform(&transform);
            }
        }

        self.omit_text_state = OmitTextPageState::GraphicOnTop;
        Ok(())
    }
}

/// Multiplies the rendered mask by the rasterized clip.
fn clip_mask_onto(mask: &cairo::ImageSurface, clip: &cairo::ImageSurface) -> Result<(), RenderingError> {
    let cr = cairo::Context::new(mask)?;
    cr.set_operator(cairo::Operator::DestIn);
    cr.set_source_surface(clip, 0.0, 0.0)?;
    cr.paint()?;
    Ok(())
}

fn close_output_stream(surface: &cairo::Surface) -> Result<(), RenderingError> {
    let stream = surface.finish_output_stream()?;

    match stream.downcast::<OutputStream>() {
        Ok(stream) => (*stream).close(),
        Err(_) => Ok(()),
    }
}

/// escape quotes and backslashes with backslash
fn escape_link_target(value: &str) -> Cow<'_, str> {
    static REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"['\\]").unwrap());

    REGEX.replace_all(value, |caps: &Captures<'_>| {
        match caps.get(0).unwrap().as_str() {
            "'" => "\\'".to_owned(),
            "\\" => "\\\\".to_owned(),
            _ => unreachable!(),
        }
    })
}
