//! Computed style properties that the render context consults.
//!
//! A scene writes styles as CSS-like key/value pairs ([`StyleSpec`]); the loader
//! cascades them from parent to child and produces a [`ComputedStyle`] for every
//! node.  Paint server references are resolved to [`NodeId`]s at that time.

use cssparser::{Parser, Token};
use serde::Deserialize;

use crate::color::{BLACK, RGBA};
use crate::document::NodeId;
use crate::error::*;
use crate::parse_identifiers;
use crate::parsers::{optional_comma, parse_value, Parse};

/// A fill or stroke paint, with server references already resolved.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Paint {
    None,
    Color(RGBA),
    /// `context-fill` / `context-stroke`; only meaningful inside markers and `<use>`.
    Context,
    Server {
        node: NodeId,
        fallback: Option<RGBA>,
    },
}

impl Paint {
    pub fn is_none(&self) -> bool {
        matches!(self, Paint::None)
    }

    pub fn is_context(&self) -> bool {
        matches!(self, Paint::Context)
    }

    pub fn is_color(&self) -> bool {
        matches!(self, Paint::Color(_))
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Paint::Server { .. })
    }

    pub fn server(&self) -> Option<NodeId> {
        match *self {
            Paint::Server { node, .. } => Some(node),
            _ => None,
        }
    }

    /// The color used when this paint cannot be rendered as a server.
    pub fn fallback_color(&self) -> RGBA {
        match *self {
            Paint::Color(c) => c,
            Paint::Server {
                fallback: Some(c), ..
            } => c,
            _ => BLACK,
        }
    }
}

/// A paint as written in a scene, before `url(#id)` references are resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum PaintSpec {
    None,
    Color(RGBA),
    Context,
    Url { id: String, fallback: Option<RGBA> },
}

impl Parse for PaintSpec {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<PaintSpec, ParseError<'i>> {
        if parser
            .try_parse(|p| p.expect_ident_matching("none"))
            .is_ok()
        {
            return Ok(PaintSpec::None);
        }

        if parser
            .try_parse(|p| {
                let loc = p.current_source_location();
                match p.next()? {
                    Token::Ident(ref cow)
                        if cow.eq_ignore_ascii_case("context-fill")
                            || cow.eq_ignore_ascii_case("context-stroke") =>
                    {
                        Ok(())
                    }
                    tok => Err(loc.new_basic_unexpected_token_error(tok.clone())),
                }
            })
            .is_ok()
        {
            return Ok(PaintSpec::Context);
        }

        if let Ok(url) = parser.try_parse(|p| p.expect_url().map(|u| u.to_string())) {
            let loc = parser.current_source_location();
            let id = url.strip_prefix('#').ok_or_else(|| {
                loc.new_custom_error(ValueErrorKind::value_error(
                    "only fragment references like url(#id) are supported",
                ))
            })?;

            let fallback = if parser.is_exhausted() {
                None
            } else {
                Some(RGBA::parse(parser)?)
            };

            return Ok(PaintSpec::Url {
                id: id.to_string(),
                fallback,
            });
        }

        Ok(PaintSpec::Color(RGBA::parse(parser)?))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum FillRule {
    #[default]
    NonZero,
    EvenOdd,
}

impl Parse for FillRule {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i>> {
        Ok(parse_identifiers!(
            parser,
            "nonzero" => FillRule::NonZero,
            "evenodd" => FillRule::EvenOdd,
        )?)
    }
}

impl From<FillRule> for cairo::FillRule {
    fn from(f: FillRule) -> cairo::FillRule {
        match f {
            FillRule::NonZero => cairo::FillRule::Winding,
            FillRule::EvenOdd => cairo::FillRule::EvenOdd,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StrokeLinejoin {
    #[default]
    Miter,
    Round,
    Bevel,
}

impl Parse for StrokeLinejoin {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i>> {
        Ok(parse_identifiers!(
            parser,
            "miter" => StrokeLinejoin::Miter,
            "round" => StrokeLinejoin::Round,
            "bevel" => StrokeLinejoin::Bevel,
        )?)
    }
}

impl From<StrokeLinejoin> for cairo::LineJoin {
    fn from(j: StrokeLinejoin) -> cairo::LineJoin {
        match j {
            StrokeLinejoin::Miter => cairo::LineJoin::Miter,
            StrokeLinejoin::Round => cairo::LineJoin::Round,
            StrokeLinejoin::Bevel => cairo::LineJoin::Bevel,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum StrokeLinecap {
    #[default]
    Butt,
    Round,
    Square,
}

impl Parse for StrokeLinecap {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i>> {
        Ok(parse_identifiers!(
            parser,
            "butt" => StrokeLinecap::Butt,
            "round" => StrokeLinecap::Round,
            "square" => StrokeLinecap::Square,
        )?)
    }
}

impl From<StrokeLinecap> for cairo::LineCap {
    fn from(j: StrokeLinecap) -> cairo::LineCap {
        match j {
            StrokeLinecap::Butt => cairo::LineCap::Butt,
            StrokeLinecap::Round => cairo::LineCap::Round,
            StrokeLinecap::Square => cairo::LineCap::Square,
        }
    }
}

/// One of the three operations for the `paint-order` property; see [`PaintOrder`].
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PaintTarget {
    Fill,
    Stroke,
    Markers,
}

/// `paint-order` property.
///
/// The `targets` field specifies the order in which graphic elements should be filled/stroked.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct PaintOrder {
    pub targets: [PaintTarget; 3],
}

impl Default for PaintOrder {
    fn default() -> Self {
        PaintOrder {
            targets: [PaintTarget::Fill, PaintTarget::Stroke, PaintTarget::Markers],
        }
    }
}

impl PaintOrder {
    /// Position of `target` in the painting sequence.
    pub fn get_order(&self, target: PaintTarget) -> usize {
        self.targets
            .iter()
            .position(|&t| t == target)
            .unwrap_or(self.targets.len())
    }

    /// The fill/stroke sequence to use for a path.
    pub fn path_order(&self) -> PathPaintOrder {
        if self.get_order(PaintTarget::Stroke) > self.get_order(PaintTarget::Fill) {
            PathPaintOrder::StrokeOverFill
        } else {
            PathPaintOrder::FillOverStroke
        }
    }
}

impl Parse for PaintOrder {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<PaintOrder, ParseError<'i>> {
        if parser
            .try_parse(|p| p.expect_ident_matching("normal"))
            .is_ok()
        {
            return Ok(PaintOrder::default());
        }

        let mut targets = Vec::with_capacity(3);

        while !parser.is_exhausted() {
            let loc = parser.current_source_location();
            let token = parser.next()?;

            let value = match token {
                Token::Ident(ref cow)
                    if cow.eq_ignore_ascii_case("fill") && !targets.contains(&PaintTarget::Fill) =>
                {
                    PaintTarget::Fill
                }
                Token::Ident(ref cow)
                    if cow.eq_ignore_ascii_case("stroke")
                        && !targets.contains(&PaintTarget::Stroke) =>
                {
                    PaintTarget::Stroke
                }
                Token::Ident(ref cow)
                    if cow.eq_ignore_ascii_case("markers")
                        && !targets.contains(&PaintTarget::Markers) =>
                {
                    PaintTarget::Markers
                }
                _ => return Err(loc.new_basic_unexpected_token_error(token.clone()).into()),
            };

            targets.push(value);
        }

        // unspecified targets follow in the default order
        for target in [PaintTarget::Fill, PaintTarget::Stroke, PaintTarget::Markers] {
            if !targets.contains(&target) {
                targets.push(target);
            }
        }

        Ok(PaintOrder {
            targets: [targets[0], targets[1], targets[2]],
        })
    }
}

/// How [`RenderContext::render_path_vector`] sequences fill and stroke.
///
/// [`RenderContext::render_path_vector`]: crate::render_ctx::RenderContext::render_path_vector
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PathPaintOrder {
    StrokeOverFill,
    FillOverStroke,
    FillOnly,
    StrokeOnly,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum MixBlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl MixBlendMode {
    /// The operator to composite with, or `None` for normal blending.
    pub fn operator(self) -> Option<cairo::Operator> {
        match self {
            MixBlendMode::Normal => None,
            m => Some(cairo::Operator::from(m)),
        }
    }
}

impl Parse for MixBlendMode {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i>> {
        Ok(parse_identifiers!(
            parser,
            "normal" => MixBlendMode::Normal,
            "multiply" => MixBlendMode::Multiply,
            "screen" => MixBlendMode::Screen,
            "overlay" => MixBlendMode::Overlay,
            "darken" => MixBlendMode::Darken,
            "lighten" => MixBlendMode::Lighten,
            "color-dodge" => MixBlendMode::ColorDodge,
            "color-burn" => MixBlendMode::ColorBurn,
            "hard-light" => MixBlendMode::HardLight,
            "soft-light" => MixBlendMode::SoftLight,
            "difference" => MixBlendMode::Difference,
            "exclusion" => MixBlendMode::Exclusion,
            "hue" => MixBlendMode::Hue,
            "saturation" => MixBlendMode::Saturation,
            "color" => MixBlendMode::Color,
            "luminosity" => MixBlendMode::Luminosity,
        )?)
    }
}

impl From<MixBlendMode> for cairo::Operator {
    fn from(m: MixBlendMode) -> cairo::Operator {
        use cairo::Operator;

        match m {
            MixBlendMode::Normal => Operator::Over,
            MixBlendMode::Multiply => Operator::Multiply,
            MixBlendMode::Screen => Operator::Screen,
            MixBlendMode::Overlay => Operator::Overlay,
            MixBlendMode::Darken => Operator::Darken,
            MixBlendMode::Lighten => Operator::Lighten,
            MixBlendMode::ColorDodge => Operator::ColorDodge,
            MixBlendMode::ColorBurn => Operator::ColorBurn,
            MixBlendMode::HardLight => Operator::HardLight,
            MixBlendMode::SoftLight => Operator::SoftLight,
            MixBlendMode::Difference => Operator::Difference,
            MixBlendMode::Exclusion => Operator::Exclusion,
            MixBlendMode::Hue => Operator::HslHue,
            MixBlendMode::Saturation => Operator::HslSaturation,
            MixBlendMode::Color => Operator::HslColor,
            MixBlendMode::Luminosity => Operator::HslLuminosity,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ImageRendering {
    #[default]
    Auto,
    OptimizeQuality,
    OptimizeSpeed,
    Pixelated,
    CrispEdges,
}

impl Parse for ImageRendering {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i>> {
        Ok(parse_identifiers!(
            parser,
            "auto" => ImageRendering::Auto,
            "smooth" => ImageRendering::OptimizeQuality,
            "optimizeQuality" => ImageRendering::OptimizeQuality,
            "high-quality" => ImageRendering::OptimizeQuality,
            "optimizeSpeed" => ImageRendering::OptimizeSpeed,
            "pixelated" => ImageRendering::Pixelated,
            "crisp-edges" => ImageRendering::CrispEdges,
        )?)
    }
}

impl From<ImageRendering> for cairo::Filter {
    fn from(r: ImageRendering) -> cairo::Filter {
        match r {
            // crisp-edges has no implementation of its own, but it must not smooth
            ImageRendering::OptimizeSpeed
            | ImageRendering::Pixelated
            | ImageRendering::CrispEdges => cairo::Filter::Nearest,

            ImageRendering::OptimizeQuality | ImageRendering::Auto => cairo::Filter::Best,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Overflow {
    Visible,
    Hidden,
    Scroll,
    Auto,
}

impl Parse for Overflow {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i>> {
        Ok(parse_identifiers!(
            parser,
            "visible" => Overflow::Visible,
            "hidden" => Overflow::Hidden,
            "scroll" => Overflow::Scroll,
            "auto" => Overflow::Auto,
        )?)
    }
}

/// `stroke-dasharray`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dasharray(pub Vec<f64>);

impl Dasharray {
    /// A dash array is usable when it has no negative lengths and does not sum to zero.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|&d| d >= 0.0) && self.0.iter().sum::<f64>() > 0.0
    }
}

impl Parse for Dasharray {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Self, ParseError<'i>> {
        if parser
            .try_parse(|p| p.expect_ident_matching("none"))
            .is_ok()
        {
            return Ok(Dasharray::default());
        }

        let mut dashes = vec![f64::parse(parser)?];

        while !parser.is_exhausted() {
            optional_comma(parser);
            dashes.push(f64::parse(parser)?);
        }

        Ok(Dasharray(dashes))
    }
}

/// The style properties of one node, after cascading.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    pub fill: Paint,
    pub stroke: Paint,
    pub fill_opacity: f64,
    pub stroke_opacity: f64,
    pub opacity: f64,
    pub fill_rule: FillRule,
    pub clip_rule: FillRule,
    pub stroke_width: f64,
    pub hairline: bool,
    pub stroke_linejoin: StrokeLinejoin,
    pub stroke_linecap: StrokeLinecap,
    pub stroke_miterlimit: f64,
    pub stroke_dasharray: Dasharray,
    pub stroke_dashoffset: f64,
    pub paint_order: PaintOrder,
    pub mix_blend_mode: MixBlendMode,
    pub image_rendering: ImageRendering,
    /// `None` when the property was not specified.
    pub overflow: Option<Overflow>,
    pub filter: bool,
    /// A pango font description, e.g. `"Sans Bold 12"`.
    pub font: String,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        ComputedStyle {
            fill: Paint::Color(BLACK),
            stroke: Paint::None,
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            opacity: 1.0,
            fill_rule: FillRule::NonZero,
            clip_rule: FillRule::NonZero,
            stroke_width: 1.0,
            hairline: false,
            stroke_linejoin: StrokeLinejoin::Miter,
            stroke_linecap: StrokeLinecap::Butt,
            stroke_miterlimit: 4.0,
            stroke_dasharray: Dasharray::default(),
            stroke_dashoffset: 0.0,
            paint_order: PaintOrder::default(),
            mix_blend_mode: MixBlendMode::Normal,
            image_rendering: ImageRendering::Auto,
            overflow: None,
            filter: false,
            font: "Sans 16".to_string(),
        }
    }
}

impl ComputedStyle {
    /// Starts a child's style: inherited properties are copied, the rest reset.
    pub fn inherit(&self) -> ComputedStyle {
        ComputedStyle {
            opacity: 1.0,
            mix_blend_mode: MixBlendMode::Normal,
            overflow: None,
            filter: false,
            ..self.clone()
        }
    }
}

/// Style declarations as they appear in a scene file.
///
/// Every field is optional; missing ones are inherited or take their initial value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StyleSpec {
    pub fill: Option<String>,
    pub stroke: Option<String>,
    pub fill_opacity: Option<f64>,
    pub stroke_opacity: Option<f64>,
    pub opacity: Option<f64>,
    pub fill_rule: Option<String>,
    pub clip_rule: Option<String>,
    pub stroke_width: Option<f64>,
    /// `"hairline"` draws strokes one device pixel wide.
    pub stroke_extensions: Option<String>,
    pub stroke_linejoin: Option<String>,
    pub stroke_linecap: Option<String>,
    pub stroke_miterlimit: Option<f64>,
    pub stroke_dasharray: Option<String>,
    pub stroke_dashoffset: Option<f64>,
    pub paint_order: Option<String>,
    pub mix_blend_mode: Option<String>,
    pub image_rendering: Option<String>,
    pub overflow: Option<String>,
    pub filter: Option<String>,
    pub font: Option<String>,
}

fn unit_interval(v: f64) -> f64 {
    v.clamp(0.0, 1.0)
}

fn parse_attr<T: Parse>(attr: &str, value: &Option<String>) -> Result<Option<T>, LoadingError> {
    value
        .as_deref()
        .map(|s| parse_value::<T>(s))
        .transpose()
        .attribute(attr)
}

impl StyleSpec {
    /// Cascades these declarations onto `parent`.
    ///
    /// `resolve` turns a `url(#id)` paint into a paint server node.
    pub fn compute<F>(&self, parent: &ComputedStyle, resolve: F) -> Result<ComputedStyle, LoadingError>
    where
        F: Fn(&str) -> Result<NodeId, LoadingError>,
    {
        let mut s = parent.inherit();

        let resolve_paint = |spec: PaintSpec| -> Result<Paint, LoadingError> {
            Ok(match spec {
                PaintSpec::None => Paint::None,
                PaintSpec::Color(c) => Paint::Color(c),
                PaintSpec::Context => Paint::Context,
                PaintSpec::Url { id, fallback } => Paint::Server {
                    node: resolve(&id)?,
                    fallback,
                },
            })
        };

        if let Some(p) = parse_attr::<PaintSpec>("fill", &self.fill)? {
            s.fill = resolve_paint(p)?;
        }
        if let Some(p) = parse_attr::<PaintSpec>("stroke", &self.stroke)? {
            s.stroke = resolve_paint(p)?;
        }

        if let Some(v) = self.fill_opacity {
            s.fill_opacity = unit_interval(v);
        }
        if let Some(v) = self.stroke_opacity {
            s.stroke_opacity = unit_interval(v);
        }
        if let Some(v) = self.opacity {
            s.opacity = unit_interval(v);
        }

        if let Some(v) = parse_attr("fill-rule", &self.fill_rule)? {
            s.fill_rule = v;
        }
        if let Some(v) = parse_attr("clip-rule", &self.clip_rule)? {
            s.clip_rule = v;
        }

        if let Some(w) = self.stroke_width {
            if w < 0.0 {
                return Err(LoadingError::BadAttribute {
                    attr: "stroke-width".to_string(),
                    err: ValueErrorKind::value_error("must not be negative"),
                });
            }
            s.stroke_width = w;
        }
        if let Some(ref ext) = self.stroke_extensions {
            s.hairline = ext.trim() == "hairline";
        }
        if let Some(v) = parse_attr("stroke-linejoin", &self.stroke_linejoin)? {
            s.stroke_linejoin = v;
        }
        if let Some(v) = parse_attr("stroke-linecap", &self.stroke_linecap)? {
            s.stroke_linecap = v;
        }
        if let Some(v) = self.stroke_miterlimit {
            s.stroke_miterlimit = v;
        }
        if let Some(v) = parse_attr("stroke-dasharray", &self.stroke_dasharray)? {
            s.stroke_dasharray = v;
        }
        if let Some(v) = self.stroke_dashoffset {
            s.stroke_dashoffset = v;
        }
        if let Some(v) = parse_attr("paint-order", &self.paint_order)? {
            s.paint_order = v;
        }
        if let Some(v) = parse_attr("mix-blend-mode", &self.mix_blend_mode)? {
            s.mix_blend_mode = v;
        }
        if let Some(v) = parse_attr("image-rendering", &self.image_rendering)? {
            s.image_rendering = v;
        }
        if let Some(v) = parse_attr("overflow", &self.overflow)? {
            s.overflow = Some(v);
        }
        if let Some(ref f) = self.filter {
            s.filter = f.trim() != "none";
        }
        if let Some(ref f) = self.font {
            s.font = f.clone();
        }

        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_servers(id: &str) -> Result<NodeId, LoadingError> {
        Err(LoadingError::IdNotFound(id.to_string()))
    }

    #[test]
    fn parses_paints() {
        assert_eq!(PaintSpec::parse_str("none").unwrap(), PaintSpec::None);
        assert_eq!(PaintSpec::parse_str("context-stroke").unwrap(), PaintSpec::Context);
        assert_eq!(
            PaintSpec::parse_str("#00ff00").unwrap(),
            PaintSpec::Color(RGBA::new(0, 255, 0, 255))
        );
        assert_eq!(
            PaintSpec::parse_str("url(#grad) red").unwrap(),
            PaintSpec::Url {
                id: "grad".to_string(),
                fallback: Some(RGBA::new(255, 0, 0, 255)),
            }
        );
        assert!(PaintSpec::parse_str("url(other.svg#grad)").is_err());
    }

    #[test]
    fn parses_paint_order() {
        assert_eq!(PaintOrder::parse_str("normal").unwrap(), PaintOrder::default());
        assert_eq!(
            PaintOrder::parse_str("stroke").unwrap().targets,
            [PaintTarget::Stroke, PaintTarget::Fill, PaintTarget::Markers]
        );
        assert_eq!(
            PaintOrder::parse_str("stroke").unwrap().path_order(),
            PathPaintOrder::FillOverStroke
        );
        assert_eq!(PaintOrder::default().path_order(), PathPaintOrder::StrokeOverFill);
        assert!(PaintOrder::parse_str("stroke stroke").is_err());
    }

    #[test]
    fn dasharray_validity() {
        assert!(Dasharray::parse_str("5, 3").unwrap().is_valid());
        assert!(!Dasharray::parse_str("0 0").unwrap().is_valid());
        assert!(!Dasharray::parse_str("5 -1").unwrap().is_valid());
        assert!(!Dasharray::parse_str("none").unwrap().is_valid());
    }

    #[test]
    fn blend_mode_operator() {
        assert_eq!(MixBlendMode::Normal.operator(), None);
        assert_eq!(
            MixBlendMode::Multiply.operator(),
            Some(cairo::Operator::Multiply)
        );
    }

    #[test]
    fn image_rendering_filters() {
        assert_eq!(cairo::Filter::from(ImageRendering::Pixelated), cairo::Filter::Nearest);
        assert_eq!(cairo::Filter::from(ImageRendering::CrispEdges), cairo::Filter::Nearest);
        assert_eq!(cairo::Filter::from(ImageRendering::Auto), cairo::Filter::Best);
    }

    #[test]
    fn cascades_inherited_properties() {
        let parent = StyleSpec {
            fill: Some("blue".to_string()),
            opacity: Some(0.5),
            stroke_width: Some(3.0),
            overflow: Some("hidden".to_string()),
            ..Default::default()
        }
        .compute(&ComputedStyle::default(), no_servers)
        .unwrap();

        assert_eq!(parent.opacity, 0.5);
        assert_eq!(parent.overflow, Some(Overflow::Hidden));

        let child = StyleSpec::default().compute(&parent, no_servers).unwrap();
        assert_eq!(child.fill, Paint::Color(RGBA::new(0, 0, 255, 255)));
        assert_eq!(child.stroke_width, 3.0);
        assert_eq!(child.opacity, 1.0);
        assert_eq!(child.overflow, None);
    }

    #[test]
    fn unresolved_server_is_an_error() {
        let spec = StyleSpec {
            fill: Some("url(#nope)".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            spec.compute(&ComputedStyle::default(), no_servers),
            Err(LoadingError::IdNotFound(_))
        ));
    }

    #[test]
    fn bad_values_name_the_property() {
        let spec = StyleSpec {
            fill_rule: Some("sideways".to_string()),
            ..Default::default()
        };
        match spec.compute(&ComputedStyle::default(), no_servers) {
            Err(LoadingError::BadAttribute { attr, .. }) => assert_eq!(attr, "fill-rule"),
            r => panic!("unexpected {r:?}"),
        }
    }
}
