//! Loading of JSON scene files into a [`Document`].
//!
//! A scene is a tree of nodes:
//!
//! ```json
//! {
//!   "width": 100, "height": 100,
//!   "title": "Example",
//!   "root": {
//!     "type": "group",
//!     "children": [
//!       { "type": "rect", "x": 10, "y": 10, "width": 80, "height": 80,
//!         "style": { "fill": "url(#grad)", "stroke": "black" } },
//!       { "type": "linear-gradient", "id": "grad",
//!         "stops": [ { "offset": 0, "color": "red" }, { "offset": 1, "color": "blue" } ] }
//!     ]
//!   }
//! }
//! ```
//!
//! Loading happens in two passes: the first flattens the tree into the arena and
//! registers ids, the second resolves styles and references, so that references may
//! point forward in the document.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path as FsPath, PathBuf};

use serde::Deserialize;

use crate::color::RGBA;
use crate::document::*;
use crate::error::*;
use crate::parsers::parse_value;
use crate::path::{make_ellipse, make_rect, Path};
use crate::rect::Rect;
use crate::session::Session;
use crate::style::{ComputedStyle, StyleSpec};
use crate::svgpaint_log;
use crate::transform::Transform;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct SceneSpec {
    width: f64,
    height: f64,
    title: Option<String>,
    author: Option<String>,
    subject: Option<String>,
    keywords: Option<String>,
    copyright: Option<String>,
    root: NodeSpec,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NodeSpec {
    id: Option<String>,
    #[serde(default)]
    transform: Transform,
    #[serde(default)]
    style: StyleSpec,
    clip_path: Option<String>,
    mask: Option<String>,
    #[serde(default)]
    children: Vec<NodeSpec>,
    #[serde(flatten)]
    element: ElementSpec,
}

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
enum UnitsSpec {
    UserSpaceOnUse,
    ObjectBoundingBox,
}

impl From<UnitsSpec> for CoordUnits {
    fn from(u: UnitsSpec) -> CoordUnits {
        match u {
            UnitsSpec::UserSpaceOnUse => CoordUnits::UserSpaceOnUse,
            UnitsSpec::ObjectBoundingBox => CoordUnits::ObjectBoundingBox,
        }
    }
}

fn units_or(u: Option<UnitsSpec>, default: CoordUnits) -> CoordUnits {
    u.map(CoordUnits::from).unwrap_or(default)
}

#[derive(Debug, Copy, Clone, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SpreadSpec {
    Pad,
    Reflect,
    Repeat,
}

impl From<SpreadSpec> for SpreadMethod {
    fn from(s: SpreadSpec) -> SpreadMethod {
        match s {
            SpreadSpec::Pad => SpreadMethod::Pad,
            SpreadSpec::Reflect => SpreadMethod::Reflect,
            SpreadSpec::Repeat => SpreadMethod::Repeat,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StopSpec {
    offset: f64,
    color: String,
    #[serde(default = "one")]
    opacity: f64,
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ElementSpec {
    Group,
    Path {
        d: String,
    },
    #[serde(rename_all = "kebab-case")]
    Rect {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        width: f64,
        height: f64,
        rx: Option<f64>,
        ry: Option<f64>,
    },
    Circle {
        #[serde(default)]
        cx: f64,
        #[serde(default)]
        cy: f64,
        r: f64,
    },
    Ellipse {
        #[serde(default)]
        cx: f64,
        #[serde(default)]
        cy: f64,
        rx: f64,
        ry: f64,
    },
    Image {
        href: String,
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        width: Option<f64>,
        height: Option<f64>,
    },
    Text {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ClipPath {
        clip_path_units: Option<UnitsSpec>,
    },
    #[serde(rename_all = "camelCase")]
    Mask {
        mask_units: Option<UnitsSpec>,
        mask_content_units: Option<UnitsSpec>,
        x: Option<f64>,
        y: Option<f64>,
        width: Option<f64>,
        height: Option<f64>,
    },
    #[serde(rename_all = "camelCase")]
    Pattern {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        width: f64,
        #[serde(default)]
        height: f64,
        pattern_units: Option<UnitsSpec>,
        pattern_content_units: Option<UnitsSpec>,
        view_box: Option<Rect>,
        #[serde(default)]
        pattern_transform: Transform,
        href: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Hatch {
        #[serde(default)]
        x: f64,
        #[serde(default)]
        y: f64,
        #[serde(default)]
        pitch: f64,
        #[serde(default)]
        rotate: f64,
        hatch_units: Option<UnitsSpec>,
        hatch_content_units: Option<UnitsSpec>,
    },
    #[serde(rename = "hatchpath")]
    HatchPath {
        d: Option<String>,
        #[serde(default)]
        offset: f64,
    },
    #[serde(rename_all = "camelCase")]
    LinearGradient {
        x1: Option<f64>,
        y1: Option<f64>,
        x2: Option<f64>,
        y2: Option<f64>,
        gradient_units: Option<UnitsSpec>,
        spread_method: Option<SpreadSpec>,
        #[serde(default)]
        gradient_transform: Transform,
        #[serde(default)]
        stops: Vec<StopSpec>,
        href: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    RadialGradient {
        cx: Option<f64>,
        cy: Option<f64>,
        r: Option<f64>,
        fx: Option<f64>,
        fy: Option<f64>,
        fr: Option<f64>,
        gradient_units: Option<UnitsSpec>,
        spread_method: Option<SpreadSpec>,
        #[serde(default)]
        gradient_transform: Transform,
        #[serde(default)]
        stops: Vec<StopSpec>,
        href: Option<String>,
    },
}

/// Builder for [`Document`]s.
pub struct Loader {
    session: Session,
    base_dir: Option<PathBuf>,
}

impl Default for Loader {
    fn default() -> Self {
        Loader::new()
    }
}

impl Loader {
    pub fn new() -> Self {
        Loader {
            session: Session::default(),
            base_dir: None,
        }
    }

    pub fn with_session(self, session: Session) -> Self {
        Loader { session, ..self }
    }

    /// Directory against which relative image references are resolved.
    pub fn with_base_dir<P: AsRef<FsPath>>(self, dir: P) -> Self {
        Loader {
            base_dir: Some(dir.as_ref().to_path_buf()),
            ..self
        }
    }

    pub fn read_path<P: AsRef<FsPath>>(self, path: P) -> Result<Document, LoadingError> {
        let path = path.as_ref();
        let file = File::open(path)?;

        let loader = if self.base_dir.is_none() {
            match path.parent() {
                Some(dir) => self.with_base_dir(dir),
                None => self,
            }
        } else {
            self
        };

        loader.read(file)
    }

    pub fn read<R: Read>(self, reader: R) -> Result<Document, LoadingError> {
        let scene: SceneSpec = serde_json::from_reader(reader)?;
        self.build(scene)
    }

    pub fn read_str(self, s: &str) -> Result<Document, LoadingError> {
        let scene: SceneSpec = serde_json::from_str(s)?;
        self.build(scene)
    }

    fn build(self, scene: SceneSpec) -> Result<Document, LoadingError> {
        let mut flat = Vec::new();
        let mut ids = HashMap::new();

        flatten(scene.root, None, &mut flat, &mut ids)?;

        let resolve = |id: &str| -> Result<NodeId, LoadingError> {
            ids.get(id)
                .copied()
                .ok_or_else(|| LoadingError::IdNotFound(id.to_string()))
        };

        let mut nodes: Vec<Node> = Vec::with_capacity(flat.len());

        // Parents always precede their children, so parent styles are ready.
        for f in flat.iter() {
            let parent_style = match f.parent {
                Some(p) => nodes[p.0].style.clone(),
                None => ComputedStyle::default(),
            };

            let style = f.spec.style.compute(&parent_style, |id| {
                let node = resolve(id)?;
                if flat[node.0].spec.element.is_paint_server() {
                    Ok(node)
                } else {
                    Err(LoadingError::InvalidLinkType(id.to_string()))
                }
            })?;

            let clip_path = reference(&f.spec.clip_path, "clip-path", &resolve)?;
            if let Some(c) = clip_path {
                if !matches!(flat[c.0].spec.element, ElementSpec::ClipPath { .. }) {
                    return Err(LoadingError::InvalidLinkType(flat[c.0].id_for_errors()));
                }
            }

            let mask = reference(&f.spec.mask, "mask", &resolve)?;
            if let Some(m) = mask {
                if !matches!(flat[m.0].spec.element, ElementSpec::Mask { .. }) {
                    return Err(LoadingError::InvalidLinkType(flat[m.0].id_for_errors()));
                }
            }

            let element = self.build_element(&f.spec.element, &resolve, &flat)?;

            // A hatch's `transform` is the hatch transform, not a node transform.
            let (element, transform) = match element {
                Element::Hatch(h) => (
                    Element::Hatch(Hatch {
                        transform: f.spec.transform,
                        ..h
                    }),
                    Transform::identity(),
                ),
                e => (e, f.spec.transform),
            };

            nodes.push(Node {
                id: f.spec.id.clone(),
                parent: f.parent,
                children: f.children.clone(),
                transform,
                style,
                clip_path,
                mask,
                element,
            });
        }

        svgpaint_log!(self.session, "(loaded scene with {} nodes)", nodes.len());

        Ok(Document {
            nodes,
            ids,
            root: NodeId(0),
            width: scene.width,
            height: scene.height,
            metadata: Metadata {
                title: scene.title,
                author: scene.author,
                subject: scene.subject,
                keywords: scene.keywords,
                copyright: scene.copyright,
                ..Default::default()
            },
        })
    }

    fn build_element<F>(
        &self,
        spec: &ElementSpec,
        resolve: &F,
        flat: &[FlatNode],
    ) -> Result<Element, LoadingError>
    where
        F: Fn(&str) -> Result<NodeId, LoadingError>,
    {
        let element = match *spec {
            ElementSpec::Group => Element::Group,

            ElementSpec::Path { ref d } => Element::Path(Path::parse(d).map_err(|e| {
                LoadingError::BadAttribute {
                    attr: "d".to_string(),
                    err: ValueErrorKind::parse_error(&e.to_string()),
                }
            })?),

            ElementSpec::Rect {
                x,
                y,
                width,
                height,
                rx,
                ry,
            } => {
                // a missing radius takes the value of the other one
                let (rx, ry) = match (rx, ry) {
                    (None, None) => (0.0, 0.0),
                    (Some(r), None) | (None, Some(r)) => (r, r),
                    (Some(rx), Some(ry)) => (rx, ry),
                };
                Element::Path(make_rect(x, y, width, height, rx, ry))
            }

            ElementSpec::Circle { cx, cy, r } => Element::Path(make_ellipse(cx, cy, r, r)),

            ElementSpec::Ellipse { cx, cy, rx, ry } => {
                Element::Path(make_ellipse(cx, cy, rx, ry))
            }

            ElementSpec::Image {
                ref href,
                x,
                y,
                width,
                height,
            } => {
                let surface = self.load_image(href)?;
                let w = width.unwrap_or_else(|| f64::from(surface.width()));
                let h = height.unwrap_or_else(|| f64::from(surface.height()));

                Element::Image(Image {
                    rect: Rect::from_xywh(x, y, w, h),
                    surface,
                })
            }

            ElementSpec::Text { x, y, ref text } => Element::Text(Text {
                x,
                y,
                text: text.clone(),
            }),

            ElementSpec::ClipPath { clip_path_units } => Element::ClipPath(ClipPath {
                units: units_or(clip_path_units, CoordUnits::UserSpaceOnUse),
            }),

            ElementSpec::Mask {
                mask_units,
                mask_content_units,
                x,
                y,
                width,
                height,
            } => {
                let units = units_or(mask_units, CoordUnits::ObjectBoundingBox);
                let rect = match units {
                    CoordUnits::ObjectBoundingBox => Rect::from_xywh(
                        x.unwrap_or(-0.1),
                        y.unwrap_or(-0.1),
                        width.unwrap_or(1.2),
                        height.unwrap_or(1.2),
                    ),
                    CoordUnits::UserSpaceOnUse => Rect::from_xywh(
                        x.unwrap_or(0.0),
                        y.unwrap_or(0.0),
                        width.unwrap_or(0.0),
                        height.unwrap_or(0.0),
                    ),
                };

                Element::Mask(Mask {
                    units,
                    content_units: units_or(mask_content_units, CoordUnits::UserSpaceOnUse),
                    rect,
                })
            }

            ElementSpec::Pattern {
                x,
                y,
                width,
                height,
                pattern_units,
                pattern_content_units,
                view_box,
                pattern_transform,
                ref href,
            } => Element::Pattern(Pattern {
                x,
                y,
                width,
                height,
                units: units_or(pattern_units, CoordUnits::ObjectBoundingBox),
                content_units: units_or(pattern_content_units, CoordUnits::UserSpaceOnUse),
                view_box,
                transform: pattern_transform,
                href: link(href, resolve, flat, |e| {
                    matches!(e, ElementSpec::Pattern { .. })
                })?,
            }),

            ElementSpec::Hatch {
                x,
                y,
                pitch,
                rotate,
                hatch_units,
                hatch_content_units,
            } => Element::Hatch(Hatch {
                x,
                y,
                pitch,
                rotate,
                units: units_or(hatch_units, CoordUnits::ObjectBoundingBox),
                content_units: units_or(hatch_content_units, CoordUnits::UserSpaceOnUse),
                transform: Transform::identity(),
            }),

            ElementSpec::HatchPath { ref d, offset } => Element::HatchPath(HatchPath {
                d: d.as_deref()
                    .map(Path::parse)
                    .transpose()
                    .map_err(|e| LoadingError::BadAttribute {
                        attr: "d".to_string(),
                        err: ValueErrorKind::parse_error(&e.to_string()),
                    })?,
                offset,
            }),

            ElementSpec::LinearGradient {
                x1,
                y1,
                x2,
                y2,
                gradient_units,
                spread_method,
                gradient_transform,
                ref stops,
                ref href,
            } => Element::Gradient(Gradient {
                variant: GradientVariant::Linear {
                    x1: x1.unwrap_or(0.0),
                    y1: y1.unwrap_or(0.0),
                    x2: x2.unwrap_or(1.0),
                    y2: y2.unwrap_or(0.0),
                },
                units: units_or(gradient_units, CoordUnits::ObjectBoundingBox),
                spread: spread_method.map(SpreadMethod::from).unwrap_or_default(),
                transform: gradient_transform,
                stops: build_stops(stops)?,
                href: link(href, resolve, flat, ElementSpec::is_gradient)?,
            }),

            ElementSpec::RadialGradient {
                cx,
                cy,
                r,
                fx,
                fy,
                fr,
                gradient_units,
                spread_method,
                gradient_transform,
                ref stops,
                ref href,
            } => {
                let cx = cx.unwrap_or(0.5);
                let cy = cy.unwrap_or(0.5);

                Element::Gradient(Gradient {
                    variant: GradientVariant::Radial {
                        cx,
                        cy,
                        r: r.unwrap_or(0.5),
                        fx: fx.unwrap_or(cx),
                        fy: fy.unwrap_or(cy),
                        fr: fr.unwrap_or(0.0),
                    },
                    units: units_or(gradient_units, CoordUnits::ObjectBoundingBox),
                    spread: spread_method.map(SpreadMethod::from).unwrap_or_default(),
                    transform: gradient_transform,
                    stops: build_stops(stops)?,
                    href: link(href, resolve, flat, ElementSpec::is_gradient)?,
                })
            }
        };

        Ok(element)
    }

    fn load_image(&self, href: &str) -> Result<cairo::ImageSurface, LoadingError> {
        let path = match self.base_dir {
            Some(ref dir) => dir.join(href),
            None => PathBuf::from(href),
        };

        let image_error = |err: String| LoadingError::Image {
            path: path.display().to_string(),
            err,
        };

        let mut file = File::open(&path).map_err(|e| image_error(e.to_string()))?;
        let surface = cairo::ImageSurface::create_from_png(&mut file)
            .map_err(|e| image_error(e.to_string()))?;

        if surface.width() == 0 || surface.height() == 0 {
            return Err(image_error("image has no pixels".to_string()));
        }

        Ok(surface)
    }
}

impl ElementSpec {
    fn is_paint_server(&self) -> bool {
        matches!(
            self,
            ElementSpec::Pattern { .. }
                | ElementSpec::Hatch { .. }
                | ElementSpec::LinearGradient { .. }
                | ElementSpec::RadialGradient { .. }
        )
    }

    fn is_gradient(&self) -> bool {
        matches!(
            self,
            ElementSpec::LinearGradient { .. } | ElementSpec::RadialGradient { .. }
        )
    }
}

struct FlatNode {
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    spec: NodeSpec,
}

impl FlatNode {
    fn id_for_errors(&self) -> String {
        self.spec.id.clone().unwrap_or_default()
    }
}

fn flatten(
    mut spec: NodeSpec,
    parent: Option<NodeId>,
    flat: &mut Vec<FlatNode>,
    ids: &mut HashMap<String, NodeId>,
) -> Result<(), LoadingError> {
    let index = NodeId(flat.len());

    if let Some(ref id) = spec.id {
        if ids.insert(id.clone(), index).is_some() {
            return Err(LoadingError::DuplicateId(id.clone()));
        }
    }

    let children = std::mem::take(&mut spec.children);
    flat.push(FlatNode {
        parent,
        children: Vec::new(),
        spec,
    });

    for child in children {
        let child_id = NodeId(flat.len());
        flatten(child, Some(index), flat, ids)?;
        flat[index.0].children.push(child_id);
    }

    Ok(())
}

/// Accepts `url(#id)`, `#id` or a bare `id`.
fn fragment_id(s: &str) -> &str {
    let s = s.trim();
    let s = s
        .strip_prefix("url(")
        .and_then(|s| s.strip_suffix(')'))
        .map(str::trim)
        .unwrap_or(s);
    s.strip_prefix('#').unwrap_or(s)
}

fn reference<F>(
    value: &Option<String>,
    attr: &str,
    resolve: &F,
) -> Result<Option<NodeId>, LoadingError>
where
    F: Fn(&str) -> Result<NodeId, LoadingError>,
{
    match value.as_deref().map(str::trim) {
        None | Some("none") => Ok(None),
        Some(s) if s.is_empty() => Err(LoadingError::BadAttribute {
            attr: attr.to_string(),
            err: ValueErrorKind::value_error("empty reference"),
        }),
        Some(s) => resolve(fragment_id(s)).map(Some),
    }
}

fn link<F, P>(
    href: &Option<String>,
    resolve: &F,
    flat: &[FlatNode],
    accept: P,
) -> Result<Option<NodeId>, LoadingError>
where
    F: Fn(&str) -> Result<NodeId, LoadingError>,
    P: Fn(&ElementSpec) -> bool,
{
    match reference(href, "href", resolve)? {
        Some(n) if !accept(&flat[n.0].spec.element) => {
            Err(LoadingError::InvalidLinkType(flat[n.0].id_for_errors()))
        }
        r => Ok(r),
    }
}

fn build_stops(stops: &[StopSpec]) -> Result<Vec<GradientStop>, LoadingError> {
    let mut last_offset: f64 = 0.0;

    stops
        .iter()
        .map(|s| -> Result<GradientStop, LoadingError> {
            let color: RGBA = parse_value(&s.color).attribute("stop-color")?;

            // offsets are clamped, and can never go backwards
            let offset = s.offset.clamp(0.0, 1.0).max(last_offset);
            last_offset = offset;

            Ok(GradientStop {
                offset,
                color,
                opacity: s.opacity.clamp(0.0, 1.0),
            })
        })
        .collect()
}
