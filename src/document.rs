//! The scene tree: an arena of nodes addressed by [`NodeId`].
//!
//! All cross-references between nodes (clip paths, masks, paint servers, `href` chains)
//! are stored as `NodeId`s that were resolved when the document was loaded, so the tree
//! holds no back pointers and can be shared immutably by the renderer.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::color::RGBA;
use crate::path::Path;
use crate::rect::Rect;
use crate::style::ComputedStyle;
use crate::transform::Transform;

/// Handle to a node in a [`Document`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Coordinate system for an element's attributes or contents.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CoordUnits {
    UserSpaceOnUse,
    ObjectBoundingBox,
}

impl CoordUnits {
    /// Maps a rectangle given in these units to user space.
    ///
    /// Returns `None` for bounding-box units when there is no bounding box.
    pub fn to_user(&self, r: Rect, bbox: Option<&Rect>) -> Option<Rect> {
        match *self {
            CoordUnits::UserSpaceOnUse => Some(r),
            CoordUnits::ObjectBoundingBox => {
                bbox.map(|bbox| Transform::from_bbox(bbox).transform_rect(&r))
            }
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SpreadMethod {
    #[default]
    Pad,
    Reflect,
    Repeat,
}

impl From<SpreadMethod> for cairo::Extend {
    fn from(s: SpreadMethod) -> cairo::Extend {
        match s {
            SpreadMethod::Pad => cairo::Extend::Pad,
            SpreadMethod::Reflect => cairo::Extend::Reflect,
            SpreadMethod::Repeat => cairo::Extend::Repeat,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GradientStop {
    /// In the range `[0, 1]`, and not decreasing along the stop list.
    pub offset: f64,
    pub color: RGBA,
    pub opacity: f64,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum GradientVariant {
    Linear {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Radial {
        cx: f64,
        cy: f64,
        r: f64,
        fx: f64,
        fy: f64,
        fr: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub variant: GradientVariant,
    pub units: CoordUnits,
    pub spread: SpreadMethod,
    pub transform: Transform,
    pub stops: Vec<GradientStop>,
    pub href: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub units: CoordUnits,
    pub content_units: CoordUnits,
    pub view_box: Option<Rect>,
    pub transform: Transform,
    pub href: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hatch {
    pub x: f64,
    pub y: f64,
    pub pitch: f64,
    /// Degrees.
    pub rotate: f64,
    pub units: CoordUnits,
    pub content_units: CoordUnits,
    pub transform: Transform,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HatchPath {
    /// `None` means a vertical line through the whole strip.
    pub d: Option<Path>,
    pub offset: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    pub units: CoordUnits,
    pub content_units: CoordUnits,
    pub rect: Rect,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClipPath {
    pub units: CoordUnits,
}

#[derive(Debug, Clone)]
pub struct Image {
    pub rect: Rect,
    pub surface: cairo::ImageSurface,
}

impl Image {
    /// Maps the image's pixel grid onto its rectangle in user space.
    pub fn image_transform(&self) -> Transform {
        let iw = f64::from(self.surface.width());
        let ih = f64::from(self.surface.height());

        Transform::new_scale(self.rect.width() / iw, self.rect.height() / ih)
            .post_translate(self.rect.x0, self.rect.y0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub x: f64,
    pub y: f64,
    pub text: String,
}

#[derive(Debug, Clone)]
pub enum Element {
    Group,
    Path(Path),
    Image(Image),
    Text(Text),
    ClipPath(ClipPath),
    Mask(Mask),
    Pattern(Pattern),
    Hatch(Hatch),
    HatchPath(HatchPath),
    Gradient(Gradient),
}

impl Element {
    pub fn name(&self) -> &'static str {
        match self {
            Element::Group => "group",
            Element::Path(_) => "path",
            Element::Image(_) => "image",
            Element::Text(_) => "text",
            Element::ClipPath(_) => "clipPath",
            Element::Mask(_) => "mask",
            Element::Pattern(_) => "pattern",
            Element::Hatch(_) => "hatch",
            Element::HatchPath(_) => "hatchpath",
            Element::Gradient(_) => "gradient",
        }
    }

    /// Whether this element is only rendered through a reference.
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            Element::ClipPath(_)
                | Element::Mask(_)
                | Element::Pattern(_)
                | Element::Hatch(_)
                | Element::HatchPath(_)
                | Element::Gradient(_)
        )
    }

    pub fn is_paint_server(&self) -> bool {
        matches!(
            self,
            Element::Pattern(_) | Element::Hatch(_) | Element::Gradient(_)
        )
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: Option<String>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub transform: Transform,
    pub style: ComputedStyle,
    pub clip_path: Option<NodeId>,
    pub mask: Option<NodeId>,
    pub element: Element,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(ref id) => write!(f, "{}#{}", self.element.name(), id),
            None => write!(f, "{}", self.element.name()),
        }
    }
}

/// Document-level metadata, written into PDF and PostScript outputs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub keywords: Option<String>,
    pub copyright: Option<String>,
    pub creator: Option<String>,
    /// RFC 3339
    pub creation_date: Option<String>,
    /// RFC 3339
    pub modification_date: Option<String>,
}

impl Metadata {
    /// Fills in fields that are missing here from `other`.
    pub fn or(self, other: Metadata) -> Metadata {
        Metadata {
            title: self.title.or(other.title),
            author: self.author.or(other.author),
            subject: self.subject.or(other.subject),
            keywords: self.keywords.or(other.keywords),
            copyright: self.copyright.or(other.copyright),
            creator: self.creator.or(other.creator),
            creation_date: self.creation_date.or(other.creation_date),
            modification_date: self.modification_date.or(other.modification_date),
        }
    }
}

/// A loaded scene.
#[derive(Debug)]
pub struct Document {
    pub(crate) nodes: Vec<Node>,
    pub(crate) ids: HashMap<String, NodeId>,
    pub(crate) root: NodeId,
    pub(crate) width: f64,
    pub(crate) height: f64,
    pub(crate) metadata: Metadata,
}

impl Document {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0].children.iter().copied()
    }

    pub fn lookup(&self, id: &str) -> Option<NodeId> {
        self.ids.get(id).copied()
    }

    /// Size of the canvas, in pixels.
    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Follows a gradient's `href` chain to the first gradient that has stops.
    ///
    /// Chains that loop back on themselves yield no stops.
    pub fn gradient_stops(&self, id: NodeId) -> &[GradientStop] {
        let mut visited = Vec::new();
        let mut current = Some(id);

        while let Some(n) = current {
            if visited.contains(&n) {
                break;
            }
            visited.push(n);

            match self.node(n).element {
                Element::Gradient(ref g) if !g.stops.is_empty() => return &g.stops,
                Element::Gradient(ref g) => current = g.href,
                _ => break,
            }
        }

        &[]
    }

    /// Follows a pattern's `href` chain to the first pattern that has children.
    pub fn pattern_content_node(&self, id: NodeId) -> Option<NodeId> {
        let mut visited = Vec::new();
        let mut current = Some(id);

        while let Some(n) = current {
            if visited.contains(&n) {
                break;
            }
            visited.push(n);

            let node = self.node(n);
            match node.element {
                Element::Pattern(_) if !node.children.is_empty() => return Some(n),
                Element::Pattern(ref p) => current = p.href,
                _ => break,
            }
        }

        None
    }

    /// Whether a paint server can produce a paint.
    ///
    /// Gradients need at least one stop, patterns a positive size, and hatches a
    /// positive pitch.
    pub fn paint_server_is_valid(&self, id: NodeId) -> bool {
        match self.node(id).element {
            Element::Gradient(_) => !self.gradient_stops(id).is_empty(),
            Element::Pattern(ref p) => p.width > 0.0 && p.height > 0.0,
            Element::Hatch(ref h) => h.pitch > 0.0,
            _ => false,
        }
    }
}

/// Upper bound on the references that one rendering may resolve.
///
/// Patterns that reference each other through their contents can otherwise produce
/// an exponential number of tiles.
pub const MAX_REFERENCED_ELEMENTS: usize = 500_000;

/// Upper bound on how often hatch paths are repeated within one hatch tile.
///
/// Repeats scale with the painted area over the hatch pitch or the path's own
/// length, both of which can be made arbitrarily small.
pub const MAX_HATCH_REPEATS: usize = 100_000;

/// Errors from [`AcquiredNodes::acquire_ref`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireError {
    /// The node is already being rendered further up the stack.
    CircularReference(NodeId),

    MaxReferencesExceeded,
}

/// A node that is being rendered through a reference; released on drop.
pub struct AcquiredNode {
    stack: Rc<RefCell<Vec<NodeId>>>,
    node: NodeId,
}

impl Drop for AcquiredNode {
    fn drop(&mut self) {
        let last = self.stack.borrow_mut().pop();
        assert_eq!(last, Some(self.node));
    }
}

impl AcquiredNode {
    pub fn get(&self) -> NodeId {
        self.node
    }
}

/// Detects circular references between nodes.
///
/// Consider a pattern whose content is filled with the same pattern:
///
/// ```json
/// { "id": "p", "type": "pattern", "width": 10, "height": 10,
///   "children": [ { "type": "rect", "width": 5, "height": 5, "style": { "fill": "url(#p)" } } ] }
/// ```
///
/// Rendering the tile would need the tile itself.  Every time a clip path, mask or
/// paint server is rendered it is acquired here first; acquiring a node that is still
/// held signals the cycle.
#[derive(Default)]
pub struct AcquiredNodes {
    stack: Rc<RefCell<Vec<NodeId>>>,
    num_acquired: Cell<usize>,
}

impl AcquiredNodes {
    pub fn new() -> AcquiredNodes {
        Default::default()
    }

    pub fn acquire_ref(&self, node: NodeId) -> Result<AcquiredNode, AcquireError> {
        self.num_acquired.set(self.num_acquired.get() + 1);

        if self.num_acquired.get() > MAX_REFERENCED_ELEMENTS {
            return Err(AcquireError::MaxReferencesExceeded);
        }

        if self.stack.borrow().contains(&node) {
            return Err(AcquireError::CircularReference(node));
        }

        self.stack.borrow_mut().push(node);

        Ok(AcquiredNode {
            stack: self.stack.clone(),
            node,
        })
    }

    /// Whether nothing is acquired at the moment.
    pub fn is_empty(&self) -> bool {
        self.stack.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reacquiring_a_held_node_is_circular() {
        let nodes = AcquiredNodes::new();
        let a = nodes.acquire_ref(NodeId(1)).unwrap();
        let _b = nodes.acquire_ref(NodeId(2)).unwrap();

        assert_eq!(
            nodes.acquire_ref(NodeId(1)).err(),
            Some(AcquireError::CircularReference(NodeId(1)))
        );
        assert_eq!(a.get(), NodeId(1));
    }

    #[test]
    fn released_nodes_can_be_acquired_again() {
        let nodes = AcquiredNodes::new();
        {
            let _a = nodes.acquire_ref(NodeId(7)).unwrap();
            assert!(!nodes.is_empty());
        }
        assert!(nodes.is_empty());
        assert!(nodes.acquire_ref(NodeId(7)).is_ok());
    }

    #[test]
    fn unit_rects_map_onto_the_bbox() {
        let bbox = Rect::new(10.0, 20.0, 30.0, 60.0);
        let r = CoordUnits::ObjectBoundingBox
            .to_user(Rect::new(0.0, 0.0, 0.5, 0.5), Some(&bbox))
            .unwrap();
        assert!(r.approx_eq(&Rect::new(10.0, 20.0, 20.0, 40.0)));

        assert_eq!(
            CoordUnits::ObjectBoundingBox.to_user(Rect::from_size(1.0, 1.0), None),
            None
        );
    }
}
