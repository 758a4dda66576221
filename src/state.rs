//! The graphics-state stack of a [`RenderContext`].
//!
//! Each rendered item pushes a [`RenderState`] frame and pops it when done.  The
//! frames only record what the render context needs to know later, at layer pop
//! time or when painting: the stored CTM, opacity, and the item's clip path and mask.
//! Saving and restoring the Cairo state is done by the render context itself.
//!
//! [`RenderContext`]: crate::render_ctx::RenderContext

use std::iter;
use std::mem;

use crate::compositing;
use crate::document::NodeId;
use crate::rect::Rect;
use crate::style::{ComputedStyle, Overflow};
use crate::transform::Transform;

/// One frame of the state stack.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderState {
    /// The CTM stored for this frame.
    pub transform: Transform,

    /// The item's own transform, relative to its parent.
    pub item_transform: Transform,

    pub opacity: f64,

    /// Whether `opacity` can be multiplied into the fill and stroke alpha instead of
    /// needing a layer.
    pub merge_opacity: bool,

    /// Whether the item is drawn into a layer that is composited on pop.
    pub need_layer: bool,

    pub has_overflow: bool,

    /// Set for items (text, images) that position themselves through their own
    /// transform; their clip and mask use the parent's transform.
    pub parent_has_userspace: bool,

    pub has_filtereffect: bool,

    pub clip_path: Option<NodeId>,
    pub mask: Option<NodeId>,

    /// Bounding box of the item in its own user space, for `objectBoundingBox` units
    /// of its clip path and mask.
    pub bbox: Option<Rect>,
}

impl Default for RenderState {
    fn default() -> RenderState {
        RenderState {
            transform: Transform::identity(),
            item_transform: Transform::identity(),
            opacity: 1.0,
            merge_opacity: true,
            need_layer: false,
            has_overflow: false,
            parent_has_userspace: false,
            has_filtereffect: false,
            clip_path: None,
            mask: None,
            bbox: None,
        }
    }
}

impl RenderState {
    /// Records the style properties that influence compositing.
    pub fn set_state_for_style(&mut self, style: &ComputedStyle) {
        self.opacity = style.opacity;
        self.has_overflow = style.overflow.map_or(false, |o| o != Overflow::Visible);
        self.has_filtereffect = style.filter;

        if style.fill.is_server() || style.stroke.is_server() {
            self.merge_opacity = false;
        }

        // a translucent fill would show the stroke underneath it
        if self.merge_opacity && !style.fill.is_none() && !style.stroke.is_none() {
            self.merge_opacity = false;
        }
    }

    /// Records everything about an item that is needed when its layer is popped.
    pub fn set_state_for_item(&mut self, item: &ItemState<'_>) {
        self.set_state_for_style(item.style);
        self.clip_path = item.clip_path;
        self.mask = item.mask;
        self.item_transform = item.transform;
        self.bbox = item.bbox;

        if item.has_userspace {
            self.parent_has_userspace = true;
        }
    }

    /// Alpha for a fill or stroke, with the object opacity merged in when allowed.
    pub fn merged_opacity(&self, alpha: f64) -> f64 {
        compositing::merged_opacity(self.merge_opacity, self.opacity, alpha)
    }
}

/// The item properties consumed by [`RenderState::set_state_for_item`].
#[derive(Debug, Clone, Copy)]
pub struct ItemState<'a> {
    pub style: &'a ComputedStyle,
    pub clip_path: Option<NodeId>,
    pub mask: Option<NodeId>,
    pub transform: Transform,
    pub bbox: Option<Rect>,
    /// True for text and images.
    pub has_userspace: bool,
}

/// A stack of [`RenderState`] frames that is never empty.
#[derive(Debug, Clone, Default)]
pub struct StateStack {
    top: RenderState,
    below: Vec<RenderState>,
}

impl StateStack {
    pub fn new() -> StateStack {
        Default::default()
    }

    /// Pushes a fresh frame that inherits only the current transform.
    pub fn push(&mut self) -> &mut RenderState {
        let frame = RenderState {
            transform: self.top.transform,
            ..Default::default()
        };

        self.below.push(mem::replace(&mut self.top, frame));
        &mut self.top
    }

    /// Pops the top frame.
    ///
    /// # Panics
    ///
    /// Panics when only the bottom frame is left; that means a push and a pop were
    /// not balanced.
    pub fn pop(&mut self) -> RenderState {
        match self.below.pop() {
            Some(frame) => mem::replace(&mut self.top, frame),
            None => panic!("unbalanced state stack: cannot pop the last frame"),
        }
    }

    pub fn current(&self) -> &RenderState {
        &self.top
    }

    pub fn current_mut(&mut self) -> &mut RenderState {
        &mut self.top
    }

    /// The frame below the top, or the top itself if it is the only one.
    pub fn parent(&self) -> &RenderState {
        self.below.last().unwrap_or(&self.top)
    }

    pub fn len(&self) -> usize {
        self.below.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Frames from the bottom of the stack to the top.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &RenderState> + '_ {
        self.below.iter().chain(iter::once(&self.top))
    }
}
