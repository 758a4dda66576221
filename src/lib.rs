//! Render SVG scenes to Cairo image surfaces, PDF and PostScript.
//!
//! A scene is a JSON description of an SVG document tree: groups, paths, images and
//! text, with clip paths, masks, gradients, patterns and hatches.  The crate draws
//! it through a [`RenderContext`], which keeps the SVG compositing model on top of
//! Cairo: every translucent, clipped or masked item goes into a layer, and layers are
//! composited through rasterized clips and masks on image targets, or through real
//! Cairo clips on vector targets.
//!
//! # Basic usage
//!
//! * Load a [`Document`] with a [`Loader`].
//! * Create a [`RenderContext`], pick its target and set up the surface.
//! * Draw the document with a [`Renderer`].
//!
//! # Example
//!
//! ```
//! use svgpaint::{Loader, RenderContext, Renderer};
//!
//! let document = Loader::new()
//!     .read_str(r#"{
//!         "width": 40, "height": 40,
//!         "root": { "type": "group", "children": [
//!             { "type": "circle", "cx": 20, "cy": 20, "r": 15,
//!               "style": { "fill": "red", "stroke": "black", "stroke-width": 2 } }
//!         ] }
//!     }"#)
//!     .unwrap();
//!
//! let mut ctx = RenderContext::new(Default::default());
//! ctx.set_image_target(cairo::Format::ARgb32).unwrap();
//! ctx.setup_surface(40.0, 40.0).unwrap();
//!
//! let renderer = Renderer::new(&document).unwrap();
//! renderer.render(&mut ctx).unwrap();
//!
//! let mut png = Vec::new();
//! ctx.write_png(&mut png).unwrap();
//! assert!(!png.is_empty());
//! ```
//!
//! # PDF output
//!
//! Vector targets write to an [`OutputSpec`]: a file, a pipe into a command, or
//! the printer.  Each page is set up with [`RenderContext::next_page`] after the
//! first one, and [`RenderContext::finish`] flushes the last page and closes the
//! stream.

#![allow(rustdoc::private_intra_doc_links)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::derive_partial_eq_without_eq)]
#![warn(nonstandard_style, rust_2018_idioms, unused)]
// Some lints no longer exist
#![warn(renamed_and_removed_lints)]

pub use crate::document::{Document, Metadata, NodeId};
pub use crate::error::{LoadingError, RenderingError};
pub use crate::output::{OutputSpec, OutputStream};
pub use crate::render_ctx::{ItemRenderer, OmitTextPageState, RenderContext};
pub use crate::renderer::Renderer;
pub use crate::scene::Loader;
pub use crate::session::Session;
pub use crate::target::{RenderOptions, TargetKind};

pub mod background;
pub mod color;
pub mod compositing;
pub mod document;
pub mod error;
mod log;
pub mod output;
pub mod paint_server;
mod parsers;
pub mod path;
pub mod rect;
pub mod render_ctx;
pub mod renderer;
pub mod scene;
pub mod session;
pub mod state;
pub mod style;
pub mod surface_utils;
pub mod target;
pub mod text;
pub mod transform;
