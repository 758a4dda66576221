//! Error types.

use std::fmt;
use std::io;

use cssparser::{BasicParseError, BasicParseErrorKind};
use thiserror::Error;

/// A short-lived error.
///
/// The lifetime of the error is the same as the `cssparser::ParserInput` that
/// was used to create a `cssparser::Parser`.  That is, it is the lifetime of
/// the string data that is being parsed.
pub type ParseError<'i> = cssparser::ParseError<'i, ValueErrorKind>;

/// A simple error which refers to an attribute's value
#[derive(Debug, Clone, PartialEq)]
pub enum ValueErrorKind {
    /// The value could not be parsed
    Parse(String),

    // The value could be parsed, but is invalid
    Value(String),
}

impl ValueErrorKind {
    pub fn parse_error(s: &str) -> ValueErrorKind {
        ValueErrorKind::Parse(s.to_string())
    }

    pub fn value_error(s: &str) -> ValueErrorKind {
        ValueErrorKind::Value(s.to_string())
    }
}

impl fmt::Display for ValueErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ValueErrorKind::Parse(ref s) => write!(f, "parse error: {s}"),

            ValueErrorKind::Value(ref s) => write!(f, "invalid value: {s}"),
        }
    }
}

impl<'a> From<BasicParseError<'a>> for ValueErrorKind {
    fn from(e: BasicParseError<'_>) -> ValueErrorKind {
        let BasicParseError { kind, .. } = e;

        let msg = match kind {
            BasicParseErrorKind::UnexpectedToken(_) => "unexpected token",
            BasicParseErrorKind::EndOfInput => "unexpected end of input",
            BasicParseErrorKind::AtRuleInvalid(_) => "invalid @-rule",
            BasicParseErrorKind::AtRuleBodyInvalid => "invalid @-rule body",
            BasicParseErrorKind::QualifiedRuleInvalid => "invalid qualified rule",
        };

        ValueErrorKind::parse_error(msg)
    }
}

impl<'i> From<ParseError<'i>> for ValueErrorKind {
    fn from(e: ParseError<'i>) -> ValueErrorKind {
        match e.kind {
            cssparser::ParseErrorKind::Basic(b) => ValueErrorKind::from(BasicParseError {
                kind: b,
                location: e.location,
            }),
            cssparser::ParseErrorKind::Custom(v) => v,
        }
    }
}

/// Errors from setting up or driving a [`RenderContext`].
///
/// [`RenderContext`]: crate::render_ctx::RenderContext
#[derive(Debug, Error)]
pub enum RenderingError {
    /// An error from the rendering backend.
    #[error("cairo error: {0}")]
    Cairo(#[from] cairo::Error),

    /// Image targets only support ARGB32, RGB24, A8 and A1.
    #[error("unsupported image target format {0:?}")]
    InvalidTargetFormat(cairo::Format),

    /// The target can only be chosen before the surface is set up.
    #[error("the render context already has a surface")]
    AlreadyValid,

    /// A PDF or PostScript target was set up without an output stream.
    #[error("no output stream for vector target")]
    NoOutputStream,

    /// The target type cannot be set up by this context.
    #[error("unsupported render target")]
    UnsupportedTarget,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opening or writing the output destination failed, or its metadata is invalid.
    #[error("output: {0}")]
    Output(String),

    /// Pixel data was requested for a surface that is still referenced elsewhere.
    #[error("surface data is in use by another reference")]
    SharedSurface,

    /// A paint server or clip/mask references itself while being rendered.
    #[error("circular reference in element {0}")]
    CircularReference(String),

    /// Too many references were resolved during one rendering.
    #[error("limit of referenced elements exceeded")]
    LimitExceeded,
}

impl From<cairo::IoError> for RenderingError {
    fn from(e: cairo::IoError) -> RenderingError {
        match e {
            cairo::IoError::Cairo(e) => RenderingError::Cairo(e),
            cairo::IoError::Io(e) => RenderingError::Io(e),
        }
    }
}

impl From<cairo::StreamWithError> for RenderingError {
    fn from(e: cairo::StreamWithError) -> RenderingError {
        RenderingError::Io(e.error)
    }
}

/// Errors that can happen while loading a scene into a [`Document`].
///
/// [`Document`]: crate::document::Document
#[derive(Debug, Error)]
pub enum LoadingError {
    /// The scene is not well-formed JSON or does not match the scene schema.
    #[error("malformed scene: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An attribute has an invalid value.
    #[error("attribute {attr}: {err}")]
    BadAttribute { attr: String, err: ValueErrorKind },

    /// A reference to an element id that does not exist in the scene.
    #[error("reference to non-existent element id \"{0}\"")]
    IdNotFound(String),

    /// A reference to an element of the wrong kind, e.g. `fill="url(#clip)"`.
    #[error("element \"{0}\" has the wrong type for this reference")]
    InvalidLinkType(String),

    /// Two elements share the same id.
    #[error("duplicate element id \"{0}\"")]
    DuplicateId(String),

    /// A referenced image could not be loaded.
    #[error("cannot load image {path}: {err}")]
    Image { path: String, err: String },
}

/// Helper for converting `Result<O, ParseError>` into `Result<O, LoadingError>`
///
/// Scene attributes are parsed with cssparser; this attaches the attribute name
/// to the error so that the message can say which value was wrong.
pub trait AttributeResultExt<O> {
    fn attribute(self, attr: &str) -> Result<O, LoadingError>;
}

impl<O, E: Into<ValueErrorKind>> AttributeResultExt<O> for Result<O, E> {
    fn attribute(self, attr: &str) -> Result<O, LoadingError> {
        self.map_err(|e| LoadingError::BadAttribute {
            attr: attr.to_string(),
            err: e.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_error_names_the_attribute() {
        let r: Result<(), ValueErrorKind> = Err(ValueErrorKind::value_error("negative pitch"));
        let e = r.attribute("pitch").unwrap_err();
        assert_eq!(e.to_string(), "attribute pitch: invalid value: negative pitch");
    }

    #[test]
    fn cairo_io_error_maps_to_io() {
        let e = RenderingError::from(cairo::IoError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "pipe closed",
        )));
        assert!(matches!(e, RenderingError::Io(_)));
    }
}
