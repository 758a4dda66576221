//! CSS color values.

use cssparser::Parser;

use crate::error::*;
use crate::parsers::Parse;

pub use cssparser::RGBA;

pub const BLACK: RGBA = RGBA {
    red: 0,
    green: 0,
    blue: 0,
    alpha: 255,
};

impl Parse for RGBA {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<RGBA, ParseError<'i>> {
        let loc = parser.current_source_location();

        match cssparser::Color::parse(parser)? {
            cssparser::Color::RGBA(rgba) => Ok(rgba),
            cssparser::Color::CurrentColor => Err(loc.new_custom_error(ValueErrorKind::Value(
                "currentColor is not allowed here".to_string(),
            ))),
        }
    }
}

/// Sets `rgba` as the source, with its alpha multiplied by `opacity`.
pub fn set_source_color_on_cairo(cr: &cairo::Context, rgba: &RGBA, opacity: f64) {
    cr.set_source_rgba(
        f64::from(rgba.red) / 255.0,
        f64::from(rgba.green) / 255.0,
        f64::from(rgba.blue) / 255.0,
        f64::from(rgba.alpha_f32()) * opacity,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_css_colors() {
        assert_eq!(RGBA::parse_str("#ff0000").unwrap(), RGBA::new(255, 0, 0, 255));
        assert_eq!(RGBA::parse_str("black").unwrap(), BLACK);
        assert_eq!(
            RGBA::parse_str("rgba(0, 0, 255, 0.5)").unwrap(),
            RGBA::new(0, 0, 255, 128)
        );
    }

    #[test]
    fn current_color_is_rejected() {
        assert!(RGBA::parse_str("currentColor").is_err());
    }
}
