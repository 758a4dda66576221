//! Affine transforms and parsing of SVG `transform` strings.
//!
//! `Transform::multiply(a, b)` means "apply `a`, then `b`".  A child's transform
//! composed onto its parent's is thus `parent.pre_transform(&child)`.

use cssparser::{Parser, Token};
use serde::{Deserialize, Deserializer};

use crate::error::*;
use crate::parsers::{optional_comma, Parse};
use crate::rect::Rect;

/// Determinants smaller than this make Cairo unhappy; such transforms are skipped.
pub const DEGENERATE_DETERMINANT: f64 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub xx: f64,
    pub yx: f64,
    pub xy: f64,
    pub yy: f64,
    pub x0: f64,
    pub y0: f64,
}

impl Transform {
    #[inline]
    pub fn new_unchecked(xx: f64, yx: f64, xy: f64, yy: f64, x0: f64, y0: f64) -> Self {
        Self {
            xx,
            xy,
            x0,
            yx,
            yy,
            y0,
        }
    }

    #[inline]
    pub fn identity() -> Self {
        Self::new_unchecked(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
    }

    #[inline]
    pub fn new_translate(tx: f64, ty: f64) -> Self {
        Self::new_unchecked(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    #[inline]
    pub fn new_scale(sx: f64, sy: f64) -> Self {
        Self::new_unchecked(sx, 0.0, 0.0, sy, 0.0, 0.0)
    }

    #[inline]
    pub fn new_rotate(degrees: f64) -> Self {
        let (s, c) = degrees.to_radians().sin_cos();
        Self::new_unchecked(c, s, -s, c, 0.0, 0.0)
    }

    #[inline]
    pub fn new_skew(ax_degrees: f64, ay_degrees: f64) -> Self {
        Self::new_unchecked(
            1.0,
            ay_degrees.to_radians().tan(),
            ax_degrees.to_radians().tan(),
            1.0,
            0.0,
            0.0,
        )
    }

    /// The transform that maps the unit square onto `bbox`.
    ///
    /// This is how `objectBoundingBox` units become user space.
    #[inline]
    pub fn from_bbox(bbox: &Rect) -> Self {
        Self::new_unchecked(bbox.width(), 0.0, 0.0, bbox.height(), bbox.x0, bbox.y0)
    }

    #[must_use]
    pub fn multiply(t1: &Transform, t2: &Transform) -> Self {
        Transform {
            xx: t1.xx * t2.xx + t1.yx * t2.xy,
            yx: t1.xx * t2.yx + t1.yx * t2.yy,
            xy: t1.xy * t2.xx + t1.yy * t2.xy,
            yy: t1.xy * t2.yx + t1.yy * t2.yy,
            x0: t1.x0 * t2.xx + t1.y0 * t2.xy + t2.x0,
            y0: t1.x0 * t2.yx + t1.y0 * t2.yy + t2.y0,
        }
    }

    #[inline]
    pub fn pre_transform(&self, t: &Transform) -> Self {
        Self::multiply(t, self)
    }

    #[inline]
    pub fn post_transform(&self, t: &Transform) -> Self {
        Self::multiply(self, t)
    }

    #[inline]
    pub fn pre_translate(&self, x: f64, y: f64) -> Self {
        self.pre_transform(&Transform::new_translate(x, y))
    }

    #[inline]
    pub fn pre_rotate(&self, degrees: f64) -> Self {
        self.pre_transform(&Transform::new_rotate(degrees))
    }

    #[inline]
    pub fn post_translate(&self, x: f64, y: f64) -> Self {
        self.post_transform(&Transform::new_translate(x, y))
    }

    #[inline]
    pub fn post_scale(&self, sx: f64, sy: f64) -> Self {
        self.post_transform(&Transform::new_scale(sx, sy))
    }

    /// Returns a copy of this transform with the translation replaced.
    #[inline]
    pub fn with_translation(&self, x0: f64, y0: f64) -> Self {
        Self { x0, y0, ..*self }
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.xx * self.yy - self.xy * self.yx
    }

    /// Whether this transform is too close to singular to hand to Cairo.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.determinant().abs() < DEGENERATE_DETERMINANT
    }

    #[inline]
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();

        det != 0.0 && det.is_finite()
    }

    #[must_use]
    pub fn invert(&self) -> Option<Self> {
        let det = self.determinant();

        if det == 0.0 || !det.is_finite() {
            return None;
        }

        let inv_det = 1.0 / det;

        Some(Transform::new_unchecked(
            inv_det * self.yy,
            inv_det * (-self.yx),
            inv_det * (-self.xy),
            inv_det * self.xx,
            inv_det * (self.xy * self.y0 - self.yy * self.x0),
            inv_det * (self.yx * self.x0 - self.xx * self.y0),
        ))
    }

    #[inline]
    pub fn transform_distance(&self, dx: f64, dy: f64) -> (f64, f64) {
        (dx * self.xx + dy * self.xy, dx * self.yx + dy * self.yy)
    }

    #[inline]
    pub fn transform_point(&self, px: f64, py: f64) -> (f64, f64) {
        let (x, y) = self.transform_distance(px, py);
        (x + self.x0, y + self.y0)
    }

    pub fn transform_rect(&self, rect: &Rect) -> Rect {
        let points = [
            self.transform_point(rect.x0, rect.y0),
            self.transform_point(rect.x1, rect.y0),
            self.transform_point(rect.x0, rect.y1),
            self.transform_point(rect.x1, rect.y1),
        ];

        let (mut xmin, mut ymin, mut xmax, mut ymax) = {
            let (x, y) = points[0];

            (x, y, x, y)
        };

        for &(x, y) in points.iter().skip(1) {
            xmin = xmin.min(x);
            xmax = xmax.max(x);
            ymin = ymin.min(y);
            ymax = ymax.max(y);
        }

        Rect::new(xmin, ymin, xmax, ymax)
    }
}

impl Default for Transform {
    #[inline]
    fn default() -> Transform {
        Transform::identity()
    }
}

impl Parse for Transform {
    fn parse<'i>(parser: &mut Parser<'i, '_>) -> Result<Transform, ParseError<'i>> {
        let loc = parser.current_source_location();

        let t = parse_transform_list(parser)?;

        if !t.is_invertible() {
            return Err(loc.new_custom_error(ValueErrorKind::Value(
                "invalid transformation matrix".to_string(),
            )));
        }

        Ok(t)
    }
}

impl<'de> Deserialize<'de> for Transform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Transform::parse_str(&s)
            .map_err(|e| serde::de::Error::custom(ValueErrorKind::from(e)))
    }
}

impl From<cairo::Matrix> for Transform {
    #[inline]
    fn from(m: cairo::Matrix) -> Self {
        Self::new_unchecked(m.xx(), m.yx(), m.xy(), m.yy(), m.x0(), m.y0())
    }
}

impl From<Transform> for cairo::Matrix {
    #[inline]
    fn from(t: Transform) -> Self {
        Self::new(t.xx, t.yx, t.xy, t.yy, t.x0, t.y0)
    }
}

fn parse_transform_list<'i>(parser: &mut Parser<'i, '_>) -> Result<Transform, ParseError<'i>> {
    let mut t = Transform::identity();

    loop {
        if parser.is_exhausted() {
            break;
        }

        t = parse_transform_command(parser)?.post_transform(&t);
        optional_comma(parser);
    }

    Ok(t)
}

fn parse_transform_command<'i>(parser: &mut Parser<'i, '_>) -> Result<Transform, ParseError<'i>> {
    let loc = parser.current_source_location();

    match parser.next()?.clone() {
        Token::Function(ref name) => parse_transform_function(name, parser),

        Token::Ident(ref name) => {
            parser.expect_parenthesis_block()?;
            parse_transform_function(name, parser)
        }

        tok => Err(loc.new_unexpected_token_error(tok.clone())),
    }
}

fn parse_transform_function<'i>(
    name: &str,
    parser: &mut Parser<'i, '_>,
) -> Result<Transform, ParseError<'i>> {
    let loc = parser.current_source_location();

    match name {
        "matrix" => parse_matrix_args(parser),
        "translate" => parse_translate_args(parser),
        "scale" => parse_scale_args(parser),
        "rotate" => parse_rotate_args(parser),
        "skewX" => parser.parse_nested_block(|p| Ok(Transform::new_skew(f64::parse(p)?, 0.0))),
        "skewY" => parser.parse_nested_block(|p| Ok(Transform::new_skew(0.0, f64::parse(p)?))),
        _ => Err(loc.new_custom_error(ValueErrorKind::parse_error(
            "expected matrix|translate|scale|rotate|skewX|skewY",
        ))),
    }
}

fn parse_matrix_args<'i>(parser: &mut Parser<'i, '_>) -> Result<Transform, ParseError<'i>> {
    parser.parse_nested_block(|p| {
        let mut v = [0.0; 6];

        for (i, slot) in v.iter_mut().enumerate() {
            if i > 0 {
                optional_comma(p);
            }
            *slot = f64::parse(p)?;
        }

        Ok(Transform::new_unchecked(v[0], v[1], v[2], v[3], v[4], v[5]))
    })
}

fn parse_translate_args<'i>(parser: &mut Parser<'i, '_>) -> Result<Transform, ParseError<'i>> {
    parser.parse_nested_block(|p| {
        let tx = f64::parse(p)?;

        let ty = p
            .try_parse(|p| {
                optional_comma(p);
                f64::parse(p)
            })
            .unwrap_or(0.0);

        Ok(Transform::new_translate(tx, ty))
    })
}

fn parse_scale_args<'i>(parser: &mut Parser<'i, '_>) -> Result<Transform, ParseError<'i>> {
    parser.parse_nested_block(|p| {
        let x = f64::parse(p)?;

        let y = p
            .try_parse(|p| {
                optional_comma(p);
                f64::parse(p)
            })
            .unwrap_or(x);

        Ok(Transform::new_scale(x, y))
    })
}

fn parse_rotate_args<'i>(parser: &mut Parser<'i, '_>) -> Result<Transform, ParseError<'i>> {
    parser.parse_nested_block(|p| {
        let degrees = f64::parse(p)?;

        let (tx, ty) = p
            .try_parse(|p| -> Result<_, ParseError<'_>> {
                optional_comma(p);
                let tx = f64::parse(p)?;

                optional_comma(p);
                let ty = f64::parse(p)?;

                Ok((tx, ty))
            })
            .unwrap_or((0.0, 0.0));

        Ok(Transform::new_translate(tx, ty)
            .pre_rotate(degrees)
            .pre_translate(-tx, -ty))
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use float_cmp::ApproxEq;

    pub fn assert_transform_eq(t1: &Transform, t2: &Transform) {
        let epsilon = 8.0 * f64::EPSILON; // kind of arbitrary, but allow for some sloppiness

        assert!(t1.xx.approx_eq(t2.xx, (epsilon, 1)), "{t1:?} != {t2:?}");
        assert!(t1.yx.approx_eq(t2.yx, (epsilon, 1)), "{t1:?} != {t2:?}");
        assert!(t1.xy.approx_eq(t2.xy, (epsilon, 1)), "{t1:?} != {t2:?}");
        assert!(t1.yy.approx_eq(t2.yy, (epsilon, 1)), "{t1:?} != {t2:?}");
        assert!(t1.x0.approx_eq(t2.x0, (epsilon, 1)), "{t1:?} != {t2:?}");
        assert!(t1.y0.approx_eq(t2.y0, (epsilon, 1)), "{t1:?} != {t2:?}");
    }

    #[test]
    fn multiply_applies_first_then_second() {
        let t1 = Transform::new_unchecked(0.5, 0.0, 0.0, 0.5, 10.0, 10.0);
        let t2 = Transform::new_unchecked(1.0, 0.0, 0.0, 1.0, -10.0, -10.0);
        assert_transform_eq(
            &Transform::multiply(&t1, &t2),
            &Transform::new_unchecked(0.5, 0.0, 0.0, 0.5, 0.0, 0.0),
        );
        assert_transform_eq(
            &Transform::multiply(&t2, &t1),
            &Transform::new_unchecked(0.5, 0.0, 0.0, 0.5, 5.0, 5.0),
        );
    }

    #[test]
    fn invert_roundtrips() {
        let t = Transform::new_unchecked(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        let i = t.invert().unwrap();
        assert_transform_eq(&t.pre_transform(&i), &Transform::identity());
        assert_transform_eq(&t.post_transform(&i), &Transform::identity());

        assert!(Transform::new_scale(2.0, 0.0).invert().is_none());
    }

    #[test]
    fn tiny_determinant_is_degenerate() {
        assert!(Transform::new_scale(1e-4, 1e-4).is_degenerate());
        assert!(!Transform::new_scale(1e-2, 1e-2).is_degenerate());
        assert!(!Transform::new_rotate(45.0).is_degenerate());
    }

    #[test]
    fn bbox_transform_maps_unit_square() {
        let t = Transform::from_bbox(&Rect::new(10.0, 20.0, 30.0, 60.0));
        assert_eq!(t.transform_point(0.0, 0.0), (10.0, 20.0));
        assert_eq!(t.transform_point(1.0, 1.0), (30.0, 60.0));
    }

    #[test]
    fn transform_rect_is_axis_aligned_bounds() {
        let r = Transform::new_rotate(90.0).transform_rect(&Rect::new(0.0, 0.0, 10.0, 5.0));
        assert!(r.x0.approx_eq(-5.0, (1e-9, 2)));
        assert!(r.x1.approx_eq(0.0, (1e-9, 2)));
        assert!(r.y0.approx_eq(0.0, (1e-9, 2)));
        assert!(r.y1.approx_eq(10.0, (1e-9, 2)));
    }

    #[test]
    fn parses_transform_list() {
        let t = Transform::new_translate(20.0, 30.0);
        let s = Transform::new_scale(10.0, 10.0);
        let r = Transform::new_translate(10.0, 10.0)
            .pre_rotate(30.0)
            .pre_translate(-10.0, -10.0);

        assert_transform_eq(
            &Transform::parse_str("translate(20, 30), scale (10) rotate (30 10 10)").unwrap(),
            &Transform::multiply(&r, &Transform::multiply(&s, &t)),
        );
        assert_transform_eq(
            &Transform::parse_str("matrix(1,2.25,-3.25e2,4 5 6)").unwrap(),
            &Transform::new_unchecked(1.0, 2.25, -325.0, 4.0, 5.0, 6.0),
        );
        assert_transform_eq(
            &Transform::parse_str("skewX(45)").unwrap(),
            &Transform::new_skew(45.0, 0.0),
        );
        assert_transform_eq(&Transform::parse_str("").unwrap(), &Transform::identity());
    }

    #[test]
    fn rejects_bad_transforms() {
        assert!(Transform::parse_str("foo").is_err());
        assert!(Transform::parse_str("matrix (1 2 3 4 5)").is_err());
        assert!(Transform::parse_str("translate (1,)").is_err());
        assert!(Transform::parse_str("scale (0), translate (10, 10)").is_err());
    }

    #[test]
    fn deserializes_from_string() {
        let t: Transform = serde_json::from_str(r#""translate(3 4)""#).unwrap();
        assert_transform_eq(&t, &Transform::new_translate(3.0, 4.0));

        assert!(serde_json::from_str::<Transform>(r#""scale(0)""#).is_err());
    }

    #[test]
    fn converts_to_and_from_cairo() {
        let t = Transform::new_unchecked(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        let m = cairo::Matrix::from(t);
        assert_eq!(Transform::from(m), t);
    }
}
