//! Bézier paths: building, parsing SVG path data, and feeding them to Cairo.
//!
//! Path data is parsed into a [`PathBuilder`], which then gets frozen into an immutable
//! [`Path`].  Quadratic segments are stored as cubics, which is all Cairo knows about.

use std::fmt;
use std::rc::Rc;

use crate::error::RenderingError;
use crate::rect::Rect;

/// "c" command for paths; describes a cubic Bézier segment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CubicBezierCurve {
    /// The (x, y) coordinates of the first control point.
    pub pt1: (f64, f64),
    /// The (x, y) coordinates of the second control point.
    pub pt2: (f64, f64),
    /// The (x, y) coordinates of the end point of this path segment.
    pub to: (f64, f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathCommand {
    MoveTo(f64, f64),
    LineTo(f64, f64),
    CurveTo(CubicBezierCurve),
    ClosePath,
}

impl PathCommand {
    fn to_cairo(self, cr: &cairo::Context) {
        match self {
            PathCommand::MoveTo(x, y) => cr.move_to(x, y),
            PathCommand::LineTo(x, y) => cr.line_to(x, y),
            PathCommand::CurveTo(c) => cr.curve_to(c.pt1.0, c.pt1.1, c.pt2.0, c.pt2.1, c.to.0, c.to.1),
            PathCommand::ClosePath => cr.close_path(),
        }
    }
}

/// Constructs a path out of commands.
///
/// Create this with `PathBuilder::default`; you can then add commands to it or call the
/// `parse` method.  When you are finished constructing a path builder, turn it into a
/// `Path` with `into_path`.
#[derive(Default)]
pub struct PathBuilder {
    path_commands: Vec<PathCommand>,
}

impl PathBuilder {
    pub fn parse(&mut self, path_str: &str) -> Result<(), PathParseError> {
        PathParser::new(self, path_str).parse()
    }

    /// Consumes the `PathBuilder` and returns a compact, immutable representation as a `Path`.
    pub fn into_path(self) -> Path {
        Path(Rc::from(self.path_commands))
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.path_commands.push(PathCommand::MoveTo(x, y));
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        self.path_commands.push(PathCommand::LineTo(x, y));
    }

    pub fn curve_to(&mut self, x2: f64, y2: f64, x3: f64, y3: f64, x4: f64, y4: f64) {
        let curve = CubicBezierCurve {
            pt1: (x2, y2),
            pt2: (x3, y3),
            to: (x4, y4),
        };
        self.path_commands.push(PathCommand::CurveTo(curve));
    }

    pub fn close_path(&mut self) {
        self.path_commands.push(PathCommand::ClosePath);
    }
}

/// An immutable path; cheap to clone.
#[derive(Debug, Clone, PartialEq)]
pub struct Path(Rc<[PathCommand]>);

/// Extents for a path in its current coordinate system.
pub struct PathExtents {
    /// Extents of the "plain", unstroked path, or `None` if the path is empty.
    pub path_only: Option<Rect>,

    /// Extents for the stroked path, or `None` if the path is empty or zero-width.
    pub stroke: Option<Rect>,
}

impl Path {
    pub fn parse(d: &str) -> Result<Path, PathParseError> {
        let mut builder = PathBuilder::default();
        builder.parse(d)?;
        Ok(builder.into_path())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = PathCommand> + '_ {
        self.0.iter().copied()
    }

    /// Appends the path to the current Cairo path.
    ///
    /// Zero-length subpaths with a square line cap still need to produce a square, so
    /// they get a tiny horizontal segment.
    pub fn to_cairo(
        &self,
        cr: &cairo::Context,
        is_square_linecap: bool,
    ) -> Result<(), RenderingError> {
        let mut origin = None;
        let mut has_length = false;

        for cmd in self.iter() {
            match cmd {
                PathCommand::MoveTo(x, y) => {
                    if is_square_linecap {
                        add_zero_length_cap(cr, origin, has_length);
                    }
                    origin = Some((x, y));
                    has_length = false;
                }
                PathCommand::LineTo(x, y) => has_length |= origin != Some((x, y)),
                PathCommand::CurveTo(c) => has_length |= origin != Some(c.to) || c.pt1 != c.to,
                PathCommand::ClosePath => (),
            }

            cmd.to_cairo(cr);
        }

        if is_square_linecap {
            add_zero_length_cap(cr, origin, has_length);
        }

        // Out-of-range coordinates put the cr in an error state; catch it here.
        cr.status().map_err(|e| e.into())
    }

    /// Computes the path's extents, and those of its stroke with the given `line_width`.
    pub fn extents(&self, line_width: f64) -> Result<PathExtents, RenderingError> {
        if self.is_empty() {
            return Ok(PathExtents {
                path_only: None,
                stroke: None,
            });
        }

        let surface = cairo::RecordingSurface::create(cairo::Content::ColorAlpha, None)?;
        let cr = cairo::Context::new(&surface)?;

        self.to_cairo(&cr, false)?;
        let (x0, y0, x1, y1) = cr.path_extents()?;
        let path_only = Some(Rect::new(x0, y0, x1, y1));

        let stroke = if line_width > 0.0 {
            cr.set_line_width(line_width);
            let (x0, y0, x1, y1) = cr.stroke_extents()?;
            Some(Rect::new(x0, y0, x1, y1))
        } else {
            None
        };

        Ok(PathExtents { path_only, stroke })
    }
}

fn add_zero_length_cap(cr: &cairo::Context, origin: Option<(f64, f64)>, has_length: bool) {
    if let (Some((x, y)), false) = (origin, has_length) {
        let stroke_size = 0.002;
        cr.move_to(x - stroke_size / 2., y);
        cr.line_to(x + stroke_size / 2., y);
        cr.move_to(x, y);
    }
}

/// Builds a rectangle with optional rounded corners.
pub fn make_rect(x: f64, y: f64, w: f64, h: f64, rx: f64, ry: f64) -> Path {
    let mut builder = PathBuilder::default();

    if w <= 0.0 || h <= 0.0 {
        return builder.into_path();
    }

    let rx = rx.clamp(0.0, w / 2.0);
    let ry = ry.clamp(0.0, h / 2.0);

    if rx == 0.0 || ry == 0.0 {
        builder.move_to(x, y);
        builder.line_to(x + w, y);
        builder.line_to(x + w, y + h);
        builder.line_to(x, y + h);
        builder.line_to(x, y);
        builder.close_path();
        return builder.into_path();
    }

    let kx = rx * ARC_MAGIC;
    let ky = ry * ARC_MAGIC;

    builder.move_to(x + rx, y);
    builder.line_to(x + w - rx, y);
    builder.curve_to(x + w - rx + kx, y, x + w, y + ry - ky, x + w, y + ry);
    builder.line_to(x + w, y + h - ry);
    builder.curve_to(x + w, y + h - ry + ky, x + w - rx + kx, y + h, x + w - rx, y + h);
    builder.line_to(x + rx, y + h);
    builder.curve_to(x + rx - kx, y + h, x, y + h - ry + ky, x, y + h - ry);
    builder.line_to(x, y + ry);
    builder.curve_to(x, y + ry - ky, x + rx - kx, y, x + rx, y);
    builder.close_path();

    builder.into_path()
}

/// Control point distance for approximating a quarter ellipse with a cubic.
const ARC_MAGIC: f64 = 0.5522847498;

/// Builds an ellipse out of four cubic segments, starting at the rightmost point.
pub fn make_ellipse(cx: f64, cy: f64, rx: f64, ry: f64) -> Path {
    let mut builder = PathBuilder::default();

    if rx <= 0.0 || ry <= 0.0 {
        return builder.into_path();
    }

    let kx = rx * ARC_MAGIC;
    let ky = ry * ARC_MAGIC;

    builder.move_to(cx + rx, cy);
    builder.curve_to(cx + rx, cy + ky, cx + kx, cy + ry, cx, cy + ry);
    builder.curve_to(cx - kx, cy + ry, cx - rx, cy + ky, cx - rx, cy);
    builder.curve_to(cx - rx, cy - ky, cx - kx, cy - ry, cx, cy - ry);
    builder.curve_to(cx + kx, cy - ry, cx + rx, cy - ky, cx + rx, cy);
    builder.close_path();

    builder.into_path()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathParseError {
    /// Byte offset where the problem was found.
    pub position: usize,
    pub kind: PathParseErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathParseErrorKind {
    ExpectedNumber,
    UnexpectedToken,
    UnexpectedCommand(char),
    MissingMoveTo,
}

impl fmt::Display for PathParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self.kind {
            PathParseErrorKind::ExpectedNumber => "expected number".to_string(),
            PathParseErrorKind::UnexpectedToken => "unexpected token".to_string(),
            PathParseErrorKind::UnexpectedCommand(c) => format!("unsupported command '{c}'"),
            PathParseErrorKind::MissingMoveTo => "path data must start with a moveto".to_string(),
        };
        write!(f, "error at position {}: {}", self.position, description)
    }
}

impl std::error::Error for PathParseError {}

struct PathParser<'b> {
    builder: &'b mut PathBuilder,
    input: &'b [u8],
    pos: usize,

    current: (f64, f64),
    subpath_start: (f64, f64),

    // Second control point of the last C/S, or the control point of the last Q/T,
    // for reflection by a following S or T.
    last_cubic_ctrl: Option<(f64, f64)>,
    last_quad_ctrl: Option<(f64, f64)>,
}

impl<'b> PathParser<'b> {
    fn new(builder: &'b mut PathBuilder, path_str: &'b str) -> PathParser<'b> {
        PathParser {
            builder,
            input: path_str.as_bytes(),
            pos: 0,
            current: (0.0, 0.0),
            subpath_start: (0.0, 0.0),
            last_cubic_ctrl: None,
            last_quad_ctrl: None,
        }
    }

    fn error(&self, kind: PathParseErrorKind) -> PathParseError {
        PathParseError {
            position: self.pos,
            kind,
        }
    }

    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn skip_comma_whitespace(&mut self) {
        self.skip_whitespace();
        if self.input.get(self.pos) == Some(&b',') {
            self.pos += 1;
            self.skip_whitespace();
        }
    }

    fn at_number(&self) -> bool {
        matches!(
            self.input.get(self.pos),
            Some(b'0'..=b'9' | b'+' | b'-' | b'.')
        )
    }

    fn number(&mut self) -> Result<f64, PathParseError> {
        self.skip_comma_whitespace();

        let start = self.pos;
        let mut end = self.pos;
        let bytes = self.input;

        if matches!(bytes.get(end), Some(b'+' | b'-')) {
            end += 1;
        }
        while matches!(bytes.get(end), Some(b'0'..=b'9')) {
            end += 1;
        }
        if bytes.get(end) == Some(&b'.') {
            end += 1;
            while matches!(bytes.get(end), Some(b'0'..=b'9')) {
                end += 1;
            }
        }
        if matches!(bytes.get(end), Some(b'e' | b'E')) {
            let mut exp = end + 1;
            if matches!(bytes.get(exp), Some(b'+' | b'-')) {
                exp += 1;
            }
            if matches!(bytes.get(exp), Some(b'0'..=b'9')) {
                while matches!(bytes.get(exp), Some(b'0'..=b'9')) {
                    exp += 1;
                }
                end = exp;
            }
        }

        let value = std::str::from_utf8(&bytes[start..end])
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .ok_or_else(|| self.error(PathParseErrorKind::ExpectedNumber))?;

        self.pos = end;
        Ok(value)
    }

    fn point(&mut self, relative: bool) -> Result<(f64, f64), PathParseError> {
        let x = self.number()?;
        let y = self.number()?;

        if relative {
            Ok((self.current.0 + x, self.current.1 + y))
        } else {
            Ok((x, y))
        }
    }

    /// Whether another set of arguments follows for an implicitly repeated command.
    fn more_arguments(&mut self) -> bool {
        self.skip_comma_whitespace();
        self.at_number()
    }

    fn parse(&mut self) -> Result<(), PathParseError> {
        self.skip_whitespace();

        if self.pos == self.input.len() {
            return Ok(());
        }

        if !matches!(self.input[self.pos], b'M' | b'm') {
            return Err(self.error(PathParseErrorKind::MissingMoveTo));
        }

        loop {
            self.skip_whitespace();

            let Some(&c) = self.input.get(self.pos) else {
                return Ok(());
            };

            self.pos += 1;
            let relative = c.is_ascii_lowercase();

            match c.to_ascii_uppercase() {
                b'M' => self.moveto(relative)?,
                b'L' => self.repeat(|p| p.lineto(relative))?,
                b'H' => self.repeat(|p| p.horizontal(relative))?,
                b'V' => self.repeat(|p| p.vertical(relative))?,
                b'C' => self.repeat(|p| p.curveto(relative))?,
                b'S' => self.repeat(|p| p.smooth_curveto(relative))?,
                b'Q' => self.repeat(|p| p.quadratic(relative))?,
                b'T' => self.repeat(|p| p.smooth_quadratic(relative))?,
                b'Z' => self.closepath(),
                c if c.is_ascii_alphabetic() => {
                    self.pos -= 1;
                    return Err(self.error(PathParseErrorKind::UnexpectedCommand(char::from(c))));
                }
                _ => {
                    self.pos -= 1;
                    return Err(self.error(PathParseErrorKind::UnexpectedToken));
                }
            }
        }
    }

    fn repeat<F>(&mut self, mut f: F) -> Result<(), PathParseError>
    where
        F: FnMut(&mut Self) -> Result<(), PathParseError>,
    {
        f(self)?;
        while self.more_arguments() {
            f(self)?;
        }
        Ok(())
    }

    fn moveto(&mut self, relative: bool) -> Result<(), PathParseError> {
        let p = self.point(relative)?;
        self.builder.move_to(p.0, p.1);
        self.current = p;
        self.subpath_start = p;
        self.reset_ctrl();

        // Extra coordinate pairs after a moveto are implicit linetos.
        while self.more_arguments() {
            self.lineto(relative)?;
        }
        Ok(())
    }

    fn lineto(&mut self, relative: bool) -> Result<(), PathParseError> {
        let p = self.point(relative)?;
        self.line(p);
        Ok(())
    }

    fn horizontal(&mut self, relative: bool) -> Result<(), PathParseError> {
        let x = self.number()?;
        let x = if relative { self.current.0 + x } else { x };
        self.line((x, self.current.1));
        Ok(())
    }

    fn vertical(&mut self, relative: bool) -> Result<(), PathParseError> {
        let y = self.number()?;
        let y = if relative { self.current.1 + y } else { y };
        self.line((self.current.0, y));
        Ok(())
    }

    fn line(&mut self, p: (f64, f64)) {
        self.builder.line_to(p.0, p.1);
        self.current = p;
        self.reset_ctrl();
    }

    fn curveto(&mut self, relative: bool) -> Result<(), PathParseError> {
        let p1 = self.point(relative)?;
        let p2 = self.point(relative)?;
        let to = self.point(relative)?;
        self.cubic(p1, p2, to);
        Ok(())
    }

    fn smooth_curveto(&mut self, relative: bool) -> Result<(), PathParseError> {
        let p1 = reflect(self.last_cubic_ctrl, self.current);
        let p2 = self.point(relative)?;
        let to = self.point(relative)?;
        self.cubic(p1, p2, to);
        Ok(())
    }

    fn cubic(&mut self, p1: (f64, f64), p2: (f64, f64), to: (f64, f64)) {
        self.builder.curve_to(p1.0, p1.1, p2.0, p2.1, to.0, to.1);
        self.current = to;
        self.last_cubic_ctrl = Some(p2);
        self.last_quad_ctrl = None;
    }

    fn quadratic(&mut self, relative: bool) -> Result<(), PathParseError> {
        let ctrl = self.point(relative)?;
        let to = self.point(relative)?;
        self.quad(ctrl, to);
        Ok(())
    }

    fn smooth_quadratic(&mut self, relative: bool) -> Result<(), PathParseError> {
        let ctrl = reflect(self.last_quad_ctrl, self.current);
        let to = self.point(relative)?;
        self.quad(ctrl, to);
        Ok(())
    }

    fn quad(&mut self, ctrl: (f64, f64), to: (f64, f64)) {
        let (x0, y0) = self.current;

        // raise the degree to a cubic
        let p1 = (x0 + 2.0 / 3.0 * (ctrl.0 - x0), y0 + 2.0 / 3.0 * (ctrl.1 - y0));
        let p2 = (to.0 + 2.0 / 3.0 * (ctrl.0 - to.0), to.1 + 2.0 / 3.0 * (ctrl.1 - to.1));

        self.builder.curve_to(p1.0, p1.1, p2.0, p2.1, to.0, to.1);
        self.current = to;
        self.last_quad_ctrl = Some(ctrl);
        self.last_cubic_ctrl = None;
    }

    fn closepath(&mut self) {
        self.builder.close_path();
        self.current = self.subpath_start;
        self.reset_ctrl();
    }

    fn reset_ctrl(&mut self) {
        self.last_cubic_ctrl = None;
        self.last_quad_ctrl = None;
    }
}

fn reflect(ctrl: Option<(f64, f64)>, about: (f64, f64)) -> (f64, f64) {
    match ctrl {
        Some((x, y)) => (2.0 * about.0 - x, 2.0 * about.1 - y),
        None => about,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commands(d: &str) -> Vec<PathCommand> {
        Path::parse(d).unwrap().iter().collect()
    }

    #[test]
    fn parses_absolute_and_relative() {
        assert_eq!(
            commands("M10 20 l5,5 H0 v-10 z"),
            vec![
                PathCommand::MoveTo(10.0, 20.0),
                PathCommand::LineTo(15.0, 25.0),
                PathCommand::LineTo(0.0, 25.0),
                PathCommand::LineTo(0.0, 15.0),
                PathCommand::ClosePath,
            ]
        );
    }

    #[test]
    fn implicit_lineto_after_moveto() {
        assert_eq!(
            commands("m1,1 2,2"),
            vec![PathCommand::MoveTo(1.0, 1.0), PathCommand::LineTo(3.0, 3.0)]
        );
    }

    #[test]
    fn compact_numbers() {
        assert_eq!(
            commands("M.5.5L-1-1e1"),
            vec![PathCommand::MoveTo(0.5, 0.5), PathCommand::LineTo(-1.0, -10.0)]
        );
    }

    #[test]
    fn smooth_curve_reflects_control_point() {
        let cmds = commands("M0 0 C 0 10 10 10 10 0 S 20 -10 20 0");
        assert_eq!(
            cmds[2],
            PathCommand::CurveTo(CubicBezierCurve {
                pt1: (10.0, -10.0),
                pt2: (20.0, -10.0),
                to: (20.0, 0.0),
            })
        );
    }

    #[test]
    fn quadratic_becomes_cubic() {
        let cmds = commands("M0 0 Q 3 3 6 0");
        assert_eq!(
            cmds[1],
            PathCommand::CurveTo(CubicBezierCurve {
                pt1: (2.0, 2.0),
                pt2: (4.0, 2.0),
                to: (6.0, 0.0),
            })
        );
    }

    #[test]
    fn errors() {
        assert_eq!(
            Path::parse("L 1 1").unwrap_err().kind,
            PathParseErrorKind::MissingMoveTo
        );
        assert_eq!(
            Path::parse("M 1 1 A 1 1 0 0 0 2 2").unwrap_err().kind,
            PathParseErrorKind::UnexpectedCommand('A')
        );
        assert_eq!(
            Path::parse("M 1").unwrap_err().kind,
            PathParseErrorKind::ExpectedNumber
        );
        assert!(Path::parse("").unwrap().is_empty());
    }

    #[test]
    fn extents_of_rect() {
        let path = make_rect(10.0, 20.0, 30.0, 40.0, 0.0, 0.0);
        let extents = path.extents(2.0).unwrap();
        assert!(extents
            .path_only
            .unwrap()
            .approx_eq(&Rect::new(10.0, 20.0, 40.0, 60.0)));
        assert!(extents
            .stroke
            .unwrap()
            .approx_eq(&Rect::new(9.0, 19.0, 41.0, 61.0)));
    }

    #[test]
    fn ellipse_extents() {
        let extents = make_ellipse(50.0, 50.0, 20.0, 10.0).extents(0.0).unwrap();
        assert!(extents
            .path_only
            .unwrap()
            .approx_eq(&Rect::new(30.0, 40.0, 70.0, 60.0)));
        assert!(extents.stroke.is_none());
    }

    #[test]
    fn degenerate_shapes_are_empty() {
        assert!(make_rect(0.0, 0.0, 0.0, 10.0, 0.0, 0.0).is_empty());
        assert!(make_ellipse(0.0, 0.0, 5.0, 0.0).is_empty());
    }
}
