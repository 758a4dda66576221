use predicates::prelude::*;
use predicates::reflection::{Case, Child, PredicateReflection, Product};
use std::fmt;

/// Checks that the variable of type [u8] can be parsed as a PNG file.
#[derive(Debug)]
pub struct PngPredicate {}

impl PngPredicate {
    pub fn with_size(self, w: u32, h: u32) -> SizePredicate {
        SizePredicate { p: self, w, h }
    }
}

fn read_size(data: &[u8]) -> Result<(u32, u32), png::DecodingError> {
    let reader = png::Decoder::new(data).read_info()?;
    let info = reader.info();
    Ok((info.width, info.height))
}

impl Predicate<[u8]> for PngPredicate {
    fn eval(&self, data: &[u8]) -> bool {
        read_size(data).is_ok()
    }

    fn find_case<'a>(&'a self, _expected: bool, data: &[u8]) -> Option<Case<'a>> {
        match read_size(data) {
            Ok(_) => None,
            Err(e) => Some(Case::new(Some(self), false).add_product(Product::new("Error", e))),
        }
    }
}

impl PredicateReflection for PngPredicate {}

impl fmt::Display for PngPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "is a PNG")
    }
}

/// Extends a PngPredicate by a check for a given size of the PNG file.
#[derive(Debug)]
pub struct SizePredicate {
    p: PngPredicate,
    w: u32,
    h: u32,
}

impl Predicate<[u8]> for SizePredicate {
    fn eval(&self, data: &[u8]) -> bool {
        read_size(data).map_or(false, |size| size == (self.w, self.h))
    }

    fn find_case<'a>(&'a self, expected: bool, data: &[u8]) -> Option<Case<'a>> {
        match read_size(data) {
            Ok((w, h)) if ((w, h) == (self.w, self.h)) == expected => Some(
                Case::new(Some(self), expected)
                    .add_product(Product::new("actual size", format!("{w} x {h}"))),
            ),
            Ok(_) => None,
            Err(e) => Some(Case::new(Some(self), false).add_product(Product::new("Error", e))),
        }
    }
}

impl PredicateReflection for SizePredicate {
    fn children<'a>(&'a self) -> Box<dyn Iterator<Item = Child<'a>> + 'a> {
        let params = vec![Child::new("predicate", &self.p)];
        Box::new(params.into_iter())
    }
}

impl fmt::Display for SizePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "is a PNG with size {} x {}", self.w, self.h)
    }
}
