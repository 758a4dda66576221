use predicates::prelude::*;
use predicates::reflection::{Case, Child, PredicateReflection, Product};
use std::fmt;

/// Checks that the variable of type [u8] can be parsed as a PDF file.
#[derive(Debug)]
pub struct PdfPredicate {}

impl PdfPredicate {
    pub fn with_page_count(self, num_pages: usize) -> DetailPredicate {
        DetailPredicate {
            p: self,
            d: Detail::PageCount(num_pages),
        }
    }

    /// Size of the first page, in points.
    pub fn with_page_size(self, width: f64, height: f64) -> DetailPredicate {
        DetailPredicate {
            p: self,
            d: Detail::PageSize(width, height),
        }
    }

    pub fn with_info(self, key: &'static str, value: &'static str) -> DetailPredicate {
        DetailPredicate {
            p: self,
            d: Detail::InfoStartsWith(key, value),
        }
    }
}

impl Predicate<[u8]> for PdfPredicate {
    fn eval(&self, data: &[u8]) -> bool {
        lopdf::Document::load_mem(data).is_ok()
    }

    fn find_case<'a>(&'a self, _expected: bool, data: &[u8]) -> Option<Case<'a>> {
        match lopdf::Document::load_mem(data) {
            Ok(_) => None,
            Err(e) => Some(Case::new(Some(self), false).add_product(Product::new("Error", e))),
        }
    }
}

impl PredicateReflection for PdfPredicate {}

impl fmt::Display for PdfPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "is a PDF")
    }
}

/// Extends a PdfPredicate by a check for page count, page size or an entry of the
/// document information dictionary.
#[derive(Debug)]
pub struct DetailPredicate {
    p: PdfPredicate,
    d: Detail,
}

#[derive(Debug)]
enum Detail {
    PageCount(usize),
    PageSize(f64, f64),
    InfoStartsWith(&'static str, &'static str),
}

fn number(obj: &lopdf::Object) -> Option<f64> {
    match *obj {
        lopdf::Object::Integer(i) => Some(i as f64),
        lopdf::Object::Real(r) => Some(r as f64),
        _ => None,
    }
}

fn page_size(doc: &lopdf::Document) -> Option<(f64, f64)> {
    let id = doc.page_iter().next()?;
    let page = doc.get_object(id).ok()?.as_dict().ok()?;
    let media_box = page.get(b"MediaBox").ok()?.as_array().ok()?;

    Some((number(media_box.get(2)?)?, number(media_box.get(3)?)?))
}

fn info(doc: &lopdf::Document, key: &str) -> Option<String> {
    let id = doc.trailer.get(b"Info").ok()?.as_reference().ok()?;
    let dict = doc.get_object(id).ok()?.as_dict().ok()?;
    let value = dict.get(key.as_bytes()).ok()?.as_str().ok()?;

    Some(String::from_utf8_lossy(value).into_owned())
}

impl DetailPredicate {
    fn eval_doc(&self, doc: &lopdf::Document) -> bool {
        match self.d {
            Detail::PageCount(n) => doc.get_pages().len() == n,
            Detail::PageSize(w, h) => page_size(doc).map_or(false, |(pw, ph)| {
                (pw - w).abs() < 0.01 && (ph - h).abs() < 0.01
            }),
            Detail::InfoStartsWith(key, value) => {
                info(doc, key).map_or(false, |s| s.starts_with(value))
            }
        }
    }

    fn product_for_doc(&self, doc: &lopdf::Document) -> Product {
        match self.d {
            Detail::PageCount(_) => Product::new(
                "actual page count",
                format!("{} page(s)", doc.get_pages().len()),
            ),
            Detail::PageSize(..) => {
                Product::new("actual page size", format!("{:?}", page_size(doc)))
            }
            Detail::InfoStartsWith(key, _) => {
                Product::new("actual value", format!("{:?}", info(doc, key)))
            }
        }
    }
}

impl Predicate<[u8]> for DetailPredicate {
    fn eval(&self, data: &[u8]) -> bool {
        match lopdf::Document::load_mem(data) {
            Ok(doc) => self.eval_doc(&doc),
            _ => false,
        }
    }

    fn find_case<'a>(&'a self, expected: bool, data: &[u8]) -> Option<Case<'a>> {
        match lopdf::Document::load_mem(data) {
            Ok(doc) if self.eval_doc(&doc) == expected => Some(
                Case::new(Some(self), expected).add_product(self.product_for_doc(&doc)),
            ),
            Ok(_) => None,
            Err(e) => Some(Case::new(Some(self), false).add_product(Product::new("Error", e))),
        }
    }
}

impl PredicateReflection for DetailPredicate {
    fn children<'a>(&'a self) -> Box<dyn Iterator<Item = Child<'a>> + 'a> {
        let params = vec![Child::new("predicate", &self.p)];
        Box::new(params.into_iter())
    }
}

impl fmt::Display for DetailPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.d {
            Detail::PageCount(n) => write!(f, "is a PDF with {n} page(s)"),
            Detail::PageSize(w, h) => write!(f, "is a PDF with a first page of {w} x {h} pt"),
            Detail::InfoStartsWith(key, value) => {
                write!(f, "is a PDF whose {key} starts with {value:?}")
            }
        }
    }
}
