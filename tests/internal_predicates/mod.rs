pub mod file;
pub mod pdf;
pub mod png;

use predicates::str;

pub fn ends_with_pkg_version() -> str::EndsWithPredicate {
    str::ends_with(concat!(env!("CARGO_PKG_VERSION"), "\n"))
}
