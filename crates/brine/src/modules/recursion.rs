//! Recursion helpers, defined in brine itself.
//!
//! This is the source-defined module flavor: the snippet is evaluated at
//! import time in a fresh persistent scope and the declared exports are
//! collected from it.

use super::SourceModule;

pub(crate) static MODULE: SourceModule = SourceModule {
    name: "recursion",
    exports: &["foldr"],
    source: r"
{ { (b _ ())     { b }
    (b f (a as)) { b f as foldr a f ! }
  } case
} :foldr jar
",
};
