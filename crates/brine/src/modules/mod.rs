//! Built-in module implementations.
//!
//! Import resolution walks this fixed registry. Modules come in two flavors:
//! host-defined (a table of natives, built on demand) and source-defined
//! (brine source evaluated at import time in a fresh persistent scope whose
//! declared exports are collected).

use crate::natives::ModuleBuilder;

pub(crate) mod boxes;
pub(crate) mod math;
pub(crate) mod recursion;
pub(crate) mod strings;
pub(crate) mod threading;

/// A source-defined module: a snippet of brine evaluated at import time.
#[derive(Debug)]
pub(crate) struct SourceModule {
    pub name: &'static str,
    pub exports: &'static [&'static str],
    pub source: &'static str,
}

/// A module resolved from the registry.
pub(crate) enum ResolvedModule {
    Host(ModuleBuilder),
    Source(&'static SourceModule),
}

/// Looks a module up by name.
pub(crate) fn resolve(name: &str) -> Option<ResolvedModule> {
    match name {
        "math" => Some(ResolvedModule::Host(math::module())),
        "boxes" => Some(ResolvedModule::Host(boxes::module())),
        "strings" => Some(ResolvedModule::Host(strings::module())),
        "threading" => Some(ResolvedModule::Host(threading::module())),
        "recursion" => Some(ResolvedModule::Source(&recursion::MODULE)),
        _ => None,
    }
}

/// Member names of a module, for static tooling such as import discovery.
/// Source modules report their declared exports without being evaluated.
pub(crate) fn member_names(name: &str) -> Option<Vec<String>> {
    match resolve(name)? {
        ResolvedModule::Host(builder) => Some(builder.member_names()),
        ResolvedModule::Source(module) => Some(module.exports.iter().map(|e| (*e).to_owned()).collect()),
    }
}
