//! Unique name generation for blocks, regions and control variables.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

/// Unique name generator.
///
/// Names have the form `<prefix>_<n>` where the counter for each prefix
/// starts at 0 and advances in the order names are requested, which makes
/// transformations reproducible. The counter table sits behind a shared
/// handle: a graph and all of its subregions clone the same generator, so
/// a name handed out anywhere in the hierarchy is unique everywhere.
#[derive(Debug, Clone, Default)]
pub struct NameGenerator {
    counters: Rc<RefCell<IndexMap<String, u64>>>,
}

impl NameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_index(&self, prefix: &str) -> u64 {
        let mut counters = self.counters.borrow_mut();
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        let index = *counter;
        *counter += 1;
        index
    }

    /// Returns a fresh block name `<kind>_<n>`.
    pub fn new_block_name(&self, kind: &str) -> String {
        let index = self.next_index(kind);
        format!("{kind}_{index}")
    }

    /// Returns a fresh region name `<kind>_region_<n>`.
    pub fn new_region_name(&self, kind: &str) -> String {
        let prefix = format!("{kind}_region");
        let index = self.next_index(&prefix);
        format!("{prefix}_{index}")
    }

    /// Returns a fresh variable name `<kind>_var_<n>`.
    pub fn new_var_name(&self, kind: &str) -> String {
        let prefix = format!("{kind}_var");
        let index = self.next_index(&prefix);
        format!("{prefix}_{index}")
    }

    /// Seeds the counters past an existing name of the form `<prefix>_<n>`.
    ///
    /// Deserialization feeds every parsed block name through this so that
    /// synthetic names generated later cannot collide with names already
    /// present in the input.
    pub fn observe_name(&self, name: &str) {
        let Some((prefix, suffix)) = name.rsplit_once('_') else {
            return;
        };
        let Ok(index) = suffix.parse::<u64>() else {
            return;
        };
        let mut counters = self.counters.borrow_mut();
        let counter = counters.entry(prefix.to_string()).or_insert(0);
        *counter = (*counter).max(index + 1);
    }
}
