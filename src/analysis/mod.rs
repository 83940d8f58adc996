//! Read-only passes over a finished tree. They are independent of each
//! other and of emission; `analyze` runs them back to back and bundles the
//! outputs the generator needs.

pub mod counts;
pub mod reach;
pub mod recursion;

use std::collections::HashMap;

use crate::ast::{NodeKind, RcString, Tree};
use crate::error::ErrorAccumulator;

pub struct Analysis {
    /// Occurrences per node kind across every rule; gates which matcher
    /// helpers get emitted.
    pub counts: [u32; NodeKind::COUNT],
    /// Reference counts from the DFS rooted at the start rule.
    pub rules_count: HashMap<RcString, u32>,
}

impl Analysis {
    pub fn count(&self, kind: NodeKind) -> u32 {
        self.counts[kind as usize]
    }
}

pub fn analyze(tree: &Tree, err: &ErrorAccumulator) -> Analysis {
    let counts = counts::count_kinds(tree);
    let rules_count = reach::count_references(tree, err);
    recursion::check_left_recursion(tree, err);
    Analysis {
        counts,
        rules_count,
    }
}
