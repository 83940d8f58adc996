//! Compiles Parsing Expression Grammars into the Go source of a
//! recursive-descent recognizer.
//!
//! A front-end assembles the grammar through the stack-discipline builder
//! verbs on [`Tree`] (rules, terminals, actions, directives), then
//! [`Tree::compile`] analyzes the tree, optionally rewrites disjoint
//! alternates into byte-dispatch switches, and emits a self-contained
//! parser: one entry point per rule, explicit save/restore backtracking
//! with unnecessary snapshots elided by a dry emission pass, and semantic
//! actions deferred until a `commit` succeeds.
//!
//! Grammar-level problems (undefined or unused rules, left recursion) are
//! reported to an [`ErrorAccumulator`] and never abort compilation.

pub mod analysis;
pub mod ast;
pub mod charset;
pub mod codegen;
pub mod error;
pub mod optimize;

use std::fmt;
use std::io;
use std::path::Path;

pub use ast::{ActionHandle, Defines, Expr, ListKind, NodeKind, RcString, Rule, RuleHandle, Tree};
pub use charset::CharSet;
pub use error::ErrorAccumulator;

impl Tree {
    /// Runs the full pipeline against `out`: name resolution, the three
    /// analysis passes, the switch rewrite when enabled, then two-pass
    /// emission.
    pub fn compile(&mut self, out: &mut dyn fmt::Write, err: &ErrorAccumulator) -> fmt::Result {
        self.finish(err);
        let analysis = analysis::analyze(self, err);
        if self.switch {
            optimize::optimize_alternates(self);
        }
        codegen::emit(self, &analysis, err, out)
    }

    pub fn compile_to_string(&mut self, err: &ErrorAccumulator) -> String {
        let mut buffer = String::new();
        self.compile(&mut buffer, err)
            .expect("a String sink does not fail");
        buffer
    }

    /// Emission aborts with a message on the error stream when the output
    /// file cannot be written.
    pub fn compile_to_file(&mut self, path: &Path, err: &ErrorAccumulator) -> io::Result<()> {
        let source = self.compile_to_string(err);
        if let Err(e) = std::fs::write(path, source) {
            eprintln!("{}: {e}", path.display());
            return Err(e);
        }
        Ok(())
    }
}
