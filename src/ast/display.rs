use std::fmt::{self, Write as _};

use super::{Expr, ListKind, RuleHandle, Tree};

/// A rule name as a Go identifier: dashes become underscores.
pub struct GoName<'a>(pub &'a str);

impl fmt::Display for GoName<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for c in self.0.chars() {
            f.write_char(if c == '-' { '_' } else { c })?;
        }
        Ok(())
    }
}

/// A byte inside an emitted Go character literal (`case` labels and
/// `matchChar` arguments built from resolved sets).
pub struct CaseByteDisplay(pub u8);

impl fmt::Display for CaseByteDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            0x07 => f.write_str("\\a"),
            0x08 => f.write_str("\\b"),
            0x0c => f.write_str("\\f"),
            b'\n' => f.write_str("\\n"),
            b'\r' => f.write_str("\\r"),
            b'\t' => f.write_str("\\t"),
            0x0b => f.write_str("\\v"),
            b'\\' => f.write_str("\\\\"),
            b'\'' => f.write_str("\\'"),
            b => write!(f, "{}", char::from(b)),
        }
    }
}

/// One-line rendering of a rule, `Name <- expression`, used in the comment
/// that precedes each entry of the emitted rules table.
pub struct RuleDisplay<'a> {
    pub tree: &'a Tree,
    pub handle: RuleHandle,
}

impl fmt::Display for RuleDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = &self.tree.rules[self.handle];
        write!(f, "{} <- ", rule.name)?;
        if let Some(expression) = &rule.expression {
            write_expr(self.tree, expression, f)?;
        }
        Ok(())
    }
}

fn write_list(
    tree: &Tree,
    items: &[Expr],
    separator: &str,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.write_str("(")?;
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(separator)?;
        }
        write_expr(tree, item, f)?;
    }
    f.write_str(")")
}

fn write_expr(tree: &Tree, expr: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match expr {
        Expr::Dot => f.write_str("."),
        Expr::Name { name, .. } => write!(f, "{name}"),
        Expr::Character(text) | Expr::Str(text) => write!(f, "'{text}'"),
        Expr::Class { text, .. } => write!(f, "[{text}]"),
        Expr::Predicate(text) => write!(f, "&{{{text}}}"),
        Expr::Action(handle) => write!(f, "{{{}}}", tree.actions[*handle].text),
        Expr::Commit => f.write_str("commit"),
        Expr::Begin => f.write_str("<"),
        Expr::End => f.write_str(">"),
        Expr::Nil => Ok(()),
        Expr::List { kind, items } => match kind {
            ListKind::Alternate => write_list(tree, items, " / ", f),
            ListKind::UnorderedAlternate => write_list(tree, items, " | ", f),
            ListKind::Sequence => write_list(tree, items, " ", f),
            ListKind::PeekFor => {
                f.write_str("&")?;
                write_expr(tree, &items[0], f)
            }
            ListKind::PeekNot => {
                f.write_str("!")?;
                write_expr(tree, &items[0], f)
            }
            ListKind::Query => {
                write_expr(tree, &items[0], f)?;
                f.write_str("?")
            }
            ListKind::Star => {
                write_expr(tree, &items[0], f)?;
                f.write_str("*")
            }
            ListKind::Plus => {
                write_expr(tree, &items[0], f)?;
                f.write_str("+")
            }
        },
    }
}
