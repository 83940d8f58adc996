use crate::ast::{Expr, NodeKind, Tree};

/// Walks every rule's expression once, tallying occurrences by node kind.
/// A placeholder rule contributes a `Nil` for its missing body.
pub fn count_kinds(tree: &Tree) -> [u32; NodeKind::COUNT] {
    let mut counts = [0u32; NodeKind::COUNT];
    for &handle in &tree.order {
        counts[NodeKind::Rule as usize] += 1;
        match &tree.rules[handle].expression {
            Some(expression) => count_expr(expression, &mut counts),
            None => counts[NodeKind::Nil as usize] += 1,
        }
    }
    counts
}

fn count_expr(expr: &Expr, counts: &mut [u32; NodeKind::COUNT]) {
    counts[expr.kind() as usize] += 1;
    if let Expr::List { items, .. } = expr {
        for item in items {
            count_expr(item, counts);
        }
    }
}
