use std::collections::HashMap;

use cranelift_entity::EntitySet;

use crate::ast::{Expr, RcString, RuleHandle, Tree};
use crate::error::ErrorAccumulator;

/// Depth-first walk from the start rule following `Name` edges. Every
/// arrival at a rule bumps its count; only the first arrival recurses into
/// its body. Declared rules the walk never reaches are diagnosed as unused,
/// reached rules without a body as undefined.
pub fn count_references(tree: &Tree, err: &ErrorAccumulator) -> HashMap<RcString, u32> {
    let mut counts = HashMap::new();
    let mut reached = EntitySet::new();
    if let Some(start) = tree.start_rule() {
        visit_rule(tree, start, &mut counts, &mut reached);
    }

    for &handle in &tree.order {
        let rule = &tree.rules[handle];
        if rule.expression.is_none() {
            // placeholders exist only because a Name referenced them
            err.warning(format_args!("rule '{}' used but not defined", rule.name));
        } else if !counts.contains_key(&rule.name) {
            err.warning(format_args!("rule '{}' defined but not used", rule.name));
        }
    }
    counts
}

fn visit_rule(
    tree: &Tree,
    handle: RuleHandle,
    counts: &mut HashMap<RcString, u32>,
    reached: &mut EntitySet<RuleHandle>,
) {
    let rule = &tree.rules[handle];
    *counts.entry(rule.name.clone()).or_insert(0) += 1;
    if reached.contains(handle) {
        return;
    }
    reached.insert(handle);
    if let Some(expression) = &rule.expression {
        visit_expr(tree, expression, counts, reached);
    }
}

fn visit_expr(
    tree: &Tree,
    expr: &Expr,
    counts: &mut HashMap<RcString, u32>,
    reached: &mut EntitySet<RuleHandle>,
) {
    match expr {
        Expr::Name { name, .. } => {
            if let Some(&target) = tree.by_name.get(name) {
                visit_rule(tree, target, counts, reached);
            }
        }
        Expr::List { items, .. } => {
            for item in items {
                visit_expr(tree, item, counts, reached);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Tree;

    fn leaf_rule(tree: &mut Tree, name: &str) {
        tree.add_rule(name);
        tree.add_string("x");
        tree.add_expression();
    }

    #[test]
    fn undefined_rule_is_diagnosed() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("A");
        tree.add_name("B");
        tree.add_string("x");
        tree.add_sequence();
        tree.add_expression();
        let err = ErrorAccumulator::new();
        tree.finish(&err);

        let counts = count_references(&tree, &err);
        assert_eq!(counts.get("A"), Some(&1));
        assert_eq!(counts.get("B"), Some(&1));
        assert!(err
            .get()
            .iter()
            .any(|w| &**w == "rule 'B' used but not defined"));
    }

    #[test]
    fn unused_rule_is_diagnosed() {
        let mut tree = Tree::new(false, false);
        leaf_rule(&mut tree, "A");
        leaf_rule(&mut tree, "C");
        let err = ErrorAccumulator::new();
        tree.finish(&err);

        count_references(&tree, &err);
        assert!(err
            .get()
            .iter()
            .any(|w| &**w == "rule 'C' defined but not used"));
        assert!(!err.get().iter().any(|w| w.contains("'A'")));
    }

    #[test]
    fn recursive_references_count_without_looping() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("A");
        tree.add_string("x");
        tree.add_name("A");
        tree.add_sequence();
        tree.add_name("B");
        tree.add_alternate();
        tree.add_expression();
        leaf_rule(&mut tree, "B");
        let err = ErrorAccumulator::new();
        tree.finish(&err);

        let counts = count_references(&tree, &err);
        assert_eq!(counts.get("A"), Some(&2));
        assert_eq!(counts.get("B"), Some(&1));
        assert!(err.is_empty());
    }
}
