use cranelift_entity::SecondaryMap;

use crate::ast::{Expr, ListKind, RuleHandle, Tree};
use crate::error::ErrorAccumulator;

type PathSet = SecondaryMap<RuleHandle, bool>;

/// Decides for every rule whether matching it must consume input, and
/// diagnoses rules re-entered along the walk before anything was consumed
/// (left recursion would loop forever in the generated recognizer).
pub fn check_left_recursion(tree: &Tree, err: &ErrorAccumulator) {
    let mut on_path = PathSet::new();
    for &handle in &tree.order {
        consumes_rule(tree, handle, &mut on_path, err);
    }
}

fn consumes_rule(
    tree: &Tree,
    handle: RuleHandle,
    on_path: &mut PathSet,
    err: &ErrorAccumulator,
) -> bool {
    let rule = &tree.rules[handle];
    if on_path[handle] {
        err.warning(format_args!(
            "possible infinite left recursion in rule '{}'",
            rule.name
        ));
        return false;
    }
    on_path[handle] = true;
    let consumes = match &rule.expression {
        Some(expression) => consumes_expr(tree, expression, on_path, err),
        None => false,
    };
    on_path[handle] = false;
    consumes
}

fn consumes_expr(
    tree: &Tree,
    expr: &Expr,
    on_path: &mut PathSet,
    err: &ErrorAccumulator,
) -> bool {
    match expr {
        Expr::Character(text) | Expr::Str(text) => !text.is_empty(),
        Expr::Dot | Expr::Class { .. } => true,
        Expr::Name { name, .. } => match tree.by_name.get(name) {
            Some(&target) => consumes_rule(tree, target, on_path, err),
            None => false,
        },
        Expr::List { kind, items } => match kind {
            // an alternate consumes only if every branch does
            ListKind::Alternate => items
                .iter()
                .all(|item| consumes_expr(tree, item, on_path, err)),
            // a sequence consumes once any element does
            ListKind::Sequence => items
                .iter()
                .any(|item| consumes_expr(tree, item, on_path, err)),
            ListKind::Plus => consumes_expr(tree, &items[0], on_path, err),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Tree;

    fn check(tree: &mut Tree) -> Vec<String> {
        let err = ErrorAccumulator::new();
        tree.finish(&err);
        check_left_recursion(tree, &err);
        let messages = err.get().iter().map(|w| w.to_string()).collect();
        messages
    }

    #[test]
    fn direct_left_recursion() {
        // R = R 'a' / 'a'
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_name("R");
        tree.add_string("a");
        tree.add_sequence();
        tree.add_string("a");
        tree.add_alternate();
        tree.add_expression();

        let warnings = check(&mut tree);
        assert!(warnings
            .iter()
            .any(|w| w == "possible infinite left recursion in rule 'R'"));
    }

    #[test]
    fn indirect_left_recursion() {
        // A = B 'x' ; B = A 'y'
        let mut tree = Tree::new(false, false);
        tree.add_rule("A");
        tree.add_name("B");
        tree.add_string("x");
        tree.add_sequence();
        tree.add_expression();
        tree.add_rule("B");
        tree.add_name("A");
        tree.add_string("y");
        tree.add_sequence();
        tree.add_expression();

        let warnings = check(&mut tree);
        assert!(warnings
            .iter()
            .any(|w| w.starts_with("possible infinite left recursion")));
    }

    #[test]
    fn consuming_prefix_is_fine() {
        // R = 'a' R / 'a'  — right recursion, consumes first
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_string("a");
        tree.add_name("R");
        tree.add_sequence();
        tree.add_string("a");
        tree.add_alternate();
        tree.add_expression();

        assert!(check(&mut tree).is_empty());
    }

    #[test]
    fn star_prefix_does_not_shield() {
        // R = 'a'* R  — the star may match nothing, so R recurses at the
        // same position
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_string("a");
        tree.add_star();
        tree.add_name("R");
        tree.add_sequence();
        tree.add_expression();

        let warnings = check(&mut tree);
        assert!(warnings
            .iter()
            .any(|w| w == "possible infinite left recursion in rule 'R'"));
    }

    #[test]
    fn plus_prefix_shields() {
        // R = 'a'+ R
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_string("a");
        tree.add_plus();
        tree.add_name("R");
        tree.add_sequence();
        tree.add_expression();

        assert!(check(&mut tree).is_empty());
    }
}
