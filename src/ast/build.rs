//! Stack-discipline builder verbs. The front-end drives these in postfix
//! order: operands are pushed, combining verbs pop them and push the
//! combined node. During a rule body the bottom of the stack is always the
//! rule being defined. Stack balance is the front-end's responsibility.

use crate::charset::CharSet;

use super::{ActionData, BuildNode, Expr, ListKind, Rule, RuleHandle, Tree};

impl Tree {
    fn push(&mut self, expr: Expr) {
        self.stack.push(BuildNode::Expr(expr));
    }

    fn pop_expr(&mut self) -> Expr {
        match self.stack.pop() {
            Some(BuildNode::Expr(expr)) => expr,
            _ => panic!("builder stack imbalance"),
        }
    }

    fn current_rule(&self) -> RuleHandle {
        match self.stack.first() {
            Some(&BuildNode::Rule(handle)) => handle,
            _ => panic!("builder verb outside a rule body"),
        }
    }

    pub fn add_rule(&mut self, name: &str) {
        let handle = self.rules.push(Rule::new(name.into()));
        self.stack.push(BuildNode::Rule(handle));
    }

    pub fn add_expression(&mut self) {
        let expression = self.pop_expr();
        let handle = match self.stack.pop() {
            Some(BuildNode::Rule(handle)) => handle,
            _ => panic!("builder stack imbalance"),
        };
        self.rules[handle].expression = Some(expression);
        self.order.push(handle);
    }

    /// The next `add_name` captures its result into `name`, a variable of
    /// the current rule. Slots are assigned in declaration order: the i-th
    /// distinct variable of a rule lives at offset `-(i + 1)`.
    pub fn add_variable(&mut self, name: &str) {
        let handle = self.current_rule();
        let variables = &mut self.rules[handle].variables;
        let index = match variables.iter().position(|v| &**v == name) {
            Some(index) => index,
            None => {
                variables.push(name.into());
                variables.len() - 1
            }
        };
        self.pending_var = Some(-(index as i32 + 1));
    }

    pub fn add_name(&mut self, name: &str) {
        self.referenced.insert(name.into());
        let var = self.pending_var.take();
        self.push(Expr::Name {
            name: name.into(),
            var,
        });
    }

    pub fn add_dot(&mut self) {
        self.push(Expr::Dot);
    }

    pub fn add_begin(&mut self) {
        self.push(Expr::Begin);
    }

    pub fn add_end(&mut self) {
        self.push(Expr::End);
    }

    pub fn add_commit(&mut self) {
        self.push(Expr::Commit);
    }

    pub fn add_nil(&mut self) {
        self.push(Expr::Nil);
    }

    /// One raw byte or a two-byte escape is a `Character`; anything longer
    /// is a `Str`.
    pub fn add_string(&mut self, text: &str) {
        let bytes = text.as_bytes();
        if bytes.len() == 1 || (bytes.len() == 2 && bytes[0] == b'\\') {
            self.push(Expr::Character(text.into()));
        } else {
            self.push(Expr::Str(text.into()));
        }
    }

    /// Resolves the class body on first sight and registers it under its
    /// literal text, so every later occurrence of the same spelling shares
    /// one table slot.
    pub fn add_class(&mut self, text: &str) {
        let set = match self.classes.get(text) {
            Some(set) => *set,
            None => {
                let set = CharSet::parse(text);
                self.classes.insert(text.into(), set);
                set
            }
        };
        self.push(Expr::Class {
            text: text.into(),
            set,
        });
    }

    pub fn add_predicate(&mut self, text: &str) {
        self.push(Expr::Predicate(text.into()));
    }

    /// Rewrites `$$` to `yy` and attaches the action to the current rule.
    /// Action ids are dense, in source order.
    pub fn add_action(&mut self, text: &str) {
        let rule = self.current_rule();
        let handle = self.actions.push(ActionData {
            text: text.replace("$$", "yy").into(),
            rule,
        });
        self.rules[rule].has_actions = true;
        self.push(Expr::Action(handle));
    }

    fn add_list(&mut self, kind: ListKind) {
        let a = self.pop_expr();
        let b = self.pop_expr();
        let list = match b {
            Expr::List {
                kind: have,
                mut items,
            } if have == kind => {
                items.push(a);
                Expr::List { kind, items }
            }
            other => Expr::List {
                kind,
                items: vec![other, a],
            },
        };
        self.push(list);
    }

    pub fn add_alternate(&mut self) {
        self.add_list(ListKind::Alternate);
    }

    pub fn add_sequence(&mut self) {
        self.add_list(ListKind::Sequence);
    }

    fn add_fix(&mut self, kind: ListKind) {
        let inner = self.pop_expr();
        self.push(Expr::List {
            kind,
            items: vec![inner],
        });
    }

    pub fn add_peek_for(&mut self) {
        self.add_fix(ListKind::PeekFor);
    }

    pub fn add_peek_not(&mut self) {
        self.add_fix(ListKind::PeekNot);
    }

    pub fn add_query(&mut self) {
        self.add_fix(ListKind::Query);
    }

    pub fn add_star(&mut self) {
        self.add_fix(ListKind::Star);
    }

    pub fn add_plus(&mut self) {
        self.add_fix(ListKind::Plus);
    }

    pub fn define(&mut self, name: &str, value: &str) {
        self.defines.set(name, value);
    }

    pub fn switch_exclude(&mut self, rule: &str) {
        self.switch_excl.insert(rule.into());
    }

    pub fn add_header(&mut self, text: &str) {
        self.headers.push(text.into());
    }

    pub fn add_trailer(&mut self, text: &str) {
        self.trailers.push(text.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeKind;
    use crate::error::ErrorAccumulator;
    use cranelift_entity::EntityRef;

    #[test]
    fn rule_ids_are_dense_in_declaration_order() {
        let mut tree = Tree::new(false, false);
        for name in ["A", "B", "C"] {
            tree.add_rule(name);
            tree.add_dot();
            tree.add_expression();
        }
        let err = ErrorAccumulator::new();
        tree.finish(&err);
        assert!(err.is_empty());
        for (i, &handle) in tree.order.iter().enumerate() {
            assert_eq!(handle.index(), i);
        }
        assert_eq!(tree.rules[tree.order[1]].name.as_ref(), "B");
    }

    #[test]
    fn action_ids_are_dense_and_rewritten() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_action("$$ = 1");
        tree.add_action("$$ = $$ + 2");
        tree.add_sequence();
        tree.add_expression();

        let texts: Vec<&str> = tree.actions.values().map(|a| &*a.text).collect();
        assert_eq!(texts, ["yy = 1", "yy = yy + 2"]);
        let rule = tree.order[0];
        for (i, (handle, action)) in tree.actions.iter().enumerate() {
            assert_eq!(handle.index(), i);
            assert_eq!(action.rule, rule);
        }
        assert!(tree.rules.values().next().unwrap().has_actions);
    }

    #[test]
    fn string_length_picks_character_or_str() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_string("a");
        tree.add_string("\\n");
        tree.add_sequence();
        tree.add_string("ab");
        tree.add_sequence();
        tree.add_expression();
        let err = ErrorAccumulator::new();
        tree.finish(&err);

        let rule = &tree.rules[tree.order[0]];
        match rule.expression.as_ref().unwrap() {
            Expr::List { kind, items } => {
                assert_eq!(*kind, ListKind::Sequence);
                let kinds: Vec<NodeKind> = items.iter().map(Expr::kind).collect();
                assert_eq!(
                    kinds,
                    [NodeKind::Character, NodeKind::Character, NodeKind::Str]
                );
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn alternate_folding_appends_to_existing_list() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_string("a");
        tree.add_string("b");
        tree.add_alternate();
        tree.add_string("c");
        tree.add_alternate();
        tree.add_expression();

        let rule = tree.rules.values().next().unwrap();
        match rule.expression.as_ref().unwrap() {
            Expr::List { kind, items } => {
                assert_eq!(*kind, ListKind::Alternate);
                assert_eq!(items.len(), 3);
            }
            other => panic!("expected alternate, got {other:?}"),
        }
    }

    #[test]
    fn variables_get_negative_slots_in_declaration_order() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("Sum");
        tree.add_variable("l");
        tree.add_name("N");
        tree.add_variable("r");
        tree.add_name("N");
        tree.add_sequence();
        tree.add_variable("l");
        tree.add_name("N");
        tree.add_sequence();
        tree.add_expression();

        let rule = tree.rules.values().next().unwrap();
        assert_eq!(rule.variables.len(), 2);
        match rule.expression.as_ref().unwrap() {
            Expr::List { items, .. } => {
                let offsets: Vec<Option<i32>> = items
                    .iter()
                    .map(|e| match e {
                        Expr::Name { var, .. } => *var,
                        other => panic!("expected name, got {other:?}"),
                    })
                    .collect();
                assert_eq!(offsets, [Some(-1), Some(-2), Some(-1)]);
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn classes_are_registered_once() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("R");
        tree.add_class("a-z");
        tree.add_class("0-9");
        tree.add_sequence();
        tree.add_class("a-z");
        tree.add_sequence();
        tree.add_expression();

        assert_eq!(tree.classes.len(), 2);
        assert_eq!(tree.classes.get_index_of("a-z"), Some(0));
        assert_eq!(tree.classes.get_index_of("0-9"), Some(1));
    }

    #[test]
    fn placeholders_and_redefinitions_are_diagnosed() {
        let mut tree = Tree::new(false, false);
        tree.add_rule("A");
        tree.add_name("B");
        tree.add_expression();
        tree.add_rule("A");
        tree.add_dot();
        tree.add_expression();

        let err = ErrorAccumulator::new();
        tree.finish(&err);
        let warnings = err.get();
        assert_eq!(warnings.len(), 1);
        assert_eq!(&*warnings[0], "rule 'A' redefined");
        drop(warnings);

        // the placeholder for B was appended after both definitions of A
        assert_eq!(tree.order.len(), 3);
        let b = tree.by_name["B"];
        assert_eq!(b.index(), 2);
        assert!(tree.rules[b].expression.is_none());
    }
}
