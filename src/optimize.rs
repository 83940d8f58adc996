//! Rewrites ordered alternates whose branches start with disjoint byte
//! sets into `UnorderedAlternate` lists that the generator lowers to a
//! byte-dispatch switch. Runs over the start rule's transitive subtree
//! only, after the read-only analyses; this is the one pass that mutates
//! the tree.

use std::collections::VecDeque;

use cranelift_entity::SecondaryMap;

use crate::ast::{Expr, ListKind, RuleHandle, Tree};
use crate::charset::CharSet;

/// Synthesized per subtree: whether it must consume, whether its outcome
/// depends on end-of-input, whether it only peeks, and the set of bytes
/// that may begin a match. `class` is `None` when the first set is unknown
/// (predicates, commit, excluded rules); `empty` marks the empty literal.
#[derive(Clone, Copy, Default)]
struct Synth {
    consumes: bool,
    eof: bool,
    peek: bool,
    class: Option<CharSet>,
    empty: bool,
}

#[derive(Clone, Default)]
struct CacheEntry {
    reached: bool,
    synth: Synth,
}

pub fn optimize_alternates(tree: &mut Tree) {
    let Some(start) = tree.start_rule() else {
        return;
    };
    let mut optimizer = Optimizer {
        tree,
        cache: SecondaryMap::new(),
    };
    optimizer.rule(start);
}

struct Optimizer<'a> {
    tree: &'a mut Tree,
    cache: SecondaryMap<RuleHandle, CacheEntry>,
}

impl Optimizer<'_> {
    fn rule(&mut self, handle: RuleHandle) -> Synth {
        if self.tree.switch_excl.contains(&self.tree.rules[handle].name) {
            return Synth::default();
        }
        if self.cache[handle].reached {
            return self.cache[handle].synth;
        }
        self.cache[handle].reached = true;

        // take the body out so recursion through `Name` edges can borrow
        // the tree again; re-entry meanwhile hits the cache entry above
        let mut expression = self.tree.rules[handle].expression.take();
        let synth = match &mut expression {
            Some(expression) => self.expr(expression),
            None => Synth::default(),
        };
        self.tree.rules[handle].expression = expression;
        self.cache[handle].synth = synth;
        synth
    }

    fn expr(&mut self, expr: &mut Expr) -> Synth {
        match expr {
            Expr::Dot => Synth {
                consumes: true,
                class: Some(CharSet::full()),
                ..Synth::default()
            },
            Expr::Character(text) | Expr::Str(text) => {
                if text.is_empty() {
                    return Synth {
                        consumes: true,
                        class: Some(CharSet::new()),
                        empty: true,
                        ..Synth::default()
                    };
                }
                let bytes = text.as_bytes();
                let b = if bytes[0] == b'\\' && bytes.len() > 1 {
                    match bytes[1] {
                        b'a' => 0x07,
                        b'b' => 0x08,
                        b'f' => 0x0c,
                        b'n' => b'\n',
                        b'r' => b'\r',
                        b't' => b'\t',
                        b'v' => 0x0b,
                        other => other,
                    }
                } else {
                    bytes[0]
                };
                let mut class = CharSet::new();
                class.add(b);
                Synth {
                    consumes: true,
                    class: Some(class),
                    ..Synth::default()
                }
            }
            Expr::Class { set, .. } => Synth {
                consumes: true,
                class: Some(*set),
                ..Synth::default()
            },
            Expr::Name { name, .. } => match self.tree.by_name.get(name).copied() {
                Some(target) => self.rule(target),
                None => Synth::default(),
            },
            Expr::Action(_) | Expr::Nil => Synth {
                class: Some(CharSet::new()),
                ..Synth::default()
            },
            Expr::Predicate(_) | Expr::Commit | Expr::Begin | Expr::End => Synth::default(),
            Expr::List { kind, items } => match *kind {
                ListKind::Alternate => self.alternate(kind, items),
                ListKind::Sequence => self.sequence(items),
                ListKind::PeekFor => {
                    let s = self.expr(&mut items[0]);
                    Synth {
                        peek: true,
                        eof: s.eof,
                        class: s.class,
                        empty: s.empty,
                        ..Synth::default()
                    }
                }
                ListKind::PeekNot => {
                    let s = self.expr(&mut items[0]);
                    Synth {
                        peek: true,
                        eof: !s.eof,
                        class: s.class.map(|mut c| {
                            c.complement();
                            c
                        }),
                        ..Synth::default()
                    }
                }
                ListKind::Query | ListKind::Star => {
                    let s = self.expr(&mut items[0]);
                    Synth {
                        eof: s.eof,
                        class: s.class,
                        empty: s.empty,
                        ..Synth::default()
                    }
                }
                ListKind::Plus => self.expr(&mut items[0]),
                ListKind::UnorderedAlternate => Synth::default(),
            },
        }
    }

    fn sequence(&mut self, items: &mut Vec<Expr>) -> Synth {
        let mut consumes = false;
        let mut eof = false;
        let mut peek = false;
        let mut scanned: Vec<(bool, Option<CharSet>)> = Vec::new();

        let mut index = 0;
        while index < items.len() && !consumes {
            let s = self.expr(&mut items[index]);
            consumes = s.consumes;
            eof |= s.eof;
            peek |= s.peek;
            scanned.push((s.peek, s.class));
            index += 1;
        }
        eof = !consumes && eof;
        peek = !consumes && peek;

        // combine the scanned prefix back to front: peeks constrain the
        // first set, everything else widens it
        let mut class = CharSet::new();
        for (is_peek, item_class) in scanned.iter().rev() {
            if let Some(item_class) = item_class {
                if *is_peek {
                    class.intersection(item_class);
                } else {
                    class.union(item_class);
                }
            }
        }

        for item in &mut items[index..] {
            self.expr(item);
        }

        Synth {
            consumes,
            eof,
            peek,
            class: Some(class),
            ..Synth::default()
        }
    }

    fn alternate(&mut self, kind: &mut ListKind, items: &mut Vec<Expr>) -> Synth {
        let mut consumes = true;
        let mut eof = false;
        let mut peek = true;
        let mut class = CharSet::new();

        let count = items.len();
        // per branch: (overlaps a later branch, first set)
        let mut props: Vec<(bool, Option<CharSet>)> = Vec::with_capacity(count);
        let mut truncated = false;
        for (i, item) in items.iter_mut().enumerate() {
            let s = self.expr(item);
            if i + 1 == count && s.empty {
                // a trailing empty-string branch succeeds at any non-EOF
                // position; it cannot be byte-dispatched
                truncated = true;
                break;
            }
            consumes &= s.consumes;
            eof |= s.eof;
            peek &= s.peek;
            if let Some(branch_class) = &s.class {
                class.union(branch_class);
            }
            props.push((false, s.class));
        }

        let result = Synth {
            consumes,
            eof,
            peek,
            class: Some(class),
            ..Synth::default()
        };
        if eof || truncated {
            return result;
        }

        let mut intersections = 2usize;
        for prop in &mut props {
            if prop.1.is_none() {
                // unknown first set: keep the branch ordered
                prop.0 = true;
                intersections += 1;
            }
        }
        'compare: for a in 0..props.len().saturating_sub(1) {
            if props[a].0 {
                continue;
            }
            for b in a + 1..props.len() {
                let overlap = match (&props[a].1, &props[b].1) {
                    (Some(ca), Some(cb)) => ca.intersects(cb),
                    _ => true,
                };
                if overlap {
                    intersections += 1;
                    props[a].0 = true;
                    continue 'compare;
                }
            }
        }
        if intersections >= props.len() {
            return result;
        }

        let mut unordered: VecDeque<Expr> = VecDeque::new();
        let mut ordered: Vec<Expr> = Vec::new();
        let mut max = 0usize;
        for (i, item) in items.drain(..).enumerate() {
            if props[i].0 {
                ordered.push(item);
                continue;
            }
            let set = props[i].1.unwrap_or_default();
            let peek_class = Expr::List {
                kind: ListKind::PeekFor,
                items: vec![Expr::Class {
                    text: set.to_string().into(),
                    set,
                }],
            };
            let is_nil = matches!(item, Expr::Nil);
            let length = set.len();
            let sequence = Expr::List {
                kind: ListKind::Sequence,
                items: vec![peek_class, item],
            };
            if is_nil {
                unordered.push_back(sequence);
            } else if length > max {
                unordered.push_back(sequence);
                max = length;
            } else {
                unordered.push_front(sequence);
            }
        }

        if ordered.is_empty() {
            *kind = ListKind::UnorderedAlternate;
            *items = unordered.into();
        } else {
            ordered.push(Expr::List {
                kind: ListKind::UnorderedAlternate,
                items: unordered.into(),
            });
            *items = ordered;
        }
        result
    }
}
