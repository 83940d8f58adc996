pub mod build;
pub mod display;

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use cranelift_entity::{entity_impl, PrimaryMap};
use indexmap::{IndexMap, IndexSet};

use crate::charset::CharSet;

pub type RcString = Rc<str>;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RuleHandle(u32);
entity_impl!(RuleHandle);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ActionHandle(u32);
entity_impl!(ActionHandle);

/// Flat node tags, used by the counting pass and for helper gating. The
/// inventory mirrors the grammar constructs one to one; `Variable` never
/// appears as a node of its own but keeps the count table aligned with the
/// full construct list.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeKind {
    Rule,
    Variable,
    Name,
    Dot,
    Character,
    Str,
    Class,
    Predicate,
    Commit,
    Begin,
    End,
    Action,
    Alternate,
    UnorderedAlternate,
    Sequence,
    PeekFor,
    PeekNot,
    Query,
    Star,
    Plus,
    Nil,
}

impl NodeKind {
    pub const COUNT: usize = NodeKind::Nil as usize + 1;
}

/// Tag of the list-shaped constructs. Kept as a plain field on the list arm
/// so the switch optimizer can retag `Alternate` to `UnorderedAlternate` in
/// place without rebuilding the node.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ListKind {
    Alternate,
    UnorderedAlternate,
    Sequence,
    PeekFor,
    PeekNot,
    Query,
    Star,
    Plus,
}

impl ListKind {
    pub fn node_kind(self) -> NodeKind {
        match self {
            ListKind::Alternate => NodeKind::Alternate,
            ListKind::UnorderedAlternate => NodeKind::UnorderedAlternate,
            ListKind::Sequence => NodeKind::Sequence,
            ListKind::PeekFor => NodeKind::PeekFor,
            ListKind::PeekNot => NodeKind::PeekNot,
            ListKind::Query => NodeKind::Query,
            ListKind::Star => NodeKind::Star,
            ListKind::Plus => NodeKind::Plus,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Expr {
    Dot,
    /// A single character or two-character escape; the text is kept verbatim
    /// so emitted literals reproduce the grammar's spelling.
    Character(RcString),
    Str(RcString),
    /// `text` is the literal body as written; `set` the resolved bitmap.
    /// Synthetic classes made by the optimizer carry their set here without
    /// being registered in the tree's class table.
    Class { text: RcString, set: CharSet },
    Predicate(RcString),
    Commit,
    Begin,
    End,
    Nil,
    Action(ActionHandle),
    /// Non-terminal reference; `var` is the negative slot offset of the
    /// capture variable, when one binds the result.
    Name { name: RcString, var: Option<i32> },
    List { kind: ListKind, items: Vec<Expr> },
}

impl Expr {
    pub fn kind(&self) -> NodeKind {
        match self {
            Expr::Dot => NodeKind::Dot,
            Expr::Character(_) => NodeKind::Character,
            Expr::Str(_) => NodeKind::Str,
            Expr::Class { .. } => NodeKind::Class,
            Expr::Predicate(_) => NodeKind::Predicate,
            Expr::Commit => NodeKind::Commit,
            Expr::Begin => NodeKind::Begin,
            Expr::End => NodeKind::End,
            Expr::Nil => NodeKind::Nil,
            Expr::Action(_) => NodeKind::Action,
            Expr::Name { .. } => NodeKind::Name,
            Expr::List { kind, .. } => kind.node_kind(),
        }
    }
}

pub struct Rule {
    pub name: RcString,
    /// `None` marks a placeholder: the rule was referenced but never defined.
    pub expression: Option<Expr>,
    pub has_actions: bool,
    /// Capture variables in declaration order; the slot of `variables[i]`
    /// is `-(i + 1)`.
    pub variables: Vec<RcString>,
}

impl Rule {
    fn new(name: RcString) -> Rule {
        Rule {
            name,
            expression: None,
            has_actions: false,
            variables: Vec::new(),
        }
    }
}

pub struct ActionData {
    /// User code with `$$` already rewritten to `yy`.
    pub text: RcString,
    pub rule: RuleHandle,
}

/// Recognized directives. Unknown names are silently ignored; `noexport` is
/// recognized but has no effect on emission.
pub struct Defines {
    pub package: String,
    pub peg: String,
    pub userstate: String,
    pub yystype: String,
    pub noexport: String,
}

impl Default for Defines {
    fn default() -> Defines {
        Defines {
            package: String::new(),
            peg: "yyParser".to_owned(),
            userstate: String::new(),
            yystype: "yyStype".to_owned(),
            noexport: String::new(),
        }
    }
}

impl Defines {
    pub fn set(&mut self, name: &str, value: &str) {
        match name {
            "package" => self.package = value.to_owned(),
            "Peg" => self.peg = value.to_owned(),
            "userstate" => self.userstate = value.to_owned(),
            "yystype" => self.yystype = value.to_owned(),
            "noexport" => self.noexport = value.to_owned(),
            _ => {}
        }
    }
}

pub(crate) enum BuildNode {
    Rule(RuleHandle),
    Expr(Expr),
}

/// The grammar under compilation. Filled through the builder verbs in
/// `ast::build`, then analyzed, optionally rewritten by the switch
/// optimizer, and finally emitted.
pub struct Tree {
    pub rules: PrimaryMap<RuleHandle, Rule>,
    /// Declaration order; also emission order. After `finish` the handle at
    /// `order[i]` has index `i`.
    pub order: Vec<RuleHandle>,
    pub by_name: HashMap<RcString, RuleHandle>,
    /// Names seen in `Name` nodes, in first-reference order. Drives the
    /// creation of placeholder rules for undefined names.
    pub referenced: IndexSet<RcString>,
    pub actions: PrimaryMap<ActionHandle, ActionData>,
    /// Source character classes keyed by their literal text, in first-use
    /// order; the index of each entry is its slot in the emitted table.
    pub classes: IndexMap<RcString, CharSet>,
    pub defines: Defines,
    pub switch_excl: HashSet<RcString>,
    pub headers: Vec<RcString>,
    pub trailers: Vec<RcString>,
    pub inline: bool,
    pub switch: bool,
    pub(crate) stack: Vec<BuildNode>,
    pub(crate) pending_var: Option<i32>,
    finished: bool,
}

impl Tree {
    pub fn new(inline: bool, switch: bool) -> Tree {
        Tree {
            rules: PrimaryMap::new(),
            order: Vec::new(),
            by_name: HashMap::new(),
            referenced: IndexSet::new(),
            actions: PrimaryMap::new(),
            classes: IndexMap::new(),
            defines: Defines::default(),
            switch_excl: HashSet::new(),
            headers: Vec::new(),
            trailers: Vec::new(),
            inline,
            switch,
            stack: Vec::new(),
            pending_var: None,
            finished: false,
        }
    }

    pub fn start_rule(&self) -> Option<RuleHandle> {
        self.order.first().copied()
    }

    pub fn variable_count(&self) -> usize {
        self.rules.values().map(|r| r.variables.len()).sum()
    }

    /// Registers declared rules by name (diagnosing redefinitions; the later
    /// definition wins) and appends placeholder rules for names that were
    /// referenced but never defined, in first-reference order. Afterwards
    /// rule handles are dense and aligned with `order`. Idempotent, so a
    /// tree can be compiled more than once.
    pub fn finish(&mut self, err: &crate::error::ErrorAccumulator) {
        if self.finished {
            return;
        }
        self.finished = true;
        for &handle in &self.order {
            let name = self.rules[handle].name.clone();
            if self.by_name.insert(name.clone(), handle).is_some() {
                err.warning(format_args!("rule '{name}' redefined"));
            }
        }
        for name in self.referenced.clone() {
            if !self.by_name.contains_key(&name) {
                let handle = self.rules.push(Rule::new(name.clone()));
                self.order.push(handle);
                self.by_name.insert(name, handle);
            }
        }
    }
}
