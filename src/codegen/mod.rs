//! Emits the Go source of a recursive-descent recognizer for an analyzed
//! tree. Matcher helpers are gated by the node-kind counts, action thunks
//! by the presence of actions, and every rule body is compiled twice: the
//! dry pass discovers which labels need position/thunk snapshots, the real
//! pass emits the code with dead saves and restores elided.

pub mod writer;

use std::fmt::{self, Write as _};

use cranelift_entity::EntityRef;

use crate::analysis::Analysis;
use crate::ast::display::{CaseByteDisplay, GoName, RuleDisplay};
use crate::ast::{Expr, ListKind, NodeKind, RuleHandle, Tree};
use crate::charset::CharSet;
use crate::error::ErrorAccumulator;

use writer::{ChgFlags, Label, Writer};

pub fn emit(
    tree: &Tree,
    analysis: &Analysis,
    err: &ErrorAccumulator,
    out: &mut dyn fmt::Write,
) -> fmt::Result {
    Generator {
        tree,
        analysis,
        err,
        has_actions: !tree.actions.is_empty(),
        w: Writer::new(out),
    }
    .run()
}

struct Generator<'a> {
    tree: &'a Tree,
    analysis: &'a Analysis,
    err: &'a ErrorAccumulator,
    has_actions: bool,
    w: Writer<'a>,
}

impl<'a> Generator<'a> {
    fn run(mut self) -> fmt::Result {
        let tree = self.tree;

        for header in &tree.headers {
            write!(self.w, "{header}")?;
        }

        let package = &tree.defines.package;
        if !package.is_empty() {
            write!(
                self.w,
                "package {package}\n\nimport (\n\t\"fmt\"\n\t\"peg\"\n)"
            )?;
        }

        write!(self.w, "\nconst (\n")?;
        for &handle in &tree.order {
            let name = GoName(&tree.rules[handle].name);
            if handle.index() == 0 {
                write!(self.w, "\trule{name}\t= iota\n")?;
            } else {
                write!(self.w, "\trule{name}\n")?;
            }
        }

        let pegname = tree.defines.peg.clone();
        write!(
            self.w,
            ")\n\ntype {pegname} struct {{{userstate}\n\tBuffer string\n\tMin, Max int\n\trules [{count}]func() bool\n\tResetBuffer\tfunc(string) string\n}}\n",
            userstate = tree.defines.userstate,
            count = tree.rules.len(),
        )?;
        write!(
            self.w,
            "\nfunc (p *{pegname}) Parse(ruleId int) bool {{\n\tif p.rules[ruleId]() {{\n\t\treturn true\n\t}}\n\treturn false\n}}\n"
        )?;
        write!(
            self.w,
            "func (p *{pegname}) PrintError() {{\n\tline := 1\n\tcharacter := 0\n\tfor i, c := range p.Buffer[0:] {{\n\t\tif c == '\\n' {{\n\t\t\tline++\n\t\t\tcharacter = 0\n\t\t}} else {{\n\t\t\tcharacter++\n\t\t}}\n\t\tif i == p.Min {{\n\t\t\tif p.Min != p.Max {{\n\t\t\t\tfmt.Printf(\"parse error after line %v character %v\\n\", line, character)\n\t\t\t}} else {{\n\t\t\t\tbreak\n\t\t\t}}\n\t\t}} else if i == p.Max {{\n\t\t\tbreak\n\t\t}}\n\t}}\n\tfmt.Printf(\"parse error: unexpected \")\n\tif p.Max >= len(p.Buffer) {{\n\t\tfmt.Printf(\"end of file found\\n\")\n\t}} else {{\n\t\tfmt.Printf(\"'%c' at line %v character %v\\n\", p.Buffer[p.Max], line, character)\n\t}}\n}}\n"
        )?;
        write!(
            self.w,
            "func (p *{pegname}) Init() {{\n\tvar position int"
        )?;

        let nvar = tree.variable_count();
        if nvar > 0 {
            let yystype = &tree.defines.yystype;
            write!(
                self.w,
                "\n\tvar yyp int\n\tvar yy {yystype}\n\tvar yyval = make([]{yystype}, 200)\n"
            )?;
        }

        if self.has_actions {
            self.emit_actions(nvar)?;
        }

        if self.analysis.count(NodeKind::Dot) > 0 {
            write!(
                self.w,
                "\n\tmatchDot := func() bool {{\n\t\tif position < len(p.Buffer) {{\n\t\t\tposition++\n\t\t\treturn true\n\t\t}} else if position >= p.Max {{\n\t\t\tp.Max = position\n\t\t}}\n\t\treturn false\n\t}}\n\tpeekDot := func() bool {{\n\t\treturn position < len(p.Buffer)\n\t}}\n\t_ = peekDot\n"
            )?;
        }
        if self.analysis.count(NodeKind::Character) > 0 {
            write!(
                self.w,
                "\n\tmatchChar := func(c byte) bool {{\n\t\tif (position < len(p.Buffer)) && (p.Buffer[position] == c) {{\n\t\t\tposition++\n\t\t\treturn true\n\t\t}} else if position >= p.Max {{\n\t\t\tp.Max = position\n\t\t}}\n\t\treturn false\n\t}}\n\tpeekChar := func(c byte) bool {{\n\t\treturn position < len(p.Buffer) && p.Buffer[position] == c\n\t}}\n\t_ = peekChar\n"
            )?;
        }
        if self.analysis.count(NodeKind::Str) > 0 {
            write!(
                self.w,
                "\n\tmatchString := func(s string) bool {{\n\t\tlength := len(s)\n\t\tnext := position + length\n\t\tif (next <= len(p.Buffer)) && (p.Buffer[position:next] == s) {{\n\t\t\tposition = next\n\t\t\treturn true\n\t\t}} else if position >= p.Max {{\n\t\t\tp.Max = position\n\t\t}}\n\t\treturn false\n\t}}"
            )?;
        }

        if !tree.classes.is_empty() {
            write!(self.w, "\n\tclasses := [...][32]uint8{{\n")?;
            for (_, set) in &tree.classes {
                write!(self.w, "\t\t{{")?;
                let mut sep = "";
                for byte in set.bytes() {
                    write!(self.w, "{sep}{byte}")?;
                    sep = ", ";
                }
                write!(self.w, "}},\n")?;
            }
            write!(
                self.w,
                "\t}}\n\tmatchClass := func(class uint) bool {{\n\t\tif (position < len(p.Buffer)) &&\n\t\t\t((classes[class][p.Buffer[position]>>3] & (1 << (p.Buffer[position] & 7))) != 0) {{\n\t\t\tposition++\n\t\t\treturn true\n\t\t}} else if position >= p.Max {{\n\t\t\tp.Max = position\n\t\t}}\n\t\treturn false\n\t}}"
            )?;
        }

        self.compile_rules()?;

        for trailer in &tree.trailers {
            write!(self.w, "{trailer}")?;
        }
        Ok(())
    }

    fn emit_actions(&mut self, nvar: usize) -> fmt::Result {
        let tree = self.tree;

        let mut bits = 0u32;
        let mut length = tree.actions.len();
        while length != 0 {
            bits += 1;
            length >>= 1;
        }
        let bits = if bits < 8 {
            8
        } else if bits < 16 {
            16
        } else if bits < 32 {
            32
        } else {
            64
        };

        write!(self.w, "\n\tactions := [...]func(string, int){{")?;
        for (handle, action) in tree.actions.iter() {
            let rule = &tree.rules[action.rule];
            self.w
                .line(format_args!("/* {} {} */", handle.index(), rule.name))?;
            self.w.line(format_args!("func(yytext string, _ int) {{"))?;
            for (i, name) in rule.variables.iter().enumerate() {
                write!(self.w, "\n\t\t\t{name} := yyval[yyp{}]", -(i as i32 + 1))?;
            }
            write!(self.w, "\n\t\t\t{}", action.text)?;
            for (i, name) in rule.variables.iter().enumerate() {
                write!(self.w, "\n\t\t\tyyval[yyp{}] = {name}", -(i as i32 + 1))?;
            }
            self.w.line(format_args!("}},"))?;
        }

        if nvar > 0 {
            let nact = tree.actions.len();
            let yystype = &tree.defines.yystype;
            write!(
                self.w,
                "\n\t\t/* {nact} yyPush */\n\t\tfunc(_ string, count int) {{\n\t\t\tyyp += count\n\t\t\tif yyp >= len(yyval) {{\n\t\t\t\ts := make([]{yystype}, cap(yyval)+200)\n\t\t\t\tcopy(s, yyval)\n\t\t\t\tyyval = s\n\t\t\t}}\n\t\t}},\n\t\t/* {pop} yyPop */\n\t\tfunc(_ string, count int) {{\n\t\t\tyyp -= count\n\t\t}},\n\t\t/* {set} yySet */\n\t\tfunc(_ string, count int) {{\n\t\t\tyyval[yyp+count] = yy\n\t\t}},\n\t}}\n\tconst (\n\t\tyyPush = {nact}+iota\n\t\tyyPop\n\t\tyySet\n\t)\n",
                pop = nact + 1,
                set = nact + 2,
            )?;
        } else {
            write!(self.w, "\t}}\n")?;
        }

        write!(
            self.w,
            "\n\tvar thunkPosition, begin, end int\n\tthunks := make([]struct {{action uint{bits}; begin, end int}}, 32)\n\tdoarg := func(action uint{bits}, arg int) {{\n\t\tif thunkPosition == len(thunks) {{\n\t\t\tnewThunks := make([]struct {{action uint{bits}; begin, end int}}, 2 * len(thunks))\n\t\t\tcopy(newThunks, thunks)\n\t\t\tthunks = newThunks\n\t\t}}\n\t\tthunks[thunkPosition].action = action\n\t\tif arg != 0 {{\n\t\t\tthunks[thunkPosition].begin = arg // use begin to store an argument\n\t\t}} else {{\n\t\t\tthunks[thunkPosition].begin = begin\n\t\t}}\n\t\tthunks[thunkPosition].end = end\n\t\tthunkPosition++\n\t}}\n\tdo := func(action uint{bits}) {{\n\t\tdoarg(action, 0)\n\t}}"
        )?;
        write!(
            self.w,
            "\n\tp.ResetBuffer = func(s string) (old string) {{\n\t\tif p.Max < len(p.Buffer) {{\n\t\t\told = p.Buffer[p.Max:]\n\t\t}}\n\t\tp.Buffer = s\n\t\tthunkPosition = 0\n\t\tposition = 0\n\t\tp.Min = 0\n\t\tp.Max = 0\n\t\treturn\n\t}}\n"
        )?;

        if self.analysis.count(NodeKind::Commit) > 0 {
            write!(
                self.w,
                "\n\tcommit := func(thunkPosition0 int) bool {{\n\t\tif thunkPosition0 == 0 {{\n\t\t\tfor i := 0; i < thunkPosition; i++ {{\n\t\t\t\tb := thunks[i].begin\n\t\t\t\te := thunks[i].end\n\t\t\t\ts := \"\"\n\t\t\t\tif b>=0 && e<=len(p.Buffer) && b<=e {{\n\t\t\t\t\ts = p.Buffer[b:e]\n\t\t\t\t}}\n\t\t\t\tmagic := b\n\t\t\t\tactions[thunks[i].action](s, magic)\n\t\t\t}}\n\t\t\tp.Min = position\n\t\t\tthunkPosition = 0\n\t\t\treturn true\n\t\t}}\n\t\treturn false\n\t}}"
            )?;
        }
        Ok(())
    }

    fn compile_rules(&mut self) -> fmt::Result {
        let tree = self.tree;

        // dry pass: discover save requirements per label
        self.w.set_dry(true);
        for &handle in &tree.order {
            let rule = &tree.rules[handle];
            if rule.expression.is_none() {
                continue;
            }
            let mut ko = self.w.new_label();
            ko.sid = 0;
            if let Some(&count) = self.analysis.rules_count.get(&rule.name) {
                if tree.inline && count == 1 && ko.id != 0 {
                    continue;
                }
            }
            self.w.save(&ko)?;
            let (cko, _) = self.compile_rule_expr(handle, &mut ko)?;
            if ko.used {
                self.w.restore(&mut ko, cko.pos, cko.th_pos)?;
            }
        }
        self.w.set_dry(false);

        write!(self.w, "\n\tp.rules = [...]func() bool{{")?;
        for &handle in &tree.order {
            let rule = &tree.rules[handle];
            if rule.expression.is_none() {
                self.w.line(format_args!("nil,"))?;
                continue;
            }
            let mut ko = self.w.new_label();
            ko.sid = 0;
            self.w.line(format_args!("/* {} ", handle.index()))?;
            write!(self.w, "{}", RuleDisplay { tree, handle })?;
            write!(self.w, " */")?;
            if let Some(&count) = self.analysis.rules_count.get(&rule.name) {
                if tree.inline && count == 1 && ko.id != 0 {
                    self.w.line(format_args!("nil,"))?;
                    continue;
                }
            }
            self.w.line(format_args!("func() bool {{"))?;
            self.w.indent += 1;
            self.w.save(&ko)?;
            let (cko, _) = self.compile_rule_expr(handle, &mut ko)?;
            self.w.line(format_args!("return true"))?;
            if ko.used {
                self.w.restore(&mut ko, cko.pos, cko.th_pos)?;
                self.w.line(format_args!("return false"))?;
            }
            self.w.indent -= 1;
            self.w.line(format_args!("}},"))?;
        }
        write!(self.w, "\n\t}}")?;
        write!(self.w, "\n}}\n")?;
        Ok(())
    }

    /// A rule body, bracketed by the variable-window pushes when the rule
    /// binds captures.
    fn compile_rule_expr(
        &mut self,
        handle: RuleHandle,
        ko: &mut Label,
    ) -> Result<(ChgFlags, ChgFlags), fmt::Error> {
        let tree = self.tree;
        let rule = &tree.rules[handle];
        let nvar = rule.variables.len();
        if nvar > 0 {
            self.w.line(format_args!("doarg(yyPush, {nvar})"))?;
        }
        let (mut cko, mut cok) = match &rule.expression {
            Some(expression) => self.compile(expression, ko)?,
            None => self.compile(&Expr::Nil, ko)?,
        };
        if nvar > 0 {
            self.w.line(format_args!("doarg(yyPop, {nvar})"))?;
            cko.th_pos = true;
            cok.th_pos = true;
        }
        Ok((cko, cok))
    }

    /// Peeks at `Dot`, `Character`, and predicates need no snapshot at all;
    /// they lower to a direct conditional jump.
    fn can_compile_peek(
        &mut self,
        node: &Expr,
        jump_if_true: bool,
        label: &mut Label,
    ) -> Result<bool, fmt::Error> {
        match node {
            Expr::Dot => self.w.cjump(label, jump_if_true, format_args!("peekDot()"))?,
            Expr::Character(text) => {
                self.w
                    .cjump(label, jump_if_true, format_args!("peekChar('{text}')"))?
            }
            Expr::Predicate(text) => {
                self.w
                    .cjump(label, jump_if_true, format_args!("({text})"))?
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn compile(&mut self, node: &Expr, ko: &mut Label) -> Result<(ChgFlags, ChgFlags), fmt::Error> {
        let tree = self.tree;
        let mut chgko = ChgFlags::default();
        let mut chgok = ChgFlags::default();

        match node {
            Expr::Dot => {
                self.w.cjump(ko, false, format_args!("matchDot()"))?;
                chgok.pos = true;
            }
            Expr::Name { name, var } => {
                let target = tree.by_name[name];
                let count = self.analysis.rules_count.get(name).copied();
                if tree.inline && count == Some(1) {
                    let (cko, cok) = self.compile_rule_expr(target, ko)?;
                    chgko = cko;
                    chgok = cok;
                } else {
                    let rule = &tree.rules[target];
                    self.w.cjump(
                        ko,
                        false,
                        format_args!("p.rules[rule{}]()", GoName(&rule.name)),
                    )?;
                    if !rule.variables.is_empty() || rule.has_actions {
                        chgok.th_pos = true;
                    }
                    // the callee may have advanced before failing back out
                    chgok.pos = true;
                }
                if let Some(offset) = var {
                    self.w.line(format_args!("doarg(yySet, {offset})"))?;
                    chgok.th_pos = true;
                }
            }
            Expr::Character(text) => {
                self.w
                    .cjump(ko, false, format_args!("matchChar('{text}')"))?;
                chgok.pos = true;
            }
            Expr::Str(text) => {
                if text.is_empty() {
                    self.w.cjump(ko, false, format_args!("peekDot()"))?;
                } else {
                    self.w
                        .cjump(ko, false, format_args!("matchString(\"{text}\")"))?;
                }
                chgok.pos = true;
            }
            Expr::Class { text, .. } => {
                let index = match tree.classes.get_index_of(&**text) {
                    Some(index) => index,
                    None => {
                        self.err.warning(format_args!("internal error #2 ({text})"));
                        0
                    }
                };
                self.w
                    .cjump(ko, false, format_args!("matchClass({index})"))?;
                chgok.pos = true;
            }
            Expr::Predicate(text) => {
                self.w.cjump(ko, false, format_args!("({text})"))?;
            }
            Expr::Action(handle) => {
                self.w.line(format_args!("do({})", handle.index()))?;
                chgok.th_pos = true;
            }
            Expr::Commit => {
                self.w
                    .cjump(ko, false, format_args!("(commit(thunkPosition0))"))?;
                chgko.th_pos = true;
            }
            Expr::Begin => {
                if self.has_actions {
                    self.w.line(format_args!("begin = position"))?;
                }
            }
            Expr::End => {
                if self.has_actions {
                    self.w.line(format_args!("end = position"))?;
                }
            }
            Expr::Nil => {}
            Expr::List { kind, items } => match kind {
                ListKind::Alternate => {
                    let mut ok = self.w.new_label();
                    if self.w.is_unsafe(&ok) {
                        self.w.begin()?;
                        self.w.save(&ok)?;
                    }
                    let mut index = 0;
                    let mut last_reachable = true;
                    while index + 1 < items.len() {
                        let mut next = self.w.new_label();
                        let (cko, cok) = self.compile(&items[index], &mut next)?;
                        chgko.merge(cko);
                        chgok.merge(cok);
                        self.w.jump(&mut ok)?;
                        if next.used {
                            self.w.lrestore(&mut ok, Some(&next), cko.pos, cko.th_pos)?;
                        }
                        last_reachable = next.used;
                        index += 1;
                    }
                    if last_reachable {
                        let (cko, cok) = self.compile(&items[index], ko)?;
                        chgko.merge(cko);
                        chgok.merge(cok);
                    }
                    if self.w.is_unsafe(&ok) {
                        self.w.end()?;
                    }
                    if ok.used {
                        self.w.label_site(&ok)?;
                    }
                }
                ListKind::UnorderedAlternate => {
                    let ok = self.w.new_label();
                    self.w.begin()?;
                    self.w
                        .cjump(ko, true, format_args!("position == len(p.Buffer)"))?;
                    self.w.line(format_args!("switch p.Buffer[position] {{"))?;
                    let last = items.len() - 1;
                    for (i, entry) in items.iter().enumerate() {
                        let Some((set, body)) = unordered_entry(entry) else {
                            self.err.warning(format_args!("internal error #3"));
                            continue;
                        };
                        if i < last {
                            self.w.line(format_args!("case"))?;
                            let mut comma = false;
                            for b in 0..=255u8 {
                                if set.has(b) {
                                    if comma {
                                        write!(self.w, ",")?;
                                    }
                                    write!(self.w, " '{}'", CaseByteDisplay(b))?;
                                    comma = true;
                                }
                            }
                            write!(self.w, ":")?;
                        } else {
                            self.w.line(format_args!("default:"))?;
                        }
                        self.w.indent += 1;
                        let (cko, cok) = self.compile(body, ko)?;
                        chgko.merge(cko);
                        chgok.merge(cok);
                        self.w.indent -= 1;
                    }
                    self.w.line(format_args!("}}"))?;
                    self.w.end()?;
                    if ok.used {
                        self.w.label_site(&ok)?;
                    }
                }
                ListKind::Sequence => {
                    for item in items {
                        let (cko, cok) = self.compile(item, ko)?;
                        chgko.merge(cko);
                        chgok.merge(cok);
                    }
                    // failing partway leaves the earlier elements' effects
                    if items.len() > 1 {
                        chgko.merge(chgok);
                    }
                }
                ListKind::PeekFor => {
                    let sub = &items[0];
                    if self.can_compile_peek(sub, false, ko)? {
                        return Ok((chgko, chgok));
                    }
                    let mut label = self.w.new_label();
                    self.w.save_block(&mut label)?;
                    let (cko, cok) = self.compile(sub, ko)?;
                    self.w.lrestore(&mut label, None, cok.pos, cok.th_pos)?;
                    chgko = cko;
                }
                ListKind::PeekNot => {
                    let sub = &items[0];
                    if self.can_compile_peek(sub, true, ko)? {
                        return Ok((chgko, chgok));
                    }
                    let mut ok = self.w.new_label();
                    self.w.save_block(&mut ok)?;
                    let (cko, cok) = self.compile(sub, &mut ok)?;
                    self.w.jump(ko)?;
                    if ok.used {
                        self.w.restore(&mut ok, cko.pos, cko.th_pos)?;
                    }
                    chgko = cok;
                }
                ListKind::Query => {
                    let mut qko = self.w.new_label();
                    let mut qok = self.w.new_label();
                    self.w.save_block(&mut qko)?;
                    let (cko, cok) = self.compile(&items[0], &mut qko)?;
                    if self.w.is_unsafe(&qko) {
                        self.w.jump(&mut qok)?;
                    }
                    if qko.used {
                        self.w.restore(&mut qko, cko.pos, cko.th_pos)?;
                    }
                    if self.w.is_unsafe(&qko) {
                        self.w.label_site(&qok)?;
                    }
                    chgok = cok;
                }
                ListKind::Star => {
                    let mut again = self.w.new_label();
                    let mut out = self.w.new_label();
                    self.w.label_site(&again)?;
                    self.w.save_block(&mut out)?;
                    let (cko, cok) = self.compile(&items[0], &mut out)?;
                    self.w.jump(&mut again)?;
                    self.w.restore(&mut out, cko.pos, cko.th_pos)?;
                    chgok = cok;
                }
                ListKind::Plus => {
                    let mut again = self.w.new_label();
                    let mut out = self.w.new_label();
                    let (cko, cok) = self.compile(&items[0], ko)?;
                    chgko.merge(cko);
                    chgok.merge(cok);
                    self.w.label_site(&again)?;
                    self.w.save_block(&mut out)?;
                    let (cko, _) = self.compile(&items[0], &mut out)?;
                    self.w.jump(&mut again)?;
                    if out.used {
                        self.w.restore(&mut out, cko.pos, cko.th_pos)?;
                    }
                }
            },
        }
        Ok((chgko, chgok))
    }
}

/// The optimizer shapes unordered entries as
/// `Sequence(PeekFor(Class), body)`; the switch dispatch replaces the peek.
fn unordered_entry(entry: &Expr) -> Option<(&CharSet, &Expr)> {
    let Expr::List {
        kind: ListKind::Sequence,
        items,
    } = entry
    else {
        return None;
    };
    let [peek, body] = items.as_slice() else {
        return None;
    };
    let Expr::List {
        kind: ListKind::PeekFor,
        items: peeked,
    } = peek
    else {
        return None;
    };
    match peeked.first() {
        Some(Expr::Class { set, .. }) => Some((set, body)),
        _ => None,
    }
}
