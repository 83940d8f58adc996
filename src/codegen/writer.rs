//! Line-oriented sink for the emitted recognizer. The generator runs every
//! rule twice through the same traversal: a dry pass that discards output
//! while recording, per label, whether control flow through it restores the
//! input position and/or the thunk position; and a real pass that reads
//! those flags to emit only the snapshots that some restore depends on.

use std::fmt::{self, Write as _};

/// Recorded per label id during the dry pass: which snapshots the label's
/// restores need.
#[derive(Clone, Copy, Default)]
pub struct SaveFlags {
    pub pos: bool,
    pub th_pos: bool,
}

/// Returned by each lowering step: whether the failure/success paths out of
/// the construct may leave position or thunk position changed.
#[derive(Clone, Copy, Default)]
pub struct ChgFlags {
    pub pos: bool,
    pub th_pos: bool,
}

impl ChgFlags {
    pub fn merge(&mut self, other: ChgFlags) {
        self.pos |= other.pos;
        self.th_pos |= other.th_pos;
    }
}

/// A lexical label in the emitted code. `id` names the `lN` jump target;
/// `sid` numbers the snapshot locals (`positionN`, `thunkPositionN`) and is
/// forced to 0 for each rule's failure label so every rule function reuses
/// the same local names.
pub struct Label {
    pub(crate) id: usize,
    pub(crate) sid: usize,
    pub(crate) used: bool,
    saved_block_open: bool,
}

pub struct Writer<'a> {
    out: &'a mut dyn fmt::Write,
    /// Signed: the dry pass runs restores whose save side was elided, so
    /// the indentation can transiently go negative before `set_dry(false)`
    /// resets it.
    pub indent: i32,
    dry: bool,
    saved_indent: i32,
    n_labels: usize,
    save_flags: Vec<SaveFlags>,
}

impl<'a> Writer<'a> {
    pub fn new(out: &'a mut dyn fmt::Write) -> Writer<'a> {
        Writer {
            out,
            indent: 2,
            dry: false,
            saved_indent: 0,
            n_labels: 0,
            save_flags: Vec::new(),
        }
    }

    /// Entering the dry pass remembers the indentation; leaving it restores
    /// the indentation and resets the label counter so the real pass hands
    /// out the same ids along the same traversal. The recorded flags stay.
    pub fn set_dry(&mut self, on: bool) {
        self.dry = on;
        if on {
            self.saved_indent = self.indent;
        } else {
            self.indent = self.saved_indent;
            self.n_labels = 0;
        }
    }

    pub fn is_dry(&self) -> bool {
        self.dry
    }

    /// A newline, the current indentation, then the formatted text.
    pub fn line(&mut self, args: fmt::Arguments) -> fmt::Result {
        if self.dry {
            return Ok(());
        }
        self.out.write_str("\n")?;
        for _ in 0..self.indent {
            self.out.write_str("\t")?;
        }
        self.out.write_fmt(args)
    }

    pub fn begin(&mut self) -> fmt::Result {
        self.line(format_args!("{{"))?;
        self.indent += 1;
        Ok(())
    }

    pub fn end(&mut self) -> fmt::Result {
        self.indent -= 1;
        self.line(format_args!("}}"))
    }

    pub fn new_label(&mut self) -> Label {
        let id = self.n_labels;
        self.n_labels += 1;
        if self.dry {
            self.save_flags.push(SaveFlags::default());
        }
        Label {
            id,
            sid: id,
            used: false,
            saved_block_open: false,
        }
    }

    pub fn jump(&mut self, label: &mut Label) -> fmt::Result {
        self.line(format_args!("goto l{}", label.id))?;
        label.used = true;
        Ok(())
    }

    /// Conditional jump. Marks the label used in both passes; only the real
    /// pass writes text.
    pub fn cjump(
        &mut self,
        label: &mut Label,
        jump_if_true: bool,
        condition: fmt::Arguments,
    ) -> fmt::Result {
        label.used = true;
        if self.dry {
            return Ok(());
        }
        if jump_if_true {
            self.line(format_args!("if {condition} {{"))?;
        } else {
            self.line(format_args!("if !{condition} {{"))?;
        }
        self.line(format_args!("\tgoto l{}", label.id))?;
        self.line(format_args!("}}"))
    }

    pub fn label_site(&mut self, label: &Label) -> fmt::Result {
        self.indent -= 1;
        self.line(format_args!("l{}:", label.id))?;
        self.indent += 1;
        Ok(())
    }

    /// Whether any restore through this label was recorded by the dry pass.
    pub fn is_unsafe(&self, label: &Label) -> bool {
        let flags = self.save_flags[label.id];
        flags.pos || flags.th_pos
    }

    /// Snapshot exactly what the dry pass recorded for this label.
    pub fn save(&mut self, label: &Label) -> fmt::Result {
        let flags = self.save_flags[label.id];
        match (flags.pos, flags.th_pos) {
            (true, true) => self.line(format_args!(
                "position{0}, thunkPosition{0} := position, thunkPosition",
                label.sid
            )),
            (false, true) => self.line(format_args!(
                "thunkPosition{} := thunkPosition",
                label.sid
            )),
            (true, false) => self.line(format_args!("position{} := position", label.sid)),
            (false, false) => Ok(()),
        }
    }

    /// Open a block and snapshot, when the label needs one at all; the
    /// matching restore closes the block again.
    pub fn save_block(&mut self, label: &mut Label) -> fmt::Result {
        if self.is_unsafe(label) {
            self.begin()?;
            self.save(label)?;
            label.saved_block_open = true;
        }
        Ok(())
    }

    /// Emit the label's own site (if jumped to) followed by the restore.
    pub fn restore(&mut self, label: &mut Label, pos: bool, th_pos: bool) -> fmt::Result {
        if label.used {
            self.label_site(label)?;
        }
        self.restore_tail(label, pos, th_pos)
    }

    /// Like `restore`, but the label site comes from `site` while the
    /// snapshot locals belong to `label` (ordered alternates land on the
    /// next branch's label and rewind to the alternate's snapshot).
    pub fn lrestore(
        &mut self,
        label: &mut Label,
        site: Option<&Label>,
        pos: bool,
        th_pos: bool,
    ) -> fmt::Result {
        if let Some(site) = site {
            if site.used {
                self.label_site(site)?;
            }
        }
        self.restore_tail(label, pos, th_pos)
    }

    fn restore_tail(&mut self, label: &mut Label, pos: bool, th_pos: bool) -> fmt::Result {
        match (pos, th_pos) {
            (true, true) => self.line(format_args!(
                "position, thunkPosition = position{0}, thunkPosition{0}",
                label.sid
            ))?,
            (false, true) => self.line(format_args!(
                "thunkPosition = thunkPosition{}",
                label.sid
            ))?,
            (true, false) => self.line(format_args!("position = position{}", label.sid))?,
            (false, false) => {}
        }
        if self.dry {
            let flags = &mut self.save_flags[label.id];
            flags.pos |= pos;
            flags.th_pos |= th_pos;
        }
        if label.saved_block_open {
            self.end()?;
            label.saved_block_open = false;
        }
        Ok(())
    }
}

impl fmt::Write for Writer<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if self.dry {
            return Ok(());
        }
        self.out.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dry_pass_discards_output_and_records_flags() {
        let mut out = String::new();
        let save_flags;
        {
            let mut w = Writer::new(&mut out);

            w.set_dry(true);
            let mut label = w.new_label();
            w.save(&label).unwrap();
            w.cjump(&mut label, false, format_args!("matchDot()")).unwrap();
            w.restore(&mut label, true, false).unwrap();
            w.set_dry(false);
            save_flags = w.save_flags.clone();
        }

        assert!(out.is_empty());

        let mut w = Writer::new(&mut out);
        w.save_flags = save_flags;
        let mut label = w.new_label();
        assert!(w.is_unsafe(&label));
        w.save(&label).unwrap();
        w.cjump(&mut label, false, format_args!("matchDot()")).unwrap();
        w.restore(&mut label, true, false).unwrap();

        assert_eq!(
            out,
            "\n\t\tposition0 := position\
             \n\t\tif !matchDot() {\n\t\t\tgoto l0\n\t\t}\
             \n\tl0:\n\t\tposition = position0"
        );
    }

    #[test]
    fn unreferenced_label_saves_nothing() {
        let mut out = String::new();
        let mut w = Writer::new(&mut out);

        w.set_dry(true);
        let label = w.new_label();
        w.save(&label).unwrap();
        w.set_dry(false);

        let label = w.new_label();
        assert!(!w.is_unsafe(&label));
        w.save(&label).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn flags_accumulate_monotonically() {
        let mut out = String::new();
        let mut w = Writer::new(&mut out);

        w.set_dry(true);
        let mut label = w.new_label();
        w.restore(&mut label, false, true).unwrap();
        w.restore(&mut label, true, false).unwrap();
        w.set_dry(false);

        let label = w.new_label();
        let flags = w.save_flags[label.id];
        assert!(flags.pos && flags.th_pos);
    }
}
