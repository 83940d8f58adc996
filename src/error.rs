use std::{borrow::Cow, cell::RefCell, fmt, fmt::Write as _};

pub type Message = Cow<'static, str>;

/// Collects grammar-level diagnostics. None of them stop compilation; the
/// emitter still produces a best-effort recognizer and callers decide when
/// to surface the accumulated warnings.
#[derive(Default)]
pub struct ErrorAccumulator {
    warnings: RefCell<Vec<Message>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warning_static(&self, message: &'static str) {
        self.warnings.borrow_mut().push(message.into());
    }

    pub fn warning(&self, message: impl ToString) {
        self.warnings.borrow_mut().push(message.to_string().into());
    }

    pub fn get(&self) -> std::cell::Ref<Vec<Message>> {
        self.warnings.borrow()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.warnings.borrow_mut().clear();
    }

    pub fn report(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        for warning in self.warnings.borrow().iter() {
            writeln!(out, "{warning}")?;
        }
        Ok(())
    }

    pub fn report_stderr(&self) {
        for warning in self.warnings.borrow().iter() {
            eprintln!("{warning}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_in_order() {
        let err = ErrorAccumulator::new();
        err.warning_static("first");
        err.warning(format_args!("second {}", 2));
        let mut out = String::new();
        err.report(&mut out).unwrap();
        assert_eq!(out, "first\nsecond 2\n");
        err.clear();
        assert!(err.is_empty());
    }
}
