use std::collections::HashSet;

use log::log;

use crate::info::ErrorInfo;
use crate::listener::ErrorListener;
use crate::severity::Severity;

/// Accumulates diagnostics, ignoring repeats.
///
/// Abort is requested once a fatal diagnostic arrives or once `max_errors`
/// distinct serious diagnostics have been seen. A cap of `0` means no cap.
#[derive(Debug, Clone, Default)]
pub struct ErrorList {
    max_errors: usize,
    silent: bool,
    errors: Vec<ErrorInfo>,
    seen: HashSet<String>,
    severity: Severity,
    serious: usize,
}

impl ErrorList {
    pub fn new(max_errors: usize) -> Self {
        Self {
            max_errors,
            ..Self::default()
        }
    }

    /// Collects without mirroring anything to the log.
    pub fn silent(max_errors: usize) -> Self {
        Self {
            max_errors,
            silent: true,
            ..Self::default()
        }
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        &self.errors
    }

    /// The worst severity logged so far.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn serious_count(&self) -> usize {
        self.serious
    }

    pub fn max_errors(&self) -> usize {
        self.max_errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
        self.seen.clear();
        self.severity = Severity::None;
        self.serious = 0;
    }

    pub fn into_errors(self) -> Vec<ErrorInfo> {
        self.errors
    }
}

impl ErrorListener for ErrorList {
    fn log(&mut self, err: ErrorInfo) -> bool {
        if !self.seen.insert(err.uid()) {
            return self.is_abort_desired();
        }
        self.severity = self.severity.max(err.severity);
        if err.is_serious() {
            self.serious += 1;
        }
        if !self.silent {
            log!(err.severity.log_level(), "{err}");
        }
        self.errors.push(err);
        self.is_abort_desired()
    }

    fn is_abort_desired(&self) -> bool {
        self.severity >= Severity::Fatal || (self.max_errors > 0 && self.serious >= self.max_errors)
    }

    fn has_serious_errors(&self) -> bool {
        self.serious > 0
    }

    fn has_error(&self, code: &str) -> bool {
        self.errors.iter().any(|e| e.code == code)
    }

    fn is_silent(&self) -> bool {
        self.silent
    }
}

/// Diagnostics collected on a speculative path.
///
/// A branch requests abort on its first serious diagnostic. Dropping the
/// branch discards what it collected; [`merge`](Self::merge) replays it into
/// the parent.
pub struct BranchedErrors<'a> {
    parent: &'a mut dyn ErrorListener,
    errors: ErrorList,
}

impl<'a> BranchedErrors<'a> {
    pub fn new(parent: &'a mut dyn ErrorListener) -> Self {
        let errors = if parent.is_silent() {
            ErrorList::silent(1)
        } else {
            ErrorList::new(1)
        };
        Self { parent, errors }
    }

    pub fn errors(&self) -> &[ErrorInfo] {
        self.errors.errors()
    }

    /// Accept the speculative path: hand every collected diagnostic to the
    /// parent and give the parent back.
    pub fn merge(self) -> &'a mut dyn ErrorListener {
        let Self { parent, errors } = self;
        for err in errors.into_errors() {
            parent.log(err);
        }
        parent
    }

    /// A nested branch whose parent is this one.
    pub fn branch(&mut self) -> BranchedErrors<'_> {
        BranchedErrors::new(self)
    }
}

impl ErrorListener for BranchedErrors<'_> {
    fn log(&mut self, err: ErrorInfo) -> bool {
        self.errors.log(err);
        self.is_abort_desired()
    }

    fn is_abort_desired(&self) -> bool {
        self.errors.is_abort_desired() || self.parent.is_abort_desired()
    }

    fn has_serious_errors(&self) -> bool {
        self.errors.has_serious_errors() || self.parent.has_serious_errors()
    }

    fn has_error(&self, code: &str) -> bool {
        self.errors.has_error(code) || self.parent.has_error(code)
    }

    fn is_silent(&self) -> bool {
        self.errors.is_silent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::info::{Locus, Position};
    use crate::listener::Blackhole;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn error(code: &str, line: u32) -> ErrorInfo {
        ErrorInfo::new(Severity::Error, code, vec![]).at(Locus::new(
            Some("test.x"),
            Position::new(line, 0),
            Position::new(line, 1),
        ))
    }

    #[test]
    fn cap_counts_distinct_errors() {
        init();
        let mut errs = ErrorList::new(2);
        assert!(!errs.log(error("E", 1)));
        assert!(!errs.log(error("E", 1)));
        assert_eq!(errs.serious_count(), 1);
        assert_eq!(errs.errors().len(), 1);
        assert!(errs.log(error("E", 2)));
        assert!(errs.is_abort_desired());
    }

    #[test]
    fn warnings_do_not_count() {
        let mut errs = ErrorList::new(1);
        errs.log(ErrorInfo::new(Severity::Warning, "W", vec![]));
        assert!(!errs.is_abort_desired());
        assert!(!errs.has_serious_errors());
        assert_eq!(errs.severity(), Severity::Warning);
        assert!(errs.has_error("W"));
    }

    #[test]
    fn fatal_aborts_uncapped_list() {
        let mut errs = ErrorList::new(0);
        for line in 0..50 {
            assert!(!errs.log(error("E", line)));
        }
        assert!(errs.log(ErrorInfo::new(Severity::Fatal, "F", vec![])));
        errs.clear();
        assert!(errs.is_empty());
        assert!(!errs.is_abort_desired());
    }

    #[test]
    fn branch_merge_replays_into_parent() {
        let mut errs = ErrorList::new(0);
        {
            let mut branch = errs.branch();
            branch.log(error("SPECULATIVE", 3));
            assert!(branch.has_error("SPECULATIVE"));
        }
        assert!(errs.is_empty());

        let mut branch = errs.branch();
        branch.log(error("KEPT", 4));
        let parent = branch.merge();
        assert!(parent.has_error("KEPT"));
        assert!(errs.has_serious_errors());
        assert_eq!(errs.errors().len(), 1);
    }

    #[test]
    fn branch_aborts_on_first_serious_error() {
        let mut errs = ErrorList::new(0);
        let mut branch = errs.branch();
        assert!(!branch.log(ErrorInfo::new(Severity::Warning, "W", vec![])));
        assert!(branch.log(error("E", 1)));
        assert!(branch.is_abort_desired());
        drop(branch);
        assert!(!errs.is_abort_desired());

        let mut capped = ErrorList::new(1);
        let mut branch = BranchedErrors::new(&mut capped);
        assert!(branch.log(error("E", 2)));
    }

    #[test]
    fn nested_branches() {
        let mut errs = ErrorList::new(0);
        let mut outer = errs.branch();
        let mut inner = outer.branch();
        inner.log(error("DEEP", 1));
        inner.merge();
        assert!(outer.has_error("DEEP"));
        outer.merge();
        assert!(errs.has_error("DEEP"));
    }

    #[test]
    fn branch_inherits_silence() {
        let mut quiet = ErrorList::silent(0);
        assert!(quiet.branch().is_silent());
        let mut hole = Blackhole;
        assert!(hole.branch().is_silent());
        let mut loud = ErrorList::new(0);
        assert!(!loud.branch().is_silent());
    }
}
