use log::log;

use crate::info::ErrorInfo;
use crate::list::BranchedErrors;
use crate::severity::Severity;

/// A sink for diagnostics.
///
/// Logging never unwinds: callers poll [`is_abort_desired`] (or the value
/// `log` returns) and stop cooperatively.
///
/// [`is_abort_desired`]: ErrorListener::is_abort_desired
pub trait ErrorListener {
    /// Record a diagnostic. Returns `true` once the caller should give up.
    fn log(&mut self, err: ErrorInfo) -> bool;

    fn is_abort_desired(&self) -> bool {
        false
    }

    fn has_serious_errors(&self) -> bool {
        false
    }

    fn has_error(&self, _code: &str) -> bool {
        false
    }

    /// A silent listener still counts, but nothing it records is reported.
    fn is_silent(&self) -> bool {
        false
    }

    /// Start collecting speculatively. Nothing reaches `self` until the
    /// branch is merged.
    fn branch(&mut self) -> BranchedErrors<'_>
    where
        Self: Sized,
    {
        BranchedErrors::new(self)
    }
}

/// Swallows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blackhole;

impl ErrorListener for Blackhole {
    fn log(&mut self, _err: ErrorInfo) -> bool {
        false
    }

    fn is_silent(&self) -> bool {
        true
    }
}

/// For code running outside the assembler: serious diagnostics panic,
/// anything else goes to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeErrors;

impl ErrorListener for RuntimeErrors {
    fn log(&mut self, err: ErrorInfo) -> bool {
        if err.severity >= Severity::Error {
            panic!("{err}");
        }
        log!(err.severity.log_level(), "{err}");
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blackhole_never_aborts() {
        let mut sink = Blackhole;
        assert!(!sink.log(ErrorInfo::new(Severity::Fatal, "BOOM", vec![])));
        assert!(sink.is_silent());
        assert!(!sink.is_abort_desired());
    }

    #[test]
    fn runtime_passes_warnings() {
        let _ = env_logger::builder().is_test(true).try_init();
        assert!(!RuntimeErrors.log(ErrorInfo::new(Severity::Warning, "W", vec![])));
    }

    #[test]
    #[should_panic(expected = "BAD_THING")]
    fn runtime_panics_on_errors() {
        RuntimeErrors.log(ErrorInfo::new(Severity::Error, "BAD_THING", vec![]));
    }
}
