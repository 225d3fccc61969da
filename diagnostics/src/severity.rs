use core::fmt;

/// How bad a diagnostic is. Ordered from harmless to fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Severity {
    #[default]
    None,
    Info,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    /// `Error` and worse count against an error cap.
    pub fn is_serious(self) -> bool {
        self >= Severity::Error
    }

    /// The log level a diagnostic of this severity is mirrored at.
    pub fn log_level(self) -> log::Level {
        match self {
            Severity::None => log::Level::Trace,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error | Severity::Fatal => log::Level::Error,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::None => "none",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        })
    }
}
