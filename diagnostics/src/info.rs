use core::fmt;

use crate::severity::Severity;

/// A zero-based line and column in a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Where in the source a diagnostic points.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Locus {
    pub file: Option<String>,
    pub start: Position,
    pub end: Position,
}

impl Locus {
    pub fn new(file: Option<&str>, start: Position, end: Position) -> Self {
        Self {
            file: file.map(str::to_string),
            start,
            end,
        }
    }
}

/// One diagnostic.
///
/// `code` names the message (e.g. `"NAME_AMBIGUOUS"`) and `params` fill in
/// its details. `structure` is a description of the assembled structure the
/// diagnostic is about, when it is not tied to source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub severity: Severity,
    pub code: String,
    pub params: Vec<String>,
    pub locus: Option<Locus>,
    pub structure: Option<String>,
}

impl ErrorInfo {
    pub fn new(severity: Severity, code: &str, params: Vec<String>) -> Self {
        Self {
            severity,
            code: code.to_string(),
            params,
            locus: None,
            structure: None,
        }
    }

    pub fn at(mut self, locus: Locus) -> Self {
        self.locus = Some(locus);
        self
    }

    pub fn on(mut self, structure: impl Into<String>) -> Self {
        self.structure = Some(structure.into());
        self
    }

    pub fn is_serious(&self) -> bool {
        self.severity.is_serious()
    }

    /// Identity used to recognise a repeat of the same diagnostic: the same
    /// code with the same details at the same place.
    pub fn uid(&self) -> String {
        let mut uid = format!("{}:{}", self.severity as u8, self.code);
        if let Some(structure) = &self.structure {
            uid.push(':');
            uid.push_str(structure);
        }
        if !self.params.is_empty() {
            uid.push('#');
            uid.push_str(&self.params.join("\u{1f}"));
        }
        if let Some(locus) = &self.locus {
            uid.push_str(&format!(
                ":{}:{}.{}:{}.{}",
                locus.file.as_deref().unwrap_or(""),
                locus.start.line,
                locus.start.column,
                locus.end.line,
                locus.end.column
            ));
        }
        uid
    }

    /// The code followed by its parameters.
    pub fn message(&self) -> String {
        if self.params.is_empty() {
            self.code.clone()
        } else {
            format!("{}: {}", self.code, self.params.join(", "))
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(locus) = &self.locus {
            if let Some(file) = &locus.file {
                write!(f, "{file} ")?;
            }
            write!(f, "[{}:{}", locus.start.line + 1, locus.start.column + 1)?;
            if locus.end != locus.start {
                write!(f, "..{}:{}", locus.end.line + 1, locus.end.column + 1)?;
            }
            f.write_str("] ")?;
        }
        if let Some(structure) = &self.structure {
            write!(f, "[{structure}] ")?;
        }
        f.write_str(&self.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_with_locus() {
        let err = ErrorInfo::new(Severity::Error, "NAME_UNKNOWN", vec!["Foo".into()]).at(Locus::new(
            Some("main.x"),
            Position::new(2, 4),
            Position::new(2, 7),
        ));
        assert_eq!(err.to_string(), "main.x [3:5..3:8] NAME_UNKNOWN: Foo");

        let point = ErrorInfo::new(Severity::Warning, "UNUSED", vec![])
            .at(Locus::new(None, Position::new(0, 0), Position::new(0, 0)))
            .on("m:pkg.C");
        assert_eq!(point.to_string(), "[1:1] [m:pkg.C] UNUSED");
    }

    #[test]
    fn uid_distinguishes_place_and_details() {
        let base = ErrorInfo::new(Severity::Error, "E1", vec!["a".into()]);
        let same = ErrorInfo::new(Severity::Error, "E1", vec!["a".into()]);
        let other_param = ErrorInfo::new(Severity::Error, "E1", vec!["b".into()]);
        let elsewhere = base
            .clone()
            .at(Locus::new(Some("f.x"), Position::new(1, 0), Position::new(1, 2)));
        assert_eq!(base.uid(), same.uid());
        assert_ne!(base.uid(), other_param.uid());
        assert_ne!(base.uid(), elsewhere.uid());
        assert!(elsewhere.uid().starts_with("3:E1#a:f.x:"));
    }
}
