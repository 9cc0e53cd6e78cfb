//! Review finding types.
//!
//! A reviewing agent reports one [`ReviewFinding`] per observation. Findings are
//! validated at the parse boundary (see `extract::findings`); a finding that
//! cannot be anchored to a diff line is still a finding and is folded into the
//! summary comment instead of being dropped.
//!
//! ## Example
//!
//! ```
//! use mrpilot::review::findings::{ReviewFinding, Severity};
//!
//! let finding = ReviewFinding::new(Severity::Major, "src/auth.rs", "Token compared with ==")
//!     .with_line(42)
//!     .with_suggestion("Use a constant-time comparison");
//!
//! assert_eq!(finding.inline_anchor(), Some(("src/auth.rs", 42)));
//! assert_eq!(finding.location(), "src/auth.rs:42");
//! ```

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Severity of a finding, most to least severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Security hole, data loss or a correctness bug.
    Critical,
    Major,
    #[default]
    Minor,
    /// Style or optional improvement.
    Suggestion,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Critical,
        Severity::Major,
        Severity::Minor,
        Severity::Suggestion,
    ];

    /// Map a free-form label to a severity. Agents are not consistent about
    /// vocabulary, so common synonyms are accepted and anything unknown is
    /// treated as minor.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" | "blocker" | "error" => Self::Critical,
            "major" | "high" | "warning" => Self::Major,
            "suggestion" | "nit" | "note" | "style" => Self::Suggestion,
            _ => Self::Minor,
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            Self::Critical => "🔴",
            Self::Major => "🟠",
            Self::Minor => "🟡",
            Self::Suggestion => "🔵",
        }
    }
}

impl<'de> Deserialize<'de> for Severity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(label)) => Self::from_label(&label),
            _ => Self::default(),
        })
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Critical => "critical",
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Suggestion => "suggestion",
        };
        write!(f, "{}", s)
    }
}

/// Accept `12`, `"12"`, `null` or a missing field. Anything unparseable becomes
/// 0, which marks the finding as not anchorable.
fn lenient_line<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Text from a string, number or bool. `null` and structured values become
/// `None`.
fn text_of(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(text_of(Option::deserialize(deserializer)?).unwrap_or_default())
}

fn lenient_optional_text<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(text_of(Option::deserialize(deserializer)?))
}

/// One reviewer observation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewFinding {
    #[serde(default)]
    severity: Severity,
    #[serde(default, deserialize_with = "lenient_text")]
    category: String,
    /// Path in the new version of the change, relative to the repository root.
    #[serde(
        default,
        alias = "path",
        alias = "new_path",
        deserialize_with = "lenient_text"
    )]
    file: String,
    /// 1-based line in the new version of the file. Non-positive means unknown.
    #[serde(default, alias = "new_line", deserialize_with = "lenient_line")]
    line: i64,
    #[serde(default, deserialize_with = "lenient_text")]
    title: String,
    #[serde(
        default,
        alias = "body",
        alias = "message",
        deserialize_with = "lenient_text"
    )]
    description: String,
    #[serde(
        default,
        alias = "fix",
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_optional_text"
    )]
    suggestion: Option<String>,
}

impl ReviewFinding {
    pub fn new(severity: Severity, file: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            severity,
            category: String::new(),
            file: file.into(),
            line: 0,
            title: title.into(),
            description: String::new(),
            suggestion: None,
        }
    }

    pub fn with_line(mut self, line: i64) -> Self {
        self.line = line;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// The `(path, line)` an inline comment can be anchored to, or `None`
    /// when the finding has no file or a non-positive line.
    pub fn inline_anchor(&self) -> Option<(&str, u32)> {
        let file = self.file.trim();
        if file.is_empty() || self.line <= 0 {
            return None;
        }
        u32::try_from(self.line).ok().map(|line| (file, line))
    }

    /// `file:line`, `file`, or `(general)` depending on what is known.
    pub fn location(&self) -> String {
        match (self.file.trim(), self.line) {
            ("", _) => "(general)".to_string(),
            (file, line) if line > 0 => format!("{}:{}", file, line),
            (file, _) => file.to_string(),
        }
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn line(&self) -> i64 {
        self.line
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Markdown body for an inline discussion.
    pub fn to_comment(&self) -> String {
        let mut body = format!("{} **[{}]** {}", self.severity.emoji(), self.severity, self.heading());
        if !self.description.trim().is_empty() {
            body.push_str("\n\n");
            body.push_str(self.description.trim());
        }
        if let Some(suggestion) = self.suggestion() {
            body.push_str("\n\n**Suggestion:** ");
            body.push_str(suggestion.trim());
        }
        body
    }

    fn heading(&self) -> String {
        let title = if self.title.trim().is_empty() {
            "Untitled finding"
        } else {
            self.title.trim()
        };
        if self.category.trim().is_empty() {
            title.to_string()
        } else {
            format!("{} ({})", title, self.category.trim())
        }
    }
}

impl fmt::Display for ReviewFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] `{}`: {}",
            self.severity.emoji(),
            self.severity,
            self.location(),
            self.heading()
        )?;
        if !self.description.trim().is_empty() {
            write!(f, " - {}", self.description.trim())?;
        }
        if let Some(suggestion) = self.suggestion() {
            write!(f, " (suggestion: {})", suggestion.trim())?;
        }
        Ok(())
    }
}
