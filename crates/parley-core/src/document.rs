use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix of an include marker line, e.g. `@context/identity.md`.
pub const IMPORT_PREFIX: &str = "@context/";

/// Where a context document comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// The root document the import graph starts from.
    Root,
    /// Authored; changed through the context API or skill pulls.
    Static,
    /// Regenerated before every invocation.
    Dynamic,
}

/// A named text unit consumed by the reasoning process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextDocument {
    pub name: String,
    pub kind: DocumentKind,
    pub content: String,
    pub last_modified: DateTime<Utc>,
}

impl ContextDocument {
    /// Names referenced by include markers, in textual order.
    pub fn imports(&self) -> Vec<String> {
        self.content.lines().filter_map(parse_import).collect()
    }

    /// The content with include-marker lines removed and trailing whitespace trimmed.
    pub fn body(&self) -> String {
        self.content
            .lines()
            .filter(|line| parse_import(line).is_none())
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string()
    }

    /// Whether this document imports `name`.
    pub fn includes(&self, name: &str) -> bool {
        self.content
            .lines()
            .filter_map(parse_import)
            .any(|n| n == name)
    }
}

/// Parse one line as an include marker, returning the referenced name.
///
/// Accepts `@context/<name>.md` and `@context/<name>`; surrounding
/// whitespace is ignored. Anything else on the line disqualifies it.
pub fn parse_import(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix(IMPORT_PREFIX)?;
    let name = rest.strip_suffix(".md").unwrap_or(rest);
    if name.is_empty() || name.contains(char::is_whitespace) || name.contains('/') {
        return None;
    }
    Some(name.to_string())
}
