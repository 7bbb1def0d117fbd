//! Requirement reference extraction from free text (commit messages and
//! requirement document chunks).

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;

/// Tried in order; the first pattern that matches anywhere wins.
const REFERENCE_PATTERNS: &[&str] = &[
    r"REQ[-_]?(\d+)",
    r"요구사항[-_]?(\d+)",
    r"#(\d+)",
    r"FEAT[-_]?(\d+)",
    r"REQUIREMENT[-_]?(\d+)",
];

static REFERENCES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    REFERENCE_PATTERNS
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .expect("requirement reference pattern must compile")
        })
        .collect()
});

/// Return the number of the first requirement reference in `text`.
///
/// ```rust
/// use commitlens::requirements::extract_requirement_number;
///
/// assert_eq!(extract_requirement_number("feat: login (req-42)").as_deref(), Some("42"));
/// assert_eq!(extract_requirement_number("chore: bump deps"), None);
/// ```
pub fn extract_requirement_number(text: &str) -> Option<String> {
    REFERENCES.iter().find_map(|re| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    })
}
