//! Regex feature extraction over a bounded sample of a file.
//!
//! Large files are never scanned in full: the extractor looks at the first
//! 8000 characters, an 8000-character window around the midpoint, and the
//! last 8000 characters. Three pattern families run over that sample:
//!
//! | Family | Examples |
//! |--------|----------|
//! | routes | `@GetMapping("/users")`, `@app.get('/items')`, `@router.post("/x")` |
//! | defs | `class UserService`, `def handle(`, `public String name(` |
//! | configs | `ENV_DATABASE_URL`, `MAX_RETRIES=3`, `"timeout": 30` |
//!
//! Each family's matches keep first-seen order, are deduplicated by exact
//! string, and are capped at [`MAX_MATCHES`].

use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::{FeatureSet, RoleHints};

/// Characters taken from each of the head, middle, and tail of the text.
pub const SAMPLE_SLICE_CHARS: usize = 8000;
/// Length of the `sampled` context kept on the feature set.
pub const SAMPLED_CONTEXT_CHARS: usize = 4000;
/// Upper bound on each extracted list.
pub const MAX_MATCHES: usize = 50;

const SAMPLE_SEPARATOR: &str = "\n...\n";

const ROUTE_PATTERNS: &[&str] = &[
    r#"@GetMapping\("([^"]+)"\)"#,
    r#"@PostMapping\("([^"]+)"\)"#,
    r#"@PutMapping\("([^"]+)"\)"#,
    r#"@DeleteMapping\("([^"]+)"\)"#,
    r#"@RequestMapping\("([^"]+)"\)"#,
    r#"@app\.get\(['"]([^'"]+)['"]\)"#,
    r#"@app\.post\(['"]([^'"]+)['"]\)"#,
    r#"app\.get\(['"]([^'"]+)['"]\)"#,
    r#"app\.post\(['"]([^'"]+)['"]\)"#,
    r"FastAPI\(",
    r"APIRouter\(",
    r#"@router\.(get|post|put|delete)\(['"]([^'"]+)['"]\)"#,
];

const DEF_PATTERNS: &[&str] = &[
    r"\bclass\s+([A-Za-z_][A-Za-z0-9_]*)",
    r"\bdef\s+([A-Za-z_][A-Za-z0-9_]*)\(",
    r"\bpublic\s+[A-Za-z<>\[\]]+\s+([a-zA-Z_][A-Za-z0-9_]*)\(",
];

// `(?-s:.*)` keeps the assignment match on its own line.
const CONFIG_PATTERNS: &[&str] = &[
    r"\bENV[_A-Z0-9]+\b",
    r"\b[A-Z0-9_]{3,}\b=(?-s:.*)",
    r#""[A-Za-z0-9_]+" *: *("[^"]+"|\d+|true|false|null)"#,
];

static ROUTES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_family(ROUTE_PATTERNS));
static DEFS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_family(DEF_PATTERNS));
static CONFIGS: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_family(CONFIG_PATTERNS));

fn compile_family(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p)
                .case_insensitive(true)
                .multi_line(true)
                .dot_matches_new_line(true)
                .build()
                .expect("feature pattern must compile")
        })
        .collect()
}

/// Extract routes, definitions, config tokens and role hints from a file.
pub fn extract_features(file_path: &str, full_text: &str) -> FeatureSet {
    let sample = sample_text(full_text);

    let routes = find_all(&ROUTES, &sample);
    let defs = find_all(&DEFS, &sample);
    let configs = find_all(&CONFIGS, &sample);

    let lower_path = file_path.to_lowercase();
    let hints = RoleHints {
        is_controller: !routes.is_empty()
            || file_path.contains("Controller")
            || lower_path.contains("router"),
        is_repository: file_path.contains("Repository") || lower_path.contains("repo"),
        is_service: file_path.contains("Service") || lower_path.contains("service"),
    };

    FeatureSet {
        file_path: file_path.to_string(),
        routes,
        defs,
        configs,
        hints,
        sampled: take_chars(&sample, SAMPLED_CONTEXT_CHARS).to_string(),
    }
}

/// Build the head / middle / tail sample. Indexing is by character, so
/// multi-byte text is never split inside a code point.
pub fn sample_text(text: &str) -> String {
    let n = text.chars().count();
    let head = char_range(text, 0, SAMPLE_SLICE_CHARS.min(n));

    let half_window = SAMPLE_SLICE_CHARS / 2;
    let mid_start = (n / 2).saturating_sub(half_window);
    let mid_end = (n / 2 + half_window).min(n);
    let middle = char_range(text, mid_start, mid_end);

    let tail = char_range(text, n.saturating_sub(SAMPLE_SLICE_CHARS), n);

    let mut sample =
        String::with_capacity(head.len() + middle.len() + tail.len() + 2 * SAMPLE_SEPARATOR.len());
    sample.push_str(head);
    sample.push_str(SAMPLE_SEPARATOR);
    sample.push_str(middle);
    sample.push_str(SAMPLE_SEPARATOR);
    sample.push_str(tail);
    sample
}

/// Run every pattern of a family and collect matches.
///
/// A pattern without groups contributes the whole match; with one group,
/// the group; with several, the non-empty groups joined by `/`.
fn find_all(patterns: &[Regex], text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for re in patterns {
        for caps in re.captures_iter(text) {
            let value = match caps.len() {
                1 => caps[0].to_string(),
                2 => caps.get(1).map(|m| m.as_str()).unwrap_or("").to_string(),
                _ => caps
                    .iter()
                    .skip(1)
                    .flatten()
                    .map(|m| m.as_str())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join("/"),
            };
            if seen.insert(value.clone()) {
                found.push(value);
                if found.len() == MAX_MATCHES {
                    return found;
                }
            }
        }
    }

    found
}

fn byte_offset(text: &str, char_idx: usize) -> usize {
    text.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

fn char_range(text: &str, start: usize, end: usize) -> &str {
    if start >= end {
        return "";
    }
    let from = byte_offset(text, start);
    let to = byte_offset(text, end);
    &text[from..to]
}

fn take_chars(text: &str, n: usize) -> &str {
    &text[..byte_offset(text, n)]
}
