//! Turns a [`FeatureSet`] into the short query text used for similarity
//! search and as the file summary handed to the judge.

use crate::models::FeatureSet;

/// Entries listed per family in the query; the rest are dropped.
const LIST_PREVIEW: usize = 10;

pub fn build_query(features: &FeatureSet) -> String {
    let roles = features
        .hints
        .active()
        .iter()
        .map(|role| format!("'{}'", role))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "[FILE] {}\nroles=[{}]\nroutes=[{}]\ndefs=[{}]\nconfigs=[{}]\n\nSUMMARY_CONTEXT:\n{}",
        features.file_path,
        roles,
        preview(&features.routes),
        preview(&features.defs),
        preview(&features.configs),
        features.sampled
    )
}

fn preview(items: &[String]) -> String {
    items
        .iter()
        .take(LIST_PREVIEW)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoleHints;

    #[test]
    fn formats_all_sections() {
        let features = FeatureSet {
            file_path: "app/users.py".to_string(),
            routes: vec!["/users".to_string(), "/users/{id}".to_string()],
            defs: (0..15).map(|i| format!("f{}", i)).collect(),
            configs: Vec::new(),
            hints: RoleHints {
                is_controller: true,
                is_repository: false,
                is_service: true,
            },
            sampled: "def f0(): pass".to_string(),
        };

        let query = build_query(&features);
        let mut lines = query.lines();
        assert_eq!(lines.next(), Some("[FILE] app/users.py"));
        assert_eq!(lines.next(), Some("roles=['controller', 'service']"));
        assert_eq!(lines.next(), Some("routes=[/users, /users/{id}]"));
        assert_eq!(
            lines.next(),
            Some("defs=[f0, f1, f2, f3, f4, f5, f6, f7, f8, f9]")
        );
        assert_eq!(lines.next(), Some("configs=[]"));
        assert!(query.ends_with("SUMMARY_CONTEXT:\ndef f0(): pass"));
    }

    #[test]
    fn no_roles_render_as_empty_list() {
        let features = FeatureSet {
            file_path: "README.md".to_string(),
            routes: Vec::new(),
            defs: Vec::new(),
            configs: Vec::new(),
            hints: RoleHints::default(),
            sampled: String::new(),
        };
        assert!(build_query(&features).contains("\nroles=[]\n"));
    }
}
