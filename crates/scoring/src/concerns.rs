use std::collections::BTreeMap;

/// Import substrings mapped to concern domains.
const CONCERN_PATTERNS: &[(&str, &[&str])] = &[
    (
        "persistence",
        &["db", "database", "sql", "orm", "repository", "dao", "entity"],
    ),
    (
        "communication",
        &["http", "requests", "api", "client", "socket", "email", "smtp", "webhook"],
    ),
    (
        "serialization",
        &["json", "xml", "yaml", "pickle", "serialize", "marshal"],
    ),
    ("validation", &["validator", "schema", "pydantic"]),
    ("logging", &["logging", "logger", "log"]),
    ("caching", &["cache", "redis", "memcached"]),
    ("file_io", &["file", "path", "io"]),
    ("datetime", &["datetime", "time", "timezone"]),
    (
        "security",
        &["auth", "jwt", "bcrypt", "hash", "crypto", "security"],
    ),
];

/// Categorize imported module names into concern domains. Each import
/// lands in at most one domain (first match wins); unmatched imports
/// are not counted.
#[must_use]
pub fn concern_counts(imports: &[String]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for import in imports {
        let lowered = import.to_lowercase();
        for (concern, patterns) in CONCERN_PATTERNS {
            if patterns.iter().any(|pattern| lowered.contains(pattern)) {
                *counts.entry(concern).or_insert(0) += 1;
                break;
            }
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn imports_map_to_concern_domains() {
        let imports = vec![
            "sqlalchemy".to_string(),
            "requests.api".to_string(),
            "jwt".to_string(),
            "itertools".to_string(),
        ];
        let counts = concern_counts(&imports);
        assert_eq!(counts.get("persistence"), Some(&1));
        assert_eq!(counts.get("communication"), Some(&1));
        assert_eq!(counts.get("security"), Some(&1));
        assert_eq!(counts.len(), 3, "unmatched imports are not counted");
    }
}
