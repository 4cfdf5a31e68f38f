use std::collections::BTreeMap;

/// Verb categories mapping method names to concerns.
const VERB_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "data",
        &[
            "create", "read", "get", "fetch", "update", "delete", "save", "load", "insert",
            "remove", "find", "query",
        ],
    ),
    (
        "validation",
        &["validate", "check", "verify", "ensure", "assert", "test", "confirm"],
    ),
    (
        "transformation",
        &[
            "convert", "transform", "map", "serialize", "deserialize", "parse", "format",
            "encode", "decode",
        ],
    ),
    (
        "communication",
        &[
            "send", "notify", "publish", "subscribe", "request", "respond", "emit", "broadcast",
        ],
    ),
    (
        "calculation",
        &["calculate", "compute", "sum", "count", "average", "process", "analyze"],
    ),
    (
        "orchestration",
        &["execute", "run", "perform", "handle", "manage", "coordinate", "dispatch"],
    ),
];

/// Leading verb of a method name: the first snake_case segment, or the
/// leading word of a camelCase name.
#[must_use]
pub fn extract_verb(method_name: &str) -> String {
    if let Some((head, _)) = method_name.split_once('_') {
        return head.to_lowercase();
    }

    let mut verb = String::new();
    for (position, ch) in method_name.chars().enumerate() {
        if position > 0 && ch.is_uppercase() {
            break;
        }
        verb.push(ch);
    }
    verb.to_lowercase()
}

/// Count methods per verb category; uncategorized verbs are skipped.
#[must_use]
pub fn verb_category_counts(method_names: &[String]) -> BTreeMap<&'static str, usize> {
    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    for name in method_names {
        let verb = extract_verb(name);
        for (category, verbs) in VERB_CATEGORIES {
            if verbs.contains(&verb.as_str()) {
                *counts.entry(category).or_insert(0) += 1;
                break;
            }
        }
    }
    counts
}
