//! Table name sanitation and collision-free name proposals

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{ImportError, ImportResult};

/// Maximum identifier length in bytes
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Highest numeric suffix tried before giving up on a name
pub const MAX_NAME_SUFFIX: u32 = 1000;

/// Name used when nothing usable is left after sanitation
pub const DEFAULT_TABLE_NAME: &str = "untitled_table";

static INVALID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").unwrap());
static REPEATED_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"_{2,}").unwrap());

/// SQL reserved words and system column names a table cannot be called
const RESERVED_WORDS: &[&str] = &[
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric",
    "authorization", "between", "binary", "both", "case", "cast", "check", "collate",
    "column", "constraint", "create", "cross", "ctid", "current_date", "current_role",
    "current_time", "current_timestamp", "current_user", "default", "deferrable", "desc",
    "distinct", "do", "else", "end", "except", "false", "for", "foreign", "freeze", "from",
    "full", "grant", "group", "having", "ilike", "in", "initially", "inner", "intersect",
    "into", "is", "isnull", "join", "layer", "leading", "left", "like", "limit", "localtime",
    "localtimestamp", "map", "natural", "new", "not", "notnull", "null", "off", "offset",
    "oid", "old", "on", "only", "or", "order", "outer", "overlaps", "placing", "primary",
    "references", "returning", "right", "select", "session_user", "similar", "some",
    "symmetric", "table", "tableoid", "then", "to", "trailing", "true", "union", "unique",
    "user", "using", "verbose", "when", "where", "xmax", "xmin", "cmax", "cmin",
];

/// Whether `name` collides with a reserved word
pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Turn an arbitrary string into a safe, lowercase table identifier
pub fn sanitize_identifier(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let replaced = INVALID_CHARS.replace_all(&lowered, "_");
    let mut sanitized = REPEATED_UNDERSCORES.replace_all(&replaced, "_").into_owned();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '_') {
        return DEFAULT_TABLE_NAME.to_string();
    }
    if sanitized.starts_with(|c: char| c.is_ascii_digit()) {
        sanitized.insert(0, '_');
    }
    if is_reserved(&sanitized) {
        sanitized.push_str("_t");
    }
    truncate(&sanitized, MAX_IDENTIFIER_LENGTH).to_string()
}

/// Propose a name for `name` that is not in `taken`
///
/// Tries the sanitized name first, then `name_1`, `name_2`, ... with the base
/// shortened so the suffixed name still fits the identifier limit.
pub fn propose_valid_table_name(name: &str, taken: &HashSet<String>) -> ImportResult<String> {
    let base = sanitize_identifier(name);
    if !taken.contains(&base) {
        return Ok(base);
    }

    for suffix in 1..=MAX_NAME_SUFFIX {
        let suffix = format!("_{}", suffix);
        let stem = truncate(&base, MAX_IDENTIFIER_LENGTH - suffix.len());
        let candidate = format!("{}{}", stem, suffix);
        if !taken.contains(&candidate) {
            return Ok(candidate);
        }
    }

    Err(ImportError::NameUnavailable(base))
}

/// Cut `name` to at most `max` bytes without splitting a character
pub(crate) fn truncate(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("Bike Routes (2024)"), "bike_routes_2024_");
        assert_eq!(sanitize_identifier("  Ünïcode--name "), "_n_code_name");
        assert_eq!(sanitize_identifier("2024_routes"), "_2024_routes");
        assert_eq!(sanitize_identifier("???"), DEFAULT_TABLE_NAME);
        assert_eq!(sanitize_identifier(""), DEFAULT_TABLE_NAME);
        assert_eq!(sanitize_identifier("Select"), "select_t");
        assert_eq!(sanitize_identifier("oid"), "oid_t");
    }

    #[test]
    fn test_sanitize_truncates() {
        let long = "a".repeat(100);
        assert_eq!(sanitize_identifier(&long).len(), MAX_IDENTIFIER_LENGTH);
    }

    #[test]
    fn test_propose_free_name() {
        assert_eq!(
            propose_valid_table_name("routes", &taken(&["parks"])).unwrap(),
            "routes"
        );
    }

    #[test]
    fn test_propose_suffixes_on_collision() {
        assert_eq!(
            propose_valid_table_name("routes", &taken(&["routes"])).unwrap(),
            "routes_1"
        );
        assert_eq!(
            propose_valid_table_name("Routes", &taken(&["routes", "routes_1"])).unwrap(),
            "routes_2"
        );
    }

    #[test]
    fn test_propose_keeps_suffix_within_limit() {
        let long = "b".repeat(63);
        let proposed = propose_valid_table_name(&long, &taken(&[long.as_str()])).unwrap();
        assert_eq!(proposed.len(), MAX_IDENTIFIER_LENGTH);
        assert!(proposed.ends_with("_1"));
    }

    #[test]
    fn test_propose_gives_up() {
        let mut names = taken(&["routes"]);
        for i in 1..=MAX_NAME_SUFFIX {
            names.insert(format!("routes_{}", i));
        }
        assert!(matches!(
            propose_valid_table_name("routes", &names),
            Err(ImportError::NameUnavailable(_))
        ));
    }
}
