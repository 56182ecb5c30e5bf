//! Cache key derivation
//!
//! Query keys are `{namespace}:{fingerprint}` where the fingerprint is the
//! blake3 hex digest of the normalized query text.

use std::time::SystemTime;

/// Key namespaces managed by Lexi
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    LawsQuery,
    ProceduresQuery,
    ExtractedText,
}

impl Namespace {
    /// All managed namespaces, used by eviction and stats
    pub const ALL: [Namespace; 3] = [
        Namespace::LawsQuery,
        Namespace::ProceduresQuery,
        Namespace::ExtractedText,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Namespace::LawsQuery => "laws_query",
            Namespace::ProceduresQuery => "procedures_query",
            Namespace::ExtractedText => "extracted_text",
        }
    }

    /// Full key for a fingerprint in this namespace
    pub fn key(&self, fingerprint: &str) -> String {
        format!("{}:{}", self.prefix(), fingerprint)
    }

    /// Key for a free-text query in this namespace
    pub fn query_key(&self, query: &str) -> String {
        self.key(&fingerprint(query))
    }
}

/// Trim, lowercase and collapse internal whitespace
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// blake3 hex of the normalized query
pub fn fingerprint(query: &str) -> String {
    blake3::hash(normalize_query(query).as_bytes())
        .to_hex()
        .to_string()
}

/// blake3 hex over file bytes plus modification time
pub fn file_fingerprint(contents: &[u8], modified: Option<SystemTime>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(contents);
    if let Some(modified) = modified {
        let nanos = modified
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        hasher.update(&nanos.to_le_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;
    use std::time::Duration;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_query("  What is   the\tBail Act?\n"),
            "what is the bail act?"
        );
    }

    #[test]
    fn test_equivalent_queries_share_key() {
        assert_eq!(
            Namespace::LawsQuery.query_key("Bail  Act 1977"),
            Namespace::LawsQuery.query_key(" bail act 1977 ")
        );
        assert_ne!(
            Namespace::LawsQuery.query_key("bail act"),
            Namespace::ProceduresQuery.query_key("bail act")
        );
    }

    #[test]
    fn test_key_format() {
        let key = Namespace::ProceduresQuery.query_key("appeal");
        assert!(key.starts_with("procedures_query:"));
        assert_eq!(key.len(), "procedures_query:".len() + 64);
    }

    #[test]
    fn test_file_fingerprint_depends_on_mtime() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let t1 = t0 + Duration::from_secs(1);
        assert_ne!(
            file_fingerprint(b"same bytes", Some(t0)),
            file_fingerprint(b"same bytes", Some(t1))
        );
        assert_eq!(
            file_fingerprint(b"same bytes", Some(t0)),
            file_fingerprint(b"same bytes", Some(t0))
        );
    }

    #[quickcheck]
    fn prop_normalize_idempotent(input: String) -> bool {
        let once = normalize_query(&input);
        normalize_query(&once) == once
    }

    #[quickcheck]
    fn prop_fingerprint_ignores_outer_whitespace(input: String) -> bool {
        fingerprint(&input) == fingerprint(&format!("  {}\n", input))
    }
}
