// Replace Entries
// Captured step outputs keyed by placeholder token, substituted literally
// into later steps' command tokens and environment values. One store lives
// per exec-spec list and is threaded through nested compute recursion.

use crate::execution::matrix::MatrixEntry;
use std::collections::HashMap;

/// The token a matrix dimension value is seeded under
pub fn matrix_token(dimension: &str) -> String {
    format!("${{matrix.{}}}", dimension)
}

/// The token a named capture is recorded under
pub fn capture_token(name: &str) -> String {
    format!("${{capture.{}}}", name)
}

/// A captured value and the error (if any) of the step that produced it
#[derive(Debug, Clone, Default)]
pub struct ReplaceEntry {
    pub data: Vec<u8>,
    pub error: Option<String>,
}

/// Token -> captured output map, scoped to one exec-spec list
#[derive(Debug, Clone, Default)]
pub struct ReplaceStore {
    entries: HashMap<String, ReplaceEntry>,
}

impl ReplaceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `${matrix.<dim>}` tokens from a matrix entry
    pub fn seeded(entry: &MatrixEntry) -> Self {
        let mut store = Self::new();
        for (dimension, value) in entry.iter() {
            store.record(matrix_token(dimension), value.as_bytes().to_vec(), None);
        }
        store
    }

    /// Record a capture. Overwrites any previous entry for the token.
    pub fn record(&mut self, token: String, data: Vec<u8>, error: Option<String>) {
        self.entries.insert(token, ReplaceEntry { data, error });
    }

    /// Record only an error for a token, keeping any earlier data
    pub fn record_error(&mut self, token: &str, error: String) {
        self.entries.entry(token.to_string()).or_default().error = Some(error);
    }

    pub fn get(&self, token: &str) -> Option<&ReplaceEntry> {
        self.entries.get(token)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Substitute every known token into `text`.
    ///
    /// Single pass, longest token first at each position, so replacement
    /// values are never re-scanned for further tokens.
    pub fn apply(&self, text: &str) -> String {
        if self.entries.is_empty() {
            return text.to_string();
        }

        let mut tokens: Vec<(&str, &ReplaceEntry)> = self
            .entries
            .iter()
            .map(|(token, entry)| (token.as_str(), entry))
            .collect();
        tokens.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then(a.0.cmp(b.0)));

        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        'outer: while !rest.is_empty() {
            for (token, entry) in &tokens {
                if rest.starts_with(token) {
                    out.push_str(&String::from_utf8_lossy(&entry.data));
                    rest = &rest[token.len()..];
                    continue 'outer;
                }
            }
            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                out.push(c);
            }
            rest = chars.as_str();
        }
        out
    }

    /// Substitute into a list of argv tokens
    pub fn apply_argv(&self, argv: &[String]) -> Vec<String> {
        argv.iter().map(|token| self.apply(token)).collect()
    }

    /// Substitute into env name/value pairs
    pub fn apply_env(&self, pairs: &[(String, String)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(name, value)| (self.apply(name), self.apply(value)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_substitution() {
        let mut store = ReplaceStore::new();
        store.record(
            capture_token("version"),
            b"1.4.2".to_vec(),
            None,
        );

        let out = store.apply("release v${capture.version} (${capture.other})");
        assert_eq!(out, "release v1.4.2 (${capture.other})");
    }

    #[test]
    fn test_unrelated_text_untouched() {
        let mut store = ReplaceStore::new();
        store.record(capture_token("a"), b"x".to_vec(), None);

        assert_eq!(store.apply("no tokens here"), "no tokens here");
    }

    #[test]
    fn test_single_pass_does_not_rescan_replacements() {
        let mut store = ReplaceStore::new();
        store.record("A".to_string(), b"B".to_vec(), None);
        store.record("B".to_string(), b"C".to_vec(), None);

        // "A" becomes "B" but the produced "B" is not replaced again.
        assert_eq!(store.apply("A B"), "B C");
    }

    #[test]
    fn test_longest_token_wins() {
        let mut store = ReplaceStore::new();
        store.record("${v}".to_string(), b"short".to_vec(), None);
        store.record("${v}x".to_string(), b"long".to_vec(), None);

        assert_eq!(store.apply("${v}x"), "long");
    }

    #[test]
    fn test_seeded_matrix_tokens() {
        let mut entry = MatrixEntry::new();
        entry.set("os", "linux");
        entry.set("arch", "amd64");

        let store = ReplaceStore::seeded(&entry);
        assert_eq!(
            store.apply("build-${matrix.os}-${matrix.arch}"),
            "build-linux-amd64"
        );
    }

    #[test]
    fn test_apply_env_substitutes_names_and_values() {
        let mut store = ReplaceStore::new();
        store.record(capture_token("target"), b"prod".to_vec(), None);

        let pairs = vec![(
            "DEPLOY_ENV".to_string(),
            "${capture.target}".to_string(),
        )];
        let applied = store.apply_env(&pairs);
        assert_eq!(applied[0].1, "prod");
    }

    #[test]
    fn test_record_error_keeps_data() {
        let mut store = ReplaceStore::new();
        store.record("t".to_string(), b"partial".to_vec(), None);
        store.record_error("t", "exit status 3".to_string());

        let entry = store.get("t").unwrap();
        assert_eq!(entry.data, b"partial");
        assert_eq!(entry.error.as_deref(), Some("exit status 3"));
    }
}
