// Matrix Expansion
// Expands dimension lists plus include/exclude rules into concrete entries.

use crate::config::models::{DimensionMap, MatrixConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One concrete dimension combination, e.g. `arch=amd64 os=linux`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatrixEntry {
    values: BTreeMap<String, String>,
}

impl MatrixEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
        self.values.insert(dimension.into(), value.into());
    }

    pub fn get(&self, dimension: &str) -> Option<&str> {
        self.values.get(dimension).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Filter-match: every key of `filter` must be present with an equal
    /// value. Extra keys in `self` are ignored. Full equality is `==`.
    pub fn matches(&self, filter: &MatrixEntry) -> bool {
        filter
            .values
            .iter()
            .all(|(key, value)| self.values.get(key) == Some(value))
    }

    /// Whether any entry of an expanded rule set matches this entry
    pub fn matches_any(&self, filters: &[MatrixEntry]) -> bool {
        filters.iter().any(|filter| self.matches(filter))
    }
}

impl fmt::Display for MatrixEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (key, value) in &self.values {
            if !first {
                f.write_str(" ")?;
            }
            write!(f, "{}={}", key, value)?;
            first = false;
        }
        Ok(())
    }
}

/// An external execution filter: a set of partial-assignment rules.
///
/// Comes from the user's `--matrix` flags or is inherited from a referencing
/// task. Empty means "keep everything".
#[derive(Debug, Clone, Default)]
pub struct MatrixFilter {
    rules: Vec<DimensionMap>,
}

impl MatrixFilter {
    pub fn new(rules: Vec<DimensionMap>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parse a rule of the form `os=linux,arch=amd64` (values may be
    /// `|`-separated alternatives: `os=linux|darwin`).
    pub fn parse_rule(text: &str) -> Result<DimensionMap, String> {
        let mut dims = Vec::new();
        for pair in text.split(',') {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| format!("expected dimension=value, got '{}'", pair))?;
            let key = key.trim();
            if key.is_empty() {
                return Err(format!("empty dimension name in '{}'", pair));
            }
            let values: Vec<String> = value.split('|').map(|v| v.trim().to_string()).collect();
            dims.push((key.to_string(), values));
        }
        Ok(DimensionMap(dims))
    }

    /// Expand all rules into concrete filter entries
    fn expand(&self) -> Vec<MatrixEntry> {
        self.rules.iter().flat_map(expand_rule).collect()
    }
}

/// Matrix expander for task configurations
pub struct MatrixExpander;

impl MatrixExpander {
    /// Expand a matrix configuration into an ordered entry list.
    ///
    /// Order is row-major over the declared dimension order (`os`, `arch`,
    /// then custom dimensions in declaration order), with the last-declared
    /// dimension varying fastest. Excludes are applied to the product,
    /// then the external filter, then includes are appended.
    pub fn expand(config: &MatrixConfig, filter: &MatrixFilter) -> Vec<MatrixEntry> {
        let dimensions = Self::dimension_set(config);

        let mut entries = product(&dimensions);

        let excluded: Vec<MatrixEntry> = config.exclude.iter().flat_map(expand_rule).collect();
        if !excluded.is_empty() {
            entries.retain(|entry| !entry.matches_any(&excluded));
        }

        let filter_entries = filter.expand();
        if !filter_entries.is_empty() {
            entries.retain(|entry| entry.matches_any(&filter_entries));
        }

        for rule in &config.include {
            for entry in expand_rule(rule) {
                if !filter_entries.is_empty() && !entry.matches_any(&filter_entries) {
                    continue;
                }
                if !entries.contains(&entry) {
                    entries.push(entry);
                }
            }
        }

        entries
    }

    /// The declared dimensions, with host defaults for empty os/arch lists
    fn dimension_set(config: &MatrixConfig) -> Vec<(String, Vec<String>)> {
        let os = if config.os.is_empty() {
            vec![std::env::consts::OS.to_string()]
        } else {
            config.os.clone()
        };
        let arch = if config.arch.is_empty() {
            vec![std::env::consts::ARCH.to_string()]
        } else {
            config.arch.clone()
        };

        let mut dimensions = vec![("os".to_string(), os), ("arch".to_string(), arch)];
        for (name, values) in config.dimensions.iter() {
            dimensions.push((name.clone(), values.clone()));
        }
        dimensions
    }
}

/// Row-major cartesian product: the last dimension varies fastest
fn product(dimensions: &[(String, Vec<String>)]) -> Vec<MatrixEntry> {
    let mut entries = vec![MatrixEntry::new()];
    for (name, values) in dimensions {
        if values.is_empty() {
            continue;
        }
        let mut next = Vec::with_capacity(entries.len() * values.len());
        for entry in &entries {
            for value in values {
                let mut expanded = entry.clone();
                expanded.set(name.clone(), value.clone());
                next.push(expanded);
            }
        }
        entries = next;
    }
    entries
}

/// Expand a partial-assignment rule into concrete entries
fn expand_rule(rule: &DimensionMap) -> Vec<MatrixEntry> {
    if rule.is_empty() {
        return Vec::new();
    }
    product(&rule.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims(pairs: &[(&str, &[&str])]) -> DimensionMap {
        DimensionMap(
            pairs
                .iter()
                .map(|(name, values)| {
                    (
                        name.to_string(),
                        values.iter().map(|v| v.to_string()).collect(),
                    )
                })
                .collect(),
        )
    }

    fn entry(pairs: &[(&str, &str)]) -> MatrixEntry {
        let mut entry = MatrixEntry::new();
        for (key, value) in pairs {
            entry.set(*key, *value);
        }
        entry
    }

    fn matrix(os: &[&str], arch: &[&str]) -> MatrixConfig {
        MatrixConfig {
            os: os.iter().map(|s| s.to_string()).collect(),
            arch: arch.iter().map(|s| s.to_string()).collect(),
            ..MatrixConfig::default()
        }
    }

    #[test]
    fn test_product_count_and_order() {
        let mut config = matrix(&["linux", "windows"], &["amd64", "arm64"]);
        config.dimensions = dims(&[("mode", &["debug", "release"])]);

        let entries = MatrixExpander::expand(&config, &MatrixFilter::default());

        assert_eq!(entries.len(), 8);
        // Row-major: os slowest, mode fastest.
        assert_eq!(
            entries[0],
            entry(&[("os", "linux"), ("arch", "amd64"), ("mode", "debug")])
        );
        assert_eq!(
            entries[1],
            entry(&[("os", "linux"), ("arch", "amd64"), ("mode", "release")])
        );
        assert_eq!(
            entries[2],
            entry(&[("os", "linux"), ("arch", "arm64"), ("mode", "debug")])
        );
        assert_eq!(
            entries[7],
            entry(&[("os", "windows"), ("arch", "arm64"), ("mode", "release")])
        );

        // All combinations are distinct.
        for (i, a) in entries.iter().enumerate() {
            for b in entries.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_two_entry_scenario() {
        let config = matrix(&["linux", "darwin"], &["amd64"]);
        let entries = MatrixExpander::expand(&config, &MatrixFilter::default());

        assert_eq!(
            entries,
            vec![
                entry(&[("os", "linux"), ("arch", "amd64")]),
                entry(&[("os", "darwin"), ("arch", "amd64")]),
            ]
        );
    }

    #[test]
    fn test_empty_config_uses_host() {
        let entries = MatrixExpander::expand(&MatrixConfig::default(), &MatrixFilter::default());

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].get("os"), Some(std::env::consts::OS));
        assert_eq!(entries[0].get("arch"), Some(std::env::consts::ARCH));
    }

    #[test]
    fn test_exclude_removes_matching_entries() {
        let mut config = matrix(&["linux", "windows"], &["amd64", "arm64"]);
        config.exclude = vec![dims(&[("os", &["windows"]), ("arch", &["arm64"])])];

        let entries = MatrixExpander::expand(&config, &MatrixFilter::default());

        assert_eq!(entries.len(), 3);
        let removed = entry(&[("os", "windows"), ("arch", "arm64")]);
        assert!(entries.iter().all(|e| *e != removed));
    }

    #[test]
    fn test_exclude_with_multiple_values_expands() {
        let mut config = matrix(&["linux"], &["amd64", "arm64"]);
        config.exclude = vec![dims(&[("os", &["linux"]), ("arch", &["amd64", "arm64"])])];

        let entries = MatrixExpander::expand(&config, &MatrixFilter::default());
        assert!(entries.is_empty());
    }

    #[test]
    fn test_exclude_soundness() {
        let mut config = matrix(&["linux", "windows", "darwin"], &["amd64", "arm64"]);
        config.exclude = vec![dims(&[("os", &["windows"])]), dims(&[("arch", &["arm64"])])];

        let entries = MatrixExpander::expand(&config, &MatrixFilter::default());

        let excluded: Vec<MatrixEntry> = config.exclude.iter().flat_map(expand_rule).collect();
        for entry in &entries {
            assert!(!entry.matches_any(&excluded));
        }
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_external_filter_retains_matches() {
        let config = matrix(&["linux", "darwin", "windows"], &["amd64", "arm64"]);
        let filter = MatrixFilter::new(vec![dims(&[("os", &["linux"])])]);

        let entries = MatrixExpander::expand(&config, &filter);

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.get("os") == Some("linux")));
    }

    #[test]
    fn test_include_appends_without_duplicates() {
        let mut config = matrix(&["linux"], &["amd64"]);
        config.include = vec![
            // Already present by equality: not appended again.
            dims(&[("os", &["linux"]), ("arch", &["amd64"])]),
            dims(&[("os", &["linux"]), ("arch", &["arm64"])]),
        ];

        let entries = MatrixExpander::expand(&config, &MatrixFilter::default());

        assert_eq!(
            entries,
            vec![
                entry(&[("os", "linux"), ("arch", "amd64")]),
                entry(&[("os", "linux"), ("arch", "arm64")]),
            ]
        );
    }

    #[test]
    fn test_include_respects_external_filter() {
        let mut config = matrix(&["linux"], &["amd64"]);
        config.include = vec![
            dims(&[("os", &["darwin"]), ("arch", &["arm64"])]),
            dims(&[("os", &["linux"]), ("arch", &["arm64"])]),
        ];
        let filter = MatrixFilter::new(vec![dims(&[("os", &["linux"])])]);

        let entries = MatrixExpander::expand(&config, &filter);

        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.get("os") == Some("linux")));
    }

    #[test]
    fn test_include_survives_total_exclusion() {
        let mut config = matrix(&["linux"], &["amd64"]);
        config.exclude = vec![dims(&[("os", &["linux"])])];
        config.include = vec![dims(&[("os", &["freebsd"]), ("arch", &["amd64"])])];

        let entries = MatrixExpander::expand(&config, &MatrixFilter::default());

        assert_eq!(entries, vec![entry(&[("os", "freebsd"), ("arch", "amd64")])]);
    }

    #[test]
    fn test_expand_is_idempotent() {
        let mut config = matrix(&["linux", "windows"], &["amd64", "arm64"]);
        config.exclude = vec![dims(&[("os", &["windows"]), ("arch", &["arm64"])])];
        config.include = vec![dims(&[("os", &["darwin"]), ("arch", &["arm64"])])];
        let filter = MatrixFilter::new(vec![dims(&[("arch", &["arm64"])])]);

        let first = MatrixExpander::expand(&config, &filter);
        let second = MatrixExpander::expand(&config, &filter);
        assert_eq!(first, second);
    }

    #[test]
    fn test_filter_match_ignores_extra_keys() {
        let full = entry(&[("os", "linux"), ("arch", "amd64"), ("mode", "debug")]);
        let partial = entry(&[("os", "linux")]);

        assert!(full.matches(&partial));
        assert!(!partial.matches(&full));
        assert_ne!(full, partial);
    }

    #[test]
    fn test_parse_rule() {
        let rule = MatrixFilter::parse_rule("os=linux|darwin, arch=amd64").unwrap();
        assert_eq!(rule.0.len(), 2);
        assert_eq!(rule.0[0].1, vec!["linux", "darwin"]);
        assert_eq!(rule.0[1].0, "arch");

        assert!(MatrixFilter::parse_rule("os").is_err());
        assert!(MatrixFilter::parse_rule("=linux").is_err());
    }

    #[test]
    fn test_entry_display_is_stable() {
        let e = entry(&[("os", "linux"), ("arch", "amd64")]);
        assert_eq!(e.to_string(), "arch=amd64 os=linux");
    }
}
