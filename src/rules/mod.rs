//! Rule compiler: raw signature strings to reusable matchers
//!
//! Every dependency and code pattern of every loaded signature set becomes
//! a case-insensitive regex with `.*<pattern>` semantics, anchored at the
//! start of the subject, so it hits anywhere inside a qualified class name
//! or dependency coordinate. Patterns the regex engine rejects are skipped
//! with a warning instead of failing the run.

use crate::signatures::{SignatureSet, TrackerSignature};
use aho_corasick::AhoCorasick;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::BTreeMap;

/// Free-software dependencies whose coordinates contain tracker patterns
pub const DEPENDENCY_ALLOWLIST: &[&str] = &[
    "firebase-jobdispatcher",     // Apache-2.0
    "com.firebaseui",             // Apache-2.0
    "geofire-android",            // MIT
    "com.yandex.android:authsdk", // Apache-2.0
    "com.hypertrack:hyperlog",    // MIT
];

static ALLOWLIST: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::new(DEPENDENCY_ALLOWLIST).expect("Failed to build dependency allow-list matcher")
});

/// Tracker signatures shorter than this are too generic to report
const MIN_TRACKER_SIGNATURE_LEN: usize = 4;

/// Compiled matchers keyed by their raw pattern. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct CompiledRuleSet {
    pub dependency_matchers: BTreeMap<String, Regex>,
    pub code_matchers: BTreeMap<String, Regex>,
}

impl CompiledRuleSet {
    /// Compile the union of all signature sets
    pub fn compile(sets: &[SignatureSet]) -> Self {
        let mut compiled = Self::default();

        for set in sets {
            for (rule_name, rule) in &set.signatures {
                for pattern in &rule.dependency_patterns {
                    insert_matcher(&mut compiled.dependency_matchers, rule_name, pattern);
                }
                for pattern in &rule.code_patterns {
                    insert_matcher(&mut compiled.code_matchers, rule_name, pattern);
                }
            }
        }

        tracing::debug!(
            "Compiled {} dependency and {} code matchers from {} signature sets",
            compiled.dependency_matchers.len(),
            compiled.code_matchers.len(),
            sets.len()
        );
        compiled
    }

    /// Dependency patterns matching `text`, unless it names an allow-listed library
    pub fn dependency_suspects(&self, text: &str) -> Vec<&str> {
        if is_allowlisted(text) {
            return Vec::new();
        }
        self.dependency_matchers
            .iter()
            .filter(|(_, re)| re.is_match(text))
            .map(|(pattern, _)| pattern.as_str())
            .collect()
    }

    /// Code patterns matching a discovered class name
    pub fn code_matches(&self, class_name: &str) -> Vec<&str> {
        self.code_matchers
            .iter()
            .filter(|(_, re)| re.is_match(class_name))
            .map(|(pattern, _)| pattern.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.dependency_matchers.is_empty() && self.code_matchers.is_empty()
    }
}

fn insert_matcher(table: &mut BTreeMap<String, Regex>, rule_name: &str, pattern: &str) {
    if table.contains_key(pattern) {
        return;
    }
    match compile_pattern(pattern) {
        Ok(re) => {
            table.insert(pattern.to_string(), re);
        }
        Err(e) => tracing::warn!("Skipping pattern '{}' of rule '{}': {}", pattern, rule_name, e),
    }
}

/// `.*<pattern>` matched from the start of the subject, ignoring case
pub fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!("^(?:.*{})", pattern))
        .case_insensitive(true)
        .build()
}

pub fn is_allowlisted(text: &str) -> bool {
    ALLOWLIST.is_match(text)
}

/// A tracker with its compiled code signature
#[derive(Debug, Clone)]
pub struct CompiledTracker {
    pub tracker: TrackerSignature,
    regex: Regex,
}

impl CompiledTracker {
    /// First class name the code signature is found in
    pub fn find_in<'a, I>(&self, class_names: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a String>,
    {
        class_names
            .into_iter()
            .find(|name| self.regex.is_match(name))
            .map(|name| name.as_str())
    }
}

/// Compile tracker code signatures; too-short or invalid ones are dropped
pub fn compile_trackers(trackers: &[TrackerSignature]) -> Vec<CompiledTracker> {
    trackers
        .iter()
        .filter(|t| t.code_signature.len() >= MIN_TRACKER_SIGNATURE_LEN)
        .filter_map(|t| match Regex::new(&t.code_signature) {
            Ok(regex) => Some(CompiledTracker {
                tracker: t.clone(),
                regex,
            }),
            Err(e) => {
                tracing::warn!("Skipping tracker '{}': {}", t.name, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signatures::{SignatureRule, CACHE_SCHEMA_VERSION};

    fn set(rules: &[(&str, &[&str], &[&str])]) -> SignatureSet {
        SignatureSet {
            name: "test".into(),
            version: CACHE_SCHEMA_VERSION,
            timestamp: "2024-01-01".into(),
            signatures: rules
                .iter()
                .map(|(name, deps, code)| {
                    (
                        name.to_string(),
                        SignatureRule {
                            dependency_patterns: deps.iter().map(|s| s.to_string()).collect(),
                            code_patterns: code.iter().map(|s| s.to_string()).collect(),
                        },
                    )
                })
                .collect(),
        }
    }

    #[test]
    fn test_match_anywhere_case_insensitive() {
        let rules = CompiledRuleSet::compile(&[set(&[("flurry", &["com.flurry"], &["com/flurry"])])]);
        assert_eq!(
            rules.dependency_suspects("    implementation 'COM.Flurry.android:analytics:1.0'"),
            vec!["com.flurry"]
        );
        assert_eq!(rules.code_matches("com/flurry/sdk/Agent"), vec!["com/flurry"]);
        assert!(rules.code_matches("org/example/Main").is_empty());
    }

    #[test]
    fn test_union_of_sets_and_empty_sets() {
        let rules = CompiledRuleSet::compile(&[
            set(&[("a", &["com.a"], &[])]),
            set(&[]),
            set(&[("b", &["com.b"], &["com/b"])]),
        ]);
        assert_eq!(rules.dependency_matchers.len(), 2);
        assert_eq!(rules.code_matchers.len(), 1);
        assert!(CompiledRuleSet::compile(&[set(&[])]).is_empty());
        assert!(CompiledRuleSet::compile(&[]).is_empty());
    }

    #[test]
    fn test_allowlisted_dependency_is_not_a_suspect() {
        let rules = CompiledRuleSet::compile(&[set(&[("firebase", &["firebase"], &[])])]);
        assert!(rules
            .dependency_suspects("implementation 'com.firebaseui:firebase-ui-auth:6.0.0'")
            .is_empty());
        assert_eq!(
            rules.dependency_suspects("implementation 'com.google.firebase:firebase-core:16.0.1'"),
            vec!["firebase"]
        );
    }

    #[test]
    fn test_invalid_pattern_is_skipped() {
        let rules = CompiledRuleSet::compile(&[set(&[("bad", &["com.gms(?!.oss)", "com.ok"], &[])])]);
        assert_eq!(rules.dependency_matchers.len(), 1);
        assert!(rules.dependency_matchers.contains_key("com.ok"));
    }

    #[test]
    fn test_alternation_stays_anchored() {
        // only the first branch gets the `.*` prefix
        let re = compile_pattern("com/a|com/b").unwrap();
        assert!(re.is_match("x/com/a/Y"));
        assert!(re.is_match("com/b/Y"));
        assert!(!re.is_match("x/com/b/Y"));
    }

    #[test]
    fn test_tracker_compilation_filters_short_signatures() {
        let trackers = vec![
            TrackerSignature {
                name: "Flurry".into(),
                code_signature: "com.flurry.".into(),
                network_signature: String::new(),
            },
            TrackerSignature {
                name: "Short".into(),
                code_signature: "a.b".into(),
                network_signature: String::new(),
            },
        ];
        let compiled = compile_trackers(&trackers);
        assert_eq!(compiled.len(), 1);

        let classes = vec!["org/x/Y".to_string(), "com/flurry/Agent".to_string()];
        assert_eq!(compiled[0].find_in(&classes), Some("com/flurry/Agent"));
    }
}
