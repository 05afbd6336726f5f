//! Query routing: map free text to a retrieval policy without calling any model.
//!
//! Templates are checked in a fixed order and the first one with a matching keyword
//! wins. Single-word keywords must equal a whole query token; multi-word phrases are
//! matched against the lowercased query text.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Retrieval methods a policy can enable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMethod {
    Vector,
    Lexical,
}

impl fmt::Display for SearchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMethod::Vector => write!(f, "vector"),
            SearchMethod::Lexical => write!(f, "lexical"),
        }
    }
}

/// Which template produced a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Code,
    Docs,
    ConfigDeploy,
    Hybrid,
}

/// What to search and how, for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub kind: PolicyKind,
    /// Collection names in search order, without duplicates
    pub collections: Vec<String>,
    pub methods: BTreeSet<SearchMethod>,
    pub apply_structural_bias: bool,
    pub prefer_symbol_hits: bool,
}

impl Policy {
    pub fn uses(&self, method: SearchMethod) -> bool {
        self.methods.contains(&method)
    }

    fn from_template(kind: PolicyKind) -> Self {
        const BOTH: &[SearchMethod] = &[SearchMethod::Vector, SearchMethod::Lexical];
        match kind {
            PolicyKind::Code => Self::build(kind, &["code"], BOTH, true, true),
            PolicyKind::Docs => Self::build(kind, &["docs", "config"], &[SearchMethod::Vector], false, false),
            PolicyKind::ConfigDeploy => Self::build(kind, &["config", "ci", "docs"], BOTH, false, false),
            PolicyKind::Hybrid => Self::build(kind, &["code", "docs", "config"], BOTH, false, false),
        }
    }

    fn build(
        kind: PolicyKind,
        collections: &[&str],
        methods: &[SearchMethod],
        apply_structural_bias: bool,
        prefer_symbol_hits: bool,
    ) -> Self {
        Policy {
            kind,
            collections: collections.iter().map(|c| c.to_string()).collect(),
            methods: methods.iter().copied().collect(),
            apply_structural_bias,
            prefer_symbol_hits,
        }
    }
}

/// Keyword templates in priority order.
const TEMPLATES: &[(PolicyKind, &[&str])] = &[
    (
        PolicyKind::Code,
        &[
            "function", "method", "class", "struct", "enum", "trait", "interface", "symbol",
            "definition", "defined", "implementation", "implements", "signature", "api",
            "endpoint", "import", "call", "calls", "caller", "callers", "variable", "constant",
            "where is", "which file",
        ],
    ),
    (
        PolicyKind::Docs,
        &[
            "how to", "how do", "how does", "explain", "overview", "architecture", "design",
            "guide", "tutorial", "documentation", "docs", "readme", "why", "concept",
            "what is",
        ],
    ),
    (
        PolicyKind::ConfigDeploy,
        &[
            "deploy", "deployment", "deploying", "environment", "env", "pipeline", "ci",
            "cd", "helm", "kubernetes", "k8s", "terraform", "docker", "dockerfile",
            "config", "configuration", "settings", "secret", "secrets", "workflow", "release",
        ],
    ),
];

fn tokens(lowered: &str) -> BTreeSet<&str> {
    lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '_' || c == '-'))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Classify a query into exactly one policy. Unmatched input gets the hybrid default.
pub fn route(query: &str) -> Policy {
    let lowered = query.to_lowercase();
    let words = tokens(&lowered);

    for &(kind, keywords) in TEMPLATES {
        let hit = keywords.iter().any(|kw| {
            if kw.contains(' ') {
                lowered.contains(kw)
            } else {
                words.contains(kw)
            }
        });
        if hit {
            return Policy::from_template(kind);
        }
    }

    Policy::from_template(PolicyKind::Hybrid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_template() {
        let policy = route("Which function validates the session token?");
        assert_eq!(policy.kind, PolicyKind::Code);
        assert_eq!(policy.collections, vec!["code"]);
        assert!(policy.uses(SearchMethod::Vector));
        assert!(policy.uses(SearchMethod::Lexical));
        assert!(policy.apply_structural_bias);
        assert!(policy.prefer_symbol_hits);
    }

    #[test]
    fn test_docs_template() {
        let policy = route("explain the alert triage architecture");
        assert_eq!(policy.kind, PolicyKind::Docs);
        assert_eq!(policy.collections, vec!["docs", "config"]);
        assert!(policy.uses(SearchMethod::Vector));
        assert!(!policy.uses(SearchMethod::Lexical));
        assert!(!policy.apply_structural_bias);
    }

    #[test]
    fn test_config_template() {
        let policy = route("staging environment variables for the collector");
        assert_eq!(policy.kind, PolicyKind::ConfigDeploy);
        assert_eq!(policy.collections, vec!["config", "ci", "docs"]);
        assert_eq!(policy.methods.len(), 2);
    }

    #[test]
    fn test_first_template_wins() {
        // Matches both code ("function") and deploy ("deploy") vocabulary
        let policy = route("function that triggers the deploy");
        assert_eq!(policy.kind, PolicyKind::Code);
    }

    #[test]
    fn test_whole_word_matching() {
        // "classification" contains "class", "recall" contains "call"
        let policy = route("alert classification recall numbers");
        assert_eq!(policy.kind, PolicyKind::Hybrid);
    }

    #[test]
    fn test_unmatched_queries_fall_back_to_hybrid() {
        for query in ["qwzx blorp", "???", "failed logins from 10.0.0.7", "   "] {
            let policy = route(query);
            assert_eq!(policy.kind, PolicyKind::Hybrid, "query {:?}", query);
            assert_eq!(policy.collections, vec!["code", "docs", "config"]);
            assert!(!policy.apply_structural_bias);
            assert!(!policy.prefer_symbol_hits);
        }
    }
}
