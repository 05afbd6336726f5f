//! Citations: the caller-facing projection of a retrieved passage.

use serde::{Deserialize, Serialize};

use crate::search::RetrievalCandidate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub file_path: String,
    pub symbol_name: String,
    pub start_line: u32,
    pub end_line: u32,
    pub revision: String,
    /// `path:start-end@revision`, plus ` (symbol)` when the passage names one
    pub reference: String,
}

pub fn to_citation(candidate: &RetrievalCandidate) -> Citation {
    let m = &candidate.passage.metadata;
    let mut reference = format!("{}:{}-{}@{}", m.file_path, m.start_line, m.end_line, m.revision);
    if !m.symbol_name.is_empty() {
        reference.push_str(&format!(" ({})", m.symbol_name));
    }
    Citation {
        file_path: m.file_path.clone(),
        symbol_name: m.symbol_name.clone(),
        start_line: m.start_line,
        end_line: m.end_line,
        revision: m.revision.clone(),
        reference,
    }
}

/// Citations in candidate order.
pub fn get_citations(candidates: &[RetrievalCandidate]) -> Vec<Citation> {
    candidates.iter().map(to_citation).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::tests_support::candidate;

    #[test]
    fn test_reference_with_symbol() {
        let mut c = candidate("src/auth/token.rs", 12, 0.9);
        c.passage.metadata.symbol_name = "validate_token".to_string();
        let citation = to_citation(&c);
        assert_eq!(citation.reference, "src/auth/token.rs:12-21@r1 (validate_token)");
        assert_eq!(citation.start_line, 12);
        assert_eq!(citation.end_line, 21);
    }

    #[test]
    fn test_reference_without_symbol() {
        let citation = to_citation(&candidate("docs/runbook.md", 1, 0.4));
        assert_eq!(citation.reference, "docs/runbook.md:1-10@r1");
        assert!(citation.symbol_name.is_empty());
    }

    #[test]
    fn test_get_citations_preserves_order() {
        let list = vec![candidate("b.md", 1, 0.9), candidate("a.md", 1, 0.8)];
        let paths: Vec<_> = get_citations(&list).into_iter().map(|c| c.file_path).collect();
        assert_eq!(paths, vec!["b.md", "a.md"]);
        assert!(get_citations(&[]).is_empty());
    }
}
