pub mod citation;
pub mod config;
pub mod embedding;
pub mod errors;
pub mod lexical;
pub mod logging;
pub mod passage;
pub mod rerank;
pub mod routing;
pub mod search;
pub mod store;

pub use citation::{get_citations, to_citation, Citation};
pub use errors::SecragError;
pub use search::{HybridSearchEngine, Query, RetrievalCandidate, SearchReport};
