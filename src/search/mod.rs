//! Search layer facade.
//!
//! - **[`query`]**: filter criteria, query-string parsing/serialization, `id:` extraction.
//! - **[`engine`]**: pure evaluation of a query against the catalog, with facet counts.
//! - **[`worker`]**: off-thread evaluation behind sequence-numbered envelopes.

pub mod engine;
pub mod query;
pub mod worker;

pub use engine::{ResultSnapshot, evaluate};
pub use query::{Query, QueryDelta, QueryKey, ResolvedQuery};
pub use worker::{Envelope, InlineBackend, SearchBackend, SearchWorker, WorkerError};
