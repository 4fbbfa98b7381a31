//! # llmskit-core
//!
//! Core engine for programmatically consuming `llms.txt` files — the small
//! curated Markdown manifests sites publish at `/llms.txt` to advertise
//! AI-readable documentation.
//!
//! The crate covers the full consumption pipeline: discover whether a
//! domain publishes a manifest, retrieve and parse it, validate its
//! structure, cache it, and assemble a single LLM-ready context string from
//! the documents it links.
//!
//! ## Architecture
//!
//! Five components share one data model and one HTTP client:
//!
//! - **Parser** ([`LlmsParser`]): raw bytes to a structured [`Document`]
//!   plus diagnostics; never fails on input.
//! - **Fetcher** ([`Fetcher`]): retrieves `https://{domain}/llms.txt` and
//!   classifies every outcome into a [`FetchStatus`], with WAF
//!   fingerprinting, retries, and response-size bounds.
//! - **Validator** ([`Validator`]): an extensible rule set aggregated into
//!   a [`ValidationReport`].
//! - **Cache** ([`DocumentCache`]): domain-keyed, TTL-bounded, LRU-evicted,
//!   stale-while-revalidate reads, optional persistent [`CacheStore`].
//! - **Context generator** ([`ContextGenerator`]): linked-content
//!   retrieval, cleaning, and token-budgeted packing into one string.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use llmskit_core::{ContextGenerator, ContextOptions, FetchStatus, Fetcher};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> llmskit_core::Result<()> {
//! let fetcher = Arc::new(Fetcher::new()?);
//! let cancel = CancellationToken::new();
//!
//! let result = fetcher.fetch("example.com", &cancel).await?;
//! assert_eq!(result.status, FetchStatus::Success);
//! if let Some(document) = result.document {
//!     let generator = ContextGenerator::new(Arc::clone(&fetcher));
//!     let context = generator
//!         .generate(&document, &ContextOptions::new(), &cancel)
//!         .await?;
//!     println!("{} (~{} tokens)", context.content.len(), context.approximate_token_count);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Expected operational outcomes — a 404, a WAF block, a rate limit, a
//! malformed document, a dead link — are values inside the structured
//! results, never `Err`. [`Error`] is reserved for programmer errors,
//! storage/serialization failures, and cancellation.
//!
//! ## Cancellation
//!
//! Every async operation takes a `CancellationToken` and honors it at I/O
//! boundaries; cancellation surfaces as [`Error::Cancelled`] and never
//! leaves partial cache state.

/// Domain-keyed document cache with TTL, LRU, and stale-while-revalidate
pub mod cache;
/// Error types and result alias
pub mod error;
/// Infrastructure-aware llms.txt fetching and outcome classification
pub mod fetcher;
/// LLM-ready context assembly with token budgeting
pub mod generator;
/// Line-oriented llms.txt parser
pub mod parser;
/// Persistent backing stores for the cache
pub mod store;
/// Core document data model
pub mod types;
/// Rule-based document validation
pub mod validator;

// Re-export commonly used types
pub use cache::{CacheConfig, CacheEntry, DocumentCache, FetchSummary};
pub use error::{Error, Result};
pub use fetcher::{FetchResult, FetchStatus, Fetcher, FetcherConfig, HeadProbe};
pub use generator::{
    ContextGenerator, ContextOptions, ContextResult, FetchFailure, TRUNCATION_MARKER,
    TokenEstimator,
};
pub use parser::{DEFAULT_MAX_INPUT_BYTES, LlmsParser};
pub use store::{CacheStore, FileStore, StoredEntry};
pub use types::{
    Diagnostic, DiagnosticCode, DiagnosticSeverity, Document, Entry, Section,
};
pub use validator::{
    Rule, RuleCheck, ValidationIssue, ValidationOptions, ValidationReport, Validator,
};
