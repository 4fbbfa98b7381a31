//! Core data structures for parsed llms.txt documents.
//!
//! This module defines the document model produced by the parser and
//! consumed read-only by every other component: [`Document`], [`Section`],
//! [`Entry`], and the [`Diagnostic`] records the parser attaches to explain
//! anything it had to tolerate or drop.
//!
//! ## Immutability
//!
//! Documents are values: once produced by the parser they are never
//! mutated, so they can be shared across tasks without synchronization.
//! The cache clones them into entries; the validator and context generator
//! borrow them.
//!
//! ## Serialization
//!
//! All types serialize to camelCase JSON, matching the persisted cache
//! payload format.

use serde::{Deserialize, Serialize};
use url::Url;

/// A parsed llms.txt document.
///
/// Always produced, even from malformed input: whatever was recoverable is
/// populated and every problem encountered is reported in [`diagnostics`].
/// A structurally valid document has a non-empty [`title`].
///
/// [`title`]: Document::title
/// [`diagnostics`]: Document::diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Text of the first H1 heading, if one was found.
    pub title: Option<String>,

    /// First line of the blockquote immediately following the H1, if any.
    pub summary: Option<String>,

    /// Markdown between the summary and the first H2, captured verbatim.
    pub freeform: Option<String>,

    /// Sections in source order, one per `## ` heading.
    pub sections: Vec<Section>,

    /// The original input, preserved for debugging and re-parsing.
    pub raw_content: String,

    /// Problems encountered during parsing, in discovery order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Document {
    /// Returns true if the document has a non-empty title and no
    /// error-severity diagnostics.
    #[must_use]
    pub fn is_structurally_valid(&self) -> bool {
        self.title.as_deref().is_some_and(|t| !t.trim().is_empty())
            && !self
                .diagnostics
                .iter()
                .any(|d| d.severity == DiagnosticSeverity::Error)
    }

    /// Total number of entries across all sections.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.sections.iter().map(|s| s.entries.len()).sum()
    }
}

/// One H2-delimited section of an llms.txt document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// The H2 heading text.
    pub name: String,

    /// True iff the name is exactly `"Optional"` (case-sensitive).
    ///
    /// Optional sections are lower-priority content that the context
    /// generator excludes by default and drops first under budget pressure.
    pub is_optional: bool,

    /// Link entries in source order.
    pub entries: Vec<Entry>,
}

/// A single `- [title](url): description` link entry within a section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Absolute HTTP or HTTPS URL of the linked content.
    pub url: Url,

    /// The link text. Mandatory in the entry grammar.
    pub title: String,

    /// Text after the first colon following the link, if present.
    pub description: Option<String>,
}

/// Severity of a parser diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// Structural problem; the document is not conformant.
    Error,
    /// Tolerated deviation; parsing recovered.
    Warning,
}

/// Stable machine-readable reason code carried by each diagnostic.
///
/// Downstream consumers (the validator in particular) branch on these codes
/// rather than matching message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    /// No H1 heading found; the title is required.
    RequiredH1Missing,
    /// More than one H1 heading at the structural level.
    MultipleH1Found,
    /// Summary blockquote spans multiple lines or deviates from the
    /// single-line form.
    BlockquoteMalformed,
    /// An entry URL was relative; the entry was dropped.
    EntryUrlRelative,
    /// An entry URL was unparseable or used a non-HTTP scheme; the entry
    /// was dropped.
    EntryUrlInvalid,
    /// A heading of level 3 or deeper appeared at the structural level.
    UnexpectedHeadingLevel,
    /// Non-entry text appeared inside a section.
    ContentOutsideStructure,
    /// Input exceeded the parser's size bound and was rejected.
    InputTooLarge,
}

/// A problem reported by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    /// Whether the problem invalidates the document or was tolerated.
    pub severity: DiagnosticSeverity,

    /// Stable reason code for programmatic handling.
    pub code: DiagnosticCode,

    /// Human-readable description.
    pub message: String,

    /// 1-based source line, when attributable.
    pub line: Option<usize>,
}

impl Diagnostic {
    /// Construct an error-severity diagnostic.
    #[must_use]
    pub fn error(code: DiagnosticCode, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            code,
            message: message.into(),
            line,
        }
    }

    /// Construct a warning-severity diagnostic.
    #[must_use]
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, line: Option<usize>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            code,
            message: message.into(),
            line,
        }
    }
}
