//! Line-oriented parser for llms.txt manifests.
//!
//! The llms.txt grammar is line-anchored: a single `# ` title, an optional
//! `> ` summary blockquote, freeform Markdown, and `## ` sections whose
//! bodies are `- [title](url): description` link entries. Section
//! boundaries are defined only by H2 headings; H3 and deeper headings are
//! content within the enclosing section.
//!
//! ## Resilience
//!
//! [`LlmsParser::parse`] never fails. Malformed input produces a
//! [`Document`] with whatever was recoverable and a [`Diagnostic`] for every
//! problem encountered, each carrying a stable [`DiagnosticCode`] so
//! downstream consumers branch on codes rather than message text.
//!
//! ## Size bound
//!
//! Inputs larger than the configured bound (default 5 MiB) are rejected
//! with a single fatal diagnostic and an otherwise empty document, to keep
//! adversarial inputs from exhausting memory.
//!
//! ## Example
//!
//! ```rust
//! use llmskit_core::LlmsParser;
//!
//! let parser = LlmsParser::new();
//! let doc = parser.parse("# Site\n> A short summary\n\n## Docs\n- [Guide](https://example.com/guide.md): start here\n");
//!
//! assert_eq!(doc.title.as_deref(), Some("Site"));
//! assert_eq!(doc.summary.as_deref(), Some("A short summary"));
//! assert_eq!(doc.sections.len(), 1);
//! assert!(doc.diagnostics.is_empty());
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::{Diagnostic, DiagnosticCode, Document, Entry, Section};

/// Default maximum input size accepted by the parser (5 MiB).
pub const DEFAULT_MAX_INPUT_BYTES: usize = 5 * 1024 * 1024;

static H1_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#\s+(.*)$").unwrap_or_else(|_| unreachable!()));
static H2_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^##\s+(.*)$").unwrap_or_else(|_| unreachable!()));
static DEEP_HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{3,}\s+").unwrap_or_else(|_| unreachable!()));
static BLOCKQUOTE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^>\s?(.*)$").unwrap_or_else(|_| unreachable!()));
static ENTRY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-\s*\[([^\]]+)\]\(([^)\s]+)\)\s*(?::\s*(.*))?$").unwrap_or_else(|_| unreachable!())
});

/// The exact section name that marks a section as optional.
const OPTIONAL_SECTION_NAME: &str = "Optional";

/// Parser for llms.txt content.
///
/// Stateless and cheap to construct; a single instance can be shared and
/// reused across threads.
#[derive(Debug, Clone)]
pub struct LlmsParser {
    max_input_bytes: usize,
}

impl Default for LlmsParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Where the line scanner currently is within the document structure.
enum Phase {
    /// Before the H1 title.
    Preamble,
    /// After the title, where a summary blockquote may still appear.
    SummaryWindow,
    /// Inside a continuation of the summary blockquote.
    BlockquoteTail,
    /// Between summary and first H2.
    Freeform,
    /// Inside the most recently opened section.
    InSection,
}

impl LlmsParser {
    /// Creates a parser with the default input size bound.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }

    /// Creates a parser with a custom input size bound in bytes.
    #[must_use]
    pub const fn with_max_input_size(max_input_bytes: usize) -> Self {
        Self { max_input_bytes }
    }

    /// Parse llms.txt content into a [`Document`].
    ///
    /// Never fails: the result always contains whatever structure was
    /// recoverable, with problems reported in `diagnostics`. For inputs
    /// exceeding the size bound, returns an empty document carrying a single
    /// fatal [`DiagnosticCode::InputTooLarge`] diagnostic.
    #[must_use]
    pub fn parse(&self, content: &str) -> Document {
        if content.len() > self.max_input_bytes {
            debug!(
                size = content.len(),
                limit = self.max_input_bytes,
                "rejecting oversize llms.txt input"
            );
            return Document {
                title: None,
                summary: None,
                freeform: None,
                sections: Vec::new(),
                raw_content: String::new(),
                diagnostics: vec![Diagnostic::error(
                    DiagnosticCode::InputTooLarge,
                    format!(
                        "Input is {} bytes, exceeding the {} byte limit",
                        content.len(),
                        self.max_input_bytes
                    ),
                    None,
                )],
            };
        }

        let mut title: Option<String> = None;
        let mut summary: Option<String> = None;
        let mut freeform_lines: Vec<&str> = Vec::new();
        let mut sections: Vec<Section> = Vec::new();
        let mut diagnostics: Vec<Diagnostic> = Vec::new();

        let mut h1_count = 0usize;
        let mut blockquote_warned = false;
        // Tracks whether the current section already produced an orphan
        // content diagnostic, so each section reports at most once.
        let mut orphan_reported = false;
        let mut phase = Phase::Preamble;

        for (idx, line) in content.lines().enumerate() {
            let lineno = idx + 1;

            // H1 lines are structural wherever they appear; only the first
            // provides the title.
            if let Some(caps) = H1_RE.captures(line) {
                h1_count += 1;
                match h1_count {
                    1 => {
                        title = Some(caps[1].trim().to_string());
                        phase = Phase::SummaryWindow;
                    },
                    2 => {
                        diagnostics.push(Diagnostic::error(
                            DiagnosticCode::MultipleH1Found,
                            "More than one H1 heading found; llms.txt requires exactly one",
                            Some(lineno),
                        ));
                    },
                    _ => {},
                }
                continue;
            }

            if let Some(caps) = H2_RE.captures(line) {
                let name = caps[1].trim().to_string();
                let is_optional = name == OPTIONAL_SECTION_NAME;
                sections.push(Section {
                    name,
                    is_optional,
                    entries: Vec::new(),
                });
                orphan_reported = false;
                phase = Phase::InSection;
                continue;
            }

            match phase {
                Phase::Preamble => {
                    // Content before any H1 is freeform-adjacent; keep it so
                    // nothing is silently lost even when the title is missing.
                    if !line.trim().is_empty() {
                        freeform_lines.push(line);
                    }
                },
                Phase::SummaryWindow => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(caps) = BLOCKQUOTE_RE.captures(line) {
                        summary = Some(caps[1].trim().to_string());
                        phase = Phase::BlockquoteTail;
                    } else {
                        freeform_lines.push(line);
                        phase = Phase::Freeform;
                    }
                },
                Phase::BlockquoteTail => {
                    if BLOCKQUOTE_RE.is_match(line) {
                        // Multi-line blockquotes are tolerated: the first
                        // line is the canonical summary, continuation lines
                        // flow into freeform.
                        if !blockquote_warned {
                            diagnostics.push(Diagnostic::warning(
                                DiagnosticCode::BlockquoteMalformed,
                                "Summary blockquote spans multiple lines; only the first line is used",
                                Some(lineno),
                            ));
                            blockquote_warned = true;
                        }
                        freeform_lines.push(line);
                    } else {
                        if !line.trim().is_empty() {
                            freeform_lines.push(line);
                        }
                        phase = Phase::Freeform;
                    }
                },
                Phase::Freeform => {
                    freeform_lines.push(line);
                },
                Phase::InSection => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if DEEP_HEADING_RE.is_match(line) {
                        diagnostics.push(Diagnostic::warning(
                            DiagnosticCode::UnexpectedHeadingLevel,
                            format!("Heading at level 3 or deeper does not start a new section: {}", line.trim()),
                            Some(lineno),
                        ));
                        continue;
                    }
                    if let Some(caps) = ENTRY_RE.captures(line) {
                        let entry_title = caps[1].trim().to_string();
                        let raw_url = &caps[2];
                        let description = caps
                            .get(3)
                            .map(|m| m.as_str().trim().to_string())
                            .filter(|d| !d.is_empty());

                        match parse_entry_url(raw_url) {
                            Ok(parsed) => {
                                if let Some(section) = sections.last_mut() {
                                    section.entries.push(Entry {
                                        url: parsed,
                                        title: entry_title,
                                        description,
                                    });
                                }
                            },
                            Err(diag_for) => {
                                diagnostics.push(diag_for(lineno));
                            },
                        }
                        continue;
                    }
                    if !orphan_reported {
                        diagnostics.push(Diagnostic::warning(
                            DiagnosticCode::ContentOutsideStructure,
                            format!("Non-entry content inside section: {}", truncate_for_message(line)),
                            Some(lineno),
                        ));
                        orphan_reported = true;
                    }
                },
            }
        }

        if h1_count == 0 {
            diagnostics.push(Diagnostic::error(
                DiagnosticCode::RequiredH1Missing,
                "No H1 heading found; llms.txt requires a title",
                None,
            ));
        }

        let freeform = join_freeform(&freeform_lines);

        Document {
            title,
            summary,
            freeform,
            sections,
            raw_content: content.to_string(),
            diagnostics,
        }
    }
}

type DiagnosticBuilder = Box<dyn FnOnce(usize) -> Diagnostic>;

/// Validate an entry URL: must parse as an absolute HTTP or HTTPS URI.
///
/// On rejection, returns a closure producing the appropriate diagnostic for
/// the offending line: relative URLs are warnings, everything else is an
/// error.
fn parse_entry_url(raw: &str) -> std::result::Result<Url, DiagnosticBuilder> {
    let raw_owned = raw.to_string();
    match Url::parse(raw) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(parsed),
        Ok(parsed) => Err(Box::new(move |lineno| {
            Diagnostic::error(
                DiagnosticCode::EntryUrlInvalid,
                format!(
                    "Entry URL '{raw_owned}' uses unsupported scheme '{}'",
                    parsed.scheme()
                ),
                Some(lineno),
            )
        })),
        Err(url::ParseError::RelativeUrlWithoutBase) => Err(Box::new(move |lineno| {
            Diagnostic::warning(
                DiagnosticCode::EntryUrlRelative,
                format!("Entry URL '{raw_owned}' is relative; entries require absolute URLs"),
                Some(lineno),
            )
        })),
        Err(e) => Err(Box::new(move |lineno| {
            Diagnostic::error(
                DiagnosticCode::EntryUrlInvalid,
                format!("Entry URL '{raw_owned}' is not a valid URL: {e}"),
                Some(lineno),
            )
        })),
    }
}

fn join_freeform(lines: &[&str]) -> Option<String> {
    let start = lines.iter().position(|l| !l.trim().is_empty())?;
    let end = lines.iter().rposition(|l| !l.trim().is_empty())?;
    Some(lines[start..=end].join("\n"))
}

fn truncate_for_message(line: &str) -> String {
    let trimmed = line.trim();
    if trimmed.chars().count() > 60 {
        let prefix: String = trimmed.chars().take(60).collect();
        format!("{prefix}…")
    } else {
        trimmed.to_string()
    }
}
