//! Rule-based validation of parsed llms.txt documents.
//!
//! The [`Validator`] dispatches over an extensible set of [`Rule`] values.
//! Each rule has a stable identifier and a pure check function; rules are
//! order-independent, and the aggregated report sorts errors before
//! warnings while preserving insertion order within each severity.
//!
//! Structural rules work entirely from the document and its parser
//! diagnostics, branching on [`DiagnosticCode`] rather than message text.
//! Network rules (link reachability, redirect detection, freshness) run
//! only when enabled through [`ValidationOptions`] and probe entry URLs via
//! the shared fetcher's redirect-disabled HEAD client.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use llmskit_core::{Fetcher, LlmsParser, ValidationOptions, Validator};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> llmskit_core::Result<()> {
//! let document = LlmsParser::new().parse("# Site\n## Docs\n- [G](https://x/g.md)\n");
//! let validator = Validator::new(Arc::new(Fetcher::new()?));
//!
//! let report = validator
//!     .validate(&document, &ValidationOptions::default(), &CancellationToken::new())
//!     .await?;
//! assert!(report.is_valid());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    DiagnosticCode, DiagnosticSeverity, Document, Error, Fetcher, Result,
};

/// Default timeout for per-URL HEAD probes.
const DEFAULT_URL_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// How many HEAD probes run concurrently.
const PROBE_CONCURRENCY: usize = 4;

/// Options controlling a validation pass.
#[derive(Debug, Clone)]
pub struct ValidationOptions {
    /// Enable the network rules that issue a HEAD request per entry URL.
    pub check_linked_urls: bool,
    /// Enable the freshness comparison against `reference_last_modified`.
    pub check_freshness: bool,
    /// Per-URL probe timeout.
    pub url_check_timeout: Duration,
    /// Reference timestamp for freshness checks, typically the llms.txt
    /// file's own `Last-Modified`. The freshness rule is skipped without it.
    pub reference_last_modified: Option<DateTime<Utc>>,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            check_linked_urls: false,
            check_freshness: false,
            url_check_timeout: DEFAULT_URL_CHECK_TIMEOUT,
            reference_last_modified: None,
        }
    }
}

/// A single validation finding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// Whether the finding invalidates the document.
    pub severity: DiagnosticSeverity,
    /// Stable machine-readable rule identifier.
    pub rule: String,
    /// Human-readable description.
    pub message: String,
    /// Where the finding points (a line, section name, or URL).
    pub location: Option<String>,
}

impl ValidationIssue {
    /// Construct an error-severity issue.
    #[must_use]
    pub fn error(rule: &str, message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            rule: rule.to_string(),
            message: message.into(),
            location,
        }
    }

    /// Construct a warning-severity issue.
    #[must_use]
    pub fn warning(rule: &str, message: impl Into<String>, location: Option<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            rule: rule.to_string(),
            message: message.into(),
            location,
        }
    }
}

/// Aggregated result of a validation pass.
///
/// Validity is derived: a report is valid iff it holds zero error-severity
/// issues. Warnings alone never invalidate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// Build a report from issues in discovery order.
    #[must_use]
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        for issue in issues {
            match issue.severity {
                DiagnosticSeverity::Error => errors.push(issue),
                DiagnosticSeverity::Warning => warnings.push(issue),
            }
        }
        Self { errors, warnings }
    }

    /// True iff the report holds no error-severity issues.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Error-severity issues in discovery order.
    #[must_use]
    pub fn errors(&self) -> &[ValidationIssue] {
        &self.errors
    }

    /// Warning-severity issues in discovery order.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    /// All issues, errors first, discovery order within each severity.
    pub fn all_issues(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.errors.iter().chain(self.warnings.iter())
    }
}

/// Check function of a structural rule.
pub type RuleCheck = Box<dyn Fn(&Document) -> Vec<ValidationIssue> + Send + Sync>;

/// One registered validation rule: a stable identifier plus a pure check.
///
/// Rules are plain values; adding a rule means appending another value to
/// the registry, and a rule may close over its own configuration.
pub struct Rule {
    id: &'static str,
    check: RuleCheck,
}

impl Rule {
    /// Create a rule from an identifier and a check function.
    #[must_use]
    pub fn new(
        id: &'static str,
        check: impl Fn(&Document) -> Vec<ValidationIssue> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id,
            check: Box::new(check),
        }
    }

    /// The rule's stable identifier.
    #[must_use]
    pub const fn id(&self) -> &'static str {
        self.id
    }
}

/// Maps a parser diagnostic code onto issues with the given rule id and
/// severity, one per matching diagnostic.
fn diagnostic_rule(
    id: &'static str,
    code: DiagnosticCode,
    severity: DiagnosticSeverity,
) -> Rule {
    Rule::new(id, move |doc| {
        doc.diagnostics
            .iter()
            .filter(|d| d.code == code)
            .map(|d| ValidationIssue {
                severity,
                rule: id.to_string(),
                message: d.message.clone(),
                location: d.line.map(|n| format!("line {n}")),
            })
            .collect()
    })
}

fn builtin_rules() -> Vec<Rule> {
    vec![
        Rule::new("REQUIRED_H1_MISSING", |doc| {
            if doc.title.as_deref().is_some_and(|t| !t.trim().is_empty()) {
                Vec::new()
            } else {
                vec![ValidationIssue::error(
                    "REQUIRED_H1_MISSING",
                    "Document has no title; an H1 heading is required",
                    None,
                )]
            }
        }),
        diagnostic_rule(
            "MULTIPLE_H1_FOUND",
            DiagnosticCode::MultipleH1Found,
            DiagnosticSeverity::Error,
        ),
        diagnostic_rule(
            "BLOCKQUOTE_MALFORMED",
            DiagnosticCode::BlockquoteMalformed,
            DiagnosticSeverity::Warning,
        ),
        Rule::new("SECTION_EMPTY", |doc| {
            doc.sections
                .iter()
                .filter(|s| s.entries.is_empty())
                .map(|s| {
                    ValidationIssue::warning(
                        "SECTION_EMPTY",
                        format!("Section '{}' has no entries", s.name),
                        Some(s.name.clone()),
                    )
                })
                .collect()
        }),
        Rule::new("ENTRY_URL_INVALID", |doc| {
            // The parser downgraded relative URLs to warnings; validation
            // upgrades both rejection flavors to errors.
            doc.diagnostics
                .iter()
                .filter(|d| {
                    matches!(
                        d.code,
                        DiagnosticCode::EntryUrlInvalid | DiagnosticCode::EntryUrlRelative
                    )
                })
                .map(|d| {
                    ValidationIssue::error(
                        "ENTRY_URL_INVALID",
                        d.message.clone(),
                        d.line.map(|n| format!("line {n}")),
                    )
                })
                .collect()
        }),
        diagnostic_rule(
            "UNEXPECTED_HEADING_LEVEL",
            DiagnosticCode::UnexpectedHeadingLevel,
            DiagnosticSeverity::Warning,
        ),
        diagnostic_rule(
            "CONTENT_OUTSIDE_STRUCTURE",
            DiagnosticCode::ContentOutsideStructure,
            DiagnosticSeverity::Warning,
        ),
    ]
}

/// Outcome of one HEAD probe, paired with the probed entry.
struct ProbeOutcome {
    section: String,
    url: String,
    result: Result<crate::HeadProbe>,
}

/// Rule-dispatching validator over parsed documents.
pub struct Validator {
    rules: Vec<Rule>,
    fetcher: Arc<Fetcher>,
}

impl Validator {
    /// Create a validator with the built-in rule set.
    ///
    /// The fetcher provides the shared HTTP client for network rules, so
    /// probe traffic reuses the toolkit's connection pool, User-Agent, and
    /// timeout discipline.
    #[must_use]
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            rules: builtin_rules(),
            fetcher,
        }
    }

    /// Append a rule to the registry.
    pub fn register_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Identifiers of all registered rules, in registration order.
    pub fn rule_ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(Rule::id)
    }

    /// Run every applicable rule over `document`.
    ///
    /// Structural rules always run. Network rules run only when enabled in
    /// `options`; a failed probe degrades to an "unreachable" finding for
    /// that URL rather than failing the pass.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`], when the token fires while probes are in
    /// flight.
    #[instrument(skip_all, fields(rules = self.rules.len()))]
    pub async fn validate(
        &self,
        document: &Document,
        options: &ValidationOptions,
        cancel: &CancellationToken,
    ) -> Result<ValidationReport> {
        let mut issues: Vec<ValidationIssue> = Vec::new();
        for rule in &self.rules {
            issues.extend((rule.check)(document));
        }

        let probe_freshness = options.check_freshness && options.reference_last_modified.is_some();
        if options.check_linked_urls || probe_freshness {
            issues.extend(
                self.probe_entries(document, options, probe_freshness, cancel)
                    .await?,
            );
        }

        debug!(
            issues = issues.len(),
            "validation pass complete"
        );
        Ok(ValidationReport::from_issues(issues))
    }

    /// HEAD-probe every entry URL with bounded concurrency, preserving
    /// document order in the emitted issues.
    async fn probe_entries(
        &self,
        document: &Document,
        options: &ValidationOptions,
        probe_freshness: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<ValidationIssue>> {
        let targets: Vec<(String, String)> = document
            .sections
            .iter()
            .flat_map(|s| {
                s.entries
                    .iter()
                    .map(|e| (s.name.clone(), e.url.as_str().to_string()))
            })
            .collect();

        let timeout = options.url_check_timeout;
        let fetcher = Arc::clone(&self.fetcher);

        let mut stream = futures::stream::iter(targets.into_iter().map(|(section, url)| {
            let fetcher = Arc::clone(&fetcher);
            let cancel = cancel.clone();
            async move {
                let result = fetcher.probe_head(&url, timeout, &cancel).await;
                ProbeOutcome {
                    section,
                    url,
                    result,
                }
            }
        }))
        .buffered(PROBE_CONCURRENCY);

        let mut issues = Vec::new();
        while let Some(outcome) = stream.next().await {
            let ProbeOutcome {
                section,
                url,
                result,
            } = outcome;
            match result {
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    if options.check_linked_urls {
                        issues.push(ValidationIssue::warning(
                            "ENTRY_URL_UNREACHABLE",
                            format!("HEAD probe of '{url}' failed: {e}"),
                            Some(url),
                        ));
                    }
                },
                Ok(probe) => {
                    issues.extend(issues_for_probe(
                        &section,
                        &url,
                        &probe,
                        options,
                        probe_freshness,
                    ));
                },
            }
        }
        Ok(issues)
    }
}

fn issues_for_probe(
    section: &str,
    url: &str,
    probe: &crate::HeadProbe,
    options: &ValidationOptions,
    probe_freshness: bool,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    match probe.status {
        200..=299 => {
            if probe_freshness {
                if let (Some(page_modified), Some(reference)) =
                    (probe.last_modified, options.reference_last_modified)
                {
                    if page_modified > reference {
                        issues.push(ValidationIssue::warning(
                            "CONTENT_STALE",
                            format!(
                                "Linked page in '{section}' was modified at {page_modified}, after the llms.txt reference time {reference}"
                            ),
                            Some(url.to_string()),
                        ));
                    }
                }
            }
        },
        300..=399 if options.check_linked_urls => {
            issues.push(ValidationIssue::warning(
                "ENTRY_URL_REDIRECTED",
                format!("HEAD of '{url}' returned HTTP {}", probe.status),
                Some(url.to_string()),
            ));
        },
        status if options.check_linked_urls => {
            issues.push(ValidationIssue::warning(
                "ENTRY_URL_UNREACHABLE",
                format!("HEAD of '{url}' returned HTTP {status}"),
                Some(url.to_string()),
            ));
        },
        _ => {},
    }

    issues
}
