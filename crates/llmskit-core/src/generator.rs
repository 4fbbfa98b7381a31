//! Assembly of LLM-ready context from a parsed llms.txt document.
//!
//! The [`ContextGenerator`] expands a [`Document`] into a single string:
//! every linked page in every candidate section is fetched through the
//! shared [`Fetcher`], cleaned (HTML comments and base64 `data:` images
//! stripped), wrapped per section, and packed under an approximate token
//! budget.
//!
//! ## Budgeting
//!
//! When a budget is set and the full output would exceed it, Optional
//! sections are dropped first, then sections are truncated from the last
//! candidate backward at sentence boundaries with a literal truncation
//! marker appended. The emitted content always estimates at or under the
//! budget, and section/entry ordering always follows document order.
//!
//! Linked pages are fetched sequentially in document order. Fetch failures
//! never abort generation: each failed entry contributes a placeholder and
//! an error record in the result.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{Document, Error, Fetcher, Result, Section};

/// Marker appended where section content was cut to fit the budget.
pub const TRUNCATION_MARKER: &str = "[... content truncated to fit token budget ...]";

static HTML_COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap_or_else(|_| unreachable!()));
static DATA_URI_IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(data:[^)]*\)").unwrap_or_else(|_| unreachable!()));

/// Token estimation function: maps text to an approximate token count.
pub type TokenEstimator = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Options controlling context generation.
#[derive(Clone)]
pub struct ContextOptions {
    /// Approximate token cap on the output. `None` or `Some(0)` means
    /// unbounded.
    pub max_tokens: Option<usize>,
    /// Include sections marked Optional.
    pub include_optional: bool,
    /// Wrap each section's block as `<section name="NAME">…</section>`.
    pub wrap_sections_in_xml: bool,
    /// Replacement token estimator; defaults to a word-count heuristic.
    /// Supply a model-specific tokenizer for tighter budgets.
    pub token_estimator: Option<TokenEstimator>,
}

impl ContextOptions {
    /// Options with the defaults: unbounded, Optional sections excluded,
    /// XML wrapping on.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_tokens: None,
            include_optional: false,
            wrap_sections_in_xml: true,
            token_estimator: None,
        }
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ContextOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextOptions")
            .field("max_tokens", &self.max_tokens)
            .field("include_optional", &self.include_optional)
            .field("wrap_sections_in_xml", &self.wrap_sections_in_xml)
            .field(
                "token_estimator",
                &self.token_estimator.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

/// A linked-content fetch that failed during generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    /// The entry URL that failed.
    pub url: String,
    /// Why it failed.
    pub message: String,
}

/// Result of context generation.
#[derive(Debug, Clone)]
pub struct ContextResult {
    /// The assembled context string.
    pub content: String,
    /// Estimator applied to `content`.
    pub approximate_token_count: usize,
    /// Names of sections present in `content`, document order.
    pub sections_included: Vec<String>,
    /// Names of sections dropped by budgeting.
    pub sections_omitted: Vec<String>,
    /// Names of sections partially kept (truncated).
    pub sections_truncated: Vec<String>,
    /// Per-entry fetch failures; the corresponding entries contributed
    /// placeholders rather than being silently omitted.
    pub fetch_errors: Vec<FetchFailure>,
}

/// One section's assembled (pre-budgeting) content.
struct Block {
    name: String,
    is_optional: bool,
    body: String,
    truncated: bool,
}

/// Expands documents into single LLM-ready context strings.
pub struct ContextGenerator {
    fetcher: Arc<Fetcher>,
}

impl ContextGenerator {
    /// Create a generator backed by the shared fetcher.
    #[must_use]
    pub const fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    /// Assemble the context string for `document`.
    ///
    /// # Errors
    ///
    /// Only [`Error::Cancelled`]; individual fetch failures are recorded in
    /// the result's `fetch_errors`.
    #[instrument(skip_all, fields(sections = document.sections.len()))]
    pub async fn generate(
        &self,
        document: &Document,
        options: &ContextOptions,
        cancel: &CancellationToken,
    ) -> Result<ContextResult> {
        let estimator = options
            .token_estimator
            .clone()
            .unwrap_or_else(|| Arc::new(estimate_tokens));
        let estimate: &dyn Fn(&str) -> usize = estimator.as_ref();

        let mut fetch_errors = Vec::new();
        let mut blocks = Vec::new();

        for section in &document.sections {
            if section.is_optional && !options.include_optional {
                continue;
            }
            let body = self
                .assemble_section(section, &mut fetch_errors, cancel)
                .await?;
            blocks.push(Block {
                name: section.name.clone(),
                is_optional: section.is_optional,
                body,
                truncated: false,
            });
        }

        let mut omitted = Vec::new();
        let mut truncated = Vec::new();

        if let Some(max_tokens) = options.max_tokens.filter(|m| *m > 0) {
            apply_budget(
                &mut blocks,
                max_tokens,
                options.wrap_sections_in_xml,
                estimate,
                &mut omitted,
                &mut truncated,
            );
        }

        let content = compose(&blocks, options.wrap_sections_in_xml);
        let approximate_token_count = estimate(&content);
        debug!(
            tokens = approximate_token_count,
            included = blocks.len(),
            omitted = omitted.len(),
            "context assembled"
        );

        Ok(ContextResult {
            content,
            approximate_token_count,
            sections_included: blocks.into_iter().map(|b| b.name).collect(),
            sections_omitted: omitted,
            sections_truncated: truncated,
            fetch_errors,
        })
    }

    /// Fetch and clean every entry of one section, in entry order.
    async fn assemble_section(
        &self,
        section: &Section,
        fetch_errors: &mut Vec<FetchFailure>,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let mut bodies = Vec::with_capacity(section.entries.len());

        for entry in &section.entries {
            let url = entry.url.as_str();
            match self.fetcher.fetch_content(url, cancel).await {
                Ok(body) => bodies.push(clean_content(&body)),
                Err(Error::Cancelled) => return Err(Error::Cancelled),
                Err(e) => {
                    fetch_errors.push(FetchFailure {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                    bodies.push(format!("[content unavailable: {url}]"));
                },
            }
        }

        Ok(bodies.join("\n\n"))
    }
}

/// Default token estimator: whitespace-separated word count over four,
/// rounded up.
fn estimate_tokens(text: &str) -> usize {
    text.split_whitespace().count().div_ceil(4)
}

/// Remove HTML comments (including multi-line) and Markdown image
/// references whose target is a `data:` URI, preserving surrounding text.
fn clean_content(body: &str) -> String {
    let without_comments = HTML_COMMENT_RE.replace_all(body, "");
    DATA_URI_IMAGE_RE
        .replace_all(&without_comments, "")
        .into_owned()
}

/// Escape a section name for use as an XML attribute value.
fn escape_attr(name: &str) -> String {
    name.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn render(block: &Block, wrap: bool) -> String {
    if wrap {
        format!(
            "<section name=\"{}\">\n{}\n</section>",
            escape_attr(&block.name),
            block.body
        )
    } else {
        block.body.clone()
    }
}

fn compose(blocks: &[Block], wrap: bool) -> String {
    blocks
        .iter()
        .map(|b| render(b, wrap))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Shrink `blocks` in place until the composed output fits `max_tokens`.
///
/// Optional sections are dropped first (last backward), then sections are
/// truncated from the last candidate backward; a section that cannot keep
/// any meaningful content is dropped instead.
fn apply_budget(
    blocks: &mut Vec<Block>,
    max_tokens: usize,
    wrap: bool,
    estimate: &dyn Fn(&str) -> usize,
    omitted: &mut Vec<String>,
    truncated: &mut Vec<String>,
) {
    let over = |blocks: &[Block]| estimate(&compose(blocks, wrap)) > max_tokens;

    // Step a: drop whole Optional sections while over budget.
    while over(blocks) {
        let last_optional = blocks.iter().rposition(|b| b.is_optional);
        match last_optional {
            Some(idx) => omitted.push(blocks.remove(idx).name),
            None => break,
        }
    }

    // Step b: truncate from the last candidate backward.
    while !blocks.is_empty() && over(blocks) {
        let head_tokens = if blocks.len() > 1 {
            // Account for the separator that will precede the last block.
            estimate(&compose(&blocks[..blocks.len() - 1], wrap))
        } else {
            0
        };
        let allowed = max_tokens.saturating_sub(head_tokens);

        #[allow(clippy::unwrap_used)] // non-empty checked by the loop guard
        let last = blocks.last_mut().unwrap();
        if last.truncated {
            // Already truncated and still over: the remaining budget cannot
            // host this section at all.
            truncated.retain(|name| name != &last.name);
            let name = last.name.clone();
            blocks.pop();
            omitted.push(name);
            continue;
        }

        match truncate_body(last, allowed, wrap, estimate) {
            Some(new_body) => {
                last.body = new_body;
                last.truncated = true;
                truncated.push(last.name.clone());
            },
            None => {
                let name = last.name.clone();
                blocks.pop();
                omitted.push(name);
            },
        }
    }
}

/// Compute a truncated body for `block` so its rendered form estimates at
/// or under `allowed` tokens, cutting at a sentence boundary (whitespace
/// fallback) and appending the truncation marker.
///
/// Returns `None` when no meaningful prefix fits.
fn truncate_body(
    block: &Block,
    allowed: usize,
    wrap: bool,
    estimate: &dyn Fn(&str) -> usize,
) -> Option<String> {
    if allowed == 0 {
        return None;
    }

    let body = block.body.as_str();
    let rendered_fits = |cut: usize| {
        let candidate = Block {
            name: block.name.clone(),
            is_optional: block.is_optional,
            body: with_marker(&body[..cut]),
            truncated: true,
        };
        estimate(&render(&candidate, wrap)) <= allowed
    };

    // Largest byte cut whose rendered form (marker included) fits. The
    // estimator is monotone over prefixes, so binary search applies.
    let mut best = 0usize;
    let mut lo = 0usize;
    let mut hi = body.len();
    while lo <= hi {
        let mid = usize::midpoint(lo, hi);
        let snapped = snap_to_char_boundary(body, mid);
        if rendered_fits(snapped) {
            best = best.max(snapped);
            lo = mid + 1;
        } else {
            if mid == 0 {
                break;
            }
            hi = mid - 1;
        }
    }

    if best == 0 {
        return None;
    }

    let cut = sentence_boundary(&body[..best])
        .or_else(|| whitespace_boundary(&body[..best]))?;
    if cut == 0 {
        return None;
    }

    Some(with_marker(&body[..cut]))
}

fn with_marker(prefix: &str) -> String {
    format!("{}\n\n{TRUNCATION_MARKER}", prefix.trim_end())
}

/// Last sentence boundary (`. `, `? `, `! `) in `text`, as the byte index
/// just past the punctuation.
fn sentence_boundary(text: &str) -> Option<usize> {
    [". ", "? ", "! "]
        .iter()
        .filter_map(|pat| text.rfind(pat))
        .max()
        .map(|idx| idx + 1)
}

/// Last whitespace boundary in `text`.
fn whitespace_boundary(text: &str) -> Option<usize> {
    text.rfind(char::is_whitespace)
}

fn snap_to_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::{FetcherConfig, LlmsParser};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn generator() -> ContextGenerator {
        let fetcher = Fetcher::with_config(FetcherConfig {
            retry_delay: std::time::Duration::from_millis(1),
            ..FetcherConfig::default()
        })
        .unwrap();
        ContextGenerator::new(Arc::new(fetcher))
    }

    async fn mount_page(server: &MockServer, page_path: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(page_path.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(server)
            .await;
    }

    /// Sentence-structured filler with roughly `words` words.
    fn long_body(words: usize) -> String {
        "alpha beta gamma delta. ".repeat(words / 4)
    }

    #[tokio::test]
    async fn test_generates_wrapped_sections_in_order() {
        let server = MockServer::start().await;
        mount_page(&server, "/a.md", "Content of page A.").await;
        mount_page(&server, "/b.md", "Content of page B.").await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Guides\n- [A]({0}/a.md)\n## Reference\n- [B]({0}/b.md)\n",
            server.uri()
        ));
        let result = generator()
            .generate(&doc, &ContextOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.content.contains("<section name=\"Guides\">"));
        assert!(result.content.contains("<section name=\"Reference\">"));
        assert!(result.content.contains("Content of page A."));
        assert!(result.content.contains("Content of page B."));
        let guides_at = result.content.find("Guides").unwrap();
        let reference_at = result.content.find("Reference").unwrap();
        assert!(guides_at < reference_at, "document order must be preserved");
        assert_eq!(result.sections_included, vec!["Guides", "Reference"]);
        assert!(result.sections_omitted.is_empty());
        assert!(result.fetch_errors.is_empty());
        assert_eq!(
            result.approximate_token_count,
            estimate_tokens(&result.content)
        );
    }

    #[tokio::test]
    async fn test_entries_emitted_in_entry_order() {
        let server = MockServer::start().await;
        mount_page(&server, "/one.md", "FIRST-PAGE-BODY").await;
        mount_page(&server, "/two.md", "SECOND-PAGE-BODY").await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [1]({0}/one.md)\n- [2]({0}/two.md)\n",
            server.uri()
        ));
        let result = generator()
            .generate(&doc, &ContextOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        let first = result.content.find("FIRST-PAGE-BODY").unwrap();
        let second = result.content.find("SECOND-PAGE-BODY").unwrap();
        assert!(first < second);
    }

    #[tokio::test]
    async fn test_optional_sections_excluded_by_default() {
        let server = MockServer::start().await;
        mount_page(&server, "/docs.md", "Docs body.").await;
        Mock::given(method("GET"))
            .and(path("/extra.md"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Extra body."))
            .expect(0)
            .mount(&server)
            .await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [D]({0}/docs.md)\n## Optional\n- [E]({0}/extra.md)\n",
            server.uri()
        ));
        let result = generator()
            .generate(&doc, &ContextOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.sections_included, vec!["Docs"]);
        assert!(!result.content.contains("Extra body."));
        // Excluded by option, not dropped by budget.
        assert!(result.sections_omitted.is_empty());
    }

    #[tokio::test]
    async fn test_include_optional_fetches_optional_sections() {
        let server = MockServer::start().await;
        mount_page(&server, "/docs.md", "Docs body.").await;
        mount_page(&server, "/extra.md", "Extra body.").await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [D]({0}/docs.md)\n## Optional\n- [E]({0}/extra.md)\n",
            server.uri()
        ));
        let options = ContextOptions {
            include_optional: true,
            ..ContextOptions::new()
        };
        let result = generator()
            .generate(&doc, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.sections_included, vec!["Docs", "Optional"]);
        assert!(result.content.contains("Extra body."));
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_placeholder_and_record() {
        let server = MockServer::start().await;
        mount_page(&server, "/ok.md", "Good body.").await;
        Mock::given(method("GET"))
            .and(path("/gone.md"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [OK]({0}/ok.md)\n- [Gone]({0}/gone.md)\n",
            server.uri()
        ));
        let result = generator()
            .generate(&doc, &ContextOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.content.contains("Good body."));
        assert!(result.content.contains("[content unavailable:"));
        assert_eq!(result.fetch_errors.len(), 1);
        assert!(result.fetch_errors[0].url.ends_with("/gone.md"));
        assert!(result.fetch_errors[0].message.contains("HTTP 404"));
    }

    #[tokio::test]
    async fn test_cleaning_strips_comments_and_data_uri_images() {
        let server = MockServer::start().await;
        mount_page(
            &server,
            "/page.md",
            "Before.<!-- hidden\nspanning lines -->After.\n\
             ![inline](data:image/png;base64,AAAA) kept text\n\
             ![normal](https://x.test/img.png)",
        )
        .await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [P]({}/page.md)\n",
            server.uri()
        ));
        let result = generator()
            .generate(&doc, &ContextOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.content.contains("Before.After."));
        assert!(!result.content.contains("hidden"));
        assert!(!result.content.contains("data:image"));
        assert!(result.content.contains("kept text"));
        assert!(result.content.contains("![normal](https://x.test/img.png)"));
    }

    #[tokio::test]
    async fn test_wrap_disabled_emits_plain_blocks() {
        let server = MockServer::start().await;
        mount_page(&server, "/a.md", "Plain body.").await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [A]({}/a.md)\n",
            server.uri()
        ));
        let options = ContextOptions {
            wrap_sections_in_xml: false,
            ..ContextOptions::new()
        };
        let result = generator()
            .generate(&doc, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.content.contains("<section"));
        assert!(result.content.contains("Plain body."));
    }

    #[tokio::test]
    async fn test_section_names_escaped_in_wrapper() {
        let server = MockServer::start().await;
        mount_page(&server, "/a.md", "Body.").await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Q&A \"quoted\"\n- [A]({}/a.md)\n",
            server.uri()
        ));
        let result = generator()
            .generate(&doc, &ContextOptions::new(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(
            result
                .content
                .contains("<section name=\"Q&amp;A &quot;quoted&quot;\">")
        );
    }

    #[tokio::test]
    async fn test_budget_drops_optional_before_truncating() {
        let server = MockServer::start().await;
        mount_page(&server, "/docs.md", &long_body(400)).await;
        mount_page(&server, "/extra.md", &long_body(400)).await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [D]({0}/docs.md)\n## Optional\n- [E]({0}/extra.md)\n",
            server.uri()
        ));
        // Docs alone (~101 tokens) fits; Docs + Optional (~202) does not.
        let options = ContextOptions {
            include_optional: true,
            max_tokens: Some(120),
            ..ContextOptions::new()
        };
        let result = generator()
            .generate(&doc, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.sections_included.contains(&"Docs".to_string()));
        assert!(result.sections_omitted.contains(&"Optional".to_string()));
        assert!(result.sections_truncated.is_empty());
        assert!(result.approximate_token_count <= 120);
        assert!(result.content.contains("alpha beta"));
        assert!(!result.content.contains("<section name=\"Optional\">"));
    }

    #[tokio::test]
    async fn test_budget_truncates_last_section_at_sentence_boundary() {
        let server = MockServer::start().await;
        mount_page(&server, "/big.md", &long_body(400)).await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [B]({}/big.md)\n",
            server.uri()
        ));
        let options = ContextOptions {
            max_tokens: Some(50),
            ..ContextOptions::new()
        };
        let result = generator()
            .generate(&doc, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.approximate_token_count <= 50);
        assert_eq!(result.sections_truncated, vec!["Docs"]);
        assert!(result.content.contains(TRUNCATION_MARKER));
        // The cut landed just past a sentence boundary.
        let marker_at = result.content.find(TRUNCATION_MARKER).unwrap();
        let before_marker = result.content[..marker_at].trim_end();
        assert!(before_marker.ends_with('.'));
    }

    #[tokio::test]
    async fn test_budget_law_holds_with_custom_estimator() {
        let server = MockServer::start().await;
        mount_page(&server, "/big.md", &long_body(800)).await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [B]({}/big.md)\n",
            server.uri()
        ));
        // A coarser estimator: one token per word.
        fn words(s: &str) -> usize {
            s.split_whitespace().count()
        }
        let options = ContextOptions {
            max_tokens: Some(100),
            token_estimator: Some(Arc::new(words)),
            ..ContextOptions::new()
        };
        let result = generator()
            .generate(&doc, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(words(&result.content) <= 100);
        assert_eq!(result.approximate_token_count, words(&result.content));
    }

    #[tokio::test]
    async fn test_budget_too_small_for_any_content_omits_section() {
        let server = MockServer::start().await;
        mount_page(&server, "/big.md", &long_body(400)).await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [B]({}/big.md)\n",
            server.uri()
        ));
        let options = ContextOptions {
            max_tokens: Some(1),
            ..ContextOptions::new()
        };
        let result = generator()
            .generate(&doc, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.sections_included.is_empty());
        assert_eq!(result.sections_omitted, vec!["Docs"]);
        assert!(result.content.is_empty());
    }

    #[tokio::test]
    async fn test_zero_max_tokens_means_unbounded() {
        let server = MockServer::start().await;
        mount_page(&server, "/big.md", &long_body(400)).await;

        let doc = LlmsParser::new().parse(&format!(
            "# Site\n## Docs\n- [B]({}/big.md)\n",
            server.uri()
        ));
        let options = ContextOptions {
            max_tokens: Some(0),
            ..ContextOptions::new()
        };
        let result = generator()
            .generate(&doc, &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.sections_omitted.is_empty());
        assert!(result.sections_truncated.is_empty());
    }

    #[tokio::test]
    async fn test_cancellation_aborts_generation() {
        let doc =
            LlmsParser::new().parse("# Site\n## Docs\n- [A](https://example.com/a.md)\n");
        let cancel = CancellationToken::new();
        cancel.cancel();

        match generator()
            .generate(&doc, &ContextOptions::new(), &cancel)
            .await
        {
            Err(Error::Cancelled) => {},
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }

    #[test]
    fn test_default_estimator_word_heuristic() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("one"), 1);
        assert_eq!(estimate_tokens("one two three four"), 1);
        assert_eq!(estimate_tokens("one two three four five"), 2);
    }

    #[test]
    fn test_clean_content_edge_cases() {
        assert_eq!(clean_content("no markup at all"), "no markup at all");
        assert_eq!(clean_content("a<!-- x -->b<!-- y -->c"), "abc");
        assert_eq!(
            clean_content("text ![alt text](data:text/plain;base64,Zm9v) more"),
            "text  more"
        );
    }

    #[test]
    fn test_sentence_boundary_prefers_latest() {
        let text = "One. Two? Three! Four";
        assert_eq!(sentence_boundary(text), Some(16));
        assert_eq!(sentence_boundary("no boundary here"), None);
    }

    #[test]
    fn test_truncate_body_falls_back_to_whitespace() {
        fn words(s: &str) -> usize {
            s.split_whitespace().count()
        }
        let block = Block {
            name: "Docs".to_string(),
            is_optional: false,
            body: "word ".repeat(100).trim_end().to_string(),
            truncated: false,
        };
        let result = truncate_body(&block, 20, false, &words).unwrap();

        assert!(result.contains(TRUNCATION_MARKER));
        assert!(words(&result) <= 20);
    }
}
