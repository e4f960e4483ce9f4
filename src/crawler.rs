//! Depth-limited web crawling with HTML content extraction
//!
//! Crawls breadth-first from a set of seed URLs, visiting each URL at most
//! once per call. HTML pages are reduced to their main content block (the
//! single `article`/`div`/`main`/`p` descendant with the longest text);
//! that block, like `text/plain` bodies, is converted to Markdown with
//! anchors reduced to their text and flattened to a single line. Crawling
//! deliberately follows any absolute `http(s)` link, not just same-origin
//! ones, and does not consult robots directives.

use crate::error::CrawlError;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::{HashSet, VecDeque};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Extracted text of a crawled page
#[derive(Debug, Clone)]
pub struct CrawledPage {
    pub text: String,
    pub url: String,
}

/// A fetched page, discriminated by its `Content-Type`
#[derive(Debug)]
enum PageContent {
    Html(String),
    Plain(String),
    // PDF-by-URL extraction is not implemented; the variant exists so the
    // branch is explicit rather than falling into Unsupported
    Pdf,
    Unsupported(String),
}

/// Breadth-first, single-visit web crawler
pub struct WebCrawler {
    http: reqwest::Client,
}

impl WebCrawler {
    /// Default per-request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("llm-kickstart/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Crawl every seed up to `max_depth` link levels (seeds are depth 1).
    ///
    /// Returns `(text, url)` pairs in visit order. Fetch failures and
    /// unsupported content types are logged and skipped; the crawl
    /// continues with the remaining queue.
    pub async fn crawl(&self, seeds: &[String], max_depth: usize) -> Vec<CrawledPage> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut pages = Vec::new();

        for seed in seeds {
            if visited.insert(seed.clone()) {
                queue.push_back((seed.clone(), 1));
            }
        }

        while let Some((current_url, depth)) = queue.pop_front() {
            debug!(url = %current_url, depth, "crawling");

            let content = match self.fetch_page(&current_url).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(error = %e, "skipping URL");
                    continue;
                }
            };

            match content {
                PageContent::Html(html) => {
                    let Some(markdown) = extract_main_markdown(&html) else {
                        continue;
                    };
                    pages.push(CrawledPage {
                        text: markdown,
                        url: current_url.clone(),
                    });

                    if depth < max_depth {
                        for link in extract_links(&current_url, &html) {
                            if visited.insert(link.clone()) {
                                debug!(url = %link, "queueing sublink");
                                queue.push_back((link, depth + 1));
                            }
                        }
                    }
                }
                PageContent::Plain(text) => {
                    if let Some(markdown) = convert_markdown(&text) {
                        pages.push(CrawledPage {
                            text: markdown,
                            url: current_url.clone(),
                        });
                    }
                }
                PageContent::Pdf => {
                    debug!(url = %current_url, "PDF content is not extracted");
                }
                PageContent::Unsupported(content_type) => {
                    warn!(url = %current_url, content_type, "unknown content type, skipped");
                }
            }
        }

        pages
    }

    async fn fetch_page(&self, url: &str) -> Result<PageContent, CrawlError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::Fetch {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        if content_type.contains("application/pdf") {
            return Ok(PageContent::Pdf);
        }
        if !content_type.contains("text/html") && !content_type.contains("text/plain") {
            return Ok(PageContent::Unsupported(content_type));
        }

        let body = response.text().await.map_err(|e| CrawlError::Fetch {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if content_type.contains("text/html") {
            Ok(PageContent::Html(body))
        } else {
            Ok(PageContent::Plain(body))
        }
    }
}

/// Reduce an HTML document to the Markdown of its main content block.
///
/// Scripts and styles are removed, then the single `article`/`div`/`main`/
/// `p` element with the longest contained text is converted. Returns `None`
/// when the document has no candidate element or no text survives.
pub(crate) fn extract_main_markdown(html: &str) -> Option<String> {
    let script_re = Regex::new(r"(?is)<script\b.*?</script>").unwrap();
    let style_re = Regex::new(r"(?is)<style\b.*?</style>").unwrap();
    let html = script_re.replace_all(html, "");
    let html = style_re.replace_all(&html, "");

    let document = Html::parse_document(&html);
    let selector = Selector::parse("article, div, main, p").unwrap();

    let mut main_content: Option<String> = None;
    let mut max_text_length = 0usize;
    for element in document.select(&selector) {
        let text_length: usize = element.text().map(str::len).sum();
        if text_length > max_text_length {
            max_text_length = text_length;
            main_content = Some(element.html());
        }
    }
    convert_markdown(&main_content?)
}

/// Convert page content to single-line Markdown.
///
/// Used for the selected HTML block and for `text/plain` bodies alike;
/// anchors are reduced to their text, newlines and tabs removed.
pub(crate) fn convert_markdown(content: &str) -> Option<String> {
    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(vec!["script", "style"])
        .build();
    let markdown = match converter.convert(content) {
        Ok(markdown) => markdown,
        Err(e) => {
            warn!(error = %e, "markdown conversion failed");
            return None;
        }
    };

    // Reduce anchors to their text
    let link_re = Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap();
    let markdown = link_re.replace_all(&markdown, "$1");

    let flattened = flatten_whitespace(&markdown);
    if flattened.is_empty() {
        None
    } else {
        Some(flattened)
    }
}

/// Collect absolute `http(s)` links of a page in document order,
/// resolving relative hrefs against `base`.
pub(crate) fn extract_links(base: &str, html: &str) -> Vec<String> {
    let Ok(base_url) = Url::parse(base) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").unwrap();

    let mut seen = HashSet::new();
    let mut links = Vec::new();
    for anchor in document.select(&selector) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base_url.join(href.trim()) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let resolved = resolved.to_string();
        if seen.insert(resolved.clone()) {
            links.push(resolved);
        }
    }
    links
}

/// Remove embedded newlines and tabs, trim the ends
fn flatten_whitespace(text: &str) -> String {
    text.replace('\n', "").replace('\t', "").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_extract_main_markdown_picks_longest_block() {
        let html = r#"
            <html><body>
                <div id="nav">short nav</div>
                <div id="content">This is the much longer main content of the page,
                full of useful text that should win the selection.</div>
            </body></html>
        "#;
        let markdown = extract_main_markdown(html).unwrap();
        assert!(markdown.contains("main content"));
        assert!(!markdown.contains("short nav"));
    }

    #[test]
    fn test_extract_main_markdown_strips_scripts_and_anchors() {
        let html = r#"
            <html><body>
                <div>Readable text with a <a href="https://example.com/x">link label</a> inside.
                <script>var hidden = "do not index";</script></div>
            </body></html>
        "#;
        let markdown = extract_main_markdown(html).unwrap();
        assert!(markdown.contains("link label"));
        assert!(!markdown.contains("example.com/x"));
        assert!(!markdown.contains("do not index"));
    }

    #[test]
    fn test_extract_main_markdown_handles_empty_documents() {
        assert!(extract_main_markdown("<html><body></body></html>").is_none());
    }

    #[test]
    fn test_convert_markdown_on_plain_text() {
        let markdown = convert_markdown("first paragraph\n\nsecond paragraph").unwrap();
        assert!(markdown.contains("first paragraph"));
        assert!(markdown.contains("second paragraph"));
        assert!(!markdown.contains('\n'));

        assert!(convert_markdown("   ").is_none());
    }

    #[test]
    fn test_extract_links_resolves_and_filters() {
        let html = r#"
            <a href="/a">rel</a>
            <a href="https://other.example/b">abs</a>
            <a href="mailto:someone@example.com">mail</a>
            <a href="/a">dup</a>
        "#;
        let links = extract_links("http://seed.example/root", html);
        assert_eq!(
            links,
            vec![
                "http://seed.example/a".to_string(),
                "https://other.example/b".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_crawl_depth_two_visits_sublinks_once() {
        let server = MockServer::start().await;
        let root_html = format!(
            r#"<html><body><div>Root page body with enough text to matter.
               <a href="{0}/a">a</a> <a href="{0}/b">b</a> <a href="{0}/a">a again</a></div></body></html>"#,
            server.uri()
        );

        Mock::given(method("GET"))
            .and(path("/root"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(root_html, "text/html"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/a"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<div>Alpha page content here.</div>", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("<div>Beta page content here.</div>", "text/html"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let crawler = WebCrawler::new(Duration::from_secs(2)).unwrap();
        let pages = crawler
            .crawl(&[format!("{}/root", server.uri())], 2)
            .await;

        let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(pages.len(), 3);
        assert!(urls[0].ends_with("/root"));
        assert!(pages.iter().any(|p| p.text.contains("Alpha page")));
        assert!(pages.iter().any(|p| p.text.contains("Beta page")));
    }

    #[tokio::test]
    async fn test_crawl_depth_one_ignores_links() {
        let server = MockServer::start().await;
        let root_html = format!(
            r#"<div>Root only. <a href="{}/a">a</a></div>"#,
            server.uri()
        );
        Mock::given(method("GET"))
            .and(path("/root"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(root_html, "text/html"))
            .mount(&server)
            .await;

        let crawler = WebCrawler::new(Duration::from_secs(2)).unwrap();
        let pages = crawler
            .crawl(&[format!("{}/root", server.uri())], 1)
            .await;
        assert_eq!(pages.len(), 1);
    }

    #[tokio::test]
    async fn test_plain_text_and_unknown_content_types() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/plain"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("line one\nline two", "text/plain"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/image"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0u8; 4], "image/png"))
            .mount(&server)
            .await;

        let crawler = WebCrawler::new(Duration::from_secs(2)).unwrap();
        let pages = crawler
            .crawl(
                &[
                    format!("{}/plain", server.uri()),
                    format!("{}/image", server.uri()),
                ],
                1,
            )
            .await;

        assert_eq!(pages.len(), 1);
        assert!(pages[0].text.contains("line one"));
        assert!(pages[0].text.contains("line two"));
        assert!(!pages[0].text.contains('\n'));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_skipped() {
        let crawler = WebCrawler::new(Duration::from_millis(200)).unwrap();
        let pages = crawler
            .crawl(&["http://127.0.0.1:1/unreachable".to_string()], 1)
            .await;
        assert!(pages.is_empty());
    }
}
