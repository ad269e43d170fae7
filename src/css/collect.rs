//! Stylesheet discovery and retrieval.
//!
//! Sources are the page's `<link rel="stylesheet">` elements, `@import`
//! statements inside its `<style>` elements, and the inline style bodies
//! themselves, in document order. Remote sheets are fetched concurrently;
//! one failing fetch only removes that sheet from the result.
//!
//! `@import`s inside fetched sheets are removed from their bodies and
//! followed up to [`MAX_IMPORT_DEPTH`] levels, each URL once. An imported
//! sheet is placed ahead of the sheet importing it.

use super::syntax::{AtBody, Rule, Stylesheet};
use super::CssDocument;
use crate::{Error, Result};
use cssparser::{ParseError, Parser, ParserInput, Token};
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

/// A stylesheet reference found in the rendered document
#[derive(Debug, Clone, PartialEq)]
pub enum StylesheetRef {
    Link(String),
    Import(String),
    /// Body of the n-th `<style>` element (1-based), `@import`s removed
    Inline { index: usize, css: String },
}

impl StylesheetRef {
    /// Comment placed ahead of the sheet in the concatenated output
    pub fn provenance(&self) -> String {
        match self {
            StylesheetRef::Link(url) => format!("/* CSS from {} */", url),
            StylesheetRef::Import(url) => format!("/* CSS from @import {} */", url),
            StylesheetRef::Inline { index, .. } => format!("/* CSS from inline <style> #{} */", index),
        }
    }

    fn remote_url(&self) -> Option<&str> {
        match self {
            StylesheetRef::Link(url) | StylesheetRef::Import(url) => Some(url),
            StylesheetRef::Inline { .. } => None,
        }
    }
}

/// How many levels of `@import` inside fetched sheets are followed
pub const MAX_IMPORT_DEPTH: usize = 4;

/// A reference together with its retrieved text
#[derive(Debug)]
pub struct StylesheetSource {
    pub reference: StylesheetRef,
    pub content: Result<String>,
}

type ParseResult<'i, T> = std::result::Result<T, ParseError<'i, ()>>;

fn quoted_argument<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, String> {
    let token = p.next()?.clone();
    match token {
        Token::QuotedString(s) => Ok(s.to_string()),
        other => Err(p.new_unexpected_token_error(other)),
    }
}

fn import_target<'i>(p: &mut Parser<'i, '_>) -> ParseResult<'i, String> {
    let token = p.next()?.clone();
    match token {
        Token::QuotedString(s) | Token::UnquotedUrl(s) => Ok(s.to_string()),
        Token::Function(ref name) if name.eq_ignore_ascii_case("url") => {
            p.parse_nested_block(|inner| quoted_argument(inner))
        }
        other => Err(p.new_unexpected_token_error(other)),
    }
}

/// URL named by an `@import` prelude (`url(x.css) screen`, `"x.css"`)
pub fn import_url(prelude: &str) -> Option<String> {
    let mut input = ParserInput::new(prelude);
    let mut parser = Parser::new(&mut input);
    import_target(&mut parser).ok()
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    match base.join(href.trim()) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.to_string()),
        Ok(url) => {
            debug!("Skipping non-HTTP stylesheet {}", url);
            None
        }
        Err(e) => {
            warn!("Skipping unresolvable stylesheet reference '{}': {}", href, e);
            None
        }
    }
}

/// Remove top-level `@import` statements, returning their preludes.
fn strip_imports(sheet: &mut Stylesheet) -> Vec<String> {
    let mut preludes = Vec::new();
    sheet.rules.retain(|rule| match rule {
        Rule::At(at) if at.name == "import" && at.body == AtBody::Statement => {
            preludes.push(at.prelude.clone());
            false
        }
        _ => true,
    });
    preludes
}

fn resolve_import(base: &Url, prelude: &str) -> Option<String> {
    let url = import_url(prelude).and_then(|href| resolve(base, &href));
    if url.is_none() {
        warn!("Ignoring @import with no usable URL: {}", prelude);
    }
    url
}

/// Remove the `@import`s of a fetched sheet, returning their URLs resolved
/// against the sheet's own location. `css` is only rewritten when it had any.
pub fn take_imports(css: &mut String, base: &Url) -> Vec<String> {
    if !css.to_ascii_lowercase().contains("@import") {
        return Vec::new();
    }
    let mut sheet = Stylesheet::parse(css);
    let preludes = strip_imports(&mut sheet);
    if preludes.is_empty() {
        return Vec::new();
    }
    *css = sheet.to_css();
    preludes.iter().filter_map(|p| resolve_import(base, p)).collect()
}

/// Find every stylesheet the document references, in document order.
///
/// Remote URLs are resolved against `page_url` and deduplicated, keeping
/// the first occurrence.
pub fn discover(document_html: &str, page_url: &str) -> Result<Vec<StylesheetRef>> {
    let base = Url::parse(page_url).map_err(|e| Error::Other(format!("invalid page URL '{}': {}", page_url, e)))?;
    let selector = Selector::parse(r#"link[rel~="stylesheet"][href], style"#)
        .map_err(|e| Error::Other(format!("invalid stylesheet selector: {:?}", e)))?;

    let document = Html::parse_document(document_html);
    let mut refs = Vec::new();
    let mut seen = HashSet::new();
    let mut inline_count = 0;

    let mut push_remote = |refs: &mut Vec<StylesheetRef>, r: StylesheetRef| {
        if let Some(url) = r.remote_url() {
            if seen.insert(url.to_string()) {
                refs.push(r);
            }
        }
    };

    for el in document.select(&selector) {
        if el.value().name() == "link" {
            if let Some(url) = el.value().attr("href").and_then(|href| resolve(&base, href)) {
                push_remote(&mut refs, StylesheetRef::Link(url));
            }
            continue;
        }

        inline_count += 1;
        let body: String = el.text().collect();
        let mut sheet = Stylesheet::parse(&body);
        for prelude in strip_imports(&mut sheet) {
            if let Some(url) = resolve_import(&base, &prelude) {
                push_remote(&mut refs, StylesheetRef::Import(url));
            }
        }
        if !sheet.rules.is_empty() {
            refs.push(StylesheetRef::Inline { index: inline_count, css: sheet.to_css() });
        }
    }

    Ok(refs)
}

/// Concurrent stylesheet fetcher
pub struct Collector {
    client: reqwest::Client,
    concurrency: usize,
}

impl Collector {
    pub fn new(timeout: Duration, user_agent: &str, concurrency: usize) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, concurrency: concurrency.max(1) })
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let fail = |reason: String| Error::FetchError { url: url.to_string(), reason };

        let resp = self.client.get(url).send().await.map_err(|e| fail(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(fail(format!("HTTP {}", status)));
        }
        resp.text().await.map_err(|e| fail(e.to_string()))
    }

    /// Retrieve every reference; results keep the input order.
    pub async fn fetch_all(&self, refs: Vec<StylesheetRef>) -> Vec<StylesheetSource> {
        stream::iter(refs)
            .map(|reference| async move {
                let content = match &reference {
                    StylesheetRef::Inline { css, .. } => Ok(css.clone()),
                    StylesheetRef::Link(url) | StylesheetRef::Import(url) => self.fetch(url).await,
                };
                if let Err(e) = &content {
                    warn!("{}", e);
                }
                StylesheetSource { reference, content }
            })
            .buffered(self.concurrency)
            .collect()
            .await
    }

    /// Follow the `@import`s of fetched sheets, placing each imported sheet
    /// ahead of its importer. URLs already in `seen` are not fetched again.
    fn expand_imports<'a>(
        &'a self,
        sources: Vec<StylesheetSource>,
        seen: &'a mut HashSet<String>,
        depth: usize,
    ) -> BoxFuture<'a, Vec<StylesheetSource>> {
        async move {
            let mut out = Vec::with_capacity(sources.len());
            for mut source in sources {
                let imports = match (&source.reference, &mut source.content) {
                    (StylesheetRef::Link(url) | StylesheetRef::Import(url), Ok(css)) => match Url::parse(url) {
                        Ok(base) => take_imports(css, &base),
                        Err(_) => Vec::new(),
                    },
                    _ => Vec::new(),
                };

                let fresh: Vec<StylesheetRef> = imports
                    .into_iter()
                    .filter(|url| seen.insert(url.clone()))
                    .map(StylesheetRef::Import)
                    .collect();
                if !fresh.is_empty() {
                    if depth == 0 {
                        warn!("Not following {} nested @import(s): depth limit reached", fresh.len());
                    } else {
                        debug!("Following {} @import(s) of {}", fresh.len(), source.reference.provenance());
                        let fetched = self.fetch_all(fresh).await;
                        out.extend(self.expand_imports(fetched, seen, depth - 1).await);
                    }
                }
                out.push(source);
            }
            out
        }
        .boxed()
    }

    /// Discover, fetch and concatenate every stylesheet of a rendered document.
    pub async fn collect(&self, document_html: &str, page_url: &str) -> Result<CollectedCss> {
        let refs = discover(document_html, page_url)?;
        info!("Found {} stylesheet sources", refs.len());

        let mut seen: HashSet<String> = refs.iter().filter_map(|r| r.remote_url().map(String::from)).collect();
        let fetched = self.fetch_all(refs).await;
        let sources = self.expand_imports(fetched, &mut seen, MAX_IMPORT_DEPTH).await;
        let document = concatenate(&sources);
        let ok = sources.iter().filter(|s| s.content.is_ok()).count();
        info!("Collected {} bytes of CSS from {}/{} sources", document.len(), ok, sources.len());
        Ok(CollectedCss { document, sources })
    }
}

/// Concatenated CSS plus the per-source results it was built from
#[derive(Debug)]
pub struct CollectedCss {
    pub document: CssDocument,
    pub sources: Vec<StylesheetSource>,
}

/// Join the retrieved sheets in order, each behind its provenance comment.
/// Failed retrievals are skipped.
pub fn concatenate(sources: &[StylesheetSource]) -> CssDocument {
    let mut out = String::new();
    for source in sources {
        if let Ok(css) = &source.content {
            out.push_str(&source.reference.provenance());
            out.push('\n');
            out.push_str(css);
            if !css.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
    }
    CssDocument::new(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_url_forms() {
        assert_eq!(import_url("url(\"/a.css\") screen").as_deref(), Some("/a.css"));
        assert_eq!(import_url("url(b.css)").as_deref(), Some("b.css"));
        assert_eq!(import_url("'c.css' print").as_deref(), Some("c.css"));
        assert_eq!(import_url("screen"), None);
    }

    #[test]
    fn discovers_in_document_order() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/a.css">
            <link rel="preload" href="/skip.css">
            <link rel="alternate stylesheet" href="b.css">
            <style>@import url("/c.css"); @import 'd.css' screen; .x { color: red }</style>
            <link rel="stylesheet" href="https://site.test/a.css">
            <style>@import "/c.css";</style>
            </head><body></body></html>"#;

        let refs = discover(html, "https://site.test/dir/page").unwrap();
        assert_eq!(
            refs,
            vec![
                StylesheetRef::Link("https://site.test/a.css".into()),
                StylesheetRef::Link("https://site.test/dir/b.css".into()),
                StylesheetRef::Import("https://site.test/c.css".into()),
                StylesheetRef::Import("https://site.test/dir/d.css".into()),
                StylesheetRef::Inline { index: 1, css: ".x {\n  color: red;\n}\n".into() },
            ]
        );
    }

    #[test]
    fn fetched_sheet_imports_are_taken_out() {
        let base = Url::parse("https://cdn.test/css/site.css").unwrap();

        let mut css = String::from("@import url(\"base.css\") screen;\n@IMPORT '/abs.css';\n.a { color: red }");
        let urls = take_imports(&mut css, &base);
        assert_eq!(urls, vec!["https://cdn.test/css/base.css", "https://cdn.test/abs.css"]);
        assert_eq!(css, ".a {\n  color: red;\n}\n");

        // Sheets without imports keep their exact text
        let mut plain = String::from(".b{top:0}");
        assert!(take_imports(&mut plain, &base).is_empty());
        assert_eq!(plain, ".b{top:0}");
    }

    #[test]
    fn concatenation_labels_sources_and_skips_failures() {
        let sources = vec![
            StylesheetSource { reference: StylesheetRef::Link("https://s/a.css".into()), content: Ok(".a{}".into()) },
            StylesheetSource {
                reference: StylesheetRef::Link("https://s/missing.css".into()),
                content: Err(Error::FetchError { url: "https://s/missing.css".into(), reason: "HTTP 404".into() }),
            },
            StylesheetSource {
                reference: StylesheetRef::Inline { index: 2, css: ".b {}\n".into() },
                content: Ok(".b {}\n".into()),
            },
        ];
        let doc = concatenate(&sources);
        assert_eq!(
            doc.as_str(),
            "/* CSS from https://s/a.css */\n.a{}\n\n/* CSS from inline <style> #2 */\n.b {}\n\n"
        );
    }
}
