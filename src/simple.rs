//! A lightweight, browser-less backend that fetches HTML over HTTP.
//!
//! No JavaScript runs: the "rendered" document is the server response and
//! every viewport sees the same markup. Useful on hosts without Chrome and
//! for deterministic tests against a local server.

use crate::{Backend, Error, HarvestConfig, PageHandle, Result, Viewport};
use reqwest::blocking::Client;
use scraper::{Html, Selector};
use std::time::Duration;

/// Static HTTP engine
pub struct SimpleBackend {
    client: Client,
}

impl Backend for SimpleBackend {
    type Page = SimplePage;

    fn launch(config: &HarvestConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timing.navigation_timeout)
            .build()
            .map_err(|e| Error::LaunchError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    fn new_page(&mut self) -> Result<SimplePage> {
        Ok(SimplePage {
            client: self.client.clone(),
            last_html: None,
            last_url: None,
            viewport: None,
        })
    }

    fn close(self) -> Result<()> {
        Ok(())
    }
}

/// A fetched document
pub struct SimplePage {
    client: Client,
    last_html: Option<String>,
    last_url: Option<String>,
    viewport: Option<Viewport>,
}

impl SimplePage {
    fn html(&self) -> Result<&str> {
        self.last_html
            .as_deref()
            .ok_or_else(|| Error::NavigationError("no document loaded".into()))
    }
}

impl PageHandle for SimplePage {
    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.viewport = Some(viewport.clone());
        Ok(())
    }

    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .map_err(|e| Error::NavigationError(format!("HTTP GET {} failed: {}", url, e)))?;

        if !resp.status().is_success() {
            return Err(Error::NavigationError(format!("HTTP {} for {}", resp.status(), url)));
        }

        let final_url = resp.url().to_string();
        let body = resp
            .text()
            .map_err(|e| Error::NavigationError(format!("Failed to read response body: {}", e)))?;

        self.last_html = Some(body);
        self.last_url = Some(final_url);
        Ok(())
    }

    fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
        Err(Error::ScriptError("the static backend does not execute JavaScript".into()))
    }

    fn current_url(&self) -> String {
        self.last_url.clone().unwrap_or_default()
    }

    fn close(&mut self) -> Result<()> {
        self.last_html = None;
        Ok(())
    }

    fn outer_html(&mut self, selector: &str) -> Result<Option<String>> {
        let sel = Selector::parse(selector)
            .map_err(|e| Error::ScriptError(format!("invalid selector '{}': {:?}", selector, e)))?;
        let document = Html::parse_document(self.html()?);
        let found = document.select(&sel).next().map(|el| el.html());
        Ok(found)
    }

    fn document_html(&mut self) -> Result<String> {
        Ok(self.html()?.to_string())
    }

    // A plain GET has no trailing network activity.
    fn wait_for_network_idle(&mut self, _idle: Duration, _poll: Duration, _timeout: Duration) -> Result<()> {
        self.html().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_page_queries() {
        // Skip on CI where network may not be available
        if std::env::var("CI").is_ok() {
            return;
        }

        // Start a tiny_http server to serve a simple HTML document
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr();

        std::thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let response = tiny_http::Response::from_string(
                    "<html><body><header class=\"top\"><a href=\"/\">Home</a></header><main>x</main></body></html>",
                );
                let _ = request.respond(response);
            }
        });

        let url = format!("http://{}/", addr);
        let mut backend = SimpleBackend::launch(&HarvestConfig::default()).expect("client");
        let mut page = backend.new_page().unwrap();
        page.navigate(&url, Duration::from_secs(5)).expect("navigate");

        let header = page.outer_html("header").unwrap().expect("header present");
        assert!(header.starts_with("<header class=\"top\">"));
        assert!(header.ends_with("</header>"));
        assert_eq!(page.outer_html("footer").unwrap(), None);
        assert!(page.evaluate("1 + 1").is_err());
        assert!(page.current_url().starts_with("http://"));
        page.close().unwrap();
    }
}
