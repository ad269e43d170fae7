//! Fragment Harvest
//!
//! Build-time extraction of a live page's `<header>` and `<footer>` into
//! self-contained, embeddable UI units plus one scoped stylesheet.
//!
//! # Pipeline
//!
//! - **Session**: one headless rendering engine per run, pages handed out as
//!   scoped acquisitions (see [`session::Session`])
//! - **Extraction**: every configured viewport is rendered and the first
//!   `header`/`footer` element captured; the primary (desktop) capture wins
//! - **CSS**: every stylesheet reachable from the page is collected and run
//!   through repair, clean, purge and prefix stages once per region
//! - **Emission**: units, a barrel manifest and one stylesheet are written;
//!   anything that fails degrades to an inert placeholder unit
//!
//! # Example
//!
//! ```no_run
//! use fragment_harvest::{HarvestConfig, pipeline};
//!
//! # async fn demo() {
//! let config = HarvestConfig {
//!     base_url: "https://example.com".to_string(),
//!     ..Default::default()
//! };
//!
//! # #[cfg(feature = "cdp")]
//! let report = pipeline::run::<fragment_harvest::cdp::CdpBackend>(&config).await;
//! # #[cfg(feature = "cdp")]
//! std::process::exit(report.exit_code());
//! # }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

pub mod error;
pub use error::{Error, Result};

#[cfg(feature = "cdp")]
pub mod cdp;

// Static HTTP engine (no JS): CI, tests, and hosts without Chrome
#[cfg(feature = "simple")]
pub mod simple;

pub mod css;
pub mod emit;
pub mod extract;
pub mod fallback;
pub mod icons;
pub mod pipeline;
pub mod session;

pub use fallback::UnitOutcome;
pub use pipeline::RunReport;
pub use session::Session;

/// A page region harvested into its own unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Header,
    Footer,
}

impl Region {
    /// Every region, in emission order
    pub const ALL: [Region; 2] = [Region::Header, Region::Footer];

    /// Display name used in provenance comments ("Header")
    pub fn name(self) -> &'static str {
        match self {
            Region::Header => "Header",
            Region::Footer => "Footer",
        }
    }

    /// Element selector queried in the rendered document
    pub fn element_selector(self) -> &'static str {
        match self {
            Region::Header => "header",
            Region::Footer => "footer",
        }
    }

    /// Class of the container element the unit renders into
    pub fn container_class(self) -> &'static str {
        match self {
            Region::Header => "external-header-container",
            Region::Footer => "external-footer-container",
        }
    }

    /// Selector every CSS rule for this region is scoped under
    pub fn namespace(self) -> String {
        format!(".{}", self.container_class())
    }

    /// Exported component name
    pub fn component_name(self) -> &'static str {
        match self {
            Region::Header => "ExternalHeader",
            Region::Footer => "ExternalFooter",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_selector())
    }
}

/// Viewport dimensions plus the label used in logs and reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub label: String,
}

impl Viewport {
    pub fn new(width: u32, height: u32, label: impl Into<String>) -> Self {
        Self { width, height, label: label.into() }
    }

    pub fn desktop() -> Self {
        Self::new(1920, 1080, "DESKTOP")
    }

    pub fn mobile() -> Self {
        Self::new(375, 667, "MOBILE")
    }
}

/// The page to harvest and the ordered viewports to render it under.
///
/// The first viewport is the primary one: its captures take precedence
/// during reconciliation and it is used for stylesheet discovery.
#[derive(Debug, Clone)]
pub struct ExtractionTarget {
    pub url: String,
    pub viewports: Vec<Viewport>,
}

impl ExtractionTarget {
    pub fn primary(&self) -> Option<&Viewport> {
        self.viewports.first()
    }
}

/// Timeouts and stabilization delays
#[derive(Debug, Clone)]
pub struct Timing {
    /// Upper bound for navigation plus network-idle wait
    pub navigation_timeout: Duration,
    /// How long the network must stay quiet before the page counts as loaded
    pub network_idle: Duration,
    /// Interval between network-idle probes
    pub poll_interval: Duration,
    /// Extra delay after network idle before capturing fragments
    pub settle_delay: Duration,
    /// Extra delay after network idle before discovering stylesheets
    pub collect_settle_delay: Duration,
    /// Timeout for each stylesheet fetch
    pub fetch_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            navigation_timeout: Duration::from_millis(30_000),
            network_idle: Duration::from_millis(500),
            poll_interval: Duration::from_millis(100),
            settle_delay: Duration::from_millis(3_000),
            collect_settle_delay: Duration::from_millis(2_000),
            fetch_timeout: Duration::from_millis(10_000),
        }
    }
}

/// Where emitted files land
#[derive(Debug, Clone)]
pub struct OutputLayout {
    /// Directory receiving the unit files and the barrel manifest
    pub components_dir: PathBuf,
    /// Consolidated stylesheet path
    pub stylesheet_path: PathBuf,
}

impl OutputLayout {
    pub fn unit_path(&self, region: Region) -> PathBuf {
        self.components_dir.join(format!("{}.tsx", region.component_name()))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.components_dir.join("index.ts")
    }
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            components_dir: PathBuf::from("src/external"),
            stylesheet_path: PathBuf::from("src/styles/auto-generated.css"),
        }
    }
}

/// Configuration for a harvest run
///
/// Passed explicitly to every stage; nothing is kept in global state.
///
/// # Examples
///
/// ```
/// let cfg = fragment_harvest::HarvestConfig::default();
/// assert_eq!(cfg.viewports[0].label, "DESKTOP");
/// ```
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Base URL of the site to harvest
    pub base_url: String,
    /// Path (and query) joined onto `base_url`
    pub target_path: String,
    /// Ordered viewports; the first is primary
    pub viewports: Vec<Viewport>,
    /// User agent string sent by the browser and the stylesheet fetcher
    pub user_agent: String,
    pub timing: Timing,
    /// Run the browser inside its sandbox (containers usually need `false`)
    pub sandbox: bool,
    /// Maximum stylesheet fetches in flight
    pub stylesheet_fetch_concurrency: usize,
    pub output: OutputLayout,
    /// When set, every CSS stage output is dumped here
    pub debug_dir: Option<PathBuf>,
    pub purge: css::purge::PurgeOptions,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            target_path: "/".to_string(),
            viewports: vec![Viewport::desktop(), Viewport::mobile()],
            user_agent: "Mozilla/5.0 (compatible; FragmentHarvest/1.0)".to_string(),
            timing: Timing::default(),
            sandbox: true,
            stylesheet_fetch_concurrency: num_cpus::get().max(1) * 4,
            output: OutputLayout::default(),
            debug_dir: None,
            purge: css::purge::PurgeOptions::default(),
        }
    }
}

impl HarvestConfig {
    /// Check the configuration and build the extraction target from it.
    pub fn target(&self) -> Result<ExtractionTarget> {
        let base = url::Url::parse(self.base_url.trim())
            .map_err(|e| Error::ConfigError(format!("invalid base URL '{}': {}", self.base_url, e)))?;
        let url = base
            .join(&self.target_path)
            .map_err(|e| Error::ConfigError(format!("invalid target path '{}': {}", self.target_path, e)))?;

        if self.viewports.is_empty() {
            return Err(Error::ConfigError("at least one viewport is required".into()));
        }
        if let Some(v) = self.viewports.iter().find(|v| v.width == 0 || v.height == 0) {
            return Err(Error::ConfigError(format!("viewport {} has a zero dimension", v.label)));
        }

        Ok(ExtractionTarget { url: url.to_string(), viewports: self.viewports.clone() })
    }

    /// Reject a configuration no run could succeed with.
    pub fn validate(&self) -> Result<()> {
        self.target().map(|_| ())
    }
}

/// A page inside the rendering engine
///
/// Backends implement navigation and evaluation; element queries, document
/// capture and the network-idle wait are derived from `evaluate` unless a
/// backend has a cheaper native way.
pub trait PageHandle {
    /// Resize the page's viewport
    fn set_viewport(&mut self, viewport: &Viewport) -> Result<()>;

    /// Navigate and wait for the load event, bounded by `timeout`
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<()>;

    /// Evaluate an expression in the page and return its JSON value
    fn evaluate(&mut self, script: &str) -> Result<serde_json::Value>;

    /// URL of the currently loaded document (after redirects)
    fn current_url(&self) -> String;

    /// Close the page. Called exactly once by the session.
    fn close(&mut self) -> Result<()>;

    /// Outer markup of the first element matching `selector`, if any
    fn outer_html(&mut self, selector: &str) -> Result<Option<String>> {
        let literal = serde_json::to_string(selector).map_err(|e| Error::ScriptError(e.to_string()))?;
        let script = format!(
            "(function() {{ const el = document.querySelector({}); return el ? el.outerHTML : null; }})()",
            literal
        );
        match self.evaluate(&script)? {
            serde_json::Value::String(s) => Ok(Some(s)),
            _ => Ok(None),
        }
    }

    /// Serialized markup of the whole rendered document
    fn document_html(&mut self) -> Result<String> {
        match self.evaluate("document.documentElement ? document.documentElement.outerHTML : ''")? {
            serde_json::Value::String(s) => Ok(s),
            other => Err(Error::ScriptError(format!("unexpected document value: {}", other))),
        }
    }

    /// Wait until no new resource has completed for `idle`, or fail after `timeout`.
    fn wait_for_network_idle(&mut self, idle: Duration, poll: Duration, timeout: Duration) -> Result<()> {
        const PROBE: &str = "(function() { try { return performance.getEntriesByType('resource').length; } catch (e) { return -1; } })()";

        let deadline = Instant::now() + timeout;
        let mut last_count: Option<i64> = None;
        let mut quiet_since = Instant::now();

        loop {
            let count = self.evaluate(PROBE)?.as_i64();
            if count != last_count {
                last_count = count;
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= idle {
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(Error::NavigationError(format!(
                    "network did not go idle within {}ms",
                    timeout.as_millis()
                )));
            }
            std::thread::sleep(poll);
        }
    }
}

/// A rendering engine that can hand out pages
///
/// Backends are created and driven on the session's worker thread, so they
/// need not be `Send`.
pub trait Backend: Sized {
    type Page: PageHandle;

    /// Start the engine process
    fn launch(config: &HarvestConfig) -> Result<Self>;

    /// Open a fresh page
    fn new_page(&mut self) -> Result<Self::Page>;

    /// Shut the engine down
    fn close(self) -> Result<()>;
}
