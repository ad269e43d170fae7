//! Run orchestration.
//!
//! Session → per-viewport extraction → reconciliation → icon normalization
//! → stylesheet collection → per-region CSS pipeline → emission. Only launch
//! and write failures fail the run; everything else degrades to placeholders.

use crate::css::collect::{CollectedCss, Collector};
use crate::css::{CssDocument, CssPipeline};
use crate::emit::{self, EmittedUnit};
use crate::extract::{self, CanonicalFragment};
use crate::fallback::{self, PlaceholderUnit, UnitOutcome};
use crate::{icons, Backend, Error, ExtractionTarget, HarvestConfig, Region, Result, Session};
use chrono::{DateTime, SecondsFormat, Utc};
use log::{error, info, warn};
use serde::Serialize;

/// Summary of a finished run
#[derive(Debug, Default)]
pub struct RunReport {
    /// One outcome per region, in [`Region::ALL`] order; empty if the run
    /// stopped before emission
    pub outcomes: Vec<UnitOutcome>,
    /// Icon identifiers substituted across all regions
    pub icons_substituted: Vec<&'static str>,
    pub stylesheet_written: bool,
    /// The error that failed the run, if any
    pub fatal: Option<Error>,
}

impl RunReport {
    fn failed(err: Error) -> Self {
        Self { fatal: Some(err), ..Default::default() }
    }

    /// 0 for a completed run (placeholders included), 1 for a failed one
    pub fn exit_code(&self) -> i32 {
        if self.fatal.is_some() {
            1
        } else {
            0
        }
    }

    pub fn outcome(&self, region: Region) -> Option<&UnitOutcome> {
        self.outcomes.iter().find(|o| o.region() == region)
    }

    pub fn live_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_live()).count()
    }
}

struct Harvest {
    fragments: Vec<CanonicalFragment>,
    collected: CollectedCss,
}

/// Run a full harvest with backend `B`.
pub async fn run<B>(config: &HarvestConfig) -> RunReport
where
    B: Backend + 'static,
    B::Page: 'static,
{
    let target = match config.target() {
        Ok(target) => target,
        Err(e) => {
            error!("{}", e);
            return RunReport::failed(e);
        }
    };
    info!("Harvesting {}", target.url);

    if let Err(e) = fallback::ensure_placeholders(&config.output, &target.url) {
        error!("{}", e);
        return RunReport::failed(e);
    }

    let generated_at = Utc::now();
    let mut report = RunReport::default();
    let mut dump = DebugReport::new(&target.url, &generated_at);

    let sections = match harvest::<B>(config, &target).await {
        Ok(harvest) => {
            dump.record_sources(&harvest.collected);
            assemble(config, &target, &harvest, generated_at, &mut report, &mut dump)
        }
        Err(err) => {
            error!("Harvest failed, emitting placeholders for every region: {}", err);
            let reason = err.to_string();
            for region in Region::ALL {
                let placeholder = PlaceholderUnit::new(region, reason.clone(), &target.url, generated_at);
                dump.record_placeholder(region, &reason);
                report.outcomes.push(UnitOutcome::Placeholder(placeholder));
            }
            if err.is_fatal() {
                report.fatal = Some(err);
            }
            Region::ALL.iter().map(|r| (*r, None)).collect()
        }
    };

    match persist(config, &report.outcomes, &sections, &target.url, &generated_at) {
        Ok(()) => report.stylesheet_written = true,
        Err(e) => {
            error!("{}", e);
            report.fatal.get_or_insert(e);
        }
    }

    if let Some(dir) = config.debug_dir.as_deref() {
        dump.write(dir);
    }

    info!(
        "Run finished: {}/{} live units, exit code {}",
        report.live_count(),
        report.outcomes.len(),
        report.exit_code()
    );
    report
}

async fn harvest<B>(config: &HarvestConfig, target: &ExtractionTarget) -> Result<Harvest>
where
    B: Backend + 'static,
    B::Page: 'static,
{
    let session = Session::open::<B>(config.clone()).await?;
    let result = harvest_in(&session, config, target).await;

    // The engine is shut down on the failure path too.
    if let Err(e) = session.close().await {
        warn!("Failed to close browser session: {}", e);
    }
    result
}

async fn harvest_in(session: &Session, config: &HarvestConfig, target: &ExtractionTarget) -> Result<Harvest> {
    let mut raws = Vec::new();
    for viewport in &target.viewports {
        let url = target.url.clone();
        let viewport = viewport.clone();
        let timing = config.timing.clone();
        let captured = session
            .with_page(move |page| extract::extract_viewport(page, &url, &viewport, &timing))
            .await?;
        raws.extend(captured);
    }

    let fragments = Region::ALL
        .iter()
        .map(|region| extract::reconcile(*region, target, &raws))
        .collect();

    let primary = target
        .primary()
        .cloned()
        .ok_or_else(|| Error::ConfigError("no primary viewport".into()))?;
    let url = target.url.clone();
    let timing = config.timing.clone();
    let (html, location) = session
        .with_page(move |page| extract::capture_document(page, &url, &primary, &timing))
        .await?;

    let collector = Collector::new(
        config.timing.fetch_timeout,
        &config.user_agent,
        config.stylesheet_fetch_concurrency,
    )?;
    let collected = collector.collect(&html, &location).await?;

    Ok(Harvest { fragments, collected })
}

fn assemble(
    config: &HarvestConfig,
    target: &ExtractionTarget,
    harvest: &Harvest,
    generated_at: DateTime<Utc>,
    report: &mut RunReport,
    dump: &mut DebugReport,
) -> Vec<(Region, Option<CssDocument>)> {
    let pipeline = CssPipeline::new(&config.purge, config.debug_dir.as_deref());
    let mut sections = Vec::with_capacity(harvest.fragments.len());

    for fragment in &harvest.fragments {
        let region = fragment.region;
        match &fragment.markup {
            Some(markup) => {
                let normalized = icons::normalize_icons(markup);
                let css = pipeline.transform(
                    &harvest.collected.document,
                    &normalized.markup,
                    &region.namespace(),
                    region.element_selector(),
                );

                dump.record_live(fragment, &normalized.substituted, css.len());
                for &icon in &normalized.substituted {
                    if !report.icons_substituted.contains(&icon) {
                        report.icons_substituted.push(icon);
                    }
                }

                let unit = EmittedUnit::new(region, normalized.markup, &target.url, generated_at);
                report.outcomes.push(UnitOutcome::Live(unit));
                sections.push((region, Some(css)));
            }
            None => {
                let reason = Error::ExtractionMiss(region).to_string();
                warn!("{}; emitting placeholder", reason);
                dump.record_placeholder(region, &reason);
                report
                    .outcomes
                    .push(UnitOutcome::Placeholder(PlaceholderUnit::new(region, reason, &target.url, generated_at)));
                sections.push((region, None));
            }
        }
    }
    sections
}

/// Write units, manifest and stylesheet. Regions without live content get
/// a placeholder unit and a placeholder stylesheet section.
fn persist(
    config: &HarvestConfig,
    outcomes: &[UnitOutcome],
    sections: &[(Region, Option<CssDocument>)],
    source_url: &str,
    generated_at: &DateTime<Utc>,
) -> Result<()> {
    for outcome in outcomes {
        fallback::write_unit(&config.output, outcome)?;
    }
    emit::write_file(&config.output.manifest_path(), &emit::render_manifest())?;
    emit::write_file(
        &config.output.stylesheet_path,
        &emit::render_stylesheet(sections, source_url, generated_at),
    )
}

/// `harvest-report.json` written next to the stage dumps
#[derive(Debug, Serialize)]
struct DebugReport {
    target_url: String,
    generated_at: String,
    regions: Vec<RegionEntry>,
    stylesheets: Vec<SourceEntry>,
}

#[derive(Debug, Serialize)]
struct RegionEntry {
    region: &'static str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_viewport: Option<String>,
    icons: Vec<&'static str>,
    css_bytes: usize,
}

#[derive(Debug, Serialize)]
struct SourceEntry {
    source: String,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl DebugReport {
    fn new(target_url: &str, generated_at: &DateTime<Utc>) -> Self {
        Self {
            target_url: target_url.to_string(),
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            regions: Vec::new(),
            stylesheets: Vec::new(),
        }
    }

    fn record_sources(&mut self, collected: &CollectedCss) {
        self.stylesheets = collected
            .sources
            .iter()
            .map(|s| SourceEntry {
                source: s.reference.provenance(),
                ok: s.content.is_ok(),
                error: s.content.as_ref().err().map(|e| e.to_string()),
            })
            .collect();
    }

    fn record_live(&mut self, fragment: &CanonicalFragment, icons: &[&'static str], css_bytes: usize) {
        self.regions.push(RegionEntry {
            region: fragment.region.name(),
            status: "live",
            reason: None,
            source_viewport: fragment.source_viewport.clone(),
            icons: icons.to_vec(),
            css_bytes,
        });
    }

    fn record_placeholder(&mut self, region: Region, reason: &str) {
        self.regions.push(RegionEntry {
            region: region.name(),
            status: "placeholder",
            reason: Some(reason.to_string()),
            source_viewport: None,
            icons: Vec::new(),
            css_bytes: 0,
        });
    }

    fn write(&self, dir: &std::path::Path) {
        let path = dir.join("harvest-report.json");
        let written = serde_json::to_string_pretty(self)
            .map_err(|e| e.to_string())
            .and_then(|json| {
                std::fs::create_dir_all(dir)
                    .and_then(|_| std::fs::write(&path, json))
                    .map_err(|e| e.to_string())
            });
        if let Err(e) = written {
            warn!("Failed to write {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_follows_fatal_errors() {
        assert_eq!(RunReport::default().exit_code(), 0);
        assert_eq!(RunReport::failed(Error::LaunchError("x".into())).exit_code(), 1);
    }

    #[cfg(feature = "simple")]
    #[tokio::test]
    async fn invalid_config_fails_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarvestConfig {
            base_url: "not a url".into(),
            output: crate::OutputLayout {
                components_dir: dir.path().join("external"),
                stylesheet_path: dir.path().join("auto.css"),
            },
            ..Default::default()
        };

        let report = run::<crate::simple::SimpleBackend>(&config).await;
        assert_eq!(report.exit_code(), 1);
        assert!(matches!(report.fatal, Some(Error::ConfigError(_))));
        assert!(!dir.path().join("external").exists());
    }

    #[test]
    fn debug_report_serializes_entries() {
        let mut dump = DebugReport::new("https://s/", &Utc::now());
        dump.record_placeholder(Region::Footer, "No footer element found at any viewport");
        let json = serde_json::to_value(&dump).unwrap();
        assert_eq!(json["regions"][0]["status"], "placeholder");
        assert_eq!(json["regions"][0]["region"], "Footer");
        assert!(json["regions"][0].get("source_viewport").is_none());
    }
}
