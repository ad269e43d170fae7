//! Fallback Generator.
//!
//! A region's result is a [`UnitOutcome`]: either live content or an inert
//! placeholder. Each run writes the outcome it decided on, so a region that
//! vanished from the page stops rendering. Startup gap-filling is the only
//! step that leaves existing files alone.

use crate::css::CssDocument;
use crate::emit::{self, EmittedUnit, LIVE_STATUS};
use crate::{OutputLayout, Region, Result};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Inert unit emitted when a region has no usable content
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceholderUnit {
    pub region: Region,
    /// Why live content is unavailable; stated in the provenance comment
    pub reason: String,
    pub source_url: String,
    pub generated_at: DateTime<Utc>,
}

impl PlaceholderUnit {
    pub fn new(region: Region, reason: impl Into<String>, source_url: &str, generated_at: DateTime<Utc>) -> Self {
        Self { region, reason: reason.into(), source_url: source_url.to_string(), generated_at }
    }

    pub fn render(&self) -> String {
        emit::render_placeholder(self.region, &self.reason, &self.source_url, &self.generated_at)
    }
}

/// Result of harvesting one region
#[derive(Debug, Clone, PartialEq)]
pub enum UnitOutcome {
    Live(EmittedUnit),
    Placeholder(PlaceholderUnit),
}

impl UnitOutcome {
    pub fn region(&self) -> Region {
        match self {
            UnitOutcome::Live(unit) => unit.region,
            UnitOutcome::Placeholder(p) => p.region,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, UnitOutcome::Live(_))
    }

    /// Embedded markup of a live unit
    pub fn markup(&self) -> Option<&str> {
        match self {
            UnitOutcome::Live(unit) => Some(&unit.markup),
            UnitOutcome::Placeholder(_) => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            UnitOutcome::Live(unit) => unit.render(),
            UnitOutcome::Placeholder(p) => p.render(),
        }
    }
}

/// Whether the file at `path` holds a unit rendered from live content
pub fn holds_live_unit(path: &Path) -> bool {
    fs::read_to_string(path)
        .map(|text| text.lines().any(|line| line == LIVE_STATUS))
        .unwrap_or(false)
}

/// Persist `outcome` under `layout`, replacing whatever unit was there.
pub fn write_unit(layout: &OutputLayout, outcome: &UnitOutcome) -> Result<()> {
    let path = layout.unit_path(outcome.region());

    if let UnitOutcome::Placeholder(p) = outcome {
        if holds_live_unit(&path) {
            warn!(
                "Replacing previously generated {} at {} with a placeholder ({})",
                p.region.name(),
                path.display(),
                p.reason
            );
        } else {
            info!("Writing {} placeholder: {}", p.region.name(), p.reason);
        }
    }

    emit::write_file(&path, &outcome.render())
}

/// Create any unit file, manifest or stylesheet that does not exist yet, so
/// importers never see a missing module even if the run dies midway.
///
/// Returns the paths created.
pub fn ensure_placeholders(layout: &OutputLayout, source_url: &str) -> Result<Vec<PathBuf>> {
    let now = Utc::now();
    let mut created = Vec::new();

    for region in Region::ALL {
        let path = layout.unit_path(region);
        if path.exists() {
            continue;
        }
        let placeholder = PlaceholderUnit::new(region, "generation pending", source_url, now);
        emit::write_file(&path, &placeholder.render())?;
        created.push(path);
    }

    let manifest = layout.manifest_path();
    if !manifest.exists() {
        emit::write_file(&manifest, &emit::render_manifest())?;
        created.push(manifest);
    }

    let stylesheet = &layout.stylesheet_path;
    if !stylesheet.exists() {
        let sections: Vec<(Region, Option<CssDocument>)> = Region::ALL.iter().map(|r| (*r, None)).collect();
        emit::write_file(stylesheet, &emit::render_stylesheet(&sections, source_url, &now))?;
        created.push(stylesheet.clone());
    }

    if !created.is_empty() {
        info!("Created {} startup placeholder file(s)", created.len());
    }
    Ok(created)
}
