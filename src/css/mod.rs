//! CSS transform pipeline.
//!
//! Every stage takes a [`CssDocument`] and returns a new one. Stages are run
//! through [`run_stage`], which never fails: a stage error is logged and the
//! stage's input passes through unchanged, so a broken stage degrades the
//! output instead of aborting the run.

pub mod clean;
pub mod collect;
pub mod prefix;
pub mod purge;
pub mod repair;
pub mod syntax;

use crate::Result;
use log::{debug, info, warn};
use std::fmt;
use std::path::Path;

/// Stylesheet text flowing between stages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssDocument {
    text: String,
}

impl CssDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

impl From<String> for CssDocument {
    fn from(text: String) -> Self {
        Self { text }
    }
}

impl From<&str> for CssDocument {
    fn from(text: &str) -> Self {
        Self { text: text.to_string() }
    }
}

impl fmt::Display for CssDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// One transformation step
pub trait Stage {
    /// Short name used in logs and debug dump file names
    fn name(&self) -> &'static str;

    fn apply(&self, input: &CssDocument) -> Result<CssDocument>;
}

/// Run `stage`, falling back to the unchanged input if it fails.
pub fn run_stage(stage: &dyn Stage, input: &CssDocument) -> CssDocument {
    match stage.apply(input) {
        Ok(output) => {
            debug!("CSS {}: {} -> {} bytes", stage.name(), input.len(), output.len());
            output
        }
        Err(e) => {
            warn!("{}; passing input through unchanged", e);
            input.clone()
        }
    }
}

/// Per-region stage sequence: repair, clean, purge, font-face sweep, prefix.
pub struct CssPipeline<'a> {
    pub purge: &'a purge::PurgeOptions,
    /// When set, each stage's output is written here for inspection
    pub debug_dir: Option<&'a Path>,
}

impl<'a> CssPipeline<'a> {
    pub fn new(purge: &'a purge::PurgeOptions, debug_dir: Option<&'a Path>) -> Self {
        Self { purge, debug_dir }
    }

    /// Reduce `raw` to the rules `markup` needs, scoped under `namespace`.
    ///
    /// `label` names the region in logs and dump files.
    pub fn transform(&self, raw: &CssDocument, markup: &str, namespace: &str, label: &str) -> CssDocument {
        let stages: Vec<Box<dyn Stage + '_>> = vec![
            Box::new(repair::Repair),
            Box::new(clean::Clean),
            Box::new(purge::Purge::new(markup, self.purge)),
            Box::new(purge::FontFaceSweep),
            Box::new(prefix::Prefix::new(namespace)),
        ];

        let mut current = raw.clone();
        for (n, stage) in stages.iter().enumerate() {
            current = run_stage(stage.as_ref(), &current);
            self.dump(label, n + 1, stage.name(), &current);
        }

        info!(
            "{} CSS: {} -> {} bytes ({}% smaller)",
            label,
            raw.len(),
            current.len(),
            reduction_percent(raw.len(), current.len())
        );
        current
    }

    fn dump(&self, label: &str, n: usize, stage: &str, doc: &CssDocument) {
        let Some(dir) = self.debug_dir else {
            return;
        };
        let path = dir.join(format!("{}-{}-{}.css", label, n, stage));
        let written = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, doc.as_str()));
        if let Err(e) = written {
            warn!("Failed to write debug dump {}: {}", path.display(), e);
        }
    }
}

pub(crate) fn reduction_percent(before: usize, after: usize) -> u64 {
    if before == 0 {
        return 0;
    }
    (before.saturating_sub(after) as u64 * 100) / before as u64
}
