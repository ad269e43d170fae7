//! Component Emitter.
//!
//! Renders units, the barrel manifest and the consolidated stylesheet, and
//! persists them. Markup is embedded as an opaque template-literal payload.

use crate::css::CssDocument;
use crate::{Error, Region, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use sha2::{Digest, Sha256};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

/// Provenance line identifying a unit rendered from live content
pub const LIVE_STATUS: &str = " * Status: live";

/// What a unit does when it first mounts on the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountBehavior {
    /// Wire the responsive menu helpers and tear them down on unmount
    ResponsiveMenu,
    /// Markup and styling only
    Static,
}

impl MountBehavior {
    pub fn for_region(region: Region) -> Self {
        match region {
            Region::Header => MountBehavior::ResponsiveMenu,
            Region::Footer => MountBehavior::Static,
        }
    }
}

/// A unit rendered from captured markup
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedUnit {
    pub region: Region,
    pub markup: String,
    pub mount: MountBehavior,
    pub generated_at: DateTime<Utc>,
    /// Page the markup was captured from
    pub source_url: String,
}

impl EmittedUnit {
    pub fn new(region: Region, markup: String, source_url: &str, generated_at: DateTime<Utc>) -> Self {
        Self {
            region,
            markup,
            mount: MountBehavior::for_region(region),
            generated_at,
            source_url: source_url.to_string(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::from("'use client';\n\n");
        if self.mount == MountBehavior::ResponsiveMenu {
            out.push_str(RESPONSIVE_MENU_IMPORTS);
        }

        let _ = write!(
            out,
            "/**\n * {name} Component - Auto-generated from {url}\n * Generated on: {ts}\n{status}\n * Markup-SHA256: {digest}\n *\n * WARNING: This component is auto-generated during build.\n * Do not edit manually - changes will be overwritten.\n */\n\n",
            name = self.region.name(),
            url = self.source_url,
            ts = timestamp(&self.generated_at),
            status = LIVE_STATUS,
            digest = markup_digest(&self.markup),
        );

        let _ = writeln!(out, "export default function {}() {{", self.region.component_name());
        let ref_attr = match self.mount {
            MountBehavior::ResponsiveMenu => {
                out.push_str(RESPONSIVE_MENU_EFFECT);
                "\n      ref={containerRef}"
            }
            MountBehavior::Static => "",
        };
        let _ = write!(
            out,
            "  return (\n    <div{ref_attr}\n      className=\"{class}\"\n      dangerouslySetInnerHTML={{{{\n        __html: `{html}`\n      }}}}\n    />\n  );\n}}\n",
            ref_attr = ref_attr,
            class = self.region.container_class(),
            html = escape_template_literal(&self.markup),
        );
        out
    }
}

const RESPONSIVE_MENU_IMPORTS: &str = "import { useEffect, useRef } from 'react';
import {
  initializeResponsiveMenu,
  setupMenuToggle,
  attachMenuListeners
} from '@/utils/externalHeaderUtils';

";

const RESPONSIVE_MENU_EFFECT: &str = "  const containerRef = useRef<HTMLDivElement>(null);

  useEffect(() => {
    if (!containerRef.current) return;

    const nav = containerRef.current.querySelector('.ods-front-header');
    const collapsible = containerRef.current.querySelector('.ods-responsive-menu-collapsible');
    const placeholder = containerRef.current.querySelector('.ods-responsive-menu-placeholder');

    const cleanupResize = initializeResponsiveMenu(nav, collapsible, placeholder);
    const toggleMenu = setupMenuToggle(nav, collapsible, placeholder);

    // Give React a tick to commit the injected markup
    const attachTimer = setTimeout(() => {
      attachMenuListeners(containerRef, toggleMenu);
    }, 100);

    return () => {
      clearTimeout(attachTimer);
      if (cleanupResize) cleanupResize();
    };
  }, []);

";

/// Render the inert unit used when a region has no usable content.
pub fn render_placeholder(region: Region, reason: &str, source_url: &str, generated_at: &DateTime<Utc>) -> String {
    format!(
        "'use client';\n\n/**\n * {name} Component - Auto-generated from {url}\n * Generated on: {ts}\n * Status: placeholder ({reason})\n */\n\nexport default function {component}() {{\n  return null;\n}}\n",
        name = region.name(),
        url = source_url,
        ts = timestamp(generated_at),
        reason = single_line(reason),
        component = region.component_name(),
    )
}

/// Barrel manifest re-exporting every unit under its stable name
pub fn render_manifest() -> String {
    let mut out = String::from("// Auto-generated exports for external components\n");
    for region in Region::ALL {
        let _ = writeln!(out, "export {{ default as {0} }} from './{0}';", region.component_name());
    }
    out
}

/// Consolidated stylesheet; `None` marks a region without live content.
pub fn render_stylesheet(
    sections: &[(Region, Option<CssDocument>)],
    source_url: &str,
    generated_at: &DateTime<Utc>,
) -> String {
    let mut out = String::new();
    let _ = write!(
        out,
        "/**\n * CSS auto-generated from {}\n * Generated on: {}\n *\n * WARNING: This file is auto-generated during build.\n * Do not edit manually - changes will be overwritten.\n */\n",
        source_url,
        timestamp(generated_at)
    );

    for (region, css) in sections {
        let _ = write!(
            out,
            "\n/* ==========================================================================\n   {} AUTO-GENERATED STYLES\n   ========================================================================== */\n\n",
            region.name().to_uppercase()
        );
        match css {
            Some(css) => {
                out.push_str(css.as_str().trim_end());
                out.push('\n');
            }
            None => {
                let _ = writeln!(out, "/* {}: placeholder, no styles emitted */", region.name());
            }
        }
    }
    out
}

/// Escape markup for embedding in a JavaScript template literal.
pub fn escape_template_literal(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    for c in markup.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '`' => out.push_str("\\`"),
            '$' => out.push_str("\\$"),
            _ => out.push(c),
        }
    }
    out
}

pub fn markup_digest(markup: &str) -> String {
    hex::encode(Sha256::digest(markup.as_bytes()))
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

// Reasons end up inside a block comment.
fn single_line(reason: &str) -> String {
    reason.split_whitespace().collect::<Vec<_>>().join(" ").replace("*/", "* /")
}

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &str) -> Result<()> {
    let wrap = |source| Error::WriteError { path: path.to_path_buf(), source };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    fs::write(path, contents).map_err(wrap)?;

    info!("Wrote {} ({} bytes)", path.display(), contents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn header_unit_wires_menu_and_cleans_up() {
        let unit = EmittedUnit::new(Region::Header, "<header>${x} `y` \\z</header>".into(), "https://site.test/", at());
        let tsx = unit.render();

        assert!(tsx.starts_with("'use client';\n\nimport { useEffect, useRef } from 'react';"));
        assert!(tsx.contains("} from '@/utils/externalHeaderUtils';"));
        assert!(tsx.contains(" * Header Component - Auto-generated from https://site.test/"));
        assert!(tsx.contains(" * Generated on: 2024-05-01T12:00:00.000Z"));
        assert!(tsx.contains(LIVE_STATUS));
        assert!(tsx.contains("export default function ExternalHeader() {"));
        assert!(tsx.contains("}, 100);"));
        assert!(tsx.contains("clearTimeout(attachTimer);"));
        assert!(tsx.contains("      ref={containerRef}\n      className=\"external-header-container\""));
        assert!(tsx.contains("__html: `<header>\\${x} \\`y\\` \\\\z</header>`"));
    }

    #[test]
    fn footer_unit_is_static() {
        let tsx = EmittedUnit::new(Region::Footer, "<footer>f</footer>".into(), "https://site.test/", at()).render();
        assert!(!tsx.contains("useEffect"));
        assert!(!tsx.contains("ref="));
        assert!(tsx.contains("    <div\n      className=\"external-footer-container\""));
        assert!(tsx.contains(&format!(" * Markup-SHA256: {}", markup_digest("<footer>f</footer>"))));
    }

    #[test]
    fn placeholder_renders_nothing() {
        let tsx = render_placeholder(Region::Footer, "No footer element\n found */", "https://site.test/", &at());
        assert!(tsx.contains(" * Status: placeholder (No footer element found * /)"));
        assert!(tsx.contains("export default function ExternalFooter() {\n  return null;\n}"));
        assert!(!tsx.contains(LIVE_STATUS));
    }

    #[test]
    fn manifest_exports_both_units() {
        assert_eq!(
            render_manifest(),
            "// Auto-generated exports for external components\nexport { default as ExternalHeader } from './ExternalHeader';\nexport { default as ExternalFooter } from './ExternalFooter';\n"
        );
    }

    #[test]
    fn stylesheet_has_banners_per_region() {
        let css = render_stylesheet(
            &[(Region::Header, Some(CssDocument::new(".external-header-container a {\n  color: red;\n}\n"))), (Region::Footer, None)],
            "https://site.test/",
            &at(),
        );
        let header = css.find("HEADER AUTO-GENERATED STYLES").unwrap();
        let footer = css.find("FOOTER AUTO-GENERATED STYLES").unwrap();
        assert!(header < footer);
        assert!(css.contains(".external-header-container a {"));
        assert!(css.contains("/* Footer: placeholder, no styles emitted */"));
    }

    #[test]
    fn write_file_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/index.ts");
        write_file(&path, "x").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "x");
    }

    #[test]
    fn write_failure_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        // A directory cannot be overwritten with a file.
        let err = write_file(dir.path(), "x").unwrap_err();
        assert!(matches!(err, Error::WriteError { .. }));
    }
}
