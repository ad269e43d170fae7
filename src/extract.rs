//! Viewport extraction and fragment reconciliation.

use crate::{ExtractionTarget, PageHandle, Region, Result, Timing, Viewport};
use log::info;

/// One region captured at one viewport. `markup` is `None` when the region
/// is not present at that viewport, which is an expected outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFragment {
    pub region: Region,
    pub viewport_label: String,
    pub markup: Option<String>,
}

/// The authoritative fragment for a region after reconciliation
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalFragment {
    pub region: Region,
    pub markup: Option<String>,
    /// Label of the viewport whose capture was chosen
    pub source_viewport: Option<String>,
}

/// Load `url` under `viewport`, wait for it to stabilize, and capture every region.
pub fn extract_viewport(
    page: &mut dyn PageHandle,
    url: &str,
    viewport: &Viewport,
    timing: &Timing,
) -> Result<Vec<RawFragment>> {
    info!("Extracting fragments at {} ({}x{})", viewport.label, viewport.width, viewport.height);

    load_and_settle(page, url, viewport, timing, timing.settle_delay)?;

    let mut fragments = Vec::with_capacity(Region::ALL.len());
    for region in Region::ALL {
        let markup = page
            .outer_html(region.element_selector())?
            .filter(|m| !m.trim().is_empty());
        info!(
            "  {} at {}: {}",
            region.name(),
            viewport.label,
            markup.as_ref().map(|m| format!("{} chars", m.len())).unwrap_or_else(|| "absent".into())
        );
        fragments.push(RawFragment { region, viewport_label: viewport.label.clone(), markup });
    }
    Ok(fragments)
}

/// Load `url` at the primary viewport and return the rendered document plus
/// its final location, for stylesheet discovery.
pub fn capture_document(
    page: &mut dyn PageHandle,
    url: &str,
    viewport: &Viewport,
    timing: &Timing,
) -> Result<(String, String)> {
    load_and_settle(page, url, viewport, timing, timing.collect_settle_delay)?;
    let html = page.document_html()?;
    let location = page.current_url();
    let location = if location.is_empty() { url.to_string() } else { location };
    Ok((html, location))
}

fn load_and_settle(
    page: &mut dyn PageHandle,
    url: &str,
    viewport: &Viewport,
    timing: &Timing,
    settle: std::time::Duration,
) -> Result<()> {
    page.set_viewport(viewport)?;
    page.navigate(url, timing.navigation_timeout)?;
    page.wait_for_network_idle(timing.network_idle, timing.poll_interval, timing.navigation_timeout)?;

    // Client-side frameworks may still mutate the DOM after the network goes quiet.
    if !settle.is_zero() {
        std::thread::sleep(settle);
    }
    Ok(())
}

/// Pick the canonical markup for `region`.
///
/// Captures are considered in viewport order: the first (primary, desktop)
/// viewport is authoritative whenever it yielded markup, and a later one is
/// used only when every earlier one came back empty. Elements that exist
/// only in a narrower viewport are therefore dropped when the primary
/// capture exists.
pub fn reconcile(region: Region, target: &ExtractionTarget, raws: &[RawFragment]) -> CanonicalFragment {
    let chosen = target.viewports.iter().find_map(|viewport| {
        raws.iter()
            .find(|r| r.region == region && r.viewport_label == viewport.label && r.markup.is_some())
    });

    match chosen {
        Some(raw) => {
            info!("{} taken from the {} capture", region.name(), raw.viewport_label);
            CanonicalFragment {
                region,
                markup: raw.markup.clone(),
                source_viewport: Some(raw.viewport_label.clone()),
            }
        }
        None => {
            info!("{} not found at any viewport", region.name());
            CanonicalFragment { region, markup: None, source_viewport: None }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::HashMap;
    use std::time::Duration;

    fn target() -> ExtractionTarget {
        ExtractionTarget {
            url: "https://example.org/".into(),
            viewports: vec![Viewport::desktop(), Viewport::mobile()],
        }
    }

    fn raw(region: Region, label: &str, markup: Option<&str>) -> RawFragment {
        RawFragment { region, viewport_label: label.into(), markup: markup.map(String::from) }
    }

    #[test]
    fn desktop_markup_always_wins() {
        let raws = vec![
            raw(Region::Header, "MOBILE", Some("<header>mobile, with extras</header>")),
            raw(Region::Header, "DESKTOP", Some("<header>desktop</header>")),
        ];
        let canonical = reconcile(Region::Header, &target(), &raws);
        assert_eq!(canonical.markup.as_deref(), Some("<header>desktop</header>"));
        assert_eq!(canonical.source_viewport.as_deref(), Some("DESKTOP"));
    }

    #[test]
    fn mobile_used_only_when_desktop_is_absent() {
        let raws = vec![
            raw(Region::Footer, "DESKTOP", None),
            raw(Region::Footer, "MOBILE", Some("<footer>m</footer>")),
        ];
        let canonical = reconcile(Region::Footer, &target(), &raws);
        assert_eq!(canonical.markup.as_deref(), Some("<footer>m</footer>"));
        assert_eq!(canonical.source_viewport.as_deref(), Some("MOBILE"));
    }

    #[test]
    fn absent_everywhere_yields_no_markup() {
        let raws = vec![
            raw(Region::Footer, "DESKTOP", None),
            raw(Region::Footer, "MOBILE", None),
            raw(Region::Header, "DESKTOP", Some("<header></header>")),
        ];
        let canonical = reconcile(Region::Footer, &target(), &raws);
        assert_eq!(canonical.markup, None);
        assert_eq!(canonical.source_viewport, None);
    }

    struct FakePage {
        by_width: HashMap<u32, Vec<(&'static str, &'static str)>>,
        width: u32,
        loaded: bool,
    }

    impl PageHandle for FakePage {
        fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
            self.width = viewport.width;
            Ok(())
        }
        fn navigate(&mut self, _url: &str, _timeout: Duration) -> Result<()> {
            self.loaded = true;
            Ok(())
        }
        fn evaluate(&mut self, _script: &str) -> Result<serde_json::Value> {
            Ok(serde_json::json!(3))
        }
        fn current_url(&self) -> String {
            String::new()
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn outer_html(&mut self, selector: &str) -> Result<Option<String>> {
            if !self.loaded {
                return Err(Error::NavigationError("not loaded".into()));
            }
            Ok(self
                .by_width
                .get(&self.width)
                .and_then(|els| els.iter().find(|(s, _)| *s == selector))
                .map(|(_, m)| m.to_string()))
        }
        fn document_html(&mut self) -> Result<String> {
            Ok("<html></html>".into())
        }
    }

    #[test]
    fn extraction_records_presence_per_viewport() {
        let mut by_width = HashMap::new();
        by_width.insert(1920, vec![("header", "<header>d</header>"), ("footer", "<footer>f</footer>")]);
        by_width.insert(375, vec![("header", "<header>m</header>"), ("footer", "   ")]);
        let mut page = FakePage { by_width, width: 0, loaded: false };

        let timing = Timing {
            network_idle: Duration::ZERO,
            poll_interval: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
            ..Default::default()
        };

        let mut raws = extract_viewport(&mut page, "https://x/", &Viewport::desktop(), &timing).unwrap();
        raws.extend(extract_viewport(&mut page, "https://x/", &Viewport::mobile(), &timing).unwrap());

        assert_eq!(raws.len(), 4);
        let mobile_footer = raws
            .iter()
            .find(|r| r.region == Region::Footer && r.viewport_label == "MOBILE")
            .unwrap();
        assert_eq!(mobile_footer.markup, None, "whitespace-only capture counts as absent");

        let header = reconcile(Region::Header, &target(), &raws);
        assert_eq!(header.markup.as_deref(), Some("<header>d</header>"));

        let (html, location) =
            capture_document(&mut page, "https://x/", &Viewport::desktop(), &Timing { collect_settle_delay: Duration::ZERO, ..timing })
                .unwrap();
        assert_eq!(html, "<html></html>");
        assert_eq!(location, "https://x/");
    }
}
