//! Replace legacy icon-font markers with inline SVG.
//!
//! Only the markers in [`ICONS`] are recognized; anything else is left as-is.

use log::info;
use regex::Regex;
use std::sync::OnceLock;

/// An icon-font marker and the SVG that replaces it
pub struct IconMapping {
    /// Identifier reported in diagnostics
    pub name: &'static str,
    pattern: &'static str,
    pub svg: &'static str,
}

const BARS_SVG: &str = r#"<svg aria-hidden="true" focusable="false" data-prefix="fas" data-icon="bars" class="svg-inline--fa fa-bars fa-w-14" role="img" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 448 512" style="width: 20px; height: 20px; color: white;"><path fill="currentColor" d="M16 132h416c8.837 0 16-7.163 16-16V76c0-8.837-7.163-16-16-16H16C7.163 60 0 67.163 0 76v40c0 8.837 7.163 16 16 16zm0 160h416c8.837 0 16-7.163 16-16v-40c0-8.837-7.163-16-16-16H16c-8.837 0-16 7.163-16 16v40c0 8.837 7.163 16 16 16zm0 160h416c8.837 0 16-7.163 16-16v-40c0-8.837-7.163-16-16-16H16c-8.837 0-16 7.163-16 16v40c0 8.837 7.163 16 16 16z"></path></svg>"#;

const TIMES_SVG: &str = r#"<svg aria-hidden="true" focusable="false" data-prefix="fas" data-icon="times" class="svg-inline--fa fa-times fa-w-11" role="img" xmlns="http://www.w3.org/2000/svg" viewBox="0 0 352 512" style="width: 20px; height: 20px; color: white;"><path fill="currentColor" d="M242.72 256l100.07-100.07c12.28-12.28 12.28-32.19 0-44.48l-22.24-22.24c-12.28-12.28-32.19-12.28-44.48 0L176 189.28 75.93 89.21c-12.28-12.28-32.19-12.28-44.48 0L9.21 111.45c-12.28 12.28-12.28 32.19 0 44.48L109.28 256 9.21 356.07c-12.28 12.28-12.28 32.19 0 44.48l22.24 22.24c12.28 12.28 32.19 12.28 44.48 0L176 322.72l100.07 100.07c12.28 12.28 32.19 12.28 44.48 0l22.24-22.24c12.28-12.28 12.28-32.19 0-44.48L242.72 256z"></path></svg>"#;

/// The recognized markers, in substitution order
pub const ICONS: &[IconMapping] = &[
    IconMapping {
        name: "FaBars",
        pattern: r#"<i\s+class="fa\s+fa-bars"[^>]*>\s*</i>"#,
        svg: BARS_SVG,
    },
    IconMapping {
        name: "FaTimes",
        pattern: r#"<i\s+class="fa\s+fa-(?:close|times)"[^>]*>\s*</i>"#,
        svg: TIMES_SVG,
    },
];

fn compiled() -> &'static [(&'static IconMapping, Regex)] {
    static COMPILED: OnceLock<Vec<(&'static IconMapping, Regex)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        ICONS
            .iter()
            .map(|m| {
                let re = Regex::new(m.pattern).unwrap_or_else(|err| panic!("invalid {} icon regex: {err}", m.name));
                (m, re)
            })
            .collect()
    })
}

/// Markup after icon substitution
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMarkup {
    pub markup: String,
    /// Identifiers of the icons that were substituted, without duplicates
    pub substituted: Vec<&'static str>,
}

pub fn normalize_icons(markup: &str) -> NormalizedMarkup {
    let mut out = markup.to_string();
    let mut substituted = Vec::new();

    for (mapping, re) in compiled() {
        if re.is_match(&out) {
            out = re.replace_all(&out, mapping.svg).into_owned();
            substituted.push(mapping.name);
        }
    }

    if !substituted.is_empty() {
        info!("Replaced icon-font markers with inline SVG: {}", substituted.join(", "));
    }

    NormalizedMarkup { markup: out, substituted }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_known_markers() {
        let html = r#"<header><button><i class="fa fa-bars" aria-hidden="true"></i></button><i class="fa fa-close"></i><i class="fa fa-times"></i></header>"#;
        let out = normalize_icons(html);
        assert_eq!(out.substituted, vec!["FaBars", "FaTimes"]);
        assert!(!out.markup.contains("<i "));
        assert_eq!(out.markup.matches("data-icon=\"times\"").count(), 2);
        assert!(out.markup.contains("data-icon=\"bars\""));
    }

    #[test]
    fn unknown_markers_are_untouched() {
        let html = r#"<footer><i class="fa fa-twitter"></i><i class="material-icons">menu</i></footer>"#;
        let out = normalize_icons(html);
        assert!(out.substituted.is_empty());
        assert_eq!(out.markup, html);
    }

    #[test]
    fn replacement_svg_is_literal() {
        // `$` in a replacement would be read as a capture reference.
        for icon in ICONS {
            assert!(!icon.svg.contains('$'));
        }
    }
}
