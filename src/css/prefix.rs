//! Scope every style rule under a region's container selector.

use super::syntax::{AtBody, Rule, Stylesheet};
use super::{CssDocument, Stage};
use crate::{Error, Result};

pub struct Prefix {
    namespace: String,
}

impl Prefix {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self { namespace: namespace.into() }
    }
}

impl Stage for Prefix {
    fn name(&self) -> &'static str {
        "prefix"
    }

    fn apply(&self, input: &CssDocument) -> Result<CssDocument> {
        let namespace = self.namespace.trim();
        if namespace.is_empty() {
            return Err(Error::TransformError { stage: "prefix", reason: "empty namespace".into() });
        }
        let mut sheet = Stylesheet::parse(input.as_str());
        prefix_rules(&mut sheet.rules, namespace);
        Ok(CssDocument::new(sheet.to_css()))
    }
}

fn prefix_rules(rules: &mut [Rule], namespace: &str) {
    for rule in rules {
        match rule {
            Rule::Style(style) => {
                for selector in style.selectors.iter_mut() {
                    *selector = prefix_selector(selector, namespace);
                }
            }
            // Keyframe selectors (`from`, `50%`) are not element selectors.
            Rule::At(at) if at.is_keyframes() => {}
            Rule::At(at) => {
                if let AtBody::Rules(inner) = &mut at.body {
                    prefix_rules(inner, namespace);
                }
            }
            Rule::Comment(_) => {}
        }
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

fn is_scoped(selector: &str, namespace: &str) -> bool {
    selector
        .strip_prefix(namespace)
        .map(|rest| !rest.starts_with(is_ident_char))
        .unwrap_or(false)
}

/// Strip a leading `html`, `body` or `:root` compound.
///
/// Returns the remainder and whether it was attached to the root
/// (`body.home`) rather than separated by whitespace or a combinator.
fn strip_document_root(selector: &str) -> Option<(&str, bool)> {
    for root in ["html", "body", ":root"] {
        let Some(head) = selector.get(..root.len()) else {
            continue;
        };
        if !head.eq_ignore_ascii_case(root) {
            continue;
        }
        let after = &selector[root.len()..];
        match after.chars().next() {
            None => return Some(("", false)),
            Some(c) if c.is_whitespace() => return Some((after.trim_start(), false)),
            Some('>' | '+' | '~') => return Some((after, false)),
            Some('.' | '#' | '[' | ':') => return Some((after, true)),
            _ => {}
        }
    }
    None
}

/// Rewrite one selector so it only matches inside `namespace`.
pub fn prefix_selector(selector: &str, namespace: &str) -> String {
    let selector = selector.trim();
    if is_scoped(selector, namespace) {
        return selector.to_string();
    }

    let mut rest = selector;
    let mut attached = false;
    let mut stripped = false;
    while let Some((after, is_attached)) = strip_document_root(rest) {
        rest = after;
        attached = is_attached;
        stripped = true;
        if attached {
            break;
        }
        // `html > body .x`: drop the combinator between two roots
        let candidate = rest.trim_start_matches(|c: char| c == '>' || c.is_whitespace());
        if strip_document_root(candidate).is_some() {
            rest = candidate;
        }
    }

    if !stripped {
        return format!("{} {}", namespace, selector);
    }
    if rest.is_empty() {
        namespace.to_string()
    } else if attached {
        format!("{}{}", namespace, rest)
    } else {
        format!("{} {}", namespace, rest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = ".external-header-container";

    #[test]
    fn descendant_prefixing() {
        assert_eq!(prefix_selector(".nav a", NS), ".external-header-container .nav a");
        assert_eq!(prefix_selector("header", NS), ".external-header-container header");
    }

    #[test]
    fn document_roots_become_the_container() {
        assert_eq!(prefix_selector("body", NS), NS);
        assert_eq!(prefix_selector(":root", NS), NS);
        assert_eq!(prefix_selector("html body .x", NS), ".external-header-container .x");
        assert_eq!(prefix_selector("html > body .x", NS), ".external-header-container .x");
        assert_eq!(prefix_selector("body.home .x", NS), ".external-header-container.home .x");
        assert_eq!(prefix_selector("body > .x", NS), ".external-header-container > .x");
        assert_eq!(prefix_selector("bodyish", NS), ".external-header-container bodyish");
    }

    #[test]
    fn prefixing_is_idempotent() {
        let once = prefix_selector(".a", NS);
        assert_eq!(prefix_selector(&once, NS), once);
        assert_eq!(prefix_selector(".external-header-container-x", NS), ".external-header-container .external-header-container-x");
    }

    #[test]
    fn keyframes_are_untouched_media_is_recursed() {
        let out = Prefix::new(NS)
            .apply(&CssDocument::new("@keyframes k { from { opacity: 0 } } @media (max-width: 10px) { .a, .b { top: 0 } }"))
            .unwrap();
        assert!(out.as_str().contains("  from {"));
        assert!(out.as_str().contains(".external-header-container .a, .external-header-container .b {"));
    }

    #[test]
    fn empty_namespace_fails() {
        assert!(Prefix::new(" ").apply(&CssDocument::new(".a{b:c}")).is_err());
    }
}
