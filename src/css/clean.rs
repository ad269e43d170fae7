//! Conservative minification.
//!
//! Only rewrites that cannot change which elements a rule matches or what it
//! computes: comments, whitespace, duplicate declarations and selectors,
//! empty rules, and property-name case.

use super::syntax::{minify_text, AtBody, Declaration, Rule, Stylesheet};
use super::{CssDocument, Stage};
use crate::Result;
use std::collections::HashSet;

pub struct Clean;

impl Stage for Clean {
    fn name(&self) -> &'static str {
        "clean"
    }

    fn apply(&self, input: &CssDocument) -> Result<CssDocument> {
        let mut sheet = Stylesheet::parse(input.as_str());
        clean_rules(&mut sheet.rules);
        Ok(CssDocument::new(sheet.to_css()))
    }
}

fn clean_rules(rules: &mut Vec<Rule>) {
    rules.retain_mut(|rule| match rule {
        // `/*!` marks license comments
        Rule::Comment(text) => text.starts_with('!'),
        Rule::Style(style) => {
            let mut seen = HashSet::new();
            style.selectors = style
                .selectors
                .iter()
                .map(|s| minify_text(s))
                .filter(|s| !s.is_empty() && seen.insert(s.clone()))
                .collect();
            clean_declarations(&mut style.declarations);
            !style.selectors.is_empty() && !style.declarations.is_empty()
        }
        Rule::At(at) => {
            if at.name == "charset" {
                return false;
            }
            at.prelude = minify_text(&at.prelude);
            match &mut at.body {
                AtBody::Statement => true,
                AtBody::Rules(inner) => {
                    clean_rules(inner);
                    !inner.is_empty()
                }
                AtBody::Declarations(decls) => {
                    clean_declarations(decls);
                    !decls.is_empty()
                }
                AtBody::Raw(raw) => {
                    *raw = minify_text(raw);
                    !raw.is_empty()
                }
            }
        }
    });
}

fn clean_declarations(decls: &mut Vec<Declaration>) {
    for d in decls.iter_mut() {
        if d.property.starts_with("--") {
            // Custom property values are token streams; only trim them.
            d.value = d.value.trim().to_string();
        } else {
            d.property = d.property.to_ascii_lowercase();
            d.value = minify_text(&d.value);
        }
    }

    // An identical later declaration makes the earlier one dead.
    let mut seen = HashSet::new();
    let mut kept: Vec<Declaration> = decls
        .drain(..)
        .rev()
        .filter(|d| seen.insert((d.property.clone(), d.value.clone(), d.important)))
        .collect();
    kept.reverse();
    *decls = kept;
}
