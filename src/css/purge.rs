//! Drop rules whose selectors cannot match the fragment markup.
//!
//! A selector is reduced to the names it requires (tags, classes, ids and
//! attribute names; pseudo-classes and combinators are ignored) and kept
//! when every one of them occurs in the markup. This errs towards keeping:
//! structural relationships are not checked.
//!
//! Rules that are always kept:
//! - `@font-face` and `@keyframes` (the font-face sweep later drops faces no
//!   surviving declaration uses)
//! - rules whose declarations reference a custom property
//! - selectors naming a safelisted class or id (states toggled at runtime)
//! - selectors with no required names at all (`*`, `:root`)
//!
//! A selector naming a blocklisted tag is dropped regardless of the above.

use super::syntax::{minify_text, AtBody, AtRule, Declaration, Rule, Stylesheet};
use super::{CssDocument, Stage};
use crate::{Error, Result};
use log::debug;
use scraper::{Html, Selector};
use std::collections::HashSet;

/// Name pattern protecting selectors from purging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafelistPattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    /// Substring anywhere in the name
    Contains(String),
}

impl SafelistPattern {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            SafelistPattern::Exact(s) => name == s,
            SafelistPattern::Prefix(s) => name.starts_with(s.as_str()),
            SafelistPattern::Suffix(s) => name.ends_with(s.as_str()),
            SafelistPattern::Contains(s) => name.contains(s.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PurgeOptions {
    /// Applied to class and id names
    pub safelist: Vec<SafelistPattern>,
    /// Tag names whose selectors are always dropped
    pub blocklist: Vec<String>,
}

impl Default for PurgeOptions {
    fn default() -> Self {
        let exact = [
            "ods-responsive-menu--collapsed",
            "ods-responsive-menu--expanded",
            "ods-responsive-menu-placeholder--active",
            "ods-responsive-menu-collapsible--collapsed",
            "ods-responsive-menu-collapsible--expanded",
        ];
        let prefixes = ["ods-responsive-menu", "aos-"];
        let suffixes = ["--active", "--collapsed", "--expanded", "--visible", "--hidden"];

        let safelist = exact
            .iter()
            .map(|s| SafelistPattern::Exact(s.to_string()))
            .chain(prefixes.iter().map(|s| SafelistPattern::Prefix(s.to_string())))
            .chain(suffixes.iter().map(|s| SafelistPattern::Suffix(s.to_string())))
            .collect();

        Self { safelist, blocklist: vec!["main".to_string()] }
    }
}

impl PurgeOptions {
    fn is_safelisted(&self, name: &str) -> bool {
        self.safelist.iter().any(|p| p.matches(name))
    }

    fn is_blocklisted(&self, tag: &str) -> bool {
        self.blocklist.iter().any(|b| b.eq_ignore_ascii_case(tag))
    }
}

/// A name a selector requires to be present
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Part {
    Tag(String),
    Class(String),
    Id(String),
    Attr(String),
}

/// Names occurring in the fragment markup
#[derive(Debug, Default)]
struct MarkupIndex {
    parts: HashSet<Part>,
}

impl MarkupIndex {
    fn build(markup: &str) -> Result<Self> {
        let any = Selector::parse("*").map_err(|e| Error::TransformError {
            stage: "purge",
            reason: format!("selector engine unavailable: {:?}", e),
        })?;
        let fragment = Html::parse_fragment(markup);

        let mut parts = HashSet::new();
        // The fragment is rendered inside the host document.
        parts.insert(Part::Tag("html".into()));
        parts.insert(Part::Tag("body".into()));

        for el in fragment.select(&any) {
            let el = el.value();
            parts.insert(Part::Tag(el.name().to_ascii_lowercase()));
            for class in el.classes() {
                parts.insert(Part::Class(class.to_string()));
            }
            if let Some(id) = el.id() {
                parts.insert(Part::Id(id.to_string()));
            }
            for (name, _) in el.attrs() {
                parts.insert(Part::Attr(name.to_ascii_lowercase()));
            }
        }
        Ok(Self { parts })
    }

    fn contains(&self, part: &Part) -> bool {
        self.parts.contains(part)
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

/// Consume the escape following a `\`: up to six hex digits plus one
/// optional whitespace, or any single other character.
fn read_escape(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<char> {
    let mut code = 0u32;
    let mut digits = 0;
    while digits < 6 {
        match chars.peek().and_then(|c| c.to_digit(16)) {
            Some(d) => {
                code = code * 16 + d;
                digits += 1;
                chars.next();
            }
            None => break,
        }
    }
    if digits == 0 {
        return chars.next();
    }
    if chars.peek().is_some_and(|c| c.is_ascii_whitespace()) {
        chars.next();
    }
    match code {
        0 => Some(char::REPLACEMENT_CHARACTER),
        _ => Some(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER)),
    }
}

fn read_ident(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut ident = String::new();
    while let Some(&c) = chars.peek() {
        if c == '\\' {
            chars.next();
            if let Some(escaped) = read_escape(chars) {
                ident.push(escaped);
            }
        } else if is_ident_char(c) {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    ident
}

fn skip_balanced(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, open: char, close: char) -> String {
    let mut depth = 0usize;
    let mut inner = String::new();
    let mut quote: Option<char> = None;
    for c in chars.by_ref() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                }
            }
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == open => depth += 1,
            None if c == close => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            None => {}
        }
        inner.push(c);
    }
    inner
}

/// Names `selector` requires, in order of appearance
fn selector_parts(selector: &str) -> Vec<Part> {
    let mut parts = Vec::new();
    let mut chars = selector.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            '.' => {
                chars.next();
                let ident = read_ident(&mut chars);
                if !ident.is_empty() {
                    parts.push(Part::Class(ident));
                }
            }
            '#' => {
                chars.next();
                let ident = read_ident(&mut chars);
                if !ident.is_empty() {
                    parts.push(Part::Id(ident));
                }
            }
            '[' => {
                chars.next();
                let inner = skip_balanced(&mut chars, '[', ']');
                let name = inner
                    .split(|c| matches!(c, '=' | '~' | '|' | '^' | '$' | '*' | ']'))
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_ascii_lowercase();
                if !name.is_empty() {
                    parts.push(Part::Attr(name));
                }
            }
            ':' => {
                chars.next();
                if chars.peek() == Some(&':') {
                    chars.next();
                }
                read_ident(&mut chars);
                if chars.peek() == Some(&'(') {
                    chars.next();
                    skip_balanced(&mut chars, '(', ')');
                }
            }
            c if c == '\\' || (is_ident_char(c) && !c.is_ascii_digit()) => {
                let ident = read_ident(&mut chars);
                if !ident.is_empty() {
                    parts.push(Part::Tag(ident.to_ascii_lowercase()));
                }
            }
            _ => {
                chars.next();
            }
        }
    }
    parts
}

/// Removes style rules and selectors the fragment cannot use.
pub struct Purge<'a> {
    markup: &'a str,
    options: &'a PurgeOptions,
}

impl<'a> Purge<'a> {
    pub fn new(markup: &'a str, options: &'a PurgeOptions) -> Self {
        Self { markup, options }
    }

    fn keep_selector(&self, index: &MarkupIndex, selector: &str) -> bool {
        let parts = selector_parts(selector);

        if parts.iter().any(|p| matches!(p, Part::Tag(t) if self.options.is_blocklisted(t))) {
            return false;
        }

        let safelisted = parts.iter().any(|p| match p {
            Part::Class(name) | Part::Id(name) => self.options.is_safelisted(name),
            _ => false,
        });

        safelisted || parts.iter().all(|p| index.contains(p))
    }

    fn purge_rules(&self, index: &MarkupIndex, rules: &mut Vec<Rule>, removed: &mut usize) {
        rules.retain_mut(|rule| match rule {
            Rule::Comment(_) => true,
            Rule::Style(style) => {
                if style.uses_custom_property() {
                    return true;
                }
                let before = style.selectors.len();
                style.selectors.retain(|s| self.keep_selector(index, s));
                *removed += before - style.selectors.len();
                !style.selectors.is_empty()
            }
            Rule::At(at) => {
                if at.is_font_face() || at.is_keyframes() {
                    return true;
                }
                match &mut at.body {
                    AtBody::Rules(inner) => {
                        self.purge_rules(index, inner, removed);
                        !inner.is_empty()
                    }
                    _ => true,
                }
            }
        });
    }
}

impl Stage for Purge<'_> {
    fn name(&self) -> &'static str {
        "purge"
    }

    fn apply(&self, input: &CssDocument) -> Result<CssDocument> {
        if self.markup.trim().is_empty() {
            return Err(Error::TransformError { stage: "purge", reason: "no markup to match selectors against".into() });
        }
        let index = MarkupIndex::build(self.markup)?;

        let mut sheet = Stylesheet::parse(input.as_str());
        let mut removed = 0;
        self.purge_rules(&index, &mut sheet.rules, &mut removed);
        debug!("Purge removed {} unused selectors", removed);

        Ok(CssDocument::new(sheet.to_css()))
    }
}

/// Removes `@font-face` blocks whose family nothing uses.
///
/// A family counts as used when a `font-family` or `font` declaration names
/// it, or a custom property value lists it. A `var()` inside a font
/// declaration makes every face count as used.
pub struct FontFaceSweep;

/// Family names a `font-family` value or custom property value lists
fn family_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value.split(',').map(normalize_family).filter(|f| !f.is_empty())
}

fn normalize_family(name: &str) -> String {
    let name = name.trim().trim_matches(|c: char| c == '"' || c == '\'');
    minify_text(name).to_lowercase()
}

/// Families named by the `font` shorthand: whatever follows the size
fn shorthand_families(value: &str) -> Vec<String> {
    let mut segments = value.split(',');
    let first = segments.next().unwrap_or("");
    let words: Vec<&str> = first.split_whitespace().collect();
    let size_at = words
        .iter()
        .rposition(|w| w.starts_with(|c: char| c.is_ascii_digit() || c == '.') || w.contains('/'));
    let family = match size_at {
        Some(i) => words[i + 1..].join(" "),
        None => words.last().map(|w| w.to_string()).unwrap_or_default(),
    };

    std::iter::once(normalize_family(&family))
        .chain(segments.map(normalize_family))
        .filter(|f| !f.is_empty())
        .collect()
}

#[derive(Default)]
struct FontUsage {
    families: HashSet<String>,
    dynamic: bool,
}

impl FontUsage {
    fn record(&mut self, decl: &Declaration) {
        let property = decl.property.to_ascii_lowercase();
        match property.as_str() {
            "font-family" | "font" if decl.uses_custom_property() => self.dynamic = true,
            "font-family" => self.families.extend(family_list(&decl.value)),
            "font" => self.families.extend(shorthand_families(&decl.value)),
            p if p.starts_with("--") => self.families.extend(family_list(&decl.value)),
            _ => {}
        }
    }

    fn scan(&mut self, rules: &[Rule]) {
        for rule in rules {
            match rule {
                Rule::Style(style) => style.declarations.iter().for_each(|d| self.record(d)),
                Rule::At(at) if at.is_font_face() => {}
                Rule::At(at) => match &at.body {
                    AtBody::Rules(inner) => self.scan(inner),
                    AtBody::Declarations(decls) => decls.iter().for_each(|d| self.record(d)),
                    _ => {}
                },
                Rule::Comment(_) => {}
            }
        }
    }

    fn uses(&self, face: &AtRule) -> bool {
        if self.dynamic {
            return true;
        }
        let declared = match &face.body {
            AtBody::Declarations(decls) => decls.iter().find(|d| d.property.eq_ignore_ascii_case("font-family")),
            _ => None,
        };
        match declared {
            Some(decl) => self.families.contains(&normalize_family(&decl.value)),
            // Nothing to match against
            None => false,
        }
    }
}

fn sweep_font_faces(rules: &mut Vec<Rule>, usage: &FontUsage, removed: &mut usize) {
    rules.retain_mut(|rule| match rule {
        Rule::At(at) if at.is_font_face() => {
            let keep = usage.uses(at);
            if !keep {
                *removed += 1;
            }
            keep
        }
        Rule::At(at) => {
            if let AtBody::Rules(inner) = &mut at.body {
                sweep_font_faces(inner, usage, removed);
            }
            true
        }
        _ => true,
    });
}

impl Stage for FontFaceSweep {
    fn name(&self) -> &'static str {
        "font-face-sweep"
    }

    fn apply(&self, input: &CssDocument) -> Result<CssDocument> {
        let mut sheet = Stylesheet::parse(input.as_str());
        let mut usage = FontUsage::default();
        usage.scan(&sheet.rules);

        let mut removed = 0;
        sweep_font_faces(&mut sheet.rules, &usage, &mut removed);
        debug!("Font-face sweep removed {} unused faces", removed);
        Ok(CssDocument::new(sheet.to_css()))
    }
}
