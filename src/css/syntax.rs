//! Fault-tolerant stylesheet model.
//!
//! Parsing walks `cssparser` tokens and never fails: unclosed blocks are
//! closed at end of input, stray closing brackets are skipped, garbage before
//! a `;` at rule level is discarded, and declarations without a name, without
//! a colon, or containing bad strings/urls are dropped. Serialization is a
//! stable, indented format so stage outputs stay diffable.

use cssparser::{ParseError, Parser, ParserInput, SourcePosition, Token};

#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub property: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    /// Parse `name: value [!important][;]`, returning `None` for anything unusable.
    pub fn from_text(text: &str) -> Option<Declaration> {
        let text = text.trim();
        let text = text.strip_suffix(';').unwrap_or(text);
        let (name, value) = text.split_once(':')?;

        let property = minify_text(name);
        if property.is_empty() || property.contains(char::is_whitespace) {
            return None;
        }

        let (value, important) = split_important(value.trim());
        if value.is_empty() && !property.starts_with("--") {
            return None;
        }

        Some(Declaration { property, value: value.to_string(), important })
    }

    /// Whether the value references a custom property
    pub fn uses_custom_property(&self) -> bool {
        self.value.to_ascii_lowercase().contains("var(")
    }
}

fn split_important(value: &str) -> (&str, bool) {
    // ASCII lowercasing keeps byte offsets aligned with `value`.
    let lower = value.to_ascii_lowercase();
    if let Some(rest) = lower.strip_suffix("important") {
        if let Some(before) = rest.trim_end().strip_suffix('!') {
            return (value[..before.len()].trim_end(), true);
        }
    }
    (value, false)
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selectors: Vec<String>,
    pub declarations: Vec<Declaration>,
}

impl StyleRule {
    pub fn uses_custom_property(&self) -> bool {
        self.declarations.iter().any(Declaration::uses_custom_property)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtBody {
    /// `@import ...;`
    Statement,
    /// `@media`, `@supports`, `@keyframes`, ...
    Rules(Vec<Rule>),
    /// `@font-face`, `@page`, ...
    Declarations(Vec<Declaration>),
    /// Block of an at-rule we do not model; kept verbatim
    Raw(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtRule {
    /// Lowercased name without the `@`
    pub name: String,
    pub prelude: String,
    pub body: AtBody,
}

impl AtRule {
    pub fn is_keyframes(&self) -> bool {
        unprefixed(&self.name) == "keyframes"
    }

    pub fn is_font_face(&self) -> bool {
        self.name == "font-face"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Style(StyleRule),
    At(AtRule),
    /// Comment text without the delimiters
    Comment(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Stylesheet {
    pub rules: Vec<Rule>,
}

impl Stylesheet {
    pub fn parse(css: &str) -> Stylesheet {
        let mut input = ParserInput::new(css);
        let mut parser = Parser::new(&mut input);
        Stylesheet { rules: parse_rule_list(&mut parser) }
    }

    pub fn to_css(&self) -> String {
        let mut out = String::new();
        write_rules(&mut out, &self.rules, 0);
        out
    }

    /// Number of style rules, nested ones included
    pub fn style_rule_count(&self) -> usize {
        fn count(rules: &[Rule]) -> usize {
            rules
                .iter()
                .map(|r| match r {
                    Rule::Style(_) => 1,
                    Rule::At(AtRule { body: AtBody::Rules(inner), .. }) => count(inner),
                    _ => 0,
                })
                .sum()
        }
        count(&self.rules)
    }
}

enum BodyKind {
    Rules,
    Declarations,
    Raw,
}

fn unprefixed(name: &str) -> &str {
    if let Some(rest) = name.strip_prefix('-') {
        if let Some(idx) = rest.find('-') {
            return &rest[idx + 1..];
        }
    }
    name
}

fn body_kind(name: &str) -> BodyKind {
    match unprefixed(name) {
        "media" | "supports" | "document" | "layer" | "container" | "scope" | "starting-style" | "keyframes" => {
            BodyKind::Rules
        }
        "font-face" | "page" | "counter-style" | "property" | "viewport" | "font-palette-values" => {
            BodyKind::Declarations
        }
        _ => BodyKind::Raw,
    }
}

fn parse_rule_list<'i, 't>(p: &mut Parser<'i, 't>) -> Vec<Rule> {
    let mut rules = Vec::new();
    loop {
        let start = p.position();
        let token = match p.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => break,
        };
        match token {
            Token::WhiteSpace(_)
            | Token::CDO
            | Token::CDC
            | Token::Semicolon
            | Token::CloseCurlyBracket
            | Token::CloseParenthesis
            | Token::CloseSquareBracket => {}
            Token::Comment(text) => rules.push(Rule::Comment(text.to_string())),
            Token::AtKeyword(name) => {
                let name = name.to_ascii_lowercase();
                rules.push(parse_at_rule(p, name));
            }
            first => {
                if let Some(rule) = parse_style_rule(p, start, first) {
                    rules.push(Rule::Style(rule));
                }
            }
        }
    }
    rules
}

fn parse_style_rule<'i, 't>(p: &mut Parser<'i, 't>, start: SourcePosition, first: Token<'i>) -> Option<StyleRule> {
    let mut start = start;
    let mut token = first;
    let mut poisoned = false;

    loop {
        match &token {
            Token::CurlyBracketBlock => {
                let raw = p.slice_from(start);
                let selectors = split_selector_list(raw.strip_suffix('{').unwrap_or(raw));
                let declarations = p
                    .parse_nested_block(|inner| Ok::<_, ParseError<'i, ()>>(parse_declarations(inner)))
                    .unwrap_or_default();
                if poisoned || selectors.is_empty() {
                    return None;
                }
                return Some(StyleRule { selectors, declarations });
            }
            // Junk before a `;` is not a selector; restart after it.
            Token::Semicolon => {
                start = p.position();
                poisoned = false;
            }
            Token::BadString(_) | Token::BadUrl(_) => poisoned = true,
            _ => {}
        }
        token = match p.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => return None,
        };
    }
}

fn parse_at_rule<'i, 't>(p: &mut Parser<'i, 't>, name: String) -> Rule {
    let prelude_start = p.position();
    loop {
        let token = match p.next_including_whitespace_and_comments() {
            Ok(t) => t.clone(),
            Err(_) => {
                let prelude = minify_text(p.slice_from(prelude_start));
                return Rule::At(AtRule { name, prelude, body: AtBody::Statement });
            }
        };
        match token {
            Token::Semicolon => {
                let raw = p.slice_from(prelude_start);
                let prelude = minify_text(raw.strip_suffix(';').unwrap_or(raw));
                return Rule::At(AtRule { name, prelude, body: AtBody::Statement });
            }
            Token::CurlyBracketBlock => {
                let raw = p.slice_from(prelude_start);
                let prelude = minify_text(raw.strip_suffix('{').unwrap_or(raw));
                let body = match body_kind(&name) {
                    BodyKind::Rules => AtBody::Rules(
                        p.parse_nested_block(|inner| Ok::<_, ParseError<'i, ()>>(parse_rule_list(inner)))
                            .unwrap_or_default(),
                    ),
                    BodyKind::Declarations => AtBody::Declarations(
                        p.parse_nested_block(|inner| Ok::<_, ParseError<'i, ()>>(parse_declarations(inner)))
                            .unwrap_or_default(),
                    ),
                    BodyKind::Raw => AtBody::Raw(
                        p.parse_nested_block(|inner| {
                            let s = inner.position();
                            while inner.next_including_whitespace_and_comments().is_ok() {}
                            Ok::<_, ParseError<'i, ()>>(inner.slice_from(s).trim().to_string())
                        })
                        .unwrap_or_default(),
                    ),
                };
                return Rule::At(AtRule { name, prelude, body });
            }
            _ => {}
        }
    }
}

fn parse_declarations<'i, 't>(p: &mut Parser<'i, 't>) -> Vec<Declaration> {
    let mut out = Vec::new();
    loop {
        let start = p.position();
        let mut poisoned = false;
        let mut has_content = false;
        let mut at_end = false;

        loop {
            let token = match p.next_including_whitespace_and_comments() {
                Ok(t) => t.clone(),
                Err(_) => {
                    at_end = true;
                    break;
                }
            };
            match token {
                Token::Semicolon => break,
                Token::WhiteSpace(_) | Token::Comment(_) => {}
                // Nested rules and broken tokens make the whole declaration unusable.
                Token::BadString(_) | Token::BadUrl(_) | Token::CurlyBracketBlock | Token::AtKeyword(_) => {
                    poisoned = true;
                    has_content = true;
                }
                _ => has_content = true,
            }
        }

        if has_content && !poisoned {
            if let Some(decl) = Declaration::from_text(p.slice_from(start)) {
                out.push(decl);
            }
        }
        if at_end {
            break;
        }
    }
    out
}

/// Split a selector list on top-level commas, normalizing each selector.
pub fn split_selector_list(prelude: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut chars = prelude.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            '"' | '\'' => {
                current.push(c);
                while let Some(n) = chars.next() {
                    current.push(n);
                    if n == '\\' {
                        if let Some(escaped) = chars.next() {
                            current.push(escaped);
                        }
                    } else if n == c {
                        break;
                    }
                }
            }
            '(' | '[' => {
                depth += 1;
                current.push(c);
            }
            ')' | ']' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);

    parts.iter().map(|s| minify_text(s)).filter(|s| !s.is_empty()).collect()
}

/// Drop comments and collapse whitespace runs outside strings, then trim.
pub fn minify_text(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut pending_space = false;

    fn flush(out: &mut String, pending_space: &mut bool) {
        if *pending_space && !out.is_empty() {
            out.push(' ');
        }
        *pending_space = false;
    }

    while let Some(c) = chars.next() {
        match c {
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for n in chars.by_ref() {
                    if prev == '*' && n == '/' {
                        break;
                    }
                    prev = n;
                }
                // A comment still separates tokens.
                pending_space = true;
            }
            c if c.is_whitespace() => pending_space = true,
            '"' | '\'' => {
                flush(&mut out, &mut pending_space);
                out.push(c);
                while let Some(n) = chars.next() {
                    out.push(n);
                    if n == '\\' {
                        if let Some(escaped) = chars.next() {
                            out.push(escaped);
                        }
                    } else if n == c {
                        break;
                    }
                }
            }
            '\\' => {
                flush(&mut out, &mut pending_space);
                out.push(c);
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            }
            _ => {
                flush(&mut out, &mut pending_space);
                out.push(c);
            }
        }
    }
    out
}

const INDENT: &str = "  ";

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn write_declarations(out: &mut String, decls: &[Declaration], depth: usize) {
    for d in decls {
        indent(out, depth);
        out.push_str(&d.property);
        out.push(':');
        if !d.value.is_empty() {
            out.push(' ');
            out.push_str(&d.value);
        }
        if d.important {
            out.push_str(" !important");
        }
        out.push_str(";\n");
    }
}

fn write_rules(out: &mut String, rules: &[Rule], depth: usize) {
    for rule in rules {
        indent(out, depth);
        match rule {
            Rule::Comment(text) => {
                out.push_str("/*");
                out.push_str(text);
                out.push_str("*/\n");
            }
            Rule::Style(style) => {
                out.push_str(&style.selectors.join(", "));
                out.push_str(" {\n");
                write_declarations(out, &style.declarations, depth + 1);
                indent(out, depth);
                out.push_str("}\n");
            }
            Rule::At(at) => {
                out.push('@');
                out.push_str(&at.name);
                if !at.prelude.is_empty() {
                    out.push(' ');
                    out.push_str(&at.prelude);
                }
                match &at.body {
                    AtBody::Statement => out.push_str(";\n"),
                    AtBody::Rules(inner) => {
                        out.push_str(" {\n");
                        write_rules(out, inner, depth + 1);
                        indent(out, depth);
                        out.push_str("}\n");
                    }
                    AtBody::Declarations(decls) => {
                        out.push_str(" {\n");
                        write_declarations(out, decls, depth + 1);
                        indent(out, depth);
                        out.push_str("}\n");
                    }
                    AtBody::Raw(raw) => {
                        out.push_str(" {\n");
                        if !raw.is_empty() {
                            indent(out, depth + 1);
                            out.push_str(raw);
                            out.push('\n');
                        }
                        indent(out, depth);
                        out.push_str("}\n");
                    }
                }
            }
        }
    }
}
