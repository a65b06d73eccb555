//! Math protection: classify delimited math spans, lift them out of the text
//! before any other stage runs, and put them back as typesetting-compatible
//! markup at the very end.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::{
    regions::{MATH_TOKEN_PREFIX, ProtectedRegion, math_token},
    types::MathKind,
};

use super::vault::{PlaceholderVault, Placement};

enum Pattern {
    Regex(Regex),
    /// `$ … $` with neither delimiter preceded by a backslash. `regex` has no
    /// look-behind, so this one is matched by hand.
    UnescapedDollar,
}

struct Rule {
    name: &'static str,
    pattern: Pattern,
    kind: MathKind,
}

fn rule(name: &'static str, source: &str, kind: MathKind) -> Rule {
    let regex = Regex::new(source).expect("math delimiter pattern must compile");
    Rule {
        name,
        pattern: Pattern::Regex(regex),
        kind,
    }
}

/// Precedence-ordered rules. Every rule's matches are tokenized before the
/// next rule scans, so later rules only ever see earlier matches as tokens.
static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule("escaped-display", r"(?s)\\\$\$(.+?)\\\$\$", MathKind::Display),
        rule("display", r"(?s)\$\$(.+?)\$\$", MathKind::Display),
        rule("bracket-display", r"(?s)\\\[(.+?)\\\]", MathKind::Display),
        rule("escaped-inline", r"\\\$([^$]+?)\\\$", MathKind::Inline),
        rule("paren-inline", r"(?s)\\\((.+?)\\\)", MathKind::Inline),
        Rule {
            name: "inline",
            pattern: Pattern::UnescapedDollar,
            kind: MathKind::Inline,
        },
    ]
});

static LIVE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"{}\d+@@", regex::escape(MATH_TOKEN_PREFIX)))
        .expect("math token pattern must compile")
});

/// What a math token stands for: a real region, or token-like text that was
/// already in the input and goes back unchanged.
enum Shielded {
    Math(ProtectedRegion),
    Verbatim(String),
}

impl Shielded {
    fn region(&self) -> Option<&ProtectedRegion> {
        match self {
            Shielded::Math(region) => Some(region),
            Shielded::Verbatim(_) => None,
        }
    }

    fn source(&self) -> String {
        match self {
            Shielded::Math(region) => region.source.clone(),
            Shielded::Verbatim(text) => text.clone(),
        }
    }
}

/// Scanner plus vault for one render pass. `protect` and `restore` must be
/// called on the same instance.
pub struct MathShield {
    vault: PlaceholderVault<Shielded>,
}

impl Default for MathShield {
    fn default() -> Self {
        Self::new()
    }
}

impl MathShield {
    pub fn new() -> Self {
        Self {
            vault: PlaceholderVault::new(math_token),
        }
    }

    /// Replace every recognised math span with its token.
    pub fn protect(&mut self, text: &str) -> String {
        let mut current = shield_literal_tokens(text, &mut self.vault);
        for rule in RULES.iter() {
            let before = self.vault.len();
            current = match &rule.pattern {
                Pattern::Regex(regex) => protect_regex(regex, &current, rule.kind, &mut self.vault),
                Pattern::UnescapedDollar => {
                    protect_unescaped_dollars(&current, rule.kind, &mut self.vault)
                }
            };
            let matched = self.vault.len() - before;
            if matched > 0 {
                tracing::trace!(
                    target = "application::render::math",
                    rule = rule.name,
                    matched,
                    "math regions protected"
                );
            }
        }
        current
    }

    /// Substitute `$$content$$` / `$content$` for each token, content escaped.
    /// Calling it again once all regions are consumed changes nothing.
    /// Inside a tag, `"` is escaped as well.
    pub fn restore(&mut self, html: String) -> String {
        let html = self.vault.restore_matching(
            html,
            |shielded| shielded.region().is_some(),
            |shielded, placement| match (shielded, placement) {
                (Shielded::Math(region), Placement::Text) => region.restored_markup(),
                (Shielded::Math(region), Placement::Tag) => region.restored_attribute_markup(),
                (Shielded::Verbatim(text), _) => text.clone(),
            },
        );
        // Token-like input text goes back last and in one pass, so what it
        // spells out is never read as a token.
        self.substitute_live(&html, |shielded| shielded.region().is_none())
    }

    /// Put the original delimited source back for tokens that ended up inside
    /// code, where math must stay literal.
    pub fn reveal(&mut self, text: &str) -> String {
        self.substitute_live(text, |_| true)
    }

    fn substitute_live(&mut self, text: &str, accept: impl Fn(&Shielded) -> bool) -> String {
        let vault = &mut self.vault;
        LIVE_TOKEN
            .replace_all(text, |caps: &Captures<'_>| {
                vault
                    .take(&caps[0], &accept)
                    .map(Shielded::source)
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    pub fn regions(&self) -> impl Iterator<Item = &ProtectedRegion> {
        self.vault.values().filter_map(Shielded::region)
    }

    pub fn len(&self) -> usize {
        self.regions().count()
    }

    pub fn is_empty(&self) -> bool {
        self.regions().next().is_none()
    }
}

/// Vault every token prefix already present in `text` so user input can
/// never spell out a live token.
fn shield_literal_tokens(text: &str, vault: &mut PlaceholderVault<Shielded>) -> String {
    if !text.contains(MATH_TOKEN_PREFIX) {
        return text.to_string();
    }

    let mut output = String::with_capacity(text.len() + 16);
    let mut copied = 0;
    for (start, matched) in text.match_indices(MATH_TOKEN_PREFIX) {
        output.push_str(&text[copied..start]);
        output.push_str(&vault.store_with(|_| Shielded::Verbatim(matched.to_string())));
        copied = start + matched.len();
    }
    output.push_str(&text[copied..]);
    output
}

fn protect_regex(
    regex: &Regex,
    text: &str,
    kind: MathKind,
    vault: &mut PlaceholderVault<Shielded>,
) -> String {
    regex
        .replace_all(text, |caps: &Captures<'_>| {
            let source = caps[0].to_string();
            let content = caps[1].to_string();
            vault.store_with(|token| {
                Shielded::Math(ProtectedRegion {
                    token,
                    content,
                    kind,
                    source,
                })
            })
        })
        .into_owned()
}

fn protect_unescaped_dollars(
    text: &str,
    kind: MathKind,
    vault: &mut PlaceholderVault<Shielded>,
) -> String {
    let bytes = text.as_bytes();
    let mut output = String::with_capacity(text.len());
    let mut copied = 0;
    let mut index = 0;

    while index < bytes.len() {
        let opens = bytes[index] == b'$' && (index == 0 || bytes[index - 1] != b'\\');
        if let Some(close) = opens.then(|| inline_close(bytes, index)).flatten() {
            output.push_str(&text[copied..index]);
            let content = text[index + 1..close].to_string();
            let source = text[index..=close].to_string();
            let token = vault.store_with(|token| {
                Shielded::Math(ProtectedRegion {
                    token,
                    content,
                    kind,
                    source,
                })
            });
            output.push_str(&token);
            index = close + 1;
            copied = index;
            continue;
        }
        index += 1;
    }

    output.push_str(&text[copied..]);
    output
}

/// Closing `$` for an opening one at `open`: the first `$` on the same line,
/// provided the span is non-empty and the closer is not backslash-escaped.
fn inline_close(bytes: &[u8], open: usize) -> Option<usize> {
    let start = open + 1;
    for (offset, byte) in bytes[start..].iter().enumerate() {
        let position = start + offset;
        match *byte {
            b'\n' => return None,
            b'$' => return (position > start && bytes[position - 1] != b'\\').then_some(position),
            _ => {}
        }
    }
    None
}
