//! Protected regions and the placeholder tokens that stand in for them.

use crate::domain::types::MathKind;

/// Sentinel wrapped around code tokens. Unit separator never survives
/// user input because code extraction strips it first.
pub const CODE_SENTINEL: char = '\u{1F}';

/// Every math token starts with this. Occurrences already present in input
/// are shielded before any math is scanned.
pub const MATH_TOKEN_PREFIX: &str = "@@MATH_BLOCK_";

/// Token for the `n`th math region of a render pass.
pub fn math_token(index: usize) -> String {
    format!("{MATH_TOKEN_PREFIX}{index}@@")
}

/// Token for the `n`th fenced code block of a render pass.
pub fn code_block_token(index: usize) -> String {
    format!("{CODE_SENTINEL}CODEBLOCK{index}{CODE_SENTINEL}")
}

/// Token for the `n`th inline code span of a render pass.
pub fn inline_code_token(index: usize) -> String {
    format!("{CODE_SENTINEL}INLINECODE{index}{CODE_SENTINEL}")
}

/// A math span lifted out of the source text for the duration of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRegion {
    pub token: String,
    /// Math source between the delimiters, exactly as typed.
    pub content: String,
    pub kind: MathKind,
    /// Full matched span including its original delimiters.
    pub source: String,
}

impl ProtectedRegion {
    /// Typesetting-compatible markup: delimiter, escaped content, delimiter.
    pub fn restored_markup(&self) -> String {
        let delim = self.kind.delimiter();
        format!("{delim}{}{delim}", escape_math_content(&self.content))
    }

    /// Markup for a token that ended up inside a tag, where `"` would end
    /// the attribute value.
    pub fn restored_attribute_markup(&self) -> String {
        self.restored_markup().replace('"', "&quot;")
    }
}

/// Escape `&`, `<` and `>` in that order so the entities introduced for `<`
/// and `>` are not themselves re-escaped.
pub fn escape_math_content(content: &str) -> String {
    content
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_ampersand_first() {
        assert_eq!(escape_math_content("a<b&c>d"), "a&lt;b&amp;c&gt;d");
        assert_eq!(escape_math_content("&lt;"), "&amp;lt;");
    }

    #[test]
    fn tokens_do_not_prefix_each_other() {
        assert!(!math_token(10).starts_with(&math_token(1)));
        assert!(!code_block_token(10).contains(&code_block_token(1)));
    }

    #[test]
    fn restored_markup_uses_kind_delimiter() {
        let region = ProtectedRegion {
            token: math_token(0),
            content: "x<1".into(),
            kind: MathKind::Display,
            source: "$$x<1$$".into(),
        };
        assert_eq!(region.restored_markup(), "$$x&lt;1$$");
    }

    #[test]
    fn attribute_markup_also_escapes_quotes() {
        let region = ProtectedRegion {
            token: math_token(0),
            content: r#"a" onclick="b<c"#.into(),
            kind: MathKind::Inline,
            source: r#"$a" onclick="b<c$"#.into(),
        };
        assert_eq!(region.restored_markup(), r#"$a" onclick="b&lt;c$"#);
        assert_eq!(
            region.restored_attribute_markup(),
            "$a&quot; onclick=&quot;b&lt;c$"
        );
    }
}
