//! Fenced code blocks and inline code spans, lifted out of already-escaped
//! text so the markdown grammar never sees their contents.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::domain::regions::{CODE_SENTINEL, code_block_token, inline_code_token};

use super::{
    highlight::{SyntaxHighlighter, code_block_html, code_body},
    math::MathShield,
    vault::PlaceholderVault,
};

static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```([\w+#.-]*)[^\n]*\n(.*?)```").expect("fenced code pattern must compile")
});

static INLINE_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("inline code pattern must compile"));

#[derive(Debug, Clone)]
pub(crate) struct CodeBlock {
    pub(crate) language: Option<String>,
    /// HTML-escaped source, as it stood when extracted.
    pub(crate) content: String,
}

/// Token tables for one render pass.
pub(crate) struct CodeTables {
    blocks: PlaceholderVault<CodeBlock>,
    inline: PlaceholderVault<String>,
}

impl CodeTables {
    pub(crate) fn new() -> Self {
        Self {
            blocks: PlaceholderVault::new(code_block_token),
            inline: PlaceholderVault::new(inline_code_token),
        }
    }

    /// Replace fenced blocks, then inline spans, with tokens. Sentinel
    /// characters already present in the text are removed first so user
    /// input can never forge a token.
    pub(crate) fn extract(&mut self, text: &str) -> String {
        let cleaned: Cow<'_, str> = if text.contains(CODE_SENTINEL) {
            Cow::Owned(text.replace(CODE_SENTINEL, ""))
        } else {
            Cow::Borrowed(text)
        };

        let blocks = &mut self.blocks;
        let without_blocks = FENCED_BLOCK.replace_all(&cleaned, |caps: &Captures<'_>| {
            let language = Some(caps[1].to_string()).filter(|lang| !lang.is_empty());
            let content = caps[2].to_string();
            blocks.store_with(|_| CodeBlock { language, content })
        });

        let inline = &mut self.inline;
        INLINE_SPAN
            .replace_all(&without_blocks, |caps: &Captures<'_>| {
                let content = caps[1].to_string();
                inline.store_with(|_| content)
            })
            .into_owned()
    }

    /// Re-insert code blocks as `<pre>` markup, highlighted when a
    /// highlighter is available. A token that the grammar wrapped in a
    /// paragraph of its own is unwrapped first.
    pub(crate) fn restore_blocks(
        &mut self,
        mut html: String,
        math: &mut MathShield,
        highlighter: Option<&SyntaxHighlighter>,
    ) -> String {
        let tokens: Vec<String> = self.blocks.tokens().map(str::to_owned).collect();
        for token in &tokens {
            html = html.replacen(&format!("<p>{token}</p>"), token, 1);
        }

        self.blocks.restore(html, |block| {
            let source = literal_source(&block.content, math);
            let language = block.language.as_deref();
            code_block_html(language, &code_body(highlighter, language, &source))
        })
    }

    /// Re-insert inline code spans verbatim, without highlighting.
    pub(crate) fn restore_inline(&mut self, html: String, math: &mut MathShield) -> String {
        self.inline.restore(html, |content| {
            let source = literal_source(content, math);
            format!("<code>{}</code>", html_escape::encode_text(&source))
        })
    }
}

/// Raw source of an escaped code fragment, with any math that was protected
/// inside it put back literally.
fn literal_source(escaped: &str, math: &mut MathShield) -> String {
    let decoded = html_escape::decode_html_entities(escaped);
    math.reveal(&decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_fenced_block_with_language() {
        let mut tables = CodeTables::new();
        let text = tables.extract("before\n```python\nprint(1)\n```\nafter");
        assert_eq!(text, format!("before\n{}\nafter", code_block_token(0)));

        let block = tables.blocks.values().next().expect("one block");
        assert_eq!(block.language.as_deref(), Some("python"));
        assert_eq!(block.content, "print(1)\n");
    }

    #[test]
    fn fence_without_language_has_no_label() {
        let mut tables = CodeTables::new();
        let text = tables.extract("```\nplain\n```");
        let mut math = MathShield::new();
        let html = tables.restore_blocks(format!("<p>{text}</p>"), &mut math, None);
        assert_eq!(html, "<pre><code>plain\n</code></pre>");
    }

    #[test]
    fn inline_code_round_trips_escaped_text() {
        let mut tables = CodeTables::new();
        let text = tables.extract("use `a &lt; b` here");
        assert_eq!(text, format!("use {} here", inline_code_token(0)));

        let mut math = MathShield::new();
        let html = tables.restore_inline(text, &mut math);
        assert_eq!(html, "use <code>a &lt; b</code> here");
    }

    #[test]
    fn forged_sentinels_are_stripped() {
        let mut tables = CodeTables::new();
        let forged = format!("{CODE_SENTINEL}CODEBLOCK0{CODE_SENTINEL}");
        let text = tables.extract(&forged);
        assert_eq!(text, "CODEBLOCK0");
    }

    #[test]
    fn math_inside_code_stays_literal() {
        let mut math = MathShield::new();
        let protected = math.protect("`$x$`");
        let mut tables = CodeTables::new();
        let text = tables.extract(&protected);

        let html = tables.restore_inline(text, &mut math);
        assert_eq!(html, "<code>$x$</code>");
        assert_eq!(math.restore(html.clone()), html);
    }

    #[test]
    fn unclosed_fence_passes_through() {
        let mut tables = CodeTables::new();
        assert_eq!(tables.extract("```rust\nfn main() {}"), "```rust\nfn main() {}");
    }
}
