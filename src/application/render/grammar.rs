use comrak::{
    Arena, format_html,
    nodes::{AstNode, NodeHtmlBlock, NodeValue},
    parse_document,
};

use crate::application::render::types::RenderError;

use super::options::{escaped_text_options, raw_text_options};

/// The markdown block/inline grammar (comrak) with both option sets the
/// pipelines need.
pub struct MarkdownGrammar {
    escaped: comrak::Options<'static>,
    raw: comrak::Options<'static>,
}

impl Default for MarkdownGrammar {
    fn default() -> Self {
        Self::configure()
    }
}

impl MarkdownGrammar {
    /// Build the grammar configuration. Calling it again yields an
    /// identical configuration.
    pub fn configure() -> Self {
        Self {
            escaped: escaped_text_options(),
            raw: raw_text_options(),
        }
    }

    /// Render text that has already been HTML-escaped. Literal code produced
    /// by the grammar itself (indented blocks) is unescaped once so it is not
    /// escaped twice on output.
    pub fn render_escaped(&self, text: &str) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, text, &self.escaped);
        unescape_literals(root);
        render_html(root, &self.escaped)
    }

    /// Render raw text. Every code block is handed to `code_block` with its
    /// language and literal source, and replaced by the HTML it returns.
    pub fn render_raw(
        &self,
        text: &str,
        code_block: &mut dyn FnMut(Option<&str>, &str) -> String,
    ) -> Result<String, RenderError> {
        let arena = Arena::new();
        let root = parse_document(&arena, text, &self.raw);
        rewrite_code_blocks(root, code_block);
        render_html(root, &self.raw)
    }
}

fn render_html<'a>(
    root: &'a AstNode<'a>,
    options: &comrak::Options<'static>,
) -> Result<String, RenderError> {
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::markdown(err.to_string()))?;
    Ok(html)
}

fn unescape_literals<'a>(node: &'a AstNode<'a>) {
    {
        let mut data = node.data.borrow_mut();
        match &mut data.value {
            NodeValue::CodeBlock(block) => {
                block.literal = html_escape::decode_html_entities(&block.literal).into_owned();
            }
            NodeValue::Code(code) => {
                code.literal = html_escape::decode_html_entities(&code.literal).into_owned();
            }
            _ => {}
        }
    }

    for child in node.children() {
        unescape_literals(child);
    }
}

fn rewrite_code_blocks<'a>(
    node: &'a AstNode<'a>,
    code_block: &mut dyn FnMut(Option<&str>, &str) -> String,
) {
    if let Some((info, literal)) = extract_code_block(node) {
        let language = info.split_whitespace().next();
        let html = code_block(language, &literal);
        let mut data = node.data.borrow_mut();
        data.value = NodeValue::HtmlBlock(NodeHtmlBlock {
            block_type: 0,
            literal: html,
        });
        return;
    }

    for child in node.children() {
        rewrite_code_blocks(child, code_block);
    }
}

fn extract_code_block(node: &AstNode<'_>) -> Option<(String, String)> {
    let data = node.data.borrow();
    if let NodeValue::CodeBlock(block) = &data.value {
        let info = block.info.trim().to_string();
        let literal = block.literal.clone();
        Some((info, literal))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaped_text_keeps_entities_single_escaped() {
        let grammar = MarkdownGrammar::configure();
        let html = grammar
            .render_escaped("a &lt;b&gt; &amp; c\n\n    x &lt; y\n")
            .expect("render succeeds");
        assert!(html.contains("<p>a &lt;b&gt; &amp; c</p>"));
        assert!(html.contains("<pre><code>x &lt; y\n</code></pre>"));
    }

    #[test]
    fn underscores_in_placeholders_survive() {
        let grammar = MarkdownGrammar::configure();
        let html = grammar
            .render_escaped("see @@MATH_BLOCK_0@@ and @@MATH_BLOCK_1@@")
            .expect("render succeeds");
        assert_eq!(html, "<p>see @@MATH_BLOCK_0@@ and @@MATH_BLOCK_1@@</p>\n");
    }

    #[test]
    fn raw_render_hands_code_blocks_to_callback() {
        let grammar = MarkdownGrammar::configure();
        let mut seen = Vec::new();
        let html = grammar
            .render_raw("```rust extra\nfn main() {}\n```\n", &mut |lang, code| {
                seen.push((lang.map(str::to_owned), code.to_owned()));
                "<pre>CODE</pre>".to_string()
            })
            .expect("render succeeds");

        assert_eq!(seen, vec![(Some("rust".to_string()), "fn main() {}\n".to_string())]);
        assert!(html.contains("<pre>CODE</pre>"));
    }
}
