//! The two render pipelines. Both build fresh per-call state, so one
//! instance can serve any number of callers.

use std::sync::Arc;

use tracing::debug;

use crate::{application::bootstrap::DependencyState, domain::types::EngineKind};

use super::{
    code::CodeTables,
    highlight::{code_block_html, code_body},
    math::MathShield,
    options::build_sanitizer,
    typeset::typeset_html,
    types::{RenderError, RenderService},
};

/// Chat pipeline: protect math, escape, lift code, run the grammar, then put
/// code and math back. Math comes out as `$$…$$` / `$…$` for a later
/// typesetting pass.
#[derive(Clone)]
pub struct RenderPipeline {
    deps: Arc<DependencyState>,
}

impl RenderPipeline {
    pub fn new(deps: Arc<DependencyState>) -> Self {
        Self { deps }
    }

    pub fn render(&self, text: &str) -> Result<String, RenderError> {
        if text.is_empty() {
            return Ok(String::new());
        }

        let mut math = MathShield::new();
        let protected = math.protect(text);
        let escaped = html_escape::encode_text(&protected);

        let mut code = CodeTables::new();
        let extracted = code.extract(&escaped);

        let html = match self.deps.grammar() {
            Some(grammar) => grammar.render_escaped(&extracted)?,
            None => {
                debug!(
                    target = "application::render::pipeline",
                    "grammar not ready; using plain paragraphs"
                );
                plain_paragraphs(&extracted)
            }
        };

        let html = code.restore_blocks(html, &mut math, self.deps.highlighter());
        let html = code.restore_inline(html, &mut math);
        Ok(math.restore(html))
    }
}

impl RenderService for RenderPipeline {
    fn render(&self, text: &str) -> Result<String, RenderError> {
        RenderPipeline::render(self, text)
    }
}

/// Sandbox pipeline: raw text through the grammar with highlighted code,
/// sanitised, then math typeset in place when the typesetting engine is
/// ready. Requires the grammar.
pub struct SandboxRenderer {
    deps: Arc<DependencyState>,
    sanitizer: ammonia::Builder<'static>,
}

impl SandboxRenderer {
    pub fn new(deps: Arc<DependencyState>) -> Self {
        Self {
            deps,
            sanitizer: build_sanitizer(),
        }
    }

    pub fn render(&self, text: &str) -> Result<String, RenderError> {
        let grammar = self
            .deps
            .grammar()
            .ok_or(RenderError::EngineUnavailable {
                engine: EngineKind::Grammar.as_str(),
            })?;

        let mut math = MathShield::new();
        let protected = math.protect(text);
        let highlighter = self.deps.highlighter();

        let html = grammar.render_raw(&protected, &mut |language, literal| {
            let source = math.reveal(literal);
            code_block_html(language, &code_body(highlighter, language, &source))
        })?;

        // Restored math may land in raw HTML attributes, so it must pass
        // through the sanitizer too.
        let restored = math.restore(html);
        let sanitized = self.sanitizer.clean(&restored).to_string();

        Ok(match self.deps.typesetter() {
            Some(typesetter) => {
                let outcome = typeset_html(&sanitized, typesetter);
                debug!(
                    target = "application::render::pipeline",
                    typeset = outcome.typeset,
                    failed = outcome.failed,
                    "math typeset"
                );
                outcome.html
            }
            None => sanitized,
        })
    }
}

impl RenderService for SandboxRenderer {
    fn render(&self, text: &str) -> Result<String, RenderError> {
        SandboxRenderer::render(self, text)
    }
}

/// Stand-in for the grammar: blank-line separated paragraphs, single line
/// breaks kept as `<br>`.
fn plain_paragraphs(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut html = String::with_capacity(normalized.len() + 16);
    for paragraph in normalized.split("\n\n") {
        let paragraph = paragraph.trim_matches('\n');
        if paragraph.trim().is_empty() {
            continue;
        }
        html.push_str("<p>");
        html.push_str(&paragraph.replace('\n', "<br>\n"));
        html.push_str("</p>\n");
    }
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::{bootstrap::Engine, render::MarkdownGrammar};

    fn with_grammar() -> Arc<DependencyState> {
        Arc::new(DependencyState::preloaded([Engine::Grammar(
            MarkdownGrammar::configure(),
        )]))
    }

    #[test]
    fn empty_text_renders_empty() {
        let pipeline = RenderPipeline::new(with_grammar());
        assert_eq!(pipeline.render("").expect("render succeeds"), "");
    }

    #[test]
    fn plain_text_is_escaped_and_wrapped() {
        let pipeline = RenderPipeline::new(with_grammar());
        let html = pipeline.render("a <b> & c").expect("render succeeds");
        assert_eq!(html, "<p>a &lt;b&gt; &amp; c</p>\n");
    }

    #[test]
    fn fallback_paragraphs_without_grammar() {
        let pipeline = RenderPipeline::new(Arc::new(DependencyState::new()));
        let html = pipeline
            .render("line one\nline two\n\n<i>next</i>")
            .expect("render succeeds");
        assert_eq!(
            html,
            "<p>line one<br>\nline two</p>\n<p>&lt;i&gt;next&lt;/i&gt;</p>\n"
        );
    }

    #[test]
    fn sandbox_renderer_requires_grammar() {
        let renderer = SandboxRenderer::new(Arc::new(DependencyState::new()));
        let err = renderer.render("hi").expect_err("grammar missing");
        assert!(matches!(
            err,
            RenderError::EngineUnavailable { engine: "grammar" }
        ));
    }

    #[test]
    fn sandbox_renderer_sanitizes_raw_html() {
        let renderer = SandboxRenderer::new(with_grammar());
        let html = renderer
            .render("hello <script>alert(1)</script> $x$")
            .expect("render succeeds");
        assert!(!html.contains("<script>"));
        assert!(html.contains("$x$"));
    }
}
