use std::sync::Arc;

use sandmark::application::{
    bootstrap::{DependencyState, Engine},
    render::{
        DEFAULT_THEME, MarkdownGrammar, RenderPipeline, SandboxRenderer, SyntaxHighlighter,
        TypesetError, Typesetter,
    },
};

/// Brackets typeset spans so assertions can see what was typeset, and
/// fails on any span mentioning `boom`.
struct Bracketing;

impl Typesetter for Bracketing {
    fn typeset(&self, tex: &str, display_mode: bool) -> Result<String, TypesetError> {
        if tex.contains("boom") {
            return Err(TypesetError::Render {
                message: format!("cannot typeset {tex}"),
            });
        }
        Ok(if display_mode {
            format!("[D:{tex}]")
        } else {
            format!("[I:{tex}]")
        })
    }
}

fn grammar_only() -> Arc<DependencyState> {
    Arc::new(DependencyState::preloaded([Engine::Grammar(
        MarkdownGrammar::configure(),
    )]))
}

#[test]
fn text_without_delimiters_is_only_escaped() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render("<b>bold</b> & more")
        .expect("render succeeds");
    assert_eq!(html, "<p>&lt;b&gt;bold&lt;/b&gt; &amp; more</p>\n");
}

#[test]
fn display_math_round_trips_with_escaped_content() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline.render("$$a<b$$").expect("render succeeds");
    assert_eq!(html, "<p>$$a&lt;b$$</p>\n");
}

#[test]
fn inline_and_display_math_survive_the_grammar() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render(r"Use $x^2+y^2=1$ and check $$ \int_0^1 x\,dx $$.")
        .expect("render succeeds");
    assert_eq!(
        html,
        "<p>Use $x^2+y^2=1$ and check $$ \\int_0^1 x\\,dx $$.</p>\n"
    );
}

#[test]
fn underscores_and_asterisks_inside_math_are_not_emphasis() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render("$a_1 * b_2$ and $c_3 * d_4$")
        .expect("render succeeds");
    assert_eq!(html, "<p>$a_1 * b_2$ and $c_3 * d_4$</p>\n");
}

#[test]
fn fenced_code_without_highlighter_stays_escaped() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render("```python\nif a < b:\n    pass\n```\n\nThen $a$.")
        .expect("render succeeds");
    assert_eq!(
        html,
        "<pre><div class=\"code-lang\">python</div><code>if a &lt; b:\n    pass\n</code></pre>\n<p>Then $a$.</p>\n"
    );
}

#[test]
fn fenced_code_is_highlighted_when_ready() {
    let highlighter = SyntaxHighlighter::load(DEFAULT_THEME).expect("default theme loads");
    let deps = Arc::new(DependencyState::preloaded([
        Engine::Grammar(MarkdownGrammar::configure()),
        Engine::Highlighter(highlighter),
    ]));
    let pipeline = RenderPipeline::new(deps);

    let html = pipeline
        .render("```python\ndef f():\n    return 1\n```\n\nThen $a$.")
        .expect("render succeeds");

    assert!(html.starts_with("<pre><div class=\"code-lang\">python</div><code>"));
    assert!(html.contains("syntax-"));
    assert!(html.ends_with("<p>Then $a$.</p>\n"));
    assert!(!html.contains("<p><pre>"));
}

#[test]
fn math_inside_code_is_left_literal() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render("run `echo $HOME$` then $y$")
        .expect("render succeeds");
    assert_eq!(html, "<p>run <code>echo $HOME$</code> then $y$</p>\n");
}

#[test]
fn unmatched_delimiters_pass_through_as_text() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render("costs $5 today")
        .expect("render succeeds");
    assert_eq!(html, "<p>costs $5 today</p>\n");
}

#[test]
fn renders_without_any_engine_loaded() {
    let pipeline = RenderPipeline::new(Arc::new(DependencyState::new()));
    let html = pipeline
        .render("first $x$\nsecond\n\n```\ncode\n```")
        .expect("render succeeds");
    assert_eq!(
        html,
        "<p>first $x$<br>\nsecond</p>\n<pre><code>code\n</code></pre>\n"
    );
}

#[test]
fn sandbox_typesetting_failure_is_isolated_to_its_span() {
    let deps = Arc::new(DependencyState::preloaded([
        Engine::Grammar(MarkdownGrammar::configure()),
        Engine::Typesetting(Arc::new(Bracketing)),
    ]));
    let renderer = SandboxRenderer::new(deps);

    let html = renderer
        .render("Inline $x$ and $boom$ and $$y$$")
        .expect("render succeeds");
    assert_eq!(html, "<p>Inline [I:x] and $boom$ and [D:y]</p>\n");
}

#[test]
fn sandbox_code_blocks_keep_math_literal_and_untypeset() {
    let deps = Arc::new(DependencyState::preloaded([
        Engine::Grammar(MarkdownGrammar::configure()),
        Engine::Typesetting(Arc::new(Bracketing)),
    ]));
    let renderer = SandboxRenderer::new(deps);

    let html = renderer
        .render("```sh\necho $a$ <b>\n```\n")
        .expect("render succeeds");
    assert_eq!(
        html.trim_end(),
        "<pre><div class=\"code-lang\">sh</div><code>echo $a$ &lt;b&gt;\n</code></pre>"
    );
}

#[test]
fn math_in_link_destination_cannot_break_out_of_the_attribute() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render(r#"[x]($a" onclick="b$)"#)
        .expect("render succeeds");
    assert!(html.contains("<a href="), "{html}");
    assert!(html.contains("&quot;"), "{html}");
    assert!(!html.contains("onclick=\""), "{html}");
}

#[test]
fn token_text_typed_by_the_user_is_left_alone() {
    let pipeline = RenderPipeline::new(grammar_only());
    let html = pipeline
        .render("see @@MATH_BLOCK_0@@ then $x$")
        .expect("render succeeds");
    assert_eq!(html, "<p>see @@MATH_BLOCK_0@@ then $x$</p>\n");
}

#[test]
fn sandbox_math_in_raw_attributes_is_sanitized_after_restoring() {
    let deps = Arc::new(DependencyState::preloaded([
        Engine::Grammar(MarkdownGrammar::configure()),
        Engine::Typesetting(Arc::new(Bracketing)),
    ]));
    let renderer = SandboxRenderer::new(deps);

    let html = renderer
        .render(r#"<span title="$x" onmouseover="alert(1)$">hi</span>"#)
        .expect("render succeeds");
    assert!(!html.contains("onmouseover=\""), "{html}");
    assert!(!html.contains("[I:"), "{html}");
    assert!(html.contains("hi</span>"), "{html}");
}

#[test]
fn sandbox_typesets_text_but_not_attribute_values() {
    let deps = Arc::new(DependencyState::preloaded([
        Engine::Grammar(MarkdownGrammar::configure()),
        Engine::Typesetting(Arc::new(Bracketing)),
    ]));
    let renderer = SandboxRenderer::new(deps);

    let html = renderer
        .render(r#"<span title="$a$">$b$</span>"#)
        .expect("render succeeds");
    assert_eq!(html, "<p><span title=\"$a$\">[I:b]</span></p>\n");
}
