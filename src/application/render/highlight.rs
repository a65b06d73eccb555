use syntect::{
    highlighting::ThemeSet,
    html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style},
    parsing::{SyntaxReference, SyntaxSet},
    util::LinesWithEndings,
};

use tracing::warn;

use crate::application::render::types::RenderError;

pub const CLASS_PREFIX: &str = "syntax-";
pub const DEFAULT_THEME: &str = "base16-ocean.dark";

/// Syntect-backed highlighter emitting `syntax-` prefixed CSS classes, plus
/// the stylesheet that colours them.
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    class_style: ClassStyle,
    stylesheet: String,
}

impl SyntaxHighlighter {
    /// Load the bundled syntax definitions and generate CSS for `theme`.
    pub fn load(theme: &str) -> Result<Self, RenderError> {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let class_style = ClassStyle::SpacedPrefixed {
            prefix: CLASS_PREFIX,
        };
        let themes = ThemeSet::load_defaults();
        let selected = themes
            .themes
            .get(theme)
            .ok_or_else(|| RenderError::document(format!("unknown highlight theme `{theme}`")))?;
        let stylesheet = css_for_theme_with_class_style(selected, class_style).map_err(|err| {
            RenderError::document(format!("failed to generate theme css: {err}"))
        })?;

        Ok(Self {
            syntax_set,
            class_style,
            stylesheet,
        })
    }

    pub fn stylesheet(&self) -> &str {
        &self.stylesheet
    }

    /// Highlight raw (unescaped) source. Unknown or absent languages fall
    /// back to the plain-text syntax, which only escapes.
    pub fn highlight(&self, language: Option<&str>, code: &str) -> Result<String, RenderError> {
        let lang_token = language.unwrap_or("text");
        let syntax = find_syntax(&self.syntax_set, lang_token)
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let mut code_with_newline = code.to_string();
        if !code_with_newline.ends_with('\n') {
            code_with_newline.push('\n');
        }

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, self.class_style);

        for line in LinesWithEndings::from(code_with_newline.as_str()) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|err| RenderError::Highlighting {
                    language: lang_token.to_string(),
                    message: err.to_string(),
                })?;
        }

        Ok(generator.finalize())
    }
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, token: &str) -> Option<&'a SyntaxReference> {
    let lowercase = token.to_ascii_lowercase();
    syntax_set
        .find_syntax_by_token(&lowercase)
        .or_else(|| syntax_set.find_syntax_by_name(&lowercase))
        .or_else(|| syntax_set.find_syntax_by_extension(&lowercase))
}

/// Highlighted markup for `source`, or plain escaped text when no
/// highlighter is loaded or highlighting fails.
pub(crate) fn code_body(
    highlighter: Option<&SyntaxHighlighter>,
    language: Option<&str>,
    source: &str,
) -> String {
    let Some(highlighter) = highlighter else {
        return html_escape::encode_text(source).into_owned();
    };
    highlighter.highlight(language, source).unwrap_or_else(|err| {
        warn!(
            target = "application::render::highlight",
            language = language.unwrap_or("text"),
            error = %err,
            "highlighting failed; emitting plain code"
        );
        html_escape::encode_text(source).into_owned()
    })
}

/// Code block shape shared by every pipeline: `<pre>`, an optional language
/// label, then `<code>` holding already-escaped or highlighted markup.
pub(crate) fn code_block_html(language: Option<&str>, body: &str) -> String {
    let label = language
        .filter(|lang| !lang.is_empty())
        .map(|lang| {
            format!(
                "<div class=\"code-lang\">{}</div>",
                html_escape::encode_text(lang)
            )
        })
        .unwrap_or_default();
    format!("<pre>{label}<code>{body}</code></pre>")
}
