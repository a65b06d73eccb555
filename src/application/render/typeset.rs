//! Math typesetting over rendered HTML: `$$…$$` spans first, then single `$…$`
//! spans in what remains. Each span succeeds or fails on its own.

use katex::{OptsBuilder, OutputType};
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::warn;

pub const METRIC_TYPESET_FAILURES: &str = "sandmark_typeset_failures_total";

static DISPLAY_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\$\$(.+?)\$\$").expect("display math pattern must compile"));

#[derive(Debug, Clone, Error)]
pub enum TypesetError {
    #[error("failed to build KaTeX options: {message}")]
    Options { message: String },
    #[error("KaTeX rendering failed: {message}")]
    Render { message: String },
}

/// A math typesetting engine.
pub trait Typesetter: Send + Sync {
    fn typeset(&self, tex: &str, display_mode: bool) -> Result<String, TypesetError>;
}

/// KaTeX running inside the embedded JavaScript engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct KatexTypesetter;

impl Typesetter for KatexTypesetter {
    fn typeset(&self, tex: &str, display_mode: bool) -> Result<String, TypesetError> {
        let mut builder = OptsBuilder::default();
        builder.display_mode(display_mode);
        builder.output_type(OutputType::Html);

        let opts = builder.build().map_err(|err| TypesetError::Options {
            message: err.to_string(),
        })?;

        katex::render_with_opts(tex, opts).map_err(|err| TypesetError::Render {
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypesetOutcome {
    pub html: String,
    pub typeset: usize,
    pub failed: usize,
}

/// Replace delimited math in `html` with typeset markup. Tag interiors and
/// content inside `<pre>` and `<code>` elements are left alone. A span that
/// fails to typeset keeps its original delimited text.
pub fn typeset_html(html: &str, typesetter: &dyn Typesetter) -> TypesetOutcome {
    let mut pass = TypesetPass {
        typesetter,
        outcome: TypesetOutcome {
            html: String::with_capacity(html.len()),
            ..TypesetOutcome::default()
        },
    };

    let mut rest = html;
    while let Some(open) = rest.find('<') {
        let (prose, tail) = rest.split_at(open);
        pass.prose(prose);

        let tag_len = tag_end(tail);
        let end = match code_element_close(&tail[..tag_len]) {
            Some(close_tag) => tail[tag_len..]
                .find(close_tag)
                .map(|pos| tag_len + pos + close_tag.len())
                .unwrap_or(tail.len()),
            None => tag_len,
        };
        pass.outcome.html.push_str(&tail[..end]);
        rest = &tail[end..];
    }
    pass.prose(rest);

    pass.outcome
}

struct TypesetPass<'a> {
    typesetter: &'a dyn Typesetter,
    outcome: TypesetOutcome,
}

impl TypesetPass<'_> {
    fn prose(&mut self, text: &str) {
        let mut last = 0;
        for caps in DISPLAY_SPAN.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            self.inline(&text[last..whole.start()]);
            self.span(whole.as_str(), &caps[1], true);
            last = whole.end();
        }
        self.inline(&text[last..]);
    }

    fn inline(&mut self, text: &str) {
        let bytes = text.as_bytes();
        let mut copied = 0;
        let mut index = 0;

        while index < bytes.len() {
            if let Some(close) = inline_span_close(bytes, index) {
                self.outcome.html.push_str(&text[copied..index]);
                self.span(&text[index..=close], &text[index + 1..close], false);
                index = close + 1;
                copied = index;
                continue;
            }
            index += 1;
        }
        self.outcome.html.push_str(&text[copied..]);
    }

    fn span(&mut self, original: &str, escaped_tex: &str, display_mode: bool) {
        let tex = html_escape::decode_html_entities(escaped_tex);
        match self.typesetter.typeset(&tex, display_mode) {
            Ok(rendered) => {
                self.outcome.typeset += 1;
                self.outcome.html.push_str(&rendered);
            }
            Err(err) => {
                self.outcome.failed += 1;
                counter!(METRIC_TYPESET_FAILURES).increment(1);
                warn!(
                    target = "application::render::typeset",
                    display_mode,
                    error = %err,
                    "math span left untypeset"
                );
                self.outcome.html.push_str(original);
            }
        }
    }
}

/// `$` at `open` starts an inline span when it is not adjacent to another
/// `$`; the span closes at the next `$` on the same line.
fn inline_span_close(bytes: &[u8], open: usize) -> Option<usize> {
    if bytes[open] != b'$' || (open > 0 && bytes[open - 1] == b'$') {
        return None;
    }
    let start = open + 1;
    match bytes.get(start).copied() {
        None | Some(b'$') | Some(b'\n') => return None,
        Some(_) => {}
    }
    bytes[start..]
        .iter()
        .position(|byte| *byte == b'$' || *byte == b'\n')
        .map(|offset| start + offset)
        .filter(|position| bytes[*position] == b'$')
}

/// Length of the tag starting at `html[0] == '<'`, through its closing `>`.
/// A `>` inside a quoted attribute value does not end the tag.
fn tag_end(html: &str) -> usize {
    let mut quote = None;
    for (offset, byte) in html.bytes().enumerate().skip(1) {
        match (quote, byte) {
            (Some(open), _) if byte == open => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(byte),
            (None, b'>') => return offset + 1,
            _ => {}
        }
    }
    html.len()
}

/// Closing tag for an opening `<pre>` or `<code>` tag, `None` for any other.
fn code_element_close(tag: &str) -> Option<&'static str> {
    let name_end = tag[1..]
        .find(|ch: char| ch == '>' || ch == '/' || ch.is_ascii_whitespace())
        .map(|pos| pos + 1)
        .unwrap_or(tag.len());
    match tag[1..name_end].to_ascii_lowercase().as_str() {
        "pre" => Some("</pre>"),
        "code" => Some("</code>"),
        _ => None,
    }
}
