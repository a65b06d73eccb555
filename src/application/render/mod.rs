//! Rendering pipelines for assistant text.
//!
//! Rendering is pure and synchronous: text plus the currently loaded engines
//! in, deterministic HTML out. Engines that are not loaded yet degrade the
//! output instead of failing it.

mod code;
mod grammar;
mod highlight;
mod math;
mod options;
mod pipeline;
mod typeset;
mod types;
mod vault;

pub use grammar::MarkdownGrammar;
pub use highlight::{CLASS_PREFIX, DEFAULT_THEME, SyntaxHighlighter};
pub use math::MathShield;
pub use pipeline::{RenderPipeline, SandboxRenderer};
pub use typeset::{
    KatexTypesetter, METRIC_TYPESET_FAILURES, TypesetError, TypesetOutcome, Typesetter,
    typeset_html,
};
pub use types::{RenderError, RenderService};
