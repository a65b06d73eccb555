use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use comrak::options::{ListStyleType, Options};

/// Grammar options for text that was HTML-escaped before parsing. Raw HTML
/// cannot occur, so it stays disabled.
pub(crate) fn escaped_text_options() -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options);
    options.render.r#unsafe = false;
    options
}

/// Grammar options for the sandbox variant, which parses raw text and relies
/// on the sanitizer afterwards.
pub(crate) fn raw_text_options() -> Options<'static> {
    let mut options = Options::default();
    configure_extensions(&mut options);
    options.render.r#unsafe = true;
    options
}

pub(crate) fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "a",
        "blockquote",
        "br",
        "code",
        "del",
        "div",
        "em",
        "h1",
        "h2",
        "h3",
        "h4",
        "h5",
        "h6",
        "hr",
        "img",
        "input",
        "li",
        "ol",
        "p",
        "pre",
        "s",
        "span",
        "strong",
        "sub",
        "sup",
        "table",
        "tbody",
        "td",
        "th",
        "thead",
        "tr",
        "ul",
    ]);
    builder.tags(tags);

    let generic: HashSet<&'static str> = HashSet::from(["class", "title", "lang", "dir"]);
    builder.generic_attributes(generic);

    builder.add_tag_attributes("img", &["alt", "width", "height"]);
    builder.add_tag_attributes("th", &["align"]);
    builder.add_tag_attributes("td", &["align"]);
    builder.add_tag_attributes("input", &["type", "checked", "disabled"]);

    builder.add_url_schemes(["http", "https", "mailto"].iter().copied());

    builder
}

fn configure_extensions(options: &mut Options<'static>) {
    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.tasklist = true;
    // Math is protected before the grammar runs; comrak must not claim `$`.
    ext.math_dollars = false;
    ext.math_code = false;
    ext.autolink = false;

    let render = &mut options.render;
    render.list_style = ListStyleType::Dash;
    render.tasklist_classes = true;
    render.sourcepos = false;
}
