//! HTML sanitization of parser output.
//!
//! Two `ammonia` allowlists: the rich one for full message views and a
//! reduced one for simplified output (excerpts, mail). Message bodies with
//! HTML enabled pass through the same cleaner as BBCode output.

use std::collections::HashSet;
use std::sync::LazyLock;

use ammonia::Builder;

use crate::parser::OutputType;

const URL_SCHEMES: [&str; 4] = ["http", "https", "mailto", "ftp"];

static RICH_SANITIZER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut b = Builder::new();
    // Keep rel untouched; link targets are forum-internal or user-provided.
    b.link_rel(None);

    b.tags(
        [
            "a",
            "b",
            "blockquote",
            "br",
            "cite",
            "code",
            "del",
            "em",
            "i",
            "img",
            "li",
            "ol",
            "p",
            "pre",
            "s",
            "span",
            "strong",
            "u",
            "ul",
        ]
        .into_iter()
        .collect::<HashSet<&'static str>>(),
    );

    b.clean_content_tags(["script", "style"].into_iter().collect::<HashSet<_>>());

    b.add_generic_attributes(&["class"]);
    b.add_tag_attributes("a", &["href", "title"]);
    b.add_tag_attributes("span", &["style"]);
    b.add_tag_attributes("img", &["src", "alt", "title", "width", "height"]);

    b.url_schemes(URL_SCHEMES.into_iter().collect::<HashSet<_>>());

    // BBCode [color] and [size] are the only style producers.
    b.filter_style_properties(
        ["color", "font-size"]
            .into_iter()
            .collect::<HashSet<_>>(),
    );

    b
});

static SIMPLIFIED_SANITIZER: LazyLock<Builder<'static>> = LazyLock::new(|| {
    let mut b = Builder::new();
    b.link_rel(None);

    b.tags(
        [
            "a",
            "b",
            "blockquote",
            "br",
            "cite",
            "code",
            "del",
            "em",
            "i",
            "li",
            "ol",
            "p",
            "pre",
            "s",
            "strong",
            "u",
            "ul",
        ]
        .into_iter()
        .collect::<HashSet<&'static str>>(),
    );

    b.clean_content_tags(["script", "style"].into_iter().collect::<HashSet<_>>());

    b.generic_attributes(HashSet::new());
    b.add_tag_attributes("a", &["href"]);

    b.url_schemes(URL_SCHEMES.into_iter().collect::<HashSet<_>>());

    b
});

/// Cleans `html` with the allowlist of `output`.
#[must_use]
pub fn sanitize(html: &str, output: OutputType) -> String {
    if html.trim().is_empty() {
        return String::new();
    }
    let builder = match output {
        OutputType::Html => &*RICH_SANITIZER,
        OutputType::SimplifiedHtml => &*SIMPLIFIED_SANITIZER,
    };
    builder.clean(html).to_string()
}
