//! HTML string utilities: escaping, tag stripping, entity decoding and
//! tag-aware truncation.
//!
//! "Rendered characters" are the characters a reader sees: tags count zero,
//! an entity such as `&amp;` counts one.

/// Horizontal ellipsis appended to truncated excerpts.
pub const HELLIP: &str = "\u{2026}";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

const BLOCK_ELEMENTS: &[&str] = &[
    "blockquote", "cite", "div", "h1", "h2", "h3", "li", "ol", "p", "pre", "ul",
];

/// Minimal HTML escaping for untrusted text.
#[must_use]
pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escapes a value for a double-quoted attribute without touching existing
/// entities (the value may already be HTML-escaped text).
#[must_use]
pub fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Tag(&'a str),
    Text(&'a str),
}

/// Byte offset just past the `>` closing the tag starting at `start`,
/// ignoring `>` inside quoted attribute values.
fn tag_end(html: &str, start: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &b) in html.as_bytes()[start..].iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"' | b'\'') => quote = Some(b),
            (None, b'>') => return Some(start + offset + 1),
            (None, _) => {}
        }
    }
    None
}

fn segments(html: &str) -> Vec<Segment<'_>> {
    let bytes = html.as_bytes();
    let mut out = Vec::new();
    let mut text_start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let starts_tag = bytes[i] == b'<'
            && bytes
                .get(i + 1)
                .is_some_and(|b| b.is_ascii_alphabetic() || matches!(b, b'/' | b'!'));
        if starts_tag {
            let Some(end) = tag_end(html, i) else {
                // Unterminated tag: the rest is text.
                break;
            };
            if text_start < i {
                out.push(Segment::Text(&html[text_start..i]));
            }
            out.push(Segment::Tag(&html[i..end]));
            i = end;
            text_start = end;
            continue;
        }
        i += 1;
    }
    if text_start < html.len() {
        out.push(Segment::Text(&html[text_start..]));
    }
    out
}

/// Byte length of a well-formed entity at the start of `s`, `;` included.
fn entity_len(s: &str) -> Option<usize> {
    let body = s.strip_prefix('&')?;
    let end = body.find(';')?;
    let name = &body[..end];
    let valid = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        (1..=6).contains(&hex.len()) && hex.bytes().all(|b| b.is_ascii_hexdigit())
    } else if let Some(dec) = name.strip_prefix('#') {
        (1..=7).contains(&dec.len()) && dec.bytes().all(|b| b.is_ascii_digit())
    } else {
        (2..=32).contains(&name.len())
            && name.as_bytes()[0].is_ascii_alphabetic()
            && name.bytes().all(|b| b.is_ascii_alphanumeric())
    };
    valid.then_some(end + 2)
}

/// Splits text into rendered units: single characters or whole entities.
fn text_units(text: &str) -> Vec<&str> {
    let mut units = Vec::with_capacity(text.len());
    let mut rest = text;
    while let Some(ch) = rest.chars().next() {
        let len = if ch == '&' {
            entity_len(rest).unwrap_or(1)
        } else {
            ch.len_utf8()
        };
        units.push(&rest[..len]);
        rest = &rest[len..];
    }
    units
}

/// Returns the lowercase element name of a tag and whether it is a closing tag.
/// Comments and doctypes have no name.
fn tag_name(tag: &str) -> Option<(String, bool)> {
    let inner = tag.strip_prefix('<')?;
    let (inner, closing) = match inner.strip_prefix('/') {
        Some(rest) => (rest, true),
        None => (inner, false),
    };
    let name: String = inner
        .chars()
        .take_while(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    (!name.is_empty()).then_some((name, closing))
}

/// Number of rendered characters in `html`.
#[must_use]
pub fn visible_length(html: &str) -> usize {
    segments(html)
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(text) => text_units(text).len(),
            Segment::Tag(_) => 0,
        })
        .sum()
}

/// Removes all tags, keeping text (entities stay encoded).
///
/// A block element boundary (`li`, `blockquote`, `cite`, `p`, `pre`, ...)
/// between two pieces of text becomes a single `\n` unless the text already
/// breaks the line there. Whitespace-only text between blocks is dropped.
#[must_use]
pub fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut pending_break = false;
    for segment in segments(html) {
        match segment {
            Segment::Tag(tag) => {
                if tag_name(tag).is_some_and(|(name, _)| BLOCK_ELEMENTS.contains(&name.as_str())) {
                    pending_break = true;
                }
            }
            Segment::Text(text) => {
                if pending_break {
                    if text.trim().is_empty() && !text.contains('\n') {
                        continue;
                    }
                    if !out.is_empty() && !out.ends_with('\n') && !text.starts_with('\n') {
                        out.push('\n');
                    }
                    pending_break = false;
                }
                out.push_str(text);
            }
        }
    }
    out
}

fn named_entity(name: &str) -> Option<char> {
    let ch = match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201C}',
        "rdquo" => '\u{201D}',
        "laquo" => '\u{00AB}',
        "raquo" => '\u{00BB}',
        "bull" => '\u{2022}',
        "copy" => '\u{00A9}',
        "reg" => '\u{00AE}',
        "trade" => '\u{2122}',
        "euro" => '\u{20AC}',
        _ => return None,
    };
    Some(ch)
}

fn decode_entity(name: &str) -> Option<char> {
    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()?
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse().ok()?
    } else {
        return named_entity(name);
    };
    char::from_u32(code).filter(|c| *c != '\0')
}

/// Decodes HTML entities in a single pass (`&amp;lt;` becomes `&lt;`).
/// Unknown entities are left untouched.
///
/// Output is meant for plain-text mail, so `&nbsp;` decodes to an ordinary
/// space (U+0020), not U+00A0. Re-escaping the result does not restore it.
#[must_use]
pub fn decode_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        let decoded = entity_len(candidate)
            .and_then(|len| decode_entity(&candidate[1..len - 1]).map(|ch| (len, ch)));
        if let Some((len, ch)) = decoded {
            out.push(ch);
            rest = &candidate[len..];
        } else {
            out.push('&');
            rest = &candidate[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Truncates `html` to at most `max_length` rendered characters, `etc`
/// included.
///
/// Tags and entities are never split and elements left open at the cut are
/// closed. Unless `break_words` is set the cut moves back to the last
/// whitespace of the text node being cut. When `etc` alone is longer than
/// `max_length` it is dropped.
#[must_use]
pub fn truncate_html(html: &str, max_length: usize, etc: &str, break_words: bool) -> String {
    if visible_length(html) <= max_length {
        return html.to_string();
    }

    let etc_len = visible_length(etc);
    let (etc, mut remaining) = if etc_len > max_length {
        ("", max_length)
    } else {
        (etc, max_length - etc_len)
    };

    let mut out = String::with_capacity(html.len().min(max_length * 4 + 64));
    let mut open: Vec<String> = Vec::new();

    for segment in segments(html) {
        match segment {
            Segment::Tag(tag) => {
                if let Some((name, closing)) = tag_name(tag) {
                    if closing {
                        if let Some(pos) = open.iter().rposition(|n| *n == name) {
                            open.truncate(pos);
                        }
                    } else if !tag.ends_with("/>") && !VOID_ELEMENTS.contains(&name.as_str()) {
                        open.push(name);
                    }
                }
                out.push_str(tag);
            }
            Segment::Text(text) => {
                let units = text_units(text);
                if units.len() <= remaining {
                    out.push_str(text);
                    remaining -= units.len();
                    continue;
                }

                let mut take = remaining;
                let at_boundary = units[take].trim().is_empty();
                if !break_words
                    && !at_boundary
                    && let Some(space) = units[..take].iter().rposition(|u| u.trim().is_empty())
                {
                    take = space;
                }
                let kept = units[..take].concat();
                out.push_str(kept.trim_end());
                break;
            }
        }
    }

    out.push_str(etc);
    for name in open.iter().rev() {
        out.push_str("</");
        out.push_str(name);
        out.push('>');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    // --- escape ---

    #[test]
    fn escape_html_special_chars() {
        assert_eq!(
            escape_html("<script>&'\""),
            "&lt;script&gt;&amp;&#x27;&quot;"
        );
    }

    #[test]
    fn escape_attr_keeps_entities() {
        assert_eq!(escape_attr("a&amp;b\"c"), "a&amp;b&quot;c");
    }

    // --- strip ---

    #[test]
    fn strip_removes_tags_keeps_text() {
        assert_eq!(strip_html("<b>bold</b> and <i>italic</i>"), "bold and italic");
        assert_eq!(strip_html("text<br />more<hr>end"), "textmoreend");
    }

    #[test]
    fn strip_keeps_lone_angle_brackets() {
        assert_eq!(strip_html("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
        assert_eq!(strip_html("x <b"), "x <b");
    }

    #[test]
    fn strip_separates_block_elements() {
        assert_eq!(strip_html("<ul><li>one</li><li>two</li></ul>after"), "one\ntwo\nafter");
        assert_eq!(
            strip_html("<blockquote><cite>alice</cite>hello</blockquote>after"),
            "alice\nhello\nafter"
        );
        assert_eq!(strip_html("<ul>\n<li>a</li> <li>b</li>\n</ul>"), "\na\nb\n");
    }

    #[test]
    fn strip_does_not_double_existing_breaks() {
        assert_eq!(strip_html("<pre><code>x</code></pre><br />\nnext"), "x\nnext");
        assert_eq!(strip_html("<p>first</p>\n<p>second</p>"), "first\nsecond");
    }

    #[test]
    fn strip_handles_gt_inside_attribute() {
        assert_eq!(strip_html("<a title=\"a>b\">link</a>"), "link");
    }

    // --- decode ---

    #[test]
    fn decode_named_and_numeric() {
        assert_eq!(decode_html("Hi &amp; bye"), "Hi & bye");
        assert_eq!(decode_html("&lt;tag&gt; &quot;q&quot;"), "<tag> \"q\"");
        assert_eq!(decode_html("&#39;&#x41;&#X42;"), "'AB");
        assert_eq!(decode_html("a&nbsp;b"), "a b");
    }

    #[test]
    fn nbsp_decodes_to_plain_space() {
        assert_eq!(decode_html("&nbsp;"), "\u{20}");
        assert_ne!(decode_html("&nbsp;"), "\u{a0}");
    }

    #[test]
    fn decode_is_single_pass() {
        assert_eq!(decode_html("&amp;lt;"), "&lt;");
    }

    #[test]
    fn decode_leaves_unknown_and_broken_entities() {
        assert_eq!(decode_html("&bogus; & &amp"), "&bogus; & &amp");
        assert_eq!(decode_html("&#0;"), "&#0;");
    }

    // --- visible length ---

    #[test]
    fn visible_length_counts_entities_once() {
        assert_eq!(visible_length("<b>a&amp;b</b>"), 3);
        assert_eq!(visible_length("<br />"), 0);
        assert_eq!(visible_length("äöü"), 3);
    }

    // --- truncate ---

    #[test]
    fn truncate_short_input_unchanged() {
        let html = "<p>short</p>";
        assert_eq!(truncate_html(html, 255, HELLIP, false), html);
    }

    #[test]
    fn truncate_closes_open_tags() {
        let out = truncate_html("<p><b>hello world again</b></p>", 12, HELLIP, false);
        assert_eq!(out, "<p><b>hello world\u{2026}</b></p>");
    }

    #[test]
    fn truncate_breaks_words_when_asked() {
        let out = truncate_html("abcdefghij", 5, HELLIP, true);
        assert_eq!(out, "abcd\u{2026}");
    }

    #[test]
    fn truncate_never_splits_entities() {
        let out = truncate_html("ab&amp;cdef", 4, "", true);
        assert_eq!(out, "ab&amp;c");
    }

    #[test]
    fn truncate_drops_oversized_ellipsis() {
        let out = truncate_html("abcdef", 2, "[more]", true);
        assert_eq!(out, "ab");
    }

    #[test]
    fn truncate_skips_void_elements_when_closing() {
        let out = truncate_html("<span>one<br />two three four</span>", 9, HELLIP, false);
        assert_eq!(out, "<span>one<br />two\u{2026}</span>");
    }

    fn html_fragment() -> impl Strategy<Value = String> {
        let leaf = prop_oneof![
            "[a-z ]{0,12}",
            Just("&amp;".to_string()),
            Just("<br />".to_string()),
            Just("<img src=\"x.png\" alt=\"a>b\">".to_string()),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            (
                prop::sample::select(vec!["b", "i", "p", "blockquote", "a"]),
                prop::collection::vec(inner, 0..4),
            )
                .prop_map(|(tag, children)| format!("<{tag}>{}</{tag}>", children.concat()))
        })
    }

    /// Every `<` of a tag in the output starts a complete tag from the input.
    fn tags_intact(out: &str) -> bool {
        segments(out).into_iter().all(|segment| match segment {
            Segment::Tag(tag) => tag.ends_with('>'),
            Segment::Text(text) => !text.contains('<'),
        })
    }

    proptest! {
        #[test]
        fn prop_truncate_respects_length(html in html_fragment(), n in 0usize..40, break_words in any::<bool>()) {
            let out = truncate_html(&html, n, HELLIP, break_words);
            prop_assert!(visible_length(&out) <= n, "{out:?} exceeds {n}");
        }

        #[test]
        fn prop_truncate_never_splits_tags(html in html_fragment(), n in 0usize..40) {
            let out = truncate_html(&html, n, HELLIP, false);
            prop_assert!(tags_intact(&out), "broken tag in {out:?}");
        }

        #[test]
        fn prop_strip_leaves_no_tags(html in html_fragment()) {
            let stripped = strip_html(&html);
            prop_assert!(!stripped.contains("<b>"));
            prop_assert!(!stripped.contains("</"));
        }
    }
}
