//! Message parser: turns a stored message body into HTML.
//!
//! Pipeline: HTML policy (escape unless HTML is enabled), BBCode, smilies,
//! line breaks, then sanitization for the requested output type.
//!
//! Inline references such as `[attach=5]` are resolved through an explicit
//! [`EmbedContext`] passed per call; the parser holds no per-message state
//! and can be shared between renders.

use std::fmt;

use conversation_mail_core::Config;
use tracing::debug;

use crate::bbcode::{self, Node, Tag};
use crate::html::{escape_attr, escape_html};
use crate::sanitize::sanitize;
use crate::smilies::replace_smilies;

/// Output flavour of a parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputType {
    /// Full message view.
    #[default]
    Html,
    /// Reduced HTML for excerpts and mail: no images, no styling.
    SimplifiedHtml,
}

impl OutputType {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Html => "text/html",
            Self::SimplifiedHtml => "text/simplified-html",
        }
    }
}

impl fmt::Display for OutputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime_type())
    }
}

/// Per-message parse switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseOptions {
    pub enable_smilies: bool,
    pub enable_html: bool,
    pub enable_bbcodes: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            enable_smilies: true,
            enable_html: false,
            enable_bbcodes: true,
        }
    }
}

/// An attachment as needed to render it inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedAttachment {
    pub id: i64,
    pub filename: String,
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub is_image: bool,
}

/// Resolves inline object references for the message being rendered.
pub trait EmbeddedObjectSource {
    /// Returns the attachment `attachment_id` if it belongs to the object
    /// `(object_type, object_id)`.
    fn attachment(
        &self,
        object_type: &str,
        object_id: i64,
        attachment_id: i64,
    ) -> Option<EmbeddedAttachment>;
}

/// The object a render belongs to, with the source its references resolve against.
#[derive(Clone, Copy)]
pub struct EmbedContext<'a> {
    pub object_type: &'a str,
    pub object_id: i64,
    pub source: &'a dyn EmbeddedObjectSource,
}

impl fmt::Debug for EmbedContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbedContext")
            .field("object_type", &self.object_type)
            .field("object_id", &self.object_id)
            .finish_non_exhaustive()
    }
}

/// Stateless message parser.
#[derive(Debug, Clone)]
pub struct MessageParser {
    smiley_base_url: String,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl MessageParser {
    #[must_use]
    pub fn new(smiley_base_url: impl Into<String>) -> Self {
        Self {
            smiley_base_url: smiley_base_url.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.smiley_base_url.clone())
    }

    /// Parses `text` under `options` into sanitized HTML of type `output`.
    #[must_use]
    pub fn parse(
        &self,
        text: &str,
        options: ParseOptions,
        output: OutputType,
        embed: Option<&EmbedContext<'_>>,
    ) -> String {
        let text = text.replace("\r\n", "\n");
        let source = if options.enable_html {
            text
        } else {
            escape_html(&text)
        };

        let renderer = Renderer {
            smiley_base_url: &self.smiley_base_url,
            options,
            output,
            embed,
        };
        let html = if options.enable_bbcodes {
            renderer.render_nodes(&bbcode::parse(&source))
        } else {
            renderer.render_text(&source)
        };
        sanitize(&html, output)
    }
}

struct Renderer<'a> {
    smiley_base_url: &'a str,
    options: ParseOptions,
    output: OutputType,
    embed: Option<&'a EmbedContext<'a>>,
}

fn nl2br(text: &str) -> String {
    text.replace('\n', "<br />\n")
}

fn normalize_url(raw: &str) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() || url.chars().any(char::is_whitespace) {
        return None;
    }
    let lower = url.to_ascii_lowercase();
    if ["http://", "https://", "ftp://", "mailto:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return Some(url.to_string());
    }
    if lower.starts_with("www.") {
        return Some(format!("http://{url}"));
    }
    if url.starts_with('/') && !url.starts_with("//") {
        return Some(url.to_string());
    }
    None
}

fn is_valid_color(color: &str) -> bool {
    if let Some(hex) = color.strip_prefix('#') {
        return matches!(hex.len(), 3 | 6) && hex.bytes().all(|b| b.is_ascii_hexdigit());
    }
    (3..=20).contains(&color.len()) && color.bytes().all(|b| b.is_ascii_alphabetic())
}

/// Concatenated text of `nodes` if they are all text.
fn plain_text(nodes: &[Node]) -> Option<String> {
    nodes
        .iter()
        .map(|n| match n {
            Node::Text(t) => Some(t.as_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .map(|parts| parts.concat())
}

/// Splits list children at `[*]` markers and trims line breaks around items.
fn list_items(children: &[Node]) -> Vec<Vec<Node>> {
    let mut items: Vec<Vec<Node>> = Vec::new();
    let mut current: Vec<Node> = Vec::new();
    let mut seen_marker = false;
    for child in children {
        if matches!(child, Node::ListItem) {
            if seen_marker || plain_text(&current).is_none_or(|t| !t.trim().is_empty()) {
                items.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            seen_marker = true;
        } else {
            current.push(child.clone());
        }
    }
    if seen_marker || plain_text(&current).is_none_or(|t| !t.trim().is_empty()) {
        items.push(current);
    }

    for item in &mut items {
        if let Some(Node::Text(t)) = item.first_mut() {
            *t = t.trim_start().to_string();
        }
        if let Some(Node::Text(t)) = item.last_mut() {
            *t = t.trim_end().to_string();
        }
    }
    items
}

impl Renderer<'_> {
    const fn rich(&self) -> bool {
        matches!(self.output, OutputType::Html)
    }

    fn render_nodes(&self, nodes: &[Node]) -> String {
        let mut out = String::new();
        for node in nodes {
            self.render_node(node, &mut out);
        }
        out
    }

    fn render_text(&self, text: &str) -> String {
        if self.options.enable_smilies && self.rich() {
            nl2br(&replace_smilies(text, self.smiley_base_url))
        } else {
            nl2br(text)
        }
    }

    fn wrap(&self, out: &mut String, open: &str, close: &str, children: &[Node]) {
        out.push_str(open);
        out.push_str(&self.render_nodes(children));
        out.push_str(close);
    }

    fn render_node(&self, node: &Node, out: &mut String) {
        match node {
            Node::Text(text) => out.push_str(&self.render_text(text)),
            Node::Code { language, content } => self.render_code(language.as_deref(), content, out),
            Node::Attach { id } => self.render_attachment(*id, out),
            Node::ListItem => {}
            Node::Element { tag, arg, children } => {
                self.render_element(*tag, arg.as_deref(), children, out);
            }
        }
    }

    fn render_element(&self, tag: Tag, arg: Option<&str>, children: &[Node], out: &mut String) {
        match tag {
            Tag::Bold => self.wrap(out, "<strong>", "</strong>", children),
            Tag::Italic => self.wrap(out, "<em>", "</em>", children),
            Tag::Underline => self.wrap(out, "<u>", "</u>", children),
            Tag::Strike => self.wrap(out, "<del>", "</del>", children),
            Tag::Url => {
                let target = arg.map(str::to_string).or_else(|| plain_text(children));
                match target.as_deref().and_then(normalize_url) {
                    Some(href) => {
                        out.push_str(&format!("<a href=\"{}\">", escape_attr(&href)));
                        if children.is_empty() {
                            out.push_str(&escape_attr(&href));
                        } else {
                            out.push_str(&self.render_nodes(children));
                        }
                        out.push_str("</a>");
                    }
                    None => out.push_str(&self.render_nodes(children)),
                }
            }
            Tag::Img => {
                let src = plain_text(children).and_then(|s| normalize_url(&s));
                match src {
                    Some(src) if self.rich() => {
                        out.push_str(&format!(
                            "<img src=\"{}\" alt=\"\" class=\"bbcodeImage\" />",
                            escape_attr(&src)
                        ));
                    }
                    Some(src) => {
                        let src = escape_attr(&src);
                        out.push_str(&format!("<a href=\"{src}\">{src}</a>"));
                    }
                    None => out.push_str(&self.render_nodes(children)),
                }
            }
            Tag::Quote => {
                let author = arg
                    .and_then(|a| a.split(',').next())
                    .map(str::trim)
                    .filter(|a| !a.is_empty());
                out.push_str(if self.rich() {
                    "<blockquote class=\"quoteBox\">"
                } else {
                    "<blockquote>"
                });
                if let Some(author) = author {
                    out.push_str(&format!("<cite>{}</cite>", escape_attr(author)));
                }
                out.push_str(&self.render_nodes(children));
                out.push_str("</blockquote>");
            }
            Tag::List => {
                let ordered = matches!(arg, Some("1" | "a" | "A" | "i" | "I"));
                let (open, close) = if ordered {
                    ("<ol>", "</ol>")
                } else {
                    ("<ul>", "</ul>")
                };
                out.push_str(open);
                for item in list_items(children) {
                    self.wrap(out, "<li>", "</li>", &item);
                }
                out.push_str(close);
            }
            Tag::Color => match arg.map(str::trim) {
                Some(color) if self.rich() && is_valid_color(color) => self.wrap(
                    out,
                    &format!("<span style=\"color: {color}\">"),
                    "</span>",
                    children,
                ),
                _ => out.push_str(&self.render_nodes(children)),
            },
            Tag::Size => match arg.and_then(|a| a.trim().parse::<u32>().ok()) {
                Some(size) if self.rich() && (8..=36).contains(&size) => self.wrap(
                    out,
                    &format!("<span style=\"font-size: {size}pt\">"),
                    "</span>",
                    children,
                ),
                _ => out.push_str(&self.render_nodes(children)),
            },
            // Produced as dedicated nodes by the tokenizer.
            Tag::Code | Tag::Attach => out.push_str(&self.render_nodes(children)),
        }
    }

    fn render_code(&self, language: Option<&str>, content: &str, out: &mut String) {
        let content = content.strip_prefix('\n').unwrap_or(content);
        let content = if self.options.enable_html {
            escape_html(content)
        } else {
            content.to_string()
        };
        let language = language
            .map(str::trim)
            .filter(|l| !l.is_empty() && l.len() <= 32 && l.bytes().all(|b| b.is_ascii_alphanumeric()));
        match language {
            Some(language) if self.rich() => out.push_str(&format!(
                "<pre class=\"codeBox\"><code class=\"language-{}\">",
                language.to_ascii_lowercase()
            )),
            None if self.rich() => out.push_str("<pre class=\"codeBox\"><code>"),
            _ => out.push_str("<pre><code>"),
        }
        out.push_str(&content);
        out.push_str("</code></pre>");
    }

    fn render_attachment(&self, attachment_id: i64, out: &mut String) {
        let resolved = self.embed.and_then(|ctx| {
            ctx.source
                .attachment(ctx.object_type, ctx.object_id, attachment_id)
        });
        let Some(attachment) = resolved else {
            debug!(
                attachment_id,
                object_id = self.embed.map(|ctx| ctx.object_id),
                "embedded attachment not resolvable"
            );
            return;
        };

        let url = escape_attr(&attachment.url);
        let filename = escape_html(&attachment.filename);
        if self.rich() && attachment.is_image {
            let src = attachment
                .thumbnail_url
                .as_deref()
                .map_or_else(|| url.clone(), escape_attr);
            out.push_str(&format!(
                "<a href=\"{url}\" class=\"embeddedAttachmentLink\"><img src=\"{src}\" alt=\"{filename}\" class=\"embeddedAttachment\" /></a>"
            ));
        } else {
            out.push_str(&format!("<a href=\"{url}\">{filename}</a>"));
        }
    }
}
