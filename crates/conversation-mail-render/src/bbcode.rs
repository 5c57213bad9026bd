//! BBCode syntax: tokenizer and tree builder.
//!
//! Only known tags are recognised; anything else stays literal text.
//! Closing a tag implicitly abandons unclosed tags opened inside it; those
//! abandoned tags, like tags never closed at all, fall back to their literal
//! source text. `[code]` content and `[attach]` are taken verbatim.

/// Recognised BBCode tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Bold,
    Italic,
    Underline,
    Strike,
    Url,
    Img,
    Quote,
    Code,
    List,
    Color,
    Size,
    Attach,
}

impl Tag {
    fn from_name(name: &str) -> Option<Self> {
        let tag = match name.to_ascii_lowercase().as_str() {
            "b" => Self::Bold,
            "i" => Self::Italic,
            "u" => Self::Underline,
            "s" => Self::Strike,
            "url" => Self::Url,
            "img" => Self::Img,
            "quote" => Self::Quote,
            "code" => Self::Code,
            "list" => Self::List,
            "color" => Self::Color,
            "size" => Self::Size,
            "attach" => Self::Attach,
            _ => return None,
        };
        Some(tag)
    }
}

/// A parsed BBCode node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    Element {
        tag: Tag,
        arg: Option<String>,
        children: Vec<Self>,
    },
    /// Verbatim `[code]` block; `language` is the `[code=...]` argument.
    Code {
        language: Option<String>,
        content: String,
    },
    /// `[attach=ID]`, optionally followed by `[/attach]`.
    Attach { id: i64 },
    /// `[*]` list item marker; only meaningful inside `[list]`.
    ListItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Text(String),
    Open {
        tag: Tag,
        arg: Option<String>,
        raw: String,
    },
    Close {
        tag: Tag,
        raw: String,
    },
    Code {
        language: Option<String>,
        content: String,
    },
    Attach {
        id: i64,
    },
    ListItem,
}

/// Strips one pair of surrounding quotes, raw or HTML-escaped.
fn unquote(arg: &str) -> &str {
    let arg = arg.trim();
    for quote in ["'", "\"", "&#x27;", "&quot;"] {
        if let Some(inner) = arg.strip_prefix(quote).and_then(|a| a.strip_suffix(quote)) {
            return inner;
        }
    }
    arg
}

/// Parses a single tag at the start of `s` (which begins with `[`).
/// Returns the token and the byte length consumed.
fn parse_tag(s: &str) -> Option<(Token, usize)> {
    let end = s.find(']')?;
    let inner = &s[1..end];
    if inner.contains('[') || inner.contains('\n') {
        return None;
    }
    let raw = s[..=end].to_string();

    if inner == "*" {
        return Some((Token::ListItem, end + 1));
    }
    if let Some(name) = inner.strip_prefix('/') {
        let tag = Tag::from_name(name)?;
        return Some((Token::Close { tag, raw }, end + 1));
    }

    let (name, arg) = match inner.split_once('=') {
        Some((name, arg)) => (name, Some(unquote(arg).to_string())),
        None => (inner, None),
    };
    let tag = Tag::from_name(name)?;
    Some((Token::Open { tag, arg, raw }, end + 1))
}

fn find_ignore_ascii_case(haystack: &str, needle: &str) -> Option<usize> {
    let hay = haystack.as_bytes();
    let pat = needle.as_bytes();
    if pat.len() > hay.len() {
        return None;
    }
    (0..=hay.len() - pat.len()).find(|&i| hay[i..i + pat.len()].eq_ignore_ascii_case(pat))
}

fn push_text(tokens: &mut Vec<Token>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Token::Text(prev)) = tokens.last_mut() {
        prev.push_str(text);
    } else {
        tokens.push(Token::Text(text.to_string()));
    }
}

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut rest = input;

    while let Some(pos) = rest.find('[') {
        push_text(&mut tokens, &rest[..pos]);
        let candidate = &rest[pos..];

        let Some((token, consumed)) = parse_tag(candidate) else {
            push_text(&mut tokens, "[");
            rest = &candidate[1..];
            continue;
        };
        let after = &candidate[consumed..];

        match token {
            Token::Open {
                tag: Tag::Code,
                arg,
                raw,
            } => {
                if let Some(close) = find_ignore_ascii_case(after, "[/code]") {
                    tokens.push(Token::Code {
                        language: arg,
                        content: after[..close].to_string(),
                    });
                    rest = &after[close + "[/code]".len()..];
                } else {
                    push_text(&mut tokens, &raw);
                    rest = after;
                }
            }
            Token::Open {
                tag: Tag::Attach,
                arg,
                raw,
            } => {
                match arg.as_deref().and_then(|a| a.trim().parse::<i64>().ok()) {
                    Some(id) if id > 0 => {
                        let closing = "[/attach]";
                        rest = after;
                        if after.len() >= closing.len()
                            && after.as_bytes()[..closing.len()].eq_ignore_ascii_case(closing.as_bytes())
                        {
                            rest = &after[closing.len()..];
                        }
                        tokens.push(Token::Attach { id });
                    }
                    _ => {
                        push_text(&mut tokens, &raw);
                        rest = after;
                    }
                }
            }
            token => {
                tokens.push(token);
                rest = after;
            }
        }
    }
    push_text(&mut tokens, rest);
    tokens
}

struct Frame {
    tag: Tag,
    arg: Option<String>,
    raw: String,
    children: Vec<Node>,
}

fn push_node(target: &mut Vec<Node>, node: Node) {
    if let Node::Text(text) = &node
        && let Some(Node::Text(prev)) = target.last_mut()
    {
        prev.push_str(text);
        return;
    }
    target.push(node);
}

/// Turns an abandoned frame back into its literal source.
fn flatten(frame: Frame, target: &mut Vec<Node>) {
    push_node(target, Node::Text(frame.raw));
    for child in frame.children {
        push_node(target, child);
    }
}

/// Parses BBCode `input` into a node tree.
#[must_use]
pub fn parse(input: &str) -> Vec<Node> {
    let mut root: Vec<Node> = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokenize(input) {
        let node = match token {
            Token::Text(text) => Node::Text(text),
            Token::Code { language, content } => Node::Code { language, content },
            Token::Attach { id } => Node::Attach { id },
            Token::ListItem => {
                if stack.iter().any(|f| f.tag == Tag::List) {
                    Node::ListItem
                } else {
                    Node::Text("[*]".to_string())
                }
            }
            Token::Open { tag, arg, raw } => {
                stack.push(Frame {
                    tag,
                    arg,
                    raw,
                    children: Vec::new(),
                });
                continue;
            }
            Token::Close { tag, raw } => {
                let Some(pos) = stack.iter().rposition(|f| f.tag == tag) else {
                    let target = stack.last_mut().map_or(&mut root, |f| &mut f.children);
                    push_node(target, Node::Text(raw));
                    continue;
                };
                let abandoned = stack.split_off(pos + 1);
                let Some(mut frame) = stack.pop() else {
                    continue;
                };
                for inner in abandoned {
                    flatten(inner, &mut frame.children);
                }
                Node::Element {
                    tag: frame.tag,
                    arg: frame.arg,
                    children: frame.children,
                }
            }
        };
        let target = stack.last_mut().map_or(&mut root, |f| &mut f.children);
        push_node(target, node);
    }

    // Unclosed tags at end of input: fold back into literal text, innermost first.
    while let Some(frame) = stack.pop() {
        let target = stack.last_mut().map_or(&mut root, |f| &mut f.children);
        flatten(frame, target);
    }
    root
}
