//! Smiley codes and their replacement in text nodes.
//!
//! A code only matches as a whole whitespace-delimited word, so `&#x27;)`
//! or `http://x` never turn into smilies.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::html::escape_attr;

/// A smiley code and the image it renders as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Smiley {
    pub code: &'static str,
    pub title: &'static str,
    pub file: &'static str,
}

pub const DEFAULT_SMILIES: &[Smiley] = &[
    Smiley { code: ":)", title: "smile", file: "smile.png" },
    Smiley { code: ";)", title: "wink", file: "wink.png" },
    Smiley { code: ":(", title: "sad", file: "sad.png" },
    Smiley { code: ":D", title: "biggrin", file: "biggrin.png" },
    Smiley { code: ";(", title: "crying", file: "crying.png" },
    Smiley { code: ":P", title: "tongue", file: "tongue.png" },
    Smiley { code: "8)", title: "cool", file: "cool.png" },
    Smiley { code: ":S", title: "unsure", file: "unsure.png" },
    Smiley { code: "^^", title: "squint", file: "squint.png" },
];

static WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+").expect("static regex"));

fn lookup(word: &str) -> Option<&'static Smiley> {
    DEFAULT_SMILIES.iter().find(|s| s.code == word)
}

/// Replaces smiley codes in `text` with `<img>` tags under `base_url`.
#[must_use]
pub fn replace_smilies(text: &str, base_url: &str) -> String {
    WORD.replace_all(text, |caps: &Captures<'_>| {
        let word = &caps[0];
        lookup(word).map_or_else(
            || word.to_string(),
            |smiley| {
                format!(
                    "<img src=\"{}/{}\" alt=\"{}\" title=\"{}\" class=\"smiley\" />",
                    escape_attr(base_url),
                    smiley.file,
                    smiley.code,
                    smiley.title
                )
            },
        )
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_whole_words_only() {
        let out = replace_smilies("hi :) there:)", "img");
        assert_eq!(
            out,
            "hi <img src=\"img/smile.png\" alt=\":)\" title=\"smile\" class=\"smiley\" /> there:)"
        );
    }

    #[test]
    fn ignores_escaped_quote_entities() {
        let out = replace_smilies("it&#x27;) ok", "img");
        assert_eq!(out, "it&#x27;) ok");
    }

    #[test]
    fn keeps_whitespace_layout() {
        let out = replace_smilies("a\n\n^^\tb", "s");
        assert!(out.starts_with("a\n\n<img src=\"s/squint.png\""));
        assert!(out.ends_with("/>\tb"));
    }

    #[test]
    fn codes_are_unique() {
        let mut codes: Vec<_> = DEFAULT_SMILIES.iter().map(|s| s.code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), DEFAULT_SMILIES.len());
    }
}
