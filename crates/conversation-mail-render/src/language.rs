//! Phrase rendering.
//!
//! Phrases are embedded at compile time from `phrases/<language>/<key>.{html,txt}`
//! and rendered with MiniJinja. `.html` phrases auto-escape their variables,
//! `.txt` phrases (mail bodies, plain titles) do not.

use std::sync::LazyLock;

use conversation_mail_core::{MailError, MailResult};
use include_dir::{Dir, include_dir};
use minijinja::{AutoEscape, Environment};
use serde::Serialize;
use tracing::warn;

static PHRASE_DIR: Dir<'static> = include_dir!("$CARGO_MANIFEST_DIR/phrases");

pub const DEFAULT_LANGUAGE: &str = "en";

static ENV: LazyLock<Environment<'static>> = LazyLock::new(|| {
    let mut env = Environment::new();

    env.set_auto_escape_callback(|name| {
        let is_html = std::path::Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("html"));
        if is_html {
            AutoEscape::Html
        } else {
            AutoEscape::None
        }
    });

    // One directory per language code.
    for dir in PHRASE_DIR.dirs() {
        for file in dir.files() {
            let Some(name) = file.path().to_str() else {
                continue;
            };
            let Some(contents) = file.contents_utf8() else {
                warn!(phrase = name, "skipping phrase file with invalid utf-8");
                continue;
            };
            if let Err(err) = env.add_template(name, contents) {
                warn!(phrase = name, error = %err, "skipping unparsable phrase");
            }
        }
    }

    env
});

fn is_known_language(code: &str) -> bool {
    PHRASE_DIR.get_dir(code).is_some()
}

/// A language whose phrases can be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    code: String,
}

impl Default for Language {
    fn default() -> Self {
        Self {
            code: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

impl Language {
    /// Selects `code`, falling back to English when no phrases exist for it.
    #[must_use]
    pub fn new(code: &str) -> Self {
        let code = code.trim().to_ascii_lowercase();
        if is_known_language(&code) {
            Self { code }
        } else {
            warn!(language = %code, fallback = DEFAULT_LANGUAGE, "unknown language");
            Self::default()
        }
    }

    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    fn template_name(&self, key: &str) -> MailResult<String> {
        ["html", "txt"]
            .iter()
            .map(|ext| format!("{}/{key}.{ext}", self.code))
            .find(|name| ENV.get_template(name).is_ok())
            .ok_or_else(|| MailError::Template(format!("unknown phrase `{key}` for `{}`", self.code)))
    }

    /// Renders a phrase that takes no variables.
    pub fn get(&self, key: &str) -> MailResult<String> {
        self.get_dynamic_variable(key, ())
    }

    /// Renders a phrase with the variables in `ctx`.
    pub fn get_dynamic_variable<T: Serialize>(&self, key: &str, ctx: T) -> MailResult<String> {
        let name = self.template_name(key)?;
        let tpl = ENV
            .get_template(&name)
            .map_err(|err| MailError::Template(err.to_string()))?;
        tpl.render(ctx)
            .map_err(|err| MailError::Template(err.to_string()))
    }
}
