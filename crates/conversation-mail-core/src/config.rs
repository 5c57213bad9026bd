//! Configuration management for Conversation Mail
//!
//! Configuration is loaded from environment variables with a working-directory
//! `.env` file as fallback. Option names mirror the forum's global constants
//! (`MODULE_ATTACHMENT`, `URL_OMIT_INDEX_PHP`, ...).

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

/// Default length of message excerpts, in rendered characters.
pub const DEFAULT_EXCERPT_LENGTH: usize = 255;

/// Main configuration struct for Conversation Mail
#[derive(Clone)]
pub struct Config {
    // Modules
    /// Attachment module switch (`MODULE_ATTACHMENT`).
    pub module_attachment: bool,

    // Links
    pub site_base_url: String,
    pub url_omit_index_php: bool,

    // Rendering
    pub smiley_base_url: String,
    pub message_excerpt_length: usize,

    // Notifications
    pub notification_language: String,

    // Logging
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module_attachment: true,
            site_base_url: "http://localhost".to_string(),
            url_omit_index_php: false,
            smiley_base_url: "images/smilies".to_string(),
            message_excerpt_length: DEFAULT_EXCERPT_LENGTH,
            notification_language: "en".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Module-level shared config cache (used by `Config::get` and `Config::reset_cached`).
static CONFIG_CACHE: std::sync::RwLock<Option<Config>> = std::sync::RwLock::new(None);

fn global_config_cache_get() -> Config {
    {
        let guard = CONFIG_CACHE
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(ref c) = *guard {
            return c.clone();
        }
    }
    let mut guard = CONFIG_CACHE
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    guard.get_or_insert_with(Config::from_env).clone()
}

fn global_config_cache_reset() {
    let mut guard = CONFIG_CACHE
        .write()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    *guard = None;
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("module_attachment", &self.module_attachment)
            .field("site_base_url", &self.site_base_url)
            .field("url_omit_index_php", &self.url_omit_index_php)
            .field("message_excerpt_length", &self.message_excerpt_length)
            .field("notification_language", &self.notification_language)
            .field("log_level", &self.log_level)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Modules
        config.module_attachment = env_bool("MODULE_ATTACHMENT", config.module_attachment);

        // Links
        if let Some(v) = env_value("SITE_BASE_URL") {
            let trimmed = v.trim().trim_end_matches('/');
            if !trimmed.is_empty() {
                config.site_base_url = trimmed.to_string();
            }
        }
        config.url_omit_index_php = env_bool("URL_OMIT_INDEX_PHP", config.url_omit_index_php);

        // Rendering
        if let Some(v) = env_value("SMILEY_BASE_URL") {
            config.smiley_base_url = v.trim().trim_end_matches('/').to_string();
        }
        config.message_excerpt_length =
            env_usize("MESSAGE_EXCERPT_LENGTH", config.message_excerpt_length);
        if config.message_excerpt_length == 0 {
            config.message_excerpt_length = DEFAULT_EXCERPT_LENGTH;
        }

        // Notifications
        if let Some(v) = env_value("NOTIFICATION_LANGUAGE") {
            let lang = v.trim().to_ascii_lowercase();
            if !lang.is_empty() {
                config.notification_language = lang;
            }
        }

        // Logging
        if let Some(v) = env_value("LOG_LEVEL") {
            config.log_level = match v.trim().to_ascii_lowercase().as_str() {
                level @ ("trace" | "debug" | "info" | "warn" | "error") => level.to_string(),
                "warning" => "warn".to_string(),
                other => {
                    tracing::warn!(value = other, "unknown LOG_LEVEL, keeping default");
                    config.log_level
                }
            };
        }

        config
    }

    /// Returns the process-wide cached configuration, loading it on first use.
    #[must_use]
    pub fn get() -> Self {
        global_config_cache_get()
    }

    /// Reset the global config cache, forcing the next [`Config::get`] call to
    /// re-parse environment variables.
    pub fn reset_cached() {
        global_config_cache_reset();
    }
}

// Helper functions for environment variable parsing

static DOTENV_VALUES: OnceLock<HashMap<String, String>> = OnceLock::new();

#[cfg(test)]
thread_local! {
    static TEST_ENV_OVERRIDES: std::cell::RefCell<HashMap<String, String>> =
        std::cell::RefCell::new(HashMap::new());
}

#[cfg(test)]
fn test_env_override_value(key: &str) -> Option<String> {
    TEST_ENV_OVERRIDES.with(|cell| cell.borrow().get(key).cloned())
}

fn dotenv_values() -> &'static HashMap<String, String> {
    DOTENV_VALUES.get_or_init(|| load_dotenv_file(Path::new(".env")))
}

/// Read a value from the .env file (if present).
#[must_use]
pub fn dotenv_value(key: &str) -> Option<String> {
    dotenv_values().get(key).cloned()
}

/// Read a value from the real environment first, falling back to .env.
#[must_use]
pub fn env_value(key: &str) -> Option<String> {
    #[cfg(test)]
    if let Some(v) = test_env_override_value(key) {
        return Some(v);
    }
    env::var(key).ok().or_else(|| dotenv_value(key))
}

fn load_dotenv_file(path: &Path) -> HashMap<String, String> {
    let Ok(contents) = fs::read_to_string(path) else {
        return HashMap::new();
    };
    parse_dotenv_contents(&contents)
}

/// Parse `KEY=value` lines. Supports `export ` prefixes, quoted values and
/// trailing `# comments`.
#[must_use]
pub fn parse_dotenv_contents(contents: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for raw_line in contents.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), parse_dotenv_value(value));
    }
    map
}

fn parse_dotenv_value(raw: &str) -> String {
    let trimmed = raw.trim();
    for quote in ['"', '\''] {
        if let Some(rest) = trimmed.strip_prefix(quote)
            && let Some(end) = rest.find(quote)
        {
            let remainder = rest[end + 1..].trim_start();
            if remainder.is_empty() || remainder.starts_with('#') {
                return rest[..end].to_string();
            }
        }
    }
    strip_inline_comment(trimmed).to_string()
}

fn strip_inline_comment(value: &str) -> &str {
    let bytes = value.as_bytes();
    for i in 0..bytes.len() {
        if bytes[i] == b'#' && (i == 0 || bytes[i - 1].is_ascii_whitespace()) {
            return value[..i].trim_end();
        }
    }
    value
}

fn parse_bool(value: &str, default: bool) -> bool {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => true,
        "0" | "false" | "f" | "no" | "n" | "off" => false,
        _ => default,
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env_value(key).map_or(default, |v| parse_bool(&v, default))
}

fn env_usize(key: &str, default: usize) -> usize {
    env_value(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
