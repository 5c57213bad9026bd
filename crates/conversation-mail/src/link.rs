//! Link building for forum routes.
//!
//! Routes follow the forum's controller scheme: `index.php?<controller>/<id>-<slug>/`,
//! or `<controller>/<id>-<slug>/` when rewritten URLs omit `index.php`.

use conversation_mail_core::Config;

/// Parameters of a link to a forum object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkParams {
    pub object_id: i64,
    /// Human-readable title, used for the URL slug.
    pub title: String,
    pub query: Vec<(String, String)>,
    /// Fragment without the leading `#`.
    pub anchor: Option<String>,
}

impl LinkParams {
    #[must_use]
    pub fn object(object_id: i64, title: impl Into<String>) -> Self {
        Self {
            object_id,
            title: title.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.anchor = Some(anchor.into());
        self
    }
}

/// Builds absolute links to forum controllers.
pub trait LinkBuilder {
    fn link(&self, controller: &str, params: &LinkParams) -> String;
}

/// Lowercase, dash-separated slug of `title`. Non-ASCII letters are kept.
#[must_use]
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase().filter(|c| c.is_alphanumeric()));
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn encode_query_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

/// [`LinkBuilder`] for the forum's controller routes under a base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLinkBuilder {
    base_url: String,
    omit_index_php: bool,
}

impl RouteLinkBuilder {
    #[must_use]
    pub fn new(base_url: impl Into<String>, omit_index_php: bool) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            omit_index_php,
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.site_base_url.clone(), config.url_omit_index_php)
    }
}

impl LinkBuilder for RouteLinkBuilder {
    fn link(&self, controller: &str, params: &LinkParams) -> String {
        let slug = slugify(&params.title);
        let mut path = controller.to_ascii_lowercase();
        path.push('/');
        path.push_str(&params.object_id.to_string());
        if !slug.is_empty() {
            path.push('-');
            path.push_str(&slug);
        }
        path.push('/');

        let (mut url, mut separator) = if self.omit_index_php {
            (format!("{}/{path}", self.base_url), '?')
        } else {
            (format!("{}/index.php?{path}", self.base_url), '&')
        };
        for (key, value) in &params.query {
            url.push(separator);
            url.push_str(&encode_query_component(key));
            url.push('=');
            url.push_str(&encode_query_component(value));
            separator = '&';
        }
        if let Some(anchor) = &params.anchor {
            url.push('#');
            url.push_str(anchor);
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  --a  b--  "), "a-b");
        assert_eq!(slugify("Über Größe"), "über-größe");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn index_php_route() {
        let links = RouteLinkBuilder::new("https://forum.test/", false);
        let params = LinkParams::object(12, "Team Meeting")
            .with_query("messageID", 5)
            .with_anchor("message5");
        assert_eq!(
            links.link("Conversation", &params),
            "https://forum.test/index.php?conversation/12-team-meeting/&messageID=5#message5"
        );
    }

    #[test]
    fn rewritten_route() {
        let links = RouteLinkBuilder::new("https://forum.test", true);
        let params = LinkParams::object(12, "Team Meeting")
            .with_query("messageID", 5)
            .with_anchor("message5");
        assert_eq!(
            links.link("Conversation", &params),
            "https://forum.test/conversation/12-team-meeting/?messageID=5#message5"
        );
    }

    #[test]
    fn empty_slug_and_no_query() {
        let links = RouteLinkBuilder::new("http://localhost", true);
        assert_eq!(
            links.link("Conversation", &LinkParams::object(3, "?")),
            "http://localhost/conversation/3/"
        );
    }

    #[test]
    fn query_values_are_encoded() {
        let links = RouteLinkBuilder::new("http://localhost", true);
        let params = LinkParams::object(3, "x").with_query("q", "a b&c");
        assert_eq!(
            links.link("Search", &params),
            "http://localhost/search/3-x/?q=a%20b%26c"
        );
    }

    proptest! {
        #[test]
        fn slug_is_url_path_safe(title in "\\PC{0,40}") {
            let slug = slugify(&title);
            prop_assert!(!slug.starts_with('-') && !slug.ends_with('-'));
            prop_assert!(!slug.contains("--"));
            prop_assert!(slug.chars().all(|c| c == '-' || c.is_alphanumeric()));
        }
    }

    #[test]
    fn from_config_uses_site_settings() {
        let config = Config {
            site_base_url: "https://example.org/forum".to_string(),
            url_omit_index_php: true,
            ..Config::default()
        };
        let links = RouteLinkBuilder::from_config(&config);
        assert_eq!(
            links.link("Conversation", &LinkParams::object(1, "Hi")),
            "https://example.org/forum/conversation/1-hi/"
        );
    }
}
