//! End-to-end checks of the parse → truncate / strip pipeline used for
//! excerpts and mail bodies.

use conversation_mail_core::Config;
use conversation_mail_render::{
    HELLIP, Language, MessageParser, OutputType, ParseOptions, decode_html, strip_html,
    truncate_html, visible_length,
};

fn simplified(parser: &MessageParser, body: &str, options: ParseOptions) -> String {
    parser.parse(body, options, OutputType::SimplifiedHtml, None)
}

#[test]
fn mail_text_of_html_body_is_decoded_plain_text() {
    let parser = MessageParser::default();
    let options = ParseOptions {
        enable_html: true,
        ..ParseOptions::default()
    };
    let html = simplified(&parser, "<b>Hi &amp; bye</b>", options);
    assert_eq!(decode_html(&strip_html(&html)), "Hi & bye");
}

#[test]
fn mail_text_keeps_line_breaks() {
    let parser = MessageParser::default();
    let html = simplified(&parser, "[b]one[/b]\ntwo", ParseOptions::default());
    assert_eq!(decode_html(&strip_html(&html)), "one\ntwo");
}

#[test]
fn excerpt_never_exceeds_limit_and_keeps_markup_balanced() {
    let parser = MessageParser::default();
    let body = "[b]".to_string() + &"word ".repeat(200) + "[/b] tail & more";
    let html = simplified(&parser, &body, ParseOptions::default());
    let excerpt = truncate_html(&html, 40, HELLIP, false);

    assert!(visible_length(&excerpt) <= 40);
    assert!(excerpt.starts_with("<strong>"));
    assert!(excerpt.ends_with(&format!("{HELLIP}</strong>")));
}

#[test]
fn short_message_excerpt_is_unchanged() {
    let parser = MessageParser::default();
    let html = simplified(&parser, "just a line", ParseOptions::default());
    assert_eq!(truncate_html(&html, 255, HELLIP, false), "just a line");
}

#[test]
fn parser_uses_configured_smiley_location() {
    let config = Config {
        smiley_base_url: "https://cdn.example.com/smilies".to_string(),
        ..Config::default()
    };
    let parser = MessageParser::from_config(&config);
    let html = parser.parse(":D", ParseOptions::default(), OutputType::Html, None);
    assert!(html.contains("https://cdn.example.com/smilies/biggrin.png"));
}

#[test]
fn simplified_output_has_no_images_or_styles() {
    let parser = MessageParser::default();
    let html = simplified(
        &parser,
        "[img]https://example.com/a.png[/img] [size=20]big[/size] ;)",
        ParseOptions::default(),
    );
    assert!(!html.contains("<img"));
    assert!(!html.contains("style"));
    assert!(html.contains(";)"));
}

#[test]
fn phrases_render_in_configured_language() {
    let config = Config {
        notification_language: "de".to_string(),
        ..Config::default()
    };
    let language = Language::new(&config.notification_language);
    assert_eq!(language.get("conversation.title").unwrap(), "Neue Konversation");
}
