//! Conversation Mail - message body renderer
//!
//! Renders a stored message body the way the forum shows it: full HTML,
//! simplified HTML, an excerpt, or plain mail text.

#![forbid(unsafe_code)]

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use conversation_mail::{ConversationMessage, MemoryAttachmentSource, RouteLinkBuilder};
use conversation_mail_core::{Config, MailResult, MessageRow};
use conversation_mail_render::MessageParser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "conversation-mail")]
#[command(version, about = "Render conversation message bodies")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Render a message body file (`-` reads stdin)
    Render(RenderArgs),

    /// Show configuration
    Config,
}

#[derive(clap::Args, Debug)]
struct RenderArgs {
    file: PathBuf,

    #[arg(long, value_enum, default_value_t = RenderMode::Html)]
    mode: RenderMode,

    /// Excerpt length in rendered characters (defaults to `MESSAGE_EXCERPT_LENGTH`).
    #[arg(long)]
    max_length: Option<usize>,

    #[arg(long)]
    no_smilies: bool,

    /// Treat the body as HTML instead of escaping it.
    #[arg(long)]
    html: bool,

    #[arg(long)]
    no_bbcodes: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum RenderMode {
    Html,
    Simplified,
    Excerpt,
    Mail,
}

fn read_body(path: &Path) -> MailResult<String> {
    if path.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        return Ok(body);
    }
    Ok(std::fs::read_to_string(path)?)
}

fn render(body: String, args: &RenderArgs, config: &Config) -> String {
    let message = ConversationMessage::new(MessageRow {
        message: body,
        enable_smilies: !args.no_smilies,
        enable_html: args.html,
        enable_bbcodes: !args.no_bbcodes,
        ..MessageRow::default()
    });
    let parser = MessageParser::from_config(config);

    match args.mode {
        RenderMode::Html => {
            // No stored attachments: inline references render empty.
            let attachments = MemoryAttachmentSource::new(RouteLinkBuilder::from_config(config));
            message.formatted_message(&parser, &attachments)
        }
        RenderMode::Simplified => message.simplified_formatted_message(&parser),
        RenderMode::Excerpt => {
            let max_length = args.max_length.unwrap_or(config.message_excerpt_length);
            message.excerpt(&parser, max_length)
        }
        RenderMode::Mail => message.mail_text(&parser),
    }
}

fn run(cli: Cli, config: &Config) -> MailResult<()> {
    match cli.command {
        Commands::Render(args) => {
            let body = read_body(&args.file)?;
            tracing::debug!(file = %args.file.display(), mode = ?args.mode, "rendering");
            println!("{}", render(body, &args, config));
        }
        Commands::Config => {
            println!("{config:#?}");
        }
    }
    Ok(())
}

fn main() {
    let config = Config::from_env();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.verbose {
        tracing::info!("Configuration loaded: {:?}", config);
    }

    if let Err(err) = run(cli, &config) {
        tracing::error!(error_type = err.error_type(), "{err}");
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> RenderArgs {
        let mut argv = vec!["conversation-mail", "render", "body.txt"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Render(args) => args,
            Commands::Config => panic!("expected render"),
        }
    }

    #[test]
    fn render_defaults() {
        let args = args(&[]);
        assert_eq!(args.mode, RenderMode::Html);
        assert!(args.max_length.is_none());
        assert!(!args.no_smilies && !args.html && !args.no_bbcodes);
    }

    #[test]
    fn render_flags_parsed() {
        let args = args(&["--mode", "excerpt", "--max-length", "20", "--html", "--no-bbcodes"]);
        assert_eq!(args.mode, RenderMode::Excerpt);
        assert_eq!(args.max_length, Some(20));
        assert!(args.html);
        assert!(args.no_bbcodes);
    }

    #[test]
    fn unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["conversation-mail", "render", "x", "--mode", "pdf"]).is_err());
    }

    #[test]
    fn missing_subcommand_rejected() {
        assert!(Cli::try_parse_from(["conversation-mail"]).is_err());
    }

    #[test]
    fn render_modes() {
        let config = Config::default();
        let body = "[b]Hi[/b] & bye :)".to_string();

        let html = render(body.clone(), &args(&[]), &config);
        assert!(html.contains("<strong>Hi</strong>"));
        assert!(html.contains("smile.png"));

        let simplified = render(body.clone(), &args(&["--mode", "simplified"]), &config);
        assert!(simplified.contains("&amp; bye :)"));

        let mail = render(body.clone(), &args(&["--mode", "mail"]), &config);
        assert_eq!(mail, "Hi & bye :)");

        let excerpt = render(body, &args(&["--mode", "excerpt", "--max-length", "4"]), &config);
        assert!(excerpt.starts_with("<strong>Hi"));
    }

    #[test]
    fn html_flag_controls_escaping() {
        let config = Config::default();
        let body = "<em>x</em>".to_string();
        let escaped = render(body.clone(), &args(&["--mode", "simplified"]), &config);
        assert!(escaped.contains("&lt;em&gt;"));
        let raw = render(body, &args(&["--mode", "simplified", "--html"]), &config);
        assert_eq!(raw, "<em>x</em>");
    }

    #[test]
    fn read_body_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("body.txt");
        std::fs::write(&path, "hello").unwrap();
        assert_eq!(read_body(&path).unwrap(), "hello");
        let err = read_body(&dir.path().join("missing.txt")).unwrap_err();
        assert_eq!(err.error_type(), "OS_ERROR");
    }
}
