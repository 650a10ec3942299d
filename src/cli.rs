use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use url::Url;

use crate::theme::ColorScheme;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply the saved theme and render every `data-markdown` element of a page.
    Render(RenderArgs),
    /// Flip the page theme between dark and light and remember the choice.
    ToggleTheme(ToggleArgs),
    /// Ask for an author name and submit the like form around a control.
    Like(LikeArgs),
}

#[derive(Debug, Clone, ClapArgs)]
pub struct PageArgs {
    /// Server-rendered HTML page.
    #[arg(long)]
    pub input: PathBuf,

    /// Output path for the updated page.
    ///
    /// `render` and `toggle-theme` write to stdout when omitted; `like` only writes when given.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// URL the page was served from (e.g. `https://board.example.com/post/3`).
    ///
    /// Defaults to the `file://` URL of `--input`.
    #[arg(long)]
    pub base_url: Option<Url>,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct PrefsArgs {
    /// JSON file holding persisted preferences (the theme, keyed `theme`).
    #[arg(long, default_value = "board-page.prefs.json")]
    pub prefs: PathBuf,

    /// What the OS reports for `prefers-color-scheme`.
    #[arg(long, value_enum, default_value = "no-preference")]
    pub color_scheme: ColorScheme,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct RenderArgs {
    #[command(flatten)]
    pub page: PageArgs,

    #[command(flatten)]
    pub prefs: PrefsArgs,

    /// Leave Markdown payloads unrendered, as if no parser were loaded.
    #[arg(long)]
    pub no_markdown: bool,

    /// Render code blocks as plain escaped text.
    #[arg(long)]
    pub no_highlight: bool,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct ToggleArgs {
    #[command(flatten)]
    pub page: PageArgs,

    #[command(flatten)]
    pub prefs: PrefsArgs,
}

#[derive(Debug, Clone, ClapArgs)]
pub struct LikeArgs {
    #[command(flatten)]
    pub page: PageArgs,

    /// CSS selector of the like control that was activated.
    #[arg(long)]
    pub control: String,

    /// Post the control belongs to. Only used for logging.
    #[arg(long)]
    pub post_id: String,

    /// Author name. Prompts on stdin when omitted.
    #[arg(long)]
    pub author: Option<String>,

    /// Print the submission instead of sending it.
    #[arg(long)]
    pub dry_run: bool,

    /// HTTP User-Agent used for the submission.
    #[arg(long, default_value = "board-page/0.1")]
    pub user_agent: String,
}
