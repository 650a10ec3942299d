mod cli;
pub mod document;
pub mod highlight;
pub mod like;
pub mod markdown;
pub mod render;
pub mod store;
pub mod submit;
pub mod theme;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context as _;
use document::Page;
use highlight::Highlighter;
use kuchiki::NodeRef;
use like::{
    DryRunSubmitter, FixedAuthor, FormMethod, FormSubmitter, LikeHandler, LikeOutcome, StdinPrompt,
};
use markdown::Markdown;
use render::MarkdownPass;
use store::FileStore;
use submit::HttpSubmitter;
use theme::ThemeController;

pub use cli::{Args as CliArgs, Command, LikeArgs, PageArgs, PrefsArgs, RenderArgs, ToggleArgs};

/// Optional collaborators, resolved once at start-up.
pub struct Capabilities {
    pub markdown: Option<MarkdownPass>,
}

impl Capabilities {
    pub fn resolve(markdown: bool, highlight: bool) -> Self {
        if !markdown {
            return Self { markdown: None };
        }
        let highlighter = highlight.then(|| Arc::new(Highlighter::load_defaults()));
        tracing::debug!(highlight = highlighter.is_some(), "markdown enabled");
        Self {
            markdown: Some(MarkdownPass::new(
                Box::new(Markdown::new(highlighter.clone())),
                highlighter,
            )),
        }
    }
}

pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    match args.command {
        Command::Render(args) => render_page(&args),
        Command::ToggleTheme(args) => toggle_theme(&args),
        Command::Like(args) => like(&args).await,
    }
}

fn render_page(args: &RenderArgs) -> anyhow::Result<()> {
    let caps = Capabilities::resolve(!args.no_markdown, !args.no_highlight);
    let page = Page::load(&args.page.input, args.page.base_url.as_ref())?;

    // Script load: theme first, then the ready-time markdown pass.
    let mut store = FileStore::open(&args.prefs.prefs)?;
    let mut sink = page.theme();
    let applied =
        ThemeController::new(&mut store, &mut sink).initialize(&args.prefs.color_scheme)?;
    tracing::info!(theme = ?applied, "theme initialized");

    let summary = render::render_markdown(&page, caps.markdown.as_ref())?;
    if summary.failed > 0 {
        tracing::warn!(failed = summary.failed, "some markdown elements were left unrendered");
    }

    write_page(&page, args.page.out.as_deref())
}

fn toggle_theme(args: &ToggleArgs) -> anyhow::Result<()> {
    let page = Page::load(&args.page.input, args.page.base_url.as_ref())?;
    let mut store = FileStore::open(&args.prefs.prefs)?;
    let mut sink = page.theme();

    let mut controller = ThemeController::new(&mut store, &mut sink);
    controller.initialize(&args.prefs.color_scheme)?;
    let next = controller.toggle()?;
    tracing::info!(theme = %next, prefs = %args.prefs.prefs.display(), "theme saved");

    write_page(&page, args.page.out.as_deref())
}

async fn like(args: &LikeArgs) -> anyhow::Result<()> {
    let page = Page::load(&args.page.input, args.page.base_url.as_ref())?;
    let control = page
        .select_one(&args.control)?
        .with_context(|| format!("no element matches {:?}", args.control))?;
    let handler = LikeHandler::new(page.url());

    let outcome = if args.dry_run {
        let submitter = DryRunSubmitter::default();
        let outcome = invoke_like(&handler, &control, args, &submitter).await?;
        print_dry_run(&submitter);
        outcome
    } else {
        let submitter = HttpSubmitter::new(&args.user_agent)?;
        invoke_like(&handler, &control, args, &submitter).await?
    };

    match outcome {
        LikeOutcome::Declined => {
            tracing::info!(post_id = %args.post_id, "like declined; nothing submitted");
            Ok(())
        }
        LikeOutcome::Submitted(nav) => {
            tracing::info!(
                post_id = %args.post_id,
                url = %nav.url,
                status = ?nav.status,
                "like submitted"
            );
            if let Some(out) = &args.page.out {
                write_page(&page, Some(out))?;
            }
            Ok(())
        }
    }
}

async fn invoke_like(
    handler: &LikeHandler<'_>,
    control: &NodeRef,
    args: &LikeArgs,
    submitter: &impl FormSubmitter,
) -> anyhow::Result<LikeOutcome> {
    match &args.author {
        Some(author) => {
            let prompt = FixedAuthor(Some(author.clone()));
            handler
                .invoke(control, &args.post_id, &prompt, submitter)
                .await
        }
        None => {
            handler
                .invoke(control, &args.post_id, &StdinPrompt, submitter)
                .await
        }
    }
}

fn print_dry_run(submitter: &DryRunSubmitter) {
    for submission in submitter.submitted() {
        match submission.method {
            FormMethod::Get => println!("GET {}", submission.target()),
            FormMethod::Post => {
                println!("POST {}", submission.action);
                println!("{}", submission.encoded());
            }
        }
    }
}

fn write_page(page: &Page, out: Option<&Path>) -> anyhow::Result<()> {
    let html = page.to_html()?;
    match out {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .with_context(|| format!("create {}", parent.display()))?;
                }
            }
            std::fs::write(path, html).with_context(|| format!("write {}", path.display()))?;
        }
        None => print!("{html}"),
    }
    Ok(())
}
