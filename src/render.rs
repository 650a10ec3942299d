use std::sync::Arc;

use anyhow::Context as _;
use kuchiki::{ElementData, NodeDataRef, NodeRef};

use crate::document::{Page, decode_entities, set_inner_html};
use crate::highlight::Highlighter;
use crate::markdown::MarkdownParser;

/// Attribute carrying the entity-encoded Markdown source of a post body.
pub const MARKDOWN_ATTR: &str = "data-markdown";

pub struct MarkdownPass {
    parser: Box<dyn MarkdownParser>,
    highlighter: Option<Arc<Highlighter>>,
}

impl MarkdownPass {
    pub fn new(parser: Box<dyn MarkdownParser>, highlighter: Option<Arc<Highlighter>>) -> Self {
        Self {
            parser,
            highlighter,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderSummary {
    pub rendered: usize,
    pub failed: usize,
}

/// Renders every `[data-markdown]` element of the page in place.
///
/// Without a parser the step is skipped outright. A payload that fails to decode or parse leaves
/// its element untouched and counts as failed; no failure stops the scan. A code block that fails
/// to highlight stays as the parser emitted it.
pub fn render_markdown(page: &Page, pass: Option<&MarkdownPass>) -> anyhow::Result<RenderSummary> {
    let mut summary = RenderSummary::default();
    let Some(pass) = pass else {
        tracing::debug!("markdown parser unavailable; skipping render");
        return Ok(summary);
    };

    let selector = format!("[{MARKDOWN_ATTR}]");
    let targets: Vec<_> = page
        .document()
        .select(&selector)
        .map_err(|()| anyhow::anyhow!("invalid selector {selector}"))?
        .collect();

    for (index, el) in targets.iter().enumerate() {
        match render_element(el, pass) {
            Ok(()) => summary.rendered += 1,
            Err(e) => {
                summary.failed += 1;
                tracing::warn!(
                    index,
                    error = %format!("{e:#}"),
                    "markdown element failed; skipping"
                );
            }
        }
    }

    tracing::info!(
        rendered = summary.rendered,
        failed = summary.failed,
        "rendered markdown"
    );
    Ok(summary)
}

fn render_element(el: &NodeDataRef<ElementData>, pass: &MarkdownPass) -> anyhow::Result<()> {
    let raw = el
        .attributes
        .borrow()
        .get(MARKDOWN_ATTR)
        .map(|s| s.to_string())
        .unwrap_or_default();
    let source = decode_entities(&raw).context("decode markdown payload")?;
    let html = pass.parser.parse(&source).context("parse markdown")?;
    set_inner_html(el.as_node(), &html);

    if let Some(hl) = &pass.highlighter {
        highlight_blocks(el.as_node(), |code| hl.highlight_element(code));
    }
    Ok(())
}

/// Runs `highlight` over every `pre code` under `root`. Returns how many blocks failed.
fn highlight_blocks(
    root: &NodeRef,
    mut highlight: impl FnMut(&NodeDataRef<ElementData>) -> anyhow::Result<bool>,
) -> usize {
    let Ok(blocks) = root.select("pre code") else {
        return 0;
    };
    let mut failed = 0;
    for (block, code) in blocks.collect::<Vec<_>>().iter().enumerate() {
        if let Err(e) = highlight(code) {
            failed += 1;
            tracing::warn!(
                block,
                error = %format!("{e:#}"),
                "code block left unhighlighted"
            );
        }
    }
    failed
}
