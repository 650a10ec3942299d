use std::sync::{Arc, LazyLock};

use maud::{PreEscaped, html};
use pulldown_cmark::{self as cmark, CodeBlockKind, CowStr, Event, LinkType, Tag, TagEnd};
use regex::Regex;

use crate::highlight::Highlighter;

pub trait MarkdownParser {
    fn parse(&self, content: &str) -> anyhow::Result<String>;
}

/// GitHub-flavoured Markdown with single newlines rendered as `<br />`.
pub struct Markdown {
    options: cmark::Options,
    breaks: bool,
    /// GFM autolink literals: bare `https://`, `www.` and e-mail text becomes a link.
    autolinks: bool,
    highlighter: Option<Arc<Highlighter>>,
}

impl Markdown {
    pub fn new(highlighter: Option<Arc<Highlighter>>) -> Self {
        let options = cmark::Options::ENABLE_TABLES
            | cmark::Options::ENABLE_STRIKETHROUGH
            | cmark::Options::ENABLE_TASKLISTS
            | cmark::Options::ENABLE_FOOTNOTES
            | cmark::Options::ENABLE_GFM;
        Self {
            options,
            breaks: true,
            autolinks: true,
            highlighter,
        }
    }
}

struct PendingCode {
    lang: Option<String>,
    text: String,
}

impl MarkdownParser for Markdown {
    fn parse(&self, content: &str) -> anyhow::Result<String> {
        let parser = cmark::TextMergeStream::new(cmark::Parser::new_ext(content, self.options));
        let mut events = Vec::new();
        let mut pending: Option<PendingCode> = None;
        // Inside a link, image or plain code block text must not be linkified again.
        let mut verbatim = 0usize;

        for event in parser {
            match &event {
                Event::Start(Tag::Link { .. } | Tag::Image { .. } | Tag::CodeBlock(_)) => {
                    verbatim += 1
                }
                Event::End(TagEnd::Link | TagEnd::Image | TagEnd::CodeBlock) => {
                    verbatim = verbatim.saturating_sub(1)
                }
                _ => {}
            }
            match (event, self.highlighter.as_deref()) {
                (Event::Start(Tag::CodeBlock(kind)), Some(_)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => {
                            info.split_whitespace().next().map(str::to_string)
                        }
                        CodeBlockKind::Indented => None,
                    };
                    pending = Some(PendingCode {
                        lang,
                        text: String::new(),
                    });
                }
                (Event::End(TagEnd::CodeBlock), Some(hl)) => {
                    let Some(code) = pending.take() else { continue };
                    events.push(Event::Html(code_block(hl, code)?.into()));
                }
                (Event::Text(text), _) if pending.is_some() => {
                    if let Some(code) = pending.as_mut() {
                        code.text.push_str(&text);
                    }
                }
                (Event::Text(text), _) if self.autolinks && verbatim == 0 => {
                    push_linkified(&mut events, text)
                }
                (Event::SoftBreak, _) if self.breaks => events.push(Event::HardBreak),
                (other, _) => events.push(other),
            }
        }

        let mut buf = String::with_capacity(content.len() * 3 / 2);
        cmark::html::push_html(&mut buf, events.into_iter());
        Ok(buf)
    }
}

static AUTOLINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:https?://|www\.)[^\s<]+|[a-z0-9._+-]+@[a-z0-9-]+(?:\.[a-z0-9_-]+)+",
    )
    .expect("autolink regex")
});

/// Splits a text event around GFM autolink literals.
fn push_linkified<'a>(events: &mut Vec<Event<'a>>, text: CowStr<'a>) {
    let links = autolinks(&text);
    if links.is_empty() {
        events.push(Event::Text(text));
        return;
    }

    let mut last = 0;
    for (start, end, dest) in links {
        if start > last {
            events.push(Event::Text(text[last..start].to_string().into()));
        }
        events.push(Event::Start(Tag::Link {
            link_type: LinkType::Autolink,
            dest_url: dest.into(),
            title: CowStr::Borrowed(""),
            id: CowStr::Borrowed(""),
        }));
        events.push(Event::Text(text[start..end].to_string().into()));
        events.push(Event::End(TagEnd::Link));
        last = end;
    }
    if last < text.len() {
        events.push(Event::Text(text[last..].to_string().into()));
    }
}

/// Finds `(start, end, href)` of every autolink literal in `text`.
fn autolinks(text: &str) -> Vec<(usize, usize, String)> {
    let mut found = Vec::new();
    for m in AUTOLINK.find_iter(text) {
        // A literal only starts at the beginning of text, after whitespace or after `*_~(`.
        let boundary = text[..m.start()]
            .chars()
            .next_back()
            .is_none_or(|c| c.is_whitespace() || matches!(c, '*' | '_' | '~' | '('));
        if !boundary {
            continue;
        }

        let literal = trim_link_tail(m.as_str());
        let is_email = !literal.contains("://") && !literal.to_ascii_lowercase().starts_with("www.");
        if is_email {
            // The domain of an e-mail literal may not end in `-` or `_`.
            if literal.ends_with(['-', '_']) || !literal.contains('@') {
                continue;
            }
        } else if !has_valid_domain(literal) {
            continue;
        }

        let href = if is_email {
            format!("mailto:{literal}")
        } else if literal.to_ascii_lowercase().starts_with("www.") {
            format!("http://{literal}")
        } else {
            literal.to_string()
        };
        found.push((m.start(), m.start() + literal.len(), href));
    }
    found
}

/// Drops trailing punctuation and unbalanced closing parentheses from a URL literal.
fn trim_link_tail(literal: &str) -> &str {
    let mut end = literal.len();
    loop {
        let current = &literal[..end];
        let Some(last) = current.chars().next_back() else {
            break;
        };
        let trim = match last {
            '?' | '!' | '.' | ',' | ':' | '*' | '_' | '~' | '\'' | '"' => true,
            ')' => current.matches(')').count() > current.matches('(').count(),
            _ => false,
        };
        if !trim {
            break;
        }
        end -= last.len_utf8();
    }
    &literal[..end]
}

/// The host part must have at least one dot and no `_` in its last two labels.
fn has_valid_domain(literal: &str) -> bool {
    let rest = literal
        .split_once("://")
        .map(|(_, r)| r)
        .unwrap_or(literal);
    let host = rest.split(['/', '?', '#']).next().unwrap_or("");
    let labels: Vec<&str> = host.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return false;
    }
    !labels[labels.len() - 2..].iter().any(|l| l.contains('_'))
}

fn code_block(hl: &Highlighter, code: PendingCode) -> anyhow::Result<String> {
    let highlighted = hl.highlight_code(&code.text, code.lang.as_deref())?;
    // The class mirrors the fence tag, not the detected language.
    let class = code.lang.map(|l| format!("language-{l}"));
    let markup = html! {
        pre {
            code class=[class] { (PreEscaped(highlighted.html)) }
        }
    };
    let mut out = markup.into_string();
    out.push('\n');
    Ok(out)
}
