use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context as _, anyhow};
use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink as _;
use regex::Regex;
use url::Url;

use crate::theme::{DATA_THEME_ATTR, ThemeSink};

static TEXTAREA_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(textarea)").expect("textarea end regex"));

/// A server-rendered page held as a mutable DOM.
pub struct Page {
    document: NodeRef,
    url: Url,
}

impl Page {
    pub fn parse(html: &str, url: Url) -> Self {
        Self {
            document: kuchiki::parse_html().one(html),
            url,
        }
    }

    /// Reads `path`. Without a base URL the page lives at its own `file://` URL.
    pub fn load(path: &Path, base_url: Option<&Url>) -> anyhow::Result<Self> {
        let html =
            std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let url = match base_url {
            Some(url) => url.clone(),
            None => {
                let abs = std::path::absolute(path)
                    .with_context(|| format!("resolve {}", path.display()))?;
                Url::from_file_path(&abs)
                    .map_err(|_| anyhow!("cannot express {} as a url", abs.display()))?
            }
        };
        Ok(Self::parse(&html, url))
    }

    pub fn document(&self) -> &NodeRef {
        &self.document
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn select_one(&self, selector: &str) -> anyhow::Result<Option<NodeRef>> {
        let mut nodes = self
            .document
            .select(selector)
            .map_err(|()| anyhow!("invalid selector {selector:?}"))?;
        Ok(nodes.next().map(|n| n.as_node().clone()))
    }

    pub fn theme(&self) -> DocumentTheme {
        DocumentTheme {
            document: self.document.clone(),
        }
    }

    pub fn to_html(&self) -> anyhow::Result<String> {
        let mut out = Vec::new();
        self.document
            .serialize(&mut out)
            .context("serialize page")?;
        String::from_utf8(out).context("page html not utf-8")
    }
}

/// `data-theme` on the root `<html>` element.
pub struct DocumentTheme {
    document: NodeRef,
}

impl ThemeSink for DocumentTheme {
    fn current(&self) -> Option<String> {
        let root = self.document.select_first("html").ok()?;
        root.attributes
            .borrow()
            .get(DATA_THEME_ATTR)
            .map(|s| s.to_string())
    }

    fn apply(&mut self, value: &str) {
        // html5ever always synthesizes <html>, even for fragments.
        if let Ok(root) = self.document.select_first("html") {
            root.attributes
                .borrow_mut()
                .insert(DATA_THEME_ATTR, value.to_string());
        }
    }
}

/// Decodes character references the way a `<textarea>`'s text interpretation does:
/// entities are resolved, markup stays literal text.
pub fn decode_entities(raw: &str) -> anyhow::Result<String> {
    // A bare closing tag would end the textarea early; keep it as text instead.
    let guarded = TEXTAREA_END.replace_all(raw, "&lt;/$1");
    // The parser eats one newline right after <textarea>, so give it one to eat.
    let doc = kuchiki::parse_html().one(format!("<body><textarea>\n{guarded}</textarea>"));
    let textarea = doc
        .select_first("textarea")
        .map_err(|()| anyhow!("textarea vanished while decoding entities"))?;
    Ok(textarea.text_contents())
}

pub fn parse_fragment(html: &str) -> Vec<NodeRef> {
    // Starting in body keeps leading whitespace and head-only tags in place.
    let doc = kuchiki::parse_html().one(format!("<body>{html}"));
    match doc.select_first("body") {
        Ok(body) => body.as_node().children().collect(),
        Err(()) => Vec::new(),
    }
}

/// Replaces every child of `node` with the parsed `html`.
pub fn set_inner_html(node: &NodeRef, html: &str) {
    let fresh = parse_fragment(html);
    let stale: Vec<_> = node.children().collect();
    for child in stale {
        child.detach();
    }
    for child in fresh {
        node.append(child);
    }
}

pub fn inner_html(node: &NodeRef) -> anyhow::Result<String> {
    let mut out = Vec::new();
    for child in node.children() {
        child.serialize(&mut out).context("serialize child")?;
    }
    String::from_utf8(out).context("inner html not utf-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(html: &str) -> Page {
        Page::parse(html, Url::parse("https://board.example.com/post/1").unwrap())
    }

    #[test]
    fn decodes_entities_without_interpreting_markup() {
        let decoded = decode_entities("&lt;em&gt;hi&lt;/em&gt;\nworld &amp; more").unwrap();
        assert_eq!(decoded, "<em>hi</em>\nworld & more");

        let literal = decode_entities("<b>bold</b> stays text").unwrap();
        assert_eq!(literal, "<b>bold</b> stays text");
    }

    #[test]
    fn decode_keeps_leading_newline_and_textarea_terminator() {
        assert_eq!(decode_entities("\nfirst").unwrap(), "\nfirst");
        assert_eq!(
            decode_entities("a </textarea> b</TEXTAREA>").unwrap(),
            "a </textarea> b</TEXTAREA>"
        );
    }

    #[test]
    fn theme_sink_targets_root_element() {
        let page = page("<!DOCTYPE html><html><head></head><body><p>x</p></body></html>");
        let mut theme = page.theme();
        assert_eq!(theme.current(), None);
        theme.apply("dark");
        assert_eq!(theme.current().as_deref(), Some("dark"));
        let html = page.to_html().unwrap();
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<html data-theme=\"dark\">"));
    }

    #[test]
    fn inner_html_replacement_is_destructive() {
        let page = page("<div id=\"t\"><span>old</span> text</div>");
        let node = page.select_one("#t").unwrap().unwrap();
        set_inner_html(&node, "  <p>new</p><title>kept in place</title>");
        assert_eq!(
            inner_html(&node).unwrap(),
            "  <p>new</p><title>kept in place</title>"
        );
    }

    #[test]
    fn invalid_selector_is_an_error() {
        let page = page("<p>x</p>");
        assert!(page.select_one("[[").is_err());
        assert!(page.select_one("form").unwrap().is_none());
    }
}
