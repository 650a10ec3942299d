use anyhow::Context as _;
use kuchiki::{ElementData, NodeDataRef};
use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::document::set_inner_html;

/// Prefix for every token class emitted into highlighted markup.
pub const CLASS_STYLE: ClassStyle = ClassStyle::SpacedPrefixed { prefix: "hl-" };

const HIGHLIGHTED_ATTR: &str = "data-highlighted";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighted {
    /// Language the code was highlighted as; `None` when it fell back to plain text.
    pub language: Option<String>,
    pub html: String,
}

pub struct Highlighter {
    syntaxes: SyntaxSet,
}

impl Highlighter {
    pub fn load_defaults() -> Self {
        Self {
            syntaxes: SyntaxSet::load_defaults_newlines(),
        }
    }

    /// Looks a fence tag up by syntax name or file extension.
    pub fn language(&self, token: &str) -> Option<&SyntaxReference> {
        let token = token.trim();
        if token.is_empty() {
            return None;
        }
        self.syntaxes.find_syntax_by_token(token)
    }

    pub fn highlight(&self, code: &str, token: &str) -> anyhow::Result<Highlighted> {
        let syntax = self
            .language(token)
            .with_context(|| format!("unknown language {token:?}"))?;
        Ok(Highlighted {
            language: Some(token.trim().to_ascii_lowercase()),
            html: self.classed_html(code, syntax)?,
        })
    }

    pub fn highlight_auto(&self, code: &str) -> anyhow::Result<Highlighted> {
        let first_line = code.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
        match self.syntaxes.find_syntax_by_first_line(first_line) {
            Some(syntax) => Ok(Highlighted {
                language: Some(language_label(syntax)),
                html: self.classed_html(code, syntax)?,
            }),
            None => Ok(Highlighted {
                language: None,
                html: self.classed_html(code, self.syntaxes.find_syntax_plain_text())?,
            }),
        }
    }

    /// Per-block hook used while rendering Markdown: a recognised fence tag is honoured,
    /// anything else goes through detection.
    pub fn highlight_code(&self, code: &str, lang: Option<&str>) -> anyhow::Result<Highlighted> {
        match lang {
            Some(token) if self.language(token).is_some() => self.highlight(code, token),
            _ => self.highlight_auto(code),
        }
    }

    /// Highlights a `<code>` element in place from its text content.
    ///
    /// Returns `false` when the element was skipped: already highlighted, or opted out
    /// via `no-highlight`.
    pub fn highlight_element(&self, code: &NodeDataRef<ElementData>) -> anyhow::Result<bool> {
        let (classes, lang) = {
            let attrs = code.attributes.borrow();
            if attrs.contains(HIGHLIGHTED_ATTR) {
                return Ok(false);
            }
            let classes: Vec<String> = attrs
                .get("class")
                .unwrap_or("")
                .split_ascii_whitespace()
                .map(str::to_string)
                .collect();
            let lang = classes.iter().find_map(|c| {
                c.strip_prefix("language-")
                    .or_else(|| c.strip_prefix("lang-"))
                    .map(str::to_string)
            });
            (classes, lang)
        };
        if classes
            .iter()
            .any(|c| c == "no-highlight" || c == "nohighlight")
        {
            return Ok(false);
        }

        let text = code.text_contents();
        let highlighted = self.highlight_code(&text, lang.as_deref())?;
        set_inner_html(code.as_node(), &highlighted.html);

        let mut classes = classes;
        for extra in ["hl".to_string()]
            .into_iter()
            .chain(highlighted.language.map(|l| format!("language-{l}")))
        {
            if !classes.contains(&extra) {
                classes.push(extra);
            }
        }
        let mut attrs = code.attributes.borrow_mut();
        attrs.insert("class", classes.join(" "));
        attrs.insert(HIGHLIGHTED_ATTR, "yes".to_string());
        Ok(true)
    }

    fn classed_html(&self, code: &str, syntax: &SyntaxReference) -> anyhow::Result<String> {
        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntaxes, CLASS_STYLE);
        for line in LinesWithEndings::from(code) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .with_context(|| format!("highlight {} line", syntax.name))?;
        }
        Ok(generator.finalize())
    }
}

fn language_label(syntax: &SyntaxReference) -> String {
    syntax
        .file_extensions
        .first()
        .cloned()
        .unwrap_or_else(|| syntax.name.to_ascii_lowercase().replace(' ', "-"))
}
