use std::io::{BufRead as _, Write as _};

use kuchiki::iter::NodeIterator as _;
use kuchiki::{ElementData, NodeDataRef, NodeRef};
use thiserror::Error;
use url::Url;

pub const AUTHOR_PROMPT: &str = "Enter the name to like this post as:";

const AUTHOR_FIELD: &str = r#"input[name="author"]"#;

#[derive(Debug, Error)]
pub enum LikeError {
    #[error("like control has no enclosing <form>")]
    MissingForm,

    #[error("like form has no input[name=\"author\"] field")]
    MissingAuthorField,

    #[error("form action {action:?} does not resolve against {base}")]
    InvalidAction { action: String, base: Url },
}

/// Asks the user who is liking. `None` means the prompt was dismissed.
pub trait AuthorPrompt {
    fn request_author(&self, message: &str) -> Option<String>;
}

/// Blocks on one line of stdin; EOF counts as cancel.
pub struct StdinPrompt;

impl AuthorPrompt for StdinPrompt {
    fn request_author(&self, message: &str) -> Option<String> {
        let mut stderr = std::io::stderr();
        let _ = write!(stderr, "{message} ");
        let _ = stderr.flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line),
        }
    }
}

pub struct FixedAuthor(pub Option<String>);

impl AuthorPrompt for FixedAuthor {
    fn request_author(&self, _message: &str) -> Option<String> {
        self.0.clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormSubmission {
    pub method: FormMethod,
    pub action: Url,
    pub fields: Vec<(String, String)>,
}

impl FormSubmission {
    /// `application/x-www-form-urlencoded` body of the successful controls.
    pub fn encoded(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter())
            .finish()
    }

    /// Where the browser would navigate: for GET the fields replace the query.
    pub fn target(&self) -> Url {
        let mut url = self.action.clone();
        if self.method == FormMethod::Get {
            url.set_query(Some(&self.encoded()));
        }
        url
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub url: Url,
    /// `None` when nothing was sent.
    pub status: Option<u16>,
}

pub trait FormSubmitter {
    async fn submit(&self, submission: &FormSubmission) -> anyhow::Result<Navigation>;
}

/// Records what would be sent instead of sending it.
#[derive(Default)]
pub struct DryRunSubmitter {
    submitted: std::sync::Mutex<Vec<FormSubmission>>,
}

impl DryRunSubmitter {
    pub fn submitted(&self) -> Vec<FormSubmission> {
        self.submitted
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }
}

impl FormSubmitter for DryRunSubmitter {
    async fn submit(&self, submission: &FormSubmission) -> anyhow::Result<Navigation> {
        if let Ok(mut submitted) = self.submitted.lock() {
            submitted.push(submission.clone());
        }
        Ok(Navigation {
            url: submission.target(),
            status: None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikeOutcome {
    /// Prompt cancelled or left blank; nothing was touched.
    Declined,
    Submitted(Navigation),
}

pub struct LikeHandler<'a> {
    page_url: &'a Url,
}

impl<'a> LikeHandler<'a> {
    pub fn new(page_url: &'a Url) -> Self {
        Self { page_url }
    }

    pub async fn invoke(
        &self,
        control: &NodeRef,
        post_id: &str,
        prompt: &impl AuthorPrompt,
        submitter: &impl FormSubmitter,
    ) -> anyhow::Result<LikeOutcome> {
        let Some(author) = prompt.request_author(AUTHOR_PROMPT) else {
            tracing::debug!(post_id, "like prompt cancelled");
            return Ok(LikeOutcome::Declined);
        };
        let author = author.trim();
        if author.is_empty() {
            tracing::debug!(post_id, "like prompt left blank");
            return Ok(LikeOutcome::Declined);
        }

        let submission = self.prepare(control, author)?;
        tracing::info!(
            post_id,
            author,
            action = %submission.action,
            "submitting like"
        );
        let nav = submitter.submit(&submission).await?;
        Ok(LikeOutcome::Submitted(nav))
    }

    /// Fills the author field of the control's form and snapshots the form for submission.
    ///
    /// The form is only touched once every lookup has succeeded.
    pub fn prepare(&self, control: &NodeRef, author: &str) -> Result<FormSubmission, LikeError> {
        let form = control
            .inclusive_ancestors()
            .elements()
            .find(|e| &*e.name.local == "form")
            .ok_or(LikeError::MissingForm)?;
        let field = form
            .as_node()
            .select_first(AUTHOR_FIELD)
            .map_err(|()| LikeError::MissingAuthorField)?;
        let (method, action) = self.resolve_target(&form)?;

        field
            .attributes
            .borrow_mut()
            .insert("value", author.to_string());

        Ok(FormSubmission {
            method,
            action,
            fields: successful_controls(&form),
        })
    }

    fn resolve_target(
        &self,
        form: &NodeDataRef<ElementData>,
    ) -> Result<(FormMethod, Url), LikeError> {
        let (method, action) = {
            let attrs = form.attributes.borrow();
            let method = match attrs.get("method") {
                Some(m) if m.trim().eq_ignore_ascii_case("post") => FormMethod::Post,
                _ => FormMethod::Get,
            };
            let action = attrs.get("action").unwrap_or("").trim().to_string();
            (method, action)
        };
        if action.is_empty() {
            return Ok((method, self.page_url.clone()));
        }
        let url = self
            .page_url
            .join(&action)
            .map_err(|_| LikeError::InvalidAction {
                action,
                base: self.page_url.clone(),
            })?;
        Ok((method, url))
    }
}

fn successful_controls(form: &NodeDataRef<ElementData>) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    let Ok(controls) = form.as_node().select("input, textarea, select") else {
        return fields;
    };
    for control in controls {
        let attrs = control.attributes.borrow();
        let Some(name) = attrs.get("name").filter(|n| !n.is_empty()) else {
            continue;
        };
        if attrs.contains("disabled") || disabled_by_fieldset(control.as_node()) {
            continue;
        }
        let value = match &*control.name.local {
            "input" => {
                let kind = attrs.get("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "reset" | "image" | "file" => continue,
                    "checkbox" | "radio" => {
                        if !attrs.contains("checked") {
                            continue;
                        }
                        attrs.get("value").unwrap_or("on").to_string()
                    }
                    _ => attrs.get("value").unwrap_or("").to_string(),
                }
            }
            "textarea" => control.text_contents(),
            "select" => match selected_option(&control) {
                Some(v) => v,
                None => continue,
            },
            _ => continue,
        };
        fields.push((name.to_string(), value));
    }
    fields
}

/// A disabled `<fieldset>` disables its descendants, except those inside its first `<legend>`.
fn disabled_by_fieldset(control: &NodeRef) -> bool {
    let mut child = control.clone();
    for ancestor in control.ancestors() {
        if let Some(el) = ancestor.as_element() {
            if &*el.name.local == "fieldset" && el.attributes.borrow().contains("disabled") {
                let first_legend = ancestor
                    .children()
                    .elements()
                    .find(|e| &*e.name.local == "legend");
                let in_legend = first_legend.is_some_and(|legend| *legend.as_node() == child);
                if !in_legend {
                    return true;
                }
            }
        }
        child = ancestor;
    }
    false
}

fn selected_option(select: &NodeDataRef<ElementData>) -> Option<String> {
    let options: Vec<_> = select.as_node().select("option").ok()?.collect();
    let chosen = options
        .iter()
        .find(|o| o.attributes.borrow().contains("selected"))
        .or_else(|| options.first())?;
    let value = chosen.attributes.borrow().get("value").map(|v| v.to_string());
    Some(value.unwrap_or_else(|| chosen.text_contents().trim().to_string()))
}
