use anyhow::Context as _;
use reqwest::header::CONTENT_TYPE;

use crate::like::{FormMethod, FormSubmission, FormSubmitter, Navigation};

/// Sends a form the way a browser navigation would: redirects are followed, nothing is retried.
#[derive(Clone)]
pub struct HttpSubmitter {
    client: reqwest::Client,
}

impl HttpSubmitter {
    pub fn new(user_agent: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("build reqwest client")?;
        Ok(Self { client })
    }
}

impl FormSubmitter for HttpSubmitter {
    async fn submit(&self, submission: &FormSubmission) -> anyhow::Result<Navigation> {
        let request = match submission.method {
            FormMethod::Get => self.client.get(submission.target()),
            FormMethod::Post => self
                .client
                .post(submission.action.clone())
                .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(submission.encoded()),
        };

        let resp = request
            .send()
            .await
            .with_context(|| format!("submit form to {}", submission.action))?;
        let status = resp.status();
        let url = resp.url().clone();

        if !status.is_success() {
            tracing::warn!(%status, %url, "form submission landed on an error page");
        } else {
            tracing::info!(%status, %url, "form submitted");
        }

        Ok(Navigation {
            url,
            status: Some(status.as_u16()),
        })
    }
}
