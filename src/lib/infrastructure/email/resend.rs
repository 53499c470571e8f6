//! Resend HTTP API mailer

use std::{collections::HashMap, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::communication::{
    email::{Attachment, Email, Tag},
    mailer::{Mailer, MailerError},
};

/// Headers the provider derives from the request fields itself
const PROVIDER_MANAGED_HEADERS: &[&str] = &[
    "bcc",
    "cc",
    "content-disposition",
    "content-transfer-encoding",
    "content-type",
    "from",
    "mime-version",
    "reply-to",
    "subject",
    "to",
];

/// Resend configuration
#[derive(Clone, Debug, Parser)]
pub struct ResendConfig {
    /// The Resend API key
    #[clap(long, env = "RESEND_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// The Resend API base URL
    #[clap(long, env = "RESEND_API_URL", default_value = "https://api.resend.com")]
    pub base_url: String,

    /// Seconds to wait for Resend to connect and answer before giving up
    #[clap(long, env = "RESEND_HTTP_TIMEOUT_SECONDS", default_value_t = 30)]
    pub http_timeout_seconds: u64,
}

/// Mailer backed by the Resend HTTP API
#[derive(Debug, Clone)]
pub struct ResendMailer {
    config: ResendConfig,
    client: reqwest::Client,
}

impl ResendMailer {
    /// Create a new Resend mailer
    pub fn new(config: ResendConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.http_timeout_seconds);

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .context("failed to build the HTTP client")?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/emails", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    #[serde(skip_serializing_if = "is_empty")]
    cc: &'a [String],
    #[serde(skip_serializing_if = "is_empty")]
    bcc: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    headers: HashMap<&'a str, &'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentPayload<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tags: Vec<TagPayload<'a>>,
}

fn is_empty<T>(items: &&[T]) -> bool {
    items.is_empty()
}

#[derive(Debug, Serialize)]
struct AttachmentPayload<'a> {
    filename: &'a str,
    /// Base64 encoded
    content: String,
}

#[derive(Debug, Serialize)]
struct TagPayload<'a> {
    name: &'a str,
    value: &'a str,
}

impl<'a> From<&'a Attachment> for AttachmentPayload<'a> {
    fn from(attachment: &'a Attachment) -> Self {
        Self {
            filename: &attachment.filename,
            content: STANDARD.encode(&attachment.content),
        }
    }
}

impl<'a> From<&'a Tag> for TagPayload<'a> {
    fn from(tag: &'a Tag) -> Self {
        Self {
            name: &tag.name,
            value: &tag.value,
        }
    }
}

impl<'a> From<&'a Email> for SendEmailRequest<'a> {
    fn from(email: &'a Email) -> Self {
        let headers = email
            .headers
            .iter()
            .filter(|(name, _)| {
                !PROVIDER_MANAGED_HEADERS
                    .iter()
                    .any(|managed| name.eq_ignore_ascii_case(managed))
            })
            .map(|(name, value)| (name.as_str(), value.as_str()))
            .collect();

        Self {
            from: &email.from,
            to: &email.to,
            subject: &email.subject,
            cc: &email.cc,
            bcc: &email.bcc,
            reply_to: email.reply_to.as_deref(),
            html: email.html.as_deref(),
            text: email.text.as_deref(),
            headers,
            attachments: email.attachments.iter().map(Into::into).collect(),
            tags: email.tags.iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: Option<String>,
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send(&self, email: &Email) -> Result<(), MailerError> {
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&SendEmailRequest::from(email))
            .send()
            .await
            .context("failed to reach the Resend API")?;

        let status = response.status();

        if status.is_success() {
            let id = response
                .json::<SendEmailResponse>()
                .await
                .map(|sent| sent.id)
                .ok();
            debug!(?id, "email accepted by Resend");

            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|error| error.message)
            .unwrap_or(body);

        Err(MailerError::Rejected {
            status: status.as_u16(),
            message,
        })
    }
}
