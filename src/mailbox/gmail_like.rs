use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::DateTime;
use chrono::Utc;
use reqwest::Client;
use reqwest::StatusCode;
use secrecy::ExposeSecret;

use super::decode_mime;
use super::MailboxClient;
use super::MailboxError;
use super::MailboxLabel;
use crate::domain::CanonicalMessage;
use crate::domain::TenantId;
use crate::tokens::TokenStore;

/// Talks to a Gmail-shaped REST API: list/get messages by label, base64url
/// raw RFC 5322 bodies (§4.B, REDESIGN FLAGS). Token refresh itself is out
/// of scope (§9 Non-goals); callers that see [`MailboxError::AuthExpired`]
/// are expected to re-run the OAuth flow through the HTTP surface.
pub struct GmailLikeClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenStore>,
}

impl GmailLikeClient {
    pub fn new(
        base_url: String,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        Self { http: Client::new(), base_url, tokens }
    }

    async fn bearer(
        &self,
        tenant_id: &TenantId,
    ) -> Result<String, MailboxError> {
        let token = self.tokens.get(tenant_id).await.map_err(|_| MailboxError::AuthExpired)?;
        if token.needs_refresh() {
            return Err(MailboxError::AuthExpired);
        }
        Ok(token.access_token.expose_secret().clone())
    }
}

#[derive(serde::Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(serde::Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(serde::Deserialize)]
struct RawMessageResponse {
    raw: String,
    #[serde(rename = "internalDate")]
    internal_date: Option<String>,
}

#[async_trait]
impl MailboxClient for GmailLikeClient {
    #[tracing::instrument(skip(self), fields(%tenant_id))]
    async fn list_labels(
        &self,
        tenant_id: &TenantId,
    ) -> Result<Vec<MailboxLabel>, MailboxError> {
        let bearer = self.bearer(tenant_id).await?;
        let resp = self.http.get(format!("{}/labels", self.base_url)).bearer_auth(bearer).send().await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(MailboxError::AuthExpired),
            status if status.is_server_error() => Err(MailboxError::TransientFetchError(status.to_string())),
            _ => {
                #[derive(serde::Deserialize)]
                struct RawLabel {
                    id: String,
                    name: String,
                }
                #[derive(serde::Deserialize)]
                struct Labels {
                    #[serde(default)]
                    labels: Vec<RawLabel>,
                }
                let labels: Labels = resp.json().await?;
                Ok(labels.labels.into_iter().map(|l| MailboxLabel { id: l.id, name: l.name }).collect())
            }
        }
    }

    #[tracing::instrument(skip(self), fields(%tenant_id, ?label_ids, %since, limit))]
    async fn fetch_since(
        &self,
        tenant_id: &TenantId,
        label_ids: &[String],
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<CanonicalMessage>, MailboxError> {
        let bearer = self.bearer(tenant_id).await?;
        let label_filter = label_ids.iter().map(|id| format!("label:{id}")).collect::<Vec<_>>().join(" OR ");
        let query = format!("after:{} {}", since.timestamp(), label_filter);
        let list_resp = self
            .http
            .get(format!("{}/messages", self.base_url))
            .bearer_auth(bearer.clone())
            .query(&[("q", query.as_str()), ("maxResults", &limit.to_string())])
            .send()
            .await?;

        match list_resp.status() {
            StatusCode::UNAUTHORIZED => return Err(MailboxError::AuthExpired),
            status if status.is_server_error() => return Err(MailboxError::TransientFetchError(status.to_string())),
            _ => {}
        }

        let listed: ListMessagesResponse = list_resp.json().await?;
        let mut messages = Vec::with_capacity(listed.messages.len());

        for msg_ref in listed.messages.into_iter().take(limit) {
            let raw_resp = self.http.get(format!("{}/messages/{}", self.base_url, msg_ref.id)).bearer_auth(bearer.clone()).send().await?;
            match raw_resp.status() {
                StatusCode::UNAUTHORIZED => return Err(MailboxError::AuthExpired),
                status if status.is_server_error() => return Err(MailboxError::TransientFetchError(status.to_string())),
                _ => {}
            }
            let raw: RawMessageResponse = raw_resp.json().await?;
            let decoded = URL_SAFE.decode(raw.raw.replace('-', "+").replace('_', "/")).map_err(|e| MailboxError::MalformedMessage(e.to_string()))?;
            let mut message = decode_mime(&decoded)?;

            if let Some(internal_date) = raw.internal_date.and_then(|ms| ms.parse::<i64>().ok()) {
                if let Some(dt) = DateTime::from_timestamp_millis(internal_date) {
                    message.received_at = dt;
                }
            }
            messages.push(message);
        }

        messages.sort_by_key(|m| m.received_at);
        Ok(messages)
    }

    #[tracing::instrument(skip(self), fields(%tenant_id, %message_id))]
    async fn mark_seen(
        &self,
        tenant_id: &TenantId,
        message_id: &str,
    ) -> Result<(), MailboxError> {
        let bearer = self.bearer(tenant_id).await?;
        let resp = self.http.post(format!("{}/messages/{}/modify", self.base_url, message_id)).bearer_auth(bearer).json(&serde_json::json!({"removeLabelIds": ["UNREAD"]})).send().await?;
        match resp.status() {
            StatusCode::UNAUTHORIZED => Err(MailboxError::AuthExpired),
            status if status.is_server_error() => Err(MailboxError::TransientFetchError(status.to_string())),
            _ => Ok(()),
        }
    }
}
