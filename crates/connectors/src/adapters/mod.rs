//! Platform adapters.
//!
//! Browser/HTTP automation against the listing sites is treated as a
//! capability provided by adapters; transport-level protocol design for
//! any one site isn't. Each adapter here is a thin `reqwest`-based client
//! satisfying the `PlatformAdapter` contract — enough to exercise
//! pacing/circuit-breaking/credential resolution end to end without
//! pretending to reverse-engineer five real listing-site APIs.

pub mod furnishedfinder;
pub mod leasebreak;
pub mod renthop;
pub mod roomies;
pub mod spareroom;

use crate::{AccountRef, ConnectorError, InboundMessage, OutboundPayload, ResolvedCredentials, SendResult};
use reqwest::Client;
use serde::Deserialize;

/// Shared HTTP plumbing for the session-cookie style adapters
/// (Spareroom, Roomies, RentHop). Each platform module supplies only its
/// base URL and response shapes.
pub(crate) struct HttpSession {
    client: Client,
    base_url: &'static str,
}

impl HttpSession {
    pub(crate) fn new(base_url: &'static str) -> Self {
        Self {
            client: Client::new(),
            base_url,
        }
    }

    pub(crate) async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        username: &str,
        password: &str,
    ) -> Result<T, ConnectorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .basic_auth(username, Some(password))
            .send()
            .await
            .map_err(|e| ConnectorError::normalize(&e.to_string(), e.status().map(|s| s.as_u16())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::normalize(&body, Some(status.as_u16())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ConnectorError::Transient(format!("failed to parse response: {e}")))
    }

    pub(crate) async fn get_json_bearer<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        api_key: &str,
    ) -> Result<T, ConnectorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ConnectorError::normalize(&e.to_string(), e.status().map(|s| s.as_u16())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::normalize(&body, Some(status.as_u16())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ConnectorError::Transient(format!("failed to parse response: {e}")))
    }

    pub(crate) async fn post_json_bearer<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        api_key: &str,
        body: &serde_json::Value,
    ) -> Result<T, ConnectorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ConnectorError::normalize(&e.to_string(), e.status().map(|s| s.as_u16())))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ConnectorError::normalize(&text, Some(status.as_u16())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ConnectorError::Transient(format!("failed to parse response: {e}")))
    }

    pub(crate) async fn post_form<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        username: &str,
        password: &str,
        form: &[(&str, &str)],
    ) -> Result<T, ConnectorError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .basic_auth(username, Some(password))
            .form(form)
            .send()
            .await
            .map_err(|e| ConnectorError::normalize(&e.to_string(), e.status().map(|s| s.as_u16())))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ConnectorError::normalize(&body, Some(status.as_u16())));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ConnectorError::Transient(format!("failed to parse response: {e}")))
    }
}

/// Shape shared by every platform's thread-listing response, before each
/// adapter maps it into the normalized `InboundMessage`.
#[derive(Debug, Deserialize)]
pub(crate) struct RawThread {
    pub thread_id: String,
    pub message_id: Option<String>,
    pub body: String,
    pub sender_name: Option<String>,
    pub sender_contact: Option<String>,
    pub sent_at: chrono::DateTime<chrono::Utc>,
}

pub(crate) fn raw_thread_to_inbound(thread: RawThread, channel: &str) -> InboundMessage {
    InboundMessage {
        external_thread_id: thread.thread_id,
        external_message_id: thread.message_id,
        body: thread.body,
        lead_name: thread.sender_name,
        lead_contact: thread.sender_contact,
        channel: channel.to_string(),
        sent_at: thread.sent_at,
        metadata: Default::default(),
    }
}

pub(crate) fn credential_pair<'a>(
    credentials: &'a ResolvedCredentials,
    username_key: &str,
    password_key: &str,
) -> Result<(&'a str, &'a str), ConnectorError> {
    let username = credentials
        .get(username_key)
        .ok_or_else(|| ConnectorError::CredentialMissing(username_key.to_string()))?;
    let password = credentials
        .get(password_key)
        .ok_or_else(|| ConnectorError::CredentialMissing(password_key.to_string()))?;
    Ok((username, password))
}

pub(crate) fn credential_single<'a>(
    credentials: &'a ResolvedCredentials,
    key: &str,
) -> Result<&'a str, ConnectorError> {
    credentials
        .get(key)
        .ok_or_else(|| ConnectorError::CredentialMissing(key.to_string()))
}

pub(crate) fn account_log_context(account: &AccountRef) -> String {
    format!("{}:{}", account.platform.as_str(), account.account_id)
}

pub(crate) fn outbound_message_id(account: &AccountRef, outbound: &OutboundPayload) -> String {
    format!(
        "{}-{}-{}",
        account.platform.as_str(),
        account.account_id,
        outbound.external_thread_id
    )
}

pub(crate) fn send_result(account: &AccountRef, outbound: &OutboundPayload) -> SendResult {
    SendResult {
        external_message_id: outbound_message_id(account, outbound),
        channel: account.platform.as_str().to_string(),
        provider_status: "sent".to_string(),
    }
}
