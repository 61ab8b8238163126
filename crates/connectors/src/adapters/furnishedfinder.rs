use super::{account_log_context, credential_single, raw_thread_to_inbound, send_result, HttpSession, RawThread};
use crate::{AccountRef, ConnectorError, InboundMessage, OutboundPayload, Platform, PlatformAdapter, ResolvedCredentials, SendResult};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

pub struct FurnishedfinderAdapter {
    session: HttpSession,
}

impl FurnishedfinderAdapter {
    pub fn new() -> Self {
        Self {
            session: HttpSession::new("https://api.furnishedfinder.com/v1"),
        }
    }
}

impl Default for FurnishedfinderAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ThreadList {
    threads: Vec<RawThread>,
}

#[derive(Debug, Deserialize)]
struct SendAck {
    #[allow(dead_code)]
    id: String,
}

#[async_trait]
impl PlatformAdapter for FurnishedfinderAdapter {
    fn platform(&self) -> Platform {
        Platform::Furnishedfinder
    }

    async fn ingest(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
    ) -> Result<Vec<InboundMessage>, ConnectorError> {
        let api_key = credential_single(credentials, "FURNISHEDFINDER_API_KEY")?;
        debug!(account = %account_log_context(account), "furnishedfinder ingest");

        let list: ThreadList = self.session.get_json_bearer("/inquiries", api_key).await?;

        Ok(list
            .threads
            .into_iter()
            .map(|t| raw_thread_to_inbound(t, "furnishedfinder"))
            .collect())
    }

    async fn send(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
        outbound: &OutboundPayload,
    ) -> Result<SendResult, ConnectorError> {
        let api_key = credential_single(credentials, "FURNISHEDFINDER_API_KEY")?;

        let _ack: SendAck = self
            .session
            .post_json_bearer(
                "/inquiries/reply",
                api_key,
                &json!({
                    "thread_id": outbound.external_thread_id,
                    "body": outbound.body,
                }),
            )
            .await?;

        Ok(send_result(account, outbound))
    }
}
