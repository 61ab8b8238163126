use super::{account_log_context, credential_pair, raw_thread_to_inbound, send_result, HttpSession, RawThread};
use crate::{AccountRef, ConnectorError, InboundMessage, OutboundPayload, Platform, PlatformAdapter, ResolvedCredentials, SendResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

pub struct SpareroomAdapter {
    session: HttpSession,
}

impl SpareroomAdapter {
    pub fn new() -> Self {
        Self {
            session: HttpSession::new("https://www.spareroom.co.uk/api/v1"),
        }
    }
}

impl Default for SpareroomAdapter {
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
    message_id: String,
}

#[async_trait]
impl PlatformAdapter for SpareroomAdapter {
    fn platform(&self) -> Platform {
        Platform::Spareroom
    }

    async fn ingest(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
    ) -> Result<Vec<InboundMessage>, ConnectorError> {
        let (username, password) =
            credential_pair(credentials, "SPAREROOM_USERNAME", "SPAREROOM_PASSWORD")?;
        debug!(account = %account_log_context(account), "spareroom ingest");

        let list: ThreadList = self
            .session
            .get_json("/messages/inbox", username, password)
            .await?;

        Ok(list
            .threads
            .into_iter()
            .map(|t| raw_thread_to_inbound(t, "spareroom"))
            .collect())
    }

    async fn send(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
        outbound: &OutboundPayload,
    ) -> Result<SendResult, ConnectorError> {
        let (username, password) =
            credential_pair(credentials, "SPAREROOM_USERNAME", "SPAREROOM_PASSWORD")?;

        let _ack: SendAck = self
            .session
            .post_form(
                "/messages/send",
                username,
                password,
                &[
                    ("thread_id", outbound.external_thread_id.as_str()),
                    ("body", outbound.body.as_str()),
                ],
            )
            .await?;

        Ok(send_result(account, outbound))
    }
}
