use super::{account_log_context, credential_pair, raw_thread_to_inbound, send_result, HttpSession, RawThread};
use crate::{AccountRef, ConnectorError, InboundMessage, OutboundPayload, Platform, PlatformAdapter, ResolvedCredentials, SendResult};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

pub struct RoomiesAdapter {
    session: HttpSession,
}

impl RoomiesAdapter {
    pub fn new() -> Self {
        Self {
            session: HttpSession::new("https://www.roomies.com/api/v1"),
        }
    }
}

impl Default for RoomiesAdapter {
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
    message_id: String,
}

#[async_trait]
impl PlatformAdapter for RoomiesAdapter {
    fn platform(&self) -> Platform {
        Platform::Roomies
    }

    async fn ingest(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
    ) -> Result<Vec<InboundMessage>, ConnectorError> {
        let (username, password) =
            credential_pair(credentials, "ROOMIES_USERNAME", "ROOMIES_PASSWORD")?;
        debug!(account = %account_log_context(account), "roomies ingest");

        let list: ThreadList = self
            .session
            .get_json("/conversations/unread", username, password)
            .await?;

        Ok(list
            .threads
            .into_iter()
            .map(|t| raw_thread_to_inbound(t, "roomies"))
            .collect())
    }

    async fn send(
        &self,
        account: &AccountRef,
        credentials: &ResolvedCredentials,
        outbound: &OutboundPayload,
    ) -> Result<SendResult, ConnectorError> {
        let (username, password) =
            credential_pair(credentials, "ROOMIES_USERNAME", "ROOMIES_PASSWORD")?;

        let _ack: SendAck = self
            .session
            .post_form(
                "/conversations/reply",
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
