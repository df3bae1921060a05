//! HTTP client for the hosted presence store.
//!
//! The store exposes its `room_users` table through a PostgREST-style
//! REST dialect: equality filters go in the query string
//! (`room_id=eq.lobby`), inserts are plain POSTs, updates are PATCHes
//! scoped by the same filters, and the `Prefer` header controls whether
//! changed rows come back in the response.

use chrono::Utc;
use crosstalk_protocol::{ParticipantId, RoomId};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::json;
use uuid::Uuid;

use crate::{PresenceError, PresenceRecord, PresenceStore};

/// Environment variable naming the store's base URL.
pub const ENV_PRESENCE_URL: &str = "PRESENCE_URL";
/// Environment variable holding the store's API key.
pub const ENV_PRESENCE_KEY: &str = "PRESENCE_KEY";

/// How long any single presence request may take.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

/// Connection settings for the presence store.
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Base URL of the store (without the `/rest/v1` suffix).
    pub base_url: String,
    /// API key, sent as both `apikey` and bearer token.
    pub api_key: String,
}

impl PresenceConfig {
    /// Reads the configuration from the environment.
    ///
    /// # Errors
    /// Returns [`PresenceError::MissingConfig`] naming the first unset
    /// variable. The process must not start without a reachable store;
    /// admission depends on it.
    pub fn from_env() -> Result<Self, PresenceError> {
        let base_url = std::env::var(ENV_PRESENCE_URL)
            .map_err(|_| PresenceError::MissingConfig(ENV_PRESENCE_URL))?;
        let api_key = std::env::var(ENV_PRESENCE_KEY)
            .map_err(|_| PresenceError::MissingConfig(ENV_PRESENCE_KEY))?;
        Ok(Self { base_url, api_key })
    }
}

/// A [`PresenceStore`] backed by the hosted REST store.
pub struct HttpPresence {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPresence {
    /// Builds a client with the auth headers baked in.
    ///
    /// # Errors
    /// Returns [`PresenceError::InvalidConfig`] if the API key can't be
    /// used as an HTTP header value.
    pub fn new(config: PresenceConfig) -> Result<Self, PresenceError> {
        let key = HeaderValue::from_str(&config.api_key)
            .map_err(|e| PresenceError::InvalidConfig(format!("unusable api key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| PresenceError::InvalidConfig(format!("unusable api key: {e}")))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/room_users", self.base_url)
    }

    /// Turns a non-success response into a [`PresenceError::Service`].
    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, PresenceError> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Err(PresenceError::Service { status, body })
    }

    /// Looks up the record for one room+user pair, active or not.
    async fn fetch_record(
        &self,
        room: &RoomId,
        user: ParticipantId,
    ) -> Result<Option<PresenceRecord>, PresenceError> {
        let resp = self
            .client
            .get(self.table_url())
            .query(&[
                ("room_id", format!("eq.{room}")),
                ("user_id", format!("eq.{user}")),
                ("select", "*".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<PresenceRecord> = Self::check(resp).await?.json().await?;
        Ok(rows.into_iter().next())
    }

    /// Flips a record back to active under a fresh connection id.
    async fn reactivate(
        &self,
        room: &RoomId,
        user: ParticipantId,
    ) -> Result<(), PresenceError> {
        tracing::debug!(room_id = %room, user_id = %user, "reactivating presence record");
        let resp = self
            .client
            .patch(self.table_url())
            .query(&[
                ("room_id", format!("eq.{room}")),
                ("user_id", format!("eq.{user}")),
            ])
            .header("Prefer", "return=minimal")
            .json(&json!({
                "is_active": true,
                "connection_id": Uuid::new_v4(),
                "last_seen": Utc::now(),
            }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}

impl PresenceStore for HttpPresence {
    async fn add_or_reactivate(
        &self,
        room: &RoomId,
        user: ParticipantId,
        username: &str,
        device: &str,
    ) -> Result<(), PresenceError> {
        match self.fetch_record(room, user).await? {
            Some(existing) if existing.is_active => Ok(()),
            Some(_) => self.reactivate(room, user).await,
            None => {
                let now = Utc::now();
                let record = PresenceRecord {
                    id: Uuid::new_v4(),
                    room_id: room.clone(),
                    user_id: user,
                    username: username.to_string(),
                    device: device.to_string(),
                    is_active: true,
                    connection_id: Some(Uuid::new_v4()),
                    joined_at: now,
                    last_seen: now,
                };
                let resp = self
                    .client
                    .post(self.table_url())
                    .header("Prefer", "return=minimal")
                    .json(&record)
                    .send()
                    .await?;
                Self::check(resp).await?;
                tracing::debug!(room_id = %room, user_id = %user, "presence record created");
                Ok(())
            }
        }
    }

    async fn list(&self, room: &RoomId) -> Result<Vec<PresenceRecord>, PresenceError> {
        let resp = self
            .client
            .get(self.table_url())
            .query(&[
                ("room_id", format!("eq.{room}")),
                ("is_active", "eq.true".to_string()),
                ("select", "*".to_string()),
            ])
            .send()
            .await?;
        let rows: Vec<PresenceRecord> = Self::check(resp).await?.json().await?;
        Ok(rows)
    }

    async fn touch(&self, room: &RoomId, user: ParticipantId) -> Result<(), PresenceError> {
        let resp = self
            .client
            .patch(self.table_url())
            .query(&[
                ("room_id", format!("eq.{room}")),
                ("user_id", format!("eq.{user}")),
            ])
            // Ask for the changed rows back: updating nothing means the
            // record is gone, which the caller wants to know about.
            .header("Prefer", "return=representation")
            .json(&json!({ "last_seen": Utc::now() }))
            .send()
            .await?;
        let rows: Vec<PresenceRecord> = Self::check(resp).await?.json().await?;
        if rows.is_empty() {
            return Err(PresenceError::NotFound {
                room: room.clone(),
                user,
            });
        }
        Ok(())
    }

    async fn remove(&self, room: &RoomId, user: ParticipantId) -> Result<(), PresenceError> {
        let resp = self
            .client
            .patch(self.table_url())
            .query(&[
                ("room_id", format!("eq.{room}")),
                ("user_id", format!("eq.{user}")),
            ])
            .header("Prefer", "return=minimal")
            .json(&json!({
                "is_active": false,
                "connection_id": null,
                "last_seen": Utc::now(),
            }))
            .send()
            .await?;
        Self::check(resp).await?;
        Ok(())
    }
}
