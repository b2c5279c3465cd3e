//! HTTP transport against a Quill sync server.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::adapter::{ensure_protocol, SyncAdapter};
use super::change::ChangeRecord;
use super::error::{SyncError, SyncResult};
use super::profile::{keys, ProtocolKind, SyncProfile};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const ERROR_BODY_CHARS: usize = 180;

/// Response body of `GET /v1/sync/changes`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteChanges {
    /// Server position the client acknowledges once the changes are applied
    pub cursor: u64,
    #[serde(default)]
    pub changes: Vec<ChangeRecord>,
}

/// Request body of `POST /v1/sync/changes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    pub replica: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack: Option<u64>,
    pub changes: Vec<ChangeRecord>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

struct Session {
    base_url: String,
    auth_token: Option<String>,
    fetched_cursor: Option<u64>,
}

/// Adapter that exchanges changes with a sync server over HTTP.
pub struct NetworkSyncAdapter {
    replica_id: String,
    client: Option<reqwest::Client>,
    session: Option<Session>,
}

impl NetworkSyncAdapter {
    pub fn new(replica_id: impl Into<String>) -> Self {
        Self {
            replica_id: replica_id.into(),
            client: None,
            session: None,
        }
    }

    fn client(&mut self) -> SyncResult<reqwest::Client> {
        if let Some(client) = &self.client {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| {
                SyncError::EndpointUnavailable(format!("failed to build HTTP client: {error}"))
            })?;
        self.client = Some(client.clone());
        Ok(client)
    }

    fn connected(&self) -> SyncResult<&Session> {
        self.session
            .as_ref()
            .ok_or_else(|| SyncError::EndpointUnavailable("network adapter is not connected".into()))
    }

    async fn post_changes(
        client: &reqwest::Client,
        session: &Session,
        body: &PushRequest,
        action: &str,
    ) -> SyncResult<()> {
        let url = format!("{}/v1/sync/changes", session.base_url);
        let incomplete = |error: String| {
            SyncError::PushIncomplete(format!("{action} to {}: {error}", session.base_url))
        };
        let response = Self::authorize(client.post(&url), session)
            .json(body)
            .send()
            .await
            .map_err(|error| incomplete(error.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(incomplete(parse_api_error(status, &body)));
        }
        Ok(())
    }

    fn authorize(
        request: reqwest::RequestBuilder,
        session: &Session,
    ) -> reqwest::RequestBuilder {
        let request = request.header("Accept", "application/json");
        match &session.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl SyncAdapter for NetworkSyncAdapter {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Network
    }

    async fn connect(&mut self, profile: &SyncProfile) -> SyncResult<()> {
        ensure_protocol(ProtocolKind::Network, profile)?;
        let base_url = profile.network_base_url()?;
        let client = self.client()?;
        let session = Session {
            base_url,
            auth_token: profile.setting(keys::AUTH_TOKEN),
            fetched_cursor: None,
        };

        let url = format!("{}/v1/sync/manifest", session.base_url);
        let response = Self::authorize(client.get(&url), &session)
            .send()
            .await
            .map_err(|error| {
                SyncError::EndpointUnavailable(format!(
                    "sync server {} unreachable: {error}",
                    session.base_url
                ))
            })?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::EndpointUnavailable(format!(
                "sync server {} rejected the session: {}",
                session.base_url,
                parse_api_error(status, &body)
            )));
        }

        tracing::info!("Connected to sync server {}", session.base_url);
        self.session = Some(session);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(session) = self.session.take() {
            tracing::debug!("Disconnected from sync server {}", session.base_url);
        }
    }

    async fn fetch_remote_changes(&mut self) -> SyncResult<Vec<ChangeRecord>> {
        let client = self.client()?;
        let session = self.connected()?;
        let url = format!(
            "{}/v1/sync/changes?replica={}",
            session.base_url,
            urlencoding::encode(&self.replica_id)
        );

        let unavailable = |error: String| {
            SyncError::EndpointUnavailable(format!(
                "fetching changes from {}: {error}",
                session.base_url
            ))
        };
        let response = Self::authorize(client.get(&url), session)
            .send()
            .await
            .map_err(|error| unavailable(error.to_string()))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(unavailable(parse_api_error(status, &body)));
        }
        let payload = response
            .json::<RemoteChanges>()
            .await
            .map_err(|error| unavailable(format!("invalid response: {error}")))?;

        tracing::debug!(
            "Fetched {} change(s) from {} (cursor {})",
            payload.changes.len(),
            session.base_url,
            payload.cursor
        );
        if let Some(session) = self.session.as_mut() {
            session.fetched_cursor = Some(payload.cursor);
        }
        Ok(payload.changes)
    }

    async fn push_changes(&mut self, changes: &[ChangeRecord]) -> SyncResult<()> {
        let client = self.client()?;
        let session = self.connected()?;
        let body = PushRequest {
            replica: self.replica_id.clone(),
            ack: None,
            changes: changes.to_vec(),
        };
        Self::post_changes(&client, session, &body, "pushing").await?;

        tracing::info!(
            "Pushed {} change(s) to {}",
            changes.len(),
            session.base_url
        );
        Ok(())
    }

    async fn acknowledge(&mut self) -> SyncResult<()> {
        let client = self.client()?;
        let session = self.connected()?;
        let Some(cursor) = session.fetched_cursor else {
            return Ok(());
        };
        let body = PushRequest {
            replica: self.replica_id.clone(),
            ack: Some(cursor),
            changes: Vec::new(),
        };
        Self::post_changes(&client, session, &body, "acknowledging").await?;

        tracing::debug!("Acknowledged cursor {cursor} at {}", session.base_url);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.session.is_some()
    }
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let compact = body.trim().chars().take(ERROR_BODY_CHARS).collect::<String>();
    if compact.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact, status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::extract::{Query, State};
    use axum::http::{HeaderMap, StatusCode as HttpStatus};
    use axum::routing::get;
    use axum::{Json, Router};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::models::Note;
    use crate::sync::ChangePayload;

    #[derive(Default)]
    struct ServerState {
        journal: Vec<(u64, String, ChangeRecord)>,
        acks: HashMap<String, u64>,
        pushes: usize,
        last_authorization: Option<String>,
        reject_pushes: bool,
    }

    type Shared = Arc<Mutex<ServerState>>;

    #[derive(Deserialize)]
    struct ReplicaQuery {
        replica: String,
    }

    async fn manifest(State(state): State<Shared>, headers: HeaderMap) -> Json<serde_json::Value> {
        let mut state = state.lock().unwrap();
        state.last_authorization = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        Json(serde_json::json!({ "format_version": 1, "record_count": state.journal.len() }))
    }

    async fn changes(
        State(state): State<Shared>,
        Query(query): Query<ReplicaQuery>,
    ) -> Json<RemoteChanges> {
        let state = state.lock().unwrap();
        let ack = state.acks.get(&query.replica).copied().unwrap_or(0);
        let changes = state
            .journal
            .iter()
            .filter(|(seq, origin, _)| *seq > ack && *origin != query.replica)
            .map(|(_, _, record)| record.clone())
            .collect();
        let cursor = state.journal.iter().map(|(seq, _, _)| *seq).max().unwrap_or(0);
        Json(RemoteChanges { cursor, changes })
    }

    async fn push(
        State(state): State<Shared>,
        Json(request): Json<PushRequest>,
    ) -> Result<HttpStatus, (HttpStatus, Json<serde_json::Value>)> {
        let mut state = state.lock().unwrap();
        if state.reject_pushes {
            return Err((
                HttpStatus::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "message": "storage offline" })),
            ));
        }
        let mut seq = state.journal.iter().map(|(seq, _, _)| *seq).max().unwrap_or(0);
        for record in request.changes {
            seq += 1;
            state.journal.push((seq, request.replica.clone(), record));
        }
        if let Some(ack) = request.ack {
            state.acks.insert(request.replica, ack);
        }
        state.pushes += 1;
        Ok(HttpStatus::NO_CONTENT)
    }

    async fn spawn_server() -> (String, Shared) {
        let state = Shared::default();
        let app = Router::new()
            .route("/v1/sync/manifest", get(manifest))
            .route("/v1/sync/changes", get(changes).post(push))
            .with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), state)
    }

    fn network_profile(base_url: &str) -> SyncProfile {
        SyncProfile::new("Home server", ProtocolKind::Network)
            .with_setting(keys::SERVER_URL, base_url)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn exchanges_changes_between_replicas() {
        let (base_url, state) = spawn_server().await;
        let profile = network_profile(&base_url).with_setting(keys::AUTH_TOKEN, "s3cret");
        let note = Note::new("Plan", "ship it");
        let record = ChangeRecord::created(ChangePayload::Note(note), 10);

        let mut laptop = NetworkSyncAdapter::new("laptop");
        laptop.connect(&profile).await.unwrap();
        assert_eq!(
            state.lock().unwrap().last_authorization.as_deref(),
            Some("Bearer s3cret")
        );
        assert!(laptop.fetch_remote_changes().await.unwrap().is_empty());
        laptop.push_changes(std::slice::from_ref(&record)).await.unwrap();
        laptop.disconnect().await;

        let mut phone = NetworkSyncAdapter::new("phone");
        phone.connect(&profile).await.unwrap();
        assert_eq!(phone.fetch_remote_changes().await.unwrap(), vec![record.clone()]);
        phone.push_changes(&[]).await.unwrap();
        assert_eq!(phone.fetch_remote_changes().await.unwrap(), vec![record]);
        phone.acknowledge().await.unwrap();
        assert!(phone.fetch_remote_changes().await.unwrap().is_empty());

        let state = state.lock().unwrap();
        assert_eq!(state.pushes, 3);
        assert_eq!(state.acks.get("phone"), Some(&1));
        assert_eq!(state.acks.get("laptop"), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn acknowledge_before_fetch_sends_nothing() {
        let (base_url, state) = spawn_server().await;
        let mut adapter = NetworkSyncAdapter::new("a");
        adapter.connect(&network_profile(&base_url)).await.unwrap();
        adapter.acknowledge().await.unwrap();
        assert_eq!(state.lock().unwrap().pushes, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn host_and_port_settings_reach_the_server() {
        let (base_url, _state) = spawn_server().await;
        let port = base_url.rsplit(':').next().unwrap().to_string();
        let profile = SyncProfile::new("lan", ProtocolKind::Network)
            .with_setting(keys::HOST, "127.0.0.1")
            .with_setting(keys::PORT, port);

        let mut adapter = NetworkSyncAdapter::new("a");
        adapter.connect(&profile).await.unwrap();
        assert!(adapter.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejected_push_is_incomplete() {
        let (base_url, state) = spawn_server().await;
        state.lock().unwrap().reject_pushes = true;

        let mut adapter = NetworkSyncAdapter::new("a");
        adapter.connect(&network_profile(&base_url)).await.unwrap();
        let error = adapter.push_changes(&[]).await.unwrap_err();
        assert!(
            matches!(error, SyncError::PushIncomplete(ref msg) if msg.contains("storage offline (503)"))
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unreachable_server_is_unavailable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut adapter = NetworkSyncAdapter::new("a");
        let error = adapter
            .connect(&network_profile(&format!("http://{addr}")))
            .await
            .unwrap_err();
        assert!(matches!(error, SyncError::EndpointUnavailable(_)));
        assert!(!adapter.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rejects_profiles_of_other_protocols() {
        let profile = SyncProfile::new("usb", ProtocolKind::RemovableMedia)
            .with_setting(keys::DEVICE_PATH, "/media/usb0");
        let mut adapter = NetworkSyncAdapter::new("a");
        assert!(matches!(
            adapter.connect(&profile).await,
            Err(SyncError::ProfileMismatch { .. })
        ));
    }

    #[test]
    fn parse_api_error_prefers_message_field() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_REQUEST, r#"{"error":"bad replica"}"#),
            "bad replica (400)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, ""), "HTTP 502");
    }

    #[test]
    fn parse_api_error_truncates_plain_bodies() {
        let body = format!("  {}  ", "x".repeat(500));
        let message = parse_api_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert_eq!(message, format!("{} (500)", "x".repeat(ERROR_BODY_CHARS)));
    }
}
