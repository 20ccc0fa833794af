//! Vertex AI Agent Engine HTTP API client

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::ndjson;
use crate::session::model::{Content, Event, EventActions, Session};
use crate::session::provider::{ChunkStream, MessageSender, SessionStore};

const API_VERSION: &str = "v1beta1";

/// How many times a freshly created session is looked up before giving up
const CREATE_LOOKUP_ATTEMPTS: u32 = 10;

/// Client for one deployed reasoning engine
///
/// Serves both as the remote [`SessionStore`] and as the streamed
/// [`MessageSender`] used for injections.
pub struct AgentEngineClient {
    client: Client,
    /// `{endpoint}/v1beta1/projects/{p}/locations/{l}/reasoningEngines/{id}`
    engine_url: String,
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResource {
    name: String,
    user_id: String,
    #[serde(default)]
    session_state: Option<HashMap<String, Value>>,
    #[serde(default)]
    update_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEventsResponse {
    #[serde(default)]
    session_events: Vec<EventResource>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    author: String,
    invocation_id: String,
    timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Content>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    actions: Option<ActionsResource>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActionsResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state_delta: Option<HashMap<String, Value>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    user_id: String,
    session_state: HashMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
}

impl AgentEngineClient {
    /// Create a client for `projects/{project}/locations/{location}/reasoningEngines/{engine}`
    ///
    /// `engine` may be the bare numeric id or the full resource name.
    pub fn new(project: &str, location: &str, engine: &str) -> Result<Self> {
        let endpoint = format!("https://{}-aiplatform.googleapis.com", location);
        Self::with_endpoint(&endpoint, project, location, engine)
    }

    pub fn with_endpoint(
        endpoint: &str,
        project: &str,
        location: &str,
        engine: &str,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build Agent Engine HTTP client")?;

        let engine_url = format!(
            "{}/{}/projects/{}/locations/{}/reasoningEngines/{}",
            endpoint.trim_end_matches('/'),
            API_VERSION,
            project,
            location,
            engine_id(engine),
        );

        Ok(Self {
            client,
            engine_url,
            access_token: None,
        })
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn engine_url(&self) -> &str {
        &self.engine_url
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn session_url(&self, session_id: &str) -> String {
        format!("{}/sessions/{}", self.engine_url, session_id)
    }

    async fn fetch_session(&self, session_id: &str) -> Result<Option<SessionResource>> {
        let response = self
            .authorized(self.client.get(self.session_url(session_id)))
            .send()
            .await
            .context("Failed to get Agent Engine session")?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;

        let resource: SessionResource = response
            .json()
            .await
            .context("Failed to parse Agent Engine session")?;

        Ok(Some(resource))
    }

    async fn fetch_events(&self, session_id: &str) -> Result<Option<Vec<Event>>> {
        let url = format!("{}/events", self.session_url(session_id));
        let mut events = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.client.get(&url);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = self
                .authorized(request)
                .send()
                .await
                .context("Failed to list Agent Engine session events")?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let response = check_status(response).await?;

            let page: ListEventsResponse = response
                .json()
                .await
                .context("Failed to parse Agent Engine events")?;

            for resource in page.session_events {
                events.push(resource.into_event()?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(Some(events))
    }
}

#[async_trait]
impl SessionStore for AgentEngineClient {
    async fn get_session(
        &self,
        app_name: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<Option<Session>> {
        let Some(resource) = self.fetch_session(session_id).await? else {
            return Ok(None);
        };

        if resource.user_id != user_id {
            warn!(
                "Session {} belongs to user {}, not {}",
                resource.name, resource.user_id, user_id
            );
            return Ok(None);
        }

        let Some(events) = self.fetch_events(session_id).await? else {
            return Ok(None);
        };

        let last_update_time = match resource.update_time.as_deref() {
            Some(ts) => parse_timestamp(ts)?,
            None => events.last().map(|e| e.timestamp).unwrap_or_default(),
        };

        Ok(Some(Session {
            id: session_id.to_string(),
            app_name: app_name.to_string(),
            user_id: resource.user_id,
            state: resource.session_state.unwrap_or_default(),
            events,
            last_update_time,
        }))
    }

    async fn append_event(&self, session: &Session, event: Event) -> Result<()> {
        let url = format!("{}:appendEvent", self.session_url(&session.id));
        let body = EventResource::from_event(&event)?;

        debug!("Appending {} event to session {}", event.author, session.id);

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("Failed to append event to Agent Engine session")?;
        check_status(response).await?;

        Ok(())
    }

    async fn create_session(
        &self,
        app_name: &str,
        user_id: &str,
        state: HashMap<String, Value>,
    ) -> Result<Session> {
        let url = format!("{}/sessions", self.engine_url);
        let request = CreateSessionRequest {
            user_id: user_id.to_string(),
            session_state: state,
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .context("Failed to create Agent Engine session")?;
        let response = check_status(response).await?;

        let operation: Operation = response
            .json()
            .await
            .context("Failed to parse Agent Engine create operation")?;
        let session_id = session_id_from_operation(&operation.name)
            .with_context(|| format!("Unexpected operation name: {}", operation.name))?;

        info!("Created Agent Engine session: {}", session_id);

        // Creation is a long-running operation; the session shows up shortly after.
        for _ in 0..CREATE_LOOKUP_ATTEMPTS {
            if let Some(session) = self.get_session(app_name, user_id, &session_id).await? {
                return Ok(session);
            }
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        anyhow::bail!("Session {} was not visible after creation", session_id)
    }

    async fn delete_session(&self, _app_name: &str, _user_id: &str, session_id: &str) -> Result<()> {
        let response = self
            .authorized(self.client.delete(self.session_url(session_id)))
            .send()
            .await
            .context("Failed to delete Agent Engine session")?;

        if response.status() != StatusCode::NOT_FOUND {
            check_status(response).await?;
        }

        info!("Deleted Agent Engine session: {}", session_id);
        Ok(())
    }
}

#[async_trait]
impl MessageSender for AgentEngineClient {
    async fn stream_query(
        &self,
        user_id: &str,
        session_id: &str,
        message: Content,
    ) -> Result<ChunkStream> {
        let url = format!("{}:streamQuery?alt=sse", self.engine_url);
        let body = json!({
            "class_method": "async_stream_query",
            "input": {
                "user_id": user_id,
                "session_id": session_id,
                "message": message,
            },
        });

        debug!("Streaming query into session {}", session_id);

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("Failed to start Agent Engine stream query")?;
        let response = check_status(response).await?;

        Ok(ndjson::decode_lines(response.bytes_stream()))
    }
}

impl EventResource {
    fn from_event(event: &Event) -> Result<Self> {
        let state_delta = if event.actions.state_delta.is_empty() {
            None
        } else {
            Some(event.actions.state_delta.clone())
        };

        Ok(Self {
            name: None,
            author: event.author.clone(),
            invocation_id: event.invocation_id.clone(),
            timestamp: format_timestamp(event.timestamp)?,
            content: event.content.clone(),
            actions: Some(ActionsResource { state_delta }),
        })
    }

    fn into_event(self) -> Result<Event> {
        let id = self
            .name
            .as_deref()
            .and_then(|n| n.rsplit('/').next())
            .map(str::to_string)
            .unwrap_or_else(|| self.invocation_id.clone());

        Ok(Event {
            id,
            invocation_id: self.invocation_id,
            author: self.author,
            timestamp: parse_timestamp(&self.timestamp)?,
            content: self.content,
            actions: EventActions {
                state_delta: self.actions.and_then(|a| a.state_delta).unwrap_or_default(),
            },
        })
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    anyhow::bail!("Agent Engine API error: {} - {}", status, body)
}

/// Accepts either `1234` or `projects/p/locations/l/reasoningEngines/1234`
pub fn engine_id(engine: &str) -> &str {
    engine.trim_end_matches('/').rsplit('/').next().unwrap_or(engine)
}

/// `.../sessions/{session}/operations/{op}` -> `{session}`
pub fn session_id_from_operation(name: &str) -> Option<String> {
    let mut segments = name.split('/');
    while let Some(segment) = segments.next() {
        if segment == "sessions" {
            return segments.next().filter(|s| !s.is_empty()).map(str::to_string);
        }
    }
    None
}

fn parse_timestamp(ts: &str) -> Result<f64> {
    let parsed = DateTime::parse_from_rfc3339(ts)
        .with_context(|| format!("Invalid timestamp: {}", ts))?;
    Ok(parsed.timestamp_micros() as f64 / 1_000_000.0)
}

fn format_timestamp(epoch_secs: f64) -> Result<String> {
    let micros = (epoch_secs * 1_000_000.0).round() as i64;
    let dt = DateTime::<Utc>::from_timestamp_micros(micros)
        .with_context(|| format!("Timestamp out of range: {}", epoch_secs))?;
    Ok(dt.to_rfc3339())
}
