//! Backend Session Client (spec §4.8) — the HTTP+WS protocol to the
//! conversational backend. Grounded on the teacher's `OllamaBackend`
//! (`backend.rs`): a `reqwest::Client` built once with the configured
//! timeout, a thin URL-building helper, and non-2xx responses turned into
//! a typed error rather than panicking — generalized here from an LLM chat
//! API to the session/start/commit/rollback/transcribe/synthesize surface,
//! plus the reconnecting WS leg the teacher's HTTP-only backend never had.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use callbridge_config::Settings;

use crate::error::BackendError;

/// Result of `POST /session_v2`.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenedSession {
    pub session_id: String,
}

/// Result of `POST /session/{id}/commit`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommitResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Decoded inbound WS event (spec §6 "Backend WS").
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Message(String),
    Eos,
    Eoc,
    Timeout,
    Close,
    Error(String),
}

/// Thin HTTP+WS client, one per process, shared across calls (spec §5
/// "Shared resources").
pub struct SessionClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SessionClient {
    pub fn new(settings: &Settings) -> Result<Self, BackendError> {
        let timeouts = &callbridge_config::constants::http::TOTAL_TIMEOUT_SECS;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(*timeouts))
            .connect_timeout(Duration::from_secs(
                callbridge_config::constants::http::CONNECT_TIMEOUT_SECS,
            ))
            .build()?;
        Ok(Self {
            http,
            base_url: settings.backend_url.trim_end_matches('/').to_string(),
            token: settings.authorization_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn auth(&self, rb: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        rb.bearer_auth(&self.token)
    }

    async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = resp.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            return Err(BackendError::PermissionDenied);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }
        Ok(resp)
    }

    /// `POST /session_v2` multipart `{body, attachments…}`. `attachments`
    /// are `(field_name, bytes, filename)` triples.
    pub async fn open_session(
        &self,
        body: serde_json::Value,
        attachments: Vec<(String, Vec<u8>, String)>,
    ) -> Result<OpenedSession, BackendError> {
        let mut form = reqwest::multipart::Form::new().text("body", body.to_string());
        for (field, bytes, filename) in attachments {
            form = form.part(field, reqwest::multipart::Part::bytes(bytes).file_name(filename));
        }
        let resp = self
            .auth(self.http.post(self.url("/session_v2")).multipart(form))
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        let value: serde_json::Value = resp.json().await?;
        let session_id = value
            .get("session")
            .and_then(|s| s.get("session_id"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| BackendError::Status {
                status: reqwest::StatusCode::OK,
                body: "session_v2 response missing session.session_id".to_string(),
            })?
            .to_string();
        Ok(OpenedSession { session_id })
    }

    pub async fn start(
        &self,
        session_id: &str,
        message: &str,
        kwargs: serde_json::Value,
    ) -> Result<(), BackendError> {
        let body = serde_json::json!({ "message": message, "kwargs": kwargs });
        let resp = self
            .auth(
                self.http
                    .post(self.url(&format!("/session/{session_id}/start")))
                    .json(&body),
            )
            .send()
            .await?;
        Self::checked(resp).await?;
        Ok(())
    }

    pub async fn commit(&self, session_id: &str) -> Result<CommitResponse, BackendError> {
        let resp = self
            .auth(
                self.http
                    .post(self.url(&format!("/session/{session_id}/commit")))
                    .json(&serde_json::json!({})),
            )
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        Ok(resp.json().await?)
    }

    pub async fn rollback(&self, session_id: &str) -> Result<(), BackendError> {
        let resp = self
            .auth(
                self.http
                    .post(self.url(&format!("/session/{session_id}/rollback")))
                    .json(&serde_json::json!({})),
            )
            .send()
            .await?;
        Self::checked(resp).await?;
        Ok(())
    }

    pub async fn close(&self, session_id: &str, status: &str) -> Result<(), BackendError> {
        let resp = self
            .auth(
                self.http
                    .delete(self.url(&format!("/session/{session_id}")))
                    .query(&[("status", status)]),
            )
            .send()
            .await?;
        Self::checked(resp).await?;
        Ok(())
    }

    /// `POST /transcribe`, body = raw WAV bytes (spec §6 "STT HTTP" backend
    /// mode).
    pub async fn transcribe(&self, wav_bytes: Vec<u8>) -> Result<String, BackendError> {
        let resp = self
            .auth(
                self.http
                    .post(self.url("/transcribe"))
                    .header("Content-Type", "audio/wav")
                    .body(wav_bytes),
            )
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        let text = resp.text().await?;
        Ok(parse_transcription(&text))
    }

    /// `GET /session/{id}/synthesize?text=…&format=wav`.
    pub async fn synthesize(&self, session_id: &str, text: &str) -> Result<Vec<u8>, BackendError> {
        let resp = self
            .auth(
                self.http
                    .get(self.url(&format!("/session/{session_id}/synthesize")))
                    .query(&[("text", text), ("format", "wav")]),
            )
            .send()
            .await?;
        let resp = Self::checked(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    /// Spawn the reconnect-forever WS loop for an open session (spec §4.8):
    /// reconnects on every drop with a fixed back-off while `tx` has a live
    /// receiver, dispatching decoded events as they arrive.
    pub fn spawn_ws(
        self: Arc<Self>,
        session_id: String,
        tx: mpsc::UnboundedSender<WsEvent>,
    ) -> tokio::task::AbortHandle {
        tokio::spawn(async move {
            loop {
                if tx.is_closed() {
                    break;
                }
                if let Err(e) = self.ws_connect_once(&session_id, &tx).await {
                    tracing::warn!(session_id = %session_id, error = %e, "backend ws connection dropped");
                }
                if tx.is_closed() {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(
                    callbridge_config::constants::http::WS_RECONNECT_BACKOFF_SECS,
                ))
                .await;
            }
        })
        .abort_handle()
    }

    async fn ws_connect_once(
        &self,
        session_id: &str,
        tx: &mpsc::UnboundedSender<WsEvent>,
    ) -> Result<(), BackendError> {
        let url = ws_url(&self.base_url, session_id)?;
        let mut request = url
            .into_client_request()
            .map_err(BackendError::Ws)?;
        request.headers_mut().insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", self.token))
                .map_err(|_| BackendError::InvalidUrl("authorization token is not a valid header value".to_string()))?,
        );
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        let (mut write, mut read) = stream.split();

        while let Some(msg) = read.next().await {
            let msg = msg?;
            match msg {
                WsMessage::Text(text) => {
                    if let Some(event) = parse_ws_event(&text) {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
                WsMessage::Ping(payload) => {
                    write.send(WsMessage::Pong(payload)).await?;
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
        Ok(())
    }
}

/// `http(s)://host/...` → `ws(s)://host/ws/{session_id}`.
fn ws_url(base_url: &str, session_id: &str) -> Result<String, BackendError> {
    let converted = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        return Err(BackendError::InvalidUrl(base_url.to_string()));
    };
    Ok(format!("{converted}/ws/{session_id}"))
}

fn parse_ws_event(text: &str) -> Option<WsEvent> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value.get("type")?.as_str()? {
        "message" => Some(WsEvent::Message(value.get("message")?.as_str()?.to_string())),
        "eos" => Some(WsEvent::Eos),
        "eoc" => Some(WsEvent::Eoc),
        "timeout" => Some(WsEvent::Timeout),
        "close" => Some(WsEvent::Close),
        "error" => Some(WsEvent::Error(
            value.get("error").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        )),
        _ => None,
    }
}

/// STT responses are `{"text":"…"}` or a bare JSON/plain string (spec §6).
/// Empty transcriptions are valid, not an error.
pub(crate) fn parse_transcription(text: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
        if let Some(t) = value.get("text").and_then(|v| v.as_str()) {
            return t.to_string();
        }
        if let Some(s) = value.as_str() {
            return s.to_string();
        }
    }
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_url_converts_scheme() {
        assert_eq!(
            ws_url("http://backend.local:8000", "abc").unwrap(),
            "ws://backend.local:8000/ws/abc"
        );
        assert_eq!(
            ws_url("https://backend.example", "abc").unwrap(),
            "wss://backend.example/ws/abc"
        );
    }

    #[test]
    fn parses_every_ws_event_kind() {
        assert_eq!(
            parse_ws_event(r#"{"type":"message","message":"hi"}"#),
            Some(WsEvent::Message("hi".to_string()))
        );
        assert_eq!(parse_ws_event(r#"{"type":"eos"}"#), Some(WsEvent::Eos));
        assert_eq!(parse_ws_event(r#"{"type":"eoc"}"#), Some(WsEvent::Eoc));
        assert_eq!(parse_ws_event(r#"{"type":"timeout"}"#), Some(WsEvent::Timeout));
        assert_eq!(parse_ws_event(r#"{"type":"close"}"#), Some(WsEvent::Close));
        assert_eq!(
            parse_ws_event(r#"{"type":"error","error":"boom"}"#),
            Some(WsEvent::Error("boom".to_string()))
        );
        assert_eq!(parse_ws_event(r#"{"type":"unknown"}"#), None);
    }

    #[test]
    fn transcription_handles_object_string_and_raw_text() {
        assert_eq!(parse_transcription(r#"{"text":"hello there"}"#), "hello there");
        assert_eq!(parse_transcription(r#""hello there""#), "hello there");
        assert_eq!(parse_transcription("hello there"), "hello there");
        assert_eq!(parse_transcription(r#"{"text":""}"#), "");
    }
}
