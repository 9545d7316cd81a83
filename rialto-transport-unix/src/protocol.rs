//! The wire protocol: newline-delimited JSON over a Unix-domain socket.
//!
//! Mirrors the workspace's existing `daemon-ipc` JSON-RPC shape (request/response by id, plus
//! server-pushed events), simplified to just the three methods and two events the control plane
//! needs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl WireRequest {
    pub fn new(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), method: method.into(), params }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResponse {
    pub fn success(id: String, result: serde_json::Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    pub fn failure(id: String, error: impl Into<String>) -> Self {
        Self { id, result: None, error: Some(error.into()) }
    }

    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

impl WireEvent {
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Tags which of the three shapes a decoded line carries, since all three travel the same
/// connection interleaved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireMessage {
    Response(WireResponse),
    Event(WireEvent),
}
