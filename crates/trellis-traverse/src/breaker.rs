//! Structured early-exit signals.

use crate::error::TraverseError;
use serde::{Deserialize, Serialize};

/// One build failure or early-exit signal, tagged with the target it
/// belongs to. Recipe executors return these; the engine aggregates them
/// at each join point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Breaker {
    pub target: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Breaker {
    pub fn new(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
            pos: None,
            error: None,
        }
    }

    pub fn from_error(target: &str, err: &TraverseError) -> Self {
        Self {
            target: target.to_string(),
            message: err.to_string(),
            pos: None,
            error: Some(err.to_string()),
        }
    }
}
