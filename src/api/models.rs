//! API Data Models
//!
//! Request and response bodies for the JSON surface.

use crate::games::{
    expander::Selector,
    types::{ClosedReason, GameStatus, Role, Session},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Game status plus the betting predicate evaluated at request time
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: GameStatus,
    pub betting_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_reason: Option<ClosedReason>,
    pub deadline: DateTime<Utc>,
    pub server_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    #[serde(default)]
    pub role: Option<Role>,
}

/// A selector given either in compact text (`"head=5"`) or as a tagged object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SelectorInput {
    Compact(String),
    Structured(Selector),
}

impl SelectorInput {
    pub fn into_selector(self) -> Option<Selector> {
        match self {
            SelectorInput::Compact(text) => Selector::parse(&text),
            SelectorInput::Structured(selector) => Some(selector),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlaceBetRequest {
    pub selector: SelectorInput,
    /// Stake per expanded number
    pub stake: u64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    pub account: String,
    pub amount: u64,
}

#[derive(Debug, Deserialize)]
pub struct SettleRequest {
    pub number: String,
    pub session: Session,
    /// Defaults to the configured multiplier
    #[serde(default)]
    pub multiplier: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct CloseRequest {
    pub closed: bool,
}

/// Cursor pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    crate::history::DEFAULT_PAGE_SIZE
}
