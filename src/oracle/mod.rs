//! # Text Understanding Service
//!
//! Four typed request kinds are delegated to a text service: splitting a time slot into
//! sessions, simplifying category labels, looking up a timezone and picking rooms from a
//! table heading. [`gemini::GeminiOracle`] calls a hosted model, [`local::LocalOracle`] answers
//! deterministically, and [`gateway::Gateway`] adds memoization, validation, retries and pacing
//! around either.
use crate::schedule::Day;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod gateway;
pub mod gemini;
pub mod local;

/// Errors raised by text service implementations
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Environment variable '{0}' with the API key is not set")]
    MissingApiKey(String),

    #[error("{0}")]
    Http(#[from] reqwest::Error),

    #[error("Service answered with status {0}: {1}")]
    Status(u16, String),

    #[error("Service answer carries no text")]
    EmptyAnswer,

    #[error("Malformed answer: {0}")]
    Malformed(String),

    #[error("{0} lookups are not supported by the {1} text service")]
    Unsupported(&'static str, &'static str),
}

/// One alias of the target rooms
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomLegendEntry {
    pub alias: String,
    /// Room names joined with ` + `
    pub rooms: String,
}

/// Cell text of the primary document under its room alias
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryEntry {
    pub room: String,
    pub text: String,
}

/// Cell text of a supplementary document; its room label is only a hint
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplementaryEntry {
    pub source: String,
    pub room: String,
    pub text: String,
}

/// Everything the service sees about one time slot
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub day: Day,
    pub block_start: String,
    pub block_end: String,
    pub block_duration: u32,
    pub rooms: Vec<RoomLegendEntry>,
    pub primary: Vec<PrimaryEntry>,
    pub supplementary: Vec<SupplementaryEntry>,
}

/// A session suggested by the service, not yet validated
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedSession {
    pub room_alias: String,
    pub name: String,
    pub duration_minutes: i64,
    #[serde(default)]
    pub chair: Option<String>,
    #[serde(default)]
    pub group_header: String,
    #[serde(default)]
    pub agenda_item: Option<String>,
}

/// Heading text of a supplementary table and the rooms it may refer to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextRoomsRequest {
    pub context: String,
    /// Rooms of the primary document's first schedule table, main room first
    pub online: Vec<String>,
    pub offline: Vec<String>,
    pub needed: usize,
}

impl ContextRoomsRequest {
    pub fn available(&self) -> Vec<String> {
        self.online.iter().chain(self.offline.iter()).cloned().collect()
    }
}

/// A text understanding service
pub trait TextOracle {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Flat session list of a time slot, grouped by room alias in chronological order
    fn slot_sessions(&self, request: &SlotRequest) -> Result<Vec<ProposedSession>, OracleError>;

    /// Total mapping from every label to a simplified label
    fn category_mapping(&self, labels: &[String]) -> Result<BTreeMap<String, String>, OracleError>;

    /// IANA timezone of a meeting location line
    fn timezone(&self, location: &str) -> Result<String, OracleError>;

    /// Ordered subset of the available rooms a table heading refers to
    fn context_rooms(&self, request: &ContextRoomsRequest) -> Result<Vec<String>, OracleError>;
}
