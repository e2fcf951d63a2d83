//! Chat-widget events and the line parser
//!
//! Each input line is one JSON object:
//!
//! ```text
//! {"id":"53367bc7-...","from":"operator1","site_id":"123","type":"status",
//!  "data":{"status":"online"},"timestamp":1429026448}
//! ```
//!
//! `type == "message"` yields a [`Message`]; every other type yields a
//! [`StatusChange`] whose `online` flag is set only by an exact `"online"`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ParseError;

/// A visitor message sent to a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub system_id: String,
    pub from_id: String,
    pub site_id: i64,
    pub timestamp: DateTime<Utc>,
}

/// An operator presence transition for a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub system_id: String,
    pub from_id: String,
    pub site_id: i64,
    pub online: bool,
    pub timestamp: DateTime<Utc>,
}

/// One successfully parsed input record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Message(Message),
    Status(StatusChange),
}

/// Which event table a sender query reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Message,
    Status,
}

pub fn is_online(status: &Value) -> bool {
    status.as_str() == Some("online")
}

/// Parse one raw line into an [`Event`]
pub fn parse_line(line: &str) -> Result<Event, ParseError> {
    let json: Value = serde_json::from_str(line)?;

    let system_id = identifier(&json, "id")?;
    let from_id = identifier(&json, "from")?;
    let site_id = site_id(&json)?;
    let timestamp = timestamp(&json)?;

    let event_type = match json.get("type") {
        Some(Value::String(t)) => t.as_str(),
        Some(_) => {
            return Err(ParseError::WrongType {
                field: "type",
                expected: "a string",
            })
        }
        None => return Err(ParseError::MissingField("type")),
    };

    if event_type == "message" {
        return Ok(Event::Message(Message {
            system_id,
            from_id,
            site_id,
            timestamp,
        }));
    }

    let status = json
        .get("data")
        .ok_or(ParseError::MissingField("data"))?
        .get("status")
        .ok_or(ParseError::MissingField("data.status"))?;

    Ok(Event::Status(StatusChange {
        system_id,
        from_id,
        site_id,
        online: is_online(status),
        timestamp,
    }))
}

fn identifier(json: &Value, field: &'static str) -> Result<String, ParseError> {
    match json.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(ParseError::WrongType {
            field,
            expected: "a string",
        }),
        None => Err(ParseError::MissingField(field)),
    }
}

fn site_id(json: &Value) -> Result<i64, ParseError> {
    match json.get("site_id") {
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidSiteId(s.clone())),
        Some(Value::Number(n)) => n
            .as_i64()
            .ok_or_else(|| ParseError::InvalidSiteId(n.to_string())),
        Some(other) => Err(ParseError::InvalidSiteId(other.to_string())),
        None => Err(ParseError::MissingField("site_id")),
    }
}

fn timestamp(json: &Value) -> Result<DateTime<Utc>, ParseError> {
    let secs = match json.get("timestamp") {
        Some(v) => v.as_i64().ok_or(ParseError::WrongType {
            field: "timestamp",
            expected: "an integer",
        })?,
        None => return Err(ParseError::MissingField("timestamp")),
    };

    DateTime::from_timestamp(secs, 0).ok_or(ParseError::InvalidTimestamp(secs))
}
