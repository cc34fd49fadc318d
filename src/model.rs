use crate::error::{PanelError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Form input exactly as typed. `cycles` and `delay` stay strings until a
/// start request is built from them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartForm {
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub cycles: String,
    #[serde(default)]
    pub delay: String,
}

/// Payload of `start_cycles`. A `None` count is the not-a-number sentinel and
/// goes over the wire as `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub keywords: String,
    pub website: String,
    pub cycles: Option<i64>,
    pub delay: Option<i64>,
}

impl StartRequest {
    /// Build the request from raw form input, rejecting blank required fields.
    pub fn from_form(form: &StartForm) -> Result<Self> {
        if form.keywords.trim().is_empty() || form.website.trim().is_empty() {
            return Err(PanelError::Validation(
                "Please fill in both keywords and target website!".into(),
            ));
        }
        Ok(Self {
            keywords: form.keywords.clone(),
            website: form.website.clone(),
            cycles: parse_int_lenient(&form.cycles),
            delay: parse_int_lenient(&form.delay),
        })
    }
}

/// Parse the leading integer of `s` the permissive way: surrounding
/// whitespace and trailing junk are ignored, a `0x` prefix switches to hex.
/// Returns `None` when no digits lead the string. Out-of-range values
/// saturate.
pub fn parse_int_lenient(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, digits) = if rest.starts_with("0x") || rest.starts_with("0X") {
        (16, &rest[2..])
    } else {
        (10, rest)
    };

    let mut value: i64 = 0;
    let mut seen = false;
    for c in digits.chars() {
        let Some(d) = c.to_digit(radix) else { break };
        seen = true;
        value = value
            .saturating_mul(radix as i64)
            .saturating_add(d as i64);
    }
    if !seen {
        return None;
    }
    Some(if negative { value.saturating_neg() } else { value })
}

/// Messages the panel sends to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    StartCycles(StartRequest),
    StopCycles,
}

impl OutboundMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::StartCycles(_) => "start_cycles",
            OutboundMessage::StopCycles => "stop_cycles",
        }
    }

    pub fn payload(&self) -> Result<Option<Value>> {
        match self {
            OutboundMessage::StartCycles(req) => Ok(Some(serde_json::to_value(req)?)),
            OutboundMessage::StopCycles => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub cycle: i64,
    pub total_cycles: i64,
    pub message: String,
}

/// Body shared by `start_success`, `stop_success` and `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerMessage {
    pub message: String,
}

/// Messages the server sends to the panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// Namespace connection established (transport level, no payload).
    Connected,
    StatusUpdate(StatusUpdate),
    StartSuccess(ServerMessage),
    StopSuccess(ServerMessage),
    Error(ServerMessage),
}

impl InboundMessage {
    /// Map a named server event to a message. Unknown names yield `Ok(None)`;
    /// a known name with a payload of the wrong shape is a protocol error.
    pub fn from_event(name: &str, data: Option<Value>) -> Result<Option<Self>> {
        let data = data.unwrap_or(Value::Null);
        let msg = match name {
            "status_update" => InboundMessage::StatusUpdate(decode(name, data)?),
            "start_success" => InboundMessage::StartSuccess(decode(name, data)?),
            "stop_success" => InboundMessage::StopSuccess(decode(name, data)?),
            "error" => InboundMessage::Error(decode(name, data)?),
            _ => return Ok(None),
        };
        Ok(Some(msg))
    }
}

fn decode<T: serde::de::DeserializeOwned>(name: &str, data: Value) -> Result<T> {
    serde_json::from_value(data)
        .map_err(|e| PanelError::Protocol(format!("malformed `{name}` payload: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(keywords: &str, website: &str, cycles: &str, delay: &str) -> StartForm {
        StartForm {
            keywords: keywords.into(),
            website: website.into(),
            cycles: cycles.into(),
            delay: delay.into(),
        }
    }

    #[test]
    fn lenient_parse_matches_leading_integer_rules() {
        assert_eq!(parse_int_lenient("5"), Some(5));
        assert_eq!(parse_int_lenient("  42  "), Some(42));
        assert_eq!(parse_int_lenient("-3"), Some(-3));
        assert_eq!(parse_int_lenient("+7"), Some(7));
        assert_eq!(parse_int_lenient("12abc"), Some(12));
        assert_eq!(parse_int_lenient("5.9"), Some(5));
        assert_eq!(parse_int_lenient("0x1A"), Some(26));
        assert_eq!(parse_int_lenient("abc"), None);
        assert_eq!(parse_int_lenient(""), None);
        assert_eq!(parse_int_lenient("-"), None);
        assert_eq!(parse_int_lenient("0x"), None);
        assert_eq!(parse_int_lenient("99999999999999999999999"), Some(i64::MAX));
    }

    #[test]
    fn start_request_keeps_fields_verbatim() {
        let req = StartRequest::from_form(&form("seo tips", "example.com", "5", "1000")).unwrap();
        assert_eq!(
            req,
            StartRequest {
                keywords: "seo tips".into(),
                website: "example.com".into(),
                cycles: Some(5),
                delay: Some(1000),
            }
        );
    }

    #[test]
    fn blank_required_fields_are_rejected() {
        for (k, w) in [("", "example.com"), ("kw", ""), ("   ", "example.com"), ("kw", "\t ")] {
            match StartRequest::from_form(&form(k, w, "1", "1")) {
                Err(PanelError::Validation(_)) => {}
                other => panic!("expected validation error, got {other:?}"),
            }
        }
    }

    #[test]
    fn non_numeric_counts_serialize_as_null() {
        let req = StartRequest::from_form(&form("kw", "site", "many", "")).unwrap();
        let payload = OutboundMessage::StartCycles(req).payload().unwrap().unwrap();
        assert_eq!(
            payload,
            json!({"keywords": "kw", "website": "site", "cycles": null, "delay": null})
        );
    }

    #[test]
    fn stop_has_no_payload() {
        assert_eq!(OutboundMessage::StopCycles.event_name(), "stop_cycles");
        assert!(OutboundMessage::StopCycles.payload().unwrap().is_none());
    }

    #[test]
    fn inbound_events_decode_by_name() {
        let msg = InboundMessage::from_event(
            "status_update",
            Some(json!({"cycle": 3, "total_cycles": 5, "message": "Cycle 3 done"})),
        )
        .unwrap();
        assert_eq!(
            msg,
            Some(InboundMessage::StatusUpdate(StatusUpdate {
                cycle: 3,
                total_cycles: 5,
                message: "Cycle 3 done".into(),
            }))
        );

        let msg = InboundMessage::from_event("error", Some(json!({"message": "boom"}))).unwrap();
        assert_eq!(
            msg,
            Some(InboundMessage::Error(ServerMessage { message: "boom".into() }))
        );
    }

    #[test]
    fn unknown_events_are_ignored_and_malformed_ones_rejected() {
        assert_eq!(InboundMessage::from_event("something_else", None).unwrap(), None);
        assert!(matches!(
            InboundMessage::from_event("start_success", Some(json!({"msg": 1}))),
            Err(PanelError::Protocol(_))
        ));
        assert!(matches!(
            InboundMessage::from_event("status_update", None),
            Err(PanelError::Protocol(_))
        ));
    }
}
