use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::entity::constants::EventType;
use crate::model::contexts::Contexts;

/// Envelope the intake API publishes for each accepted event. Workers consume
/// batches of these.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterchangeEvent {
    pub event_id: Uuid,
    pub project_id: i32,
    pub organization_id: i32,
    pub received: DateTime<Utc>,
    pub payload: EventPayload,
}

/// Event payload, discriminated by the `type` field. Payloads without a
/// `type` are treated as plain default events.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventPayload {
    Default(IssueEventPayload),
    Error(IssueEventPayload),
    Csp(CspEventPayload),
    Transaction(TransactionEventPayload),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::Default(_) => EventType::Default,
            EventPayload::Error(_) => EventType::Error,
            EventPayload::Csp(_) => EventType::Csp,
            EventPayload::Transaction(_) => EventType::Transaction,
        }
    }
}

impl<'de> Deserialize<'de> for EventPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("default")
            .to_owned();
        let payload = match kind.as_str() {
            "default" => IssueEventPayload::deserialize(value).map(EventPayload::Default),
            "error" => IssueEventPayload::deserialize(value).map(EventPayload::Error),
            "csp" => CspEventPayload::deserialize(value).map(EventPayload::Csp),
            "transaction" => {
                TransactionEventPayload::deserialize(value).map(EventPayload::Transaction)
            }
            other => {
                return Err(de::Error::unknown_variant(
                    other,
                    &["default", "error", "csp", "transaction"],
                ));
            }
        };
        payload.map_err(de::Error::custom)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueEventPayload {
    #[serde(deserialize_with = "deserialize_timestamp_opt")]
    pub timestamp: Option<DateTime<Utc>>,
    pub platform: Option<String>,
    pub level: Option<String>,
    pub logentry: Option<LogEntry>,
    pub logger: Option<String>,
    #[serde(alias = "culprit")]
    pub transaction: Option<String>,
    pub server_name: Option<String>,
    pub release: Option<String>,
    pub dist: Option<String>,
    #[serde(deserialize_with = "deserialize_key_values")]
    pub tags: BTreeMap<String, Option<String>>,
    pub environment: Option<String>,
    pub modules: BTreeMap<String, Option<String>>,
    pub extra: Option<Value>,
    #[serde(deserialize_with = "deserialize_fingerprint")]
    pub fingerprint: Option<Vec<Option<String>>>,
    pub exception: Option<ExceptionChain>,
    pub message: Option<EventMessage>,
    pub breadcrumbs: Option<Value>,
    pub sdk: Option<Value>,
    pub request: Option<EventRequest>,
    pub contexts: Contexts,
    pub user: Option<EventUser>,
}

/// `message` accepts either a bare string or a structured log entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventMessage {
    Raw(String),
    Structured(LogEntry),
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogEntry {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<MessageParams>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageParams {
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

/// Exception payloads arrive either wrapped in `{"values": [...]}` or as a
/// bare list.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExceptionChain {
    Tagged { values: Vec<ExceptionValue> },
    List(Vec<ExceptionValue>),
}

impl ExceptionChain {
    pub fn values(&self) -> &[ExceptionValue] {
        match self {
            ExceptionChain::Tagged { values } => values,
            ExceptionChain::List(values) => values,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionValue {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mechanism: Option<ExceptionMechanism>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stacktrace: Option<Stacktrace>,
}

impl ExceptionValue {
    /// Exception value rendered as text. Non-string values are kept as their
    /// compact JSON form.
    pub fn value_string(&self) -> Option<String> {
        match &self.value {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExceptionMechanism {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub synthetic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Stacktrace {
    pub frames: Vec<Frame>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registers: Option<Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lineno: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colno: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abs_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_context: Option<Vec<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_context: Option<Vec<Option<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub in_app: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_start: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vars: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instruction_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addr_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub symbol_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Header pairs, sorted by name. Cookie headers are stripped at intake.
    #[serde(deserialize_with = "deserialize_headers")]
    pub headers: Vec<(String, Option<String>)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_string: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inferred_content_type: Option<String>,
}

impl EventRequest {
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key == "User-Agent")
            .and_then(|(_, value)| value.as_deref())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventUser {
    #[serde(
        deserialize_with = "deserialize_coerced_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub geo: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Security (CSP) report event. Everything a default event carries plus the
/// report itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CspEventPayload {
    #[serde(flatten)]
    pub base: IssueEventPayload,
    pub csp: CspReport,
}

/// Browser CSP violation report. Browsers send hyphenated keys; the stored
/// form uses underscores.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CspReport {
    #[serde(alias = "blocked-uri", skip_serializing_if = "Option::is_none")]
    pub blocked_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disposition: Option<String>,
    #[serde(alias = "document-uri", skip_serializing_if = "Option::is_none")]
    pub document_uri: Option<String>,
    #[serde(alias = "effective-directive", skip_serializing_if = "Option::is_none")]
    pub effective_directive: Option<String>,
    #[serde(alias = "original-policy", skip_serializing_if = "Option::is_none")]
    pub original_policy: Option<String>,
    #[serde(alias = "script-sample", skip_serializing_if = "Option::is_none")]
    pub script_sample: Option<String>,
    #[serde(alias = "status-code", skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    #[serde(alias = "line-number", skip_serializing_if = "Option::is_none")]
    pub line_number: Option<i64>,
    #[serde(alias = "column-number", skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
    #[serde(alias = "violated-directive", skip_serializing_if = "Option::is_none")]
    pub violated_directive: Option<String>,
}

impl CspReport {
    /// Effective directive, falling back to the first token of the violated
    /// directive for older report formats that omit it.
    pub fn directive(&self) -> Option<&str> {
        self.effective_directive
            .as_deref()
            .filter(|d| !d.is_empty())
            .or_else(|| {
                self.violated_directive
                    .as_deref()
                    .and_then(|d| d.split_whitespace().next())
            })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionEventPayload {
    pub transaction: String,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub start_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub contexts: Contexts,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub sdk: Option<Value>,
    #[serde(default)]
    pub request: Option<EventRequest>,
    #[serde(default, deserialize_with = "deserialize_key_values")]
    pub tags: BTreeMap<String, Option<String>>,
}

fn coerce_string(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn deserialize_coerced_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(coerce_string))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeyValueInput {
    Map(BTreeMap<String, Option<Value>>),
    List(Vec<(String, Option<Value>)>),
}

/// Tags arrive as either a map or a list of pairs; later duplicates win when
/// a list repeats a key.
fn deserialize_key_values<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<KeyValueInput>::deserialize(deserializer)?;
    let mut out = BTreeMap::new();
    match input {
        None => {}
        Some(KeyValueInput::Map(map)) => {
            for (key, value) in map {
                out.insert(key, value.and_then(coerce_string));
            }
        }
        Some(KeyValueInput::List(pairs)) => {
            for (key, value) in pairs {
                out.insert(key, value.and_then(coerce_string));
            }
        }
    }
    Ok(out)
}

fn deserialize_fingerprint<'de, D>(deserializer: D) -> Result<Option<Vec<Option<String>>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Vec<Option<Value>>>::deserialize(deserializer)?;
    Ok(value.map(|parts| {
        parts
            .into_iter()
            .map(|part| part.and_then(coerce_string))
            .collect()
    }))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum HeaderInput {
    Map(BTreeMap<String, Value>),
    List(Vec<(String, Value)>),
}

fn coerce_header_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        Value::Array(parts) => Some(
            parts
                .into_iter()
                .filter_map(coerce_string)
                .collect::<Vec<_>>()
                .join(", "),
        ),
        other => Some(other.to_string()),
    }
}

fn deserialize_headers<'de, D>(deserializer: D) -> Result<Vec<(String, Option<String>)>, D::Error>
where
    D: Deserializer<'de>,
{
    let input = Option::<HeaderInput>::deserialize(deserializer)?;
    let mut pairs: Vec<(String, Option<String>)> = match input {
        None => Vec::new(),
        Some(HeaderInput::Map(map)) => map
            .into_iter()
            .map(|(key, value)| (key, coerce_header_value(value)))
            .collect(),
        Some(HeaderInput::List(list)) => list
            .into_iter()
            .map(|(key, value)| (key, coerce_header_value(value)))
            .collect(),
    };
    pairs.retain(|(key, _)| key != "Cookie");
    pairs.sort();
    Ok(pairs)
}

/// Client timestamps come as RFC 3339 strings, naive datetimes, or unix
/// epoch numbers.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => {
            let epoch = n.as_f64()?;
            let mut secs = epoch.trunc() as i64;
            let mut nanos = (epoch.fract() * 1_000_000_000.0).round() as u32;
            if nanos >= 1_000_000_000 {
                secs += 1;
                nanos = 0;
            }
            Utc.timestamp_opt(secs, nanos).single()
        }
        Value::String(s) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive))
        }
        _ => None,
    }
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    parse_timestamp(&value).ok_or_else(|| de::Error::custom("invalid timestamp"))
}

fn deserialize_timestamp_opt<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_timestamp(&value)
            .map(Some)
            .ok_or_else(|| de::Error::custom("invalid timestamp")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_without_type_is_default() {
        let event: InterchangeEvent = serde_json::from_value(json!({
            "event_id": "9dbc5c8dbc5c4c4c9dbc5c8dbc5c4c4c",
            "project_id": 1,
            "organization_id": 1,
            "received": "2025-07-01T10:00:00Z",
            "payload": {"message": "it broke"}
        }))
        .unwrap();
        assert_eq!(event.payload.event_type(), EventType::Default);
    }

    #[test]
    fn error_payload_keeps_exception_values() {
        let payload: EventPayload = serde_json::from_value(json!({
            "type": "error",
            "exception": {"values": [{"type": "ValueError", "value": "bad input"}]}
        }))
        .unwrap();
        let EventPayload::Error(inner) = payload else {
            panic!("expected error payload");
        };
        let values = inner.exception.unwrap();
        assert_eq!(values.values().len(), 1);
        assert_eq!(values.values()[0].ty.as_deref(), Some("ValueError"));
    }

    #[test]
    fn bare_exception_list_is_accepted() {
        let payload: IssueEventPayload = serde_json::from_value(json!({
            "exception": [{"type": "TypeError"}]
        }))
        .unwrap();
        assert_eq!(payload.exception.unwrap().values().len(), 1);
    }

    #[test]
    fn culprit_aliases_transaction() {
        let payload: IssueEventPayload =
            serde_json::from_value(json!({"culprit": "app.views in render"})).unwrap();
        assert_eq!(payload.transaction.as_deref(), Some("app.views in render"));
    }

    #[test]
    fn tags_accept_list_and_map_forms() {
        let from_list: IssueEventPayload = serde_json::from_value(json!({
            "tags": [["browser", "Firefox"], ["mode", null]]
        }))
        .unwrap();
        assert_eq!(
            from_list.tags.get("browser").and_then(|v| v.as_deref()),
            Some("Firefox")
        );
        assert_eq!(from_list.tags.get("mode"), Some(&None));

        let from_map: IssueEventPayload = serde_json::from_value(json!({
            "tags": {"release": 42}
        }))
        .unwrap();
        assert_eq!(
            from_map.tags.get("release").and_then(|v| v.as_deref()),
            Some("42")
        );
    }

    #[test]
    fn headers_are_sorted_and_cookie_is_dropped() {
        let request: EventRequest = serde_json::from_value(json!({
            "headers": {"User-Agent": "Mozilla/5.0", "Cookie": "secret", "Accept": "text/html"}
        }))
        .unwrap();
        let keys: Vec<&str> = request.headers.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["Accept", "User-Agent"]);
        assert_eq!(request.user_agent(), Some("Mozilla/5.0"));
    }

    #[test]
    fn csp_report_accepts_hyphenated_keys() {
        let payload: EventPayload = serde_json::from_value(json!({
            "type": "csp",
            "csp": {
                "blocked-uri": "https://evil.example/evil.js",
                "effective-directive": "script-src",
                "status-code": 0
            }
        }))
        .unwrap();
        let EventPayload::Csp(csp) = payload else {
            panic!("expected csp payload");
        };
        assert_eq!(
            csp.csp.blocked_uri.as_deref(),
            Some("https://evil.example/evil.js")
        );
        assert_eq!(csp.csp.directive(), Some("script-src"));

        let stored = serde_json::to_value(&csp.csp).unwrap();
        assert!(stored.get("blocked_uri").is_some());
        assert!(stored.get("blocked-uri").is_none());
    }

    #[test]
    fn csp_directive_falls_back_to_violated_directive() {
        let report = CspReport {
            violated_directive: Some("style-src cdn.example.com".to_owned()),
            ..Default::default()
        };
        assert_eq!(report.directive(), Some("style-src"));
    }

    #[test]
    fn transaction_accepts_epoch_timestamps() {
        let payload: TransactionEventPayload = serde_json::from_value(json!({
            "transaction": "GET /articles",
            "timestamp": 1751364001.5,
            "start_timestamp": 1751364000.0
        }))
        .unwrap();
        let millis = (payload.timestamp - payload.start_timestamp).num_milliseconds();
        assert_eq!(millis, 1500);
    }

    #[test]
    fn naive_timestamps_are_read_as_utc() {
        let payload: IssueEventPayload = serde_json::from_value(json!({
            "timestamp": "2025-07-01T10:30:00.250"
        }))
        .unwrap();
        let ts = payload.timestamp.unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-07-01T10:30:00.250+00:00");
    }

    #[test]
    fn unknown_payload_type_is_rejected() {
        let result: Result<EventPayload, _> =
            serde_json::from_value(json!({"type": "replay", "message": "nope"}));
        assert!(result.is_err());
    }
}
