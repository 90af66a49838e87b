use regex::{Captures, Regex};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use super::user_agent;
use crate::entity::constants::{EventType, LogLevel};
use crate::model::contexts::context_str;
use crate::model::event::{
    CspReport, EventMessage, ExceptionValue, Frame, IssueEventPayload, LogEntry, MessageParams,
    Stacktrace,
};

const MAX_TITLE_LENGTH: usize = 100;
const MAX_CULPRIT_LENGTH: usize = 200;
const MAX_VALUE_LENGTH: usize = 1024;
const MAX_TYPE_LENGTH: usize = 128;

/// Everything the pipeline derives from one issue event payload.
#[derive(Clone, Debug)]
pub struct EnrichedEvent {
    pub title: String,
    pub culprit: String,
    pub metadata: Map<String, Value>,
    pub event_data: Map<String, Value>,
    pub level: Option<LogLevel>,
}

/// Derives title, culprit, metadata, and the stored data document for an
/// issue event. Strings going to the database are NUL-sanitized here so the
/// grouping hash sees the same text that gets stored.
pub fn enrich_event(
    event_type: EventType,
    payload: &IssueEventPayload,
    csp: Option<&CspReport>,
) -> EnrichedEvent {
    let mut event_data = Map::new();
    let mut metadata = Map::new();

    let (full_title, title, culprit) = if event_type == EventType::Csp {
        let directive = csp
            .and_then(CspReport::directive)
            .unwrap_or_default()
            .to_owned();
        let blocked_uri = csp
            .and_then(|report| report.blocked_uri.as_deref())
            .unwrap_or_default();
        let title = format!(
            "Blocked '{}' from '{}'",
            directive.replace("-src", ""),
            uri_netloc(blocked_uri)
        );
        if let Some(report) = csp {
            if let Ok(value) = serde_json::to_value(report) {
                event_data.insert("csp".to_owned(), value);
            }
        }
        (title.clone(), title, directive)
    } else {
        metadata = extract_error_metadata(payload);
        let full_title = if event_type == EventType::Error && !metadata.is_empty() {
            metadata_title(&metadata)
        } else {
            message_title(payload)
        };
        let culprit = get_location(payload);
        let title = truncatechars(&full_title, MAX_TITLE_LENGTH);
        (full_title, title, culprit)
    };

    if !metadata.is_empty() {
        event_data.insert("metadata".to_owned(), Value::Object(metadata.clone()));
    }
    if let Some(platform) = payload.platform.as_deref().filter(|p| !p.is_empty()) {
        event_data.insert("platform".to_owned(), Value::String(platform.to_owned()));
    }
    if !payload.modules.is_empty() {
        if let Ok(value) = serde_json::to_value(&payload.modules) {
            event_data.insert("modules".to_owned(), value);
        }
    }
    if let Some(sdk) = &payload.sdk {
        if json_truthy(sdk) {
            event_data.insert("sdk".to_owned(), sdk.clone());
        }
    }
    if let Some(request) = &payload.request {
        if let Ok(value) = serde_json::to_value(request) {
            event_data.insert("request".to_owned(), value);
        }
    }
    if let Some(environment) = payload.environment.as_deref().filter(|e| !e.is_empty()) {
        event_data.insert(
            "environment".to_owned(),
            Value::String(environment.to_owned()),
        );
    }
    if let Some(entry) = &payload.logentry {
        if let Ok(value) = serde_json::to_value(entry) {
            event_data.insert("logentry".to_owned(), value);
        }
    } else if let Some(message) = &payload.message {
        match message {
            EventMessage::Raw(text) => {
                event_data.insert("logentry".to_owned(), json!({ "formatted": text }));
            }
            EventMessage::Structured(entry) => {
                if let Ok(value) = serde_json::to_value(entry) {
                    event_data.insert("logentry".to_owned(), value);
                }
            }
        }
    }
    if let Some(message) = &payload.message {
        let text = match message {
            EventMessage::Raw(text) => text.clone(),
            EventMessage::Structured(entry) => entry.formatted.clone().unwrap_or_default(),
        };
        event_data.insert("message".to_owned(), Value::String(text));
    } else if title != full_title {
        event_data.insert("message".to_owned(), Value::String(full_title.clone()));
    }
    if let Some(breadcrumbs) = &payload.breadcrumbs {
        if json_truthy(breadcrumbs) {
            event_data.insert("breadcrumbs".to_owned(), breadcrumbs.clone());
        }
    }
    if let Some(exception) = &payload.exception {
        if !exception.values().is_empty() {
            if let Ok(value) = serde_json::to_value(exception) {
                event_data.insert("exception".to_owned(), value);
            }
        }
    }
    if let Some(extra) = &payload.extra {
        if json_truthy(extra) {
            event_data.insert("extra".to_owned(), extra.clone());
        }
    }
    if let Some(user) = &payload.user {
        if let Ok(value) = serde_json::to_value(user) {
            event_data.insert("user".to_owned(), value);
        }
    }
    if !payload.contexts.is_empty() {
        if let Ok(value) = serde_json::to_value(&payload.contexts) {
            event_data.insert("contexts".to_owned(), value);
        }
    }

    let level = payload
        .level
        .as_deref()
        .filter(|l| !l.is_empty())
        .map(LogLevel::from_string);

    EnrichedEvent {
        title: sanitize_string(&title),
        culprit: truncatechars(&sanitize_string(&culprit), MAX_CULPRIT_LENGTH),
        metadata: sanitize_map(metadata),
        event_data: sanitize_map(event_data),
        level,
    }
}

/// Fills in browser, os, and device contexts from the User-Agent header.
/// Contexts the client already sent are left alone.
pub fn augment_contexts(payload: &mut IssueEventPayload) {
    let Some(user_agent) = payload
        .request
        .as_ref()
        .and_then(|request| request.user_agent())
        .map(str::to_owned)
    else {
        return;
    };
    let info = user_agent::parse(&user_agent);
    if let Some(browser) = info.browser {
        if let Ok(value) = serde_json::to_value(&browser) {
            payload.contexts.entry("browser".to_owned()).or_insert(value);
        }
    }
    if let Some(os) = info.os {
        if let Ok(value) = serde_json::to_value(&os) {
            payload.contexts.entry("os".to_owned()).or_insert(value);
        }
    }
    if let Some(device) = info.device {
        if let Ok(value) = serde_json::to_value(&device) {
            payload.contexts.entry("device".to_owned()).or_insert(value);
        }
    }
}

/// Key-value tags for an event: client tags plus tags derived from contexts,
/// user, environment, release, and server name. Empty values are dropped.
pub fn generate_tags(payload: &IssueEventPayload) -> BTreeMap<String, String> {
    let mut tags: BTreeMap<String, Option<String>> = payload.tags.clone();
    if let Some(browser) = payload.contexts.get("browser") {
        if let Some(name) = context_str(browser, "name") {
            if let Some(version) = context_str(browser, "version") {
                tags.insert("browser".to_owned(), Some(format!("{name} {version}")));
            }
            tags.insert("browser.name".to_owned(), Some(name));
        }
    }
    if let Some(os) = payload.contexts.get("os") {
        if let Some(name) = context_str(os, "name") {
            tags.insert("os.name".to_owned(), Some(name));
        }
    }
    if let Some(device) = payload.contexts.get("device") {
        if let Some(model) = context_str(device, "model") {
            tags.insert("device".to_owned(), Some(model));
        }
    }
    if let Some(user) = &payload.user {
        if let Some(id) = user.id.clone() {
            tags.insert("user.id".to_owned(), Some(id));
        }
        if let Some(email) = user.email.clone() {
            tags.insert("user.email".to_owned(), Some(email));
        }
        if let Some(username) = user.username.clone() {
            tags.insert("user.username".to_owned(), Some(username));
        }
    }
    if let Some(environment) = payload.environment.clone() {
        tags.insert("environment".to_owned(), Some(environment));
    }
    if let Some(release) = payload.release.clone() {
        tags.insert("release".to_owned(), Some(release));
    }
    if let Some(server_name) = payload.server_name.clone() {
        tags.insert("server_name".to_owned(), Some(server_name));
    }
    tags.into_iter()
        .filter_map(|(key, value)| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| (key, v))
        })
        .collect()
}

/// Renders a parameterized message: `%s`/`%d` style lists and `{name}` style
/// maps. An already formatted message wins.
pub fn transform_parameterized_message(message: &EventMessage) -> String {
    match message {
        EventMessage::Raw(text) => text.clone(),
        EventMessage::Structured(entry) => transform_logentry(entry),
    }
}

pub fn transform_logentry(entry: &LogEntry) -> String {
    let formatted = entry.formatted.as_deref().unwrap_or_default();
    if formatted.is_empty() {
        if let Some(message) = entry.message.as_deref() {
            return match &entry.params {
                Some(MessageParams::List(params)) if !params.is_empty() => {
                    interpolate_positional(message, params)
                }
                Some(MessageParams::Map(params)) if !params.is_empty() => {
                    interpolate_named(message, params)
                }
                _ => message.to_owned(),
            };
        }
    }
    formatted.to_owned()
}

static POSITIONAL_RE: OnceLock<Regex> = OnceLock::new();
static NAMED_RE: OnceLock<Regex> = OnceLock::new();

fn interpolate_positional(message: &str, params: &[Value]) -> String {
    let re = POSITIONAL_RE.get_or_init(|| Regex::new(r"%[sdif]").expect("valid regex"));
    let mut remaining = params.iter();
    re.replace_all(message, |caps: &Captures| {
        remaining
            .next()
            .map(value_display)
            .unwrap_or_else(|| caps[0].to_owned())
    })
    .into_owned()
}

fn interpolate_named(message: &str, params: &BTreeMap<String, Value>) -> String {
    let re = NAMED_RE.get_or_init(|| Regex::new(r"\{(\w+)\}").expect("valid regex"));
    re.replace_all(message, |caps: &Captures| {
        params
            .get(&caps[1])
            .map(value_display)
            .unwrap_or_else(|| caps[0].to_owned())
    })
    .into_owned()
}

fn value_display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Replaces NUL bytes, which Postgres jsonb and text columns reject.
pub fn sanitize_string(value: &str) -> String {
    value.replace('\u{0}', " ")
}

pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => Value::Object(sanitize_map(map)),
        other => other,
    }
}

fn sanitize_map(map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| (sanitize_string(&key), sanitize_value(value)))
        .collect()
}

/// Truncates to `max_chars` characters, ellipsis included.
pub fn truncatechars(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_owned();
    }
    let mut truncated: String = value.chars().take(max_chars.saturating_sub(1)).collect();
    truncated.push('…');
    truncated
}

fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => true,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn last_exception(payload: &IssueEventPayload) -> Option<&ExceptionValue> {
    payload.exception.as_ref()?.values().last()
}

fn message_title(payload: &IssueEventPayload) -> String {
    if let Some(message) = &payload.message {
        if !matches!(message, EventMessage::Raw(text) if text.is_empty()) {
            return transform_parameterized_message(message);
        }
    }
    if let Some(entry) = &payload.logentry {
        return transform_logentry(entry);
    }
    "<untitled>".to_owned()
}

fn extract_error_metadata(payload: &IssueEventPayload) -> Map<String, Value> {
    let Some(exception) = last_exception(payload) else {
        return Map::new();
    };
    let mut metadata = Map::new();
    let value = exception
        .value_string()
        .map(|v| Value::String(truncatechars(&v, MAX_VALUE_LENGTH)))
        .unwrap_or(Value::Null);
    metadata.insert("value".to_owned(), value);
    let synthetic = exception
        .mechanism
        .as_ref()
        .and_then(|mechanism| mechanism.synthetic)
        .unwrap_or(false);
    if !synthetic {
        let ty = exception.ty.clone().unwrap_or_else(|| "Error".to_owned());
        metadata.insert(
            "type".to_owned(),
            Value::String(truncatechars(&ty, MAX_TYPE_LENGTH)),
        );
    }
    if let Some((filename, function)) = crash_location(payload) {
        if let Some(filename) = filename {
            metadata.insert("filename".to_owned(), Value::String(filename));
        }
        if let Some(function) = function {
            metadata.insert("function".to_owned(), Value::String(function));
        }
    }
    metadata
}

/// "type: first line of value" in the style error issues are titled.
fn metadata_title(metadata: &Map<String, Value>) -> String {
    let ty = metadata.get("type").and_then(Value::as_str);
    let Some(ty) = ty else {
        return metadata
            .get("function")
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty())
            .unwrap_or("<unknown>")
            .to_owned();
    };
    let value = metadata
        .get("value")
        .and_then(Value::as_str)
        .filter(|v| !v.is_empty());
    match value {
        None => ty.to_owned(),
        Some(value) => {
            let first_line = value.lines().next().unwrap_or_default();
            format!("{}: {}", ty, truncatechars(first_line, MAX_TITLE_LENGTH))
        }
    }
}

/// Crash frame of the last exception: the innermost in-app frame with a real
/// function name, else the innermost frame with one.
fn crash_location(payload: &IssueEventPayload) -> Option<(Option<String>, Option<String>)> {
    let exception = last_exception(payload)?;
    let frames = &exception.stacktrace.as_ref()?.frames;
    let mut fallback = None;
    let mut chosen = None;
    for frame in frames.iter().rev() {
        match frame.function.as_deref() {
            None | Some("<redacted>") => continue,
            Some(_) => {}
        }
        if frame.in_app == Some(true) {
            chosen = Some(frame);
            break;
        }
        if fallback.is_none() {
            fallback = Some(frame);
        }
    }
    let frame = chosen.or(fallback)?;
    let filename = frame
        .filename
        .clone()
        .filter(|f| !f.is_empty())
        .or_else(|| frame.abs_path.clone().filter(|p| !p.is_empty()));
    Some((filename, frame.function.clone()))
}

/// Culprit for storage: the transaction name when given, else a culprit
/// derived from the stacktrace or request URL.
fn get_location(payload: &IssueEventPayload) -> String {
    payload
        .transaction
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| generate_culprit(payload))
}

pub fn generate_culprit(payload: &IssueEventPayload) -> String {
    let platform = payload.platform.as_deref();
    let stacktrace = payload.exception.as_ref().and_then(|chain| {
        chain
            .values()
            .iter()
            .filter_map(|exception| exception.stacktrace.as_ref())
            .filter(|stacktrace| !stacktrace.frames.is_empty())
            .last()
    });
    let mut culprit = stacktrace.and_then(|stacktrace| stacktrace_culprit(stacktrace, platform));
    if culprit.is_none() {
        culprit = payload
            .request
            .as_ref()
            .and_then(|request| request.url.clone())
            .filter(|url| !url.is_empty());
    }
    culprit.unwrap_or_default()
}

fn stacktrace_culprit(stacktrace: &Stacktrace, platform: Option<&str>) -> Option<String> {
    let mut fallback = None;
    for frame in stacktrace.frames.iter().rev() {
        let fileloc = frame
            .module
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| frame.filename.as_deref().filter(|f| !f.is_empty()));
        if fileloc.is_none() {
            continue;
        }
        if frame.in_app == Some(true) {
            return Some(frame_culprit(frame, platform));
        }
        if fallback.is_none() {
            fallback = Some(frame_culprit(frame, platform));
        }
    }
    fallback
}

fn frame_culprit(frame: &Frame, platform: Option<&str>) -> String {
    let platform = frame.platform.as_deref().or(platform);
    if matches!(platform, Some("objc" | "cocoa" | "native")) {
        return frame
            .function
            .clone()
            .filter(|f| !f.is_empty())
            .unwrap_or_else(|| "?".to_owned());
    }
    let fileloc = frame
        .module
        .as_deref()
        .filter(|m| !m.is_empty())
        .or_else(|| frame.filename.as_deref().filter(|f| !f.is_empty()))
        .unwrap_or("?");
    let function = frame
        .function
        .as_deref()
        .filter(|f| !f.is_empty())
        .unwrap_or("?");
    if matches!(platform, Some("javascript" | "node")) {
        format!("{function}({fileloc})")
    } else {
        format!("{fileloc} in {function}")
    }
}

/// Host portion of a URI, matching urlparse semantics: only text following
/// `//` counts as a network location.
fn uri_netloc(uri: &str) -> &str {
    let after = if let Some(stripped) = uri.strip_prefix("//") {
        stripped
    } else if let Some(position) = uri.find("://") {
        &uri[position + 3..]
    } else {
        return "";
    };
    let end = after.find(['/', '?', '#']).unwrap_or(after.len());
    &after[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::event::{
        EventRequest, EventUser, ExceptionChain, ExceptionMechanism, Frame,
    };

    fn frame(function: &str, filename: &str, in_app: bool) -> Frame {
        Frame {
            function: Some(function.to_owned()),
            filename: Some(filename.to_owned()),
            in_app: Some(in_app),
            ..Default::default()
        }
    }

    fn error_payload() -> IssueEventPayload {
        IssueEventPayload {
            exception: Some(ExceptionChain::Tagged {
                values: vec![ExceptionValue {
                    ty: Some("ValueError".to_owned()),
                    value: Some(Value::String("bad input".to_owned())),
                    stacktrace: Some(Stacktrace {
                        frames: vec![
                            frame("outer", "vendor/lib.py", false),
                            frame("process", "app/checkout.py", true),
                        ],
                        ..Default::default()
                    }),
                    ..Default::default()
                }],
            }),
            ..Default::default()
        }
    }

    #[test]
    fn error_event_titles_from_exception_metadata() {
        let payload = error_payload();
        let enriched = enrich_event(EventType::Error, &payload, None);
        assert_eq!(enriched.title, "ValueError: bad input");
        assert_eq!(enriched.culprit, "app/checkout.py in process");
        assert_eq!(
            enriched.metadata.get("type").and_then(Value::as_str),
            Some("ValueError")
        );
        assert_eq!(
            enriched.metadata.get("filename").and_then(Value::as_str),
            Some("app/checkout.py")
        );
        assert_eq!(
            enriched.metadata.get("function").and_then(Value::as_str),
            Some("process")
        );
    }

    #[test]
    fn javascript_culprit_uses_function_first_format() {
        let mut payload = error_payload();
        payload.platform = Some("javascript".to_owned());
        let enriched = enrich_event(EventType::Error, &payload, None);
        assert_eq!(enriched.culprit, "process(app/checkout.py)");
    }

    #[test]
    fn transaction_field_wins_as_culprit() {
        let mut payload = error_payload();
        payload.transaction = Some("GET /checkout".to_owned());
        let enriched = enrich_event(EventType::Error, &payload, None);
        assert_eq!(enriched.culprit, "GET /checkout");
    }

    #[test]
    fn culprit_falls_back_to_request_url() {
        let payload = IssueEventPayload {
            request: Some(EventRequest {
                url: Some("https://shop.example/cart".to_owned()),
                ..Default::default()
            }),
            message: Some(EventMessage::Raw("it broke".to_owned())),
            ..Default::default()
        };
        let enriched = enrich_event(EventType::Default, &payload, None);
        assert_eq!(enriched.culprit, "https://shop.example/cart");
    }

    #[test]
    fn synthetic_mechanism_omits_type_from_metadata() {
        let mut payload = error_payload();
        if let Some(ExceptionChain::Tagged { values }) = payload.exception.as_mut() {
            values[0].mechanism = Some(ExceptionMechanism {
                synthetic: Some(true),
                ..Default::default()
            });
        }
        let enriched = enrich_event(EventType::Error, &payload, None);
        assert!(enriched.metadata.get("type").is_none());
        // Without a type the title falls back to the crash function.
        assert_eq!(enriched.title, "process");
    }

    #[test]
    fn missing_exception_type_defaults_to_error() {
        let payload = IssueEventPayload {
            exception: Some(ExceptionChain::List(vec![ExceptionValue {
                value: Some(Value::String("kaboom".to_owned())),
                ..Default::default()
            }])),
            ..Default::default()
        };
        let enriched = enrich_event(EventType::Error, &payload, None);
        assert_eq!(enriched.title, "Error: kaboom");
    }

    #[test]
    fn untitled_when_nothing_to_title_from() {
        let payload = IssueEventPayload::default();
        let enriched = enrich_event(EventType::Default, &payload, None);
        assert_eq!(enriched.title, "<untitled>");
        assert_eq!(enriched.culprit, "");
    }

    #[test]
    fn positional_params_are_interpolated() {
        let message = EventMessage::Structured(LogEntry {
            message: Some("user %s hit limit %d".to_owned()),
            params: Some(MessageParams::List(vec![json!("alice"), json!(5)])),
            ..Default::default()
        });
        assert_eq!(
            transform_parameterized_message(&message),
            "user alice hit limit 5"
        );
    }

    #[test]
    fn named_params_are_interpolated() {
        let message = EventMessage::Structured(LogEntry {
            message: Some("job {name} failed on {host}".to_owned()),
            params: Some(MessageParams::Map(BTreeMap::from([
                ("name".to_owned(), json!("backfill")),
                ("host".to_owned(), json!("worker-3")),
            ]))),
            ..Default::default()
        });
        assert_eq!(
            transform_parameterized_message(&message),
            "job backfill failed on worker-3"
        );
    }

    #[test]
    fn formatted_message_wins_over_params() {
        let message = EventMessage::Structured(LogEntry {
            formatted: Some("already rendered".to_owned()),
            message: Some("ignored %s".to_owned()),
            params: Some(MessageParams::List(vec![json!("x")])),
        });
        assert_eq!(transform_parameterized_message(&message), "already rendered");
    }

    #[test]
    fn long_titles_are_truncated_with_ellipsis() {
        let long = "x".repeat(150);
        let payload = IssueEventPayload {
            message: Some(EventMessage::Raw(long.clone())),
            ..Default::default()
        };
        let enriched = enrich_event(EventType::Default, &payload, None);
        assert_eq!(enriched.title.chars().count(), 100);
        assert!(enriched.title.ends_with('…'));
        // The untruncated form survives in the stored document.
        assert_eq!(
            enriched.event_data.get("message").and_then(Value::as_str),
            Some(long.as_str())
        );
    }

    #[test]
    fn truncatechars_keeps_short_strings() {
        assert_eq!(truncatechars("short", 100), "short");
        let exact = "y".repeat(100);
        assert_eq!(truncatechars(&exact, 100), exact);
    }

    #[test]
    fn nul_bytes_are_replaced_everywhere() {
        let payload = IssueEventPayload {
            message: Some(EventMessage::Raw("bad\u{0}byte".to_owned())),
            extra: Some(json!({"key": "val\u{0}ue"})),
            ..Default::default()
        };
        let enriched = enrich_event(EventType::Default, &payload, None);
        assert_eq!(enriched.title, "bad byte");
        assert_eq!(
            enriched
                .event_data
                .get("extra")
                .and_then(|extra| extra.get("key"))
                .and_then(Value::as_str),
            Some("val ue")
        );
    }

    #[test]
    fn csp_event_builds_directive_title() {
        let report = CspReport {
            blocked_uri: Some("https://evil.example/evil.js".to_owned()),
            effective_directive: Some("script-src".to_owned()),
            ..Default::default()
        };
        let enriched = enrich_event(EventType::Csp, &IssueEventPayload::default(), Some(&report));
        assert_eq!(enriched.title, "Blocked 'script' from 'evil.example'");
        assert_eq!(enriched.culprit, "script-src");
        let stored = enriched.event_data.get("csp").unwrap();
        assert_eq!(
            stored.get("effective_directive").and_then(Value::as_str),
            Some("script-src")
        );
    }

    #[test]
    fn uri_netloc_matches_urlparse() {
        assert_eq!(uri_netloc("https://evil.example/evil.js"), "evil.example");
        assert_eq!(uri_netloc("//cdn.example/x?y=1"), "cdn.example");
        assert_eq!(uri_netloc("data"), "");
        assert_eq!(uri_netloc("https://host"), "host");
    }

    #[test]
    fn tags_come_from_contexts_user_and_environment() {
        let mut payload = IssueEventPayload {
            environment: Some("production".to_owned()),
            release: Some("1.4.2".to_owned()),
            server_name: Some("web-1".to_owned()),
            user: Some(EventUser {
                id: Some("u-91".to_owned()),
                email: Some("a@example.com".to_owned()),
                ..Default::default()
            }),
            ..Default::default()
        };
        payload.tags.insert("shard".to_owned(), Some("7".to_owned()));
        payload.tags.insert("empty".to_owned(), Some(String::new()));
        payload.contexts.insert(
            "browser".to_owned(),
            json!({"name": "Firefox", "version": "127.0"}),
        );
        payload
            .contexts
            .insert("os".to_owned(), json!({"name": "Linux"}));

        let tags = generate_tags(&payload);
        assert_eq!(tags.get("browser").map(String::as_str), Some("Firefox 127.0"));
        assert_eq!(tags.get("browser.name").map(String::as_str), Some("Firefox"));
        assert_eq!(tags.get("os.name").map(String::as_str), Some("Linux"));
        assert_eq!(tags.get("user.id").map(String::as_str), Some("u-91"));
        assert_eq!(tags.get("user.email").map(String::as_str), Some("a@example.com"));
        assert_eq!(tags.get("environment").map(String::as_str), Some("production"));
        assert_eq!(tags.get("release").map(String::as_str), Some("1.4.2"));
        assert_eq!(tags.get("server_name").map(String::as_str), Some("web-1"));
        assert_eq!(tags.get("shard").map(String::as_str), Some("7"));
        assert!(!tags.contains_key("empty"));
    }

    #[test]
    fn user_agent_contexts_fill_gaps_only() {
        let mut payload = IssueEventPayload {
            request: Some(EventRequest {
                headers: vec![(
                    "User-Agent".to_owned(),
                    Some(
                        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36"
                            .to_owned(),
                    ),
                )],
                ..Default::default()
            }),
            ..Default::default()
        };
        payload
            .contexts
            .insert("browser".to_owned(), json!({"name": "CustomShell"}));

        augment_contexts(&mut payload);

        assert_eq!(
            payload
                .contexts
                .get("browser")
                .and_then(|b| b.get("name"))
                .and_then(Value::as_str),
            Some("CustomShell")
        );
        assert_eq!(
            payload
                .contexts
                .get("os")
                .and_then(|os| os.get("name"))
                .and_then(Value::as_str),
            Some("Windows")
        );
    }

    #[test]
    fn event_data_keeps_exception_shape() {
        let tagged = error_payload();
        let enriched = enrich_event(EventType::Error, &tagged, None);
        assert!(enriched
            .event_data
            .get("exception")
            .and_then(|e| e.get("values"))
            .is_some());

        let bare = IssueEventPayload {
            exception: Some(ExceptionChain::List(vec![ExceptionValue {
                ty: Some("TypeError".to_owned()),
                ..Default::default()
            }])),
            ..Default::default()
        };
        let enriched = enrich_event(EventType::Error, &bare, None);
        assert!(enriched.event_data.get("exception").unwrap().is_array());
    }
}
