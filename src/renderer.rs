//! Message Renderer (§4.4): a pure function from a rule and a search
//! response to the message body. No I/O, no mutable state.

use crate::models::Rule;
use crate::search_client::SearchResponse;
use chrono::Local;
use serde_json::Value;

/// Walk a dot path (`"kubernetes.pod_name"`) against an untyped tree,
/// returning `None` on the first missing segment rather than per-shape casts
/// (REDESIGN FLAGS: "dynamic map-shaped search hits").
pub fn path_lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut cur = root;
    for segment in path.split('.') {
        cur = cur.as_object()?.get(segment)?;
    }
    Some(cur)
}

fn as_str(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn str_field(source: &Value, path: &str) -> String {
    path_lookup(source, path).map(as_str).unwrap_or_default()
}

fn num_field(source: &Value, path: &str) -> i64 {
    path_lookup(source, path)
        .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
        .unwrap_or(0)
}

fn local_timestamp(raw: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn truncate_log(raw: &str) -> String {
    if raw.chars().count() > 500 {
        let truncated: String = raw.chars().take(500).collect();
        format!("{truncated}...")
    } else {
        raw.to_string()
    }
}

fn first_source(response: &SearchResponse) -> Value {
    response
        .hits
        .hits
        .first()
        .map(|h| h.source.clone())
        .unwrap_or(Value::Null)
}

fn render_events(source: &Value) -> String {
    format!(
        "reason={reason} message={message} type={kind_type} object={kind}/{name} (ns={ns}) first={first} last={last} count={count}",
        reason = str_field(source, "reason"),
        message = str_field(source, "message"),
        kind_type = str_field(source, "type"),
        kind = str_field(source, "involvedObject.kind"),
        name = str_field(source, "involvedObject.name"),
        ns = str_field(source, "involvedObject.namespace"),
        first = local_timestamp(&str_field(source, "firstTimestamp")),
        last = local_timestamp(&str_field(source, "lastTimestamp")),
        count = num_field(source, "count"),
    )
}

fn render_logging(source: &Value, system_component: bool) -> String {
    let log = truncate_log(&str_field(source, "log"));
    let timestamp = local_timestamp(&str_field(source, "@timestamp"));
    let pod = str_field(source, "kubernetes.pod_name");
    let namespace = str_field(source, "kubernetes.namespace_name");
    let container = str_field(source, "kubernetes.container_name");
    let image = str_field(source, "kubernetes.container_image");
    if system_component {
        format!(
            "component={container} (image={image}) namespace={namespace} pod={pod} at={timestamp}: {log}"
        )
    } else {
        format!("pod={pod} namespace={namespace} container={container} at={timestamp}: {log}")
    }
}

fn render_auditing(source: &Value) -> String {
    format!(
        "level={level} verb={verb} resource={resource}/{name} (ns={ns}) user={user} ({uid}) status={status} at={at}: {message}",
        level = str_field(source, "Level"),
        verb = str_field(source, "Verb"),
        resource = str_field(source, "ObjectRef.Resource"),
        name = str_field(source, "ObjectRef.Name"),
        ns = str_field(source, "ObjectRef.Namespace"),
        user = str_field(source, "User.Username"),
        uid = str_field(source, "User.UID"),
        status = num_field(source, "ResponseStatus.code"),
        at = local_timestamp(&str_field(source, "@timestamp")),
        message = str_field(source, "Message"),
    )
}

fn render_default(rule: &Rule, response: &SearchResponse) -> String {
    format!(
        "rule={name} matched={count} at={now} index={index}",
        name = rule.name,
        count = response.hits.total.value,
        now = Local::now().format("%Y-%m-%d %H:%M:%S"),
        index = rule.index_pattern,
    )
}

fn interpolate_custom_text(template: &str, source: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let path = &after[..end];
                out.push_str(&str_field(source, path));
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

fn data_fields_block(source: &Value, custom_args: &[String]) -> String {
    if custom_args.is_empty() {
        return String::new();
    }
    let mut block = String::from("Data fields:\n");
    for path in custom_args {
        block.push_str(&format!("  {path}: {}\n", str_field(source, path)));
    }
    block
}

/// Render the message body for an emitted alert (§4.4). Selects the template
/// by substring match against `rule.index_pattern`, then (if `custom_text` is
/// set) prepends the interpolated custom text and a data-fields block.
pub fn render(rule: &Rule, response: &SearchResponse) -> String {
    let source = first_source(response);
    let body = if rule.index_pattern.contains("events") {
        render_events(&source)
    } else if rule.index_pattern.contains("logging") {
        let system_component = rule.name.to_ascii_lowercase().contains("system component");
        render_logging(&source, system_component)
    } else if rule.index_pattern.contains("auditing") {
        render_auditing(&source)
    } else {
        render_default(rule, response)
    };

    match &rule.custom_text {
        Some(text) if !text.is_empty() => {
            let interpolated = interpolate_custom_text(text, &source);
            let fields = data_fields_block(&source, &rule.custom_args);
            if fields.is_empty() {
                format!("{interpolated}\n{body}")
            } else {
                format!("{interpolated}\n{fields}{body}")
            }
        }
        _ => body,
    }
}
