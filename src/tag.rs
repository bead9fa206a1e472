//! The `<rica>` tag protocol.
//!
//! The model calls tools by emitting blocks like:
//!
//! ```text
//! <rica package="weather.lookup" route="/current">{"city": "Tokyo"}</rica>
//! <rica package="sys.shell" route="/run" background="true" timeout="10000">{"command": "ls"}</rica>
//! ```
//!
//! Background results are injected back into the context as:
//!
//! ```text
//! <rica-callback callid="...">{"status": "success"}</rica-callback>
//! ```
//!
//! This module parses single tags, scans a streamed context buffer for newly
//! generated tags, and renders callback blocks.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::error::{RicaError, RicaResult};
use crate::types::{CallBack, ToolCall};

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<rica\s+[^>]*>.*?</rica>").expect("static tag regex")
});

static ATTR_PACKAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"package\s*=\s*["']([^"']+)["']"#).expect("static attr regex")
});

static ATTR_ROUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"route\s*=\s*["']([^"']+)["']"#).expect("static attr regex")
});

static ATTR_BACKGROUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"background\s*=\s*["']([^"']+)["']"#).expect("static attr regex")
});

static ATTR_TIMEOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"timeout\s*=\s*["']([^"']+)["']"#).expect("static attr regex")
});

static ATTR_CALLID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"callid\s*=\s*["']([^"']+)["']"#).expect("static attr regex")
});

/// A tag located in a context buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct TagMatch {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

fn attr<'t>(re: &Regex, header: &'t str) -> Option<&'t str> {
    re.captures(header)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Parse a single `<rica ...>body</rica>` string into a [`ToolCall`].
pub fn parse_tag(tag_text: &str) -> RicaResult<ToolCall> {
    let trimmed = tag_text.trim();
    if !TAG_RE.is_match(trimmed) {
        return Err(RicaError::InvalidTag(
            "expected <rica ...>...</rica>".into(),
        ));
    }

    let header_end = trimmed
        .find('>')
        .ok_or_else(|| RicaError::InvalidTag("missing '>' on opening tag".into()))?;
    let header = &trimmed[..header_end];

    let package = attr(&ATTR_PACKAGE, header)
        .ok_or_else(|| RicaError::InvalidTag("missing package attribute".into()))?
        .to_string();
    let route = attr(&ATTR_ROUTE, header)
        .ok_or_else(|| RicaError::InvalidTag("missing route attribute".into()))?
        .to_string();

    let background = match attr(&ATTR_BACKGROUND, header) {
        Some("true") => Some(true),
        Some("false") => Some(false),
        Some(other) => {
            return Err(RicaError::InvalidTag(format!(
                "background must be true or false, got '{other}'"
            )))
        }
        None => None,
    };

    let timeout_ms = match attr(&ATTR_TIMEOUT, header) {
        Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
            RicaError::InvalidTag(format!("timeout must be an integer, got '{raw}'"))
        })?),
        None => None,
    };

    let call_id = match attr(&ATTR_CALLID, header) {
        Some(raw) => Some(
            Uuid::parse_str(raw)
                .map_err(|_| RicaError::InvalidTag(format!("callid is not a UUID: '{raw}'")))?,
        ),
        None => None,
    };

    let body_end = trimmed
        .rfind("</rica>")
        .ok_or_else(|| RicaError::InvalidTag("missing closing </rica>".into()))?;
    let body_str = trimmed[header_end + 1..body_end].trim();

    let body = if body_str.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(body_str)
            .map_err(|e| RicaError::InvalidTag(format!("invalid JSON body: {e}")))?
    };

    Ok(ToolCall {
        package,
        route,
        background,
        timeout_ms,
        call_id,
        body,
    })
}

/// True when a complete tag sits at the end of the context (ignoring trailing
/// whitespace). Used as the stopping criterion during token streaming.
///
/// Runs once per streamed piece, so the regex is bounded to the final opening
/// tag instead of rescanning the whole growing context.
pub fn complete_tag_at_tail(context: &str) -> bool {
    let trimmed = context.trim_end();
    if !trimmed.ends_with("</rica>") {
        return false;
    }
    match trimmed.rfind("<rica") {
        Some(start) => TAG_RE.is_match(&trimmed[start..]),
        None => false,
    }
}

/// Find all tags at or after `from`. The caller advances its watermark past
/// the appended results after dispatching, so each tag is seen exactly once.
pub fn find_tags(context: &str, from: usize) -> Vec<TagMatch> {
    if from >= context.len() {
        return Vec::new();
    }
    TAG_RE
        .find_iter(&context[from..])
        .map(|m| TagMatch {
            text: m.as_str().to_string(),
            start: from + m.start(),
            end: from + m.end(),
        })
        .collect()
}

/// Render the callback block injected into the context when a background call
/// completes.
pub fn callback_block(callback: &CallBack) -> String {
    let payload = match serde_json::to_string(&callback.payload) {
        Ok(s) => s,
        Err(_) => "null".to_string(),
    };
    format!(
        "\n<rica-callback callid=\"{}\">{}</rica-callback>\n",
        callback.call_id, payload
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_full_tag() {
        let call = parse_tag(
            r#"<rica package="test.pkg" route="/echo">{"msg": "hello"}</rica>"#,
        )
        .unwrap();
        assert_eq!(call.package, "test.pkg");
        assert_eq!(call.route, "/echo");
        assert_eq!(call.body, json!({"msg": "hello"}));
        assert!(call.background.is_none());
        assert!(call.timeout_ms.is_none());
    }

    #[test]
    fn parses_background_and_timeout() {
        let call = parse_tag(
            r#"<rica package="sys.shell" route="/run" background="true" timeout="10000">{"command": "ls"}</rica>"#,
        )
        .unwrap();
        assert_eq!(call.background, Some(true));
        assert_eq!(call.timeout_ms, Some(10_000));
    }

    #[test]
    fn parses_single_quoted_attributes() {
        let call =
            parse_tag("<rica package='test.pkg' route='/echo'>{}</rica>").unwrap();
        assert_eq!(call.package, "test.pkg");
    }

    #[test]
    fn empty_body_is_empty_object() {
        let call = parse_tag(r#"<rica package="test.pkg" route="/echo"></rica>"#).unwrap();
        assert_eq!(call.body, json!({}));

        let call =
            parse_tag("<rica package=\"test.pkg\" route=\"/echo\">   </rica>").unwrap();
        assert_eq!(call.body, json!({}));
    }

    #[test]
    fn array_body_parses() {
        let call = parse_tag(
            r#"<rica package="rica" route="/response">[{"type":"text","content":"hi"}]</rica>"#,
        )
        .unwrap();
        assert!(call.body.is_array());
    }

    #[test]
    fn missing_attributes_rejected() {
        let err = parse_tag("<rica route=\"/echo\">{}</rica>").unwrap_err();
        assert!(matches!(err, RicaError::InvalidTag(_)));
        assert!(err.to_string().contains("package"));

        let err = parse_tag("<rica package=\"test.pkg\">{}</rica>").unwrap_err();
        assert!(err.to_string().contains("route"));
    }

    #[test]
    fn malformed_input_rejected() {
        assert!(parse_tag("not a tag").is_err());
        assert!(parse_tag("<rica broken>...</rica>").is_err());
        assert!(parse_tag(
            r#"<rica package="test.pkg" route="/echo">{not json}</rica>"#
        )
        .is_err());
        assert!(parse_tag(
            r#"<rica package="test.pkg" route="/echo" timeout="soon">{}</rica>"#
        )
        .is_err());
    }

    #[test]
    fn callid_roundtrip() {
        let id = Uuid::new_v4();
        let tag = format!(
            r#"<rica package="test.pkg" route="/echo" callid="{id}">{{}}</rica>"#
        );
        let call = parse_tag(&tag).unwrap();
        assert_eq!(call.call_id, Some(id));

        assert!(parse_tag(
            r#"<rica package="test.pkg" route="/echo" callid="nope">{}</rica>"#
        )
        .is_err());
    }

    #[test]
    fn tail_detection() {
        assert!(complete_tag_at_tail(
            "thinking... <rica package=\"a.b\" route=\"/x\">{}</rica>"
        ));
        assert!(complete_tag_at_tail(
            "thinking... <rica package=\"a.b\" route=\"/x\">{}</rica>  \n"
        ));
        assert!(!complete_tag_at_tail("thinking... <rica package=\"a.b\""));
        assert!(!complete_tag_at_tail(
            "<rica package=\"a.b\" route=\"/x\">{}</rica> and then more text"
        ));
        assert!(!complete_tag_at_tail(""));
    }

    #[test]
    fn tail_detection_after_earlier_tags() {
        // Earlier processed tags and a long preamble must not confuse the
        // bounded tail scan.
        let mut context = "x".repeat(50_000);
        context.push_str("<rica package=\"a.b\" route=\"/one\">{}</rica>");
        context.push_str("{\"result\": 1}");
        assert!(!complete_tag_at_tail(&context));

        context.push_str("<rica package=\"a.b\" route=\"/two\">{}</rica>");
        assert!(complete_tag_at_tail(&context));
    }

    #[test]
    fn multiline_body_matches() {
        let context = "<rica package=\"a.b\" route=\"/x\">{\n  \"k\": 1\n}</rica>";
        assert!(complete_tag_at_tail(context));
        let call = parse_tag(context).unwrap();
        assert_eq!(call.body["k"], 1);
    }

    #[test]
    fn find_tags_respects_watermark() {
        let context = concat!(
            "<rica package=\"a.b\" route=\"/one\">{}</rica>",
            "{\"result\": 1}",
            "<rica package=\"a.b\" route=\"/two\">{}</rica>",
        );

        let all = find_tags(context, 0);
        assert_eq!(all.len(), 2);

        // Scanning past the first tag's results only yields the second.
        let rest = find_tags(context, all[0].end);
        assert_eq!(rest.len(), 1);
        assert!(rest[0].text.contains("/two"));

        assert!(find_tags(context, context.len()).is_empty());
    }

    #[test]
    fn find_tags_multiple_adjacent() {
        let context = concat!(
            "<rica package=\"t.p\" route=\"/a\">{}</rica>",
            "<rica package=\"t.p\" route=\"/b\">{}</rica>",
        );
        let tags = find_tags(context, 0);
        assert_eq!(tags.len(), 2);
        assert!(tags[0].text.contains("/a"));
        assert!(tags[1].text.contains("/b"));
    }

    #[test]
    fn callback_block_does_not_rescan_as_tag() {
        let cb = CallBack::success("test.pkg", "/slow", Uuid::new_v4(), json!({"ok": true}));
        let block = callback_block(&cb);
        assert!(block.contains("<rica-callback callid="));
        assert!(block.contains("{\"ok\":true}"));
        // The callback block must never be mistaken for a new tool call.
        assert!(find_tags(&block, 0).is_empty());
        assert!(!complete_tag_at_tail(&block));
    }
}
