//! 请求/响应负载提取
//!
//! 纯函数：从 chat-completion 请求体与响应体构造有界的 [`TraceRecord`]。
//! 请求体缺失或格式错误时降级为空消息列表，从不报错。

use serde_json::Value;

use super::record::{TraceInputs, TraceMessage, TraceOutputs, TraceRecord};
use crate::common::truncate_chars;

/// role 字段截断长度（字符数）
pub const MAX_ROLE_LENGTH: usize = 20;

/// 解析请求体，缺失或不是合法 JSON 时返回 None
pub fn parse_request_body(body: Option<&[u8]>) -> Option<Value> {
    let body = body?;
    match serde_json::from_slice(body) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("请求体不是合法 JSON，消息列表置空: {}", e);
            None
        }
    }
}

/// 构造 trace 记录
///
/// 所有字符串字段在最后一步按字符硬截断：content 截到 `max_content_length`，role 截到 20
pub fn extract(
    request: Option<&Value>,
    response: &Value,
    max_content_length: usize,
) -> TraceRecord {
    let messages: Vec<TraceMessage> = request
        .and_then(|req| req.get("messages"))
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .map(|msg| TraceMessage {
                    role: bounded(msg.get("role"), MAX_ROLE_LENGTH),
                    content: bounded(msg.get("content"), max_content_length),
                })
                .collect()
        })
        .unwrap_or_default();

    let content = response
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"));

    let tokens = match response.get("usage") {
        Some(Value::Null) | None => Value::Object(Default::default()),
        Some(usage) => usage.clone(),
    };

    TraceRecord {
        inputs: TraceInputs { messages },
        outputs: TraceOutputs {
            content: bounded(content, max_content_length),
            tokens,
        },
    }
}

fn bounded(value: Option<&Value>, max_chars: usize) -> String {
    let text = coerce_to_string(value);
    truncate_chars(&text, max_chars).to_string()
}

/// 任意 JSON 值转为字符串：缺失/null 为空串，数值与布尔取字面形式，数组/对象取紧凑 JSON
fn coerce_to_string(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::trace::MAX_CONTENT_LENGTH;

    #[test]
    fn test_extract_basic_exchange() {
        let request = json!({"messages": [{"role": "user", "content": "hi"}]});
        let response = json!({
            "choices": [{"message": {"content": "hello"}}],
            "usage": {"total_tokens": 5}
        });

        let record = extract(Some(&request), &response, MAX_CONTENT_LENGTH);
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "inputs": {"messages": [{"role": "user", "content": "hi"}]},
                "outputs": {"content": "hello", "tokens": {"total_tokens": 5}}
            })
        );
    }

    #[test]
    fn test_extract_without_request() {
        let response = json!({"choices": [{"message": {"content": "ok"}}]});

        let record = extract(None, &response, MAX_CONTENT_LENGTH);
        assert!(record.inputs.messages.is_empty());
        assert_eq!(record.outputs.content, "ok");
        assert_eq!(record.outputs.tokens, json!({}));
    }

    #[test]
    fn test_extract_request_without_messages() {
        let request = json!({"model": "gpt-4o"});
        let record = extract(Some(&request), &json!({}), MAX_CONTENT_LENGTH);
        assert!(record.inputs.messages.is_empty());

        let request = json!({"messages": "not a list"});
        let record = extract(Some(&request), &json!({}), MAX_CONTENT_LENGTH);
        assert!(record.inputs.messages.is_empty());
    }

    #[test]
    fn test_extract_missing_response_fields() {
        for response in [
            json!({}),
            json!({"choices": []}),
            json!({"choices": [{}]}),
            json!({"choices": [{"message": {}}]}),
            json!({"choices": [{"message": {"content": null}}]}),
            json!([1, 2, 3]),
            json!("plain"),
        ] {
            let record = extract(None, &response, MAX_CONTENT_LENGTH);
            assert_eq!(record.outputs.content, "", "response: {}", response);
            assert_eq!(record.outputs.tokens, json!({}));
        }
    }

    #[test]
    fn test_extract_coerces_non_string_fields() {
        let request = json!({"messages": [
            {"role": 42, "content": 3.5},
            {"content": true},
            {"role": "user", "content": [{"type": "text", "text": "hi"}]},
            "bare string"
        ]});

        let record = extract(Some(&request), &json!({}), MAX_CONTENT_LENGTH);
        let messages = &record.inputs.messages;
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "42");
        assert_eq!(messages[0].content, "3.5");
        assert_eq!(messages[1].role, "");
        assert_eq!(messages[1].content, "true");
        assert_eq!(messages[2].content, r#"[{"text":"hi","type":"text"}]"#);
        assert_eq!(messages[3].role, "");
        assert_eq!(messages[3].content, "");
    }

    #[test]
    fn test_extract_truncates_content_and_role() {
        let long_content = "x".repeat(MAX_CONTENT_LENGTH + 500);
        let long_role = "r".repeat(50);
        let request = json!({"messages": [{"role": long_role, "content": long_content}]});
        let response = json!({"choices": [{"message": {"content": "y".repeat(4000)}}]});

        let record = extract(Some(&request), &response, MAX_CONTENT_LENGTH);
        let msg = &record.inputs.messages[0];
        assert_eq!(msg.content.chars().count(), MAX_CONTENT_LENGTH);
        assert!(long_content.starts_with(&msg.content));
        assert_eq!(msg.role.chars().count(), MAX_ROLE_LENGTH);
        assert!(long_role.starts_with(&msg.role));
        assert_eq!(record.outputs.content.chars().count(), MAX_CONTENT_LENGTH);
    }

    #[test]
    fn test_extract_custom_bound_counts_chars() {
        let request = json!({"messages": [{"role": "user", "content": "你好世界你好世界"}]});
        let record = extract(Some(&request), &json!({}), 3);
        assert_eq!(record.inputs.messages[0].content, "你好世");
    }

    #[test]
    fn test_extract_usage_passthrough() {
        let usage = json!({"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5,
            "prompt_tokens_details": {"cached_tokens": 0}});
        let response = json!({"usage": usage.clone()});

        let record = extract(None, &response, MAX_CONTENT_LENGTH);
        assert_eq!(record.outputs.tokens, usage);

        let record = extract(None, &json!({"usage": null}), MAX_CONTENT_LENGTH);
        assert_eq!(record.outputs.tokens, json!({}));
    }

    #[test]
    fn test_parse_request_body() {
        assert!(parse_request_body(None).is_none());
        assert!(parse_request_body(Some(b"".as_slice())).is_none());
        assert!(parse_request_body(Some(b"{broken".as_slice())).is_none());
        assert_eq!(
            parse_request_body(Some(br#"{"messages":[]}"#.as_slice())),
            Some(json!({"messages": []}))
        );
    }
}
