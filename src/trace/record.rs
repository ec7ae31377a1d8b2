//! Trace 记录数据模型

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 发送到收集端的 trace 记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub inputs: TraceInputs,
    pub outputs: TraceOutputs,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TraceInputs {
    pub messages: Vec<TraceMessage>,
}

/// 单条输入消息（已截断）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOutputs {
    pub content: String,
    /// 响应中的 `usage` 原样透传，缺失时为 `{}`
    pub tokens: Value,
}

impl Default for TraceOutputs {
    fn default() -> Self {
        Self {
            content: String::new(),
            tokens: Value::Object(Default::default()),
        }
    }
}
