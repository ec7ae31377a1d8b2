//! Trace 记录构造与发送
//!
//! 提供负载提取（有界截断）和尽力而为的收集端投递

pub mod dispatch;
pub mod extract;
pub mod record;

pub use dispatch::{TraceDispatcher, TraceSink};
pub use extract::{extract, parse_request_body};
pub use record::{TraceInputs, TraceMessage, TraceOutputs, TraceRecord};

/// 消息内容默认截断长度（字符数）
pub const MAX_CONTENT_LENGTH: usize = 3000;
