//! smith-tap：chat-completion 调用的被动观测垫片
//!
//! 包装出站调用原语，命中 chat-completion 路由的调用照常流式返回；
//! 调用方读完响应体后，由后台任务提取有界的请求/响应摘要并发送到 trace 收集端。
//! 追踪过程中的任何失败都不会影响调用方。

pub mod common;
pub mod credential;
pub mod http_client;
pub mod intercept;
pub mod model;
pub mod server;
pub mod trace;

pub use credential::{Credential, CredentialProvider};
pub use intercept::{CallRequest, CallResponse, HttpCall, ReqwestCall, TracingInterceptor};
pub use trace::{TraceDispatcher, TraceRecord};
