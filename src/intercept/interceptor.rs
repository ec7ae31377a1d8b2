//! Chat-completion 调用拦截器
//!
//! 包装底层 [`HttpCall`]：目标 URL 命中路由片段且已配置凭据时，
//! 响应体在流向调用方的同时复制一份；调用方读完响应体后，
//! 于后台任务中构造 trace 并交给 [`dispatch`] 发送。其余调用原样透传。

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::call::{CallRequest, CallResponse, HttpCall, TeeEvent};
use crate::common::spawn_isolated;
use crate::credential::{Credential, CredentialProvider};
use crate::trace::dispatch::{TraceSink, dispatch};
use crate::trace::{MAX_CONTENT_LENGTH, extract, parse_request_body};

/// 默认匹配的 chat-completion 路由片段
pub const CHAT_COMPLETIONS_ROUTE: &str = "/chat/completions";

/// 单次 trace 缓存的响应体上限，超出时放弃该次 trace
pub const MAX_TRACED_BODY_BYTES: usize = 16 * 1024 * 1024;

/// 追踪拦截器，本身也实现 [`HttpCall`]
pub struct TracingInterceptor<C> {
    inner: C,
    credentials: Arc<dyn CredentialProvider>,
    sink: Arc<dyn TraceSink>,
    route_fragment: String,
    max_content_length: usize,
}

impl<C: HttpCall + 'static> TracingInterceptor<C> {
    pub fn new(
        inner: C,
        credentials: Arc<dyn CredentialProvider>,
        sink: Arc<dyn TraceSink>,
    ) -> Self {
        Self {
            inner,
            credentials,
            sink,
            route_fragment: CHAT_COMPLETIONS_ROUTE.to_string(),
            max_content_length: MAX_CONTENT_LENGTH,
        }
    }

    /// 设置匹配的路由片段
    pub fn with_route_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.route_fragment = fragment.into();
        self
    }

    /// 设置内容截断长度
    pub fn with_max_content_length(mut self, max_chars: usize) -> Self {
        self.max_content_length = max_chars;
        self
    }

    /// 目标是否为 chat-completion 调用
    pub fn matches(&self, target: &str) -> bool {
        target.contains(&self.route_fragment)
    }

    /// 等响应体副本读完后在后台构造并发送 trace，不阻塞调用方
    fn schedule_trace(
        &self,
        request_body: Option<Bytes>,
        events: mpsc::UnboundedReceiver<TeeEvent>,
        credential: Credential,
    ) {
        let call_id = Uuid::new_v4();
        let sink = self.sink.clone();
        let max_content_length = self.max_content_length;

        spawn_isolated(
            "chat-completion trace",
            trace_call(
                sink,
                request_body,
                events,
                credential,
                max_content_length,
                call_id,
            ),
        );
    }
}

/// 延迟阶段：收齐响应体、解析、提取记录、交给 dispatch。所有错误在此吸收
async fn trace_call(
    sink: Arc<dyn TraceSink>,
    request_body: Option<Bytes>,
    mut events: mpsc::UnboundedReceiver<TeeEvent>,
    credential: Credential,
    max_content_length: usize,
    call_id: Uuid,
) {
    let Some(response_body) = collect_teed_body(&mut events, call_id).await else {
        return;
    };
    let response: Value = match serde_json::from_slice(&response_body) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(%call_id, "响应体解析失败，跳过 trace: {}", e);
            return;
        }
    };
    let request = parse_request_body(request_body.as_deref());

    let record = extract(request.as_ref(), &response, max_content_length);
    tracing::debug!(%call_id, messages = record.inputs.messages.len(), "trace 记录已构造");

    dispatch(sink, record, credential);
}

/// 收齐响应体副本；中断、被丢弃或超出上限时返回 None
async fn collect_teed_body(
    events: &mut mpsc::UnboundedReceiver<TeeEvent>,
    call_id: Uuid,
) -> Option<Bytes> {
    let mut buf = BytesMut::new();
    while let Some(event) = events.recv().await {
        match event {
            TeeEvent::Chunk(chunk) => {
                if buf.len() + chunk.len() > MAX_TRACED_BODY_BYTES {
                    tracing::warn!(%call_id, "响应体超过 {} 字节，跳过 trace", MAX_TRACED_BODY_BYTES);
                    return None;
                }
                buf.extend_from_slice(&chunk);
            }
            TeeEvent::Done => return Some(buf.freeze()),
            TeeEvent::Aborted(reason) => {
                tracing::warn!(%call_id, "响应体读取中断，跳过 trace: {}", reason);
                return None;
            }
        }
    }
    tracing::debug!(%call_id, "响应体未读完即被丢弃，跳过 trace");
    None
}

#[async_trait]
impl<C: HttpCall + 'static> HttpCall for TracingInterceptor<C> {
    async fn call(&self, request: CallRequest) -> anyhow::Result<CallResponse> {
        if !self.matches(&request.target) {
            return self.inner.call(request).await;
        }

        let credential = self.credentials.get();
        if credential.is_empty() {
            tracing::debug!("未配置凭据，透传 chat-completion 调用");
            return self.inner.call(request).await;
        }

        let request_body = request.body.clone();
        let response = self.inner.call(request).await?;

        if !response.status.is_success() {
            tracing::debug!(status = %response.status, "上游返回非成功状态，跳过 trace");
            return Ok(response);
        }

        let (response, events) = response.tee();
        self.schedule_trace(request_body, events, credential);
        Ok(response)
    }
}
