//! Trace 发送模块
//!
//! 将 [`TraceRecord`] 以 JSON POST 到收集端，`Authorization: Bearer <凭据>`。
//! 尽力而为：不重试、不排队，任何失败只写本地日志。

use std::sync::Arc;

use async_trait::async_trait;

use super::record::{TraceInputs, TraceMessage, TraceOutputs, TraceRecord};
use crate::common::spawn_isolated;
use crate::credential::Credential;
use crate::http_client::build_client;
use crate::model::config::TlsBackend;

/// Trace 接收端
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// 发送一条记录并等待结果
    async fn send(&self, record: &TraceRecord, credential: &Credential) -> anyhow::Result<()>;
}

/// 基于 HTTP 的 trace 发送器
pub struct TraceDispatcher {
    endpoint: String,
    client: reqwest::Client,
}

impl TraceDispatcher {
    pub fn new(
        endpoint: impl Into<String>,
        proxy_url: Option<&str>,
        timeout_secs: u64,
        tls_backend: TlsBackend,
    ) -> anyhow::Result<Self> {
        let client = build_client(proxy_url, timeout_secs, tls_backend)?;
        Ok(Self::with_client(endpoint, client))
    }

    pub fn with_client(endpoint: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            endpoint: endpoint.into(),
            client,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 发送测试 trace（用于验证收集端地址和凭据）
    ///
    /// 同步等待响应，返回错误信息供命令行展示
    pub async fn send_test(&self, credential: &Credential) -> anyhow::Result<()> {
        if credential.is_empty() {
            anyhow::bail!("凭据未配置");
        }
        let record = TraceRecord {
            inputs: TraceInputs {
                messages: vec![TraceMessage {
                    role: "user".to_string(),
                    content: "smith-tap connectivity check".to_string(),
                }],
            },
            outputs: TraceOutputs {
                content: "ok".to_string(),
                ..Default::default()
            },
        };
        self.send(&record, credential).await
    }
}

#[async_trait]
impl TraceSink for TraceDispatcher {
    async fn send(&self, record: &TraceRecord, credential: &Credential) -> anyhow::Result<()> {
        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(credential.expose())
            .json(record)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("请求发送失败: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let resp_body = resp.text().await.unwrap_or_default();
            anyhow::bail!("HTTP {} — {}", status, resp_body);
        }

        Ok(())
    }
}

/// 发送一条记录，吞掉所有错误（只记日志）
pub async fn deliver(sink: &dyn TraceSink, record: &TraceRecord, credential: &Credential) {
    match sink.send(record, credential).await {
        Ok(()) => tracing::debug!(
            messages = record.inputs.messages.len(),
            key = %credential.fingerprint(),
            "trace 已发送"
        ),
        Err(e) => tracing::warn!(key = %credential.fingerprint(), "trace 发送失败: {}", e),
    }
}

/// 后台发送（fire-and-forget），调用方不等待结果
pub fn dispatch(sink: Arc<dyn TraceSink>, record: TraceRecord, credential: Credential) {
    spawn_isolated("trace dispatch", async move {
        deliver(sink.as_ref(), &record, &credential).await;
    });
}
