//! 出站调用拦截
//!
//! 提供调用原语 [`HttpCall`]、真实实现 [`ReqwestCall`] 以及追踪拦截器

pub mod call;
pub mod interceptor;

use std::sync::Arc;

pub use call::{BodyStream, CallRequest, CallResponse, HttpCall, ReqwestCall, TeeEvent};
pub use interceptor::{CHAT_COMPLETIONS_ROUTE, MAX_TRACED_BODY_BYTES, TracingInterceptor};

use crate::credential::{CredentialProvider, FileCredentialStore, StaticCredential};
use crate::http_client::build_client;
use crate::model::config::Config;
use crate::trace::TraceDispatcher;

/// 根据配置选择凭据来源：配置了静态 apiKey 时优先使用，否则使用凭据文件
pub fn credential_provider(config: &Config) -> Arc<dyn CredentialProvider> {
    match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => {
            tracing::info!("使用配置文件中的静态凭据");
            Arc::new(StaticCredential::new(key))
        }
        _ => {
            let path = config.resolved_credential_store_path();
            tracing::info!("使用凭据文件: {}", path.display());
            Arc::new(FileCredentialStore::new(path))
        }
    }
}

/// 按配置构建已安装拦截器的调用原语
///
/// 在配置加载完成、底层客户端可用之后调用
pub fn install(
    config: &Config,
    credentials: Arc<dyn CredentialProvider>,
) -> anyhow::Result<TracingInterceptor<ReqwestCall>> {
    let upstream = build_client(
        config.proxy_url.as_deref(),
        config.call_timeout_secs,
        config.tls_backend,
    )?;
    let dispatcher = TraceDispatcher::new(
        config.collector_url.clone(),
        config.proxy_url.as_deref(),
        config.collector_timeout_secs,
        config.tls_backend,
    )?;

    tracing::info!(
        route = %config.route_fragment,
        collector = %config.collector_url,
        max_content_length = config.max_content_length,
        "chat-completion 拦截器已安装"
    );

    Ok(
        TracingInterceptor::new(ReqwestCall::new(upstream), credentials, Arc::new(dispatcher))
            .with_route_fragment(config.route_fragment.clone())
            .with_max_content_length(config.max_content_length),
    )
}
