//! 转发服务路由

use std::sync::Arc;

use axum::{Router, routing::get};

use super::handlers::{forward, healthz};
use crate::intercept::HttpCall;

/// 转发服务状态
#[derive(Clone)]
pub struct ProxyState {
    pub upstream_base_url: String,
    pub call: Arc<dyn HttpCall>,
}

/// 创建转发路由
///
/// `/healthz` 之外的所有路径都转发到上游
pub fn create_router(upstream_base_url: impl Into<String>, call: Arc<dyn HttpCall>) -> Router {
    let upstream_base_url = upstream_base_url.into();
    let state = ProxyState {
        upstream_base_url: upstream_base_url.trim_end_matches('/').to_string(),
        call,
    };

    Router::new()
        .route("/healthz", get(healthz))
        .fallback(forward)
        .with_state(state)
}
