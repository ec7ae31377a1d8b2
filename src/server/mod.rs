//! 宿主转发服务
//!
//! 将所有入站请求经由（已安装拦截器的）调用原语转发到上游，
//! 供不便直接嵌入本库的客户端通过修改 base URL 接入

mod handlers;
mod router;

pub use router::{ProxyState, create_router};

use std::sync::Arc;

use crate::intercept::HttpCall;

/// 启动转发服务并阻塞直到退出
pub async fn serve(
    host: &str,
    port: u16,
    upstream_base_url: impl Into<String>,
    call: Arc<dyn HttpCall>,
) -> anyhow::Result<()> {
    let app = create_router(upstream_base_url, call);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("转发服务已启动: http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
