//! 转发服务处理器

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Json, Response},
};

use super::router::ProxyState;
use crate::intercept::CallRequest;

/// 请求体大小上限
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// 逐跳头，不转发
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

/// 转发任意请求到上游
pub async fn forward(State(state): State<ProxyState>, request: Request<Body>) -> Response {
    let (parts, body) = request.into_parts();
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let target = format!("{}{}", state.upstream_base_url, path_and_query);

    let body = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "invalid_request_error",
                format!("读取请求体失败: {}", e),
            );
        }
    };

    let mut call_request = CallRequest::new(parts.method, target);
    call_request.headers = forwardable_request_headers(&parts.headers);
    if !body.is_empty() {
        call_request.body = Some(body);
    }

    match state.call.call(call_request).await {
        Ok(resp) => {
            // 上游响应体逐块转给客户端，不等上游结束
            let mut response = Response::new(Body::from_stream(resp.body));
            *response.status_mut() = resp.status;
            *response.headers_mut() = forwardable_response_headers(&resp.headers);
            response
        }
        Err(e) => {
            tracing::warn!("上游调用失败: {}", e);
            error_response(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                format!("上游调用失败: {}", e),
            )
        }
    }
}

fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// 去掉逐跳头、host、content-length；去掉 accept-encoding 让上游返回明文，便于解析
fn forwardable_request_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name)
            || name == header::HOST
            || name == header::CONTENT_LENGTH
            || name == header::ACCEPT_ENCODING
        {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn forwardable_response_headers(headers: &HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        if is_hop_by_hop(name) || name == header::CONTENT_LENGTH {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn error_response(status: StatusCode, kind: &str, message: String) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": {"type": kind, "message": message}
        })),
    )
        .into_response()
}
