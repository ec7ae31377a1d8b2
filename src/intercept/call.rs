//! 出站调用原语
//!
//! 宿主通过 [`HttpCall`] 发起网络调用；拦截器实现同一个 trait，可直接替换原始实现。
//! 响应体以字节流形式返回，调用方边收边读。

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::mpsc;

/// 响应体字节流
pub type BodyStream = BoxStream<'static, anyhow::Result<Bytes>>;

/// 单次出站调用（仅在调用期间存在）
#[derive(Debug, Clone)]
pub struct CallRequest {
    /// 目标 URL
    pub target: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl CallRequest {
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            method,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn post_json(target: impl Into<String>, body: impl Into<Bytes>) -> Self {
        let mut request = Self::new(Method::POST, target);
        request.headers.insert(
            http::header::CONTENT_TYPE,
            http::HeaderValue::from_static("application/json"),
        );
        request.body = Some(body.into());
        request
    }
}

/// 出站调用结果：状态与响应头已就绪，响应体按块到达
pub struct CallResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BodyStream,
}

impl fmt::Debug for CallResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl CallResponse {
    /// 响应体只有一块
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::from_stream(status, stream::once(async move { Ok(body) }))
    }

    pub fn from_stream<S>(status: StatusCode, body: S) -> Self
    where
        S: Stream<Item = anyhow::Result<Bytes>> + Send + 'static,
    {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.boxed(),
        }
    }

    /// 把响应体拆成两路
    ///
    /// 返回的响应仍按原节奏逐块交给调用方；每一块的副本同时送入接收端，
    /// 读到结尾时送出 [`TeeEvent::Done`]。调用方提前丢弃响应体时接收端直接关闭。
    pub fn tee(self) -> (Self, mpsc::UnboundedReceiver<TeeEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let body = TeeBody {
            inner: self.body,
            tx: Some(tx),
        };
        (
            Self {
                status: self.status,
                headers: self.headers,
                body: body.boxed(),
            },
            rx,
        )
    }

    /// 读完整个响应体
    #[cfg(test)]
    pub(crate) async fn collect_body(self) -> anyhow::Result<Bytes> {
        let mut buf = bytes::BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

/// 响应体副本上的事件
#[derive(Debug)]
pub enum TeeEvent {
    Chunk(Bytes),
    /// 响应体已完整读完
    Done,
    /// 读取中途出错
    Aborted(String),
}

struct TeeBody {
    inner: BodyStream,
    tx: Option<mpsc::UnboundedSender<TeeEvent>>,
}

impl Stream for TeeBody {
    type Item = anyhow::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let item = ready!(this.inner.as_mut().poll_next(cx));

        // 接收端关闭（放弃 trace）后发送失败，忽略即可
        match &item {
            Some(Ok(chunk)) => {
                if let Some(tx) = &this.tx {
                    let _ = tx.send(TeeEvent::Chunk(chunk.clone()));
                }
            }
            Some(Err(e)) => {
                if let Some(tx) = this.tx.take() {
                    let _ = tx.send(TeeEvent::Aborted(e.to_string()));
                }
            }
            None => {
                if let Some(tx) = this.tx.take() {
                    let _ = tx.send(TeeEvent::Done);
                }
            }
        }
        Poll::Ready(item)
    }
}

/// 网络调用原语
#[async_trait]
pub trait HttpCall: Send + Sync {
    async fn call(&self, request: CallRequest) -> anyhow::Result<CallResponse>;
}

/// 基于 reqwest 的真实调用
#[derive(Clone)]
pub struct ReqwestCall {
    client: reqwest::Client,
}

impl ReqwestCall {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpCall for ReqwestCall {
    async fn call(&self, request: CallRequest) -> anyhow::Result<CallResponse> {
        let mut builder = self
            .client
            .request(request.method, &request.target)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let resp = builder.send().await?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(anyhow::Error::from))
            .boxed();

        Ok(CallResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunked(parts: Vec<anyhow::Result<&'static str>>) -> CallResponse {
        CallResponse::from_stream(
            StatusCode::OK,
            stream::iter(parts.into_iter().map(|part| part.map(|s| Bytes::from_static(s.as_bytes())))),
        )
    }

    #[tokio::test]
    async fn test_tee_copies_every_chunk_then_done() {
        let (response, mut rx) = chunked(vec![Ok("data: 1\n\n"), Ok("data: 2\n\n")]).tee();

        assert_eq!(
            &response.collect_body().await.unwrap()[..],
            b"data: 1\n\ndata: 2\n\n"
        );
        assert!(matches!(rx.recv().await, Some(TeeEvent::Chunk(c)) if &c[..] == b"data: 1\n\n"));
        assert!(matches!(rx.recv().await, Some(TeeEvent::Chunk(c)) if &c[..] == b"data: 2\n\n"));
        assert!(matches!(rx.recv().await, Some(TeeEvent::Done)));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_tee_forwards_chunks_before_body_ends() {
        let (mut response, mut rx) = chunked(vec![Ok("first"), Ok("second")]).tee();

        let first = response.body.next().await.unwrap().unwrap();
        assert_eq!(&first[..], b"first");
        assert!(matches!(rx.try_recv(), Ok(TeeEvent::Chunk(_))));
        // 调用方还没读到结尾
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_tee_reports_stream_error() {
        let (response, mut rx) =
            chunked(vec![Ok("partial"), Err(anyhow::anyhow!("connection reset"))]).tee();

        assert!(response.collect_body().await.is_err());
        assert!(matches!(rx.recv().await, Some(TeeEvent::Chunk(_))));
        assert!(matches!(rx.recv().await, Some(TeeEvent::Aborted(e)) if e == "connection reset"));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_tee_closes_when_body_dropped_early() {
        let (response, mut rx) = chunked(vec![Ok("a"), Ok("b")]).tee();
        drop(response);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_tee_survives_closed_receiver() {
        let (response, rx) = chunked(vec![Ok("a"), Ok("b")]).tee();
        drop(rx);
        assert_eq!(&response.collect_body().await.unwrap()[..], b"ab");
    }

    #[test]
    fn test_post_json_sets_content_type() {
        let request = CallRequest::post_json("http://x/v1/chat/completions", "{}");
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.headers["content-type"], "application/json");
        assert_eq!(request.body.as_deref(), Some(b"{}".as_slice()));
    }

    #[tokio::test]
    async fn test_reqwest_call_round_trip() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("x-custom", "1"))
            .and(body_string("{\"a\":1}"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("x-upstream", "yes")
                    .set_body_string("created"),
            )
            .mount(&server)
            .await;

        let mut request =
            CallRequest::post_json(format!("{}/v1/chat/completions", server.uri()), "{\"a\":1}");
        request
            .headers
            .insert("x-custom", http::HeaderValue::from_static("1"));

        let call = ReqwestCall::new(reqwest::Client::new());
        let response = call.call(request).await.unwrap();
        assert_eq!(response.status, StatusCode::CREATED);
        assert_eq!(response.headers["x-upstream"], "yes");
        assert_eq!(&response.collect_body().await.unwrap()[..], b"created");
    }

    #[tokio::test]
    async fn test_reqwest_call_connection_error() {
        let call = ReqwestCall::new(reqwest::Client::new());
        let result = call
            .call(CallRequest::new(Method::GET, "http://127.0.0.1:1/"))
            .await;
        assert!(result.is_err());
    }
}
