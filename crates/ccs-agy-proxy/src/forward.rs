//! Request forwarding to the upstream gateway.

use std::convert::Infallible;
use std::error::Error as _;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use http_body_util::LengthLimitError;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, ProxyResult};
use crate::transform::{SseRewriter, transform_json_body};

/// Headers that describe a single connection and are never forwarded.
const HOP_BY_HOP: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Relay channel depth for streaming responses.
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// Shared state for all requests of one proxy instance.
#[derive(Clone)]
pub struct ProxyState {
    pub config: Arc<ProxyConfig>,
    pub client: reqwest::Client,
}

impl ProxyState {
    pub fn new(config: ProxyConfig) -> ProxyResult<Self> {
        // The gateway commonly runs with self-signed certificates.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|err| ProxyError::Client(err.to_string()))?;

        Ok(Self {
            config: Arc::new(config),
            client,
        })
    }
}

/// Fallback handler: forwards every method and path.
pub async fn handle(State(state): State<ProxyState>, req: Request) -> Response {
    match forward(&state, req).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn forward(state: &ProxyState, req: Request) -> ProxyResult<Response> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    debug!("{} {}", parts.method, parts.uri);

    let max_body_bytes = state.config.max_body_bytes;
    enforce_body_limit(&parts.headers, max_body_bytes)?;
    let body = read_body(body, max_body_bytes).await?;

    let path_and_query = parts
        .uri
        .path_and_query()
        .map_or("/", |pq| pq.as_str());
    let url = upstream_url(&state.config.upstream_url, path_and_query)?;
    debug!("-> {}", url);

    let streaming = is_streaming_request(&parts.headers, &body);
    let headers = outbound_headers(&parts.headers, &url, body.len())?;

    let request = state
        .client
        .request(parts.method.clone(), url)
        .headers(headers)
        .body(body);

    let response = if streaming {
        stream_response(state, request).await?
    } else {
        buffered_response(state, request).await?
    };

    debug!(
        "{} {} -> {} in {:?}",
        parts.method,
        parts.uri,
        response.status(),
        started.elapsed()
    );
    Ok(response)
}

/// Reject early when the declared length is already over the cap.
fn enforce_body_limit(headers: &HeaderMap, max_body_bytes: usize) -> ProxyResult<()> {
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.trim().parse::<u64>().ok());
    match declared {
        Some(length) if length > max_body_bytes as u64 => Err(ProxyError::BodyTooLarge {
            limit: max_body_bytes,
        }),
        _ => Ok(()),
    }
}

async fn read_body(body: Body, max_body_bytes: usize) -> ProxyResult<Bytes> {
    axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|err| {
            if is_length_limit(&err) {
                ProxyError::BodyTooLarge {
                    limit: max_body_bytes,
                }
            } else {
                ProxyError::BodyRead(err.to_string())
            }
        })
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if cause.is::<LengthLimitError>() {
            return true;
        }
        source = cause.source();
    }
    false
}

/// Whether the client asked for an event stream.
pub fn is_streaming_request(headers: &HeaderMap, body: &[u8]) -> bool {
    let accepts_sse = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/event-stream"));

    accepts_sse || contains(body, br#""stream":true"#)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// `<base><path><query>`. The base is concatenated, not resolved against,
/// so its own path prefix survives. A trailing `/` on the base is dropped.
pub fn upstream_url(base: &str, path_and_query: &str) -> ProxyResult<reqwest::Url> {
    let joined = format!("{}{}", base.trim_end_matches('/'), path_and_query);
    reqwest::Url::parse(&joined).map_err(|err| ProxyError::InvalidUpstream {
        url: joined,
        message: err.to_string(),
    })
}

fn outbound_headers(
    inbound: &HeaderMap,
    url: &reqwest::Url,
    body_len: usize,
) -> ProxyResult<HeaderMap> {
    let mut headers = inbound.clone();
    strip_hop_by_hop(&mut headers);

    let host = match (url.host_str(), url.port()) {
        (Some(host), Some(port)) => format!("{host}:{port}"),
        (Some(host), None) => host.to_string(),
        (None, _) => {
            return Err(ProxyError::InvalidUpstream {
                url: url.to_string(),
                message: "missing host".to_string(),
            });
        }
    };
    let host = HeaderValue::from_str(&host).map_err(|err| ProxyError::InvalidUpstream {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    headers.insert(header::HOST, host);

    headers.remove(header::CONTENT_LENGTH);
    if body_len > 0 {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body_len));
    }
    Ok(headers)
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove("keep-alive");
    headers.remove("proxy-connection");
}

fn response_head(status: StatusCode, upstream: &HeaderMap) -> (StatusCode, HeaderMap) {
    let mut headers = upstream.clone();
    strip_hop_by_hop(&mut headers);
    (status, headers)
}

async fn buffered_response(
    state: &ProxyState,
    request: reqwest::RequestBuilder,
) -> ProxyResult<Response> {
    let exchange = async {
        let upstream = request.send().await?;
        let status = upstream.status();
        let headers = upstream.headers().clone();
        let body = upstream.bytes().await?;
        Ok::<_, ProxyError>((status, headers, body))
    };

    let (status, upstream_headers, body) =
        match tokio::time::timeout(state.config.timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(ProxyError::Timeout),
        };

    let (status, mut headers) = response_head(status, &upstream_headers);
    let body = match transform_json_body(&body) {
        Some(rewritten) => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(rewritten.len()));
            Bytes::from(rewritten)
        }
        None => body,
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

async fn stream_response(
    state: &ProxyState,
    request: reqwest::RequestBuilder,
) -> ProxyResult<Response> {
    let idle_timeout = state.config.timeout;
    let upstream = match tokio::time::timeout(idle_timeout, request.send()).await {
        Ok(result) => result?,
        Err(_) => return Err(ProxyError::Timeout),
    };

    let (status, mut headers) = response_head(upstream.status(), upstream.headers());
    // Rewritten lines change the body length.
    headers.remove(header::CONTENT_LENGTH);

    let (tx, rx) = mpsc::channel::<Bytes>(STREAM_CHANNEL_CAPACITY);
    tokio::spawn(relay_sse(upstream, tx, idle_timeout));

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Pump upstream chunks through the rewriter into the client body.
///
/// Ends the client response on upstream error, idle timeout, or client
/// disconnect. The pending partial line is flushed only on a clean end.
async fn relay_sse(
    upstream: reqwest::Response,
    tx: mpsc::Sender<Bytes>,
    idle_timeout: std::time::Duration,
) {
    let mut stream = upstream.bytes_stream();
    let mut rewriter = SseRewriter::new();

    loop {
        let next = match tokio::time::timeout(idle_timeout, stream.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!("Upstream stream idle for {:?}; closing", idle_timeout);
                return;
            }
        };

        match next {
            Some(Ok(chunk)) => {
                let out = rewriter.push(&chunk);
                if !out.is_empty() && tx.send(out).await.is_err() {
                    debug!("Client disconnected during stream");
                    return;
                }
            }
            Some(Err(err)) => {
                warn!("Upstream stream error: {}", ProxyError::from(err));
                return;
            }
            None => break,
        }
    }

    if let Some(tail) = rewriter.finish() {
        let _ = tx.send(tail).await;
    }
}
