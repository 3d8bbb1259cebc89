//! The proxy engine.
//!
//! Per connection: `Accepting -> Tunneling(host) -> DecodingRequest ->
//! ForwardingRequest -> DecodingResponse -> {StreamingRestore |
//! WholeBodyRestore} -> Forwarding -> back to DecodingRequest | Closed`.
//!
//! CONNECT tunnels are hijacked and TLS-terminated with a leaf minted for
//! the SNI name; the decrypted stream is served as HTTP/1.1 keep-alive.
//! Plain HTTP requests are forwarded byte-for-byte. Upstream connections are
//! rustls with ALPN pinned to `http/1.1`; HTTP/2 stays off so request
//! manipulation stays simple.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited, StreamBody};
use hyper::body::{Frame, Incoming};
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use keymask_core::protocol::RequestContext;

use crate::error::{ProxyError, Result};
use crate::minter::MintingResolver;
use crate::service::SecretService;
use crate::stream::StreamRestorer;
use crate::{DEFAULT_LISTEN, DEFAULT_MAX_BODY_BYTES};

/// Content types restored incrementally instead of whole-body.
const STREAMING_CONTENT_TYPES: &[&str] = &[
    "text/event-stream",
    "application/x-ndjson",
    "application/stream+json",
];

/// Largest request head the engine will buffer while looking for the blank
/// line.
const MAX_HEAD_BYTES: usize = 16 * 1024;

type ProxyBody = BoxBody<Bytes, hyper::Error>;

fn full_body(data: Bytes) -> ProxyBody {
    Full::new(data).map_err(|never| match never {}).boxed()
}

fn text_response(status: StatusCode, message: &str) -> Response<ProxyBody> {
    Response::builder()
        .status(status)
        .header(hyper::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full_body(Bytes::from(format!("{message}\n"))))
        .expect("static response is valid")
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Listen address, `host:port`; an empty host binds all interfaces.
    pub listen: String,
    /// Cap on buffered request/response bodies; larger requests get `413`.
    pub max_body_bytes: usize,
    /// How long existing connections may drain after shutdown begins.
    pub drain_window: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            drain_window: Duration::from_secs(30),
        }
    }
}

/// The TLS-intercepting proxy server.
pub struct ProxyServer {
    config: ProxyConfig,
    service: Arc<SecretService>,
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    shutdown: broadcast::Sender<()>,
}

impl ProxyServer {
    /// Builds the server: TLS acceptor around the minting resolver, upstream
    /// connector trusting the web PKI.
    pub fn new(
        config: ProxyConfig,
        resolver: Arc<MintingResolver>,
        service: Arc<SecretService>,
    ) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_upstream_roots(config, resolver, service, roots)
    }

    /// Builds the server with an explicit upstream trust store.
    pub fn with_upstream_roots(
        config: ProxyConfig,
        resolver: Arc<MintingResolver>,
        service: Arc<SecretService>,
        upstream_roots: RootCertStore,
    ) -> Result<Self> {
        let mut server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_cert_resolver(resolver);
        server_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        let mut client_config = ClientConfig::builder()
            .with_root_certificates(upstream_roots)
            .with_no_client_auth();
        client_config.alpn_protocols = vec![b"http/1.1".to_vec()];

        let (shutdown, _) = broadcast::channel(1);

        Ok(Self {
            config,
            service,
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
            connector: TlsConnector::from(Arc::new(client_config)),
            shutdown,
        })
    }

    /// A handle that stops the accept loop when triggered.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown.clone()
    }

    /// Binds the listener and returns the bound address along with the
    /// serve future. Binding separately lets callers learn an ephemeral
    /// port before serving.
    pub async fn bind(self) -> Result<(SocketAddr, BoundProxy)> {
        let addr = normalize_listen_addr(&self.config.listen)?;
        let listener = TcpListener::bind(addr.as_str())
            .await
            .map_err(ProxyError::Io)?;
        let local = listener.local_addr().map_err(ProxyError::Io)?;
        info!(addr = %local, "proxy listening");
        Ok((local, BoundProxy {
            server: self,
            listener,
        }))
    }

    /// Binds and serves until shutdown.
    pub async fn run(self) -> Result<()> {
        let (_, bound) = self.bind().await?;
        bound.serve().await
    }
}

/// A proxy bound to its listener.
pub struct BoundProxy {
    server: ProxyServer,
    listener: TcpListener,
}

impl BoundProxy {
    /// Accept loop. Returns after a shutdown signal once the drain window
    /// has passed or every connection has finished.
    pub async fn serve(self) -> Result<()> {
        let BoundProxy { server, listener } = self;
        let ctx = Arc::new(ConnContext {
            service: Arc::clone(&server.service),
            acceptor: server.acceptor.clone(),
            connector: server.connector.clone(),
            max_body_bytes: server.config.max_body_bytes,
        });

        let mut shutdown_rx = server.shutdown.subscribe();
        let mut connections: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "connection accepted");
                            let ctx = Arc::clone(&ctx);
                            connections.spawn(async move {
                                ctx.service.metrics().active_connections.inc();
                                if let Err(e) = handle_connection(ctx.clone(), stream).await {
                                    debug!(%peer, error = %e, "connection ended with error");
                                }
                                ctx.service.metrics().active_connections.dec();
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "accept failed");
                        }
                    }
                }
                // Reap finished connection tasks; a panic inside one must
                // not take the engine down.
                Some(result) = connections.join_next(), if !connections.is_empty() => {
                    if let Err(e) = result {
                        if e.is_panic() {
                            error!("connection task panicked");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("shutdown requested, draining connections");
                    break;
                }
            }
        }

        drop(listener);
        let drain = server.config.drain_window;
        if tokio::time::timeout(drain, async {
            while connections.join_next().await.is_some() {}
        })
        .await
        .is_err()
        {
            warn!(remaining = connections.len(), "drain window elapsed, aborting connections");
            connections.shutdown().await;
        }
        Ok(())
    }
}

/// Everything a connection task needs.
struct ConnContext {
    service: Arc<SecretService>,
    acceptor: TlsAcceptor,
    connector: TlsConnector,
    max_body_bytes: usize,
}

/// Reads the request head, then either runs the MITM pipeline (CONNECT) or
/// tunnels the request through untouched (plain HTTP).
async fn handle_connection(ctx: Arc<ConnContext>, mut client: TcpStream) -> Result<()> {
    let head = read_head(&mut client).await?;
    if head.is_empty() {
        return Ok(());
    }

    let first_line = head
        .split(|&b| b == b'\r' || b == b'\n')
        .next()
        .map(|l| String::from_utf8_lossy(l).into_owned())
        .unwrap_or_default();

    if let Some(target) = first_line.strip_prefix("CONNECT ") {
        let target = target
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        handle_connect(ctx, client, &target).await
    } else {
        handle_plain_http(client, &head, &first_line).await
    }
}

/// Buffers the request head up to and including the terminating blank line.
async fn read_head(client: &mut TcpStream) -> Result<Vec<u8>> {
    let mut head = Vec::with_capacity(1024);
    let mut buf = [0u8; 1024];
    loop {
        let n = client.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
        if head.len() > MAX_HEAD_BYTES {
            client
                .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
                .await?;
            return Ok(Vec::new());
        }
    }
    Ok(head)
}

/// CONNECT tunnel: acknowledge, terminate TLS with a minted leaf, serve the
/// decrypted stream as HTTP/1.1.
async fn handle_connect(ctx: Arc<ConnContext>, mut client: TcpStream, target: &str) -> Result<()> {
    let (host, port) = split_host_port(target, 443);
    if host.is_empty() {
        client
            .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
            .await?;
        return Ok(());
    }

    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;

    let tls = match ctx.acceptor.accept(client).await {
        Ok(tls) => tls,
        Err(e) => {
            ctx.service.metrics().record_tls_error("handshake");
            return Err(ProxyError::Tls(e.to_string()));
        }
    };

    info!(host, port, "intercepting tunnel");

    let service = hyper::service::service_fn({
        let ctx = Arc::clone(&ctx);
        let host = host.clone();
        move |req| {
            let ctx = Arc::clone(&ctx);
            let host = host.clone();
            async move {
                Ok::<_, hyper::Error>(intercept_request(ctx, host, port, req).await)
            }
        }
    });

    hyper::server::conn::http1::Builder::new()
        .preserve_header_case(true)
        .serve_connection(TokioIo::new(tls), service)
        .await
        .map_err(ProxyError::Http)
}

/// One intercepted request/response cycle. Never fails the connection:
/// every error becomes a status response.
async fn intercept_request(
    ctx: Arc<ConnContext>,
    host: String,
    port: u16,
    req: Request<Incoming>,
) -> Response<ProxyBody> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    let content_type = req
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let metrics = ctx.service.metrics();
    metrics
        .requests_total
        .with_label_values(&[method.as_str(), &host])
        .inc();

    let handler = ctx.service.registry().detect(&RequestContext {
        method: method.as_str(),
        host: &host,
        path: &path,
        content_type: &content_type,
    });

    // Read the request body (bounded) for every request we may rewrite or
    // forward with a recomputed length.
    let (parts, body) = req.into_parts();
    let body_bytes = match Limited::new(body, ctx.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            return if e.downcast_ref::<LengthLimitError>().is_some() {
                text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body exceeds limit")
            } else {
                text_response(StatusCode::BAD_GATEWAY, "failed to read request body")
            };
        }
    };
    metrics
        .bytes_transferred_total
        .with_label_values(&["request"])
        .inc_by(body_bytes.len() as u64);

    let (outbound_body, wants_streaming) = match handler.as_deref() {
        Some(h) => {
            let outcome = ctx
                .service
                .process_request(&host, &body_bytes, h)
                .await;
            if outcome.secrets_replaced > 0 {
                info!(
                    host,
                    found = outcome.secrets_found,
                    replaced = outcome.secrets_replaced,
                    "replaced secrets in request"
                );
            }
            (Bytes::from(outcome.body), h.is_streaming(&body_bytes))
        }
        None => (body_bytes, false),
    };
    metrics
        .request_duration_seconds
        .with_label_values(&["request"])
        .observe(started.elapsed().as_secs_f64());

    // Forward upstream.
    let upstream_req = match build_upstream_request(&method, &path, &parts.headers, &host, outbound_body) {
        Ok(req) => req,
        Err(e) => {
            warn!(host, error = %e, "failed to build upstream request");
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "bad request assembly");
        }
    };

    let upstream_resp = match send_upstream(&ctx, &host, port, upstream_req).await {
        Ok(resp) => resp,
        Err(e) => {
            warn!(host, error = %e, "upstream request failed");
            metrics.record_upstream_error(&host, upstream_error_kind(&e));
            return text_response(StatusCode::BAD_GATEWAY, "upstream request failed");
        }
    };

    let response = match handler {
        Some(h) => {
            respond_intercepted(ctx.clone(), &host, upstream_resp, h, wants_streaming).await
        }
        None => passthrough_response(upstream_resp),
    };
    metrics
        .request_duration_seconds
        .with_label_values(&["response"])
        .observe(started.elapsed().as_secs_f64());
    response
}

/// Classifies an upstream failure for the error counter.
fn upstream_error_kind(e: &ProxyError) -> &'static str {
    match e {
        ProxyError::Io(_) => "connect",
        ProxyError::Tls(_) => "tls",
        ProxyError::Http(_) => "http",
        _ => "other",
    }
}

/// Builds the upstream request: origin-form URI, hop-by-hop headers dropped,
/// Host pinned, body length recomputed.
fn build_upstream_request(
    method: &Method,
    path: &str,
    headers: &hyper::HeaderMap,
    host: &str,
    body: Bytes,
) -> Result<Request<ProxyBody>> {
    let mut builder = Request::builder().method(method.clone()).uri(path);
    for (name, value) in headers {
        if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder.header(hyper::header::HOST, host);
    builder = builder.header(hyper::header::CONTENT_LENGTH, body.len());
    Ok(builder.body(full_body(body))?)
}

fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name.to_ascii_lowercase().as_str(),
        "connection"
            | "proxy-connection"
            | "keep-alive"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "host"
    )
}

/// Opens a TLS connection upstream and performs one HTTP/1.1 exchange.
async fn send_upstream(
    ctx: &ConnContext,
    host: &str,
    port: u16,
    req: Request<ProxyBody>,
) -> Result<Response<Incoming>> {
    let tcp = TcpStream::connect((host, port)).await?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| ProxyError::Tls(e.to_string()))?;
    let tls = ctx
        .connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| ProxyError::Tls(e.to_string()))?;

    let (mut sender, conn) =
        hyper::client::conn::http1::handshake::<_, ProxyBody>(TokioIo::new(tls)).await?;
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "upstream connection closed");
        }
    });

    Ok(sender.send_request(req).await?)
}

/// Response leg for handled protocols: streaming restore for streaming
/// content types, whole-body restore otherwise.
async fn respond_intercepted(
    ctx: Arc<ConnContext>,
    host: &str,
    upstream: Response<Incoming>,
    handler: Arc<dyn keymask_core::protocol::ProtocolHandler>,
    request_wanted_streaming: bool,
) -> Response<ProxyBody> {
    let content_type = upstream
        .headers()
        .get(hyper::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let is_streaming = STREAMING_CONTENT_TYPES
        .iter()
        .any(|ct| content_type.starts_with(ct))
        || (request_wanted_streaming && content_type.starts_with("text/event-stream"));

    if is_streaming {
        return streaming_response(ctx, upstream, handler).await;
    }

    let (parts, body) = upstream.into_parts();
    let body_bytes = match Limited::new(body, ctx.max_body_bytes).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            warn!(host, error = %e, "failed to buffer upstream response");
            return text_response(StatusCode::BAD_GATEWAY, "upstream response unreadable");
        }
    };
    ctx.service
        .metrics()
        .bytes_transferred_total
        .with_label_values(&["response"])
        .inc_by(body_bytes.len() as u64);

    let outcome = ctx
        .service
        .process_response(host, &body_bytes, handler.as_ref())
        .await;
    if outcome.restored > 0 || outcome.not_found > 0 {
        info!(
            host,
            restored = outcome.restored,
            not_found = outcome.not_found,
            "restored placeholders in response"
        );
    }

    let mut builder = Response::builder().status(parts.status);
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder = builder.header(hyper::header::CONTENT_LENGTH, outcome.body.len());
    builder
        .body(full_body(Bytes::from(outcome.body)))
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "response assembly"))
}

/// Streams the upstream body through the restorer into a channel-backed
/// response body.
async fn streaming_response(
    ctx: Arc<ConnContext>,
    upstream: Response<Incoming>,
    handler: Arc<dyn keymask_core::protocol::ProtocolHandler>,
) -> Response<ProxyBody> {
    let (parts, mut body) = upstream.into_parts();
    let (tx, rx) = tokio::sync::mpsc::channel::<std::result::Result<Frame<Bytes>, hyper::Error>>(32);

    let service = Arc::clone(&ctx.service);

    tokio::spawn(async move {
        let mut restorer = StreamRestorer::new(service.clone(), handler);
        loop {
            match body.frame().await {
                Some(Ok(frame)) => {
                    let Ok(data) = frame.into_data() else {
                        continue;
                    };
                    service
                        .metrics()
                        .bytes_transferred_total
                        .with_label_values(&["response"])
                        .inc_by(data.len() as u64);
                    let out = restorer.process_bytes(&data).await;
                    if !out.is_empty() && tx.send(Ok(Frame::data(Bytes::from(out)))).await.is_err() {
                        return;
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "upstream stream error");
                    break;
                }
                None => break,
            }
        }
        let tail = restorer.finish().await;
        if !tail.is_empty() {
            let _ = tx.send(Ok(Frame::data(Bytes::from(tail)))).await;
        }
    });

    let body: ProxyBody = BodyExt::boxed(StreamBody::new(ReceiverStream::new(rx)));

    let mut builder = Response::builder().status(parts.status);
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str()) || name.as_str() == "content-length" {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
        .body(body)
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "response assembly"))
}

/// Passthrough response leg: forward frames untouched.
fn passthrough_response(upstream: Response<Incoming>) -> Response<ProxyBody> {
    let (parts, body) = upstream.into_parts();
    let mut builder = Response::builder().status(parts.status);
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }
    builder
        .body(body.boxed())
        .unwrap_or_else(|_| text_response(StatusCode::INTERNAL_SERVER_ERROR, "response assembly"))
}

/// Plain HTTP passthrough: connect to the target and relay bytes, starting
/// with the already-consumed head.
async fn handle_plain_http(mut client: TcpStream, head: &[u8], first_line: &str) -> Result<()> {
    let mut parts = first_line.split_whitespace();
    let _method = parts.next().unwrap_or_default();
    let uri = parts.next().unwrap_or_default();
    let (host, port) = parse_absolute_uri(uri);
    if host.is_empty() {
        client
            .write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n")
            .await?;
        return Ok(());
    }

    match TcpStream::connect((host.as_str(), port)).await {
        Ok(mut remote) => {
            remote.write_all(head).await?;
            let _ = tokio::io::copy_bidirectional(&mut client, &mut remote).await;
            Ok(())
        }
        Err(e) => {
            warn!(host, port, error = %e, "plain HTTP connect failed");
            client
                .write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n")
                .await?;
            Ok(())
        }
    }
}

/// `host:port` with a default port.
fn split_host_port(target: &str, default_port: u16) -> (String, u16) {
    match target.rsplit_once(':') {
        Some((host, port)) => (
            host.to_string(),
            port.parse().unwrap_or(default_port),
        ),
        None => (target.to_string(), default_port),
    }
}

/// Extracts host and port from an absolute URI like
/// `http://example.com:8080/path`.
fn parse_absolute_uri(uri: &str) -> (String, u16) {
    let (rest, default_port) = if let Some(rest) = uri.strip_prefix("https://") {
        (rest, 443)
    } else if let Some(rest) = uri.strip_prefix("http://") {
        (rest, 80)
    } else {
        (uri, 80)
    };
    let host_port = rest.split('/').next().unwrap_or(rest);
    split_host_port(host_port, default_port)
}

/// `:8080` means every interface; anything else must parse as
/// `host:port`.
fn normalize_listen_addr(listen: &str) -> Result<String> {
    if listen.is_empty() {
        return Err(ProxyError::ListenAddr("empty listen address".into()));
    }
    if let Some(port) = listen.strip_prefix(':') {
        port.parse::<u16>()
            .map_err(|_| ProxyError::ListenAddr(listen.to_string()))?;
        return Ok(format!("0.0.0.0:{port}"));
    }
    Ok(listen.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listen_addr_normalization() {
        assert_eq!(normalize_listen_addr(":8080").unwrap(), "0.0.0.0:8080");
        assert_eq!(
            normalize_listen_addr("127.0.0.1:9000").unwrap(),
            "127.0.0.1:9000"
        );
        assert!(normalize_listen_addr("").is_err());
        assert!(normalize_listen_addr(":not-a-port").is_err());
    }

    #[test]
    fn host_port_splitting() {
        assert_eq!(
            split_host_port("api.openai.com:443", 443),
            ("api.openai.com".to_string(), 443)
        );
        assert_eq!(
            split_host_port("api.openai.com", 443),
            ("api.openai.com".to_string(), 443)
        );
    }

    #[test]
    fn absolute_uri_parsing() {
        assert_eq!(
            parse_absolute_uri("http://example.com/path"),
            ("example.com".to_string(), 80)
        );
        assert_eq!(
            parse_absolute_uri("http://example.com:8080/path"),
            ("example.com".to_string(), 8080)
        );
        assert_eq!(
            parse_absolute_uri("https://api.anthropic.com/v1/messages"),
            ("api.anthropic.com".to_string(), 443)
        );
    }

    #[test]
    fn hop_by_hop_headers_are_recognized() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("authorization"));
    }

    #[test]
    fn streaming_content_types_cover_known_formats() {
        for ct in ["text/event-stream", "application/x-ndjson", "application/stream+json"] {
            assert!(STREAMING_CONTENT_TYPES.iter().any(|s| ct.starts_with(s)));
        }
    }
}
