/// Header-injecting relay for the radiko streaming host.
///
/// mpv is started with `--http-proxy` pointing here.  Every plain HTTP
/// request it sends (absolute-form, `GET http://host/path`) is forwarded
/// upstream with the session headers radiko requires:
///
/// ```text
///   Accept: */*              (forced)
///   Range: bytes=0-          (forced)
///   Connection: close        when the path ends with playlist.m3u8
///   Connection: keep-alive   otherwise
///   Icy-MetaData: 1          (added)
///   X-Radiko-AuthToken: ..   (added, current token, may be empty)
/// ```
///
/// Requests for the streaming host are upgraded to https on the way out, so
/// the player can talk plain http to the relay and still reach the TLS-only
/// upstream.  `CONNECT` requests are tunnelled byte for byte; their headers
/// are encrypted and pass through unmodified.
///
/// Upstream connections are pooled by one `reqwest::Client`; responses are
/// streamed back untouched apart from hop-by-hop headers.
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, RwLock};

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{HeaderName, ACCEPT, CONNECTION, HOST, RANGE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::StreamExt;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use reqwest::{Client, Url};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::io::{ReaderStream, StreamReader};
use tower::ServiceExt;
use tracing::{debug, info, warn};

/// Manifest file whose fetch must not keep the upstream connection open.
pub const MANIFEST_FILE: &str = "playlist.m3u8";

pub const HEADER_AUTH_TOKEN: &str = "x-radiko-authtoken";
pub const HEADER_ICY_METADATA: &str = "icy-metadata";

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: std::time::Duration = std::time::Duration::from_secs(1);

/// Largest request body forwarded upstream.
const MAX_REQUEST_BODY: usize = 1024 * 1024;

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

// ── Token ─────────────────────────────────────────────────────────────────────

/// Current auth token, written by the auth flow and read by every relayed
/// request.  Readers see either the old or the new value, never a mix.
#[derive(Debug, Clone, Default)]
pub struct TokenSlot {
    inner: Arc<RwLock<String>>,
}

impl TokenSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.inner.write() {
            *guard = token.into();
        }
    }

    pub fn get(&self) -> String {
        self.inner.read().map(|g| g.clone()).unwrap_or_default()
    }
}

// ── Header rewrite ────────────────────────────────────────────────────────────

/// Apply the radiko session headers to an outgoing request.
///
/// Never fails: a token that is not a valid header value is sent empty.
pub fn rewrite_request_headers(path: &str, headers: &mut HeaderMap, token: &str) {
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    headers.insert(RANGE, HeaderValue::from_static("bytes=0-"));

    let connection = if path.ends_with(MANIFEST_FILE) {
        "close"
    } else {
        "keep-alive"
    };
    headers.insert(CONNECTION, HeaderValue::from_static(connection));

    headers.append(
        HeaderName::from_static(HEADER_ICY_METADATA),
        HeaderValue::from_static("1"),
    );

    let token = HeaderValue::from_str(token).unwrap_or_else(|e| {
        warn!("relay: token is not a valid header value ({}), sending empty", e);
        HeaderValue::from_static("")
    });
    headers.append(HeaderName::from_static(HEADER_AUTH_TOKEN), token);
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

/// Where an incoming proxy request should go.
///
/// Absolute-form URIs are used as-is; origin-form requests fall back to the
/// `Host` header.  Plain http to `tls_host` is upgraded to https.
fn upstream_url(uri: &Uri, headers: &HeaderMap, tls_host: Option<&str>) -> Option<Url> {
    let raw = if uri.scheme().is_some() && uri.authority().is_some() {
        uri.to_string()
    } else {
        let host = headers.get(HOST)?.to_str().ok()?;
        let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
        format!("http://{}{}", host, path)
    };

    let mut url = Url::parse(&raw).ok()?;
    if let Some(tls_host) = tls_host {
        if url.scheme() == "http" && url.host_str() == Some(tls_host) {
            if url.port() == Some(80) {
                let _ = url.set_port(None);
            }
            let _ = url.set_scheme("https");
        }
    }
    Some(url)
}

// ── Shared state ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct RelayState {
    client: Client,
    token: TokenSlot,
    tls_host: Option<String>,
}

impl RelayState {
    /// `tls_host`: host whose plain-http requests are sent upstream over https.
    pub fn new(token: TokenSlot, tls_host: Option<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            // Manifests redirect to signed URLs; the player must see them.
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;
        Ok(Self {
            client,
            token,
            tls_host,
        })
    }

    pub fn token(&self) -> &TokenSlot {
        &self.token
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn relay(State(state): State<RelayState>, req: Request) -> Response {
    let (parts, body) = req.into_parts();

    let Some(url) = upstream_url(&parts.uri, &parts.headers, state.tls_host.as_deref()) else {
        warn!("relay: cannot resolve upstream for {}", parts.uri);
        return (StatusCode::BAD_REQUEST, "proxy request needs an absolute URI or Host").into_response();
    };

    let mut headers = HeaderMap::new();
    for (name, value) in parts.headers.iter() {
        if *name != HOST && !is_hop_by_hop(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    rewrite_request_headers(url.path(), &mut headers, &state.token.get());

    let body = match axum::body::to_bytes(body, MAX_REQUEST_BODY).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("relay: request body rejected: {}", e);
            return StatusCode::PAYLOAD_TOO_LARGE.into_response();
        }
    };

    let mut request = state
        .client
        .request(parts.method.clone(), url.clone())
        .headers(headers);
    if !body.is_empty() {
        request = request.body(body);
    }

    let upstream = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            warn!("relay: upstream failed for {}: {}", url, e);
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let status = upstream.status();
    debug!("relay: {} {} -> {}", parts.method, url, status);

    let mut builder = Response::builder().status(status);
    for (name, value) in upstream.headers() {
        if !is_hop_by_hop(name) {
            builder = builder.header(name, value);
        }
    }

    let reader = StreamReader::new(
        upstream
            .bytes_stream()
            .map(|result| result.map_err(std::io::Error::other)),
    );
    match builder.body(Body::from_stream(ReaderStream::new(reader))) {
        Ok(response) => response,
        Err(e) => {
            warn!("relay: cannot build response for {}: {}", url, e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

/// Answer a `CONNECT` and splice the client onto the target once upgraded.
fn tunnel(req: Request) -> Response {
    let Some(addr) = req.uri().authority().map(|a| a.to_string()) else {
        return (StatusCode::BAD_REQUEST, "CONNECT must be to a socket address").into_response();
    };

    tokio::spawn(async move {
        match hyper::upgrade::on(req).await {
            Ok(upgraded) => {
                let result = async {
                    let mut server = TcpStream::connect(addr.as_str()).await?;
                    let mut client = TokioIo::new(upgraded);
                    tokio::io::copy_bidirectional(&mut client, &mut server).await
                }
                .await;
                match result {
                    Ok((up, down)) => debug!("tunnel {}: {} bytes up, {} bytes down", addr, up, down),
                    Err(e) => debug!("tunnel {} closed: {}", addr, e),
                }
            }
            Err(e) => warn!("tunnel {}: upgrade failed: {}", addr, e),
        }
    });

    Response::new(Body::empty())
}

// ── Server startup ────────────────────────────────────────────────────────────

/// Bind the relay and serve it on a background task for the life of the
/// process.  Returns the bound address (useful with port 0).
pub async fn start_server(
    bind_address: &str,
    port: u16,
    state: RelayState,
) -> anyhow::Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind((bind_address, port)).await?;
    let local = listener.local_addr()?;
    info!("Relay listening on http://{}", local);

    let app = Router::new().fallback(relay).with_state(state);

    let handle = tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    // EMFILE and friends: give the process time to free descriptors.
                    warn!("relay: accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let app = app.clone();
            tokio::spawn(async move {
                let service = hyper::service::service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
                    let app = app.clone();
                    async move {
                        let req = req.map(Body::new);
                        if req.method() == Method::CONNECT {
                            Ok::<_, Infallible>(tunnel(req))
                        } else {
                            app.oneshot(req).await
                        }
                    }
                });

                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .with_upgrades()
                    .await
                {
                    debug!("relay: connection from {} ended: {}", peer, e);
                }
            });
        }
    });

    Ok((local, handle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;

    #[test]
    fn manifest_requests_close_the_connection() {
        let mut headers = HeaderMap::new();
        rewrite_request_headers("/path/playlist.m3u8", &mut headers, "tok");
        assert_eq!(headers[CONNECTION], "close");

        let mut headers = HeaderMap::new();
        rewrite_request_headers("/path/segment001.ts", &mut headers, "tok");
        assert_eq!(headers[CONNECTION], "keep-alive");
    }

    #[test]
    fn forced_and_added_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.apple.mpegurl"));
        headers.insert(RANGE, HeaderValue::from_static("bytes=100-200"));
        rewrite_request_headers("/x/chunklist.m3u8", &mut headers, "abc123");

        assert_eq!(headers[ACCEPT], "*/*");
        assert_eq!(headers[RANGE], "bytes=0-");
        assert_eq!(headers[HEADER_ICY_METADATA], "1");
        assert_eq!(headers[HEADER_AUTH_TOKEN], "abc123");
        assert_eq!(headers[CONNECTION], "keep-alive");
    }

    #[test]
    fn empty_or_invalid_token_is_still_sent() {
        let mut headers = HeaderMap::new();
        rewrite_request_headers("/a.ts", &mut headers, "");
        assert_eq!(headers[HEADER_AUTH_TOKEN], "");

        let mut headers = HeaderMap::new();
        rewrite_request_headers("/a.ts", &mut headers, "bad\ntoken");
        assert_eq!(headers[HEADER_AUTH_TOKEN], "");
    }

    #[test]
    fn failed_accept_backs_off() {
        assert!(ACCEPT_BACKOFF >= std::time::Duration::from_millis(100));
    }

    #[test]
    fn token_slot_is_shared() {
        let slot = TokenSlot::new();
        let reader = slot.clone();
        assert_eq!(reader.get(), "");
        slot.set("fresh");
        assert_eq!(reader.get(), "fresh");
    }

    #[test]
    fn upstream_resolution() {
        let tls = Some("f-radiko.smartstream.ne.jp");
        let empty = HeaderMap::new();

        let uri: Uri = "http://f-radiko.smartstream.ne.jp/TBS/_definst_/simul-stream.stream/playlist.m3u8"
            .parse()
            .unwrap();
        let url = upstream_url(&uri, &empty, tls).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.path(), "/TBS/_definst_/simul-stream.stream/playlist.m3u8");

        let uri: Uri = "http://example.com:8080/a.ts?x=1".parse().unwrap();
        let url = upstream_url(&uri, &empty, tls).unwrap();
        assert_eq!(url.as_str(), "http://example.com:8080/a.ts?x=1");

        let uri: Uri = "/a.ts".parse().unwrap();
        let mut host = HeaderMap::new();
        host.insert(HOST, HeaderValue::from_static("example.com"));
        assert_eq!(
            upstream_url(&uri, &host, tls).unwrap().as_str(),
            "http://example.com/a.ts"
        );
        assert!(upstream_url(&uri, &empty, tls).is_none());
    }

    /// Upstream that answers with the headers it received.
    async fn echo_upstream() -> SocketAddr {
        async fn echo(headers: HeaderMap) -> String {
            let pick = |name: &str| {
                headers
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-")
                    .to_string()
            };
            format!(
                "token={} icy={} range={} accept={}",
                pick(HEADER_AUTH_TOKEN),
                pick(HEADER_ICY_METADATA),
                pick("range"),
                pick("accept"),
            )
        }

        let app = Router::new().route("/*path", get(echo));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn relays_with_injected_headers() {
        let upstream = echo_upstream().await;
        let token = TokenSlot::new();
        let state = RelayState::new(token.clone(), None).unwrap();
        let (relay, _handle) = start_server("127.0.0.1", 0, state).await.unwrap();

        let client = Client::builder()
            .proxy(reqwest::Proxy::http(format!("http://{}", relay)).unwrap())
            .build()
            .unwrap();
        let url = format!("http://{}/TBS/playlist.m3u8", upstream);

        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "token= icy=1 range=bytes=0- accept=*/*");

        token.set("tok-123");
        let body = client.get(&url).send().await.unwrap().text().await.unwrap();
        assert_eq!(body, "token=tok-123 icy=1 range=bytes=0- accept=*/*");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        let state = RelayState::new(TokenSlot::new(), None).unwrap();
        let (relay, _handle) = start_server("127.0.0.1", 0, state).await.unwrap();

        let client = Client::builder()
            .proxy(reqwest::Proxy::http(format!("http://{}", relay)).unwrap())
            .build()
            .unwrap();
        let res = client.get("http://127.0.0.1:9/a.ts").send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
}
