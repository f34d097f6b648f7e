//! Single-round CONNECT-tunnel probe
//!
//! One probe opens a tunnel through the proxy, optionally negotiates
//! TLS inside it, sends a minimal GET and watches the bytes that come
//! back. Every exit path resolves to exactly one `RoundResult`.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_native_tls::TlsConnector;
use url::Url;

use tracing::{debug, instrument};

use crate::error::{PulseError, Result};
use crate::models::{CheckConfig, ProxyAddress, RoundResult};

/// Target URL broken down for tunneling
///
/// The tunnel port follows the scheme (443/80), not any explicit port
/// in the URL, matching the front-end's expectations.
#[derive(Debug, Clone)]
pub struct TargetUrl {
    pub host: String,
    pub port: u16,
    pub path: String,
    pub https: bool,
    /// Whether the target is the IP-echo endpoint
    pub ip_echo: bool,
}

impl TargetUrl {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw)?;
        let https = url.scheme() == "https";

        let host = url
            .host_str()
            .ok_or_else(|| PulseError::InvalidTargetUrl(format!("missing host in {}", raw)))?
            .to_string();

        let path = if url.path().is_empty() {
            "/".to_string()
        } else {
            url.path().to_string()
        };

        Ok(TargetUrl {
            host,
            port: if https { 443 } else { 80 },
            path,
            https,
            ip_echo: raw.contains("ipconfig.io"),
        })
    }
}

/// Performs single probe rounds against one target
pub struct Prober {
    config: Arc<CheckConfig>,
    target: TargetUrl,
    tls: TlsConnector,
}

impl Prober {
    /// Create a prober for the run's target URL
    pub fn new(config: Arc<CheckConfig>) -> Result<Self> {
        let target = TargetUrl::parse(&config.target_url)?;
        let tls = TlsConnector::from(native_tls::TlsConnector::new()?);

        Ok(Prober {
            config,
            target,
            tls,
        })
    }

    pub fn target(&self) -> &TargetUrl {
        &self.target
    }

    /// Run one probe round against the proxy within the hard deadline
    #[instrument(skip(self, address), fields(proxy = %address))]
    pub async fn probe_once(&self, address: &ProxyAddress) -> RoundResult {
        let deadline = Instant::now() + self.config.probe_timeout;

        let tunnel = match timeout_at(deadline, self.open_tunnel(address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                debug!("Tunnel setup failed: {}", e);
                return RoundResult::failure();
            }
            Err(_) => {
                debug!("Tunnel setup timed out");
                return RoundResult::failure();
            }
        };

        if self.target.https {
            let stream = match timeout_at(deadline, self.tls.connect(&self.target.host, tunnel))
                .await
            {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    debug!("TLS handshake failed: {}", e);
                    return RoundResult::failure();
                }
                Err(_) => {
                    debug!("TLS handshake timed out");
                    return RoundResult::failure();
                }
            };
            self.exchange(stream, deadline).await
        } else {
            self.exchange(tunnel, deadline).await
        }
    }

    /// Connect to the proxy and establish a CONNECT tunnel to the target
    async fn open_tunnel(&self, address: &ProxyAddress) -> Result<TcpStream> {
        let mut stream = TcpStream::connect(address.dial_addr())
            .await
            .map_err(|e| PulseError::ProxyConnectionFailed(format!("TCP connect failed: {}", e)))?;

        let request = self.build_connect_request(address);
        stream.write_all(request.as_bytes()).await.map_err(|e| {
            PulseError::ProxyConnectionFailed(format!("Failed to send CONNECT: {}", e))
        })?;

        let mut response = vec![0u8; 1024];
        let n = stream.read(&mut response).await.map_err(|e| {
            PulseError::ProxyConnectionFailed(format!("Failed to read CONNECT response: {}", e))
        })?;

        let response_str = String::from_utf8_lossy(&response[..n]);
        if !response_str.starts_with("HTTP/1.1 200") && !response_str.starts_with("HTTP/1.0 200") {
            return Err(PulseError::ConnectFailed(
                response_str
                    .lines()
                    .next()
                    .unwrap_or("empty response")
                    .to_string(),
            ));
        }

        debug!("CONNECT tunnel established");
        Ok(stream)
    }

    /// Build the CONNECT request, with Basic auth when credentials are present
    fn build_connect_request(&self, address: &ProxyAddress) -> String {
        let authority = format!("{}:{}", self.target.host, self.target.port);
        let mut request = format!(
            "CONNECT {} HTTP/1.1\r\nHost: {}\r\nProxy-Connection: keep-alive\r\n",
            authority, authority
        );

        if let Some(creds) = &address.credentials {
            let credentials = format!("{}:{}", creds.username, creds.password);
            let encoded = BASE64.encode(credentials.as_bytes());
            request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", encoded));
        }

        request.push_str("\r\n");
        request
    }

    /// Send the minimal GET over the tunnel and judge the response
    async fn exchange<S>(&self, mut stream: S, deadline: Instant) -> RoundResult
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nConnection: close\r\n\r\n",
            self.target.path, self.target.host
        );

        match timeout_at(deadline, stream.write_all(request.as_bytes())).await {
            Ok(Ok(())) => {}
            _ => return RoundResult::failure(),
        }

        let mut body = Vec::new();
        let mut buf = [0u8; 4096];
        let succeeded = loop {
            match timeout_at(deadline, stream.read(&mut buf)).await {
                // Deadline reached: partial bytes still count as success.
                Err(_) => break !body.is_empty(),
                Ok(Ok(0)) => {
                    break if self.target.https {
                        contains_http_marker(&body)
                    } else {
                        !body.is_empty()
                    }
                }
                Ok(Ok(n)) => {
                    body.extend_from_slice(&buf[..n]);
                    // Plain-HTTP targets resolve as soon as the marker shows up.
                    if !self.target.https && contains_http_marker(&body) {
                        break true;
                    }
                }
                Ok(Err(_)) => break false,
            }
        };

        if !succeeded {
            return RoundResult::failure();
        }

        let ip = if self.target.ip_echo {
            extract_echoed_ip(&body)
        } else {
            None
        };
        RoundResult::success(ip)
    }
}

/// Whether the accumulated bytes look like an HTTP response
fn contains_http_marker(body: &[u8]) -> bool {
    let text = String::from_utf8_lossy(body);
    text.contains("HTTP/1.1") || text.contains("HTTP/2")
}

/// Pull the `ip` field from the first top-level JSON object in the body
///
/// Parse failures are swallowed; the round verdict is unaffected.
fn extract_echoed_ip(body: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(body);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let json: Value = serde_json::from_str(&text[start..=end]).ok()?;
    json.get("ip")?.as_str().map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::TcpListener;

    fn config(target_url: &str, timeout: Duration) -> Arc<CheckConfig> {
        Arc::new(CheckConfig {
            target_url: target_url.to_string(),
            round_count: 1,
            round_interval: Duration::ZERO,
            min_success_threshold: 0,
            probe_timeout: timeout,
        })
    }

    fn proxy_address(addr: SocketAddr) -> ProxyAddress {
        format!("{}:{}", addr.ip(), addr.port()).parse().unwrap()
    }

    /// Fake proxy: answers CONNECT with `connect_status`, then plays the
    /// target and answers the tunneled GET with `body` (empty = stay
    /// silent). With `close_after_body` unset the tunnel is held open so
    /// the prober runs into its deadline.
    async fn spawn_fake_proxy(
        connect_status: &'static str,
        body: &'static str,
        close_after_body: bool,
    ) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            if let Ok((mut stream, _)) = listener.accept().await {
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf).await; // CONNECT request
                let _ = stream.write_all(connect_status.as_bytes()).await;

                if connect_status.starts_with("HTTP/1.1 200") {
                    let _ = stream.read(&mut buf).await; // tunneled GET
                    if !body.is_empty() {
                        let _ = stream.write_all(body.as_bytes()).await;
                    }
                    if close_after_body {
                        let _ = stream.shutdown().await;
                    } else {
                        // Hold the tunnel open without closing it.
                        tokio::time::sleep(Duration::from_secs(60)).await;
                    }
                }
            }
        });

        addr
    }

    #[test]
    fn test_target_url_parse() {
        let target = TargetUrl::parse("https://example.com/some/path").unwrap();
        assert_eq!(target.host, "example.com");
        assert_eq!(target.port, 443);
        assert_eq!(target.path, "/some/path");
        assert!(target.https);
        assert!(!target.ip_echo);

        let target = TargetUrl::parse("http://example.com").unwrap();
        assert_eq!(target.port, 80);
        assert_eq!(target.path, "/");
        assert!(!target.https);

        let target = TargetUrl::parse("https://ipconfig.io/json").unwrap();
        assert!(target.ip_echo);

        assert!(TargetUrl::parse("not a url").is_err());
    }

    #[test]
    fn test_connect_request_includes_basic_auth() {
        let prober = Prober::new(config("https://example.com", Duration::from_secs(10))).unwrap();

        let plain: ProxyAddress = "1.2.3.4:8080".parse().unwrap();
        let request = prober.build_connect_request(&plain);
        assert!(request.starts_with("CONNECT example.com:443 HTTP/1.1\r\n"));
        assert!(request.contains("Proxy-Connection: keep-alive\r\n"));
        assert!(!request.contains("Proxy-Authorization"));

        let authed: ProxyAddress = "1.2.3.4:8080:user:pass".parse().unwrap();
        let request = prober.build_connect_request(&authed);
        // base64("user:pass")
        assert!(request.contains("Proxy-Authorization: Basic dXNlcjpwYXNz\r\n"));
    }

    #[test]
    fn test_http_marker_detection() {
        assert!(contains_http_marker(b"HTTP/1.1 200 OK\r\n\r\n"));
        assert!(contains_http_marker(b"junk HTTP/2 200"));
        assert!(!contains_http_marker(b"SSH-2.0-OpenSSH_8.9"));
        assert!(!contains_http_marker(b""));
    }

    #[test]
    fn test_extract_echoed_ip() {
        let body = b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\r\n{\"ip\": \"9.9.9.9\", \"country\": \"NL\"}";
        assert_eq!(extract_echoed_ip(body).as_deref(), Some("9.9.9.9"));

        assert_eq!(extract_echoed_ip(b"HTTP/1.1 200 OK\r\n\r\nno json here"), None);
        assert_eq!(extract_echoed_ip(b"{\"not\": \"closed\""), None);
        assert_eq!(extract_echoed_ip(b"{\"no_ip_field\": true}"), None);
    }

    #[tokio::test]
    async fn test_probe_succeeds_through_fake_proxy() {
        let addr = spawn_fake_proxy(
            "HTTP/1.1 200 Connection established\r\n\r\n",
            "HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n",
            true,
        )
        .await;

        let prober =
            Prober::new(config("http://example.com/", Duration::from_secs(5))).unwrap();
        let result = prober.probe_once(&proxy_address(addr)).await;
        assert!(result.succeeded);
        assert!(result.discovered_ip.is_none());
    }

    #[tokio::test]
    async fn test_probe_fails_on_connect_rejection() {
        let addr =
            spawn_fake_proxy("HTTP/1.1 407 Proxy Authentication Required\r\n\r\n", "", true).await;

        let prober =
            Prober::new(config("http://example.com/", Duration::from_secs(5))).unwrap();
        let result = prober.probe_once(&proxy_address(addr)).await;
        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn test_probe_fails_on_unreachable_proxy() {
        let prober =
            Prober::new(config("http://example.com/", Duration::from_secs(5))).unwrap();
        // Port 1 is essentially never listening.
        let address: ProxyAddress = "127.0.0.1:1".parse().unwrap();
        let result = prober.probe_once(&address).await;
        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn test_probe_times_out_with_no_bytes_as_failure() {
        // Tunnel opens but the target never sends a byte.
        let addr =
            spawn_fake_proxy("HTTP/1.1 200 Connection established\r\n\r\n", "", false).await;

        let prober =
            Prober::new(config("http://example.com/", Duration::from_millis(300))).unwrap();
        let result = prober.probe_once(&proxy_address(addr)).await;
        assert!(!result.succeeded);
    }

    #[tokio::test]
    async fn test_probe_times_out_with_partial_bytes_as_success() {
        // Garbage without an HTTP marker, then silence: the deliberate
        // partial-response leniency still counts this as a success.
        let addr = spawn_fake_proxy(
            "HTTP/1.1 200 Connection established\r\n\r\n",
            "not-an-http-response",
            false,
        )
        .await;

        let prober =
            Prober::new(config("http://example.com/", Duration::from_millis(300))).unwrap();
        let result = prober.probe_once(&proxy_address(addr)).await;
        assert!(result.succeeded);
    }

    #[tokio::test]
    async fn test_probe_extracts_ip_from_echo_response() {
        let addr = spawn_fake_proxy(
            "HTTP/1.1 200 Connection established\r\n\r\n",
            "HTTP/1.1 200 OK\r\n\r\n{\"ip\": \"5.5.5.5\"}",
            true,
        )
        .await;

        // http scheme keeps the test free of TLS; ip_echo detection is
        // driven by the hostname.
        let prober =
            Prober::new(config("http://ipconfig.io/json", Duration::from_secs(5))).unwrap();
        let result = prober.probe_once(&proxy_address(addr)).await;
        assert!(result.succeeded);
        assert_eq!(result.discovered_ip.as_deref(), Some("5.5.5.5"));
    }
}
