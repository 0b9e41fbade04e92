//! Resource classification: does a link target point at an image?
//!
//! [`HttpProbe`] answers by sending an HTTP `HEAD` request (TLS for
//! `https`) and reading the `Content-Type` of the response.  Every failure
//! mode, from an unparsable URL to a timeout, answers "not an image".

use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use reqwest::Client;
use tokio::runtime::{Handle, Runtime};
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;
use url::Url;

/// Content types treated as images.
pub const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/jpg"];

/// Decides whether a URL refers to an image.  Must not fail: anything
/// unexpected is `false`.
pub trait ResourceClassifier: Send + Sync {
    fn is_image(&self, url: &str) -> bool;
}

impl<F> ResourceClassifier for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_image(&self, url: &str) -> bool {
        self(url)
    }
}

/// Never probes; every link is a plain link.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl ResourceClassifier for Offline {
    fn is_image(&self, _url: &str) -> bool {
        false
    }
}

/// The `http`/`https` URL a link target would be probed at, without its
/// fragment.  Anything else is never probed.
pub fn probe_target(url: &str) -> Option<Url> {
    let mut parsed = Url::parse(url.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") || parsed.host().is_none() {
        return None;
    }
    parsed.set_fragment(None);
    Some(parsed)
}

/// Whether a `Content-Type` value names one of [`IMAGE_TYPES`].
pub fn is_image_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    IMAGE_TYPES.contains(&mime.as_str())
}

// ── HttpProbe ─────────────────────────────────────────────────────────────────

/// Classifies by `HEAD` request.  Redirects are not followed.
///
/// Requests run on a private current-thread runtime.  When called from
/// inside another tokio runtime the request is made from a helper thread
/// instead, which blocks the caller until it answers or times out.
pub struct HttpProbe {
    /// Always `Some` until dropped.
    runtime: Option<Runtime>,
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()?;

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(io::Error::other)?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let client = Client::builder()
            .use_preconfigured_tls(tls)
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(concat!("tmd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(io::Error::other)?;

        Ok(Self {
            runtime: Some(runtime),
            client,
            timeout,
        })
    }

    /// `Content-Type` of a successful (2xx) response, if it has one.
    async fn head(&self, target: Url) -> reqwest::Result<Option<String>> {
        let response = self.client.head(target).send().await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "probe: unsuccessful status");
            return Ok(None);
        }
        Ok(response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned))
    }

    fn run(&self, target: Url) -> reqwest::Result<Option<String>> {
        let Some(runtime) = &self.runtime else {
            return Ok(None);
        };
        if Handle::try_current().is_err() {
            return runtime.block_on(self.head(target));
        }
        debug!("inside a tokio runtime; probing from a helper thread");
        thread::scope(|s| {
            s.spawn(|| runtime.block_on(self.head(target)))
                .join()
                .unwrap_or(Ok(None))
        })
    }
}

impl Drop for HttpProbe {
    fn drop(&mut self) {
        // A plain drop blocks, which tokio refuses inside async code.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for HttpProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProbe")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ResourceClassifier for HttpProbe {
    fn is_image(&self, url: &str) -> bool {
        let Some(target) = probe_target(url) else {
            debug!(url, "not an http(s) url; skipping probe");
            return false;
        };
        match self.run(target) {
            Ok(Some(ct)) => {
                let image = is_image_type(&ct);
                debug!(url, content_type = %ct, image, "probe answered");
                image
            }
            Ok(None) => {
                debug!(url, "probe: no usable content type");
                false
            }
            Err(e) if e.is_timeout() => {
                debug!(url, timeout_ms = self.timeout.as_millis() as u64, "probe timed out");
                false
            }
            Err(e) => {
                debug!(url, error = %e, "probe failed");
                false
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn targets_keep_host_port_and_query() {
        let t = probe_target("https://example.com/a/b.png?x=1#frag").unwrap();
        assert_eq!(t.as_str(), "https://example.com/a/b.png?x=1");
        let t = probe_target("HTTP://user:pw@host:8080").unwrap();
        assert_eq!((t.scheme(), t.host_str(), t.port()), ("http", Some("host"), Some(8080)));
        let t = probe_target("http://[::1]:81/x").unwrap();
        assert_eq!((t.host_str(), t.port_or_known_default()), (Some("[::1]"), Some(81)));
    }

    #[test]
    fn unsupported_urls() {
        assert!(probe_target("ftp://x/y.png").is_none());
        assert!(probe_target("/relative/y.png").is_none());
        assert!(probe_target("http://").is_none());
        assert!(probe_target("http://host:notaport/").is_none());
        assert!(probe_target("mailto:a@b.c").is_none());
        assert!(probe_target("").is_none());
    }

    #[test]
    fn image_types() {
        assert!(is_image_type("image/png"));
        assert!(is_image_type("IMAGE/JPEG; charset=binary"));
        assert!(is_image_type("image/jpg"));
        assert!(!is_image_type("image/gif"));
        assert!(!is_image_type("text/html"));
    }

    #[test]
    fn closures_and_offline() {
        let only_png = |u: &str| u.ends_with(".png");
        assert!(only_png.is_image("a.png"));
        assert!(!Offline.is_image("a.png"));
    }

    fn serve_once(response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        thread::spawn(move || {
            if let Ok((mut sock, _)) = listener.accept() {
                let mut buf = [0u8; 1024];
                let n = sock.read(&mut buf).unwrap_or(0);
                assert!(buf[..n].starts_with(b"HEAD /pic.png HTTP/1.1\r\n"));
                let _ = sock.write_all(response.as_bytes());
            }
        });
        port
    }

    #[test]
    fn probe_reads_content_type() {
        let port = serve_once("HTTP/1.1 200 OK\r\nContent-Type: image/jpeg\r\nContent-Length: 10\r\n\r\n");
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        assert!(probe.is_image(&format!("http://127.0.0.1:{port}/pic.png")));
    }

    #[test]
    fn probe_non_image() {
        let port = serve_once("HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nContent-Length: 0\r\n\r\n");
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        assert!(!probe.is_image(&format!("http://127.0.0.1:{port}/pic.png")));
    }

    #[test]
    fn unsuccessful_status_is_not_an_image() {
        let port = serve_once("HTTP/1.1 404 Not Found\r\nContent-Type: image/png\r\nContent-Length: 0\r\n\r\n");
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        assert!(!probe.is_image(&format!("http://127.0.0.1:{port}/pic.png")));
    }

    #[test]
    fn probe_failures_are_not_images() {
        // Bind then drop, so the port is very likely closed.
        let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
        let probe = HttpProbe::new(Duration::from_millis(500)).unwrap();
        assert!(!probe.is_image(&format!("http://127.0.0.1:{port}/pic.png")));
        assert!(!probe.is_image("not a url"));
        assert!(!probe.is_image("mailto:a@b.c"));
    }

    #[test]
    fn probe_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = thread::spawn(move || {
            // Accept and hold the connection open without answering.
            let conn = listener.accept();
            thread::sleep(Duration::from_millis(600));
            drop(conn);
        });
        let probe = HttpProbe::new(Duration::from_millis(100)).unwrap();
        assert!(!probe.is_image(&format!("http://127.0.0.1:{port}/pic.png")));
        handle.join().unwrap();
    }

    #[test]
    fn probe_works_inside_a_running_runtime() {
        let port = serve_once("HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 0\r\n\r\n");
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();
        let outer = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let url = format!("http://127.0.0.1:{port}/pic.png");
        assert!(outer.block_on(async { probe.is_image(&url) }));
    }
}
