use std::error::Error as StdError;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::timeout;

/// The one message every timed-out probe reports, whatever the transport said.
pub const TIMEOUT_MESSAGE: &str = "Request timed out";

/// Bytes of a response body kept for keyword matching. Anything beyond this
/// is counted towards the response size and dropped.
pub const BODY_CAPTURE_LIMIT: usize = 1024 * 1024;

/// Transport-level probe failure. Always classified as down.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("Request timed out")]
    Timeout,
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Request failed: {0}")]
    Request(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProbeError::Timeout
        } else if error.is_connect() {
            ProbeError::Connect(root_cause(&error))
        } else {
            ProbeError::Request(root_cause(&error))
        }
    }
}

/// reqwest's top-level message is usually just "error sending request";
/// the useful part (DNS failure, refused connection) sits at the bottom.
fn root_cause(error: &(dyn StdError + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

/// A response that was fully received, body included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status_code: u16,
    /// Milliseconds until the response headers arrived
    pub ttfb_ms: u64,
    /// Milliseconds until the body was drained
    pub total_ms: u64,
    /// At most [`BODY_CAPTURE_LIMIT`] bytes, lossily decoded
    pub body: String,
    /// Full body size in bytes
    pub size: u64,
}

/// Raw result of one probe, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Response(ProbeResponse),
    Failed { error: ProbeError, elapsed_ms: u64 },
}

impl ProbeOutcome {
    pub fn elapsed_ms(&self) -> u64 {
        match self {
            ProbeOutcome::Response(response) => response.total_ms,
            ProbeOutcome::Failed { elapsed_ms, .. } => *elapsed_ms,
        }
    }

    pub fn response(&self) -> Option<&ProbeResponse> {
        match self {
            ProbeOutcome::Response(response) => Some(response),
            ProbeOutcome::Failed { .. } => None,
        }
    }
}

/// Performs one probe against a target URL.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HTTP/HTTPS GET prober
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(timeout: Duration, user_agent: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client, timeout })
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let start = Instant::now();

        let exchange = async {
            let mut response = self.client.get(url).send().await?;
            let ttfb = start.elapsed();
            let status_code = response.status().as_u16();

            let mut body = Vec::new();
            let mut size = 0u64;
            while let Some(chunk) = response.chunk().await? {
                size += chunk.len() as u64;
                let room = BODY_CAPTURE_LIMIT.saturating_sub(body.len());
                body.extend_from_slice(&chunk[..chunk.len().min(room)]);
            }
            Ok::<_, reqwest::Error>((status_code, ttfb, body, size))
        };

        // reqwest enforces the same limit; this is the hard stop in case a
        // body trickles in forever.
        let result = timeout(self.timeout, exchange).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok((status_code, ttfb, body, size))) => ProbeOutcome::Response(ProbeResponse {
                status_code,
                ttfb_ms: ttfb.as_millis() as u64,
                total_ms: elapsed_ms,
                size,
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            Ok(Err(error)) => ProbeOutcome::Failed { error: error.into(), elapsed_ms },
            Err(_) => ProbeOutcome::Failed { error: ProbeError::Timeout, elapsed_ms },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn prober(timeout_ms: u64) -> HttpProber {
        HttpProber::new(Duration::from_millis(timeout_ms), "pulsecheck-test").unwrap()
    }

    #[tokio::test]
    async fn test_successful_probe_drains_body() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("all systems OK")
            .create_async()
            .await;

        let outcome = prober(5_000).probe(&format!("{}/health", server.url())).await;
        mock.assert_async().await;

        let response = outcome.response().expect("response");
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "all systems OK");
        assert_eq!(response.size, 14);
        assert!(response.ttfb_ms <= response.total_ms);
    }

    #[tokio::test]
    async fn test_large_body_is_counted_but_not_kept() {
        let mut server = mockito::Server::new_async().await;
        let payload = "a".repeat(BODY_CAPTURE_LIMIT + 4096);
        let _big = server.mock("GET", "/big").with_status(200).with_body(&payload).create_async().await;

        let outcome = prober(10_000).probe(&format!("{}/big", server.url())).await;
        let response = outcome.response().expect("response");
        assert_eq!(response.size, payload.len() as u64);
        assert_eq!(response.body.len(), BODY_CAPTURE_LIMIT);
    }

    #[tokio::test]
    async fn test_error_statuses_are_still_responses() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server.mock("GET", "/missing").with_status(404).create_async().await;
        let _broken = server.mock("GET", "/broken").with_status(503).create_async().await;

        let outcome = prober(5_000).probe(&format!("{}/missing", server.url())).await;
        assert_eq!(outcome.response().map(|r| r.status_code), Some(404));

        let outcome = prober(5_000).probe(&format!("{}/broken", server.url())).await;
        assert_eq!(outcome.response().map(|r| r.status_code), Some(503));
    }

    #[tokio::test]
    async fn test_redirects_are_followed() {
        let mut server = mockito::Server::new_async().await;
        let _old = server
            .mock("GET", "/old")
            .with_status(301)
            .with_header("location", "/new")
            .create_async()
            .await;
        let _new = server.mock("GET", "/new").with_status(200).with_body("moved").create_async().await;

        let outcome = prober(5_000).probe(&format!("{}/old", server.url())).await;
        let response = outcome.response().expect("response");
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, "moved");
    }

    #[tokio::test]
    async fn test_silent_server_times_out_with_fixed_message() {
        // Accepts connections but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _hold = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let outcome = prober(300).probe(&format!("http://{addr}/")).await;
        match outcome {
            ProbeOutcome::Failed { error, elapsed_ms } => {
                assert_eq!(error, ProbeError::Timeout);
                assert_eq!(error.to_string(), TIMEOUT_MESSAGE);
                assert!(elapsed_ms >= 250);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refused_connection_is_connect_error() {
        // Bind then drop to get a port nothing listens on.
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let outcome = prober(2_000).probe(&format!("http://{addr}/")).await;
        assert!(
            matches!(outcome, ProbeOutcome::Failed { error: ProbeError::Connect(_), .. }),
            "unexpected outcome: {outcome:?}"
        );
    }
}
