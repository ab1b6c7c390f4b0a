//! Registry client: where servers announce themselves and clients look
//! them up.
//!
//! The registry itself is an external HTTP service:
//!
//! ```text
//! GET  <url>                                 -> X-Tinyrpc-Servers: tcp@a:1,tcp@b:2
//! POST <url>  X-Tinyrpc-Server: tcp@a:1      -> 200 (heartbeat)
//! ```
//!
//! Servers that miss heartbeats for the registry's TTL (5 minutes by
//! default) are dropped from the list, so heartbeats go out every 4 minutes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, RpcError};

/// Default path the registry is served on.
pub const DEFAULT_REGISTRY_PATH: &str = "/_tinyrpc_/registry";

/// Response header listing alive servers.
pub const SERVERS_HEADER: &str = "X-Tinyrpc-Servers";

/// Request header carrying the announcing server's address.
pub const SERVER_HEADER: &str = "X-Tinyrpc-Server";

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_PERIOD: Duration = Duration::from_secs(4 * 60);

/// Default budget of one registry request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of the current server list.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// Fetch the addresses of all alive servers.
    async fn fetch(&self) -> Result<Vec<String>>;
}

/// HTTP registry endpoint.
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpRegistry {
    /// Registry at `url`, e.g. `http://localhost:9999/_tinyrpc_/registry`,
    /// with [`DEFAULT_REQUEST_TIMEOUT`] per request.
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Registry at `url` with a per-request timeout.
    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Budget of one request.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Announce `addr` as alive.
    pub async fn heartbeat(&self, addr: &str) -> Result<()> {
        debug!(addr, registry = %self.url, "rpc registry: send heartbeat");
        let response = self
            .client
            .post(&self.url)
            .header(SERVER_HEADER, addr)
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RpcError::Http(format!(
                "heartbeat rejected: {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistrySource for HttpRegistry {
    async fn fetch(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(RpcError::Http(format!(
                "refresh rejected: {}",
                response.status()
            )));
        }

        let header = response
            .headers()
            .get(SERVERS_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match header {
            Some(list) => Ok(split_servers(&list, ',')),
            None => Ok(split_servers(&response.text().await?, '\n')),
        }
    }
}

fn split_servers(list: &str, sep: char) -> Vec<String> {
    list.split(sep)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Send a heartbeat now and then every `period` until one fails.
///
/// A zero period means [`DEFAULT_HEARTBEAT_PERIOD`].
pub fn spawn_heartbeat(
    registry: Arc<HttpRegistry>,
    addr: impl Into<String>,
    period: Duration,
) -> JoinHandle<()> {
    let addr = addr.into();
    let period = if period.is_zero() {
        DEFAULT_HEARTBEAT_PERIOD
    } else {
        period
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            if let Err(e) = registry.heartbeat(&addr).await {
                warn!(addr = %addr, "rpc registry: heartbeat failed: {}", e);
                return;
            }
        }
    })
}
