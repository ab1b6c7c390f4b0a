//! Load-balanced client over a discovered set of servers.
//!
//! [`XClient`] asks a [`Discovery`] for an address, reuses a pooled
//! [`Client`] for it (redialing when the pooled one is dead) and issues the
//! call. [`XClient::broadcast`] calls every known server at once.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tinyrpc::xclient::{MultiServersDiscovery, SelectMode, XClient};
//! use tinyrpc::ConnectionOptions;
//!
//! #[tokio::main]
//! async fn main() -> tinyrpc::Result<()> {
//!     let discovery = MultiServersDiscovery::new(vec![
//!         "tcp@127.0.0.1:9001".to_string(),
//!         "tcp@127.0.0.1:9002".to_string(),
//!     ]);
//!     let xc = XClient::new(Arc::new(discovery), SelectMode::RoundRobin, ConnectionOptions::default());
//!
//!     let sum: i32 = xc.call("Foo.Sum", &(1, 2)).await?;
//!     let mut first = 0i32;
//!     xc.broadcast("Foo.Sum", &(1, 2), Some(&mut first)).await?;
//!     assert_eq!(sum, first);
//!
//!     xc.close().await
//! }
//! ```

mod discovery;
mod registry_discovery;

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub use discovery::{Discovery, MultiServersDiscovery, SelectMode};
pub use registry_discovery::{RegistryDiscovery, DEFAULT_UPDATE_INTERVAL};

use crate::client::Client;
use crate::control::ConnectionOptions;
use crate::error::{Result, RpcError};

/// Client that spreads calls over discovered servers.
pub struct XClient {
    discovery: Arc<dyn Discovery>,
    mode: SelectMode,
    options: ConnectionOptions,
    /// Pooled clients by `protocol@address`; held across redial.
    clients: tokio::sync::Mutex<HashMap<String, Arc<Client>>>,
}

impl XClient {
    pub fn new(discovery: Arc<dyn Discovery>, mode: SelectMode, options: ConnectionOptions) -> Self {
        Self {
            discovery,
            mode,
            options,
            clients: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// The discovery this client selects from.
    pub fn discovery(&self) -> &Arc<dyn Discovery> {
        &self.discovery
    }

    /// Pooled client for `rpc_addr`, dialing if absent or dead.
    async fn dial(&self, rpc_addr: &str) -> Result<Arc<Client>> {
        let mut clients = self.clients.lock().await;

        match clients.get(rpc_addr) {
            Some(client) if client.is_available() => return Ok(client.clone()),
            _ => {}
        }

        if let Some(stale) = clients.remove(rpc_addr) {
            debug!(addr = rpc_addr, "rpc xclient: evicting unavailable client");
            let _ = stale.close().await;
        }

        let client = Arc::new(Client::xdial(rpc_addr, self.options.clone()).await?);
        clients.insert(rpc_addr.to_string(), client.clone());
        Ok(client)
    }

    /// Call one selected server.
    pub async fn call<A, R>(&self, service_method: &str, args: &A) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let rpc_addr = self.discovery.get(self.mode).await?;
        self.dial(&rpc_addr).await?.call(service_method, args).await
    }

    /// Call one selected server, giving up when `token` is cancelled.
    pub async fn call_with_cancel<A, R>(
        &self,
        token: &CancellationToken,
        service_method: &str,
        args: &A,
    ) -> Result<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let rpc_addr = self.discovery.get(self.mode).await?;
        self.dial(&rpc_addr)
            .await?
            .call_with_cancel(token, service_method, args)
            .await
    }

    /// Call every server concurrently.
    ///
    /// The first successful reply is stored in `reply`. The first error is
    /// returned and stops calls that have not been sent yet.
    pub async fn broadcast<A, R>(
        &self,
        service_method: &str,
        args: &A,
        reply: Option<&mut R>,
    ) -> Result<()>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.broadcast_with_cancel(&CancellationToken::new(), service_method, args, reply)
            .await
    }

    /// [`broadcast`](Self::broadcast) that also gives up when `token` is
    /// cancelled.
    pub async fn broadcast_with_cancel<A, R>(
        &self,
        token: &CancellationToken,
        service_method: &str,
        args: &A,
        mut reply: Option<&mut R>,
    ) -> Result<()>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let servers = self.discovery.get_all().await?;
        let failed = token.child_token();

        let mut calls: FuturesUnordered<_> = servers
            .iter()
            .map(|rpc_addr| {
                let failed = &failed;
                async move {
                    if failed.is_cancelled() {
                        return Err(RpcError::Cancelled("broadcast aborted".to_string()));
                    }
                    let client = self.dial(rpc_addr).await?;
                    if failed.is_cancelled() {
                        return Err(RpcError::Cancelled("broadcast aborted".to_string()));
                    }
                    client
                        .call_with_cancel::<A, R>(token, service_method, args)
                        .await
                }
            })
            .collect();

        let mut first_err = None;
        let mut replied = false;
        while let Some(result) = calls.next().await {
            match result {
                Ok(value) if !replied => {
                    if let Some(slot) = reply.as_deref_mut() {
                        *slot = value;
                    }
                    replied = true;
                }
                Ok(_) => {}
                Err(e) => {
                    if first_err.is_none() {
                        failed.cancel();
                        first_err = Some(e);
                    }
                }
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every pooled client.
    pub async fn close(&self) -> Result<()> {
        let clients: Vec<(String, Arc<Client>)> = self.clients.lock().await.drain().collect();
        for (rpc_addr, client) in clients {
            if let Err(e) = client.close().await {
                debug!(addr = %rpc_addr, "rpc xclient: close: {}", e);
            }
        }
        Ok(())
    }

    /// Number of pooled clients.
    pub async fn pooled(&self) -> usize {
        self.clients.lock().await.len()
    }
}
