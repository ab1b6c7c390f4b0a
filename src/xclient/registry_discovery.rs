//! Discovery backed by a registry, refreshed lazily.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use super::discovery::{Discovery, MultiServersDiscovery, SelectMode};
use crate::error::Result;
use crate::registry::{HttpRegistry, RegistrySource};

/// Default time a fetched server list stays fresh.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Server set that re-polls its registry once the list is older than the
/// update interval.
pub struct RegistryDiscovery {
    servers: MultiServersDiscovery,
    source: Arc<dyn RegistrySource>,
    update_interval: Duration,
    /// Time of the last update or fetch attempt, failed or not. Held across
    /// the fetch so concurrent callers refresh once.
    last_update: tokio::sync::Mutex<Option<Instant>>,
}

impl RegistryDiscovery {
    /// Wrap `source`; a zero interval means [`DEFAULT_UPDATE_INTERVAL`].
    pub fn new(source: Arc<dyn RegistrySource>, update_interval: Duration) -> Self {
        let update_interval = if update_interval.is_zero() {
            DEFAULT_UPDATE_INTERVAL
        } else {
            update_interval
        };
        Self {
            servers: MultiServersDiscovery::default(),
            source,
            update_interval,
            last_update: tokio::sync::Mutex::new(None),
        }
    }

    /// Discovery over the HTTP registry at `url`.
    pub fn http(url: impl Into<String>, update_interval: Duration) -> Self {
        Self::new(Arc::new(HttpRegistry::new(url)), update_interval)
    }

    async fn refresh_or_keep_stale(&self) {
        if let Err(e) = self.refresh().await {
            warn!("rpc registry: refresh failed, keeping previous servers: {}", e);
        }
    }
}

#[async_trait]
impl Discovery for RegistryDiscovery {
    async fn refresh(&self) -> Result<()> {
        let mut last_update = self.last_update.lock().await;
        if let Some(at) = *last_update {
            if at.elapsed() < self.update_interval {
                return Ok(());
            }
        }

        debug!("rpc registry: refresh servers from registry");
        let fetched = self.source.fetch().await;
        *last_update = Some(Instant::now());
        self.servers.set_servers(fetched?);
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        let mut last_update = self.last_update.lock().await;
        self.servers.set_servers(servers);
        *last_update = Some(Instant::now());
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.refresh_or_keep_stale().await;
        self.servers.select(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        self.refresh_or_keep_stale().await;
        Ok(self.servers.servers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RpcError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[derive(Default)]
    struct FakeRegistry {
        fetches: AtomicUsize,
        failing: AtomicBool,
    }

    #[async_trait]
    impl RegistrySource for FakeRegistry {
        async fn fetch(&self) -> Result<Vec<String>> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(RpcError::Http("registry down".to_string()));
            }
            Ok(vec![format!("tcp@127.0.0.1:{}", 9000 + n)])
        }
    }

    #[tokio::test]
    async fn test_refresh_respects_interval() {
        let source = Arc::new(FakeRegistry::default());
        let d = RegistryDiscovery::new(source.clone(), Duration::from_secs(60));

        assert_eq!(d.get(SelectMode::Random).await.unwrap(), "tcp@127.0.0.1:9000");
        assert_eq!(d.get(SelectMode::Random).await.unwrap(), "tcp@127.0.0.1:9000");
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_interval() {
        let source = Arc::new(FakeRegistry::default());
        let d = RegistryDiscovery::new(source.clone(), Duration::from_millis(20));

        d.get_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(d.get_all().await.unwrap(), vec!["tcp@127.0.0.1:9001"]);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_stale_set() {
        let source = Arc::new(FakeRegistry::default());
        let d = RegistryDiscovery::new(source.clone(), Duration::from_millis(10));

        d.get_all().await.unwrap();
        source.failing.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(d.refresh().await.is_err());
        assert_eq!(d.get(SelectMode::RoundRobin).await.unwrap(), "tcp@127.0.0.1:9000");
    }

    #[tokio::test]
    async fn test_failed_refresh_waits_for_interval() {
        let source = Arc::new(FakeRegistry::default());
        source.failing.store(true, Ordering::SeqCst);
        let d = RegistryDiscovery::new(source.clone(), Duration::from_secs(60));

        for _ in 0..5 {
            assert!(d.get(SelectMode::Random).await.is_err());
        }
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_hung_registry_serves_stale_set() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/_tinyrpc_/registry", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });

        let registry = HttpRegistry::with_timeout(url, Duration::from_millis(100));
        let d = RegistryDiscovery::new(Arc::new(registry), Duration::from_millis(10));
        d.update(vec!["tcp@127.0.0.1:1".to_string()]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let picked = tokio::time::timeout(Duration::from_secs(3), d.get(SelectMode::Random))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(picked, "tcp@127.0.0.1:1");
    }

    #[tokio::test]
    async fn test_update_stamps_time() {
        let source = Arc::new(FakeRegistry::default());
        let d = RegistryDiscovery::new(source.clone(), Duration::from_secs(60));

        d.update(vec!["unix@/tmp/x.sock".to_string()]).await.unwrap();
        assert_eq!(d.get_all().await.unwrap(), vec!["unix@/tmp/x.sock"]);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_registry_has_no_servers() {
        let source = Arc::new(FakeRegistry::default());
        source.failing.store(true, Ordering::SeqCst);
        let d = RegistryDiscovery::new(source, Duration::ZERO);

        let err = d.get(SelectMode::Random).await.unwrap_err();
        assert_eq!(err.to_string(), "rpc discovery: no available servers");
    }
}
