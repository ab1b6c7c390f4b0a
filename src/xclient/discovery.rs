//! Server discovery and load-balancing selection.

use std::str::FromStr;

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{Result, RpcError};

/// How [`Discovery::get`] picks a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SelectMode {
    /// Uniformly random.
    #[default]
    Random,
    /// Cyclic over the current server list.
    RoundRobin,
}

impl TryFrom<u8> for SelectMode {
    type Error = RpcError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(SelectMode::Random),
            1 => Ok(SelectMode::RoundRobin),
            _ => Err(RpcError::Discovery("not supported select mode".to_string())),
        }
    }
}

impl FromStr for SelectMode {
    type Err = RpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "random" => Ok(SelectMode::Random),
            "roundrobin" | "round_robin" | "round-robin" => Ok(SelectMode::RoundRobin),
            _ => Err(RpcError::Discovery("not supported select mode".to_string())),
        }
    }
}

/// A changing set of `protocol@address` strings.
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Re-read the set from its source, if it has one.
    async fn refresh(&self) -> Result<()>;

    /// Replace the set.
    async fn update(&self, servers: Vec<String>) -> Result<()>;

    /// Pick one server.
    async fn get(&self, mode: SelectMode) -> Result<String>;

    /// All servers, as a copy.
    async fn get_all(&self) -> Result<Vec<String>>;
}

struct ServerSet {
    servers: Vec<String>,
    /// Round-robin position.
    index: usize,
    rng: StdRng,
}

/// Discovery over a list maintained by hand.
pub struct MultiServersDiscovery {
    state: Mutex<ServerSet>,
}

impl MultiServersDiscovery {
    /// Create a discovery over `servers`.
    ///
    /// The round-robin position starts at a random offset.
    pub fn new(servers: Vec<String>) -> Self {
        let mut rng = StdRng::from_entropy();
        let index = rng.gen_range(0..i32::MAX as usize);
        Self {
            state: Mutex::new(ServerSet {
                servers,
                index,
                rng,
            }),
        }
    }

    /// Replace the set without touching the round-robin position.
    pub fn set_servers(&self, servers: Vec<String>) {
        self.state.lock().servers = servers;
    }

    /// Copy of the current set.
    pub fn servers(&self) -> Vec<String> {
        self.state.lock().servers.clone()
    }

    /// Pick one server.
    pub fn select(&self, mode: SelectMode) -> Result<String> {
        let mut state = self.state.lock();
        let n = state.servers.len();
        if n == 0 {
            return Err(RpcError::Discovery("no available servers".to_string()));
        }

        match mode {
            SelectMode::Random => {
                let i = state.rng.gen_range(0..n);
                Ok(state.servers[i].clone())
            }
            SelectMode::RoundRobin => {
                let server = state.servers[state.index % n].clone();
                state.index = (state.index + 1) % n;
                Ok(server)
            }
        }
    }
}

impl Default for MultiServersDiscovery {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Discovery for MultiServersDiscovery {
    async fn refresh(&self) -> Result<()> {
        Ok(())
    }

    async fn update(&self, servers: Vec<String>) -> Result<()> {
        self.set_servers(servers);
        Ok(())
    }

    async fn get(&self, mode: SelectMode) -> Result<String> {
        self.select(mode)
    }

    async fn get_all(&self) -> Result<Vec<String>> {
        Ok(self.servers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addrs(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("tcp@127.0.0.1:{}", 9000 + i)).collect()
    }

    #[test]
    fn test_select_mode_parsing() {
        assert_eq!(SelectMode::try_from(0).unwrap(), SelectMode::Random);
        assert_eq!(SelectMode::try_from(1).unwrap(), SelectMode::RoundRobin);
        assert_eq!("RoundRobin".parse::<SelectMode>().unwrap(), SelectMode::RoundRobin);

        let err = SelectMode::try_from(7).unwrap_err();
        assert_eq!(err.to_string(), "rpc discovery: not supported select mode");
        assert!("fastest".parse::<SelectMode>().is_err());
    }

    #[tokio::test]
    async fn test_empty_set() {
        let d = MultiServersDiscovery::default();
        let err = d.get(SelectMode::Random).await.unwrap_err();
        assert_eq!(err.to_string(), "rpc discovery: no available servers");
        assert!(d.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_round_robin_is_cyclic() {
        let servers = addrs(3);
        let d = MultiServersDiscovery::new(servers.clone());

        let picks: Vec<String> = {
            let mut picks = Vec::new();
            for _ in 0..6 {
                picks.push(d.get(SelectMode::RoundRobin).await.unwrap());
            }
            picks
        };

        let start = servers.iter().position(|s| *s == picks[0]).unwrap();
        for (i, pick) in picks.iter().enumerate() {
            assert_eq!(*pick, servers[(start + i) % 3]);
        }
    }

    #[tokio::test]
    async fn test_random_single_server() {
        let d = MultiServersDiscovery::new(addrs(1));
        for _ in 0..10 {
            assert_eq!(d.get(SelectMode::Random).await.unwrap(), "tcp@127.0.0.1:9000");
        }
    }

    #[tokio::test]
    async fn test_update_and_get_all_copy() {
        let d = MultiServersDiscovery::new(addrs(2));
        let mut all = d.get_all().await.unwrap();
        all.clear();
        assert_eq!(d.get_all().await.unwrap().len(), 2);

        d.update(addrs(4)).await.unwrap();
        assert_eq!(d.get_all().await.unwrap(), addrs(4));
        d.refresh().await.unwrap();
    }
}
