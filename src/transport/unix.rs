//! Unix domain socket listener.
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> tinyrpc::Result<()> {
//! use tinyrpc::transport::{generate_socket_path, UnixSocketListener};
//!
//! let listener = UnixSocketListener::bind(&generate_socket_path())?;
//! let stream = listener.accept().await?;
//! # drop(stream);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use rand::Rng;
use tokio::net::{UnixListener, UnixStream};

use crate::error::Result;

/// Generate a unique socket path for this process.
///
/// Format: `{tmp}/tinyrpc-{pid}-{random}.sock`
pub fn generate_socket_path() -> String {
    let pid = std::process::id();
    let suffix: u64 = rand::thread_rng().gen();
    std::env::temp_dir()
        .join(format!("tinyrpc-{}-{:x}.sock", pid, suffix))
        .to_string_lossy()
        .into_owned()
}

/// Unix domain socket listener that removes its socket file on drop.
pub struct UnixSocketListener {
    listener: UnixListener,
    path: String,
}

impl UnixSocketListener {
    /// Bind to a socket path.
    ///
    /// Removes any stale socket file at the path before binding.
    pub fn bind(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            std::fs::remove_file(path)?;
        }

        let listener = UnixListener::bind(path)?;

        Ok(Self {
            listener,
            path: path.to_string(),
        })
    }

    /// Accept one connection.
    pub async fn accept(&self) -> Result<UnixStream> {
        let (stream, _addr) = self.listener.accept().await?;
        Ok(stream)
    }

    /// Socket path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// `unix@path` address for discovery.
    pub fn rpc_addr(&self) -> String {
        format!("unix@{}", self.path)
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_socket_path_format() {
        let path = generate_socket_path();
        let pid = std::process::id().to_string();

        assert!(path.contains("tinyrpc-"));
        assert!(path.contains(&pid));
        assert!(path.ends_with(".sock"));
    }

    #[test]
    fn test_generate_socket_path_uniqueness() {
        let paths: std::collections::HashSet<String> =
            (0..10).map(|_| generate_socket_path()).collect();
        assert_eq!(paths.len(), 10);
    }

    #[tokio::test]
    async fn test_bind_replaces_stale_file_and_cleans_up() {
        let path = generate_socket_path();
        std::fs::write(&path, b"stale").unwrap();

        let listener = UnixSocketListener::bind(&path).unwrap();
        assert_eq!(listener.rpc_addr(), format!("unix@{}", path));

        let connect = UnixStream::connect(&path);
        let (accepted, connected) = tokio::join!(listener.accept(), connect);
        accepted.unwrap();
        connected.unwrap();

        drop(listener);
        assert!(!Path::new(&path).exists());
    }
}
