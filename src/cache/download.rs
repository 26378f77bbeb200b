//! Network client used by the cache on a miss
//!
//! The cache only ever reaches the network through the `Downloader` trait,
//! and only under `FetchPolicy::NetworkAllowed`.

use crate::config::schema::NetworkConfig;
use crate::error::{NodepackError, NodepackResult};
use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Fetches a locator's bytes into a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the body of `locator` to `dest`, returning the byte count
    async fn download(&self, locator: &str, dest: &Path) -> NodepackResult<u64>;
}

/// HTTP(S) downloader built on ureq
///
/// Connect and overall timeouts bound how long a dead network can block a
/// staging run; there is no retry.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    /// Build a downloader from network configuration
    pub fn new(config: &NetworkConfig) -> NodepackResult<Self> {
        let mut builder = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(config.connect_timeout_secs)))
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .user_agent(config.user_agent.as_str());

        if let Some(ref endpoint) = config.proxy {
            let proxy = ureq::Proxy::new(endpoint).map_err(|e| NodepackError::ConfigInvalid {
                path: "network.proxy".into(),
                reason: e.to_string(),
            })?;
            builder = builder.proxy(Some(proxy));
        }

        Ok(Self {
            agent: ureq::Agent::new_with_config(builder.build()),
        })
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, locator: &str, dest: &Path) -> NodepackResult<u64> {
        let agent = self.agent.clone();
        let url = locator.to_string();
        let dest = dest.to_path_buf();

        debug!("GET {}", url);
        tokio::task::spawn_blocking(move || -> NodepackResult<u64> {
            let mut response = agent
                .get(&url)
                .call()
                .map_err(|e| NodepackError::download(&url, e))?;

            let mut file = File::create(&dest)
                .map_err(|e| NodepackError::io(format!("creating {}", dest.display()), e))?;
            let mut body = response.body_mut().as_reader();
            let bytes = io::copy(&mut body, &mut file).map_err(|e| NodepackError::download(&url, e))?;
            file.sync_all()
                .map_err(|e| NodepackError::io(format!("flushing {}", dest.display()), e))?;

            Ok(bytes)
        })
        .await
        .map_err(|e| NodepackError::Internal(format!("download task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_defaults() {
        assert!(HttpDownloader::new(&NetworkConfig::default()).is_ok());
    }

    #[test]
    fn rejects_malformed_proxy() {
        let config = NetworkConfig {
            proxy: Some("::not a proxy::".to_string()),
            ..NetworkConfig::default()
        };
        let err = HttpDownloader::new(&config).unwrap_err();
        assert!(err.to_string().contains("network.proxy"));
    }

    #[tokio::test]
    async fn unreachable_host_fails_fast() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = NetworkConfig {
            connect_timeout_secs: 1,
            timeout_secs: 2,
            ..NetworkConfig::default()
        };
        let downloader = HttpDownloader::new(&config).unwrap();

        // Port 9 on localhost is discard; nothing listens in the test sandbox
        let result = downloader
            .download("http://127.0.0.1:9/node.tgz", &temp.path().join("out"))
            .await;
        assert!(matches!(result, Err(NodepackError::Download { .. })));
    }
}
