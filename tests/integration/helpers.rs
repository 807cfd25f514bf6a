//! Helper functions for integration tests

use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};

use metrics_relay::{
    api::{ApiConfig, ApiState, PipelineConfig, spawn_api_server},
    crypto::PrivateKey,
    storage::{StorageEngine, memory::MemoryStore},
};
use rsa::RsaPrivateKey;
use tokio_util::sync::CancellationToken;

/// A server listening on an ephemeral port; stops when dropped.
pub struct TestServer {
    pub addr: SocketAddr,
    pub storage: Arc<dyn StorageEngine>,
    cancel: CancellationToken,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// `host:port` form accepted by the transports.
    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub async fn spawn_server(pipeline: PipelineConfig) -> TestServer {
    spawn_server_with(Arc::new(MemoryStore::new()), pipeline).await
}

pub async fn spawn_server_with(
    storage: Arc<dyn StorageEngine>,
    pipeline: PipelineConfig,
) -> TestServer {
    let cancel = CancellationToken::new();
    let config = ApiConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        pipeline,
    };

    let (addr, _handle) = spawn_api_server(config, ApiState::new(storage.clone()), cancel.clone())
        .await
        .expect("failed to start API server");

    TestServer {
        addr,
        storage,
        cancel,
    }
}

/// One 1024-bit key per test binary.
pub fn test_key() -> PrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();
    KEY.get_or_init(|| RsaPrivateKey::new(&mut rand::thread_rng(), 1024).expect("keygen"))
        .clone()
        .into()
}

pub async fn stored_count(storage: &dyn StorageEngine) -> usize {
    storage.get_all_metrics().await.len()
}
