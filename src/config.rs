//! Agent and server configuration
//!
//! Values are resolved in layers, later ones winning: built-in defaults,
//! the JSON config file (`-c` or `CONFIG`), command line flags, and
//! finally environment variables.

use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use ipnet::IpNet;
use serde::{Deserialize, de::DeserializeOwned};
use tracing::trace;

use crate::agent::{AgentSettings, DEFAULT_QUEUE_CAPACITY};
use crate::api::PipelineConfig;
use crate::crypto::{PrivateKey, PublicKey};
use crate::util::{EnvLookup, env_parse, process_env};

const DEFAULT_ADDRESS: &str = "localhost:8080";

/// Command line of `metrics-server`
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "metrics-server", version, about = "Receives and stores pushed metrics")]
pub struct ServerArgs {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    pub address: Option<String>,

    /// Seconds between snapshot writes, 0 writes on every update
    #[arg(short = 'i', long)]
    pub store_interval: Option<u64>,

    /// Snapshot file, empty to disable
    #[arg(short = 'f', long)]
    pub store_file: Option<String>,

    /// Load the snapshot file on startup
    #[arg(short, long)]
    pub restore: Option<bool>,

    /// Database DSN, selects the relational store
    #[arg(short, long)]
    pub database_dsn: Option<String>,

    /// HMAC key for request signatures
    #[arg(short, long)]
    pub key: Option<String>,

    /// PEM private key for encrypted requests
    #[arg(long)]
    pub crypto_key: Option<PathBuf>,

    /// CIDR allowed to write metrics
    #[arg(short, long)]
    pub trusted_subnet: Option<String>,

    /// Address of the gRPC listener
    #[arg(short, long)]
    pub grpc_address: Option<String>,
}

/// Command line of `metrics-agent`
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "metrics-agent", version, about = "Collects host metrics and pushes them")]
pub struct AgentArgs {
    /// JSON config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server address
    #[arg(short, long)]
    pub address: Option<String>,

    /// Seconds between reports
    #[arg(short, long)]
    pub report_interval: Option<u64>,

    /// Seconds between polls
    #[arg(short, long)]
    pub poll_interval: Option<u64>,

    /// HMAC key for request signatures
    #[arg(short, long)]
    pub key: Option<String>,

    /// Number of concurrent senders
    #[arg(short = 'l', long)]
    pub rate_limit: Option<usize>,

    /// PEM public key of the server
    #[arg(long)]
    pub crypto_key: Option<PathBuf>,

    /// gRPC server address, replaces HTTP
    #[arg(short, long)]
    pub grpc_address: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub store_interval: u64,
    pub store_file: String,
    pub restore: bool,
    pub database_dsn: Option<String>,
    pub key: Option<String>,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<String>,
    pub grpc_address: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            store_interval: 300,
            store_file: "/tmp/metrics-db.json".to_string(),
            restore: true,
            database_dsn: None,
            key: None,
            crypto_key: None,
            trusted_subnet: None,
            grpc_address: None,
        }
    }
}

impl ServerConfig {
    pub fn resolve(args: &ServerArgs) -> anyhow::Result<Self> {
        Self::resolve_with(args, &process_env)
    }

    pub fn resolve_with(args: &ServerArgs, env: EnvLookup<'_>) -> anyhow::Result<Self> {
        let mut config: Self = load_layer(args.config.as_deref(), env)?;

        override_with(&mut config.address, args.address.clone());
        override_with(&mut config.store_interval, args.store_interval);
        override_with(&mut config.store_file, args.store_file.clone());
        override_with(&mut config.restore, args.restore);
        override_some(&mut config.database_dsn, args.database_dsn.clone());
        override_some(&mut config.key, args.key.clone());
        override_some(&mut config.crypto_key, args.crypto_key.clone());
        override_some(&mut config.trusted_subnet, args.trusted_subnet.clone());
        override_some(&mut config.grpc_address, args.grpc_address.clone());

        override_with(&mut config.address, env("ADDRESS"));
        override_with(&mut config.store_interval, env_parse(env, "STORE_INTERVAL")?);
        override_with(&mut config.store_file, env("FILE_STORAGE_PATH"));
        override_with(&mut config.restore, env_parse(env, "RESTORE")?);
        override_some(&mut config.database_dsn, env("DATABASE_DSN"));
        override_some(&mut config.key, env("KEY"));
        override_some(&mut config.crypto_key, env("CRYPTO_KEY").map(PathBuf::from));
        override_some(&mut config.trusted_subnet, env("TRUSTED_SUBNET"));
        override_some(&mut config.grpc_address, env("GRPC_ADDRESS"));

        config.validate()?;
        trace!("resolved server config: {config:?}");
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.address.is_empty() {
            bail!("server address must not be empty");
        }
        self.trusted_subnet()?;
        Ok(())
    }

    /// Bindable form of `address`; a bare `:port` listens on all interfaces.
    pub fn listen_address(&self) -> String {
        listen_address(&self.address)
    }

    pub fn grpc_listen_address(&self) -> Option<String> {
        self.grpc_address.as_deref().map(listen_address)
    }

    /// `None` when snapshots are disabled.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        (!self.store_file.is_empty()).then(|| PathBuf::from(&self.store_file))
    }

    /// Zero means every update is written through.
    pub fn store_interval(&self) -> Duration {
        Duration::from_secs(self.store_interval)
    }

    pub fn trusted_subnet(&self) -> anyhow::Result<Option<IpNet>> {
        self.trusted_subnet
            .as_deref()
            .map(|cidr| {
                cidr.trim()
                    .parse::<IpNet>()
                    .with_context(|| format!("invalid trusted subnet {cidr:?}"))
            })
            .transpose()
    }

    /// Load the key material the request pipeline needs.
    pub fn pipeline(&self) -> anyhow::Result<PipelineConfig> {
        let private_key = self
            .crypto_key
            .as_deref()
            .map(|path| {
                PrivateKey::from_file(path)
                    .with_context(|| format!("could not load private key {}", path.display()))
            })
            .transpose()?;

        Ok(PipelineConfig {
            signing_key: self.key.clone().map(String::into_bytes),
            private_key,
            trusted_subnet: self.trusted_subnet()?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub address: String,
    pub report_interval: u64,
    pub poll_interval: u64,
    pub key: Option<String>,
    pub rate_limit: usize,
    pub crypto_key: Option<PathBuf>,
    pub grpc_address: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            report_interval: 10,
            poll_interval: 2,
            key: None,
            rate_limit: 2,
            crypto_key: None,
            grpc_address: None,
        }
    }
}

impl AgentConfig {
    pub fn resolve(args: &AgentArgs) -> anyhow::Result<Self> {
        Self::resolve_with(args, &process_env)
    }

    pub fn resolve_with(args: &AgentArgs, env: EnvLookup<'_>) -> anyhow::Result<Self> {
        let mut config: Self = load_layer(args.config.as_deref(), env)?;

        override_with(&mut config.address, args.address.clone());
        override_with(&mut config.report_interval, args.report_interval);
        override_with(&mut config.poll_interval, args.poll_interval);
        override_some(&mut config.key, args.key.clone());
        override_with(&mut config.rate_limit, args.rate_limit);
        override_some(&mut config.crypto_key, args.crypto_key.clone());
        override_some(&mut config.grpc_address, args.grpc_address.clone());

        override_with(&mut config.address, env("ADDRESS"));
        override_with(&mut config.report_interval, env_parse(env, "REPORT_INTERVAL")?);
        override_with(&mut config.poll_interval, env_parse(env, "POLL_INTERVAL")?);
        override_some(&mut config.key, env("KEY"));
        override_with(&mut config.rate_limit, env_parse(env, "RATE_LIMIT")?);
        override_some(&mut config.crypto_key, env("CRYPTO_KEY").map(PathBuf::from));
        override_some(&mut config.grpc_address, env("GRPC_ADDRESS"));

        config.validate()?;
        trace!("resolved agent config: {config:?}");
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.address.is_empty() && self.grpc_address.is_none() {
            bail!("agent needs a server address");
        }
        if self.poll_interval == 0 || self.report_interval == 0 {
            bail!("poll and report intervals must be at least one second");
        }
        if self.rate_limit == 0 {
            bail!("rate limit must be at least 1");
        }
        Ok(())
    }

    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            poll_interval: Duration::from_secs(self.poll_interval),
            report_interval: Duration::from_secs(self.report_interval),
            rate_limit: self.rate_limit,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn public_key(&self) -> anyhow::Result<Option<PublicKey>> {
        self.crypto_key
            .as_deref()
            .map(|path| {
                PublicKey::from_file(path)
                    .with_context(|| format!("could not load public key {}", path.display()))
            })
            .transpose()
    }
}

pub fn read_config_file<T>(path: &Path) -> anyhow::Result<T>
where
    T: DeserializeOwned + Debug,
{
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("could not read config file {}", path.display()))?;
    serde_json::from_str(&file_content)
        .with_context(|| format!("invalid configuration file {}", path.display()))
        .inspect(|config| trace!("loaded config: {config:?}"))
}

fn load_layer<T>(flag: Option<&Path>, env: EnvLookup<'_>) -> anyhow::Result<T>
where
    T: DeserializeOwned + Debug + Default,
{
    let path = flag
        .map(Path::to_path_buf)
        .or_else(|| env("CONFIG").map(PathBuf::from));

    match path {
        Some(path) => read_config_file(&path),
        None => Ok(T::default()),
    }
}

fn listen_address(address: &str) -> String {
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn override_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}
