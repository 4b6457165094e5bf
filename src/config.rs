use serde::Deserialize;

/// Top-level settings, loaded via the `config` crate from (in increasing
/// priority) a bundled default, an optional `kecs.toml` in the working
/// directory, and `KECS_`-prefixed environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub aws: AwsSettings,
    pub database: DatabaseSettings,
    pub k3d: K3dSettings,
    pub reconciler: ReconcilerSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// The region/account pair stamped into every ARN this process mints.
/// There is no real AWS account behind this; it's a fixed identity the
/// emulator presents to clients (spec.md §3).
#[derive(Debug, Clone, Deserialize)]
pub struct AwsSettings {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_account_id")]
    pub account_id: String,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_account_id() -> String {
    "000000000000".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// k3d cluster provisioning knobs (spec.md §4.2).
#[derive(Debug, Clone, Deserialize)]
pub struct K3dSettings {
    #[serde(default = "default_kubeconfig_dir")]
    pub kubeconfig_dir: String,
    #[serde(default = "default_server_count")]
    pub server_count: u32,
    #[serde(default = "default_agent_count")]
    pub agent_count: u32,
}

fn default_kubeconfig_dir() -> String {
    "/tmp/kecs/kubeconfig".to_string()
}

fn default_server_count() -> u32 {
    1
}

fn default_agent_count() -> u32 {
    0
}

/// Reconciler worker-pool and batch-updater tuning, per spec.md §4.3/§9.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerSettings {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    #[serde(default = "default_max_requeues")]
    pub max_requeues: u32,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_worker_count() -> usize {
    4
}

fn default_flush_interval_secs() -> u64 {
    2
}

fn default_flush_threshold() -> usize {
    50
}

fn default_max_requeues() -> u32 {
    15
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Settings {
    pub fn load() -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .set_default("server.bind_addr", default_bind_addr())?
            .set_default("aws.region", default_region())?
            .set_default("aws.account_id", default_account_id())?
            .set_default("database.max_connections", default_max_connections())?
            .set_default("k3d.kubeconfig_dir", default_kubeconfig_dir())?
            .set_default("k3d.server_count", default_server_count())?
            .set_default("k3d.agent_count", default_agent_count())?
            .set_default("reconciler.worker_count", default_worker_count() as i64)?
            .set_default("reconciler.flush_interval_secs", default_flush_interval_secs())?
            .set_default("reconciler.flush_threshold", default_flush_threshold() as i64)?
            .set_default("reconciler.max_requeues", default_max_requeues())?
            .set_default("reconciler.shutdown_grace_secs", default_shutdown_grace_secs())?
            .add_source(config::File::with_name("kecs").required(false))
            .add_source(config::Environment::with_prefix("KECS").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_missing_env() {
        std::env::remove_var("KECS_DATABASE__URL");
        std::env::set_var("KECS_DATABASE__URL", "postgres://localhost/kecs_test");
        let settings = Settings::load().expect("settings load with only database.url set");
        assert_eq!(settings.aws.region, "us-east-1");
        assert_eq!(settings.reconciler.worker_count, 4);
        std::env::remove_var("KECS_DATABASE__URL");
    }
}
