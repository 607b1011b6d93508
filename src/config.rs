use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data".into()
}

/// Series-construction thresholds. These are tunable rather than hard-coded;
/// the defaults match what the pipeline was validated against.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Fraction of rows whose time column may fail to parse before the
    /// upload is rejected outright.
    #[serde(default = "default_max_unparseable")]
    pub max_unparseable_fraction: f64,
    /// Minimum observations remaining after cleaning.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// Longest run of consecutive missing grid slots that interpolation
    /// may bridge.
    #[serde(default = "default_max_gap_run")]
    pub max_gap_run: usize,
    /// Rows included in the upload preview.
    #[serde(default = "default_preview_rows")]
    pub preview_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_unparseable_fraction: default_max_unparseable(),
            min_observations: default_min_observations(),
            max_gap_run: default_max_gap_run(),
            preview_rows: default_preview_rows(),
        }
    }
}

fn default_max_unparseable() -> f64 {
    0.05
}
fn default_min_observations() -> usize {
    10
}
fn default_max_gap_run() -> usize {
    5
}
fn default_preview_rows() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Backstop poll interval; workers are normally woken by a notify.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_store_retries")]
    pub store_retry_attempts: u32,
    #[serde(default = "default_store_backoff")]
    pub store_retry_backoff_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            poll_interval_secs: default_poll_interval(),
            store_retry_attempts: default_store_retries(),
            store_retry_backoff_ms: default_store_backoff(),
        }
    }
}

fn default_worker_count() -> usize {
    2
}
fn default_poll_interval() -> u64 {
    5
}
fn default_store_retries() -> u32 {
    3
}
fn default_store_backoff() -> u64 {
    500
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::with_prefix("AUTOCAST").separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        Ok(app_config)
    }
}
