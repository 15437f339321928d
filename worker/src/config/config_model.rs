use backend::config::config_model::DotEnvyConfig as BackendConfig;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    /// The worker publishes through the same use case as the cron route, so it needs the full backend config.
    pub backend: BackendConfig,
    pub publish_loop: PublishLoop,
}

#[derive(Debug, Clone)]
pub struct PublishLoop {
    pub interval_secs: u64,
}
