use anyhow::{Context, Result, bail};
use backend::config::config_loader as backend_loader;

use super::config_model::{DotEnvyConfig, PublishLoop};

pub const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 60;

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend = backend_loader::load()?;
    let interval_secs = publish_interval(std::env::var("PUBLISH_INTERVAL_SECONDS").ok())?;

    Ok(DotEnvyConfig {
        backend,
        publish_loop: PublishLoop { interval_secs },
    })
}

fn publish_interval(raw: Option<String>) -> Result<u64> {
    let Some(raw) = raw.map(|value| value.trim().to_string()).filter(|v| !v.is_empty()) else {
        return Ok(DEFAULT_PUBLISH_INTERVAL_SECS);
    };

    let secs: u64 = raw
        .parse()
        .with_context(|| format!("PUBLISH_INTERVAL_SECONDS is invalid: {:?}", raw))?;
    if secs == 0 {
        bail!("PUBLISH_INTERVAL_SECONDS must be greater than zero");
    }
    Ok(secs)
}
