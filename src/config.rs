use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, path::PathBuf, time::Duration};

use crate::{Error, InternalResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Where the persisted state document lives. None disables persistence.
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Top-level regions that never persist and reinitialize each boot.
    #[serde(default = "default_ephemeral_regions")]
    pub ephemeral_regions: Vec<String>,

    /// Store path the lifecycle controller commits route parameters to.
    #[serde(default = "default_route_params_path")]
    pub route_params_path: String,

    /// Artificial latency of the mock orchestrator.
    #[serde(default = "default_mock_agent_delay", with = "duration_ms")]
    pub mock_agent_delay: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            state_path: None,
            ephemeral_regions: default_ephemeral_regions(),
            route_params_path: default_route_params_path(),
            mock_agent_delay: default_mock_agent_delay(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_file(path: &str) -> InternalResult<Self> {
        from_file(path)
    }
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

fn default_ephemeral_regions() -> Vec<String> {
    ["ui", "logs", "notifications", "draftIntake"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_route_params_path() -> String {
    "ui.route.params".to_string()
}

fn default_mock_agent_delay() -> Duration {
    Duration::from_millis(1500)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
