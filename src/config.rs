use crate::errors::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONVERTED_SERVICE_NAME: &str = "Converted Deal";
const DEFAULT_CURRENCY: &str = "USD";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const MAX_BUSY_TIMEOUT_MS: u64 = 120_000;

/// What to do when a service draft carries no usable main package reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DefaultPackagePolicy {
    /// Substitute the oldest active main package.
    #[default]
    Fallback,
    /// Reject the draft.
    Fail,
    /// Store the service without a package reference.
    AllowNull,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct LoggingConfig {
    pub directory: Option<PathBuf>,
    pub file_name: String,
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_name: "lifecycle.log".to_string(),
            filter: "info".to_string(),
            json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct LifecycleConfig {
    pub database_path: PathBuf,
    pub default_package_policy: DefaultPackagePolicy,
    pub converted_service_name: String,
    pub default_currency: String,
    pub busy_timeout_ms: u64,
    pub logging: LoggingConfig,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("data/agency.db"),
            default_package_policy: DefaultPackagePolicy::default(),
            converted_service_name: DEFAULT_CONVERTED_SERVICE_NAME.to_string(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            logging: LoggingConfig::default(),
        }
    }
}

impl LifecycleConfig {
    pub fn load(path: &Path) -> AppResult<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> AppResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.converted_service_name.trim().is_empty() {
            return Err(AppError::Validation(
                "converted_service_name must not be empty".to_string(),
            ));
        }
        if !crate::validation::is_currency_code(&self.default_currency) {
            return Err(AppError::Validation(format!(
                "default_currency '{}' is not an ISO 4217 code",
                self.default_currency
            )));
        }
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(AppError::Validation(format!(
                "busy_timeout_ms must be at most {}",
                MAX_BUSY_TIMEOUT_MS
            )));
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}
