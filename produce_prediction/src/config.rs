use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub const ACCESS_KEY_VAR: &str = "AWS_ACCESS_KEY";
pub const SECRET_KEY_VAR: &str = "AWS_SECRET_KEY";
pub const REGION_VAR: &str = "AWS_REGION";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(deserialize_with = "deserialize_log_level")]
    pub log_level: LogLevel,
    pub storage: StorageConfig,
    pub preprocessing: PreprocessingConfig,
    pub model: ModelConfig,
}

fn deserialize_log_level<'de, D>(deserializer: D) -> Result<LogLevel, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    s.try_into().map_err(serde::de::Error::custom)
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn get_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub bucket: String,
    #[serde(default = "default_presign_expiry_secs")]
    pub presign_expiry_secs: u64,
    #[serde(default = "default_storage_timeout_secs")]
    pub timeout_secs: u64,
    /// S3-compatible endpoint (MinIO, LocalStack); AWS is used when unset.
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

fn default_presign_expiry_secs() -> u64 {
    3600
}

fn default_storage_timeout_secs() -> u64 {
    10
}

impl StorageConfig {
    pub fn presign_expiry(&self) -> Duration {
        Duration::from_secs(self.presign_expiry_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PreprocessingConfig {
    #[serde(default = "default_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_dimension")]
    pub target_width: u32,
    #[serde(default = "default_dimension")]
    pub target_height: u32,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_image_bytes")]
    pub max_image_bytes: usize,
}

fn default_dimension() -> u32 {
    100
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_image_bytes() -> usize {
    20 * 1024 * 1024
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_dimension(),
            target_width: default_dimension(),
            target_height: default_dimension(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_image_bytes: default_max_image_bytes(),
        }
    }
}

impl PreprocessingConfig {
    pub fn target_size(&self) -> (u32, u32) {
        (self.target_width, self.target_height)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub onnx_file: String,
    pub model_dir: PathBuf,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default)]
    pub labels_file: Option<PathBuf>,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("File not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key", &"***")
            .field("secret_key", &"***")
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum CredentialsError {
    #[error("Environment variable {0} is not set")]
    Missing(&'static str),
    #[error("Environment variable {0} is empty")]
    Empty(&'static str),
}

impl Credentials {
    pub fn from_env() -> Result<Self, CredentialsError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CredentialsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &'static str| -> Result<String, CredentialsError> {
            let value = lookup(name).ok_or(CredentialsError::Missing(name))?;
            let value = value.trim().to_string();
            if value.is_empty() {
                return Err(CredentialsError::Empty(name));
            }
            Ok(value)
        };

        Ok(Self {
            access_key: read(ACCESS_KEY_VAR)?,
            secret_key: read(SECRET_KEY_VAR)?,
            region: read(REGION_VAR)?,
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub enum LogLevel {
    Debug,
    Info,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
        }
    }
}

impl TryFrom<String> for LogLevel {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            other => Err(format!(
                "{} is not a supported minimum log level. Use either `debug` or `info`.",
                other
            )),
        }
    }
}

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let base_path = std::env::current_dir()
        .map_err(|e| config::ConfigError::Message(format!("current directory: {}", e)))?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let config = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let config = config.try_deserialize::<Config>()?;
    config
        .model
        .validate()
        .map_err(|e| config::ConfigError::Message(format!("model configuration: {}", e)))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_credentials_all_present() {
        let creds = Credentials::from_lookup(lookup_from(&[
            (ACCESS_KEY_VAR, "AKIA"),
            (SECRET_KEY_VAR, "secret"),
            (REGION_VAR, " us-east-1 "),
        ]))
        .unwrap();

        assert_eq!(creds.access_key, "AKIA");
        assert_eq!(creds.region, "us-east-1");
        assert!(!format!("{:?}", creds).contains("secret"));
    }

    #[test]
    fn test_credentials_missing_or_empty() {
        let missing = Credentials::from_lookup(lookup_from(&[
            (ACCESS_KEY_VAR, "AKIA"),
            (REGION_VAR, "us-east-1"),
        ]));
        assert_eq!(missing.unwrap_err(), CredentialsError::Missing(SECRET_KEY_VAR));

        let empty = Credentials::from_lookup(lookup_from(&[
            (ACCESS_KEY_VAR, "AKIA"),
            (SECRET_KEY_VAR, "secret"),
            (REGION_VAR, "  "),
        ]));
        assert_eq!(empty.unwrap_err(), CredentialsError::Empty(REGION_VAR));
    }

    #[test]
    fn test_log_level_and_environment_parsing() {
        assert!(matches!(LogLevel::try_from("DEBUG".to_string()), Ok(LogLevel::Debug)));
        assert!(LogLevel::try_from("trace".to_string()).is_err());
        assert!(matches!(
            Environment::try_from("Production".to_string()),
            Ok(Environment::Production)
        ));
    }

    #[test]
    fn test_base_configuration_deserializes() {
        let config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../configuration/base.yaml"),
                config::FileFormat::Yaml,
            ))
            .add_source(config::File::from_str(
                include_str!("../configuration/local.yaml"),
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<Config>()
            .unwrap();

        assert_eq!(config.server.get_address(), "127.0.0.1:3001");
        assert_eq!(config.storage.bucket, "frubucket");
        assert_eq!(config.storage.presign_expiry(), Duration::from_secs(3600));
        assert_eq!(config.preprocessing.target_size(), (100, 100));
        assert_eq!(config.model.num_instances, 1);
        assert!(config.model.labels_file.is_none());
        assert!(matches!(config.log_level, LogLevel::Debug));
        assert!(config.model.get_path().ends_with("cnn_model.onnx"));
    }

    #[test]
    fn test_missing_model_file_fails_validation() {
        let model = ModelConfig {
            onnx_file: "absent.onnx".to_string(),
            model_dir: PathBuf::from("/nonexistent/model"),
            num_instances: 1,
            labels_file: None,
        };

        let err = model.validate().unwrap_err();

        assert!(err.contains("absent.onnx"));
    }

    #[test]
    fn test_preprocessing_defaults() {
        let cfg = PreprocessingConfig::default();
        assert_eq!(cfg.target_size(), (100, 100));
        assert_eq!(cfg.max_dimension, 100);
    }
}
