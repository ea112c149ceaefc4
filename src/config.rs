use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::content_types;

pub const DEFAULT_PROGRAM: &str = "inference.py";
pub const DEFAULT_BASE_DIR: &str = "/opt/ml";

/// Read-only snapshot of the serving environment.
///
/// Built once, either from the process environment, a TOML file or the defaults, and
/// then handed to the [`Transformer`](crate::transformer::Transformer).
#[derive(Parser, Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[command(name = env!("CARGO_PKG_NAME"))]
#[serde(default)]
pub struct Environment {
    /// Script or module holding the user's handler functions
    #[arg(long, env = "SAGEMAKER_PROGRAM", default_value = DEFAULT_PROGRAM)]
    pub program: String,

    /// Seconds before an unresponsive model server worker is restarted
    #[arg(long, env = "SAGEMAKER_MODEL_SERVER_TIMEOUT", default_value = "60")]
    pub model_server_timeout: u64,

    /// Number of model server workers
    #[arg(long, env = "SAGEMAKER_MODEL_SERVER_WORKERS")]
    pub model_server_workers: Option<usize>,

    /// Response content type used when a request carries no usable Accept header
    #[arg(long, env = "SAGEMAKER_DEFAULT_INVOCATIONS_ACCEPT", default_value = content_types::JSON)]
    pub default_accept: String,

    /// Port for invocations and pings
    #[arg(long, env = "SAGEMAKER_BIND_TO_PORT", default_value = "8080")]
    pub inference_http_port: u16,

    /// Port for model management requests
    #[arg(long, env = "SAGEMAKER_BIND_TO_PORT", default_value = "8080")]
    pub management_http_port: u16,

    /// Port range reserved for user processes, e.g. 1111-2222
    #[arg(long, env = "SAGEMAKER_SAFE_PORT_RANGE")]
    pub safe_port_range: Option<String>,

    #[arg(long, env = "SAGEMAKER_BASE_DIR", default_value = DEFAULT_BASE_DIR)]
    pub base_dir: PathBuf,

    /// Serve several models from the models directory; only the value `true` enables it
    #[arg(
        long,
        env = "SAGEMAKER_MULTI_MODEL",
        default_value = "false",
        action = clap::ArgAction::Set,
        value_parser = parse_multi_model
    )]
    pub multi_model: bool,

    /// Container log level, numeric (10..50) or by name
    #[arg(long, env = "SAGEMAKER_CONTAINER_LOG_LEVEL")]
    pub log_level: Option<String>,
}

fn parse_multi_model(value: &str) -> Result<bool, std::convert::Infallible> {
    Ok(value == "true")
}

impl Default for Environment {
    fn default() -> Self {
        Environment {
            program: DEFAULT_PROGRAM.to_string(),
            model_server_timeout: 60,
            model_server_workers: None,
            default_accept: content_types::JSON.to_string(),
            inference_http_port: 8080,
            management_http_port: 8080,
            safe_port_range: None,
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            multi_model: false,
            log_level: None,
        }
    }
}

impl Environment {
    /// Reads the snapshot from environment variables only; command line arguments are
    /// not consulted.
    pub fn from_env() -> Result<Self> {
        Environment::try_parse_from([env!("CARGO_PKG_NAME")])
            .context("Failed to read the serving environment")
    }

    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = toml::from_str(&str)?;
        Ok(config)
    }

    /// Name the user module is registered under: the program without a `.py` suffix.
    pub fn module_name(&self) -> &str {
        self.program
            .strip_suffix(".py")
            .unwrap_or(&self.program)
    }

    pub fn model_dir(&self) -> PathBuf {
        if self.multi_model {
            self.base_dir.join("models")
        } else {
            self.base_dir.join("model")
        }
    }

    pub fn code_dir(&self) -> PathBuf {
        self.model_dir().join("code")
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn module_name_drops_script_suffix() {
        let env = Environment::default();
        assert_eq!(env.module_name(), "inference");

        let env = Environment {
            program: "serve".into(),
            ..Default::default()
        };
        assert_eq!(env.module_name(), "serve");
    }

    #[test]
    fn directories_follow_model_mode() {
        let mut env = Environment::default();
        assert_eq!(env.model_dir(), PathBuf::from("/opt/ml/model"));
        assert_eq!(env.code_dir(), PathBuf::from("/opt/ml/model/code"));

        env.multi_model = true;
        assert_eq!(env.model_dir(), PathBuf::from("/opt/ml/models"));
    }

    #[test]
    fn arguments_override_defaults() {
        let env = Environment::try_parse_from([
            "inference_toolkit",
            "--default-accept",
            "text/csv",
            "--model-server-timeout",
            "120",
        ])
        .unwrap();
        assert_eq!(env.default_accept, "text/csv");
        assert_eq!(env.model_server_timeout, 120);
    }

    #[test]
    fn only_true_enables_multi_model() {
        for (value, expected) in [("true", true), ("True", false), ("1", false), ("yes", false)] {
            let env =
                Environment::try_parse_from(["inference_toolkit", "--multi-model", value]).unwrap();
            assert_eq!(env.multi_model, expected, "{value:?}");
        }
        let env = Environment::try_parse_from(["inference_toolkit"]).unwrap();
        assert!(!env.multi_model);
    }

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "program = \"handler.py\"\nmulti_model = true").unwrap();

        let env = Environment::from_toml(file.path()).unwrap();
        assert_eq!(env.module_name(), "handler");
        assert!(env.multi_model);
        assert_eq!(env.default_accept, content_types::JSON);
        assert_eq!(env.inference_http_port, 8080);
    }

    #[test]
    fn missing_toml_is_an_error() {
        assert!(Environment::from_toml("/nonexistent/toolkit.toml").is_err());
    }
}
