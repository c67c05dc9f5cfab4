use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::language::Language;
use crate::sandbox::DEFAULT_OUTPUT_LIMIT;
use crate::verdict::Comparison;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
const DEFAULT_BIND_PORT: u16 = 3000;
const DEFAULT_COMPILE_TIME_LIMIT: Second = Second(30);

#[derive(Parser)]
#[command(name = "grader", version = "1.0", about, long_about = None)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(long = "config", short = 'c')]
    pub config_path: Option<String>,

    /// Address to listen on, overrides the configuration file
    #[arg(long = "bind")]
    pub bind_address: Option<String>,

    /// Port to listen on, overrides the configuration file
    #[arg(long = "port", short = 'p')]
    pub bind_port: Option<u16>,
}

impl CliArgs {
    /// Load the configuration from the specified file, then apply command line overrides
    pub fn to_config(&self) -> std::io::Result<Config> {
        let mut config = match &self.config_path {
            Some(path) => {
                let file = std::fs::File::open(path)?;
                let reader = std::io::BufReader::new(file);
                serde_json::from_reader(reader)?
            }
            None => Config::default(),
        };

        if let Some(address) = &self.bind_address {
            config.server.bind_address = Some(address.clone());
        }
        if let Some(port) = self.bind_port {
            config.server.bind_port = Some(port);
        }

        Ok(config)
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub sandbox: SandboxConfig,
    pub languages: Vec<LanguageConfig>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: Option<String>,
    pub bind_port: Option<u16>,
}

impl ServerConfig {
    pub fn address(&self) -> (String, u16) {
        (
            self.bind_address
                .clone()
                .unwrap_or(DEFAULT_BIND_ADDRESS.to_string()),
            self.bind_port.unwrap_or(DEFAULT_BIND_PORT),
        )
    }
}

#[derive(Deserialize, Debug)]
#[serde(default)]
pub struct SandboxConfig {
    /// Root under which every run gets its own ephemeral directory
    pub work_dir: Option<PathBuf>,
    pub compile_time_limit: Second,
    /// Bytes of stdout a program may write before it is stopped
    pub output_limit: u64,
    pub comparison: Comparison,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            work_dir: None,
            compile_time_limit: DEFAULT_COMPILE_TIME_LIMIT,
            output_limit: DEFAULT_OUTPUT_LIMIT,
            comparison: Comparison::default(),
        }
    }
}

impl SandboxConfig {
    /// Returns the configured work directory, or a `runs` directory in the user cache
    pub fn resolve_work_dir(&self) -> PathBuf {
        use directories::ProjectDirs;

        if let Some(dir) = &self.work_dir {
            return dir.clone();
        }

        match ProjectDirs::from("", "", "grader") {
            Some(proj_dirs) => proj_dirs.cache_dir().join("runs"),
            None => {
                let fallback = std::env::temp_dir().join("grader");
                log::warn!(
                    "Unable to find user cache directory, using {}",
                    fallback.display()
                );
                fallback
            }
        }
    }
}

/// Overrides the built-in toolchain of one language
///
/// Missing fields keep the built-in value. An empty `build` list removes the
/// build step.
#[derive(Deserialize, Debug, Clone)]
pub struct LanguageConfig {
    pub name: Language,
    #[serde(default)]
    pub build: Option<Vec<String>>,
    #[serde(default)]
    pub run: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Second(pub u64);

impl From<Second> for Duration {
    fn from(value: Second) -> Self {
        Duration::from_secs(value.0)
    }
}
