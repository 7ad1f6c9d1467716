//! User configuration.

use std::{
   io,
   path::{
      Path,
      PathBuf,
   },
};

use arcstr::ArcStr;

use crate::{
   DEFAULT_TRACE_SIZE,
   Error,
   Result,
   thunk::Platform,
};

fn default_cache_dir() -> PathBuf {
   dirs::cache_dir()
      .unwrap_or_else(std::env::temp_dir)
      .join("bass")
}

fn default_trace_size() -> usize {
   DEFAULT_TRACE_SIZE
}

fn default_runtimes() -> Vec<RuntimeConfig> {
   vec![RuntimeConfig {
      platform: Platform::host(),
      driver:   arcstr::literal!("local"),
      config:   serde_json::Value::Null,
   }]
}

/// A driver to run thunks for a platform with.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RuntimeConfig {
   pub platform: Platform,
   pub driver:   ArcStr,

   /// Passed to the driver as is.
   #[serde(default)]
   pub config: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
   #[serde(default = "default_cache_dir")]
   pub cache_dir: PathBuf,

   #[serde(default = "default_runtimes")]
   pub runtimes: Vec<RuntimeConfig>,

   #[serde(default = "default_trace_size")]
   pub trace_size: usize,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         cache_dir:  default_cache_dir(),
         runtimes:   default_runtimes(),
         trace_size: default_trace_size(),
      }
   }
}

impl Config {
   /// Where the config is read from when no path is given.
   #[must_use]
   pub fn default_path() -> Option<PathBuf> {
      dirs::config_dir().map(|dir| dir.join("bass").join("config.toml"))
   }

   pub fn from_toml(text: &str) -> Result<Self> {
      toml::from_str(text).map_err(|error| Error::message(format!("invalid config: {error}")))
   }

   /// Loads the config at the path. A missing file is the default config.
   pub async fn load(path: &Path) -> Result<Self> {
      match tokio::fs::read_to_string(path).await {
         Ok(text) => {
            tracing::debug!("Loading config from '{path}'.", path = path.display());
            Self::from_toml(&text)
         },

         Err(error) if error.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(
               "No config at '{path}', using the default.",
               path = path.display(),
            );
            Ok(Self::default())
         },

         Err(error) => Err(error.into()),
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn empty_is_default() {
      assert_eq!(Config::from_toml("").unwrap(), Config::default());
      assert_eq!(Config::default().runtimes[0].driver, "local");
      assert_eq!(Config::default().trace_size, DEFAULT_TRACE_SIZE);
   }

   #[test]
   fn runtimes() {
      let config = Config::from_toml(
         r#"
            cache-dir  = "/tmp/bass"
            trace-size = 10

            [[runtimes]]
            platform = { os = "linux", arch = "arm64" }
            driver   = "local"
            config   = { cache-dir = "/tmp/local" }
         "#,
      )
      .unwrap();

      assert_eq!(config.cache_dir, PathBuf::from("/tmp/bass"));
      assert_eq!(config.trace_size, 10);
      assert_eq!(config.runtimes[0].platform, Platform::new("linux", "arm64"));
      assert_eq!(
         config.runtimes[0].config,
         serde_json::json!({ "cache-dir": "/tmp/local" })
      );
   }

   #[test]
   fn invalid() {
      assert!(Config::from_toml("trace-size = \"big\"").is_err());
   }

   #[tokio::test]
   async fn missing_files() {
      let config = Config::load(Path::new("/nonexistent/bass/config.toml"))
         .await
         .unwrap();

      assert_eq!(config, Config::default());
   }
}
