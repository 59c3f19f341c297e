//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment: `LGX_*` environment variables, plus a TOML file if one was
//! given. Sections:
//! - `[runtime]`: batch size, mirroring, shutdown deadline, observer queue depth
//! - `[sink_config.*]`: where documents are indexed (`Elasticsearch`), or `"Local"` /
//!   `"InMemory"` when they aren't
//! - `[fallback_config.*]`: where failed and mirrored lines go, stdout unless told otherwise

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::ElasticsearchConfig;
use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::fallback::FallbackConfig;

/// 📦 One struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub fallback_config: FallbackConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🚰 Where documents are supposed to end up.
#[derive(Debug, Deserialize, Clone, Default)]
pub enum SinkConfig {
    Elasticsearch(ElasticsearchConfig),
    /// 🪶 no index at all: plain lines to the fallback sink
    #[default]
    Local,
    /// 🧪 the scripted in-memory backend; accepts everything when driven from config
    InMemory,
}

/// 🎛️ Knobs for the pipeline itself, not for any one backend.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 📦 documents per flush, and the depth of the record channel
    #[serde(default = "default_bulk_size", alias = "buffer_limit")]
    pub bulk_size: usize,
    /// 🪞 also write every document's minimal line to the fallback sink at push time
    #[serde(default, alias = "stdout_log")]
    pub mirror_to_local_output: bool,
    #[serde(default = "default_flush_deadline_secs")]
    pub flush_deadline_secs: u64,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// 🏷️ only used when the sink isn't Elasticsearch (which carries its own)
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,
}

/// 🚧 Upper bound on `bulk_size`. The record channel reserves this many slots up front.
pub const MAX_BULK_SIZE: usize = 100_000;

fn default_bulk_size() -> usize {
    500
}

fn default_flush_deadline_secs() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_index_prefix() -> String {
    "lgx".to_string()
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bulk_size: default_bulk_size(),
            mirror_to_local_output: false,
            flush_deadline_secs: default_flush_deadline_secs(),
            event_capacity: default_event_capacity(),
            index_prefix: default_index_prefix(),
        }
    }
}

impl RuntimeConfig {
    pub fn flush_deadline(&self) -> Duration {
        Duration::from_secs(self.flush_deadline_secs)
    }
}

impl AppConfig {
    /// 🏷️ The prefix documents are indexed under, whichever sink is configured.
    pub fn index_prefix(&self) -> &str {
        match &self.sink_config {
            SinkConfig::Elasticsearch(es) => &es.index_prefix,
            SinkConfig::Local | SinkConfig::InMemory => &self.runtime.index_prefix,
        }
    }

    /// 🚧 Catch the configs that would parse fine and then go wrong later.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.runtime.bulk_size > 0,
            "💀 runtime.bulk_size is 0. A batch of nothing flushes forever and ships nothing. \
             Pick a positive number; 500 is the usual."
        );
        anyhow::ensure!(
            self.runtime.bulk_size <= MAX_BULK_SIZE,
            "💀 runtime.bulk_size is {}, over the {} ceiling. The channel and the buffer would try \
             to reserve all of that before the first line is read. Bulk bodies that big get \
             rejected by the cluster anyway.",
            self.runtime.bulk_size,
            MAX_BULK_SIZE
        );
        anyhow::ensure!(
            !self.index_prefix().trim().is_empty(),
            "💀 The index prefix is empty. Documents would land in '-2024-01-01', \
             which is not an index name anyone wants to explain."
        );
        Ok(())
    }
}

/// 🚀 Load the config: `LGX_*` env vars, plus the TOML file when one is given.
///
/// 📐 `None` means env vars only. `Some(path)` means env + file, with the file winning
/// on conflicts. Nested keys come from env with a double underscore, e.g.
/// `LGX_RUNTIME__BULK_SIZE=100`.
///
/// 💀 Errors if the result doesn't parse or doesn't [`validate`](AppConfig::validate).
pub fn load_config(config_file_name: Option<&Path>) -> Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("LGX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (LGX_*). \
             The file exists in our hearts, but apparently not in a shape serde recognizes.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (LGX_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config.validate()?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fallback::FileFallbackConfig;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_test_config(contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_everything_is_spelled_out() {
        let config_file = write_test_config(
            r#"
            [runtime]
            bulk_size = 50
            mirror_to_local_output = true
            flush_deadline_secs = 5

            [sink_config.Elasticsearch]
            url = "http://localhost:9200"
            index_prefix = "app-logs"
            api_key = "abc"
            compress_requests = true

            [fallback_config.File]
            file_name = "fallback.log"
            "#,
        );

        let app_config = load_config(Some(config_file.path()))
            .expect("💀 A complete config should parse. The schema drift goblin does not get this win.");

        assert_eq!(app_config.runtime.bulk_size, 50);
        assert!(app_config.runtime.mirror_to_local_output);
        assert_eq!(app_config.runtime.flush_deadline(), Duration::from_secs(5));
        assert_eq!(app_config.runtime.event_capacity, DEFAULT_EVENT_CAPACITY);
        assert_eq!(app_config.index_prefix(), "app-logs");
        match &app_config.sink_config {
            SinkConfig::Elasticsearch(es) => {
                assert_eq!(es.api_key.as_deref(), Some("abc"));
                assert!(es.compress_requests);
                assert_eq!(es.request_timeout_secs, 30);
            }
            honestly_who_knows => panic!(
                "💀 Expected an Elasticsearch sink, but serde took us to {honestly_who_knows:?}."
            ),
        }
        assert_eq!(
            app_config.fallback_config,
            FallbackConfig::File(FileFallbackConfig {
                file_name: "fallback.log".to_string()
            })
        );
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let config_file = write_test_config("");
        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(config_file.path()))
            .extract()
            .expect("💀 An empty config should fall back to defaults.");

        assert_eq!(app_config.runtime, RuntimeConfig::default());
        assert_eq!(app_config.runtime.bulk_size, 500);
        assert!(matches!(app_config.sink_config, SinkConfig::Local));
        assert_eq!(app_config.fallback_config, FallbackConfig::Stdout);
        assert!(app_config.validate().is_ok());
    }

    #[test]
    fn the_one_where_the_old_stage_names_still_work() {
        let config_file = write_test_config(
            r#"
            sink_config = "InMemory"

            [runtime]
            buffer_limit = 12
            stdout_log = true
            "#,
        );
        let app_config = load_config(Some(config_file.path()))
            .expect("💀 Runtime aliases should parse. The witness protection paperwork was valid.");

        assert_eq!(app_config.runtime.bulk_size, 12);
        assert!(app_config.runtime.mirror_to_local_output);
        assert!(matches!(app_config.sink_config, SinkConfig::InMemory));
    }

    #[test]
    fn the_one_where_a_zero_batch_is_turned_away() {
        let config_file = write_test_config("[runtime]\nbulk_size = 0\n");
        let err = load_config(Some(config_file.path())).expect_err("bulk_size 0 must not load");
        assert!(err.to_string().contains("bulk_size"));
    }

    #[test]
    fn the_one_where_an_absurd_batch_is_turned_away_before_anything_allocates() {
        let config_file = write_test_config("[runtime]\nbulk_size = 1152921504606846976\n");
        let err = load_config(Some(config_file.path())).expect_err("a huge bulk_size must not load");
        assert!(err.to_string().contains("ceiling"));

        let config_file = write_test_config(&format!("[runtime]\nbulk_size = {MAX_BULK_SIZE}\n"));
        assert!(load_config(Some(config_file.path())).is_ok());
    }

    #[test]
    fn the_one_where_the_index_prefix_is_blank() {
        let config_file = write_test_config(
            r#"
            [sink_config.Elasticsearch]
            url = "http://localhost:9200"
            index = "   "
            "#,
        );
        let err = load_config(Some(config_file.path())).expect_err("a blank prefix must not load");
        assert!(err.to_string().contains("index prefix"));
    }
}
