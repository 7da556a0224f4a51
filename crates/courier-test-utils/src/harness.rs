// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A temp-dir SQLite store with a matching configuration.

use std::sync::Arc;

use courier_config::model::StorageConfig;
use courier_config::{ChannelConfig, CourierConfig};
use courier_core::CourierError;
use courier_storage::SqliteStore;

/// Builder for [`TestHarness`].
pub struct TestHarnessBuilder {
    channels: Vec<ChannelConfig>,
    link_prefix: Option<String>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            channels: Vec::new(),
            link_prefix: None,
        }
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn with_link_prefix(mut self, prefix: &str) -> Self {
        self.link_prefix = Some(prefix.to_string());
        self
    }

    pub async fn build(self) -> Result<TestHarness, CourierError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| CourierError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("test.db").to_string_lossy().to_string();

        let mut config = CourierConfig {
            storage: StorageConfig {
                database_path: db_path,
            },
            channels: self.channels,
            ..CourierConfig::default()
        };
        if let Some(prefix) = self.link_prefix {
            config.inline_images.link_prefix = prefix;
        }

        let store = Arc::new(SqliteStore::open(&config.storage).await?);
        Ok(TestHarness {
            store,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// Store and config for one test. The database is deleted on drop.
pub struct TestHarness {
    pub store: Arc<SqliteStore>,
    pub config: CourierConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with no channels.
    pub async fn new() -> Result<Self, CourierError> {
        Self::builder().build().await
    }

    pub fn channel(&self, id: &str) -> &ChannelConfig {
        self.config
            .channel(id)
            .unwrap_or_else(|| panic!("harness has no channel `{id}`"))
    }
}
