// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for Courier.
//!
//! TOML files merged with `COURIER_*` environment variables, strict
//! `deny_unknown_fields` parsing, and miette diagnostics with typo
//! suggestions.
//!
//! ```no_run
//! let config = courier_config::load_and_validate(None).expect("config errors");
//! println!("channels: {}", config.channels.len());
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_str};
pub use model::{
    ChannelConfig, CourierConfig, EmailChannelConfig, ListenerConfig, MailServiceConfig,
    TelegramChannelConfig, WhatsAppChannelConfig,
};

/// Load configuration from `path` (or the default lookup) and validate it.
pub fn load_and_validate(path: Option<&Path>) -> Result<CourierConfig, Vec<ConfigError>> {
    match loader::load_config(path) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = collect_toml_sources(path);
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Parse and validate a TOML string.
pub fn load_and_validate_str(toml_content: &str) -> Result<CourierConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// File contents used to attach source spans to diagnostics.
fn collect_toml_sources(path: Option<&Path>) -> Vec<(String, String)> {
    let candidates = match path {
        Some(p) => vec![p.to_path_buf()],
        None => loader::default_config_paths(),
    };
    candidates
        .into_iter()
        .filter_map(|p| {
            let content = std::fs::read_to_string(&p).ok()?;
            let name = std::fs::canonicalize(&p)
                .unwrap_or(p)
                .display()
                .to_string();
            Some((name, content))
        })
        .collect()
}
