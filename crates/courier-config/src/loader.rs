// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Lookup order when no explicit path is given: `./courier.toml`, then
//! `~/.config/courier/courier.toml`. `COURIER_*` environment variables
//! override file values.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CourierConfig;

/// Candidate config files, most specific first.
pub fn default_config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("courier.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("courier").join("courier.toml"));
    }
    paths
}

/// Build the Figment for `path`, or for the default lookup when `None`.
pub fn build_figment(path: Option<&Path>) -> Figment {
    let figment = Figment::new().merge(Serialized::defaults(CourierConfig::default()));
    let figment = match path {
        Some(path) => figment.merge(Toml::file(path)),
        None => default_config_paths()
            .into_iter()
            .rev()
            .fold(figment, |f, p| f.merge(Toml::file(p))),
    };
    figment.merge(env_provider())
}

/// Load configuration from `path` (or the default lookup) with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<CourierConfig, figment::Error> {
    build_figment(path).extract()
}

/// Load configuration from a TOML string only. Used by tests.
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Environment provider mapping `COURIER_<SECTION>_<KEY>` to `section.key`.
///
/// Uses explicit prefixes rather than splitting on `_` because keys such as
/// `idle_timeout_secs` contain underscores themselves.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| {
        let key_str = key.as_str();
        let mapped = ["inline_images", "listener", "storage", "log"]
            .iter()
            .find_map(|section| {
                key_str
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('_'))
                    .map(|rest| format!("{section}.{rest}"))
            })
            .unwrap_or_else(|| key_str.to_string());
        mapped.into()
    })
}
