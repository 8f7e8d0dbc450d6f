// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    client::{client::RtrClientParams, session::SessionConfig},
    models::common::ProtocolVersion,
};

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Config {
    /// Connection to the RPKI validation cache.
    pub cache: CacheConfig,
    /// Crypto provider selection, key vault location and loader hooks.
    #[serde(default)]
    pub crypto: CryptoConfig,
}

/// Parameters of the RTR session towards a validation cache.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct CacheConfig {
    #[serde(rename = "Host")]
    pub host: String,

    #[serde(rename = "Port", default = "default_rtr_port")]
    pub port: u16,

    /// Initial protocol version offered during the handshake (0..=2).
    #[serde(rename = "ProtocolVersion", default = "default_protocol_version")]
    pub protocol_version: u8,

    /// Accept a lower version when the cache insists during startup.
    #[serde(rename = "AllowDowngrade", default = "default_true")]
    pub allow_downgrade: bool,

    /// Close the session after the first complete synchronization.
    #[serde(rename = "StopAfterEndOfData", default)]
    pub stop_after_end_of_data: bool,

    /// Identifier passed through to the upstream callbacks.
    #[serde(rename = "ClientID", default = "default_client_id")]
    pub client_id: u32,
}

/// Configuration recognized by the crypto provider loader.
///
/// The `library_name` selects one of the built-in capability objects;
/// the `method_*` entry points of the original dynamic loader are
/// accepted for compatibility and recorded but not needed to resolve a
/// built-in provider.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct CryptoConfig {
    #[serde(default)]
    pub library_name: String,
    #[serde(default)]
    pub library_conf: String,
    #[serde(default)]
    pub method_init: String,
    #[serde(default)]
    pub method_release: String,
    #[serde(default)]
    pub method_sign: String,
    #[serde(default)]
    pub method_validate: String,
    #[serde(rename = "method_registerPublicKey", default)]
    pub method_register_public_key: String,
    #[serde(rename = "method_unregisterPublicKey", default)]
    pub method_unregister_public_key: String,
    #[serde(rename = "method_registerPrivateKey", default)]
    pub method_register_private_key: String,
    #[serde(rename = "method_unregisterPrivateKey", default)]
    pub method_unregister_private_key: String,
    #[serde(rename = "method_freeHashMessage", default)]
    pub method_free_hash_message: String,
    #[serde(rename = "method_freeSignature", default)]
    pub method_free_signature: String,
    #[serde(rename = "method_getDebugLevel", default)]
    pub method_get_debug_level: String,
    #[serde(rename = "method_setDebugLevel", default)]
    pub method_set_debug_level: String,
    #[serde(default)]
    pub init_value: String,

    /// Key vault directory.
    #[serde(default)]
    pub key_volt: String,
    #[serde(default = "default_key_ext_private")]
    pub key_ext_private: String,
    #[serde(default = "default_key_ext_public")]
    pub key_ext_public: String,
    /// Provider log level; -1 leaves the level untouched.
    #[serde(rename = "debug-type", default = "default_debug_type")]
    pub debug_type: i32,
}

fn default_rtr_port() -> u16 {
    323
}

fn default_protocol_version() -> u8 {
    1
}

fn default_true() -> bool {
    true
}

fn default_client_id() -> u32 {
    1
}

fn default_key_ext_private() -> String {
    "der".to_string()
}

fn default_key_ext_public() -> String {
    "cert".to_string()
}

fn default_debug_type() -> i32 {
    -1
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let cfg: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        ensure!(!self.cache.host.is_empty(), "cache host must not be empty");
        ensure!(
            ProtocolVersion::from_u8(self.cache.protocol_version).is_some(),
            "unsupported protocol version {}",
            self.cache.protocol_version
        );
        Ok(())
    }
}

impl CacheConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            client_id: self.client_id,
            version: ProtocolVersion::from_u8(self.protocol_version)
                .unwrap_or(ProtocolVersion::V1),
            allow_downgrade: self.allow_downgrade,
            stop_after_end_of_data: self.stop_after_end_of_data,
        }
    }

    pub fn client_params(&self) -> RtrClientParams {
        RtrClientParams {
            host: self.host.clone(),
            port: self.port,
            session: self.session_config(),
        }
    }
}
