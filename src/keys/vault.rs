// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Filesystem key vault.
//!
//! Keys live in a directory tree derived from the upper-case hex SKI
//! `S = s0 s1 .. s39`: `<root>/<S[0:2]>/<S[2:6]>/<S[6:40]>.<ext>`.
//! Private keys default to the `der` extension, public keys to `cert`.
//! Files hold already-encoded DER blobs; no certificate parsing happens
//! here.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::keys::store::{BgpsecKey, Ski};

pub const DEFAULT_PRIVATE_EXT: &str = "der";
pub const DEFAULT_PUBLIC_EXT: &str = "cert";

#[derive(Debug, Clone)]
pub struct KeyVault {
    root: PathBuf,
    ext_private: String,
    ext_public: String,
}

impl KeyVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ext_private: DEFAULT_PRIVATE_EXT.to_string(),
            ext_public: DEFAULT_PUBLIC_EXT.to_string(),
        }
    }

    pub fn with_extensions(mut self, private: &str, public: &str) -> Self {
        self.ext_private = private.to_string();
        self.ext_public = public.to_string();
        self
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The vault path of the key with the given SKI.
    pub fn key_path(&self, ski: &Ski, private: bool) -> PathBuf {
        let hex = hex::encode_upper(ski);
        let ext = if private {
            &self.ext_private
        } else {
            &self.ext_public
        };
        self.root
            .join(&hex[0..2])
            .join(&hex[2..6])
            .join(format!("{}.{ext}", &hex[6..40]))
    }

    /// Read the DER blob of a key from the vault.
    pub fn load(&self, ski: &Ski, private: bool) -> Result<Vec<u8>> {
        let path = self.key_path(ski, private);
        std::fs::read(&path)
            .with_context(|| format!("failed to read key file {}", path.display()))
    }

    /// Read a key and wrap it with its identity for registration.
    pub fn load_key(
        &self,
        asn: u32,
        ski: &Ski,
        algo_id: u8,
        private: bool,
    ) -> Result<BgpsecKey> {
        Ok(BgpsecKey {
            algo_id,
            asn,
            ski: *ski,
            der: self.load(ski, private)?,
        })
    }
}
