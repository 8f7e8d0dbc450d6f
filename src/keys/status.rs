// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The 32-bit status word accompanying every crypto / engine operation.
//!
//! The low half carries informational bits that leave the overall result
//! meaningful (a failed signature check still yields `Invalid`); the high
//! half carries error bits that force the result to `Error` / `Failure`.
//! Status values never cross the engine boundary as Rust errors.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct ApiStatus: u32 {
        // Informational (low 16 bits).
        /// One or more signatures failed validation.
        const SIGNATURE_MISMATCH = 0x0000_0001;
        /// A key could not be located in the store.
        const KEY_NOT_FOUND = 0x0000_0002;
        /// The registered key was already present; nothing was stored.
        const DUPLICATE = 0x0000_0004;
        /// `init` was called on an already initialized provider.
        const INIT_ALREADY_DONE = 0x0000_0008;
        const INFO_USER1 = 0x0000_1000;
        const INFO_USER2 = 0x0000_2000;
        const INFO_USER3 = 0x0000_4000;
        const INFO_USER4 = 0x0000_8000;

        // Errors (high 16 bits).
        /// Required input (attribute, hash message) is missing.
        const ERR_NO_DATA = 0x0001_0000;
        /// The NLRI is missing where it is required.
        const ERR_NO_PREFIX = 0x0002_0000;
        /// The key material does not match the expected algorithm.
        const ERR_INVALID_KEY = 0x0004_0000;
        /// Key could not be read or used.
        const ERR_KEY_IO = 0x0008_0000;
        /// A provided buffer is too small.
        const ERR_INSUFFICIENT_BUFFER = 0x0010_0000;
        /// The key store cannot hold any more keys.
        const ERR_INSUFFICIENT_KEY_STORAGE = 0x0020_0000;
        /// No requested algorithm suite is supported.
        const ERR_UNSUPPORTED_ALGO = 0x0040_0000;
        /// Structural error while parsing wire data.
        const ERR_SYNTAX = 0x0080_0000;
        const ERR_USER1 = 0x1000_0000;
        const ERR_USER2 = 0x2000_0000;
        const ERR_USER3 = 0x4000_0000;
        const ERR_USER4 = 0x8000_0000;
    }
}

impl ApiStatus {
    pub const OK: ApiStatus = ApiStatus::empty();
    pub const ERROR_MASK: u32 = 0xFFFF_0000;
    pub const INFO_MASK: u32 = 0x0000_FFFF;

    /// True if any error bit is set; informational bits do not count.
    #[inline]
    pub fn is_error(self) -> bool {
        self.bits() & Self::ERROR_MASK != 0
    }

    #[inline]
    pub fn is_ok(self) -> bool {
        self.is_empty()
    }

    /// Only the informational half.
    #[inline]
    pub fn info(self) -> ApiStatus {
        ApiStatus::from_bits_truncate(self.bits() & Self::INFO_MASK)
    }

    /// Only the error half.
    #[inline]
    pub fn errors(self) -> ApiStatus {
        ApiStatus::from_bits_truncate(self.bits() & Self::ERROR_MASK)
    }
}
