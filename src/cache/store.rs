// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Server-side validation cache.
//!
//! An ordered, append-only list of records keyed by a strictly
//! monotonic (modulo 2^32) serial number. Withdrawals keep the record
//! around for one hour so incremental clients can still learn about
//! them; after that the record is purged and the expiry watermarks
//! remember the serial window that can no longer be served.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::{prefix::Prefix, router_key::SKI_LENGTH, serial::SerialNumber};

/// Seconds a withdrawn record is retained before it is purged.
pub const CACHE_EXPIRATION_INTERVAL: u64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixRecord {
    pub prefix: Prefix,
    pub max_len: u8,
    pub asn: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterKeyRecord {
    pub ski: [u8; SKI_LENGTH],
    pub asn: u32,
    pub spki: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheRecord {
    Prefix(PrefixRecord),
    RouterKey(RouterKeyRecord),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub serial: u32,
    /// Serial of the original announcement; equal to `serial` until the
    /// record is withdrawn.
    pub prev_serial: u32,
    /// Unix timestamp at which the record vanishes; 0 = never.
    pub expires: u64,
    pub announce: bool,
    pub record: CacheRecord,
}

/// What a query against the cache yields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Snapshot {
    /// The client presented a foreign session id; drop the session.
    DropSession,
    /// The requested serial is no longer reachable; answer with a
    /// Cache Reset.
    CacheReset,
    /// Records to send, followed by End of Data at `serial`.
    Records {
        entries: Vec<CacheEntry>,
        serial: u32,
    },
}

#[derive(Debug)]
pub struct CacheStore {
    entries: Vec<CacheEntry>,
    max_serial: u32,
    min_prev_expired: u32,
    max_expired: u32,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            max_serial: 0,
            min_prev_expired: u32::MAX,
            max_expired: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn max_serial(&self) -> u32 {
        self.max_serial
    }

    #[inline]
    pub fn watermarks(&self) -> (u32, u32) {
        (self.min_prev_expired, self.max_expired)
    }

    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Append a freshly announced record under the next serial.
    pub fn append(&mut self, record: CacheRecord) -> u32 {
        self.max_serial = SerialNumber(self.max_serial).next().0;
        self.entries.push(CacheEntry {
            serial: self.max_serial,
            prev_serial: self.max_serial,
            expires: 0,
            announce: true,
            record,
        });
        self.max_serial
    }

    /// Withdraw the entries at the 1-based index range `[start, end]`.
    ///
    /// Only records that are still announcements are touched: each gets
    /// a fresh serial, keeps its original in `prev_serial`, expires in
    /// one hour and moves to the tail of the timeline. Returns how many
    /// records were withdrawn.
    pub fn withdraw(&mut self, start: usize, end: usize, now: u64) -> Option<usize> {
        if start < 1 || end < start || end > self.entries.len() {
            return None;
        }
        let expires = now + CACHE_EXPIRATION_INTERVAL;

        let mut withdrawn = Vec::new();
        // Walk backwards so removals do not shift pending indices.
        for idx in (start - 1..end).rev() {
            if self.entries[idx].serial == self.entries[idx].prev_serial {
                withdrawn.push(self.entries.remove(idx));
            }
        }
        withdrawn.reverse(); // restore original announcement order
        let count = withdrawn.len();
        for mut entry in withdrawn {
            self.max_serial = SerialNumber(self.max_serial).next().0;
            entry.announce = false;
            entry.serial = self.max_serial;
            entry.expires = expires;
            self.entries.push(entry);
        }
        Some(count)
    }

    /// Remove entries whose expiry passed, folding their serials into
    /// the watermarks. Returns the number of purged entries.
    pub fn purge_expired(&mut self, now: u64) -> usize {
        let before = self.entries.len();
        let (mut min_prev, mut max_exp) = (self.min_prev_expired, self.max_expired);
        self.entries.retain(|e| {
            if e.expires > 0 && e.expires <= now {
                min_prev = min_prev.min(e.prev_serial);
                max_exp = max_exp.max(e.serial);
                false
            } else {
                true
            }
        });
        self.min_prev_expired = min_prev;
        self.max_expired = max_exp;
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Serve a Reset Query (`reset = true`) or a Serial Query.
    ///
    /// For incremental queries the client's session id must match and
    /// its serial must still be reachable: once records expired, every
    /// serial not newer than the newest expired one falls into the
    /// unreachable window and forces a Cache Reset.
    pub fn snapshot(
        &self,
        client_serial: u32,
        client_session_id: u16,
        session_id: u16,
        reset: bool,
    ) -> Snapshot {
        if !reset && client_session_id != session_id {
            return Snapshot::DropSession;
        }
        if !reset && !self.serial_reachable(client_serial) {
            return Snapshot::CacheReset;
        }

        let mut out = Vec::new();
        for entry in &self.entries {
            if !reset && !serial_gt(entry.serial, client_serial) {
                continue;
            }
            // A fresh load carries announcements only.
            if reset && !entry.announce {
                continue;
            }
            // Withdrawals of records the client never saw announced.
            if !reset
                && entry.serial != entry.prev_serial
                && serial_gt(entry.prev_serial, client_serial)
            {
                continue;
            }
            out.push(entry.clone());
        }
        Snapshot::Records {
            entries: out,
            serial: self.max_serial,
        }
    }

    fn serial_reachable(&self, client_serial: u32) -> bool {
        if self.min_prev_expired == u32::MAX && self.max_expired == 0 {
            // Nothing has expired yet.
            return true;
        }
        // The client must already have seen every expired update; a
        // serial inside (or before) the expired window cannot be
        // served incrementally anymore.
        serial_gt(client_serial, self.max_expired)
            && !SerialNumber::in_window(
                SerialNumber(self.min_prev_expired),
                SerialNumber(self.max_expired),
                SerialNumber(client_serial),
            )
    }
}

/// Wrap-aware strict `a > b` (RFC 1982 style).
fn serial_gt(a: u32, b: u32) -> bool {
    a != b && a.wrapping_sub(b) < 0x8000_0000
}
