// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use rand::RngExt;

/// Generate a random cache session id, avoiding 0 (the harness reset
/// value) and 0xFFFF (the client-side startup sentinel).
pub fn generate_session_id() -> u16 {
    let id: u16 = rand::rng().random();
    match id {
        0 | 0xFFFF => 0x1234,
        other => other,
    }
}
