// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

pub mod bgpsec;
pub mod cache;
pub mod cfg;
pub mod client;
pub mod keys;
pub mod models;
pub mod server;
pub mod utils;
