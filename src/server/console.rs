// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Operator console of the cache test harness.
//!
//! One command per line, `#` starts a comment. Cache edits set the
//! pending-notify flag that the 60 s service timer drains; the `*Now`
//! variants and `notify` / `reset` / `error` broadcast immediately.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::warn;

use crate::{
    cache::store::{CacheRecord, PrefixRecord, unix_now},
    models::{pdu_type::PduType, prefix::Prefix},
    server::dispatcher::ServerState,
};

const HARNESS_NAME: &str = "RPKI Cache Test Harness";
const HARNESS_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmdOutcome {
    Continue,
    Quit,
}

pub struct Console {
    state: Arc<ServerState>,
    verbose: AtomicBool,
}

impl Console {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            verbose: AtomicBool::new(true),
        }
    }

    /// Read commands from stdin until `quit` or EOF.
    pub async fn run_interactive(&self) -> Result<CmdOutcome> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut stdout = tokio::io::stdout();
        loop {
            stdout.write_all(b">> ").await?;
            stdout.flush().await?;
            let Some(line) = lines.next_line().await? else {
                return Ok(CmdOutcome::Quit);
            };
            if self.handle_line(&line).await == CmdOutcome::Quit {
                return Ok(CmdOutcome::Quit);
            }
        }
    }

    /// Execute a command script line by line.
    pub async fn run_script(&self, path: &str) -> CmdOutcome {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                println!("Error: failed to open the script '{path}': {e}");
                return CmdOutcome::Continue;
            },
        };
        for raw in content.lines() {
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            if Box::pin(self.handle_line(line)).await == CmdOutcome::Quit {
                return CmdOutcome::Quit;
            }
        }
        CmdOutcome::Continue
    }

    pub async fn handle_line(&self, line: &str) -> CmdOutcome {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            return CmdOutcome::Continue;
        }
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, Some(a.trim())),
            None => (line, None),
        };

        match cmd {
            "quit" | "exit" | "\\q" => return CmdOutcome::Quit,
            "verbose" => {
                let v = !self.verbose.load(Ordering::Relaxed);
                self.verbose.store(v, Ordering::Relaxed);
                println!("Verbose output: {}", if v { "on" } else { "off" });
            },
            "cache" => self.print_cache().await,
            "version" => self.show_version(),
            "help" => self.show_help(arg),
            "credits" => {
                self.show_version();
                println!("Developed as an RPKI/RTR and BGPsec test tool.");
            },
            "sessionID" => self.session_id_cmd(arg).await,
            "empty" => {
                self.state.cache.write().await.clear();
                self.say("Emptied the cache");
            },
            "append" => match arg {
                Some(file) => self.append_file(file).await,
                None => println!("Error: no file given"),
            },
            "add" => {
                if self.add_prefix(arg).await {
                    self.state.schedule_notify();
                }
            },
            "addNow" => {
                if self.add_prefix(arg).await {
                    self.state.notify_all().await;
                }
            },
            "remove" => {
                if self.remove_entries(arg).await {
                    self.state.schedule_notify();
                }
            },
            "removeNow" => {
                if self.remove_entries(arg).await {
                    self.state.notify_all().await;
                }
            },
            "error" => self.issue_error(arg).await,
            "notify" => self.state.notify_all().await,
            "reset" => self.state.reset_all().await,
            "clients" => self.list_clients(),
            "run" => {
                if let Some(file) = arg {
                    return self.run_script(file).await;
                }
                println!("Error: no script given");
            },
            "sleep" => {
                let secs = arg.and_then(|a| a.parse::<u64>().ok()).unwrap_or(0);
                if secs == 0 {
                    println!("Error: invalid number of seconds");
                } else {
                    tokio::time::sleep(std::time::Duration::from_secs(secs)).await;
                }
            },
            other => println!("Unknown command '{other}', try 'help'"),
        }
        CmdOutcome::Continue
    }

    fn say(&self, msg: &str) {
        if self.verbose.load(Ordering::Relaxed) {
            println!("{msg}");
        }
    }

    fn show_version(&self) {
        println!("{HARNESS_NAME} Version {HARNESS_VERSION}");
    }

    fn show_help(&self, command: Option<&str>) {
        match command {
            Some("add") => {
                println!("add <prefix> <maxlen> <asn> : queue a prefix announcement");
            },
            Some("remove") => {
                println!("remove <i>[..<j>]           : withdraw cache entries by index");
            },
            Some("error") => {
                println!("error <code> <pdu|-> <msg|->: broadcast an error report;");
                println!("  the pdu is a comma list: version,type,mixed,length[,...]");
            },
            _ => {
                self.show_version();
                println!(
                    "\nCommands:\n\
                     -----------------\n  \
                     verbose              : toggle verbose output\n  \
                     cache                : list the cache content\n  \
                     version              : show version information\n  \
                     help [cmd]           : this text or details for cmd\n  \
                     credits              : credits\n  \
                     sessionID [n|reset]  : show or set the session id\n  \
                     empty                : clear the cache (no notify)\n  \
                     append <file>        : load prefix lines from a file\n  \
                     add <prefix> <maxlen> <asn>\n  \
                     addNow ...           : add and notify immediately\n  \
                     remove <i>[..<j>]    : withdraw entries\n  \
                     removeNow ...        : withdraw and notify immediately\n  \
                     error <code> <pdu|-> <msg|->\n  \
                     notify               : send Serial Notify now\n  \
                     reset                : send Cache Reset to all clients\n  \
                     clients              : list connected clients\n  \
                     run <file>           : execute a command script\n  \
                     sleep <sec>          : pause execution\n  \
                     quit | exit | \\q     : shut down"
                );
            },
        }
    }

    async fn session_id_cmd(&self, arg: Option<&str>) {
        let current = self.state.session_id();
        match arg {
            None => println!("Current SESSION ID: {current} (0x{current:04X})"),
            Some("reset") => {
                println!("Reset session id to 0");
                self.state.set_session_id(0);
                self.state.notify_all().await;
            },
            Some(v) => match v.parse::<u16>() {
                Ok(new) if new > current => {
                    self.state.set_session_id(new);
                    println!("Current SESSION ID: {new} (0x{new:04X})");
                    self.state.notify_all().await;
                },
                Ok(new) => println!(
                    "ERROR: New SESSION ID {new} must be greater than current \
                     SESSION ID {current}!"
                ),
                Err(_) => println!("ERROR: New SESSION ID '{v}' is not a number!"),
            },
        }
    }

    async fn print_cache(&self) {
        let now = unix_now();
        let cache = self.state.cache.read().await;
        let sid = self.state.session_id();
        println!("Session ID: {sid} (0x{sid:04X})");
        if cache.is_empty() {
            println!("Cache is empty");
            return;
        }
        for (pos, entry) in cache.entries().iter().enumerate() {
            let marker = if entry.announce { ' ' } else { '*' };
            let body = match &entry.record {
                CacheRecord::Prefix(p) => format!(
                    "{}, OAS={}, Max.Len={}",
                    p.prefix, p.asn, p.max_len
                ),
                CacheRecord::RouterKey(k) => format!(
                    "key {} OAS={}",
                    hex::encode_upper(k.ski),
                    k.asn
                ),
            };
            print!(
                "{marker} {:4}: {body}, Serial={}, Prev.Serial={}",
                pos + 1,
                entry.serial,
                entry.prev_serial
            );
            if entry.expires > 0 {
                let left = entry.expires.saturating_sub(now);
                match chrono::DateTime::from_timestamp(entry.expires as i64, 0) {
                    Some(at) => print!(" - Expires={left}s ({})", at.format("%H:%M:%S")),
                    None => print!(" - Expires={left}s"),
                }
            }
            println!();
        }
    }

    /// `add` / `addNow` argument: `<prefix> <maxlen> <asn>`.
    async fn add_prefix(&self, arg: Option<&str>) -> bool {
        let Some(arg) = arg else {
            println!("Error: Data missing: <prefix> <maxlen> <as>");
            return false;
        };
        match parse_prefix_line(arg) {
            Ok(record) => {
                self.state.cache.write().await.append(record);
                self.say("Read 1 entry");
                true
            },
            Err(e) => {
                println!("ERROR: The prefix information '{arg}' could not be added: {e}");
                false
            },
        }
    }

    async fn append_file(&self, path: &str) {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                println!("Error: Failed to open '{path}': {e}");
                return;
            },
        };
        let mut added = 0usize;
        {
            let mut cache = self.state.cache.write().await;
            for (line_no, raw) in content.lines().enumerate() {
                let line = raw.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                match parse_prefix_line(line) {
                    Ok(record) => {
                        cache.append(record);
                        added += 1;
                    },
                    Err(e) => {
                        println!("Warning: {e} (line {})", line_no + 1);
                    },
                }
            }
        }
        self.say(&format!("Read {added} entries"));
        if added > 0 {
            self.state.schedule_notify();
        }
    }

    /// `remove` argument: `<start>[..<end>]`, 1-based inclusive.
    async fn remove_entries(&self, arg: Option<&str>) -> bool {
        let Some(arg) = arg else {
            println!("Error: No indexes given");
            return false;
        };
        let (start, end) = match arg.split_once("..") {
            Some((a, b)) => (a.trim().parse::<usize>(), b.trim().parse::<usize>()),
            None => (arg.trim().parse::<usize>(), arg.trim().parse::<usize>()),
        };
        let (Ok(start), Ok(end)) = (start, end) else {
            println!("Error: Index is not a number: '{arg}'");
            return false;
        };
        match self.state.cache.write().await.withdraw(start, end, unix_now()) {
            Some(removed) => {
                self.say(&format!("Removed {removed} entries"));
                removed > 0
            },
            None => {
                println!("Error: Invalid index(es): '{arg}'");
                false
            },
        }
    }

    /// `error <code> <pdu|-> <msg|->`.
    async fn issue_error(&self, arg: Option<&str>) {
        let Some(arg) = arg else {
            println!("Error: No error-code and/or message given");
            return;
        };
        let mut parts = arg.splitn(3, char::is_whitespace);
        let Some(code) = parts.next().and_then(|c| c.parse::<u16>().ok()) else {
            println!("Error: Invalid error-code: {arg}");
            return;
        };
        let Some(pdu_spec) = parts.next() else {
            println!("Parameter for PDU missing, either PDU specification or - !");
            return;
        };
        let Some(msg) = parts.next() else {
            println!("Parameter for message text missing; either a message or - !");
            return;
        };

        let enc_pdu = if pdu_spec == "-" {
            Vec::new()
        } else {
            match build_error_pdu(pdu_spec) {
                Ok(p) => p,
                Err(e) => {
                    println!("Error: invalid PDU specification: {e}");
                    return;
                },
            }
        };
        let msg = if msg == "-" { "" } else { msg };
        self.state.error_all(code, enc_pdu, msg).await;
    }

    fn list_clients(&self) {
        if self.state.clients.is_empty() {
            println!("No clients");
            return;
        }
        for (idx, entry) in self.state.clients.iter().enumerate() {
            println!(
                "{}: {} (last served serial {})",
                idx + 1,
                entry.addr,
                entry.last_served_serial
            );
        }
    }
}

/// Parse one `<prefix> <maxlen> <asn>` line.
fn parse_prefix_line(line: &str) -> Result<CacheRecord> {
    let mut fields = line.split_whitespace();
    let (Some(prefix), Some(max_len), Some(asn)) =
        (fields.next(), fields.next(), fields.next())
    else {
        anyhow::bail!("Parameters missing: '{line}'");
    };
    let prefix = Prefix::parse(prefix)?;
    let max_len: u8 = max_len.parse()?;
    if max_len < prefix.length || max_len > prefix.max_length() {
        anyhow::bail!("Invalid max. length '{max_len}'");
    }
    let asn: u32 = asn.parse()?;
    if asn == 0 {
        anyhow::bail!("Invalid origin AS '0'");
    }
    Ok(CacheRecord::Prefix(PrefixRecord {
        prefix,
        max_len,
        asn,
    }))
}

/// Build an encapsulated PDU from its comma-separated field list:
/// `version,type,mixed,length[,type specific fields]`.
fn build_error_pdu(spec: &str) -> Result<Vec<u8>> {
    let fields: Vec<&str> = spec.split(',').collect();
    if fields.len() < 4 {
        anyhow::bail!("need at least version,type,mixed,length");
    }
    let version: u8 = fields[0].trim().parse()?;
    let pdu_type: u8 = fields[1].trim().parse()?;
    let mixed: u16 = fields[2].trim().parse()?;
    let length: u32 = fields[3].trim().parse()?;

    let mut pdu = Vec::with_capacity(length as usize);
    pdu.push(version);
    pdu.push(pdu_type);
    pdu.extend_from_slice(&mixed.to_be_bytes());
    pdu.extend_from_slice(&length.to_be_bytes());

    match PduType::from_u8(pdu_type) {
        Some(PduType::SerialNotify | PduType::SerialQuery | PduType::EndOfData) => {
            let serial: u32 = field(&fields, 4)?.parse()?;
            pdu.extend_from_slice(&serial.to_be_bytes());
        },
        Some(PduType::Ipv4Prefix | PduType::Ipv6Prefix) => {
            let flags: u8 = field(&fields, 4)?.parse()?;
            let plen: u8 = field(&fields, 5)?.parse()?;
            let maxlen: u8 = field(&fields, 6)?.parse()?;
            let zero: u8 = field(&fields, 7)?.parse()?;
            pdu.extend_from_slice(&[flags, plen, maxlen, zero]);
            let addr: std::net::IpAddr = field(&fields, 8)?.parse()?;
            match addr {
                std::net::IpAddr::V4(a) => pdu.extend_from_slice(&a.octets()),
                std::net::IpAddr::V6(a) => pdu.extend_from_slice(&a.octets()),
            }
            let asn: u32 = field(&fields, 9)?.parse()?;
            pdu.extend_from_slice(&asn.to_be_bytes());
        },
        _ => {
            // Header-only types and anything unknown stay as given.
        },
    }

    if pdu.len() != length as usize {
        warn!(
            declared = length,
            built = pdu.len(),
            "error PDU length field does not match its content"
        );
    }
    Ok(pdu)
}

fn field<'a>(fields: &[&'a str], idx: usize) -> Result<&'a str> {
    fields
        .get(idx)
        .map(|f| f.trim())
        .ok_or_else(|| anyhow::anyhow!("missing field {idx}"))
}
