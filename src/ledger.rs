// src/ledger.rs
//! Persistent "already sent" ledger.
//!
//! On-disk format, one entry per line: `<hex identity> <unix timestamp>`.
//! Every lookup re-reads the file and compacts it: expired entries, malformed
//! lines and duplicate identities are dropped and the file is rewritten when
//! anything changed. A lookup therefore never reports a stale positive and the
//! file never outgrows one TTL window.
//!
//! Not safe for concurrent writers. Two overlapping runs may both deliver the
//! same item; the last rewrite wins.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use metrics::counter;
use tracing::{debug, error};

use crate::error::LedgerError;
use crate::ingest::types::ArticleIdentity;
use crate::metrics::LEDGER_ERRORS;

pub const DEFAULT_LEDGER_PATH: &str = "state/sent_articles.txt";
/// Three days.
pub const DEFAULT_TTL_SECS: u64 = 3 * 24 * 3600;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub identity: String,
    pub sent_at: u64,
}

impl LedgerEntry {
    /// Parse one line. Identities are kept as opaque hex so files written with
    /// a different digest width still round-trip.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let identity = fields.next()?;
        let ts = fields.next()?;
        if fields.next().is_some() {
            return None;
        }
        if identity.is_empty() || !identity.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            identity: identity.to_ascii_lowercase(),
            sent_at: parse_timestamp(ts)?,
        })
    }

    fn is_live(&self, now: u64, ttl_secs: u64) -> bool {
        now.saturating_sub(self.sent_at) <= ttl_secs
    }
}

// Older writers stored fractional seconds.
fn parse_timestamp(raw: &str) -> Option<u64> {
    if let Ok(v) = raw.parse::<u64>() {
        return Some(v);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 {
        Some(f.floor() as u64)
    } else {
        None
    }
}

pub(crate) fn now_unix() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

#[derive(Debug, Clone)]
pub struct Ledger {
    path: PathBuf,
    ttl_secs: u64,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>, ttl_secs: u64) -> Self {
        Self {
            path: path.into(),
            ttl_secs,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    /// True if `identity` has a live entry. Compacts the store as a side effect.
    ///
    /// An unreadable store is reported and answered with `false`: an occasional
    /// duplicate delivery is preferred over never delivering again.
    pub fn contains_and_refresh(&self, identity: &ArticleIdentity) -> bool {
        self.contains_and_refresh_at(identity, now_unix())
    }

    pub fn contains_and_refresh_at(&self, identity: &ArticleIdentity, now: u64) -> bool {
        match self.try_contains_and_refresh_at(identity, now) {
            Ok(hit) => hit,
            Err(e) => {
                error!(
                    target: "ledger",
                    error = %e,
                    %identity,
                    "ledger unreadable, treating item as not sent (duplicates possible)"
                );
                counter!(LEDGER_ERRORS).increment(1);
                false
            }
        }
    }

    pub fn try_contains_and_refresh_at(
        &self,
        identity: &ArticleIdentity,
        now: u64,
    ) -> Result<bool, LedgerError> {
        let live = self.compact_at(now)?;
        Ok(live.contains_key(&identity.to_string()))
    }

    /// Read the store, keep the newest live entry per identity and rewrite the
    /// file if any line was dropped. Returns identity -> sent_at. Only a failed
    /// read is an error; a failed rewrite is logged.
    pub fn compact_at(&self, now: u64) -> Result<HashMap<String, u64>, LedgerError> {
        let raw = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(self.io_err(e)),
        };
        let text = String::from_utf8_lossy(&raw);

        let mut live: HashMap<String, u64> = HashMap::new();
        let mut lines = 0usize;
        for line in text.lines() {
            lines += 1;
            let Some(entry) = LedgerEntry::parse(line) else {
                continue;
            };
            if !entry.is_live(now, self.ttl_secs) {
                continue;
            }
            let slot = live.entry(entry.identity).or_insert(entry.sent_at);
            *slot = (*slot).max(entry.sent_at);
        }

        if live.len() != lines {
            debug!(
                target: "ledger",
                kept = live.len(),
                dropped = lines - live.len(),
                "compacting ledger"
            );
            // The read succeeded, so the answer stands even if the rewrite fails.
            if let Err(e) = self.rewrite(&live) {
                error!(target: "ledger", error = %e, "ledger compaction not written");
                counter!(LEDGER_ERRORS).increment(1);
            }
        }
        Ok(live)
    }

    /// Append a fresh entry. Repeated records for one identity are legal; each
    /// line expires on its own.
    pub fn record(&self, identity: &ArticleIdentity) -> Result<(), LedgerError> {
        self.record_at(identity, now_unix())
    }

    pub fn record_at(&self, identity: &ArticleIdentity, now: u64) -> Result<(), LedgerError> {
        self.ensure_parent()?;
        let mut f = fs::OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        let needs_newline = ends_without_newline(&mut f).map_err(|e| self.io_err(e))?;
        let mut line = String::with_capacity(48);
        if needs_newline {
            line.push('\n');
        }
        line.push_str(&format!("{identity} {now}\n"));
        f.write_all(line.as_bytes()).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn rewrite(&self, live: &HashMap<String, u64>) -> Result<(), LedgerError> {
        let mut entries: Vec<(&String, &u64)> = live.iter().collect();
        entries.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));

        let mut out = String::with_capacity(entries.len() * 45);
        for (id, ts) in entries {
            out.push_str(&format!("{id} {ts}\n"));
        }

        self.ensure_parent()?;
        let tmp = self.path.with_extension("tmp");
        let mut f = fs::File::create(&tmp).map_err(|e| self.io_err(e))?;
        f.write_all(out.as_bytes()).map_err(|e| self.io_err(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        Ok(())
    }

    fn ensure_parent(&self) -> Result<(), LedgerError> {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                fs::create_dir_all(dir).map_err(|e| self.io_err(e))
            }
            _ => Ok(()),
        }
    }

    fn io_err(&self, source: io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

fn ends_without_newline(f: &mut fs::File) -> io::Result<bool> {
    let len = f.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    f.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
