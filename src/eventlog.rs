//! # Structured Event Log
//! Append-only, per-day JSONL files recording every pipeline event, keyed by
//! tracing id and event kind.
//!
//! One writer owns the active file handle; it rotates at the day boundary
//! under the same lock. Readers re-open the files and receive copies, never
//! the live handle. Invalid lines found while reading are skipped and
//! counted. Files older than the retention window are deleted by the
//! scheduled cleanup; cleanup errors never fail other operations.

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;
use tracing::{error, warn};

use crate::errors::AnalyzerError;

/// Event kinds the pipeline emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Analysis,
    Complexity,
    Competitive,
    Validation,
    Rejection,
    Acceptance,
    Processing,
    Error,
    Performance,
    Trend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

/// One event record. Serialized as a single JSONL line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub tracing_id: String,
    pub kind: LogKind,
    pub level: LogLevel,
    pub keyword: String,
    #[serde(default)]
    pub payload: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Write retry policy for persistence failures.
const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF_BASE_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_prefix")]
    pub tracing_prefix: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_prefix() -> String {
    "longtail".to_string()
}

fn default_retention_days() -> u32 {
    30
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            tracing_prefix: default_prefix(),
            retention_days: default_retention_days(),
        }
    }
}

struct WriterState {
    day: NaiveDate,
    file: File,
}

/// Append-only event log over per-day JSONL files.
pub struct EventLog {
    cfg: EventLogConfig,
    writer: Mutex<Option<WriterState>>,
}

impl EventLog {
    pub fn new(cfg: EventLogConfig) -> Result<Self, AnalyzerError> {
        fs::create_dir_all(&cfg.dir)
            .map_err(|e| AnalyzerError::Persistence(format!("create {}: {e}", cfg.dir.display())))?;
        Ok(Self {
            cfg,
            writer: Mutex::new(None),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.cfg.dir
    }

    /// `<prefix>_<yyyyMMddHHmmssSSS>_<4-digit keyword hash>`.
    pub fn tracing_id(&self, keyword: &str) -> String {
        let now = Utc::now();
        format!(
            "{}_{}_{:04}",
            self.cfg.tracing_prefix,
            now.format("%Y%m%d%H%M%S%3f"),
            keyword_hash(keyword)
        )
    }

    /// Append one record, retrying with exponential backoff on I/O errors.
    /// The final failure is surfaced but must not fail the in-memory
    /// pipeline result; callers log it and move on.
    pub fn append(&self, entry: &LogEntry) -> Result<(), AnalyzerError> {
        let line = serde_json::to_string(entry)
            .map_err(|e| AnalyzerError::Persistence(format!("serialize log entry: {e}")))?;

        let mut last_err = None;
        for attempt in 0..WRITE_ATTEMPTS {
            if attempt > 0 {
                thread::sleep(Duration::from_millis(WRITE_BACKOFF_BASE_MS << (attempt - 1)));
            }
            match self.write_line(&line, entry.at.date_naive()) {
                Ok(()) => {
                    metrics::counter!("eventlog_writes_total").increment(1);
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }

        metrics::counter!("eventlog_write_failures_total").increment(1);
        let e = last_err.unwrap_or_else(|| AnalyzerError::Persistence("unknown write failure".into()));
        error!(target: "eventlog", error = %e, "append failed after retries");
        Err(e)
    }

    /// Convenience constructor + append for the common call sites.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        kind: LogKind,
        level: LogLevel,
        keyword: &str,
        payload: Map<String, Value>,
        outcome: Option<String>,
        elapsed: Option<f64>,
        error: Option<String>,
        tracing_id: Option<&str>,
    ) -> Result<(), AnalyzerError> {
        let entry = LogEntry {
            at: Utc::now(),
            tracing_id: tracing_id
                .map(str::to_string)
                .unwrap_or_else(|| self.tracing_id(keyword)),
            kind,
            level,
            keyword: keyword.to_string(),
            payload,
            outcome,
            elapsed,
            error,
        };
        self.append(&entry)
    }

    fn write_line(&self, line: &str, day: NaiveDate) -> Result<(), AnalyzerError> {
        let mut guard = self.writer.lock().expect("event log writer poisoned");

        let rotate = match guard.as_ref() {
            Some(state) => state.day != day,
            None => true,
        };
        if rotate {
            let path = self.day_path(day);
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| AnalyzerError::Persistence(format!("open {}: {e}", path.display())))?;
            *guard = Some(WriterState { day, file });
        }

        let state = guard.as_mut().expect("writer state after rotation");
        writeln!(state.file, "{line}")
            .map_err(|e| AnalyzerError::Persistence(format!("append: {e}")))
    }

    fn day_path(&self, day: NaiveDate) -> PathBuf {
        self.cfg.dir.join(format!("{}.jsonl", day.format("%Y-%m-%d")))
    }

    /// Read records in `[from, to]` with optional kind/level filters.
    /// Invalid lines are skipped and counted, not fatal.
    pub fn read_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        kind: Option<LogKind>,
        level: Option<LogLevel>,
    ) -> Result<Vec<LogEntry>, AnalyzerError> {
        let mut out = Vec::new();
        let mut skipped = 0usize;

        let mut day = from.date_naive();
        let last = to.date_naive();
        loop {
            let path = self.day_path(day);
            if path.exists() {
                let file = File::open(&path)
                    .map_err(|e| AnalyzerError::Persistence(format!("open {}: {e}", path.display())))?;
                for line in BufReader::new(file).lines() {
                    let line = match line {
                        Ok(l) => l,
                        Err(_) => {
                            skipped += 1;
                            continue;
                        }
                    };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogEntry>(&line) {
                        Ok(entry) => {
                            if entry.at < from || entry.at > to {
                                continue;
                            }
                            if let Some(k) = kind {
                                if entry.kind != k {
                                    continue;
                                }
                            }
                            if let Some(l) = level {
                                if entry.level != l {
                                    continue;
                                }
                            }
                            out.push(entry);
                        }
                        Err(_) => skipped += 1,
                    }
                }
            }
            if day >= last {
                break;
            }
            day = match day.succ_opt() {
                Some(d) => d,
                None => break,
            };
        }

        if skipped > 0 {
            metrics::counter!("eventlog_invalid_lines_total").increment(skipped as u64);
            warn!(target: "eventlog", skipped, "skipped invalid log lines");
        }
        Ok(out)
    }

    /// Delete day files older than the retention window. Per-file errors are
    /// logged and skipped.
    pub fn cleanup(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now.date_naive() - ChronoDuration::days(self.cfg.retention_days as i64);
        let mut removed = 0usize;

        let entries = match fs::read_dir(&self.cfg.dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(target: "eventlog", error = %e, "retention scan failed");
                return 0;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let Ok(day) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else { continue };
            if day < cutoff {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(target: "eventlog", file = %path.display(), error = %e, "retention delete failed"),
                }
            }
        }
        removed
    }
}

/// First two bytes of the keyword's SHA-256, reduced to four digits.
fn keyword_hash(keyword: &str) -> u16 {
    let digest = Sha256::digest(keyword.as_bytes());
    u16::from_be_bytes([digest[0], digest[1]]) % 10_000
}

// ---- Reports (pure functions over a read) ----

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_level: BTreeMap<String, usize>,
    /// Acceptances over acceptances + rejections; `None` without either.
    pub approval_rate: Option<f64>,
    /// Top keywords by event count, descending, ties by name.
    pub top_keywords: Vec<(String, usize)>,
}

/// Aggregate counts over a slice of entries.
pub fn quality_report(entries: &[LogEntry]) -> QualityReport {
    let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_level: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_keyword: BTreeMap<String, usize> = BTreeMap::new();
    let mut accepted = 0usize;
    let mut rejected = 0usize;

    for e in entries {
        *by_kind.entry(kind_name(e.kind)).or_default() += 1;
        *by_level.entry(level_name(e.level)).or_default() += 1;
        if !e.keyword.is_empty() {
            *by_keyword.entry(e.keyword.clone()).or_default() += 1;
        }
        match e.kind {
            LogKind::Acceptance => accepted += 1,
            LogKind::Rejection => rejected += 1,
            _ => {}
        }
    }

    let approval_rate = if accepted + rejected > 0 {
        Some(accepted as f64 / (accepted + rejected) as f64)
    } else {
        None
    };

    let mut top: Vec<(String, usize)> = by_keyword.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top.truncate(10);

    QualityReport {
        total: entries.len(),
        by_kind,
        by_level,
        approval_rate,
        top_keywords: top,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    /// Events per day, keyed `yyyy-mm-dd`.
    pub daily: BTreeMap<String, usize>,
    /// Last seven days compared with the seven before: `rising`, `falling`,
    /// or `stable` (within 10%).
    pub week_over_week: String,
}

/// Daily counters plus a week-over-week direction, anchored at `now`.
pub fn trend_report(entries: &[LogEntry], now: DateTime<Utc>) -> TrendReport {
    let mut daily: BTreeMap<String, usize> = BTreeMap::new();
    for e in entries {
        *daily.entry(e.at.date_naive().format("%Y-%m-%d").to_string()).or_default() += 1;
    }

    let week_ago = now - ChronoDuration::days(7);
    let fortnight_ago = now - ChronoDuration::days(14);
    let this_week = entries.iter().filter(|e| e.at > week_ago && e.at <= now).count() as f64;
    let prior_week = entries.iter().filter(|e| e.at > fortnight_ago && e.at <= week_ago).count() as f64;

    let week_over_week = if prior_week == 0.0 {
        if this_week > 0.0 { "rising" } else { "stable" }
    } else {
        let ratio = this_week / prior_week;
        if ratio > 1.1 {
            "rising"
        } else if ratio < 0.9 {
            "falling"
        } else {
            "stable"
        }
    }
    .to_string();

    TrendReport { daily, week_over_week }
}

fn kind_name(kind: LogKind) -> String {
    serde_json::to_value(kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn level_name(level: LogLevel) -> String {
    serde_json::to_value(level)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn log_in(dir: &Path) -> EventLog {
        EventLog::new(EventLogConfig {
            dir: dir.to_path_buf(),
            ..Default::default()
        })
        .unwrap()
    }

    fn entry(at: DateTime<Utc>, kind: LogKind, keyword: &str) -> LogEntry {
        LogEntry {
            at,
            tracing_id: format!("t_{keyword}"),
            kind,
            level: LogLevel::Info,
            keyword: keyword.to_string(),
            payload: Map::new(),
            outcome: None,
            elapsed: Some(0.01),
            error: None,
        }
    }

    #[test]
    fn tracing_id_shape() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_in(tmp.path());
        let id = log.tracing_id("best price gaming notebook");
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts[0], "longtail");
        assert_eq!(parts[1].len(), 17); // yyyyMMddHHmmssSSS
        assert_eq!(parts[2].len(), 4);

        // Same keyword, same hash suffix.
        let id2 = log.tracing_id("best price gaming notebook");
        assert_eq!(id.split('_').last(), id2.split('_').last());
    }

    #[test]
    fn write_then_read_roundtrips_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_in(tmp.path());

        let at = Utc::now();
        let mut payload = Map::new();
        payload.insert("score".into(), serde_json::json!(0.82));
        let e = LogEntry {
            payload,
            outcome: Some("approved".into()),
            ..entry(at, LogKind::Validation, "melhor notebook para estudo")
        };
        log.append(&e).unwrap();

        let got = log
            .read_range(at - ChronoDuration::hours(1), at + ChronoDuration::hours(1), None, None)
            .unwrap();
        assert_eq!(got, vec![e]);
    }

    #[test]
    fn filters_by_kind_and_level() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_in(tmp.path());
        let at = Utc::now();

        log.append(&entry(at, LogKind::Acceptance, "kw1")).unwrap();
        log.append(&entry(at, LogKind::Rejection, "kw2")).unwrap();

        let only_accepts = log
            .read_range(at - ChronoDuration::hours(1), at + ChronoDuration::hours(1), Some(LogKind::Acceptance), None)
            .unwrap();
        assert_eq!(only_accepts.len(), 1);
        assert_eq!(only_accepts[0].keyword, "kw1");
    }

    #[test]
    fn invalid_lines_are_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_in(tmp.path());
        let at = Utc::now();
        log.append(&entry(at, LogKind::Processing, "kw")).unwrap();

        // Corrupt the file with a garbage line.
        let path = tmp.path().join(format!("{}.jsonl", at.date_naive().format("%Y-%m-%d")));
        let mut f = OpenOptions::new().append(true).open(path).unwrap();
        writeln!(f, "{{ not json").unwrap();

        let got = log
            .read_range(at - ChronoDuration::hours(1), at + ChronoDuration::hours(1), None, None)
            .unwrap();
        assert_eq!(got.len(), 1);
    }

    #[test]
    fn cleanup_removes_only_stale_files() {
        let tmp = tempfile::tempdir().unwrap();
        let log = log_in(tmp.path());

        fs::write(tmp.path().join("2020-01-01.jsonl"), "{}\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "keep me").unwrap();
        let now = Utc::now();
        let today = now.date_naive().format("%Y-%m-%d").to_string();
        fs::write(tmp.path().join(format!("{today}.jsonl")), "").unwrap();

        let removed = log.cleanup(now);
        assert_eq!(removed, 1);
        assert!(tmp.path().join("notes.txt").exists());
        assert!(tmp.path().join(format!("{today}.jsonl")).exists());
    }

    #[test]
    fn quality_report_counts_and_rates() {
        let at = Utc.with_ymd_and_hms(2025, 7, 10, 9, 0, 0).unwrap();
        let entries = vec![
            entry(at, LogKind::Acceptance, "kw1"),
            entry(at, LogKind::Acceptance, "kw1"),
            entry(at, LogKind::Rejection, "kw2"),
            entry(at, LogKind::Processing, "kw3"),
        ];
        let r = quality_report(&entries);
        assert_eq!(r.total, 4);
        assert_eq!(r.by_kind.get("acceptance"), Some(&2));
        assert_eq!(r.by_level.get("info"), Some(&4));
        assert!((r.approval_rate.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(r.top_keywords[0], ("kw1".to_string(), 2));
    }

    #[test]
    fn trend_report_week_over_week() {
        let now = Utc.with_ymd_and_hms(2025, 7, 14, 12, 0, 0).unwrap();
        let mut entries = Vec::new();
        for d in 1..=3 {
            entries.push(entry(now - ChronoDuration::days(d), LogKind::Processing, "kw"));
        }
        entries.push(entry(now - ChronoDuration::days(10), LogKind::Processing, "kw"));

        let r = trend_report(&entries, now);
        assert_eq!(r.week_over_week, "rising");
        assert_eq!(r.daily.values().sum::<usize>(), 4);
    }
}
