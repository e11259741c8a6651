//! Watch mode: poll source files and re-run the driver on change.
//!
//! The loop polls file modification times (default every 500 ms), waits
//! out a fixed debounce interval before acting (an editor may still be
//! writing), clears and re-reads the whole design, and runs the
//! incremental driver. Reader failures are counted and warned about once
//! per five consecutive failures; driver failures are fatal, matching the
//! rest of the error policy. A shared atomic flag, checked between polls,
//! shuts the loop down cleanly.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, UNIX_EPOCH};

use serde::Serialize;
use vesper_engine::Engine;
use vesper_ir::Design;

use crate::driver::{self, Context, SynthOptions};
use crate::error::DriverError;

/// Default polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default debounce interval after a change is first seen.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

/// Reader failures tolerated before one warning is emitted.
const ERROR_WARN_THRESHOLD: u32 = 5;

/// Configuration for a watch session.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    /// Files to watch and re-read on change.
    pub files: Vec<PathBuf>,
    /// Driver options applied to every run.
    pub synth: SynthOptions,
    /// Polling interval.
    pub poll_interval: Duration,
    /// Debounce interval.
    pub debounce: Duration,
    /// Emit a one-line JSON record on stdout after each successful reload.
    pub emit_events: bool,
    /// Run once and exit (no polling).
    pub once: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            synth: SynthOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            emit_events: false,
            once: false,
        }
    }
}

/// Summary of a finished watch session.
#[derive(Debug, Clone, Default)]
pub struct WatchReport {
    /// Successful reload cycles after the initial run.
    pub reloads: u64,
}

/// The JSON record printed to stdout after each successful reload.
#[derive(Serialize)]
struct SynthesisEvent<'a> {
    event: &'static str,
    time_ms: u64,
    changed_files: &'a [String],
    modules: Vec<ModuleStat>,
}

#[derive(Serialize)]
struct ModuleStat {
    name: String,
    cells: usize,
    wires: usize,
}

/// The polling file watcher.
#[derive(Debug)]
pub struct Watcher {
    options: WatchOptions,
    mtimes: BTreeMap<PathBuf, i64>,
    consecutive_errors: u32,
}

impl Watcher {
    /// Creates a watcher for the given options.
    pub fn new(options: WatchOptions) -> Self {
        Self {
            options,
            mtimes: BTreeMap::new(),
            consecutive_errors: 0,
        }
    }

    /// The banner emitted when watch mode starts.
    pub fn start_banner(&self) -> String {
        format!(
            "=== Watch Mode Started ===\nwatching {} file(s), polling every {} ms",
            self.options.files.len(),
            self.options.poll_interval.as_millis()
        )
    }

    /// Runs the watch session until the shutdown flag flips (or
    /// immediately after the first run in one-shot mode).
    ///
    /// The initial read and every driver failure are fatal; reload-time
    /// reader failures are counted and retried.
    pub fn run(
        &mut self,
        ctx: &mut Context,
        design: &mut Design,
        engine: &Engine,
        shutdown: &AtomicBool,
    ) -> Result<WatchReport, DriverError> {
        if self.options.files.is_empty() {
            return Err(DriverError::NoWatchFiles);
        }

        for file in &self.options.files {
            let mtime = file_mtime(file);
            log::info!("watching {} (mtime {mtime})", file.display());
            self.mtimes.insert(file.clone(), mtime);
        }
        println!("{}", self.start_banner());

        // Initial read and synthesis.
        for file in &self.options.files {
            engine
                .read_source(design, file)
                .map_err(DriverError::Source)?;
        }
        driver::run(ctx, design, engine, &self.options.synth)?;

        let mut report = WatchReport::default();
        if self.options.once {
            println!("one-shot mode, exiting\n=== Watch Mode Stopped ===");
            return Ok(report);
        }

        while !shutdown.load(Ordering::SeqCst) {
            std::thread::sleep(self.options.poll_interval);
            if shutdown.load(Ordering::SeqCst) {
                break;
            }

            let changed = self.detect_changes();
            if changed.is_empty() {
                continue;
            }

            // Debounce: if any changed file moved again, the writer is
            // still at work — skip and re-detect next poll.
            std::thread::sleep(self.options.debounce);
            let settled = changed
                .iter()
                .all(|(file, seen)| file_mtime(file) == *seen);
            if !settled {
                log::debug!("change still in flight, deferring reload");
                continue;
            }
            for (file, mtime) in &changed {
                self.mtimes.insert(file.clone(), *mtime);
            }

            let changed_names: Vec<String> = changed
                .iter()
                .map(|(file, _)| file.display().to_string())
                .collect();
            log::info!("reloading after change to {}", changed_names.join(", "));

            let start = Instant::now();
            design.clear_modules();
            if !self.read_all(design, engine) {
                continue;
            }

            driver::run(ctx, design, engine, &self.options.synth)?;
            self.consecutive_errors = 0;
            report.reloads += 1;

            let elapsed_ms = start.elapsed().as_millis() as u64;
            log::info!("reload complete in {elapsed_ms} ms");
            if self.options.emit_events {
                emit_event(design, &changed_names, elapsed_ms);
            }
        }

        println!("=== Watch Mode Stopped ===");
        Ok(report)
    }

    /// Files whose mtime differs from the last committed value, paired
    /// with the newly observed mtime. A zero mtime means the file is
    /// missing.
    fn detect_changes(&self) -> Vec<(PathBuf, i64)> {
        let mut changed = Vec::new();
        for (file, &last) in &self.mtimes {
            let now = file_mtime(file);
            if now != last {
                if now == 0 {
                    log::warn!("watched file {} is missing", file.display());
                }
                changed.push((file.clone(), now));
            }
        }
        changed
    }

    /// Re-reads every watched file. Returns `false` (after counting the
    /// failure) if any read fails.
    fn read_all(&mut self, design: &mut Design, engine: &Engine) -> bool {
        for file in &self.options.files.clone() {
            if let Err(err) = engine.read_source(design, file) {
                self.count_reader_error(&err);
                return false;
            }
        }
        true
    }

    fn count_reader_error(&mut self, err: &vesper_engine::EngineError) {
        self.consecutive_errors += 1;
        log::debug!(
            "source reload failed ({} consecutive): {err}",
            self.consecutive_errors
        );
        if self.consecutive_errors >= ERROR_WARN_THRESHOLD {
            log::warn!("{ERROR_WARN_THRESHOLD} consecutive reload failures, still retrying: {err}");
            self.consecutive_errors = 0;
        }
    }
}

fn emit_event(design: &Design, changed_files: &[String], time_ms: u64) {
    let event = SynthesisEvent {
        event: "synthesis_complete",
        time_ms,
        changed_files,
        modules: design
            .modules()
            .map(|m| ModuleStat {
                name: m.name().to_string(),
                cells: m.cell_count(),
                wires: m.wire_count(),
            })
            .collect(),
    };
    match serde_json::to_string(&event) {
        Ok(line) => println!("{line}"),
        Err(err) => log::warn!("could not serialize watch event: {err}"),
    }
}

/// Modification time in milliseconds since the epoch; zero for missing
/// files.
fn file_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
