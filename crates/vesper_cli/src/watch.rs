//! `vesper watch` — watch source files and re-synthesize on change.

use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vesper_cache::{CacheLimits, ModuleCache};
use vesper_driver::{Context, DriverError, SynthOptions, WatchOptions, Watcher, DEFAULT_DEBOUNCE};
use vesper_engine::Engine;
use vesper_ir::Design;

use crate::WatchArgs;

/// Runs the `watch` subcommand. An interrupt flips the shared shutdown
/// flag; a second interrupt exits immediately.
pub fn run(args: &WatchArgs, quiet: bool) -> Result<i32, Box<dyn Error>> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    if let Err(err) = ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    }) {
        log::warn!("could not install interrupt handler: {err}");
    }

    if args.port > 0 && !quiet {
        eprintln!(
            "report port {} is reserved; JSON records go to stdout",
            args.port
        );
    }

    let mut watcher = Watcher::new(WatchOptions {
        files: args.files.clone(),
        synth: SynthOptions {
            top: args.top.clone(),
            ..Default::default()
        },
        poll_interval: Duration::from_millis(args.poll),
        debounce: DEFAULT_DEBOUNCE,
        emit_events: args.port > 0,
        once: args.once,
    });

    let mut ctx = Context::with_cache(ModuleCache::with_limits(CacheLimits::from_env()));
    let engine = Engine::new();
    let mut design = Design::new();

    match watcher.run(&mut ctx, &mut design, &engine, &shutdown) {
        Ok(report) => {
            if !quiet {
                eprintln!("{} reload(s)", report.reloads);
            }
            Ok(0)
        }
        Err(DriverError::NoWatchFiles) => {
            eprintln!("error: no files given to watch");
            Ok(1)
        }
        Err(err) => {
            eprintln!("error: {err}");
            Ok(1)
        }
    }
}
