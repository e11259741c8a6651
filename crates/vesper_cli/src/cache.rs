//! `vesper cache` — manage the module cache.

use std::error::Error;

use vesper_cache::{CacheLimits, ModuleCache};

use crate::CacheArgs;

/// Runs the `cache` subcommand. With no action flags, initializes the
/// cache and shows its status.
pub fn run(args: &CacheArgs, quiet: bool) -> Result<i32, Box<dyn Error>> {
    let mut limits = CacheLimits::from_env();
    if let Some(n) = args.max_entries {
        limits.max_entries = n;
    }
    if let Some(mb) = args.max_size_mb {
        limits.max_size_bytes = mb * 1024 * 1024;
    }
    if let Some(days) = args.max_age_days {
        limits.max_age_seconds = days * 24 * 60 * 60;
    }

    let default_action = !args.init
        && !args.status
        && !args.list
        && !args.clear
        && !args.save
        && !args.evict
        && args.invalidate.is_none();

    let mut cache = ModuleCache::with_limits(limits);
    if !cache.init(args.dir.clone()) {
        eprintln!("error: cache initialization failed");
        return Ok(1);
    }

    if args.clear {
        cache.clear();
        if !quiet {
            eprintln!("cache cleared");
        }
    }

    if let Some(module) = &args.invalidate {
        cache.invalidate(module);
        if !quiet {
            eprintln!("invalidated entries for {module}");
        }
    }

    if args.evict {
        let before = cache.entry_count();
        cache.evict_if_needed();
        if !quiet {
            eprintln!("eviction: {before} -> {} entries", cache.entry_count());
        }
    }

    if args.save {
        cache.save_to_disk()?;
        if !quiet {
            eprintln!("cache saved");
        }
    }

    if args.status || default_action {
        print!("{}", cache.render_stats());
    }

    if args.list {
        print!("{}", cache.render_entries());
    }

    Ok(0)
}
