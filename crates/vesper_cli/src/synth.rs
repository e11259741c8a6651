//! `vesper synth` — run one incremental synthesis invocation.

use std::error::Error;

use vesper_cache::{CacheLimits, ModuleCache};
use vesper_driver::{Context, SynthOptions};
use vesper_engine::Engine;

use crate::pipeline::read_design;
use crate::SynthArgs;

/// Runs the `synth` subcommand. Exit code 1 on fatal pipeline or
/// elaboration failures.
pub fn run(args: &SynthArgs, quiet: bool) -> Result<i32, Box<dyn Error>> {
    let engine = Engine::new();
    let mut design = read_design(&engine, &args.files)?;

    let mut ctx = Context::with_cache(ModuleCache::with_limits(CacheLimits::from_env()));
    let options = SynthOptions {
        cache_dir: args.dir.clone(),
        top: args.top.clone(),
        force_full: args.full,
        no_cache: args.no_cache,
        skip_elaboration: args.skip_elaboration,
        conservative: args.conservative,
    };

    let report = match vesper_driver::run(&mut ctx, &mut design, &engine, &options) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("error: {err}");
            return Ok(1);
        }
    };

    if !quiet {
        if let Some(top) = &report.top {
            eprintln!("       top {top}");
        }
        eprintln!("   modules {}", report.module_count);
        eprintln!(
            "  restored {} ({} hit{})",
            report.restored.len(),
            report.hits,
            if report.hits == 1 { "" } else { "s" }
        );
        eprintln!(
            "synthesized {} ({} miss{})",
            report.synthesized.len(),
            report.misses,
            if report.misses == 1 { "" } else { "es" }
        );
        eprintln!("      time {} ms", report.elapsed_ms);
    }

    if args.stats {
        print!("{}", ctx.cache.render_stats());
    }

    Ok(0)
}
