//! One incremental synthesis invocation.
//!
//! The driver elaborates, fingerprints every module, splits the design
//! into cached and to-synthesize sets, restores hits through the module
//! codec, runs the transform pipeline on the remainder, and writes new
//! entries back through the cache. Two orderings are load-bearing: the
//! graph and fingerprints are computed before the restore/synthesize
//! split, and stores use the pre-synthesis fingerprint so the next run
//! finds them.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use vesper_cache::ModuleCache;
use vesper_deps::{ChangeMonitor, DependencyGraph};
use vesper_engine::Engine;
use vesper_ir::{fingerprint, Design};

use crate::error::DriverError;

/// Transform-sequence tag for artifacts produced by the standard pipeline.
pub const TRANSFORM_TAG: &str = "post_hierarchy";

/// The shared state a driver run operates on. Threading this through
/// calls (rather than process globals) keeps runs independent and
/// testable side by side.
#[derive(Debug, Default)]
pub struct Context {
    /// The module cache.
    pub cache: ModuleCache,
    /// The dependency graph, rebuilt each run.
    pub graph: DependencyGraph,
    /// The change monitor; survives across runs until reset.
    pub monitor: ChangeMonitor,
}

impl Context {
    /// Creates a context with an uninitialized cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context around an existing cache.
    pub fn with_cache(cache: ModuleCache) -> Self {
        Self {
            cache,
            ..Self::default()
        }
    }
}

/// Flags for one driver invocation.
#[derive(Debug, Clone, Default)]
pub struct SynthOptions {
    /// Cache directory to initialize with, when the cache is not yet
    /// initialized. `None` resolves through the environment.
    pub cache_dir: Option<std::path::PathBuf>,
    /// Top module hint passed to elaboration.
    pub top: Option<String>,
    /// Synthesize everything, ignoring the cache.
    pub force_full: bool,
    /// Do not store results back into the cache.
    pub no_cache: bool,
    /// Skip hierarchy elaboration (the design is already elaborated).
    pub skip_elaboration: bool,
    /// Widen invalidation to transitive dependents of changed modules.
    pub conservative: bool,
}

/// What one driver run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The resolved top module, when elaboration ran.
    pub top: Option<String>,
    /// Modules in the design after elaboration.
    pub module_count: usize,
    /// Modules sent through the transform pipeline, in name order.
    pub synthesized: Vec<String>,
    /// Modules restored from the cache, in name order.
    pub restored: Vec<String>,
    /// Cache hits this run (after conservative widening).
    pub hits: usize,
    /// Cache misses this run (after conservative widening).
    pub misses: usize,
    /// Wall-clock time of the run in milliseconds.
    pub elapsed_ms: u64,
}

/// Runs one incremental synthesis invocation.
pub fn run(
    ctx: &mut Context,
    design: &mut Design,
    engine: &Engine,
    options: &SynthOptions,
) -> Result<RunReport, DriverError> {
    let start = Instant::now();

    // 1. Cache init. Failure disables caching for this run, nothing more.
    if !ctx.cache.is_initialized() && !ctx.cache.init(options.cache_dir.clone()) {
        log::warn!("cache unavailable, continuing without caching");
    }

    // 2. Elaboration. The only step whose failure aborts before any
    //    design surgery has happened.
    let top = if options.skip_elaboration {
        options.top.clone()
    } else {
        Some(
            engine
                .elaborate(design, options.top.as_deref())
                .map_err(DriverError::Elaboration)?,
        )
    };

    // 3. Graph, 4. fingerprints — both over the elaborated design, before
    //    any module is removed or rewritten.
    ctx.graph.build(design);
    let fingerprints: BTreeMap<String, u64> = design
        .modules()
        .map(|m| (m.name().to_string(), fingerprint(m)))
        .collect();

    // 5. Lookup.
    let mut to_synthesize: BTreeSet<String> = BTreeSet::new();
    let mut from_cache: BTreeSet<String> = BTreeSet::new();
    let mut hits = 0usize;
    let mut misses = 0usize;

    if options.force_full {
        to_synthesize.extend(fingerprints.keys().cloned());
        misses = to_synthesize.len();
    } else {
        for (name, &fp) in &fingerprints {
            if ctx.cache.has(name, fp, TRANSFORM_TAG) {
                hits += 1;
                from_cache.insert(name.clone());
            } else {
                misses += 1;
                to_synthesize.insert(name.clone());
            }
        }
    }

    // 6. Conservative widening: any cached module downstream of a module
    //    being synthesized is re-synthesized too, and its entry dropped.
    if options.conservative && !to_synthesize.is_empty() && !from_cache.is_empty() {
        let mut widened: Vec<String> = Vec::new();
        for name in to_synthesize.iter() {
            for dependent in ctx.graph.all_dependents(name) {
                if from_cache.remove(&dependent) {
                    ctx.cache
                        .invalidate_entry(&dependent, fingerprints[&dependent], TRANSFORM_TAG);
                    widened.push(dependent);
                }
            }
        }
        for name in widened {
            log::info!("conservative mode re-synthesizes {name}");
            hits -= 1;
            misses += 1;
            to_synthesize.insert(name);
        }
    }

    // 7. Restore. The elaborated module is taken out by value and put
    //    back if the restore fails, so the fallback synthesis still has
    //    its input.
    let mut restored = Vec::new();
    for name in from_cache {
        let original = design.remove_module(&name);
        if ctx
            .cache
            .restore(&name, fingerprints[&name], TRANSFORM_TAG, design, engine)
        {
            log::debug!("restored {name} from cache");
            restored.push(name);
        } else {
            log::warn!("restore of {name} failed, falling back to synthesis");
            if let Some(module) = original {
                design.add_module(module);
            }
            hits -= 1;
            misses += 1;
            to_synthesize.insert(name);
        }
    }

    // 8. Synthesis.
    if !to_synthesize.is_empty() {
        engine
            .run_pipeline(design, &to_synthesize)
            .map_err(DriverError::Pipeline)?;
    }

    // 9. Store, keyed by the pre-synthesis fingerprint.
    if !options.no_cache {
        for name in &to_synthesize {
            if let Some(module) = design.module(name) {
                ctx.cache
                    .put(name, fingerprints[name], TRANSFORM_TAG, module, engine);
            }
        }
        if ctx.cache.is_initialized() {
            if let Err(err) = ctx.cache.save_to_disk() {
                log::warn!("could not persist cache: {err}");
            }
        }
    }

    let report = RunReport {
        top,
        module_count: fingerprints.len(),
        synthesized: to_synthesize.into_iter().collect(),
        restored,
        hits,
        misses,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };
    log::info!(
        "run complete: {} synthesized, {} restored, {} hit(s), {} miss(es)",
        report.synthesized.len(),
        report.restored.len(),
        report.hits,
        report.misses
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn context(dir: &Path) -> Context {
        let mut cache = ModuleCache::new();
        assert!(cache.init(Some(dir.to_path_buf())));
        Context::with_cache(cache)
    }

    fn and_gate_design(engine: &Engine) -> Design {
        let mut design = Design::new();
        engine
            .read_source_str(&mut design, "module m(a, b, y); y = a & b; endmodule", "m.v")
            .unwrap();
        design
    }

    #[test]
    fn cold_run_synthesizes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path());
        let engine = Engine::new();
        let mut design = and_gate_design(&engine);

        let report = run(&mut ctx, &mut design, &engine, &SynthOptions::default()).unwrap();
        assert_eq!(report.hits, 0);
        assert_eq!(report.misses, 1);
        assert_eq!(report.synthesized, vec!["m"]);
        assert!(report.restored.is_empty());
        assert_eq!(report.top.as_deref(), Some("m"));
    }

    #[test]
    fn warm_run_restores_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new();

        {
            let mut ctx = context(dir.path());
            let mut design = and_gate_design(&engine);
            run(&mut ctx, &mut design, &engine, &SynthOptions::default()).unwrap();
        }

        let mut ctx = context(dir.path());
        let mut design = and_gate_design(&engine);
        let report = run(&mut ctx, &mut design, &engine, &SynthOptions::default()).unwrap();
        assert_eq!(report.hits, 1);
        assert_eq!(report.misses, 0);
        assert_eq!(report.restored, vec!["m"]);
        assert!(report.synthesized.is_empty());

        // The restored module is the synthesized artifact: gate-level.
        let m = design.module("m").unwrap();
        assert!(m.assigns().is_empty());
        assert!(m.cell_count() > 0);
    }

    #[test]
    fn force_full_ignores_cache() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new();

        {
            let mut ctx = context(dir.path());
            let mut design = and_gate_design(&engine);
            run(&mut ctx, &mut design, &engine, &SynthOptions::default()).unwrap();
        }

        let mut ctx = context(dir.path());
        let mut design = and_gate_design(&engine);
        let options = SynthOptions {
            force_full: true,
            ..Default::default()
        };
        let report = run(&mut ctx, &mut design, &engine, &options).unwrap();
        assert_eq!(report.synthesized, vec!["m"]);
        assert!(report.restored.is_empty());
    }

    #[test]
    fn no_cache_skips_store() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new();

        let mut ctx = context(dir.path());
        let mut design = and_gate_design(&engine);
        let options = SynthOptions {
            no_cache: true,
            ..Default::default()
        };
        run(&mut ctx, &mut design, &engine, &options).unwrap();
        assert_eq!(ctx.cache.entry_count(), 0);
    }

    #[test]
    fn elaboration_failure_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new();
        let mut ctx = context(dir.path());
        let mut design = Design::new();
        engine
            .read_source_str(
                &mut design,
                "module top(x); ghost u0 (.x(x)); endmodule",
                "top.v",
            )
            .unwrap();

        let result = run(&mut ctx, &mut design, &engine, &SynthOptions::default());
        assert!(matches!(result, Err(DriverError::Elaboration(_))));
    }

    #[test]
    fn skip_elaboration_reports_no_top() {
        let dir = tempfile::tempdir().unwrap();
        let engine = Engine::new();
        let mut ctx = context(dir.path());
        let mut design = and_gate_design(&engine);
        let options = SynthOptions {
            skip_elaboration: true,
            ..Default::default()
        };
        let report = run(&mut ctx, &mut design, &engine, &options).unwrap();
        assert!(report.top.is_none());
        assert_eq!(report.synthesized, vec!["m"]);
    }

    #[test]
    fn unwritable_cache_dir_degrades_to_synthesis() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"a file, not a directory").unwrap();

        let mut ctx = Context::new();
        let engine = Engine::new();
        let mut design = and_gate_design(&engine);
        let options = SynthOptions {
            cache_dir: Some(blocked),
            ..Default::default()
        };
        let report = run(&mut ctx, &mut design, &engine, &options).unwrap();
        assert_eq!(report.synthesized, vec!["m"]);
        assert_eq!(ctx.cache.entry_count(), 0);
    }
}
