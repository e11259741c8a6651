//! `vesper monitor` — inspect change tracking against a fresh baseline.
//!
//! The monitor attaches to the freshly read design, so a single
//! invocation reports no changes unless `--reset` or later mutations are
//! involved; the command exists to exercise and inspect the tracking
//! surface the driver uses internally.

use std::error::Error;

use vesper_deps::ChangeMonitor;
use vesper_engine::Engine;

use crate::pipeline::read_design;
use crate::MonitorArgs;

/// Runs the `monitor` subcommand.
pub fn run(args: &MonitorArgs, quiet: bool) -> Result<i32, Box<dyn Error>> {
    let engine = Engine::new();
    let design = read_design(&engine, &args.files)?;

    let mut monitor = ChangeMonitor::new();
    monitor.attach(&design);
    if !quiet {
        eprintln!("monitor attached ({} modules)", design.module_count());
    }

    if args.reset {
        monitor.reset(&design);
        if !quiet {
            eprintln!("change tracking reset");
        }
    }

    monitor.sync(&design);

    let default_action = !args.status && !args.dirty && !args.detach;
    if args.status || default_action {
        print!("{}", monitor.render_changes());
    }

    if args.dirty {
        let dirty = monitor.dirty_modules();
        if dirty.is_empty() {
            println!("no dirty modules");
        } else {
            println!("dirty modules ({}):", dirty.len());
            for name in dirty {
                println!("  {name}");
            }
        }
    }

    if args.detach {
        monitor.detach();
        if !quiet {
            eprintln!("monitor detached");
        }
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn fresh_baseline_reports_clean() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.v");
        std::fs::write(&path, "module m(a, y); y = a; endmodule").unwrap();

        let args = MonitorArgs::parse_from(["monitor", path.to_str().unwrap(), "--dirty", "--detach"]);
        assert_eq!(run(&args, true).unwrap(), 0);
    }
}
