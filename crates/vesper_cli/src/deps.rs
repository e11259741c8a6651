//! `vesper deps` — build and query the module dependency graph.

use std::collections::BTreeSet;
use std::error::Error;

use vesper_deps::DependencyGraph;
use vesper_engine::Engine;

use crate::pipeline::read_design;
use crate::DepsArgs;

/// Runs the `deps` subcommand. With no action flags, builds the graph
/// and displays it.
pub fn run(args: &DepsArgs, quiet: bool) -> Result<i32, Box<dyn Error>> {
    let engine = Engine::new();
    let mut design = read_design(&engine, &args.files)?;
    engine.elaborate(&mut design, args.top.as_deref())?;

    let default_action = !args.show
        && !args.json
        && !args.order
        && !args.store
        && !args.load
        && args.affected.is_none();

    let mut graph = DependencyGraph::new();
    if args.load {
        if graph.load_from_scratchpad(&design) {
            if !quiet {
                eprintln!("loaded graph with {} modules", graph.module_count());
            }
        } else {
            eprintln!("warning: no dependency graph in scratchpad, building instead");
        }
    }
    if !graph.is_valid() {
        graph.build(&design);
        if !quiet {
            eprintln!("built graph with {} modules", graph.module_count());
        }
    }

    if args.store {
        graph.store_in_scratchpad(&mut design);
    }

    if args.show || default_action {
        print!("{}", graph.render());
    }

    if args.json {
        println!("{}", graph.to_json());
    }

    if args.order {
        for (i, module) in graph.topological_order().iter().enumerate() {
            println!("  {}. {module}", i + 1);
        }
    }

    if let Some(module) = &args.affected {
        let changed: BTreeSet<String> = [module.clone()].into_iter().collect();
        let affected = graph.affected(&changed);
        println!("modules affected if {module} changes:");
        for name in &affected {
            let marker = if name == module { " (changed)" } else { "" };
            println!("  - {name}{marker}");
        }
        println!("total: {} modules need re-synthesis", affected.len());
    }

    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn builds_graph_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.v");
        std::fs::write(
            &path,
            "module leaf(x); endmodule\nmodule top(x); leaf u0 (.x(x)); endmodule",
        )
        .unwrap();

        let args = DepsArgs::parse_from(["deps", path.to_str().unwrap(), "--order"]);
        assert_eq!(run(&args, true).unwrap(), 0);
    }

    #[test]
    fn unresolved_instance_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.v");
        std::fs::write(&path, "module top(x); ghost u0 (.x(x)); endmodule").unwrap();

        let args = DepsArgs::parse_from(["deps", path.to_str().unwrap()]);
        assert!(run(&args, true).is_err());
    }
}
