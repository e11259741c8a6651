//! Hierarchy elaboration.
//!
//! Verifies that every non-primitive cell type resolves to a module in the
//! design and resolves the top module (an explicit hint must exist; with
//! no hint, a module that nobody instantiates is chosen). The accepted
//! source subset has no parameters, so elaboration performs no renaming —
//! but fingerprints are still taken only after this pass has run.

use crate::error::EngineError;
use std::collections::BTreeSet;
use vesper_ir::Design;

/// Scratchpad key recording the resolved top module.
pub const TOP_SCRATCHPAD_KEY: &str = "vesper.top";

/// Runs the hierarchy pass. Returns the resolved top module name.
pub fn hierarchy(design: &mut Design, top: Option<&str>) -> Result<String, EngineError> {
    for module in design.modules() {
        for cell in module.cells() {
            if cell.is_instance() && !design.contains_module(&cell.cell_type) {
                return Err(EngineError::MissingModule {
                    module: cell.cell_type.clone(),
                    instantiated_by: module.name().to_string(),
                });
            }
        }
    }

    let resolved = match top {
        Some(name) => {
            if !design.contains_module(name) {
                return Err(EngineError::MissingTop(name.to_string()));
            }
            name.to_string()
        }
        None => auto_detect_top(design)?,
    };

    design.scratchpad_set(TOP_SCRATCHPAD_KEY, resolved.clone());
    log::debug!("hierarchy resolved top module {resolved}");
    Ok(resolved)
}

/// Picks a module that no other module instantiates. Falls back to the
/// first module in name order when every module is instantiated (cyclic
/// designs).
fn auto_detect_top(design: &Design) -> Result<String, EngineError> {
    if design.is_empty() {
        return Err(EngineError::MissingTop("(empty design)".to_string()));
    }

    let mut instantiated: BTreeSet<&str> = BTreeSet::new();
    for module in design.modules() {
        for cell in module.cells() {
            if cell.is_instance() {
                instantiated.insert(cell.cell_type.as_str());
            }
        }
    }

    let root = design
        .modules()
        .map(|m| m.name())
        .find(|name| !instantiated.contains(name))
        .unwrap_or_else(|| {
            design
                .modules()
                .next()
                .map(|m| m.name())
                .expect("design is non-empty")
        });
    Ok(root.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn read(src: &str) -> Design {
        let mut design = Design::new();
        for module in parse_source(src, "test.v").unwrap() {
            design.add_module(module);
        }
        design
    }

    #[test]
    fn resolves_explicit_top() {
        let mut design = read("module a(x); endmodule module b(x); endmodule");
        let top = hierarchy(&mut design, Some("b")).unwrap();
        assert_eq!(top, "b");
        assert_eq!(design.scratchpad_get(TOP_SCRATCHPAD_KEY), Some("b"));
    }

    #[test]
    fn missing_explicit_top_is_fatal() {
        let mut design = read("module a(x); endmodule");
        assert!(matches!(
            hierarchy(&mut design, Some("zz")),
            Err(EngineError::MissingTop(_))
        ));
    }

    #[test]
    fn auto_detects_uninstantiated_root() {
        let mut design = read(
            "module leaf(x); endmodule\nmodule top(x); leaf u0 (.x(x)); endmodule",
        );
        assert_eq!(hierarchy(&mut design, None).unwrap(), "top");
    }

    #[test]
    fn unresolved_instance_is_fatal() {
        let mut design = read("module top(x); ghost u0 (.x(x)); endmodule");
        match hierarchy(&mut design, None) {
            Err(EngineError::MissingModule {
                module,
                instantiated_by,
            }) => {
                assert_eq!(module, "ghost");
                assert_eq!(instantiated_by, "top");
            }
            other => panic!("expected MissingModule, got {other:?}"),
        }
    }

    #[test]
    fn empty_design_is_fatal() {
        let mut design = Design::new();
        assert!(hierarchy(&mut design, None).is_err());
    }

    #[test]
    fn cyclic_design_still_resolves() {
        let mut design = read(
            "module a(x); b u0 (.x(x)); endmodule\nmodule b(x); a u0 (.x(x)); endmodule",
        );
        // Both modules are instantiated; fall back to name order.
        assert_eq!(hierarchy(&mut design, None).unwrap(), "a");
    }
}
