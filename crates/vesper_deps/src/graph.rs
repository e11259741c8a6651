//! Module dependency graph.
//!
//! Built by a two-pass scan of the design: first collect all module names,
//! then record an edge for every cell whose type names another module in
//! the set. Primitive cells (`$`-prefixed types) never create edges.
//! Cycles are tolerated — they are warned about during topological
//! ordering, and all transitive queries terminate via visited sets.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt::Write as _;
use vesper_ir::Design;

/// Scratchpad key under which the graph is persisted.
pub const SCRATCHPAD_KEY: &str = "vesper.deps";

/// The module dependency graph of a design.
///
/// `dependencies[m]` holds the modules `m` instantiates; `dependents[m]`
/// holds the inverse. Both are built from the same scan, so
/// `m ∈ dependencies[n]` iff `n ∈ dependents[m]`.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    modules: BTreeSet<String>,
    dependencies: BTreeMap<String, BTreeSet<String>>,
    dependents: BTreeMap<String, BTreeSet<String>>,
    valid: bool,
}

/// Serialized form of the graph, stored as JSON in the design scratchpad.
#[derive(Debug, Serialize, Deserialize)]
struct GraphDoc {
    modules: Vec<GraphNode>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GraphNode {
    name: String,
    dependencies: Vec<String>,
    dependents: Vec<String>,
}

impl DependencyGraph {
    /// Creates an empty, invalid graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discards all graph state.
    pub fn clear(&mut self) {
        self.modules.clear();
        self.dependencies.clear();
        self.dependents.clear();
        self.valid = false;
    }

    /// Rebuilds the graph from the given design.
    pub fn build(&mut self, design: &Design) {
        self.clear();

        for module in design.modules() {
            self.modules.insert(module.name().to_string());
            self.dependencies
                .insert(module.name().to_string(), BTreeSet::new());
            self.dependents
                .insert(module.name().to_string(), BTreeSet::new());
        }

        for module in design.modules() {
            for cell in module.cells() {
                if !cell.is_instance() {
                    continue;
                }
                if self.modules.contains(&cell.cell_type) {
                    self.dependencies
                        .get_mut(module.name())
                        .expect("scanned above")
                        .insert(cell.cell_type.clone());
                    self.dependents
                        .get_mut(&cell.cell_type)
                        .expect("scanned above")
                        .insert(module.name().to_string());
                }
            }
        }

        self.valid = true;
    }

    /// Returns `true` if the graph has been built or loaded.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The number of modules in the graph.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// All module names known to the graph, in name order.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    /// The modules directly instantiated by `name`.
    pub fn direct_dependencies(&self, name: &str) -> BTreeSet<String> {
        self.dependencies.get(name).cloned().unwrap_or_default()
    }

    /// The modules that directly instantiate `name`.
    pub fn direct_dependents(&self, name: &str) -> BTreeSet<String> {
        self.dependents.get(name).cloned().unwrap_or_default()
    }

    /// The transitive closure of modules that depend on `name`.
    pub fn all_dependents(&self, name: &str) -> BTreeSet<String> {
        collect_transitive(&self.dependents, name)
    }

    /// The transitive closure of modules that `name` depends on.
    pub fn all_dependencies(&self, name: &str) -> BTreeSet<String> {
        collect_transitive(&self.dependencies, name)
    }

    /// The changed set plus every transitive dependent of each member.
    /// This is the conservative invalidation frontier.
    pub fn affected(&self, changed: &BTreeSet<String>) -> BTreeSet<String> {
        let mut result = changed.clone();
        for module in changed {
            result.extend(self.all_dependents(module));
        }
        result
    }

    /// A linearization in which every module appears after its
    /// (non-cyclic) dependencies. Cycles are warned once per re-entered
    /// module and broken by treating the module as already visited.
    pub fn topological_order(&self) -> Vec<String> {
        let mut order = Vec::with_capacity(self.modules.len());
        let mut visited = BTreeSet::new();
        let mut in_stack = BTreeSet::new();
        for module in &self.modules {
            self.visit(module, &mut visited, &mut in_stack, &mut order);
        }
        order
    }

    fn visit(
        &self,
        module: &str,
        visited: &mut BTreeSet<String>,
        in_stack: &mut BTreeSet<String>,
        order: &mut Vec<String>,
    ) {
        if visited.contains(module) {
            return;
        }
        if in_stack.contains(module) {
            log::warn!("circular dependency detected involving module {module}");
            return;
        }

        in_stack.insert(module.to_string());
        if let Some(deps) = self.dependencies.get(module) {
            for dep in deps {
                self.visit(dep, visited, in_stack, order);
            }
        }
        in_stack.remove(module);

        visited.insert(module.to_string());
        order.push(module.to_string());
    }

    /// The reverse of [`topological_order`](Self::topological_order):
    /// every module appears before its dependencies.
    pub fn reverse_topological_order(&self) -> Vec<String> {
        let mut order = self.topological_order();
        order.reverse();
        order
    }

    /// The full dependents mapping, for transitive cache invalidation.
    pub fn dependents_map(&self) -> &BTreeMap<String, BTreeSet<String>> {
        &self.dependents
    }

    /// Serializes the graph to a JSON blob.
    pub fn to_json(&self) -> String {
        let doc = GraphDoc {
            modules: self
                .modules
                .iter()
                .map(|name| GraphNode {
                    name: name.clone(),
                    dependencies: self.direct_dependencies(name).into_iter().collect(),
                    dependents: self.direct_dependents(name).into_iter().collect(),
                })
                .collect(),
        };
        serde_json::to_string(&doc).unwrap_or_else(|_| "{\"modules\":[]}".to_string())
    }

    /// Restores the graph from a JSON blob. The graph becomes valid iff at
    /// least one module was recovered.
    pub fn from_json(&mut self, json: &str) {
        self.clear();
        let doc: GraphDoc = match serde_json::from_str(json) {
            Ok(doc) => doc,
            Err(err) => {
                log::warn!("discarding malformed dependency graph blob: {err}");
                return;
            }
        };
        for node in doc.modules {
            if node.name.is_empty() {
                continue;
            }
            self.dependencies
                .insert(node.name.clone(), node.dependencies.into_iter().collect());
            self.dependents
                .insert(node.name.clone(), node.dependents.into_iter().collect());
            self.modules.insert(node.name);
        }
        self.valid = !self.modules.is_empty();
    }

    /// Stores the graph in the design scratchpad.
    pub fn store_in_scratchpad(&self, design: &mut Design) {
        design.scratchpad_set(SCRATCHPAD_KEY, self.to_json());
    }

    /// Loads the graph from the design scratchpad. Returns `true` if a
    /// valid graph was recovered.
    pub fn load_from_scratchpad(&mut self, design: &Design) -> bool {
        match design.scratchpad_get(SCRATCHPAD_KEY) {
            Some(json) => {
                self.from_json(json);
                self.valid
            }
            None => false,
        }
    }

    /// Renders the graph as human-readable text for the CLI.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for module in &self.modules {
            let _ = writeln!(out, "module {module}");
            let deps = self.direct_dependencies(module);
            if deps.is_empty() {
                let _ = writeln!(out, "  instantiates: (none)");
            } else {
                let names: Vec<_> = deps.iter().map(String::as_str).collect();
                let _ = writeln!(out, "  instantiates: {}", names.join(" "));
            }
            let users = self.direct_dependents(module);
            if users.is_empty() {
                let _ = writeln!(out, "  instantiated by: (none)");
            } else {
                let names: Vec<_> = users.iter().map(String::as_str).collect();
                let _ = writeln!(out, "  instantiated by: {}", names.join(" "));
            }
        }
        let _ = writeln!(out, "order: {}", self.topological_order().join(" -> "));
        out
    }
}

/// BFS over one direction of the graph, excluding the start module.
/// The visited set guarantees termination on cycles.
fn collect_transitive(
    graph: &BTreeMap<String, BTreeSet<String>>,
    start: &str,
) -> BTreeSet<String> {
    let mut result = BTreeSet::new();
    let mut worklist: VecDeque<&str> = VecDeque::new();

    if let Some(next) = graph.get(start) {
        for n in next {
            if result.insert(n.clone()) {
                worklist.push_back(n);
            }
        }
    }

    while let Some(current) = worklist.pop_front() {
        if let Some(next) = graph.get(current) {
            for n in next {
                if result.insert(n.clone()) {
                    worklist.push_back(n);
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use vesper_ir::{Cell, Module, PortDirection};

    /// Builds the five-module diamond: m5 -> {m3, m4}, m3 -> {m1, m2},
    /// m4 -> {m1, m2}.
    fn diamond() -> Design {
        let mut design = Design::new();
        for name in ["m1", "m2", "m3", "m4", "m5"] {
            let mut m = Module::new(name);
            m.add_port("a", 1, PortDirection::Input);
            design.add_module(m);
        }
        for (parent, children) in [("m3", ["m1", "m2"]), ("m4", ["m1", "m2"])] {
            let m = design.module_mut(parent).unwrap();
            for (i, child) in children.iter().enumerate() {
                m.add_cell(Cell::new(format!("u{i}"), *child));
            }
        }
        let m5 = design.module_mut("m5").unwrap();
        m5.add_cell(Cell::new("u0", "m3"));
        m5.add_cell(Cell::new("u1", "m4"));
        design
    }

    fn built() -> DependencyGraph {
        let mut g = DependencyGraph::new();
        g.build(&diamond());
        g
    }

    #[test]
    fn build_records_both_directions() {
        let g = built();
        assert!(g.is_valid());
        assert_eq!(g.module_count(), 5);
        assert_eq!(
            g.direct_dependencies("m5"),
            ["m3", "m4"].iter().map(|s| s.to_string()).collect()
        );
        assert_eq!(
            g.direct_dependents("m1"),
            ["m3", "m4"].iter().map(|s| s.to_string()).collect()
        );
    }

    #[test]
    fn edges_are_symmetric() {
        let g = built();
        for module in g.modules() {
            for dep in g.direct_dependencies(module) {
                assert!(g.direct_dependents(&dep).contains(module));
            }
        }
    }

    #[test]
    fn primitive_cells_create_no_edges() {
        let mut design = diamond();
        design
            .module_mut("m1")
            .unwrap()
            .add_cell(Cell::new("g0", "$and"));
        let mut g = DependencyGraph::new();
        g.build(&design);
        assert!(g.direct_dependencies("m1").is_empty());
    }

    #[test]
    fn transitive_dependents() {
        let g = built();
        assert_eq!(
            g.all_dependents("m1"),
            ["m3", "m4", "m5"].iter().map(|s| s.to_string()).collect()
        );
        assert!(g.all_dependents("m5").is_empty());
    }

    #[test]
    fn transitive_dependencies() {
        let g = built();
        assert_eq!(
            g.all_dependencies("m5"),
            ["m1", "m2", "m3", "m4"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
    }

    #[test]
    fn affected_includes_changed_set() {
        let g = built();
        let changed: BTreeSet<String> = ["m1".to_string()].into_iter().collect();
        let affected = g.affected(&changed);
        assert_eq!(
            affected,
            ["m1", "m3", "m4", "m5"]
                .iter()
                .map(|s| s.to_string())
                .collect()
        );
    }

    #[test]
    fn topological_order_respects_dependencies() {
        let g = built();
        let order = g.topological_order();
        assert_eq!(order.len(), 5);
        let pos = |name: &str| order.iter().position(|m| m == name).unwrap();
        assert!(pos("m1") < pos("m3"));
        assert!(pos("m2") < pos("m3"));
        assert!(pos("m1") < pos("m4"));
        assert!(pos("m3") < pos("m5"));
        assert!(pos("m4") < pos("m5"));
    }

    #[test]
    fn reverse_topological_order_puts_roots_first() {
        let g = built();
        let order = g.reverse_topological_order();
        let pos = |name: &str| order.iter().position(|m| m == name).unwrap();
        assert!(pos("m5") < pos("m3"));
        assert!(pos("m3") < pos("m1"));
    }

    #[test]
    fn cyclic_graph_terminates() {
        let mut design = Design::new();
        for name in ["a", "b"] {
            design.add_module(Module::new(name));
        }
        design
            .module_mut("a")
            .unwrap()
            .add_cell(Cell::new("u0", "b"));
        design
            .module_mut("b")
            .unwrap()
            .add_cell(Cell::new("u0", "a"));

        let mut g = DependencyGraph::new();
        g.build(&design);

        let order = g.topological_order();
        assert_eq!(order.len(), 2);
        // Transitive closure includes both modules and terminates.
        let deps = g.all_dependents("a");
        assert!(deps.contains("b"));
        assert!(deps.contains("a"));
    }

    #[test]
    fn json_roundtrip() {
        let g = built();
        let mut restored = DependencyGraph::new();
        restored.from_json(&g.to_json());
        assert!(restored.is_valid());
        assert_eq!(restored.module_count(), 5);
        assert_eq!(restored.all_dependents("m1"), g.all_dependents("m1"));
    }

    #[test]
    fn malformed_json_leaves_graph_invalid() {
        let mut g = DependencyGraph::new();
        g.from_json("not json {{{");
        assert!(!g.is_valid());
        assert_eq!(g.module_count(), 0);
    }

    #[test]
    fn scratchpad_roundtrip() {
        let mut design = diamond();
        let g = built();
        g.store_in_scratchpad(&mut design);

        let mut restored = DependencyGraph::new();
        assert!(restored.load_from_scratchpad(&design));
        assert_eq!(restored.module_count(), 5);
    }

    #[test]
    fn scratchpad_load_without_blob_fails() {
        let design = Design::new();
        let mut g = DependencyGraph::new();
        assert!(!g.load_from_scratchpad(&design));
    }

    #[test]
    fn render_mentions_every_module() {
        let g = built();
        let text = g.render();
        for name in ["m1", "m2", "m3", "m4", "m5"] {
            assert!(text.contains(name));
        }
    }
}
