//! Modules — the unit of caching, hashing, and dependency tracking.
//!
//! A [`Module`] owns its ports, wires, cells, behavioral assigns, and
//! module-level connections. All mutation goes through methods so the
//! memoized content fingerprint can be invalidated; this is what makes
//! repeated [`fingerprint`](crate::fingerprint) calls free within a run.

use crate::cell::{Cell, SigRef};
use crate::expr::Expr;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The direction of a module port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortDirection {
    /// Data flows into the module.
    Input,
    /// Data flows out of the module.
    Output,
}

/// One entry in a module's port list. Port order is part of the module's
/// interface and therefore of its fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// The port name (also the name of its backing wire).
    pub name: String,
    /// Width in bits.
    pub width: u32,
    /// Direction of data flow.
    pub direction: PortDirection,
}

/// A named wire with a width and optional attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    /// The wire name, unique within the module.
    pub name: String,
    /// Width in bits.
    pub width: u32,
    /// Free-form attributes attached by the source or by transforms.
    pub attributes: BTreeMap<String, String>,
}

impl Wire {
    /// Creates a wire with no attributes.
    pub fn new(name: impl Into<String>, width: u32) -> Self {
        Self {
            name: name.into(),
            width,
            attributes: BTreeMap::new(),
        }
    }
}

/// A behavioral continuous assignment (`target = expr;`).
///
/// Assigns are produced by the source reader and consumed by the `proc`
/// transform, which lowers them to primitive cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assign {
    /// The target wire name.
    pub target: String,
    /// The value expression.
    pub expr: Expr,
}

/// A single hardware module.
///
/// Wires and cells are stored in sorted maps, assigns and connections in
/// declaration order; the fingerprinter relies on exactly this layout to
/// produce a canonical hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    name: String,
    ports: Vec<Port>,
    wires: BTreeMap<String, Wire>,
    cells: BTreeMap<String, Cell>,
    assigns: Vec<Assign>,
    connections: Vec<(SigRef, SigRef)>,
    attributes: BTreeMap<String, String>,
    #[serde(skip)]
    fingerprint_memo: std::cell::Cell<Option<u64>>,
}

impl Module {
    /// Creates an empty module with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ports: Vec::new(),
            wires: BTreeMap::new(),
            cells: BTreeMap::new(),
            assigns: Vec::new(),
            connections: Vec::new(),
            attributes: BTreeMap::new(),
            fingerprint_memo: std::cell::Cell::new(None),
        }
    }

    /// The module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The port list in declaration order.
    pub fn ports(&self) -> &[Port] {
        &self.ports
    }

    /// Iterates over wires in name order.
    pub fn wires(&self) -> impl Iterator<Item = &Wire> {
        self.wires.values()
    }

    /// Looks up a wire by name.
    pub fn wire(&self, name: &str) -> Option<&Wire> {
        self.wires.get(name)
    }

    /// The number of wires in the module.
    pub fn wire_count(&self) -> usize {
        self.wires.len()
    }

    /// Iterates over cells in name order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    /// Looks up a cell by name.
    pub fn cell(&self, name: &str) -> Option<&Cell> {
        self.cells.get(name)
    }

    /// The number of cells in the module.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// The behavioral assigns in declaration order.
    pub fn assigns(&self) -> &[Assign] {
        &self.assigns
    }

    /// The module-level connections in declaration order.
    pub fn connections(&self) -> &[(SigRef, SigRef)] {
        &self.connections
    }

    /// The module attributes.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    // --- mutators; every one of these invalidates the fingerprint memo ---

    /// Appends a port and creates its backing wire if absent.
    pub fn add_port(&mut self, name: impl Into<String>, width: u32, direction: PortDirection) {
        let name = name.into();
        self.wires
            .entry(name.clone())
            .or_insert_with(|| Wire::new(name.clone(), width));
        self.ports.push(Port {
            name,
            width,
            direction,
        });
        self.touch();
    }

    /// Sets the direction of an existing port.
    pub fn set_port_direction(&mut self, name: &str, direction: PortDirection) {
        if let Some(p) = self.ports.iter_mut().find(|p| p.name == name) {
            p.direction = direction;
            self.touch();
        }
    }

    /// Sets the width of an existing port and its backing wire.
    pub fn set_port_width(&mut self, name: &str, width: u32) {
        if let Some(p) = self.ports.iter_mut().find(|p| p.name == name) {
            p.width = width;
        }
        if let Some(w) = self.wires.get_mut(name) {
            w.width = width;
        }
        self.touch();
    }

    /// Adds a wire, replacing any existing wire of the same name.
    pub fn add_wire(&mut self, wire: Wire) {
        self.wires.insert(wire.name.clone(), wire);
        self.touch();
    }

    /// Removes a wire by name.
    pub fn remove_wire(&mut self, name: &str) -> Option<Wire> {
        let removed = self.wires.remove(name);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Adds a cell, replacing any existing cell of the same name.
    pub fn add_cell(&mut self, cell: Cell) {
        self.cells.insert(cell.name.clone(), cell);
        self.touch();
    }

    /// Removes a cell by name.
    pub fn remove_cell(&mut self, name: &str) -> Option<Cell> {
        let removed = self.cells.remove(name);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    /// Rebinds one port of an existing cell. Returns `false` if the cell
    /// does not exist.
    pub fn set_cell_connection(&mut self, cell: &str, port: &str, sig: SigRef) -> bool {
        match self.cells.get_mut(cell) {
            Some(c) => {
                c.connect(port.to_string(), sig);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// Appends a behavioral assign.
    pub fn add_assign(&mut self, assign: Assign) {
        self.assigns.push(assign);
        self.touch();
    }

    /// Removes and returns all behavioral assigns (used by `proc`).
    pub fn take_assigns(&mut self) -> Vec<Assign> {
        if self.assigns.is_empty() {
            return Vec::new();
        }
        self.touch();
        std::mem::take(&mut self.assigns)
    }

    /// Appends a module-level connection.
    pub fn add_connection(&mut self, lhs: SigRef, rhs: SigRef) {
        self.connections.push((lhs, rhs));
        self.touch();
    }

    /// Sets a module attribute.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
        self.touch();
    }

    /// Removes every wire, cell, assign, and connection, keeping only the
    /// name and port list. Used for whole-module rewrites.
    pub fn clear_body(&mut self) {
        self.wires.clear();
        self.cells.clear();
        self.assigns.clear();
        self.connections.clear();
        // Port backing wires are re-created so the interface stays intact.
        for p in &self.ports {
            self.wires
                .insert(p.name.clone(), Wire::new(p.name.clone(), p.width));
        }
        self.touch();
    }

    /// Clears the memoized fingerprint.
    pub fn touch(&mut self) {
        self.fingerprint_memo.set(None);
    }

    pub(crate) fn cached_fingerprint(&self) -> Option<u64> {
        self.fingerprint_memo.get()
    }

    pub(crate) fn memoize_fingerprint(&self, value: u64) {
        self.fingerprint_memo.set(Some(value));
    }
}
