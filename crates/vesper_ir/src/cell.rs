//! Cells — module instantiations and engine primitives.
//!
//! A [`Cell`] is either an instantiation of another module (its type names
//! that module) or a primitive operation (type prefixed with `$`). Port
//! bindings are kept in a sorted map so that iteration order is canonical
//! for fingerprinting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A reference to a signal: a whole wire, a single bit of a wire, or a
/// constant value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigRef {
    /// The whole of a named wire.
    Wire(String),
    /// One bit of a named wire (bit index is zero-based from the LSB).
    Bit(String, u32),
    /// A constant value of the given width.
    Const {
        /// The constant value, LSB-aligned.
        value: u64,
        /// Width in bits.
        width: u32,
    },
}

impl SigRef {
    /// Convenience constructor for a whole-wire reference.
    pub fn wire(name: impl Into<String>) -> Self {
        SigRef::Wire(name.into())
    }

    /// Returns the referenced wire name, if any.
    pub fn wire_name(&self) -> Option<&str> {
        match self {
            SigRef::Wire(name) | SigRef::Bit(name, _) => Some(name),
            SigRef::Const { .. } => None,
        }
    }
}

/// A cell inside a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// The instance name, unique within the owning module.
    pub name: String,
    /// The cell type: another module's name, or a `$`-prefixed primitive.
    pub cell_type: String,
    /// Integer parameters, keyed by parameter name.
    pub parameters: BTreeMap<String, i64>,
    /// Port-to-signal bindings, keyed by port name.
    pub connections: BTreeMap<String, SigRef>,
}

impl Cell {
    /// Creates a cell with no parameters or connections.
    pub fn new(name: impl Into<String>, cell_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cell_type: cell_type.into(),
            parameters: BTreeMap::new(),
            connections: BTreeMap::new(),
        }
    }

    /// Binds a port to a signal, replacing any previous binding.
    pub fn connect(&mut self, port: impl Into<String>, sig: SigRef) {
        self.connections.insert(port.into(), sig);
    }

    /// Returns `true` if this cell instantiates a user module (as opposed
    /// to an engine primitive).
    pub fn is_instance(&self) -> bool {
        !crate::is_primitive(&self.cell_type)
    }
}
