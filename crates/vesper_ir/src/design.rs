//! Top-level design container.
//!
//! A [`Design`] owns all modules by name, a string scratchpad for
//! engine-adjacent metadata (top module, persisted dependency graph), and
//! the mutation journal drained by the change monitor.

use crate::cell::SigRef;
use crate::event::DesignEvent;
use crate::module::Module;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// A complete design: all modules, keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Design {
    modules: BTreeMap<String, Module>,
    scratchpad: BTreeMap<String, String>,
    #[serde(skip)]
    journal: RefCell<Vec<DesignEvent>>,
}

impl Design {
    /// Creates an empty design.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of modules in the design.
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Returns `true` if the design contains no modules.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Returns `true` if a module with the given name exists.
    pub fn contains_module(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Looks up a module by name.
    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    /// Looks up a module mutably. Mutations made through the returned
    /// reference invalidate that module's fingerprint memo but are not
    /// journaled; the change monitor's rescan picks them up.
    pub fn module_mut(&mut self, name: &str) -> Option<&mut Module> {
        self.modules.get_mut(name)
    }

    /// Iterates over modules in name order.
    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    /// Returns all module names in name order.
    pub fn module_names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Adds a module, replacing any module of the same name, and journals
    /// the addition.
    pub fn add_module(&mut self, module: Module) {
        let name = module.name().to_string();
        self.modules.insert(name.clone(), module);
        self.journal
            .borrow_mut()
            .push(DesignEvent::ModuleAdded(name));
    }

    /// Removes a module by name, journaling the deletion. Returns the
    /// removed module so callers can reinstate it if needed.
    pub fn remove_module(&mut self, name: &str) -> Option<Module> {
        let removed = self.modules.remove(name);
        if removed.is_some() {
            self.journal
                .borrow_mut()
                .push(DesignEvent::ModuleDeleted(name.to_string()));
        }
        removed
    }

    /// Removes every module from the design, journaling each deletion.
    pub fn clear_modules(&mut self) {
        let names: Vec<String> = self.modules.keys().cloned().collect();
        for name in names {
            self.remove_module(&name);
        }
    }

    /// Appends a module-level connection inside the named module and
    /// journals the change. Returns `false` if the module does not exist.
    pub fn connect(&mut self, module: &str, lhs: SigRef, rhs: SigRef) -> bool {
        match self.modules.get_mut(module) {
            Some(m) => {
                m.add_connection(lhs, rhs);
                self.journal
                    .borrow_mut()
                    .push(DesignEvent::ConnectionChanged(module.to_string()));
                true
            }
            None => false,
        }
    }

    /// Rebinds one port of a cell inside the named module and journals the
    /// change. Returns `false` if the module or cell does not exist.
    pub fn connect_cell_port(&mut self, module: &str, cell: &str, port: &str, sig: SigRef) -> bool {
        let Some(m) = self.modules.get_mut(module) else {
            return false;
        };
        if !m.set_cell_connection(cell, port, sig) {
            return false;
        }
        self.journal
            .borrow_mut()
            .push(DesignEvent::ConnectionChanged(module.to_string()));
        true
    }

    /// Rewrites the named module's body wholesale (keeping its interface)
    /// and journals a blackout. Returns `false` if the module does not exist.
    pub fn blackout(&mut self, module: &str) -> bool {
        match self.modules.get_mut(module) {
            Some(m) => {
                m.clear_body();
                self.journal
                    .borrow_mut()
                    .push(DesignEvent::Blackout(module.to_string()));
                true
            }
            None => false,
        }
    }

    /// Drains and returns all journaled mutation events in order.
    pub fn take_events(&self) -> Vec<DesignEvent> {
        std::mem::take(&mut *self.journal.borrow_mut())
    }

    /// Stores a string value in the design scratchpad.
    pub fn scratchpad_set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.scratchpad.insert(key.into(), value.into());
    }

    /// Reads a string value from the design scratchpad.
    pub fn scratchpad_get(&self, key: &str) -> Option<&str> {
        self.scratchpad.get(key).map(String::as_str)
    }
}
