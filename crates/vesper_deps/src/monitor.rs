//! Change monitor — classifies modules as added, deleted, or modified.
//!
//! The monitor captures a fingerprint baseline when attached. Afterwards it
//! consumes the design's mutation journal and, on every [`sync`], diffs
//! current fingerprints against the baseline so that mutations made
//! directly on a borrowed module are also caught. The three change sets
//! stay mutually disjoint at every observable moment.
//!
//! [`sync`]: ChangeMonitor::sync

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use vesper_ir::{fingerprint, Design, DesignEvent};

/// Tracks which modules changed relative to a baseline snapshot.
#[derive(Debug, Default)]
pub struct ChangeMonitor {
    attached: bool,
    baseline: BTreeMap<String, u64>,
    added: BTreeSet<String>,
    deleted: BTreeSet<String>,
    modified: BTreeSet<String>,
}

impl ChangeMonitor {
    /// Creates a detached monitor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the monitor holds a baseline.
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Attaches to a design: captures the fingerprint baseline, clears all
    /// change sets, and discards any stale journal events.
    pub fn attach(&mut self, design: &Design) {
        self.baseline = snapshot(design);
        self.added.clear();
        self.deleted.clear();
        self.modified.clear();
        design.take_events();
        self.attached = true;
        log::debug!("change monitor attached ({} modules)", self.baseline.len());
    }

    /// Re-baselines on the current design state and empties all change sets.
    pub fn reset(&mut self, design: &Design) {
        self.baseline = snapshot(design);
        self.added.clear();
        self.deleted.clear();
        self.modified.clear();
        design.take_events();
    }

    /// Releases the monitor. Always succeeds; safe to call at any time,
    /// including during teardown or when never attached.
    pub fn detach(&mut self) {
        self.attached = false;
        self.baseline.clear();
        self.added.clear();
        self.deleted.clear();
        self.modified.clear();
    }

    /// Applies one mutation event to the change sets.
    pub fn observe(&mut self, event: &DesignEvent) {
        match event {
            DesignEvent::ModuleAdded(name) => {
                if self.deleted.remove(name) {
                    // Deleted then re-added within one session: a rewrite.
                    self.modified.insert(name.clone());
                } else {
                    self.added.insert(name.clone());
                }
            }
            DesignEvent::ModuleDeleted(name) => {
                if self.added.remove(name) {
                    // Added then deleted: transient, no net change.
                } else {
                    self.deleted.insert(name.clone());
                    self.modified.remove(name);
                }
            }
            DesignEvent::ConnectionChanged(name) | DesignEvent::Blackout(name) => {
                self.mark_modified(name);
            }
        }
    }

    fn mark_modified(&mut self, name: &str) {
        if !self.added.contains(name) && !self.deleted.contains(name) {
            self.modified.insert(name.to_string());
        }
    }

    /// Drains the design's journal and rescans fingerprints against the
    /// baseline. Call between driver runs; conforming implementations may
    /// realize change tracking purely through this entry point.
    pub fn sync(&mut self, design: &Design) {
        for event in design.take_events() {
            self.observe(&event);
        }

        // Snapshot diff: catches mutations that bypassed the journal.
        for module in design.modules() {
            match self.baseline.get(module.name()) {
                Some(&fp) => {
                    if fingerprint(module) != fp {
                        self.mark_modified(module.name());
                    }
                }
                None => {
                    if !self.added.contains(module.name()) && !self.modified.contains(module.name())
                    {
                        self.observe(&DesignEvent::ModuleAdded(module.name().to_string()));
                    }
                }
            }
        }
        let gone: Vec<String> = self
            .baseline
            .keys()
            .filter(|name| !design.contains_module(name) && !self.deleted.contains(*name))
            .cloned()
            .collect();
        for name in gone {
            self.observe(&DesignEvent::ModuleDeleted(name));
        }
    }

    /// Returns `true` if any module was added, deleted, or modified.
    pub fn has_changes(&self) -> bool {
        !self.added.is_empty() || !self.deleted.is_empty() || !self.modified.is_empty()
    }

    /// Modules needing synthesis work: `added ∪ modified`. Deleted modules
    /// are not dirty — their cache entries are evicted on demand, but no
    /// work is owed on them.
    pub fn dirty_modules(&self) -> BTreeSet<String> {
        self.added.union(&self.modified).cloned().collect()
    }

    /// Returns `true` if the named module is added or modified.
    pub fn is_dirty(&self, name: &str) -> bool {
        self.added.contains(name) || self.modified.contains(name)
    }

    /// Modules added since the baseline.
    pub fn added(&self) -> &BTreeSet<String> {
        &self.added
    }

    /// Modules deleted since the baseline.
    pub fn deleted(&self) -> &BTreeSet<String> {
        &self.deleted
    }

    /// Modules modified since the baseline.
    pub fn modified(&self) -> &BTreeSet<String> {
        &self.modified
    }

    /// Renders a human-readable change summary for the CLI.
    pub fn render_changes(&self) -> String {
        if !self.has_changes() {
            return "no changes detected\n".to_string();
        }
        let mut out = String::new();
        for (label, set) in [
            ("+", &self.added),
            ("-", &self.deleted),
            ("~", &self.modified),
        ] {
            for name in set.iter() {
                let _ = writeln!(out, "  {label} {name}");
            }
        }
        out
    }
}

fn snapshot(design: &Design) -> BTreeMap<String, u64> {
    design
        .modules()
        .map(|m| (m.name().to_string(), fingerprint(m)))
        .collect()
}
