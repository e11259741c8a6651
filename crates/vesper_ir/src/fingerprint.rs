//! Content fingerprinting for cache keys.
//!
//! The fingerprint is a 64-bit XXH3 hash over a canonical serialization of
//! a module's structural content: ports in declaration order, wires sorted
//! by name, cells sorted by cell name (parameters by key, bindings by port
//! name), assigns and module-level connections in declaration order, and
//! attributes sorted by key. Semantically order-independent collections are
//! therefore folded in a stable order, so unrelated restructuring of
//! internal containers does not change the hash.
//!
//! Hashing is infallible and memoized on the module; any mutation through
//! the module's API clears the memo. Collisions are tolerated: the cache
//! key also includes the module name, and a colliding entry would be a
//! structurally identical artifact.

use crate::cell::SigRef;
use crate::expr::Expr;
use crate::module::{Module, PortDirection};
use xxhash_rust::xxh3::Xxh3;

/// Computes (or returns the memoized) content fingerprint of a module.
pub fn fingerprint(module: &Module) -> u64 {
    if let Some(v) = module.cached_fingerprint() {
        return v;
    }

    let mut h = Xxh3::new();

    h.update(b"ports");
    for port in module.ports() {
        put_str(&mut h, &port.name);
        h.update(&port.width.to_le_bytes());
        h.update(&[match port.direction {
            PortDirection::Input => 0u8,
            PortDirection::Output => 1u8,
        }]);
    }

    h.update(b"wires");
    for wire in module.wires() {
        put_str(&mut h, &wire.name);
        h.update(&wire.width.to_le_bytes());
        for (k, v) in &wire.attributes {
            put_str(&mut h, k);
            put_str(&mut h, v);
        }
    }

    h.update(b"cells");
    for cell in module.cells() {
        put_str(&mut h, &cell.name);
        put_str(&mut h, &cell.cell_type);
        for (k, v) in &cell.parameters {
            put_str(&mut h, k);
            h.update(&v.to_le_bytes());
        }
        for (port, sig) in &cell.connections {
            put_str(&mut h, port);
            put_sigref(&mut h, sig);
        }
    }

    h.update(b"assigns");
    for assign in module.assigns() {
        put_str(&mut h, &assign.target);
        put_expr(&mut h, &assign.expr);
    }

    h.update(b"connections");
    for (lhs, rhs) in module.connections() {
        put_sigref(&mut h, lhs);
        put_sigref(&mut h, rhs);
    }

    h.update(b"attributes");
    for (k, v) in module.attributes() {
        put_str(&mut h, k);
        put_str(&mut h, v);
    }

    let value = h.digest();
    module.memoize_fingerprint(value);
    value
}

/// Returns `true` if the module's fingerprint equals the expected value.
pub fn matches(module: &Module, expected: u64) -> bool {
    fingerprint(module) == expected
}

fn put_str(h: &mut Xxh3, s: &str) {
    h.update(&(s.len() as u32).to_le_bytes());
    h.update(s.as_bytes());
}

fn put_sigref(h: &mut Xxh3, sig: &SigRef) {
    match sig {
        SigRef::Wire(name) => {
            h.update(&[0u8]);
            put_str(h, name);
        }
        SigRef::Bit(name, bit) => {
            h.update(&[1u8]);
            put_str(h, name);
            h.update(&bit.to_le_bytes());
        }
        SigRef::Const { value, width } => {
            h.update(&[2u8]);
            h.update(&value.to_le_bytes());
            h.update(&width.to_le_bytes());
        }
    }
}

fn put_expr(h: &mut Xxh3, expr: &Expr) {
    match expr {
        Expr::Ref(sig) => {
            h.update(&[0u8]);
            put_sigref(h, sig);
        }
        Expr::Unary(op, a) => {
            h.update(&[1u8]);
            put_str(h, op.cell_type());
            put_expr(h, a);
        }
        Expr::Binary(op, a, b) => {
            h.update(&[2u8]);
            put_str(h, op.cell_type());
            put_expr(h, a);
            put_expr(h, b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::expr::BinaryOp;
    use crate::module::{Assign, Wire};

    fn and_gate() -> Module {
        let mut m = Module::new("m");
        m.add_port("a", 1, PortDirection::Input);
        m.add_port("b", 1, PortDirection::Input);
        m.add_port("y", 1, PortDirection::Output);
        m.add_assign(Assign {
            target: "y".to_string(),
            expr: Expr::Binary(
                BinaryOp::And,
                Box::new(Expr::Ref(SigRef::wire("a"))),
                Box::new(Expr::Ref(SigRef::wire("b"))),
            ),
        });
        m
    }

    #[test]
    fn deterministic_across_calls() {
        let m = and_gate();
        assert_eq!(fingerprint(&m), fingerprint(&m));
    }

    #[test]
    fn identical_content_same_hash() {
        assert_eq!(fingerprint(&and_gate()), fingerprint(&and_gate()));
    }

    #[test]
    fn cell_insertion_order_is_irrelevant() {
        let mut m1 = and_gate();
        m1.add_cell(Cell::new("u1", "sub"));
        m1.add_cell(Cell::new("u2", "sub"));

        let mut m2 = and_gate();
        m2.add_cell(Cell::new("u2", "sub"));
        m2.add_cell(Cell::new("u1", "sub"));

        assert_eq!(fingerprint(&m1), fingerprint(&m2));
    }

    #[test]
    fn wire_insertion_order_is_irrelevant() {
        let mut m1 = and_gate();
        m1.add_wire(Wire::new("t1", 4));
        m1.add_wire(Wire::new("t2", 4));

        let mut m2 = and_gate();
        m2.add_wire(Wire::new("t2", 4));
        m2.add_wire(Wire::new("t1", 4));

        assert_eq!(fingerprint(&m1), fingerprint(&m2));
    }

    #[test]
    fn add_then_remove_wire_restores_hash() {
        let mut m = and_gate();
        let before = fingerprint(&m);

        m.add_wire(Wire::new("t", 8));
        let after = fingerprint(&m);
        assert_ne!(before, after);

        m.remove_wire("t");
        assert_eq!(fingerprint(&m), before);
    }

    #[test]
    fn cell_addition_changes_hash() {
        let mut m = and_gate();
        let before = fingerprint(&m);
        m.add_cell(Cell::new("u1", "sub"));
        assert_ne!(fingerprint(&m), before);
        m.remove_cell("u1");
        assert_eq!(fingerprint(&m), before);
    }

    #[test]
    fn connection_changes_hash() {
        let mut m = and_gate();
        let before = fingerprint(&m);
        m.add_connection(SigRef::wire("y"), SigRef::wire("a"));
        assert_ne!(fingerprint(&m), before);
    }

    #[test]
    fn wire_width_changes_hash() {
        let mut m = and_gate();
        let before = fingerprint(&m);
        m.add_wire(Wire::new("t", 4));
        let with_4 = fingerprint(&m);
        m.add_wire(Wire::new("t", 8));
        assert_ne!(fingerprint(&m), with_4);
        assert_ne!(fingerprint(&m), before);
    }

    #[test]
    fn port_order_is_significant() {
        let mut m1 = Module::new("m");
        m1.add_port("a", 1, PortDirection::Input);
        m1.add_port("b", 1, PortDirection::Input);

        let mut m2 = Module::new("m");
        m2.add_port("b", 1, PortDirection::Input);
        m2.add_port("a", 1, PortDirection::Input);

        assert_ne!(fingerprint(&m1), fingerprint(&m2));
    }

    #[test]
    fn attribute_changes_hash() {
        let mut m = and_gate();
        let before = fingerprint(&m);
        m.set_attribute("keep", "1");
        assert_ne!(fingerprint(&m), before);
    }

    #[test]
    fn matches_api() {
        let m = and_gate();
        let fp = fingerprint(&m);
        assert!(matches(&m, fp));
        assert!(!matches(&m, fp.wrapping_add(1)));
    }

    #[test]
    fn memo_survives_reads_only() {
        let mut m = and_gate();
        let fp = fingerprint(&m);
        assert_eq!(m.cached_fingerprint(), Some(fp));
        m.add_wire(Wire::new("t", 1));
        assert_eq!(m.cached_fingerprint(), None);
    }
}
