//! Recursive descent parser for the netlist-Verilog subset.
//!
//! Builds IR modules directly: a module header port list, `wire`/`input`/
//! `output` declarations with optional `[m:n]` ranges, continuous
//! assignments (the `assign` keyword is optional), and named-port module
//! instantiations. Port directions are taken from `input`/`output`
//! declarations; a port driven by an assignment is an output. Nets that
//! are referenced but never declared are created implicitly with width 1.

use crate::error::EngineError;
use crate::lexer::{lex, Token, TokenKind};
use vesper_ir::{Assign, BinaryOp, Cell, Expr, Module, PortDirection, SigRef, UnaryOp, Wire};

/// Parses source text into a list of IR modules.
pub fn parse_source(source: &str, file: &str) -> Result<Vec<Module>, EngineError> {
    let tokens = lex(source, file)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        file,
    };
    parser.parse_all()
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    file: &'a str,
}

impl Parser<'_> {
    fn parse_all(&mut self) -> Result<Vec<Module>, EngineError> {
        let mut modules = Vec::new();
        while !self.at(TokenKind::Eof) {
            modules.push(self.parse_module()?);
        }
        Ok(modules)
    }

    // --- primitives ---

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn peek_kind(&self, offset: usize) -> TokenKind {
        self.tokens
            .get(self.pos + offset)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].clone();
        if !self.at(TokenKind::Eof) {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, EngineError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {what}, found {:?}", self.current().kind)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, EngineError> {
        Ok(self.expect(TokenKind::Ident, what)?.text)
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::Parse {
            file: self.file.to_string(),
            line: self.current().line,
            message: message.into(),
        }
    }

    // --- grammar ---

    fn parse_module(&mut self) -> Result<Module, EngineError> {
        self.expect(TokenKind::Module, "'module'")?;
        let name = self.expect_ident("module name")?;
        let mut module = Module::new(name);

        self.expect(TokenKind::LParen, "'('")?;
        if !self.at(TokenKind::RParen) {
            loop {
                let port = self.expect_ident("port name")?;
                module.add_port(port, 1, PortDirection::Input);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semi, "';'")?;

        let mut instance_index = 0usize;
        while !self.at(TokenKind::Endmodule) {
            if self.at(TokenKind::Eof) {
                return Err(self.error("unexpected end of file inside module"));
            }
            self.parse_item(&mut module, &mut instance_index)?;
        }
        self.expect(TokenKind::Endmodule, "'endmodule'")?;

        declare_implicit_nets(&mut module);
        Ok(module)
    }

    fn parse_item(&mut self, module: &mut Module, instance_index: &mut usize) -> Result<(), EngineError> {
        match self.current().kind {
            TokenKind::Wire => {
                self.advance();
                self.parse_decl(module, None)
            }
            TokenKind::Input => {
                self.advance();
                self.parse_decl(module, Some(PortDirection::Input))
            }
            TokenKind::Output => {
                self.advance();
                self.parse_decl(module, Some(PortDirection::Output))
            }
            TokenKind::Assign => {
                self.advance();
                self.parse_assign(module)
            }
            TokenKind::Ident => {
                if self.peek_kind(1) == TokenKind::Equals {
                    self.parse_assign(module)
                } else {
                    self.parse_instance(module, instance_index)
                }
            }
            other => Err(self.error(format!("expected declaration, assignment, or instance, found {other:?}"))),
        }
    }

    /// `[range] name (, name)* ;` after a `wire`/`input`/`output` keyword.
    fn parse_decl(
        &mut self,
        module: &mut Module,
        direction: Option<PortDirection>,
    ) -> Result<(), EngineError> {
        let width = if self.at(TokenKind::LBracket) {
            self.parse_range()?
        } else {
            1
        };

        loop {
            let name = self.expect_ident("net name")?;
            let is_port = module.ports().iter().any(|p| p.name == name);
            if is_port {
                module.set_port_width(&name, width);
                if let Some(dir) = direction {
                    module.set_port_direction(&name, dir);
                }
            } else {
                if direction.is_some() {
                    return Err(self.error(format!("{name} is not listed in the module port list")));
                }
                module.add_wire(Wire::new(name, width));
            }
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::Semi, "';'")?;
        Ok(())
    }

    /// `[ m : n ]` — width is `|m - n| + 1`.
    fn parse_range(&mut self) -> Result<u32, EngineError> {
        self.expect(TokenKind::LBracket, "'['")?;
        let hi = self.parse_number()?;
        self.expect(TokenKind::Colon, "':'")?;
        let lo = self.parse_number()?;
        self.expect(TokenKind::RBracket, "']'")?;
        Ok(hi.abs_diff(lo) as u32 + 1)
    }

    fn parse_number(&mut self) -> Result<u64, EngineError> {
        let token = self.expect(TokenKind::Number, "number")?;
        token
            .text
            .parse()
            .map_err(|_| self.error(format!("integer {} out of range", token.text)))
    }

    /// `target = expr ;` — marks a target port as an output.
    fn parse_assign(&mut self, module: &mut Module) -> Result<(), EngineError> {
        let target = self.expect_ident("assignment target")?;
        self.expect(TokenKind::Equals, "'='")?;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::Semi, "';'")?;

        if module.ports().iter().any(|p| p.name == target) {
            module.set_port_direction(&target, PortDirection::Output);
        }
        module.add_assign(Assign { target, expr });
        Ok(())
    }

    /// `type name ( .port(sig), ... ) ;`
    fn parse_instance(
        &mut self,
        module: &mut Module,
        instance_index: &mut usize,
    ) -> Result<(), EngineError> {
        let cell_type = self.expect_ident("cell type")?;
        let name = if self.at(TokenKind::Ident) {
            self.advance().text
        } else {
            let n = format!("u${}", *instance_index);
            *instance_index += 1;
            n
        };

        let mut cell = Cell::new(name, cell_type);
        self.expect(TokenKind::LParen, "'('")?;
        if !self.at(TokenKind::RParen) {
            loop {
                self.expect(TokenKind::Dot, "'.'")?;
                let port = self.expect_ident("port name")?;
                self.expect(TokenKind::LParen, "'('")?;
                let sig = if self.at(TokenKind::Number) {
                    let value = self.parse_number()?;
                    SigRef::Const { value, width: 32 }
                } else {
                    SigRef::wire(self.expect_ident("signal name")?)
                };
                self.expect(TokenKind::RParen, "')'")?;
                cell.connect(port, sig);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        self.expect(TokenKind::Semi, "';'")?;

        module.add_cell(cell);
        Ok(())
    }

    // Precedence, loosest first: | then ^ then & then +/- then unary ~.

    fn parse_expr(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_xor()?;
        while self.eat(TokenKind::Pipe) {
            let rhs = self.parse_xor()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_xor(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_and()?;
        while self.eat(TokenKind::Caret) {
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Xor, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_additive()?;
        while self.eat(TokenKind::Amp) {
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, EngineError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.eat(TokenKind::Plus) {
                BinaryOp::Add
            } else if self.eat(TokenKind::Minus) {
                BinaryOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, EngineError> {
        if self.eat(TokenKind::Tilde) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(operand)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, EngineError> {
        match self.current().kind {
            TokenKind::Ident => {
                let name = self.advance().text;
                Ok(Expr::Ref(SigRef::wire(name)))
            }
            TokenKind::Number => {
                let value = self.parse_number()?;
                Ok(Expr::Ref(SigRef::Const { value, width: 32 }))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            other => Err(self.error(format!("expected expression, found {other:?}"))),
        }
    }
}

/// Creates 1-bit wires for nets referenced by assigns or instance bindings
/// but never declared.
fn declare_implicit_nets(module: &mut Module) {
    let mut missing: Vec<String> = Vec::new();
    for assign in module.assigns() {
        if module.wire(&assign.target).is_none() && !missing.iter().any(|n| n == &assign.target) {
            missing.push(assign.target.clone());
        }
        for name in assign.expr.referenced_wires() {
            if module.wire(name).is_none() && !missing.iter().any(|n| n == name) {
                missing.push(name.to_string());
            }
        }
    }
    for cell in module.cells() {
        for sig in cell.connections.values() {
            if let Some(name) = sig.wire_name() {
                if module.wire(name).is_none() && !missing.iter().any(|n| n == name) {
                    missing.push(name.to_string());
                }
            }
        }
    }
    for name in missing {
        module.add_wire(Wire::new(name, 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_module() {
        let modules = parse_source("module m(a, b, y); y = a & b; endmodule", "test.v").unwrap();
        assert_eq!(modules.len(), 1);
        let m = &modules[0];
        assert_eq!(m.name(), "m");
        assert_eq!(m.ports().len(), 3);
        assert_eq!(m.assigns().len(), 1);
        // y is assigned, so it becomes an output.
        let y = m.ports().iter().find(|p| p.name == "y").unwrap();
        assert_eq!(y.direction, PortDirection::Output);
    }

    #[test]
    fn wire_decl_sets_port_width() {
        let src = "module add4(a, b, y);\n  wire [3:0] a;\n  wire [3:0] b;\n  wire [3:0] y;\n  y = a + b;\nendmodule";
        let modules = parse_source(src, "add4.v").unwrap();
        let m = &modules[0];
        assert!(m.ports().iter().all(|p| p.width == 4));
        assert_eq!(m.wire("a").unwrap().width, 4);
    }

    #[test]
    fn input_output_decls() {
        let src = "module m(a, y);\n  input [7:0] a;\n  output [7:0] y;\n  assign y = ~a;\nendmodule";
        let m = &parse_source(src, "m.v").unwrap()[0];
        assert_eq!(m.ports()[0].direction, PortDirection::Input);
        assert_eq!(m.ports()[1].direction, PortDirection::Output);
        assert_eq!(m.ports()[1].width, 8);
    }

    #[test]
    fn instances_become_cells() {
        let src = "module top(a, b, y);\n  sub u1 (.x(a), .z(y));\n  sub u2 (.x(b), .z(y));\nendmodule";
        let m = &parse_source(src, "top.v").unwrap()[0];
        assert_eq!(m.cell_count(), 2);
        let u1 = m.cell("u1").unwrap();
        assert_eq!(u1.cell_type, "sub");
        assert_eq!(u1.connections["x"], SigRef::wire("a"));
    }

    #[test]
    fn instance_without_name_gets_one() {
        let src = "module top(a); sub (.x(a)); endmodule";
        let m = &parse_source(src, "top.v").unwrap()[0];
        assert_eq!(m.cell_count(), 1);
        assert!(m.cells().next().unwrap().name.starts_with("u$"));
    }

    #[test]
    fn precedence_or_binds_loosest() {
        let src = "module m(a, b, c, y); y = a | b & c; endmodule";
        let m = &parse_source(src, "m.v").unwrap()[0];
        match &m.assigns()[0].expr {
            Expr::Binary(BinaryOp::Or, _, rhs) => match rhs.as_ref() {
                Expr::Binary(BinaryOp::And, _, _) => {}
                other => panic!("expected And on rhs, got {other:?}"),
            },
            other => panic!("expected Or at root, got {other:?}"),
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        let src = "module m(a, b, c, y); y = (a | b) & c; endmodule";
        let m = &parse_source(src, "m.v").unwrap()[0];
        match &m.assigns()[0].expr {
            Expr::Binary(BinaryOp::And, lhs, _) => match lhs.as_ref() {
                Expr::Binary(BinaryOp::Or, _, _) => {}
                other => panic!("expected Or on lhs, got {other:?}"),
            },
            other => panic!("expected And at root, got {other:?}"),
        }
    }

    #[test]
    fn multiple_modules_per_file() {
        let src = "module a(x); endmodule\nmodule b(x); endmodule";
        let modules = parse_source(src, "two.v").unwrap();
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].name(), "a");
        assert_eq!(modules[1].name(), "b");
    }

    #[test]
    fn implicit_nets_are_declared() {
        let src = "module m(a, y); y = a & t; endmodule";
        let m = &parse_source(src, "m.v").unwrap()[0];
        assert_eq!(m.wire("t").unwrap().width, 1);
    }

    #[test]
    fn missing_semicolon_errors() {
        let err = parse_source("module m(a) endmodule", "m.v").unwrap_err();
        assert!(err.to_string().contains("expected ';'"));
    }

    #[test]
    fn unterminated_module_errors() {
        let err = parse_source("module m(a); y = a;", "m.v").unwrap_err();
        assert!(err.to_string().contains("unexpected end of file"));
    }

    #[test]
    fn output_decl_for_unlisted_net_errors() {
        let err = parse_source("module m(a); output q; endmodule", "m.v").unwrap_err();
        assert!(err.to_string().contains("not listed"));
    }
}
