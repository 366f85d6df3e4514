//! Single-pass compiler from source to bytecode.
//!
//! Grammar:
//!
//! ```text
//! unit       := stmt*
//! stmt       := "func" IDENT "(" params? ")" block
//!             | "return" expr?
//!             | "if" expr block ("else" (block | if-stmt))?
//!             | "while" expr block
//!             | IDENT "=" expr
//!             | expr
//!             (each optionally followed by ";")
//! block      := "{" stmt* "}"
//! expr       := equality
//! equality   := comparison (("==" | "!=") comparison)*
//! comparison := term (("<" | "<=" | ">" | ">=") term)*
//! term       := factor (("+" | "-") factor)*
//! factor     := unary (("*" | "/") unary)*
//! unary      := ("!" | "-") unary | call
//! call       := IDENT "(" args? ")" | primary
//! primary    := NUMBER | STRING | "true" | "false" | "null" | IDENT | "(" expr ")"
//! ```
//!
//! Inside a function, parameters are locals; every other identifier is a
//! global. `func` declarations are only allowed at the top level.

use crate::bytecode::{CompiledUnit, Function, Opcode};
use crate::lexer::{tokenize, Spanned, Token};
use crate::value::Value;
use crate::{normalize_name, VmError, VmResult};

/// Name given to the function holding a unit's top-level statements
pub const MAIN_NAME: &str = "<main>";

/// Default limit on nested blocks and expressions
pub const MAX_NESTING_DEPTH: usize = 256;

/// Compile a source unit with the default nesting limit.
///
/// # Errors
///
/// Returns `VmError::CompileError` for lexical or syntax errors.
pub fn compile(source: &str) -> VmResult<CompiledUnit> {
    compile_with_limit(source, MAX_NESTING_DEPTH)
}

/// Compile a source unit, rejecting blocks and expressions nested deeper
/// than `max_depth`
pub fn compile_with_limit(source: &str, max_depth: usize) -> VmResult<CompiledUnit> {
    let tokens = tokenize(source)?;
    let mut compiler = Compiler {
        tokens,
        pos: 0,
        functions: Vec::new(),
        current: Function::new(MAIN_NAME, 0),
        params: Vec::new(),
        in_function: false,
        depth: 0,
        max_depth,
    };

    while !compiler.at_end() {
        compiler.statement()?;
    }
    compiler.finish_function();

    Ok(CompiledUnit {
        main: compiler.current,
        functions: compiler.functions,
    })
}

struct Compiler {
    tokens: Vec<Spanned>,
    pos: usize,
    functions: Vec<Function>,
    current: Function,
    params: Vec<String>,
    in_function: bool,
    depth: usize,
    max_depth: usize,
}

impl Compiler {
    // ========================================================================
    // Token helpers
    // ========================================================================

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn peek_next(&self) -> Option<&Token> {
        self.tokens.get(self.pos + 1).map(|s| &s.token)
    }

    fn line(&self) -> usize {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map_or(1, |s| s.line)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|s| s.token.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn check(&self, expected: &Token) -> bool {
        self.peek() == Some(expected)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.check(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: Token, what: &str) -> VmResult<()> {
        if self.eat(&expected) {
            Ok(())
        } else {
            Err(self.error(format!("Expected {}", what)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> VmResult<String> {
        match self.peek() {
            Some(Token::Ident(name)) => {
                let name = normalize_name(name);
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.error(format!("Expected {}", what))),
        }
    }

    fn error(&self, message: String) -> VmError {
        let found = match self.peek() {
            Some(token) => format!("{:?}", token),
            None => "end of input".to_string(),
        };
        VmError::CompileError {
            line: self.line(),
            message: format!("{}, found {}", message, found),
        }
    }

    /// Run `parse` one nesting level deeper, failing past the limit
    fn nested(&mut self, parse: fn(&mut Self) -> VmResult<()>) -> VmResult<()> {
        if self.depth >= self.max_depth {
            return Err(self.error(format!(
                "Maximum nesting depth of {} exceeded",
                self.max_depth
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn finish_function(&mut self) {
        let null = self.current.add_constant(Value::Null);
        self.current.emit(Opcode::Const(null));
        self.current.emit(Opcode::Return);
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn statement(&mut self) -> VmResult<()> {
        match self.peek() {
            Some(Token::Func) => self.func_decl()?,
            Some(Token::Return) => self.return_stmt()?,
            Some(Token::If) => self.if_stmt()?,
            Some(Token::While) => self.while_stmt()?,
            Some(Token::Ident(_)) if self.peek_next() == Some(&Token::Assign) => {
                self.assignment()?
            }
            _ => {
                self.expression()?;
                self.current.emit(Opcode::Pop);
            }
        }
        self.eat(&Token::Semicolon);
        Ok(())
    }

    fn block(&mut self) -> VmResult<()> {
        self.nested(Self::block_body)
    }

    fn block_body(&mut self) -> VmResult<()> {
        self.expect(Token::LBrace, "'{'")?;
        while !self.check(&Token::RBrace) {
            if self.at_end() {
                return Err(self.error("Expected '}'".to_string()));
            }
            self.statement()?;
        }
        self.pos += 1;
        Ok(())
    }

    fn func_decl(&mut self) -> VmResult<()> {
        if self.in_function {
            return Err(self.error("Nested func declarations are not allowed".to_string()));
        }
        self.pos += 1;
        let name = self.expect_ident("function name")?;

        self.expect(Token::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&Token::RParen) {
            loop {
                let param = self.expect_ident("parameter name")?;
                if params.contains(&param) {
                    return Err(self.error(format!("Duplicate parameter '{}'", param)));
                }
                params.push(param);
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')'")?;

        let outer = std::mem::replace(&mut self.current, Function::new(name, params.len()));
        self.params = params;
        self.in_function = true;

        let body = self.block();

        self.in_function = false;
        self.params.clear();
        self.finish_function();
        let function = std::mem::replace(&mut self.current, outer);
        body?;

        self.functions.push(function);
        Ok(())
    }

    fn return_stmt(&mut self) -> VmResult<()> {
        self.pos += 1;
        let ends_value = matches!(
            self.peek(),
            None | Some(Token::RBrace) | Some(Token::Semicolon)
        );
        if ends_value {
            let null = self.current.add_constant(Value::Null);
            self.current.emit(Opcode::Const(null));
        } else {
            self.expression()?;
        }
        self.current.emit(Opcode::Return);
        Ok(())
    }

    fn if_stmt(&mut self) -> VmResult<()> {
        self.pos += 1;
        self.expression()?;
        let to_else = self.current.emit(Opcode::JumpIfFalse(0));
        self.block()?;

        if self.eat(&Token::Else) {
            let to_end = self.current.emit(Opcode::Jump(0));
            self.patch(to_else);
            if self.check(&Token::If) {
                self.nested(Self::if_stmt)?;
            } else {
                self.block()?;
            }
            self.patch(to_end);
        } else {
            self.patch(to_else);
        }
        Ok(())
    }

    fn while_stmt(&mut self) -> VmResult<()> {
        self.pos += 1;
        let start = self.current.code.len();
        self.expression()?;
        let to_end = self.current.emit(Opcode::JumpIfFalse(0));
        self.block()?;
        self.current.emit(Opcode::Jump(start));
        self.patch(to_end);
        Ok(())
    }

    fn assignment(&mut self) -> VmResult<()> {
        let name = self.expect_ident("variable name")?;
        self.pos += 1; // '='
        self.expression()?;
        match self.local_index(&name) {
            Some(slot) => self.current.emit(Opcode::StoreLocal(slot)),
            None => {
                let idx = self.current.add_name(&name);
                self.current.emit(Opcode::StoreGlobal(idx))
            }
        };
        Ok(())
    }

    fn patch(&mut self, at: usize) {
        let target = self.current.code.len();
        match &mut self.current.code[at] {
            Opcode::Jump(t) | Opcode::JumpIfFalse(t) => *t = target,
            _ => {}
        }
    }

    fn local_index(&self, name: &str) -> Option<usize> {
        if !self.in_function {
            return None;
        }
        self.params.iter().position(|p| p == name)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn expression(&mut self) -> VmResult<()> {
        self.nested(Self::equality)
    }

    fn equality(&mut self) -> VmResult<()> {
        self.comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::EqEq) => Opcode::Eq,
                Some(Token::NotEq) => Opcode::Ne,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.comparison()?;
            self.current.emit(op);
        }
    }

    fn comparison(&mut self) -> VmResult<()> {
        self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => Opcode::Lt,
                Some(Token::LtEq) => Opcode::Le,
                Some(Token::Gt) => Opcode::Gt,
                Some(Token::GtEq) => Opcode::Ge,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.term()?;
            self.current.emit(op);
        }
    }

    fn term(&mut self) -> VmResult<()> {
        self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Opcode::Add,
                Some(Token::Minus) => Opcode::Sub,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.factor()?;
            self.current.emit(op);
        }
    }

    fn factor(&mut self) -> VmResult<()> {
        self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Opcode::Mul,
                Some(Token::Slash) => Opcode::Div,
                _ => return Ok(()),
            };
            self.pos += 1;
            self.unary()?;
            self.current.emit(op);
        }
    }

    fn unary(&mut self) -> VmResult<()> {
        let op = match self.peek() {
            Some(Token::Bang) => Opcode::Not,
            Some(Token::Minus) => Opcode::Neg,
            _ => return self.call(),
        };
        self.pos += 1;
        self.nested(Self::unary)?;
        self.current.emit(op);
        Ok(())
    }

    fn call(&mut self) -> VmResult<()> {
        if !matches!(self.peek(), Some(Token::Ident(_))) || self.peek_next() != Some(&Token::LParen)
        {
            return self.primary();
        }

        let name = self.expect_ident("function name")?;
        self.pos += 1; // '('
        let idx = self.current.add_name(&name);
        self.current.emit(Opcode::LoadFunc(idx));

        let mut argc = 0;
        if !self.check(&Token::RParen) {
            loop {
                self.expression()?;
                argc += 1;
                if !self.eat(&Token::Comma) {
                    break;
                }
            }
        }
        self.expect(Token::RParen, "')' after arguments")?;
        self.current.emit(Opcode::Call(argc));
        Ok(())
    }

    fn primary(&mut self) -> VmResult<()> {
        let line = self.line();
        let token = self.advance().ok_or(VmError::CompileError {
            line,
            message: "Unexpected end of input".to_string(),
        })?;

        let constant = match token {
            Token::Number(n) => Value::Number(n),
            Token::Str(s) => Value::Str(s),
            Token::True => Value::Bool(true),
            Token::False => Value::Bool(false),
            Token::Null => Value::Null,
            Token::Ident(name) => {
                let name = normalize_name(&name);
                match self.local_index(&name) {
                    Some(slot) => self.current.emit(Opcode::LoadLocal(slot)),
                    None => {
                        let idx = self.current.add_name(&name);
                        self.current.emit(Opcode::LoadGlobal(idx))
                    }
                };
                return Ok(());
            }
            Token::LParen => {
                self.expression()?;
                return self.expect(Token::RParen, "')'");
            }
            other => {
                return Err(VmError::CompileError {
                    line,
                    message: format!("Unexpected token {:?}", other),
                })
            }
        };

        let idx = self.current.add_constant(constant);
        self.current.emit(Opcode::Const(idx));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_assignment() {
        let unit = compile("x = 1 + 1").unwrap();
        assert!(unit.functions.is_empty());
        assert_eq!(unit.main.names, vec!["x".to_string()]);
        assert_eq!(
            unit.main.code,
            vec![
                Opcode::Const(0),
                Opcode::Const(0),
                Opcode::Add,
                Opcode::StoreGlobal(0),
                Opcode::Const(1),
                Opcode::Return,
            ]
        );
    }

    #[test]
    fn test_compile_function_declaration() {
        let unit = compile("func OnGreet(id, payload) { last = id + payload }").unwrap();
        assert_eq!(unit.functions.len(), 1);
        let f = &unit.functions[0];
        assert_eq!(f.name, "ongreet");
        assert_eq!(f.param_count, 2);
        assert_eq!(f.code[0], Opcode::LoadLocal(0));
        assert_eq!(f.code[1], Opcode::LoadLocal(1));
        assert_eq!(f.code.last(), Some(&Opcode::Return));
    }

    #[test]
    fn test_call_emits_two_phase_sequence() {
        let unit = compile("Record(\"a\", 2)").unwrap();
        assert_eq!(unit.main.code[0], Opcode::LoadFunc(0));
        assert_eq!(unit.main.code[3], Opcode::Call(2));
        assert_eq!(unit.main.code[4], Opcode::Pop);
        assert_eq!(unit.main.names[0], "record");
    }

    #[test]
    fn test_if_else_jumps_are_patched() {
        let unit = compile("if x { y = 1 } else { y = 2 }").unwrap();
        let code = &unit.main.code;
        let Opcode::JumpIfFalse(else_target) = code[1] else {
            panic!("expected JumpIfFalse, got {:?}", code[1]);
        };
        assert!(matches!(code[else_target - 1], Opcode::Jump(_)));
    }

    #[test]
    fn test_nested_func_rejected() {
        let err = compile("func a() { func b() { } }").unwrap_err();
        assert!(matches!(err, VmError::CompileError { .. }));
    }

    #[test]
    fn test_deep_nesting_is_a_compile_error() {
        let depth = MAX_NESTING_DEPTH * 40;
        let parens = format!("x = {}1{}", "(".repeat(depth), ")".repeat(depth));
        let negations = format!("x = {}1", "-".repeat(depth));
        let blocks = format!("{}{}", "if true {".repeat(depth), "}".repeat(depth));
        let chain = format!("if x {{ }}{}", " else if x { }".repeat(depth));

        for source in [parens, negations, blocks, chain] {
            let err = compile(&source).unwrap_err();
            let VmError::CompileError { message, .. } = err else {
                panic!("expected compile error, got {:?}", err);
            };
            assert!(message.contains("nesting depth"), "{}", message);
        }
    }

    #[test]
    fn test_nesting_within_limit_compiles() {
        let source = format!("x = {}1{}", "(".repeat(20), ")".repeat(20));
        assert!(compile_with_limit(&source, 32).is_ok());
        assert!(compile_with_limit(&source, 8).is_err());
    }

    #[test]
    fn test_unterminated_block() {
        let err = compile("func a() {\n x = 1\n").unwrap_err();
        assert!(matches!(err, VmError::CompileError { line: 2, .. }));
    }
}
