// File: src/compiler.rs
//
// Single-pass Pratt compiler: tokens flow straight from the scanner into
// bytecode with no intermediate AST. An AST-building compiler isn't
// directly reusable for a single-pass design, but the `Chunk::emit`/
// `patch_jump` emission style carries over unchanged.
//
// Error recovery mirrors clox rather than typical idiomatic Rust: parse
// functions record diagnostics and keep going (panic-mode recovery,
// resynchronizing at the next statement boundary) instead of bailing out
// on the first `Result::Err`, so a single compile can report more than
// one mistake.

use crate::chunk::{Chunk, OpCode};
use crate::gc::Heap;
use crate::object::{ObjFunction, ObjKind};
use crate::scanner::{Scanner, Token, TokenKind};
use crate::value::Value;

#[derive(Clone, Copy, PartialEq, PartialOrd)]
#[repr(u8)]
enum Precedence {
    None,
    Assignment, // =
    Or,
    And,
    Equality,   // == !=
    Comparison, // < > <= >=
    Term,       // + -
    Factor,     // * /
    Unary,      // ! -
    Call,       // . ()
    Primary,
}

impl Precedence {
    fn next(self) -> Precedence {
        use Precedence::*;
        match self {
            None => Assignment,
            Assignment => Or,
            Or => And,
            And => Equality,
            Equality => Comparison,
            Comparison => Term,
            Term => Factor,
            Factor => Unary,
            Unary => Call,
            Call => Primary,
            Primary => Primary,
        }
    }
}

type ParseFn = fn(&mut Compiler, bool);

#[derive(Clone, Copy)]
struct ParseRule {
    prefix: Option<ParseFn>,
    infix: Option<ParseFn>,
    precedence: Precedence,
}

fn rule(kind: TokenKind) -> ParseRule {
    use TokenKind::*;
    let r = |prefix, infix, precedence| ParseRule { prefix, infix, precedence };
    match kind {
        LeftParen => r(Some(Compiler::grouping), Some(Compiler::call), Precedence::Call),
        Dot => r(None, Some(Compiler::dot), Precedence::Call),
        Minus => r(Some(Compiler::unary), Some(Compiler::binary), Precedence::Term),
        Plus => r(None, Some(Compiler::binary), Precedence::Term),
        Slash => r(None, Some(Compiler::binary), Precedence::Factor),
        Star => r(None, Some(Compiler::binary), Precedence::Factor),
        Bang => r(Some(Compiler::unary), None, Precedence::None),
        BangEqual => r(None, Some(Compiler::binary), Precedence::Equality),
        EqualEqual => r(None, Some(Compiler::binary), Precedence::Equality),
        Greater => r(None, Some(Compiler::binary), Precedence::Comparison),
        GreaterEqual => r(None, Some(Compiler::binary), Precedence::Comparison),
        Less => r(None, Some(Compiler::binary), Precedence::Comparison),
        LessEqual => r(None, Some(Compiler::binary), Precedence::Comparison),
        Identifier => r(Some(Compiler::variable), None, Precedence::None),
        String => r(Some(Compiler::string), None, Precedence::None),
        Number => r(Some(Compiler::number), None, Precedence::None),
        And => r(None, Some(Compiler::and_), Precedence::And),
        Or => r(None, Some(Compiler::or_), Precedence::Or),
        False => r(Some(Compiler::literal), None, Precedence::None),
        Nil => r(Some(Compiler::literal), None, Precedence::None),
        True => r(Some(Compiler::literal), None, Precedence::None),
        This => r(Some(Compiler::this_), None, Precedence::None),
        Super => r(Some(Compiler::super_), None, Precedence::None),
        _ => r(None, None, Precedence::None),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum FunctionType {
    Script,
    Function,
    Method,
    Initializer,
}

struct Local<'src> {
    name: &'src str,
    depth: Option<i32>,
    is_captured: bool,
}

#[derive(Clone, Copy)]
struct UpvalueDesc {
    index: u8,
    is_local: bool,
}

struct Frame<'src> {
    function: ObjFunction,
    function_type: FunctionType,
    locals: Vec<Local<'src>>,
    upvalues: Vec<UpvalueDesc>,
    scope_depth: i32,
}

impl<'src> Frame<'src> {
    fn new(function_type: FunctionType) -> Self {
        // Slot 0 is reserved: the receiver for methods/initializers, or an
        // unnamed placeholder for plain functions and the top-level script.
        let slot_zero_name = if function_type == FunctionType::Function { "" } else { "this" };
        Frame {
            function: ObjFunction {
                arity: 0,
                upvalue_count: 0,
                chunk: Chunk::new(),
                name: None,
            },
            function_type,
            locals: vec![Local { name: slot_zero_name, depth: Some(0), is_captured: false }],
            upvalues: Vec::new(),
            scope_depth: 0,
        }
    }
}

struct ClassState {
    has_superclass: bool,
}

pub struct CompileError {
    pub message: String,
    pub line: u32,
}

pub struct Compiler<'src, 'heap> {
    heap: &'heap Heap,
    scanner: Scanner<'src>,
    previous: Token<'src>,
    current: Token<'src>,
    had_error: bool,
    panic_mode: bool,
    errors: Vec<CompileError>,
    frames: Vec<Frame<'src>>,
    class_stack: Vec<ClassState>,
}

impl<'src, 'heap> Compiler<'src, 'heap> {
    pub fn compile(source: &'src str, heap: &'heap Heap) -> Result<crate::object::ObjRef, Vec<CompileError>> {
        let mut compiler = Compiler {
            heap,
            scanner: Scanner::new(source),
            previous: Token { kind: TokenKind::Error, lexeme: "", line: 0 },
            current: Token { kind: TokenKind::Error, lexeme: "", line: 0 },
            had_error: false,
            panic_mode: false,
            errors: Vec::new(),
            frames: vec![Frame::new(FunctionType::Script)],
            class_stack: Vec::new(),
        };
        compiler.advance();
        while !compiler.check(TokenKind::Eof) {
            compiler.declaration();
        }
        compiler.consume(TokenKind::Eof, "expect end of expression");
        let function = compiler.end_compiler();
        if compiler.had_error {
            Err(compiler.errors)
        } else {
            // `compiler.frames` is already empty here (`end_compiler` popped
            // the last one), so the function's own constants have to be
            // marked directly rather than found by walking frames.
            let constants = function.chunk.constants.clone();
            let name = function.name;
            let obj = heap.alloc(ObjKind::Function(function), |h| {
                for constant in &constants {
                    h.mark_value(constant);
                }
                if let Some(name) = name {
                    h.mark_object(name);
                }
            });
            Ok(obj)
        }
    }

    // ---- token stream helpers -------------------------------------------

    fn advance(&mut self) {
        self.previous = self.current;
        loop {
            self.current = self.scanner.scan_token();
            if self.current.kind != TokenKind::Error {
                break;
            }
            self.error_at_current(self.current.lexeme);
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) {
        if self.current.kind == kind {
            self.advance();
        } else {
            self.error_at_current(message);
        }
    }

    fn error_at_current(&mut self, message: &str) {
        self.error_at(self.current, message);
    }

    fn error(&mut self, message: &str) {
        self.error_at(self.previous, message);
    }

    fn error_at(&mut self, token: Token<'src>, message: &str) {
        if self.panic_mode {
            return;
        }
        self.panic_mode = true;
        self.had_error = true;
        let where_ = match token.kind {
            TokenKind::Eof => " at end".to_string(),
            TokenKind::Error => String::new(),
            _ => format!(" at '{}'", token.lexeme),
        };
        self.errors.push(CompileError {
            message: format!("{}{}", message, where_),
            line: token.line,
        });
    }

    fn synchronize(&mut self) {
        self.panic_mode = false;
        while self.current.kind != TokenKind::Eof {
            if self.previous.kind == TokenKind::Semicolon {
                return;
            }
            use TokenKind::*;
            match self.current.kind {
                Class | Fun | Var | For | If | While | Print | Return => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ---- emission ---------------------------------------------------------

    fn frame(&mut self) -> &mut Frame<'src> {
        self.frames.last_mut().expect("compiler always has a frame")
    }

    fn chunk(&mut self) -> &mut Chunk {
        &mut self.frame().function.chunk
    }

    /// Marks every constant (and function name) belonging to a frame
    /// currently mid-compile, so a collection triggered by an allocation
    /// in one statement can't sweep an object a constant pool from an
    /// earlier statement still points to. Passed as `mark_extra` to every
    /// `Heap::alloc`/`intern` call made while a frame is open; mirrors
    /// `Vm::mark_roots` on the interpreter side.
    fn mark_compiler_roots(&self, heap: &Heap) {
        for frame in &self.frames {
            for constant in &frame.function.chunk.constants {
                heap.mark_value(constant);
            }
            if let Some(name) = frame.function.name {
                heap.mark_object(name);
            }
        }
    }

    fn emit_byte(&mut self, byte: u8) {
        let line = self.previous.line;
        self.chunk().write(byte, line);
    }

    fn emit_op(&mut self, op: OpCode) {
        let line = self.previous.line;
        self.chunk().write_op(op, line);
    }

    fn emit_ops(&mut self, a: OpCode, b: u8) {
        self.emit_op(a);
        self.emit_byte(b);
    }

    fn emit_constant(&mut self, value: Value) {
        let idx = self.make_constant(value);
        self.emit_ops(OpCode::Constant, idx);
    }

    fn make_constant(&mut self, value: Value) -> u8 {
        let idx = self.chunk().add_constant(value);
        if idx > u8::MAX as usize {
            self.error("too many constants in one chunk");
            return 0;
        }
        idx as u8
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        let line = self.previous.line;
        self.chunk().emit_jump(op, line)
    }

    fn patch_jump(&mut self, offset: usize) {
        if self.chunk().patch_jump(offset).is_err() {
            self.error("too much code to jump over");
        }
    }

    fn emit_loop(&mut self, loop_start: usize) {
        let line = self.previous.line;
        if self.chunk().emit_loop(loop_start, line).is_err() {
            self.error("loop body too large");
        }
    }

    fn emit_return(&mut self) {
        let function_type = self.frame().function_type;
        if function_type == FunctionType::Initializer {
            self.emit_ops(OpCode::GetLocal, 0);
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.emit_op(OpCode::Return);
    }

    fn end_compiler(&mut self) -> ObjFunction {
        self.emit_return();
        let frame = self.frames.pop().expect("compiler always has a frame");
        frame.function
    }

    // ---- scopes / locals --------------------------------------------------

    fn begin_scope(&mut self) {
        self.frame().scope_depth += 1;
    }

    fn end_scope(&mut self) {
        self.frame().scope_depth -= 1;
        let depth = self.frame().scope_depth;
        while let Some(local) = self.frame().locals.last() {
            if local.depth.map_or(false, |d| d > depth) {
                if self.frame().locals.last().unwrap().is_captured {
                    self.emit_op(OpCode::CloseUpvalue);
                } else {
                    self.emit_op(OpCode::Pop);
                }
                self.frame().locals.pop();
            } else {
                break;
            }
        }
    }

    fn identifier_constant(&mut self, name: &str) -> u8 {
        let interned = self.heap.intern(name, |h| self.mark_compiler_roots(h));
        self.make_constant(Value::Obj(interned))
    }

    fn add_local(&mut self, name: &'src str) {
        if self.frame().locals.len() >= u8::MAX as usize + 1 {
            self.error("too many local variables in function");
            return;
        }
        self.frame().locals.push(Local { name, depth: None, is_captured: false });
    }

    fn declare_variable(&mut self) {
        if self.frame().scope_depth == 0 {
            return;
        }
        let name = self.previous.lexeme;
        let depth = self.frame().scope_depth;
        for local in self.frame().locals.iter().rev() {
            if local.depth.map_or(false, |d| d < depth) {
                break;
            }
            if local.name == name {
                self.error("already a variable with this name in this scope");
                return;
            }
        }
        self.add_local(name);
    }

    fn mark_initialized(&mut self) {
        if self.frame().scope_depth == 0 {
            return;
        }
        let depth = self.frame().scope_depth;
        if let Some(local) = self.frame().locals.last_mut() {
            local.depth = Some(depth);
        }
    }

    fn parse_variable(&mut self, message: &str) -> u8 {
        self.consume(TokenKind::Identifier, message);
        self.declare_variable();
        if self.frame().scope_depth > 0 {
            return 0;
        }
        self.identifier_constant(self.previous.lexeme)
    }

    fn define_variable(&mut self, global: u8) {
        if self.frame().scope_depth > 0 {
            self.mark_initialized();
            return;
        }
        self.emit_ops(OpCode::DefineGlobal, global);
    }

    fn resolve_local(&self, frame_idx: usize, name: &str) -> Option<(u8, bool)> {
        let locals = &self.frames[frame_idx].locals;
        for (i, local) in locals.iter().enumerate().rev() {
            if local.name == name {
                if local.depth.is_none() {
                    return Some((i as u8, false)); // caller reports the error
                }
                return Some((i as u8, true));
            }
        }
        None
    }

    fn add_upvalue(&mut self, frame_idx: usize, index: u8, is_local: bool) -> u8 {
        let upvalues = &mut self.frames[frame_idx].upvalues;
        for (i, uv) in upvalues.iter().enumerate() {
            if uv.index == index && uv.is_local == is_local {
                return i as u8;
            }
        }
        upvalues.push(UpvalueDesc { index, is_local });
        let count = upvalues.len();
        self.frames[frame_idx].function.upvalue_count = count as u8;
        (count - 1) as u8
    }

    fn resolve_upvalue(&mut self, frame_idx: usize, name: &'src str) -> Option<u8> {
        if frame_idx == 0 {
            return None;
        }
        if let Some((idx, initialized)) = self.resolve_local(frame_idx - 1, name) {
            if !initialized {
                self.error("can't read local variable in its own initializer");
            }
            self.frames[frame_idx - 1].locals[idx as usize].is_captured = true;
            return Some(self.add_upvalue(frame_idx, idx, true));
        }
        if let Some(idx) = self.resolve_upvalue(frame_idx - 1, name) {
            return Some(self.add_upvalue(frame_idx, idx, false));
        }
        None
    }

    // ---- declarations -------------------------------------------------------

    fn declaration(&mut self) {
        if self.matches(TokenKind::Class) {
            self.class_declaration();
        } else if self.matches(TokenKind::Fun) {
            self.fun_declaration();
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.statement();
        }
        if self.panic_mode {
            self.synchronize();
        }
    }

    fn class_declaration(&mut self) {
        self.consume(TokenKind::Identifier, "expect class name");
        let class_name = self.previous.lexeme;
        let name_constant = self.identifier_constant(class_name);
        self.declare_variable();
        self.emit_ops(OpCode::Class, name_constant);
        self.define_variable(name_constant);

        self.class_stack.push(ClassState { has_superclass: false });

        if self.matches(TokenKind::Less) {
            self.consume(TokenKind::Identifier, "expect superclass name");
            self.variable(false);
            if self.previous.lexeme == class_name {
                self.error("a class can't inherit from itself");
            }
            self.begin_scope();
            self.add_local("super");
            self.mark_initialized();
            self.named_variable(class_name, false);
            self.emit_op(OpCode::Inherit);
            self.class_stack.last_mut().unwrap().has_superclass = true;
        }

        self.named_variable(class_name, false);
        self.consume(TokenKind::LeftBrace, "expect '{' before class body");
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.method();
        }
        self.consume(TokenKind::RightBrace, "expect '}' after class body");
        self.emit_op(OpCode::Pop); // the class itself, pushed by `named_variable` above

        let had_superclass = self.class_stack.pop().unwrap().has_superclass;
        if had_superclass {
            self.end_scope();
        }
    }

    fn method(&mut self) {
        self.consume(TokenKind::Identifier, "expect method name");
        let name = self.previous.lexeme;
        let constant = self.identifier_constant(name);
        let function_type = if name == "init" { FunctionType::Initializer } else { FunctionType::Method };
        self.function(function_type);
        self.emit_ops(OpCode::Method, constant);
    }

    fn fun_declaration(&mut self) {
        let global = self.parse_variable("expect function name");
        self.mark_initialized();
        self.function(FunctionType::Function);
        self.define_variable(global);
    }

    fn function(&mut self, function_type: FunctionType) {
        let name = self.previous.lexeme;
        self.frames.push(Frame::new(function_type));
        let name_ref = self.heap.intern(name, |h| self.mark_compiler_roots(h));
        self.frame().function.name = Some(name_ref);
        self.begin_scope();

        self.consume(TokenKind::LeftParen, "expect '(' after function name");
        if !self.check(TokenKind::RightParen) {
            loop {
                self.frame().function.arity += 1;
                if self.frame().function.arity > 255 {
                    self.error_at_current("can't have more than 255 parameters");
                }
                let constant = self.parse_variable("expect parameter name");
                self.define_variable(constant);
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expect ')' after parameters");
        self.consume(TokenKind::LeftBrace, "expect '{' before function body");
        self.block();

        let upvalues = self.frames.last().unwrap().upvalues.clone();
        let function = self.end_compiler();
        // `end_compiler` already popped this function's own frame, so its
        // constants are no longer found by walking `self.frames` — mark
        // them directly alongside the still-open enclosing frames.
        let constants = function.chunk.constants.clone();
        let name = function.name;
        let obj = self.heap.alloc(ObjKind::Function(function), |h| {
            self.mark_compiler_roots(h);
            for constant in &constants {
                h.mark_value(constant);
            }
            if let Some(name) = name {
                h.mark_object(name);
            }
        });
        self.heap.protect(obj);
        let constant = self.make_constant(Value::Obj(obj));
        self.heap.unprotect();
        self.emit_ops(OpCode::Closure, constant);
        for uv in upvalues {
            self.emit_byte(if uv.is_local { 1 } else { 0 });
            self.emit_byte(uv.index);
        }
    }

    fn var_declaration(&mut self) {
        let global = self.parse_variable("expect variable name");
        if self.matches(TokenKind::Equal) {
            self.expression();
        } else {
            self.emit_op(OpCode::Nil);
        }
        self.consume(TokenKind::Semicolon, "expect ';' after variable declaration");
        self.define_variable(global);
    }

    // ---- statements -----------------------------------------------------------

    fn statement(&mut self) {
        if self.matches(TokenKind::Print) {
            self.print_statement();
        } else if self.matches(TokenKind::If) {
            self.if_statement();
        } else if self.matches(TokenKind::Return) {
            self.return_statement();
        } else if self.matches(TokenKind::While) {
            self.while_statement();
        } else if self.matches(TokenKind::For) {
            self.for_statement();
        } else if self.matches(TokenKind::LeftBrace) {
            self.begin_scope();
            self.block();
            self.end_scope();
        } else {
            self.expression_statement();
        }
    }

    fn block(&mut self) {
        while !self.check(TokenKind::RightBrace) && !self.check(TokenKind::Eof) {
            self.declaration();
        }
        self.consume(TokenKind::RightBrace, "expect '}' after block");
    }

    fn print_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "expect ';' after value");
        self.emit_op(OpCode::Print);
    }

    fn return_statement(&mut self) {
        if self.frame().function_type == FunctionType::Script {
            self.error("can't return from top-level code");
        }
        if self.matches(TokenKind::Semicolon) {
            self.emit_return();
        } else {
            if self.frame().function_type == FunctionType::Initializer {
                self.error("can't return a value from an initializer");
            }
            self.expression();
            self.consume(TokenKind::Semicolon, "expect ';' after return value");
            self.emit_op(OpCode::Return);
        }
    }

    fn if_statement(&mut self) {
        self.consume(TokenKind::LeftParen, "expect '(' after 'if'");
        self.expression();
        self.consume(TokenKind::RightParen, "expect ')' after condition");

        let then_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        let else_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(then_jump);
        self.emit_op(OpCode::Pop);

        if self.matches(TokenKind::Else) {
            self.statement();
        }
        self.patch_jump(else_jump);
    }

    fn while_statement(&mut self) {
        let loop_start = self.chunk().code.len();
        self.consume(TokenKind::LeftParen, "expect '(' after 'while'");
        self.expression();
        self.consume(TokenKind::RightParen, "expect ')' after condition");

        let exit_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.statement();
        self.emit_loop(loop_start);

        self.patch_jump(exit_jump);
        self.emit_op(OpCode::Pop);
    }

    fn for_statement(&mut self) {
        self.begin_scope();
        self.consume(TokenKind::LeftParen, "expect '(' after 'for'");
        if self.matches(TokenKind::Semicolon) {
            // no initializer
        } else if self.matches(TokenKind::Var) {
            self.var_declaration();
        } else {
            self.expression_statement();
        }

        let mut loop_start = self.chunk().code.len();
        let mut exit_jump: Option<usize> = None;
        if !self.matches(TokenKind::Semicolon) {
            self.expression();
            self.consume(TokenKind::Semicolon, "expect ';' after loop condition");
            exit_jump = Some(self.emit_jump(OpCode::JumpIfFalse));
            self.emit_op(OpCode::Pop);
        }

        if !self.matches(TokenKind::RightParen) {
            let body_jump = self.emit_jump(OpCode::Jump);
            let increment_start = self.chunk().code.len();
            self.expression();
            self.emit_op(OpCode::Pop);
            self.consume(TokenKind::RightParen, "expect ')' after for clauses");

            self.emit_loop(loop_start);
            loop_start = increment_start;
            self.patch_jump(body_jump);
        }

        self.statement();
        self.emit_loop(loop_start);

        if let Some(exit) = exit_jump {
            self.patch_jump(exit);
            self.emit_op(OpCode::Pop);
        }
        self.end_scope();
    }

    fn expression_statement(&mut self) {
        self.expression();
        self.consume(TokenKind::Semicolon, "expect ';' after expression");
        self.emit_op(OpCode::Pop);
    }

    fn expression(&mut self) {
        self.parse_precedence(Precedence::Assignment);
    }

    fn parse_precedence(&mut self, precedence: Precedence) {
        self.advance();
        let prefix = rule(self.previous.kind).prefix;
        let prefix = match prefix {
            Some(f) => f,
            None => {
                self.error("expect expression");
                return;
            }
        };
        let can_assign = precedence <= Precedence::Assignment;
        prefix(self, can_assign);

        while precedence <= rule(self.current.kind).precedence {
            self.advance();
            if let Some(infix) = rule(self.previous.kind).infix {
                infix(self, can_assign);
            }
        }

        if can_assign && self.matches(TokenKind::Equal) {
            self.error("invalid assignment target");
        }
    }

    // ---- expression grammar rules (Pratt parse functions) --------------------

    fn number(&mut self, _can_assign: bool) {
        let value: f64 = self.previous.lexeme.parse().unwrap_or(f64::NAN);
        self.emit_constant(Value::Number(value));
    }

    fn string(&mut self, _can_assign: bool) {
        let raw = self.previous.lexeme;
        let content = &raw[1..raw.len() - 1];
        let interned = self.heap.intern(content, |h| self.mark_compiler_roots(h));
        self.emit_constant(Value::Obj(interned));
    }

    fn literal(&mut self, _can_assign: bool) {
        match self.previous.kind {
            TokenKind::False => self.emit_op(OpCode::False),
            TokenKind::True => self.emit_op(OpCode::True),
            TokenKind::Nil => self.emit_op(OpCode::Nil),
            _ => unreachable!("literal() only dispatched for false/true/nil"),
        }
    }

    fn grouping(&mut self, _can_assign: bool) {
        self.expression();
        self.consume(TokenKind::RightParen, "expect ')' after expression");
    }

    fn unary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        self.parse_precedence(Precedence::Unary);
        match operator {
            TokenKind::Minus => self.emit_op(OpCode::Negate),
            TokenKind::Bang => self.emit_op(OpCode::Not),
            _ => unreachable!("unary() only dispatched for -/!"),
        }
    }

    fn binary(&mut self, _can_assign: bool) {
        let operator = self.previous.kind;
        let next_precedence = rule(operator).precedence.next();
        self.parse_precedence(next_precedence);
        match operator {
            TokenKind::Plus => self.emit_op(OpCode::Add),
            TokenKind::Minus => self.emit_op(OpCode::Subtract),
            TokenKind::Star => self.emit_op(OpCode::Multiply),
            TokenKind::Slash => self.emit_op(OpCode::Divide),
            TokenKind::BangEqual => {
                self.emit_op(OpCode::Equal);
                self.emit_op(OpCode::Not);
            }
            TokenKind::EqualEqual => self.emit_op(OpCode::Equal),
            TokenKind::Greater => self.emit_op(OpCode::Greater),
            TokenKind::GreaterEqual => {
                self.emit_op(OpCode::Less);
                self.emit_op(OpCode::Not);
            }
            TokenKind::Less => self.emit_op(OpCode::Less),
            TokenKind::LessEqual => {
                self.emit_op(OpCode::Greater);
                self.emit_op(OpCode::Not);
            }
            _ => unreachable!("binary() only dispatched for arithmetic/comparison operators"),
        }
    }

    fn and_(&mut self, _can_assign: bool) {
        let end_jump = self.emit_jump(OpCode::JumpIfFalse);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::And);
        self.patch_jump(end_jump);
    }

    fn or_(&mut self, _can_assign: bool) {
        let else_jump = self.emit_jump(OpCode::JumpIfFalse);
        let end_jump = self.emit_jump(OpCode::Jump);
        self.patch_jump(else_jump);
        self.emit_op(OpCode::Pop);
        self.parse_precedence(Precedence::Or);
        self.patch_jump(end_jump);
    }

    fn call(&mut self, _can_assign: bool) {
        let arg_count = self.argument_list();
        self.emit_ops(OpCode::Call, arg_count);
    }

    fn argument_list(&mut self) -> u8 {
        let mut count: u16 = 0;
        if !self.check(TokenKind::RightParen) {
            loop {
                self.expression();
                if count == 255 {
                    self.error("can't have more than 255 arguments");
                }
                count += 1;
                if !self.matches(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.consume(TokenKind::RightParen, "expect ')' after arguments");
        count as u8
    }

    fn dot(&mut self, can_assign: bool) {
        self.consume(TokenKind::Identifier, "expect property name after '.'");
        let name = self.previous.lexeme;
        let constant = self.identifier_constant(name);

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_ops(OpCode::SetProperty, constant);
        } else if self.matches(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.emit_ops(OpCode::Invoke, constant);
            self.emit_byte(arg_count);
        } else {
            self.emit_ops(OpCode::GetProperty, constant);
        }
    }

    fn this_(&mut self, _can_assign: bool) {
        if self.class_stack.is_empty() {
            self.error("can't use 'this' outside of a class");
            return;
        }
        self.variable(false);
    }

    fn super_(&mut self, _can_assign: bool) {
        if self.class_stack.is_empty() {
            self.error("can't use 'super' outside of a class");
        } else if !self.class_stack.last().unwrap().has_superclass {
            self.error("can't use 'super' in a class with no superclass");
        }
        self.consume(TokenKind::Dot, "expect '.' after 'super'");
        self.consume(TokenKind::Identifier, "expect superclass method name");
        let name = self.previous.lexeme;
        let constant = self.identifier_constant(name);

        self.named_variable("this", false);
        if self.matches(TokenKind::LeftParen) {
            let arg_count = self.argument_list();
            self.named_variable("super", false);
            self.emit_ops(OpCode::SuperInvoke, constant);
            self.emit_byte(arg_count);
        } else {
            self.named_variable("super", false);
            self.emit_ops(OpCode::GetSuper, constant);
        }
    }

    fn variable(&mut self, can_assign: bool) {
        let name = self.previous.lexeme;
        self.named_variable(name, can_assign);
    }

    fn named_variable(&mut self, name: &'src str, can_assign: bool) {
        let frame_idx = self.frames.len() - 1;
        let (get_op, set_op, arg): (OpCode, OpCode, u8) =
            if let Some((idx, initialized)) = self.resolve_local(frame_idx, name) {
                if !initialized {
                    self.error("can't read local variable in its own initializer");
                }
                (OpCode::GetLocal, OpCode::SetLocal, idx)
            } else if let Some(idx) = self.resolve_upvalue(frame_idx, name) {
                (OpCode::GetUpvalue, OpCode::SetUpvalue, idx)
            } else {
                let constant = self.identifier_constant(name);
                (OpCode::GetGlobal, OpCode::SetGlobal, constant)
            };

        if can_assign && self.matches(TokenKind::Equal) {
            self.expression();
            self.emit_ops(set_op, arg);
        } else {
            self.emit_ops(get_op, arg);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_trivial_script() {
        let heap = Heap::new();
        let obj = Compiler::compile("print 1 + 2;", &heap).unwrap_or_else(|errs| {
            panic!("unexpected compile errors: {}", errs.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; "))
        });
        let function = obj.get().as_function().unwrap();
        assert!(!function.chunk.code.is_empty());
    }

    #[test]
    fn reports_unterminated_expression() {
        let heap = Heap::new();
        let result = Compiler::compile("print 1 +;", &heap);
        assert!(result.is_err());
    }

    #[test]
    fn compiles_function_with_closure() {
        let heap = Heap::new();
        let obj = Compiler::compile(
            "fun outer() { var x = 1; fun inner() { return x; } return inner; } outer();",
            &heap,
        )
        .unwrap_or_else(|errs| {
            panic!("unexpected compile errors: {}", errs.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; "))
        });
        assert!(obj.get().as_function().is_some());
    }

    #[test]
    fn compiles_class_with_inheritance() {
        let heap = Heap::new();
        let obj = Compiler::compile(
            "class A { greet() { return \"hi\"; } } class B < A { } var b = B(); b.greet();",
            &heap,
        )
        .unwrap_or_else(|errs| {
            panic!("unexpected compile errors: {}", errs.into_iter().map(|e| e.message).collect::<Vec<_>>().join("; "))
        });
        assert!(obj.get().as_function().is_some());
    }
}
