// File: src/vm.rs
//
// The stack-based virtual machine: call frames, the opcode dispatch loop,
// arithmetic and comparison, calls/invocation/closures, and the runtime
// error path. `CallFrame` plus the `read_byte`/`read_short`/`read_constant`
// cursor over the active chunk is the usual shape for this kind of
// dispatch loop, adapted onto this crate's `Obj`/`Table`/`Heap` model.

use std::cell::{Cell, RefCell};

use crate::chunk::OpCode;
use crate::compiler::Compiler;
use crate::debug::disassemble_instruction;
use crate::errors::{FrameInfo, LumenError};
use crate::gc::Heap;
use crate::native::NATIVES;
use crate::object::{
    format_value, type_name, NativeFn, ObjBoundMethod, ObjClass, ObjClosure, ObjInstance, ObjKind,
    ObjNative, ObjRef, ObjUpvalue, UpvalueLoc,
};
use crate::table::Table;
use crate::value::Value;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = 256 * FRAMES_MAX;

struct CallFrame {
    closure: ObjRef,
    ip: usize,
    slot: usize,
}

pub struct Vm {
    heap: Heap,
    stack: Vec<Value>,
    frames: Vec<CallFrame>,
    globals: Table,
    open_upvalues: Option<ObjRef>,
}

impl Vm {
    pub fn new() -> Self {
        let heap = Heap::new();
        let mut vm = Vm {
            heap,
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(FRAMES_MAX),
            globals: Table::new(),
            open_upvalues: None,
        };
        vm.install_natives();
        vm
    }

    fn install_natives(&mut self) {
        for def in NATIVES {
            self.define_native(def.name, def.arity, def.function);
        }
    }

    /// Registers a host function under `name`, for embedders that want to
    /// extend the built-in set beyond `clock`/`type_of`/`str`/`len`.
    pub fn define_native(&mut self, name: &str, arity: u8, function: NativeFn) {
        let interned = self.heap.intern(name, |h| self.mark_roots(h));
        let obj = self.heap.alloc(
            ObjKind::Native(ObjNative { name: name.into(), arity, function }),
            |h| self.mark_roots(h),
        );
        self.globals.set(interned, Value::Obj(obj));
    }

    pub fn interpret(&mut self, source: &str) -> Result<(), LumenError> {
        let function_obj = Compiler::compile(source, &self.heap).map_err(LumenError::Compile)?;
        self.heap.protect(function_obj);
        let closure = self.heap.alloc(
            ObjKind::Closure(ObjClosure { function: function_obj, upvalues: Vec::new() }),
            |h| self.mark_roots(h),
        );
        self.heap.unprotect();
        self.push(Value::Obj(closure))?;
        self.call_closure(closure, 0)?;
        self.run()
    }

    // ---- GC roots ---------------------------------------------------------

    fn mark_roots(&self, heap: &Heap) {
        for value in &self.stack {
            heap.mark_value(value);
        }
        for frame in &self.frames {
            heap.mark_object(frame.closure);
        }
        for (key, value) in self.globals.iter() {
            heap.mark_object(key);
            heap.mark_value(&value);
        }
        let mut upvalue = self.open_upvalues;
        while let Some(uv) = upvalue {
            heap.mark_object(uv);
            upvalue = uv.get().as_upvalue().unwrap().open_next.get();
        }
    }

    // ---- stack helpers ------------------------------------------------------

    fn push(&mut self, value: Value) -> Result<(), LumenError> {
        if self.stack.len() >= STACK_MAX {
            return Err(self.runtime_error("stack overflow"));
        }
        self.stack.push(value);
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow: compiler-generated code is stack-balanced")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // ---- bytecode stream helpers --------------------------------------------

    fn read_byte(&mut self) -> u8 {
        let idx = self.frames.len() - 1;
        let closure = self.frames[idx].closure;
        let function = closure.get().as_closure().unwrap().function;
        let ip = self.frames[idx].ip;
        let byte = function.get().as_function().unwrap().chunk.code[ip];
        self.frames[idx].ip += 1;
        byte
    }

    fn read_short(&mut self) -> u16 {
        let hi = self.read_byte() as u16;
        let lo = self.read_byte() as u16;
        (hi << 8) | lo
    }

    fn read_constant(&mut self) -> Value {
        let idx = self.read_byte() as usize;
        let frame_idx = self.frames.len() - 1;
        let closure = self.frames[frame_idx].closure;
        let function = closure.get().as_closure().unwrap().function;
        function.get().as_function().unwrap().chunk.constants[idx]
    }

    fn read_constant_obj(&mut self) -> ObjRef {
        self.read_constant()
            .as_obj()
            .expect("this opcode's constant operand is always an object reference")
    }

    // ---- calls --------------------------------------------------------------

    fn call_closure(&mut self, closure: ObjRef, arg_count: u8) -> Result<(), LumenError> {
        let function = closure.get().as_closure().unwrap().function;
        let arity = function.get().as_function().unwrap().arity;
        if arg_count != arity {
            return Err(self.runtime_error(format!(
                "expected {arity} arguments but got {arg_count}"
            )));
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(self.runtime_error("stack overflow"));
        }
        let slot = self.stack.len() - 1 - arg_count as usize;
        self.frames.push(CallFrame { closure, ip: 0, slot });
        Ok(())
    }

    fn call_native(&mut self, function: NativeFn, arity: u8, arg_count: u8) -> Result<(), LumenError> {
        if arg_count != arity {
            return Err(self.runtime_error(format!(
                "expected {arity} arguments but got {arg_count}"
            )));
        }
        let args_start = self.stack.len() - arg_count as usize;
        let args: Vec<Value> = self.stack[args_start..].to_vec();
        let result = function(&self.heap, &args).map_err(|e| self.runtime_error(e))?;
        self.stack.truncate(args_start - 1);
        self.push(result)?;
        Ok(())
    }

    fn instantiate(&mut self, class_ref: ObjRef, arg_count: u8) -> Result<(), LumenError> {
        let instance = self.heap.alloc(
            ObjKind::Instance(ObjInstance { class: class_ref, fields: RefCell::new(Table::new()) }),
            |h| self.mark_roots(h),
        );
        let base = self.stack.len() - 1 - arg_count as usize;
        self.stack[base] = Value::Obj(instance);

        let init_name = self.heap.init_string;
        let init = {
            let class = class_ref.get().as_class().unwrap();
            match class.init.get() {
                Some(v) => Some(v),
                None => {
                    let looked_up = class.methods.borrow().get(init_name);
                    class.init.set(looked_up);
                    looked_up
                }
            }
        };
        match init {
            Some(v) => {
                let init_closure = v.as_obj().expect("'init' is always stored as a closure");
                self.call_closure(init_closure, arg_count)
            }
            None => {
                if arg_count != 0 {
                    return Err(self.runtime_error(format!(
                        "expected 0 arguments but got {arg_count}"
                    )));
                }
                Ok(())
            }
        }
    }

    fn call_value(&mut self, callee: Value, arg_count: u8) -> Result<(), LumenError> {
        let Some(obj) = callee.as_obj() else {
            return Err(self.runtime_error("can only call functions and classes"));
        };

        enum Dispatch {
            Closure,
            Native(NativeFn, u8),
            Class,
            Bound(ObjRef, Value),
            Invalid,
        }

        let dispatch = {
            let header = obj.get();
            if header.as_closure().is_some() {
                Dispatch::Closure
            } else if let Some(n) = header.as_native() {
                Dispatch::Native(n.function, n.arity)
            } else if header.as_class().is_some() {
                Dispatch::Class
            } else if let Some(b) = header.as_bound_method() {
                Dispatch::Bound(b.method, b.receiver)
            } else {
                Dispatch::Invalid
            }
        };

        match dispatch {
            Dispatch::Closure => self.call_closure(obj, arg_count),
            Dispatch::Native(f, arity) => self.call_native(f, arity, arg_count),
            Dispatch::Class => self.instantiate(obj, arg_count),
            Dispatch::Bound(method, receiver) => {
                let base = self.stack.len() - 1 - arg_count as usize;
                self.stack[base] = receiver;
                self.call_closure(method, arg_count)
            }
            Dispatch::Invalid => Err(self.runtime_error("can only call functions and classes")),
        }
    }

    fn bind_method(&mut self, class: ObjRef, name: ObjRef) -> Result<(), LumenError> {
        let method = class.get().as_class().unwrap().methods.borrow().get(name);
        match method {
            Some(v) => {
                let closure = v.as_obj().expect("methods are always stored as closures");
                let receiver = self.pop();
                let bound = self.heap.alloc(
                    ObjKind::BoundMethod(ObjBoundMethod { receiver, method: closure }),
                    |h| self.mark_roots(h),
                );
                self.push(Value::Obj(bound))
            }
            None => Err(self.runtime_error(format!(
                "undefined property '{}'",
                name.get().as_string().unwrap().bytes
            ))),
        }
    }

    fn invoke_from_class(&mut self, class: ObjRef, name: ObjRef, arg_count: u8) -> Result<(), LumenError> {
        let method = class.get().as_class().unwrap().methods.borrow().get(name);
        match method {
            Some(v) => {
                let closure = v.as_obj().expect("methods are always stored as closures");
                self.call_closure(closure, arg_count)
            }
            None => Err(self.runtime_error(format!(
                "undefined property '{}'",
                name.get().as_string().unwrap().bytes
            ))),
        }
    }

    fn invoke(&mut self, name: ObjRef, arg_count: u8) -> Result<(), LumenError> {
        let receiver = self.peek(arg_count as usize);
        let Some(instance_ref) = receiver.as_obj().filter(|o| o.get().as_instance().is_some()) else {
            return Err(self.runtime_error("only instances have methods"));
        };

        let field = instance_ref.get().as_instance().unwrap().fields.borrow().get(name);
        if let Some(value) = field {
            let base = self.stack.len() - 1 - arg_count as usize;
            self.stack[base] = value;
            return self.call_value(value, arg_count);
        }

        let class_ref = instance_ref.get().as_instance().unwrap().class;
        self.invoke_from_class(class_ref, name, arg_count)
    }

    // ---- upvalues -------------------------------------------------------------

    fn capture_upvalue(&mut self, stack_index: usize) -> ObjRef {
        let mut current = self.open_upvalues;
        let mut prev: Option<ObjRef> = None;
        while let Some(uv) = current {
            let idx = match uv.get().as_upvalue().unwrap().location.get() {
                UpvalueLoc::Open(i) => i,
                UpvalueLoc::Closed(_) => unreachable!("the open list never holds a closed upvalue"),
            };
            if idx == stack_index {
                return uv;
            }
            if idx < stack_index {
                break;
            }
            prev = Some(uv);
            current = uv.get().as_upvalue().unwrap().open_next.get();
        }

        let created = self.heap.alloc(
            ObjKind::Upvalue(ObjUpvalue {
                location: Cell::new(UpvalueLoc::Open(stack_index)),
                open_next: Cell::new(current),
            }),
            |h| self.mark_roots(h),
        );
        match prev {
            Some(p) => p.get().as_upvalue().unwrap().open_next.set(Some(created)),
            None => self.open_upvalues = Some(created),
        }
        created
    }

    fn close_upvalues(&mut self, from: usize) {
        while let Some(uv) = self.open_upvalues {
            let idx = match uv.get().as_upvalue().unwrap().location.get() {
                UpvalueLoc::Open(i) => i,
                UpvalueLoc::Closed(_) => break,
            };
            if idx < from {
                break;
            }
            let value = self.stack[idx];
            uv.get().as_upvalue().unwrap().location.set(UpvalueLoc::Closed(value));
            self.open_upvalues = uv.get().as_upvalue().unwrap().open_next.get();
        }
    }

    // ---- errors -----------------------------------------------------------

    fn runtime_error(&mut self, message: impl Into<String>) -> LumenError {
        let message = message.into();
        let mut frames_info = Vec::new();
        for frame in self.frames.iter().rev() {
            let function = frame.closure.get().as_closure().unwrap().function;
            let func = function.get().as_function().unwrap();
            let line = func.chunk.line(frame.ip.saturating_sub(1));
            let name = match func.name {
                Some(n) => format!("{}()", n.get().as_string().unwrap().bytes),
                None => "script".to_string(),
            };
            frames_info.push(FrameInfo { name, line });
        }
        self.stack.clear();
        self.frames.clear();
        self.open_upvalues = None;
        LumenError::runtime(message, frames_info)
    }

    // ---- dispatch loop ------------------------------------------------------

    fn run(&mut self) -> Result<(), LumenError> {
        loop {
            if self.heap.trace_gc {
                print!("          ");
                for value in &self.stack {
                    print!("[ {} ]", format_value(value));
                }
                println!();
                let idx = self.frames.len() - 1;
                let closure = self.frames[idx].closure;
                let function = closure.get().as_closure().unwrap().function;
                disassemble_instruction(&function.get().as_function().unwrap().chunk, self.frames[idx].ip);
            }

            let byte = self.read_byte();
            let Some(op) = OpCode::from_byte(byte) else {
                return Err(self.runtime_error("corrupt bytecode: unrecognized opcode"));
            };

            match op {
                OpCode::Constant => {
                    let value = self.read_constant();
                    self.push(value)?;
                }
                OpCode::Nil => self.push(Value::Nil)?,
                OpCode::True => self.push(Value::Bool(true))?,
                OpCode::False => self.push(Value::Bool(false))?,
                OpCode::Pop => {
                    self.pop();
                }
                OpCode::GetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames[self.frames.len() - 1].slot;
                    self.push(self.stack[base + slot])?;
                }
                OpCode::SetLocal => {
                    let slot = self.read_byte() as usize;
                    let base = self.frames[self.frames.len() - 1].slot;
                    self.stack[base + slot] = self.peek(0);
                }
                OpCode::GetGlobal => {
                    let name = self.read_constant_obj();
                    match self.globals.get(name) {
                        Some(v) => self.push(v)?,
                        None => {
                            return Err(self.runtime_error(format!(
                                "undefined variable '{}'",
                                name.get().as_string().unwrap().bytes
                            )))
                        }
                    }
                }
                OpCode::DefineGlobal => {
                    let name = self.read_constant_obj();
                    let value = self.pop();
                    self.globals.set(name, value);
                }
                OpCode::SetGlobal => {
                    let name = self.read_constant_obj();
                    let value = self.peek(0);
                    if self.globals.set(name, value) {
                        self.globals.delete(name);
                        return Err(self.runtime_error(format!(
                            "undefined variable '{}'",
                            name.get().as_string().unwrap().bytes
                        )));
                    }
                }
                OpCode::GetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let frame_idx = self.frames.len() - 1;
                    let closure = self.frames[frame_idx].closure;
                    let uv = closure.get().as_closure().unwrap().upvalues[slot];
                    let value = match uv.get().as_upvalue().unwrap().location.get() {
                        UpvalueLoc::Open(idx) => self.stack[idx],
                        UpvalueLoc::Closed(v) => v,
                    };
                    self.push(value)?;
                }
                OpCode::SetUpvalue => {
                    let slot = self.read_byte() as usize;
                    let value = self.peek(0);
                    let frame_idx = self.frames.len() - 1;
                    let closure = self.frames[frame_idx].closure;
                    let uv = closure.get().as_closure().unwrap().upvalues[slot];
                    match uv.get().as_upvalue().unwrap().location.get() {
                        UpvalueLoc::Open(idx) => self.stack[idx] = value,
                        UpvalueLoc::Closed(_) => {
                            uv.get().as_upvalue().unwrap().location.set(UpvalueLoc::Closed(value));
                        }
                    }
                }
                OpCode::GetProperty => {
                    let name = self.read_constant_obj();
                    let receiver = self.peek(0);
                    let Some(instance_ref) =
                        receiver.as_obj().filter(|o| o.get().as_instance().is_some())
                    else {
                        return Err(self.runtime_error("only instances have properties"));
                    };
                    let field = instance_ref.get().as_instance().unwrap().fields.borrow().get(name);
                    match field {
                        Some(value) => {
                            self.pop();
                            self.push(value)?;
                        }
                        None => {
                            let class_ref = instance_ref.get().as_instance().unwrap().class;
                            self.bind_method(class_ref, name)?;
                        }
                    }
                }
                OpCode::SetProperty => {
                    let name = self.read_constant_obj();
                    let value = self.peek(0);
                    let receiver = self.peek(1);
                    let Some(instance_ref) =
                        receiver.as_obj().filter(|o| o.get().as_instance().is_some())
                    else {
                        return Err(self.runtime_error("only instances have fields"));
                    };
                    instance_ref.get().as_instance().unwrap().fields.borrow_mut().set(name, value);
                    self.pop();
                    self.pop();
                    self.push(value)?;
                }
                OpCode::GetSuper => {
                    let name = self.read_constant_obj();
                    let superclass = self.pop();
                    let class_ref = superclass.as_obj().expect("'super' always resolves to a class");
                    self.bind_method(class_ref, name)?;
                }
                OpCode::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(a == b))?;
                }
                OpCode::Greater => self.numeric_comparison(|a, b| a > b)?,
                OpCode::Less => self.numeric_comparison(|a, b| a < b)?,
                OpCode::Add => self.add()?,
                OpCode::Subtract => self.numeric_binary(|a, b| a - b)?,
                OpCode::Multiply => self.numeric_binary(|a, b| a * b)?,
                OpCode::Divide => self.numeric_binary(|a, b| a / b)?,
                OpCode::Not => {
                    let v = self.pop();
                    self.push(Value::Bool(v.is_falsey()))?;
                }
                OpCode::Negate => {
                    let v = self.peek(0);
                    match v.as_number() {
                        Some(n) => {
                            self.pop();
                            self.push(Value::Number(-n))?;
                        }
                        None => return Err(self.runtime_error("operand must be a number")),
                    }
                }
                OpCode::Print => {
                    let v = self.pop();
                    println!("{}", format_value(&v));
                }
                OpCode::Jump => {
                    let offset = self.read_short();
                    let idx = self.frames.len() - 1;
                    self.frames[idx].ip += offset as usize;
                }
                OpCode::JumpIfFalse => {
                    let offset = self.read_short();
                    if self.peek(0).is_falsey() {
                        let idx = self.frames.len() - 1;
                        self.frames[idx].ip += offset as usize;
                    }
                }
                OpCode::Loop => {
                    let offset = self.read_short();
                    let idx = self.frames.len() - 1;
                    self.frames[idx].ip -= offset as usize;
                }
                OpCode::Call => {
                    let arg_count = self.read_byte();
                    let callee = self.peek(arg_count as usize);
                    self.call_value(callee, arg_count)?;
                }
                OpCode::Invoke => {
                    let name = self.read_constant_obj();
                    let arg_count = self.read_byte();
                    self.invoke(name, arg_count)?;
                }
                OpCode::SuperInvoke => {
                    let name = self.read_constant_obj();
                    let arg_count = self.read_byte();
                    let superclass = self.pop();
                    let class_ref = superclass.as_obj().expect("'super' always resolves to a class");
                    self.invoke_from_class(class_ref, name, arg_count)?;
                }
                OpCode::Closure => {
                    let function_ref =
                        self.read_constant().as_obj().expect("OP_CLOSURE operand is a function constant");
                    let upvalue_count = function_ref.get().as_function().unwrap().upvalue_count;
                    let mut upvalues = Vec::with_capacity(upvalue_count as usize);
                    for _ in 0..upvalue_count {
                        let is_local = self.read_byte();
                        let index = self.read_byte();
                        if is_local == 1 {
                            let frame_idx = self.frames.len() - 1;
                            let base = self.frames[frame_idx].slot;
                            upvalues.push(self.capture_upvalue(base + index as usize));
                        } else {
                            let frame_idx = self.frames.len() - 1;
                            let enclosing = self.frames[frame_idx].closure;
                            upvalues.push(enclosing.get().as_closure().unwrap().upvalues[index as usize]);
                        }
                    }
                    let closure = self.heap.alloc(
                        ObjKind::Closure(ObjClosure { function: function_ref, upvalues }),
                        |h| self.mark_roots(h),
                    );
                    self.push(Value::Obj(closure))?;
                }
                OpCode::CloseUpvalue => {
                    let top = self.stack.len() - 1;
                    self.close_upvalues(top);
                    self.pop();
                }
                OpCode::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("OP_RETURN always runs inside a frame");
                    self.close_upvalues(frame.slot);
                    self.stack.truncate(frame.slot);
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    self.push(result)?;
                }
                OpCode::Class => {
                    let name = self.read_constant_obj();
                    let class = self.heap.alloc(
                        ObjKind::Class(ObjClass {
                            name,
                            methods: RefCell::new(Table::new()),
                            init: Cell::new(None),
                        }),
                        |h| self.mark_roots(h),
                    );
                    self.push(Value::Obj(class))?;
                }
                OpCode::Inherit => {
                    let superclass = self.peek(1);
                    let subclass = self.peek(0);
                    let Some(super_class_ref) =
                        superclass.as_obj().filter(|o| o.get().as_class().is_some())
                    else {
                        return Err(self.runtime_error("superclass must be a class"));
                    };
                    let sub_class_ref = subclass.as_obj().expect("OP_INHERIT always follows OP_CLASS");
                    let methods: Vec<(ObjRef, Value)> =
                        super_class_ref.get().as_class().unwrap().methods.borrow().iter().collect();
                    for (key, value) in methods {
                        sub_class_ref.get().as_class().unwrap().methods.borrow_mut().set(key, value);
                    }
                    self.pop();
                }
                OpCode::Method => {
                    let name = self.read_constant_obj();
                    let method = self.pop();
                    let class = self.peek(0);
                    let class_ref = class.as_obj().expect("OP_METHOD always runs with a class on the stack");
                    class_ref.get().as_class().unwrap().methods.borrow_mut().set(name, method);
                }
            }
        }
    }

    fn numeric_binary(&mut self, op: impl Fn(f64, f64) -> f64) -> Result<(), LumenError> {
        let b = self.peek(0).as_number();
        let a = self.peek(1).as_number();
        match (a, b) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(op(a, b)))
            }
            _ => Err(self.runtime_error("operands must be numbers")),
        }
    }

    fn numeric_comparison(&mut self, op: impl Fn(f64, f64) -> bool) -> Result<(), LumenError> {
        let b = self.peek(0).as_number();
        let a = self.peek(1).as_number();
        match (a, b) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Bool(op(a, b)))
            }
            _ => Err(self.runtime_error("operands must be numbers")),
        }
    }

    fn add(&mut self) -> Result<(), LumenError> {
        let a = self.peek(1);
        let b = self.peek(0);
        if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
            self.pop();
            self.pop();
            return self.push(Value::Number(x + y));
        }
        if let (Some(x), Some(y)) = (a.as_string_bytes(), b.as_string_bytes()) {
            let mut concatenated = String::with_capacity(x.len() + y.len());
            concatenated.push_str(x);
            concatenated.push_str(y);
            let interned = self.heap.take_string(concatenated, |h| self.mark_roots(h));
            self.pop();
            self.pop();
            return self.push(Value::Obj(interned));
        }
        Err(self.runtime_error(format!(
            "operands must be two numbers or two strings (got {} and {})",
            type_name(&a),
            type_name(&b)
        )))
    }
}

impl Default for Vm {
    fn default() -> Self {
        Vm::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(src: &str) -> Result<(), LumenError> {
        let mut vm = Vm::new();
        vm.interpret(src)
    }

    #[test]
    fn arithmetic_and_print_execute() {
        assert!(run("print 1 + 2 * 3;").is_ok());
    }

    #[test]
    fn string_concatenation() {
        assert!(run("print \"foo\" + \"bar\";").is_ok());
    }

    #[test]
    fn closures_capture_locals_by_reference() {
        assert!(run(
            "fun make_counter() { var i = 0; fun count() { i = i + 1; return i; } return count; } \
             var counter = make_counter(); print counter(); print counter();"
        )
        .is_ok());
    }

    #[test]
    fn classes_instantiate_and_dispatch_methods() {
        assert!(run(
            "class Greeter { init(name) { this.name = name; } greet() { return \"hi \" + this.name; } } \
             var g = Greeter(\"lumen\"); print g.greet();"
        )
        .is_ok());
    }

    #[test]
    fn inheritance_resolves_super_calls() {
        assert!(run(
            "class A { greet() { return \"a\"; } } \
             class B < A { greet() { return super.greet() + \"b\"; } } \
             print B().greet();"
        )
        .is_ok());
    }

    #[test]
    fn undefined_global_is_a_runtime_error() {
        assert!(run("print undefined_name;").is_err());
    }

    #[test]
    fn calling_a_non_callable_is_a_runtime_error() {
        assert!(run("var x = 1; x();").is_err());
    }

    #[test]
    fn arity_mismatch_is_a_runtime_error() {
        assert!(run("fun f(a, b) { return a + b; } f(1);").is_err());
    }
}
