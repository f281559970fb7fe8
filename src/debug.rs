// File: src/debug.rs
//
// Pure, side-effect-free (besides stdout) disassembler. Never runs
// during normal execution; only `--disassemble` on the CLI or the VM's
// instruction trace (`LUMEN_DEBUG_TRACE=1`) invoke it. Walks a raw byte
// `Chunk` rather than a `Vec<OpCode>` stream, one instruction at a time.

use crate::chunk::{Chunk, OpCode};
use crate::object::format_value;

pub fn disassemble_chunk(chunk: &Chunk, name: &str) {
    println!("== {name} ==");
    let mut offset = 0;
    while offset < chunk.code.len() {
        offset = disassemble_instruction(chunk, offset);
    }
}

/// Disassembles one instruction at `offset` and returns the offset of the
/// next one.
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> usize {
    print!("{offset:04} ");
    if offset > 0 && chunk.line(offset) == chunk.line(offset - 1) {
        print!("   | ");
    } else {
        print!("{:4} ", chunk.line(offset));
    }

    let byte = chunk.code[offset];
    let Some(op) = OpCode::from_byte(byte) else {
        println!("unknown opcode {byte}");
        return offset + 1;
    };

    use OpCode::*;
    match op {
        Constant => constant_instruction("OP_CONSTANT", chunk, offset),
        Nil => simple_instruction("OP_NIL", offset),
        True => simple_instruction("OP_TRUE", offset),
        False => simple_instruction("OP_FALSE", offset),
        Pop => simple_instruction("OP_POP", offset),
        GetLocal => byte_instruction("OP_GET_LOCAL", chunk, offset),
        SetLocal => byte_instruction("OP_SET_LOCAL", chunk, offset),
        GetGlobal => constant_instruction("OP_GET_GLOBAL", chunk, offset),
        DefineGlobal => constant_instruction("OP_DEFINE_GLOBAL", chunk, offset),
        SetGlobal => constant_instruction("OP_SET_GLOBAL", chunk, offset),
        GetUpvalue => byte_instruction("OP_GET_UPVALUE", chunk, offset),
        SetUpvalue => byte_instruction("OP_SET_UPVALUE", chunk, offset),
        GetProperty => constant_instruction("OP_GET_PROPERTY", chunk, offset),
        SetProperty => constant_instruction("OP_SET_PROPERTY", chunk, offset),
        GetSuper => constant_instruction("OP_GET_SUPER", chunk, offset),
        Equal => simple_instruction("OP_EQUAL", offset),
        Greater => simple_instruction("OP_GREATER", offset),
        Less => simple_instruction("OP_LESS", offset),
        Add => simple_instruction("OP_ADD", offset),
        Subtract => simple_instruction("OP_SUBTRACT", offset),
        Multiply => simple_instruction("OP_MULTIPLY", offset),
        Divide => simple_instruction("OP_DIVIDE", offset),
        Not => simple_instruction("OP_NOT", offset),
        Negate => simple_instruction("OP_NEGATE", offset),
        Print => simple_instruction("OP_PRINT", offset),
        Jump => jump_instruction("OP_JUMP", 1, chunk, offset),
        JumpIfFalse => jump_instruction("OP_JUMP_IF_FALSE", 1, chunk, offset),
        Loop => jump_instruction("OP_LOOP", -1, chunk, offset),
        Call => byte_instruction("OP_CALL", chunk, offset),
        Invoke => invoke_instruction("OP_INVOKE", chunk, offset),
        SuperInvoke => invoke_instruction("OP_SUPER_INVOKE", chunk, offset),
        Closure => closure_instruction(chunk, offset),
        CloseUpvalue => simple_instruction("OP_CLOSE_UPVALUE", offset),
        Return => simple_instruction("OP_RETURN", offset),
        Class => constant_instruction("OP_CLASS", chunk, offset),
        Inherit => simple_instruction("OP_INHERIT", offset),
        Method => constant_instruction("OP_METHOD", chunk, offset),
    }
}

fn simple_instruction(name: &str, offset: usize) -> usize {
    println!("{name}");
    offset + 1
}

fn byte_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let slot = chunk.code[offset + 1];
    println!("{name:-16} {slot:4}");
    offset + 2
}

fn jump_instruction(name: &str, sign: i32, chunk: &Chunk, offset: usize) -> usize {
    let hi = chunk.code[offset + 1] as u16;
    let lo = chunk.code[offset + 2] as u16;
    let jump = (hi << 8) | lo;
    let target = offset as i32 + 3 + sign * jump as i32;
    println!("{name:-16} {offset:4} -> {target}");
    offset + 3
}

fn constant_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.code[offset + 1] as usize;
    let value = format_value(&chunk.constants[constant]);
    println!("{name:-16} {constant:4} '{value}'");
    offset + 2
}

fn invoke_instruction(name: &str, chunk: &Chunk, offset: usize) -> usize {
    let constant = chunk.code[offset + 1] as usize;
    let arg_count = chunk.code[offset + 2];
    let value = format_value(&chunk.constants[constant]);
    println!("{name:-16} ({arg_count} args) {constant:4} '{value}'");
    offset + 3
}

fn closure_instruction(chunk: &Chunk, offset: usize) -> usize {
    let mut offset = offset + 1;
    let constant = chunk.code[offset] as usize;
    offset += 1;
    let value = format_value(&chunk.constants[constant]);
    println!("{:-16} {:4} '{value}'", "OP_CLOSURE", constant);

    if let crate::value::Value::Obj(o) = &chunk.constants[constant] {
        if let Some(f) = o.get().as_function() {
            for _ in 0..f.upvalue_count {
                let is_local = chunk.code[offset];
                offset += 1;
                let index = chunk.code[offset];
                offset += 1;
                let kind = if is_local == 1 { "local" } else { "upvalue" };
                println!("{offset:04}      |                     {kind} {index}");
            }
        }
    }
    offset
}
