// File: src/native.rs
//
// The native function bridge: the small, fixed set of built-ins the VM
// exposes to Lumen code, plus the table the VM installs into globals at
// startup.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::gc::Heap;
use crate::object::{format_value, type_name, NativeFn};
use crate::value::Value;

/// One entry in the fixed built-in table: name, arity, and the function
/// pointer the VM installs as an `ObjNative`.
pub struct NativeDef {
    pub name: &'static str,
    pub arity: u8,
    pub function: NativeFn,
}

pub const NATIVES: &[NativeDef] = &[
    NativeDef { name: "clock", arity: 0, function: clock },
    NativeDef { name: "type_of", arity: 1, function: type_of },
    NativeDef { name: "str", arity: 1, function: str_of },
    NativeDef { name: "len", arity: 1, function: len },
];

/// Seconds since the Unix epoch, as a float. The one piece of impure
/// ambient state any built-in reaches for.
fn clock(_heap: &Heap, _args: &[Value]) -> Result<Value, String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| "system clock is before the Unix epoch".to_string())?;
    Ok(Value::Number(now.as_secs_f64()))
}

fn type_of(heap: &Heap, args: &[Value]) -> Result<Value, String> {
    let name = type_name(&args[0]);
    Ok(Value::Obj(heap.intern(name, |_| {})))
}

fn str_of(heap: &Heap, args: &[Value]) -> Result<Value, String> {
    let rendered = format_value(&args[0]);
    Ok(Value::Obj(heap.take_string(rendered, |_| {})))
}

/// Length of a string (in bytes) — the only `len`-able type this
/// language's runtime values support.
fn len(_heap: &Heap, args: &[Value]) -> Result<Value, String> {
    match args[0].as_string_bytes() {
        Some(s) => Ok(Value::Number(s.len() as f64)),
        None => Err(format!("len() expects a string, got {}", type_name(&args[0]))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_of_reports_primitive_kinds() {
        let heap = Heap::new();
        let result = type_of(&heap, &[Value::Number(1.0)]).unwrap();
        assert_eq!(result.as_obj().unwrap().get().as_string().unwrap().bytes.as_ref(), "number");
    }

    #[test]
    fn len_rejects_non_strings() {
        let heap = Heap::new();
        assert!(len(&heap, &[Value::Nil]).is_err());
    }

    #[test]
    fn len_counts_bytes() {
        let heap = Heap::new();
        let s = Value::Obj(heap.intern("hello", |_| {}));
        let result = len(&heap, &[s]).unwrap();
        assert_eq!(result.as_number(), Some(5.0));
    }
}
