// File: src/object.rs
//
// Heap object model for the Lumen virtual machine: the shared object
// header, every heap-allocated variant (strings, functions, closures,
// upvalues, classes, instances, bound methods), and the small unsafe
// pointer type used to refer to them from a `Value`.
//
// Every `Obj` lives behind a raw, non-owning `ObjRef` handle; ownership is
// the `Heap`'s intrusive allocation list (see `src/gc.rs`), not Rust's
// normal borrow-checked aliasing. Mutable state inside an object variant
// is therefore always wrapped in `Cell`/`RefCell` so that many `ObjRef`
// handles can observe and mutate the same object, matching the aliasing a
// tracing collector requires.

use std::cell::{Cell, RefCell};
use std::hash::{Hash, Hasher};
use std::ptr::NonNull;

use crate::chunk::Chunk;
use crate::table::Table;
use crate::value::Value;

/// A non-owning handle to a heap object. Equality and hashing are by
/// address, matching the language's reference-identity semantics for
/// objects (and, because strings are interned, content equality too).
#[derive(Clone, Copy)]
pub struct ObjRef(NonNull<Obj>);

impl ObjRef {
    /// Wraps a freshly-allocated object pointer. Callers must ensure `ptr`
    /// points at a live, fully-initialized `Obj` owned by a `Heap`.
    pub(crate) unsafe fn from_raw(ptr: NonNull<Obj>) -> Self {
        ObjRef(ptr)
    }

    /// A placeholder that must never be dereferenced. Used only to avoid
    /// an `Option` for `Heap::init_string` during construction, where it
    /// is overwritten before any other `Heap` method runs.
    pub(crate) fn dangling() -> Self {
        ObjRef(NonNull::dangling())
    }

    pub fn as_ptr(&self) -> *mut Obj {
        self.0.as_ptr()
    }

    pub fn get(&self) -> &Obj {
        // SAFETY: every `ObjRef` in circulation is produced by `Heap::alloc`
        // and remains valid until the sweep phase unlinks and frees it; a
        // `Value`/root holding an `ObjRef` past that point would itself be
        // a GC-safety bug, not a soundness hole in this accessor.
        unsafe { self.0.as_ref() }
    }
}

impl PartialEq for ObjRef {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl Eq for ObjRef {}

impl Hash for ObjRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.0.as_ptr() as usize).hash(state);
    }
}

impl std::fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjRef({:p})", self.0.as_ptr())
    }
}

/// Shared header every heap object carries. `marked` and `next` are the
/// collector's mark bit and intrusive allocation-list link; the object's
/// type tag is the `ObjKind` discriminant itself rather than a separate
/// field (see DESIGN.md).
pub struct Obj {
    pub(crate) marked: Cell<bool>,
    pub(crate) next: Cell<Option<ObjRef>>,
    pub kind: ObjKind,
}

pub enum ObjKind {
    String(ObjString),
    Function(ObjFunction),
    Native(ObjNative),
    Closure(ObjClosure),
    Upvalue(ObjUpvalue),
    Class(ObjClass),
    Instance(ObjInstance),
    BoundMethod(ObjBoundMethod),
}

impl ObjKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ObjKind::String(_) => "string",
            ObjKind::Function(_) => "function",
            ObjKind::Native(_) => "native function",
            ObjKind::Closure(_) => "function",
            ObjKind::Upvalue(_) => "upvalue",
            ObjKind::Class(_) => "class",
            ObjKind::Instance(_) => "instance",
            ObjKind::BoundMethod(_) => "function",
        }
    }
}

pub struct ObjString {
    pub bytes: Box<str>,
    pub hash: u32,
}

pub struct ObjFunction {
    pub arity: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
    pub name: Option<ObjRef>,
}

/// Signature every native (host) function must implement. Arguments are
/// passed as a slice (never the raw stack); the return value either
/// replaces the call or surfaces as a runtime error. Natives that need to
/// allocate (e.g. to build a string result) take the heap explicitly
/// rather than reaching for ambient global state.
pub type NativeFn = fn(&crate::gc::Heap, &[Value]) -> Result<Value, String>;

pub struct ObjNative {
    pub name: Box<str>,
    pub arity: u8,
    pub function: NativeFn,
}

pub struct ObjClosure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>,
}

/// An open upvalue observes a live stack slot by index; a closed upvalue
/// owns its value directly. Both arms are `Copy` so the whole enum can sit
/// behind a `Cell`.
#[derive(Clone, Copy)]
pub enum UpvalueLoc {
    Open(usize),
    Closed(Value),
}

pub struct ObjUpvalue {
    pub location: Cell<UpvalueLoc>,
    /// Link in the VM's sorted (by descending stack index) open-upvalue
    /// list. Distinct from `Obj::next`, which is the allocation list.
    pub open_next: Cell<Option<ObjRef>>,
}

pub struct ObjClass {
    pub name: ObjRef,
    pub methods: RefCell<Table>,
    /// Cached `init` method, populated the first time it is looked up so
    /// repeated instantiation skips the table probe.
    pub init: Cell<Option<Value>>,
}

pub struct ObjInstance {
    pub class: ObjRef,
    pub fields: RefCell<Table>,
}

pub struct ObjBoundMethod {
    pub receiver: Value,
    pub method: ObjRef,
}

impl Obj {
    pub fn as_string(&self) -> Option<&ObjString> {
        match &self.kind {
            ObjKind::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&ObjFunction> {
        match &self.kind {
            ObjKind::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_closure(&self) -> Option<&ObjClosure> {
        match &self.kind {
            ObjKind::Closure(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_upvalue(&self) -> Option<&ObjUpvalue> {
        match &self.kind {
            ObjKind::Upvalue(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ObjClass> {
        match &self.kind {
            ObjKind::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_instance(&self) -> Option<&ObjInstance> {
        match &self.kind {
            ObjKind::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_native(&self) -> Option<&ObjNative> {
        match &self.kind {
            ObjKind::Native(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bound_method(&self) -> Option<&ObjBoundMethod> {
        match &self.kind {
            ObjKind::BoundMethod(b) => Some(b),
            _ => None,
        }
    }
}

/// FNV-1a over raw bytes, used both for string-constant hashing in the
/// compiler and for interning at runtime.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

/// Renders a value the way `print` and the disassembler do. Needs to live
/// here (rather than on `Value`) because object variants require
/// dereferencing an `ObjRef`.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => format_number(*n),
        Value::Obj(o) => match &o.get().kind {
            ObjKind::String(s) => s.bytes.to_string(),
            ObjKind::Function(f) => match f.name {
                None => "<script>".to_string(),
                Some(name) => format!("<fn {}>", name.get().as_string().unwrap().bytes),
            },
            ObjKind::Native(_) => "<native fn>".to_string(),
            ObjKind::Closure(c) => format_value(&Value::Obj(c.function)),
            ObjKind::Upvalue(_) => "upvalue".to_string(),
            ObjKind::Class(c) => c.name.get().as_string().unwrap().bytes.to_string(),
            ObjKind::Instance(i) => {
                let class_name = &i.class.get().as_class().unwrap().name;
                format!("{} instance", class_name.get().as_string().unwrap().bytes)
            }
            ObjKind::BoundMethod(b) => format_value(&Value::Obj(b.method)),
        },
    }
}

/// A shortest-round-trip-ish `%g`-equivalent: integral doubles print
/// without a trailing `.0`, everything else uses Rust's default `f64`
/// formatting (which is already shortest-round-trip).
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Nil => "nil",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::Obj(o) => o.get().kind.type_name(),
    }
}
