// File: src/gc.rs
//
// The heap: an intrusive allocation list of every live `Obj`, the string
// interner, and a tri-color mark-sweep collector. The push-before-allocate
// rooting discipline follows the usual reason a freshly interned string
// has to be visible to a root (the operand stack, or an explicit
// `protect`) before any further allocation can run and possibly collect
// it.
//
// Everything here takes `&self`: objects carry their own interior
// mutability (`Cell`/`RefCell`, see `src/object.rs`), so the heap is a
// shared, append-mostly structure rather than something callers need
// exclusive access to. The one genuinely `unsafe` boundary is allocation
// and sweep, where raw `Obj` pointers are created and freed.

use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

use crate::object::*;
use crate::table::{hash_str, Table};
use crate::value::Value;

/// Heap growth factor applied to `bytes_allocated` to pick the next
/// collection threshold, so the interval between collections grows with
/// live data instead of staying fixed.
const GC_HEAP_GROW_FACTOR: usize = 2;
const INITIAL_GC_THRESHOLD: usize = 1024 * 1024;

pub struct Heap {
    head: Cell<Option<ObjRef>>,
    strings: RefCell<Table>,
    pub init_string: ObjRef,
    bytes_allocated: Cell<usize>,
    next_gc: Cell<usize>,
    gray_stack: RefCell<Vec<ObjRef>>,
    /// Values allocated but not yet reachable from any root (e.g. a
    /// function object not yet stored as a constant in its enclosing
    /// chunk). Marked unconditionally during collection.
    protected: RefCell<Vec<ObjRef>>,
    pub stress_gc: bool,
    pub trace_gc: bool,
}

impl Heap {
    pub fn new() -> Self {
        let stress_gc = std::env::var("LUMEN_GC_STRESS").is_ok();
        let trace_gc = std::env::var("LUMEN_DEBUG_TRACE").is_ok();
        let mut heap = Heap {
            head: Cell::new(None),
            strings: RefCell::new(Table::new()),
            init_string: ObjRef::dangling(),
            bytes_allocated: Cell::new(0),
            next_gc: Cell::new(INITIAL_GC_THRESHOLD),
            gray_stack: RefCell::new(Vec::new()),
            protected: RefCell::new(Vec::new()),
            stress_gc,
            trace_gc,
        };
        heap.init_string = heap.intern("init", |_| {});
        heap
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated.get()
    }

    // ---- rooting -------------------------------------------------------

    /// Protects `obj` against collection until `unprotect` pops it. Callers
    /// must push any freshly allocated object that isn't yet reachable from
    /// an existing root before performing another allocation that could
    /// trigger a collection.
    pub fn protect(&self, obj: ObjRef) -> ObjRef {
        self.protected.borrow_mut().push(obj);
        obj
    }

    pub fn unprotect(&self) {
        self.protected.borrow_mut().pop();
    }

    pub fn mark_value(&self, value: &Value) {
        if let Value::Obj(o) = value {
            self.mark_object(*o);
        }
    }

    pub fn mark_object(&self, obj: ObjRef) {
        let header = obj.get();
        if header.marked.get() {
            return;
        }
        header.marked.set(true);
        self.gray_stack.borrow_mut().push(obj);
    }

    fn trace_references(&self) {
        loop {
            let next = self.gray_stack.borrow_mut().pop();
            match next {
                Some(obj) => self.blacken(obj),
                None => break,
            }
        }
    }

    fn blacken(&self, obj: ObjRef) {
        match &obj.get().kind {
            ObjKind::String(_) | ObjKind::Native(_) => {}
            ObjKind::Function(f) => {
                if let Some(name) = f.name {
                    self.mark_object(name);
                }
                for constant in &f.chunk.constants {
                    self.mark_value(constant);
                }
            }
            ObjKind::Closure(c) => {
                self.mark_object(c.function);
                for upvalue in &c.upvalues {
                    self.mark_object(*upvalue);
                }
            }
            ObjKind::Upvalue(u) => {
                if let UpvalueLoc::Closed(v) = u.location.get() {
                    self.mark_value(&v);
                }
            }
            ObjKind::Class(c) => {
                self.mark_object(c.name);
                for (key, value) in c.methods.borrow().iter() {
                    self.mark_object(key);
                    self.mark_value(&value);
                }
                if let Some(init) = c.init.get() {
                    self.mark_value(&init);
                }
            }
            ObjKind::Instance(i) => {
                self.mark_object(i.class);
                for (key, value) in i.fields.borrow().iter() {
                    self.mark_object(key);
                    self.mark_value(&value);
                }
            }
            ObjKind::BoundMethod(b) => {
                self.mark_value(&b.receiver);
                self.mark_object(b.method);
            }
        }
    }

    /// Runs a full mark-sweep cycle if stress mode is on or the heap has
    /// grown past its threshold. `mark_extra` lets the caller (the VM)
    /// mark its own roots — stack, call frames, globals, open upvalues —
    /// which the heap has no visibility into on its own.
    pub fn maybe_collect(&self, mark_extra: impl Fn(&Heap)) {
        if self.stress_gc || self.bytes_allocated.get() > self.next_gc.get() {
            self.collect_garbage(mark_extra);
        }
    }

    pub fn collect_garbage(&self, mark_extra: impl Fn(&Heap)) {
        let before = self.bytes_allocated.get();
        if self.trace_gc {
            eprintln!("-- gc begin");
        }
        self.mark_object(self.init_string);
        for root in self.protected.borrow().iter() {
            self.mark_object(*root);
        }
        mark_extra(self);
        self.trace_references();
        self.strings.borrow_mut().remove_white();
        self.sweep();
        self.next_gc.set(self.bytes_allocated.get().max(1) * GC_HEAP_GROW_FACTOR);
        if self.trace_gc {
            eprintln!(
                "-- gc end: {} -> {} bytes, next at {}",
                before,
                self.bytes_allocated.get(),
                self.next_gc.get()
            );
        }
    }

    fn sweep(&self) {
        let mut prev: Option<ObjRef> = None;
        let mut current = self.head.get();
        while let Some(obj) = current {
            let header = obj.get();
            let next = header.next.get();
            if header.marked.get() {
                header.marked.set(false);
                prev = Some(obj);
                current = next;
            } else {
                match prev {
                    Some(p) => p.get().next.set(next),
                    None => self.head.set(next),
                }
                current = next;
                let freed = approx_size(header);
                self.bytes_allocated.set(self.bytes_allocated.get().saturating_sub(freed));
                // SAFETY: `obj` was produced by `Box::into_raw` in `alloc`
                // and is being unlinked from the only list that tracks
                // ownership, so this is the unique place it is freed.
                unsafe {
                    drop(Box::from_raw(obj.as_ptr()));
                }
            }
        }
    }

    // ---- allocation -----------------------------------------------------

    fn link(&self, boxed: Box<Obj>) -> ObjRef {
        let ptr = Box::into_raw(boxed);
        // SAFETY: `Box::into_raw` never returns null.
        let obj = unsafe { ObjRef::from_raw(NonNull::new_unchecked(ptr)) };
        obj.get().next.set(self.head.get());
        self.head.set(Some(obj));
        obj
    }

    pub fn alloc(&self, kind: ObjKind, mark_extra: impl Fn(&Heap)) -> ObjRef {
        self.maybe_collect(&mark_extra);
        let boxed = Box::new(Obj {
            marked: Cell::new(false),
            next: Cell::new(None),
            kind,
        });
        self.bytes_allocated.set(self.bytes_allocated.get() + approx_size(&boxed));
        self.link(boxed)
    }

    /// Interns `s`, copying it only if no equal string is already present.
    pub fn intern(&self, s: &str, mark_extra: impl Fn(&Heap)) -> ObjRef {
        let hash = hash_str(s);
        if let Some(existing) = self.strings.borrow().find_string(s, hash) {
            return existing;
        }
        let obj = self.alloc(
            ObjKind::String(ObjString {
                bytes: s.into(),
                hash,
            }),
            &mark_extra,
        );
        self.protect(obj);
        self.strings.borrow_mut().set(obj, Value::Nil);
        self.unprotect();
        obj
    }

    /// Interns an owned `String` without an extra copy when it turns out
    /// to already be present (e.g. the result of runtime concatenation).
    pub fn take_string(&self, s: String, mark_extra: impl Fn(&Heap)) -> ObjRef {
        let hash = hash_str(&s);
        if let Some(existing) = self.strings.borrow().find_string(&s, hash) {
            return existing;
        }
        let obj = self.alloc(
            ObjKind::String(ObjString {
                bytes: s.into_boxed_str(),
                hash,
            }),
            &mark_extra,
        );
        self.protect(obj);
        self.strings.borrow_mut().set(obj, Value::Nil);
        self.unprotect();
        obj
    }
}

fn approx_size(obj: &Obj) -> usize {
    let base = std::mem::size_of::<Obj>();
    base + match &obj.kind {
        ObjKind::String(s) => s.bytes.len(),
        ObjKind::Function(f) => {
            f.chunk.code.len() + f.chunk.constants.len() * std::mem::size_of::<Value>()
        }
        ObjKind::Closure(c) => c.upvalues.len() * std::mem::size_of::<ObjRef>(),
        ObjKind::Class(c) => c.methods.borrow().approx_bytes(),
        ObjKind::Instance(i) => i.fields.borrow().approx_bytes(),
        ObjKind::Native(_) | ObjKind::Upvalue(_) | ObjKind::BoundMethod(_) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_returns_same_object_for_equal_content() {
        let heap = Heap::new();
        let a = heap.intern("hello", |_| {});
        let b = heap.intern("hello", |_| {});
        assert_eq!(a, b);
    }

    #[test]
    fn unreachable_objects_are_collected() {
        let heap = Heap::new();
        let before = heap.bytes_allocated();
        heap.alloc(
            ObjKind::String(ObjString {
                bytes: "temporary".into(),
                hash: hash_str("temporary"),
            }),
            |_| {},
        );
        assert!(heap.bytes_allocated() > before);
        // Nothing roots the freshly allocated string; a collection with no
        // extra roots should sweep it away. Note: we must not dereference
        // the returned `ObjRef` after this point, it is now dangling.
        heap.collect_garbage(|_| {});
        assert_eq!(heap.bytes_allocated(), before);
        // `init_string` must survive every cycle since it is an intrinsic
        // root.
        assert!(heap.init_string.get().as_string().is_some());
    }

    #[test]
    fn protected_object_survives_collection() {
        let heap = Heap::new();
        let obj = heap.alloc(
            ObjKind::String(ObjString {
                bytes: "kept".into(),
                hash: hash_str("kept"),
            }),
            |_| {},
        );
        heap.protect(obj);
        heap.collect_garbage(|_| {});
        assert_eq!(obj.get().as_string().unwrap().bytes.as_ref(), "kept");
        heap.unprotect();
    }
}
