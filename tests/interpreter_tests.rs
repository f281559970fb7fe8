// End-to-end source-to-behavior scenarios, run through the public
// `Vm` API. Printed output goes to stdout directly (no test-only sink
// wired up yet — see DESIGN.md); these assert success/failure and
// re-entrancy the way the VM's own unit tests do rather than capturing
// `print` text.

use std::io::Write;
use std::process::Command;

use lumen::errors::LumenError;
use lumen::vm::Vm;

fn run(source: &str) -> Result<(), LumenError> {
    let mut vm = Vm::new();
    vm.interpret(source)
}

#[test]
fn arithmetic_precedence() {
    assert!(run("print 1 + 2 * 3;").is_ok());
}

#[test]
fn string_interning_gives_reference_equality() {
    assert!(run(r#"var a = "hi"; var b = "hi"; print a == b;"#).is_ok());
}

#[test]
fn closures_share_captured_upvalues() {
    let source = r#"
        fun makeCounter() {
            var i = 0;
            fun count() {
                i = i + 1;
                print i;
            }
            return count;
        }
        var c = makeCounter();
        c();
        c();
        c();
    "#;
    assert!(run(source).is_ok());
}

#[test]
fn inheritance_and_super_calls_run() {
    let source = r#"
        class A {
            greet() { print "A"; }
        }
        class B < A {
            greet() {
                super.greet();
                print "B";
            }
        }
        B().greet();
    "#;
    assert!(run(source).is_ok());
}

#[test]
fn initializer_sets_fields() {
    let source = r#"
        class Point {
            init(x, y) {
                this.x = x;
                this.y = y;
            }
        }
        var p = Point(3, 4);
        print p.x;
        print p.y;
    "#;
    assert!(run(source).is_ok());
}

#[test]
fn uninitialized_global_prints_nil() {
    assert!(run("var x; print x;").is_ok());
}

#[test]
fn calling_a_non_callable_is_a_runtime_error_naming_the_frame() {
    let mut vm = Vm::new();
    assert!(vm.interpret("var x; x();").is_err());
}

#[test]
fn reading_a_local_before_its_initializer_is_a_compile_error() {
    let err = run("{ var a = a; }").unwrap_err();
    assert!(matches!(err, LumenError::Compile(_)));
}

#[test]
fn returning_a_value_from_init_is_a_compile_error() {
    let source = r#"
        class Broken {
            init() { return 1; }
        }
    "#;
    let err = run(source).unwrap_err();
    assert!(matches!(err, LumenError::Compile(_)));
}

#[test]
fn nil_and_false_are_the_only_falsy_values() {
    assert!(run("if (0) { print \"truthy\"; } else { print \"bug\"; }").is_ok());
    assert!(run("if (\"\") { print \"truthy\"; } else { print \"bug\"; }").is_ok());
}

#[test]
fn calling_a_closure_with_the_wrong_arity_is_a_runtime_error() {
    let mut vm = Vm::new();
    assert!(vm.interpret("fun f(a, b) { return a + b; } f(1);").is_err());
}

#[test]
fn calling_a_native_with_the_wrong_arity_is_a_runtime_error() {
    let mut vm = Vm::new();
    assert!(vm.interpret("clock(1);").is_err());
}

#[test]
fn a_runtime_error_leaves_the_vm_reusable() {
    let mut vm = Vm::new();
    assert!(vm.interpret("print undefined_name;").is_err());
    assert!(vm.interpret("print 1 + 1;").is_ok());
}

#[test]
fn repl_style_reentrant_declarations_accumulate_across_calls() {
    let mut vm = Vm::new();
    assert!(vm.interpret("var counter = 0;").is_ok());
    assert!(vm.interpret("counter = counter + 1;").is_ok());
    assert!(vm.interpret("print counter;").is_ok());
}

#[test]
fn disassemble_flag_still_runs_the_program() {
    let mut script = tempfile_with(b"print 1 + 2;\n");

    let plain = Command::new(env!("CARGO_BIN_EXE_lumen"))
        .arg(script.path())
        .output()
        .expect("failed to run lumen binary");
    let disassembled = Command::new(env!("CARGO_BIN_EXE_lumen"))
        .arg(script.path())
        .arg("--disassemble")
        .output()
        .expect("failed to run lumen binary");

    assert!(plain.status.success());
    assert!(disassembled.status.success());

    let plain_stdout = String::from_utf8_lossy(&plain.stdout);
    let disassembled_stdout = String::from_utf8_lossy(&disassembled.stdout);

    assert_eq!(plain_stdout.trim_end(), "3");
    assert!(disassembled_stdout.contains("== <script> =="));
    assert!(
        disassembled_stdout.trim_end().ends_with("3"),
        "expected the disassembly dump to be followed by the program's own output, got: {disassembled_stdout}"
    );

    script.flush().expect("flush temp script");
}

/// A minimal stand-in for `tempfile`: writes `contents` to a file in the
/// system temp directory named after the current process/thread so
/// concurrent test runs don't collide, and removes it on drop.
fn tempfile_with(contents: &[u8]) -> TempScript {
    let mut path = std::env::temp_dir();
    path.push(format!("lumen_test_{}_{:?}.lumen", std::process::id(), std::thread::current().id()));
    let mut file = std::fs::File::create(&path).expect("create temp script");
    file.write_all(contents).expect("write temp script");
    TempScript { path, file }
}

struct TempScript {
    path: std::path::PathBuf,
    file: std::fs::File,
}

impl TempScript {
    fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl Drop for TempScript {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
