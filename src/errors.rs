// File: src/errors.rs
//
// A single error type covering both ends of the pipeline: a batch of
// compile-time diagnostics, or a runtime error carrying the call-frame
// trace active when it was raised. Same colored, multi-line `Display`
// shape as a typical CLI error report, generalized to the two variants
// this interpreter actually raises.

use std::fmt;

use colored::Colorize;

use crate::compiler::CompileError;

/// One call-frame's contribution to a runtime stack trace, innermost
/// first.
pub struct FrameInfo {
    pub name: String,
    pub line: u32,
}

pub enum LumenError {
    Compile(Vec<CompileError>),
    Runtime { message: String, frames: Vec<FrameInfo> },
}

impl LumenError {
    pub fn runtime(message: impl Into<String>, frames: Vec<FrameInfo>) -> Self {
        LumenError::Runtime { message: message.into(), frames }
    }

    /// The process exit code this error should surface as, following the
    /// sysexits.h-style convention the CLI uses (64 usage, 65 data error,
    /// 70 internal software error, 74 I/O error).
    pub fn exit_code(&self) -> i32 {
        match self {
            LumenError::Compile(_) => 65,
            LumenError::Runtime { .. } => 70,
        }
    }
}

impl fmt::Display for LumenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LumenError::Compile(errors) => {
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    writeln!(
                        f,
                        "{} {}",
                        format!("[line {}]", err.line).dimmed(),
                        format!("{}: {}", "compile error".red().bold(), err.message)
                    )?;
                }
                Ok(())
            }
            LumenError::Runtime { message, frames } => {
                writeln!(f, "{}: {}", "runtime error".red().bold(), message)?;
                for frame in frames {
                    writeln!(
                        f,
                        "  {} {}",
                        "at".dimmed(),
                        format!("[line {}] in {}", frame.line, frame.name).blue()
                    )?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Debug for LumenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl std::error::Error for LumenError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_display_includes_every_frame() {
        let err = LumenError::runtime(
            "undefined variable 'x'",
            vec![
                FrameInfo { name: "inner".to_string(), line: 3 },
                FrameInfo { name: "script".to_string(), line: 10 },
            ],
        );
        let rendered = format!("{err}");
        assert!(rendered.contains("undefined variable 'x'"));
        assert!(rendered.contains("inner"));
        assert!(rendered.contains("script"));
    }

    #[test]
    fn exit_codes_follow_sysexits_convention() {
        assert_eq!(
            LumenError::Compile(vec![CompileError { message: "x".into(), line: 1 }]).exit_code(),
            65
        );
        assert_eq!(LumenError::runtime("x", vec![]).exit_code(), 70);
    }
}
