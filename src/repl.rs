// File: src/repl.rs
//
// Interactive REPL: a `rustyline` editor with a colored prompt, three
// meta-commands, brace/bracket/paren/string balance tracking for
// multi-line input, and a single `Vm` persisted across every evaluated
// line so declarations accumulate the way a REPL session should.

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::vm::Vm;

pub struct Repl {
    vm: Vm,
    editor: DefaultEditor,
}

impl Repl {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let editor = DefaultEditor::new()?;
        Ok(Repl { vm: Vm::new(), editor })
    }

    fn show_banner(&self) {
        println!("{}", "lumen — type :help for commands, :quit to exit".bright_cyan());
    }

    pub fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.show_banner();

        let mut buffer = String::new();

        loop {
            let prompt = if buffer.is_empty() { "> ".bright_green().to_string() } else { "..> ".bright_blue().to_string() };

            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let _ = self.editor.add_history_entry(line.as_str());

                    if buffer.is_empty() && line.trim().starts_with(':') {
                        if self.handle_command(line.trim()) {
                            continue;
                        } else {
                            break;
                        }
                    }

                    buffer.push_str(&line);
                    buffer.push('\n');

                    if Self::is_input_complete(&buffer) {
                        self.eval_input(&buffer);
                        buffer.clear();
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("{}", "^C (Ctrl+C to interrupt, :quit to exit)".bright_yellow());
                    buffer.clear();
                }
                Err(ReadlineError::Eof) => {
                    println!("{}", "\ngoodbye".bright_cyan());
                    break;
                }
                Err(err) => {
                    eprintln!("{} {}", "error:".bright_red(), err);
                    break;
                }
            }
        }

        Ok(())
    }

    /// Returns `true` to keep the REPL running, `false` on `:quit`.
    fn handle_command(&mut self, cmd: &str) -> bool {
        match cmd {
            ":help" | ":h" => {
                self.show_help();
                true
            }
            ":quit" | ":q" => {
                println!("{}", "goodbye".bright_cyan());
                false
            }
            ":reset" | ":r" => {
                self.vm = Vm::new();
                println!("{}", "environment reset".bright_green());
                true
            }
            _ => {
                println!("{} unknown command {}, try :help", "error:".bright_red(), cmd.bright_yellow());
                true
            }
        }
    }

    fn show_help(&self) {
        println!();
        println!("  {}  show this message", ":help".bright_yellow());
        println!("  {}  exit the REPL", ":quit".bright_yellow());
        println!("  {} reset the VM's globals and heap", ":reset".bright_yellow());
        println!();
        println!("  unclosed braces, brackets, parens, or a string continue on the next line");
        println!();
    }

    /// A line is complete once every brace/bracket/paren is balanced and no
    /// string literal is left open. No comment handling is needed here:
    /// this language has no line comments.
    fn is_input_complete(input: &str) -> bool {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return true;
        }

        let mut depth = 0i32;
        let mut in_string = false;
        let mut escape_next = false;

        for ch in trimmed.chars() {
            if escape_next {
                escape_next = false;
                continue;
            }
            match ch {
                '\\' if in_string => escape_next = true,
                '"' => in_string = !in_string,
                '{' | '(' | '[' if !in_string => depth += 1,
                '}' | ')' | ']' if !in_string => depth -= 1,
                _ => {}
            }
        }

        !in_string && depth <= 0
    }

    fn eval_input(&mut self, input: &str) {
        if input.trim().is_empty() {
            return;
        }
        if let Err(err) = self.vm.interpret(input) {
            eprintln!("{err}");
        }
    }
}

impl Default for Repl {
    fn default() -> Self {
        Self::new().expect("failed to initialize line editor")
    }
}
