//! IR Builder
//!
//! Append-only text emitter for the SSA-style textual IR handed to the
//! external backend. Four buffers accumulate independently and are
//! concatenated once, in fixed order, when the compilation finishes:
//! type definitions, global storage, function bodies, external
//! declarations. A `silence` flag turns every append into a no-op so the
//! generator can walk a sub-expression purely for its type (`sizeof`, the
//! common type of `?:`) without leaving any trace in the output.

use std::fmt::Write as _;

#[derive(Debug, Default)]
pub struct Builder {
    types: String,
    globals: String,
    functions: String,
    body: String,
    externs: String,
    prologue: String,

    temp_counter: usize,
    global_counter: usize,
    label_counter: usize,

    silence: bool,
}

impl Builder {
    pub fn new() -> Self {
        Builder::default()
    }

    pub fn is_silent(&self) -> bool {
        self.silence
    }

    /// Runs `f` with appends suppressed, restoring the previous silence
    /// state afterward even if `f` returns early via `?`.
    pub fn silenced<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        let prev = self.silence;
        self.silence = true;
        let result = f(self);
        self.silence = prev;
        result
    }

    pub fn fresh_temp(&mut self) -> String {
        let name = format!("%_{}", self.temp_counter);
        self.temp_counter += 1;
        name
    }

    pub fn fresh_global(&mut self) -> String {
        let name = format!("@_{}", self.global_counter);
        self.global_counter += 1;
        name
    }

    pub fn fresh_label(&mut self) -> String {
        let name = format!("%l_{}", self.label_counter);
        self.label_counter += 1;
        name
    }

    /// Appends a labeled basic block to the function body buffer. When
    /// `fall_through_from` names the previous block, an explicit
    /// unconditional branch into the new block is emitted first so the
    /// previous block never falls off the end without a terminator.
    pub fn start_block(&mut self, label: &str, fall_through_from: Option<&str>) {
        if self.silence {
            return;
        }
        if let Some(prev) = fall_through_from {
            let _ = writeln!(self.body, "  br label {}", prev_as_target(prev));
        }
        let _ = writeln!(self.body, "{}:", strip_sigil(label));
    }

    pub fn emit(&mut self, line: impl AsRef<str>) {
        if self.silence {
            return;
        }
        let _ = writeln!(self.body, "  {}", line.as_ref());
    }

    pub fn emit_prologue(&mut self, line: impl AsRef<str>) {
        if self.silence {
            return;
        }
        let _ = writeln!(self.prologue, "  {}", line.as_ref());
    }

    pub fn define_type(&mut self, ir_name: &str, layout: impl AsRef<str>) {
        if self.silence {
            return;
        }
        let _ = writeln!(self.types, "{} = type {}", ir_name, layout.as_ref());
    }

    /// Registers a private unnamed-constant string literal global and
    /// returns its IR name. Bytes are rendered using the backend's
    /// `\XX`-per-byte escaping so embedded NULs and non-ASCII bytes are
    /// both representable.
    pub fn define_string(&mut self, bytes: &[u8]) -> String {
        let name = self.fresh_global();
        if self.silence {
            return name;
        }
        let mut escaped = String::new();
        for &b in bytes {
            let _ = write!(escaped, "\\{:02X}", b);
        }
        let _ = writeln!(
            self.globals,
            "{} = private unnamed_addr constant [{} x i8] c\"{}\\00\"",
            name,
            bytes.len() + 1,
            escaped
        );
        name
    }

    pub fn declare_global(&mut self, ir_name: &str, decl: impl AsRef<str>) {
        if self.silence {
            return;
        }
        let _ = writeln!(self.globals, "{} = {}", ir_name, decl.as_ref());
    }

    pub fn declare_external(&mut self, signature: impl AsRef<str>) {
        if self.silence {
            return;
        }
        let _ = writeln!(self.externs, "declare {}", signature.as_ref());
    }

    /// Finalizes the current function: prepends its signature, splices
    /// the allocated-stack-slot prologue ahead of the body collected so
    /// far, then resets all per-function state (the prologue buffer, and
    /// the temp/label counters, which are function-scoped).
    pub fn finish_function(&mut self, signature: impl AsRef<str>) {
        if self.silence {
            self.prologue.clear();
            self.body.clear();
            self.temp_counter = 0;
            self.label_counter = 0;
            return;
        }
        let mut def = String::new();
        let _ = writeln!(def, "{} {{", signature.as_ref());
        def.push_str(&self.prologue);
        def.push_str(&self.body);
        let _ = writeln!(def, "}}");
        def.push('\n');
        self.functions.push_str(&def);
        self.prologue.clear();
        self.body.clear();
        self.temp_counter = 0;
        self.label_counter = 0;
    }

    /// Concatenates the four buffers in the fixed order required by the
    /// backend: type definitions, global storage, function bodies,
    /// external declarations.
    pub fn finish(self) -> String {
        let mut out = String::new();
        out.push_str(&self.types);
        out.push_str(&self.globals);
        out.push_str(&self.functions);
        out.push_str(&self.externs);
        out
    }
}

fn strip_sigil(label: &str) -> &str {
    label.trim_start_matches('%')
}

fn prev_as_target(label: &str) -> String {
    if label.starts_with('%') {
        label.to_string()
    } else {
        format!("%{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names_are_monotonic_and_distinct() {
        let mut b = Builder::new();
        assert_eq!(b.fresh_temp(), "%_0");
        assert_eq!(b.fresh_temp(), "%_1");
        assert_eq!(b.fresh_global(), "@_0");
        assert_eq!(b.fresh_label(), "%l_0");
    }

    #[test]
    fn silence_suppresses_all_appends() {
        let mut b = Builder::new();
        b.silenced(|b| {
            b.emit("add i32 1, 2");
            b.define_string(b"hello");
        });
        let out = b.finish();
        assert!(!out.contains("hello"));
        assert!(!out.contains("add i32"));
    }

    #[test]
    fn string_literal_escapes_every_byte() {
        let mut b = Builder::new();
        let name = b.define_string(b"hi");
        assert!(name.starts_with('@'));
        let out = b.finish();
        assert!(out.contains("\\68\\69\\00"));
    }
}
