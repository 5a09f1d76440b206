//! Built-in external function signatures
//!
//! `printf`, `snprintf`, and `calloc` are not declared by any header the
//! generator processes; they are recognized by name at the primary-identifier
//! lookup site and materialized lazily — a `declare` line is appended to the
//! external-declarations buffer the first time each is actually referenced,
//! not unconditionally at the start of the run.

use crate::ir::Builder;
use crate::types::{Basic, Type};
use std::collections::{HashMap, HashSet};

/// Returns the function type for built-in external `name`, or `None` if it
/// isn't one of the generator's recognized built-ins.
pub fn signature(name: &str) -> Option<Type> {
    builtin_signatures().get(name).cloned()
}

fn builtin_signatures() -> HashMap<String, Type> {
    let mut sigs = HashMap::new();
    let char_ptr = Type::pointer_to(Type::basic(Basic::Char));

    // int printf(const char *fmt, ...)
    sigs.insert(
        "printf".to_string(),
        Type::function(Type::basic(Basic::Int), vec![char_ptr.clone()], true),
    );

    // int snprintf(char *buf, size_t n, const char *fmt, ...)
    sigs.insert(
        "snprintf".to_string(),
        Type::function(
            Type::basic(Basic::Int),
            vec![char_ptr.clone(), Type::basic(Basic::ULong), char_ptr.clone()],
            true,
        ),
    );

    // void *calloc(size_t nmemb, size_t size)
    sigs.insert(
        "calloc".to_string(),
        Type::function(
            Type::pointer_to(Type::void()),
            vec![Type::basic(Basic::ULong), Type::basic(Basic::ULong)],
            false,
        ),
    );

    sigs
}

fn ir_declaration(name: &str) -> &'static str {
    match name {
        "printf" => "i32 @printf(ptr, ...)",
        "snprintf" => "i32 @snprintf(ptr, i64, ptr, ...)",
        "calloc" => "ptr @calloc(i64, i64)",
        other => unreachable!("not a built-in external: {other}"),
    }
}

/// Tracks which built-ins have already had their `declare` line emitted,
/// so repeated calls to the same built-in across a translation unit don't
/// duplicate it.
#[derive(Debug, Default)]
pub struct BuiltinTable {
    declared: HashSet<String>,
}

impl BuiltinTable {
    pub fn new() -> Self {
        BuiltinTable::default()
    }

    /// Emits `name`'s external declaration into `builder` the first time
    /// it's called for that name; a no-op on subsequent calls.
    pub fn ensure_declared(&mut self, name: &str, builder: &mut Builder) {
        if self.declared.insert(name.to_string()) {
            builder.declare_external(ir_declaration(name));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn printf_is_variadic_returning_int() {
        let sig = signature("printf").unwrap();
        assert!(sig.is_function());
    }

    #[test]
    fn unknown_name_has_no_signature() {
        assert!(signature("frobnicate").is_none());
    }

    #[test]
    fn declares_each_builtin_at_most_once() {
        let mut table = BuiltinTable::new();
        let mut builder = Builder::new();
        table.ensure_declared("printf", &mut builder);
        table.ensure_declared("printf", &mut builder);
        let out = builder.finish();
        assert_eq!(out.matches("declare i32 @printf").count(), 1);
    }
}
