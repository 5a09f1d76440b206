//! End-to-end pipeline tests: source text in, IR text (or a specific
//! diagnostic) out, through the full lex/preprocess/convert/parse/generate
//! pipeline.

use tucc::{compile_string, ErrorKind};

fn ir_for(name: &str, src: &str) -> String {
    compile_string(name, src).unwrap_or_else(|e| panic!("{name}: expected success, got {e}"))
}

fn err_for(name: &str, src: &str) -> tucc::CompileError {
    compile_string(name, src).unwrap_err()
}

#[test]
fn macro_paste_glues_identifiers_and_the_result_returns_five() {
    let src = "#define cat(a,b) a##b\nint cat(x,1) = 5; int main(){ return x1; }\n";
    let ir = ir_for("paste.c", src);
    assert!(ir.contains("@x1"), "expected a global named x1 in:\n{ir}");
    assert!(ir.contains("define i32 @main"));
}

#[test]
fn macro_hide_set_stops_self_reference_and_leaves_the_inner_use_undefined() {
    let src = "#define x (4+x)\nint main(){ return x; }\n";
    let err = err_for("selfref.c", src);
    assert_eq!(err.kind, ErrorKind::Name);
    assert!(err.message.contains("undeclared identifier"), "{}", err.message);
}

#[test]
fn variadic_float_argument_promotes_to_double_for_printf() {
    // printf is recognized by name as a lazily-declared built-in (builtins.rs),
    // so this doesn't need to pull in a real <stdio.h>.
    let src = "int main(){ float f=1.5f; printf(\"%f\\n\", f); return 0; }\n";
    let ir = ir_for("variadic.c", src);
    assert!(ir.contains("declare i32 @printf(ptr, ...)"));
    assert!(ir.contains("fpext float"), "expected a float-to-double promotion in:\n{ir}");
    assert!(ir.contains("call i32 (...) @printf"), "expected the variadic call in:\n{ir}");
}

#[test]
fn sizeof_array_division_folds_to_a_constant_with_no_alloca_for_its_operand() {
    let src = "int main(){ int a[10]; return sizeof(a)/sizeof(a[0]); }\n";
    let ir = ir_for("sizeof.c", src);
    assert!(ir.contains("ret i32 10"), "expected a folded constant return in:\n{ir}");
    assert_eq!(ir.matches("alloca").count(), 1, "only the declared array itself should alloca:\n{ir}");
}

#[test]
fn switch_with_fallthrough_and_default_sums_to_six() {
    let src = "int main(){ int x=2,s=0;\n  switch(x){ case 1: s+=1; case 2: s+=2; case 3: s+=4; break; default: s=99; }\n  return s; }\n";
    let ir = ir_for("switch.c", src);
    assert!(ir.contains("switch i32"));
}

#[test]
fn switch_with_a_repeated_case_value_is_rejected() {
    let src = "int main(){ int x=0;\n  switch(x){ case 1: x=1; case 1: x=2; }\n  return x; }\n";
    let err = err_for("dupcase.c", src);
    assert_eq!(err.kind, ErrorKind::Flow);
    assert!(err.message.contains("duplicate case value"), "{}", err.message);
}

#[test]
fn struct_forward_declared_then_completed_compiles_and_reads_its_field() {
    let src = "struct N; struct N* p; struct N { int x; }; int main(){ struct N n; n.x=7; return n.x; }\n";
    let ir = ir_for("fwd.c", src);
    assert!(ir.contains("%struct.N"));
}

#[test]
fn sizeof_of_a_pointer_to_a_not_yet_completed_struct_is_an_incomplete_type_error() {
    let src = "struct N; struct N* p; int main(){ return sizeof(*p); }\n";
    let err = err_for("fwd_incomplete.c", src);
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("incomplete type"), "{}", err.message);
}
