//! Semantic Generator
//!
//! Walks the AST once, computing types and emitting IR side by side: there
//! is no separate type-checking pass. Declarations compute a full type from
//! a specifier list plus a declarator chain; statements thread a
//! [`crate::symtab::Context`] that is cheaply cloned on entry to a nested
//! scope so loop/switch/block targets restore themselves when the clone is
//! dropped; expressions return a [`Value`] and, except where a caller asks
//! for an unconverted lvalue, undergo function/array decay and an
//! lvalue-to-value load before being handed back up.

use crate::ast::Node;
use crate::builtins::{self, BuiltinTable};
use crate::diagnostics::CompileError;
use crate::ir::Builder;
use crate::symtab::{
    AggregateDef, Context, LabelTable, SwitchState, Symbol, SymbolKind, TagEntry, TagTable,
};
use crate::types::{common_arithmetic_type, Basic, Type, TypeKind};
use crate::value::{self, Value};

pub struct Generator {
    builder: Builder,
    builtins: BuiltinTable,
    labels: LabelTable,
    return_type: Type,
    function_name: String,
    struct_counter: usize,
    /// True once the current basic block has received a terminator
    /// (`ret`/`br`/`switch`). `begin_block` consults this to decide whether
    /// a fallthrough branch into the new block is needed, since a block
    /// that already jumped away (`return`, `break`, `goto`, ...) must not
    /// get a second terminator appended.
    terminated: bool,
}

impl Generator {
    pub fn new() -> Self {
        Generator {
            builder: Builder::new(),
            builtins: BuiltinTable::new(),
            labels: LabelTable::new(),
            return_type: Type::void(),
            function_name: String::new(),
            struct_counter: 0,
            terminated: false,
        }
    }

    /// Emits a control-flow terminator (`ret`/`br`/`switch`) and marks the
    /// current block closed.
    fn terminate(&mut self, line: impl AsRef<str>) {
        self.builder.emit(line.as_ref());
        self.terminated = true;
    }

    /// Emits an unconditional branch to `label` unless the current block
    /// already has a terminator.
    fn branch_if_open(&mut self, label: &str) {
        if !self.terminated {
            self.terminate(format!("br label %{}", strip(label)));
        }
    }

    /// Closes the current block (branching into `label` if it's still
    /// open) and starts `label` as the new current block.
    fn begin_block(&mut self, label: &str) {
        self.branch_if_open(label);
        self.builder.start_block(label, None);
        self.terminated = false;
    }

    pub fn generate(mut self, unit: &Node) -> Result<String, CompileError> {
        let mut ctx = Context::new();
        for child in &unit.children {
            match child.kind.as_str() {
                "declaration" => self.global_declaration(child, &mut ctx)?,
                "function_definition" => self.function_definition(child, &mut ctx)?,
                other => return Err(CompileError::parse(child.loc, format!("top-level {other}"))),
            }
        }
        Ok(self.builder.finish())
    }

    // ---- types from specifiers + declarator ----

    /// Computes the base type named by a `specifiers` node, completing any
    /// inline `struct`/`union`/`enum` definition it carries into `ctx.tags`.
    fn base_type(&mut self, specs: &Node, ctx: &mut Context) -> Result<Type, CompileError> {
        let mut basics: Vec<&str> = Vec::new();
        let mut aggregate: Option<Type> = None;
        let mut is_const = false;
        let mut is_volatile = false;
        for c in &specs.children {
            match c.kind.as_str() {
                "keyword" => match c.text.as_str() {
                    "const" => is_const = true,
                    "volatile" => is_volatile = true,
                    "typedef" | "extern" | "static" | "auto" | "register" => {}
                    kw => basics.push(kw),
                },
                "typedef_name" => {
                    let ty = ctx
                        .typedefs
                        .get(&c.text)
                        .cloned()
                        .ok_or_else(|| CompileError::name(c.loc, format!("unknown type name '{}'", c.text)))?;
                    aggregate = Some(ty);
                }
                "struct_specifier" | "union_specifier" => {
                    aggregate = Some(self.struct_or_union(c, ctx)?);
                }
                "enum_specifier" => {
                    aggregate = Some(self.enum_type(c, ctx)?);
                }
                _ => {}
            }
        }
        let mut ty = if let Some(t) = aggregate {
            t
        } else {
            Type::basic(basic_from_keywords(&basics, specs.loc)?)
        };
        if is_const || is_volatile {
            ty = Type::qualified(ty.kind, is_const, is_volatile);
        }
        Ok(ty)
    }

    fn struct_or_union(&mut self, node: &Node, ctx: &mut Context) -> Result<Type, CompileError> {
        let is_union = node.kind == "union_specifier";
        let tag = if node.text.is_empty() {
            self.struct_counter += 1;
            format!("anon.{}", self.struct_counter)
        } else {
            node.text.clone()
        };
        if node.children.is_empty() {
            // Forward declaration or a bare reference to an existing tag.
            if ctx.tags.get_aggregate(&tag).is_none() {
                let ir_name = format!("%struct.{tag}");
                ctx.tags.define_or_replace(
                    &tag,
                    TagEntry::Aggregate(AggregateDef {
                        is_union,
                        tag: tag.clone(),
                        fields: Vec::new(),
                        declared: false,
                        size: 0,
                        align: 1,
                        ir_name,
                    }),
                );
            }
            return Ok(if is_union { Type::union_tag(tag) } else { Type::struct_tag(tag) });
        }
        let mut fields = Vec::new();
        for field in &node.children {
            let specs = field.child(0);
            let field_base = self.base_type(specs, ctx)?;
            for declarator in &field.children[1..] {
                let (name, full) = self.declared_type(&field_base, declarator, ctx)?;
                fields.push((name, full));
            }
        }
        let (size, align) = crate::symtab::layout_aggregate(is_union, &fields, &ctx.tags);
        let ir_name = format!("%struct.{tag}");
        self.builder.define_type(&ir_name, aggregate_layout(&fields, &ctx.tags));
        ctx.tags.define_or_replace(
            &tag,
            TagEntry::Aggregate(AggregateDef {
                is_union,
                tag: tag.clone(),
                fields,
                declared: true,
                size,
                align,
                ir_name,
            }),
        );
        Ok(if is_union { Type::union_tag(tag) } else { Type::struct_tag(tag) })
    }

    fn enum_type(&mut self, node: &Node, ctx: &mut Context) -> Result<Type, CompileError> {
        let tag = if node.text.is_empty() {
            self.struct_counter += 1;
            format!("anon_enum.{}", self.struct_counter)
        } else {
            node.text.clone()
        };
        if !node.children.is_empty() {
            ctx.tags.define_or_replace(&tag, TagEntry::Enum);
            let mut next = 0i64;
            for enumerator in &node.children {
                let value = if let Some(expr) = enumerator.children.first() {
                    let v = self.constant_expression(expr, ctx)?;
                    v.s_val()
                } else {
                    next
                };
                next = value + 1;
                ctx.identifiers
                    .define(
                        &enumerator.text,
                        Symbol { ty: Type::enum_tag(tag.clone()), kind: SymbolKind::EnumConstant(value) },
                    )
                    .map_err(|_| CompileError::name(enumerator.loc, format!("redefinition of '{}'", enumerator.text)))?;
            }
        }
        Ok(Type::enum_tag(tag))
    }

    /// Applies a declarator chain to a base type, returning the declared
    /// name (empty for abstract declarators) and the full derived type.
    fn declared_type(&self, base: &Type, declarator: &Node, ctx: &Context) -> Result<(String, Type), CompileError> {
        match declarator.kind.as_str() {
            "ident_declarator" => Ok((declarator.text.clone(), base.clone())),
            "pointer_declarator" => {
                let (name, inner) = self.declared_type(base, declarator.child(0), ctx)?;
                Ok((name, Type::pointer_to(inner)))
            }
            "paren_declarator" => self.declared_type(base, declarator.child(0), ctx),
            "array_declarator" => {
                let (name, inner_base) = self.array_element_base(base, declarator, ctx)?;
                let len = if declarator.children.len() > 1 {
                    Some(self.const_eval_u64(&declarator.children[1], ctx)?)
                } else {
                    None
                };
                Ok((name, Type::array_of(inner_base, len)))
            }
            "function_declarator" => {
                let (name, ret) = self.declared_type(base, declarator.child(0), ctx)?;
                let mut params = Vec::new();
                let mut variadic = false;
                for p in &declarator.children[1..] {
                    if p.is("ellipsis") {
                        variadic = true;
                        continue;
                    }
                    let pspecs = p.child(0);
                    let pbase = self.base_type_readonly(pspecs, ctx)?;
                    let (_, pty) = self.declared_type(&pbase, p.child(1), ctx)?;
                    params.push(decay_param(pty));
                }
                Ok((name, Type::function(ret, params, variadic)))
            }
            other => Err(CompileError::parse(declarator.loc, format!("declarator node '{other}'"))),
        }
    }

    /// `array_declarator`'s first child is the declarator it modifies, not
    /// a type; this unwraps one level before recursing.
    fn array_element_base(&self, base: &Type, node: &Node, ctx: &Context) -> Result<(String, Type), CompileError> {
        self.declared_type(base, node.child(0), ctx)
    }

    fn base_type_readonly(&self, specs: &Node, ctx: &Context) -> Result<Type, CompileError> {
        let mut basics = Vec::new();
        for c in &specs.children {
            match c.kind.as_str() {
                "keyword" => match c.text.as_str() {
                    "const" | "volatile" | "typedef" | "extern" | "static" | "auto" | "register" => {}
                    kw => basics.push(kw),
                },
                "typedef_name" => {
                    return ctx
                        .typedefs
                        .get(&c.text)
                        .cloned()
                        .ok_or_else(|| CompileError::name(c.loc, format!("unknown type name '{}'", c.text)));
                }
                "struct_specifier" | "union_specifier" => {
                    let is_union = c.kind == "union_specifier";
                    return Ok(if is_union { Type::union_tag(c.text.clone()) } else { Type::struct_tag(c.text.clone()) });
                }
                "enum_specifier" => return Ok(Type::enum_tag(c.text.clone())),
                _ => {}
            }
        }
        Ok(Type::basic(basic_from_keywords(&basics, specs.loc)?))
    }

    fn const_eval_u64(&self, expr: &Node, ctx: &Context) -> Result<u64, CompileError> {
        Ok(eval_integer_constant_expr(expr, ctx)? as u64)
    }

    // ---- global declarations ----

    fn global_declaration(&mut self, decl: &Node, ctx: &mut Context) -> Result<(), CompileError> {
        let specs = decl.child(0);
        let is_typedef = specs.children.iter().any(|c| c.is("keyword") && c.text == "typedef");
        let base = self.base_type(specs, ctx)?;
        if decl.children.len() == 1 {
            return Ok(()); // bare `struct S;` / `enum E { ... };`
        }
        for init_decl in &decl.children[1..] {
            let declarator = init_decl.child(0);
            let (name, ty) = self.declared_type(&base, declarator, ctx)?;
            if is_typedef {
                ctx.typedefs
                    .define(&name, ty)
                    .map_err(|_| CompileError::name(init_decl.loc, format!("redefinition of typedef '{name}'")))?;
                continue;
            }
            if ty.is_function() {
                ctx.identifiers
                    .define(&name, Symbol { ty, kind: SymbolKind::Function })
                    .ok();
                continue;
            }
            let ir_name = format!("@{name}");
            let decl_text = if init_decl.children.len() > 1 {
                let v = self.constant_expression(&init_decl.children[1], ctx)?;
                format!("global {} {}", ir_type(&ty, &ctx.tags), v.ir_name)
            } else {
                format!("global {} zeroinitializer", ir_type(&ty, &ctx.tags))
            };
            self.builder.declare_global(&ir_name, decl_text);
            ctx.identifiers
                .define(&name, Symbol { ty, kind: SymbolKind::Variable { ir_name } })
                .map_err(|_| CompileError::name(init_decl.loc, format!("redefinition of '{name}'")))?;
        }
        Ok(())
    }

    fn constant_expression(&mut self, expr: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let v = self.expression(expr, ctx, false)?;
        if !v.is_constant {
            return Err(CompileError::ty(expr.loc, "initializer is not a compile-time constant"));
        }
        Ok(v)
    }

    // ---- functions ----

    fn function_definition(&mut self, node: &Node, ctx: &mut Context) -> Result<(), CompileError> {
        let specs = node.child(0);
        let declarator = node.child(1);
        let body = node.child(2);
        let base = self.base_type(specs, ctx)?;
        let (name, ty) = self.declared_type(&base, declarator, ctx)?;
        let TypeKind::Function(ret, params, variadic) = ty.kind.clone() else {
            return Err(CompileError::ty(node.loc, "function definition with non-function declarator"));
        };
        ctx.identifiers
            .define(&name, Symbol { ty: ty.clone(), kind: SymbolKind::Function })
            .ok();

        self.labels = LabelTable::new();
        self.return_type = (*ret).clone();
        self.function_name = name.clone();

        let param_names = function_declarator_param_names(declarator);
        let mut fn_ctx = ctx.clone();
        fn_ctx.open_scope();
        let mut param_text = Vec::new();
        for (i, pty) in params.iter().enumerate() {
            let pname = param_names.get(i).cloned().unwrap_or_default();
            let slot = format!("%{}.addr", if pname.is_empty() { format!("p{i}") } else { pname.clone() });
            let argreg = format!("%{}", if pname.is_empty() { format!("arg{i}") } else { format!("{pname}.in") });
            param_text.push(format!("{} {}", ir_type(pty, &ctx.tags), argreg));
            self.builder.emit_prologue(format!("{slot} = alloca {}", ir_type(pty, &ctx.tags)));
            self.builder.emit_prologue(format!("store {} {}, ptr {slot}", ir_type(pty, &ctx.tags), argreg));
            if !pname.is_empty() {
                fn_ctx
                    .identifiers
                    .define(&pname, Symbol { ty: pty.clone(), kind: SymbolKind::Variable { ir_name: slot } })
                    .ok();
            }
        }
        if variadic {
            param_text.push("...".to_string());
        }
        self.predeclare_labels(body);
        self.terminated = false;

        self.statement(body, &mut fn_ctx)?;
        if let Some(undefined) = self.labels.undefined_labels().first() {
            return Err(CompileError::flow(node.loc, format!("label '{undefined}' is never defined")));
        }
        if !self.terminated {
            if self.return_type.is_void() {
                self.terminate("ret void");
            } else {
                self.terminate(format!("ret {} zeroinitializer", ir_type(&self.return_type, &ctx.tags)));
            }
        }
        let signature = format!(
            "define {} @{}({})",
            ir_type(&ret, &ctx.tags),
            name,
            param_text.join(", ")
        );
        self.builder.finish_function(signature);
        Ok(())
    }

    fn predeclare_labels(&mut self, node: &Node) {
        if node.kind == "label" {
            let n = self.builder.fresh_label();
            self.labels.declare(&node.child(0).text, n);
        }
        for c in &node.children {
            self.predeclare_labels(c);
        }
    }

    // ---- statements ----

    fn statement(&mut self, node: &Node, ctx: &mut Context) -> Result<(), CompileError> {
        match node.kind.as_str() {
            "compound_statement" => {
                let mut inner = ctx.clone();
                inner.open_scope();
                for c in &node.children {
                    self.statement(c, &mut inner)?;
                }
            }
            "declaration" => self.local_declaration(node, ctx)?,
            "exp_statement" => {
                self.expression(node.child(0), ctx, false)?;
            }
            "empty_statement" => {}
            "if" => {
                let cond = self.expression(node.child(0), ctx, false)?;
                let then_label = self.builder.fresh_label();
                let else_label = self.builder.fresh_label();
                let end_label = self.builder.fresh_label();
                let has_else = node.children.len() > 2;
                self.terminate(format!(
                    "br i1 {}, label %{}, label %{}",
                    cond.ir_name,
                    strip(&then_label),
                    strip(if has_else { &else_label } else { &end_label })
                ));
                self.begin_block(&then_label);
                let mut then_ctx = ctx.clone();
                self.statement(node.child(1), &mut then_ctx)?;
                self.branch_if_open(&end_label);
                if has_else {
                    self.begin_block(&else_label);
                    let mut else_ctx = ctx.clone();
                    self.statement(&node.children[2], &mut else_ctx)?;
                    self.branch_if_open(&end_label);
                }
                self.begin_block(&end_label);
            }
            "while" => {
                let head = self.builder.fresh_label();
                let body_label = self.builder.fresh_label();
                let end_label = self.builder.fresh_label();
                self.branch_if_open(&head);
                self.begin_block(&head);
                let cond = self.expression(node.child(0), ctx, false)?;
                self.terminate(format!(
                    "br i1 {}, label %{}, label %{}",
                    cond.ir_name,
                    strip(&body_label),
                    strip(&end_label)
                ));
                self.begin_block(&body_label);
                let mut inner = ctx.clone();
                inner.continue_label = Some(head.clone());
                inner.break_label = Some(end_label.clone());
                self.statement(node.child(1), &mut inner)?;
                self.branch_if_open(&head);
                self.begin_block(&end_label);
            }
            "do_while" => {
                let body_label = self.builder.fresh_label();
                let cond_label = self.builder.fresh_label();
                let end_label = self.builder.fresh_label();
                self.branch_if_open(&body_label);
                self.begin_block(&body_label);
                let mut inner = ctx.clone();
                inner.continue_label = Some(cond_label.clone());
                inner.break_label = Some(end_label.clone());
                self.statement(node.child(0), &mut inner)?;
                self.branch_if_open(&cond_label);
                self.begin_block(&cond_label);
                let cond = self.expression(node.child(1), ctx, false)?;
                self.terminate(format!(
                    "br i1 {}, label %{}, label %{}",
                    cond.ir_name,
                    strip(&body_label),
                    strip(&end_label)
                ));
                self.begin_block(&end_label);
            }
            "for" => {
                let mut inner = ctx.clone();
                inner.open_scope();
                self.statement(node.child(0), &mut inner)?;
                let head = self.builder.fresh_label();
                let body_label = self.builder.fresh_label();
                let step_label = self.builder.fresh_label();
                let end_label = self.builder.fresh_label();
                self.branch_if_open(&head);
                self.begin_block(&head);
                if !node.child(1).children.is_empty() {
                    let cond = self.expression(node.child(1).child(0), &mut inner, false)?;
                    self.terminate(format!(
                        "br i1 {}, label %{}, label %{}",
                        cond.ir_name,
                        strip(&body_label),
                        strip(&end_label)
                    ));
                } else {
                    self.branch_if_open(&body_label);
                }
                self.begin_block(&body_label);
                let mut body_ctx = inner.clone();
                body_ctx.continue_label = Some(step_label.clone());
                body_ctx.break_label = Some(end_label.clone());
                self.statement(node.child(3), &mut body_ctx)?;
                self.branch_if_open(&step_label);
                self.begin_block(&step_label);
                if !node.child(2).children.is_empty() {
                    self.expression(node.child(2).child(0), &mut inner, false)?;
                }
                self.branch_if_open(&head);
                self.begin_block(&end_label);
            }
            "switch" => self.switch_statement(node, ctx)?,
            "case" => {
                let value = eval_integer_constant_expr(node.child(0), ctx)?;
                let label = ctx
                    .switch
                    .as_ref()
                    .and_then(|s| s.cases.iter().find(|(v, _)| *v == value).map(|(_, l)| l.clone()))
                    .unwrap_or_else(|| self.builder.fresh_label());
                self.begin_block(&label);
                self.statement(node.child(1), ctx)?;
            }
            "default" => {
                let label = ctx
                    .switch
                    .as_ref()
                    .and_then(|s| s.default_label.clone())
                    .unwrap_or_else(|| self.builder.fresh_label());
                self.begin_block(&label);
                self.statement(node.child(0), ctx)?;
            }
            "return" => {
                if let Some(expr) = node.children.first() {
                    let v = self.expression(expr, ctx, false)?;
                    let converted = self.convert_to(&self.return_type.clone(), &v, node.loc)?;
                    self.terminate(format!("ret {} {}", ir_type(&self.return_type, &ctx.tags), converted.ir_name));
                } else {
                    self.terminate("ret void");
                }
                let unreachable = self.builder.fresh_label();
                self.begin_block(&unreachable);
            }
            "break" => {
                let target = ctx
                    .break_label
                    .clone()
                    .ok_or_else(|| CompileError::flow(node.loc, "'break' outside loop or switch"))?;
                self.branch_if_open(&target);
                let unreachable = self.builder.fresh_label();
                self.begin_block(&unreachable);
            }
            "continue" => {
                let target = ctx
                    .continue_label
                    .clone()
                    .ok_or_else(|| CompileError::flow(node.loc, "'continue' outside loop"))?;
                self.branch_if_open(&target);
                let unreachable = self.builder.fresh_label();
                self.begin_block(&unreachable);
            }
            "goto" => {
                let target = self
                    .labels
                    .ir_label(&node.text)
                    .ok_or_else(|| CompileError::flow(node.loc, format!("undeclared label '{}'", node.text)))?
                    .to_string();
                self.branch_if_open(&target);
                let unreachable = self.builder.fresh_label();
                self.begin_block(&unreachable);
            }
            "label" => {
                let name = node.child(0).text.clone();
                let ir_label = self
                    .labels
                    .ir_label(&name)
                    .expect("labels are predeclared before statement generation")
                    .to_string();
                self.labels
                    .mark_defined(&name)
                    .map_err(|_| CompileError::flow(node.loc, format!("redefinition of label '{name}'")))?;
                self.begin_block(&ir_label);
                self.statement(node.child(1), ctx)?;
            }
            other => return Err(CompileError::parse(node.loc, format!("statement node '{other}'"))),
        }
        Ok(())
    }

    fn switch_statement(&mut self, node: &Node, ctx: &mut Context) -> Result<(), CompileError> {
        let cond = self.expression(node.child(0), ctx, false)?;
        let end_label = self.builder.fresh_label();
        let mut switch_ctx = ctx.clone();
        switch_ctx.break_label = Some(end_label.clone());
        let mut state = SwitchState::new();
        self.prewalk_switch(node.child(1), &mut state)?;
        let dispatch_block = node.child(1);
        let default_target = state.default_label.clone().unwrap_or_else(|| end_label.clone());
        let mut dispatch = String::new();
        for (value, label) in &state.cases {
            dispatch.push_str(&format!(", i32 {} label %{}", value, strip(label)));
        }
        self.terminate(format!(
            "switch i32 {} , label %{} [{}]",
            cond.ir_name,
            strip(&default_target),
            dispatch
        ));
        switch_ctx.switch = Some(state);
        self.statement(dispatch_block, &mut switch_ctx)?;
        self.branch_if_open(&end_label);
        self.begin_block(&end_label);
        Ok(())
    }

    /// Collects `case`/`default` labels in source order ahead of emission,
    /// allocating each an IR label now so `switch_statement`'s dispatch
    /// table can reference labels that don't exist yet in the body.
    fn prewalk_switch(&mut self, node: &Node, state: &mut SwitchState) -> Result<(), CompileError> {
        match node.kind.as_str() {
            "case" => {
                let ctx = Context::new();
                let value = eval_integer_constant_expr(node.child(0), &ctx)?;
                let label = self.builder.fresh_label();
                state
                    .add_case(value, label)
                    .map_err(|_| CompileError::flow(node.loc, format!("duplicate case value {value}")))?;
                self.prewalk_switch(node.child(1), state)?;
            }
            "default" => {
                if state.default_label.is_some() {
                    return Err(CompileError::flow(node.loc, "multiple default labels in one switch"));
                }
                state.default_label = Some(self.builder.fresh_label());
                self.prewalk_switch(node.child(0), state)?;
            }
            "switch" => {} // nested switch owns its own cases
            _ => {
                for c in &node.children {
                    self.prewalk_switch(c, state)?;
                }
            }
        }
        Ok(())
    }

    fn local_declaration(&mut self, decl: &Node, ctx: &mut Context) -> Result<(), CompileError> {
        let specs = decl.child(0);
        let is_typedef = specs.children.iter().any(|c| c.is("keyword") && c.text == "typedef");
        let base = self.base_type(specs, ctx)?;
        if decl.children.len() == 1 {
            return Ok(());
        }
        for init_decl in &decl.children[1..] {
            let declarator = init_decl.child(0);
            let (name, ty) = self.declared_type(&base, declarator, ctx)?;
            if is_typedef {
                ctx.typedefs
                    .define(&name, ty)
                    .map_err(|_| CompileError::name(init_decl.loc, format!("redefinition of typedef '{name}'")))?;
                continue;
            }
            let ir_ty = ir_type(&ty, &ctx.tags);
            let slot = format!("%{name}.{}", self.builder.fresh_temp().trim_start_matches("%_"));
            self.builder.emit_prologue(format!("{slot} = alloca {ir_ty}"));
            ctx.identifiers
                .define(&name, Symbol { ty: ty.clone(), kind: SymbolKind::Variable { ir_name: slot.clone() } })
                .map_err(|_| CompileError::name(init_decl.loc, format!("redefinition of '{name}'")))?;
            if init_decl.children.len() > 1 {
                let rhs = self.expression(&init_decl.children[1], ctx, false)?;
                let converted = self.convert_to(&ty, &rhs, init_decl.loc)?;
                self.builder.emit(format!("store {ir_ty} {}, ptr {slot}", converted.ir_name));
            }
        }
        Ok(())
    }

    // ---- expressions ----

    /// `want_lvalue` suppresses the result-adjustment rule (decay + load)
    /// for callers that need the address itself: the operand of `&`, and
    /// the left side of an assignment.
    fn expression(&mut self, node: &Node, ctx: &mut Context, want_lvalue: bool) -> Result<Value, CompileError> {
        let raw = self.expression_raw(node, ctx)?;
        if want_lvalue {
            return Ok(raw);
        }
        self.adjust(raw, ctx)
    }

    /// Function-to-pointer decay, array-to-pointer decay, then an
    /// lvalue-to-value load, per the result-adjustment rule.
    fn adjust(&mut self, v: Value, ctx: &Context) -> Result<Value, CompileError> {
        if v.ty.is_function() {
            return Ok(Value::ir(v.ir_name, Type::pointer_to(v.ty), false));
        }
        if v.ty.is_array() {
            let elem = v.ty.element_type().unwrap().clone();
            return Ok(Value::ir(v.ir_name, Type::pointer_to(elem), false));
        }
        if v.is_lvalue {
            let loaded = self.builder.fresh_temp();
            let ir_ty = ir_type(&v.ty, &ctx.tags);
            self.builder.emit(format!("{loaded} = load {ir_ty}, ptr {}", v.ir_name));
            return Ok(Value::ir(loaded, v.ty.unqualified(), false));
        }
        Ok(v)
    }

    fn expression_raw(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        match node.kind.as_str() {
            "identifier" => self.identifier(node, ctx),
            "int_const" => {
                let (v, ty) = parse_int_constant(&node.text);
                Ok(Value::int_const(ty, v))
            }
            "float_const" => Ok(Value::float_const(Type::basic(Basic::Double), parse_float_constant(&node.text))),
            "char_const" => Ok(Value::int_const(Type::basic(Basic::Int), node.text.chars().next().unwrap_or('\0') as u64)),
            "string_const" => {
                let name = self.builder.define_string(node.text.as_bytes());
                let ty = Type::array_of(Type::basic(Basic::Char), Some(node.text.len() as u64 + 1));
                Ok(Value::ir(name, ty, true))
            }
            "," => {
                let mut last = None;
                for c in &node.children {
                    last = Some(self.expression(c, ctx, false)?);
                }
                Ok(last.expect("comma expression has at least one operand"))
            }
            "?:" => self.conditional(node, ctx),
            "&&" | "||" => self.short_circuit(node, ctx),
            "=" => self.assignment(node, ctx),
            op if is_compound_assign(op) => self.compound_assignment(node, ctx),
            "unary&" => {
                let operand = self.expression(node.child(0), ctx, true)?;
                if !operand.is_lvalue && !operand.ty.is_function() {
                    return Err(CompileError::ty(node.loc, "cannot take address of non-lvalue"));
                }
                Ok(Value::ir(operand.ir_name, Type::pointer_to(operand.ty), false))
            }
            "unary*" => {
                let operand = self.expression(node.child(0), ctx, false)?;
                let pointee = operand
                    .ty
                    .pointee()
                    .ok_or_else(|| CompileError::ty(node.loc, "indirection requires pointer operand"))?
                    .clone();
                if !pointee.is_function() && !pointee.is_complete(&ctx.tags) {
                    return Err(CompileError::ty(node.loc, "indirection through pointer to incomplete type"));
                }
                Ok(Value::ir(operand.ir_name, pointee, true))
            }
            "unary+" => self.expression(node.child(0), ctx, false),
            "unary-" => {
                let v = self.expression(node.child(0), ctx, false)?;
                if !v.ty.is_arithmetic() {
                    return Err(CompileError::ty(node.loc, "unary '-' requires arithmetic operand"));
                }
                let promoted = self.promote(&v, ctx)?;
                if promoted.is_constant {
                    return Ok(value::fold_unary_minus(&promoted.ty, &promoted));
                }
                let r = self.builder.fresh_temp();
                let instr = if promoted.ty.is_floating() { "fneg" } else { "sub" };
                if instr == "fneg" {
                    self.builder.emit(format!("{r} = fneg {} {}", ir_type(&promoted.ty, &ctx.tags), promoted.ir_name));
                } else {
                    self.builder.emit(format!("{r} = sub {} 0, {}", ir_type(&promoted.ty, &ctx.tags), promoted.ir_name));
                }
                Ok(Value::ir(r, promoted.ty, false))
            }
            "unary~" => {
                let v = self.expression(node.child(0), ctx, false)?;
                let promoted = self.promote(&v, ctx)?;
                if promoted.is_constant {
                    return Ok(value::fold_bitnot(&promoted.ty, &promoted));
                }
                let r = self.builder.fresh_temp();
                self.builder.emit(format!("{r} = xor {} {}, -1", ir_type(&promoted.ty, &ctx.tags), promoted.ir_name));
                Ok(Value::ir(r, promoted.ty, false))
            }
            "unary!" => {
                let v = self.expression(node.child(0), ctx, false)?;
                if v.is_constant {
                    return Ok(value::fold_logical_not(&v));
                }
                let zero = zero_of(&v.ty);
                let r = self.builder.fresh_temp();
                self.builder.emit(format!(
                    "{r} = {} {} {} {}, {}",
                    cmp_mnemonic(&v.ty),
                    "eq",
                    ir_type(&v.ty, &ctx.tags),
                    v.ir_name,
                    zero
                ));
                Ok(Value::int_const_from_bool(r))
            }
            "pre++" | "pre--" | "post++" | "post--" => self.incdec(node, ctx),
            "sizeof_expr" => {
                let mut result_ty = None;
                self.builder.silenced(|b| {
                    let mut probe = Generator {
                        builder: std::mem::replace(b, Builder::new()),
                        builtins: BuiltinTable::new(),
                        labels: LabelTable::new(),
                        return_type: Type::void(),
                        function_name: String::new(),
                        struct_counter: 0,
                        terminated: false,
                    };
                    let r = probe.expression(node.child(0), ctx, false);
                    *b = probe.builder;
                    result_ty = r.ok().map(|v| v.ty);
                });
                let ty = result_ty.ok_or_else(|| CompileError::ty(node.loc, "invalid sizeof operand"))?;
                Ok(Value::int_const(Type::basic(Basic::ULong), ty.size(&ctx.tags)))
            }
            "sizeof_type" => {
                let specs = node.child(0);
                let base = self.base_type(specs, ctx)?;
                let abstract_decl = node.child(1);
                let ty = if abstract_decl.children.is_empty() {
                    base
                } else {
                    self.declared_type(&base, abstract_decl.child(0), ctx)?.1
                };
                if !ty.is_complete(&ctx.tags) {
                    return Err(CompileError::ty(node.loc, "sizeof applied to incomplete type"));
                }
                Ok(Value::int_const(Type::basic(Basic::ULong), ty.size(&ctx.tags)))
            }
            "cast" => {
                let specs = node.child(0);
                let base = self.base_type(specs, ctx)?;
                let abstract_decl = node.child(1);
                let target = if abstract_decl.children.is_empty() {
                    base
                } else {
                    self.declared_type(&base, abstract_decl.child(0), ctx)?.1
                };
                let operand = self.expression(&node.children[2], ctx, false)?;
                if !target.is_scalar() && !target.is_void() {
                    return Err(CompileError::ty(node.loc, "cast target must be scalar or void"));
                }
                self.convert_to(&target, &operand, node.loc)
            }
            "[]" => {
                let base = self.expression(node.child(0), ctx, false)?;
                let index = self.expression(node.child(1), ctx, false)?;
                let pointee = base
                    .ty
                    .pointee()
                    .ok_or_else(|| CompileError::ty(node.loc, "subscript requires pointer operand"))?
                    .clone();
                let addr = self.pointer_add(&base, &index, node.loc, ctx)?;
                Ok(Value::ir(addr.ir_name, pointee, true))
            }
            "." | "->" => self.member_access(node, ctx),
            "call" => self.call(node, ctx),
            op if BINARY_OPS.contains(&op) => self.binary(node, ctx),
            op if RELATIONAL_OPS.contains(&op) => self.relational(node, ctx),
            other => Err(CompileError::parse(node.loc, format!("expression node '{other}'"))),
        }
    }

    fn identifier(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        if let Some(sym) = ctx.identifiers.get(&node.text).cloned() {
            return Ok(match sym.kind {
                SymbolKind::Variable { ir_name } => Value::ir(ir_name, sym.ty, true),
                SymbolKind::Function => Value::ir(format!("@{}", node.text), sym.ty, false),
                SymbolKind::EnumConstant(v) => Value::int_const(Type::basic(Basic::Int), v as u64),
            });
        }
        if let Some(sig) = builtins::signature(&node.text) {
            self.builtins.ensure_declared(&node.text, &mut self.builder);
            return Ok(Value::ir(format!("@{}", node.text), sig, false));
        }
        Err(CompileError::name(node.loc, format!("use of undeclared identifier '{}'", node.text)))
    }

    fn promote(&mut self, v: &Value, ctx: &Context) -> Result<Value, CompileError> {
        let Some(b) = v.ty.as_basic() else {
            return Ok(v.clone());
        };
        let promoted = b.promote();
        if promoted == b {
            return Ok(v.clone());
        }
        self.convert_to(&Type::basic(promoted), v, crate::file_manager::SourceLocation::synthetic())
    }

    fn binary(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let op = node.kind.as_str();
        let lhs = self.expression(node.child(0), ctx, false)?;
        let rhs = self.expression(node.child(1), ctx, false)?;
        if (op == "+" || op == "-") && (lhs.ty.is_pointer() || rhs.ty.is_pointer()) {
            return self.pointer_arithmetic(op, &lhs, &rhs, node.loc, ctx);
        }
        if !lhs.ty.is_arithmetic() || !rhs.ty.is_arithmetic() {
            return Err(CompileError::ty(node.loc, format!("invalid operands to binary '{op}'")));
        }
        let common = common_arithmetic_type(lhs.ty.as_basic().unwrap(), rhs.ty.as_basic().unwrap());
        let common_ty = Type::basic(common);
        let a = self.convert_to(&common_ty, &lhs, node.loc)?;
        let b = self.convert_to(&common_ty, &rhs, node.loc)?;
        if a.is_constant && b.is_constant {
            return Ok(value::fold_binary(op, &common_ty, &a, &b));
        }
        let r = self.builder.fresh_temp();
        let mnemonic = arith_mnemonic(op, common);
        self.builder.emit(format!("{r} = {mnemonic} {} {}, {}", ir_type(&common_ty, &ctx.tags), a.ir_name, b.ir_name));
        Ok(Value::ir(r, common_ty, false))
    }

    fn relational(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let op = node.kind.as_str();
        let lhs = self.expression(node.child(0), ctx, false)?;
        let rhs = self.expression(node.child(1), ctx, false)?;
        let operand_ty = if lhs.ty.is_pointer() || rhs.ty.is_pointer() {
            lhs.ty.clone()
        } else {
            Type::basic(common_arithmetic_type(
                lhs.ty.as_basic().ok_or_else(|| CompileError::ty(node.loc, "invalid operand"))?,
                rhs.ty.as_basic().ok_or_else(|| CompileError::ty(node.loc, "invalid operand"))?,
            ))
        };
        let a = self.convert_to(&operand_ty, &lhs, node.loc)?;
        let b = self.convert_to(&operand_ty, &rhs, node.loc)?;
        if a.is_constant && b.is_constant {
            return Ok(value::fold_relational(op, &operand_ty, &a, &b));
        }
        let r = self.builder.fresh_temp();
        self.builder.emit(format!(
            "{r} = {} {} {} {}, {}",
            cmp_mnemonic(&operand_ty),
            cmp_cond(op, &operand_ty),
            ir_type(&operand_ty, &ctx.tags),
            a.ir_name,
            b.ir_name
        ));
        Ok(Value::int_const_from_bool(r))
    }

    fn pointer_arithmetic(&mut self, op: &str, lhs: &Value, rhs: &Value, loc: crate::file_manager::SourceLocation, ctx: &mut Context) -> Result<Value, CompileError> {
        if op == "-" && lhs.ty.is_pointer() && rhs.ty.is_pointer() {
            let elem_size = lhs.ty.pointee().unwrap().size(&ctx.tags).max(1) as i64;
            let l = self.builder.fresh_temp();
            let r = self.builder.fresh_temp();
            let d = self.builder.fresh_temp();
            self.builder.emit(format!("{l} = ptrtoint ptr {} to i64", lhs.ir_name));
            self.builder.emit(format!("{r} = ptrtoint ptr {} to i64", rhs.ir_name));
            self.builder.emit(format!("{d} = sub i64 {l}, {r}"));
            let scaled = self.builder.fresh_temp();
            self.builder.emit(format!("{scaled} = sdiv i64 {d}, {elem_size}"));
            return Ok(Value::ir(scaled, Type::basic(Basic::Long), false));
        }
        let (ptr, index) = if lhs.ty.is_pointer() { (lhs, rhs) } else { (rhs, lhs) };
        let addr = self.pointer_add(ptr, index, loc, ctx)?;
        Ok(if op == "-" && !lhs.ty.is_pointer() {
            // int - pointer has no meaning under this dialect's rules.
            return Err(CompileError::ty(loc, "cannot subtract pointer from integer"));
        } else {
            addr
        })
    }

    fn pointer_add(&mut self, ptr: &Value, index: &Value, loc: crate::file_manager::SourceLocation, ctx: &mut Context) -> Result<Value, CompileError> {
        let pointee = ptr
            .ty
            .pointee()
            .ok_or_else(|| CompileError::ty(loc, "pointer arithmetic requires pointer operand"))?
            .clone();
        let idx = self.convert_to(&Type::basic(Basic::Long), index, loc)?;
        let r = self.builder.fresh_temp();
        self.builder.emit(format!(
            "{r} = getelementptr {}, ptr {}, i64 {}",
            ir_type(&pointee, &ctx.tags),
            ptr.ir_name,
            idx.ir_name
        ));
        Ok(Value::ir(r, ptr.ty.clone(), false))
    }

    fn short_circuit(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let op = node.kind.as_str();
        let lhs = self.expression(node.child(0), ctx, false)?;
        if lhs.is_constant {
            let lhs_true = !lhs.is_false();
            if (op == "&&" && !lhs_true) || (op == "||" && lhs_true) {
                return Ok(Value::int_const(Type::basic(Basic::Int), lhs_true as u64));
            }
            let rhs = self.expression(node.child(1), ctx, false)?;
            if rhs.is_constant {
                return Ok(Value::int_const(Type::basic(Basic::Int), (!rhs.is_false()) as u64));
            }
        }
        let rhs_label = self.builder.fresh_label();
        let short_label = self.builder.fresh_label();
        let end_label = self.builder.fresh_label();
        let slot = format!("%sc.{}", self.builder.fresh_temp().trim_start_matches("%_"));
        self.builder.emit_prologue(format!("{slot} = alloca i32"));
        let lhs_truth = self.truthy(&lhs, ctx)?;
        if op == "&&" {
            self.terminate(format!("br i1 {lhs_truth}, label %{}, label %{}", strip(&rhs_label), strip(&short_label)));
        } else {
            self.terminate(format!("br i1 {lhs_truth}, label %{}, label %{}", strip(&short_label), strip(&rhs_label)));
        }
        self.begin_block(&short_label);
        self.builder.emit(format!("store i32 {}, ptr {slot}", if op == "&&" { 0 } else { 1 }));
        self.branch_if_open(&end_label);
        self.begin_block(&rhs_label);
        let rhs = self.expression(node.child(1), ctx, false)?;
        let rhs_truth = self.truthy(&rhs, ctx)?;
        let rhs_int = self.builder.fresh_temp();
        self.builder.emit(format!("{rhs_int} = zext i1 {rhs_truth} to i32"));
        self.builder.emit(format!("store i32 {rhs_int}, ptr {slot}"));
        self.branch_if_open(&end_label);
        self.begin_block(&end_label);
        let result = self.builder.fresh_temp();
        self.builder.emit(format!("{result} = load i32, ptr {slot}"));
        Ok(Value::ir(result, Type::basic(Basic::Int), false))
    }

    /// Walks `node` under a silenced builder and a scratch label table,
    /// returning only the type its value would carry. Used where a
    /// decision (the common type of a `?:`) must be made before either
    /// branch's real, side-effecting code can be emitted.
    fn probe_type(&mut self, node: &Node, ctx: &mut Context) -> Result<Type, CompileError> {
        let mut result = None;
        self.builder.silenced(|b| {
            let mut probe = Generator {
                builder: std::mem::replace(b, Builder::new()),
                builtins: BuiltinTable::new(),
                labels: LabelTable::new(),
                return_type: Type::void(),
                function_name: String::new(),
                struct_counter: 0,
                terminated: false,
            };
            let r = probe.expression(node, ctx, false);
            *b = probe.builder;
            result = r.ok().map(|v| v.ty);
        });
        result.ok_or_else(|| CompileError::ty(node.loc, "invalid operand"))
    }

    fn truthy(&mut self, v: &Value, ctx: &Context) -> Result<String, CompileError> {
        if v.is_constant {
            return Ok(if v.is_false() { "false".into() } else { "true".into() });
        }
        let zero = zero_of(&v.ty);
        let r = self.builder.fresh_temp();
        self.builder.emit(format!("{r} = {} ne {} {}, {}", cmp_mnemonic(&v.ty), ir_type(&v.ty, &ctx.tags), v.ir_name, zero));
        Ok(r)
    }

    fn conditional(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let cond = self.expression(node.child(0), ctx, false)?;
        if !cond.ty.is_scalar() {
            return Err(CompileError::ty(node.loc, "'?:' condition must be scalar"));
        }
        // Each arm's type is needed to pick the common result type before
        // either arm's real code can be emitted, so probe both arms once
        // under a silenced builder (side effects discarded) before doing
        // the real, single emission of whichever arm actually runs.
        let then_ty = self.probe_type(&node.children[1], ctx)?;
        let else_ty = self.probe_type(&node.children[2], ctx)?;
        let common = if then_ty.is_arithmetic() && else_ty.is_arithmetic() {
            Type::basic(common_arithmetic_type(then_ty.as_basic().unwrap(), else_ty.as_basic().unwrap()))
        } else {
            then_ty
        };

        if cond.is_constant {
            return if cond.is_false() {
                let v = self.expression(&node.children[2], ctx, false)?;
                self.convert_to(&common, &v, node.loc)
            } else {
                let v = self.expression(&node.children[1], ctx, false)?;
                self.convert_to(&common, &v, node.loc)
            };
        }

        let then_label = self.builder.fresh_label();
        let else_label = self.builder.fresh_label();
        let end_label = self.builder.fresh_label();
        let cond_truth = self.truthy(&cond, ctx)?;
        let slot = format!("%cond.{}", self.builder.fresh_temp().trim_start_matches("%_"));
        self.builder.emit_prologue(format!("{slot} = alloca {}", ir_type(&common, &ctx.tags)));
        self.terminate(format!(
            "br i1 {cond_truth}, label %{}, label %{}",
            strip(&then_label),
            strip(&else_label)
        ));
        self.begin_block(&then_label);
        let then_v = self.expression(&node.children[1], ctx, false)?;
        let then_c = self.convert_to(&common, &then_v, node.loc)?;
        self.builder.emit(format!("store {} {}, ptr {slot}", ir_type(&common, &ctx.tags), then_c.ir_name));
        self.branch_if_open(&end_label);
        self.begin_block(&else_label);
        let else_v = self.expression(&node.children[2], ctx, false)?;
        let else_c = self.convert_to(&common, &else_v, node.loc)?;
        self.builder.emit(format!("store {} {}, ptr {slot}", ir_type(&common, &ctx.tags), else_c.ir_name));
        self.branch_if_open(&end_label);
        self.begin_block(&end_label);
        let result = self.builder.fresh_temp();
        self.builder.emit(format!("{result} = load {}, ptr {slot}", ir_type(&common, &ctx.tags)));
        Ok(Value::ir(result, common, false))
    }

    fn assignment(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let lhs = self.expression(node.child(0), ctx, true)?;
        if !lhs.is_lvalue {
            return Err(CompileError::ty(node.loc, "left side of assignment is not assignable"));
        }
        let rhs = self.expression(node.child(1), ctx, false)?;
        let converted = self.convert_to(&lhs.ty, &rhs, node.loc)?;
        self.builder.emit(format!("store {} {}, ptr {}", ir_type(&lhs.ty, &ctx.tags), converted.ir_name, lhs.ir_name));
        Ok(Value::ir(converted.ir_name, lhs.ty, false))
    }

    fn compound_assignment(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let op = &node.kind[..node.kind.len() - 1];
        let lhs_lv = self.expression(node.child(0), ctx, true)?;
        let cur = self.adjust(lhs_lv.clone(), ctx)?;
        let rhs = self.expression(node.child(1), ctx, false)?;
        let result = if op == "+" || op == "-" {
            if cur.ty.is_pointer() {
                self.pointer_arithmetic(op, &cur, &rhs, node.loc, ctx)?
            } else {
                self.binary_values(op, &cur, &rhs, node.loc, ctx)?
            }
        } else {
            self.binary_values(op, &cur, &rhs, node.loc, ctx)?
        };
        let converted = self.convert_to(&lhs_lv.ty, &result, node.loc)?;
        self.builder.emit(format!("store {} {}, ptr {}", ir_type(&lhs_lv.ty, &ctx.tags), converted.ir_name, lhs_lv.ir_name));
        Ok(Value::ir(converted.ir_name, lhs_lv.ty, false))
    }

    fn binary_values(&mut self, op: &str, a: &Value, b: &Value, loc: crate::file_manager::SourceLocation, ctx: &mut Context) -> Result<Value, CompileError> {
        let common = Type::basic(common_arithmetic_type(
            a.ty.as_basic().ok_or_else(|| CompileError::ty(loc, "invalid operand"))?,
            b.ty.as_basic().ok_or_else(|| CompileError::ty(loc, "invalid operand"))?,
        ));
        let x = self.convert_to(&common, a, loc)?;
        let y = self.convert_to(&common, b, loc)?;
        if x.is_constant && y.is_constant {
            return Ok(value::fold_binary(op, &common, &x, &y));
        }
        let r = self.builder.fresh_temp();
        let mnemonic = arith_mnemonic(op, common.as_basic().unwrap());
        self.builder.emit(format!("{r} = {mnemonic} {} {}, {}", ir_type(&common, &ctx.tags), x.ir_name, y.ir_name));
        Ok(Value::ir(r, common, false))
    }

    fn incdec(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let is_pre = node.kind.starts_with("pre");
        let is_inc = node.kind.ends_with("++");
        let lv = self.expression(node.child(0), ctx, true)?;
        let cur = self.adjust(lv.clone(), ctx)?;
        let one = if cur.ty.is_pointer() {
            Value::int_const(Type::basic(Basic::Long), 1)
        } else if cur.ty.is_floating() {
            Value::float_const(cur.ty.clone(), 1.0)
        } else {
            Value::int_const(cur.ty.clone(), 1)
        };
        let op = if is_inc { "+" } else { "-" };
        let updated = if cur.ty.is_pointer() {
            self.pointer_arithmetic(op, &cur, &one, node.loc, ctx)?
        } else {
            self.binary_values(op, &cur, &one, node.loc, ctx)?
        };
        self.builder.emit(format!("store {} {}, ptr {}", ir_type(&lv.ty, &ctx.tags), updated.ir_name, lv.ir_name));
        Ok(if is_pre { updated } else { cur })
    }

    fn member_access(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let via_pointer = node.kind == "->";
        let base = self.expression(node.child(0), ctx, !via_pointer)?;
        let agg_ty = if via_pointer {
            base.ty.pointee().ok_or_else(|| CompileError::ty(node.loc, "'->' requires pointer operand"))?.clone()
        } else {
            base.ty.clone()
        };
        let tag = agg_ty.tag().ok_or_else(|| CompileError::ty(node.loc, "member access on non-aggregate type"))?;
        let def = ctx
            .tags
            .get_aggregate(tag)
            .ok_or_else(|| CompileError::ty(node.loc, format!("incomplete type 'struct {tag}'")))?
            .clone();
        let field_name = &node.child(1).text;
        let field_ty = def
            .field_type(field_name)
            .ok_or_else(|| CompileError::ty(node.loc, format!("no member named '{field_name}'")))?
            .clone();
        let offset = def.field_offset(field_name, &ctx.tags).unwrap_or(0);
        let addr = self.builder.fresh_temp();
        self.builder.emit(format!(
            "{addr} = getelementptr i8, ptr {}, i64 {}",
            base.ir_name, offset
        ));
        Ok(Value::ir(addr, field_ty, true))
    }

    fn call(&mut self, node: &Node, ctx: &mut Context) -> Result<Value, CompileError> {
        let callee_node = node.child(0);
        let callee = self.expression(callee_node, ctx, false)?;
        let fn_ty = callee.ty.pointee().cloned().unwrap_or(callee.ty.clone());
        let TypeKind::Function(ret, params, variadic) = fn_ty.kind.clone() else {
            return Err(CompileError::ty(node.loc, "called object is not a function"));
        };
        let mut arg_strs = Vec::new();
        for (i, arg) in node.children[1..].iter().enumerate() {
            let v = self.expression(arg, ctx, false)?;
            let converted = if let Some(pty) = params.get(i) {
                self.convert_to(pty, &v, arg.loc)?
            } else {
                // Variadic argument: default argument promotions.
                if v.ty.is_basic(Basic::Float) {
                    self.convert_to(&Type::basic(Basic::Double), &v, arg.loc)?
                } else if v.ty.as_basic().map(|b| b.promote() != b).unwrap_or(false) {
                    self.promote(&v, ctx)?
                } else {
                    v
                }
            };
            arg_strs.push(format!("{} {}", ir_type(&converted.ty, &ctx.tags), converted.ir_name));
        }
        let ret_ty_text = ir_type(&ret, &ctx.tags);
        let call_text = format!(
            "call {}{} {}({})",
            ret_ty_text,
            if variadic { " (...)" } else { "" },
            callee.ir_name,
            arg_strs.join(", ")
        );
        if ret.is_void() {
            self.builder.emit(call_text);
            Ok(Value::ir(String::new(), Type::void(), false))
        } else {
            let r = self.builder.fresh_temp();
            self.builder.emit(format!("{r} = {call_text}"));
            Ok(Value::ir(r, (*ret).clone(), false))
        }
    }

    // ---- conversions (§4.6) ----

    fn convert_to(&mut self, target: &Type, v: &Value, loc: crate::file_manager::SourceLocation) -> Result<Value, CompileError> {
        if target.is_void() {
            return Ok(Value::ir(String::new(), Type::void(), false));
        }
        if v.is_void_null && target.is_pointer() {
            return Ok(value::convert_constant(target, v));
        }
        if v.is_constant {
            return Ok(value::convert_constant(target, v));
        }
        if crate::types::compatible(target, &v.ty) {
            return Ok(v.clone());
        }
        let from_ir = ir_type(&v.ty, &TagTable::new());
        let to_ir = ir_type(target, &TagTable::new());
        if from_ir == to_ir {
            let mut nv = v.clone();
            nv.ty = target.clone();
            return Ok(nv);
        }
        let r = self.builder.fresh_temp();
        let op = runtime_conversion_op(&v.ty, target);
        self.builder.emit(format!("{r} = {op} {} {} to {}", from_ir, v.ir_name, to_ir));
        Ok(Value::ir(r, target.clone(), false))
    }
}

impl Default for Generator {
    fn default() -> Self {
        Generator::new()
    }
}

impl Value {
    fn int_const_from_bool(ir_name: String) -> Value {
        // A runtime i1 comparison result zero-extended to `int`; kept as a
        // distinct helper from `int_const` because the caller hasn't zext'd
        // yet — the IR line above already names an i1, so the expression
        // layer treats it as already the right width for `br i1`, and the
        // occasional arithmetic use re-widens via `convert_to`.
        Value::ir(ir_name, Type::basic(Basic::Int), false)
    }
}

const BINARY_OPS: &[&str] = &["+", "-", "*", "/", "%", "&", "|", "^", "<<", ">>"];
const RELATIONAL_OPS: &[&str] = &["<", ">", "<=", ">=", "==", "!="];

fn is_compound_assign(op: &str) -> bool {
    matches!(op, "+=" | "-=" | "*=" | "/=" | "%=" | "&=" | "|=" | "^=" | "<<=" | ">>=")
}

fn strip(label: &str) -> &str {
    label.trim_start_matches('%')
}

fn zero_of(ty: &Type) -> &'static str {
    if ty.is_floating() {
        "0.0"
    } else {
        "0"
    }
}

fn cmp_mnemonic(ty: &Type) -> &'static str {
    if ty.is_floating() {
        "fcmp"
    } else {
        "icmp"
    }
}

fn cmp_cond(op: &str, ty: &Type) -> &'static str {
    let signed = ty.is_signed() || ty.is_pointer();
    if ty.is_floating() {
        match op {
            "<" => "olt",
            ">" => "ogt",
            "<=" => "ole",
            ">=" => "oge",
            "==" => "oeq",
            "!=" => "one",
            _ => unreachable!(),
        }
    } else {
        match (op, signed) {
            ("<", true) => "slt",
            ("<", false) => "ult",
            (">", true) => "sgt",
            (">", false) => "ugt",
            ("<=", true) => "sle",
            ("<=", false) => "ule",
            (">=", true) => "sge",
            (">=", false) => "uge",
            ("==", _) => "eq",
            ("!=", _) => "ne",
            _ => unreachable!(),
        }
    }
}

fn arith_mnemonic(op: &str, basic: Basic) -> &'static str {
    if basic.is_floating() {
        match op {
            "+" => "fadd",
            "-" => "fsub",
            "*" => "fmul",
            "/" => "fdiv",
            _ => unreachable!("no floating operand for '{op}'"),
        }
    } else {
        match (op, basic.is_signed()) {
            ("+", _) => "add",
            ("-", _) => "sub",
            ("*", _) => "mul",
            ("/", true) => "sdiv",
            ("/", false) => "udiv",
            ("%", true) => "srem",
            ("%", false) => "urem",
            ("&", _) => "and",
            ("|", _) => "or",
            ("^", _) => "xor",
            ("<<", _) => "shl",
            (">>", true) => "ashr",
            (">>", false) => "lshr",
            _ => unreachable!("unhandled operator '{op}'"),
        }
    }
}

fn runtime_conversion_op(from: &Type, to: &Type) -> &'static str {
    match (&from.kind, &to.kind) {
        (TypeKind::Basic(a), TypeKind::Basic(b)) if a.is_integer() && b.is_integer() => {
            if a.size() == b.size() {
                "bitcast"
            } else if a.size() > b.size() {
                "trunc"
            } else if a.is_signed() {
                "sext"
            } else {
                "zext"
            }
        }
        (TypeKind::Basic(a), TypeKind::Basic(b)) if a.is_floating() && b.is_floating() => {
            if a.size() > b.size() {
                "fptrunc"
            } else {
                "fpext"
            }
        }
        (TypeKind::Basic(a), TypeKind::Basic(_)) if a.is_floating() => {
            if to.is_signed() {
                "fptosi"
            } else {
                "fptoui"
            }
        }
        (TypeKind::Basic(a), TypeKind::Basic(_)) if a.is_integer() => {
            if from.is_signed() {
                "sitofp"
            } else {
                "uitofp"
            }
        }
        (TypeKind::Pointer(_), TypeKind::Basic(_)) => "ptrtoint",
        (TypeKind::Basic(_), TypeKind::Pointer(_)) => "inttoptr",
        (TypeKind::Pointer(_), TypeKind::Pointer(_)) => "bitcast",
        _ => "bitcast",
    }
}

fn basic_from_keywords(keywords: &[&str], loc: crate::file_manager::SourceLocation) -> Result<Basic, CompileError> {
    let mut set: Vec<&str> = keywords.to_vec();
    set.sort_unstable();
    Ok(match set.as_slice() {
        [] => return Err(CompileError::ty(loc, "declaration has no type specifier")),
        ["void"] => Basic::Void,
        ["char"] => Basic::Char,
        ["char", "signed"] => Basic::SChar,
        ["char", "unsigned"] => Basic::UChar,
        ["short"] | ["int", "short"] | ["short", "signed"] | ["int", "short", "signed"] => Basic::Short,
        ["short", "unsigned"] | ["int", "short", "unsigned"] => Basic::UShort,
        ["int"] | ["signed"] | ["int", "signed"] => Basic::Int,
        ["unsigned"] | ["int", "unsigned"] => Basic::UInt,
        ["long"] | ["int", "long"] | ["long", "signed"] | ["int", "long", "signed"] => Basic::Long,
        ["long", "unsigned"] | ["int", "long", "unsigned"] => Basic::ULong,
        ["long", "long"] | ["int", "long", "long"] => Basic::Long,
        ["long", "long", "unsigned"] | ["int", "long", "long", "unsigned"] => Basic::ULong,
        ["float"] => Basic::Float,
        ["double"] => Basic::Double,
        ["double", "long"] => Basic::LongDouble,
        _ => return Err(CompileError::ty(loc, format!("invalid combination of type specifiers: {}", set.join(" ")))),
    })
}

fn decay_param(ty: Type) -> Type {
    if ty.is_array() {
        Type::pointer_to(ty.element_type().unwrap().clone())
    } else if ty.is_function() {
        Type::pointer_to(ty)
    } else {
        ty
    }
}

fn function_declarator_param_names(declarator: &Node) -> Vec<String> {
    fn find(node: &Node) -> Option<&Node> {
        if node.kind == "function_declarator" {
            return Some(node);
        }
        node.children.first().and_then(find)
    }
    let Some(fd) = find(declarator) else { return Vec::new() };
    fd.children[1..]
        .iter()
        .filter(|c| !c.is("ellipsis"))
        .map(|p| crate::parser::declarator_name(p.child(1)).unwrap_or("").to_string())
        .collect()
}

/// Evaluates an expression that must be a compile-time integer constant
/// (array bounds, `case` labels, enumerator values) using only the static
/// information already recorded in `ctx` — no IR is emitted.
fn eval_integer_constant_expr(node: &Node, ctx: &Context) -> Result<i64, CompileError> {
    match node.kind.as_str() {
        "int_const" => Ok(parse_int_constant(&node.text).0 as i64),
        "char_const" => Ok(node.text.chars().next().unwrap_or('\0') as i64),
        "identifier" => match ctx.identifiers.get(&node.text) {
            Some(Symbol { kind: SymbolKind::EnumConstant(v), .. }) => Ok(*v),
            _ => Err(CompileError::ty(node.loc, "not a compile-time constant")),
        },
        "unary-" => Ok(-eval_integer_constant_expr(node.child(0), ctx)?),
        "unary+" => eval_integer_constant_expr(node.child(0), ctx),
        "unary~" => Ok(!eval_integer_constant_expr(node.child(0), ctx)?),
        "+" => Ok(eval_integer_constant_expr(node.child(0), ctx)? + eval_integer_constant_expr(node.child(1), ctx)?),
        "-" => Ok(eval_integer_constant_expr(node.child(0), ctx)? - eval_integer_constant_expr(node.child(1), ctx)?),
        "*" => Ok(eval_integer_constant_expr(node.child(0), ctx)? * eval_integer_constant_expr(node.child(1), ctx)?),
        "/" => {
            let b = eval_integer_constant_expr(node.child(1), ctx)?;
            Ok(if b == 0 { 0 } else { eval_integer_constant_expr(node.child(0), ctx)? / b })
        }
        other => Err(CompileError::ty(node.loc, format!("'{other}' is not a compile-time constant"))),
    }
}

fn parse_int_constant(text: &str) -> (u64, Type) {
    let stripped: String = text.chars().filter(|c| !matches!(c, 'u' | 'U' | 'l' | 'L')).collect();
    let v = if let Some(hex) = stripped.strip_prefix("0x").or_else(|| stripped.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).unwrap_or(0)
    } else if stripped.len() > 1 && stripped.starts_with('0') {
        u64::from_str_radix(&stripped, 8).unwrap_or(0)
    } else {
        stripped.parse().unwrap_or(0)
    };
    let is_unsigned = text.contains('u') || text.contains('U');
    let is_long = text.contains('l') || text.contains('L');
    let ty = match (is_long, is_unsigned) {
        (true, true) => Basic::ULong,
        (true, false) => Basic::Long,
        (false, true) => Basic::UInt,
        (false, false) => {
            if v > i32::MAX as u64 {
                Basic::Long
            } else {
                Basic::Int
            }
        }
    };
    (v, Type::basic(ty))
}

fn parse_float_constant(text: &str) -> f64 {
    let stripped = text.trim_end_matches(['f', 'F', 'l', 'L']);
    stripped.parse().unwrap_or(0.0)
}

/// Maps a type to its IR spelling. Aggregate types are looked up in `tags`
/// to get at the name the corresponding `define_type` line used.
pub fn ir_type(ty: &Type, tags: &TagTable) -> String {
    match &ty.kind {
        TypeKind::Basic(Basic::Void) => "void".to_string(),
        TypeKind::Basic(Basic::Char | Basic::SChar | Basic::UChar) => "i8".to_string(),
        TypeKind::Basic(Basic::Short | Basic::UShort) => "i16".to_string(),
        TypeKind::Basic(Basic::Int | Basic::UInt) => "i32".to_string(),
        TypeKind::Basic(Basic::Long | Basic::ULong) => "i64".to_string(),
        TypeKind::Basic(Basic::Float) => "float".to_string(),
        TypeKind::Basic(Basic::Double | Basic::LongDouble) => "double".to_string(),
        TypeKind::Pointer(_) => "ptr".to_string(),
        TypeKind::Array(elem, Some(n)) => format!("[{} x {}]", n, ir_type(elem, tags)),
        TypeKind::Array(elem, None) => format!("[0 x {}]", ir_type(elem, tags)),
        TypeKind::Struct(tag) | TypeKind::Union(tag) => tags.get_aggregate(tag).map(|a| a.ir_name.clone()).unwrap_or_else(|| format!("%struct.{tag}")),
        TypeKind::Enum(_) => "i32".to_string(),
        TypeKind::Function(ret, params, variadic) => {
            let ps: Vec<String> = params.iter().map(|p| ir_type(p, tags)).collect();
            let mut all = ps.join(", ");
            if *variadic {
                if !all.is_empty() {
                    all.push_str(", ");
                }
                all.push_str("...");
            }
            format!("{} ({})", ir_type(ret, tags), all)
        }
    }
}

fn aggregate_layout(fields: &[(String, Type)], tags: &TagTable) -> String {
    let parts: Vec<String> = fields.iter().map(|(_, t)| ir_type(t, tags)).collect();
    format!("{{ {} }}", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::convert_tokens;
    use crate::file_manager::FileManager;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use std::path::PathBuf;

    fn compile(src: &str) -> String {
        let mut fm = FileManager::new();
        let idx = fm.load_bytes(PathBuf::from("<test>"), src.as_bytes().to_vec());
        let bytes = fm.bytes(idx).to_vec();
        let pp = Lexer::new(idx, &bytes).tokenize().unwrap();
        let toks = convert_tokens(&pp).unwrap();
        let ast = Parser::new(&toks).parse_translation_unit().unwrap();
        Generator::new().generate(&ast).unwrap()
    }

    #[test]
    fn generates_return_of_constant() {
        let ir = compile("int main() { return 42; }");
        assert!(ir.contains("define i32 @main"));
        assert!(ir.contains("ret i32 42"));
    }

    #[test]
    fn folds_constant_arithmetic() {
        let ir = compile("int main() { return 2 + 3; }");
        assert!(ir.contains("ret i32 5"));
    }

    #[test]
    fn declares_printf_lazily_on_first_use() {
        let ir = compile("int main() { printf(\"hi\"); return 0; }");
        assert_eq!(ir.matches("declare i32 @printf").count(), 1);
    }

    #[test]
    fn struct_forward_declaration_rejects_sizeof_before_completion() {
        let err = {
            let mut fm = FileManager::new();
            let idx = fm.load_bytes(PathBuf::from("<test>"), b"struct S; int f() { return sizeof(struct S); }".to_vec());
            let bytes = fm.bytes(idx).to_vec();
            let pp = Lexer::new(idx, &bytes).tokenize().unwrap();
            let toks = convert_tokens(&pp).unwrap();
            let ast = Parser::new(&toks).parse_translation_unit().unwrap();
            Generator::new().generate(&ast).unwrap_err()
        };
        assert_eq!(err.kind, crate::diagnostics::ErrorKind::Type);
    }

    #[test]
    fn duplicate_case_value_is_a_flow_error() {
        let mut fm = FileManager::new();
        let idx = fm.load_bytes(
            PathBuf::from("<test>"),
            b"int f(int x) { switch (x) { case 1: return 1; case 1: return 2; } return 0; }".to_vec(),
        );
        let bytes = fm.bytes(idx).to_vec();
        let pp = Lexer::new(idx, &bytes).tokenize().unwrap();
        let toks = convert_tokens(&pp).unwrap();
        let ast = Parser::new(&toks).parse_translation_unit().unwrap();
        let err = Generator::new().generate(&ast).unwrap_err();
        assert_eq!(err.kind, crate::diagnostics::ErrorKind::Flow);
    }
}
