//! Preprocessor
//!
//! Macro engine with hide-sets, conditional-inclusion, and `#include`
//! resolution. Operates on `Vec<PpToken>` rather than a literal doubly
//! linked list; splices are expressed by building a fresh output vector
//! per pass instead of mutating a shared list in place (see DESIGN.md,
//! "Linked-token preprocessing"). Token *values* still move rather than
//! clone wherever a pass only reorders or relabels them.

use crate::diagnostics::CompileError;
use crate::file_manager::{FileManager, SourceLocation};
use crate::lexer::Lexer;
use crate::token::{hide_set_intersect, hide_set_union, hide_set_with, HideSet, PpToken, PpTokenKind};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub enum Macro {
    Object {
        replacement: Vec<PpToken>,
    },
    Function {
        params: Vec<String>,
        replacement: Vec<PpToken>,
    },
}

impl Macro {
    fn is_function_like(&self) -> bool {
        matches!(self, Macro::Function { .. })
    }

    fn replacement(&self) -> &[PpToken] {
        match self {
            Macro::Object { replacement } | Macro::Function { replacement, .. } => replacement,
        }
    }
}

pub type MacroTable = HashMap<String, Macro>;

const BUILTIN_MACROS: &[&str] = &["__LINE__", "__FILE__", "__DATE__", "__TIME__"];

/// Drops literal whitespace/newline pp-tokens from `tokens`, folding the
/// fact that whitespace preceded a token into that token's `leading_space`
/// flag. Used for macro replacement lists and collected argument token
/// lists, where stringize/paste need the flag but not the literal token.
fn fold_whitespace(tokens: &[PpToken]) -> Vec<PpToken> {
    let mut out = Vec::new();
    let mut pending_space = false;
    for t in tokens {
        if t.is_whitespace_like() {
            pending_space = true;
            continue;
        }
        let mut t = t.clone();
        t.leading_space = t.leading_space || pending_space;
        pending_space = false;
        out.push(t);
    }
    out
}

fn param_index(params: &[String], tok: &PpToken) -> Option<usize> {
    if tok.kind != PpTokenKind::Identifier {
        return None;
    }
    params.iter().position(|p| p == &tok.text)
}

fn placemarker(loc: SourceLocation) -> PpToken {
    PpToken::new(PpTokenKind::Placemarker, "", loc)
}

/// Runs the preprocessor over `tokens` (one already-lexed file), producing
/// the fully macro-expanded, directive-free token stream.
pub fn preprocess(
    file_manager: &mut FileManager,
    tokens: Vec<PpToken>,
    macros: &mut MacroTable,
    include_paths: &[PathBuf],
) -> Result<Vec<PpToken>, CompileError> {
    let mut active_includes = HashSet::new();
    preprocess_tracked(file_manager, tokens, macros, include_paths, &mut active_includes)
}

/// Same as [`preprocess`], but threads the set of files currently being
/// included (by canonical path) through nested `#include` expansion so a
/// file that transitively includes itself is rejected instead of
/// recursing until the stack overflows.
fn preprocess_tracked(
    file_manager: &mut FileManager,
    tokens: Vec<PpToken>,
    macros: &mut MacroTable,
    include_paths: &[PathBuf],
    active_includes: &mut HashSet<PathBuf>,
) -> Result<Vec<PpToken>, CompileError> {
    let mut cond_stack: Vec<CondFrame> = Vec::new();
    let out = process_group(file_manager, &tokens, macros, include_paths, &mut cond_stack, active_includes)?;
    if let Some(frame) = cond_stack.last() {
        return Err(CompileError::preprocessor(frame.start_loc, "unterminated #if"));
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy)]
struct CondFrame {
    parent_active: bool,
    taken: bool,
    active: bool,
    start_loc: SourceLocation,
}

fn current_active(stack: &[CondFrame]) -> bool {
    stack.last().map(|f| f.active).unwrap_or(true)
}

/// Splits `tokens` into logical lines at `Newline` boundaries (the final
/// line may be terminated by `Eof` instead) and walks them, dispatching
/// directives and accumulating runs of simple-lines for wholesale macro
/// expansion. `cond_stack` threads through so a nested `#include`'s own
/// conditional groups don't leak into the caller's.
fn process_group(
    file_manager: &mut FileManager,
    tokens: &[PpToken],
    macros: &mut MacroTable,
    include_paths: &[PathBuf],
    cond_stack: &mut Vec<CondFrame>,
    active_includes: &mut HashSet<PathBuf>,
) -> Result<Vec<PpToken>, CompileError> {
    let mut out = Vec::new();
    let mut run: Vec<PpToken> = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        // Collect one logical line: [i, j).
        let mut j = i;
        while j < tokens.len() && tokens[j].kind != PpTokenKind::Newline && tokens[j].kind != PpTokenKind::Eof {
            j += 1;
        }
        let line = &tokens[i..j];
        let had_newline = tokens.get(j).map(|t| t.kind == PpTokenKind::Newline).unwrap_or(false);
        let is_eof = tokens.get(j).map(|t| t.kind == PpTokenKind::Eof).unwrap_or(true);

        let first_real = line.iter().find(|t| !t.is_whitespace_like());
        if let Some(hash) = first_real {
            if hash.is_punct("#") {
                if current_active(cond_stack) {
                    if !run.is_empty() {
                        out.extend(expand_sequence(std::mem::take(&mut run), macros)?);
                    }
                } else {
                    run.clear();
                }
                handle_directive(file_manager, line, macros, include_paths, cond_stack, active_includes, &mut out)?;
                i = if had_newline { j + 1 } else { j };
                continue;
            }
        }

        if current_active(cond_stack) {
            run.extend(line.iter().cloned());
            if had_newline {
                run.push(tokens[j].clone());
            }
        }
        i = if had_newline { j + 1 } else { j };
        if is_eof {
            break;
        }
    }
    if !run.is_empty() {
        out.extend(expand_sequence(run, macros)?);
    }
    Ok(out)
}

fn handle_directive(
    file_manager: &mut FileManager,
    line: &[PpToken],
    macros: &mut MacroTable,
    include_paths: &[PathBuf],
    cond_stack: &mut Vec<CondFrame>,
    active_includes: &mut HashSet<PathBuf>,
    out: &mut Vec<PpToken>,
) -> Result<(), CompileError> {
    let mut rest = line.iter().skip_while(|t| t.is_whitespace_like() || t.is_punct("#"));
    let Some(kw) = rest.clone().find(|t| !t.is_whitespace_like()) else {
        return Ok(()); // empty `#`
    };
    let hash_loc = line[0].loc;
    let rest_tokens: Vec<PpToken> = rest
        .by_ref()
        .skip_while(|t| t.is_whitespace_like())
        .skip(1)
        .cloned()
        .collect();
    let active = current_active(cond_stack);

    match kw.text.as_str() {
        "include" => {
            if !active {
                return Ok(());
            }
            let (target, is_system) = parse_include_target(file_manager, &rest_tokens, hash_loc)?;
            let resolved = resolve_include(file_manager, &target, is_system, hash_loc, include_paths)?;
            let canonical = resolved.canonicalize().unwrap_or(resolved.clone());
            if !active_includes.insert(canonical.clone()) {
                return Err(CompileError::preprocessor(
                    hash_loc,
                    format!("'{}' includes itself", target),
                ));
            }
            let idx = file_manager.load(&resolved).map_err(|e| CompileError::io(e))?;
            let bytes = file_manager.bytes(idx).to_vec();
            let included = Lexer::new(idx, &bytes).tokenize()?;
            let expanded = preprocess_tracked(file_manager, included, macros, include_paths, active_includes)?;
            active_includes.remove(&canonical);
            out.extend(expanded.into_iter().filter(|t| t.kind != PpTokenKind::Eof));
        }
        "define" => {
            if !active {
                return Ok(());
            }
            let (name, mac) = parse_define(&rest_tokens, hash_loc)?;
            if name == "defined" {
                return Err(CompileError::preprocessor(hash_loc, "'defined' cannot be used as a macro name"));
            }
            macros.insert(name, mac);
        }
        "undef" => {
            if !active {
                return Ok(());
            }
            let name_tok = rest_tokens
                .iter()
                .find(|t| !t.is_whitespace_like())
                .ok_or_else(|| CompileError::preprocessor(hash_loc, "#undef requires a macro name"))?;
            macros.remove(&name_tok.text);
        }
        "if" => {
            let parent_active = current_active(cond_stack);
            let cond = if parent_active {
                eval_controlling_line(file_manager, &rest_tokens, macros, hash_loc)?
            } else {
                false
            };
            cond_stack.push(CondFrame {
                parent_active,
                taken: parent_active && cond,
                active: parent_active && cond,
                start_loc: hash_loc,
            });
        }
        "ifdef" | "ifndef" => {
            let parent_active = current_active(cond_stack);
            let name_tok = rest_tokens.iter().find(|t| !t.is_whitespace_like());
            let defined = name_tok
                .map(|t| macros.contains_key(&t.text) || BUILTIN_MACROS.contains(&t.text.as_str()))
                .unwrap_or(false);
            let cond = if kw.text == "ifdef" { defined } else { !defined };
            cond_stack.push(CondFrame {
                parent_active,
                taken: parent_active && cond,
                active: parent_active && cond,
                start_loc: hash_loc,
            });
        }
        "elif" => {
            let frame = cond_stack
                .last_mut()
                .ok_or_else(|| CompileError::preprocessor(hash_loc, "#elif without #if"))?;
            frame.active = false;
            if frame.parent_active && !frame.taken {
                let cond = eval_controlling_line(file_manager, &rest_tokens, macros, hash_loc)?;
                if cond {
                    frame.taken = true;
                    frame.active = true;
                }
            }
        }
        "else" => {
            let frame = cond_stack
                .last_mut()
                .ok_or_else(|| CompileError::preprocessor(hash_loc, "#else without #if"))?;
            frame.active = false;
            if frame.parent_active && !frame.taken {
                frame.taken = true;
                frame.active = true;
            }
        }
        "endif" => {
            cond_stack
                .pop()
                .ok_or_else(|| CompileError::preprocessor(hash_loc, "#endif without #if"))?;
        }
        "error" => {
            if active {
                let msg: String = rest_tokens
                    .iter()
                    .filter(|t| !t.is_whitespace_like())
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                return Err(CompileError::preprocessor(hash_loc, msg));
            }
        }
        "pragma" => {}
        other => {
            if active {
                return Err(CompileError::preprocessor(
                    hash_loc,
                    format!("unknown preprocessor directive '#{}'", other),
                ));
            }
        }
    }
    Ok(())
}

fn parse_include_target(
    file_manager: &FileManager,
    tokens: &[PpToken],
    hash_loc: SourceLocation,
) -> Result<(String, bool), CompileError> {
    let first = tokens
        .iter()
        .find(|t| !t.is_whitespace_like())
        .ok_or_else(|| CompileError::preprocessor(hash_loc, "malformed #include argument"))?;
    let bytes = file_manager.bytes(first.loc.file);
    let offset = file_manager.offset_of(first.loc);
    let tok = Lexer::lex_header_name(&bytes[offset..], first.loc.file, first.loc.line, first.loc.column)
        .ok_or_else(|| CompileError::preprocessor(first.loc, "malformed #include argument"))?;
    let is_system = tok.text.starts_with('<');
    let inner = tok.text[1..tok.text.len() - 1].to_string();
    Ok((inner, is_system))
}

fn resolve_include(
    file_manager: &FileManager,
    target: &str,
    is_system: bool,
    hash_loc: SourceLocation,
    include_paths: &[PathBuf],
) -> Result<PathBuf, CompileError> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if !is_system {
        candidates.push(file_manager.dir_of(hash_loc.file).join(target));
    }
    for dir in include_paths {
        candidates.push(dir.join(target));
    }
    for c in &candidates {
        if c.is_file() {
            return Ok(c.clone());
        }
    }
    Err(CompileError::preprocessor(
        hash_loc,
        format!("'{}' file not found", target),
    ))
}

fn parse_define(tokens: &[PpToken], hash_loc: SourceLocation) -> Result<(String, Macro), CompileError> {
    let mut idx = 0;
    while idx < tokens.len() && tokens[idx].is_whitespace_like() {
        idx += 1;
    }
    let name_tok = tokens
        .get(idx)
        .filter(|t| t.kind == PpTokenKind::Identifier)
        .ok_or_else(|| CompileError::preprocessor(hash_loc, "macro name must be an identifier"))?;
    let name = name_tok.text.clone();
    idx += 1;

    let is_function_like = tokens.get(idx).map(|t| t.is_punct("(")).unwrap_or(false);
    let mut params = Vec::new();
    if is_function_like {
        idx += 1;
        loop {
            while tokens.get(idx).map(|t| t.is_whitespace_like()).unwrap_or(false) {
                idx += 1;
            }
            if tokens.get(idx).map(|t| t.is_punct(")")).unwrap_or(false) {
                idx += 1;
                break;
            }
            let p = tokens
                .get(idx)
                .filter(|t| t.kind == PpTokenKind::Identifier)
                .ok_or_else(|| CompileError::preprocessor(hash_loc, "malformed macro parameter list"))?;
            params.push(p.text.clone());
            idx += 1;
            while tokens.get(idx).map(|t| t.is_whitespace_like()).unwrap_or(false) {
                idx += 1;
            }
            match tokens.get(idx) {
                Some(t) if t.is_punct(",") => {
                    idx += 1;
                }
                Some(t) if t.is_punct(")") => {
                    idx += 1;
                    break;
                }
                _ => return Err(CompileError::preprocessor(hash_loc, "malformed macro parameter list")),
            }
        }
    }

    let mut tail = &tokens[idx.min(tokens.len())..];
    while let Some(last) = tail.last() {
        if last.is_whitespace_like() {
            tail = &tail[..tail.len() - 1];
        } else {
            break;
        }
    }
    let replacement = fold_whitespace(tail);

    if let Some(first) = replacement.first() {
        if first.is_punct("##") {
            return Err(CompileError::preprocessor(hash_loc, "'##' cannot appear at the start of a macro replacement list"));
        }
    }
    if let Some(last) = replacement.last() {
        if last.is_punct("##") {
            return Err(CompileError::preprocessor(hash_loc, "'##' cannot appear at the end of a macro replacement list"));
        }
    }
    if is_function_like {
        let mut k = 0;
        while k < replacement.len() {
            if replacement[k].is_punct("#") {
                if param_index(&params, replacement.get(k + 1).unwrap_or(&placemarker(hash_loc))).is_none() {
                    return Err(CompileError::preprocessor(hash_loc, "'#' is not followed by a macro parameter"));
                }
                k += 2;
            } else {
                k += 1;
            }
        }
    }

    let mac = if is_function_like {
        Macro::Function { params, replacement }
    } else {
        Macro::Object { replacement }
    };
    Ok((name, mac))
}

/// Macro expansion over a flat token run, per the hide-set algorithm in
/// §4.1: a work queue is rescanned from the front after every expansion so
/// newly substituted tokens are considered before the tokens that followed
/// the original invocation.
pub fn expand_sequence(tokens: Vec<PpToken>, macros: &MacroTable) -> Result<Vec<PpToken>, CompileError> {
    let mut pending: VecDeque<PpToken> = tokens.into_iter().collect();
    let mut out: Vec<PpToken> = Vec::new();

    while let Some(tok) = pending.pop_front() {
        if tok.kind != PpTokenKind::Identifier || tok.hide_set.contains(&tok.text) {
            out.push(tok);
            continue;
        }

        if let Some(synthetic) = expand_builtin(&tok) {
            out.push(synthetic);
            continue;
        }

        let Some(mac) = macros.get(&tok.text) else {
            out.push(tok);
            continue;
        };

        if !mac.is_function_like() {
            let new_hs = hide_set_with(&tok.hide_set, &tok.text);
            let r = substitute(mac.replacement(), &[], &[], new_hs, macros, false)?;
            for t in r.into_iter().rev() {
                pending.push_front(t);
            }
            continue;
        }

        // Look ahead for '(' without consuming whitespace unless it is a real call.
        let mut skip = 0;
        while matches!(pending.get(skip), Some(t) if t.is_whitespace_like()) {
            skip += 1;
        }
        if !matches!(pending.get(skip), Some(t) if t.is_punct("(")) {
            out.push(tok);
            continue;
        }
        for _ in 0..skip {
            pending.pop_front();
        }
        pending.pop_front(); // '('

        let (args, close_hide_set) = collect_arguments(&mut pending, tok.loc)?;
        let Macro::Function { params, replacement } = mac else {
            unreachable!()
        };
        if !(args.len() == params.len() || (params.is_empty() && args.len() == 1 && is_placemarker_only(&args[0]))) {
            return Err(CompileError::preprocessor(
                tok.loc,
                format!("macro '{}' invoked with wrong number of arguments", tok.text),
            ));
        }
        let args: Vec<Vec<PpToken>> = if params.is_empty() { Vec::new() } else { args };

        let new_hs = hide_set_with(&hide_set_intersect(&tok.hide_set, &close_hide_set), &tok.text);
        let r = substitute(replacement, params, &args, new_hs, macros, true)?;
        for t in r.into_iter().rev() {
            pending.push_front(t);
        }
    }
    Ok(out)
}

fn is_placemarker_only(arg: &[PpToken]) -> bool {
    arg.iter().all(|t| t.kind == PpTokenKind::Placemarker)
}

fn expand_builtin(tok: &PpToken) -> Option<PpToken> {
    match tok.text.as_str() {
        "__LINE__" => Some(PpToken::new(PpTokenKind::PpNumber, tok.loc.line.to_string(), tok.loc)),
        "__FILE__" => Some(PpToken::new(PpTokenKind::StringLiteral, "\"<source>\"", tok.loc)),
        "__DATE__" => Some(PpToken::new(PpTokenKind::StringLiteral, "\"Jan 01 1970\"", tok.loc)),
        "__TIME__" => Some(PpToken::new(PpTokenKind::StringLiteral, "\"00:00:00\"", tok.loc)),
        _ => None,
    }
}

/// Collects the comma-separated, paren-nested argument list following a
/// function-like macro's `(` (already consumed by the caller), returning
/// the arguments (whitespace-folded, never empty — an all-whitespace
/// argument becomes a single placemarker) and the hide-set of the closing
/// `)`.
fn collect_arguments(
    pending: &mut VecDeque<PpToken>,
    call_loc: SourceLocation,
) -> Result<(Vec<Vec<PpToken>>, HideSet), CompileError> {
    let mut args: Vec<Vec<PpToken>> = Vec::new();
    let mut current: Vec<PpToken> = Vec::new();
    let mut depth = 1u32;
    let close_hide_set;
    loop {
        let Some(tok) = pending.pop_front() else {
            return Err(CompileError::preprocessor(call_loc, "unterminated macro invocation"));
        };
        if tok.is_punct("(") {
            depth += 1;
            current.push(tok);
        } else if tok.is_punct(")") {
            depth -= 1;
            if depth == 0 {
                close_hide_set = tok.hide_set;
                break;
            }
            current.push(tok);
        } else if tok.is_punct(",") && depth == 1 {
            args.push(finish_arg(std::mem::take(&mut current), tok.loc));
        } else {
            current.push(tok);
        }
    }
    args.push(finish_arg(current, call_loc));
    Ok((args, close_hide_set))
}

fn finish_arg(tokens: Vec<PpToken>, loc: SourceLocation) -> Vec<PpToken> {
    let folded = fold_whitespace(&tokens);
    if folded.is_empty() {
        vec![placemarker(loc)]
    } else {
        folded
    }
}

/// Walks a macro's replacement list producing the substituted output, per
/// the rules in §4.1: `# param` stringizes, `##` glues, a bare parameter
/// expands its actual unless adjacent to `##`.
fn substitute(
    replacement: &[PpToken],
    params: &[String],
    args: &[Vec<PpToken>],
    hide_set_to_add: HideSet,
    macros: &MacroTable,
    is_function_like: bool,
) -> Result<Vec<PpToken>, CompileError> {
    let mut out: Vec<PpToken> = Vec::new();
    let mut i = 0;
    while i < replacement.len() {
        let tok = &replacement[i];
        if is_function_like && tok.is_punct("#") {
            if let Some(pidx) = replacement.get(i + 1).and_then(|t| param_index(params, t)) {
                out.push(stringize(&args[pidx], tok.loc));
                i += 2;
                continue;
            }
        }
        if tok.is_punct("##") {
            let next = replacement
                .get(i + 1)
                .ok_or_else(|| CompileError::preprocessor(tok.loc, "'##' at end of replacement list"))?;
            let rhs: Vec<PpToken> = match param_index(params, next) {
                Some(pidx) => args[pidx].clone(),
                None => vec![next.clone()],
            };
            glue_onto(&mut out, &rhs, tok.loc)?;
            i += 2;
            continue;
        }
        if let Some(pidx) = param_index(params, tok) {
            if replacement.get(i + 1).map(|t| t.is_punct("##")).unwrap_or(false) {
                out.extend(args[pidx].iter().cloned());
            } else {
                out.extend(expand_sequence(args[pidx].clone(), macros)?);
            }
            i += 1;
            continue;
        }
        out.push(tok.clone());
        i += 1;
    }
    for t in out.iter_mut() {
        t.hide_set = hide_set_union(&t.hide_set, &hide_set_to_add);
    }
    Ok(out)
}

fn glue_onto(out: &mut Vec<PpToken>, rhs: &[PpToken], loc: SourceLocation) -> Result<(), CompileError> {
    let first = &rhs[0];
    match out.pop() {
        None => out.push(first.clone()),
        Some(last) => out.push(glue_tokens(&last, first, loc)?),
    }
    out.extend(rhs[1..].iter().cloned());
    Ok(())
}

fn glue_tokens(a: &PpToken, b: &PpToken, loc: SourceLocation) -> Result<PpToken, CompileError> {
    let hs = hide_set_intersect(&a.hide_set, &b.hide_set);
    if a.kind == PpTokenKind::Placemarker && b.kind == PpTokenKind::Placemarker {
        return Ok(placemarker(loc));
    }
    if a.kind == PpTokenKind::Placemarker {
        let mut t = b.clone();
        t.hide_set = hs;
        return Ok(t);
    }
    if b.kind == PpTokenKind::Placemarker {
        let mut t = a.clone();
        t.hide_set = hs;
        return Ok(t);
    }
    let combined = format!("{}{}", a.text, b.text);
    let toks = Lexer::new(a.loc.file, combined.as_bytes())
        .tokenize()
        .map_err(|_| CompileError::preprocessor(loc, format!("'{}' is not a valid preprocessing token", combined)))?;
    let kind = toks
        .first()
        .map(|t| t.kind)
        .ok_or_else(|| CompileError::preprocessor(loc, "'##' produced no token"))?;
    Ok(PpToken {
        kind,
        text: combined,
        loc: a.loc,
        hide_set: hs,
        leading_space: a.leading_space,
    })
}

fn stringize(actual: &[PpToken], loc: SourceLocation) -> PpToken {
    let mut s = String::from("\"");
    for (idx, t) in actual.iter().enumerate() {
        if t.kind == PpTokenKind::Placemarker {
            continue;
        }
        if idx > 0 && t.leading_space {
            s.push(' ');
        }
        if matches!(t.kind, PpTokenKind::StringLiteral | PpTokenKind::CharConstant) {
            for ch in t.text.chars() {
                if ch == '"' || ch == '\\' {
                    s.push('\\');
                }
                s.push(ch);
            }
        } else {
            s.push_str(&t.text);
        }
    }
    s.push('"');
    PpToken::new(PpTokenKind::StringLiteral, s, loc)
}

/// Evaluates an `#if`/`#elif` controlling expression: `defined`-expansion,
/// macro expansion, token conversion, residual-identifier-to-zero, then a
/// small self-contained constant-expression parser (kept independent of
/// the full language parser so evaluating a line's condition never needs
/// a symbol table or generator context — see DESIGN.md).
fn eval_controlling_line(
    file_manager: &FileManager,
    tokens: &[PpToken],
    macros: &MacroTable,
    loc: SourceLocation,
) -> Result<bool, CompileError> {
    let _ = file_manager;
    let after_defined = expand_defined(tokens, macros)?;
    let expanded = expand_sequence(after_defined, macros)?;
    let converted = crate::convert::convert_tokens(&expanded)?;
    let as_zero_default: Vec<crate::token::LangToken> = converted
        .into_iter()
        .map(|t| {
            if t.kind == crate::token::LangTokenKind::Identifier {
                crate::token::LangToken::new(crate::token::LangTokenKind::IntConstant, "0", t.loc)
            } else {
                t
            }
        })
        .collect();
    let mut p = ConstExprParser {
        toks: &as_zero_default,
        pos: 0,
    };
    let v = p.parse_conditional(loc)?;
    Ok(v != 0)
}

fn expand_defined(tokens: &[PpToken], macros: &MacroTable) -> Result<Vec<PpToken>, CompileError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        if t.kind == PpTokenKind::Identifier && t.text == "defined" {
            let mut j = i + 1;
            while matches!(tokens.get(j), Some(tk) if tk.is_whitespace_like()) {
                j += 1;
            }
            let (name, after) = if matches!(tokens.get(j), Some(tk) if tk.is_punct("(")) {
                j += 1;
                while matches!(tokens.get(j), Some(tk) if tk.is_whitespace_like()) {
                    j += 1;
                }
                let name = tokens
                    .get(j)
                    .filter(|tk| tk.kind == PpTokenKind::Identifier)
                    .ok_or_else(|| CompileError::preprocessor(t.loc, "malformed 'defined' operator"))?
                    .text
                    .clone();
                j += 1;
                while matches!(tokens.get(j), Some(tk) if tk.is_whitespace_like()) {
                    j += 1;
                }
                if !matches!(tokens.get(j), Some(tk) if tk.is_punct(")")) {
                    return Err(CompileError::preprocessor(t.loc, "malformed 'defined' operator"));
                }
                (name, j + 1)
            } else {
                let name = tokens
                    .get(j)
                    .filter(|tk| tk.kind == PpTokenKind::Identifier)
                    .ok_or_else(|| CompileError::preprocessor(t.loc, "malformed 'defined' operator"))?
                    .text
                    .clone();
                (name, j + 1)
            };
            let defined = macros.contains_key(&name) || BUILTIN_MACROS.contains(&name.as_str());
            out.push(PpToken::new(PpTokenKind::PpNumber, if defined { "1" } else { "0" }, t.loc));
            i = after;
        } else {
            out.push(t.clone());
            i += 1;
        }
    }
    Ok(out)
}

/// Minimal recursive-descent integer constant-expression evaluator for
/// `#if`/`#elif` lines, covering the C ternary-level grammar down to
/// unary and primary (parenthesized sub-expression, integer/char literal).
struct ConstExprParser<'a> {
    toks: &'a [crate::token::LangToken],
    pos: usize,
}

impl<'a> ConstExprParser<'a> {
    fn peek(&self) -> Option<&crate::token::LangToken> {
        self.toks.get(self.pos)
    }

    fn bump(&mut self) -> Option<&crate::token::LangToken> {
        let t = self.toks.get(self.pos);
        self.pos += 1;
        t
    }

    fn at_end(&self) -> bool {
        matches!(self.peek().map(|t| &t.kind), None | Some(crate::token::LangTokenKind::Eof))
    }

    fn parse_conditional(&mut self, loc: SourceLocation) -> Result<i64, CompileError> {
        let cond = self.parse_binary(0, loc)?;
        if self.peek().map(|t| t.is("?")).unwrap_or(false) {
            self.bump();
            let then_v = self.parse_conditional(loc)?;
            if !self.peek().map(|t| t.is(":")).unwrap_or(false) {
                return Err(CompileError::preprocessor(loc, "expected ':' in conditional expression"));
            }
            self.bump();
            let else_v = self.parse_conditional(loc)?;
            return Ok(if cond != 0 { then_v } else { else_v });
        }
        Ok(cond)
    }

    const LEVELS: &'static [&'static [&'static str]] = &[
        &["||"],
        &["&&"],
        &["|"],
        &["^"],
        &["&"],
        &["==", "!="],
        &["<", ">", "<=", ">="],
        &["<<", ">>"],
        &["+", "-"],
        &["*", "/", "%"],
    ];

    fn parse_binary(&mut self, level: usize, loc: SourceLocation) -> Result<i64, CompileError> {
        if level >= Self::LEVELS.len() {
            return self.parse_unary(loc);
        }
        let mut lhs = self.parse_binary(level + 1, loc)?;
        while let Some(op) = self.peek().map(|t| t.text.clone()) {
            if !Self::LEVELS[level].contains(&op.as_str()) {
                break;
            }
            self.bump();
            let rhs = self.parse_binary(level + 1, loc)?;
            lhs = apply_binary(&op, lhs, rhs);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self, loc: SourceLocation) -> Result<i64, CompileError> {
        if let Some(t) = self.peek() {
            if t.is("!") {
                self.bump();
                return Ok((self.parse_unary(loc)? == 0) as i64);
            }
            if t.is("~") {
                self.bump();
                return Ok(!self.parse_unary(loc)?);
            }
            if t.is("-") {
                self.bump();
                return Ok(-self.parse_unary(loc)?);
            }
            if t.is("+") {
                self.bump();
                return self.parse_unary(loc);
            }
        }
        self.parse_primary(loc)
    }

    fn parse_primary(&mut self, loc: SourceLocation) -> Result<i64, CompileError> {
        let Some(t) = self.bump().cloned() else {
            return Err(CompileError::preprocessor(loc, "expected expression in #if"));
        };
        match t.kind {
            crate::token::LangTokenKind::IntConstant => Ok(parse_int_literal(&t.text)),
            crate::token::LangTokenKind::CharConstant => Ok(char_literal_value(&t.text)),
            crate::token::LangTokenKind::Punctuator if t.text == "(" => {
                let v = self.parse_conditional(loc)?;
                if !self.peek().map(|tk| tk.is(")")).unwrap_or(false) {
                    return Err(CompileError::preprocessor(loc, "expected ')' in #if expression"));
                }
                self.bump();
                Ok(v)
            }
            _ => Err(CompileError::preprocessor(loc, format!("unexpected token '{}' in #if", t.text))),
        }
    }
}

fn apply_binary(op: &str, a: i64, b: i64) -> i64 {
    match op {
        "||" => ((a != 0) || (b != 0)) as i64,
        "&&" => ((a != 0) && (b != 0)) as i64,
        "|" => a | b,
        "^" => a ^ b,
        "&" => a & b,
        "==" => (a == b) as i64,
        "!=" => (a != b) as i64,
        "<" => (a < b) as i64,
        ">" => (a > b) as i64,
        "<=" => (a <= b) as i64,
        ">=" => (a >= b) as i64,
        "<<" => a.wrapping_shl(b as u32),
        ">>" => a.wrapping_shr(b as u32),
        "+" => a.wrapping_add(b),
        "-" => a.wrapping_sub(b),
        "*" => a.wrapping_mul(b),
        "/" => {
            if b == 0 {
                0
            } else {
                a.wrapping_div(b)
            }
        }
        "%" => {
            if b == 0 {
                0
            } else {
                a.wrapping_rem(b)
            }
        }
        _ => unreachable!("unhandled #if operator: {op}"),
    }
}

fn parse_int_literal(text: &str) -> i64 {
    let digits: String = text.chars().take_while(|c| c.is_ascii_hexdigit() || *c == 'x' || *c == 'X').collect();
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).unwrap_or(0);
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return i64::from_str_radix(&digits, 8).unwrap_or(0);
    }
    digits.parse().unwrap_or(0)
}

fn char_literal_value(text: &str) -> i64 {
    let inner = text.trim_matches('\'');
    if let Some(stripped) = inner.strip_prefix('\\') {
        match stripped.chars().next() {
            Some('n') => b'\n' as i64,
            Some('t') => b'\t' as i64,
            Some('0') => 0,
            Some(c) => c as i64,
            None => 0,
        }
    } else {
        inner.chars().next().map(|c| c as i64).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::FileManager;

    fn run(src: &str) -> Vec<PpToken> {
        let mut fm = FileManager::new();
        let idx = fm.load_bytes(PathBuf::from("<test>"), src.as_bytes().to_vec());
        let bytes = fm.bytes(idx).to_vec();
        let toks = Lexer::new(idx, &bytes).tokenize().unwrap();
        let mut macros = MacroTable::new();
        preprocess(&mut fm, toks, &mut macros, &[]).unwrap()
    }

    fn text_of(tokens: &[PpToken]) -> String {
        tokens
            .iter()
            .filter(|t| !t.is_whitespace_like() && t.kind != PpTokenKind::Eof)
            .map(|t| t.text.clone())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn object_like_macro_expands() {
        let out = run("#define N 5\nint x = N;\n");
        assert!(text_of(&out).contains("5"));
    }

    #[test]
    fn paste_glues_identifiers() {
        let out = run("#define cat(a,b) a##b\ncat(x,1)\n");
        assert_eq!(text_of(&out), "x1");
    }

    #[test]
    fn self_referential_macro_terminates_via_hide_set() {
        let out = run("#define x (4+x)\nx\n");
        assert_eq!(text_of(&out), "( 4 + x )");
    }

    #[test]
    fn stringize_wraps_argument_text() {
        let out = run("#define str(a) #a\nstr(hello)\n");
        assert_eq!(text_of(&out), "\"hello\"");
    }

    #[test]
    fn conditional_inclusion_skips_false_branch() {
        let out = run("#if 0\nint dead;\n#else\nint alive;\n#endif\n");
        let s = text_of(&out);
        assert!(s.contains("alive"));
        assert!(!s.contains("dead"));
    }

    #[test]
    fn circular_include_is_rejected_instead_of_overflowing_the_stack() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.h"), "#include \"b.h\"\n").unwrap();
        std::fs::write(dir.path().join("b.h"), "#include \"a.h\"\n").unwrap();
        let mut fm = FileManager::new();
        let idx = fm.load(&dir.path().join("a.h")).unwrap();
        let bytes = fm.bytes(idx).to_vec();
        let toks = Lexer::new(idx, &bytes).tokenize().unwrap();
        let mut macros = MacroTable::new();
        let err = preprocess(&mut fm, toks, &mut macros, &[]).unwrap_err();
        assert!(err.message.contains("includes itself"));
    }
}
