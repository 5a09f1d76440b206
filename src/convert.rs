//! Token Converter
//!
//! Maps the post-preprocessing pp-token stream to language tokens:
//! keyword recognition, pp-number classification into integer vs floating
//! constants, escape-sequence decoding inside char/string literals,
//! adjacent string-literal concatenation, and stripping of whitespace and
//! newline tokens. Unlike the source dialect's original implementation,
//! `const`/`volatile` keyword tokens are *not* stripped here — see
//! DESIGN.md's note on the const/volatile open question.

use crate::diagnostics::CompileError;
use crate::file_manager::SourceLocation;
use crate::token::{LangToken, LangTokenKind, PpToken, PpTokenKind, KEYWORDS};

/// Converts a fully preprocessed pp-token stream into language tokens.
pub fn convert_tokens(tokens: &[PpToken]) -> Result<Vec<LangToken>, CompileError> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let t = &tokens[i];
        match t.kind {
            PpTokenKind::Whitespace | PpTokenKind::Newline | PpTokenKind::Placemarker => {
                i += 1;
            }
            PpTokenKind::Eof => {
                out.push(LangToken::new(LangTokenKind::Eof, "", t.loc));
                i += 1;
            }
            PpTokenKind::Identifier => {
                let kind = if KEYWORDS.contains(&t.text.as_str()) {
                    LangTokenKind::Keyword
                } else {
                    LangTokenKind::Identifier
                };
                out.push(LangToken::new(kind, t.text.clone(), t.loc));
                i += 1;
            }
            PpTokenKind::PpNumber => {
                let kind = classify_number(&t.text);
                out.push(LangToken::new(kind, t.text.clone(), t.loc));
                i += 1;
            }
            PpTokenKind::CharConstant => {
                out.push(LangToken::new(
                    LangTokenKind::CharConstant,
                    decode_escapes(&t.text, t.loc)?,
                    t.loc,
                ));
                i += 1;
            }
            PpTokenKind::StringLiteral => {
                // Adjacent string literal concatenation (§4): a run of
                // StringLiteral tokens separated only by whitespace/newline
                // collapses into a single decoded literal at the first
                // token's location.
                let loc = t.loc;
                let mut combined = String::new();
                let mut j = i;
                loop {
                    match tokens.get(j) {
                        Some(tk) if tk.kind == PpTokenKind::StringLiteral => {
                            combined.push_str(inner_string_text(&tk.text));
                            j += 1;
                        }
                        Some(tk) if tk.is_whitespace_like() => {
                            j += 1;
                        }
                        _ => break,
                    }
                }
                let decoded = decode_escapes(&combined, loc)?;
                out.push(LangToken::new(LangTokenKind::StringLiteral, decoded, loc));
                i = j;
            }
            PpTokenKind::Punctuator => {
                out.push(LangToken::new(LangTokenKind::Punctuator, t.text.clone(), t.loc));
                i += 1;
            }
            PpTokenKind::HeaderName => {
                return Err(CompileError::preprocessor(
                    t.loc,
                    "stray header-name token outside #include",
                ));
            }
        }
    }
    Ok(out)
}

fn inner_string_text(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text)
}

/// A pp-number is a floating constant if it contains `.`, or an unsuffixed
/// exponent marker (`e`/`E` for decimal, `p`/`P` for hex-float), that is
/// not itself part of a hex-integer prefix/suffix.
fn classify_number(text: &str) -> LangTokenKind {
    let is_hex = text.len() > 1 && (text.starts_with("0x") || text.starts_with("0X"));
    let has_dot = text.contains('.');
    let has_exp = if is_hex {
        text.contains('p') || text.contains('P')
    } else {
        text.contains('e') || text.contains('E')
    };
    if has_dot || has_exp {
        LangTokenKind::FloatConstant
    } else {
        LangTokenKind::IntConstant
    }
}

/// Decodes the backslash escapes inside a char/string literal body,
/// leaving the surrounding quote characters untouched; the `\\` and
/// recognized single-letter escapes map to their byte, `\ooo` and `\xHH`
/// decode numeric escapes.
fn decode_escapes(text: &str, loc: SourceLocation) -> Result<String, CompileError> {
    let bytes = text.as_bytes();
    let mut out = String::new();
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b != b'\\' {
            out.push(b as char);
            i += 1;
            continue;
        }
        i += 1;
        let Some(&esc) = bytes.get(i) else {
            return Err(CompileError::lex(loc, "trailing backslash in literal"));
        };
        match esc {
            b'n' => {
                out.push('\n');
                i += 1;
            }
            b't' => {
                out.push('\t');
                i += 1;
            }
            b'r' => {
                out.push('\r');
                i += 1;
            }
            b'0' => {
                out.push('\0');
                i += 1;
            }
            b'\\' => {
                out.push('\\');
                i += 1;
            }
            b'\'' => {
                out.push('\'');
                i += 1;
            }
            b'"' => {
                out.push('"');
                i += 1;
            }
            b'a' => {
                out.push('\u{7}');
                i += 1;
            }
            b'b' => {
                out.push('\u{8}');
                i += 1;
            }
            b'f' => {
                out.push('\u{c}');
                i += 1;
            }
            b'v' => {
                out.push('\u{b}');
                i += 1;
            }
            b'x' => {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_hexdigit() {
                    i += 1;
                }
                let hex = std::str::from_utf8(&bytes[start..i]).unwrap_or("");
                let v = u8::from_str_radix(hex, 16)
                    .map_err(|_| CompileError::lex(loc, "invalid \\x escape"))?;
                out.push(v as char);
            }
            d if d.is_ascii_digit() => {
                let start = i;
                let mut n = 0;
                while i < bytes.len() && bytes[i].is_ascii_digit() && n < 3 {
                    i += 1;
                    n += 1;
                }
                let oct = std::str::from_utf8(&bytes[start..i]).unwrap_or("");
                let v = u8::from_str_radix(oct, 8)
                    .map_err(|_| CompileError::lex(loc, "invalid octal escape"))?;
                out.push(v as char);
            }
            other => {
                return Err(CompileError::lex(
                    loc,
                    format!("unrecognized escape '\\{}'", other as char),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_manager::SourceLocation;

    fn ptok(kind: PpTokenKind, text: &str) -> PpToken {
        PpToken::new(kind, text, SourceLocation::synthetic())
    }

    #[test]
    fn classifies_integer_vs_float_pp_numbers() {
        assert_eq!(classify_number("42"), LangTokenKind::IntConstant);
        assert_eq!(classify_number("3.14"), LangTokenKind::FloatConstant);
        assert_eq!(classify_number("1e10"), LangTokenKind::FloatConstant);
        assert_eq!(classify_number("0x1p4"), LangTokenKind::FloatConstant);
        assert_eq!(classify_number("0x1F"), LangTokenKind::IntConstant);
    }

    #[test]
    fn concatenates_adjacent_string_literals() {
        let toks = vec![
            ptok(PpTokenKind::StringLiteral, "\"foo\""),
            ptok(PpTokenKind::Whitespace, " "),
            ptok(PpTokenKind::StringLiteral, "\"bar\""),
            ptok(PpTokenKind::Eof, ""),
        ];
        let out = convert_tokens(&toks).unwrap();
        assert_eq!(out[0].text, "foobar");
    }

    #[test]
    fn keeps_const_and_volatile_keywords() {
        let toks = vec![ptok(PpTokenKind::Identifier, "const"), ptok(PpTokenKind::Eof, "")];
        let out = convert_tokens(&toks).unwrap();
        assert_eq!(out[0].kind, LangTokenKind::Keyword);
        assert_eq!(out[0].text, "const");
    }
}
