//! Value Model and Constant Folding
//!
//! Every expression node produces a [`Value`]: an IR name, its type, and
//! whether it names storage (lvalue) or is known at compile time
//! (constant). Constants additionally carry a numeric payload — an
//! unsigned 64-bit word for every integer/enum/pointer-null constant, or a
//! host `f64` for floating constants — so that binary operators on two
//! constants can fold without emitting any IR.

use crate::types::{Basic, Type, TypeKind};

#[derive(Debug, Clone, Copy)]
pub enum Payload {
    Int(u64),
    Float(f64),
}

/// A value descriptor. `ir_name` is the SSA/global name a runtime user of
/// this value would reference; for a constant it is the decimal/hex
/// spelling of the constant itself so it can be substituted directly into
/// an instruction operand.
#[derive(Debug, Clone)]
pub struct Value {
    pub ir_name: String,
    pub ty: Type,
    pub is_lvalue: bool,
    pub is_constant: bool,
    pub payload: Option<Payload>,
    /// A null-pointer constant of unsuffixed `void*` type, per §3: it
    /// implicitly converts to any pointer type.
    pub is_void_null: bool,
}

impl Value {
    pub fn ir(ir_name: impl Into<String>, ty: Type, is_lvalue: bool) -> Self {
        Value {
            ir_name: ir_name.into(),
            ty,
            is_lvalue,
            is_constant: false,
            payload: None,
            is_void_null: false,
        }
    }

    /// Writes `v` into an integer/enum/pointer-typed constant, truncating
    /// to the type's bit width on unsigned types narrower than 64 bits —
    /// the `i_init` discipline from §3: *every write* truncates, not just
    /// the final one, so intermediate folds stay correct.
    pub fn int_const(ty: Type, v: u64) -> Self {
        let masked = match ty.as_basic() {
            Some(b) if b.is_unsigned() && b.size() < 8 => v & ((1u64 << (b.size() * 8)) - 1),
            _ => v,
        };
        let ir_name = if let Some(b) = ty.as_basic() {
            if b.is_signed() {
                format!("{}", masked as i64)
            } else {
                format!("{}", masked)
            }
        } else {
            format!("{}", masked)
        };
        Value {
            ir_name,
            ty,
            is_lvalue: false,
            is_constant: true,
            payload: Some(Payload::Int(masked)),
            is_void_null: false,
        }
    }

    pub fn float_const(ty: Type, v: f64) -> Self {
        Value {
            ir_name: format!("{:?}", v),
            ty,
            is_lvalue: false,
            is_constant: true,
            payload: Some(Payload::Float(v)),
            is_void_null: false,
        }
    }

    /// The `(void*)0` null pointer constant, per §3 "void null" marker.
    pub fn void_null() -> Self {
        Value {
            ir_name: "null".to_string(),
            ty: Type::pointer_to(Type::void()),
            is_lvalue: false,
            is_constant: true,
            payload: Some(Payload::Int(0)),
            is_void_null: true,
        }
    }

    pub fn u_val(&self) -> u64 {
        match self.payload {
            Some(Payload::Int(v)) => v,
            _ => 0,
        }
    }

    pub fn s_val(&self) -> i64 {
        self.u_val() as i64
    }

    pub fn f_val(&self) -> f64 {
        match self.payload {
            Some(Payload::Float(v)) => v,
            Some(Payload::Int(v)) => v as i64 as f64,
            None => 0.0,
        }
    }

    /// Constant truthiness, used by `#if`/`&&`/`||`/`?:` folding.
    pub fn is_false(&self) -> bool {
        debug_assert!(self.is_constant);
        if self.is_void_null {
            return true;
        }
        if self.ty.is_floating() {
            self.f_val() == 0.0
        } else {
            self.u_val() == 0
        }
    }
}

fn int_result(ty: Type, s: i64, u: u64) -> Value {
    if ty.is_signed() {
        Value::int_const(ty, s as u64)
    } else {
        Value::int_const(ty, u)
    }
}

/// Folds a binary arithmetic/bitwise operator on two already-converted
/// constants of the same type `ty`. The caller is responsible for applying
/// integer promotion and the common arithmetic type beforehand (§4.3);
/// this only implements the per-operator numeric discipline.
pub fn fold_binary(op: &str, ty: &Type, a: &Value, b: &Value) -> Value {
    debug_assert!(a.is_constant && b.is_constant);
    if ty.is_floating() {
        let (x, y) = (a.f_val(), b.f_val());
        let r = match op {
            "+" => x + y,
            "-" => x - y,
            "*" => x * y,
            "/" => {
                if y == 0.0 {
                    0.0
                } else {
                    x / y
                }
            }
            _ => unreachable!("non-arithmetic op on floating operands: {op}"),
        };
        return Value::float_const(ty.clone(), r);
    }
    let (x, y) = (a.s_val(), b.s_val());
    let (ux, uy) = (a.u_val(), b.u_val());
    match op {
        "+" => int_result(ty.clone(), x.wrapping_add(y), ux.wrapping_add(uy)),
        "-" => int_result(ty.clone(), x.wrapping_sub(y), ux.wrapping_sub(uy)),
        "*" => int_result(ty.clone(), x.wrapping_mul(y), ux.wrapping_mul(uy)),
        "/" => {
            if ty.is_signed() {
                if y == 0 {
                    Value::int_const(ty.clone(), 0)
                } else {
                    Value::int_const(ty.clone(), x.wrapping_div(y) as u64)
                }
            } else if uy == 0 {
                Value::int_const(ty.clone(), 0)
            } else {
                Value::int_const(ty.clone(), ux / uy)
            }
        }
        "%" => {
            if ty.is_signed() {
                if y == 0 {
                    Value::int_const(ty.clone(), 0)
                } else {
                    Value::int_const(ty.clone(), x.wrapping_rem(y) as u64)
                }
            } else if uy == 0 {
                Value::int_const(ty.clone(), 0)
            } else {
                Value::int_const(ty.clone(), ux % uy)
            }
        }
        "&" => Value::int_const(ty.clone(), ux & uy),
        "|" => Value::int_const(ty.clone(), ux | uy),
        "^" => Value::int_const(ty.clone(), ux ^ uy),
        "<<" => Value::int_const(ty.clone(), ux.wrapping_shl(uy as u32)),
        ">>" => {
            if ty.is_signed() {
                Value::int_const(ty.clone(), (x >> (uy as u32 & 63)) as u64)
            } else {
                Value::int_const(ty.clone(), ux >> (uy as u32 & 63))
            }
        }
        _ => unreachable!("unhandled binary fold operator: {op}"),
    }
}

/// Folds a relational/equality operator; always produces an `int`-typed
/// 0/1 constant regardless of the operand type.
pub fn fold_relational(op: &str, operand_ty: &Type, a: &Value, b: &Value) -> Value {
    debug_assert!(a.is_constant && b.is_constant);
    let truth = if operand_ty.is_floating() {
        let (x, y) = (a.f_val(), b.f_val());
        match op {
            "<" => x < y,
            ">" => x > y,
            "<=" => x <= y,
            ">=" => x >= y,
            "==" => x == y,
            "!=" => x != y,
            _ => unreachable!(),
        }
    } else if operand_ty.is_signed() {
        let (x, y) = (a.s_val(), b.s_val());
        match op {
            "<" => x < y,
            ">" => x > y,
            "<=" => x <= y,
            ">=" => x >= y,
            "==" => x == y,
            "!=" => x != y,
            _ => unreachable!(),
        }
    } else {
        let (x, y) = (a.u_val(), b.u_val());
        match op {
            "<" => x < y,
            ">" => x > y,
            "<=" => x <= y,
            ">=" => x >= y,
            "==" => x == y,
            "!=" => x != y,
            _ => unreachable!(),
        }
    };
    Value::int_const(Type::basic(Basic::Int), truth as u64)
}

pub fn fold_unary_minus(ty: &Type, a: &Value) -> Value {
    if ty.is_floating() {
        Value::float_const(ty.clone(), -a.f_val())
    } else {
        int_result(ty.clone(), a.s_val().wrapping_neg(), a.u_val().wrapping_neg())
    }
}

pub fn fold_bitnot(ty: &Type, a: &Value) -> Value {
    Value::int_const(ty.clone(), !a.u_val())
}

pub fn fold_logical_not(a: &Value) -> Value {
    Value::int_const(Type::basic(Basic::Int), a.is_false() as u64)
}

/// Pure-numeric conversion used when both source and target are known at
/// compile time (§4.6): no runtime instruction is emitted.
pub fn convert_constant(target: &Type, v: &Value) -> Value {
    if v.is_void_null && target.is_pointer() {
        let mut nv = Value::void_null();
        nv.ty = target.clone();
        return nv;
    }
    match &target.kind {
        TypeKind::Basic(Basic::Float) | TypeKind::Basic(Basic::Double) | TypeKind::Basic(Basic::LongDouble) => {
            let f = if v.ty.is_floating() {
                v.f_val()
            } else if v.ty.is_signed() {
                v.s_val() as f64
            } else {
                v.u_val() as f64
            };
            Value::float_const(target.clone(), f)
        }
        TypeKind::Basic(_) => {
            let u = if v.ty.is_floating() {
                v.f_val() as i64 as u64
            } else {
                v.u_val()
            };
            Value::int_const(target.clone(), u)
        }
        TypeKind::Pointer(_) => {
            // An integer constant expression that evaluates to 0 is a
            // null-pointer constant (§4.6) regardless of its spelling —
            // `0`, `(void*)0`, a `0`-valued enumerator — and converts to
            // any pointer type as `null`, not the literal word `0`.
            if !v.ty.is_pointer() && matches!(v.payload, Some(Payload::Int(0))) {
                let mut nv = Value::void_null();
                nv.ty = target.clone();
                return nv;
            }
            let mut nv = v.clone();
            nv.ty = target.clone();
            nv
        }
        _ => v.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_truncates_to_width_on_every_write() {
        let ty = Type::basic(Basic::UChar);
        let v = Value::int_const(ty, 0x1FF);
        assert_eq!(v.u_val(), 0xFF);
    }

    #[test]
    fn signed_overflow_wraps_via_unsigned_word() {
        let ty = Type::basic(Basic::Int);
        let max = Value::int_const(ty.clone(), i32::MAX as u64);
        let one = Value::int_const(ty.clone(), 1);
        let sum = fold_binary("+", &ty, &max, &one);
        assert_eq!(sum.s_val() as i32, i32::MIN);
    }

    #[test]
    fn constant_division_by_zero_yields_typed_zero() {
        let ty = Type::basic(Basic::Int);
        let a = Value::int_const(ty.clone(), 10);
        let z = Value::int_const(ty.clone(), 0);
        let r = fold_binary("/", &ty, &a, &z);
        assert_eq!(r.s_val(), 0);
    }

    #[test]
    fn relational_always_yields_int() {
        let ty = Type::basic(Basic::Double);
        let a = Value::float_const(ty.clone(), 1.0);
        let b = Value::float_const(ty, 2.0);
        let r = fold_relational("<", &Type::basic(Basic::Double), &a, &b);
        assert!(r.ty.is_basic(Basic::Int));
        assert_eq!(r.s_val(), 1);
    }
}
