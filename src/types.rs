//! Type System
//!
//! Type descriptors are immutable value types, cheap to clone: aggregates
//! (`struct`/`union`/`enum`) carry only their tag, and the authoritative
//! field list lives in the enclosing [`crate::symtab::TagTable`] so that a
//! forward declaration (`struct N;`) and its later completion
//! (`struct N { ... };`) are the same type wherever they are referenced.
//! [`complete_type`] resolves a tagged type against the tag table to get at
//! its fields, size, and alignment.

use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basic {
    Char,
    SChar,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    LongDouble,
    Void,
}

impl Basic {
    pub fn size(self) -> u64 {
        match self {
            Basic::Char | Basic::SChar | Basic::UChar => 1,
            Basic::Short | Basic::UShort => 2,
            Basic::Int | Basic::UInt | Basic::Float => 4,
            Basic::Long | Basic::ULong | Basic::Double | Basic::LongDouble => 8,
            Basic::Void => 0,
        }
    }

    pub fn align(self) -> u64 {
        self.size().max(1)
    }

    pub fn is_signed(self) -> bool {
        matches!(self, Basic::Char | Basic::SChar | Basic::Short | Basic::Int | Basic::Long)
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            Basic::UChar | Basic::UShort | Basic::UInt | Basic::ULong
        )
    }

    pub fn is_floating(self) -> bool {
        matches!(self, Basic::Float | Basic::Double | Basic::LongDouble)
    }

    pub fn is_integer(self) -> bool {
        !self.is_floating() && !matches!(self, Basic::Void)
    }

    /// Integer promotion target: anything narrower than `int` promotes to
    /// `int` (this dialect has no representable type wider than int that
    /// promotes further, since all promotable types fit in int's range).
    pub fn promote(self) -> Basic {
        match self {
            Basic::Char | Basic::SChar | Basic::UChar | Basic::Short | Basic::UShort => {
                Basic::Int
            }
            other => other,
        }
    }

    /// Priority used to pick the common arithmetic type of two operands;
    /// higher wins. Mirrors the order in §4.2: long double > double > float
    /// > unsigned long > long > unsigned int > int.
    fn rank(self) -> u8 {
        match self {
            Basic::LongDouble => 6,
            Basic::Double => 5,
            Basic::Float => 4,
            Basic::ULong => 3,
            Basic::Long => 2,
            Basic::UInt => 1,
            Basic::Int => 0,
            other => other.promote().rank(),
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            Basic::Char => "char",
            Basic::SChar => "signed char",
            Basic::UChar => "unsigned char",
            Basic::Short => "short",
            Basic::UShort => "unsigned short",
            Basic::Int => "int",
            Basic::UInt => "unsigned int",
            Basic::Long => "long",
            Basic::ULong => "unsigned long",
            Basic::Float => "float",
            Basic::Double => "double",
            Basic::LongDouble => "long double",
            Basic::Void => "void",
        }
    }
}

/// Returns the common arithmetic type of two arithmetic basics per the
/// priority ladder, after each has individually undergone integer
/// promotion. Both the standard's "usual arithmetic conversions" and this
/// dialect's more permissive ternary operator (§9 Open Questions) go
/// through this function.
pub fn common_arithmetic_type(a: Basic, b: Basic) -> Basic {
    let a = a.promote();
    let b = b.promote();
    if a.rank() >= b.rank() {
        a
    } else {
        b
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Basic(Basic),
    Pointer(Rc<Type>),
    /// `None` length means an incomplete array (`int a[]`).
    Array(Rc<Type>, Option<u64>),
    Struct(String),
    Union(String),
    Enum(String),
    Function(Rc<Type>, Vec<Type>, bool),
}

/// A type descriptor: a [`TypeKind`] plus top-level cv-qualifiers.
/// Qualifiers are tracked (rather than stripped at lexing, as the original
/// implementation this dialect is modeled on does) because pointer
/// compatibility needs to compare them — see DESIGN.md.
#[derive(Debug, Clone, PartialEq)]
pub struct Type {
    pub kind: TypeKind,
    pub is_const: bool,
    pub is_volatile: bool,
}

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Type {
            kind,
            is_const: false,
            is_volatile: false,
        }
    }

    pub fn qualified(kind: TypeKind, is_const: bool, is_volatile: bool) -> Self {
        Type {
            kind,
            is_const,
            is_volatile,
        }
    }

    pub fn unqualified(&self) -> Type {
        Type::new(self.kind.clone())
    }

    pub fn basic(b: Basic) -> Type {
        Type::new(TypeKind::Basic(b))
    }

    pub fn void() -> Type {
        Type::basic(Basic::Void)
    }

    pub fn pointer_to(pointee: Type) -> Type {
        Type::new(TypeKind::Pointer(Rc::new(pointee)))
    }

    pub fn array_of(element: Type, length: Option<u64>) -> Type {
        Type::new(TypeKind::Array(Rc::new(element), length))
    }

    pub fn function(ret: Type, params: Vec<Type>, variadic: bool) -> Type {
        Type::new(TypeKind::Function(Rc::new(ret), params, variadic))
    }

    pub fn struct_tag(tag: impl Into<String>) -> Type {
        Type::new(TypeKind::Struct(tag.into()))
    }

    pub fn union_tag(tag: impl Into<String>) -> Type {
        Type::new(TypeKind::Union(tag.into()))
    }

    pub fn enum_tag(tag: impl Into<String>) -> Type {
        Type::new(TypeKind::Enum(tag.into()))
    }

    pub fn is_basic(&self, b: Basic) -> bool {
        matches!(self.kind, TypeKind::Basic(x) if x == b)
    }

    pub fn as_basic(&self) -> Option<Basic> {
        match self.kind {
            TypeKind::Basic(b) => Some(b),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        self.is_basic(Basic::Void)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    pub fn pointee(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Pointer(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array(..))
    }

    pub fn element_type(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Array(e, _) => Some(e),
            _ => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, TypeKind::Function(..))
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct(_))
    }

    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union(_))
    }

    pub fn is_enum(&self) -> bool {
        matches!(self.kind, TypeKind::Enum(_))
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_struct() || self.is_union()
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Struct(t) | TypeKind::Union(t) | TypeKind::Enum(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.kind, TypeKind::Basic(b) if b.is_integer()) || self.is_enum()
    }

    pub fn is_floating(&self) -> bool {
        matches!(self.kind, TypeKind::Basic(b) if b.is_floating())
    }

    pub fn is_arithmetic(&self) -> bool {
        self.is_integer() || self.is_floating()
    }

    /// Scalar: arithmetic or pointer. Required operand class for `?:`
    /// conditions, `!`, casts, and `sizeof` is not restricted this way.
    pub fn is_scalar(&self) -> bool {
        self.is_arithmetic() || self.is_pointer()
    }

    pub fn is_signed(&self) -> bool {
        matches!(self.kind, TypeKind::Basic(b) if b.is_signed())
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self.kind, TypeKind::Basic(b) if b.is_unsigned()) || self.is_enum()
    }

    /// Byte size. Returns 0 for incomplete/function types; callers check
    /// [`Type::is_complete`] first and report "incomplete field type" /
    /// "bad operands" rather than relying on this value in that case.
    pub fn size(&self, tags: &crate::symtab::TagTable) -> u64 {
        match &self.kind {
            TypeKind::Basic(b) => b.size(),
            TypeKind::Pointer(_) => 8,
            TypeKind::Array(elem, Some(n)) => elem.size(tags) * n,
            TypeKind::Array(_, None) => 0,
            TypeKind::Struct(tag) | TypeKind::Union(tag) => tags.get_aggregate(tag).map(|a| a.size).unwrap_or(0),
            TypeKind::Enum(_) => Basic::Int.size(),
            TypeKind::Function(..) => 0,
        }
    }

    pub fn align(&self, tags: &crate::symtab::TagTable) -> u64 {
        match &self.kind {
            TypeKind::Basic(b) => b.align(),
            TypeKind::Pointer(_) => 8,
            TypeKind::Array(elem, _) => elem.align(tags),
            TypeKind::Struct(tag) | TypeKind::Union(tag) => {
                tags.get_aggregate(tag).map(|a| a.align).unwrap_or(1)
            }
            TypeKind::Enum(_) => Basic::Int.align(),
            TypeKind::Function(..) => 1,
        }
    }

    /// True for every type except an incomplete array, an incomplete
    /// struct/union (undeclared or forward-declared-only tag), or `void`.
    pub fn is_complete(&self, tags: &crate::symtab::TagTable) -> bool {
        match &self.kind {
            TypeKind::Basic(Basic::Void) => false,
            TypeKind::Array(_, None) => false,
            TypeKind::Struct(tag) | TypeKind::Union(tag) => {
                tags.get_aggregate(tag).map(|a| a.is_complete()).unwrap_or(false)
            }
            TypeKind::Function(..) => false,
            _ => true,
        }
    }

    pub fn display(&self) -> String {
        let mut s = String::new();
        if self.is_const {
            s.push_str("const ");
        }
        if self.is_volatile {
            s.push_str("volatile ");
        }
        match &self.kind {
            TypeKind::Basic(b) => s.push_str(b.text()),
            TypeKind::Pointer(p) => {
                s.push_str(&p.display());
                s.push('*');
            }
            TypeKind::Array(e, Some(n)) => s.push_str(&format!("{}[{}]", e.display(), n)),
            TypeKind::Array(e, None) => s.push_str(&format!("{}[]", e.display())),
            TypeKind::Struct(t) => s.push_str(&format!("struct {}", t)),
            TypeKind::Union(t) => s.push_str(&format!("union {}", t)),
            TypeKind::Enum(t) => s.push_str(&format!("enum {}", t)),
            TypeKind::Function(r, params, variadic) => {
                let ps: Vec<String> = params.iter().map(Type::display).collect();
                let mut all = ps.join(", ");
                if *variadic {
                    if !all.is_empty() {
                        all.push_str(", ");
                    }
                    all.push_str("...");
                }
                s.push_str(&format!("{} ({})", r.display(), all));
            }
        }
        s
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

/// Two types are compatible per §4.2: same kind, and structurally matching
/// components. Integer/enum compatibility is bidirectional.
pub fn compatible(a: &Type, b: &Type) -> bool {
    if a.is_const != b.is_const || a.is_volatile != b.is_volatile {
        return false;
    }
    match (&a.kind, &b.kind) {
        (TypeKind::Basic(x), TypeKind::Basic(y)) => x == y,
        (TypeKind::Basic(x), TypeKind::Enum(_)) | (TypeKind::Enum(_), TypeKind::Basic(x)) => {
            *x == Basic::Int
        }
        (TypeKind::Pointer(x), TypeKind::Pointer(y)) => compatible(x, y),
        (TypeKind::Array(x, lx), TypeKind::Array(y, ly)) => {
            compatible(x, y) && (lx.is_none() || ly.is_none() || lx == ly)
        }
        (TypeKind::Struct(x), TypeKind::Struct(y)) => x == y,
        (TypeKind::Union(x), TypeKind::Union(y)) => x == y,
        (TypeKind::Enum(x), TypeKind::Enum(y)) => x == y,
        (TypeKind::Function(rx, px, vx), TypeKind::Function(ry, py, vy)) => {
            compatible(rx, ry) && vx == vy && px.len() == py.len() && px.iter().zip(py).all(|(p, q)| compatible(p, q))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_sizes_match_spec() {
        assert_eq!(Basic::Char.size(), 1);
        assert_eq!(Basic::Short.size(), 2);
        assert_eq!(Basic::Int.size(), 4);
        assert_eq!(Basic::Long.size(), 8);
        assert_eq!(Basic::Float.size(), 4);
        assert_eq!(Basic::Double.size(), 8);
    }

    #[test]
    fn common_arithmetic_prefers_double_over_long() {
        assert_eq!(common_arithmetic_type(Basic::Double, Basic::Long), Basic::Double);
        assert_eq!(common_arithmetic_type(Basic::UInt, Basic::Int), Basic::UInt);
        assert_eq!(common_arithmetic_type(Basic::Char, Basic::Short), Basic::Int);
    }

    #[test]
    fn pointer_compatibility_requires_matching_pointee() {
        let pi = Type::pointer_to(Type::basic(Basic::Int));
        let pc = Type::pointer_to(Type::basic(Basic::Char));
        assert!(compatible(&pi, &pi.clone()));
        assert!(!compatible(&pi, &pc));
    }
}
