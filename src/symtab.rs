//! Symbol tables (contexts)
//!
//! Three parallel namespaces — ordinary identifiers, struct/union/enum
//! tags, and (function-scope) labels — each implemented as the two-level
//! map described in the data model: a `current` scope and a flattened
//! `enclosing` scope. Opening a nested scope folds `current` into
//! `enclosing` and starts a fresh, empty `current`.
//!
//! [`Context`] is `Clone`, which is what gives every loop/switch/block its
//! cheap, automatic restoration of `break`/`continue` targets: the
//! generator clones the context on entry to a nested construct, mutates
//! only the clone, and the caller's original context is untouched once the
//! clone is dropped (see DESIGN.md, "Context copy-on-enter").

use crate::types::Type;
use std::collections::{HashMap, HashSet};

/// `{current, enclosing}` map used for all three namespaces.
#[derive(Debug, Clone, Default)]
pub struct TwoLevelMap<T: Clone> {
    current: HashMap<String, T>,
    enclosing: HashMap<String, T>,
}

impl<T: Clone> TwoLevelMap<T> {
    pub fn new() -> Self {
        TwoLevelMap {
            current: HashMap::new(),
            enclosing: HashMap::new(),
        }
    }

    /// Folds `current` into `enclosing` and starts a new, empty `current`.
    pub fn open_scope(&mut self) {
        for (k, v) in self.current.drain() {
            self.enclosing.insert(k, v);
        }
    }

    /// Defines `name` in the current scope. Fails if `name` already exists
    /// in the *current* scope (shadowing an enclosing-scope name is fine).
    pub fn define(&mut self, name: &str, value: T) -> Result<(), ()> {
        if self.current.contains_key(name) {
            return Err(());
        }
        self.current.insert(name.to_string(), value);
        Ok(())
    }

    /// Unconditionally (re)binds `name` in the current scope, used for
    /// tag completion where the same tag legitimately gets a richer entry.
    pub fn define_or_replace(&mut self, name: &str, value: T) {
        self.current.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.current.get(name).or_else(|| self.enclosing.get(name))
    }
}

#[derive(Debug, Clone)]
pub struct AggregateDef {
    pub is_union: bool,
    pub tag: String,
    /// Empty until the aggregate is completed with a field list; an empty
    /// list is the forward-declaration state ("incomplete").
    pub fields: Vec<(String, Type)>,
    pub declared: bool,
    pub size: u64,
    pub align: u64,
    pub ir_name: String,
}

impl AggregateDef {
    pub fn is_complete(&self) -> bool {
        self.declared
    }

    pub fn field_type(&self, name: &str) -> Option<&Type> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    pub fn field_offset(&self, name: &str, tags: &TagTable) -> Option<u64> {
        let mut offset = 0u64;
        for (n, t) in &self.fields {
            let align = t.align(tags);
            offset = align_up(offset, align);
            if n == name {
                return Some(offset);
            }
            offset += t.size(tags);
        }
        None
    }
}

pub fn align_up(offset: u64, align: u64) -> u64 {
    if align == 0 {
        return offset;
    }
    (offset + align - 1) / align * align
}

/// Computes struct size/alignment by sequential layout, or union
/// size/alignment as the max over fields, per §4.2.
pub fn layout_aggregate(is_union: bool, fields: &[(String, Type)], tags: &TagTable) -> (u64, u64) {
    if fields.is_empty() {
        return (0, 1);
    }
    if is_union {
        let size = fields.iter().map(|(_, t)| t.size(tags)).max().unwrap_or(0);
        let align = fields.iter().map(|(_, t)| t.align(tags)).max().unwrap_or(1);
        (size, align)
    } else {
        let mut offset = 0u64;
        let mut max_align = 1u64;
        for (_, t) in fields {
            let align = t.align(tags);
            max_align = max_align.max(align);
            offset = align_up(offset, align) + t.size(tags);
        }
        (align_up(offset, max_align), max_align)
    }
}

#[derive(Debug, Clone)]
pub enum TagEntry {
    Aggregate(AggregateDef),
    Enum,
}

pub type TagTable = TwoLevelMap<TagEntry>;

impl TagTable {
    /// Looks up an aggregate tag, returning `None` for an unknown tag or
    /// one that names an enum instead.
    pub fn get_aggregate(&self, tag: &str) -> Option<&AggregateDef> {
        match TwoLevelMap::get(self, tag) {
            Some(TagEntry::Aggregate(a)) => Some(a),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SymbolKind {
    /// A variable or parameter bound to stack/global storage; `ir_name` is
    /// the pointer to that storage (an lvalue).
    Variable { ir_name: String },
    Function,
    EnumConstant(i64),
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub ty: Type,
    pub kind: SymbolKind,
}

pub type IdentifierTable = TwoLevelMap<Symbol>;

/// Per-switch state, reset at each `switch` entry: the ordered list of
/// case labels in source order (used to detect duplicates and to drive the
/// jump table), plus the optional default label.
#[derive(Debug, Clone)]
pub struct SwitchState {
    pub cases: Vec<(i64, String)>,
    seen: HashSet<i64>,
    pub default_label: Option<String>,
}

impl SwitchState {
    pub fn new() -> Self {
        SwitchState {
            cases: Vec::new(),
            seen: HashSet::new(),
            default_label: None,
        }
    }

    /// Records a case value, returning `Err` if it duplicates one already
    /// seen in this switch.
    pub fn add_case(&mut self, value: i64, label: String) -> Result<(), ()> {
        if !self.seen.insert(value) {
            return Err(());
        }
        self.cases.push((value, label));
        Ok(())
    }
}

impl Default for SwitchState {
    fn default() -> Self {
        Self::new()
    }
}

/// The generator's threaded context: namespaces plus the loop/switch
/// control-flow targets in effect at the current point in the AST walk.
#[derive(Debug, Clone)]
pub struct Context {
    pub identifiers: IdentifierTable,
    pub tags: TagTable,
    pub typedefs: TwoLevelMap<Type>,
    pub continue_label: Option<String>,
    pub break_label: Option<String>,
    pub switch: Option<SwitchState>,
}

impl Context {
    pub fn new() -> Self {
        Context {
            identifiers: TwoLevelMap::new(),
            tags: TwoLevelMap::new(),
            typedefs: TwoLevelMap::new(),
            continue_label: None,
            break_label: None,
            switch: None,
        }
    }

    /// Opens a new lexical scope for all three namespaces at once (labels
    /// are function-global and live outside `Context`).
    pub fn open_scope(&mut self) {
        self.identifiers.open_scope();
        self.tags.open_scope();
        self.typedefs.open_scope();
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

/// Function-global label table (goto targets), predeclared by a pre-walk
/// of the function body before statements are emitted.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    declared: HashMap<String, String>,
    defined: HashSet<String>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: &str, ir_label: String) {
        self.declared.entry(name.to_string()).or_insert(ir_label);
    }

    pub fn ir_label(&self, name: &str) -> Option<&str> {
        self.declared.get(name).map(String::as_str)
    }

    pub fn mark_defined(&mut self, name: &str) -> Result<(), ()> {
        if !self.defined.insert(name.to_string()) {
            return Err(());
        }
        Ok(())
    }

    pub fn undefined_labels(&self) -> Vec<&str> {
        self.declared
            .keys()
            .filter(|l| !self.defined.contains(*l))
            .map(String::as_str)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Basic, Type};

    #[test]
    fn scope_shadowing_then_restore_via_clone() {
        let mut outer = IdentifierTable::new();
        outer
            .define(
                "x",
                Symbol {
                    ty: Type::basic(Basic::Int),
                    kind: SymbolKind::Variable {
                        ir_name: "%x.outer".into(),
                    },
                },
            )
            .unwrap();

        let mut inner = outer.clone();
        inner.open_scope();
        inner
            .define(
                "x",
                Symbol {
                    ty: Type::basic(Basic::Char),
                    kind: SymbolKind::Variable {
                        ir_name: "%x.inner".into(),
                    },
                },
            )
            .unwrap();

        assert!(matches!(
            &inner.get("x").unwrap().kind,
            SymbolKind::Variable { ir_name } if ir_name == "%x.inner"
        ));
        assert!(matches!(
            &outer.get("x").unwrap().kind,
            SymbolKind::Variable { ir_name } if ir_name == "%x.outer"
        ));
    }

    #[test]
    fn struct_layout_pads_for_alignment() {
        let tags = TagTable::new();
        let fields = vec![
            ("a".to_string(), Type::basic(Basic::Char)),
            ("b".to_string(), Type::basic(Basic::Int)),
        ];
        let (size, align) = layout_aggregate(false, &fields, &tags);
        assert_eq!(align, 4);
        assert_eq!(size, 8); // char at 0, 3 bytes pad, int at 4..8
    }

    #[test]
    fn union_size_is_max_field() {
        let tags = TagTable::new();
        let fields = vec![
            ("a".to_string(), Type::basic(Basic::Char)),
            ("b".to_string(), Type::basic(Basic::Long)),
        ];
        let (size, align) = layout_aggregate(true, &fields, &tags);
        assert_eq!(size, 8);
        assert_eq!(align, 8);
    }

    #[test]
    fn duplicate_case_value_rejected() {
        let mut sw = SwitchState::new();
        sw.add_case(1, "l1".into()).unwrap();
        assert!(sw.add_case(1, "l2".into()).is_err());
    }
}
