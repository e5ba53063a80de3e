//! Per-function trait record and class layout data model (spec.md §3:
//! "A record per function: `may_await`, `does_io`, `mutates_param[i]`,
//! `can_fail`, `needs_allocator`, `is_pure`, `is_tail_recursive`,
//! `is_generator`, `captured_vars[]`, `callees[]`.").

use crate::string_interning::StringId;
use crate::types::{ClassId, TypeId};
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// The fixed-point output of C3's analysis, one record per function in the
/// whole-program call graph. The emitter's codegen decisions (§4.4) are
/// pure functions of this record; nothing in `emit/` re-derives a trait.
#[derive(Debug, Clone)]
pub struct FunctionTrait {
    pub may_await: bool,
    pub does_io: bool,
    /// Indexed by parameter position; `true` means the parameter reaches a
    /// store target somewhere in the body.
    pub mutates_param: Vec<bool>,
    pub can_fail: bool,
    pub needs_allocator: bool,
    pub is_pure: bool,
    pub is_tail_recursive: bool,
    pub is_generator: bool,
    pub captured_vars: Vec<StringId>,
    pub callees: Vec<FunctionId>,
}

impl FunctionTrait {
    /// The all-unknown starting point for a function before any dataflow
    /// has run over its body; `is_pure` starts optimistic (conjunction
    /// with no terms yet is vacuously true) and is falsified as evidence
    /// of I/O, mutation, or failure accumulates.
    pub fn bottom(param_count: usize) -> Self {
        FunctionTrait {
            may_await: false,
            does_io: false,
            mutates_param: vec![false; param_count],
            can_fail: false,
            needs_allocator: false,
            is_pure: true,
            is_tail_recursive: true,
            is_generator: false,
            captured_vars: Vec::new(),
            callees: Vec::new(),
        }
    }

    /// Recomputes `is_pure` from the other traits plus the purity of every
    /// callee already resolved in `table`; called once per fixed-point
    /// iteration after the local dataflow pass updates the other fields.
    pub fn recompute_purity(&mut self, table: &FxHashMap<FunctionId, FunctionTrait>) {
        let no_mutation = self.mutates_param.iter().all(|m| !m);
        let callees_pure = self
            .callees
            .iter()
            .all(|id| table.get(id).is_none_or(|t| t.is_pure));
        self.is_pure = !self.does_io && no_mutation && !self.can_fail && callees_pure;
    }
}

/// Closed-layout field table for a class (spec.md §4.3's "Attribute access
/// `o.a` where `type(o) = Object<C>`: look up `a` in `C`'s flattened
/// layout"). A class degrades to `open` the moment a dynamic `setattr`
/// (or equivalent escape) is observed anywhere in the program; open
/// instances are boxed rather than given fixed field offsets.
#[derive(Debug, Clone)]
pub struct ClassLayout {
    pub id: ClassId,
    pub name: StringId,
    pub base: Option<ClassId>,
    /// Field name -> (fixed offset, type), in declaration order including
    /// inherited fields flattened from `base`.
    pub fields: Vec<(StringId, TypeId)>,
    pub methods: FxHashMap<StringId, FunctionId>,
    pub open: bool,
}

impl ClassLayout {
    pub fn new(id: ClassId, name: StringId, base: Option<ClassId>) -> Self {
        ClassLayout {
            id,
            name,
            base,
            fields: Vec::new(),
            methods: FxHashMap::default(),
            open: false,
        }
    }

    pub fn field_offset(&self, field: StringId) -> Option<usize> {
        self.fields.iter().position(|(name, _)| *name == field)
    }

    pub fn field_type(&self, field: StringId) -> Option<TypeId> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, ty)| *ty)
    }

    /// Marks the class open: every instance of this class (and any
    /// subclass) is boxed from this point on. Idempotent.
    pub fn degrade_to_open(&mut self) {
        self.open = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bottom_trait_starts_optimistically_pure() {
        let t = FunctionTrait::bottom(2);
        assert!(t.is_pure);
        assert!(t.mutates_param.iter().all(|m| !m));
    }

    #[test]
    fn purity_is_falsified_by_io() {
        let mut t = FunctionTrait::bottom(0);
        t.does_io = true;
        t.recompute_purity(&FxHashMap::default());
        assert!(!t.is_pure);
    }

    #[test]
    fn purity_is_falsified_by_mutation() {
        let mut t = FunctionTrait::bottom(1);
        t.mutates_param[0] = true;
        t.recompute_purity(&FxHashMap::default());
        assert!(!t.is_pure);
    }

    #[test]
    fn purity_depends_on_impure_callee() {
        let mut callee = FunctionTrait::bottom(0);
        callee.does_io = true;
        callee.recompute_purity(&FxHashMap::default());
        let mut table = FxHashMap::default();
        table.insert(FunctionId(1), callee);

        let mut caller = FunctionTrait::bottom(0);
        caller.callees.push(FunctionId(1));
        caller.recompute_purity(&table);
        assert!(!caller.is_pure);
    }

    #[test]
    fn field_offset_reflects_declaration_order() {
        let mut table = FxHashMap::default();
        table.insert(crate::string_interning::StringId::from_u32(0), FunctionId(0));
        let mut layout = ClassLayout::new(ClassId(0), StringId::from_u32(1), None);
        layout.fields.push((StringId::from_u32(2), TypeId(0)));
        layout.fields.push((StringId::from_u32(3), TypeId(1)));
        assert_eq!(layout.field_offset(StringId::from_u32(3)), Some(1));
        let _ = table;
    }
}
