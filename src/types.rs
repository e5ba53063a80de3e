//! Type term lattice (spec.md §3: "A bounded lattice: `Unknown < {Int,
//! Float, Bool, Str, Bytes, None} ∪ {List<T>, Tuple<T1..Tn>, Dict<K,V>,
//! Set<T>, Object<ClassId>, Callable(sig), Union<T1..Tn>, Error} < Any`.
//! Joins are used at control-flow merges; meets are used at assertions
//! (`isinstance` narrowing).").
//!
//! Shaped after the teacher's `compiler_frontend/hir/hir_datatypes.rs`:
//! a canonical, interned `TypeId` into a `TypeContext` rather than passing
//! recursive type trees around by value, plus a flat `TypeKind` enum for
//! the concrete shapes.

use rustc_hash::FxHashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<TypeId>,
    pub returns: TypeId,
}

/// The concrete shapes in the lattice, excluding the two sentinels
/// `Unknown` and `Any`, which are represented as fixed well-known ids
/// rather than `TypeKind` variants (every `TypeContext` reserves them).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Unknown,
    Any,

    Int,
    Float,
    Bool,
    Str,
    Bytes,
    None,

    List(TypeId),
    Tuple(Vec<TypeId>),
    Dict(TypeId, TypeId),
    Set(TypeId),
    Object(ClassId),
    Callable(Signature),
    Union(Vec<TypeId>),
    Error,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeKind::Unknown => write!(f, "Unknown"),
            TypeKind::Any => write!(f, "Any"),
            TypeKind::Int => write!(f, "Int"),
            TypeKind::Float => write!(f, "Float"),
            TypeKind::Bool => write!(f, "Bool"),
            TypeKind::Str => write!(f, "Str"),
            TypeKind::Bytes => write!(f, "Bytes"),
            TypeKind::None => write!(f, "None"),
            TypeKind::List(_) => write!(f, "List"),
            TypeKind::Tuple(elems) => write!(f, "Tuple[{}]", elems.len()),
            TypeKind::Dict(..) => write!(f, "Dict"),
            TypeKind::Set(_) => write!(f, "Set"),
            TypeKind::Object(id) => write!(f, "Object#{}", id.0),
            TypeKind::Callable(_) => write!(f, "Callable"),
            TypeKind::Union(members) => write!(f, "Union[{}]", members.len()),
            TypeKind::Error => write!(f, "Error"),
        }
    }
}

pub const UNKNOWN: TypeId = TypeId(0);
pub const ANY: TypeId = TypeId(1);

/// Canonical, deduplicated type storage. Every `TypeId` in the pipeline
/// indexes into exactly one `TypeContext` shared by the whole program.
#[derive(Debug)]
pub struct TypeContext {
    kinds: Vec<TypeKind>,
    dedup: FxHashMap<TypeKind, TypeId>,
}

impl TypeContext {
    pub fn new() -> Self {
        let mut ctx = TypeContext {
            kinds: Vec::new(),
            dedup: FxHashMap::default(),
        };
        let unknown = ctx.insert_new(TypeKind::Unknown);
        let any = ctx.insert_new(TypeKind::Any);
        debug_assert_eq!(unknown, UNKNOWN);
        debug_assert_eq!(any, ANY);
        ctx
    }

    fn insert_new(&mut self, kind: TypeKind) -> TypeId {
        let id = TypeId(self.kinds.len() as u32);
        self.kinds.push(kind);
        id
    }

    /// Interns a type kind, returning an existing id if an identical kind
    /// was already recorded.
    pub fn intern(&mut self, kind: TypeKind) -> TypeId {
        if let Some(&id) = self.dedup.get(&kind) {
            return id;
        }
        let id = self.insert_new(kind.clone());
        self.dedup.insert(kind, id);
        id
    }

    pub fn get(&self, id: TypeId) -> &TypeKind {
        &self.kinds[id.0 as usize]
    }

    /// Is `sub` assignable wherever `sup` is expected? `Unknown` is
    /// assignable to anything (it hasn't been resolved yet) and everything
    /// is assignable to `Any`.
    fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        if sub == sup || sub == UNKNOWN || sup == ANY {
            return true;
        }
        match (self.get(sub), self.get(sup)) {
            (TypeKind::List(a), TypeKind::List(b)) => self.is_subtype(*a, *b),
            (TypeKind::Set(a), TypeKind::Set(b)) => self.is_subtype(*a, *b),
            (TypeKind::Dict(ak, av), TypeKind::Dict(bk, bv)) => {
                self.is_subtype(*ak, *bk) && self.is_subtype(*av, *bv)
            }
            (TypeKind::Tuple(a), TypeKind::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| self.is_subtype(*x, *y))
            }
            (_, TypeKind::Union(members)) => members.iter().any(|m| self.is_subtype(sub, *m)),
            (TypeKind::Union(members), _) => members.iter().all(|m| self.is_subtype(*m, sup)),
            _ => false,
        }
    }

    /// Lattice join, used at control-flow merges (e.g. the value of an
    /// `if`/`else` with differently-typed branches). Disjoint concrete
    /// types widen to a `Union`; if that union would itself conflict with
    /// a pre-existing budget, the caller is expected to widen further to
    /// `Any` (see `infer::dataflow`'s join-budget counter).
    pub fn join(&mut self, a: TypeId, b: TypeId) -> TypeId {
        if a == b {
            return a;
        }
        if a == UNKNOWN {
            return b;
        }
        if b == UNKNOWN {
            return a;
        }
        if a == ANY || b == ANY {
            return ANY;
        }
        if self.is_subtype(a, b) {
            return b;
        }
        if self.is_subtype(b, a) {
            return a;
        }
        let mut members = self.flatten_union_members(a);
        members.extend(self.flatten_union_members(b));
        members.sort_by_key(|t| t.0);
        members.dedup();
        self.intern(TypeKind::Union(members))
    }

    fn flatten_union_members(&self, id: TypeId) -> Vec<TypeId> {
        match self.get(id) {
            TypeKind::Union(members) => members.clone(),
            _ => vec![id],
        }
    }

    /// Lattice meet, used for `isinstance(x, T)` narrowing on the true
    /// branch: `current ∩ T`. Returns `None` when the intersection is
    /// empty (the narrowing is unreachable, e.g. `isinstance(x, Str)`
    /// when `x` is already known to be `Int`).
    pub fn meet(&mut self, current: TypeId, narrow_to: TypeId) -> Option<TypeId> {
        if current == UNKNOWN || current == ANY {
            return Some(narrow_to);
        }
        if narrow_to == ANY {
            return Some(current);
        }
        if self.is_subtype(current, narrow_to) {
            return Some(current);
        }
        if self.is_subtype(narrow_to, current) {
            return Some(narrow_to);
        }
        if let TypeKind::Union(members) = self.get(current).clone() {
            let narrowed: Vec<TypeId> = members
                .into_iter()
                .filter(|m| self.is_subtype(*m, narrow_to) || self.is_subtype(narrow_to, *m))
                .collect();
            return match narrowed.len() {
                0 => None,
                1 => Some(narrowed[0]),
                _ => Some(self.intern(TypeKind::Union(narrowed))),
            };
        }
        None
    }

    /// The complement used on the false branch of `isinstance(x, T)`:
    /// removes `T` from a union, leaving the rest; for a non-union type
    /// that coincides with `T`, the false branch is unreachable.
    pub fn subtract(&mut self, current: TypeId, remove: TypeId) -> Option<TypeId> {
        match self.get(current).clone() {
            TypeKind::Union(members) => {
                let remaining: Vec<TypeId> = members
                    .into_iter()
                    .filter(|m| !self.is_subtype(*m, remove))
                    .collect();
                match remaining.len() {
                    0 => None,
                    1 => Some(remaining[0]),
                    _ => Some(self.intern(TypeKind::Union(remaining))),
                }
            }
            _ if self.is_subtype(current, remove) => None,
            _ => Some(current),
        }
    }
}

impl Default for TypeContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_of_identical_types_is_identity() {
        let mut ctx = TypeContext::new();
        let int = ctx.intern(TypeKind::Int);
        assert_eq!(ctx.join(int, int), int);
    }

    #[test]
    fn join_of_unknown_widens_to_other_operand() {
        let mut ctx = TypeContext::new();
        let int = ctx.intern(TypeKind::Int);
        assert_eq!(ctx.join(UNKNOWN, int), int);
    }

    #[test]
    fn join_of_disjoint_concrete_types_is_a_union() {
        let mut ctx = TypeContext::new();
        let int = ctx.intern(TypeKind::Int);
        let str_ = ctx.intern(TypeKind::Str);
        let joined = ctx.join(int, str_);
        assert!(matches!(ctx.get(joined), TypeKind::Union(members) if members.len() == 2));
    }

    #[test]
    fn meet_narrows_union_to_member() {
        let mut ctx = TypeContext::new();
        let int = ctx.intern(TypeKind::Int);
        let str_ = ctx.intern(TypeKind::Str);
        let union = ctx.join(int, str_);
        assert_eq!(ctx.meet(union, int), Some(int));
    }

    #[test]
    fn meet_of_disjoint_concrete_types_is_unreachable() {
        let mut ctx = TypeContext::new();
        let int = ctx.intern(TypeKind::Int);
        let str_ = ctx.intern(TypeKind::Str);
        assert_eq!(ctx.meet(int, str_), None);
    }

    #[test]
    fn subtract_removes_member_from_union() {
        let mut ctx = TypeContext::new();
        let int = ctx.intern(TypeKind::Int);
        let str_ = ctx.intern(TypeKind::Str);
        let union = ctx.join(int, str_);
        assert_eq!(ctx.subtract(union, int), Some(str_));
    }
}
