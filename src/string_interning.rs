//! Centralized string interning so identifiers and module paths can be
//! passed around as cheap `Copy` ids instead of cloned `String`s.

use rustc_hash::FxHashMap;

/// A unique identifier for an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StringId(u32);

impl StringId {
    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn from_u32(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub fn resolve<'a>(self, table: &'a StringTable) -> &'a str {
        table.resolve(self)
    }
}

impl std::fmt::Display for StringId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StringId({})", self.0)
    }
}

/// Dual-mapping string table: `Vec<Box<str>>` for O(1) id -> string, and
/// an `FxHashMap` for O(1) string -> id during interning.
#[derive(Debug, Clone)]
pub struct StringTable {
    strings: Vec<Box<str>>,
    string_to_id: FxHashMap<&'static str, StringId>,
    next_id: u32,
}

const MINIMUM_STRING_TABLE_CAPACITY: usize = 64;

impl StringTable {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            strings: Vec::with_capacity(MINIMUM_STRING_TABLE_CAPACITY),
            string_to_id: FxHashMap::default(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: 0,
            strings: Vec::with_capacity(capacity + MINIMUM_STRING_TABLE_CAPACITY),
            string_to_id: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    #[inline]
    pub fn intern(&mut self, s: &str) -> StringId {
        if let Some(&existing_id) = self.string_to_id.get(s) {
            return existing_id;
        }
        self.intern_new(s)
    }

    #[cold]
    #[inline(never)]
    fn intern_new(&mut self, s: &str) -> StringId {
        let new_id = StringId(self.next_id);
        self.next_id += 1;

        let boxed: Box<str> = s.into();
        // SAFETY: the StringTable owns `boxed` for the rest of its life and never
        // reallocates or removes entries, so the reference stays valid as long
        // as `self` does. The 'static lifetime never escapes this struct.
        let static_ref: &'static str =
            unsafe { std::mem::transmute::<&str, &'static str>(boxed.as_ref()) };

        self.string_to_id.insert(static_ref, new_id);
        self.strings.push(boxed);
        new_id
    }

    #[inline]
    pub fn resolve(&self, id: StringId) -> &str {
        // SAFETY: StringIds are only minted by this table's own intern methods.
        unsafe { self.strings.get_unchecked(id.0 as usize).as_ref() }
    }

    #[inline]
    pub fn try_resolve(&self, id: StringId) -> Option<&str> {
        self.strings.get(id.0 as usize).map(|s| s.as_ref())
    }

    #[inline]
    pub fn get_existing(&self, s: &str) -> Option<StringId> {
        self.string_to_id.get(s).copied()
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

impl Default for StringTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_dedupes() {
        let mut table = StringTable::new();
        let a = table.intern("fib");
        let b = table.intern("fib");
        let c = table.intern("other");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.resolve(a), "fib");
    }

    #[test]
    fn try_resolve_out_of_range_is_none() {
        let table = StringTable::new();
        assert!(table.try_resolve(StringId::from_u32(0)).is_none());
    }
}
