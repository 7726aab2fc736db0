//! The interned identifier table (`spec.md` §3 "Key", §4.A).
//!
//! Every identifier occurring in source, or constructed by host code, is
//! interned once; a [`Key`] is a cheap `u32` that compares equal iff the
//! underlying byte sequence matched at intern time. This follows the same
//! index-not-pointer interning idiom as the ancestor crate's `StringId`
//! (a `u32` index into a growable vector, not an atomically refcounted
//! string), adapted from `original_source/key.h`'s `io_libecc_Key`
//! (there a 32-bit union of four "depth" bytes used both as a hash digit
//! source and an equality-comparable integer).
//!
//! Unlike `original_source`, where the key table is process-global, this
//! table is owned by one [`crate::context::Interpreter`] — see
//! `SPEC_FULL.md` §5.A for why that's the right call for an embeddable
//! Rust library.

use ahash::AHashMap;

/// An interned identifier. Equality is a plain integer comparison; the
/// bytes are recovered only for diagnostics or `toString`-style output.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Key(u32);

impl Key {
    /// Sentinel returned by [`Interns::search`] when the text has never been
    /// interned. No real key is ever assigned this value.
    pub const NONE: Key = Key(u32::MAX);

    pub fn is_none(self) -> bool {
        self == Key::NONE
    }

    /// Raw index, exposed for bytecode operand packing (`op.rs`).
    pub fn index(self) -> u32 {
        self.0
    }
}

/// A selection of keys the engine and its built-ins reach for constantly,
/// pre-interned at construction so hot paths never pay a hashmap lookup for
/// them. Mirrors `original_source/key.h`'s list of `extern` well-known keys
/// (`prototype`, `constructor`, `length`, `arguments`, `callee`, ...).
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub prototype: Key,
    pub constructor: Key,
    pub length: Key,
    pub arguments: Key,
    pub callee: Key,
    pub name: Key,
    pub message: Key,
    pub to_string: Key,
    pub value_of: Key,
    pub eval: Key,
    pub value: Key,
    pub writable: Key,
    pub enumerable: Key,
    pub configurable: Key,
    pub get: Key,
    pub set: Key,
    pub global: Key,
    pub index: Key,
    pub input: Key,
    pub last_index: Key,
    pub ignore_case: Key,
    pub multiline: Key,
    pub source: Key,
    pub this: Key,
    pub caller: Key,
}

/// The per-interpreter intern table: a growable arena of owned byte strings
/// plus a reverse lookup map.
pub struct Interns {
    texts: Vec<Box<[u8]>>,
    lookup: AHashMap<Box<[u8]>, Key>,
    pub well_known: WellKnown,
}

impl Interns {
    pub fn new() -> Self {
        let mut interns = Interns { texts: Vec::new(), lookup: AHashMap::new(), well_known: placeholder_well_known() };
        let well_known = WellKnown {
            prototype: interns.make("prototype"),
            constructor: interns.make("constructor"),
            length: interns.make("length"),
            arguments: interns.make("arguments"),
            callee: interns.make("callee"),
            name: interns.make("name"),
            message: interns.make("message"),
            to_string: interns.make("toString"),
            value_of: interns.make("valueOf"),
            eval: interns.make("eval"),
            value: interns.make("value"),
            writable: interns.make("writable"),
            enumerable: interns.make("enumerable"),
            configurable: interns.make("configurable"),
            get: interns.make("get"),
            set: interns.make("set"),
            global: interns.make("global"),
            index: interns.make("index"),
            input: interns.make("input"),
            last_index: interns.make("lastIndex"),
            ignore_case: interns.make("ignoreCase"),
            multiline: interns.make("multiline"),
            source: interns.make("source"),
            this: interns.make("this"),
            caller: interns.make("caller"),
        };
        interns.well_known = well_known;
        interns
    }

    /// `makeWithText`: interns `text`, returning the existing [`Key`] if
    /// already present, else allocating a new one. Always copies the bytes
    /// into the arena (the "copy" flag in `original_source` exists to avoid
    /// copying source text that is guaranteed to outlive the table; since
    /// our table does not assume that about arbitrary callers, we always
    /// copy — the cost is one intern per distinct identifier, not per use).
    pub fn make(&mut self, text: &str) -> Key {
        self.make_bytes(text.as_bytes())
    }

    pub fn make_bytes(&mut self, bytes: &[u8]) -> Key {
        if let Some(&key) = self.lookup.get(bytes) {
            return key;
        }
        let key = Key(self.texts.len() as u32);
        let owned: Box<[u8]> = bytes.into();
        self.texts.push(owned.clone());
        self.lookup.insert(owned, key);
        key
    }

    /// `search`: looks up `text` without inserting; returns [`Key::NONE`] if
    /// absent.
    pub fn search(&self, bytes: &[u8]) -> Key {
        self.lookup.get(bytes).copied().unwrap_or(Key::NONE)
    }

    /// `textOf`: recovers the original bytes for a key.
    pub fn text_of(&self, key: Key) -> &[u8] {
        &self.texts[key.0 as usize]
    }

    pub fn str_of(&self, key: Key) -> &str {
        std::str::from_utf8(self.text_of(key)).expect("interned identifiers are valid UTF-8")
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }
}

impl Default for Interns {
    fn default() -> Self {
        Self::new()
    }
}

// `WellKnown` has no meaningful default; this placeholder is overwritten
// before `Interns::new` returns and is never observed with these values.
fn placeholder_well_known() -> WellKnown {
    let k = Key::NONE;
    WellKnown {
        prototype: k,
        constructor: k,
        length: k,
        arguments: k,
        callee: k,
        name: k,
        message: k,
        to_string: k,
        value_of: k,
        eval: k,
        value: k,
        writable: k,
        enumerable: k,
        configurable: k,
        get: k,
        set: k,
        global: k,
        index: k,
        input: k,
        last_index: k,
        ignore_case: k,
        multiline: k,
        source: k,
        this: k,
        caller: k,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_idempotent() {
        let mut interns = Interns::new();
        let a = interns.make("foo");
        let b = interns.make("foo");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_text_gets_distinct_keys() {
        let mut interns = Interns::new();
        let a = interns.make("foo");
        let b = interns.make("bar");
        assert_ne!(a, b);
    }

    #[test]
    fn key_of_text_of_round_trips() {
        let mut interns = Interns::new();
        let key = interns.make("roundtrip");
        let text = interns.text_of(key).to_vec();
        assert_eq!(interns.search(&text), key);
    }

    #[test]
    fn search_without_insert_returns_none() {
        let interns = Interns::new();
        assert!(interns.search(b"never-interned").is_none());
    }
}
