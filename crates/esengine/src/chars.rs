//! The append-only character buffer builder (`spec.md` §3 "Character
//! buffer", §4.C).
//!
//! Used by the lexer to accumulate a string/template literal's decoded
//! text (after escape processing) and by `String.fromCharCode`/string
//! concatenation built-ins. `beginAppend`/`endAppend` bracket a build; the
//! buffer grows by UTF-8-encoding each appended codepoint, then
//! `end_append` hands back the shortest possible `Value` — inline if it
//! fits in seven bytes, a new heap allocation otherwise, exactly like
//! `value::Value::string`, which this delegates to.

use crate::heap::Heap;
use crate::value::Value;

/// A buffer under construction. Never stored in a `Value` directly — only
/// `end_append`'s result is.
pub struct Builder {
    bytes: Vec<u8>,
}

impl Builder {
    /// `beginAppend`.
    pub fn begin() -> Self {
        Builder { bytes: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Builder { bytes: Vec::with_capacity(cap) }
    }

    /// `appendCodepoint`: encodes `c` as UTF-8 and appends it.
    pub fn append_codepoint(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    /// `append`: appends already-encoded UTF-8 text verbatim.
    pub fn append(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
    }

    /// `appendBinary`: appends the decimal rendition of a number, used by
    /// `+=`-style string-number coercion during accumulation.
    pub fn append_binary(&mut self, f: f64) {
        self.append(&crate::value::binary_to_string(f, 10));
    }

    /// `appendValue`: appends another buffer's contents, used when
    /// flattening nested concatenations without a heap round-trip for each
    /// piece.
    pub fn append_value(&mut self, heap: &Heap, value: &Value) {
        self.bytes.extend_from_slice(value.string_bytes(heap));
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `normalizeBinary`: collapses a buffer holding a pure integer
    /// sequence (no sign, no leading zero) back to its `i32` value when
    /// possible, used by the parser to special-case numeric property-key
    /// literals without reparsing the source text. Returns `None` for
    /// anything that isn't a canonical non-negative decimal integer.
    pub fn normalize_binary(&self) -> Option<u32> {
        let s = std::str::from_utf8(&self.bytes).ok()?;
        if s.is_empty() || (s.len() > 1 && s.starts_with('0')) {
            return None;
        }
        s.parse().ok()
    }

    /// `endAppend`: finalizes the buffer into a `Value`, consuming the
    /// builder.
    pub fn end_append(self, heap: &mut Heap) -> Value {
        let s = String::from_utf8_lossy(&self.bytes).into_owned();
        Value::string(heap, &s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_short_and_long_strings() {
        let mut heap = Heap::new();
        let mut b = Builder::begin();
        b.append("hi");
        let v = b.end_append(&mut heap);
        assert_eq!(v.string_bytes(&heap), b"hi");

        let mut b2 = Builder::begin();
        b2.append("a string longer than seven bytes");
        let v2 = b2.end_append(&mut heap);
        assert_eq!(v2.string_bytes(&heap), b"a string longer than seven bytes");
    }

    #[test]
    fn normalize_binary_rejects_leading_zero() {
        let mut b = Builder::begin();
        b.append("042");
        assert_eq!(b.normalize_binary(), None);
        let mut b2 = Builder::begin();
        b2.append("42");
        assert_eq!(b2.normalize_binary(), Some(42));
    }

    #[test]
    fn append_codepoint_handles_non_ascii() {
        let mut heap = Heap::new();
        let mut b = Builder::begin();
        b.append_codepoint('é');
        let v = b.end_append(&mut heap);
        assert_eq!(v.string_bytes(&heap), "é".as_bytes());
    }
}
