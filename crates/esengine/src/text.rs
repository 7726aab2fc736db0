//! Non-owning windows into source bytes (`spec.md` §3 "Text span", §4.A).
//!
//! A [`Text`] never owns the bytes it points at; callers must keep the
//! backing buffer (an [`crate::intern::Interns`] arena entry, an input's
//! source buffer, or a [`crate::chars::Chars`] allocation) alive for at
//! least as long as the `Text` is used. This mirrors `original_source`'s
//! `io_libecc_Text`, which is a raw `(bytes, length)` pair with no
//! lifetime of its own; Rust lets us make that contract explicit with a
//! borrow instead of a bare pointer.

use std::fmt;

/// Flags carried alongside a text span.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct TextFlags(u8);

impl TextFlags {
    /// The span was produced by scanning an escape sequence and does not
    /// correspond byte-for-byte to the source text it was read from (e.g. a
    /// decoded `\uHHHH` identifier).
    pub const REGEXP: TextFlags = TextFlags(1 << 0);
    pub const NEWLINE_BEFORE: TextFlags = TextFlags(1 << 1);
    pub const NEWLINE_AFTER: TextFlags = TextFlags(1 << 2);

    pub const fn empty() -> Self {
        TextFlags(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub const fn union(self, other: Self) -> Self {
        TextFlags(self.0 | other.0)
    }
}

impl std::ops::BitOr for TextFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

/// A borrowed span of bytes plus the flags `spec.md` §4.A requires.
#[derive(Clone, Copy)]
pub struct Text<'a> {
    bytes: &'a [u8],
    pub flags: TextFlags,
}

impl<'a> Text<'a> {
    pub const fn new(bytes: &'a [u8]) -> Self {
        Text { bytes, flags: TextFlags::empty() }
    }

    pub const fn with_flags(bytes: &'a [u8], flags: TextFlags) -> Self {
        Text { bytes, flags }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Decodes the first UTF-8 codepoint of the span, or `None` if empty.
    /// Invalid leading bytes decode as U+FFFD and advance by one byte,
    /// matching the lenient byte-oriented scanning `spec.md` §4.A asks for.
    pub fn character(&self) -> Option<(char, usize)> {
        if self.bytes.is_empty() {
            return None;
        }
        match std::str::from_utf8(self.bytes) {
            Ok(s) => s.chars().next().map(|c| (c, c.len_utf8())),
            Err(e) => {
                let valid = e.valid_up_to();
                if valid > 0 {
                    std::str::from_utf8(&self.bytes[..valid]).ok()?.chars().next().map(|c| (c, c.len_utf8()))
                } else {
                    Some(('\u{FFFD}', 1))
                }
            }
        }
    }

    /// Returns the span advanced past its first codepoint.
    pub fn next(&self) -> Text<'a> {
        match self.character() {
            Some((_, width)) => Text { bytes: &self.bytes[width..], flags: self.flags },
            None => *self,
        }
    }

    pub fn to_str_lossy(&self) -> std::borrow::Cow<'a, str> {
        String::from_utf8_lossy(self.bytes)
    }
}

impl fmt::Debug for Text<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Text({:?})", self.to_str_lossy())
    }
}

/// ASCII-plus-documented-Unicode character predicates (`spec.md` §4.A).
pub mod chars {
    /// ECMAScript whitespace beyond ASCII: NBSP, and the `Zs` category
    /// members commonly hit in practice, plus BOM (treated as whitespace
    /// mid-stream, though `spec.md` §6 says a leading BOM is neither
    /// required nor stripped).
    pub fn is_space(c: char) -> bool {
        matches!(
            c,
            ' ' | '\t'
                | '\u{0B}'
                | '\u{0C}'
                | '\u{A0}'
                | '\u{1680}'
                | '\u{2000}'..='\u{200A}'
                | '\u{202F}'
                | '\u{205F}'
                | '\u{3000}'
                | '\u{FEFF}'
        )
    }

    /// LF, CR, U+2028 (LINE SEPARATOR), U+2029 (PARAGRAPH SEPARATOR) —
    /// `spec.md` §6's recognized line terminators.
    pub fn is_line_feed(c: char) -> bool {
        matches!(c, '\n' | '\r' | '\u{2028}' | '\u{2029}')
    }

    pub fn is_digit(c: char) -> bool {
        c.is_ascii_digit()
    }

    pub fn is_word(c: char) -> bool {
        c.is_alphanumeric() || c == '_'
    }

    pub fn is_ident_start(c: char) -> bool {
        c == '_' || c == '$' || c.is_alphabetic()
    }

    pub fn is_ident_part(c: char) -> bool {
        is_ident_start(c) || c.is_ascii_digit()
    }
}
