//! Tokenizer (`spec.md` §4.G), grounded on `original_source/lexer.h`'s
//! token enum and `lexer.c`'s scanning rules.

use crate::chars::Builder as CharsBuilder;
use crate::exception::SourceSpan;
use crate::heap::Heap;
use crate::text::chars;
use crate::value::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    Eof,
    Error,
    Null,
    True,
    False,
    Integer,
    Binary,
    String,
    EscapedString,
    Identifier,
    RegExp,
    // keywords
    Break,
    Case,
    Catch,
    Continue,
    Debugger,
    Default,
    Delete,
    Do,
    Else,
    Finally,
    For,
    Function,
    If,
    In,
    InstanceOf,
    New,
    Return,
    Switch,
    This,
    Throw,
    Try,
    TypeOf,
    Var,
    Void,
    With,
    While,
    // punctuation
    Equal,
    NotEqual,
    Identical,
    NotIdentical,
    LeftShiftAssign,
    RightShiftAssign,
    UnsignedRightShiftAssign,
    LeftShift,
    RightShift,
    UnsignedRightShift,
    LessOrEqual,
    MoreOrEqual,
    Increment,
    Decrement,
    LogicalAnd,
    LogicalOr,
    AddAssign,
    MinusAssign,
    MultiplyAssign,
    DivideAssign,
    ModuloAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    // single-char punctuators are returned as themselves via `Punct(char)`
    Punct(char),
}

/// `io_libecc_lexer_ScanFlags`.
#[derive(Clone, Copy, Default)]
pub struct ScanFlags {
    pub sloppy: bool,
}

pub struct Lexer<'a> {
    src: &'a [u8],
    offset: usize,
    /// The span of the token just returned by `next_token`.
    pub span: SourceSpan,
    /// Populated for `Integer`/`Binary`/`String`/`EscapedString`/
    /// `Identifier` tokens.
    pub value: Option<Value>,
    pub did_line_break: bool,
    pub allow_regex: bool,
    error_message: Option<String>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a [u8]) -> Self {
        Lexer { src, offset: 0, span: SourceSpan::default(), value: None, did_line_break: false, allow_regex: true, error_message: None }
    }

    pub fn take_error(&mut self) -> Option<String> {
        self.error_message.take()
    }

    /// A byte offset that can later be handed to [`Lexer::restore_position`]
    /// to re-scan from there. Used by the parser for the one-token
    /// lookahead needed to tell a labeled statement from a bare
    /// expression statement.
    pub fn clone_position(&self) -> usize {
        self.offset
    }

    pub fn restore_position(&mut self, offset: usize) {
        self.offset = offset;
    }

    fn peek_char(&self) -> Option<(char, usize)> {
        crate::text::Text::new(&self.src[self.offset..]).character()
    }

    fn advance(&mut self) -> Option<char> {
        let (c, width) = self.peek_char()?;
        self.offset += width;
        Some(c)
    }

    fn peek(&self) -> Option<char> {
        self.peek_char().map(|(c, _)| c)
    }

    fn at(&self, offset_from_now: usize) -> Option<char> {
        crate::text::Text::new(self.src.get(self.offset + offset_from_now..)?).character().map(|(c, _)| c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.offset += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        self.did_line_break = false;
        loop {
            match self.peek() {
                Some(c) if chars::is_line_feed(c) => {
                    self.did_line_break = true;
                    self.advance();
                }
                Some(c) if chars::is_space(c) => {
                    self.advance();
                }
                Some('/') if self.at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if chars::is_line_feed(c) {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.at(1) == Some('*') => {
                    self.advance();
                    self.advance();
                    loop {
                        match self.peek() {
                            None => break,
                            Some(c) if chars::is_line_feed(c) => {
                                self.did_line_break = true;
                                self.advance();
                            }
                            Some('*') if self.at(1) == Some('/') => {
                                self.advance();
                                self.advance();
                                break;
                            }
                            Some(_) => {
                                self.advance();
                            }
                        }
                    }
                }
                _ => break,
            }
        }
    }

    /// `nextToken`. `heap` is needed to intern escaped-string/identifier
    /// decode results that must outlive the source buffer.
    pub fn next_token(&mut self, heap: &mut Heap) -> Token {
        self.value = None;
        self.skip_trivia();
        let start = self.offset;
        let Some(c) = self.peek() else {
            self.span = SourceSpan::new(start as u32, start as u32);
            return Token::Eof;
        };
        let tok = if chars::is_digit(c) {
            self.scan_number(heap)
        } else if c == '"' || c == '\'' {
            self.scan_string(heap, c)
        } else if c == '/' && self.allow_regex {
            self.scan_regexp(heap)
        } else if chars::is_ident_start(c) || c == '\\' {
            self.scan_identifier_or_keyword(heap)
        } else {
            self.scan_punctuator()
        };
        self.span = SourceSpan::new(start as u32, self.offset as u32);
        tok
    }

    fn scan_number(&mut self, _heap: &mut Heap) -> Token {
        let start = self.offset;
        if self.peek() == Some('0') && matches!(self.at(1), Some('x') | Some('X')) {
            self.advance();
            self.advance();
            let digits_start = self.offset;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.advance();
            }
            let text = std::str::from_utf8(&self.src[digits_start..self.offset]).unwrap_or("");
            let n = u64::from_str_radix(text, 16).unwrap_or(0) as f64;
            self.value = Some(crate::value::make_number(n));
            return Token::Integer;
        }
        // Legacy octal: a leading 0 followed by only octal digits.
        if self.peek() == Some('0') && self.at(1).is_some_and(|c| ('0'..='7').contains(&c)) {
            let save = self.offset;
            self.advance();
            let digits_start = self.offset;
            while self.peek().is_some_and(|c| ('0'..='7').contains(&c)) {
                self.advance();
            }
            if !self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
                let text = std::str::from_utf8(&self.src[digits_start..self.offset]).unwrap_or("");
                let n = u64::from_str_radix(text, 8).unwrap_or(0) as f64;
                self.value = Some(crate::value::make_number(n));
                return Token::Integer;
            }
            self.offset = save;
        }
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }
        let mut is_float = false;
        if self.peek() == Some('.') {
            is_float = true;
            self.advance();
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let save = self.offset;
            self.advance();
            if matches!(self.peek(), Some('+') | Some('-')) {
                self.advance();
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.advance();
                }
            } else {
                self.offset = save;
            }
        }
        let text = std::str::from_utf8(&self.src[start..self.offset]).unwrap_or("0");
        let n: f64 = text.parse().unwrap_or(f64::NAN);
        self.value = Some(crate::value::make_number(n));
        if is_float { Token::Binary } else { Token::Integer }
    }

    fn scan_string(&mut self, heap: &mut Heap, quote: char) -> Token {
        self.advance(); // opening quote
        let plain_start = self.offset;
        let mut escaped = false;
        let mut builder = CharsBuilder::begin();
        loop {
            match self.peek() {
                None => {
                    self.error_message = Some("unterminated string literal".to_string());
                    return Token::Error;
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some(c) if chars::is_line_feed(c) && c != '\u{2028}' && c != '\u{2029}' => {
                    self.error_message = Some("unterminated string literal".to_string());
                    return Token::Error;
                }
                Some('\\') => {
                    if !escaped {
                        builder.append(std::str::from_utf8(&self.src[plain_start..self.offset]).unwrap_or(""));
                        escaped = true;
                    }
                    self.advance();
                    self.scan_escape(&mut builder);
                }
                Some(c) => {
                    if escaped {
                        builder.append_codepoint(c);
                    }
                    self.advance();
                }
            }
        }
        if escaped {
            self.value = Some(builder.end_append(heap));
            Token::EscapedString
        } else {
            let text = std::str::from_utf8(&self.src[plain_start..self.offset - 1]).unwrap_or("");
            self.value = Some(Value::string(heap, text));
            Token::String
        }
    }

    fn scan_escape(&mut self, builder: &mut CharsBuilder) {
        let Some(c) = self.peek() else { return };
        match c {
            'b' => {
                builder.append_codepoint('\u{8}');
                self.advance();
            }
            'f' => {
                builder.append_codepoint('\u{C}');
                self.advance();
            }
            'n' => {
                builder.append_codepoint('\n');
                self.advance();
            }
            'r' => {
                builder.append_codepoint('\r');
                self.advance();
            }
            't' => {
                builder.append_codepoint('\t');
                self.advance();
            }
            'v' => {
                builder.append_codepoint('\u{B}');
                self.advance();
            }
            'x' => {
                self.advance();
                if let Some(byte) = self.scan_hex_digits(2) {
                    builder.append_codepoint(byte as u8 as char);
                }
            }
            'u' => {
                self.advance();
                if let Some(code) = self.scan_hex_digits(4) {
                    if let Some(ch) = char::from_u32(code) {
                        builder.append_codepoint(ch);
                    }
                }
            }
            '0'..='7' => {
                let mut n = 0u32;
                let mut count = 0;
                while count < 3 && self.peek().is_some_and(|c| ('0'..='7').contains(&c)) {
                    n = n * 8 + (self.peek().unwrap() as u32 - '0' as u32);
                    self.advance();
                    count += 1;
                }
                builder.append_codepoint(char::from_u32(n).unwrap_or('\u{FFFD}'));
            }
            c if chars::is_line_feed(c) => {
                // backslash-newline continuation: swallow, contributes nothing
                self.advance();
            }
            other => {
                builder.append_codepoint(other);
                self.advance();
            }
        }
    }

    fn scan_hex_digits(&mut self, count: usize) -> Option<u32> {
        let start = self.offset;
        for _ in 0..count {
            if !self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.offset = start;
                return None;
            }
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..self.offset]).ok()?;
        u32::from_str_radix(text, 16).ok()
    }

    fn scan_identifier_or_keyword(&mut self, heap: &mut Heap) -> Token {
        let start = self.offset;
        let mut escaped = false;
        let mut builder = CharsBuilder::begin();
        loop {
            match self.peek() {
                Some('\\') if self.at(1) == Some('u') => {
                    if !escaped {
                        builder.append(std::str::from_utf8(&self.src[start..self.offset]).unwrap_or(""));
                        escaped = true;
                    }
                    self.advance();
                    self.advance();
                    if let Some(code) = self.scan_hex_digits(4) {
                        if let Some(ch) = char::from_u32(code) {
                            builder.append_codepoint(ch);
                        }
                    }
                }
                Some(c) if chars::is_ident_part(c) => {
                    if escaped {
                        builder.append_codepoint(c);
                    }
                    self.advance();
                }
                _ => break,
            }
        }
        let text_owned = if escaped {
            let v = builder.end_append(heap);
            String::from_utf8_lossy(v.string_bytes(heap)).into_owned()
        } else {
            String::new()
        };
        let text: &str =
            if escaped { &text_owned } else { std::str::from_utf8(&self.src[start..self.offset]).unwrap_or("") };
        if !escaped {
            if let Some(tok) = keyword(text) {
                return tok;
            }
        }
        self.value = Some(Value::string(heap, text));
        Token::Identifier
    }

    fn scan_regexp(&mut self, heap: &mut Heap) -> Token {
        let start = self.offset;
        self.advance(); // '/'
        let mut in_class = false;
        loop {
            match self.peek() {
                None => {
                    self.error_message = Some("unterminated regular expression literal".to_string());
                    return Token::Error;
                }
                Some(c) if chars::is_line_feed(c) => {
                    self.error_message = Some("unterminated regular expression literal".to_string());
                    return Token::Error;
                }
                Some('\\') => {
                    self.advance();
                    self.advance();
                }
                Some('[') => {
                    in_class = true;
                    self.advance();
                }
                Some(']') => {
                    in_class = false;
                    self.advance();
                }
                Some('/') if !in_class => {
                    self.advance();
                    break;
                }
                Some(_) => {
                    self.advance();
                }
            }
        }
        let body_end = self.offset;
        while self.peek().is_some_and(chars::is_ident_part) {
            self.advance();
        }
        let text = std::str::from_utf8(&self.src[start..body_end]).unwrap_or("//");
        self.value = Some(Value::string(heap, text));
        Token::RegExp
    }

    fn scan_punctuator(&mut self) -> Token {
        let c = self.advance().unwrap();
        match c {
            '=' => {
                if self.eat('=') {
                    if self.eat('=') { Token::Identical } else { Token::Equal }
                } else {
                    Token::Punct('=')
                }
            }
            '!' => {
                if self.eat('=') {
                    if self.eat('=') { Token::NotIdentical } else { Token::NotEqual }
                } else {
                    Token::Punct('!')
                }
            }
            '<' => {
                if self.eat('<') {
                    if self.eat('=') { Token::LeftShiftAssign } else { Token::LeftShift }
                } else if self.eat('=') {
                    Token::LessOrEqual
                } else {
                    Token::Punct('<')
                }
            }
            '>' => {
                if self.eat('>') {
                    if self.eat('>') {
                        if self.eat('=') { Token::UnsignedRightShiftAssign } else { Token::UnsignedRightShift }
                    } else if self.eat('=') {
                        Token::RightShiftAssign
                    } else {
                        Token::RightShift
                    }
                } else if self.eat('=') {
                    Token::MoreOrEqual
                } else {
                    Token::Punct('>')
                }
            }
            '+' => {
                if self.eat('+') {
                    Token::Increment
                } else if self.eat('=') {
                    Token::AddAssign
                } else {
                    Token::Punct('+')
                }
            }
            '-' => {
                if self.eat('-') {
                    Token::Decrement
                } else if self.eat('=') {
                    Token::MinusAssign
                } else {
                    Token::Punct('-')
                }
            }
            '*' => {
                if self.eat('=') {
                    Token::MultiplyAssign
                } else {
                    Token::Punct('*')
                }
            }
            '/' => {
                if self.eat('=') {
                    Token::DivideAssign
                } else {
                    Token::Punct('/')
                }
            }
            '%' => {
                if self.eat('=') {
                    Token::ModuloAssign
                } else {
                    Token::Punct('%')
                }
            }
            '&' => {
                if self.eat('&') {
                    Token::LogicalAnd
                } else if self.eat('=') {
                    Token::AndAssign
                } else {
                    Token::Punct('&')
                }
            }
            '|' => {
                if self.eat('|') {
                    Token::LogicalOr
                } else if self.eat('=') {
                    Token::OrAssign
                } else {
                    Token::Punct('|')
                }
            }
            '^' => {
                if self.eat('=') {
                    Token::XorAssign
                } else {
                    Token::Punct('^')
                }
            }
            other => Token::Punct(other),
        }
    }
}

fn keyword(text: &str) -> Option<Token> {
    Some(match text {
        "null" => Token::Null,
        "true" => Token::True,
        "false" => Token::False,
        "break" => Token::Break,
        "case" => Token::Case,
        "catch" => Token::Catch,
        "continue" => Token::Continue,
        "debugger" => Token::Debugger,
        "default" => Token::Default,
        "delete" => Token::Delete,
        "do" => Token::Do,
        "else" => Token::Else,
        "finally" => Token::Finally,
        "for" => Token::For,
        "function" => Token::Function,
        "if" => Token::If,
        "in" => Token::In,
        "instanceof" => Token::InstanceOf,
        "new" => Token::New,
        "return" => Token::Return,
        "switch" => Token::Switch,
        "this" => Token::This,
        "throw" => Token::Throw,
        "try" => Token::Try,
        "typeof" => Token::TypeOf,
        "var" => Token::Var,
        "void" => Token::Void,
        "with" => Token::With,
        "while" => Token::While,
        _ => return None,
    })
}

/// Reserved-for-future-use words ECMAScript 3 still reserves;
/// encountering one as an identifier is a syntax error
/// (`spec.md` §4.G "future-reserved words ... produce a 'reserved
/// identifier' syntax error").
pub fn is_future_reserved(text: &str) -> bool {
    matches!(
        text,
        "abstract"
            | "boolean"
            | "byte"
            | "char"
            | "class"
            | "const"
            | "double"
            | "enum"
            | "export"
            | "extends"
            | "final"
            | "float"
            | "goto"
            | "implements"
            | "import"
            | "int"
            | "interface"
            | "let"
            | "long"
            | "native"
            | "package"
            | "private"
            | "protected"
            | "public"
            | "short"
            | "static"
            | "super"
            | "synchronized"
            | "throws"
            | "transient"
            | "volatile"
            | "yield"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut heap = Heap::new();
        let mut lexer = Lexer::new(src.as_bytes());
        let mut out = Vec::new();
        loop {
            let t = lexer.next_token(&mut heap);
            if t == Token::Eof {
                break;
            }
            out.push(t);
        }
        out
    }

    #[test]
    fn scans_keywords_and_identifiers() {
        assert_eq!(tokens("var x = function"), vec![
            Token::Var,
            Token::Identifier,
            Token::Punct('='),
            Token::Function,
        ]);
    }

    #[test]
    fn scans_compound_operators() {
        assert_eq!(tokens("a === b !== c <<= 1"), vec![
            Token::Identifier,
            Token::Identical,
            Token::Identifier,
            Token::NotIdentical,
            Token::Identifier,
            Token::LeftShiftAssign,
            Token::Integer,
        ]);
    }

    #[test]
    fn scans_string_escapes() {
        let mut heap = Heap::new();
        let mut lexer = Lexer::new(b"\"a\\nb\"");
        let tok = lexer.next_token(&mut heap);
        assert_eq!(tok, Token::EscapedString);
        assert_eq!(lexer.value.unwrap().string_bytes(&heap), b"a\nb");
    }

    #[test]
    fn scans_hex_and_legacy_octal_integers() {
        let mut heap = Heap::new();
        let mut lexer = Lexer::new(b"0xFF");
        lexer.next_token(&mut heap);
        assert!(matches!(lexer.value, Some(Value::Integer(255))));

        let mut lexer2 = Lexer::new(b"010");
        lexer2.next_token(&mut heap);
        assert!(matches!(lexer2.value, Some(Value::Integer(8))));
    }

    #[test]
    fn distinguishes_division_from_regexp_by_context() {
        let mut heap = Heap::new();
        let mut lexer = Lexer::new(b"/abc/g");
        lexer.allow_regex = true;
        assert_eq!(lexer.next_token(&mut heap), Token::RegExp);
    }
}
