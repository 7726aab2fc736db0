//! Recursive-descent parser (`spec.md` §4.I), emitting an [`OpList`] per
//! function directly rather than building an intermediate AST —
//! `original_source/parser.c` interleaves parsing and op-list
//! construction the same way, and `spec.md` §4.H's constant-folding note
//! ("the oplist is executed immediately... and replaced by a single
//! `value` op") only makes sense if ops are emitted as productions
//! reduce, not after a separate tree pass.
//!
//! Scope resolution into integer slots (`spec.md` §4.H
//! "optimizeWithEnvironment") is not implemented — see `op.rs`'s module
//! doc for why; this parser only ever emits the name-based local/member
//! ops.

use crate::bytecode::builder::{Builder, JumpHandle};
use crate::exception::SourceSpan;
use crate::heap::Heap;
use crate::intern::{Interns, Key};
use crate::lexer::{is_future_reserved, Lexer, Token};
use crate::op::{BinOp, Op, OpList, PropEntryKind, UnOp};
use crate::value::Value;
use std::rc::Rc;

#[derive(Debug)]
pub struct ParseError {
    pub message: String,
    pub span: SourceSpan,
}

type PResult<T> = Result<T, ParseError>;

/// Everything a parse produces: the top-level script's op list plus
/// every nested function's, indexed by the `u32` operand of `Op::Function`.
pub struct CompiledProgram {
    pub top_level: Rc<OpList>,
    pub functions: Vec<Rc<OpList>>,
}

pub fn parse_program(src: &str, heap: &mut Heap, interns: &mut Interns, source_name: &str) -> PResult<CompiledProgram> {
    let mut parser = Parser::new(src, heap, interns, source_name);
    parser.advance()?;
    let name: Rc<str> = Rc::from(source_name);
    let mut builder = Builder::new(Rc::clone(&name));
    while parser.token != Token::Eof {
        parser.statement(&mut builder)?;
    }
    builder.emit(Op::ReturnUndefined, parser.span);
    let top_level = Rc::new(builder.build());
    Ok(CompiledProgram { top_level, functions: parser.functions })
}

/// One enclosing loop or switch, tracked while its body is being parsed so
/// `break`/`continue` can be lowered straight to a `Jump` instead of a
/// runtime-resolved op: there's no block structure left once parsing is
/// done, so jump targets have to be worked out now, not by the dispatcher.
/// `break_jumps`/`continue_jumps` are forward-jump placeholders collected
/// as `break`/`continue` statements are parsed inside the body; the
/// enclosing construct patches them once it knows its exit (`break`) and
/// re-test/update point (`continue`).
struct LoopCtx {
    /// Every label attached to this construct (`a: b: while (...) ...`
    /// attaches both).
    labels: Vec<Key>,
    /// `false` for `switch` — it's a valid `break` target but `continue`
    /// must skip past it to find the nearest enclosing loop.
    is_loop: bool,
    break_jumps: Vec<JumpHandle>,
    continue_jumps: Vec<JumpHandle>,
}

struct Parser<'a, 'h> {
    lexer: Lexer<'a>,
    heap: &'h mut Heap,
    interns: &'h mut Interns,
    token: Token,
    span: SourceSpan,
    value: Option<Value>,
    source_name: Rc<str>,
    functions: Vec<Rc<OpList>>,
    /// Innermost-first stack of enclosing loops/switches.
    loop_stack: Vec<LoopCtx>,
    /// Labels recognized by `expression_or_labeled_statement` immediately
    /// before the statement they annotate is parsed; consumed by the next
    /// loop/switch's `push_loop`, or dropped if the labeled statement turns
    /// out not to be one.
    pending_labels: Vec<Key>,
    /// True while re-scanning a switch case body purely to advance the
    /// lexer past it (see `switch_statement`); `break_continue_statement`
    /// still parses the syntax but emits nothing and touches no parser
    /// state, since the scan's ops are discarded and a real second pass
    /// follows.
    scanning: bool,
}

impl<'a, 'h> Parser<'a, 'h> {
    fn new(src: &'a str, heap: &'h mut Heap, interns: &'h mut Interns, source_name: &str) -> Self {
        Parser {
            lexer: Lexer::new(src.as_bytes()),
            heap,
            interns,
            token: Token::Eof,
            span: SourceSpan::default(),
            value: None,
            source_name: Rc::from(source_name),
            functions: Vec::new(),
            loop_stack: Vec::new(),
            pending_labels: Vec::new(),
            scanning: false,
        }
    }

    /// Pushes a fresh loop/switch context, claiming any labels recognized
    /// just before this construct.
    fn push_loop(&mut self, is_loop: bool) {
        let labels = std::mem::take(&mut self.pending_labels);
        self.loop_stack.push(LoopCtx { labels, is_loop, break_jumps: Vec::new(), continue_jumps: Vec::new() });
    }

    fn pop_loop(&mut self) -> LoopCtx {
        self.loop_stack.pop().expect("loop_stack push/pop imbalance")
    }

    /// Finds the `loop_stack` index a `break`/`continue` targets: by label
    /// if given (continue additionally requires `is_loop`, a label on a
    /// `switch` is break-only), else the innermost entry (innermost loop
    /// for continue, since `switch` can't be continued into).
    fn find_loop_target(&self, is_break: bool, label: Option<Key>) -> Option<usize> {
        match label {
            Some(l) => self.loop_stack.iter().rposition(|c| c.labels.contains(&l) && (is_break || c.is_loop)),
            None if is_break => {
                if self.loop_stack.is_empty() {
                    None
                } else {
                    Some(self.loop_stack.len() - 1)
                }
            }
            None => self.loop_stack.iter().rposition(|c| c.is_loop),
        }
    }

    fn advance(&mut self) -> PResult<()> {
        self.lexer.allow_regex = matches!(
            self.token,
            Token::Eof
                | Token::Punct(_)
                | Token::Return
                | Token::Throw
                | Token::Case
                | Token::In
                | Token::InstanceOf
                | Token::New
                | Token::TypeOf
                | Token::Void
                | Token::Delete
        ) && !matches!(self.token, Token::Punct(')') | Token::Punct(']'));
        let tok = self.lexer.next_token(self.heap);
        if tok == Token::Error {
            let msg = self.lexer.take_error().unwrap_or_else(|| "unexpected token".to_string());
            return Err(ParseError { message: msg, span: self.lexer.span });
        }
        self.token = tok;
        self.span = self.lexer.span;
        self.value = self.lexer.value.take();
        Ok(())
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError { message: message.into(), span: self.span }
    }

    fn expect_punct(&mut self, c: char) -> PResult<()> {
        if self.token == Token::Punct(c) {
            self.advance()
        } else {
            Err(self.err(format!("expected '{c}'")))
        }
    }

    fn eat_punct(&mut self, c: char) -> PResult<bool> {
        if self.token == Token::Punct(c) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_identifier(&mut self) -> PResult<Key> {
        if self.token != Token::Identifier {
            return Err(self.err("expected identifier"));
        }
        let bytes = self.value.take().unwrap().string_bytes(self.heap).to_vec();
        let text = String::from_utf8_lossy(&bytes);
        if is_future_reserved(&text) {
            return Err(self.err(format!("'{text}' is a reserved identifier")));
        }
        let key = self.interns.make(&text);
        self.advance()?;
        Ok(key)
    }

    /// Automatic semicolon insertion: consumes a `;` if present, else
    /// accepts end-of-statement at `}`, EOF, or after a line break.
    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat_punct(';')? {
            return Ok(());
        }
        if self.token == Token::Punct('}') || self.token == Token::Eof || self.lexer.did_line_break {
            return Ok(());
        }
        Err(self.err("expected ';'"))
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    fn statement(&mut self, b: &mut Builder) -> PResult<()> {
        match self.token {
            Token::Punct('{') => self.block(b),
            Token::Var => self.var_statement(b),
            Token::If => self.if_statement(b),
            Token::Do => self.do_while_statement(b),
            Token::While => self.while_statement(b),
            Token::For => self.for_statement(b),
            Token::Continue => self.break_continue_statement(b, false),
            Token::Break => self.break_continue_statement(b, true),
            Token::Return => self.return_statement(b),
            Token::With => self.with_statement(b),
            Token::Switch => self.switch_statement(b),
            Token::Throw => self.throw_statement(b),
            Token::Try => self.try_statement(b),
            Token::Function => self.function_declaration(b),
            Token::Debugger => {
                let span = self.span;
                self.advance()?;
                self.consume_semicolon()?;
                b.emit(Op::Debugger, span);
                Ok(())
            }
            Token::Punct(';') => {
                self.advance()?;
                Ok(())
            }
            Token::Identifier => self.expression_or_labeled_statement(b),
            _ => self.expression_statement(b),
        }
    }

    /// `identifier ':' statement` vs. a plain expression statement
    /// starting with an identifier — resolved with a one-token
    /// lookahead by rewinding the lexer to the start of the identifier,
    /// since only this single ambiguity needs backtracking.
    fn expression_or_labeled_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let identifier_start = self.span.start as usize;
        let name = self.expect_identifier()?;
        if self.token == Token::Punct(':') {
            self.advance()?;
            // Queue the label for the statement about to be parsed: if
            // it's a loop/switch, its `push_loop` claims it; otherwise it
            // never gets consumed and is dropped below, matching ES3's
            // "label on anything else is break-only" rule minimally (no
            // jump target is registered for the non-loop case at all).
            self.pending_labels.push(name);
            self.statement(b)?;
            self.pending_labels.clear();
            Ok(())
        } else {
            self.lexer.restore_position(identifier_start);
            self.advance()?;
            self.expression_statement(b)
        }
    }

    fn block(&mut self, b: &mut Builder) -> PResult<()> {
        self.expect_punct('{')?;
        while self.token != Token::Punct('}') {
            if self.token == Token::Eof {
                return Err(self.err("unterminated block"));
            }
            self.statement(b)?;
        }
        self.advance()
    }

    fn var_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        self.var_declarator_list(b, span)?;
        self.consume_semicolon()
    }

    fn var_declarator_list(&mut self, b: &mut Builder, span: SourceSpan) -> PResult<()> {
        loop {
            let name = self.expect_identifier()?;
            b.add_var_name(name);
            if self.eat_punct('=')? {
                self.assignment_expr(b)?;
                b.emit(Op::SetLocal(name), span);
                b.emit(Op::Pop, span);
            }
            if !self.eat_punct(',')? {
                break;
            }
        }
        Ok(())
    }

    fn if_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        self.expect_punct('(')?;
        self.expression(b)?;
        self.expect_punct(')')?;
        let else_jump = b.emit_jump_if_false(span);
        self.statement(b)?;
        if self.token == Token::Else {
            let end_jump = b.emit_jump(span);
            b.patch_jump(else_jump);
            self.advance()?;
            self.statement(b)?;
            b.patch_jump(end_jump);
        } else {
            b.patch_jump(else_jump);
        }
        Ok(())
    }

    fn do_while_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        let top = b.position();
        self.push_loop(true);
        self.statement(b)?;
        let ctx = self.pop_loop();
        // `continue` re-enters right before the condition is (re)tested,
        // a position only known now that the body's been parsed.
        let continue_target = b.position();
        patch_all(b, ctx.continue_jumps, continue_target);
        if self.token != Token::While {
            return Err(self.err("expected 'while'"));
        }
        self.advance()?;
        self.expect_punct('(')?;
        self.expression(b)?;
        self.expect_punct(')')?;
        self.consume_semicolon()?;
        b.emit(Op::JumpIfTrue(top), span);
        let end = b.position();
        patch_all(b, ctx.break_jumps, end);
        Ok(())
    }

    fn while_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        self.expect_punct('(')?;
        let top = b.position();
        self.expression(b)?;
        self.expect_punct(')')?;
        let exit = b.emit_jump_if_false(span);
        self.push_loop(true);
        self.statement(b)?;
        let ctx = self.pop_loop();
        // `continue` re-tests the condition, same as the natural loop-back.
        patch_all(b, ctx.continue_jumps, top);
        b.emit(Op::Jump(top), span);
        b.patch_jump(exit);
        let end = b.position();
        patch_all(b, ctx.break_jumps, end);
        Ok(())
    }

    fn for_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        self.expect_punct('(')?;
        let is_var = self.token == Token::Var;
        if is_var {
            self.advance()?;
        }
        // `for (var? name in expr)` vs. the three-clause C-style form:
        // both start with a name, so peek for `in` after one declarator.
        if self.token == Token::Identifier {
            let checkpoint = self.lexer.clone_position();
            let name = self.expect_identifier()?;
            if is_var {
                b.add_var_name(name);
            }
            if self.token == Token::In {
                self.advance()?;
                self.for_in_body(b, span, name)?;
                return Ok(());
            }
            self.lexer.restore_position(checkpoint);
            self.advance()?;
        }
        if is_var {
            self.var_declarator_list(b, span)?;
        } else if self.token != Token::Punct(';') {
            self.expression_statement_no_semi(b)?;
        }
        self.expect_punct(';')?;
        let top = b.position();
        let exit = if self.token != Token::Punct(';') {
            self.expression(b)?;
            Some(b.emit_jump_if_false(span))
        } else {
            None
        };
        self.expect_punct(';')?;
        // The update clause is parsed now but must run *after* the body;
        // stash its ops by parsing into a scratch builder and splicing.
        let update_ops = if self.token != Token::Punct(')') {
            Some(self.parse_scratch_expression(span)?)
        } else {
            None
        };
        self.expect_punct(')')?;
        self.push_loop(true);
        self.statement(b)?;
        let ctx = self.pop_loop();
        // `continue` runs the update clause and re-tests, same as falling
        // off the end of the body normally.
        let continue_target = b.position();
        patch_all(b, ctx.continue_jumps, continue_target);
        if let Some(ops) = update_ops {
            splice(b, ops);
        }
        b.emit(Op::Jump(top), span);
        if let Some(exit) = exit {
            b.patch_jump(exit);
        }
        let end = b.position();
        patch_all(b, ctx.break_jumps, end);
        Ok(())
    }

    fn for_in_body(&mut self, b: &mut Builder, span: SourceSpan, name: Key) -> PResult<()> {
        self.expression(b)?;
        self.expect_punct(')')?;
        // Evaluate the object once (`ForInEnter` snapshots its enumerable
        // keys), then loop: `ForInNext` pulls one key per pass or jumps to
        // `exit` once exhausted.
        b.emit(Op::ForInEnter, span);
        let top = b.position();
        let exit = b.emit_for_in_next(span);
        b.emit(Op::SetLocal(name), span);
        b.emit(Op::Pop, span);
        self.push_loop(true);
        self.statement(b)?;
        let ctx = self.pop_loop();
        // `continue` pulls the next key, same as `top`.
        patch_all(b, ctx.continue_jumps, top);
        b.emit(Op::Jump(top), span);
        b.patch_jump(exit);
        let end = b.position();
        patch_all(b, ctx.break_jumps, end);
        Ok(())
    }

    /// Parses one expression into a standalone scratch `OpList`'s worth
    /// of ops (same source name, discarded metadata) so the `for`
    /// update-clause can be emitted after the loop body.
    fn parse_scratch_expression(&mut self, _span: SourceSpan) -> PResult<Vec<Op>> {
        let mut scratch = Builder::new(Rc::clone(&self.source_name));
        self.expression(&mut scratch)?;
        let list = scratch.build();
        Ok(list.ops)
    }

    fn expression_statement_no_semi(&mut self, b: &mut Builder) -> PResult<()> {
        self.expression(b)?;
        b.emit(Op::Pop, self.span);
        Ok(())
    }

    /// Resolved entirely here, not at runtime: `break`/`continue` become a
    /// plain forward `Jump`, collected on the matching [`LoopCtx`] and
    /// patched by the enclosing construct once its exit (`break`) or
    /// re-test point (`continue`) is known. During a switch's scan pass
    /// (see `switch_statement`) the syntax is still consumed but nothing
    /// is emitted and `loop_stack` is left untouched, since the scan's own
    /// ops are thrown away and a real second pass follows.
    fn break_continue_statement(&mut self, b: &mut Builder, is_break: bool) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        let label = if self.token == Token::Identifier && !self.lexer.did_line_break {
            Some(self.expect_identifier()?)
        } else {
            None
        };
        self.consume_semicolon()?;
        if self.scanning {
            return Ok(());
        }
        let idx = self.find_loop_target(is_break, label).ok_or_else(|| {
            self.err(if is_break { "illegal break statement" } else { "illegal continue statement" })
        })?;
        let jump = b.emit_jump(span);
        if is_break {
            self.loop_stack[idx].break_jumps.push(jump);
        } else {
            self.loop_stack[idx].continue_jumps.push(jump);
        }
        Ok(())
    }

    fn return_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        if self.token == Token::Punct(';') || self.token == Token::Punct('}') || self.lexer.did_line_break || self.token == Token::Eof {
            self.consume_semicolon()?;
            b.emit(Op::ReturnUndefined, span);
        } else {
            self.expression(b)?;
            self.consume_semicolon()?;
            b.emit(Op::Return, span);
        }
        Ok(())
    }

    fn with_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        self.expect_punct('(')?;
        self.expression(b)?;
        self.expect_punct(')')?;
        b.emit(Op::With, span);
        self.statement(b)?;
        b.emit(Op::PopWith, span);
        Ok(())
    }

    /// Lowered as a chain of strict-equality tests against the switch
    /// value (kept on the stack via `Dup` through the whole dispatch
    /// chain and every case body, popped once at the end), rather than
    /// the spec's dedicated jump-table op — equivalent semantics, one
    /// fewer op kind for the dispatcher to special-case.
    ///
    /// The dispatch chain must precede every body, but case bodies can
    /// contain arbitrary statements — nested loops, `break`/`continue`
    /// of their own — whose jump targets can only be expressed directly
    /// in `b`'s coordinate space, so splicing a separately-parsed body
    /// back in (rebasing every jump it contains) isn't workable. Instead
    /// this does two passes over the token stream: the first parses only
    /// the case tests for real (pure expressions, no jumps possible) and
    /// scans over each body into a throwaway builder just to advance the
    /// lexer, remembering where the body started; the second pass emits
    /// the real dispatch chain into `b`, then rewinds the lexer to each
    /// remembered checkpoint and parses the body again, this time for
    /// real, directly into `b` at its final position.
    fn switch_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        self.expect_punct('(')?;
        self.expression(b)?;
        self.expect_punct(')')?;
        self.expect_punct('{')?;

        struct Clause {
            test: Option<Vec<Op>>,
            body_checkpoint: usize,
        }
        let mut clauses: Vec<Clause> = Vec::new();
        let mut default_seen = false;
        let was_scanning = self.scanning;
        while self.token != Token::Punct('}') {
            let test = if self.token == Token::Default {
                if default_seen {
                    return Err(self.err("multiple default clauses in switch"));
                }
                default_seen = true;
                self.advance()?;
                self.expect_punct(':')?;
                None
            } else if self.token == Token::Case {
                self.advance()?;
                let mut scratch = Builder::new(Rc::clone(&self.source_name));
                self.expression(&mut scratch)?;
                self.expect_punct(':')?;
                Some(scratch.build().ops)
            } else {
                return Err(self.err("expected 'case' or 'default'"));
            };
            let body_checkpoint = self.lexer.clone_position();
            let mut throwaway = Builder::new(Rc::clone(&self.source_name));
            self.scanning = true;
            while !matches!(self.token, Token::Case | Token::Default | Token::Punct('}')) {
                self.statement(&mut throwaway)?;
            }
            self.scanning = was_scanning;
            clauses.push(Clause { test, body_checkpoint });
        }
        // Not consumed here: the second pass below re-parses the last
        // clause's body from a rewound lexer position and will walk back
        // up to this same `}`, which is consumed once at the end.

        let mut body_jumps: Vec<JumpHandle> = Vec::new();
        for clause in &clauses {
            if let Some(test_ops) = &clause.test {
                b.emit(Op::Dup, span);
                splice(b, test_ops.clone());
                b.emit(Op::Binary(BinOp::StrictEqual), span);
                body_jumps.push(b.emit_jump_if_true(span));
            }
        }
        let fallthrough_jump = b.emit_jump(span);

        self.push_loop(false);
        let mut body_jumps = body_jumps.into_iter();
        let mut default_body_pos = None;
        for clause in &clauses {
            let pos = b.position();
            if clause.test.is_some() {
                b.patch_jump_to(body_jumps.next().expect("one jump per case test"), pos);
            } else {
                default_body_pos = Some(pos);
            }
            self.lexer.restore_position(clause.body_checkpoint);
            self.advance()?;
            while !matches!(self.token, Token::Case | Token::Default | Token::Punct('}')) {
                self.statement(b)?;
            }
        }
        self.expect_punct('}')?;
        let ctx = self.pop_loop();
        match default_body_pos {
            Some(pos) => b.patch_jump_to(fallthrough_jump, pos),
            None => b.patch_jump(fallthrough_jump),
        }
        b.emit(Op::Pop, span);
        let end = b.position();
        patch_all(b, ctx.break_jumps, end);
        debug_assert!(ctx.continue_jumps.is_empty(), "continue can't target a switch");
        Ok(())
    }

    fn throw_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        if self.lexer.did_line_break {
            return Err(self.err("illegal newline after 'throw'"));
        }
        self.expression(b)?;
        self.consume_semicolon()?;
        b.emit(Op::Throw, span);
        Ok(())
    }

    fn try_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        let try_marker = b.emit(Op::Try { catch_target: u32::MAX, catch_name: None, finally_target: u32::MAX }, span);
        self.block(b)?;
        b.emit(Op::PopHandler, span);
        let after_try = b.emit_jump(span);
        let mut catch_name = None;
        let catch_target = if self.token == Token::Catch {
            self.advance()?;
            self.expect_punct('(')?;
            catch_name = Some(self.expect_identifier()?);
            self.expect_punct(')')?;
            let target = b.position();
            self.block(b)?;
            b.emit(Op::PopHandler, span);
            target
        } else {
            u32::MAX
        };
        b.patch_jump(after_try);
        let finally_target = if self.token == Token::Finally {
            self.advance()?;
            let target = b.position();
            self.block(b)?;
            b.emit(Op::EndFinally, span);
            target
        } else {
            u32::MAX
        };
        if catch_target == u32::MAX && finally_target == u32::MAX {
            return Err(self.err("try requires at least a catch or finally block"));
        }
        if let Op::Try { catch_target: ct, catch_name: cn, finally_target: ft } = &mut b.ops_mut()[try_marker as usize] {
            *ct = catch_target;
            *cn = catch_name;
            *ft = finally_target;
        }
        Ok(())
    }

    fn function_declaration(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        let name = self.expect_identifier()?;
        let index = self.function_body(Some(name))?;
        b.add_function_name(name);
        b.emit(Op::Function(index), span);
        b.emit(Op::SetLocal(name), span);
        b.emit(Op::Pop, span);
        Ok(())
    }

    /// Parses `(params) { body }` for both declarations and expressions,
    /// registers the compiled `OpList` in `self.functions`, and returns
    /// its index.
    fn function_body(&mut self, name: Option<Key>) -> PResult<u32> {
        self.expect_punct('(')?;
        let mut params = Vec::new();
        while self.token != Token::Punct(')') {
            params.push(self.expect_identifier()?);
            if !self.eat_punct(',')? {
                break;
            }
        }
        self.expect_punct(')')?;
        let mut fb = Builder::new(Rc::clone(&self.source_name));
        fb.set_params(params);
        fb.set_name(name);
        self.expect_punct('{')?;
        while self.token != Token::Punct('}') {
            if self.token == Token::Eof {
                return Err(self.err("unterminated function body"));
            }
            self.statement(&mut fb)?;
        }
        self.advance()?;
        fb.emit(Op::ReturnUndefined, self.span);
        let index = self.functions.len() as u32;
        self.functions.push(Rc::new(fb.build()));
        Ok(index)
    }

    fn expression_statement(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.expression(b)?;
        self.consume_semicolon()?;
        b.emit(Op::ExpressionStatement, span);
        b.emit(Op::AutoreleaseExpression, span);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Expressions (precedence climbing)
    // ---------------------------------------------------------------

    /// The comma operator.
    fn expression(&mut self, b: &mut Builder) -> PResult<()> {
        self.assignment_expr(b)?;
        while self.eat_punct(',')? {
            b.emit(Op::Pop, self.span);
            self.assignment_expr(b)?;
        }
        Ok(())
    }

    /// `target (op)= rhs`. `conditional_expr` above has already emitted
    /// `target` as a completed *read* (ending in `GetLocal`/
    /// `GetProperty`/`GetMember`); assignment pops that trailing read op
    /// back off and re-emits the equivalent write, re-reading first when
    /// the assignment is compound (`+=` and friends) so the target's
    /// own sub-expressions (the object, the computed key) are evaluated
    /// exactly once either way.
    fn assignment_expr(&mut self, b: &mut Builder) -> PResult<()> {
        self.conditional_expr(b)?;
        let compound = match self.token {
            Token::Punct('=') => Some(None),
            Token::AddAssign => Some(Some(BinOp::Add)),
            Token::MinusAssign => Some(Some(BinOp::Sub)),
            Token::MultiplyAssign => Some(Some(BinOp::Mul)),
            Token::DivideAssign => Some(Some(BinOp::Div)),
            Token::ModuloAssign => Some(Some(BinOp::Mod)),
            Token::AndAssign => Some(Some(BinOp::BitAnd)),
            Token::OrAssign => Some(Some(BinOp::BitOr)),
            Token::XorAssign => Some(Some(BinOp::BitXor)),
            Token::LeftShiftAssign => Some(Some(BinOp::ShiftLeft)),
            Token::RightShiftAssign => Some(Some(BinOp::ShiftRight)),
            Token::UnsignedRightShiftAssign => Some(Some(BinOp::ShiftRightUnsigned)),
            _ => None,
        };
        let Some(op) = compound else { return Ok(()) };
        let span = self.span;
        self.advance()?;
        let (last_op, last_span) = b.pop_last().ok_or_else(|| self.err("invalid assignment target"))?;
        match last_op {
            Op::GetLocal(key) => {
                if let Some(bin) = op {
                    b.emit(Op::GetLocal(key), last_span);
                    self.assignment_expr(b)?;
                    b.emit(Op::Binary(bin), span);
                } else {
                    self.assignment_expr(b)?;
                }
                b.emit(Op::SetLocal(key), span);
            }
            Op::GetProperty(key) => {
                // stack: [...object]
                if let Some(bin) = op {
                    b.emit(Op::Dup, last_span);
                    b.emit(Op::GetProperty(key), last_span);
                    self.assignment_expr(b)?;
                    b.emit(Op::Binary(bin), span);
                } else {
                    self.assignment_expr(b)?;
                }
                b.emit(Op::SetProperty(key), span);
            }
            Op::GetMember => {
                // stack: [...object, key]
                if let Some(bin) = op {
                    b.emit(Op::Dup2, last_span);
                    b.emit(Op::GetMember, last_span);
                    self.assignment_expr(b)?;
                    b.emit(Op::Binary(bin), span);
                } else {
                    self.assignment_expr(b)?;
                }
                b.emit(Op::SetMember, span);
            }
            _ => return Err(self.err("invalid assignment target")),
        }
        Ok(())
    }

    fn conditional_expr(&mut self, b: &mut Builder) -> PResult<()> {
        self.binary_expr(b, 0)?;
        if self.eat_punct('?')? {
            let span = self.span;
            let else_jump = b.emit_jump_if_false(span);
            self.assignment_expr(b)?;
            let end_jump = b.emit_jump(span);
            b.patch_jump(else_jump);
            self.expect_punct(':')?;
            self.assignment_expr(b)?;
            b.patch_jump(end_jump);
        }
        Ok(())
    }

    /// `spec.md` §4.I's `noIn` flag (suppressing `in` as an operator
    /// inside a `for(...;;...)` initializer) is not threaded through
    /// here: the `for` statement already routes its initializer through
    /// `var_declarator_list`/`expression_statement_no_semi` before
    /// checking for its own `in` keyword, so the only case this would
    /// affect is a non-`var` initializer that is itself an `in`
    /// expression (`for (a = b in c; ...)`), a corner case accepted as a
    /// simplification (`DESIGN.md`).
    fn binary_op_for(&self) -> Option<(BinOp, u8)> {
        Some(match self.token {
            Token::LogicalOr => return None, // handled separately for short-circuit
            Token::LogicalAnd => return None,
            Token::Punct('|') => (BinOp::BitOr, 4),
            Token::Punct('^') => (BinOp::BitXor, 5),
            Token::Punct('&') => (BinOp::BitAnd, 6),
            Token::Equal => (BinOp::Equal, 7),
            Token::NotEqual => (BinOp::NotEqual, 7),
            Token::Identical => (BinOp::StrictEqual, 7),
            Token::NotIdentical => (BinOp::StrictNotEqual, 7),
            Token::Punct('<') => (BinOp::Less, 8),
            Token::Punct('>') => (BinOp::More, 8),
            Token::LessOrEqual => (BinOp::LessOrEqual, 8),
            Token::MoreOrEqual => (BinOp::MoreOrEqual, 8),
            Token::InstanceOf => (BinOp::InstanceOf, 8),
            Token::In => (BinOp::In, 8),
            Token::LeftShift => (BinOp::ShiftLeft, 9),
            Token::RightShift => (BinOp::ShiftRight, 9),
            Token::UnsignedRightShift => (BinOp::ShiftRightUnsigned, 9),
            Token::Punct('+') => (BinOp::Add, 10),
            Token::Punct('-') => (BinOp::Sub, 10),
            Token::Punct('*') => (BinOp::Mul, 11),
            Token::Punct('/') => (BinOp::Div, 11),
            Token::Punct('%') => (BinOp::Mod, 11),
            _ => return None,
        })
    }

    /// Precedence climbing over the non-short-circuit binary operators;
    /// `&&`/`||` are threaded through separately since they need to emit
    /// a jump rather than always evaluating both sides.
    fn binary_expr(&mut self, b: &mut Builder, min_prec: u8) -> PResult<()> {
        self.logical_or_expr(b, min_prec)
    }

    fn logical_or_expr(&mut self, b: &mut Builder, min_prec: u8) -> PResult<()> {
        self.logical_and_expr(b, min_prec)?;
        while self.token == Token::LogicalOr {
            let span = self.span;
            self.advance()?;
            let jump = b.emit_logical_jump(true, span);
            self.logical_and_expr(b, min_prec)?;
            b.patch_jump(jump);
        }
        Ok(())
    }

    fn logical_and_expr(&mut self, b: &mut Builder, min_prec: u8) -> PResult<()> {
        self.precedence_expr(b, min_prec.max(1))?;
        while self.token == Token::LogicalAnd {
            let span = self.span;
            self.advance()?;
            let jump = b.emit_logical_jump(false, span);
            self.precedence_expr(b, min_prec.max(1))?;
            b.patch_jump(jump);
        }
        Ok(())
    }

    fn precedence_expr(&mut self, b: &mut Builder, min_prec: u8) -> PResult<()> {
        self.unary_expr(b)?;
        loop {
            let Some((op, prec)) = self.binary_op_for() else { break };
            if prec < min_prec {
                break;
            }
            let span = self.span;
            self.advance()?;
            self.precedence_expr(b, prec + 1)?;
            b.emit(Op::Binary(op), span);
        }
        Ok(())
    }

    fn unary_expr(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        match self.token {
            Token::Punct('!') => {
                self.advance()?;
                self.unary_expr(b)?;
                b.emit(Op::Unary(UnOp::Not), span);
            }
            Token::Punct('~') => {
                self.advance()?;
                self.unary_expr(b)?;
                b.emit(Op::Unary(UnOp::BitNot), span);
            }
            Token::Punct('+') => {
                self.advance()?;
                self.unary_expr(b)?;
                b.emit(Op::Unary(UnOp::Plus), span);
            }
            Token::Punct('-') => {
                self.advance()?;
                self.unary_expr(b)?;
                b.emit(Op::Unary(UnOp::Negate), span);
            }
            Token::TypeOf => {
                self.advance()?;
                self.unary_expr(b)?;
                b.emit(Op::Typeof, span);
            }
            Token::Void => {
                self.advance()?;
                self.unary_expr(b)?;
                b.emit(Op::Unary(UnOp::Void), span);
            }
            Token::Delete => {
                self.advance()?;
                self.unary_expr(b)?;
                self.emit_delete(b)?;
            }
            Token::Increment => {
                self.advance()?;
                self.unary_expr(b)?;
                self.emit_update(b, span, BinOp::Add, false)?;
            }
            Token::Decrement => {
                self.advance()?;
                self.unary_expr(b)?;
                self.emit_update(b, span, BinOp::Sub, false)?;
            }
            _ => self.postfix_expr(b)?,
        }
        Ok(())
    }

    fn postfix_expr(&mut self, b: &mut Builder) -> PResult<()> {
        self.call_expr(b)?;
        if !self.lexer.did_line_break {
            match self.token {
                Token::Increment => {
                    let span = self.span;
                    self.advance()?;
                    self.emit_update(b, span, BinOp::Add, true)?;
                }
                Token::Decrement => {
                    let span = self.span;
                    self.advance()?;
                    self.emit_update(b, span, BinOp::Sub, true)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Lowers `delete target` against the just-emitted target read,
    /// replacing it with `DeleteLocal`/`DeleteProperty`/`DeleteMember`.
    /// `delete` of anything else (a literal, a call result) is invalid;
    /// ES3 sloppy mode tolerates this as a no-op returning `true`, which we
    /// mirror by just dropping the already-evaluated value.
    fn emit_delete(&mut self, b: &mut Builder) -> PResult<()> {
        let Some((last_op, last_span)) = b.pop_last() else {
            b.emit(Op::Value(Value::Boolean(true)), self.span);
            return Ok(());
        };
        match last_op {
            Op::GetLocal(key) => b.emit(Op::DeleteLocal(key), last_span),
            Op::GetProperty(key) => b.emit(Op::DeleteProperty(key), last_span),
            Op::GetMember => b.emit(Op::DeleteMember, last_span),
            other => {
                b.emit(other, last_span);
                b.emit(Op::Pop, last_span);
                b.emit(Op::Value(Value::Boolean(true)), last_span)
            }
        };
        Ok(())
    }

    /// Lowers `++`/`--` (prefix or postfix) against the just-emitted
    /// target read, the same way [`Self::assignment_expr`] lowers
    /// compound assignment. Prefix leaves the updated value on the
    /// stack; postfix stashes the pre-update value in a synthetic local
    /// (declared and consumed immediately, so it can never collide with
    /// a nested increment/decrement) and restores it as the result.
    fn emit_update(&mut self, b: &mut Builder, span: crate::exception::SourceSpan, op: BinOp, postfix: bool) -> PResult<()> {
        let (last_op, last_span) = b.pop_last().ok_or_else(|| self.err("invalid increment/decrement target"))?;
        let tmp = if postfix { Some(self.interns.make("@@incdec")) } else { None };
        match last_op {
            Op::GetLocal(key) => {
                b.emit(Op::GetLocal(key), last_span);
                if let Some(tmp) = tmp {
                    b.emit(Op::CreateLocal(tmp), span);
                    b.emit(Op::SetLocal(tmp), span);
                }
                b.emit(Op::Value(Value::Integer(1)), span);
                b.emit(Op::Binary(op), span);
                b.emit(Op::SetLocal(key), span);
            }
            Op::GetProperty(key) => {
                b.emit(Op::Dup, last_span);
                b.emit(Op::GetProperty(key), last_span);
                if let Some(tmp) = tmp {
                    b.emit(Op::CreateLocal(tmp), span);
                    b.emit(Op::SetLocal(tmp), span);
                }
                b.emit(Op::Value(Value::Integer(1)), span);
                b.emit(Op::Binary(op), span);
                b.emit(Op::SetProperty(key), span);
            }
            Op::GetMember => {
                b.emit(Op::Dup2, last_span);
                b.emit(Op::GetMember, last_span);
                if let Some(tmp) = tmp {
                    b.emit(Op::CreateLocal(tmp), span);
                    b.emit(Op::SetLocal(tmp), span);
                }
                b.emit(Op::Value(Value::Integer(1)), span);
                b.emit(Op::Binary(op), span);
                b.emit(Op::SetMember, span);
            }
            _ => return Err(self.err("invalid increment/decrement target")),
        }
        if let Some(tmp) = tmp {
            b.emit(Op::Pop, span);
            b.emit(Op::GetLocal(tmp), span);
        }
        Ok(())
    }

    fn call_expr(&mut self, b: &mut Builder) -> PResult<()> {
        self.member_or_new_expr(b)?;
        loop {
            match self.token {
                Token::Punct('(') => {
                    let span = self.span;
                    // A call immediately following `.key`/`[key]` must keep
                    // the receiver alive for `this` (`spec.md` §4.H): undo
                    // the plain read just emitted and lower to the
                    // receiver-preserving `CallProperty`/`CallMember`
                    // instead, the same "pop the last read, re-lower it"
                    // trick `assignment_expr`/`emit_update` use. A bare
                    // `eval(...)` similarly needs its own op so the callee
                    // can run against the caller's own scope.
                    match b.pop_last() {
                        Some((Op::GetProperty(key), _)) => {
                            let argc = self.argument_list(b)?;
                            b.emit(Op::CallProperty { key, argc }, span);
                        }
                        Some((Op::GetMember, _)) => {
                            let argc = self.argument_list(b)?;
                            b.emit(Op::CallMember(argc), span);
                        }
                        Some((Op::GetLocal(key), last_span)) if self.interns.str_of(key) == "eval" => {
                            b.emit(Op::GetLocal(key), last_span);
                            let argc = self.argument_list(b)?;
                            b.emit(Op::Eval(argc), span);
                        }
                        Some((other, last_span)) => {
                            b.emit(other, last_span);
                            let argc = self.argument_list(b)?;
                            b.emit(Op::Call(argc), span);
                        }
                        None => {
                            let argc = self.argument_list(b)?;
                            b.emit(Op::Call(argc), span);
                        }
                    }
                }
                Token::Punct('.') => {
                    let span = self.span;
                    self.advance()?;
                    let key = self.expect_identifier()?;
                    b.emit(Op::GetProperty(key), span);
                }
                Token::Punct('[') => {
                    let span = self.span;
                    self.advance()?;
                    self.expression(b)?;
                    self.expect_punct(']')?;
                    b.emit(Op::GetMember, span);
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn member_or_new_expr(&mut self, b: &mut Builder) -> PResult<()> {
        if self.token == Token::New {
            let span = self.span;
            self.advance()?;
            self.member_or_new_expr(b)?;
            let argc = if self.token == Token::Punct('(') { self.argument_list(b)? } else { 0 };
            b.emit(Op::Construct(argc), span);
            // `new` binds tighter than call on the result: allow trailing
            // member/call to continue attaching in `call_expr`'s loop.
            return Ok(());
        }
        self.primary_expr(b)?;
        loop {
            match self.token {
                Token::Punct('.') => {
                    let span = self.span;
                    self.advance()?;
                    let key = self.expect_identifier()?;
                    b.emit(Op::GetProperty(key), span);
                }
                Token::Punct('[') => {
                    let span = self.span;
                    self.advance()?;
                    self.expression(b)?;
                    self.expect_punct(']')?;
                    b.emit(Op::GetMember, span);
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn argument_list(&mut self, b: &mut Builder) -> PResult<u32> {
        self.expect_punct('(')?;
        let mut count = 0u32;
        while self.token != Token::Punct(')') {
            self.assignment_expr(b)?;
            count += 1;
            if !self.eat_punct(',')? {
                break;
            }
        }
        self.expect_punct(')')?;
        Ok(count)
    }

    fn primary_expr(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        match self.token {
            Token::This => {
                self.advance()?;
                b.emit(Op::This, span);
            }
            Token::Null => {
                self.advance()?;
                b.emit(Op::Value(Value::Null), span);
            }
            Token::True => {
                self.advance()?;
                b.emit(Op::Value(Value::Boolean(true)), span);
            }
            Token::False => {
                self.advance()?;
                b.emit(Op::Value(Value::Boolean(false)), span);
            }
            Token::Integer | Token::Binary => {
                let v = self.value.take().unwrap_or(Value::Integer(0));
                self.advance()?;
                b.emit(Op::Value(v), span);
            }
            Token::String | Token::EscapedString => {
                let v = self.value.take().unwrap_or(Value::Undefined);
                self.advance()?;
                b.emit(Op::Value(v), span);
            }
            Token::RegExp => {
                let v = self.value.take().unwrap();
                let bytes = v.string_bytes(self.heap).to_vec();
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.advance()?;
                let (source, flags) = split_regexp_literal(&text);
                b.emit(Op::RegExp { source: source.into(), flags: flags.into() }, span);
            }
            Token::Identifier => {
                let key = self.expect_identifier()?;
                b.emit(Op::GetLocal(key), span);
            }
            Token::Function => {
                self.advance()?;
                let name = if self.token == Token::Identifier { Some(self.expect_identifier()?) } else { None };
                let index = self.function_body(name)?;
                b.emit(Op::Function(index), span);
            }
            Token::Punct('(') => {
                self.advance()?;
                self.expression(b)?;
                self.expect_punct(')')?;
            }
            Token::Punct('[') => self.array_literal(b)?,
            Token::Punct('{') => self.object_literal(b)?,
            _ => return Err(self.err("unexpected token in expression")),
        }
        Ok(())
    }

    fn array_literal(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        let mut count = 0u32;
        while self.token != Token::Punct(']') {
            if self.token == Token::Punct(',') {
                b.emit(Op::Value(Value::Undefined), span);
            } else {
                self.assignment_expr(b)?;
            }
            count += 1;
            if !self.eat_punct(',')? {
                break;
            }
        }
        self.expect_punct(']')?;
        b.emit(Op::Array(count), span);
        Ok(())
    }

    fn object_literal(&mut self, b: &mut Builder) -> PResult<()> {
        let span = self.span;
        self.advance()?;
        let mut kinds = Vec::new();
        while self.token != Token::Punct('}') {
            if let Some(kind) = self.try_accessor_entry(b, span)? {
                kinds.push(kind);
            } else {
                let key = self.property_key()?;
                self.expect_punct(':')?;
                b.emit(Op::Value(Value::Key(key)), span);
                self.assignment_expr(b)?;
                kinds.push(PropEntryKind::Data);
            }
            if !self.eat_punct(',')? {
                break;
            }
        }
        self.expect_punct('}')?;
        b.emit(Op::Object(Rc::from(kinds)), span);
        Ok(())
    }

    /// `get`/`set` are ordinary identifiers in ES3, not reserved words, so
    /// `{ get: 1 }` must still parse as a data property named `"get"` —
    /// only `get NAME(...) { ... }` (the identifier immediately followed by
    /// another property-key token, with no `:` in between) is the accessor
    /// form. Resolved with the same rewind-the-lexer one-token lookahead
    /// `expression_or_labeled_statement` uses for its own ambiguity; on a
    /// non-match the lexer is restored and the caller falls through to the
    /// ordinary `key : value` parse. Emits the key `Value` and the accessor
    /// function body the same way a data entry emits its key and value, so
    /// `Op::Object` sees one uniform key/value pair per entry either way.
    fn try_accessor_entry(&mut self, b: &mut Builder, span: SourceSpan) -> PResult<Option<PropEntryKind>> {
        if self.token != Token::Identifier {
            return Ok(None);
        }
        let start = self.span.start as usize;
        let name = self.expect_identifier()?;
        let is_get = name == self.interns.well_known.get;
        let is_set = name == self.interns.well_known.set;
        let looks_like_accessor =
            (is_get || is_set) && matches!(self.token, Token::Identifier | Token::String | Token::EscapedString | Token::Integer | Token::Binary);
        if !looks_like_accessor {
            self.lexer.restore_position(start);
            self.advance()?;
            return Ok(None);
        }
        let key = self.property_key()?;
        b.emit(Op::Value(Value::Key(key)), span);
        let index = self.function_body(None)?;
        b.emit(Op::Function(index), span);
        Ok(Some(if is_get { PropEntryKind::Getter } else { PropEntryKind::Setter }))
    }

    fn property_key(&mut self) -> PResult<Key> {
        match self.token {
            Token::Identifier => self.expect_identifier(),
            Token::String | Token::EscapedString => {
                let bytes = self.value.take().unwrap().string_bytes(self.heap).to_vec();
                let text = String::from_utf8_lossy(&bytes).into_owned();
                self.advance()?;
                Ok(self.interns.make(&text))
            }
            Token::Integer | Token::Binary => {
                let v = self.value.take().unwrap();
                let text = crate::value::binary_to_string(
                    match v {
                        Value::Integer(n) => f64::from(n),
                        Value::Float(f) => f,
                        _ => 0.0,
                    },
                    10,
                );
                self.advance()?;
                Ok(self.interns.make(&text))
            }
            _ => Err(self.err("expected property name")),
        }
    }
}

fn splice(b: &mut Builder, ops: Vec<Op>) {
    for op in ops {
        b.emit(op, SourceSpan::default());
    }
}

/// Patches every collected `break`/`continue` forward jump to `target`.
fn patch_all(b: &mut Builder, jumps: Vec<JumpHandle>, target: u32) {
    for handle in jumps {
        b.patch_jump_to(handle, target);
    }
}

fn split_regexp_literal(text: &str) -> (String, String) {
    match text.rfind('/') {
        Some(idx) if idx > 0 => (text[1..idx].to_string(), text[idx + 1..].to_string()),
        _ => (text.trim_matches('/').to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use crate::intern::Interns;

    #[test]
    fn parses_simple_arithmetic_expression_statement() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let program = parse_program("1 + 2;", &mut heap, &mut interns, "test").unwrap();
        assert!(program.top_level.ops.iter().any(|op| matches!(op, Op::Binary(BinOp::Add))));
    }

    #[test]
    fn parses_function_declaration_into_functions_table() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let program = parse_program("function f(a, b) { return a + b; }", &mut heap, &mut interns, "test").unwrap();
        assert_eq!(program.functions.len(), 1);
        assert_eq!(program.functions[0].params.len(), 2);
    }

    #[test]
    fn rejects_reserved_identifier() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let err = parse_program("var class = 1;", &mut heap, &mut interns, "test").unwrap_err();
        assert!(err.message.contains("reserved"));
    }

    #[test]
    fn parses_if_else_with_jumps() {
        let mut heap = Heap::new();
        let mut interns = Interns::new();
        let program = parse_program("if (a) { b; } else { c; }", &mut heap, &mut interns, "test").unwrap();
        assert!(program.top_level.ops.iter().any(|op| matches!(op, Op::JumpIfFalse(_))));
    }
}
