//! Input stack: the uniform peek/consume abstraction over a Source frame
//! (scanner-backed) or a Stream frame (injected token list), with pushback
//! for expansion results to be rescanned.
//!
//! A stack of stacks: an expansion's result is pushed as a stream frame
//! above the current file and fully drained before control returns to it.

use crate::diagnostics::Diagnostics;
use crate::scanner::{Hint, Scanner};
use crate::token::{Token, TokenKind};
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Root,
    If,
    Ifdef,
    Ifndef,
    Elif,
    Else,
}

/// One `#if*` nesting level. `any_arm_processed` and `parent_processing`
/// are extra bookkeeping `#elif`/`#else` need to decide whether to
/// evaluate their condition and whether to flip `processing`.
#[derive(Debug, Clone)]
pub struct Group {
    pub processing: bool,
    pub kind: GroupKind,
    pub start_line: u32,
    pub any_arm_processed: bool,
    pub parent_processing: bool,
    /// Set once this chain has seen a `#else`; a further `#elif` or `#else`
    /// in the same chain is then `MisplacedElif`/`MisplacedElse`.
    pub else_seen: bool,
}

impl Group {
    pub fn root() -> Self {
        Group {
            processing: true,
            kind: GroupKind::Root,
            start_line: 0,
            any_arm_processed: true,
            parent_processing: true,
            else_seen: false,
        }
    }
}

/// A file currently being preprocessed.
pub struct SourceFrame {
    pub path: PathBuf,
    pub display_path: String,
    scanner: Scanner,
    queue: VecDeque<Token>,
    pub groups: Vec<Group>,
    line_base: i64,
}

impl SourceFrame {
    pub fn new(path: PathBuf, content: &str, trigraphs: bool) -> Self {
        let display_path = path.display().to_string();
        SourceFrame {
            path,
            display_path,
            scanner: Scanner::new(content, trigraphs),
            queue: VecDeque::new(),
            groups: vec![Group::root()],
            line_base: 0,
        }
    }

    pub fn set_hint(&mut self, hint: Hint) {
        self.scanner.set_hint(hint);
    }

    /// Updates the reported line for the *next* physical line, per a
    /// `#line` directive. `at_line` is the physical line the `#line`
    /// directive itself occupies.
    pub fn set_line_override(&mut self, at_line: u32, new_line: u32) {
        self.line_base = new_line as i64 - (at_line as i64 + 1);
    }

    pub fn set_display_path(&mut self, path: String) {
        self.display_path = path;
    }

    pub fn current_processing(&self) -> bool {
        self.groups.last().map(|g| g.processing).unwrap_or(true)
    }

    fn pull(&mut self, diags: &mut Diagnostics) -> Token {
        let mut tok = self.scanner.next_token(&self.path, diags);
        let reported = tok.line as i64 + self.line_base;
        tok.line = reported.max(1) as u32;
        tok
    }

    fn fill_to(&mut self, n: usize, diags: &mut Diagnostics) {
        while self.queue.len() < n {
            let tok = self.pull(diags);
            let is_eof = matches!(tok.kind, TokenKind::EndOfFile);
            self.queue.push_back(tok);
            if is_eof {
                break;
            }
        }
    }

    pub fn peek(&mut self, i: usize, diags: &mut Diagnostics) -> Token {
        self.fill_to(i, diags);
        self.queue
            .get(i - 1)
            .cloned()
            .unwrap_or_else(|| Token::eof(0, 0))
    }

    pub fn consume(&mut self, diags: &mut Diagnostics) -> Token {
        self.fill_to(1, diags);
        self.queue
            .pop_front()
            .unwrap_or_else(|| Token::eof(0, 0))
    }

    pub fn insert(&mut self, tokens: Vec<Token>) {
        self.queue = tokens.into_iter().collect();
    }
}

/// An expansion's or injection's token list, stacked above a Source frame
/// for rescanning.
pub struct StreamFrame {
    pub label: Option<String>,
    tokens: Vec<Token>,
    idx: usize,
    queue: VecDeque<Token>,
}

impl StreamFrame {
    pub fn new(tokens: Vec<Token>, label: Option<String>) -> Self {
        StreamFrame {
            label,
            tokens,
            idx: 0,
            queue: VecDeque::new(),
        }
    }

    fn pull(&mut self) -> Token {
        if self.idx < self.tokens.len() {
            let t = self.tokens[self.idx].clone();
            self.idx += 1;
            t
        } else {
            Token::eof(0, 0)
        }
    }

    fn fill_to(&mut self, n: usize) {
        while self.queue.len() < n {
            let tok = self.pull();
            let is_eof = matches!(tok.kind, TokenKind::EndOfFile);
            self.queue.push_back(tok);
            if is_eof {
                break;
            }
        }
    }

    pub fn peek(&mut self, i: usize) -> Token {
        self.fill_to(i);
        self.queue.get(i - 1).cloned().unwrap_or_else(|| Token::eof(0, 0))
    }

    pub fn consume(&mut self) -> Token {
        self.fill_to(1);
        self.queue.pop_front().unwrap_or_else(|| Token::eof(0, 0))
    }

    pub fn insert(&mut self, tokens: Vec<Token>) {
        self.queue = tokens.into_iter().collect();
    }

    /// True once both the pushback queue and the underlying list are
    /// drained — the precondition `pop_stream` relies on.
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && self.idx >= self.tokens.len()
    }
}

/// The unified peek/consume surface: source frames form the include stack,
/// stream frames stack transiently above the active source frame while an
/// expansion is being rescanned.
#[derive(Default)]
pub struct InputStack {
    sources: Vec<SourceFrame>,
    streams: Vec<StreamFrame>,
}

impl InputStack {
    pub fn new() -> Self {
        InputStack::default()
    }

    pub fn push_source(&mut self, frame: SourceFrame) {
        self.sources.push(frame);
    }

    /// Pops the active source frame. Panics if stream frames are still
    /// stacked above it — callers must drain/pop those first, preserving
    /// the scoping invariant that a frame's pushback queue is empty when popped.
    pub fn pop_source(&mut self) -> Option<SourceFrame> {
        assert!(self.streams.is_empty(), "stream frames must be popped before their source frame");
        self.sources.pop()
    }

    pub fn push_stream(&mut self, tokens: Vec<Token>, label: Option<String>) {
        self.streams.push(StreamFrame::new(tokens, label));
    }

    pub fn pop_stream(&mut self) -> Option<StreamFrame> {
        self.streams.pop()
    }

    pub fn top_stream_exhausted(&self) -> bool {
        self.streams.last().map(|s| s.is_exhausted()).unwrap_or(true)
    }

    pub fn source_depth(&self) -> usize {
        self.sources.len()
    }

    pub fn current_source(&self) -> Option<&SourceFrame> {
        self.sources.last()
    }

    pub fn current_source_mut(&mut self) -> Option<&mut SourceFrame> {
        self.sources.last_mut()
    }

    pub fn peek(&mut self, i: usize, diags: &mut Diagnostics) -> Token {
        if let Some(stream) = self.streams.last_mut() {
            return stream.peek(i);
        }
        match self.sources.last_mut() {
            Some(src) => src.peek(i, diags),
            None => Token::eof(0, 0),
        }
    }

    pub fn consume(&mut self, diags: &mut Diagnostics) -> Token {
        if let Some(stream) = self.streams.last_mut() {
            return stream.consume();
        }
        match self.sources.last_mut() {
            Some(src) => src.consume(diags),
            None => Token::eof(0, 0),
        }
    }

    pub fn insert(&mut self, tokens: Vec<Token>) {
        if let Some(stream) = self.streams.last_mut() {
            stream.insert(tokens);
        } else if let Some(src) = self.sources.last_mut() {
            src.insert(tokens);
        }
    }
}

/// Consumes a run of whitespace/comment tokens (no newlines), returning what
/// it consumed. Used where a newline must stop the lookahead, e.g. `scan`'s
/// search for a function-like macro's `(` during rescan.
pub fn skip_ws(input: &mut InputStack, diags: &mut Diagnostics) -> Vec<Token> {
    let mut out = Vec::new();
    while input.peek(1, diags).is_ws() {
        out.push(input.consume(diags));
    }
    out
}

/// Like [`skip_ws`] but also consumes newlines, reporting whether any were
/// crossed. Used by the top-level line scan, where a function-like macro
/// invocation may span physical lines.
pub fn skip_ws_and_nl(input: &mut InputStack, diags: &mut Diagnostics) -> (Vec<Token>, bool) {
    let mut out = Vec::new();
    let mut crossed_newline = false;
    while input.peek(1, diags).is_ws_nl() {
        let t = input.consume(diags);
        if t.kind == TokenKind::NewLine {
            crossed_newline = true;
        }
        out.push(t);
    }
    (out, crossed_newline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::TokenKind;

    fn tok(lexeme: &str) -> Token {
        Token::new(TokenKind::Identifier, lexeme, 1, 1)
    }

    #[test]
    fn pushback_consistency() {
        let mut stack = InputStack::new();
        let mut diags = Diagnostics::new();
        stack.push_source(SourceFrame::new(PathBuf::from("a.c"), "foo bar\n", false));
        let before = stack.peek(1, &mut diags);

        stack.push_stream(vec![tok("X"), tok("Y")], Some("M".into()));
        let _ = stack.consume(&mut diags);
        let _ = stack.consume(&mut diags);
        assert!(stack.top_stream_exhausted());
        stack.pop_stream();

        let after = stack.peek(1, &mut diags);
        assert_eq!(before, after);
    }

    #[test]
    fn source_frame_yields_eof_after_content() {
        let mut diags = Diagnostics::new();
        let mut frame = SourceFrame::new(PathBuf::from("a.c"), "x\n", false);
        let mut saw_eof = false;
        for _ in 0..10 {
            let t = frame.consume(&mut diags);
            if matches!(t.kind, TokenKind::EndOfFile) {
                saw_eof = true;
                break;
            }
        }
        assert!(saw_eof);
    }

    #[test]
    fn line_override_shifts_subsequent_lines() {
        let mut diags = Diagnostics::new();
        let mut frame = SourceFrame::new(PathBuf::from("a.c"), "one\ntwo\nthree\n", false);
        frame.set_line_override(1, 100);
        // line 1 (the #line-equivalent marker) itself is unaffected in this
        // unit test since we feed raw content directly; line 2 onward shifts.
        let _ = frame.consume(&mut diags); // "one"
        let _ = frame.consume(&mut diags); // newline
        let two = frame.consume(&mut diags); // "two"
        assert_eq!(two.line, 100);
    }

    #[test]
    fn skip_ws_and_nl_reports_crossed_newline() {
        let mut diags = Diagnostics::new();
        let mut stack = InputStack::new();
        stack.push_source(SourceFrame::new(PathBuf::from("a.c"), "  \n  (", false));
        let (_, crossed) = skip_ws_and_nl(&mut stack, &mut diags);
        assert!(crossed);
        assert_eq!(stack.peek(1, &mut diags).lexeme, "(");
    }

    #[test]
    fn skip_ws_stops_before_newline() {
        let mut diags = Diagnostics::new();
        let mut stack = InputStack::new();
        stack.push_source(SourceFrame::new(PathBuf::from("a.c"), "  \n(", false));
        let _ = skip_ws(&mut stack, &mut diags);
        assert_eq!(stack.peek(1, &mut diags).kind, TokenKind::NewLine);
    }
}
