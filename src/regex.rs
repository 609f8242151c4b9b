//! Compiler from the slash-delimited regex dialect to automata.
//!
//! The dialect is the one the attack-pattern catalogue is written in:
//! literal bytes, `.` (any byte), escapes (`\xHH`, `\u{hhhh}`, `\s`, and
//! escaped punctuation such as `\\`, `\"`, `\/`), character classes with
//! negation and ranges, grouping, alternation, and the quantifiers `*`, `+`,
//! `?`, `{n}`, `{n,}` and `{n,m}`.
//!
//! Note that `.` matches *every* byte, including newline: attack strings
//! routinely carry control bytes, so excluding `\n` would silently shrink
//! the pattern languages. The choice is pinned down by a test.
//!
//! Compilation goes through a Thompson construction into an epsilon-NFA,
//! then subset construction and minimization (see [`crate::automaton`]).

use crate::alphabet::CharSet;
use crate::automaton::{Automaton, Nfa, StateId};
use crate::error::{AnalysisError, Result};

/// Compiles a slash-delimited pattern, e.g. `/[^<>]+/`.
pub fn compile(pattern: &str) -> Result<Automaton> {
    let inner = pattern
        .strip_prefix('/')
        .and_then(|rest| rest.strip_suffix('/'))
        .ok_or_else(|| AnalysisError::malformed_regex(pattern, "missing slash delimiters"))?;

    let mut parser = Parser {
        pattern,
        input: inner.as_bytes(),
        pos: 0,
    };
    let ast = parser.parse_alternation()?;
    if parser.pos != parser.input.len() {
        // The only way to stop early is an unmatched closing parenthesis.
        return Err(parser.error("unbalanced parenthesis"));
    }

    let mut nfa = Nfa::new();
    let (entry, exit) = build(&mut nfa, &ast);
    nfa.add_epsilon(0, entry);
    nfa.accepting[exit] = true;
    Ok(nfa.determinize())
}

#[derive(Debug, Clone)]
enum Ast {
    Empty,
    Class(CharSet),
    Literal(Vec<u8>),
    Concat(Vec<Ast>),
    Alt(Vec<Ast>),
    Star(Box<Ast>),
    Plus(Box<Ast>),
    Opt(Box<Ast>),
    Repeat {
        body: Box<Ast>,
        min: usize,
        max: Option<usize>,
    },
}

/// An escape sequence, resolved.
enum Escape {
    Byte(u8),
    Set(CharSet),
    Bytes(Vec<u8>),
}

struct Parser<'a> {
    pattern: &'a str,
    input: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: impl Into<String>) -> AnalysisError {
        AnalysisError::malformed_regex(self.pattern, reason)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_alternation(&mut self) -> Result<Ast> {
        let mut branches = vec![self.parse_concat()?];
        while self.eat(b'|') {
            branches.push(self.parse_concat()?);
        }
        if branches.len() == 1 {
            Ok(branches.pop().expect("one branch"))
        } else {
            Ok(Ast::Alt(branches))
        }
    }

    fn parse_concat(&mut self) -> Result<Ast> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                None | Some(b'|') | Some(b')') => break,
                _ => items.push(self.parse_repetition()?),
            }
        }
        match items.len() {
            0 => Ok(Ast::Empty),
            1 => Ok(items.pop().expect("one item")),
            _ => Ok(Ast::Concat(items)),
        }
    }

    fn parse_repetition(&mut self) -> Result<Ast> {
        let mut atom = self.parse_atom()?;
        loop {
            match self.peek() {
                Some(b'*') => {
                    self.pos += 1;
                    atom = Ast::Star(Box::new(atom));
                }
                Some(b'+') => {
                    self.pos += 1;
                    atom = Ast::Plus(Box::new(atom));
                }
                Some(b'?') => {
                    self.pos += 1;
                    atom = Ast::Opt(Box::new(atom));
                }
                Some(b'{') => {
                    self.pos += 1;
                    let (min, max) = self.parse_counts()?;
                    atom = Ast::Repeat {
                        body: Box::new(atom),
                        min,
                        max,
                    };
                }
                _ => break,
            }
        }
        Ok(atom)
    }

    fn parse_counts(&mut self) -> Result<(usize, Option<usize>)> {
        let min = self.parse_number()?;
        if self.eat(b'}') {
            return Ok((min, Some(min)));
        }
        if !self.eat(b',') {
            return Err(self.error("malformed repetition count"));
        }
        if self.eat(b'}') {
            return Ok((min, None));
        }
        let max = self.parse_number()?;
        if !self.eat(b'}') {
            return Err(self.error("unbalanced brace in repetition"));
        }
        if max < min {
            return Err(self.error("repetition range is reversed"));
        }
        Ok((min, Some(max)))
    }

    fn parse_number(&mut self) -> Result<usize> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.error("expected a number in repetition"));
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .expect("digits are ASCII")
            .parse()
            .map_err(|_| self.error("repetition count is too large"))
    }

    fn parse_atom(&mut self) -> Result<Ast> {
        match self.bump() {
            None => Err(self.error("expected an atom")),
            Some(b'(') => {
                let inner = self.parse_alternation()?;
                if !self.eat(b')') {
                    return Err(self.error("unbalanced parenthesis"));
                }
                Ok(inner)
            }
            Some(b'[') => self.parse_class(),
            Some(b'.') => Ok(Ast::Class(CharSet::universe())),
            Some(b'\\') => match self.parse_escape()? {
                Escape::Byte(c) => Ok(Ast::Class(CharSet::singleton(c))),
                Escape::Set(s) => Ok(Ast::Class(s)),
                Escape::Bytes(bs) => Ok(Ast::Literal(bs)),
            },
            Some(c @ (b'*' | b'+' | b'?' | b'{')) => {
                Err(self.error(format!("quantifier '{}' with nothing to repeat", c as char)))
            }
            Some(c) => Ok(Ast::Class(CharSet::singleton(c))),
        }
    }

    fn parse_escape(&mut self) -> Result<Escape> {
        match self.bump() {
            None => Err(self.error("dangling backslash")),
            Some(b's') => Ok(Escape::Set(CharSet::whitespace())),
            Some(b'x') => {
                let hi = self.parse_hex_digit()?;
                let lo = self.parse_hex_digit()?;
                Ok(Escape::Byte(hi * 16 + lo))
            }
            Some(b'u') => {
                if !self.eat(b'{') {
                    return Err(self.error("expected '{' after \\u"));
                }
                let start = self.pos;
                while matches!(self.peek(), Some(c) if c.is_ascii_hexdigit()) {
                    self.pos += 1;
                }
                if self.pos == start {
                    return Err(self.error("empty \\u{} escape"));
                }
                let digits = std::str::from_utf8(&self.input[start..self.pos]).expect("hex digits are ASCII");
                if !self.eat(b'}') {
                    return Err(self.error("unbalanced brace in \\u{} escape"));
                }
                let value = u32::from_str_radix(digits, 16).map_err(|_| self.error("\\u{} escape is too large"))?;
                let ch = char::from_u32(value).ok_or_else(|| self.error("\\u{} escape is not a scalar value"))?;
                let mut buf = [0u8; 4];
                Ok(Escape::Bytes(ch.encode_utf8(&mut buf).as_bytes().to_vec()))
            }
            // Escaped letters and digits other than the classes above are
            // reserved; everything else escapes to itself.
            Some(c) if c.is_ascii_alphanumeric() => Err(self.error(format!("unknown escape '\\{}'", c as char))),
            Some(c) => Ok(Escape::Byte(c)),
        }
    }

    fn parse_hex_digit(&mut self) -> Result<u8> {
        match self.bump() {
            Some(c) if c.is_ascii_hexdigit() => Ok((c as char).to_digit(16).expect("hex digit") as u8),
            _ => Err(self.error("expected a hex digit")),
        }
    }

    fn parse_class(&mut self) -> Result<Ast> {
        let negated = self.eat(b'^');
        let mut set = CharSet::empty();
        // A ']' in the first position is a literal.
        let mut first = true;
        loop {
            let c = match self.peek() {
                None => return Err(self.error("unbalanced bracket in character class")),
                Some(b']') if !first => {
                    self.pos += 1;
                    break;
                }
                Some(c) => c,
            };
            first = false;
            self.pos += 1;

            let item = if c == b'\\' {
                self.parse_escape()?
            } else {
                Escape::Byte(c)
            };

            match item {
                Escape::Set(s) => {
                    set = set.union(s);
                }
                Escape::Bytes(_) => {
                    return Err(self.error("multi-byte escape in character class"));
                }
                Escape::Byte(lo) => {
                    // `a-z` forms a range unless the dash is trailing.
                    if self.peek() == Some(b'-') && self.input.get(self.pos + 1).copied().is_some_and(|n| n != b']') {
                        self.pos += 1; // dash
                        let c2 = self.bump().expect("peeked above");
                        let hi = match if c2 == b'\\' { self.parse_escape()? } else { Escape::Byte(c2) } {
                            Escape::Byte(b) => b,
                            _ => return Err(self.error("invalid range end in character class")),
                        };
                        if hi < lo {
                            return Err(self.error("reversed range in character class"));
                        }
                        set = set.union(CharSet::range(lo, hi));
                    } else {
                        set = set.union(CharSet::singleton(lo));
                    }
                }
            }
        }
        Ok(Ast::Class(if negated { set.complement() } else { set }))
    }
}

/// Thompson construction: returns the `(entry, exit)` states of the fragment.
fn build(nfa: &mut Nfa, ast: &Ast) -> (StateId, StateId) {
    match ast {
        Ast::Empty => {
            let s = nfa.add_state(false);
            (s, s)
        }
        Ast::Class(set) => {
            let s = nfa.add_state(false);
            let e = nfa.add_state(false);
            nfa.add_move(s, *set, e);
            (s, e)
        }
        Ast::Literal(bytes) => {
            let s = nfa.add_state(false);
            let mut cur = s;
            for &c in bytes {
                let next = nfa.add_state(false);
                nfa.add_move(cur, CharSet::singleton(c), next);
                cur = next;
            }
            (s, cur)
        }
        Ast::Concat(items) => {
            let s = nfa.add_state(false);
            let mut cur = s;
            for item in items {
                let (is, ie) = build(nfa, item);
                nfa.add_epsilon(cur, is);
                cur = ie;
            }
            (s, cur)
        }
        Ast::Alt(branches) => {
            let s = nfa.add_state(false);
            let e = nfa.add_state(false);
            for branch in branches {
                let (bs, be) = build(nfa, branch);
                nfa.add_epsilon(s, bs);
                nfa.add_epsilon(be, e);
            }
            (s, e)
        }
        Ast::Star(body) => {
            let s = nfa.add_state(false);
            let e = nfa.add_state(false);
            let (bs, be) = build(nfa, body);
            nfa.add_epsilon(s, bs);
            nfa.add_epsilon(be, e);
            nfa.add_epsilon(s, e);
            nfa.add_epsilon(be, bs);
            (s, e)
        }
        Ast::Plus(body) => {
            let s = nfa.add_state(false);
            let e = nfa.add_state(false);
            let (bs, be) = build(nfa, body);
            nfa.add_epsilon(s, bs);
            nfa.add_epsilon(be, e);
            nfa.add_epsilon(be, bs);
            (s, e)
        }
        Ast::Opt(body) => {
            let s = nfa.add_state(false);
            let e = nfa.add_state(false);
            let (bs, be) = build(nfa, body);
            nfa.add_epsilon(s, bs);
            nfa.add_epsilon(be, e);
            nfa.add_epsilon(s, e);
            (s, e)
        }
        Ast::Repeat { body, min, max } => {
            let s = nfa.add_state(false);
            let mut cur = s;
            for _ in 0..*min {
                let (bs, be) = build(nfa, body);
                nfa.add_epsilon(cur, bs);
                cur = be;
            }
            match max {
                None => {
                    let (ss, se) = build(nfa, &Ast::Star(body.clone()));
                    nfa.add_epsilon(cur, ss);
                    cur = se;
                }
                Some(max) => {
                    for _ in *min..*max {
                        let (os, oe) = build(nfa, &Ast::Opt(body.clone()));
                        nfa.add_epsilon(cur, os);
                        cur = oe;
                    }
                }
            }
            (s, cur)
        }
    }
}
