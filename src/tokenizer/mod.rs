//! Tokenizer: drives the matcher priority list, suppresses insignificant
//! whitespace, and expands aliases (global anywhere, local only in head
//! position), guarding against expansion cycles.

pub mod matchers;
pub mod token;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use crate::error::{Position, ShellError};
pub use token::{Token, TokenKind};

/// One alias entry: its expansion text and whether it applies outside
/// head position.
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub expansion: String,
    pub is_global: bool,
}

pub type AliasMap = HashMap<String, AliasEntry>;

pub struct Tokenizer<'a> {
    full: &'a str,
    idx: usize,
    matchers: &'static [Box<dyn matchers::Matcher>],
    global_alias_only: bool,
    alias_map: Option<&'a AliasMap>,
    alias_history: Rc<RefCell<HashSet<String>>>,
    pending: VecDeque<Token>,
    cur: Option<Token>,
    next: Option<Token>,
    eof_emitted: bool,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str, alias_map: Option<&'a AliasMap>) -> Result<Self, ShellError> {
        Self::with_history(input, false, alias_map, Rc::new(RefCell::new(HashSet::new())))
    }

    fn with_history(
        input: &'a str,
        global_alias_only: bool,
        alias_map: Option<&'a AliasMap>,
        alias_history: Rc<RefCell<HashSet<String>>>,
    ) -> Result<Self, ShellError> {
        let mut t = Tokenizer {
            full: input.trim(),
            idx: 0,
            matchers: matchers::matchers(),
            global_alias_only,
            alias_map,
            alias_history,
            pending: VecDeque::new(),
            cur: None,
            next: None,
            eof_emitted: false,
        };
        t.prime()?;
        Ok(t)
    }

    fn prime(&mut self) -> Result<(), ShellError> {
        self.cur = Some(self.get_next()?);
        if self.cur.as_ref().unwrap().kind != TokenKind::Eof {
            self.next = Some(self.get_next()?);
            self.skip_unnecessary_space()?;
        }
        Ok(())
    }

    /// The already-yielded token.
    pub fn current(&self) -> &Token {
        self.cur.as_ref().expect("tokenizer always primed")
    }

    /// Advances `cur` to the buffered next token and refills the buffer.
    pub fn advance(&mut self) -> Result<(), ShellError> {
        if self.current().kind == TokenKind::Eof {
            return Err(ShellError::lex("read past end of token stream", self.current().pos));
        }
        self.cur = self.next.take();
        if self.cur.as_ref().unwrap().kind == TokenKind::Eof {
            return Ok(());
        }
        self.next = Some(self.get_next()?);
        self.skip_unnecessary_space()
    }

    fn skip_unnecessary_space(&mut self) -> Result<(), ShellError> {
        loop {
            let cur_kind = self.cur.as_ref().unwrap().kind;
            let next_kind = self.next.as_ref().unwrap().kind;
            if next_kind == TokenKind::Space && !cur_kind.is_space_sensitive() {
                self.next = Some(self.get_next()?);
            } else if cur_kind == TokenKind::Space && !next_kind.is_space_sensitive() {
                self.cur = self.next.take();
                if self.cur.as_ref().unwrap().kind == TokenKind::Eof {
                    break;
                }
                self.next = Some(self.get_next()?);
            } else {
                break;
            }
        }
        Ok(())
    }

    fn get_next(&mut self) -> Result<Token, ShellError> {
        let tok = if let Some(t) = self.pending.pop_front() {
            t
        } else {
            self.next_exalias()?
        };
        self.global_alias_only = true;
        Ok(tok)
    }

    fn next_exalias(&mut self) -> Result<Token, ShellError> {
        let tok = self.next_internal()?;
        let cur_is_literal_like = self.cur.as_ref().map(|c| c.kind.is_literal_like()).unwrap_or(false);
        if tok.kind != TokenKind::Literal || cur_is_literal_like {
            return Ok(tok);
        }

        let lookahead = self.next_internal()?;
        if lookahead.kind.is_literal_like() {
            self.pending.push_back(lookahead);
            return Ok(tok);
        }

        let expanded = self.expand_alias(&tok)?;
        if expanded.is_empty() {
            Ok(lookahead)
        } else {
            let mut iter = expanded.into_iter();
            let first = iter.next().unwrap();
            for t in iter {
                self.pending.push_back(t);
            }
            self.pending.push_back(lookahead);
            Ok(first)
        }
    }

    fn expand_alias(&mut self, token: &Token) -> Result<Vec<Token>, ShellError> {
        let text = &token.text;
        let already_active = self.alias_history.borrow().contains(text);
        let entry = self.alias_map.and_then(|m| m.get(text));
        let entry = match entry {
            Some(e) if !already_active => e,
            _ => return Ok(vec![token.clone()]),
        };
        if self.global_alias_only && !entry.is_global {
            return Ok(vec![token.clone()]);
        }

        self.alias_history.borrow_mut().insert(text.clone());
        let result = (|| -> Result<Vec<Token>, ShellError> {
            let mut sub = Tokenizer::with_history(
                &entry.expansion,
                self.global_alias_only,
                self.alias_map,
                Rc::clone(&self.alias_history),
            )?;
            let mut out = Vec::new();
            loop {
                let t = sub.current().clone();
                if t.kind == TokenKind::Eof {
                    break;
                }
                out.push(t);
                sub.advance()?;
            }
            Ok(out)
        })();
        self.alias_history.borrow_mut().remove(text);
        result
    }

    fn next_internal(&mut self) -> Result<Token, ShellError> {
        if self.idx >= self.full.len() {
            if self.eof_emitted {
                return Err(ShellError::lex("read past end of input", self.position()));
            }
            self.eof_emitted = true;
            return Ok(Token::eof(self.position()));
        }

        let remaining = &self.full[self.idx..];
        let pos = self.position();
        for m in self.matchers {
            if let Some((kind, text, consumed)) = m.try_match(remaining, pos)? {
                self.idx += consumed;
                if kind == TokenKind::Space {
                    return Ok(Token::new(kind, " ", pos));
                }
                return Ok(Token::new(kind, text, pos));
            }
        }
        let preview: String = remaining.chars().take(40).collect();
        Err(ShellError::lex(format!("failed to tokenize: {preview}"), pos))
    }

    fn position(&self) -> Position {
        let consumed = &self.full[..self.idx];
        let line = consumed.matches('\n').count() + 1;
        let column = consumed.len() - consumed.rfind('\n').map(|i| i + 1).unwrap_or(0) + 1;
        Position::new(self.idx, line, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(input: &str) -> Vec<(TokenKind, String)> {
        let mut t = Tokenizer::new(input, None).unwrap();
        let mut out = Vec::new();
        loop {
            let cur = t.current().clone();
            out.push((cur.kind, cur.text));
            if cur.kind == TokenKind::Eof {
                break;
            }
            t.advance().unwrap();
        }
        out
    }

    #[test]
    fn suppresses_space_around_operators() {
        let a = collect("a | b");
        let b = collect("a|b");
        let kinds_a: Vec<_> = a.iter().map(|(k, _)| *k).collect();
        let kinds_b: Vec<_> = b.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds_a, kinds_b);
    }

    #[test]
    fn keeps_space_between_literals() {
        let toks = collect("a b");
        let kinds: Vec<_> = toks.iter().map(|(k, _)| *k).collect();
        assert_eq!(kinds, vec![TokenKind::Literal, TokenKind::Space, TokenKind::Literal, TokenKind::Eof]);
    }

    #[test]
    fn right_arrow_not_swallowed_by_literal() {
        let toks = collect("cmd->rc");
        let kinds: Vec<_> = toks.iter().map(|(k, _)| *k).collect();
        assert_eq!(
            kinds,
            vec![TokenKind::Literal, TokenKind::RightArrow, TokenKind::Literal, TokenKind::Eof]
        );
    }

    #[test]
    fn redirect_token_recognized() {
        let toks = collect("2>&1");
        assert_eq!(toks[0].0, TokenKind::Redirect);
        assert_eq!(toks[0].1, "2>&1");
    }

    #[test]
    fn substitution_braces_balanced() {
        let toks = collect("${a + {1: 2}}");
        assert_eq!(toks[0].0, TokenKind::Substitution);
        assert_eq!(toks[0].1, "${a + {1: 2}}");
    }

    #[test]
    fn local_alias_only_expands_in_head_position() {
        let mut map = AliasMap::new();
        map.insert("ll".to_string(), AliasEntry { expansion: "ls -la".to_string(), is_global: false });
        let mut t = Tokenizer::new("ll ll", Some(&map)).unwrap();
        // head position: expands
        assert_eq!(t.current().text, "ls");
        t.advance().unwrap();
        assert_eq!(t.current().kind, TokenKind::Space);
        t.advance().unwrap();
        assert_eq!(t.current().text, "-la");
        t.advance().unwrap();
        assert_eq!(t.current().kind, TokenKind::Space);
        t.advance().unwrap();
        // non-head position: local alias does not expand
        assert_eq!(t.current().text, "ll");
    }

    #[test]
    fn global_alias_expands_everywhere() {
        let mut map = AliasMap::new();
        map.insert("g".to_string(), AliasEntry { expansion: "echo hi".to_string(), is_global: true });
        let mut t = Tokenizer::new("a g", Some(&map)).unwrap();
        assert_eq!(t.current().text, "a");
        t.advance().unwrap();
        assert_eq!(t.current().kind, TokenKind::Space);
        t.advance().unwrap();
        assert_eq!(t.current().text, "echo");
    }

    #[test]
    fn eof_emitted_exactly_once() {
        let mut t = Tokenizer::new("a", None).unwrap();
        t.advance().unwrap(); // -> eof
        assert_eq!(t.current().kind, TokenKind::Eof);
        assert!(t.advance().is_err());
    }
}
