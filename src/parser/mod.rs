//! Recursive-descent parser over the tokenizer's stream, building the
//! typed AST described in `ast`.
//!
//! ```text
//! Expr     := AndOr (';' AndOr)*
//! AndOr    := Piped (('&&'|'||') Piped)*
//! Piped    := Cmd ('|' Cmd | '->' NAME)*
//! Cmd      := '(' Expr ')' | Process
//! Process  := Arg (SPACE Arg | Redirect | '=>' NAME)*
//! Arg      := (LiteralFamily | Backquote)+
//! Backquote := '`' Expr '`'
//! ```

pub mod ast;
pub mod dquote;

use crate::error::{Position, ShellError};
use crate::tokenizer::{AliasMap, Token, TokenKind, Tokenizer};

pub use ast::{ArgPart, Argument, Assign, Ast, BinaryOp, BinaryOpKind, Process, Redirect, RedirectTarget};

pub struct Parser<'a> {
    tok: Tokenizer<'a>,
    in_bquote: bool,
}

/// Convenience entry point: tokenize and parse a whole command string.
pub fn parse(input: &str, alias_map: Option<&AliasMap>) -> Result<Ast, ShellError> {
    let tokenizer = Tokenizer::new(input, alias_map)?;
    Parser::new(tokenizer).parse()
}

impl<'a> Parser<'a> {
    pub fn new(tok: Tokenizer<'a>) -> Self {
        Self { tok, in_bquote: false }
    }

    pub fn parse(&mut self) -> Result<Ast, ShellError> {
        let ast = self.parse_expr()?;
        if self.tok.current().kind != TokenKind::Eof {
            return Err(ShellError::parse(
                format!("unexpected trailing token: {}", self.tok.current()),
                self.tok.current().pos,
            ));
        }
        Ok(ast)
    }

    fn parse_expr(&mut self) -> Result<Ast, ShellError> {
        let mut left: Option<Ast> = None;
        loop {
            let right = self.parse_and_or()?;
            left = Some(match left {
                Some(l) => Ast::binary(BinaryOpKind::Semi, l, right),
                None => right,
            });
            if self.tok.current().kind != TokenKind::Semicolon {
                return Ok(left.unwrap());
            }
            self.tok.advance()?;
            let k = self.tok.current().kind;
            if k == TokenKind::Eof || k == TokenKind::ParenClose || k == TokenKind::Backquote {
                return Ok(left.unwrap());
            }
        }
    }

    fn parse_and_or(&mut self) -> Result<Ast, ShellError> {
        let mut left: Option<Ast> = None;
        let mut op: Option<BinaryOpKind> = None;
        loop {
            let piped = self.parse_piped()?;
            left = Some(match left {
                Some(l) => Ast::binary(op.expect("op set once left is Some"), l, piped),
                None => piped,
            });
            match self.tok.current().kind {
                TokenKind::AndOp => {
                    op = Some(BinaryOpKind::And);
                    self.tok.advance()?;
                }
                TokenKind::OrOp => {
                    op = Some(BinaryOpKind::Or);
                    self.tok.advance()?;
                }
                _ => return Ok(left.unwrap()),
            }
        }
    }

    fn parse_piped(&mut self) -> Result<Ast, ShellError> {
        let mut left = self.parse_cmd()?;
        loop {
            match self.tok.current().kind {
                TokenKind::Pipe => {
                    self.tok.advance()?;
                    let cmd = self.parse_cmd()?;
                    left = Ast::binary(BinaryOpKind::Pipe, left, cmd);
                }
                TokenKind::RightArrow => {
                    self.tok.advance()?;
                    let cur = self.tok.current().clone();
                    if cur.kind != TokenKind::Literal || !is_identifier(&cur.text) {
                        return Err(ShellError::parse("-> must be followed by a host identifier", cur.pos));
                    }
                    self.tok.advance()?;
                    left = Ast::assign(left, cur.text);
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_cmd(&mut self) -> Result<Ast, ShellError> {
        if self.tok.current().kind == TokenKind::ParenOpen {
            self.tok.advance()?;
            let expr = self.parse_expr()?;
            if self.tok.current().kind != TokenKind::ParenClose {
                return Err(ShellError::parse("parenthesis mismatch", self.tok.current().pos));
            }
            self.tok.advance()?;
            Ok(expr)
        } else {
            self.parse_process()
        }
    }

    fn parse_process(&mut self) -> Result<Ast, ShellError> {
        let mut args = vec![self.parse_arg()?];
        let mut redirects = Vec::new();
        loop {
            match self.tok.current().kind {
                TokenKind::Space => {
                    self.tok.advance()?;
                    if self.tok.current().kind == TokenKind::Backquote && self.in_bquote {
                        // space immediately before a closing backquote is discarded
                        break;
                    }
                    args.push(self.parse_arg()?);
                }
                TokenKind::Redirect => {
                    let text = self.tok.current().text.clone();
                    let pos = self.tok.current().pos;
                    let (append, src_fd, dst_fd) = parse_redirect_token(&text, pos)?;
                    self.tok.advance()?;
                    if let Some(dst_fd) = dst_fd {
                        redirects.push(Redirect { append, src_fd, target: RedirectTarget::Dup { dst_fd } });
                    } else {
                        let target = self.parse_arg()?;
                        redirects.push(Redirect { append, src_fd, target: RedirectTarget::File { target } });
                    }
                }
                TokenKind::BoldRightArrow => {
                    self.tok.advance()?;
                    let cur = self.tok.current().clone();
                    if cur.kind != TokenKind::Literal || !is_identifier(&cur.text) {
                        return Err(ShellError::parse("=> must be followed by a host identifier", cur.pos));
                    }
                    redirects.push(Redirect {
                        append: false,
                        src_fd: 1,
                        target: RedirectTarget::PyOut { var_name: cur.text.clone() },
                    });
                    self.tok.advance()?;
                }
                _ => break,
            }
        }
        Ok(Ast::process(Process { args, redirects }))
    }

    fn parse_arg(&mut self) -> Result<Argument, ShellError> {
        let mut result = Vec::new();
        loop {
            let cur = self.tok.current().clone();
            if is_arg_token(cur.kind) {
                for p in self.append_token(cur)? {
                    result.push(p);
                }
                self.tok.advance()?;
            } else if cur.kind == TokenKind::Backquote && !self.in_bquote {
                result.push(self.parse_backquote()?);
            } else {
                break;
            }
        }
        if result.is_empty() {
            let cur = self.tok.current();
            return Err(ShellError::parse(format!("expected an argument, found {cur}"), cur.pos));
        }
        Ok(result)
    }

    fn append_token(&mut self, tok: Token) -> Result<Vec<ArgPart>, ShellError> {
        match tok.kind {
            TokenKind::DoubleQuoted => dquote::expand_double_quoted(&tok.text, tok.pos),
            TokenKind::SingleQuoted => Ok(vec![ArgPart::SingleQuoted(decode_single_quoted(&tok.text, tok.pos)?)]),
            TokenKind::Literal => Ok(vec![ArgPart::Literal(tok.text)]),
            TokenKind::Substitution => Ok(vec![ArgPart::Substitution(tok.text)]),
            _ => unreachable!("append_token called with a non-argument token"),
        }
    }

    fn parse_backquote(&mut self) -> Result<ArgPart, ShellError> {
        self.tok.advance()?; // consume opening backquote
        while self.tok.current().kind == TokenKind::Space {
            self.tok.advance()?;
        }
        let prev = self.in_bquote;
        self.in_bquote = true;
        let expr = self.parse_expr()?;
        self.in_bquote = prev;
        if self.tok.current().kind != TokenKind::Backquote {
            return Err(ShellError::parse("backquote mismatch", self.tok.current().pos));
        }
        self.tok.advance()?;
        Ok(ArgPart::Backquote(Box::new(expr)))
    }
}

fn is_arg_token(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Literal | TokenKind::SingleQuoted | TokenKind::DoubleQuoted | TokenKind::Substitution
    )
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

fn parse_redirect_token(text: &str, pos: Position) -> Result<(bool, i32, Option<i32>), ShellError> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let src_fd: i32 = if i > 0 { text[..i].parse().unwrap() } else { 1 };
    if bytes.get(i) != Some(&b'>') {
        return Err(ShellError::parse("malformed redirect token", pos));
    }
    i += 1;
    let append = bytes.get(i) == Some(&b'>');
    if append {
        i += 1;
    }
    let dst_fd = if bytes.get(i) == Some(&b'&') {
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        Some(
            text[start..i]
                .parse::<i32>()
                .map_err(|_| ShellError::parse("malformed redirect target fd", pos))?,
        )
    } else {
        None
    };
    if append && dst_fd.is_some() {
        return Err(ShellError::parse("cannot combine >> with &n", pos));
    }
    Ok((append, src_fd, dst_fd))
}

fn decode_single_quoted(text: &str, pos: Position) -> Result<String, ShellError> {
    let inner = text
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .ok_or_else(|| ShellError::parse("malformed single-quoted literal", pos))?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('\'') => out.push('\''),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => return Err(ShellError::lex("trailing backslash in string literal", pos)),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(s: &str) -> Ast {
        parse(s, None).unwrap_or_else(|e| panic!("parse({s:?}) failed: {e}"))
    }

    #[test]
    fn simple_process() {
        let ast = parse_ok("echo foo bar");
        match ast {
            Ast::Process(p) => assert_eq!(p.args.len(), 3),
            _ => panic!("expected Process"),
        }
    }

    #[test]
    fn pipe_with_and_without_spaces_match() {
        let a = parse_ok("a | b");
        let b = parse_ok("a|b");
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn semicolon_with_and_without_spaces_match() {
        let a = parse_ok("a ; b");
        let b = parse_ok("a;b");
        assert_eq!(format!("{a:?}"), format!("{b:?}"));
    }

    #[test]
    fn assign_capture() {
        let ast = parse_ok("false -> rc");
        match ast {
            Ast::Assign(a) => assert_eq!(a.name, "rc"),
            _ => panic!("expected Assign"),
        }
    }

    #[test]
    fn pyout_capture_redirect() {
        let ast = parse_ok("cat f => out");
        match ast {
            Ast::Process(p) => match &p.redirects[0].target {
                RedirectTarget::PyOut { var_name } => assert_eq!(var_name, "out"),
                _ => panic!("expected PyOut redirect"),
            },
            _ => panic!("expected Process"),
        }
    }

    #[test]
    fn numbered_duplicate_redirect() {
        let ast = parse_ok("cmd 2>&1");
        match ast {
            Ast::Process(p) => match &p.redirects[0] {
                Redirect { src_fd: 2, target: RedirectTarget::Dup { dst_fd: 1 }, .. } => {}
                other => panic!("unexpected redirect: {other:?}"),
            },
            _ => panic!("expected Process"),
        }
    }

    #[test]
    fn append_and_dup_is_rejected() {
        let err = parse("cmd >>&1", None).unwrap_err();
        assert!(matches!(err, ShellError::Parse { .. }));
    }

    #[test]
    fn unmatched_paren_is_rejected() {
        assert!(parse("(echo a", None).is_err());
    }

    #[test]
    fn backquote_in_argument() {
        let ast = parse_ok("echo `cat f`");
        match ast {
            Ast::Process(p) => {
                assert_eq!(p.args.len(), 2);
                assert!(matches!(p.args[1][0], ArgPart::Backquote(_)));
            }
            _ => panic!("expected Process"),
        }
    }

    #[test]
    fn arrow_binds_tighter_than_boolean_ops() {
        // `a -> rc && b` parses as `(a -> rc) && b`
        let ast = parse_ok("a -> rc && b");
        match ast {
            Ast::BinaryOp(op) => {
                assert_eq!(op.op, BinaryOpKind::And);
                assert!(matches!(*op.left, Ast::Assign(_)));
            }
            _ => panic!("expected BinaryOp"),
        }
    }
}
