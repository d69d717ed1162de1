//! Double-quoted string expander: splits a double-quoted literal into
//! alternating literal and substitution argument-parts so downstream
//! evaluation sees uniform `(literal, single-quoted, substitution)` pieces.

use regex_lite::Regex;

use crate::error::{Position, ShellError};
use crate::parser::ast::ArgPart;
use crate::tokenizer::matchers::{ExprMatcher, Matcher};
use crate::tokenizer::TokenKind;

fn decode_escapes(inner: &str, pos: Position) -> Result<String, ShellError> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('\'') => out.push('\''),
            Some('$') => out.push('$'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => return Err(ShellError::lex("trailing backslash in string literal", pos)),
        }
    }
    Ok(out)
}

/// `text` is the raw token text of a double-quoted literal, quotes
/// included. Returns the argument-parts the literal expands to.
pub fn expand_double_quoted(text: &str, pos: Position) -> Result<Vec<ArgPart>, ShellError> {
    let inner = text
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .ok_or_else(|| ShellError::lex("malformed double-quoted literal", pos))?;
    let decoded = decode_escapes(inner, pos)?;

    let var_pattern = Regex::new(r"^\$[_a-zA-Z][_a-zA-Z0-9]*").expect("static pattern");
    let expr_matcher = ExprMatcher;

    let mut parts = Vec::new();
    let mut rest = decoded.as_str();
    while !rest.is_empty() {
        if rest.starts_with('$') {
            if let Some(m) = var_pattern.find(rest) {
                let matched = m.as_str().to_string();
                rest = &rest[matched.len()..];
                parts.push(ArgPart::Substitution(matched));
                continue;
            }
            if let Some((TokenKind::Substitution, matched, consumed)) = expr_matcher.try_match(rest, pos)? {
                rest = &rest[consumed..];
                parts.push(ArgPart::Substitution(matched));
                continue;
            }
            parts.push(ArgPart::SingleQuoted("$".to_string()));
            rest = &rest[1..];
            continue;
        }
        match rest.find('$') {
            Some(idx) => {
                parts.push(ArgPart::SingleQuoted(rest[..idx].to_string()));
                rest = &rest[idx..];
            }
            None => {
                parts.push(ArgPart::SingleQuoted(rest.to_string()));
                rest = "";
            }
        }
    }
    Ok(parts)
}
