//! Token matchers: each accepts an input prefix and either returns
//! `(kind, matched_text, bytes_consumed)` or reports "no match". Tried in a
//! fixed priority order by the tokenizer; the first match wins.

use lazy_static::lazy_static;
use regex_lite::Regex;

use crate::error::{Position, ShellError};
use crate::tokenizer::token::TokenKind;

pub trait Matcher: Send + Sync {
    fn try_match(&self, input: &str, pos: Position) -> Result<Option<(TokenKind, String, usize)>, ShellError>;
}

/// Bound to one compiled pattern and one kind. The pattern is always
/// anchored to the start of the remaining input.
pub struct RegexMatcher {
    pattern: Regex,
    kind: TokenKind,
}

impl RegexMatcher {
    fn new(pattern: &str, kind: TokenKind) -> Self {
        Self { pattern: Regex::new(pattern).expect("static pattern"), kind }
    }
}

impl Matcher for RegexMatcher {
    fn try_match(&self, input: &str, _pos: Position) -> Result<Option<(TokenKind, String, usize)>, ShellError> {
        match self.pattern.find(input) {
            Some(m) if m.start() == 0 => {
                let text = m.as_str().to_string();
                let consumed = text.len();
                Ok(Some((self.kind, text, consumed)))
            }
            _ => Ok(None),
        }
    }
}

/// Consumes one host string literal when the input starts with `"` or `'`,
/// honouring backslash escapes of the delimiter and of the escape char
/// itself. Fails loudly on an unterminated literal.
pub struct StringMatcher;

impl Matcher for StringMatcher {
    fn try_match(&self, input: &str, pos: Position) -> Result<Option<(TokenKind, String, usize)>, ShellError> {
        let quote = match input.chars().next() {
            Some(c @ ('"' | '\'')) => c,
            _ => return Ok(None),
        };
        let kind = if quote == '"' { TokenKind::DoubleQuoted } else { TokenKind::SingleQuoted };

        let mut chars = input.char_indices();
        chars.next(); // the opening quote
        let mut escaped = false;
        for (idx, c) in chars {
            if escaped {
                escaped = false;
                continue;
            }
            match c {
                '\\' => escaped = true,
                c if c == quote => {
                    let end = idx + c.len_utf8();
                    return Ok(Some((kind, input[..end].to_string(), end)));
                }
                _ => {}
            }
        }
        Err(ShellError::lex(
            format!("unterminated string literal starting with {quote:?}"),
            pos,
        ))
    }
}

/// Consumes `${...}`, tracking balanced braces to find the matching `}`.
/// The enclosed text is handed to the host-expression evaluator later; the
/// matcher itself only needs to find where the expression ends.
pub struct ExprMatcher;

impl Matcher for ExprMatcher {
    fn try_match(&self, input: &str, pos: Position) -> Result<Option<(TokenKind, String, usize)>, ShellError> {
        if !input.starts_with("${") {
            return Ok(None);
        }
        let mut depth = 1usize;
        let mut iter = input.char_indices().skip(2);
        for (idx, c) in &mut iter {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let end = idx + 1;
                        return Ok(Some((TokenKind::Substitution, input[..end].to_string(), end)));
                    }
                }
                _ => {}
            }
        }
        Err(ShellError::lex("unclosed ${...} substitution", pos))
    }
}

/// Scans a run of unquoted literal characters. `-` and `=` are literal
/// unless immediately followed by `>`, so that `->`/`=>` tokenize as their
/// own operators rather than being swallowed here.
pub struct LiteralMatcher;

fn is_plain_literal_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '%' | '*' | '+' | ',' | '.' | '/' | ':' | '?' | '@' | '[' | '\\' | ']' | '^' | '_' | '{' | '}' | '~'
        )
}

impl Matcher for LiteralMatcher {
    fn try_match(&self, input: &str, _pos: Position) -> Result<Option<(TokenKind, String, usize)>, ShellError> {
        let mut end = 0;
        let mut chars = input.char_indices().peekable();
        while let Some((idx, c)) = chars.peek().copied() {
            let next_char = input[idx + c.len_utf8()..].chars().next();
            let included = if is_plain_literal_char(c) {
                true
            } else if c == '-' || c == '=' {
                next_char != Some('>')
            } else {
                false
            };
            if !included {
                break;
            }
            end = idx + c.len_utf8();
            chars.next();
        }
        if end == 0 {
            Ok(None)
        } else {
            Ok(Some((TokenKind::Literal, input[..end].to_string(), end)))
        }
    }
}

lazy_static! {
    /// The fixed priority list from the component contract, compiled once.
    /// First match wins.
    static ref MATCHERS: Vec<Box<dyn Matcher>> = vec![
        Box::new(RegexMatcher::new(r"^\d*>>?(&\d+)?", TokenKind::Redirect)),
        Box::new(RegexMatcher::new(r"^&&", TokenKind::AndOp)),
        // must precede the single-pipe matcher
        Box::new(RegexMatcher::new(r"^\|\|", TokenKind::OrOp)),
        Box::new(RegexMatcher::new(r"^\|", TokenKind::Pipe)),
        Box::new(RegexMatcher::new(r"^->", TokenKind::RightArrow)),
        Box::new(RegexMatcher::new(r"^=>", TokenKind::BoldRightArrow)),
        Box::new(RegexMatcher::new(r"^\(", TokenKind::ParenOpen)),
        Box::new(RegexMatcher::new(r"^\)", TokenKind::ParenClose)),
        Box::new(RegexMatcher::new(r"^;", TokenKind::Semicolon)),
        Box::new(RegexMatcher::new(r"^`", TokenKind::Backquote)),
        Box::new(StringMatcher),
        Box::new(RegexMatcher::new(r"^\$[_a-zA-Z][_a-zA-Z0-9]*", TokenKind::Substitution)),
        Box::new(ExprMatcher),
        Box::new(RegexMatcher::new(r"^\$", TokenKind::Literal)),
        Box::new(RegexMatcher::new(r"^[ \t]+", TokenKind::Space)),
        Box::new(LiteralMatcher),
    ];
}

/// The fixed priority list from the component contract. Patterns are
/// compiled once and shared across every `Tokenizer`.
pub fn matchers() -> &'static [Box<dyn Matcher>] {
    &MATCHERS
}
