//! Tokenizer for the reference front end.
//!
//! `logos` does the scanning; keywords are classified afterwards so that
//! contextual words (`var`, `get`, `from`, `select`, ...) stay identifiers.

use logos::Logos;
use smol_str::SmolStr;

use crate::base::{TextRange, TextSize};

use super::tree::{Token, TokenKind};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum RawToken {
    #[regex(r"//[^\n]*")]
    LineComment,

    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    BlockComment,

    #[regex(r"@?[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,

    #[regex(r"0[xX][0-9a-fA-F]+([uU][lL]?|[lL][uU]?)?")]
    #[regex(r"[0-9]+([uU][lL]?|[lL][uU]?)?")]
    Integer,

    #[regex(r"[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?[fFdDmM]?")]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+[fFdDmM]?")]
    #[regex(r"[0-9]+[fFdDmM]")]
    Real,

    #[regex(r#""([^"\\\n]|\\.)*""#)]
    #[regex(r#"@"([^"]|"")*""#)]
    String,

    #[regex(r"'([^'\\\n]|\\.[^']*)'")]
    Char,

    #[regex(r"=>|==|!=|<=|>=|&&|\|\||\+\+|--|\+=|-=|\*=|/=|\?\?")]
    #[regex(r"[{}()\[\]<>,;.:?=+\-*/%!&|\^~]")]
    Punct,
}

/// Reserved words. Contextual keywords are deliberately absent.
pub const KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "static", "string", "struct", "switch", "this", "throw", "true", "try",
    "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual", "void",
    "volatile", "while",
];

/// Keywords that name a built-in type.
pub const PREDEFINED_TYPES: &[&str] = &[
    "bool", "byte", "sbyte", "char", "decimal", "double", "float", "int", "uint", "long",
    "ulong", "short", "ushort", "object", "string", "void",
];

pub fn is_keyword(text: &str) -> bool {
    KEYWORDS.contains(&text)
}

pub fn is_predefined_type(text: &str) -> bool {
    PREDEFINED_TYPES.contains(&text)
}

/// Identifier text with a leading `@` verbatim marker removed.
pub fn decode_identifier(text: &str) -> &str {
    text.strip_prefix('@').unwrap_or(text)
}

/// Tokenizes `text`, dropping whitespace and comments. Unrecognized input
/// becomes `TokenKind::Error` tokens so the parser can recover.
pub fn tokenize(text: &str) -> Vec<Token> {
    let mut out = Vec::new();
    let mut lexer = RawToken::lexer(text);
    while let Some(raw) = lexer.next() {
        let span = lexer.span();
        let range = TextRange::new(
            TextSize::from(span.start as u32),
            TextSize::from(span.end as u32),
        );
        let slice = lexer.slice();
        let kind = match raw {
            Ok(RawToken::LineComment | RawToken::BlockComment) => continue,
            Ok(RawToken::Identifier) if is_keyword(slice) => TokenKind::Keyword,
            Ok(RawToken::Identifier) => TokenKind::Identifier,
            Ok(RawToken::Integer) => TokenKind::IntegerLiteral,
            Ok(RawToken::Real) => TokenKind::RealLiteral,
            Ok(RawToken::String) => TokenKind::StringLiteral,
            Ok(RawToken::Char) => TokenKind::CharLiteral,
            Ok(RawToken::Punct) => TokenKind::Punct,
            Err(()) => TokenKind::Error,
        };
        out.push(Token::new(kind, SmolStr::new(slice), range));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<(TokenKind, String)> {
        tokenize(text)
            .into_iter()
            .map(|t| (t.kind, t.text.to_string()))
            .collect()
    }

    #[test]
    fn test_keywords_and_contextual_words() {
        let toks = kinds("class var get from");
        assert_eq!(toks[0].0, TokenKind::Keyword);
        assert_eq!(toks[1].0, TokenKind::Identifier);
        assert_eq!(toks[2].0, TokenKind::Identifier);
        assert_eq!(toks[3].0, TokenKind::Identifier);
    }

    #[test]
    fn test_numeric_literal_suffixes() {
        let toks = kinds("1 2u 3L 4ul 0xFF 1.5 2f 3.0m 1e5");
        let expected = [
            TokenKind::IntegerLiteral,
            TokenKind::IntegerLiteral,
            TokenKind::IntegerLiteral,
            TokenKind::IntegerLiteral,
            TokenKind::IntegerLiteral,
            TokenKind::RealLiteral,
            TokenKind::RealLiteral,
            TokenKind::RealLiteral,
            TokenKind::RealLiteral,
        ];
        assert_eq!(toks.iter().map(|t| t.0).collect::<Vec<_>>(), expected);
    }

    #[test]
    fn test_comments_are_dropped_and_ranges_kept() {
        let toks = tokenize("a // note\n/* block */ b");
        assert_eq!(toks.len(), 2);
        assert_eq!(toks[1].text, "b");
        assert_eq!(u32::from(toks[1].range.start()), 22);
    }

    #[test]
    fn test_verbatim_identifier() {
        let toks = kinds("@class");
        assert_eq!(toks[0].0, TokenKind::Identifier);
        assert_eq!(decode_identifier(&toks[0].1), "class");
    }

    #[test]
    fn test_compound_punctuation() {
        let toks = kinds("x => y ?? z");
        assert_eq!(toks[1].1, "=>");
        assert_eq!(toks[3].1, "??");
        let generic = kinds("A<B<C>>");
        assert_eq!(generic.iter().filter(|t| t.1 == ">").count(), 2);
    }
}
