//! IDL tokenizer.

use std::ops::Range;

use logos::Logos;

use crate::diagnostics::Diagnostic;

/// Token kinds of the IDL subset the front end understands.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+([^*/][^*]*\*+)*/")]
#[logos(skip r"#[^\n]*")]
pub enum TokenKind {
    // Keywords
    #[token("module")]
    Module,
    #[token("struct")]
    Struct,
    #[token("union")]
    Union,
    #[token("switch")]
    Switch,
    #[token("case")]
    Case,
    #[token("default")]
    Default,
    #[token("enum")]
    Enum,
    #[token("bitmask")]
    Bitmask,
    #[token("typedef")]
    Typedef,
    #[token("sequence")]
    Sequence,
    #[token("string")]
    String,
    #[token("boolean")]
    Boolean,
    #[token("char")]
    Char,
    #[token("octet")]
    Octet,
    #[token("int8")]
    Int8,
    #[token("uint8")]
    UInt8,
    #[token("int16")]
    Int16,
    #[token("uint16")]
    UInt16,
    #[token("int32")]
    Int32,
    #[token("uint32")]
    UInt32,
    #[token("int64")]
    Int64,
    #[token("uint64")]
    UInt64,
    #[token("short")]
    Short,
    #[token("long")]
    Long,
    #[token("unsigned")]
    Unsigned,
    #[token("float")]
    Float,
    #[token("double")]
    Double,
    #[token("TRUE")]
    True,
    #[token("FALSE")]
    False,

    // Punctuation
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token(";")]
    Semi,
    #[token("::")]
    ColonColon,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,
    #[token("@")]
    At,
    #[token("-")]
    Minus,
    #[token("=")]
    Eq,

    // Literals and identifiers
    #[regex(r"0[xX][0-9a-fA-F]+|[0-9]+")]
    Integer,
    #[regex(r#""([^"\\]|\\.)*""#)]
    StringLit,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    /// End of input; never produced by the regex set.
    Eof,
}

impl TokenKind {
    /// Description for "expected ..." messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Module => "`module`",
            TokenKind::Struct => "`struct`",
            TokenKind::Union => "`union`",
            TokenKind::Switch => "`switch`",
            TokenKind::Case => "`case`",
            TokenKind::Default => "`default`",
            TokenKind::Enum => "`enum`",
            TokenKind::Bitmask => "`bitmask`",
            TokenKind::Typedef => "`typedef`",
            TokenKind::Sequence => "`sequence`",
            TokenKind::String => "`string`",
            TokenKind::LBrace => "`{`",
            TokenKind::RBrace => "`}`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::Lt => "`<`",
            TokenKind::Gt => "`>`",
            TokenKind::Semi => "`;`",
            TokenKind::ColonColon => "`::`",
            TokenKind::Colon => "`:`",
            TokenKind::Comma => "`,`",
            TokenKind::At => "`@`",
            TokenKind::Minus => "`-`",
            TokenKind::Eq => "`=`",
            TokenKind::Integer => "integer literal",
            TokenKind::StringLit => "string literal",
            TokenKind::Ident => "identifier",
            TokenKind::Eof => "end of input",
            _ => "type keyword",
        }
    }
}

/// A token with its byte range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Range<usize>,
}

/// Splits `source` into tokens, ending with [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, Vec<Diagnostic>> {
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    let mut lexer = TokenKind::lexer(source);

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        match result {
            Ok(kind) => tokens.push(Token { kind, span }),
            Err(()) => errors.push(
                Diagnostic::error(format!("unexpected character `{}`", &source[span.clone()]), span)
                    .with_label("not valid in IDL"),
            ),
        }
    }
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: source.len()..source.len(),
    });

    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}
