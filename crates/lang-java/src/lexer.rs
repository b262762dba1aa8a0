//! Java lexer for the outlining grammar, built on logos.
//!
//! Structural keywords, modifiers, and primitives get their own tokens;
//! statement-level keywords lex as identifiers because the outline parser
//! scans method bodies as balanced blocks and never needs to distinguish
//! them. Comments and whitespace are trivia. Bytes no rule matches become
//! lex errors, not aborts.

use logos::Logos;

use treeline_core::{ParseError, Span};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\u{000C}]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub(crate) enum JavaToken {
    #[token("package")]
    Package,
    #[token("import")]
    Import,
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("enum")]
    Enum,
    #[token("record")]
    Record,
    #[token("extends")]
    Extends,
    #[token("implements")]
    Implements,
    #[token("permits")]
    Permits,
    #[token("throws")]
    Throws,
    #[token("new")]
    New,
    #[token("void")]
    Void,

    #[token("public")]
    Public,
    #[token("protected")]
    Protected,
    #[token("private")]
    Private,
    #[token("static")]
    Static,
    #[token("final")]
    Final,
    #[token("abstract")]
    Abstract,
    #[token("native")]
    Native,
    #[token("synchronized")]
    Synchronized,
    #[token("transient")]
    Transient,
    #[token("volatile")]
    Volatile,
    #[token("strictfp")]
    Strictfp,
    #[token("sealed")]
    Sealed,
    #[token("default")]
    Default,

    #[regex(r"int|long|short|byte|char|boolean|float|double", priority = 3)]
    Primitive,

    #[regex(r"[A-Za-z_$][A-Za-z0-9_$]*")]
    Ident,

    #[regex(r"0[xX][0-9a-fA-F_]+[lL]?|[0-9][0-9_]*\.?[0-9_]*(?:[eE][+-]?[0-9]+)?[fFdDlL]?")]
    Number,

    #[regex(r#""(?:[^"\\\n]|\\.)*""#)]
    Str,

    #[regex(r"'(?:[^'\\\n]|\\.)*'")]
    Chr,

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
    #[token(";")]
    Semi,
    #[token(",")]
    Comma,
    #[token("...")]
    Ellipsis,
    #[token(".")]
    Dot,
    #[token("@")]
    At,
    #[token("=")]
    Eq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("::")]
    ColonColon,
    #[token("->")]
    Arrow,

    /// Everything arithmetic/logical; the outline grammar treats these all
    /// alike. `=`, `<`, `>` stay separate because fields and generics need
    /// them.
    #[regex(r"[+\-*/%!&|^~]+")]
    Operator,
}

impl JavaToken {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            JavaToken::Package => "package",
            JavaToken::Import => "import",
            JavaToken::Class => "class",
            JavaToken::Interface => "interface",
            JavaToken::Enum => "enum",
            JavaToken::Record => "record",
            JavaToken::Extends => "extends",
            JavaToken::Implements => "implements",
            JavaToken::Permits => "permits",
            JavaToken::Throws => "throws",
            JavaToken::New => "new",
            JavaToken::Void => "void",
            JavaToken::Public => "public",
            JavaToken::Protected => "protected",
            JavaToken::Private => "private",
            JavaToken::Static => "static",
            JavaToken::Final => "final",
            JavaToken::Abstract => "abstract",
            JavaToken::Native => "native",
            JavaToken::Synchronized => "synchronized",
            JavaToken::Transient => "transient",
            JavaToken::Volatile => "volatile",
            JavaToken::Strictfp => "strictfp",
            JavaToken::Sealed => "sealed",
            JavaToken::Default => "default",
            JavaToken::Primitive => "primitive",
            JavaToken::Ident => "identifier",
            JavaToken::Number => "number",
            JavaToken::Str => "string",
            JavaToken::Chr => "char",
            JavaToken::LBrace => "{",
            JavaToken::RBrace => "}",
            JavaToken::LParen => "(",
            JavaToken::RParen => ")",
            JavaToken::LBracket => "[",
            JavaToken::RBracket => "]",
            JavaToken::Semi => ";",
            JavaToken::Comma => ",",
            JavaToken::Ellipsis => "...",
            JavaToken::Dot => ".",
            JavaToken::At => "@",
            JavaToken::Eq => "=",
            JavaToken::Lt => "<",
            JavaToken::Gt => ">",
            JavaToken::Question => "?",
            JavaToken::Colon => ":",
            JavaToken::ColonColon => "::",
            JavaToken::Arrow => "->",
            JavaToken::Operator => "operator",
        }
    }

    /// True for tokens that may open a member/type declaration; recovery
    /// resynchronizes on these.
    pub(crate) fn is_declaration_start(&self) -> bool {
        matches!(
            self,
            JavaToken::Package
                | JavaToken::Import
                | JavaToken::Class
                | JavaToken::Interface
                | JavaToken::Enum
                | JavaToken::Record
                | JavaToken::Public
                | JavaToken::Protected
                | JavaToken::Private
                | JavaToken::Static
                | JavaToken::Final
                | JavaToken::Abstract
                | JavaToken::At
        )
    }

    pub(crate) fn is_modifier(&self) -> bool {
        matches!(
            self,
            JavaToken::Public
                | JavaToken::Protected
                | JavaToken::Private
                | JavaToken::Static
                | JavaToken::Final
                | JavaToken::Abstract
                | JavaToken::Native
                | JavaToken::Synchronized
                | JavaToken::Transient
                | JavaToken::Volatile
                | JavaToken::Strictfp
                | JavaToken::Sealed
                | JavaToken::Default
        )
    }
}

pub(crate) struct Lexed {
    pub tokens: Vec<(JavaToken, Span)>,
    pub errors: Vec<ParseError>,
}

pub(crate) fn lex(text: &str) -> Lexed {
    let mut lexer = JavaToken::lexer(text);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = Span::new(range.start, range.end);
        match result {
            Ok(token) => tokens.push((token, span)),
            Err(()) => errors.push(ParseError::new(
                span,
                format!("unexpected character `{}`", &text[range]),
            )),
        }
    }
    Lexed { tokens, errors }
}
