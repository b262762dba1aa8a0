//! PHP lexer for the outlining grammar.
//!
//! A PHP document is markup with embedded `<?php … ?>` code regions; only
//! the regions are lexed, everything outside is trivia. Region boundaries
//! are found by hand, the region contents go through logos. Spans are
//! always absolute offsets into the full document text.

use logos::Logos;

use treeline_core::{ParseError, Span};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\u{000C}]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"#[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub(crate) enum PhpToken {
    #[token("function")]
    Function,
    #[token("class")]
    Class,
    #[token("interface")]
    Interface,
    #[token("trait")]
    Trait,
    #[token("enum")]
    Enum,
    #[token("extends")]
    Extends,
    #[token("implements")]
    Implements,
    #[token("namespace")]
    Namespace,
    #[token("use")]
    Use,
    #[token("const")]
    Const,
    #[token("case")]
    Case,
    #[token("new")]
    New,

    #[token("public")]
    Public,
    #[token("protected")]
    Protected,
    #[token("private")]
    Private,
    #[token("static")]
    Static,
    #[token("abstract")]
    Abstract,
    #[token("final")]
    Final,
    #[token("readonly")]
    Readonly,
    #[token("var")]
    Var,

    #[regex(r"\$[A-Za-z_][A-Za-z0-9_]*")]
    Variable,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Ident,

    #[regex(r"0[xX][0-9a-fA-F_]+|[0-9][0-9_]*\.?[0-9_]*(?:[eE][+-]?[0-9]+)?")]
    Number,

    // PHP strings may span lines.
    #[regex(r#""(?:[^"\\]|\\.)*""#)]
    #[regex(r"'(?:[^'\\]|\\.)*'")]
    Str,

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
    #[token("?->")]
    NullsafeArrow,
    #[token("=>")]
    FatArrow,
    #[token("\\")]
    Backslash,

    #[regex(r"[+\-*/%!&|^~.@]+")]
    Operator,
}

impl PhpToken {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            PhpToken::Function => "function",
            PhpToken::Class => "class",
            PhpToken::Interface => "interface",
            PhpToken::Trait => "trait",
            PhpToken::Enum => "enum",
            PhpToken::Extends => "extends",
            PhpToken::Implements => "implements",
            PhpToken::Namespace => "namespace",
            PhpToken::Use => "use",
            PhpToken::Const => "const",
            PhpToken::Case => "case",
            PhpToken::New => "new",
            PhpToken::Public => "public",
            PhpToken::Protected => "protected",
            PhpToken::Private => "private",
            PhpToken::Static => "static",
            PhpToken::Abstract => "abstract",
            PhpToken::Final => "final",
            PhpToken::Readonly => "readonly",
            PhpToken::Var => "var",
            PhpToken::Variable => "variable",
            PhpToken::Ident => "identifier",
            PhpToken::Number => "number",
            PhpToken::Str => "string",
            PhpToken::LBrace => "{",
            PhpToken::RBrace => "}",
            PhpToken::LParen => "(",
            PhpToken::RParen => ")",
            PhpToken::LBracket => "[",
            PhpToken::RBracket => "]",
            PhpToken::Semi => ";",
            PhpToken::Comma => ",",
            PhpToken::Eq => "=",
            PhpToken::Lt => "<",
            PhpToken::Gt => ">",
            PhpToken::Question => "?",
            PhpToken::Colon => ":",
            PhpToken::ColonColon => "::",
            PhpToken::Arrow => "->",
            PhpToken::NullsafeArrow => "?->",
            PhpToken::FatArrow => "=>",
            PhpToken::Backslash => "\\",
            PhpToken::Operator => "operator",
        }
    }

    pub(crate) fn is_modifier(&self) -> bool {
        matches!(
            self,
            PhpToken::Public
                | PhpToken::Protected
                | PhpToken::Private
                | PhpToken::Static
                | PhpToken::Abstract
                | PhpToken::Final
                | PhpToken::Readonly
                | PhpToken::Var
        )
    }
}

/// One `<?php … ?>` (or `<?= … ?>`) code region.
pub(crate) struct Region {
    /// From the opening tag through the closing tag (or end of text).
    pub span: Span,
    pub tokens: Vec<(PhpToken, Span)>,
}

pub(crate) struct Lexed {
    pub regions: Vec<Region>,
    pub errors: Vec<ParseError>,
}

pub(crate) fn lex(text: &str) -> Lexed {
    let mut regions = Vec::new();
    let mut errors = Vec::new();
    let mut pos = 0;

    while let Some(found) = text[pos..].find("<?") {
        let open = pos + found;
        let rest = &text[open..];
        let content_start = open
            + if rest.starts_with("<?php") {
                5
            } else if rest.starts_with("<?=") {
                3
            } else {
                2
            };
        let (content_end, region_end) = match text[content_start..].find("?>") {
            Some(at) => (content_start + at, content_start + at + 2),
            None => (text.len(), text.len()),
        };

        let mut tokens = Vec::new();
        let mut lexer = PhpToken::lexer(&text[content_start..content_end]);
        while let Some(result) = lexer.next() {
            let range = lexer.span();
            let span = Span::new(content_start + range.start, content_start + range.end);
            match result {
                Ok(token) => tokens.push((token, span)),
                Err(()) => errors.push(ParseError::new(
                    span,
                    format!(
                        "unexpected character `{}`",
                        &text[span.start..span.end]
                    ),
                )),
            }
        }

        regions.push(Region {
            span: Span::new(open, region_end),
            tokens,
        });
        pos = region_end;
        if pos >= text.len() {
            break;
        }
    }

    Lexed { regions, errors }
}
