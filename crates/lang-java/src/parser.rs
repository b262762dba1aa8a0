//! Recursive-descent outline parser for Java.
//!
//! This is an outlining grammar, not a compiler front end: it understands
//! compilation units, type declarations, and member signatures precisely,
//! and scans statement bodies as balanced token blocks with just enough
//! structure to report missing-expression errors. Every error is recorded
//! and recovered from; one bad region must not blank out the outline of
//! the rest of the document.

use tokio_util::sync::CancellationToken;

use treeline_core::{OutlineKind, OutlineNode, OutlineTree, ParseError, Span};

use crate::lexer::JavaToken;

pub(crate) struct Parsed {
    pub tree: OutlineTree,
    pub errors: Vec<ParseError>,
    pub cancelled: bool,
}

pub(crate) fn parse(
    text: &str,
    tokens: &[(JavaToken, Span)],
    cancel: &CancellationToken,
) -> Parsed {
    Parser {
        text,
        tokens,
        pos: 0,
        errors: Vec::new(),
        cancel,
        cancelled: false,
        steps: 0,
    }
    .run()
}

struct Parser<'a> {
    text: &'a str,
    tokens: &'a [(JavaToken, Span)],
    pos: usize,
    errors: Vec<ParseError>,
    cancel: &'a CancellationToken,
    cancelled: bool,
    steps: u32,
}

/// Tokens that terminate an `=` with no expression after it.
const EXPRESSION_CLOSERS: [JavaToken; 4] = [
    JavaToken::Semi,
    JavaToken::RBrace,
    JavaToken::RParen,
    JavaToken::Comma,
];

impl<'a> Parser<'a> {
    // ---- token plumbing ----

    fn peek(&self) -> Option<JavaToken> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn peek2(&self) -> Option<JavaToken> {
        self.tokens.get(self.pos + 1).map(|(t, _)| *t)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| self.eof_span())
    }

    fn eof_span(&self) -> Span {
        Span::new(self.text.len(), self.text.len())
    }

    fn bump(&mut self) -> Span {
        let span = self.current_span();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        span
    }

    fn at(&self, token: JavaToken) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: JavaToken) -> Option<Span> {
        if self.at(token) { Some(self.bump()) } else { None }
    }

    fn text_of(&self, span: Span) -> &'a str {
        &self.text[span.start..span.end]
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors.push(ParseError::new(span, message));
    }

    /// Cancellation checkpoint; cheap enough for loop heads, counted down
    /// inside token-at-a-time scans.
    fn check_cancel(&mut self) -> bool {
        if self.cancelled {
            return true;
        }
        if self.cancel.is_cancelled() {
            self.cancelled = true;
        }
        self.cancelled
    }

    fn check_cancel_counted(&mut self) -> bool {
        self.steps += 1;
        if self.steps % 256 == 0 {
            return self.check_cancel();
        }
        self.cancelled
    }

    // ---- compilation unit ----

    fn run(mut self) -> Parsed {
        let mut roots = Vec::new();

        if self.at(JavaToken::Package) {
            self.package_declaration();
        }
        if let Some(span) = self.import_declarations() {
            roots.push(OutlineNode::new(OutlineKind::Region, None, span));
        }

        while !self.check_cancel() {
            match self.peek() {
                None => break,
                Some(JavaToken::Semi) => {
                    self.bump();
                }
                Some(_) => {
                    let start = self.current_span();
                    self.skip_annotations_and_modifiers();
                    match self.peek() {
                        Some(
                            JavaToken::Class
                            | JavaToken::Interface
                            | JavaToken::Enum
                            | JavaToken::Record,
                        ) => roots.push(self.type_declaration(start)),
                        Some(other) => {
                            let span = self.current_span();
                            self.error(
                                span,
                                format!("expected type declaration, found `{}`", other.name()),
                            );
                            self.sync_top_level();
                        }
                        None => {
                            self.error(self.eof_span(), "expected type declaration");
                            break;
                        }
                    }
                }
            }
        }

        Parsed {
            tree: OutlineTree { roots },
            errors: self.errors,
            cancelled: self.cancelled,
        }
    }

    fn package_declaration(&mut self) {
        self.bump(); // package
        while matches!(self.peek(), Some(JavaToken::Ident | JavaToken::Dot)) {
            self.bump();
        }
        if self.eat(JavaToken::Semi).is_none() {
            let span = self.current_span();
            self.error(span, "expected `;` after package declaration");
        }
    }

    /// Consumes consecutive imports; returns the span they cover so the
    /// caller can emit one foldable region for the whole group.
    fn import_declarations(&mut self) -> Option<Span> {
        let mut region: Option<Span> = None;
        while self.at(JavaToken::Import) {
            let start = self.bump();
            let mut end = start;
            while matches!(
                self.peek(),
                Some(JavaToken::Ident | JavaToken::Dot | JavaToken::Static | JavaToken::Operator)
            ) {
                end = self.bump();
            }
            match self.eat(JavaToken::Semi) {
                Some(semi) => end = semi,
                None => {
                    let span = self.current_span();
                    self.error(span, "expected `;` after import declaration");
                }
            }
            let import = start.merge(end);
            region = Some(region.map_or(import, |r| r.merge(import)));
        }
        region
    }

    /// Skip one bad top-level construct: everything up to the next token
    /// that can open a declaration, or past one `;`/`}`.
    fn sync_top_level(&mut self) {
        while let Some(token) = self.peek() {
            if token.is_declaration_start() {
                return;
            }
            self.bump();
            if matches!(token, JavaToken::Semi | JavaToken::RBrace) {
                return;
            }
            if self.check_cancel_counted() {
                return;
            }
        }
    }

    fn skip_annotations_and_modifiers(&mut self) {
        loop {
            match self.peek() {
                Some(JavaToken::At) => {
                    // `@interface` is a declaration, not a use.
                    if self.peek2() == Some(JavaToken::Interface) {
                        self.bump();
                        return;
                    }
                    self.bump();
                    if self.at(JavaToken::Ident) {
                        self.bump();
                        while self.at(JavaToken::Dot) {
                            self.bump();
                            if self.eat(JavaToken::Ident).is_none() {
                                break;
                            }
                        }
                    } else {
                        let span = self.current_span();
                        self.error(span, "expected annotation name after `@`");
                    }
                    if self.at(JavaToken::LParen) {
                        self.skip_parens();
                    }
                }
                Some(token) if token.is_modifier() => {
                    self.bump();
                }
                _ => return,
            }
        }
    }

    // ---- type declarations ----

    fn type_declaration(&mut self, start: Span) -> OutlineNode {
        let keyword = match self.peek() {
            Some(t) => t,
            None => return OutlineNode::new(OutlineKind::Class, None, start),
        };
        let kind = match keyword {
            JavaToken::Interface => OutlineKind::Interface,
            JavaToken::Enum => OutlineKind::Enum,
            JavaToken::Record => OutlineKind::Record,
            _ => OutlineKind::Class,
        };
        let kw_span = self.bump();

        let name = match self.eat(JavaToken::Ident) {
            Some(span) => Some(self.text_of(span).to_string()),
            None => {
                let span = self.current_span();
                self.error(span, format!("expected name after `{}`", keyword.name()));
                None
            }
        };

        if self.at(JavaToken::Lt) {
            self.skip_angles();
        }
        if kind == OutlineKind::Record && self.at(JavaToken::LParen) {
            self.skip_parens();
        }

        // extends / implements / permits clauses, up to the body.
        while let Some(token) = self.peek() {
            match token {
                JavaToken::LBrace | JavaToken::Semi | JavaToken::RBrace => break,
                JavaToken::Class | JavaToken::Interface | JavaToken::Enum => break,
                _ => {
                    self.bump();
                }
            }
        }

        let mut node = OutlineNode::new(kind, name, start.merge(kw_span));
        if self.eat(JavaToken::LBrace).is_some() {
            if kind == OutlineKind::Enum {
                self.enum_body(&mut node);
            } else {
                self.class_body(&mut node);
            }
        } else {
            let span = self.current_span();
            self.error(span, format!("expected `{{` in {} declaration", kind.name()));
        }
        node
    }

    fn class_body(&mut self, node: &mut OutlineNode) {
        while !self.check_cancel() {
            match self.peek() {
                None => {
                    self.error(self.eof_span(), "unexpected end of file in type body");
                    node.span = node.span.merge(self.eof_span());
                    return;
                }
                Some(JavaToken::RBrace) => {
                    let close = self.bump();
                    node.span = node.span.merge(close);
                    return;
                }
                Some(JavaToken::Semi) => {
                    self.bump();
                }
                _ => {
                    let before = self.pos;
                    self.member(node);
                    if self.pos == before {
                        // Defensive progress guarantee; member() should
                        // always consume or leave a token the loop handles.
                        let span = self.bump();
                        self.error(span, "expected member declaration");
                    }
                }
            }
        }
    }

    fn member(&mut self, parent: &mut OutlineNode) {
        let start = self.current_span();
        self.skip_annotations_and_modifiers();

        match self.peek() {
            None => {}
            Some(
                JavaToken::Class | JavaToken::Interface | JavaToken::Enum | JavaToken::Record,
            ) => {
                let child = self.type_declaration(start);
                parent.children.push(child);
            }
            Some(JavaToken::LBrace) => {
                // static { ... } or instance initializer
                let body = self.block();
                parent
                    .children
                    .push(OutlineNode::new(OutlineKind::Block, None, start.merge(body)));
            }
            Some(JavaToken::RBrace | JavaToken::Semi) => {
                // Modifiers with nothing after them.
                let span = self.current_span();
                self.error(span, "expected member declaration");
            }
            Some(_) => self.member_rest(start, parent),
        }
    }

    /// Signature scan: consume type/name tokens until the shape of the
    /// member is known, then finish it as a method or field.
    fn member_rest(&mut self, start: Span, parent: &mut OutlineNode) {
        let mut last_ident: Option<(Span, String)> = None;
        loop {
            match self.peek() {
                None => {
                    self.error(self.eof_span(), "unexpected end of file in member declaration");
                    return;
                }
                Some(JavaToken::Ident | JavaToken::Record) => {
                    let span = self.bump();
                    last_ident = Some((span, self.text_of(span).to_string()));
                }
                Some(JavaToken::Lt) => self.skip_angles(),
                Some(JavaToken::LParen) => {
                    self.finish_method(start, last_ident, parent);
                    return;
                }
                Some(JavaToken::Eq) => {
                    self.finish_field_with_initializer(start, last_ident, parent);
                    return;
                }
                Some(JavaToken::Semi) => {
                    let semi = self.bump();
                    match last_ident {
                        Some((_, name)) => parent.children.push(OutlineNode::new(
                            OutlineKind::Field,
                            Some(name),
                            start.merge(semi),
                        )),
                        None => self.error(semi, "expected field name before `;`"),
                    }
                    return;
                }
                Some(JavaToken::RBrace) => {
                    let span = self.current_span();
                    self.error(span, "expected member declaration");
                    return;
                }
                Some(
                    JavaToken::Class | JavaToken::Interface | JavaToken::Enum,
                ) => {
                    // `int class ...` — let the body loop parse the type.
                    let span = self.current_span();
                    self.error(span, "expected member declaration");
                    return;
                }
                Some(JavaToken::LBrace) => {
                    let span = self.current_span();
                    self.error(span, "unexpected `{` in member declaration");
                    let body = self.block();
                    parent
                        .children
                        .push(OutlineNode::new(OutlineKind::Block, None, start.merge(body)));
                    return;
                }
                Some(_) => {
                    self.bump();
                }
            }
            if self.check_cancel_counted() {
                return;
            }
        }
    }

    fn finish_method(
        &mut self,
        start: Span,
        name: Option<(Span, String)>,
        parent: &mut OutlineNode,
    ) {
        if name.is_none() {
            let span = self.current_span();
            self.error(span, "expected method name before `(`");
        }
        let params = self.skip_parens();
        let mut end = params;

        // throws clause and annotations on it, up to the body or `;`.
        while let Some(token) = self.peek() {
            match token {
                JavaToken::LBrace | JavaToken::Semi | JavaToken::RBrace => break,
                JavaToken::Class | JavaToken::Interface | JavaToken::Enum => break,
                _ => {
                    end = self.bump();
                }
            }
        }

        match self.peek() {
            Some(JavaToken::LBrace) => end = self.block(),
            Some(JavaToken::Semi) => end = self.bump(),
            _ => {
                let span = self.current_span();
                self.error(span, "expected method body or `;`");
            }
        }

        parent.children.push(OutlineNode::new(
            OutlineKind::Method,
            name.map(|(_, n)| n),
            start.merge(end),
        ));
    }

    fn finish_field_with_initializer(
        &mut self,
        start: Span,
        name: Option<(Span, String)>,
        parent: &mut OutlineNode,
    ) {
        let eq = self.bump();
        if name.is_none() {
            self.error(eq, "expected field name before `=`");
        }
        self.expect_expression_after_eq();
        let end = self.scan_initializer(eq);
        parent.children.push(OutlineNode::new(
            OutlineKind::Field,
            name.map(|(_, n)| n),
            start.merge(end),
        ));
    }

    /// Reports `expected expression` when an `=` is immediately followed by
    /// a closer — the one error shape body scanning detects precisely.
    fn expect_expression_after_eq(&mut self) {
        match self.peek() {
            Some(token) if EXPRESSION_CLOSERS.contains(&token) => {
                let span = self.current_span();
                self.error(span, "expected expression");
            }
            None => {
                self.error(self.eof_span(), "expected expression");
            }
            _ => {}
        }
    }

    /// Consumes a field initializer through its terminating `;`, balancing
    /// nested delimiters (array initializers, lambdas, calls).
    fn scan_initializer(&mut self, from: Span) -> Span {
        let mut depth = 0usize;
        let mut end = from;
        loop {
            match self.peek() {
                None => {
                    self.error(self.eof_span(), "expected `;` after field initializer");
                    return end;
                }
                Some(JavaToken::Semi) if depth == 0 => return self.bump(),
                Some(JavaToken::LParen | JavaToken::LBracket | JavaToken::LBrace) => {
                    depth += 1;
                    end = self.bump();
                }
                Some(JavaToken::RBrace) if depth == 0 => {
                    let span = self.current_span();
                    self.error(span, "expected `;` after field initializer");
                    return end;
                }
                Some(JavaToken::RParen | JavaToken::RBracket | JavaToken::RBrace) => {
                    depth = depth.saturating_sub(1);
                    end = self.bump();
                }
                Some(JavaToken::Eq) => {
                    end = self.bump();
                    self.expect_expression_after_eq();
                }
                Some(_) => {
                    end = self.bump();
                }
            }
            if self.check_cancel_counted() {
                return end;
            }
        }
    }

    // ---- enums ----

    fn enum_body(&mut self, node: &mut OutlineNode) {
        while !self.check_cancel() {
            match self.peek() {
                None => {
                    self.error(self.eof_span(), "unexpected end of file in enum body");
                    node.span = node.span.merge(self.eof_span());
                    return;
                }
                Some(JavaToken::RBrace) => {
                    let close = self.bump();
                    node.span = node.span.merge(close);
                    return;
                }
                Some(JavaToken::Semi) => {
                    // Constants end; the rest reads like a class body.
                    self.bump();
                    self.class_body(node);
                    return;
                }
                Some(JavaToken::Comma) => {
                    self.bump();
                }
                Some(JavaToken::At) => self.skip_annotations_and_modifiers(),
                Some(JavaToken::Ident) => {
                    let name_span = self.bump();
                    let name = self.text_of(name_span).to_string();
                    if self.at(JavaToken::LParen) {
                        self.skip_parens();
                    }
                    if self.at(JavaToken::LBrace) {
                        // Constant with a body folds like a small class.
                        let body = self.block();
                        node.children.push(OutlineNode::new(
                            OutlineKind::Block,
                            Some(name),
                            name_span.merge(body),
                        ));
                    }
                }
                Some(other) => {
                    let span = self.bump();
                    self.error(
                        span,
                        format!("expected enum constant, found `{}`", other.name()),
                    );
                }
            }
        }
    }

    // ---- balanced scans ----

    /// Balanced `{ ... }` scan with missing-expression checks; returns the
    /// span from the opening to the matching closing brace.
    fn block(&mut self) -> Span {
        let open = self.bump();
        let mut end = open;
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    self.error(open, "unbalanced `{`");
                    return open.merge(self.eof_span());
                }
                Some(JavaToken::LBrace) => {
                    depth += 1;
                    end = self.bump();
                }
                Some(JavaToken::RBrace) => {
                    end = self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return open.merge(end);
                    }
                }
                Some(JavaToken::Eq) => {
                    end = self.bump();
                    self.expect_expression_after_eq();
                }
                Some(_) => {
                    end = self.bump();
                }
            }
            if self.check_cancel_counted() {
                return open.merge(end);
            }
        }
    }

    /// Balanced `( ... )` scan; returns the closing span.
    fn skip_parens(&mut self) -> Span {
        let open = self.bump();
        let mut end = open;
        let mut depth = 1usize;
        loop {
            match self.peek() {
                None => {
                    self.error(open, "unbalanced `(`");
                    return end;
                }
                Some(JavaToken::LParen) => {
                    depth += 1;
                    end = self.bump();
                }
                Some(JavaToken::RParen) => {
                    end = self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return end;
                    }
                }
                Some(_) => {
                    end = self.bump();
                }
            }
            if self.check_cancel_counted() {
                return end;
            }
        }
    }

    /// Generic argument/parameter skip. Bails silently at tokens generics
    /// cannot contain; the caller's scan continues from there.
    fn skip_angles(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                Some(JavaToken::Lt) => {
                    depth += 1;
                    self.bump();
                }
                Some(JavaToken::Gt) => {
                    self.bump();
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        return;
                    }
                }
                Some(JavaToken::LBrace | JavaToken::Semi | JavaToken::RBrace) | None => return,
                Some(_) => {
                    self.bump();
                }
            }
            if self.check_cancel_counted() {
                return;
            }
        }
    }
}
