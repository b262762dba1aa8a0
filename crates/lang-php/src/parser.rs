//! Recursive-descent outline parser for PHP.
//!
//! PHP interleaves markup and code, so the parser walks one code region
//! at a time and emits a foldable region root for each. Inside a region
//! it recognizes namespaces, use groups, functions, and type bodies
//! precisely; top-level statements and function bodies are scanned as
//! balanced token runs with missing-expression checks. Every error is
//! recorded and recovered from so one bad construct cannot blank out
//! the rest of the outline.

use tokio_util::sync::CancellationToken;

use treeline_core::{OutlineKind, OutlineNode, OutlineTree, ParseError, Span};

use crate::lexer::{PhpToken, Region};

pub(crate) struct Parsed {
    pub tree: OutlineTree,
    pub errors: Vec<ParseError>,
    pub cancelled: bool,
}

pub(crate) fn parse(text: &str, regions: &[Region], cancel: &CancellationToken) -> Parsed {
    Parser {
        text,
        regions,
        tokens: &[],
        pos: 0,
        region_end: text.len(),
        errors: Vec::new(),
        cancel,
        cancelled: false,
        steps: 0,
    }
    .run()
}

struct Parser<'a> {
    text: &'a str,
    regions: &'a [Region],
    tokens: &'a [(PhpToken, Span)],
    pos: usize,
    region_end: usize,
    errors: Vec<ParseError>,
    cancel: &'a CancellationToken,
    cancelled: bool,
    steps: u32,
}

/// Tokens that terminate an `=` with no expression after it.
const EXPRESSION_CLOSERS: [PhpToken; 5] = [
    PhpToken::Semi,
    PhpToken::RBrace,
    PhpToken::RParen,
    PhpToken::RBracket,
    PhpToken::Comma,
];

impl<'a> Parser<'a> {
    // ---- token plumbing ----

    fn peek(&self) -> Option<PhpToken> {
        self.tokens.get(self.pos).map(|(t, _)| *t)
    }

    fn peek2(&self) -> Option<PhpToken> {
        self.tokens.get(self.pos + 1).map(|(t, _)| *t)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|(_, s)| *s)
            .unwrap_or_else(|| self.eof_span())
    }

    fn eof_span(&self) -> Span {
        Span::new(self.region_end, self.region_end)
    }

    fn bump(&mut self) -> Span {
        let span = self.current_span();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        span
    }

    fn at(&self, token: PhpToken) -> bool {
        self.peek() == Some(token)
    }

    fn eat(&mut self, token: PhpToken) -> Option<Span> {
        if self.at(token) { Some(self.bump()) } else { None }
    }

    fn text_of(&self, span: Span) -> &'a str {
        &self.text[span.start..span.end]
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.errors.push(ParseError::new(span, message));
    }

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

    // ---- regions ----

    fn run(mut self) -> Parsed {
        let mut roots = Vec::new();

        for region in self.regions {
            if self.check_cancel() {
                break;
            }
            self.tokens = &region.tokens;
            self.pos = 0;
            self.region_end = region.span.end;

            let mut node = OutlineNode::new(OutlineKind::Region, None, region.span);
            self.items(&mut node, false);
            roots.push(node);
        }

        Parsed {
            tree: OutlineTree { roots },
            errors: self.errors,
            cancelled: self.cancelled,
        }
    }

    /// Declarations and statements inside a region or a braced namespace
    /// body. Stops before the closing `}` when `inside_namespace` so the
    /// caller can consume it.
    fn items(&mut self, node: &mut OutlineNode, inside_namespace: bool) {
        while !self.check_cancel() {
            match self.peek() {
                None => return,
                Some(PhpToken::RBrace) if inside_namespace => return,
                Some(PhpToken::RBrace) => {
                    let span = self.bump();
                    self.error(span, "unexpected `}`");
                }
                Some(PhpToken::Semi) => {
                    self.bump();
                }
                Some(PhpToken::Namespace) => self.namespace_declaration(node),
                Some(PhpToken::Use) => {
                    if let Some(span) = self.use_declarations() {
                        node.children
                            .push(OutlineNode::new(OutlineKind::Region, None, span));
                    }
                }
                Some(
                    PhpToken::Class | PhpToken::Interface | PhpToken::Trait | PhpToken::Enum,
                ) => {
                    let start = self.current_span();
                    let child = self.type_declaration(start);
                    node.children.push(child);
                }
                Some(token) if token.is_modifier() && self.modifiers_lead_to_type() => {
                    let start = self.current_span();
                    while self.peek().is_some_and(|t| t.is_modifier()) {
                        self.bump();
                    }
                    let child = self.type_declaration(start);
                    node.children.push(child);
                }
                Some(PhpToken::Function) if self.peek2() == Some(PhpToken::Ident) => {
                    let start = self.current_span();
                    let child = self.function_like(start, OutlineKind::Function);
                    node.children.push(child);
                }
                Some(_) => self.statement(),
            }
        }
    }

    fn modifiers_lead_to_type(&self) -> bool {
        let mut at = self.pos;
        while let Some((token, _)) = self.tokens.get(at) {
            if token.is_modifier() {
                at += 1;
            } else {
                return matches!(
                    token,
                    PhpToken::Class | PhpToken::Interface | PhpToken::Trait | PhpToken::Enum
                );
            }
        }
        false
    }

    fn namespace_declaration(&mut self, node: &mut OutlineNode) {
        self.bump(); // namespace
        while matches!(self.peek(), Some(PhpToken::Ident | PhpToken::Backslash)) {
            self.bump();
        }
        match self.peek() {
            Some(PhpToken::LBrace) => {
                self.bump();
                self.items(node, true);
                if self.eat(PhpToken::RBrace).is_none() {
                    self.error(self.eof_span(), "unbalanced `{` in namespace body");
                }
            }
            Some(PhpToken::Semi) => {
                self.bump();
            }
            _ => {
                let span = self.current_span();
                self.error(span, "expected `;` or `{` after namespace declaration");
            }
        }
    }

    /// Consecutive `use` imports collapse into one foldable span. Group
    /// imports carry braces, so the scan balances them before trusting a
    /// `;` to end the statement.
    fn use_declarations(&mut self) -> Option<Span> {
        let mut region: Option<Span> = None;
        while self.at(PhpToken::Use) {
            let start = self.bump();
            let mut end = start;
            let mut depth = 0usize;
            loop {
                match self.peek() {
                    None => {
                        self.error(self.eof_span(), "expected `;` after use declaration");
                        break;
                    }
                    Some(PhpToken::Semi) if depth == 0 => {
                        end = self.bump();
                        break;
                    }
                    Some(PhpToken::LBrace) => {
                        depth += 1;
                        end = self.bump();
                    }
                    Some(PhpToken::RBrace) => {
                        if depth == 0 {
                            self.error(self.current_span(), "expected `;` after use declaration");
                            break;
                        }
                        depth -= 1;
                        end = self.bump();
                    }
                    Some(_) => {
                        end = self.bump();
                    }
                }
                if self.check_cancel_counted() {
                    break;
                }
            }
            let import = start.merge(end);
            region = Some(region.map_or(import, |r| r.merge(import)));
        }
        region
    }

    /// Balanced statement scan; stops after a top-level `;`, or before a
    /// token that opens a declaration.
    fn statement(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek() {
                None => return,
                Some(PhpToken::Semi) if depth == 0 => {
                    self.bump();
                    return;
                }
                Some(PhpToken::RBrace) if depth == 0 => return,
                Some(
                    PhpToken::Class
                    | PhpToken::Interface
                    | PhpToken::Trait
                    | PhpToken::Enum
                    | PhpToken::Namespace,
                ) if depth == 0 => return,
                Some(PhpToken::Function) if depth == 0 && self.peek2() == Some(PhpToken::Ident) => {
                    return;
                }
                Some(PhpToken::LBrace | PhpToken::LParen | PhpToken::LBracket) => {
                    depth += 1;
                    self.bump();
                }
                Some(PhpToken::RBrace | PhpToken::RParen | PhpToken::RBracket) => {
                    depth = depth.saturating_sub(1);
                    self.bump();
                }
                Some(PhpToken::Eq) => {
                    self.bump();
                    self.expect_expression_after_eq();
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

    // ---- type declarations ----

    fn type_declaration(&mut self, start: Span) -> OutlineNode {
        let keyword = match self.peek() {
            Some(t) => t,
            None => return OutlineNode::new(OutlineKind::Class, None, start),
        };
        let kind = match keyword {
            PhpToken::Interface => OutlineKind::Interface,
            PhpToken::Trait => OutlineKind::Trait,
            PhpToken::Enum => OutlineKind::Enum,
            _ => OutlineKind::Class,
        };
        let kw_span = self.bump();

        let name = match self.eat(PhpToken::Ident) {
            Some(span) => Some(self.text_of(span).to_string()),
            None => {
                let span = self.current_span();
                self.error(span, format!("expected name after `{}`", keyword.name()));
                None
            }
        };

        // extends / implements / enum backing type, up to the body.
        while let Some(token) = self.peek() {
            match token {
                PhpToken::LBrace | PhpToken::Semi | PhpToken::RBrace => break,
                _ => {
                    self.bump();
                }
            }
        }

        let mut node = OutlineNode::new(kind, name, start.merge(kw_span));
        if self.eat(PhpToken::LBrace).is_some() {
            self.class_body(&mut node);
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
                Some(PhpToken::RBrace) => {
                    let close = self.bump();
                    node.span = node.span.merge(close);
                    return;
                }
                Some(PhpToken::Semi) => {
                    self.bump();
                }
                _ => {
                    let before = self.pos;
                    self.member(node);
                    if self.pos == before {
                        let span = self.bump();
                        self.error(span, "expected member declaration");
                    }
                }
            }
        }
    }

    fn member(&mut self, parent: &mut OutlineNode) {
        let start = self.current_span();
        while self.peek().is_some_and(|t| t.is_modifier()) {
            self.bump();
        }

        match self.peek() {
            None => {}
            Some(PhpToken::Function) => {
                let child = self.function_like(start, OutlineKind::Method);
                parent.children.push(child);
            }
            Some(PhpToken::Const) => self.const_members(start, parent),
            Some(PhpToken::Case) => self.enum_case(start, parent),
            Some(PhpToken::Use) => self.trait_use(),
            Some(PhpToken::Variable) => self.property(start, parent),
            Some(PhpToken::RBrace | PhpToken::Semi) => {
                // Modifiers with nothing after them.
                let span = self.current_span();
                self.error(span, "expected member declaration");
            }
            Some(_) => self.typed_property(start, parent),
        }
    }

    /// Property type scan: consume type tokens until the `$name` that
    /// makes the member a property.
    fn typed_property(&mut self, start: Span, parent: &mut OutlineNode) {
        loop {
            match self.peek() {
                None => {
                    self.error(self.eof_span(), "unexpected end of file in member declaration");
                    return;
                }
                Some(PhpToken::Variable) => {
                    self.property(start, parent);
                    return;
                }
                Some(PhpToken::Function) => {
                    let child = self.function_like(start, OutlineKind::Method);
                    parent.children.push(child);
                    return;
                }
                Some(PhpToken::Semi | PhpToken::RBrace) => {
                    let span = self.current_span();
                    self.error(span, "expected member declaration");
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

    fn property(&mut self, start: Span, parent: &mut OutlineNode) {
        let var_span = self.bump();
        let name = self.text_of(var_span).to_string();
        let end = match self.peek() {
            Some(PhpToken::Eq) => {
                let eq = self.bump();
                self.expect_expression_after_eq();
                self.scan_initializer(eq)
            }
            Some(PhpToken::Semi) => self.bump(),
            _ => {
                let span = self.current_span();
                self.error(span, "expected `;` after property declaration");
                var_span
            }
        };
        parent.children.push(OutlineNode::new(
            OutlineKind::Field,
            Some(name),
            start.merge(end),
        ));
    }

    /// One `const` statement may declare several names; each becomes its
    /// own field node.
    fn const_members(&mut self, start: Span, parent: &mut OutlineNode) {
        self.bump(); // const
        loop {
            let name = match self.eat(PhpToken::Ident) {
                Some(span) => Some(self.text_of(span).to_string()),
                None => {
                    let span = self.current_span();
                    self.error(span, "expected constant name after `const`");
                    None
                }
            };
            let mut end = match self.peek() {
                Some(PhpToken::Eq) => {
                    let eq = self.bump();
                    self.expect_expression_after_eq();
                    self.scan_value(eq)
                }
                _ => self.current_span(),
            };
            let more = self.at(PhpToken::Comma);
            if more {
                self.bump();
            } else {
                match self.eat(PhpToken::Semi) {
                    Some(semi) => end = semi,
                    None => {
                        let span = self.current_span();
                        self.error(span, "expected `;` after constant declaration");
                    }
                }
            }
            if let Some(name) = name {
                parent.children.push(OutlineNode::new(
                    OutlineKind::Field,
                    Some(name),
                    start.merge(end),
                ));
            }
            if !more {
                return;
            }
            if self.check_cancel() {
                return;
            }
        }
    }

    fn enum_case(&mut self, start: Span, parent: &mut OutlineNode) {
        self.bump(); // case
        let name = match self.eat(PhpToken::Ident) {
            Some(span) => Some(self.text_of(span).to_string()),
            None => {
                let span = self.current_span();
                self.error(span, "expected case name after `case`");
                None
            }
        };
        let mut end = self.current_span();
        if self.at(PhpToken::Eq) {
            let eq = self.bump();
            self.expect_expression_after_eq();
            end = self.scan_value(eq);
        }
        match self.eat(PhpToken::Semi) {
            Some(semi) => end = semi,
            None => {
                let span = self.current_span();
                self.error(span, "expected `;` after enum case");
            }
        }
        if let Some(name) = name {
            parent.children.push(OutlineNode::new(
                OutlineKind::Field,
                Some(name),
                start.merge(end),
            ));
        }
    }

    /// `use Trait;` inside a body, with an optional conflict-resolution
    /// block. Produces no outline node.
    fn trait_use(&mut self) {
        self.bump(); // use
        loop {
            match self.peek() {
                None => {
                    self.error(self.eof_span(), "expected `;` after trait use");
                    return;
                }
                Some(PhpToken::Semi) => {
                    self.bump();
                    return;
                }
                Some(PhpToken::LBrace) => {
                    self.block();
                    return;
                }
                Some(PhpToken::RBrace) => {
                    let span = self.current_span();
                    self.error(span, "expected `;` after trait use");
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

    // ---- functions ----

    fn function_like(&mut self, start: Span, kind: OutlineKind) -> OutlineNode {
        self.bump(); // function
        if self.at(PhpToken::Operator) {
            self.bump(); // by-reference `&`
        }

        let name = match self.eat(PhpToken::Ident) {
            Some(span) => Some(self.text_of(span).to_string()),
            None => {
                let span = self.current_span();
                self.error(span, "expected name after `function`");
                None
            }
        };

        let mut end = start;
        if self.at(PhpToken::LParen) {
            end = self.skip_parens();
        } else {
            let span = self.current_span();
            self.error(span, "expected `(` after function name");
        }

        // Return type, up to the body or `;`.
        while let Some(token) = self.peek() {
            match token {
                PhpToken::LBrace | PhpToken::Semi | PhpToken::RBrace => break,
                _ => {
                    end = self.bump();
                }
            }
        }

        match self.peek() {
            Some(PhpToken::LBrace) => end = self.block(),
            Some(PhpToken::Semi) => end = self.bump(),
            _ => {
                let span = self.current_span();
                self.error(span, "expected function body or `;`");
            }
        }

        OutlineNode::new(kind, name, start.merge(end))
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

    /// Consumes an initializer through its terminating `;`, balancing
    /// nested delimiters (arrays, closures, calls).
    fn scan_initializer(&mut self, from: Span) -> Span {
        let mut depth = 0usize;
        let mut end = from;
        loop {
            match self.peek() {
                None => {
                    self.error(self.eof_span(), "expected `;` after initializer");
                    return end;
                }
                Some(PhpToken::Semi) if depth == 0 => return self.bump(),
                Some(PhpToken::LParen | PhpToken::LBracket | PhpToken::LBrace) => {
                    depth += 1;
                    end = self.bump();
                }
                Some(PhpToken::RBrace) if depth == 0 => {
                    let span = self.current_span();
                    self.error(span, "expected `;` after initializer");
                    return end;
                }
                Some(PhpToken::RParen | PhpToken::RBracket | PhpToken::RBrace) => {
                    depth = depth.saturating_sub(1);
                    end = self.bump();
                }
                Some(PhpToken::Eq) => {
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

    /// Like `scan_initializer` but also stops before a top-level `,`, for
    /// comma-separated constant lists.
    fn scan_value(&mut self, from: Span) -> Span {
        let mut depth = 0usize;
        let mut end = from;
        loop {
            match self.peek() {
                None | Some(PhpToken::Semi) => return end,
                Some(PhpToken::Comma) if depth == 0 => return end,
                Some(PhpToken::RBrace) if depth == 0 => return end,
                Some(PhpToken::LParen | PhpToken::LBracket | PhpToken::LBrace) => {
                    depth += 1;
                    end = self.bump();
                }
                Some(PhpToken::RParen | PhpToken::RBracket | PhpToken::RBrace) => {
                    depth = depth.saturating_sub(1);
                    end = self.bump();
                }
                Some(PhpToken::Eq) => {
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
                Some(PhpToken::LBrace) => {
                    depth += 1;
                    end = self.bump();
                }
                Some(PhpToken::RBrace) => {
                    end = self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return open.merge(end);
                    }
                }
                Some(PhpToken::Eq) => {
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

    /// Balanced `( ... )` scan; default parameter values get the same
    /// missing-expression check as bodies. Returns the closing span.
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
                Some(PhpToken::LParen) => {
                    depth += 1;
                    end = self.bump();
                }
                Some(PhpToken::RParen) => {
                    end = self.bump();
                    depth -= 1;
                    if depth == 0 {
                        return end;
                    }
                }
                Some(PhpToken::Eq) => {
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
}
