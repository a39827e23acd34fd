//! Recursive-descent parser for the IDL subset.
//!
//! Errors inside a module are collected per definition; the parser then
//! skips to the end of the failed definition and carries on, so one run
//! reports every independent syntax error.

use super::ast::*;
use super::lexer::{tokenize, Token, TokenKind};
use crate::diagnostics::Diagnostic;
use crate::types::PrimitiveType;

type ParseResult<T> = Result<T, Diagnostic>;

/// Parses a complete IDL file.
pub fn parse(source: &str) -> Result<Specification, Vec<Diagnostic>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(source, tokens);
    let spec = parser.parse_specification();
    if parser.errors.is_empty() {
        Ok(spec)
    } else {
        Err(parser.errors)
    }
}

pub struct Parser<'src> {
    source: &'src str,
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<Diagnostic>,
}

impl<'src> Parser<'src> {
    /// `tokens` must end with [`TokenKind::Eof`].
    pub fn new(source: &'src str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    // ---- token cursor ----

    fn current(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn try_consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(kind.describe()))
        }
    }

    fn text(&self, token: &Token) -> &'src str {
        &self.source[token.span.clone()]
    }

    fn unexpected(&self, expected: &str) -> Diagnostic {
        let found = self.current();
        let what = if found.kind == TokenKind::Eof {
            "end of input".to_string()
        } else {
            format!("`{}`", self.text(found))
        };
        Diagnostic::error(format!("expected {expected}, found {what}"), found.span.clone())
            .with_label(format!("expected {expected}"))
    }

    /// Skips to the end of the definition that started at token `from`: past
    /// its closing `;`, or up to a `}` that closes the enclosing module.
    fn synchronize(&mut self, from: usize) {
        let mut depth: isize = self.tokens[from..self.pos]
            .iter()
            .map(|t| match t.kind {
                TokenKind::LBrace => 1,
                TokenKind::RBrace => -1,
                _ => 0,
            })
            .sum();
        loop {
            match self.current().kind {
                TokenKind::Eof => return,
                TokenKind::LBrace => depth += 1,
                TokenKind::RBrace => {
                    if depth <= 0 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Semi if depth <= 0 => {
                    self.advance();
                    return;
                }
                _ => {}
            }
            self.advance();
        }
    }

    // ---- top level ----

    pub fn parse_specification(&mut self) -> Specification {
        let mut modules = Vec::new();
        while !self.check(TokenKind::Eof) {
            match self.parse_module() {
                Ok(module) => modules.push(module),
                Err(e) => {
                    self.errors.push(e);
                    break;
                }
            }
        }
        Specification { modules }
    }

    fn parse_module(&mut self) -> ParseResult<ModuleDecl> {
        // annotations on the module itself carry no meaning here
        self.parse_annotations()?;
        self.expect(TokenKind::Module)?;
        let name = self.ident()?;
        self.expect(TokenKind::LBrace)?;

        let mut definitions = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            let from = self.pos;
            match self.parse_definition() {
                Ok(definition) => definitions.push(definition),
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize(from);
                }
            }
        }

        self.expect(TokenKind::RBrace)?;
        self.expect(TokenKind::Semi)?;
        Ok(ModuleDecl { name, definitions })
    }

    fn parse_definition(&mut self) -> ParseResult<Definition> {
        let start = self.current().span.start;
        let annotations = self.parse_annotations()?;
        let kind = match self.current().kind {
            TokenKind::Struct => DefinitionKind::Struct(self.parse_struct()?),
            TokenKind::Union => DefinitionKind::Union(self.parse_union()?),
            TokenKind::Enum => DefinitionKind::Enum(self.parse_enum()?),
            TokenKind::Bitmask => DefinitionKind::Bitmask(self.parse_bitmask()?),
            TokenKind::Typedef => DefinitionKind::Typedef(self.parse_typedef()?),
            TokenKind::Module => {
                return Err(Diagnostic::error("nested modules are not supported", self.current().span.clone()));
            }
            _ => return Err(self.unexpected("a type declaration")),
        };
        self.expect(TokenKind::Semi)?;
        Ok(Definition {
            annotations,
            kind,
            span: start..self.previous().span.end,
        })
    }

    // ---- annotations ----

    fn parse_annotations(&mut self) -> ParseResult<Vec<Annotation>> {
        let mut annotations = Vec::new();
        while self.check(TokenKind::At) {
            let start = self.advance().span.start;
            let name = self.annotation_name()?;
            let mut value = None;
            if self.try_consume(TokenKind::LParen) {
                value = self.annotation_args()?;
            }
            annotations.push(Annotation {
                name,
                value,
                span: start..self.previous().span.end,
            });
        }
        Ok(annotations)
    }

    /// Annotation names may collide with keywords (`@default`).
    fn annotation_name(&mut self) -> ParseResult<Ident> {
        let token = self.current().clone();
        let text = self.text(&token);
        let is_word = text.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
            && text.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !is_word {
            return Err(self.unexpected("annotation name"));
        }
        self.advance();
        Ok(Ident {
            name: text.to_string(),
            span: token.span,
        })
    }

    /// Parses up to the closing `)`. Returns the argument when it is a single
    /// integer literal; anything else is skipped.
    fn annotation_args(&mut self) -> ParseResult<Option<Literal>> {
        let simple = matches!(self.current().kind, TokenKind::Integer | TokenKind::Minus);
        if simple {
            let literal = self.literal()?;
            if self.try_consume(TokenKind::RParen) {
                return Ok(Some(literal));
            }
        }
        let mut depth = 1usize;
        while depth > 0 {
            match self.advance().kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => depth -= 1,
                TokenKind::Eof => return Err(self.unexpected("`)`")),
                _ => {}
            }
        }
        Ok(None)
    }

    // ---- declarations ----

    fn parse_struct(&mut self) -> ParseResult<StructDecl> {
        self.expect(TokenKind::Struct)?;
        let name = self.ident()?;
        if self.check(TokenKind::Colon) {
            return Err(Diagnostic::error("struct inheritance is not supported", self.current().span.clone()));
        }
        self.expect(TokenKind::LBrace)?;
        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            members.push(self.parse_member()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(StructDecl { name, members })
    }

    fn parse_member(&mut self) -> ParseResult<MemberDecl> {
        let annotations = self.parse_annotations()?;
        let ty = self.parse_type()?;
        let mut declarators = vec![self.declarator()?];
        while self.try_consume(TokenKind::Comma) {
            declarators.push(self.declarator()?);
        }
        self.expect(TokenKind::Semi)?;
        Ok(MemberDecl {
            annotations,
            ty,
            declarators,
        })
    }

    fn parse_union(&mut self) -> ParseResult<UnionDecl> {
        self.expect(TokenKind::Union)?;
        let name = self.ident()?;
        self.expect(TokenKind::Switch)?;
        self.expect(TokenKind::LParen)?;
        let discriminator = self.parse_type()?;
        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::LBrace)?;
        let mut cases = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.check(TokenKind::Eof) {
            cases.push(self.parse_case()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(UnionDecl {
            name,
            discriminator,
            cases,
        })
    }

    fn parse_case(&mut self) -> ParseResult<CaseDecl> {
        let mut labels = Vec::new();
        loop {
            if self.try_consume(TokenKind::Case) {
                let label = if matches!(self.current().kind, TokenKind::Ident | TokenKind::ColonColon) {
                    LabelDecl::Name(self.scoped_name()?)
                } else {
                    LabelDecl::Value(self.literal()?)
                };
                labels.push(label);
                self.expect(TokenKind::Colon)?;
            } else if self.check(TokenKind::Default) {
                let span = self.advance().span;
                labels.push(LabelDecl::Default(span));
                self.expect(TokenKind::Colon)?;
            } else {
                break;
            }
        }
        if labels.is_empty() {
            return Err(self.unexpected("`case` or `default`"));
        }

        let annotations = self.parse_annotations()?;
        let ty = self.parse_type()?;
        let declarator = self.declarator()?;
        self.expect(TokenKind::Semi)?;
        Ok(CaseDecl {
            labels,
            annotations,
            ty,
            declarator,
        })
    }

    fn parse_enum(&mut self) -> ParseResult<EnumDecl> {
        self.expect(TokenKind::Enum)?;
        let name = self.ident()?;
        let enumerators = self.constant_list()?;
        Ok(EnumDecl { name, enumerators })
    }

    fn parse_bitmask(&mut self) -> ParseResult<BitmaskDecl> {
        self.expect(TokenKind::Bitmask)?;
        let name = self.ident()?;
        let flags = self.constant_list()?;
        Ok(BitmaskDecl { name, flags })
    }

    /// `{ @a X, Y, ... }` with at least one entry.
    fn constant_list(&mut self) -> ParseResult<Vec<ConstantDecl>> {
        self.expect(TokenKind::LBrace)?;
        let mut constants = Vec::new();
        loop {
            let annotations = self.parse_annotations()?;
            let name = self.ident()?;
            constants.push(ConstantDecl { annotations, name });
            if !self.try_consume(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RBrace)?;
        Ok(constants)
    }

    fn parse_typedef(&mut self) -> ParseResult<TypedefDecl> {
        self.expect(TokenKind::Typedef)?;
        let ty = self.parse_type()?;
        let mut declarators = vec![self.declarator()?];
        while self.try_consume(TokenKind::Comma) {
            declarators.push(self.declarator()?);
        }
        Ok(TypedefDecl { ty, declarators })
    }

    // ---- types ----

    /// Parse a type specifier.
    pub fn parse_type(&mut self) -> ParseResult<TypeRef> {
        let start = self.current().span.clone();
        let primitive = |p: PrimitiveType| TypeRef::Primitive(p, start.clone());

        let ty = match self.current().kind {
            TokenKind::Boolean => primitive(PrimitiveType::Boolean),
            TokenKind::Char => primitive(PrimitiveType::Char),
            TokenKind::Octet => primitive(PrimitiveType::Octet),
            TokenKind::Int8 => primitive(PrimitiveType::Int8),
            TokenKind::UInt8 => primitive(PrimitiveType::UInt8),
            TokenKind::Short | TokenKind::Int16 => primitive(PrimitiveType::Short),
            TokenKind::UInt16 => primitive(PrimitiveType::UShort),
            TokenKind::Int32 => primitive(PrimitiveType::Long),
            TokenKind::UInt32 => primitive(PrimitiveType::ULong),
            TokenKind::Int64 => primitive(PrimitiveType::LongLong),
            TokenKind::UInt64 => primitive(PrimitiveType::ULongLong),
            TokenKind::Float => primitive(PrimitiveType::Float),
            TokenKind::Double => primitive(PrimitiveType::Double),

            TokenKind::Long => {
                self.advance();
                if self.try_consume(TokenKind::Long) {
                    return Ok(TypeRef::Primitive(PrimitiveType::LongLong, start.start..self.previous().span.end));
                }
                if self.check(TokenKind::Double) {
                    return Err(Diagnostic::error("`long double` is not supported", self.current().span.clone()));
                }
                return Ok(TypeRef::Primitive(PrimitiveType::Long, start));
            }

            TokenKind::Unsigned => {
                self.advance();
                let p = if self.try_consume(TokenKind::Short) {
                    PrimitiveType::UShort
                } else if self.try_consume(TokenKind::Long) {
                    if self.try_consume(TokenKind::Long) {
                        PrimitiveType::ULongLong
                    } else {
                        PrimitiveType::ULong
                    }
                } else {
                    return Err(self.unexpected("`short` or `long`"));
                };
                return Ok(TypeRef::Primitive(p, start.start..self.previous().span.end));
            }

            TokenKind::String => {
                self.advance();
                let bound = if self.try_consume(TokenKind::Lt) {
                    let bound = self.literal()?;
                    self.expect(TokenKind::Gt)?;
                    Some(bound)
                } else {
                    None
                };
                return Ok(TypeRef::String {
                    bound,
                    span: start.start..self.previous().span.end,
                });
            }

            TokenKind::Sequence => {
                self.advance();
                self.expect(TokenKind::Lt)?;
                let element = self.parse_type()?;
                let bound = if self.try_consume(TokenKind::Comma) {
                    Some(self.literal()?)
                } else {
                    None
                };
                self.expect(TokenKind::Gt)?;
                return Ok(TypeRef::Sequence {
                    element: Box::new(element),
                    bound,
                    span: start.start..self.previous().span.end,
                });
            }

            TokenKind::Ident | TokenKind::ColonColon => return Ok(TypeRef::Scoped(self.scoped_name()?)),

            _ => return Err(self.unexpected("a type")),
        };

        self.advance();
        Ok(ty)
    }

    // ---- leaves ----

    fn ident(&mut self) -> ParseResult<Ident> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(Ident {
            name: self.text(&token).to_string(),
            span: token.span,
        })
    }

    fn scoped_name(&mut self) -> ParseResult<ScopedName> {
        let start = self.current().span.start;
        let absolute = self.try_consume(TokenKind::ColonColon);
        let mut parts = vec![self.ident()?.name];
        while self.try_consume(TokenKind::ColonColon) {
            parts.push(self.ident()?.name);
        }
        Ok(ScopedName {
            absolute,
            parts,
            span: start..self.previous().span.end,
        })
    }

    fn declarator(&mut self) -> ParseResult<Declarator> {
        let name = self.ident()?;
        let mut dims = Vec::new();
        while self.try_consume(TokenKind::LBracket) {
            dims.push(self.literal()?);
            self.expect(TokenKind::RBracket)?;
        }
        Ok(Declarator { name, dims })
    }

    /// Integer literal with optional sign; `TRUE`/`FALSE` are 1/0.
    fn literal(&mut self) -> ParseResult<Literal> {
        let start = self.current().span.start;
        if self.try_consume(TokenKind::True) {
            return Ok(Literal { value: 1, span: start..self.previous().span.end });
        }
        if self.try_consume(TokenKind::False) {
            return Ok(Literal { value: 0, span: start..self.previous().span.end });
        }

        let negative = self.try_consume(TokenKind::Minus);
        let token = self.expect(TokenKind::Integer)?;
        let text = self.text(&token);
        let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            Some(hex) => i64::from_str_radix(hex, 16),
            None => text.parse::<i64>(),
        };
        let span = start..token.span.end;
        let value = parsed
            .map_err(|_| Diagnostic::error(format!("integer literal `{text}` is out of range"), span.clone()))?;
        Ok(Literal {
            value: if negative { -value } else { value },
            span,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_ok(source: &str) -> Specification {
        match parse(source) {
            Ok(spec) => spec,
            Err(errors) => panic!("unexpected errors: {errors:?}"),
        }
    }

    fn single_module(source: &str) -> ModuleDecl {
        let mut spec = parse_ok(source);
        assert_eq!(spec.modules.len(), 1);
        spec.modules.remove(0)
    }

    #[test]
    fn test_parse_struct_with_declarators() {
        let module = single_module("module m { struct S { @key long a, b[2][3]; sequence<string<4>, 8> c; }; };");
        assert_eq!(module.name.name, "m");
        let DefinitionKind::Struct(s) = &module.definitions[0].kind else {
            panic!("expected struct");
        };
        assert_eq!(s.name.name, "S");
        assert_eq!(s.members.len(), 2);
        assert_eq!(s.members[0].annotations[0].name.name, "key");
        assert_eq!(s.members[0].declarators.len(), 2);
        let dims: Vec<i64> = s.members[0].declarators[1].dims.iter().map(|d| d.value).collect();
        assert_eq!(dims, vec![2, 3]);
        match &s.members[1].ty {
            TypeRef::Sequence { element, bound, .. } => {
                assert_eq!(bound.as_ref().map(|b| b.value), Some(8));
                assert!(matches!(**element, TypeRef::String { bound: Some(Literal { value: 4, .. }), .. }));
            }
            other => panic!("unexpected type {other:?}"),
        }
    }

    #[test]
    fn test_parse_multiword_primitives() {
        let module = single_module(
            "module m { struct S { unsigned long long a; long long b; unsigned short c; unsigned long d; long e; }; };",
        );
        let DefinitionKind::Struct(s) = &module.definitions[0].kind else {
            panic!("expected struct");
        };
        let kinds: Vec<PrimitiveType> = s
            .members
            .iter()
            .map(|m| match m.ty {
                TypeRef::Primitive(p, _) => p,
                _ => panic!("expected primitive"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                PrimitiveType::ULongLong,
                PrimitiveType::LongLong,
                PrimitiveType::UShort,
                PrimitiveType::ULong,
                PrimitiveType::Long,
            ]
        );
    }

    #[test]
    fn test_parse_union_labels() {
        let module = single_module(
            "module m { union U switch (short) { case -1: case 0x10: long a; case E::X: long b; default: octet c; }; };",
        );
        let DefinitionKind::Union(u) = &module.definitions[0].kind else {
            panic!("expected union");
        };
        assert_eq!(u.cases.len(), 3);
        assert!(matches!(u.cases[0].labels[0], LabelDecl::Value(Literal { value: -1, .. })));
        assert!(matches!(u.cases[0].labels[1], LabelDecl::Value(Literal { value: 16, .. })));
        assert!(matches!(&u.cases[1].labels[0], LabelDecl::Name(n) if n.parts == ["E", "X"]));
        assert!(matches!(u.cases[2].labels[0], LabelDecl::Default(_)));
    }

    #[test]
    fn test_parse_annotations() {
        let module = single_module(
            "module m { @topic @appendable struct S { long a; }; @bit_bound(8) bitmask B { @position(3) F }; \
             enum E { @value(2) A, B }; @verbatim(language=\"c\") typedef long T; };",
        );
        let names: Vec<&str> = module.definitions[0]
            .annotations
            .iter()
            .map(|a| a.name.name.as_str())
            .collect();
        assert_eq!(names, vec!["topic", "appendable"]);
        assert_eq!(module.definitions[1].annotations[0].value.as_ref().map(|v| v.value), Some(8));
        let DefinitionKind::Enum(e) = &module.definitions[2].kind else {
            panic!("expected enum");
        };
        assert_eq!(e.enumerators[0].annotations[0].value.as_ref().map(|v| v.value), Some(2));
        assert!(module.definitions[3].annotations[0].value.is_none());
    }

    #[test]
    fn test_nested_template_closers() {
        let module = single_module("module m { typedef sequence<sequence<long>> T; typedef sequence<sequence<long> > U; };");
        assert_eq!(module.definitions.len(), 2);
    }

    #[test]
    fn test_errors_are_collected_per_definition() {
        let errors = parse("module m { struct A { long }; struct B { long x; }; enum E { }; };").unwrap_err();
        assert_eq!(errors.len(), 2, "{errors:?}");
        assert!(errors[0].message.contains("expected identifier"));
    }

    #[test]
    fn test_unterminated_module() {
        let errors = parse("module m { struct A { long x; };").unwrap_err();
        assert!(errors[0].message.contains("end of input"));
    }
}
