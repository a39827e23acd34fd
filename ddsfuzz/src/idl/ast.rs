//! Syntax tree of a parsed IDL file.

use std::ops::Range;

use crate::types::PrimitiveType;

pub type Span = Range<usize>;

#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: Span,
}

/// `a::b::C` or `::a::C`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedName {
    pub absolute: bool,
    pub parts: Vec<String>,
    pub span: Span,
}

impl ScopedName {
    pub fn last(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or("")
    }
}

/// Integer literal, possibly negated.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub value: i64,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub name: Ident,
    /// Positional integer argument, if the annotation has exactly that.
    pub value: Option<Literal>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    pub modules: Vec<ModuleDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub name: Ident,
    pub definitions: Vec<Definition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub annotations: Vec<Annotation>,
    pub kind: DefinitionKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionKind {
    Struct(StructDecl),
    Union(UnionDecl),
    Enum(EnumDecl),
    Bitmask(BitmaskDecl),
    Typedef(TypedefDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeRef {
    Primitive(PrimitiveType, Span),
    String { bound: Option<Literal>, span: Span },
    Sequence {
        element: Box<TypeRef>,
        bound: Option<Literal>,
        span: Span,
    },
    Scoped(ScopedName),
}

impl TypeRef {
    pub fn span(&self) -> Span {
        match self {
            TypeRef::Primitive(_, span) | TypeRef::String { span, .. } | TypeRef::Sequence { span, .. } => {
                span.clone()
            }
            TypeRef::Scoped(name) => name.span.clone(),
        }
    }
}

/// Declared name with optional array dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Declarator {
    pub name: Ident,
    pub dims: Vec<Literal>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: Ident,
    pub members: Vec<MemberDecl>,
}

/// `@a @b T x, y[2];`
#[derive(Debug, Clone, PartialEq)]
pub struct MemberDecl {
    pub annotations: Vec<Annotation>,
    pub ty: TypeRef,
    pub declarators: Vec<Declarator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionDecl {
    pub name: Ident,
    pub discriminator: TypeRef,
    pub cases: Vec<CaseDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseDecl {
    pub labels: Vec<LabelDecl>,
    pub annotations: Vec<Annotation>,
    pub ty: TypeRef,
    pub declarator: Declarator,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LabelDecl {
    Value(Literal),
    Name(ScopedName),
    Default(Span),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    pub name: Ident,
    pub enumerators: Vec<ConstantDecl>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskDecl {
    pub name: Ident,
    pub flags: Vec<ConstantDecl>,
}

/// Enumerator or bitmask flag.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantDecl {
    pub annotations: Vec<Annotation>,
    pub name: Ident,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypedefDecl {
    pub ty: TypeRef,
    pub declarators: Vec<Declarator>,
}
