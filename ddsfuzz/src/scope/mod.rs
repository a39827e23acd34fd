//! # Type universe
//!
//! A [`Scope`] is the ordered list of random IDL type definitions generated
//! for one run. Order is generation order and also the only legal reference
//! order: an entity refers to primitives or to entities that precede it, so
//! every scope is acyclic and compiles without forward declarations.
//!
//! ## Module Structure
//!
//! - [`generate`] - seeded construction of a scope
//! - [`names`] - identifier drawing and collision checks

pub mod generate;
pub mod names;

pub use generate::{generate, GenerateError};
pub use names::NameRegistry;

use crate::types::{Extensibility, PrimitiveType};

/// Ordered set of type definitions inside one IDL module.
#[derive(Debug, Clone, PartialEq)]
pub struct Scope {
    /// IDL module name.
    pub module: String,
    /// Entities in generation order.
    pub entities: Vec<Entity>,
}

impl Scope {
    /// Looks up an entity by name.
    pub fn get(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Top-level entities in scope order.
    pub fn top_level(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.is_top_level())
    }
}

/// One type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    /// Unique (case-insensitively) within the module.
    pub name: String,
    /// Kind and body.
    pub kind: EntityKind,
    /// Set only on top-level entities; doubles as the top-level marker.
    pub top_level: Option<Extensibility>,
    /// Upper bound on the number of values in one instance.
    pub weight: u64,
}

impl Entity {
    /// Whether the entity is a fuzz-target root type.
    pub fn is_top_level(&self) -> bool {
        self.top_level.is_some()
    }

    /// IDL keyword of the declaration.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            EntityKind::Struct(_) => "struct",
            EntityKind::Union(_) => "union",
            EntityKind::Enum(_) => "enum",
            EntityKind::Bitmask(_) => "bitmask",
            EntityKind::Alias(_) => "typedef",
        }
    }
}

/// Entity kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityKind {
    Struct(StructDef),
    Union(UnionDef),
    Enum(EnumDef),
    Bitmask(BitmaskDef),
    Alias(AliasDef),
}

/// Struct body.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub members: Vec<Member>,
}

/// A struct member or union branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub name: String,
    pub spec: TypeSpec,
    /// Fixed array dimensions on the declarator; empty for scalars.
    pub dims: Vec<u32>,
    pub optional: bool,
    pub key: bool,
}

impl Member {
    /// A plain, non-optional member.
    pub fn new(name: impl Into<String>, spec: TypeSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            dims: Vec::new(),
            optional: false,
            key: false,
        }
    }
}

/// Union body.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionDef {
    pub discriminator: Discriminator,
    /// Cases in declaration order; a default case, if any, is last.
    pub cases: Vec<UnionCase>,
}

/// Union discriminator type.
#[derive(Debug, Clone, PartialEq)]
pub enum Discriminator {
    Primitive(PrimitiveType),
    /// Name of an earlier enum.
    Enum(String),
}

/// One union branch with its labels.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionCase {
    pub labels: Vec<CaseLabel>,
    pub member: Member,
}

impl UnionCase {
    /// Whether this is the `default:` branch.
    pub fn is_default(&self) -> bool {
        self.labels.iter().any(|l| matches!(l, CaseLabel::Default))
    }
}

/// A `case` label.
#[derive(Debug, Clone, PartialEq)]
pub enum CaseLabel {
    Value(i64),
    Enumerator(String),
    Default,
}

/// Enum body.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub enumerators: Vec<Enumerator>,
}

/// An enumerator with its integral value.
#[derive(Debug, Clone, PartialEq)]
pub struct Enumerator {
    pub name: String,
    pub value: u32,
    /// Rendered with `@value(n)`.
    pub explicit: bool,
}

/// Bitmask body.
#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskDef {
    pub bit_bound: u8,
    pub flags: Vec<BitFlag>,
}

/// A bitmask flag.
#[derive(Debug, Clone, PartialEq)]
pub struct BitFlag {
    pub name: String,
    pub position: u8,
    /// Rendered with `@position(n)`.
    pub explicit: bool,
}

/// `typedef` body.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDef {
    pub spec: TypeSpec,
    pub dims: Vec<u32>,
}

/// Type reference as written in IDL (without declarator dimensions).
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSpec {
    Primitive(PrimitiveType),
    String { bound: Option<u32> },
    Sequence { element: Box<TypeSpec>, bound: Option<u32> },
    /// Name of an earlier entity.
    Named(String),
}

impl TypeSpec {
    /// Whether this is a primitive type.
    pub fn is_primitive(&self) -> bool {
        matches!(self, TypeSpec::Primitive(_))
    }
}
