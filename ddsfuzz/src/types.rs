//! Vocabulary shared by the generator, the IDL front end and the codec.

use std::fmt;

use serde::{Deserialize, Serialize};

/// IDL primitive types the generator can draw and the front end accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Boolean,
    Char,
    Octet,
    Int8,
    UInt8,
    Short,
    UShort,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
}

impl PrimitiveType {
    /// Every primitive, in the order the generator indexes them.
    pub const ALL: [PrimitiveType; 13] = [
        PrimitiveType::Boolean,
        PrimitiveType::Char,
        PrimitiveType::Octet,
        PrimitiveType::Int8,
        PrimitiveType::UInt8,
        PrimitiveType::Short,
        PrimitiveType::UShort,
        PrimitiveType::Long,
        PrimitiveType::ULong,
        PrimitiveType::LongLong,
        PrimitiveType::ULongLong,
        PrimitiveType::Float,
        PrimitiveType::Double,
    ];

    /// Primitives usable as a union discriminator by the generator.
    pub const DISCRIMINATORS: [PrimitiveType; 4] = [
        PrimitiveType::Short,
        PrimitiveType::UShort,
        PrimitiveType::Long,
        PrimitiveType::ULong,
    ];

    /// IDL spelling.
    pub fn idl_name(self) -> &'static str {
        match self {
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Char => "char",
            PrimitiveType::Octet => "octet",
            PrimitiveType::Int8 => "int8",
            PrimitiveType::UInt8 => "uint8",
            PrimitiveType::Short => "short",
            PrimitiveType::UShort => "unsigned short",
            PrimitiveType::Long => "long",
            PrimitiveType::ULong => "unsigned long",
            PrimitiveType::LongLong => "long long",
            PrimitiveType::ULongLong => "unsigned long long",
            PrimitiveType::Float => "float",
            PrimitiveType::Double => "double",
        }
    }

    /// Size in bytes on the wire.
    pub fn size(self) -> usize {
        match self {
            PrimitiveType::Boolean
            | PrimitiveType::Char
            | PrimitiveType::Octet
            | PrimitiveType::Int8
            | PrimitiveType::UInt8 => 1,
            PrimitiveType::Short | PrimitiveType::UShort => 2,
            PrimitiveType::Long | PrimitiveType::ULong | PrimitiveType::Float => 4,
            PrimitiveType::LongLong | PrimitiveType::ULongLong | PrimitiveType::Double => 8,
        }
    }

    /// Whether the type may discriminate a union.
    pub fn is_discriminator(self) -> bool {
        !matches!(self, PrimitiveType::Float | PrimitiveType::Double)
    }

    /// Inclusive range of values a discriminator of this type can hold.
    pub fn discriminator_range(self) -> Option<(i64, i64)> {
        let range = match self {
            PrimitiveType::Boolean => (0, 1),
            PrimitiveType::Char | PrimitiveType::Octet | PrimitiveType::UInt8 => (0, u8::MAX as i64),
            PrimitiveType::Int8 => (i8::MIN as i64, i8::MAX as i64),
            PrimitiveType::Short => (i16::MIN as i64, i16::MAX as i64),
            PrimitiveType::UShort => (0, u16::MAX as i64),
            PrimitiveType::Long => (i32::MIN as i64, i32::MAX as i64),
            PrimitiveType::ULong => (0, u32::MAX as i64),
            PrimitiveType::LongLong | PrimitiveType::ULongLong => (i64::MIN, i64::MAX),
            PrimitiveType::Float | PrimitiveType::Double => return None,
        };
        Some(range)
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.idl_name())
    }
}

/// XTypes extensibility kind of a constructed type.
///
/// Only top-level types are annotated; everything else is implicitly final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Extensibility {
    #[default]
    Final,
    Appendable,
}

impl Extensibility {
    /// Annotation name, without the `@`.
    pub fn annotation(self) -> &'static str {
        match self {
            Extensibility::Final => "final",
            Extensibility::Appendable => "appendable",
        }
    }
}
