//! Dynamic sample values.

use std::fmt;

/// A value of some IDL type.
///
/// The variant alone does not pin down the type: it is always interpreted
/// against a [`DataType`](crate::descriptor::DataType) from a compiled module.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Char(u8),
    Octet(u8),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    String(String),
    /// Integral value of the selected enumerator.
    Enum(u32),
    /// Raw bits of a bitmask.
    Bitmask(u64),
    Sequence(Vec<Value>),
    /// Elements of all dimensions in row-major order.
    Array(Vec<Value>),
    /// One slot per member; `None` only for absent optional members.
    Struct(Vec<Option<Value>>),
    Union {
        discriminator: i64,
        /// `None` when no case is selected by the discriminator.
        member: Option<Box<Value>>,
    },
}

impl Value {
    /// Short name of the variant, for error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Boolean(_) => "boolean",
            Value::Char(_) => "char",
            Value::Octet(_) => "octet",
            Value::Int8(_) => "int8",
            Value::UInt8(_) => "uint8",
            Value::Int16(_) => "short",
            Value::UInt16(_) => "unsigned short",
            Value::Int32(_) => "long",
            Value::UInt32(_) => "unsigned long",
            Value::Int64(_) => "long long",
            Value::UInt64(_) => "unsigned long long",
            Value::Float32(_) => "float",
            Value::Float64(_) => "double",
            Value::String(_) => "string",
            Value::Enum(_) => "enum",
            Value::Bitmask(_) => "bitmask",
            Value::Sequence(_) => "sequence",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Union { .. } => "union",
        }
    }

    /// Integral value, for primitives usable as discriminators.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Boolean(b) => Some(b as i64),
            Value::Char(v) | Value::Octet(v) | Value::UInt8(v) => Some(v as i64),
            Value::Int8(v) => Some(v as i64),
            Value::Int16(v) => Some(v as i64),
            Value::UInt16(v) => Some(v as i64),
            Value::Int32(v) => Some(v as i64),
            Value::UInt32(v) => Some(v as i64),
            Value::Int64(v) => Some(v),
            Value::UInt64(v) => Some(v as i64),
            Value::Enum(v) => Some(v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Char(c) => write!(f, "'{}'", *c as char),
            Value::Octet(v) | Value::UInt8(v) => write!(f, "{v}"),
            Value::Int8(v) => write!(f, "{v}"),
            Value::Int16(v) => write!(f, "{v}"),
            Value::UInt16(v) => write!(f, "{v}"),
            Value::Int32(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Float32(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Enum(v) => write!(f, "enum({v})"),
            Value::Bitmask(v) => write!(f, "{v:#x}"),
            Value::Sequence(items) | Value::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Struct(members) => {
                f.write_str("{")?;
                for (i, member) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    match member {
                        Some(v) => write!(f, "{v}")?,
                        None => f.write_str("null")?,
                    }
                }
                f.write_str("}")
            }
            Value::Union {
                discriminator,
                member,
            } => match member {
                Some(v) => write!(f, "<{discriminator}: {v}>"),
                None => write!(f, "<{discriminator}>"),
            },
        }
    }
}

/// A value that has been checked against a named type of a compiled module.
///
/// Produced by [`CompiledModule::construct`](crate::descriptor::CompiledModule::construct).
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub type_name: String,
    pub value: Value,
}
