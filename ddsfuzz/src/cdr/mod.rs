//! # XCDR2 wire format
//!
//! Samples are serialized as XCDR version 2 (DDS-XTypes 1.3, 7.4.3), the
//! encoding the deserializer under test reads.
//!
//! ```text
//! +--------+--------+--------+--------+
//! |  encapsulation  | options (pad n) |   identifier big-endian
//! +--------+--------+--------+--------+
//! |           payload ...             |   aligned from payload start
//! +--------+--------+--------+--------+
//! |  payload ... | n zero bytes       |   total padded to 4
//! +--------+--------+--------+--------+
//! ```
//!
//! - primitives are aligned to their size, capped at 4;
//! - strings are a `u32` length including the NUL, the bytes and the NUL;
//! - sequences are a `u32` count followed by the elements, arrays just the
//!   elements; either is preceded by a DHEADER (`u32` byte size of what
//!   follows) when the element type is not primitive;
//! - appendable structs and unions are preceded by a DHEADER;
//! - an optional member is a one-byte presence flag and, if present, the value;
//! - a union is its discriminator followed by the selected member, if any.
//!
//! ## Module Structure
//!
//! - [`write`] - encoder
//! - [`read`] - reference decoder with the deserializer's validity checks

pub mod read;
pub mod write;

pub use read::{decode, DecodeError};
pub use write::{encode, EncodeError};

use serde::{Deserialize, Serialize};

use crate::descriptor::{CompiledModule, DataType, TypeDescriptor};
use crate::types::Extensibility;

/// Byte order of the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Plain XCDR2, big-endian.
pub const CDR2_BE: u16 = 0x0006;
/// Plain XCDR2, little-endian.
pub const CDR2_LE: u16 = 0x0007;
/// Delimited XCDR2 (appendable root), big-endian.
pub const D_CDR2_BE: u16 = 0x0008;
/// Delimited XCDR2 (appendable root), little-endian.
pub const D_CDR2_LE: u16 = 0x0009;

/// Encapsulation header length.
pub const HEADER_LEN: usize = 4;

/// Largest alignment XCDR2 applies.
const MAX_ALIGN: usize = 4;

/// Encapsulation identifier for a root of the given extensibility.
pub fn encapsulation_id(order: ByteOrder, extensibility: Extensibility) -> u16 {
    match (extensibility, order) {
        (Extensibility::Final, ByteOrder::Big) => CDR2_BE,
        (Extensibility::Final, ByteOrder::Little) => CDR2_LE,
        (Extensibility::Appendable, ByteOrder::Big) => D_CDR2_BE,
        (Extensibility::Appendable, ByteOrder::Little) => D_CDR2_LE,
    }
}

/// Inverse of [`encapsulation_id`].
pub fn parse_encapsulation(id: u16) -> Option<(ByteOrder, Extensibility)> {
    match id {
        CDR2_BE => Some((ByteOrder::Big, Extensibility::Final)),
        CDR2_LE => Some((ByteOrder::Little, Extensibility::Final)),
        D_CDR2_BE => Some((ByteOrder::Big, Extensibility::Appendable)),
        D_CDR2_LE => Some((ByteOrder::Little, Extensibility::Appendable)),
        _ => None,
    }
}

/// Extensibility of a root type; non-aggregates encode as final.
pub fn root_extensibility(module: &CompiledModule, descriptor: &TypeDescriptor) -> Extensibility {
    match descriptor {
        TypeDescriptor::Struct(s) => s.extensibility,
        TypeDescriptor::Union(u) => u.extensibility,
        TypeDescriptor::Alias(inner) => match module.resolve(inner) {
            DataType::Named(id) => match module.get(*id) {
                Some(TypeDescriptor::Struct(s)) => s.extensibility,
                Some(TypeDescriptor::Union(u)) => u.extensibility,
                _ => Extensibility::Final,
            },
            _ => Extensibility::Final,
        },
        _ => Extensibility::Final,
    }
}

/// Whether a collection of `element` carries a DHEADER.
pub(crate) fn needs_dheader(module: &CompiledModule, element: &DataType) -> bool {
    !matches!(module.resolve(element), DataType::Primitive(_))
}

/// Alignment for a value of `size` bytes.
pub(crate) fn alignment(size: usize) -> usize {
    size.clamp(1, MAX_ALIGN)
}
