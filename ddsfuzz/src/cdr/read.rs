//! Reference XCDR2 decoder.
//!
//! Applies the validity checks of the deserializer under test: anything it
//! would refuse is an error here, so a sample that decodes is one the target
//! accepts. Offsets in errors are relative to the start of the payload.

use thiserror::Error;

use super::{alignment, needs_dheader, parse_encapsulation, root_extensibility, ByteOrder, HEADER_LEN};
use crate::descriptor::{CompiledModule, DataType, DiscriminatorType, TypeDescriptor};
use crate::types::{Extensibility, PrimitiveType};
use crate::value::Value;

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("input of {len} bytes is shorter than the encapsulation header")]
    TruncatedHeader { len: usize },

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("unsupported encapsulation {0:#06x}")]
    Encapsulation(u16),

    #[error("encapsulation {found:#06x} does not match the type, expected {expected:#06x}")]
    HeaderMismatch { found: u16, expected: u16 },

    #[error("{padding} padding bytes declared but the payload has {len}")]
    Padding { padding: usize, len: usize },

    #[error("offset {offset}: unexpected end of data reading {what}")]
    Eof { offset: usize, what: &'static str },

    #[error("offset {offset}: invalid boolean {value}")]
    InvalidBool { offset: usize, value: u8 },

    #[error("offset {offset}: string length must include the terminator")]
    EmptyString { offset: usize },

    #[error("offset {offset}: string is not NUL-terminated")]
    StringTerminator { offset: usize },

    #[error("offset {offset}: string contains NUL")]
    EmbeddedNul { offset: usize },

    #[error("offset {offset}: string is not valid UTF-8")]
    InvalidUtf8 { offset: usize },

    #[error("offset {offset}: length {len} exceeds bound {bound}")]
    BoundExceeded { offset: usize, len: usize, bound: u32 },

    #[error("offset {offset}: {count} elements cannot fit in the remaining data")]
    LengthOverflow { offset: usize, count: u32 },

    #[error("offset {offset}: {value} is not an enumerator")]
    InvalidEnumerator { offset: usize, value: u32 },

    #[error("offset {offset}: bits {bits:#x} outside the bitmask")]
    InvalidBits { offset: usize, bits: u64 },

    #[error("offset {offset}: invalid discriminator {value}")]
    InvalidDiscriminator { offset: usize, value: i64 },

    #[error("offset {offset}: invalid optional flag {value}")]
    InvalidOptionFlag { offset: usize, value: u8 },

    #[error("offset {offset}: DHEADER declares {declared} bytes, {consumed} consumed")]
    DHeaderMismatch {
        offset: usize,
        declared: u32,
        consumed: usize,
    },

    #[error("{count} trailing bytes")]
    TrailingBytes { count: usize },
}

/// Decodes a complete sample of `type_name`, header included.
pub fn decode(module: &CompiledModule, type_name: &str, data: &[u8]) -> Result<Value, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::TruncatedHeader { len: data.len() });
    }
    let (id, descriptor) = module
        .lookup(type_name)
        .ok_or_else(|| DecodeError::UnknownType(type_name.to_string()))?;

    let identifier = u16::from_be_bytes([data[0], data[1]]);
    let (order, extensibility) = parse_encapsulation(identifier).ok_or(DecodeError::Encapsulation(identifier))?;
    let expected = root_extensibility(module, descriptor);
    if extensibility != expected {
        return Err(DecodeError::HeaderMismatch {
            found: identifier,
            expected: super::encapsulation_id(order, expected),
        });
    }

    let payload = &data[HEADER_LEN..];
    let padding = (data[3] & 0x03) as usize;
    if padding > payload.len() {
        return Err(DecodeError::Padding {
            padding,
            len: payload.len(),
        });
    }

    let mut reader = CdrReader {
        module,
        data: payload,
        pos: 0,
        limit: payload.len() - padding,
        order,
    };
    let value = reader.value(&DataType::Named(id))?;
    if reader.pos != reader.limit {
        return Err(DecodeError::TrailingBytes {
            count: reader.limit - reader.pos,
        });
    }
    Ok(value)
}

struct CdrReader<'a> {
    module: &'a CompiledModule,
    data: &'a [u8],
    pos: usize,
    /// End of the innermost delimited region.
    limit: usize,
    order: ByteOrder,
}

impl<'a> CdrReader<'a> {
    // ---- raw input ----

    fn align(&mut self, size: usize) {
        self.pos = self.pos.next_multiple_of(alignment(size));
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self.pos.checked_add(n).filter(|end| *end <= self.limit);
        match end {
            Some(end) => {
                let bytes = &self.data[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(DecodeError::Eof {
                offset: self.pos,
                what,
            }),
        }
    }

    fn array<const N: usize>(&mut self, what: &'static str) -> Result<[u8; N], DecodeError> {
        self.align(N);
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        if self.order == ByteOrder::Big {
            out.reverse();
        }
        Ok(out)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &'static str) -> Result<u16, DecodeError> {
        self.array(what).map(u16::from_le_bytes)
    }

    fn u32(&mut self, what: &'static str) -> Result<u32, DecodeError> {
        self.array(what).map(u32::from_le_bytes)
    }

    fn u64(&mut self, what: &'static str) -> Result<u64, DecodeError> {
        self.array(what).map(u64::from_le_bytes)
    }

    /// Unsigned integer of `size` bytes, zero-extended.
    fn sized(&mut self, size: usize, what: &'static str) -> Result<u64, DecodeError> {
        match size {
            1 => self.u8(what).map(u64::from),
            2 => self.u16(what).map(u64::from),
            4 => self.u32(what).map(u64::from),
            _ => self.u64(what),
        }
    }

    /// Position after alignment for a value of `size` bytes.
    fn aligned_pos(&self, size: usize) -> usize {
        self.pos.next_multiple_of(alignment(size))
    }

    /// Reads a DHEADER and narrows the limit to the region it delimits.
    /// Returns `(offset, declared, previous limit)`.
    fn enter_dheader(&mut self) -> Result<(usize, u32, usize), DecodeError> {
        let offset = self.aligned_pos(4);
        let declared = self.u32("DHEADER")?;
        let end = self
            .pos
            .checked_add(declared as usize)
            .filter(|end| *end <= self.limit)
            .ok_or(DecodeError::Eof {
                offset: self.pos,
                what: "DHEADER region",
            })?;
        let outer = std::mem::replace(&mut self.limit, end);
        Ok((offset, declared, outer))
    }

    /// Leaves a delimited region. `exact` requires the contents to fill it;
    /// otherwise unread bytes are skipped.
    fn leave_dheader(&mut self, (offset, declared, outer): (usize, u32, usize), exact: bool) -> Result<(), DecodeError> {
        let start = offset + 4;
        if exact && self.pos != self.limit {
            return Err(DecodeError::DHeaderMismatch {
                offset,
                declared,
                consumed: self.pos - start,
            });
        }
        self.pos = self.limit;
        self.limit = outer;
        Ok(())
    }

    // ---- values ----

    fn value(&mut self, ty: &DataType) -> Result<Value, DecodeError> {
        match ty {
            DataType::Primitive(p) => self.primitive(*p),
            DataType::String { bound } => self.string(*bound),
            DataType::Sequence { element, bound } => {
                let region = if needs_dheader(self.module, element) {
                    Some(self.enter_dheader()?)
                } else {
                    None
                };
                let offset = self.aligned_pos(4);
                let count = self.u32("sequence length")?;
                if let Some(bound) = bound {
                    if count > *bound {
                        return Err(DecodeError::BoundExceeded {
                            offset,
                            len: count as usize,
                            bound: *bound,
                        });
                    }
                }
                let min_size = match self.module.resolve(element) {
                    DataType::Primitive(p) => p.size(),
                    _ => 1,
                };
                if (count as usize).saturating_mul(min_size) > self.limit.saturating_sub(self.pos) {
                    return Err(DecodeError::LengthOverflow { offset, count });
                }
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    items.push(self.value(element)?);
                }
                if let Some(region) = region {
                    self.leave_dheader(region, true)?;
                }
                Ok(Value::Sequence(items))
            }
            DataType::Array { element, dims } => {
                let region = if needs_dheader(self.module, element) {
                    Some(self.enter_dheader()?)
                } else {
                    None
                };
                let count = DataType::element_count(dims);
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.value(element)?);
                }
                if let Some(region) = region {
                    self.leave_dheader(region, true)?;
                }
                Ok(Value::Array(items))
            }
            DataType::Named(id) => {
                let module = self.module;
                let descriptor = module
                    .get(*id)
                    .ok_or_else(|| DecodeError::UnknownType(format!("#{}", id.0)))?;
                self.named(descriptor)
            }
        }
    }

    fn named(&mut self, descriptor: &'a TypeDescriptor) -> Result<Value, DecodeError> {
        match descriptor {
            TypeDescriptor::Alias(inner) => self.value(inner),
            TypeDescriptor::Enum(e) => {
                let offset = self.aligned_pos(4);
                let value = self.u32("enum")?;
                if !e.contains(value) {
                    return Err(DecodeError::InvalidEnumerator { offset, value });
                }
                Ok(Value::Enum(value))
            }
            TypeDescriptor::Bitmask(b) => {
                let size = b.wire_size();
                let offset = self.aligned_pos(size);
                let bits = self.sized(size, "bitmask")?;
                if bits & !b.mask() != 0 {
                    return Err(DecodeError::InvalidBits { offset, bits });
                }
                Ok(Value::Bitmask(bits))
            }
            TypeDescriptor::Struct(s) => {
                let region = if s.extensibility == Extensibility::Appendable {
                    Some(self.enter_dheader()?)
                } else {
                    None
                };
                let mut slots = Vec::with_capacity(s.members.len());
                for member in &s.members {
                    if member.optional {
                        let offset = self.pos;
                        match self.u8("optional flag")? {
                            0 => {
                                slots.push(None);
                                continue;
                            }
                            1 => {}
                            value => return Err(DecodeError::InvalidOptionFlag { offset, value }),
                        }
                    }
                    slots.push(Some(self.value(&member.ty)?));
                }
                if let Some(region) = region {
                    self.leave_dheader(region, false)?;
                }
                Ok(Value::Struct(slots))
            }
            TypeDescriptor::Union(u) => {
                let region = if u.extensibility == Extensibility::Appendable {
                    Some(self.enter_dheader()?)
                } else {
                    None
                };
                let (offset, discriminator) = match u.discriminator {
                    DiscriminatorType::Primitive(p) => {
                        let offset = self.aligned_pos(p.size());
                        (offset, sign_extend(p, self.sized(p.size(), "discriminator")?))
                    }
                    DiscriminatorType::Enum(_) => {
                        let offset = self.aligned_pos(4);
                        (offset, self.u32("discriminator")? as i64)
                    }
                };
                if !self.module.discriminator_valid(u.discriminator, discriminator) {
                    return Err(DecodeError::InvalidDiscriminator {
                        offset,
                        value: discriminator,
                    });
                }
                let member = match u.case_for(discriminator) {
                    Some(case) => Some(Box::new(self.value(&case.member.ty)?)),
                    None => None,
                };
                if let Some(region) = region {
                    self.leave_dheader(region, true)?;
                }
                Ok(Value::Union {
                    discriminator,
                    member,
                })
            }
        }
    }

    fn string(&mut self, bound: Option<u32>) -> Result<Value, DecodeError> {
        let offset = self.aligned_pos(4);
        let len = self.u32("string length")? as usize;
        if len == 0 {
            return Err(DecodeError::EmptyString { offset });
        }
        let bytes = self.take(len, "string")?;
        let (body, terminator) = bytes.split_at(len - 1);
        if terminator != [0] {
            return Err(DecodeError::StringTerminator { offset });
        }
        if body.contains(&0) {
            return Err(DecodeError::EmbeddedNul { offset });
        }
        if let Some(bound) = bound {
            if body.len() > bound as usize {
                return Err(DecodeError::BoundExceeded {
                    offset,
                    len: body.len(),
                    bound,
                });
            }
        }
        let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8 { offset })?;
        Ok(Value::String(text.to_string()))
    }

    fn primitive(&mut self, p: PrimitiveType) -> Result<Value, DecodeError> {
        let value = match p {
            PrimitiveType::Boolean => {
                let offset = self.pos;
                match self.u8("boolean")? {
                    0 => Value::Boolean(false),
                    1 => Value::Boolean(true),
                    value => return Err(DecodeError::InvalidBool { offset, value }),
                }
            }
            PrimitiveType::Char => Value::Char(self.u8("char")?),
            PrimitiveType::Octet => Value::Octet(self.u8("octet")?),
            PrimitiveType::Int8 => Value::Int8(self.u8("int8")? as i8),
            PrimitiveType::UInt8 => Value::UInt8(self.u8("uint8")?),
            PrimitiveType::Short => Value::Int16(self.u16("short")? as i16),
            PrimitiveType::UShort => Value::UInt16(self.u16("unsigned short")?),
            PrimitiveType::Long => Value::Int32(self.u32("long")? as i32),
            PrimitiveType::ULong => Value::UInt32(self.u32("unsigned long")?),
            PrimitiveType::LongLong => Value::Int64(self.u64("long long")? as i64),
            PrimitiveType::ULongLong => Value::UInt64(self.u64("unsigned long long")?),
            PrimitiveType::Float => Value::Float32(f32::from_bits(self.u32("float")?)),
            PrimitiveType::Double => Value::Float64(f64::from_bits(self.u64("double")?)),
        };
        Ok(value)
    }
}

/// Interprets the low bits of `raw` as a discriminator of type `p`.
fn sign_extend(p: PrimitiveType, raw: u64) -> i64 {
    match p {
        PrimitiveType::Int8 => raw as u8 as i8 as i64,
        PrimitiveType::Short => raw as u16 as i16 as i64,
        PrimitiveType::Long => raw as u32 as i32 as i64,
        _ => raw as i64,
    }
}
