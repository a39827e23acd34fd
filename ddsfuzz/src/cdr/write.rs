//! XCDR2 encoder.

use thiserror::Error;

use super::{alignment, encapsulation_id, needs_dheader, root_extensibility, ByteOrder, HEADER_LEN};
use crate::descriptor::{CompiledModule, ConstructError, DataType, DiscriminatorType, TypeDescriptor};
use crate::types::{Extensibility, PrimitiveType};
use crate::value::{Instance, Value};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("value does not match its type: {0}")]
    Invalid(#[from] ConstructError),

    #[error("{path}: cannot encode {found} as {expected}")]
    Mismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("{path}: encoded size exceeds 4 GiB")]
    TooLarge { path: String },
}

/// Encodes `instance` with encapsulation header and trailing padding.
pub fn encode(module: &CompiledModule, instance: &Instance, order: ByteOrder) -> Result<Vec<u8>, EncodeError> {
    let (id, descriptor) = module
        .lookup(&instance.type_name)
        .ok_or_else(|| EncodeError::UnknownType(instance.type_name.clone()))?;
    let root = DataType::Named(id);
    module.check(&root, &instance.value, &instance.type_name)?;

    let mut writer = CdrWriter::new(module, order);
    writer.value(&root, &instance.value, &instance.type_name)?;
    let payload = writer.buf;

    let padding = (4 - payload.len() % 4) % 4;
    let identifier = encapsulation_id(order, root_extensibility(module, descriptor));
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len() + padding);
    out.extend_from_slice(&identifier.to_be_bytes());
    out.extend_from_slice(&[0, padding as u8]);
    out.extend_from_slice(&payload);
    out.resize(out.len() + padding, 0);
    Ok(out)
}

struct CdrWriter<'m> {
    module: &'m CompiledModule,
    order: ByteOrder,
    buf: Vec<u8>,
}

impl<'m> CdrWriter<'m> {
    fn new(module: &'m CompiledModule, order: ByteOrder) -> Self {
        Self {
            module,
            order,
            buf: Vec::new(),
        }
    }

    // ---- raw output ----

    fn align(&mut self, size: usize) {
        let align = alignment(size);
        let padded = self.buf.len().next_multiple_of(align);
        self.buf.resize(padded, 0);
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.align(2);
        match self.order {
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u32(&mut self, v: u32) {
        self.align(4);
        match self.order {
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    fn put_u64(&mut self, v: u64) {
        self.align(8);
        match self.order {
            ByteOrder::Little => self.buf.extend_from_slice(&v.to_le_bytes()),
            ByteOrder::Big => self.buf.extend_from_slice(&v.to_be_bytes()),
        }
    }

    /// Integer of `size` bytes holding the low bits of `v`.
    fn put_sized(&mut self, size: usize, v: u64) {
        match size {
            1 => self.put_u8(v as u8),
            2 => self.put_u16(v as u16),
            4 => self.put_u32(v as u32),
            _ => self.put_u64(v),
        }
    }

    fn put_len(&mut self, len: usize, path: &str) -> Result<(), EncodeError> {
        let len = u32::try_from(len).map_err(|_| EncodeError::TooLarge { path: path.to_string() })?;
        self.put_u32(len);
        Ok(())
    }

    /// Writes a placeholder DHEADER and returns its offset.
    fn begin_dheader(&mut self) -> usize {
        self.align(4);
        let at = self.buf.len();
        self.buf.extend_from_slice(&[0; 4]);
        at
    }

    fn end_dheader(&mut self, at: usize, path: &str) -> Result<(), EncodeError> {
        let size = u32::try_from(self.buf.len() - at - 4).map_err(|_| EncodeError::TooLarge { path: path.to_string() })?;
        let bytes = match self.order {
            ByteOrder::Little => size.to_le_bytes(),
            ByteOrder::Big => size.to_be_bytes(),
        };
        self.buf[at..at + 4].copy_from_slice(&bytes);
        Ok(())
    }

    // ---- values ----

    fn mismatch(&self, ty: &DataType, value: &Value, path: &str) -> EncodeError {
        EncodeError::Mismatch {
            path: path.to_string(),
            expected: self.module.type_label(ty),
            found: value.kind_name(),
        }
    }

    fn value(&mut self, ty: &DataType, value: &Value, path: &str) -> Result<(), EncodeError> {
        match (ty, value) {
            (DataType::Primitive(p), v) => self.primitive(*p, v).ok_or_else(|| self.mismatch(ty, value, path)),
            (DataType::String { .. }, Value::String(s)) => {
                self.put_len(s.len() + 1, path)?;
                self.buf.extend_from_slice(s.as_bytes());
                self.put_u8(0);
                Ok(())
            }
            (DataType::Sequence { element, .. }, Value::Sequence(items)) => {
                let dheader = needs_dheader(self.module, element).then(|| self.begin_dheader());
                self.put_len(items.len(), path)?;
                for (i, item) in items.iter().enumerate() {
                    self.value(element, item, &format!("{path}[{i}]"))?;
                }
                match dheader {
                    Some(at) => self.end_dheader(at, path),
                    None => Ok(()),
                }
            }
            (DataType::Array { element, .. }, Value::Array(items)) => {
                let dheader = needs_dheader(self.module, element).then(|| self.begin_dheader());
                for (i, item) in items.iter().enumerate() {
                    self.value(element, item, &format!("{path}[{i}]"))?;
                }
                match dheader {
                    Some(at) => self.end_dheader(at, path),
                    None => Ok(()),
                }
            }
            (DataType::Named(id), v) => {
                let module = self.module;
                let descriptor = module
                    .get(*id)
                    .ok_or_else(|| EncodeError::UnknownType(format!("#{}", id.0)))?;
                self.named(descriptor, ty, v, path)
            }
            _ => Err(self.mismatch(ty, value, path)),
        }
    }

    fn named(&mut self, descriptor: &TypeDescriptor, ty: &DataType, value: &Value, path: &str) -> Result<(), EncodeError> {
        match (descriptor, value) {
            (TypeDescriptor::Alias(inner), v) => self.value(inner, v, path),
            (TypeDescriptor::Enum(_), Value::Enum(v)) => {
                self.put_u32(*v);
                Ok(())
            }
            (TypeDescriptor::Bitmask(b), Value::Bitmask(bits)) => {
                self.put_sized(b.wire_size(), *bits);
                Ok(())
            }
            (TypeDescriptor::Struct(s), Value::Struct(slots)) => {
                let dheader = (s.extensibility == Extensibility::Appendable).then(|| self.begin_dheader());
                for (member, slot) in s.members.iter().zip(slots) {
                    let member_path = format!("{path}.{}", member.name);
                    if member.optional {
                        self.put_u8(slot.is_some() as u8);
                    }
                    match slot {
                        Some(v) => self.value(&member.ty, v, &member_path)?,
                        None if member.optional => {}
                        None => return Err(self.mismatch(&member.ty, value, &member_path)),
                    }
                }
                match dheader {
                    Some(at) => self.end_dheader(at, path),
                    None => Ok(()),
                }
            }
            (
                TypeDescriptor::Union(u),
                Value::Union {
                    discriminator,
                    member,
                },
            ) => {
                let dheader = (u.extensibility == Extensibility::Appendable).then(|| self.begin_dheader());
                match u.discriminator {
                    DiscriminatorType::Primitive(p) => self.put_sized(p.size(), *discriminator as u64),
                    DiscriminatorType::Enum(_) => self.put_u32(*discriminator as u32),
                }
                if let (Some(case), Some(v)) = (u.case_for(*discriminator), member) {
                    self.value(&case.member.ty, v, &format!("{path}.{}", case.member.name))?;
                }
                match dheader {
                    Some(at) => self.end_dheader(at, path),
                    None => Ok(()),
                }
            }
            _ => Err(self.mismatch(ty, value, path)),
        }
    }

    /// `None` if `value` is not the variant for `p`.
    fn primitive(&mut self, p: PrimitiveType, value: &Value) -> Option<()> {
        match (p, value) {
            (PrimitiveType::Boolean, Value::Boolean(b)) => self.put_u8(*b as u8),
            (PrimitiveType::Char, Value::Char(v))
            | (PrimitiveType::Octet, Value::Octet(v))
            | (PrimitiveType::UInt8, Value::UInt8(v)) => self.put_u8(*v),
            (PrimitiveType::Int8, Value::Int8(v)) => self.put_u8(*v as u8),
            (PrimitiveType::Short, Value::Int16(v)) => self.put_u16(*v as u16),
            (PrimitiveType::UShort, Value::UInt16(v)) => self.put_u16(*v),
            (PrimitiveType::Long, Value::Int32(v)) => self.put_u32(*v as u32),
            (PrimitiveType::ULong, Value::UInt32(v)) => self.put_u32(*v),
            (PrimitiveType::LongLong, Value::Int64(v)) => self.put_u64(*v as u64),
            (PrimitiveType::ULongLong, Value::UInt64(v)) => self.put_u64(*v),
            (PrimitiveType::Float, Value::Float32(v)) => self.put_u32(v.to_bits()),
            (PrimitiveType::Double, Value::Float64(v)) => self.put_u64(v.to_bits()),
            _ => return None,
        }
        Some(())
    }
}
