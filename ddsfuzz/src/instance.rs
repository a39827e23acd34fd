//! Random sample values for compiled types.
//!
//! Values are drawn top-down from a [`DrawStream`]. Every sequence, string
//! and optional member is a *shrinkable* edge: it descends one level of the
//! depth budget, and once the budget is spent it terminates (empty or
//! absent) without consuming draws. Struct members, array elements and union
//! branches are mandatory and always generated; their nesting is only bounded
//! by `hard_depth_limit`.

use thiserror::Error;
use tracing::trace;

use crate::descriptor::{CompiledModule, ConstructError, DataType, TypeDescriptor, UnionDescriptor};
use crate::rng::DrawStream;
use crate::types::PrimitiveType;
use crate::value::{Instance, Value};

const PRINTABLE: (u64, u64) = (0x20, 0x7e);
const F32_SPAN: f64 = 1.0e6;
const F64_SPAN: f64 = 1.0e12;

/// Limits for instance generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstanceOptions {
    /// Depth budget for shrinkable edges.
    pub max_depth: u32,
    /// Mandatory nesting beyond which generation fails.
    pub hard_depth_limit: u32,
    /// Length cap for unbounded sequences.
    pub sequence_cap: u32,
    /// Length cap for unbounded strings.
    pub string_cap: u32,
}

impl Default for InstanceOptions {
    fn default() -> Self {
        Self {
            max_depth: 6,
            hard_depth_limit: 64,
            sequence_cap: 8,
            string_cap: 16,
        }
    }
}

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("`{type_name}` nests deeper than {limit} levels")]
    RecursionBoundExceeded { type_name: String, limit: u32 },

    #[error("union `{0}` has a default case but no free discriminator value")]
    NoDefaultValue(String),

    #[error("generated value rejected: {0}")]
    Construct(#[from] ConstructError),
}

/// Generates an instance of `type_name` from a fresh stream seeded with `seed`.
pub fn generate(
    module: &CompiledModule,
    type_name: &str,
    seed: u64,
    options: &InstanceOptions,
) -> Result<Instance, InstanceError> {
    InstanceGenerator::new(module, seed, *options).generate(type_name)
}

/// Draws values for the types of one module.
pub struct InstanceGenerator<'m> {
    module: &'m CompiledModule,
    draw: DrawStream,
    options: InstanceOptions,
    root: String,
}

impl<'m> InstanceGenerator<'m> {
    pub fn new(module: &'m CompiledModule, seed: u64, options: InstanceOptions) -> Self {
        Self {
            module,
            draw: DrawStream::new(seed),
            options,
            root: String::new(),
        }
    }

    /// Words consumed so far.
    pub fn draws(&self) -> u64 {
        self.draw.draws()
    }

    /// Draws a value of `type_name` and validates it through the module's
    /// constructor.
    pub fn generate(&mut self, type_name: &str) -> Result<Instance, InstanceError> {
        let (id, _) = self
            .module
            .lookup(type_name)
            .ok_or_else(|| InstanceError::UnknownType(type_name.to_string()))?;
        self.root = type_name.to_string();

        let before = self.draw.draws();
        let value = self.value(&DataType::Named(id), self.options.max_depth, 0)?;
        trace!(type_name, draws = self.draw.draws() - before, "generated instance");

        Ok(self.module.construct(type_name, value)?)
    }

    fn value(&mut self, ty: &DataType, depth: u32, nesting: u32) -> Result<Value, InstanceError> {
        if nesting > self.options.hard_depth_limit {
            return Err(InstanceError::RecursionBoundExceeded {
                type_name: self.root.clone(),
                limit: self.options.hard_depth_limit,
            });
        }
        let below = depth.saturating_sub(1);

        let value = match ty {
            DataType::Primitive(p) => self.primitive(*p),
            DataType::String { bound } => {
                if depth == 0 {
                    return Ok(Value::String(String::new()));
                }
                let max = bound.unwrap_or(self.options.string_cap) as u64;
                let len = self.draw.range_inclusive(0, max) as usize;
                let text = (0..len)
                    .map(|_| self.draw.range_inclusive(PRINTABLE.0, PRINTABLE.1) as u8 as char)
                    .collect();
                Value::String(text)
            }
            DataType::Sequence { element, bound } => {
                if depth == 0 {
                    return Ok(Value::Sequence(Vec::new()));
                }
                let max = bound.unwrap_or(self.options.sequence_cap) as u64;
                let len = self.draw.range_inclusive(0, max) as usize;
                let items = (0..len)
                    .map(|_| self.value(element, below, nesting + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Sequence(items)
            }
            DataType::Array { element, dims } => {
                let count = DataType::element_count(dims);
                let items = (0..count)
                    .map(|_| self.value(element, below, nesting + 1))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(items)
            }
            DataType::Named(id) => {
                let module = self.module;
                let descriptor = module
                    .get(*id)
                    .ok_or_else(|| InstanceError::UnknownType(format!("#{}", id.0)))?;
                match descriptor {
                    TypeDescriptor::Alias(inner) => self.value(inner, depth, nesting + 1)?,
                    TypeDescriptor::Enum(e) => {
                        let index = self.draw.index(e.enumerators.len());
                        Value::Enum(e.enumerators.get(index).map_or(0, |en| en.value))
                    }
                    TypeDescriptor::Bitmask(b) => {
                        let mut bits = 0u64;
                        for flag in &b.flags {
                            if self.draw.boolean() {
                                bits |= 1 << flag.position;
                            }
                        }
                        Value::Bitmask(bits)
                    }
                    TypeDescriptor::Struct(s) => {
                        let mut slots = Vec::with_capacity(s.members.len());
                        for member in &s.members {
                            if member.optional && (depth == 0 || !self.draw.boolean()) {
                                slots.push(None);
                                continue;
                            }
                            slots.push(Some(self.value(&member.ty, below, nesting + 1)?));
                        }
                        Value::Struct(slots)
                    }
                    TypeDescriptor::Union(u) => self.union(u, module.name_of(*id).unwrap_or("?"), below, nesting)?,
                }
            }
        };
        Ok(value)
    }

    fn union(&mut self, union: &UnionDescriptor, name: &str, below: u32, nesting: u32) -> Result<Value, InstanceError> {
        let index = self.draw.index(union.cases.len());
        let Some(case) = union.cases.get(index) else {
            let discriminator = self.module.default_discriminator(union).unwrap_or(0);
            return Ok(Value::Union {
                discriminator,
                member: None,
            });
        };

        let discriminator = match case.labels.len() {
            0 => self
                .module
                .default_discriminator(union)
                .ok_or_else(|| InstanceError::NoDefaultValue(name.to_string()))?,
            1 => case.labels[0],
            n => case.labels[self.draw.index(n)],
        };
        let member = self.value(&case.member.ty, below, nesting + 1)?;
        Ok(Value::Union {
            discriminator,
            member: Some(Box::new(member)),
        })
    }

    fn primitive(&mut self, p: PrimitiveType) -> Value {
        match p {
            PrimitiveType::Boolean => Value::Boolean(self.draw.boolean()),
            PrimitiveType::Char => Value::Char(self.draw.range_inclusive(PRINTABLE.0, PRINTABLE.1) as u8),
            PrimitiveType::Octet => Value::Octet(self.draw.bits() as u8),
            PrimitiveType::Int8 => Value::Int8(self.draw.bits() as i8),
            PrimitiveType::UInt8 => Value::UInt8(self.draw.bits() as u8),
            PrimitiveType::Short => Value::Int16(self.draw.bits() as i16),
            PrimitiveType::UShort => Value::UInt16(self.draw.bits() as u16),
            PrimitiveType::Long => Value::Int32(self.draw.bits() as i32),
            PrimitiveType::ULong => Value::UInt32(self.draw.bits() as u32),
            PrimitiveType::LongLong => Value::Int64(self.draw.bits() as i64),
            PrimitiveType::ULongLong => Value::UInt64(self.draw.bits()),
            PrimitiveType::Float => Value::Float32((self.draw.unit() * 2.0 * F32_SPAN - F32_SPAN) as f32),
            PrimitiveType::Double => Value::Float64(self.draw.unit() * 2.0 * F64_SPAN - F64_SPAN),
        }
    }
}
