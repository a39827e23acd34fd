//! Compiled type descriptors.
//!
//! A [`CompiledModule`] is the output of the schema compiler: every named
//! type of one IDL module, in declaration order, with references resolved to
//! [`TypeId`]s and typedefs flattened into the types that use them. It is
//! the only source of type information for instance generation and encoding,
//! and it owns the value constructor [`CompiledModule::construct`].

use std::collections::HashSet;

use indexmap::IndexMap;
use thiserror::Error;

use crate::types::{Extensibility, PrimitiveType};
use crate::value::{Instance, Value};

/// Index of a named type within its [`CompiledModule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub usize);

/// Type of a member, element or typedef target.
#[derive(Debug, Clone, PartialEq)]
pub enum DataType {
    Primitive(PrimitiveType),
    String { bound: Option<u32> },
    Sequence { element: Box<DataType>, bound: Option<u32> },
    /// Multi-dimensional arrays are a single array with several dimensions.
    Array { element: Box<DataType>, dims: Vec<u32> },
    /// A struct, union, enum or bitmask.
    Named(TypeId),
}

impl DataType {
    /// Wraps `element` in array dimensions, merging nested arrays.
    pub fn array(element: DataType, dims: Vec<u32>) -> DataType {
        if dims.is_empty() {
            return element;
        }
        match element {
            DataType::Array {
                element: inner,
                dims: inner_dims,
            } => {
                let mut all = dims;
                all.extend(inner_dims);
                DataType::Array { element: inner, dims: all }
            }
            other => DataType::Array {
                element: Box::new(other),
                dims,
            },
        }
    }

    /// Total number of array elements; 1 for non-arrays.
    pub fn element_count(dims: &[u32]) -> usize {
        dims.iter().map(|&d| d as usize).product()
    }
}

/// A named type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDescriptor {
    Struct(StructDescriptor),
    Union(UnionDescriptor),
    Enum(EnumDescriptor),
    Bitmask(BitmaskDescriptor),
    /// Kept for lookups by name; uses of the alias refer to the target.
    Alias(DataType),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDescriptor {
    pub members: Vec<MemberDescriptor>,
    pub extensibility: Extensibility,
    /// Annotated `@topic`.
    pub topic: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberDescriptor {
    pub name: String,
    pub ty: DataType,
    pub optional: bool,
    pub key: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionDescriptor {
    pub discriminator: DiscriminatorType,
    pub cases: Vec<CaseDescriptor>,
    pub extensibility: Extensibility,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscriminatorType {
    Primitive(PrimitiveType),
    Enum(TypeId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseDescriptor {
    /// Label values; enumerator labels are stored as their integral value.
    pub labels: Vec<i64>,
    pub is_default: bool,
    pub member: MemberDescriptor,
}

impl UnionDescriptor {
    /// Case selected by `discriminator`: a labelled case, else the default case.
    pub fn case_for(&self, discriminator: i64) -> Option<&CaseDescriptor> {
        self.cases
            .iter()
            .find(|c| c.labels.contains(&discriminator))
            .or_else(|| self.cases.iter().find(|c| c.is_default))
    }

    /// Every label value of every case.
    pub fn covered(&self) -> HashSet<i64> {
        self.cases.iter().flat_map(|c| c.labels.iter().copied()).collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    pub enumerators: Vec<EnumeratorDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumeratorDescriptor {
    pub name: String,
    pub value: u32,
}

impl EnumDescriptor {
    pub fn contains(&self, value: u32) -> bool {
        self.enumerators.iter().any(|e| e.value == value)
    }

    pub fn value_of(&self, name: &str) -> Option<u32> {
        self.enumerators.iter().find(|e| e.name == name).map(|e| e.value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BitmaskDescriptor {
    pub bit_bound: u8,
    pub flags: Vec<FlagDescriptor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlagDescriptor {
    pub name: String,
    pub position: u8,
}

impl BitmaskDescriptor {
    /// Union of all flag bits.
    pub fn mask(&self) -> u64 {
        self.flags.iter().fold(0, |m, f| m | (1u64 << f.position))
    }

    /// Bytes on the wire.
    pub fn wire_size(&self) -> usize {
        match self.bit_bound {
            0..=8 => 1,
            9..=16 => 2,
            17..=32 => 4,
            _ => 8,
        }
    }
}

/// A value rejected by [`CompiledModule::construct`].
#[derive(Debug, Error, PartialEq)]
pub enum ConstructError {
    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("{path}: expected {expected}, found {found}")]
    Mismatch {
        path: String,
        expected: String,
        found: &'static str,
    },

    #[error("{path}: length {len} exceeds bound {bound}")]
    BoundExceeded { path: String, len: usize, bound: u32 },

    #[error("{path}: array has {len} elements, expected {expected}")]
    ArrayLength {
        path: String,
        len: usize,
        expected: usize,
    },

    #[error("{path}: string contains NUL")]
    InvalidString { path: String },

    #[error("{path}: {value} is not an enumerator")]
    InvalidEnumerator { path: String, value: u32 },

    #[error("{path}: bits {bits:#x} outside the bitmask")]
    InvalidBits { path: String, bits: u64 },

    #[error("{path}: discriminator {value} out of range")]
    InvalidDiscriminator { path: String, value: i64 },

    #[error("{path}: struct has {found} members, expected {expected}")]
    MemberCount {
        path: String,
        found: usize,
        expected: usize,
    },

    #[error("{path}: non-optional member is absent")]
    MissingMember { path: String },

    #[error("{path}: union member does not agree with the discriminator")]
    UnionMember { path: String },
}

/// Descriptor table of one compiled IDL module.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModule {
    name: String,
    types: IndexMap<String, TypeDescriptor>,
}

impl CompiledModule {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: IndexMap::new(),
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of named types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Adds a type; a later insert under the same name replaces the descriptor
    /// but keeps the id.
    pub fn insert(&mut self, name: impl Into<String>, descriptor: TypeDescriptor) -> TypeId {
        let (index, _) = self.types.insert_full(name.into(), descriptor);
        TypeId(index)
    }

    /// Looks up a type by plain or module-scoped name (`T` or `module::T`).
    pub fn lookup(&self, name: &str) -> Option<(TypeId, &TypeDescriptor)> {
        let local = name
            .strip_prefix("::")
            .unwrap_or(name)
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix("::"))
            .unwrap_or(name);
        self.types
            .get_full(local)
            .map(|(index, _, descriptor)| (TypeId(index), descriptor))
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeDescriptor> {
        self.types.get_index(id.0).map(|(_, d)| d)
    }

    pub fn name_of(&self, id: TypeId) -> Option<&str> {
        self.types.get_index(id.0).map(|(n, _)| n.as_str())
    }

    /// All types in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (TypeId, &str, &TypeDescriptor)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, (name, d))| (TypeId(i), name.as_str(), d))
    }

    /// Names of `@topic` structs in declaration order.
    pub fn topic_types(&self) -> impl Iterator<Item = &str> {
        self.types.iter().filter_map(|(name, d)| match d {
            TypeDescriptor::Struct(s) if s.topic => Some(name.as_str()),
            _ => None,
        })
    }

    /// Follows typedefs until a non-alias type.
    pub fn resolve<'a>(&'a self, ty: &'a DataType) -> &'a DataType {
        let mut current = ty;
        // typedef chains are acyclic; the bound only guards malformed tables
        for _ in 0..=self.types.len() {
            match current {
                DataType::Named(id) => match self.get(*id) {
                    Some(TypeDescriptor::Alias(inner)) => current = inner,
                    _ => return current,
                },
                _ => return current,
            }
        }
        current
    }

    /// Discriminator value selecting the default case: the smallest
    /// non-negative value (or first enumerator) not used by any label.
    pub fn default_discriminator(&self, union: &UnionDescriptor) -> Option<i64> {
        let covered = union.covered();
        match union.discriminator {
            DiscriminatorType::Primitive(p) => {
                let (lo, hi) = p.discriminator_range()?;
                (lo.max(0)..=hi).find(|v| !covered.contains(v))
            }
            DiscriminatorType::Enum(id) => match self.get(id) {
                Some(TypeDescriptor::Enum(e)) => e
                    .enumerators
                    .iter()
                    .map(|en| en.value as i64)
                    .find(|v| !covered.contains(v)),
                _ => None,
            },
        }
    }

    /// Whether `value` is representable by the union's discriminator type.
    pub fn discriminator_valid(&self, discriminator: DiscriminatorType, value: i64) -> bool {
        match discriminator {
            DiscriminatorType::Primitive(p) => p
                .discriminator_range()
                .is_some_and(|(lo, hi)| (lo..=hi).contains(&value)),
            DiscriminatorType::Enum(id) => match self.get(id) {
                Some(TypeDescriptor::Enum(e)) => u32::try_from(value).is_ok_and(|v| e.contains(v)),
                _ => false,
            },
        }
    }

    /// Checks `value` against the named type and wraps it as an [`Instance`].
    pub fn construct(&self, type_name: &str, value: Value) -> Result<Instance, ConstructError> {
        let (id, _) = self
            .lookup(type_name)
            .ok_or_else(|| ConstructError::UnknownType(type_name.to_string()))?;
        let name = self.name_of(id).unwrap_or(type_name).to_string();
        self.check(&DataType::Named(id), &value, &name)?;
        Ok(Instance {
            type_name: name,
            value,
        })
    }

    /// Checks `value` against `ty`; `path` names the value in errors.
    pub fn check(&self, ty: &DataType, value: &Value, path: &str) -> Result<(), ConstructError> {
        match (ty, value) {
            (DataType::Primitive(p), v) if primitive_matches(*p, v) => Ok(()),
            (DataType::String { bound }, Value::String(s)) => {
                if s.contains('\0') {
                    return Err(ConstructError::InvalidString { path: path.to_string() });
                }
                check_bound(path, s.len(), *bound)
            }
            (DataType::Sequence { element, bound }, Value::Sequence(items)) => {
                check_bound(path, items.len(), *bound)?;
                for (i, item) in items.iter().enumerate() {
                    self.check(element, item, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            (DataType::Array { element, dims }, Value::Array(items)) => {
                let expected = DataType::element_count(dims);
                if items.len() != expected {
                    return Err(ConstructError::ArrayLength {
                        path: path.to_string(),
                        len: items.len(),
                        expected,
                    });
                }
                for (i, item) in items.iter().enumerate() {
                    self.check(element, item, &format!("{path}[{i}]"))?;
                }
                Ok(())
            }
            (DataType::Named(id), v) => self.check_named(*id, v, path),
            (ty, v) => Err(ConstructError::Mismatch {
                path: path.to_string(),
                expected: self.type_label(ty),
                found: v.kind_name(),
            }),
        }
    }

    fn check_named(&self, id: TypeId, value: &Value, path: &str) -> Result<(), ConstructError> {
        let descriptor = self
            .get(id)
            .ok_or_else(|| ConstructError::UnknownType(format!("#{}", id.0)))?;
        match (descriptor, value) {
            (TypeDescriptor::Alias(inner), v) => self.check(inner, v, path),
            (TypeDescriptor::Enum(e), Value::Enum(v)) => {
                if e.contains(*v) {
                    Ok(())
                } else {
                    Err(ConstructError::InvalidEnumerator {
                        path: path.to_string(),
                        value: *v,
                    })
                }
            }
            (TypeDescriptor::Bitmask(b), Value::Bitmask(bits)) => {
                if bits & !b.mask() == 0 {
                    Ok(())
                } else {
                    Err(ConstructError::InvalidBits {
                        path: path.to_string(),
                        bits: *bits,
                    })
                }
            }
            (TypeDescriptor::Struct(s), Value::Struct(slots)) => {
                if slots.len() != s.members.len() {
                    return Err(ConstructError::MemberCount {
                        path: path.to_string(),
                        found: slots.len(),
                        expected: s.members.len(),
                    });
                }
                for (member, slot) in s.members.iter().zip(slots) {
                    let member_path = format!("{path}.{}", member.name);
                    match slot {
                        Some(v) => self.check(&member.ty, v, &member_path)?,
                        None if member.optional => {}
                        None => return Err(ConstructError::MissingMember { path: member_path }),
                    }
                }
                Ok(())
            }
            (
                TypeDescriptor::Union(u),
                Value::Union {
                    discriminator,
                    member,
                },
            ) => {
                if !self.discriminator_valid(u.discriminator, *discriminator) {
                    return Err(ConstructError::InvalidDiscriminator {
                        path: path.to_string(),
                        value: *discriminator,
                    });
                }
                match (u.case_for(*discriminator), member) {
                    (Some(case), Some(v)) => {
                        self.check(&case.member.ty, v, &format!("{path}.{}", case.member.name))
                    }
                    (None, None) => Ok(()),
                    _ => Err(ConstructError::UnionMember { path: path.to_string() }),
                }
            }
            (_, v) => Err(ConstructError::Mismatch {
                path: path.to_string(),
                expected: self.name_of(id).unwrap_or("?").to_string(),
                found: v.kind_name(),
            }),
        }
    }

    /// Human-readable name of a type, for error messages.
    pub fn type_label(&self, ty: &DataType) -> String {
        match ty {
            DataType::Primitive(p) => p.idl_name().to_string(),
            DataType::String { .. } => "string".to_string(),
            DataType::Sequence { .. } => "sequence".to_string(),
            DataType::Array { .. } => "array".to_string(),
            DataType::Named(id) => self.name_of(*id).unwrap_or("?").to_string(),
        }
    }
}

fn check_bound(path: &str, len: usize, bound: Option<u32>) -> Result<(), ConstructError> {
    match bound {
        Some(b) if len > b as usize => Err(ConstructError::BoundExceeded {
            path: path.to_string(),
            len,
            bound: b,
        }),
        _ => Ok(()),
    }
}

/// Whether `value` is the variant for primitive `p`.
pub fn primitive_matches(p: PrimitiveType, value: &Value) -> bool {
    matches!(
        (p, value),
        (PrimitiveType::Boolean, Value::Boolean(_))
            | (PrimitiveType::Char, Value::Char(_))
            | (PrimitiveType::Octet, Value::Octet(_))
            | (PrimitiveType::Int8, Value::Int8(_))
            | (PrimitiveType::UInt8, Value::UInt8(_))
            | (PrimitiveType::Short, Value::Int16(_))
            | (PrimitiveType::UShort, Value::UInt16(_))
            | (PrimitiveType::Long, Value::Int32(_))
            | (PrimitiveType::ULong, Value::UInt32(_))
            | (PrimitiveType::LongLong, Value::Int64(_))
            | (PrimitiveType::ULongLong, Value::UInt64(_))
            | (PrimitiveType::Float, Value::Float32(_))
            | (PrimitiveType::Double, Value::Float64(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_module() -> CompiledModule {
        let mut module = CompiledModule::new("fuzz");
        let color = module.insert(
            "Color",
            TypeDescriptor::Enum(EnumDescriptor {
                enumerators: vec![
                    EnumeratorDescriptor { name: "RED".into(), value: 0 },
                    EnumeratorDescriptor { name: "BLUE".into(), value: 3 },
                ],
            }),
        );
        let pick = module.insert(
            "Pick",
            TypeDescriptor::Union(UnionDescriptor {
                discriminator: DiscriminatorType::Primitive(PrimitiveType::Short),
                cases: vec![CaseDescriptor {
                    labels: vec![0, 1],
                    is_default: false,
                    member: MemberDescriptor {
                        name: "a".into(),
                        ty: DataType::Named(color),
                        optional: false,
                        key: false,
                    },
                }],
                extensibility: Extensibility::Final,
            }),
        );
        module.insert(
            "Top",
            TypeDescriptor::Struct(StructDescriptor {
                members: vec![
                    MemberDescriptor {
                        name: "name".into(),
                        ty: DataType::String { bound: Some(3) },
                        optional: false,
                        key: false,
                    },
                    MemberDescriptor {
                        name: "note".into(),
                        ty: DataType::Primitive(PrimitiveType::Long),
                        optional: true,
                        key: false,
                    },
                    MemberDescriptor {
                        name: "pick".into(),
                        ty: DataType::Named(pick),
                        optional: false,
                        key: false,
                    },
                ],
                extensibility: Extensibility::Final,
                topic: true,
            }),
        );
        module
    }

    fn top(name: &str, note: Option<Value>, pick: Value) -> Value {
        Value::Struct(vec![Some(Value::String(name.into())), note, Some(pick)])
    }

    #[test]
    fn test_lookup_scoped_names() {
        let module = sample_module();
        assert_eq!(module.lookup("Top").map(|(id, _)| id), Some(TypeId(2)));
        assert_eq!(module.lookup("fuzz::Top").map(|(id, _)| id), Some(TypeId(2)));
        assert_eq!(module.lookup("::fuzz::Top").map(|(id, _)| id), Some(TypeId(2)));
        assert!(module.lookup("Nope").is_none());
        assert_eq!(module.topic_types().collect::<Vec<_>>(), vec!["Top"]);
    }

    #[test]
    fn test_construct_accepts_valid_value() {
        let module = sample_module();
        let pick = Value::Union {
            discriminator: 1,
            member: Some(Box::new(Value::Enum(3))),
        };
        let instance = module.construct("Top", top("abc", None, pick)).unwrap();
        assert_eq!(instance.type_name, "Top");

        // no case selected, no member
        let idle = Value::Union {
            discriminator: 7,
            member: None,
        };
        assert!(module.construct("Top", top("", Some(Value::Int32(1)), idle)).is_ok());
    }

    #[test]
    fn test_construct_rejects_violations() {
        let module = sample_module();
        let ok_pick = || Value::Union {
            discriminator: 0,
            member: Some(Box::new(Value::Enum(0))),
        };

        let err = module.construct("Top", top("abcd", None, ok_pick())).unwrap_err();
        assert!(matches!(err, ConstructError::BoundExceeded { len: 4, bound: 3, .. }));

        let bad_enum = Value::Union {
            discriminator: 0,
            member: Some(Box::new(Value::Enum(2))),
        };
        let err = module.construct("Top", top("a", None, bad_enum)).unwrap_err();
        assert_eq!(
            err,
            ConstructError::InvalidEnumerator {
                path: "Top.pick.a".into(),
                value: 2
            }
        );

        let wrong_member = Value::Union {
            discriminator: 9,
            member: Some(Box::new(Value::Enum(0))),
        };
        let err = module.construct("Top", top("a", None, wrong_member)).unwrap_err();
        assert!(matches!(err, ConstructError::UnionMember { .. }));

        let out_of_range = Value::Union {
            discriminator: 40_000,
            member: None,
        };
        let err = module.construct("Top", top("a", None, out_of_range)).unwrap_err();
        assert!(matches!(err, ConstructError::InvalidDiscriminator { value: 40_000, .. }));

        let err = module
            .construct("Top", Value::Struct(vec![Some(Value::String("a".into())), None, None]))
            .unwrap_err();
        assert_eq!(err, ConstructError::MissingMember { path: "Top.pick".into() });

        let err = module.construct("Top", top("a", Some(Value::Int64(1)), ok_pick())).unwrap_err();
        assert!(matches!(err, ConstructError::Mismatch { found: "long long", .. }));

        assert!(matches!(
            module.construct("Missing", Value::Boolean(true)),
            Err(ConstructError::UnknownType(_))
        ));
    }

    #[test]
    fn test_array_merge_and_length() {
        let inner = DataType::array(DataType::Primitive(PrimitiveType::Octet), vec![2]);
        let outer = DataType::array(inner, vec![3]);
        assert_eq!(
            outer,
            DataType::Array {
                element: Box::new(DataType::Primitive(PrimitiveType::Octet)),
                dims: vec![3, 2],
            }
        );

        let module = CompiledModule::new("m");
        let five = Value::Array(vec![Value::Octet(0); 5]);
        assert!(matches!(
            module.check(&outer, &five, "x"),
            Err(ConstructError::ArrayLength { len: 5, expected: 6, .. })
        ));
        assert!(module.check(&outer, &Value::Array(vec![Value::Octet(0); 6]), "x").is_ok());
    }

    #[test]
    fn test_default_discriminator() {
        let mut module = sample_module();
        let (_, descriptor) = module.lookup("Pick").unwrap();
        let TypeDescriptor::Union(pick) = descriptor.clone() else { unreachable!() };
        assert_eq!(module.default_discriminator(&pick), Some(2));

        let color = module.lookup("Color").unwrap().0;
        let by_enum = UnionDescriptor {
            discriminator: DiscriminatorType::Enum(color),
            cases: vec![CaseDescriptor {
                labels: vec![0],
                is_default: true,
                member: pick.cases[0].member.clone(),
            }],
            extensibility: Extensibility::Final,
        };
        module.insert("ByEnum", TypeDescriptor::Union(by_enum.clone()));
        assert_eq!(module.default_discriminator(&by_enum), Some(3));
        assert_eq!(by_enum.case_for(3).map(|c| c.is_default), Some(true));
    }

    #[test]
    fn test_bitmask_mask_and_size() {
        let b = BitmaskDescriptor {
            bit_bound: 16,
            flags: vec![
                FlagDescriptor { name: "A".into(), position: 0 },
                FlagDescriptor { name: "B".into(), position: 9 },
            ],
        };
        assert_eq!(b.mask(), 0x201);
        assert_eq!(b.wire_size(), 2);
    }
}
