//! Seeded scope construction.
//!
//! Draw order, per entity:
//!
//! 1. kind (weighted; forced to `struct` without a draw for the last entity
//!    when no struct exists yet),
//! 2. entity name,
//! 3. body:
//!    - struct: member count, then per member name, type, dimensions,
//!      optional flag;
//!    - union: discriminator, case count, per case label count and labels,
//!      default-case decision, then per case member name, type, dimensions;
//!    - enum: count, then per enumerator name, explicit flag, gap;
//!    - bitmask: bit bound, flag count, then per flag name, explicit flag, gap;
//!    - typedef: type, dimensions.
//!
//! A type is drawn as kind (primitive / string / sequence / earlier entity),
//! then its payload: the primitive, the bound, the bound and element type, or
//! the entity index. Dimensions are a chance draw, a count and one length per
//! dimension.
//!
//! After all entities, each struct in order draws whether it is top-level;
//! top-level structs then draw their extensibility and one key flag per
//! eligible member. If nothing was marked, the last struct becomes a final
//! top-level type without further draws.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::config::GeneratorConfig;
use crate::rng::DrawStream;
use crate::types::{Extensibility, PrimitiveType};

use super::names::{NameRegistry, NameStyle};
use super::{
    AliasDef, BitFlag, BitmaskDef, CaseLabel, Discriminator, EnumDef, Entity, EntityKind,
    Enumerator, Member, Scope, StructDef, TypeSpec, UnionCase, UnionDef,
};

/// Errors that can occur while generating a scope.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("no free identifier found after {attempts} attempts")]
    NamesExhausted { attempts: usize },

    #[error("a scope needs at least one entity")]
    EmptyScope,
}

/// Label values drawn for signed integral discriminators.
const SIGNED_LABELS: (i64, i64) = (-16, 47);
/// Label values drawn for unsigned integral discriminators.
const UNSIGNED_LABELS: (i64, i64) = (0, 63);
const ENUM_DISCRIMINATOR_CHANCE: f64 = 0.3;
const ENUM_GAP_MAX: u64 = 4;
const FLAG_GAP_MAX: u64 = 2;
const BIT_BOUNDS: [u8; 4] = [8, 16, 32, 64];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Struct,
    Union,
    Enum,
    Bitmask,
    Alias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecKind {
    Primitive,
    String,
    Sequence,
    Named,
}

/// Generates `count` entities inside module `module_name`.
pub fn generate(
    module_name: &str,
    count: usize,
    seed: u64,
    config: &GeneratorConfig,
) -> Result<Scope, GenerateError> {
    if count == 0 {
        return Err(GenerateError::EmptyScope);
    }

    let mut builder = UniverseBuilder::new(seed, config);
    builder.names.claim(module_name);

    for index in 0..count {
        let entity = builder.entity(index + 1 == count)?;
        debug!(
            name = %entity.name,
            kind = entity.kind_name(),
            weight = entity.weight,
            "generated entity"
        );
        builder.entities.push(entity);
    }
    builder.mark_top_level();

    let scope = Scope {
        module: module_name.to_string(),
        entities: builder.entities,
    };
    info!(
        module = module_name,
        entities = scope.entities.len(),
        top_level = scope.top_level().count(),
        draws = builder.draw.draws(),
        "generated type universe"
    );
    Ok(scope)
}

struct UniverseBuilder<'a> {
    config: &'a GeneratorConfig,
    draw: DrawStream,
    names: NameRegistry,
    entities: Vec<Entity>,
}

impl<'a> UniverseBuilder<'a> {
    fn new(seed: u64, config: &'a GeneratorConfig) -> Self {
        Self {
            config,
            draw: DrawStream::new(seed),
            names: NameRegistry::new(config.name_retries),
            entities: Vec::new(),
        }
    }

    fn entity(&mut self, last: bool) -> Result<Entity, GenerateError> {
        let has_struct = self
            .entities
            .iter()
            .any(|e| matches!(e.kind, EntityKind::Struct(_)));
        let kind = if last && !has_struct {
            Kind::Struct
        } else {
            self.draw_kind()
        };

        let name = self.names.fresh(&mut self.draw, NameStyle::Type)?;
        let kind = match kind {
            Kind::Struct => EntityKind::Struct(self.struct_def()?),
            Kind::Union => EntityKind::Union(self.union_def()?),
            Kind::Enum => EntityKind::Enum(self.enum_def()?),
            Kind::Bitmask => EntityKind::Bitmask(self.bitmask_def()?),
            Kind::Alias => EntityKind::Alias(self.alias_def()),
        };
        let weight = self.kind_weight(&kind);

        Ok(Entity {
            name,
            kind,
            top_level: None,
            weight,
        })
    }

    fn draw_kind(&mut self) -> Kind {
        let w = &self.config.kind_weights;
        self.draw
            .weighted(&[
                (Kind::Struct, w.struct_),
                (Kind::Union, w.union),
                (Kind::Enum, w.enum_),
                (Kind::Bitmask, w.bitmask),
                (Kind::Alias, w.alias),
            ])
            .unwrap_or(Kind::Struct)
    }

    fn struct_def(&mut self) -> Result<StructDef, GenerateError> {
        let count = self.draw.range_inclusive(1, self.config.max_members as u64) as usize;
        let mut members = Vec::with_capacity(count);
        let mut total: u64 = 0;

        for _ in 0..count {
            let name = self.names.fresh(&mut self.draw, NameStyle::Member)?;
            let budget = self.config.max_weight.saturating_sub(total);
            let (spec, dims) = self.declarator_type(budget);
            let optional = self.draw.chance(self.config.optional_chance);
            total = total.saturating_add(self.member_weight(&spec, &dims));
            members.push(Member {
                name,
                spec,
                dims,
                optional,
                key: false,
            });
        }

        Ok(StructDef { members })
    }

    fn union_def(&mut self) -> Result<UnionDef, GenerateError> {
        let enums: Vec<usize> = self
            .entities
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, EntityKind::Enum(_)))
            .map(|(i, _)| i)
            .collect();

        let discriminator = if !enums.is_empty() && self.draw.chance(ENUM_DISCRIMINATOR_CHANCE) {
            let index = enums[self.draw.index(enums.len())];
            Discriminator::Enum(self.entities[index].name.clone())
        } else {
            let primitive = self
                .draw
                .pick(&PrimitiveType::DISCRIMINATORS)
                .copied()
                .unwrap_or(PrimitiveType::Long);
            Discriminator::Primitive(primitive)
        };

        let case_count = self.draw.range_inclusive(1, self.config.max_union_cases as u64) as usize;
        let (mut label_sets, default_possible) = match &discriminator {
            Discriminator::Primitive(primitive) => self.integral_labels(*primitive, case_count),
            Discriminator::Enum(name) => self.enumerator_labels(name, case_count),
        };
        if default_possible && self.draw.chance(self.config.default_case_chance) {
            label_sets.push(vec![CaseLabel::Default]);
        }

        let mut cases = Vec::with_capacity(label_sets.len());
        let budget = self.config.max_weight.saturating_sub(1);
        for labels in label_sets {
            let name = self.names.fresh(&mut self.draw, NameStyle::Member)?;
            let (spec, dims) = self.declarator_type(budget);
            cases.push(UnionCase {
                labels,
                member: Member {
                    name,
                    spec,
                    dims,
                    optional: false,
                    key: false,
                },
            });
        }

        Ok(UnionDef {
            discriminator,
            cases,
        })
    }

    /// Disjoint integer label sets; a colliding draw probes upward (wrapping)
    /// to the next free value.
    fn integral_labels(&mut self, primitive: PrimitiveType, case_count: usize) -> (Vec<Vec<CaseLabel>>, bool) {
        let (lo, hi) = match primitive {
            PrimitiveType::Short | PrimitiveType::Long | PrimitiveType::Int8 | PrimitiveType::LongLong => {
                SIGNED_LABELS
            }
            _ => UNSIGNED_LABELS,
        };
        let pool = (hi - lo + 1) as usize;
        let mut used = HashSet::new();
        let mut sets = Vec::with_capacity(case_count);

        for _ in 0..case_count {
            if used.len() >= pool {
                break;
            }
            let label_count = self.draw.range_inclusive(1, self.config.max_case_labels as u64) as usize;
            let mut labels = Vec::with_capacity(label_count);
            for _ in 0..label_count {
                if used.len() >= pool {
                    break;
                }
                let mut value = self.draw.range_signed(lo, hi);
                while used.contains(&value) {
                    value = if value == hi { lo } else { value + 1 };
                }
                used.insert(value);
                labels.push(CaseLabel::Value(value));
            }
            sets.push(labels);
        }

        // the drawn pool is a small slice of the discriminator's range
        (sets, true)
    }

    /// Disjoint enumerator label sets drawn without replacement.
    fn enumerator_labels(&mut self, enum_name: &str, case_count: usize) -> (Vec<Vec<CaseLabel>>, bool) {
        let mut free: Vec<String> = match self.entities.iter().find(|e| e.name == enum_name) {
            Some(Entity {
                kind: EntityKind::Enum(def),
                ..
            }) => def.enumerators.iter().map(|e| e.name.clone()).collect(),
            _ => Vec::new(),
        };
        let mut sets = Vec::with_capacity(case_count);

        for _ in 0..case_count {
            if free.is_empty() {
                break;
            }
            let label_count = self.draw.range_inclusive(1, self.config.max_case_labels as u64) as usize;
            let mut labels = Vec::with_capacity(label_count);
            for _ in 0..label_count {
                if free.is_empty() {
                    break;
                }
                let i = self.draw.index(free.len());
                labels.push(CaseLabel::Enumerator(free.remove(i)));
            }
            sets.push(labels);
        }

        let default_possible = !free.is_empty();
        (sets, default_possible)
    }

    fn enum_def(&mut self) -> Result<EnumDef, GenerateError> {
        let count = self.draw.range_inclusive(1, self.config.max_enumerators as u64) as usize;
        let mut enumerators = Vec::with_capacity(count);
        let mut next: u32 = 0;

        for _ in 0..count {
            let name = self.names.fresh(&mut self.draw, NameStyle::Constant)?;
            let explicit = self.draw.chance(self.config.explicit_value_chance);
            let value = if explicit {
                next + self.draw.range_inclusive(0, ENUM_GAP_MAX) as u32
            } else {
                next
            };
            next = value + 1;
            enumerators.push(Enumerator {
                name,
                value,
                explicit,
            });
        }

        Ok(EnumDef { enumerators })
    }

    fn bitmask_def(&mut self) -> Result<BitmaskDef, GenerateError> {
        let bit_bound = self.draw.pick(&BIT_BOUNDS).copied().unwrap_or(32);
        let max_flags = self.config.max_bitmask_flags.min(bit_bound as usize) as u64;
        let count = self.draw.range_inclusive(1, max_flags) as usize;
        let mut flags = Vec::with_capacity(count);
        let mut next: u32 = 0;

        for _ in 0..count {
            if next >= bit_bound as u32 {
                break;
            }
            let name = self.names.fresh(&mut self.draw, NameStyle::Constant)?;
            let explicit = self.draw.chance(self.config.explicit_value_chance);
            let position = if explicit {
                (next + self.draw.range_inclusive(0, FLAG_GAP_MAX) as u32).min(bit_bound as u32 - 1)
            } else {
                next
            };
            next = position + 1;
            flags.push(BitFlag {
                name,
                position: position as u8,
                explicit,
            });
        }

        Ok(BitmaskDef { bit_bound, flags })
    }

    fn alias_def(&mut self) -> AliasDef {
        let (spec, dims) = self.declarator_type(self.config.max_weight);
        AliasDef { spec, dims }
    }

    /// Type plus declarator dimensions, replaced by `long` when the result
    /// would not fit in `budget`.
    fn declarator_type(&mut self, budget: u64) -> (TypeSpec, Vec<u32>) {
        let spec = self.type_spec(0);
        let dims = self.dims();
        if self.member_weight(&spec, &dims) > budget {
            return (TypeSpec::Primitive(PrimitiveType::Long), Vec::new());
        }
        (spec, dims)
    }

    fn type_spec(&mut self, nesting: usize) -> TypeSpec {
        let named = if self.entities.is_empty() { 0 } else { 3 };
        let sequence = if nesting < self.config.max_sequence_nesting { 1 } else { 0 };
        let kind = self
            .draw
            .weighted(&[
                (SpecKind::Primitive, 3),
                (SpecKind::String, 1),
                (SpecKind::Sequence, sequence),
                (SpecKind::Named, named),
            ])
            .unwrap_or(SpecKind::Primitive);

        match kind {
            SpecKind::Primitive => {
                let primitive = self
                    .draw
                    .pick(&PrimitiveType::ALL)
                    .copied()
                    .unwrap_or(PrimitiveType::Long);
                TypeSpec::Primitive(primitive)
            }
            SpecKind::String => TypeSpec::String { bound: self.bound() },
            SpecKind::Sequence => {
                let bound = self.bound();
                let element = self.type_spec(nesting + 1);
                TypeSpec::Sequence {
                    element: Box::new(element),
                    bound,
                }
            }
            SpecKind::Named => {
                let index = self.draw.index(self.entities.len());
                TypeSpec::Named(self.entities[index].name.clone())
            }
        }
    }

    fn bound(&mut self) -> Option<u32> {
        if self.draw.chance(self.config.bounded_chance) {
            Some(self.draw.range_inclusive(1, self.config.max_bound as u64) as u32)
        } else {
            None
        }
    }

    fn dims(&mut self) -> Vec<u32> {
        if !self.draw.chance(self.config.array_chance) {
            return Vec::new();
        }
        let count = self.draw.range_inclusive(1, self.config.max_array_dims as u64);
        (0..count)
            .map(|_| self.draw.range_inclusive(1, self.config.max_dim_len as u64) as u32)
            .collect()
    }

    fn spec_weight(&self, spec: &TypeSpec) -> u64 {
        match spec {
            TypeSpec::Primitive(_) => 1,
            TypeSpec::String { bound } => 1 + bound.unwrap_or(self.config.string_cap) as u64,
            TypeSpec::Sequence { element, bound } => {
                let len = bound.unwrap_or(self.config.sequence_cap) as u64;
                1u64.saturating_add(len.saturating_mul(self.spec_weight(element)))
            }
            TypeSpec::Named(name) => self
                .entities
                .iter()
                .find(|e| e.name == *name)
                .map_or(1, |e| e.weight),
        }
    }

    fn member_weight(&self, spec: &TypeSpec, dims: &[u32]) -> u64 {
        let elements: u64 = dims.iter().map(|&d| d as u64).product();
        self.spec_weight(spec).saturating_mul(elements)
    }

    fn kind_weight(&self, kind: &EntityKind) -> u64 {
        match kind {
            EntityKind::Struct(def) => def
                .members
                .iter()
                .map(|m| self.member_weight(&m.spec, &m.dims))
                .fold(0u64, u64::saturating_add)
                .max(1),
            EntityKind::Union(def) => {
                let widest = def
                    .cases
                    .iter()
                    .map(|c| self.member_weight(&c.member.spec, &c.member.dims))
                    .max()
                    .unwrap_or(0);
                widest.saturating_add(1)
            }
            EntityKind::Enum(_) | EntityKind::Bitmask(_) => 1,
            EntityKind::Alias(def) => self.member_weight(&def.spec, &def.dims),
        }
    }

    fn mark_top_level(&mut self) {
        let fraction = self.config.top_level_fraction;
        let mut marked = 0usize;

        for index in 0..self.entities.len() {
            if !matches!(self.entities[index].kind, EntityKind::Struct(_)) {
                continue;
            }
            if self.draw.chance(fraction) {
                let extensibility = if self.draw.boolean() {
                    Extensibility::Appendable
                } else {
                    Extensibility::Final
                };
                self.entities[index].top_level = Some(extensibility);
                self.mark_keys(index);
                marked += 1;
            }
        }

        if marked == 0 {
            let last_struct = self
                .entities
                .iter()
                .rposition(|e| matches!(e.kind, EntityKind::Struct(_)));
            if let Some(index) = last_struct {
                self.entities[index].top_level = Some(Extensibility::Final);
            }
        }
    }

    fn mark_keys(&mut self, index: usize) {
        let chance = self.config.key_chance;
        if let EntityKind::Struct(def) = &mut self.entities[index].kind {
            for member in &mut def.members {
                if member.spec.is_primitive() && member.dims.is_empty() && !member.optional {
                    member.key = self.draw.chance(chance);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scope(seed: u64) -> Scope {
        generate("fuzz", 12, seed, &GeneratorConfig::default()).unwrap()
    }

    fn referenced_names(spec: &TypeSpec, out: &mut Vec<String>) {
        match spec {
            TypeSpec::Named(name) => out.push(name.clone()),
            TypeSpec::Sequence { element, .. } => referenced_names(element, out),
            TypeSpec::Primitive(_) | TypeSpec::String { .. } => {}
        }
    }

    fn entity_references(entity: &Entity) -> Vec<String> {
        let mut out = Vec::new();
        match &entity.kind {
            EntityKind::Struct(def) => def.members.iter().for_each(|m| referenced_names(&m.spec, &mut out)),
            EntityKind::Union(def) => {
                if let Discriminator::Enum(name) = &def.discriminator {
                    out.push(name.clone());
                }
                def.cases.iter().for_each(|c| referenced_names(&c.member.spec, &mut out));
            }
            EntityKind::Alias(def) => referenced_names(&def.spec, &mut out),
            EntityKind::Enum(_) | EntityKind::Bitmask(_) => {}
        }
        out
    }

    #[test]
    fn test_exact_entity_count() {
        for count in [1, 2, 5, 12, 30] {
            let scope = generate("fuzz", count, 7, &GeneratorConfig::default()).unwrap();
            assert_eq!(scope.entities.len(), count);
        }
    }

    #[test]
    fn test_empty_scope_rejected() {
        let err = generate("fuzz", 0, 1, &GeneratorConfig::default()).unwrap_err();
        assert!(matches!(err, GenerateError::EmptyScope));
    }

    #[test]
    fn test_same_seed_same_scope() {
        for seed in 0..20 {
            assert_eq!(scope(seed), scope(seed));
        }
        assert_ne!(scope(1), scope(2));
    }

    #[test]
    fn test_names_unique_case_insensitive() {
        for seed in 0..20 {
            let scope = scope(seed);
            let mut seen = HashSet::new();
            for entity in &scope.entities {
                assert!(seen.insert(entity.name.to_ascii_lowercase()), "duplicate {}", entity.name);
            }
        }
    }

    #[test]
    fn test_references_only_point_backwards() {
        for seed in 0..50 {
            let scope = scope(seed);
            for (index, entity) in scope.entities.iter().enumerate() {
                for name in entity_references(entity) {
                    let target = scope.entities.iter().position(|e| e.name == name);
                    assert!(
                        matches!(target, Some(t) if t < index),
                        "seed {seed}: {} references {name} which is not earlier",
                        entity.name
                    );
                }
            }
        }
    }

    #[test]
    fn test_at_least_one_top_level_struct() {
        for seed in 0..100 {
            let scope = scope(seed);
            assert!(scope.top_level().count() >= 1, "seed {seed}");
            for entity in scope.top_level() {
                assert!(matches!(entity.kind, EntityKind::Struct(_)));
            }
        }
        let single = generate("fuzz", 1, 3, &GeneratorConfig::default()).unwrap();
        assert!(single.entities[0].is_top_level());
    }

    #[test]
    fn test_union_labels_disjoint_and_default_last() {
        for seed in 0..100 {
            for entity in &scope(seed).entities {
                let EntityKind::Union(def) = &entity.kind else { continue };
                assert!(!def.cases.is_empty());
                let mut seen = HashSet::new();
                for label in def.cases.iter().flat_map(|c| c.labels.iter()) {
                    assert!(seen.insert(format!("{label:?}")), "seed {seed}: duplicate label");
                }
                let defaults = def.cases.iter().filter(|c| c.is_default()).count();
                assert!(defaults <= 1);
                if defaults == 1 {
                    assert!(def.cases.last().unwrap().is_default());
                }
                for case in &def.cases {
                    assert!(!case.labels.is_empty());
                    assert!(!case.member.optional && !case.member.key);
                }
            }
        }
    }

    #[test]
    fn test_enum_values_and_bitmask_positions_increase() {
        for seed in 0..100 {
            for entity in &scope(seed).entities {
                match &entity.kind {
                    EntityKind::Enum(def) => {
                        assert!(!def.enumerators.is_empty());
                        for pair in def.enumerators.windows(2) {
                            assert!(pair[0].value < pair[1].value);
                        }
                    }
                    EntityKind::Bitmask(def) => {
                        assert!(!def.flags.is_empty());
                        for pair in def.flags.windows(2) {
                            assert!(pair[0].position < pair[1].position);
                        }
                        assert!(def.flags.iter().all(|f| f.position < def.bit_bound));
                    }
                    _ => {}
                }
            }
        }
    }

    #[test]
    fn test_keys_only_on_top_level_primitives() {
        for seed in 0..100 {
            for entity in &scope(seed).entities {
                let EntityKind::Struct(def) = &entity.kind else { continue };
                for member in def.members.iter().filter(|m| m.key) {
                    assert!(entity.is_top_level());
                    assert!(member.spec.is_primitive());
                    assert!(member.dims.is_empty());
                    assert!(!member.optional);
                }
            }
        }
    }

    #[test]
    fn test_weight_stays_near_limit() {
        let config = GeneratorConfig::default();
        let slack = config.max_members as u64;
        for seed in 0..100 {
            for entity in &scope(seed).entities {
                assert!(entity.weight <= config.max_weight + slack, "{} weighs {}", entity.name, entity.weight);
            }
        }
    }
}
