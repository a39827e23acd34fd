//! Name resolution and semantic checks.
//!
//! Definitions are resolved strictly in declaration order, so a type can
//! only use types declared before it. Typedefs are flattened into their
//! users; the alias itself stays in the table for lookups by name.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use super::ast::*;
use crate::descriptor::{
    BitmaskDescriptor, CaseDescriptor, CompiledModule, DataType, DiscriminatorType, EnumDescriptor,
    EnumeratorDescriptor, FlagDescriptor, MemberDescriptor, StructDescriptor, TypeDescriptor,
    UnionDescriptor,
};
use crate::diagnostics::Diagnostic;
use crate::types::Extensibility;

/// Annotations the front end interprets or knowingly ignores.
const KNOWN_ANNOTATIONS: &[&str] = &[
    "topic",
    "final",
    "appendable",
    "mutable",
    "key",
    "optional",
    "value",
    "position",
    "bit_bound",
    "nested",
    "default_nested",
    "id",
];

const DEFAULT_BIT_BOUND: i64 = 32;

/// Resolves a parsed file into a descriptor table.
///
/// The file must declare exactly one module; if `expected_module` is given,
/// the module must carry that name.
pub fn resolve(spec: &Specification, expected_module: Option<&str>) -> Result<CompiledModule, Vec<Diagnostic>> {
    let module = match spec.modules.as_slice() {
        [] => return Err(vec![Diagnostic::error("no module declared", 0..0)]),
        [module] => module,
        [_, second, ..] => {
            return Err(vec![Diagnostic::error(
                "only a single module per file is supported",
                second.name.span.clone(),
            )])
        }
    };

    let mut resolver = Resolver::new(&module.name.name);
    if let Some(expected) = expected_module {
        if module.name.name != expected {
            resolver.errors.push(
                Diagnostic::error(
                    format!("module is named `{}`, expected `{expected}`", module.name.name),
                    module.name.span.clone(),
                )
                .with_label("module name mismatch"),
            );
        }
    }

    for definition in &module.definitions {
        if let Err(e) = resolver.definition(definition) {
            resolver.errors.push(e);
        }
    }

    if resolver.errors.is_empty() {
        Ok(resolver.module)
    } else {
        Err(resolver.errors)
    }
}

type ResolveResult<T> = Result<T, Diagnostic>;

struct Resolver {
    module: CompiledModule,
    /// Case-folded module-scope names: types, enumerators, flags.
    declared: HashMap<String, String>,
    errors: Vec<Diagnostic>,
}

impl Resolver {
    fn new(module_name: &str) -> Self {
        Self {
            module: CompiledModule::new(module_name),
            declared: HashMap::new(),
            errors: Vec::new(),
        }
    }

    fn declare(&mut self, ident: &Ident) -> ResolveResult<()> {
        let folded = ident.name.to_ascii_lowercase();
        if let Some(previous) = self.declared.get(&folded) {
            return Err(Diagnostic::error(
                format!("`{}` collides with earlier declaration `{previous}`", ident.name),
                ident.span.clone(),
            )
            .with_label("names are case-insensitive within a module"));
        }
        self.declared.insert(folded, ident.name.clone());
        Ok(())
    }

    fn definition(&mut self, definition: &Definition) -> ResolveResult<()> {
        check_known(&definition.annotations);
        match &definition.kind {
            DefinitionKind::Struct(decl) => self.structure(decl, &definition.annotations),
            DefinitionKind::Union(decl) => self.union(decl, &definition.annotations),
            DefinitionKind::Enum(decl) => self.enumeration(decl),
            DefinitionKind::Bitmask(decl) => self.bitmask(decl, &definition.annotations),
            DefinitionKind::Typedef(decl) => self.typedef(decl),
        }
    }

    fn structure(&mut self, decl: &StructDecl, annotations: &[Annotation]) -> ResolveResult<()> {
        let extensibility = extensibility(annotations)?;
        let topic = find(annotations, "topic").is_some();

        if decl.members.is_empty() {
            return Err(Diagnostic::error(format!("struct `{}` has no members", decl.name.name), decl.name.span.clone()));
        }

        let mut names = HashSet::new();
        let mut members = Vec::new();
        for member in &decl.members {
            check_known(&member.annotations);
            let key = find(&member.annotations, "key").is_some();
            let optional = find(&member.annotations, "optional").is_some();
            if key && optional {
                let span = find(&member.annotations, "optional").map_or(member.ty.span(), |a| a.span.clone());
                return Err(Diagnostic::error("a key member cannot be optional", span).with_label("`@optional` on a `@key` member"));
            }
            let base = self.data_type(&member.ty)?;
            for declarator in &member.declarators {
                unique_member(&mut names, &declarator.name)?;
                members.push(MemberDescriptor {
                    name: declarator.name.name.clone(),
                    ty: DataType::array(base.clone(), dims(&declarator.dims)?),
                    optional,
                    key,
                });
            }
        }

        self.declare(&decl.name)?;
        self.module.insert(
            decl.name.name.clone(),
            TypeDescriptor::Struct(StructDescriptor {
                members,
                extensibility,
                topic,
            }),
        );
        Ok(())
    }

    fn union(&mut self, decl: &UnionDecl, annotations: &[Annotation]) -> ResolveResult<()> {
        let extensibility = extensibility(annotations)?;
        let discriminator = match self.data_type(&decl.discriminator)? {
            DataType::Primitive(p) if p.is_discriminator() => DiscriminatorType::Primitive(p),
            DataType::Named(id) if matches!(self.module.get(id), Some(TypeDescriptor::Enum(_))) => {
                DiscriminatorType::Enum(id)
            }
            _ => {
                return Err(Diagnostic::error("invalid union discriminator type", decl.discriminator.span())
                    .with_label("expected an integer, boolean, char, octet or enum type"));
            }
        };

        if decl.cases.is_empty() {
            return Err(Diagnostic::error(format!("union `{}` has no cases", decl.name.name), decl.name.span.clone()));
        }

        let mut seen_labels = HashSet::new();
        let mut seen_default = false;
        let mut names = HashSet::new();
        let mut cases = Vec::new();
        for case in &decl.cases {
            let mut labels = Vec::new();
            let mut is_default = false;
            for label in &case.labels {
                let (value, span) = match label {
                    LabelDecl::Default(span) => {
                        if seen_default {
                            return Err(Diagnostic::error("duplicate default case", span.clone()));
                        }
                        seen_default = true;
                        is_default = true;
                        continue;
                    }
                    LabelDecl::Value(literal) => (self.integer_label(discriminator, literal)?, literal.span.clone()),
                    LabelDecl::Name(name) => (self.enumerator_label(discriminator, name)?, name.span.clone()),
                };
                if !seen_labels.insert(value) {
                    return Err(Diagnostic::error(format!("duplicate case label {value}"), span));
                }
                labels.push(value);
            }

            check_known(&case.annotations);
            unique_member(&mut names, &case.declarator.name)?;
            let base = self.data_type(&case.ty)?;
            cases.push(CaseDescriptor {
                labels,
                is_default,
                member: MemberDescriptor {
                    name: case.declarator.name.name.clone(),
                    ty: DataType::array(base, dims(&case.declarator.dims)?),
                    optional: false,
                    key: false,
                },
            });
        }

        self.declare(&decl.name)?;
        self.module.insert(
            decl.name.name.clone(),
            TypeDescriptor::Union(UnionDescriptor {
                discriminator,
                cases,
                extensibility,
            }),
        );
        Ok(())
    }

    fn integer_label(&self, discriminator: DiscriminatorType, literal: &Literal) -> ResolveResult<i64> {
        match discriminator {
            DiscriminatorType::Primitive(p) => {
                let in_range = p
                    .discriminator_range()
                    .is_some_and(|(lo, hi)| (lo..=hi).contains(&literal.value));
                if in_range {
                    Ok(literal.value)
                } else {
                    Err(Diagnostic::error(
                        format!("case label {} does not fit `{}`", literal.value, p.idl_name()),
                        literal.span.clone(),
                    ))
                }
            }
            DiscriminatorType::Enum(_) => Err(Diagnostic::error("expected an enumerator label", literal.span.clone())),
        }
    }

    fn enumerator_label(&self, discriminator: DiscriminatorType, name: &ScopedName) -> ResolveResult<i64> {
        let not_found = || {
            Diagnostic::error(format!("`{}` is not an enumerator of the discriminator", name.parts.join("::")), name.span.clone())
        };
        let DiscriminatorType::Enum(id) = discriminator else {
            return Err(not_found());
        };
        let Some(TypeDescriptor::Enum(e)) = self.module.get(id) else {
            return Err(not_found());
        };
        // `X`, `E::X` and `module::E::X` all name the same enumerator
        if name.parts.len() > 1 {
            let scope = &name.parts[name.parts.len() - 2];
            if Some(scope.as_str()) != self.module.name_of(id) {
                return Err(not_found());
            }
        }
        e.value_of(name.last()).map(i64::from).ok_or_else(not_found)
    }

    fn enumeration(&mut self, decl: &EnumDecl) -> ResolveResult<()> {
        self.declare(&decl.name)?;
        let mut enumerators = Vec::new();
        let mut values = HashSet::new();
        let mut next: i64 = 0;
        for constant in &decl.enumerators {
            check_known(&constant.annotations);
            let value = match find(&constant.annotations, "value") {
                Some(annotation) => annotation_value(annotation)?,
                None => next,
            };
            let value = u32::try_from(value).map_err(|_| {
                Diagnostic::error(format!("enumerator value {value} out of range"), constant.name.span.clone())
            })?;
            if !values.insert(value) {
                return Err(Diagnostic::error(format!("duplicate enumerator value {value}"), constant.name.span.clone()));
            }
            self.declare(&constant.name)?;
            enumerators.push(EnumeratorDescriptor {
                name: constant.name.name.clone(),
                value,
            });
            next = i64::from(value) + 1;
        }
        self.module
            .insert(decl.name.name.clone(), TypeDescriptor::Enum(EnumDescriptor { enumerators }));
        Ok(())
    }

    fn bitmask(&mut self, decl: &BitmaskDecl, annotations: &[Annotation]) -> ResolveResult<()> {
        let bit_bound = match find(annotations, "bit_bound") {
            Some(annotation) => annotation_value(annotation)?,
            None => DEFAULT_BIT_BOUND,
        };
        if !(1..=64).contains(&bit_bound) {
            return Err(Diagnostic::error(format!("bit bound {bit_bound} not in 1..=64"), decl.name.span.clone()));
        }

        self.declare(&decl.name)?;
        let mut flags = Vec::new();
        let mut positions = HashSet::new();
        let mut next: i64 = 0;
        for constant in &decl.flags {
            check_known(&constant.annotations);
            let position = match find(&constant.annotations, "position") {
                Some(annotation) => annotation_value(annotation)?,
                None => next,
            };
            if !(0..bit_bound).contains(&position) {
                return Err(Diagnostic::error(
                    format!("flag position {position} outside bit bound {bit_bound}"),
                    constant.name.span.clone(),
                ));
            }
            if !positions.insert(position) {
                return Err(Diagnostic::error(format!("duplicate flag position {position}"), constant.name.span.clone()));
            }
            self.declare(&constant.name)?;
            flags.push(FlagDescriptor {
                name: constant.name.name.clone(),
                position: position as u8,
            });
            next = position + 1;
        }
        self.module.insert(
            decl.name.name.clone(),
            TypeDescriptor::Bitmask(BitmaskDescriptor {
                bit_bound: bit_bound as u8,
                flags,
            }),
        );
        Ok(())
    }

    fn typedef(&mut self, decl: &TypedefDecl) -> ResolveResult<()> {
        let base = self.data_type(&decl.ty)?;
        for declarator in &decl.declarators {
            let ty = DataType::array(base.clone(), dims(&declarator.dims)?);
            self.declare(&declarator.name)?;
            self.module.insert(declarator.name.name.clone(), TypeDescriptor::Alias(ty));
        }
        Ok(())
    }

    fn data_type(&self, ty: &TypeRef) -> ResolveResult<DataType> {
        match ty {
            TypeRef::Primitive(p, _) => Ok(DataType::Primitive(*p)),
            TypeRef::String { bound, .. } => Ok(DataType::String {
                bound: bound.as_ref().map(positive).transpose()?,
            }),
            TypeRef::Sequence { element, bound, .. } => Ok(DataType::Sequence {
                element: Box::new(self.data_type(element)?),
                bound: bound.as_ref().map(positive).transpose()?,
            }),
            TypeRef::Scoped(name) => self.named(name),
        }
    }

    fn named(&self, name: &ScopedName) -> ResolveResult<DataType> {
        let undefined = || {
            Diagnostic::error(format!("undefined type `{}`", name.parts.join("::")), name.span.clone())
                .with_label("not declared before this use")
        };
        let qualified_ok = match name.parts.as_slice() {
            [_] => true,
            [module, _] => module == self.module.name(),
            _ => false,
        };
        if !qualified_ok {
            return Err(undefined());
        }
        match self.module.lookup(name.last()) {
            Some((_, TypeDescriptor::Alias(inner))) => Ok(inner.clone()),
            Some((id, _)) => Ok(DataType::Named(id)),
            None => Err(undefined()),
        }
    }
}

fn find<'a>(annotations: &'a [Annotation], name: &str) -> Option<&'a Annotation> {
    annotations.iter().find(|a| a.name.name == name)
}

fn check_known(annotations: &[Annotation]) {
    for annotation in annotations {
        if !KNOWN_ANNOTATIONS.contains(&annotation.name.name.as_str()) {
            warn!(annotation = %annotation.name.name, "ignoring unsupported annotation");
        }
    }
}

fn extensibility(annotations: &[Annotation]) -> ResolveResult<Extensibility> {
    if let Some(mutable) = find(annotations, "mutable") {
        return Err(Diagnostic::error("mutable types are not supported", mutable.span.clone()));
    }
    match (find(annotations, "final"), find(annotations, "appendable")) {
        (Some(_), Some(appendable)) => Err(Diagnostic::error("conflicting extensibility annotations", appendable.span.clone())),
        (_, Some(_)) => Ok(Extensibility::Appendable),
        _ => Ok(Extensibility::Final),
    }
}

fn annotation_value(annotation: &Annotation) -> ResolveResult<i64> {
    annotation.value.as_ref().map(|v| v.value).ok_or_else(|| {
        Diagnostic::error(format!("`@{}` needs an integer argument", annotation.name.name), annotation.span.clone())
    })
}

fn positive(literal: &Literal) -> ResolveResult<u32> {
    match u32::try_from(literal.value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Diagnostic::error(format!("bound {} must be a positive 32-bit integer", literal.value), literal.span.clone())),
    }
}

fn dims(literals: &[Literal]) -> ResolveResult<Vec<u32>> {
    literals.iter().map(positive).collect()
}

fn unique_member(names: &mut HashSet<String>, ident: &Ident) -> ResolveResult<()> {
    if names.insert(ident.name.to_ascii_lowercase()) {
        Ok(())
    } else {
        Err(Diagnostic::error(format!("duplicate member `{}`", ident.name), ident.span.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idl::parser::parse;
    use crate::types::PrimitiveType;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> Result<CompiledModule, Vec<Diagnostic>> {
        resolve(&parse(source)?, Some("m"))
    }

    fn first_error(source: &str) -> String {
        compile(source).unwrap_err().remove(0).message
    }

    #[test]
    fn test_resolves_in_declaration_order() {
        let module = compile(
            "module m {
               enum E { A, @value(5) B, C };
               typedef sequence<E, 3> Es;
               @topic @appendable struct S { @key long id; Es list[2]; m::E one; };
             };",
        )
        .unwrap();

        assert_eq!(module.len(), 3);
        let (e, TypeDescriptor::Enum(en)) = module.lookup("E").unwrap() else { panic!() };
        let values: Vec<u32> = en.enumerators.iter().map(|x| x.value).collect();
        assert_eq!(values, vec![0, 5, 6]);

        let Some((_, TypeDescriptor::Struct(s))) = module.lookup("S") else { panic!() };
        assert!(s.topic);
        assert_eq!(s.extensibility, Extensibility::Appendable);
        assert!(s.members[0].key);
        assert_eq!(
            s.members[1].ty,
            DataType::Array {
                element: Box::new(DataType::Sequence {
                    element: Box::new(DataType::Named(e)),
                    bound: Some(3),
                }),
                dims: vec![2],
            }
        );
        assert_eq!(s.members[2].ty, DataType::Named(e));
    }

    #[test]
    fn test_union_labels_resolved() {
        let module = compile(
            "module m {
               enum E { A, B, C };
               union U switch (E) { case A: case m::E::C: long x; default: short y; };
               union V switch (unsigned short) { case 0: case 7: octet z; };
             };",
        )
        .unwrap();
        let Some((_, TypeDescriptor::Union(u))) = module.lookup("U") else { panic!() };
        assert_eq!(u.cases[0].labels, vec![0, 2]);
        assert!(u.cases[1].is_default);
        let Some((_, TypeDescriptor::Union(v))) = module.lookup("V") else { panic!() };
        assert_eq!(v.discriminator, DiscriminatorType::Primitive(PrimitiveType::UShort));
    }

    #[test]
    fn test_bitmask_positions() {
        let module = compile("module m { @bit_bound(16) bitmask B { X, @position(9) Y, Z }; };").unwrap();
        let Some((_, TypeDescriptor::Bitmask(b))) = module.lookup("B") else { panic!() };
        assert_eq!(b.bit_bound, 16);
        let positions: Vec<u8> = b.flags.iter().map(|f| f.position).collect();
        assert_eq!(positions, vec![0, 9, 10]);
    }

    #[test]
    fn test_semantic_errors() {
        assert!(first_error("module m { struct S { T x; }; struct T { long a; }; };").contains("undefined type `T`"));
        assert!(first_error("module m { struct S { long a; short A; }; };").contains("duplicate member"));
        assert!(first_error("module m { struct S { long a; }; enum s { X }; };").contains("collides"));
        assert!(first_error("module m { struct S { string<0> a; }; };").contains("positive"));
        assert!(first_error("module m { struct S { long a[0]; }; };").contains("positive"));
        assert!(first_error("module m { struct S { @key @optional long a; }; };").contains("key member"));
        assert!(first_error("module m { union U switch (short) { case 1: long a; case 1: long b; }; };")
            .contains("duplicate case label"));
        assert!(first_error("module m { union U switch (octet) { case 300: long a; }; };").contains("does not fit"));
        assert!(first_error("module m { union U switch (float) { case 1: long a; }; };").contains("discriminator"));
        assert!(first_error("module m { union U switch (long) { default: long a; default: long b; }; };")
            .contains("duplicate default"));
        assert!(first_error("module m { @mutable struct S { long a; }; };").contains("mutable"));
        assert!(first_error("module m { bitmask B { @position(40) X }; };").contains("outside bit bound"));
        assert!(first_error("module other { struct S { long a; }; };").contains("expected `m`"));
    }

    #[test]
    fn test_self_reference_is_undefined() {
        let errors = compile("module m { struct S { sequence<S> next; }; };").unwrap_err();
        assert!(errors[0].message.contains("undefined type `S`"));
    }

    #[test]
    fn test_single_module_only() {
        let spec = parse("module a { struct S { long x; }; }; module b { struct T { long y; }; };").unwrap();
        let errors = resolve(&spec, None).unwrap_err();
        assert!(errors[0].message.contains("single module"));
    }
}
