//! IDL source rendering.
//!
//! The output is a single module with one declaration per entity, in scope
//! order, indented by two spaces. Rendering is a pure function of the scope.

use crate::scope::{
    AliasDef, BitmaskDef, CaseLabel, Discriminator, EnumDef, Entity, EntityKind, Member, Scope,
    StructDef, TypeSpec, UnionDef,
};

const INDENT: &str = "  ";

/// Renders `scope` as IDL text, ending in a newline.
pub fn render(scope: &Scope) -> String {
    let mut writer = IdlWriter::default();
    writer.line(&format!("module {} {{", scope.module));
    writer.indent += 1;
    for entity in &scope.entities {
        writer.entity(entity);
    }
    writer.indent -= 1;
    writer.line("};");
    writer.out
}

/// IDL spelling of a type reference, without declarator dimensions.
pub fn spec_text(spec: &TypeSpec) -> String {
    match spec {
        TypeSpec::Primitive(p) => p.idl_name().to_string(),
        TypeSpec::String { bound: None } => "string".to_string(),
        TypeSpec::String { bound: Some(n) } => format!("string<{n}>"),
        TypeSpec::Sequence { element, bound } => {
            let inner = spec_text(element);
            match bound {
                Some(n) => format!("sequence<{inner}, {n}>"),
                // `>>` lexes as a shift operator
                None if inner.ends_with('>') => format!("sequence<{inner} >"),
                None => format!("sequence<{inner}>"),
            }
        }
        TypeSpec::Named(name) => name.clone(),
    }
}

fn declarator(name: &str, dims: &[u32]) -> String {
    let mut s = name.to_string();
    for d in dims {
        s.push_str(&format!("[{d}]"));
    }
    s
}

#[derive(Default)]
struct IdlWriter {
    out: String,
    indent: usize,
}

impl IdlWriter {
    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str(INDENT);
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn entity(&mut self, entity: &Entity) {
        if let Some(extensibility) = entity.top_level {
            self.line(&format!("@topic @{}", extensibility.annotation()));
        }
        match &entity.kind {
            EntityKind::Struct(def) => self.struct_decl(&entity.name, def),
            EntityKind::Union(def) => self.union_decl(&entity.name, def),
            EntityKind::Enum(def) => self.enum_decl(&entity.name, def),
            EntityKind::Bitmask(def) => self.bitmask_decl(&entity.name, def),
            EntityKind::Alias(def) => self.alias_decl(&entity.name, def),
        }
    }

    fn struct_decl(&mut self, name: &str, def: &StructDef) {
        self.line(&format!("struct {name} {{"));
        self.indent += 1;
        for member in &def.members {
            self.member(member);
        }
        self.indent -= 1;
        self.line("};");
    }

    fn member(&mut self, member: &Member) {
        let mut text = String::new();
        if member.key {
            text.push_str("@key ");
        }
        if member.optional {
            text.push_str("@optional ");
        }
        text.push_str(&spec_text(&member.spec));
        text.push(' ');
        text.push_str(&declarator(&member.name, &member.dims));
        text.push(';');
        self.line(&text);
    }

    fn union_decl(&mut self, name: &str, def: &UnionDef) {
        let discriminator = match &def.discriminator {
            Discriminator::Primitive(p) => p.idl_name(),
            Discriminator::Enum(e) => e.as_str(),
        };
        self.line(&format!("union {name} switch ({discriminator}) {{"));
        self.indent += 1;
        for case in &def.cases {
            for label in &case.labels {
                match label {
                    CaseLabel::Value(v) => self.line(&format!("case {v}:")),
                    CaseLabel::Enumerator(e) => self.line(&format!("case {e}:")),
                    CaseLabel::Default => self.line("default:"),
                }
            }
            self.indent += 1;
            self.member(&case.member);
            self.indent -= 1;
        }
        self.indent -= 1;
        self.line("};");
    }

    fn enum_decl(&mut self, name: &str, def: &EnumDef) {
        self.line(&format!("enum {name} {{"));
        self.indent += 1;
        let last = def.enumerators.len().saturating_sub(1);
        for (i, e) in def.enumerators.iter().enumerate() {
            let sep = if i == last { "" } else { "," };
            if e.explicit {
                self.line(&format!("@value({}) {}{sep}", e.value, e.name));
            } else {
                self.line(&format!("{}{sep}", e.name));
            }
        }
        self.indent -= 1;
        self.line("};");
    }

    fn bitmask_decl(&mut self, name: &str, def: &BitmaskDef) {
        if def.bit_bound != 32 {
            self.line(&format!("@bit_bound({})", def.bit_bound));
        }
        self.line(&format!("bitmask {name} {{"));
        self.indent += 1;
        let last = def.flags.len().saturating_sub(1);
        for (i, f) in def.flags.iter().enumerate() {
            let sep = if i == last { "" } else { "," };
            if f.explicit {
                self.line(&format!("@position({}) {}{sep}", f.position, f.name));
            } else {
                self.line(&format!("{}{sep}", f.name));
            }
        }
        self.indent -= 1;
        self.line("};");
    }

    fn alias_decl(&mut self, name: &str, def: &AliasDef) {
        self.line(&format!(
            "typedef {} {};",
            spec_text(&def.spec),
            declarator(name, &def.dims)
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{BitFlag, Enumerator, UnionCase};
    use crate::types::{Extensibility, PrimitiveType};
    use pretty_assertions::assert_eq;

    fn entity(name: &str, kind: EntityKind) -> Entity {
        Entity {
            name: name.to_string(),
            kind,
            top_level: None,
            weight: 1,
        }
    }

    #[test]
    fn test_nested_sequence_spacing() {
        let spec = TypeSpec::Sequence {
            element: Box::new(TypeSpec::Sequence {
                element: Box::new(TypeSpec::Primitive(PrimitiveType::Long)),
                bound: None,
            }),
            bound: Some(3),
        };
        assert_eq!(spec_text(&spec), "sequence<sequence<long>, 3>");

        let spec = TypeSpec::Sequence {
            element: Box::new(TypeSpec::String { bound: Some(4) }),
            bound: None,
        };
        assert_eq!(spec_text(&spec), "sequence<string<4> >");
    }

    #[test]
    fn test_render_every_construct() {
        let mut top = entity(
            "Top",
            EntityKind::Struct(StructDef {
                members: vec![
                    Member {
                        key: true,
                        ..Member::new("id", TypeSpec::Primitive(PrimitiveType::ULong))
                    },
                    Member {
                        optional: true,
                        ..Member::new("note", TypeSpec::String { bound: Some(8) })
                    },
                    Member {
                        dims: vec![2, 3],
                        ..Member::new("grid", TypeSpec::Named("Color".into()))
                    },
                    Member::new("choice", TypeSpec::Named("Pick".into())),
                ],
            }),
        );
        top.top_level = Some(Extensibility::Appendable);

        let scope = Scope {
            module: "fuzz".into(),
            entities: vec![
                entity(
                    "Color",
                    EntityKind::Enum(EnumDef {
                        enumerators: vec![
                            Enumerator { name: "RED".into(), value: 0, explicit: false },
                            Enumerator { name: "BLUE".into(), value: 3, explicit: true },
                        ],
                    }),
                ),
                entity(
                    "Bits",
                    EntityKind::Bitmask(BitmaskDef {
                        bit_bound: 8,
                        flags: vec![
                            BitFlag { name: "LOW".into(), position: 0, explicit: false },
                            BitFlag { name: "HIGH".into(), position: 7, explicit: true },
                        ],
                    }),
                ),
                entity(
                    "Vec",
                    EntityKind::Alias(AliasDef {
                        spec: TypeSpec::Sequence {
                            element: Box::new(TypeSpec::Primitive(PrimitiveType::Double)),
                            bound: Some(4),
                        },
                        dims: vec![2],
                    }),
                ),
                entity(
                    "Pick",
                    EntityKind::Union(UnionDef {
                        discriminator: Discriminator::Primitive(PrimitiveType::Short),
                        cases: vec![
                            UnionCase {
                                labels: vec![CaseLabel::Value(-1), CaseLabel::Value(4)],
                                member: Member::new("a", TypeSpec::Primitive(PrimitiveType::Octet)),
                            },
                            UnionCase {
                                labels: vec![CaseLabel::Default],
                                member: Member::new("b", TypeSpec::Named("Vec".into())),
                            },
                        ],
                    }),
                ),
                top,
            ],
        };

        let expected = "\
module fuzz {
  enum Color {
    RED,
    @value(3) BLUE
  };
  @bit_bound(8)
  bitmask Bits {
    LOW,
    @position(7) HIGH
  };
  typedef sequence<double, 4> Vec[2];
  union Pick switch (short) {
    case -1:
    case 4:
      octet a;
    default:
      Vec b;
  };
  @topic @appendable
  struct Top {
    @key unsigned long id;
    @optional string<8> note;
    Color grid[2][3];
    Pick choice;
  };
};
";
        assert_eq!(render(&scope), expected);
    }

    #[test]
    fn test_enum_discriminator_labels() {
        let scope = Scope {
            module: "m".into(),
            entities: vec![entity(
                "U",
                EntityKind::Union(UnionDef {
                    discriminator: Discriminator::Enum("Color".into()),
                    cases: vec![UnionCase {
                        labels: vec![CaseLabel::Enumerator("RED".into())],
                        member: Member::new("x", TypeSpec::String { bound: None }),
                    }],
                }),
            )],
        };
        let text = render(&scope);
        assert!(text.contains("union U switch (Color) {\n    case RED:\n      string x;\n"));
    }
}
