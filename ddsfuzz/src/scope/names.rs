//! Identifier drawing.
//!
//! IDL identifiers collide case-insensitively, enumerators and bitmask flags
//! live in the enclosing module scope, and generated C code must not trip
//! over C keywords. The registry therefore keeps one case-folded set for
//! every identifier in the module.

use std::collections::HashSet;

use crate::rng::DrawStream;

use super::GenerateError;

const UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz";
const ALNUM_LOWER: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ALNUM_UPPER: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const MIN_LEN: u64 = 3;
const MAX_LEN: u64 = 10;

/// IDL 4.2 keywords plus the C keywords the generated bindings would hit.
const RESERVED: &[&str] = &[
    // IDL
    "abstract", "any", "alias", "attribute", "bitfield", "bitmask", "bitset", "boolean", "case",
    "char", "component", "connector", "const", "consumes", "context", "custom", "default",
    "double", "exception", "emits", "enum", "eventtype", "factory", "false", "finder", "fixed",
    "float", "getraises", "getter", "home", "import", "in", "inout", "interface", "local", "long",
    "manages", "map", "mirrorport", "module", "multiple", "native", "object", "octet", "oneway",
    "out", "primarykey", "private", "port", "porttype", "provides", "public", "publishes",
    "raises", "readonly", "setraises", "setter", "sequence", "short", "string", "struct",
    "supports", "switch", "true", "truncatable", "typedef", "typeid", "typename", "typeprefix",
    "unsigned", "union", "uses", "valuebase", "valuetype", "void", "wchar", "wstring", "int8",
    "uint8", "int16", "int32", "int64", "uint16", "uint32", "uint64",
    // C
    "auto", "break", "continue", "do", "else", "extern", "for", "goto", "if", "inline", "int",
    "register", "restrict", "return", "signed", "sizeof", "static", "volatile", "while", "bool",
    "null",
];

/// Case-insensitive set of identifiers in use.
#[derive(Debug, Clone)]
pub struct NameRegistry {
    taken: HashSet<String>,
    retries: usize,
}

/// Identifier shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameStyle {
    /// `Abc12x`: type names.
    Type,
    /// `abc12x`: members.
    Member,
    /// `ABC12X`: enumerators and bitmask flags.
    Constant,
}

impl NameRegistry {
    /// Creates a registry that gives up after `retries` collisions in a row.
    pub fn new(retries: usize) -> Self {
        Self {
            taken: HashSet::new(),
            retries,
        }
    }

    /// Whether `name` is reserved or already taken.
    pub fn is_taken(&self, name: &str) -> bool {
        let folded = name.to_ascii_lowercase();
        self.taken.contains(&folded) || RESERVED.contains(&folded.as_str())
    }

    /// Registers an externally chosen name. Returns `false` on collision.
    pub fn claim(&mut self, name: &str) -> bool {
        if self.is_taken(name) {
            return false;
        }
        self.taken.insert(name.to_ascii_lowercase());
        true
    }

    /// Draws a fresh identifier in `style`, redrawing on collision.
    pub fn fresh(&mut self, draw: &mut DrawStream, style: NameStyle) -> Result<String, GenerateError> {
        for _ in 0..=self.retries {
            let name = draw_identifier(draw, style);
            if self.claim(&name) {
                return Ok(name);
            }
        }
        Err(GenerateError::NamesExhausted {
            attempts: self.retries + 1,
        })
    }
}

/// Draw order: length, first character, remaining characters.
fn draw_identifier(draw: &mut DrawStream, style: NameStyle) -> String {
    let len = draw.range_inclusive(MIN_LEN, MAX_LEN) as usize;
    let (first, rest) = match style {
        NameStyle::Type => (UPPER, ALNUM_LOWER),
        NameStyle::Member => (LOWER, ALNUM_LOWER),
        NameStyle::Constant => (UPPER, ALNUM_UPPER),
    };
    let mut name = String::with_capacity(len);
    name.push(first[draw.index(first.len())] as char);
    for _ in 1..len {
        name.push(rest[draw.index(rest.len())] as char);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_are_reserved() {
        let registry = NameRegistry::new(4);
        assert!(registry.is_taken("struct"));
        assert!(registry.is_taken("Struct"));
        assert!(registry.is_taken("WHILE"));
        assert!(!registry.is_taken("Widget"));
    }

    #[test]
    fn test_claim_is_case_insensitive() {
        let mut registry = NameRegistry::new(4);
        assert!(registry.claim("Abc"));
        assert!(!registry.claim("ABC"));
        assert!(!registry.claim("abc"));
    }

    #[test]
    fn test_fresh_names_follow_style() {
        let mut registry = NameRegistry::new(64);
        let mut draw = DrawStream::new(1);
        for _ in 0..50 {
            let t = registry.fresh(&mut draw, NameStyle::Type).unwrap();
            assert!(t.chars().next().unwrap().is_ascii_uppercase());
            assert!((3..=10).contains(&t.len()));

            let m = registry.fresh(&mut draw, NameStyle::Member).unwrap();
            assert!(m.chars().next().unwrap().is_ascii_lowercase());

            let c = registry.fresh(&mut draw, NameStyle::Constant).unwrap();
            assert!(c.chars().all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit()));
        }
    }

    #[test]
    fn test_fresh_names_are_unique() {
        let mut registry = NameRegistry::new(64);
        let mut draw = DrawStream::new(99);
        let mut seen = HashSet::new();
        for _ in 0..500 {
            let name = registry.fresh(&mut draw, NameStyle::Member).unwrap();
            assert!(seen.insert(name.to_ascii_lowercase()));
        }
    }

    #[test]
    fn test_exhaustion_is_reported() {
        let mut registry = NameRegistry::new(0);
        let mut draw = DrawStream::new(5);
        let name = registry.fresh(&mut draw, NameStyle::Type).unwrap();

        // replay the same stream so the first candidate collides
        let mut replay = DrawStream::new(5);
        let err = registry.fresh(&mut replay, NameStyle::Type).unwrap_err();
        assert!(matches!(err, GenerateError::NamesExhausted { attempts: 1 }), "{name}: {err}");
    }
}
