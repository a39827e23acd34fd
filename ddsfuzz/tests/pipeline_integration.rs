//! End-to-end tests for a corpus run.
//!
//! These tests drive `corpus::run` into temporary directories and inspect
//! the schema, manifest and corpus files it leaves behind.

use std::fs;
use std::path::Path;

use ddsfuzz::cdr::{self, ByteOrder};
use ddsfuzz::compiler::{Compilation, CompileError, IdlCompiler, SchemaCompiler};
use ddsfuzz::config::Config;
use ddsfuzz::corpus::{self, CorpusError, RunOptions};
use ddsfuzz::emit;
use ddsfuzz::instance::{self, InstanceOptions};
use ddsfuzz::scope::{
    CaseLabel, Discriminator, Entity, EntityKind, Member, Scope, StructDef, TypeSpec, UnionCase, UnionDef,
};
use ddsfuzz::types::{Extensibility, PrimitiveType};
use pretty_assertions::assert_eq;

const DECLARATIONS: [&str; 5] = ["  struct ", "  union ", "  enum ", "  bitmask ", "  typedef "];

fn run_seed(seed: u64, dir: &Path, config: Config) -> corpus::RunReport {
    let options = RunOptions::new(seed, dir, config);
    match corpus::run(&options, &IdlCompiler::new()) {
        Ok(report) => report,
        Err(e) => panic!("run for seed {seed:#x} failed: {e}"),
    }
}

/// Descriptor references listed in a manifest.
fn manifest_references(manifest: &str) -> Vec<String> {
    let start = manifest.find("[] = {\n").expect("descriptor array") + "[] = {\n".len();
    let end = manifest[start..].find("};").expect("array end") + start;
    manifest[start..end]
        .split(',')
        .map(|r| r.trim().to_string())
        .collect()
}

// ============================================================
// Scenario A: a single run
// ============================================================

#[test]
fn test_single_run_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::default();
    let entity_count = config.generator.entity_count;
    let report = run_seed(0x1, dir.path(), config);

    let schema = fs::read_to_string(dir.path().join("fuzz_sample.idl")).unwrap();
    assert!(!schema.is_empty());
    assert_eq!(schema.matches("module ").count(), 1);
    assert!(schema.starts_with("module fuzz {\n"));
    let declarations = schema
        .lines()
        .filter(|line| DECLARATIONS.iter().any(|d| line.starts_with(d)))
        .count();
    assert_eq!(declarations, entity_count);

    let manifest = fs::read_to_string(dir.path().join("fuzz_samples.h")).unwrap();
    assert!(manifest.contains("#define FUZZ_SAMPLE_SEED \"1\""));
    assert!(!manifest.contains(",\n};"));
    let references = manifest_references(&manifest);
    assert!(!references.is_empty());
    assert!(references.iter().all(|r| !r.is_empty()));

    let expected: Vec<String> = report.top_level.iter().map(|n| format!("&fuzz_{n}_desc")).collect();
    assert_eq!(references, expected);

    assert_eq!(report.corpus_files.len(), report.top_level.len());
    for (name, path) in report.top_level.iter().zip(&report.corpus_files) {
        assert_eq!(path, &dir.path().join("corpus").join(format!("seed_{name}")));
        let bytes = fs::read(path).unwrap();
        assert!(bytes.len() > 4, "{} is too short", path.display());
        assert_eq!(bytes.len() % 4, 0);
    }
}

#[test]
fn test_manifest_corpus_parity() {
    for seed in [0x2, 0x3f, 0xdead_beef, u64::MAX] {
        let dir = tempfile::tempdir().unwrap();
        let report = run_seed(seed, dir.path(), Config::default());

        let manifest = fs::read_to_string(&report.manifest_path).unwrap();
        let references = manifest_references(&manifest);
        let files = fs::read_dir(dir.path().join("corpus")).unwrap().count();
        assert_eq!(references.len(), report.top_level.len(), "seed {seed:#x}");
        assert_eq!(files, report.top_level.len(), "seed {seed:#x}");
    }
}

// ============================================================
// Scenario B: determinism
// ============================================================

#[test]
fn test_same_seed_same_files() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = run_seed(0x5eed, first.path(), Config::default());
    let b = run_seed(0x5eed, second.path(), Config::default());

    assert_eq!(
        fs::read(&a.schema_path).unwrap(),
        fs::read(&b.schema_path).unwrap()
    );
    assert_eq!(
        fs::read(&a.manifest_path).unwrap(),
        fs::read(&b.manifest_path).unwrap()
    );
    assert_eq!(a.top_level, b.top_level);
    for (x, y) in a.corpus_files.iter().zip(&b.corpus_files) {
        assert_eq!(fs::read(x).unwrap(), fs::read(y).unwrap(), "{}", x.display());
    }
}

#[test]
fn test_different_seeds_differ() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let a = run_seed(0x10, first.path(), Config::default());
    let b = run_seed(0x11, second.path(), Config::default());
    assert_ne!(
        fs::read(&a.schema_path).unwrap(),
        fs::read(&b.schema_path).unwrap()
    );
}

// ============================================================
// Many seeds
// ============================================================

#[test]
fn test_many_seeds_compile_and_verify() {
    for seed in 0..48u64 {
        let dir = tempfile::tempdir().unwrap();
        let report = run_seed(seed, dir.path(), Config::default());
        assert!(!report.top_level.is_empty(), "seed {seed:#x}");
    }
}

#[test]
fn test_big_endian_headers() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.output.byte_order = ByteOrder::Big;
    let report = run_seed(0x7, dir.path(), config);
    for path in &report.corpus_files {
        let bytes = fs::read(path).unwrap();
        let id = u16::from_be_bytes([bytes[0], bytes[1]]);
        assert!(id == cdr::CDR2_BE || id == cdr::D_CDR2_BE, "{id:#06x}");
    }
}

#[test]
fn test_config_controls_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.generator.module_name = "zqx".into();
    config.generator.entity_count = 3;
    config.output.corpus_dir = "seeds".into();
    let report = run_seed(0x42, dir.path(), config);

    let schema = fs::read_to_string(&report.schema_path).unwrap();
    assert!(schema.starts_with("module zqx {\n"));
    let declarations = schema
        .lines()
        .filter(|line| DECLARATIONS.iter().any(|d| line.starts_with(d)))
        .count();
    assert_eq!(declarations, 3);
    assert_eq!(
        fs::read_dir(dir.path().join("seeds")).unwrap().count(),
        report.top_level.len()
    );
    let manifest = fs::read_to_string(&report.manifest_path).unwrap();
    assert!(manifest_references(&manifest).iter().all(|r| r.starts_with("&zqx_")));
}

// ============================================================
// Failures
// ============================================================

struct RejectingCompiler;

impl SchemaCompiler for RejectingCompiler {
    fn compile(&self, _text: &str, _module_name: &str) -> Result<Compilation, CompileError> {
        Err(CompileError::External {
            status: "exit status: 1".into(),
            stderr: "syntax error".into(),
        })
    }
}

#[test]
fn test_compile_failure_stops_before_corpus() {
    let dir = tempfile::tempdir().unwrap();
    let options = RunOptions::new(0x1, dir.path(), Config::default());
    let err = corpus::run(&options, &RejectingCompiler).unwrap_err();
    assert!(matches!(err, CorpusError::Compilation(CompileError::External { .. })));

    assert!(dir.path().join("fuzz_sample.idl").exists());
    assert!(dir.path().join("fuzz_samples.h").exists());
    assert!(!dir.path().join("corpus").exists());
}

#[test]
fn test_missing_output_directory() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    let options = RunOptions::new(0x1, &missing, Config::default());
    let err = corpus::run(&options, &IdlCompiler::new()).unwrap_err();
    assert!(matches!(err, CorpusError::MissingDirectory(_)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

// ============================================================
// Scenario C: union with a bounded sequence member
// ============================================================

fn union_scope() -> Scope {
    let raw = Member::new(
        "raw",
        TypeSpec::Sequence {
            element: Box::new(TypeSpec::Primitive(PrimitiveType::Octet)),
            bound: Some(3),
        },
    );
    Scope {
        module: "fuzz".into(),
        entities: vec![
            Entity {
                name: "Choice".into(),
                kind: EntityKind::Union(UnionDef {
                    discriminator: Discriminator::Primitive(PrimitiveType::Long),
                    cases: vec![
                        UnionCase {
                            labels: vec![CaseLabel::Value(1)],
                            member: raw,
                        },
                        UnionCase {
                            labels: vec![CaseLabel::Value(2)],
                            member: Member::new("num", TypeSpec::Primitive(PrimitiveType::Long)),
                        },
                    ],
                }),
                top_level: None,
                weight: 4,
            },
            Entity {
                name: "Holder".into(),
                kind: EntityKind::Struct(StructDef {
                    members: vec![Member::new("pick", TypeSpec::Named("Choice".into()))],
                }),
                top_level: Some(Extensibility::Final),
                weight: 4,
            },
        ],
    }
}

#[test]
fn test_union_with_bounded_sequence() {
    let text = emit::render(&union_scope());
    let compilation = IdlCompiler::new().compile(&text, "fuzz").unwrap();
    let module = &compilation.module;

    let mut seen = [false; 2];
    for seed in 0..200 {
        let instance = instance::generate(module, "Holder", seed, &InstanceOptions::default()).unwrap();
        let bytes = cdr::encode(module, &instance, ByteOrder::Little).unwrap();
        let discriminator = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
        match discriminator {
            1 => {
                let count = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
                assert!(count <= 3, "seed {seed}: sequence length {count}");
                // only the selected branch follows the discriminator
                assert_eq!(bytes.len(), 4 + (8 + count).next_multiple_of(4));
                seen[0] = true;
            }
            2 => {
                assert_eq!(bytes.len(), 12);
                seen[1] = true;
            }
            other => panic!("seed {seed}: unexpected discriminator {other}"),
        }
        assert_eq!(cdr::decode(module, "Holder", &bytes).unwrap(), instance.value);
    }
    assert_eq!(seen, [true, true]);
}
