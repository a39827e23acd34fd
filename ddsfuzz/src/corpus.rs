//! Corpus orchestrator.
//!
//! One [`run`] turns a seed into the schema file, the C manifest listing the
//! top-level types, and one encoded sample per top-level type. Steps run
//! strictly in order and stop at the first error; files already written
//! stay on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::cdr::{self, EncodeError};
use crate::compiler::{CompileError, SchemaCompiler};
use crate::config::Config;
use crate::descriptor::CompiledModule;
use crate::emit;
use crate::instance::{self, InstanceError};
use crate::scope::{self, GenerateError, Scope};
use crate::value::Value;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("output directory {} does not exist", .0.display())]
    MissingDirectory(PathBuf),

    #[error("schema generation failed: {0}")]
    Generate(#[from] GenerateError),

    #[error("schema compilation failed: {0}")]
    Compilation(#[from] CompileError),

    #[error("failed to generate an instance of `{type_name}`: {source}")]
    Instance { type_name: String, source: InstanceError },

    #[error("failed to encode `{type_name}`: {source}")]
    Encode { type_name: String, source: EncodeError },

    #[error("encoded `{type_name}` does not decode to the generated instance: {detail}")]
    EncodingMismatch { type_name: String, detail: String },

    #[error("failed to write {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub seed: u64,
    pub output_dir: PathBuf,
    pub config: Config,
}

impl RunOptions {
    pub fn new(seed: u64, output_dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            seed,
            output_dir: output_dir.into(),
            config,
        }
    }
}

/// What a successful run wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub schema_path: PathBuf,
    pub manifest_path: PathBuf,
    /// Top-level type names, in scope order.
    pub top_level: Vec<String>,
    /// One file per entry of `top_level`, same order.
    pub corpus_files: Vec<PathBuf>,
}

/// Runs the whole pipeline for one seed.
pub fn run(options: &RunOptions, compiler: &dyn SchemaCompiler) -> Result<RunReport, CorpusError> {
    let out = &options.output_dir;
    if !out.is_dir() {
        return Err(CorpusError::MissingDirectory(out.clone()));
    }
    let config = &options.config;
    let generator = &config.generator;
    let output = &config.output;

    info!(seed = %seed_text(options.seed), dir = %out.display(), "starting run");
    let scope = scope::generate(&generator.module_name, generator.entity_count, options.seed, generator)?;
    let top_level: Vec<String> = scope.top_level().map(|e| e.name.clone()).collect();

    let text = emit::render(&scope);
    let schema_path = out.join(&output.idl_file);
    write_file(&schema_path, text.as_bytes())?;

    let manifest_path = out.join(&output.manifest_file);
    let manifest = render_manifest(&scope, options.seed, &header_name(&output.idl_file));
    write_file(&manifest_path, manifest.as_bytes())?;
    info!(types = scope.entities.len(), top_level = top_level.len(), "wrote schema and manifest");

    let compilation = compiler.compile(&text, &scope.module)?;
    let module = &compilation.module;

    let corpus_dir = out.join(&output.corpus_dir);
    fs::create_dir_all(&corpus_dir).map_err(|source| CorpusError::Io {
        path: corpus_dir.clone(),
        source,
    })?;

    let instance_options = config.instance_options();
    let mut corpus_files = Vec::with_capacity(top_level.len());
    for name in &top_level {
        let instance =
            instance::generate(module, name, options.seed, &instance_options).map_err(|source| CorpusError::Instance {
                type_name: name.clone(),
                source,
            })?;
        let bytes = cdr::encode(module, &instance, output.byte_order).map_err(|source| CorpusError::Encode {
            type_name: name.clone(),
            source,
        })?;

        if output.verify_roundtrip {
            verify_roundtrip(module, name, &instance.value, &bytes)?;
        }

        let path = corpus_dir.join(corpus_file_name(name));
        write_file(&path, &bytes)?;
        debug!(type_name = %name, bytes = bytes.len(), path = %path.display(), "wrote corpus file");
        corpus_files.push(path);
    }

    info!(files = corpus_files.len(), "run complete");
    Ok(RunReport {
        schema_path,
        manifest_path,
        top_level,
        corpus_files,
    })
}

/// Decodes `bytes` as `type_name` and compares the result with `expected`.
fn verify_roundtrip(module: &CompiledModule, type_name: &str, expected: &Value, bytes: &[u8]) -> Result<(), CorpusError> {
    let detail = match cdr::decode(module, type_name, bytes) {
        Ok(decoded) if decoded == *expected => return Ok(()),
        Ok(decoded) => format!("expected {expected}, decoded {decoded}"),
        Err(e) => e.to_string(),
    };
    Err(CorpusError::EncodingMismatch {
        type_name: type_name.to_string(),
        detail,
    })
}

/// Seed as it appears in the manifest: lowercase hex, no prefix.
pub fn seed_text(seed: u64) -> String {
    format!("{seed:x}")
}

/// Parses a hex seed with an optional `0x`/`0X` prefix.
pub fn parse_seed(text: &str) -> Result<u64, String> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.is_empty() {
        return Err(format!("`{text}` is not a hex seed"));
    }
    u64::from_str_radix(digits, 16).map_err(|e| format!("`{text}` is not a hex seed: {e}"))
}

/// Corpus file name for a top-level type.
pub fn corpus_file_name(type_name: &str) -> String {
    format!("seed_{type_name}")
}

/// C header generated from the schema file by the IDL compiler.
fn header_name(idl_file: &str) -> String {
    let stem = Path::new(idl_file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| idl_file.to_string());
    format!("{stem}.h")
}

/// Renders the C manifest: the seed and one topic descriptor per top-level
/// type, in scope order.
pub fn render_manifest(scope: &Scope, seed: u64, header: &str) -> String {
    let references: Vec<String> = scope
        .top_level()
        .map(|e| format!("  &{}_{}_desc", scope.module, e.name))
        .collect();

    let mut out = String::new();
    out.push_str("/* Generated by ddsfuzz. Do not edit. */\n");
    out.push_str("#ifndef FUZZ_SAMPLES_H\n#define FUZZ_SAMPLES_H\n\n");
    out.push_str(&format!("#include \"{header}\"\n\n"));
    out.push_str(&format!("#define FUZZ_SAMPLE_SEED \"{}\"\n\n", seed_text(seed)));
    out.push_str("static const dds_topic_descriptor_t *fuzz_sample_descriptors[] = {\n");
    out.push_str(&references.join(",\n"));
    out.push_str("\n};\n\n#endif /* FUZZ_SAMPLES_H */\n");
    out
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), CorpusError> {
    fs::write(path, contents).map_err(|source| CorpusError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::{Entity, EntityKind, Member, StructDef, TypeSpec};
    use crate::types::{Extensibility, PrimitiveType};
    use pretty_assertions::assert_eq;

    fn entity(name: &str, top_level: Option<Extensibility>) -> Entity {
        Entity {
            name: name.to_string(),
            kind: EntityKind::Struct(StructDef {
                members: vec![Member::new("xyz", TypeSpec::Primitive(PrimitiveType::Long))],
            }),
            top_level,
            weight: 1,
        }
    }

    #[test]
    fn test_manifest_has_no_trailing_comma() {
        let scope = Scope {
            module: "fuzz".into(),
            entities: vec![
                entity("Abc", Some(Extensibility::Final)),
                entity("Def", None),
                entity("Ghi", Some(Extensibility::Appendable)),
            ],
        };
        let manifest = render_manifest(&scope, 0x1, "fuzz_sample.h");
        assert_eq!(
            manifest,
            "/* Generated by ddsfuzz. Do not edit. */\n\
             #ifndef FUZZ_SAMPLES_H\n\
             #define FUZZ_SAMPLES_H\n\
             \n\
             #include \"fuzz_sample.h\"\n\
             \n\
             #define FUZZ_SAMPLE_SEED \"1\"\n\
             \n\
             static const dds_topic_descriptor_t *fuzz_sample_descriptors[] = {\n  \
             &fuzz_Abc_desc,\n  \
             &fuzz_Ghi_desc\n\
             };\n\
             \n\
             #endif /* FUZZ_SAMPLES_H */\n"
        );
    }

    #[test]
    fn test_parse_seed() {
        assert_eq!(parse_seed("0x1"), Ok(1));
        assert_eq!(parse_seed("DeadBeef"), Ok(0xdead_beef));
        assert_eq!(parse_seed("0XfF"), Ok(0xff));
        assert!(parse_seed("0x").is_err());
        assert!(parse_seed("xyz").is_err());
        assert!(parse_seed("1ffffffffffffffff").is_err());
        assert_eq!(seed_text(0xABC), "abc");
    }

    #[test]
    fn test_header_name() {
        assert_eq!(header_name("fuzz_sample.idl"), "fuzz_sample.h");
        assert_eq!(header_name("schema"), "schema.h");
    }

    #[test]
    fn test_missing_directory_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let options = RunOptions::new(1, &missing, Config::default());
        let err = run(&options, &crate::compiler::IdlCompiler::new()).unwrap_err();
        assert!(matches!(err, CorpusError::MissingDirectory(_)));
        assert!(!missing.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_roundtrip_mismatch_names_both_values() {
        let module = crate::idl::compile_source("module fuzz { struct Pair { long a; string b; }; };", Some("fuzz")).unwrap();
        let pair = |a: i32| Value::Struct(vec![Some(Value::Int32(a)), Some(Value::String("x".into()))]);
        let instance = module.construct("Pair", pair(1)).unwrap();
        let bytes = cdr::encode(&module, &instance, cdr::ByteOrder::Little).unwrap();

        assert!(verify_roundtrip(&module, "Pair", &pair(1), &bytes).is_ok());

        let err = verify_roundtrip(&module, "Pair", &pair(2), &bytes).unwrap_err();
        match err {
            CorpusError::EncodingMismatch { type_name, detail } => {
                assert_eq!(type_name, "Pair");
                assert_eq!(detail, r#"expected {2, "x"}, decoded {1, "x"}"#);
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = verify_roundtrip(&module, "Pair", &pair(1), &bytes[..6]).unwrap_err();
        assert!(matches!(err, CorpusError::EncodingMismatch { .. }));
    }
}
