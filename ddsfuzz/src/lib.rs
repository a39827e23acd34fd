//! ddsfuzz: seeded generator of random IDL schemas and XCDR2 seed corpora.
//!
//! A single run turns one seed into:
//!
//! 1. a random, acyclic set of IDL type definitions ([`scope`]),
//! 2. the IDL source text for it ([`emit`]),
//! 3. a compiled descriptor table ([`compiler`], [`descriptor`]),
//! 4. one random value per top-level type ([`instance`]),
//! 5. the XCDR2 encoding of each value ([`cdr`]),
//!
//! and writes the schema, a C manifest and one corpus file per top-level
//! type ([`corpus`]).
//!
//! ```text
//! seed ─► scope ─► emit ─► compiler ─► instance ─► cdr ─► corpus files
//!           ▲                              ▲
//!           └──────── rng::DrawStream ─────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use ddsfuzz::compiler::IdlCompiler;
//! use ddsfuzz::config::Config;
//! use ddsfuzz::corpus::{self, RunOptions};
//!
//! let options = RunOptions::new(0x1, "out", Config::default());
//! let report = corpus::run(&options, &IdlCompiler::new())?;
//! println!("wrote {} corpus files", report.corpus_files.len());
//! # Ok::<(), ddsfuzz::corpus::CorpusError>(())
//! ```

pub mod cdr;
pub mod compiler;
pub mod config;
pub mod corpus;
pub mod descriptor;
pub mod diagnostics;
pub mod emit;
pub mod idl;
pub mod instance;
pub mod rng;
pub mod scope;
pub mod types;
pub mod value;

pub use compiler::{Compilation, CompileError, IdlCompiler, SchemaCompiler};
pub use config::Config;
pub use descriptor::CompiledModule;
pub use rng::DrawStream;
pub use scope::Scope;
pub use value::{Instance, Value};
