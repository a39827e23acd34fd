//! Schema compiler adapter.
//!
//! [`SchemaCompiler`] is the seam between the orchestrator and whatever
//! turns IDL text into descriptors. [`IdlCompiler`] writes the text into a
//! private temporary directory, optionally runs an external IDL compiler on
//! it (so the schema is also checked by the real toolchain), and then builds
//! the [`CompiledModule`] with the in-process front end.
//!
//! # Example
//!
//! ```
//! use ddsfuzz::compiler::{IdlCompiler, SchemaCompiler};
//!
//! let text = "module fuzz { @topic @final struct Abc { long xyz; }; };\n";
//! let compilation = IdlCompiler::new().compile(text, "fuzz").unwrap();
//! assert_eq!(compilation.module.topic_types().collect::<Vec<_>>(), vec!["Abc"]);
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info};

use crate::descriptor::CompiledModule;
use crate::diagnostics;
use crate::idl;

/// Errors that can occur while compiling a schema.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to run schema compiler `{program}`: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("schema compiler exited with {status}: {stderr}")]
    External { status: String, stderr: String },

    #[error("schema rejected with {count} error(s):\n{rendered}")]
    Diagnostics { count: usize, rendered: String },
}

/// Result of a successful compilation.
///
/// Owns the temporary working directory; it is removed when the
/// compilation is dropped.
#[derive(Debug)]
pub struct Compilation {
    pub module: CompiledModule,
    workdir: TempDir,
    source_path: PathBuf,
}

impl Compilation {
    /// Temporary working directory.
    pub fn workdir(&self) -> &Path {
        self.workdir.path()
    }

    /// Schema file inside the working directory.
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }
}

/// Compiles IDL text into a descriptor table.
pub trait SchemaCompiler {
    fn compile(&self, text: &str, module_name: &str) -> Result<Compilation, CompileError>;
}

/// An external IDL compiler invoked as `program args... <file.idl>`.
#[derive(Debug, Clone)]
pub struct ExternalCompiler {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl ExternalCompiler {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Adds an argument placed before the schema file.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn run(&self, source_path: &Path, workdir: &Path) -> Result<(), CompileError> {
        let program = self.program.display().to_string();
        debug!(program = %program, file = %source_path.display(), "running external schema compiler");

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(source_path)
            .current_dir(workdir)
            .output()
            .map_err(|source| CompileError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CompileError::External {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Default [`SchemaCompiler`].
#[derive(Debug, Clone, Default)]
pub struct IdlCompiler {
    external: Option<ExternalCompiler>,
}

impl IdlCompiler {
    /// In-process compilation only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also runs `external` on the schema file before the in-process pass.
    pub fn with_external(mut self, external: ExternalCompiler) -> Self {
        self.external = Some(external);
        self
    }
}

impl SchemaCompiler for IdlCompiler {
    fn compile(&self, text: &str, module_name: &str) -> Result<Compilation, CompileError> {
        let workdir = tempfile::Builder::new().prefix("ddsfuzz-").tempdir()?;
        let source_path = workdir.path().join(format!("{module_name}.idl"));
        fs::write(&source_path, text)?;

        if let Some(external) = &self.external {
            external.run(&source_path, workdir.path())?;
        }

        let file_name = source_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{module_name}.idl"));
        let module = compile_in_process(text, module_name, &file_name)?;
        info!(module = module.name(), types = module.len(), "compiled schema");

        Ok(Compilation {
            module,
            workdir,
            source_path,
        })
    }
}

/// Runs the in-process front end, rendering any diagnostics against `text`.
pub fn compile_in_process(text: &str, module_name: &str, file_name: &str) -> Result<CompiledModule, CompileError> {
    idl::compile_source(text, Some(module_name)).map_err(|errors| CompileError::Diagnostics {
        count: errors.len(),
        rendered: diagnostics::render(&errors, file_name, text),
    })
}
