//! # IDL front end
//!
//! Turns IDL source text into a [`CompiledModule`]. It accepts the subset
//! of IDL 4.2 the generator produces (and a little more: multiple
//! declarators, scoped names, `intN`/`uintN` spellings, comments and
//! preprocessor lines), and rejects anything it cannot represent faithfully.
//!
//! ## Module Structure
//!
//! - [`lexer`] - tokens (logos)
//! - [`ast`] - syntax tree
//! - [`parser`] - recursive descent with per-definition error recovery
//! - [`resolve`] - declaration-order name resolution and semantic checks

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod resolve;

use tracing::debug;

use crate::descriptor::CompiledModule;
use crate::diagnostics::Diagnostic;

/// Lexes, parses and resolves `source`.
pub fn compile_source(source: &str, expected_module: Option<&str>) -> Result<CompiledModule, Vec<Diagnostic>> {
    let spec = parser::parse(source)?;
    let module = resolve::resolve(&spec, expected_module)?;
    debug!(module = module.name(), types = module.len(), "resolved IDL module");
    Ok(module)
}
