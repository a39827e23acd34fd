//! Feeds arbitrary bytes to the reference decoder.
//!
//! The schema is generated from a small seed so the fuzzer explores a fixed
//! set of type universes; decoding must reject bad input without panicking.

#![no_main]

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use ddsfuzz::cdr;
use ddsfuzz::config::GeneratorConfig;
use ddsfuzz::descriptor::CompiledModule;
use ddsfuzz::emit;
use ddsfuzz::idl::compile_source;
use ddsfuzz::scope;

#[derive(Debug, Arbitrary)]
struct DecodeInput {
    seed: u8,
    type_index: u8,
    data: Vec<u8>,
}

fn schemas() -> &'static Mutex<HashMap<u8, Option<CompiledModule>>> {
    static SCHEMAS: OnceLock<Mutex<HashMap<u8, Option<CompiledModule>>>> = OnceLock::new();
    SCHEMAS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn compile(seed: u8) -> Option<CompiledModule> {
    let config = GeneratorConfig::default();
    let scope = scope::generate(&config.module_name, config.entity_count, seed as u64, &config).ok()?;
    compile_source(&emit::render(&scope), Some(&scope.module)).ok()
}

fuzz_target!(|input: DecodeInput| {
    let Ok(mut cache) = schemas().lock() else { return };
    let Some(module) = cache.entry(input.seed).or_insert_with(|| compile(input.seed)) else {
        return;
    };
    let names: Vec<String> = module.iter().map(|(_, name, _)| name.to_string()).collect();
    if names.is_empty() {
        return;
    }
    let name = &names[input.type_index as usize % names.len()];
    let _ = cdr::decode(module, name, &input.data);
});
