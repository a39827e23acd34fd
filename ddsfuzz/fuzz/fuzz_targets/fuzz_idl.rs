//! Feeds arbitrary text to the IDL front end; it must never panic.

#![no_main]

use libfuzzer_sys::fuzz_target;

use ddsfuzz::idl::compile_source;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = std::str::from_utf8(data) {
        let _ = compile_source(source, None);
    }
});
