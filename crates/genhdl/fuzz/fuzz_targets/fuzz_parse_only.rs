//! Fuzz target: parse arbitrary Python source as a single procedure body.
//!
//! Exercises only the frontend parser — no CFG building, no
//! lowering, no codegen. A crash here indicates a bug in the `ruff_python_ast`
//! walk or its rejection logic; these should never panic regardless of
//! input, only return a structured `CompileError`.

#![no_main]

use libfuzzer_sys::fuzz_target;

use genhdl::parse_procedure;

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    // Skip excessively large inputs.
    if source.len() > 8192 {
        return;
    }

    let _ = parse_procedure("fuzz_target", source);
});
