//! Fuzz target: parse and compile arbitrary Python source through the full
//! pipeline — CFG building, optimization, state-machine lowering, and HDL
//! codegen.
//!
//! Parse failures are expected and not bugs; a panic anywhere past a
//! successful parse (an internal-invariant break reaching an `unwrap`/index
//! instead of a `CompileError::InternalInvariant`) is the finding this
//! target exists to catch.

#![no_main]

use libfuzzer_sys::fuzz_target;

use genhdl::{CodegenConfig, Context, build_namespace, parse_procedure};

fuzz_target!(|data: &[u8]| {
    let Ok(source) = std::str::from_utf8(data) else {
        return;
    };

    if source.len() > 4096 {
        return;
    }

    let Ok(parsed) = parse_procedure("fuzz_target", source) else {
        return;
    };
    let Ok(namespace) = build_namespace(vec![parsed], "fuzz_target") else {
        return;
    };

    for optimization_level in [0, 1, 3] {
        let config = CodegenConfig {
            optimization_level,
            ..CodegenConfig::default()
        };
        if let Ok(context) = Context::new(namespace.clone(), config) {
            let _ = context.compile();
        }
    }
});
