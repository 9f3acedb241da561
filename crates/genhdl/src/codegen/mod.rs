//! HDL code generation: the synthesizable module emitter,
//! the self-checking testbench emitter, the diagnostic CFG dump, and the
//! small indentation-tracking `Writer` they all build on.

pub mod cfg_dump;
pub mod module;
pub mod testbench;
mod writer;
