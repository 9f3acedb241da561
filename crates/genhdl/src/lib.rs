#![doc = include_str!("../../../README.md")]
#![expect(clippy::cast_possible_truncation, reason = "bit widths are checked against a 32-bit invariant before narrowing")]

pub mod cfg;
pub mod codegen;
pub mod context;
pub mod error;
pub mod expr;
pub mod ir;
pub mod lower;
pub mod namespace;
pub mod optimize;
pub mod parse;
pub mod pos;

pub use crate::{
    codegen::cfg_dump::CfgDump,
    context::{CodegenConfig, Context, InputTuple, TestbenchConfig},
    error::{CompileError, Result},
    namespace::{Namespace, Parameter, Procedure, Variable, build_namespace},
    parse::parse_procedure,
};
