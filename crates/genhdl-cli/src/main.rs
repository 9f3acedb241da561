//! Thin filesystem/CLI plumbing around `genhdl` — the decorator-driven API,
//! filesystem I/O, and CLI plumbing sit outside the core compiler's scope.
//! Reads one entry procedure `.py` file plus any `--helper` files into
//! a `Namespace`, builds a `Context`, and writes the emitted module (and,
//! when argument tuples are supplied, a self-driving testbench) next to the
//! input.
//!
//! Plain `std::env::args`, no `clap`, `eprintln!` + `ExitCode::FAILURE` on
//! error, no logging framework — intentionally thin CLI plumbing.

use std::{env, ffi::OsStr, fs, path::Path, process::ExitCode};

use genhdl::{
    CodegenConfig, CompileError, Context, InputTuple, TestbenchConfig, build_namespace, parse_procedure,
};

struct Args {
    entry_path: String,
    helper_paths: Vec<String>,
    optimization_level: usize,
    is_system_verilog: bool,
    dump_cfg: bool,
    random_ready: bool,
    inputs: Vec<InputTuple>,
}

fn main() -> ExitCode {
    let raw: Vec<String> = env::args().skip(1).collect();
    let args = match parse_args(&raw) {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err}");
            eprintln!("{}", usage());
            return ExitCode::FAILURE;
        }
    };

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn usage() -> &'static str {
    "usage: genhdl <entry.py> [--helper <path.py>]... [-O <level>] [--sv] \
     [--random-ready] [--dump-cfg] [--input 1,2,3]..."
}

fn parse_args(raw: &[String]) -> Result<Args, String> {
    let mut entry_path = None;
    let mut helper_paths = Vec::new();
    let mut optimization_level = 0usize;
    let mut is_system_verilog = false;
    let mut dump_cfg = false;
    let mut random_ready = false;
    let mut inputs = Vec::new();

    let mut iter = raw.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--helper" => {
                let path = iter.next().ok_or("--helper requires a path argument")?;
                helper_paths.push(path.clone());
            }
            "-O" | "--opt" => {
                let level = iter.next().ok_or("-O requires a numeric argument")?;
                optimization_level = level.parse().map_err(|_| format!("invalid optimization level '{level}'"))?;
            }
            "--sv" => is_system_verilog = true,
            "--dump-cfg" => dump_cfg = true,
            "--random-ready" => random_ready = true,
            "--input" => {
                let tuple = iter.next().ok_or("--input requires a comma-separated tuple argument")?;
                inputs.push(parse_input_tuple(tuple)?);
            }
            other if entry_path.is_none() => entry_path = Some(other.to_owned()),
            other => return Err(format!("unrecognized argument '{other}'")),
        }
    }

    let entry_path = entry_path.ok_or("no entry procedure file given")?;
    Ok(Args {
        entry_path,
        helper_paths,
        optimization_level,
        is_system_verilog,
        dump_cfg,
        random_ready,
        inputs,
    })
}

fn parse_input_tuple(s: &str) -> Result<InputTuple, String> {
    s.split(',')
        .map(|part| part.trim().parse::<i64>().map_err(|_| format!("invalid integer '{part}' in --input tuple")))
        .collect()
}

fn run(args: &Args) -> Result<(), String> {
    let entry_name = procedure_name(&args.entry_path)?;
    let entry_source = read_file(&args.entry_path)?;
    let mut parsed = vec![parse_procedure(&entry_name, &entry_source).map_err(describe)?];

    for helper_path in &args.helper_paths {
        let name = procedure_name(helper_path)?;
        let source = read_file(helper_path)?;
        parsed.push(parse_procedure(&name, &source).map_err(describe)?);
    }

    let namespace = build_namespace(parsed, &entry_name).map_err(describe)?;
    let codegen = CodegenConfig {
        optimization_level: args.optimization_level,
        is_system_verilog: args.is_system_verilog,
        dump_cfg: args.dump_cfg,
    };
    let context = Context::new(namespace, codegen).map_err(describe)?;

    let stem = Path::new(&args.entry_path).with_extension("");
    let stem = stem.to_string_lossy();

    if args.inputs.is_empty() {
        let (module, dump) = context.compile_with_dump().map_err(describe)?;
        write_file(&format!("{stem}.v"), &module)?;
        if let Some(dump) = dump {
            write_file(&format!("{stem}.cfg.json"), &dump.to_json().to_string())?;
        }
    } else {
        let tb_config = TestbenchConfig { random_ready: args.random_ready, ..TestbenchConfig::default() };
        let (module, testbench) = context.compile_with_testbench(&tb_config, &args.inputs).map_err(describe)?;
        write_file(&format!("{stem}.v"), &module)?;
        write_file(&format!("{stem}_tb.v"), &testbench)?;
        if args.dump_cfg {
            let (_module, dump) = context.compile_with_dump().map_err(describe)?;
            if let Some(dump) = dump {
                write_file(&format!("{stem}.cfg.json"), &dump.to_json().to_string())?;
            }
        }
    }

    Ok(())
}

fn describe(err: CompileError) -> String {
    format!("[{}] {err}", err.kind())
}

/// A procedure's name is its source file's stem — there's no `def` name
/// override at the CLI layer, so the file system is the single source of
/// truth for how each co-compiled procedure is addressed.
fn procedure_name(path: &str) -> Result<String, String> {
    Path::new(path)
        .file_stem()
        .and_then(OsStr::to_str)
        .map(str::to_owned)
        .ok_or_else(|| format!("cannot derive a procedure name from path '{path}'"))
}

fn read_file(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("reading '{path}': {err}"))
}

fn write_file(path: &str, contents: &str) -> Result<(), String> {
    fs::write(path, contents).map_err(|err| format!("writing '{path}': {err}"))?;
    eprintln!("wrote {path}");
    Ok(())
}
