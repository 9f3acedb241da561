//! The data model: `Procedure`, `Namespace`, `Variable`.
//!
//! A name-keyed, insertion-ordered scope, one entry point, in the shape of
//! `python2verilog/api/context.py`'s `context.namespace.values()` /
//! `is_generator` checks, which this module turns into `NamespaceViolation`
//! errors rather than Python assertions.

use indexmap::IndexMap;

use crate::{
    cfg::{self, Cfg},
    error::CompileError,
    ir::ParsedProcedure,
};

/// At most this many procedures may share a namespace.
pub const MAX_PROCEDURES: usize = 4;

/// A named storage location.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Variable {
    /// Name as written in the source procedure.
    pub source_name: String,
    /// Name as emitted in the HDL register declaration.
    pub hdl_name: String,
    /// Bit width, default 32.
    pub width: u32,
    /// Signedness, default true.
    pub is_signed: bool,
    /// Initial value, default 0.
    pub initial_value: i64,
}

impl Variable {
    pub fn new(source_name: impl Into<String>) -> Self {
        let source_name = source_name.into();
        let hdl_name = format!("_{source_name}");
        Self {
            source_name,
            hdl_name,
            width: 32,
            is_signed: true,
            initial_value: 0,
        }
    }
}

/// An input parameter of a procedure: name plus signed 32-bit width.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Parameter {
    pub name: String,
    pub width: u32,
}

impl Parameter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: 32,
        }
    }
}

/// A named, co-compiled unit.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<Parameter>,
    /// Width of the tuple yielded by this procedure; `0` for a procedure
    /// that never yields (a tail-call-only value helper).
    pub output_arity: usize,
    pub is_generator: bool,
    pub cfg: Cfg,
    /// Every register this procedure's body needs: one per declared
    /// parameter plus one per locally-assigned name, in first-appearance
    /// order (all mentioned variables are declared before use; the
    /// compiler inserts declarations automatically).
    pub vars: Vec<Variable>,
}

impl Procedure {
    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

/// A mapping from procedure name to `Procedure`, keys unique, with exactly
/// one entry point and a cap of four procedures.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Namespace {
    /// Insertion-ordered so HDL emission order matches source declaration
    /// order deterministically, hence `IndexMap` rather than a plain
    /// `HashMap`.
    procedures: IndexMap<String, Procedure>,
    entry: String,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a procedure. The first one inserted becomes the entry point
    /// unless `set_entry` is called afterward.
    pub fn insert(&mut self, procedure: Procedure) -> Result<(), CompileError> {
        if self.procedures.len() >= MAX_PROCEDURES {
            return Err(CompileError::namespace_violation(format!(
                "namespace already holds the maximum of {MAX_PROCEDURES} procedures"
            )));
        }
        if self.procedures.contains_key(&procedure.name) {
            return Err(CompileError::namespace_violation(format!(
                "duplicate procedure name '{}'",
                procedure.name
            )));
        }
        if self.procedures.is_empty() {
            self.entry = procedure.name.clone();
        }
        self.procedures.insert(procedure.name.clone(), procedure);
        Ok(())
    }

    pub fn set_entry(&mut self, name: impl Into<String>) -> Result<(), CompileError> {
        let name = name.into();
        if !self.procedures.contains_key(&name) {
            return Err(CompileError::namespace_violation(format!(
                "entry procedure '{name}' is not in the namespace"
            )));
        }
        self.entry = name;
        Ok(())
    }

    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    pub fn entry(&self) -> &Procedure {
        &self.procedures[&self.entry]
    }

    pub fn get(&self, name: &str) -> Option<&Procedure> {
        self.procedures.get(name)
    }

    pub fn procedures(&self) -> impl Iterator<Item = &Procedure> {
        self.procedures.values()
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }

    /// Validates the namespace-level invariants: at most
    /// one generator procedure, a known entry point, non-empty. Mirrors
    /// `api/context.py`'s `assert len(generators) <= 1` check.
    pub fn validate(&self) -> Result<(), CompileError> {
        if self.procedures.is_empty() {
            return Err(CompileError::namespace_violation("namespace has no procedures"));
        }
        if !self.procedures.contains_key(&self.entry) {
            return Err(CompileError::namespace_violation(format!(
                "entry procedure '{}' is not in the namespace",
                self.entry
            )));
        }
        let generators: Vec<&str> = self
            .procedures
            .values()
            .filter(|p| p.is_generator)
            .map(|p| p.name.as_str())
            .collect();
        if generators.len() > 1 {
            return Err(CompileError::namespace_violation(format!(
                "only one generator function allowed in namespace, found {generators:?}"
            )));
        }
        if !self.entry().is_generator {
            return Err(CompileError::namespace_violation(format!(
                "entry procedure '{}' must be the namespace's generator",
                self.entry
            )));
        }
        Ok(())
    }
}

/// Renames every parameter and local name `proc` declares to
/// `{proc.name}__{name}`, so two co-compiled procedures that happen to
/// share a local variable name (e.g. two generators both using `n`) don't
/// alias the same register once they're lowered into a single module's
/// shared register file (cross-procedure control transfer
/// jumps within one module, it never instantiates a second one). Call-site
/// argument expressions are left alone by `ir::rename_stmts` (only bound
/// names are rewritten), so a caller's own already-qualified locals still
/// read correctly when used as a tail call's or delegation's arguments.
fn qualify_locals(proc: ParsedProcedure) -> ParsedProcedure {
    let mut locals: std::collections::HashSet<String> = proc.params.iter().cloned().collect();
    crate::ir::collect_assigned_names(&proc.body, &mut locals);
    let rename: std::collections::HashMap<String, String> =
        locals.iter().map(|n| (n.clone(), format!("{}__{n}", proc.name))).collect();
    ParsedProcedure {
        name: proc.name,
        params: proc.params.iter().map(|p| rename[p].clone()).collect(),
        output_arity: proc.output_arity,
        is_generator: proc.is_generator,
        body: crate::ir::rename_stmts(&proc.body, &rename),
    }
}

/// Assembles a full `Namespace` from every co-compiled procedure's parsed
/// body: builds each one's CFG (resolving `yield from`/`for ... in other(...)`
/// delegation against its sibling procedures) and registers the result under
/// its declared entry point. Grounded on `api/context.py`'s
/// `context.validate()` followed by per-procedure `Function(context).parse_function()`
/// calls, collapsed here into one pass since `genhdl` builds every
/// procedure's CFG up front rather than lazily.
///
/// Only the entry and procedures it reaches through a genuine tail call
/// (`cfg::build_procedure`'s narrow whole-body-delegate case, which emits a
/// real `NodeKind::Call`) end up with their own standalone `Procedure` entry.
/// A helper referenced only through general `yield from`/delegating-`for`
/// inlining (every other delegation shape) contributes no
/// `Call` edge of its own — its body is copied wholesale into the caller's
/// CFG during `cfg::build_procedure`, so registering it again here would
/// both be dead weight and, if the helper itself yields, wrongly count as a
/// second generator under `Namespace::validate`.
pub fn build_namespace(parsed: Vec<ParsedProcedure>, entry_name: &str) -> Result<Namespace, CompileError> {
    if parsed.len() > MAX_PROCEDURES {
        return Err(CompileError::namespace_violation(format!(
            "namespace holds {} procedures, more than the maximum of {MAX_PROCEDURES}",
            parsed.len()
        )));
    }
    let mut by_name: IndexMap<String, ParsedProcedure> = IndexMap::new();
    for proc in parsed {
        let name = proc.name.clone();
        if by_name.insert(name.clone(), qualify_locals(proc)).is_some() {
            return Err(CompileError::namespace_violation(format!("duplicate procedure name '{name}'")));
        }
    }
    if !by_name.contains_key(entry_name) {
        return Err(CompileError::namespace_violation(format!("entry procedure '{entry_name}' is not in the namespace")));
    }

    let mut namespace = Namespace::new();
    let mut built: IndexMap<String, (Cfg, Vec<Variable>)> = IndexMap::new();
    let mut worklist = vec![entry_name.to_owned()];
    let mut seen: std::collections::HashSet<String> = std::collections::HashSet::new();
    while let Some(name) = worklist.pop() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let proc = by_name
            .get(&name)
            .ok_or_else(|| CompileError::namespace_violation(format!("procedure '{name}' is not in the namespace")))?;
        let (cfg, vars) = cfg::build_procedure(proc, &by_name)?;
        for id in cfg.ids() {
            if let cfg::NodeKind::Call { target, .. } = &cfg.node(id).kind {
                worklist.push(target.clone());
            }
        }
        built.insert(name, (cfg, vars));
    }

    // Register in declaration order (not discovery order) so HDL emission
    // stays deterministic regardless of which tail call is found first.
    for proc in by_name.values() {
        let Some((cfg, vars)) = built.swap_remove(&proc.name) else {
            continue;
        };
        namespace.insert(Procedure {
            name: proc.name.clone(),
            params: proc.params.iter().map(Parameter::new).collect(),
            output_arity: proc.output_arity,
            is_generator: proc.is_generator,
            cfg,
            vars,
        })?;
    }
    namespace.set_entry(entry_name)?;
    namespace.validate()?;
    Ok(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::Cfg;

    fn empty_proc(name: &str, is_generator: bool) -> Procedure {
        Procedure {
            name: name.to_owned(),
            params: vec![],
            output_arity: if is_generator { 1 } else { 0 },
            is_generator,
            cfg: Cfg::new(),
            vars: vec![],
        }
    }

    #[test]
    fn rejects_more_than_four_procedures() {
        let mut ns = Namespace::new();
        for i in 0..4 {
            ns.insert(empty_proc(&format!("p{i}"), i == 0)).unwrap();
        }
        let err = ns.insert(empty_proc("p4", false)).unwrap_err();
        assert_eq!(err.kind(), "NamespaceViolation");
    }

    #[test]
    fn rejects_two_generators() {
        let mut ns = Namespace::new();
        ns.insert(empty_proc("a", true)).unwrap();
        ns.insert(empty_proc("b", true)).unwrap();
        let err = ns.validate().unwrap_err();
        assert_eq!(err.kind(), "NamespaceViolation");
    }

    #[test]
    fn entry_defaults_to_first_inserted() {
        let mut ns = Namespace::new();
        ns.insert(empty_proc("a", true)).unwrap();
        ns.insert(empty_proc("b", false)).unwrap();
        assert_eq!(ns.entry_name(), "a");
        ns.validate().unwrap();
    }
}
