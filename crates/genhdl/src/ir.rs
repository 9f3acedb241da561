//! The statement-level intermediate representation produced by the frontend
//! parser and consumed by the CFG builder.
//!
//! This sits between the raw `ruff_python_ast` tree and the `Cfg` graph:
//! structurally faithful to the source (still has nested `if`/`while`/`for`
//! bodies as `Vec<Stmt>`), but already rejects everything outside the
//! accepted subset and already expresses every rvalue in the closed `Expr`
//! algebra. Grounded on the statement set `generatorParser.py`'s
//! `parse_statement` dispatches over (`Assign`, `For`, `Expr`/`Yield`,
//! `While`), extended with `If`/`Break`/`Continue`/`Return`/`YieldFrom` per
//! the accepted-statement list this compiler recognizes.

use std::collections::{HashMap, HashSet};

use crate::expr::Expr;

/// One parsed statement. The CFG builder is responsible for all
/// desugaring (`for` into `while`, `break`/`continue` into edges); this tree
/// keeps the structure the parser actually saw.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Stmt {
    /// `target = value`. Augmented assignment (`target op= value`) is
    /// desugared here at parse time into `target = target op value`, since
    /// it carries no additional structure the CFG builder needs to see.
    Assign { target: String, value: Expr },
    /// `t0, t1, ... = v0, v1, ...` — simultaneous tuple assignment (the
    /// classic `(a, b) <- (b, a + b)` Fibonacci-step shape). Kept distinct from `Assign`
    /// so the CFG builder can evaluate every `value` against the *old*
    /// bindings before any `target` is written, via fresh temporaries.
    TupleAssign { targets: Vec<String>, values: Vec<Expr> },
    /// `if test: body else: orelse` (orelse empty for an `if` with no `else`).
    If { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    /// `while test: body`.
    While { test: Expr, body: Vec<Stmt> },
    /// `for var in range(start, stop, step): body`, already normalized from
    /// the one/two/three-argument `range` forms.
    ForRange {
        var: String,
        start: Expr,
        stop: Expr,
        step: Expr,
        body: Vec<Stmt>,
    },
    /// `yield value` or `yield (v0, v1, ...)`.
    Yield { values: Vec<Expr> },
    /// `for v0, v1, ... in g(args): body`, or the bare `yield from g(args)`
    /// desugared into the same shape with a trivial passthrough body. The CFG builder inlines
    /// `g`'s already-built CFG at this site: every yield inside `g` binds
    /// `targets` and runs a fresh copy of `body`, and every path out of `g`
    /// falls through to whatever follows this statement.
    ///
    /// `implicit_targets` is set only by the bare `yield from g(args)` sugar:
    /// the parser has no access to `g`'s declared output arity (it parses
    /// one procedure at a time), so `targets`/`body` here are placeholders
    /// the CFG builder discards and regenerates from `g`'s real
    /// `output_arity` once the full namespace is available. `for`-loop
    /// delegation always carries the user's own written targets, which the
    /// builder instead validates against `g`'s arity.
    ForEachDelegate {
        targets: Vec<String>,
        callee: String,
        args: Vec<Expr>,
        body: Vec<Stmt>,
        implicit_targets: bool,
    },
    /// `return` or `return <constant>` — coerced to a `DoneNode` (an Open
    /// Question pinned in DESIGN.md).
    Return,
    Break,
    Continue,
}

/// A fully parsed procedure body, before CFG construction.
#[derive(Debug, Clone)]
pub struct ParsedProcedure {
    pub name: String,
    pub params: Vec<String>,
    /// Declared output tuple width, read from the `-> T` / `-> tuple[T, ...]`
    /// return annotation, the same job `generate_return_vars` does.
    pub output_arity: usize,
    pub is_generator: bool,
    pub body: Vec<Stmt>,
}

/// Every name a statement list assigns to, used by the CFG builder's inliner
/// (the `yield from`/delegation rule) to discover a callee's whole
/// local scope before renaming it uniquely per call site.
pub fn collect_assigned_names(stmts: &[Stmt], out: &mut HashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => {
                out.insert(target.clone());
            }
            Stmt::TupleAssign { targets, .. } => out.extend(targets.iter().cloned()),
            Stmt::If { body, orelse, .. } => {
                collect_assigned_names(body, out);
                collect_assigned_names(orelse, out);
            }
            Stmt::While { body, .. } => collect_assigned_names(body, out),
            Stmt::ForRange { var, body, .. } => {
                out.insert(var.clone());
                collect_assigned_names(body, out);
            }
            Stmt::ForEachDelegate { targets, body, implicit_targets, .. } => {
                if !implicit_targets {
                    out.extend(targets.iter().cloned());
                }
                collect_assigned_names(body, out);
            }
            Stmt::Yield { .. } | Stmt::Return | Stmt::Break | Stmt::Continue => {}
        }
    }
}

/// Renames every variable reference bound in `map`, leaving anything else
/// untouched. Used to give each inlined copy of a callee's body a scope of
/// its own, so two `yield from multiplier_generator(...)` call sites in the
/// same caller don't alias the same registers.
pub fn rename_stmts(stmts: &[Stmt], map: &HashMap<String, String>) -> Vec<Stmt> {
    stmts.iter().map(|s| rename_stmt(s, map)).collect()
}

fn rename_name(name: &str, map: &HashMap<String, String>) -> String {
    map.get(name).cloned().unwrap_or_else(|| name.to_owned())
}

fn rename_stmt(stmt: &Stmt, map: &HashMap<String, String>) -> Stmt {
    match stmt {
        Stmt::Assign { target, value } => Stmt::Assign {
            target: rename_name(target, map),
            value: rename_expr(value, map),
        },
        Stmt::TupleAssign { targets, values } => Stmt::TupleAssign {
            targets: targets.iter().map(|t| rename_name(t, map)).collect(),
            values: values.iter().map(|v| rename_expr(v, map)).collect(),
        },
        Stmt::If { test, body, orelse } => Stmt::If {
            test: rename_expr(test, map),
            body: rename_stmts(body, map),
            orelse: rename_stmts(orelse, map),
        },
        Stmt::While { test, body } => Stmt::While {
            test: rename_expr(test, map),
            body: rename_stmts(body, map),
        },
        Stmt::ForRange { var, start, stop, step, body } => Stmt::ForRange {
            var: rename_name(var, map),
            start: rename_expr(start, map),
            stop: rename_expr(stop, map),
            step: rename_expr(step, map),
            body: rename_stmts(body, map),
        },
        Stmt::Yield { values } => Stmt::Yield {
            values: values.iter().map(|v| rename_expr(v, map)).collect(),
        },
        Stmt::ForEachDelegate { targets, callee, args, body, implicit_targets } => Stmt::ForEachDelegate {
            targets: targets.iter().map(|t| rename_name(t, map)).collect(),
            callee: callee.clone(),
            args: args.iter().map(|a| rename_expr(a, map)).collect(),
            body: rename_stmts(body, map),
            implicit_targets: *implicit_targets,
        },
        Stmt::Return => Stmt::Return,
        Stmt::Break => Stmt::Break,
        Stmt::Continue => Stmt::Continue,
    }
}

fn rename_expr(expr: &Expr, map: &HashMap<String, String>) -> Expr {
    match expr {
        Expr::Int(_) | Expr::UInt(_) | Expr::Unknown => expr.clone(),
        Expr::Var(v) => Expr::var(rename_name(&v.source_name, map)),
        Expr::Ternary { cond, left, right } => Expr::ternary(rename_expr(cond, map), rename_expr(left, map), rename_expr(right, map)),
        Expr::BinOp { left, op, right } => Expr::bin(rename_expr(left, map), *op, rename_expr(right, map)),
        Expr::UnaryOp { op, expr } => Expr::unary(*op, rename_expr(expr, map)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_assigned_names_through_nested_control_flow() {
        let body = vec![
            Stmt::Assign { target: "a".into(), value: Expr::Int(0) },
            Stmt::While {
                test: Expr::var("a"),
                body: vec![Stmt::Assign { target: "b".into(), value: Expr::Int(1) }],
            },
        ];
        let mut names = HashSet::new();
        collect_assigned_names(&body, &mut names);
        assert!(names.contains("a"));
        assert!(names.contains("b"));
    }

    #[test]
    fn rename_rewrites_bound_vars_only() {
        let map = HashMap::from([("a".to_owned(), "__inl1_a".to_owned())]);
        let stmt = Stmt::Assign {
            target: "a".into(),
            value: Expr::bin(Expr::var("a"), crate::expr::BinOp::Add, Expr::var("n")),
        };
        let renamed = rename_stmt(&stmt, &map);
        let Stmt::Assign { target, value } = renamed else { panic!() };
        assert_eq!(target, "__inl1_a");
        assert_eq!(value.to_display_string(), "(__inl1_a + n)");
    }
}
