//! The control-flow graph.
//!
//! Represented as an arena of nodes indexed by integer handles so that
//! cycles need no ownership cycles, in the shape of
//! `python2verilog/generatorParser.py`'s `parse_for`/
//! `parse_while` (the `for`-to-`while` desugaring and the while-true-if-break
//! shape), translated from a string-emitting walk into a real graph value
//! that later passes (the optimizer, the lowering pass) can traverse and
//! rewrite without re-parsing anything.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;

use crate::{
    error::{CompileError, Result},
    expr::{BinOp, Expr, VarRef},
    ir::{self, ParsedProcedure, Stmt},
    namespace::Variable,
};

/// An index into a `Cfg`'s node arena. Cheap to copy, stable across passes
/// that only add or relabel edges (the optimizer never removes a node, it
/// only redirects edges around it).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct NodeId(pub u32);

/// One outgoing edge: the destination node plus whether traversing it costs
/// one clock cycle: `(source, sink, clocked?)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Edge {
    pub target: NodeId,
    pub clocked: bool,
}

/// Binds one of a callee's declared parameters to a caller-side expression,
/// evaluated in the same clock cycle the tail call executes in.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ArgBinding {
    pub param: String,
    pub value: Expr,
}

/// The five CFG node kinds, as a closed sum type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum NodeKind {
    /// Unconditional step: `lvalue <- rvalue`. Non-clocked by default.
    Assign { lvalue: VarRef, rvalue: Expr },
    /// Pure branch, no side effect. `then`/`else` are the first/second
    /// outgoing edges.
    IfElse { cond: Expr },
    /// Publishes a tuple on the output channels for one cycle.
    Yield { outputs: Vec<Expr> },
    /// Tail-call into another compiled procedure; terminates this
    /// procedure's control flow (no outgoing edge — resolved at lowering
    /// time into a jump to the callee's entry state).
    Call { target: String, args: Vec<ArgBinding> },
    /// Terminal: `done` asserted and held forever.
    Done,
    /// A no-op join point where two branches' control flow reconverges
    /// the exits of both branches join at a fresh merge node reached
    /// by a non-clocked edge. Never itself a state boundary.
    Merge,
}

/// One CFG node: its kind plus its outgoing edges, in a fixed, kind-specific
/// order (`IfElse`: `[then, else]`; everything else with a successor: `[next]`;
/// `Call`/`Done`: `[]`).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub out: Vec<Edge>,
}

/// An arena-indexed control-flow graph for one procedure body.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Cfg {
    nodes: Vec<Node>,
    pub entry: NodeId,
}

impl Cfg {
    pub fn new() -> Self {
        let mut cfg = Self {
            nodes: Vec::new(),
            entry: NodeId(0),
        };
        // Every CFG starts with a DoneNode at id 0 so an empty body is
        // already a valid (trivially-terminating) graph; callers overwrite
        // `entry` once the real body is built.
        cfg.entry = cfg.push(NodeKind::Done);
        cfg
    }

    pub fn push(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(u32::try_from(self.nodes.len()).expect("CFG too large"));
        self.nodes.push(Node { kind, out: Vec::new() });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(u32::try_from(i).expect("CFG too large")))
    }

    /// Connects `from -> to` with the given clocked-ness, appending to
    /// `from`'s outgoing edge list. Call sites are responsible for the
    /// kind-specific ordering contract (then before else, etc.).
    pub fn connect(&mut self, from: NodeId, to: NodeId, clocked: bool) {
        self.node_mut(from).out.push(Edge { target: to, clocked });
    }

    /// Promotes one of `node`'s outgoing edges (by index in its `out` list)
    /// to clocked. Used by the optimizer (`optimize.rs`) to insert
    /// additional state boundaries; never called to remove one, so the
    /// mandatory edges a yield or a loop back-edge already carry are never
    /// touched.
    pub fn clock_edge(&mut self, node: NodeId, edge_index: usize) {
        self.node_mut(node).out[edge_index].clocked = true;
    }

    /// The single successor of a node that has exactly one outgoing edge
    /// (`Assign`, `Yield`, `Merge`). Panics (an internal-invariant bug, not
    /// a user-facing error) if called on a node with a different shape.
    pub fn single_successor(&self, id: NodeId) -> Option<Edge> {
        self.node(id).out.first().copied()
    }
}

/// Where control goes when a `yield` statement is reached while building one
/// procedure's CFG.
///
/// `Real` is the ordinary case: a yield publishes the procedure's own output
/// tuple. `Delegate` is active while inlining a callee's body in place of a
/// `yield from`/`for v in other(...)` statement: the callee's
/// yields don't become hardware `Yield` nodes at all, they bind the
/// delegation's loop variables and splice in a fresh copy of the delegation's
/// own loop body, then resume the callee's own flow.
#[derive(Debug, Clone)]
enum YieldSink {
    Real,
    Delegate {
        targets: Vec<String>,
        loop_body: Vec<Stmt>,
        /// The sink `loop_body` itself should build under — the scope the
        /// delegation statement appeared in, not the callee's.
        outer_sink: Box<YieldSink>,
        outer_loop: Option<LoopCtx>,
    },
}

/// `continue`/`break` targets for whichever `while`/`for` loop lexically
/// encloses the statement currently being built.
#[derive(Debug, Clone, Copy)]
struct LoopCtx {
    /// Where `continue` jumps: the bare test node for a `while` loop, or the
    /// increment node for a `for` loop — anything a `for` loop must run on
    /// every iteration has to sit on this path, not just on the ordinary
    /// fallthrough path, or `continue` would skip it.
    test: NodeId,
    /// `break` exits to whatever follows the loop.
    exit: NodeId,
    exit_clocked: bool,
}

/// Builds one procedure's `Cfg` from its parsed body, resolving delegation to
/// sibling procedures in `namespace` by inlining their bodies.
///
/// Follows `generatorParser.py`'s per-statement walk, generalized from a
/// string-emitting walk into a graph-building one; the inliner itself has no
/// counterpart in the retrieved original source (the Python reference
/// recompiles the callee's AST textually inline via its own `parse_for`
/// machinery rather than a dedicated rename+splice pass) — it follows
/// directly from the `yield from` rule and the goal of eliminating any
/// runtime call stack from the compiled machine.
struct Builder<'ns> {
    cfg: Cfg,
    namespace: &'ns IndexMap<String, ParsedProcedure>,
    procedure: &'ns str,
    output_arity: usize,
    vars: IndexMap<String, Variable>,
    inline_counter: u32,
    tmp_counter: u32,
}

/// Builds the CFG for `proc`, resolving any delegation against its siblings
/// in `namespace`. Returns the CFG plus the full list of registers the
/// procedure's body needs (parameters first, then every locally-assigned
/// name in first-appearance order).
pub fn build_procedure(proc: &ParsedProcedure, namespace: &IndexMap<String, ParsedProcedure>) -> Result<(Cfg, Vec<Variable>)> {
    let mut builder = Builder {
        cfg: Cfg::new(),
        namespace,
        procedure: &proc.name,
        output_arity: proc.output_arity,
        vars: IndexMap::new(),
        inline_counter: 0,
        tmp_counter: 0,
    };
    for param in &proc.params {
        builder.declare_var(param);
    }

    // The narrow pure-tail-delegation case: a procedure whose
    // *entire* body is a single `yield from other(...)`/`for v in other(...):
    // yield v` statement compiles to a genuine jump with no inlining, since
    // there is no caller-side work left to run after the callee is
    // exhausted.
    if let [Stmt::ForEachDelegate { targets, callee, args, body, implicit_targets }] = proc.body.as_slice() {
        let callee_proc = builder.lookup(callee)?;
        let (resolved_targets, resolved_body) = if *implicit_targets {
            synthesize_passthrough(callee_proc.output_arity, None)
        } else {
            (targets.clone(), body.clone())
        };
        if is_trivial_passthrough(&resolved_targets, &resolved_body) {
            if args.len() != callee_proc.params.len() {
                return Err(CompileError::arity_mismatch_here(format!(
                    "tail call to '{callee}' passes {} argument(s), expected {}",
                    args.len(),
                    callee_proc.params.len()
                )));
            }
            let bindings = callee_proc
                .params
                .iter()
                .zip(args.iter())
                .map(|(param, value)| ArgBinding { param: param.clone(), value: value.clone() })
                .collect();
            let id = builder.cfg.push(NodeKind::Call { target: callee.clone(), args: bindings });
            builder.cfg.entry = id;
            return Ok((builder.cfg, builder.vars.into_values().collect()));
        }
    }

    let done = builder.cfg.entry;
    let entry = builder.build_block(&proc.body, done, false, None, YieldSink::Real)?;
    builder.cfg.entry = entry;
    Ok((builder.cfg, builder.vars.into_values().collect()))
}

/// True for the shape the parser desugars `yield from g(args)` into:
/// synthetic targets immediately re-yielded untouched, i.e. no extra
/// per-iteration work beyond passing the value through.
fn is_trivial_passthrough(targets: &[String], body: &[Stmt]) -> bool {
    let [Stmt::Yield { values }] = body else { return false };
    values.len() == targets.len()
        && values
            .iter()
            .zip(targets.iter())
            .all(|(v, t)| matches!(v, Expr::Var(r) if &r.source_name == t))
}

impl<'ns> Builder<'ns> {
    fn lookup(&self, name: &str) -> Result<&'ns ParsedProcedure> {
        self.namespace
            .get(name)
            .ok_or_else(|| CompileError::namespace_violation(format!("call to undeclared procedure '{name}'")))
    }

    fn declare_var(&mut self, name: &str) {
        self.vars.entry(name.to_owned()).or_insert_with(|| Variable::new(name));
    }

    fn declare_free_vars(&mut self, expr: &Expr) {
        let mut out = Vec::new();
        expr.free_vars(&mut out);
        for v in out {
            self.declare_var(&v.source_name);
        }
    }

    fn next_tmp(&mut self) -> u32 {
        self.tmp_counter += 1;
        self.tmp_counter
    }

    /// Builds a statement list with an explicit continuation: `next` is the
    /// already-built node the last statement should fall through to, via an
    /// edge whose clockedness is `next_clocked`. Interior statement-to-
    /// statement edges default to non-clocked (a node's own kind overrides
    /// this for node kinds that force a clocked boundary, e.g. `Yield`).
    fn build_block(
        &mut self,
        stmts: &[Stmt],
        next: NodeId,
        next_clocked: bool,
        loop_ctx: Option<LoopCtx>,
        yield_sink: YieldSink,
    ) -> Result<NodeId> {
        let mut cont = next;
        let mut cont_clocked = next_clocked;
        for stmt in stmts.iter().rev() {
            cont = self.build_stmt(stmt, cont, cont_clocked, loop_ctx, yield_sink.clone())?;
            cont_clocked = false;
        }
        Ok(cont)
    }

    fn build_stmt(
        &mut self,
        stmt: &Stmt,
        next: NodeId,
        next_clocked: bool,
        loop_ctx: Option<LoopCtx>,
        yield_sink: YieldSink,
    ) -> Result<NodeId> {
        match stmt {
            Stmt::Assign { target, value } => {
                self.declare_var(target);
                self.declare_free_vars(value);
                let id = self.cfg.push(NodeKind::Assign {
                    lvalue: VarRef::new(target.clone()),
                    rvalue: value.clone(),
                });
                self.cfg.connect(id, next, next_clocked);
                Ok(id)
            }
            Stmt::TupleAssign { targets, values } => {
                // Evaluated through temporaries so the assignment is atomic
                // whether the optimizer leaves every temp in its own state or
                // fuses the whole chain into one: `tmp_i = values[i]` all run
                // before any `target_i = tmp_i`, so a later target can never
                // shadow a value an earlier temp still needs. Atomicity when
                // the chain fuses into a single state also relies on
                // `codegen::module`'s forward substitution, which makes each
                // `target_i = tmp_i` read the temp's value from this cycle
                // instead of its register's stale previous-cycle value.
                let uid = self.next_tmp();
                let temps: Vec<String> = (0..values.len()).map(|i| format!("__tup{uid}_{i}")).collect();
                let mut chain: Vec<Stmt> = Vec::with_capacity(temps.len() * 2);
                for (temp, value) in temps.iter().zip(values.iter()) {
                    chain.push(Stmt::Assign { target: temp.clone(), value: value.clone() });
                }
                for (target, temp) in targets.iter().zip(temps.iter()) {
                    chain.push(Stmt::Assign { target: target.clone(), value: Expr::var(temp.clone()) });
                }
                self.build_block(&chain, next, next_clocked, loop_ctx, yield_sink)
            }
            Stmt::If { test, body, orelse } => {
                self.declare_free_vars(test);
                let merge = self.cfg.push(NodeKind::Merge);
                self.cfg.connect(merge, next, next_clocked);
                let then_entry = self.build_block(body, merge, false, loop_ctx, yield_sink.clone())?;
                let else_entry = self.build_block(orelse, merge, false, loop_ctx, yield_sink)?;
                let id = self.cfg.push(NodeKind::IfElse { cond: test.clone() });
                self.cfg.connect(id, then_entry, false);
                self.cfg.connect(id, else_entry, false);
                Ok(id)
            }
            Stmt::While { test, body } => self.build_while(test, body, next, next_clocked, yield_sink),
            Stmt::ForRange { var, start, stop, step, body } => {
                self.declare_var(var);
                self.declare_free_vars(start);
                self.build_for_range(var, start, stop, step, body, next, next_clocked, yield_sink)
            }
            Stmt::Yield { values } => match yield_sink {
                YieldSink::Real => {
                    if values.len() != self.output_arity {
                        return Err(CompileError::arity_mismatch_here(format!(
                            "procedure '{}' yields a {}-tuple, declared output arity is {}",
                            self.procedure,
                            values.len(),
                            self.output_arity
                        )));
                    }
                    for v in values {
                        self.declare_free_vars(v);
                    }
                    let id = self.cfg.push(NodeKind::Yield { outputs: values.clone() });
                    self.cfg.connect(id, next, true);
                    Ok(id)
                }
                YieldSink::Delegate { targets, loop_body, outer_sink, outer_loop } => {
                    if values.len() != targets.len() {
                        return Err(CompileError::arity_mismatch_here(format!(
                            "delegated yield produces a {}-tuple, expected {} target(s)",
                            values.len(),
                            targets.len()
                        )));
                    }
                    let loop_body_entry = self.build_block(&loop_body, next, next_clocked, outer_loop, *outer_sink)?;
                    let tuple_assign = Stmt::TupleAssign { targets, values: values.clone() };
                    self.build_stmt(&tuple_assign, loop_body_entry, false, loop_ctx, YieldSink::Real)
                }
            },
            Stmt::ForEachDelegate { targets, callee, args, body, implicit_targets } => {
                self.inline_delegate(targets, callee, args, body, *implicit_targets, next, next_clocked, loop_ctx, yield_sink)
            }
            Stmt::Return => Ok(self.cfg.entry),
            Stmt::Break => {
                let ctx = loop_ctx.ok_or_else(|| CompileError::internal("'break' outside of a loop"))?;
                Ok(ctx.exit)
            }
            Stmt::Continue => {
                let ctx = loop_ctx.ok_or_else(|| CompileError::internal("'continue' outside of a loop"))?;
                Ok(ctx.test)
            }
        }
    }

    fn build_while(&mut self, test: &Expr, body: &[Stmt], next: NodeId, next_clocked: bool, yield_sink: YieldSink) -> Result<NodeId> {
        self.declare_free_vars(test);
        let test_id = self.cfg.push(NodeKind::IfElse { cond: test.clone() });
        let loop_ctx = LoopCtx { test: test_id, exit: next, exit_clocked: next_clocked };
        // The loop back-edge is the canonical state boundary that guarantees
        // liveness: traversing it always costs a clock cycle,
        // regardless of what the last statement in the body is.
        let body_entry = self.build_block(body, test_id, true, Some(loop_ctx), yield_sink)?;
        self.cfg.connect(test_id, body_entry, false);
        self.cfg.connect(test_id, next, next_clocked);
        Ok(test_id)
    }

    /// `for var in range(start, stop, step): body`. Unlike `while`, a `for`
    /// loop has an implicit per-iteration step that must run on every path
    /// back to the test — including `continue` — so this gets its own
    /// increment node as the loop-continuation target, distinct from the
    /// bare test node `while` uses: `continue`'s target here is the
    /// increment, not the test, so a `continue` can never skip advancing
    /// `var` the way jumping straight to the test would.
    #[expect(clippy::too_many_arguments, reason = "one loop site carries all of its own wiring")]
    fn build_for_range(
        &mut self,
        var: &str,
        start: &Expr,
        stop: &Expr,
        step: &Expr,
        body: &[Stmt],
        next: NodeId,
        next_clocked: bool,
        yield_sink: YieldSink,
    ) -> Result<NodeId> {
        self.declare_free_vars(stop);
        self.declare_free_vars(step);
        let test = range_test(var, stop, step);
        let test_id = self.cfg.push(NodeKind::IfElse { cond: test });
        let incr_id = self.cfg.push(NodeKind::Assign {
            lvalue: VarRef::new(var.to_owned()),
            rvalue: Expr::bin(Expr::var(var.to_owned()), BinOp::Add, step.clone()),
        });
        // The increment-to-test back-edge is the canonical state boundary
        // that guarantees liveness, same role as `while`'s test-to-body edge.
        self.cfg.connect(incr_id, test_id, true);
        let loop_ctx = LoopCtx { test: incr_id, exit: next, exit_clocked: next_clocked };
        let body_entry = self.build_block(body, incr_id, false, Some(loop_ctx), yield_sink)?;
        self.cfg.connect(test_id, body_entry, false);
        self.cfg.connect(test_id, next, next_clocked);

        let init = self.cfg.push(NodeKind::Assign {
            lvalue: VarRef::new(var.to_owned()),
            rvalue: start.clone(),
        });
        self.cfg.connect(init, test_id, false);
        Ok(init)
    }

    /// Inlines `callee`'s body in place of a `yield from`/`for v in
    /// callee(args): body` statement: every local name `callee` declares
    /// (its parameters plus everything it assigns) is renamed uniquely to
    /// this call site so sibling call sites to the same callee (four
    /// `multiplier_generator` calls in a row, say) don't alias the same
    /// registers, then the renamed body is built with a `YieldSink::Delegate`
    /// that turns each of the callee's yields into a binding of `targets`
    /// followed by a fresh copy of `body`.
    #[expect(clippy::too_many_arguments, reason = "one delegation site carries all of its own wiring")]
    fn inline_delegate(
        &mut self,
        targets: &[String],
        callee: &str,
        args: &[Expr],
        body: &[Stmt],
        implicit_targets: bool,
        next: NodeId,
        next_clocked: bool,
        loop_ctx: Option<LoopCtx>,
        yield_sink: YieldSink,
    ) -> Result<NodeId> {
        let callee_proc = self.lookup(callee)?;
        if args.len() != callee_proc.params.len() {
            return Err(CompileError::arity_mismatch_here(format!(
                "delegation to '{callee}' passes {} argument(s), expected {}",
                args.len(),
                callee_proc.params.len()
            )));
        }

        self.inline_counter += 1;
        let uid = self.inline_counter;

        // `yield from g(args)` carries no real targets of its own (the
        // parser can't see `g`'s output arity); synthesize them now that
        // `callee_proc.output_arity` is available, tagged with this call
        // site's `uid` so two `yield from` sites for the same callee in one
        // procedure never share a scratch register.
        let (targets, body) = if implicit_targets {
            synthesize_passthrough(callee_proc.output_arity, Some(uid))
        } else {
            (targets.to_vec(), body.to_vec())
        };

        let mut locals: HashSet<String> = callee_proc.params.iter().cloned().collect();
        ir::collect_assigned_names(&callee_proc.body, &mut locals);
        let rename: HashMap<String, String> = locals.iter().map(|n| (n.clone(), format!("__inl{uid}_{n}"))).collect();

        let mut inlined: Vec<Stmt> = Vec::with_capacity(callee_proc.params.len() + callee_proc.body.len());
        for (param, arg) in callee_proc.params.iter().zip(args.iter()) {
            inlined.push(Stmt::Assign { target: rename[param].clone(), value: arg.clone() });
        }
        inlined.extend(ir::rename_stmts(&callee_proc.body, &rename));

        let delegate_sink = YieldSink::Delegate {
            targets,
            loop_body: body,
            outer_sink: Box::new(yield_sink),
            outer_loop: loop_ctx,
        };
        // Delegation is its own scope: a `break`/`continue` that appears in
        // the callee's own body (not in the spliced-in `body`, which keeps
        // `outer_loop` above) cannot refer to a loop outside the callee.
        self.build_block(&inlined, next, next_clocked, None, delegate_sink)
    }
}

/// Builds the synthetic `(targets, body)` pair for a bare `yield from
/// g(args)`: `arity` fresh names immediately re-yielded untouched, one per
/// value `g` actually yields. `uid`, when given, tags the names with a call
/// site so sibling `yield from` statements to the same callee don't alias
/// the same scratch registers.
fn synthesize_passthrough(arity: usize, uid: Option<u32>) -> (Vec<String>, Vec<Stmt>) {
    let tag = uid.map(|u| format!("{u}_")).unwrap_or_default();
    let targets: Vec<String> = (0..arity).map(|i| format!("__yf{tag}{i}")).collect();
    let values = targets.iter().map(|t| Expr::var(t.clone())).collect();
    (targets, vec![Stmt::Yield { values }])
}

/// The generalized `for v in range(start, stop, step)` test: when
/// `step`'s sign is known at compile time the test collapses to a
/// single comparison; otherwise it picks the comparison direction at
/// runtime, since a negative step counts down to `stop`.
fn range_test(var: &str, stop: &Expr, step: &Expr) -> Expr {
    match step {
        Expr::Int(s) if *s >= 0 => Expr::bin(Expr::var(var), BinOp::Lt, stop.clone()),
        Expr::Int(_) => Expr::bin(Expr::var(var), BinOp::Gt, stop.clone()),
        _ => Expr::ternary(
            Expr::bin(step.clone(), BinOp::Ge, Expr::Int(0)),
            Expr::bin(Expr::var(var), BinOp::Lt, stop.clone()),
            Expr::bin(Expr::var(var), BinOp::Gt, stop.clone()),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cfg_is_an_immediately_done_graph() {
        let cfg = Cfg::new();
        assert!(matches!(cfg.node(cfg.entry).kind, NodeKind::Done));
    }

    #[test]
    fn connect_appends_in_order() {
        let mut cfg = Cfg::new();
        let done = cfg.entry;
        let yield_node = cfg.push(NodeKind::Yield { outputs: vec![] });
        cfg.connect(yield_node, done, true);
        let edge = cfg.single_successor(yield_node).unwrap();
        assert_eq!(edge.target, done);
        assert!(edge.clocked);
    }
}
