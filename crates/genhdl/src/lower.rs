//! State-machine lowering.
//!
//! Assigns each procedure a dense, per-procedure local state id: one for its
//! entry node, plus one for every other node reached by at least one clocked
//! edge, since a clocked edge marks a state boundary. The codegen
//! module (`codegen/module.rs`) walks the optimized `Cfg` directly starting
//! from each state's entry node, translating nodes into Verilog statements
//! until it hits a clocked edge (a state transition) or a terminal node
//! (`Call`/`Done`); this module only computes *which* nodes are state
//! boundaries and the dense ids codegen emits into the `case(state)` labels
//! and the global `(procedure-id, local-state)` register.
//!
//! No direct counterpart exists in `original_source/`: `generatorParser.py`
//! never separates "assign state ids" from "emit Verilog text" the way this
//! module does, since it generates one state per top-level statement inline
//! while walking.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::{
    cfg::{Cfg, NodeId, NodeKind},
    error::{CompileError, Result},
    namespace::{Namespace, Parameter, Variable},
    optimize,
};

/// Dense, per-procedure state id. State `0` is always a procedure's entry
/// node — the state a tail call into it jumps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StateId(pub u32);

/// One compiled procedure after optimization and state assignment.
#[derive(Debug, Clone)]
pub struct LoweredProcedure {
    /// Dense index into `LoweredProgram::procedures`; the high bits of the
    /// global state register.
    pub index: u32,
    pub name: String,
    pub params: Vec<Parameter>,
    pub output_arity: usize,
    pub is_generator: bool,
    pub vars: Vec<Variable>,
    /// The CFG after `IncreaseWorkPerClockCycle` has run.
    pub cfg: Cfg,
    /// Dense state entry nodes, `states[id.0 as usize]` is the node a jump to
    /// state `id` resumes at.
    pub states: Vec<NodeId>,
    /// Reverse lookup: a node's local state id, for every node that *is* a
    /// state entry (the entry node, and any node with an incoming clocked
    /// edge). Nodes absorbed into another state's body are absent.
    state_of: HashMap<NodeId, u32>,
}

impl LoweredProcedure {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// The local state id `node` begins, if it is a state boundary.
    pub fn state_of(&self, node: NodeId) -> Option<StateId> {
        self.state_of.get(&node).copied().map(StateId)
    }

    pub fn entry_state(&self) -> StateId {
        StateId(0)
    }
}

/// A fully lowered namespace: every procedure optimized and state-numbered,
/// plus the bit widths the global state register and procedure selector
/// need: the global state register concatenates
/// `(procedure-id, local-state)`.
#[derive(Debug, Clone)]
pub struct LoweredProgram {
    pub procedures: Vec<LoweredProcedure>,
    pub entry_index: u32,
    /// Bits needed to hold the largest procedure's local state count.
    pub state_bits: u32,
    /// Bits needed to hold a procedure index, `0` when there is only one
    /// procedure (no selector needed).
    pub procedure_bits: u32,
}

impl LoweredProgram {
    pub fn entry(&self) -> &LoweredProcedure {
        &self.procedures[self.entry_index as usize]
    }

    pub fn by_name(&self, name: &str) -> Option<&LoweredProcedure> {
        self.procedures.iter().find(|p| p.name == name)
    }
}

/// Runs `IncreaseWorkPerClockCycle` over every procedure in `namespace` and
/// assigns dense state ids. `optimization_level` is the raw `K` from the
/// surrounding `CodegenConfig`; mirrors `api/context.py`'s
/// `threshold = optimization_level - 1`, applied only when
/// `optimization_level > 0` (at `0`, the threshold is `0` outright, i.e. the
/// maximally-split baseline — see DESIGN.md).
pub fn lower_namespace(namespace: &Namespace, optimization_level: usize) -> Result<LoweredProgram> {
    let threshold = optimization_level.saturating_sub(1);
    // `saturating_sub` collapses `optimization_level == 0` to `0` too, which
    // happens to be exactly the "maximally split" threshold we want for the
    // disabled case — no special-casing needed.
    let threshold = if optimization_level == 0 { 0 } else { threshold };

    let mut index_by_name: IndexMap<String, u32> = IndexMap::new();
    for (i, proc) in namespace.procedures().enumerate() {
        index_by_name.insert(proc.name.clone(), u32::try_from(i).map_err(|_| CompileError::internal("namespace too large to index"))?);
    }

    let mut procedures = Vec::with_capacity(namespace.len());
    for proc in namespace.procedures() {
        let optimized = optimize::increase_work_per_clock_cycle(&proc.cfg, threshold);
        let (states, state_of) = assign_states(&optimized);
        let index = index_by_name[&proc.name];
        procedures.push(LoweredProcedure {
            index,
            name: proc.name.clone(),
            params: proc.params.clone(),
            output_arity: proc.output_arity,
            is_generator: proc.is_generator,
            vars: proc.vars.clone(),
            cfg: optimized,
            states,
            state_of,
        });
    }

    let entry_index = index_by_name[namespace.entry_name()];
    let state_bits = procedures
        .iter()
        .map(|p| bits_for(p.state_count()))
        .max()
        .unwrap_or(1);
    let procedure_bits = bits_for(procedures.len());

    Ok(LoweredProgram {
        procedures,
        entry_index,
        state_bits,
        procedure_bits,
    })
}

/// Bits needed to represent `count` distinct values (`count <= 1` still
/// needs a one-bit register, matching the usual minimum-width
/// convention for a single-state always block).
fn bits_for(count: usize) -> u32 {
    if count <= 1 {
        1
    } else {
        (usize::BITS - (count - 1).leading_zeros()).max(1)
    }
}

/// Walks `cfg` breadth-first from its entry node, numbering the entry node
/// state `0` and every node with an incoming clocked edge in BFS-discovery
/// order thereafter — deterministic given a fixed `Cfg`, which
/// `lower_namespace` requires so compiling the same namespace twice yields
/// byte-identical output.
fn assign_states(cfg: &Cfg) -> (Vec<NodeId>, HashMap<NodeId, u32>) {
    let mut incoming_clocked: HashMap<NodeId, bool> = HashMap::new();
    for id in cfg.ids() {
        for edge in &cfg.node(id).out {
            if edge.clocked {
                incoming_clocked.insert(edge.target, true);
            }
        }
    }

    let mut states = vec![cfg.entry];
    let mut state_of = HashMap::new();
    state_of.insert(cfg.entry, 0);

    let mut queue = std::collections::VecDeque::new();
    let mut seen = std::collections::HashSet::new();
    queue.push_back(cfg.entry);
    seen.insert(cfg.entry);

    while let Some(node) = queue.pop_front() {
        for edge in &cfg.node(node).out {
            if seen.insert(edge.target) {
                queue.push_back(edge.target);
            }
            if incoming_clocked.get(&edge.target).copied().unwrap_or(false) && !state_of.contains_key(&edge.target) {
                let id = u32::try_from(states.len()).expect("procedure has too many states");
                state_of.insert(edge.target, id);
                states.push(edge.target);
            }
        }
    }

    (states, state_of)
}

/// True when `node` is a state boundary — useful to codegen while walking a
/// state's body: stop absorbing nodes once this returns true for a
/// non-entry node reached via a non-clocked edge would be a builder bug
/// (every non-clocked successor of a node inside one state must itself be
/// non-boundary, by construction of `assign_states`), and stop outright on
/// `Call`/`Done`, which have no successors at all.
pub fn is_terminal(cfg: &Cfg, node: NodeId) -> bool {
    matches!(cfg.node(node).kind, NodeKind::Call { .. } | NodeKind::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::{Expr, VarRef},
        namespace::{Namespace, Procedure},
    };

    fn chain_proc(name: &str, is_generator: bool) -> Procedure {
        let mut cfg = Cfg::new();
        let done = cfg.entry;
        let yield_node = cfg.push(NodeKind::Yield { outputs: vec![Expr::var("a")] });
        cfg.connect(yield_node, done, true);
        let assign = cfg.push(NodeKind::Assign {
            lvalue: VarRef::new("a"),
            rvalue: Expr::Int(1),
        });
        cfg.connect(assign, yield_node, false);
        cfg.entry = assign;
        Procedure {
            name: name.to_owned(),
            params: vec![],
            output_arity: if is_generator { 1 } else { 0 },
            is_generator,
            cfg,
            vars: vec![Variable::new("a")],
        }
    }

    #[test]
    fn entry_is_always_state_zero() {
        let mut ns = Namespace::new();
        ns.insert(chain_proc("g", true)).unwrap();
        let lowered = lower_namespace(&ns, 0).unwrap();
        assert_eq!(lowered.entry().entry_state(), StateId(0));
    }

    #[test]
    fn yield_target_becomes_its_own_state() {
        let mut ns = Namespace::new();
        ns.insert(chain_proc("g", true)).unwrap();
        let lowered = lower_namespace(&ns, 5).unwrap();
        let proc = lowered.entry();
        // The Yield node's outgoing edge is clocked by construction, so the
        // DoneNode it targets must be a distinct state from the entry.
        assert!(proc.state_count() >= 2);
    }

    #[test]
    fn bits_for_single_state_is_one() {
        assert_eq!(bits_for(1), 1);
        assert_eq!(bits_for(2), 1);
        assert_eq!(bits_for(3), 2);
        assert_eq!(bits_for(5), 3);
    }
}
