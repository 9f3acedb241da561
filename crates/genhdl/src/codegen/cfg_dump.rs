//! Diagnostic-only CFG projection: a cytoscape.js-style `{elements: [...]}`
//! document, one node per CFG node and one edge per `Edge`, so a developer
//! can drop the JSON straight into a graph viewer while debugging
//! optimizer/lowering behavior. Never read back by the compiler and never
//! affects the emitted HDL — purely a side channel for diagnostics.

use serde_json::{json, Value};

use crate::{cfg::NodeKind, lower::LoweredProgram};

#[derive(Debug, Clone, serde::Serialize)]
pub struct CfgDump {
    pub elements: Vec<Value>,
}

impl CfgDump {
    pub fn from_program(program: &LoweredProgram) -> Self {
        let mut elements = Vec::new();
        for proc in &program.procedures {
            let node_id = |n: u32| format!("{}#{n}", proc.name);
            for id in proc.cfg.ids() {
                let label = match &proc.cfg.node(id).kind {
                    NodeKind::Assign { lvalue, rvalue } => format!("{} <- {}", lvalue, rvalue.to_display_string()),
                    NodeKind::IfElse { cond } => format!("if {}", cond.to_display_string()),
                    NodeKind::Yield { outputs } => format!(
                        "yield ({})",
                        outputs.iter().map(super::super::expr::Expr::to_display_string).collect::<Vec<_>>().join(", ")
                    ),
                    NodeKind::Call { target, .. } => format!("call {target}"),
                    NodeKind::Done => "done".to_owned(),
                    NodeKind::Merge => "merge".to_owned(),
                };
                elements.push(json!({
                    "data": {
                        "id": node_id(id.0),
                        "procedure": proc.name,
                        "label": label,
                        "state": proc.state_of(id).map(|s| s.0),
                    }
                }));
                for (i, edge) in proc.cfg.node(id).out.iter().enumerate() {
                    elements.push(json!({
                        "data": {
                            "id": format!("{}#{}->{}", proc.name, id.0, i),
                            "source": node_id(id.0),
                            "target": node_id(edge.target.0),
                            "clocked": edge.clocked,
                        }
                    }));
                }
            }
        }
        Self { elements }
    }

    pub fn to_json(&self) -> Value {
        json!({ "elements": self.elements })
    }
}
