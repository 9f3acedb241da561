//! The expression algebra.
//!
//! Grounded directly on `python2verilog/ir/expressions.py`: `Expression`,
//! `Int`, `UInt`, `Unknown`, `Var`, `Ternary`, `UBinOp`/`BinOp`, `Mod`,
//! `FloorDiv` are carried over 1:1, with the sign-correct `%`/`//` rewrites
//! transcribed from Python's mutable-property style into owned Rust nodes.

use std::fmt;

use strum::Display;

/// A variable reference: the expression-algebra side of `Variable`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct VarRef {
    /// Name as it appeared in the source procedure.
    pub source_name: String,
    /// Name as emitted in the HDL register declaration.
    pub hdl_name: String,
}

impl VarRef {
    pub fn new(source_name: impl Into<String>) -> Self {
        let source_name = source_name.into();
        let hdl_name = format!("_{source_name}");
        Self { source_name, hdl_name }
    }
}

/// Binary operators over the closed operator set this compiler supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Eq,
    Ne,
    Le,
    Ge,
    Gt,
    Mod,
    FloorDiv,
    Pow,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    /// Truncating-toward-zero `%`, used only as the building block inside the
    /// sign-correct `Mod` rewrite — never produced by the parser. Mirrors the
    /// original's private `_Mod(UBinOp)` class, which (unlike the public
    /// `Mod(BinOp)`) emits no `$signed` wrapper of its own.
    RawMod,
}

impl BinOp {
    /// Operators whose result does not depend on operand signedness, so the
    /// `$signed` prefix used for arithmetic is omitted at emission.
    pub fn is_unsigned_result(self) -> bool {
        matches!(
            self,
            Self::Lt
                | Self::Eq
                | Self::Ne
                | Self::Le
                | Self::Ge
                | Self::Gt
                | Self::Shl
                | Self::Shr
                | Self::RawMod
        )
    }

    /// The literal Verilog infix operator token for operators that map
    /// directly onto a native primitive (i.e. everything except `Mod` and
    /// `FloorDiv`, which need the Ternary sign fix-up in `Expr::to_verilog`).
    pub fn verilog_token(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Lt => "<",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::Gt => ">",
            Self::Mod => "%",
            Self::FloorDiv => "/",
            Self::RawMod => "%",
            Self::Pow => "**",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, serde::Serialize, serde::Deserialize)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOp {
    Neg,
    Pos,
    Not,
    BitNot,
}

impl UnaryOp {
    pub fn verilog_token(self) -> &'static str {
        match self {
            Self::Neg => "-",
            Self::Pos => "+",
            Self::Not => "!",
            Self::BitNot => "~",
        }
    }
}

/// The closed expression sum type.
///
/// `Mod`/`FloorDiv` are kept as `BinOp` variants in the IR (matching how
/// `generatorParser.py` emits `%`/`//` as ordinary binary ops in the typed
/// tree) and only desugar into the sign-correct Ternary chain inside
/// `to_verilog`, exactly where `python2verilog.ir.expressions.Mod.verilog`
/// and `.FloorDiv.verilog` perform the same desugaring.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Expr {
    /// Signed integer literal.
    Int(i64),
    /// Unsigned integer literal.
    UInt(u64),
    /// "Don't care" value, emitted as Verilog `'x`.
    Unknown,
    /// Named-variable reference.
    Var(VarRef),
    /// `condition ? left : right`.
    Ternary {
        cond: Box<Expr>,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `left op right`.
    BinOp { left: Box<Expr>, op: BinOp, right: Box<Expr> },
    /// `op(expr)`.
    UnaryOp { op: UnaryOp, expr: Box<Expr> },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(VarRef::new(name))
    }

    pub fn bin(left: Expr, op: BinOp, right: Expr) -> Self {
        Self::BinOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Self::UnaryOp { op, expr: Box::new(expr) }
    }

    pub fn ternary(cond: Expr, left: Expr, right: Expr) -> Self {
        Self::Ternary {
            cond: Box::new(cond),
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Every free variable mentioned by this expression, in the order they
    /// first appear (so the CFG builder can auto-declare them in source
    /// order, mirroring how the compiler inserts declarations automatically.
    pub fn free_vars<'a>(&'a self, out: &mut Vec<&'a VarRef>) {
        match self {
            Self::Int(_) | Self::UInt(_) | Self::Unknown => {}
            Self::Var(v) => out.push(v),
            Self::Ternary { cond, left, right } => {
                cond.free_vars(out);
                left.free_vars(out);
                right.free_vars(out);
            }
            Self::BinOp { left, right, .. } => {
                left.free_vars(out);
                right.free_vars(out);
            }
            Self::UnaryOp { expr, .. } => expr.free_vars(out),
        }
    }

    /// Forward-substitutes every `Var` keyed in `subst` (by HDL register
    /// name) with the expression it maps to, leaving everything else
    /// untouched. Used by `codegen::module` to read the *value just
    /// computed this cycle* for a variable a fused state already assigned,
    /// instead of the register's value from the previous cycle — the same
    /// SSA-substitution role `python2verilog`'s codegen pass performs when it
    /// renumbers `i10`, `i11`, ... and rewrites later reads to the latest
    /// definition in scope.
    pub fn substitute(&self, subst: &std::collections::HashMap<String, Expr>) -> Expr {
        match self {
            Self::Int(_) | Self::UInt(_) | Self::Unknown => self.clone(),
            Self::Var(v) => subst.get(&v.hdl_name).cloned().unwrap_or_else(|| self.clone()),
            Self::Ternary { cond, left, right } => {
                Self::ternary(cond.substitute(subst), left.substitute(subst), right.substitute(subst))
            }
            Self::BinOp { left, op, right } => Self::bin(left.substitute(subst), *op, right.substitute(subst)),
            Self::UnaryOp { op, expr } => Self::unary(*op, expr.substitute(subst)),
        }
    }

    /// Renders the expression as a plain (non-sign-aware) string, used for
    /// diagnostics and for the CFG dump — mirrors `Expression.to_string`.
    pub fn to_display_string(&self) -> String {
        match self {
            Self::Int(v) => v.to_string(),
            Self::UInt(v) => v.to_string(),
            Self::Unknown => "'x".to_owned(),
            Self::Var(v) => v.source_name.clone(),
            Self::Ternary { cond, left, right } => {
                format!(
                    "({} ? {} : {})",
                    cond.to_display_string(),
                    left.to_display_string(),
                    right.to_display_string()
                )
            }
            Self::BinOp { left, op, right } => {
                format!("({} {op} {})", left.to_display_string(), right.to_display_string())
            }
            Self::UnaryOp { op, expr } => format!("{op}({})", expr.to_display_string()),
        }
    }

    /// Renders the expression as a single combinational Verilog expression,
    /// applying the `$signed`/Ternary sign fix-ups grounded on
    /// `Expression.verilog`/`BinOp.verilog`/`Mod.verilog`/`FloorDiv.verilog`
    /// in `python2verilog/ir/expressions.py`.
    pub fn to_verilog(&self) -> String {
        match self {
            Self::Int(v) => format!("$signed({v})"),
            Self::UInt(v) => v.to_string(),
            Self::Unknown => "'x".to_owned(),
            Self::Var(v) => v.hdl_name.clone(),
            Self::Ternary { cond, left, right } => {
                format!(
                    "({} ? {} : {})",
                    cond.to_verilog(),
                    left.to_verilog(),
                    right.to_verilog()
                )
            }
            Self::BinOp {
                left,
                op: BinOp::Mod,
                right,
            } => Self::sign_correct_mod(left, right).to_verilog(),
            Self::BinOp {
                left,
                op: BinOp::FloorDiv,
                right,
            } => Self::sign_correct_floor_div(left, right).to_verilog(),
            Self::BinOp { left, op, right } if op.is_unsigned_result() => {
                format!("({} {} {})", left.to_verilog(), op.verilog_token(), right.to_verilog())
            }
            Self::BinOp { left, op, right } => {
                format!(
                    "$signed(({} {} {}))",
                    left.to_verilog(),
                    op.verilog_token(),
                    right.to_verilog()
                )
            }
            Self::UnaryOp { op, expr } => format!("{}({})", op.verilog_token(), expr.to_verilog()),
        }
    }

    /// `a % b`, sign matching the divisor: a four-way Ternary preserving the
    /// divisor's sign exactly as `Mod.verilog()` builds it.
    fn sign_correct_mod(left: &Expr, right: &Expr) -> Expr {
        let raw = Expr::bin(left.clone(), BinOp::raw_mod(), right.clone());
        Expr::ternary(
            Expr::bin(left.clone(), BinOp::Lt, Expr::Int(0)),
            Expr::ternary(
                Expr::bin(right.clone(), BinOp::Ge, Expr::Int(0)),
                Expr::unary(UnaryOp::Neg, raw.clone()),
                raw.clone(),
            ),
            Expr::ternary(
                Expr::bin(right.clone(), BinOp::Lt, Expr::Int(0)),
                Expr::unary(UnaryOp::Neg, raw.clone()),
                raw,
            ),
        )
    }

    /// `a // b`, truncating division adjusted by `-1` when the remainder is
    /// non-zero and the operand signs differ, matching `FloorDiv.verilog()`.
    fn sign_correct_floor_div(left: &Expr, right: &Expr) -> Expr {
        let trunc_div = Expr::bin(left.clone(), BinOp::raw_div(), right.clone());
        let remainder_zero = Expr::bin(
            Expr::bin(left.clone(), BinOp::raw_mod(), right.clone()),
            BinOp::Eq,
            Expr::Int(0),
        );
        let signs_differ = Expr::bin(
            Expr::bin(left.clone(), BinOp::Lt, Expr::Int(0)),
            BinOp::BitXor,
            Expr::bin(right.clone(), BinOp::Lt, Expr::Int(0)),
        );
        let adjustment = Expr::bin(signs_differ, BinOp::BitAnd, Expr::Int(1));
        Expr::ternary(
            remainder_zero,
            trunc_div.clone(),
            Expr::bin(trunc_div, BinOp::Sub, adjustment),
        )
    }
}

impl BinOp {
    /// The underlying truncating-toward-zero `%`, before the sign
    /// correction is applied. Kept distinct from the public `Mod` variant so
    /// `Expr::BinOp { op: Mod, .. }` always means "Python semantics" and
    /// never accidentally re-enters the rewrite (mirrors the original's
    /// private `_Mod` class).
    fn raw_mod() -> Self {
        Self::RawMod
    }

    fn raw_div() -> Self {
        Self::Div
    }
}

impl fmt::Display for VarRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_int_is_signed_in_verilog() {
        assert_eq!(Expr::Int(-3).to_verilog(), "$signed(-3)");
    }

    #[test]
    fn comparison_has_no_signed_prefix() {
        let e = Expr::bin(Expr::var("a"), BinOp::Lt, Expr::Int(0));
        assert_eq!(e.to_verilog(), "(_a < $signed(0))");
    }

    #[test]
    fn mod_desugars_to_divisor_sign_ternary() {
        let e = Expr::bin(Expr::var("a"), BinOp::Mod, Expr::var("b"));
        let verilog = e.to_verilog();
        assert!(verilog.contains('?'), "expected a Ternary rewrite, got {verilog}");
        assert!(verilog.contains("%"));
    }

    #[test]
    fn free_vars_collects_in_order() {
        let e = Expr::bin(Expr::var("a"), BinOp::Add, Expr::var("b"));
        let mut out = Vec::new();
        e.free_vars(&mut out);
        let names: Vec<_> = out.iter().map(|v| v.source_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn substitute_replaces_only_mapped_registers() {
        let subst = std::collections::HashMap::from([(VarRef::new("x").hdl_name, Expr::Int(5))]);
        let e = Expr::bin(Expr::var("x"), BinOp::Add, Expr::var("y"));
        let substituted = e.substitute(&subst);
        assert_eq!(substituted.to_display_string(), "(5 + y)");
    }
}
