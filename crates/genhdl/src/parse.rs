//! The frontend parser.
//!
//! Turns one procedure's Python source snippet into a [`ir::ParsedProcedure`]
//! using `ruff_python_parser`/`ruff_python_ast` as the real Python grammar,
//! then walks the accepted statement/expression subset into [`ir::Stmt`]/
//! [`Expr`]. Everything outside that subset (comprehensions, nested `def`s,
//! closures, attribute access, subscripted assignment, `try`/`except`, ...)
//! is rejected here with a [`CompileError::UnsupportedConstruct`] naming the
//! offending AST kind and source position.
//!
//! Follows the same statement/expression dispatch shape as other
//! `ruff_python_ast`-based parsers (the `Stmt::*`/`AstExpr::*` match arms),
//! narrowed to the much smaller accepted grammar this compiler recognizes,
//! and on `python2verilog/generatorParser.py`'s `parse_for`/`parse_while`,
//! which is the origin of the `for`-over-`range` and `for`-over-call
//! desugaring performed here.

use std::collections::HashMap;

use ruff_python_ast::{self as ast, Expr as AstExpr, Number, Operator as AstOperator, Stmt as AstStmt, UnaryOp as AstUnaryOp};
use ruff_python_parser::parse_module;
use ruff_text_size::Ranged;

use crate::{
    error::{CompileError, Result},
    expr::{BinOp, Expr, UnaryOp},
    ir::{ParsedProcedure, Stmt},
    pos::LineIndex,
};

/// A name bound (via a plain `x = expr` statement) to a call this compiler
/// recognizes as an iterator source: either the `range` builtin or a call to
/// another namespace procedure. Tracked so that `x_gen = p2vrange(0, n, 1)`
/// followed by `for x in x_gen:` resolves the same way a literal
/// `for x in p2vrange(0, n, 1):` would.
#[derive(Debug, Clone)]
enum IterAlias {
    Range { start: Expr, stop: Expr, step: Expr },
    Call { callee: String, args: Vec<Expr> },
}

struct Parser<'a> {
    procedure: &'a str,
    lines: LineIndex,
    /// Local to one procedure body; Python has no block scoping, so one flat
    /// map tracks every `name = range(...)`/`name = other_proc(...)` binding
    /// seen so far in source order.
    aliases: HashMap<String, IterAlias>,
}

/// Parses one procedure's Python source into a [`ParsedProcedure`].
///
/// `name` must match the single top-level `def` in `source`; anything else
/// at module level (stray statements, more than one `def`) is rejected.
pub fn parse_procedure(name: &str, source: &str) -> Result<ParsedProcedure> {
    let mut parser = Parser {
        procedure: name,
        lines: LineIndex::new(source),
        aliases: HashMap::new(),
    };
    let parsed = parse_module(source).map_err(|e| {
        CompileError::unsupported(format!("syntax error: {e}"), parser.lines.span(name, e.range()))
    })?;
    let module = parsed.into_syntax();

    let mut function = None;
    for stmt in module.body {
        match stmt {
            AstStmt::FunctionDef(f) if function.is_none() => function = Some(f),
            AstStmt::FunctionDef(_) => {
                return Err(parser.unsupported_at(&stmt, "only one procedure definition is allowed per source unit"));
            }
            AstStmt::Pass(_) => {}
            AstStmt::Expr(ref e) if matches!(*e.value, AstExpr::StringLiteral(_)) => {}
            AstStmt::Import(_) | AstStmt::ImportFrom(_) => {}
            other => return Err(parser.unsupported_at(&other, "only a single procedure definition is accepted at module level")),
        }
    }
    let Some(function) = function else {
        return Err(CompileError::unsupported_here(format!(
            "source for procedure '{name}' contains no function definition"
        )));
    };
    if function.name.id.as_str() != name {
        return Err(parser.unsupported_at(
            &function,
            format!("function name '{}' does not match declared procedure name '{name}'", function.name.id),
        ));
    }
    if !function.decorator_list.is_empty() {
        return Err(parser.unsupported_at(&function, "decorators are not supported"));
    }
    if !function.type_params.is_empty() {
        return Err(parser.unsupported_at(&function, "generic type parameters are not supported"));
    }

    let params = &function.parameters;
    if !params.posonlyargs.is_empty() || params.vararg.is_some() || !params.kwonlyargs.is_empty() || params.kwarg.is_some() {
        return Err(parser.unsupported_at(&function, "only plain positional parameters are supported"));
    }
    let param_names: Vec<String> = params.args.iter().map(|p| p.parameter.name.id.to_string()).collect();

    let output_arity = parser.parse_return_arity(function.returns.as_deref())?;
    let body = parser.parse_block(function.body)?;
    let is_generator = stmt_list_contains_yield(&body);

    Ok(ParsedProcedure {
        name: name.to_owned(),
        params: param_names,
        output_arity,
        is_generator,
        body,
    })
}

fn stmt_list_contains_yield(body: &[Stmt]) -> bool {
    body.iter().any(|s| match s {
        Stmt::Yield { .. } | Stmt::ForEachDelegate { .. } => true,
        Stmt::If { body, orelse, .. } => stmt_list_contains_yield(body) || stmt_list_contains_yield(orelse),
        Stmt::While { body, .. } | Stmt::ForRange { body, .. } => stmt_list_contains_yield(body),
        Stmt::Assign { .. } | Stmt::TupleAssign { .. } | Stmt::Return | Stmt::Break | Stmt::Continue => false,
    })
}

impl<'a> Parser<'a> {
    fn unsupported_at<T: Ranged>(&self, node: &T, msg: impl Into<String>) -> CompileError {
        CompileError::unsupported(msg.into(), self.lines.span(self.procedure, node.range()))
    }

    /// `-> int` is arity 1; `-> tuple[int, ...]` is arity `len(elts)`; a
    /// missing annotation is rejected: every procedure must declare the
    /// tuple width its yields are checked against.
    fn parse_return_arity(&self, annotation: Option<&AstExpr>) -> Result<usize> {
        let Some(annotation) = annotation else {
            return Err(CompileError::unsupported_here(format!(
                "procedure '{}' must declare a '-> int' or '-> tuple[int, ...]' return annotation",
                self.procedure
            )));
        };
        match annotation {
            AstExpr::Subscript(ast::ExprSubscript { value, slice, .. }) => {
                let AstExpr::Name(name) = value.as_ref() else {
                    return Err(self.unsupported_at(annotation, "unsupported return annotation"));
                };
                if name.id.as_str() != "tuple" {
                    return Err(self.unsupported_at(annotation, "unsupported return annotation"));
                }
                match slice.as_ref() {
                    AstExpr::Tuple(t) => Ok(t.elts.len()),
                    _ => Ok(1),
                }
            }
            AstExpr::Name(_) => Ok(1),
            _ => Err(self.unsupported_at(annotation, "unsupported return annotation")),
        }
    }

    fn parse_block(&mut self, stmts: Vec<AstStmt>) -> Result<Vec<Stmt>> {
        let mut out = Vec::with_capacity(stmts.len());
        for stmt in stmts {
            if let Some(node) = self.parse_statement(stmt)? {
                out.push(node);
            }
        }
        Ok(out)
    }

    /// Returns `None` for statements that are pure no-ops (`pass`, a bare
    /// docstring expression) and therefore contribute nothing to the CFG.
    fn parse_statement(&mut self, stmt: AstStmt) -> Result<Option<Stmt>> {
        match stmt {
            AstStmt::Pass(_) => Ok(None),
            AstStmt::Expr(e) if matches!(*e.value, AstExpr::StringLiteral(_)) => Ok(None),
            AstStmt::Assign(ast::StmtAssign { targets, value, .. }) if targets.len() == 1 => {
                self.parse_assign(targets.into_iter().next().unwrap(), *value)
            }
            AstStmt::AugAssign(ast::StmtAugAssign { target, op, value, range, .. }) => {
                let AstExpr::Name(name) = *target else {
                    return Err(self.unsupported_at(&range, "augmented assignment target must be a plain name"));
                };
                let op = convert_op(op, &range, self)?;
                let rhs = self.parse_expr(*value)?;
                let combined = Expr::bin(Expr::var(name.id.to_string()), op, rhs);
                Ok(Some(Stmt::Assign {
                    target: name.id.to_string(),
                    value: combined,
                }))
            }
            AstStmt::If(ast::StmtIf { test, body, elif_else_clauses, .. }) => {
                let test = self.parse_expr(*test)?;
                let body = self.parse_block(body)?;
                let orelse = self.parse_elif_chain(elif_else_clauses)?;
                Ok(Some(Stmt::If { test, body, orelse }))
            }
            AstStmt::While(ast::StmtWhile { test, body, orelse, range, .. }) => {
                if !orelse.is_empty() {
                    return Err(self.unsupported_at(&range, "while/else is not supported"));
                }
                let test = self.parse_expr(*test)?;
                let body = self.parse_block(body)?;
                Ok(Some(Stmt::While { test, body }))
            }
            AstStmt::For(ast::StmtFor {
                is_async,
                target,
                iter,
                body,
                orelse,
                range,
                ..
            }) => {
                if is_async {
                    return Err(self.unsupported_at(&range, "async for is not supported"));
                }
                if !orelse.is_empty() {
                    return Err(self.unsupported_at(&range, "for/else is not supported"));
                }
                self.parse_for(*target, *iter, body, &range)
            }
            AstStmt::Return(ast::StmtReturn { .. }) => Ok(Some(Stmt::Return)),
            AstStmt::Break(_) => Ok(Some(Stmt::Break)),
            AstStmt::Continue(_) => Ok(Some(Stmt::Continue)),
            AstStmt::Expr(e) => self.parse_expr_statement(*e.value),
            other => Err(self.unsupported_at(&other, format!("unsupported statement kind {other:?}"))),
        }
    }

    /// `elif`/`else` clauses collapse into a right-nested chain of `If`s,
    /// flattening `elif_else_clauses` the same way other callers of this
    /// AST walk it.
    fn parse_elif_chain(&mut self, clauses: Vec<ast::ElifElseClause>) -> Result<Vec<Stmt>> {
        let mut clauses = clauses.into_iter();
        let Some(clause) = clauses.next() else {
            return Ok(Vec::new());
        };
        let rest: Vec<_> = clauses.collect();
        match clause.test {
            Some(test) => {
                let test = self.parse_expr(test)?;
                let body = self.parse_block(clause.body)?;
                let orelse = self.parse_elif_chain(rest)?;
                Ok(vec![Stmt::If { test, body, orelse }])
            }
            None => self.parse_block(clause.body),
        }
    }

    fn parse_assign(&mut self, target: AstExpr, value: AstExpr) -> Result<Option<Stmt>> {
        match target {
            AstExpr::Name(name) => {
                let target_name = name.id.to_string();
                if let Some(alias) = self.try_parse_iter_alias(&value)? {
                    self.aliases.insert(target_name, alias);
                    return Ok(None);
                }
                let value = self.parse_expr(value)?;
                Ok(Some(Stmt::Assign { target: target_name, value }))
            }
            AstExpr::Tuple(ast::ExprTuple { elts: target_elts, .. }) => {
                let targets = target_elts
                    .into_iter()
                    .map(|e| match e {
                        AstExpr::Name(n) => Ok(n.id.to_string()),
                        other => Err(self.unsupported_at(&other, "tuple-assignment targets must be plain names")),
                    })
                    .collect::<Result<Vec<_>>>()?;
                let values = match value {
                    AstExpr::Tuple(ast::ExprTuple { elts: value_elts, .. }) => value_elts
                        .into_iter()
                        .map(|e| self.parse_expr(e))
                        .collect::<Result<Vec<_>>>()?,
                    other => return Err(self.unsupported_at(&other, "tuple-assignment value must be a tuple literal")),
                };
                if targets.len() != values.len() {
                    return Err(CompileError::arity_mismatch(
                        "tuple assignment target/value arity mismatch",
                        self.lines.span(self.procedure, ruff_text_size::TextRange::default()),
                    ));
                }
                Ok(Some(Stmt::TupleAssign { targets, values }))
            }
            other => Err(self.unsupported_at(&other, "subscript/attribute assignment targets are not supported")),
        }
    }

    /// Recognizes `range(...)` and `other_procedure(...)` calls on the
    /// right-hand side of a plain assignment, to be resolved later when the
    /// bound name is used as a `for` loop's iterator.
    fn try_parse_iter_alias(&mut self, value: &AstExpr) -> Result<Option<IterAlias>> {
        let AstExpr::Call(call) = value else { return Ok(None) };
        let AstExpr::Name(func) = call.func.as_ref() else { return Ok(None) };
        if !call.arguments.keywords.is_empty() {
            return Err(self.unsupported_at(value, "keyword arguments are not supported"));
        }
        let args: Vec<Expr> = call
            .arguments
            .args
            .iter()
            .cloned()
            .map(|a| self.parse_expr(a))
            .collect::<Result<Vec<_>>>()?;
        if func.id.as_str() == "range" {
            Ok(Some(self.range_alias(args, value)?))
        } else {
            Ok(Some(IterAlias::Call {
                callee: func.id.to_string(),
                args,
            }))
        }
    }

    fn range_alias(&self, mut args: Vec<Expr>, at: &AstExpr) -> Result<IterAlias> {
        match args.len() {
            1 => Ok(IterAlias::Range {
                start: Expr::Int(0),
                stop: args.remove(0),
                step: Expr::Int(1),
            }),
            2 => {
                let stop = args.remove(1);
                let start = args.remove(0);
                Ok(IterAlias::Range { start, stop, step: Expr::Int(1) })
            }
            3 => {
                let step = args.remove(2);
                let stop = args.remove(1);
                let start = args.remove(0);
                Ok(IterAlias::Range { start, stop, step })
            }
            _ => Err(self.unsupported_at(at, "range() accepts 1 to 3 arguments")),
        }
    }

    fn parse_for(&mut self, target: AstExpr, iter: AstExpr, body: Vec<AstStmt>, range: &impl Ranged) -> Result<Option<Stmt>> {
        let targets = match &target {
            AstExpr::Name(n) => vec![n.id.to_string()],
            AstExpr::Tuple(t) => t
                .elts
                .iter()
                .map(|e| match e {
                    AstExpr::Name(n) => Ok(n.id.to_string()),
                    other => Err(self.unsupported_at(other, "for-loop targets must be plain names")),
                })
                .collect::<Result<Vec<_>>>()?,
            other => return Err(self.unsupported_at(other, "for-loop target must be a name or tuple of names")),
        };

        let alias = match &iter {
            AstExpr::Call(_) | AstExpr::Name(_) => self.try_parse_iter_alias(&iter)?.or_else(|| {
                if let AstExpr::Name(n) = &iter {
                    self.aliases.get(n.id.as_str()).cloned()
                } else {
                    None
                }
            }),
            _ => None,
        };
        let Some(alias) = alias else {
            return Err(self.unsupported_at(range, "for-loop iterator must be range(...) or a call to another procedure"));
        };

        match alias {
            IterAlias::Range { start, stop, step } => {
                if targets.len() != 1 {
                    return Err(self.unsupported_at(range, "range() yields a single value per iteration"));
                }
                let body = self.parse_block(body)?;
                Ok(Some(Stmt::ForRange {
                    var: targets.into_iter().next().unwrap(),
                    start,
                    stop,
                    step,
                    body,
                }))
            }
            IterAlias::Call { callee, args } => {
                let body = self.parse_block(body)?;
                Ok(Some(Stmt::ForEachDelegate { targets, callee, args, body, implicit_targets: false }))
            }
        }
    }

    fn parse_expr_statement(&mut self, expr: AstExpr) -> Result<Option<Stmt>> {
        match expr {
            AstExpr::Yield(y) => {
                let values = match y.value {
                    None => Vec::new(),
                    Some(v) => match *v {
                        AstExpr::Tuple(t) => t.elts.into_iter().map(|e| self.parse_expr(e)).collect::<Result<Vec<_>>>()?,
                        other => vec![self.parse_expr(other)?],
                    },
                };
                Ok(Some(Stmt::Yield { values }))
            }
            AstExpr::YieldFrom(y) => {
                let AstExpr::Call(call) = *y.value else {
                    return Err(self.unsupported_at(&y, "yield from requires a direct call to another procedure"));
                };
                let AstExpr::Name(func) = call.func.as_ref() else {
                    return Err(self.unsupported_at(&call, "yield from requires a direct call to another procedure"));
                };
                let callee = func.id.to_string();
                let args = call
                    .arguments
                    .args
                    .iter()
                    .cloned()
                    .map(|a| self.parse_expr(a))
                    .collect::<Result<Vec<_>>>()?;
                // Desugars to the same inline-delegation shape as
                // `for __t0, __t1, ... in g(args): yield __t0, __t1, ...`,
                // but the number of synthetic targets depends
                // on `g`'s declared output arity, which this parser can't see
                // (it parses one procedure at a time) — `targets`/`body` are
                // placeholders the CFG builder discards and regenerates once
                // the full namespace is available (see `implicit_targets`).
                Ok(Some(Stmt::ForEachDelegate {
                    targets: Vec::new(),
                    callee,
                    args,
                    body: Vec::new(),
                    implicit_targets: true,
                }))
            }
            other => Err(self.unsupported_at(&other, "expression statements are only used for yield/yield from")),
        }
    }

    fn parse_expr(&mut self, expr: AstExpr) -> Result<Expr> {
        match expr {
            AstExpr::Name(n) => Ok(Expr::var(n.id.to_string())),
            AstExpr::NumberLiteral(ast::ExprNumberLiteral { value: Number::Int(i), range, .. }) => {
                let v = i
                    .as_i64()
                    .ok_or_else(|| self.unsupported_at(&range, "integer literal out of range for a 64-bit value"))?;
                Ok(Expr::Int(v))
            }
            AstExpr::UnaryOp(ast::ExprUnaryOp { op, operand, .. }) => {
                let operand = self.parse_expr(*operand)?;
                let op = match op {
                    AstUnaryOp::USub => UnaryOp::Neg,
                    AstUnaryOp::UAdd => UnaryOp::Pos,
                    AstUnaryOp::Invert => UnaryOp::BitNot,
                    AstUnaryOp::Not => UnaryOp::Not,
                };
                Ok(Expr::unary(op, operand))
            }
            AstExpr::BinOp(ast::ExprBinOp { left, op, right, range, .. }) => {
                let left = self.parse_expr(*left)?;
                let right = self.parse_expr(*right)?;
                let op = convert_op(op, &range, self)?;
                Ok(Expr::bin(left, op, right))
            }
            AstExpr::Compare(ast::ExprCompare { left, ops, comparators, range, .. }) => {
                if ops.len() != 1 {
                    return Err(self.unsupported_at(&range, "chained comparisons are not supported"));
                }
                let left = self.parse_expr(*left)?;
                let right = self.parse_expr(comparators.into_vec().into_iter().next().unwrap())?;
                let op = match ops.first().unwrap() {
                    ruff_python_ast::CmpOp::Eq => BinOp::Eq,
                    ruff_python_ast::CmpOp::NotEq => BinOp::Ne,
                    ruff_python_ast::CmpOp::Lt => BinOp::Lt,
                    ruff_python_ast::CmpOp::LtE => BinOp::Le,
                    ruff_python_ast::CmpOp::Gt => BinOp::Gt,
                    ruff_python_ast::CmpOp::GtE => BinOp::Ge,
                    other => return Err(self.unsupported_at(&range, format!("unsupported comparison operator {other:?}"))),
                };
                Ok(Expr::bin(left, op, right))
            }
            AstExpr::If(ast::ExprIf { test, body, orelse, .. }) => {
                let test = self.parse_expr(*test)?;
                let left = self.parse_expr(*body)?;
                let right = self.parse_expr(*orelse)?;
                Ok(Expr::ternary(test, left, right))
            }
            other => Err(self.unsupported_at(&other, format!("unsupported expression kind {other:?}"))),
        }
    }
}

fn convert_op(op: AstOperator, range: &impl Ranged, parser: &Parser<'_>) -> Result<BinOp> {
    Ok(match op {
        AstOperator::Add => BinOp::Add,
        AstOperator::Sub => BinOp::Sub,
        AstOperator::Mult => BinOp::Mul,
        AstOperator::Div => BinOp::Div,
        AstOperator::Mod => BinOp::Mod,
        AstOperator::FloorDiv => BinOp::FloorDiv,
        AstOperator::Pow => BinOp::Pow,
        AstOperator::LShift => BinOp::Shl,
        AstOperator::RShift => BinOp::Shr,
        AstOperator::BitAnd => BinOp::BitAnd,
        AstOperator::BitOr => BinOp::BitOr,
        AstOperator::BitXor => BinOp::BitXor,
        AstOperator::MatMult => return Err(parser.unsupported_at(range, "matrix multiplication is not supported")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_generator_signature() {
        let src = "def p2vrange(start: int, stop: int, step: int) -> int:\n    while start < stop:\n        yield start\n        start += step\n";
        let proc = parse_procedure("p2vrange", src).unwrap();
        assert_eq!(proc.params, vec!["start", "stop", "step"]);
        assert_eq!(proc.output_arity, 1);
        assert!(proc.is_generator);
    }

    #[test]
    fn rejects_nested_function_def() {
        let src = "def f(n: int) -> int:\n    def g():\n        pass\n    yield n\n";
        let err = parse_procedure("f", src).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedConstruct");
    }

    #[test]
    fn tuple_assign_preserves_both_sides() {
        let src = "def f(n: int) -> int:\n    a = 0\n    b = 1\n    a, b = b, a + b\n    yield a\n";
        let proc = parse_procedure("f", src).unwrap();
        assert!(proc.body.iter().any(|s| matches!(s, Stmt::TupleAssign { .. })));
    }

    #[test]
    fn recognizes_range_for_loop() {
        let src = "def f(n: int) -> int:\n    for i in range(0, n, 1):\n        yield i\n";
        let proc = parse_procedure("f", src).unwrap();
        assert!(matches!(proc.body[0], Stmt::ForRange { .. }));
    }

    #[test]
    fn recognizes_delegate_via_alias() {
        let src = "def f(n: int) -> int:\n    inst = other(n)\n    for val in inst:\n        yield val\n";
        let proc = parse_procedure("f", src).unwrap();
        assert!(matches!(proc.body[0], Stmt::ForEachDelegate { .. }));
    }
}
