//! Whole-program call graph pre-pass (spec.md §4.3 step 1: "Build a
//! whole-program call graph.").
//!
//! Flattens every `def` in the program (including methods nested inside a
//! `class`) into one `FunctionId` space, then resolves direct calls by
//! name. Calls through an unresolved expression (`f()()`, a value stored
//! in a container, a method dispatched through an open class) are left
//! unresolved; the function is instead marked as calling into `Any`,
//! which the emitter treats conservatively. This mirrors the teacher's
//! borrow checker building a flat `PlaceRegistry` before ever running its
//! `DataflowEngine`.

use crate::ast::{ExprKind, FunctionDef, Module, NodeKind};
use crate::string_interning::StringId;
use crate::traits::FunctionId;
use rustc_hash::FxHashMap;

pub struct CallGraph {
    pub functions: Vec<FunctionDef>,
    pub name_to_id: FxHashMap<StringId, FunctionId>,
    /// `callees[f]` = direct calls resolved by name during the pre-pass.
    pub callees: FxHashMap<FunctionId, Vec<FunctionId>>,
    /// Reverse edges, so a changed callee can re-enqueue its callers.
    pub callers: FxHashMap<FunctionId, Vec<FunctionId>>,
}

impl CallGraph {
    pub fn build(module: &Module) -> Self {
        let mut functions = Vec::new();
        let mut name_to_id = FxHashMap::default();
        collect_functions(&module.body, &mut functions, &mut name_to_id);

        let mut callees: FxHashMap<FunctionId, Vec<FunctionId>> = FxHashMap::default();
        let mut callers: FxHashMap<FunctionId, Vec<FunctionId>> = FxHashMap::default();
        for (idx, def) in functions.iter().enumerate() {
            let caller_id = FunctionId(idx as u32);
            let mut found = Vec::new();
            for stmt in &def.body {
                collect_calls(stmt, &name_to_id, &mut found);
            }
            found.sort_by_key(|id| id.0);
            found.dedup();
            for callee_id in &found {
                callers.entry(*callee_id).or_default().push(caller_id);
            }
            callees.insert(caller_id, found);
        }

        CallGraph {
            functions,
            name_to_id,
            callees,
            callers,
        }
    }

    pub fn function(&self, id: FunctionId) -> &FunctionDef {
        &self.functions[id.0 as usize]
    }

    pub fn resolve(&self, name: StringId) -> Option<FunctionId> {
        self.name_to_id.get(&name).copied()
    }
}

fn collect_functions(
    body: &[crate::ast::AstNode],
    functions: &mut Vec<FunctionDef>,
    name_to_id: &mut FxHashMap<StringId, FunctionId>,
) {
    for node in body {
        match &node.kind {
            NodeKind::Function(def) => {
                let id = FunctionId(functions.len() as u32);
                name_to_id.insert(def.name, id);
                functions.push(def.clone());
                // Nested `def`s (closures) become their own flat call-graph
                // nodes too; `FunctionTrait::captured_vars` records what a
                // nested function reaches into its enclosing scope for.
                collect_functions(&def.body, functions, name_to_id);
            }
            NodeKind::Class(class_def) => {
                collect_functions(&class_def.body, functions, name_to_id);
            }
            _ => {}
        }
    }
}

fn collect_calls(
    node: &crate::ast::AstNode,
    name_to_id: &FxHashMap<StringId, FunctionId>,
    found: &mut Vec<FunctionId>,
) {
    match &node.kind {
        NodeKind::Function(_) | NodeKind::Class(_) => {
            // Nested defs are their own call-graph node; calls inside them
            // are attributed to that node, not this one, when the outer
            // walk reaches it directly.
        }
        NodeKind::ExprStmt(e) | NodeKind::Return(Some(e)) => collect_calls_expr(e, name_to_id, found),
        NodeKind::Assignment { value, .. } => collect_calls_expr(value, name_to_id, found),
        NodeKind::AugAssign { value, .. } => collect_calls_expr(value, name_to_id, found),
        NodeKind::If { cond, body, orelse } => {
            collect_calls_expr(cond, name_to_id, found);
            for n in body.iter().chain(orelse) {
                collect_calls(n, name_to_id, found);
            }
        }
        NodeKind::While { cond, body, orelse } => {
            collect_calls_expr(cond, name_to_id, found);
            for n in body.iter().chain(orelse) {
                collect_calls(n, name_to_id, found);
            }
        }
        NodeKind::For {
            iter, body, orelse, ..
        } => {
            collect_calls_expr(iter, name_to_id, found);
            for n in body.iter().chain(orelse) {
                collect_calls(n, name_to_id, found);
            }
        }
        NodeKind::TryExcept {
            body,
            handlers,
            orelse,
            finally,
        } => {
            for n in body.iter().chain(orelse).chain(finally) {
                collect_calls(n, name_to_id, found);
            }
            for handler in handlers {
                for n in &handler.body {
                    collect_calls(n, name_to_id, found);
                }
            }
        }
        _ => {}
    }
}

fn collect_calls_expr(
    expr: &crate::ast::Expr,
    name_to_id: &FxHashMap<StringId, FunctionId>,
    found: &mut Vec<FunctionId>,
) {
    match &expr.kind {
        ExprKind::Call { func, args, kwargs } => {
            if let ExprKind::Identifier(name) = &func.kind {
                if let Some(id) = name_to_id.get(name) {
                    found.push(*id);
                }
            }
            collect_calls_expr(func, name_to_id, found);
            for a in args {
                collect_calls_expr(a, name_to_id, found);
            }
            for (_, v) in kwargs {
                collect_calls_expr(v, name_to_id, found);
            }
        }
        ExprKind::BinOp { left, right, .. } => {
            collect_calls_expr(left, name_to_id, found);
            collect_calls_expr(right, name_to_id, found);
        }
        ExprKind::UnaryOp { operand, .. } => collect_calls_expr(operand, name_to_id, found),
        ExprKind::BoolOp { values, .. } => {
            for v in values {
                collect_calls_expr(v, name_to_id, found);
            }
        }
        ExprKind::Attribute { base, .. } => collect_calls_expr(base, name_to_id, found),
        ExprKind::Subscript { base, index } => {
            collect_calls_expr(base, name_to_id, found);
            collect_calls_expr(index, name_to_id, found);
        }
        ExprKind::Tuple(items) | ExprKind::ListLiteral(items) | ExprKind::SetLiteral(items) => {
            for i in items {
                collect_calls_expr(i, name_to_id, found);
            }
        }
        ExprKind::DictLiteral(pairs) => {
            for (k, v) in pairs {
                collect_calls_expr(k, name_to_id, found);
                collect_calls_expr(v, name_to_id, found);
            }
        }
        ExprKind::Comprehension {
            element,
            value,
            clauses,
            ..
        } => {
            collect_calls_expr(element, name_to_id, found);
            if let Some(v) = value {
                collect_calls_expr(v, name_to_id, found);
            }
            for clause in clauses {
                collect_calls_expr(&clause.iter, name_to_id, found);
                for c in &clause.conditions {
                    collect_calls_expr(c, name_to_id, found);
                }
            }
        }
        ExprKind::Await(e) | ExprKind::Yield(Some(e)) | ExprKind::YieldFrom(e) => {
            collect_calls_expr(e, name_to_id, found)
        }
        ExprKind::IfExpr { cond, body, orelse } => {
            collect_calls_expr(cond, name_to_id, found);
            collect_calls_expr(body, name_to_id, found);
            collect_calls_expr(orelse, name_to_id, found);
        }
        ExprKind::FString { segments } => {
            for seg in segments {
                if let crate::ast::FStringSegment::Expr(e) = seg {
                    collect_calls_expr(e, name_to_id, found);
                }
            }
        }
        _ => {}
    }
}
