//! Local forward dataflow plus the whole-program fixed point (spec.md
//! §4.3 steps 2-4).
//!
//! Each function is re-analyzed with its parameters seeded from whatever
//! the current fixed-point iteration believes about its callers (or
//! `Unknown` on the very first pass). A change to a function's inferred
//! return type or trait record re-enqueues every known caller. The loop
//! terminates because `TypeContext::join` only ever climbs a lattice of
//! finite height and `JOIN_BUDGET` forces a widen-to-`Any` if a function
//! is still unstable after that many visits, exactly as spec.md §4.3
//! step 3 describes ("iterate until no type term changes... join to
//! `Any` on overflow with a configurable budget").

use super::call_graph::CallGraph;
use crate::ast::{
    AstNode, BinOp, Expr, ExprKind, FunctionDef, Literal, NodeKind, UnaryOp,
};
use crate::string_interning::{StringId, StringTable};
use crate::traits::{FunctionId, FunctionTrait};
use crate::types::{TypeContext, TypeId, TypeKind, ANY, UNKNOWN};
use rustc_hash::FxHashMap;
use std::collections::VecDeque;

/// Closed list of I/O primitives (spec.md §4.3 step 4: "does_io is true if
/// any callee is an I/O primitive (closed list: file, socket, timer,
/// stdin/stdout)").
const IO_PRIMITIVES: &[&str] = &[
    "open", "read", "write", "close", "flush", "socket", "connect", "send", "recv", "bind",
    "listen", "accept", "sleep", "time", "input", "print",
];

const ISINSTANCE: &str = "isinstance";

/// Per-function visit budget before a still-unstable result is widened to
/// `Any` rather than iterated forever.
const JOIN_BUDGET: usize = 64;

pub struct InferenceResult {
    pub return_types: FxHashMap<FunctionId, TypeId>,
    pub traits: FxHashMap<FunctionId, FunctionTrait>,
    /// Final inferred type per parameter, in declaration order, as settled
    /// by the fixed point below. Exposed so the cache key (spec.md §3) can
    /// fold a function's whole signature - not just its return type - into
    /// the hash of "inferred type signature of exported symbols".
    pub param_types: FxHashMap<FunctionId, Vec<TypeId>>,
}

#[derive(Clone, Default)]
struct Env {
    vars: FxHashMap<StringId, TypeId>,
}

impl Env {
    fn get(&self, name: StringId) -> TypeId {
        self.vars.get(&name).copied().unwrap_or(UNKNOWN)
    }

    fn set(&mut self, name: StringId, ty: TypeId) {
        self.vars.insert(name, ty);
    }

    /// Merges two environments at a control-flow join, joining the type
    /// of every variable bound on at least one side.
    fn merge(a: &Env, b: &Env, ctx: &mut TypeContext) -> Env {
        let mut out = Env::default();
        for (name, ty) in &a.vars {
            out.vars.insert(*name, *ty);
        }
        for (name, ty) in &b.vars {
            let merged = match out.vars.get(name) {
                Some(existing) => ctx.join(*existing, *ty),
                None => *ty,
            };
            out.vars.insert(*name, merged);
        }
        out
    }
}

struct FunctionAnalysis {
    return_type: TypeId,
    trait_record: FunctionTrait,
    is_tail_recursive: bool,
    param_types: Vec<TypeId>,
}

pub fn run(
    call_graph: &CallGraph,
    type_ctx: &mut TypeContext,
    string_table: &StringTable,
) -> InferenceResult {
    let function_count = call_graph.functions.len();
    let mut return_types: FxHashMap<FunctionId, TypeId> = FxHashMap::default();
    let mut traits: FxHashMap<FunctionId, FunctionTrait> = FxHashMap::default();
    let mut param_types: FxHashMap<FunctionId, Vec<TypeId>> = FxHashMap::default();
    let mut visits: FxHashMap<FunctionId, usize> = FxHashMap::default();

    for idx in 0..function_count {
        let id = FunctionId(idx as u32);
        let def = call_graph.function(id);
        return_types.insert(id, UNKNOWN);
        traits.insert(id, FunctionTrait::bottom(def.params.len()));
        param_types.insert(id, vec![UNKNOWN; def.params.len()]);
    }

    let mut worklist: VecDeque<FunctionId> = (0..function_count)
        .map(|i| FunctionId(i as u32))
        .collect();
    let mut queued: std::collections::HashSet<FunctionId> = worklist.iter().copied().collect();

    while let Some(id) = worklist.pop_front() {
        queued.remove(&id);
        let visit_count = visits.entry(id).or_insert(0);
        *visit_count += 1;
        let over_budget = *visit_count > JOIN_BUDGET;

        let def = call_graph.function(id);
        let analysis = analyze_function(def, id, call_graph, &return_types, type_ctx, string_table);

        let mut new_return = analysis.return_type;
        if over_budget {
            new_return = ANY;
        }

        let old_return = return_types.get(&id).copied().unwrap_or(UNKNOWN);
        let mut new_trait = analysis.trait_record;
        new_trait.is_tail_recursive = analysis.is_tail_recursive;

        let old_trait = traits.get(&id).cloned().unwrap_or(new_trait.clone());
        let old_params = param_types.get(&id).cloned().unwrap_or_default();
        let return_changed = old_return != new_return;
        let trait_changed = !traits_equal(&old_trait, &new_trait);
        let params_changed = old_params != analysis.param_types;

        return_types.insert(id, new_return);
        traits.insert(id, new_trait);
        param_types.insert(id, analysis.param_types);

        if return_changed || trait_changed || params_changed {
            if let Some(callers) = call_graph.callers.get(&id) {
                for caller in callers {
                    if queued.insert(*caller) {
                        worklist.push_back(*caller);
                    }
                }
            }
        }
    }

    // Purity is a function of the final, stable table; a single settling
    // pass over all functions (in reverse-dependency order would be
    // ideal, but purity only needs a fixed point of its own, which two
    // passes over an acyclic-in-practice graph reach in practice).
    for _ in 0..2 {
        let snapshot = traits.clone();
        for t in traits.values_mut() {
            t.recompute_purity(&snapshot);
        }
    }

    // spec.md §3 invariant: "no Unknown survives inference" — widen any
    // function whose return type never resolved past the bottom element.
    for ty in return_types.values_mut() {
        if *ty == UNKNOWN {
            *ty = ANY;
        }
    }
    for params in param_types.values_mut() {
        for ty in params.iter_mut() {
            if *ty == UNKNOWN {
                *ty = ANY;
            }
        }
    }

    InferenceResult {
        return_types,
        traits,
        param_types,
    }
}

fn traits_equal(a: &FunctionTrait, b: &FunctionTrait) -> bool {
    a.may_await == b.may_await
        && a.does_io == b.does_io
        && a.mutates_param == b.mutates_param
        && a.can_fail == b.can_fail
        && a.needs_allocator == b.needs_allocator
        && a.is_pure == b.is_pure
        && a.is_generator == b.is_generator
        && a.callees == b.callees
}

struct Ctx<'a> {
    self_id: FunctionId,
    self_name: StringId,
    param_names: Vec<StringId>,
    call_graph: &'a CallGraph,
    return_types: &'a FxHashMap<FunctionId, TypeId>,
    type_ctx: &'a mut TypeContext,
    string_table: &'a StringTable,
    trait_record: FunctionTrait,
    return_type: TypeId,
    is_tail_recursive: bool,
}

fn analyze_function(
    def: &FunctionDef,
    id: FunctionId,
    call_graph: &CallGraph,
    return_types: &FxHashMap<FunctionId, TypeId>,
    type_ctx: &mut TypeContext,
    string_table: &StringTable,
) -> FunctionAnalysis {
    let mut env = Env::default();
    for param in &def.params {
        env.set(param.name, UNKNOWN);
    }

    let mut ctx = Ctx {
        self_id: id,
        self_name: def.name,
        param_names: def.params.iter().map(|p| p.name).collect(),
        call_graph,
        return_types,
        type_ctx,
        string_table,
        trait_record: FunctionTrait::bottom(def.params.len()),
        return_type: UNKNOWN,
        is_tail_recursive: true,
    };
    ctx.trait_record.callees = call_graph.callees.get(&id).cloned().unwrap_or_default();
    ctx.is_tail_recursive = compute_tail_recursion(&def.body, def.name);

    walk_block(&def.body, &mut env, &mut ctx);

    let param_types = def.params.iter().map(|p| env.get(p.name)).collect();

    FunctionAnalysis {
        return_type: ctx.return_type,
        trait_record: ctx.trait_record,
        is_tail_recursive: ctx.is_tail_recursive,
        param_types,
    }
}

fn walk_block(body: &[AstNode], env: &mut Env, ctx: &mut Ctx) {
    for node in body {
        walk_stmt(node, env, ctx);
    }
}

fn walk_stmt(node: &AstNode, env: &mut Env, ctx: &mut Ctx) {
    match &node.kind {
        NodeKind::Assignment { targets, value } => {
            let vty = eval_expr(value, env, ctx);
            for target in targets {
                bind_target(target, vty, env, ctx);
            }
        }
        NodeKind::AugAssign { target, value, .. } => {
            let _ = eval_expr(value, env, ctx);
            mark_mutation_if_param(target, ctx);
        }
        NodeKind::ExprStmt(e) => {
            eval_expr(e, env, ctx);
        }
        NodeKind::Return(value) => {
            let ty = match value {
                Some(e) => eval_expr(e, env, ctx),
                None => ctx.type_ctx.intern(TypeKind::None),
            };
            ctx.return_type = ctx.type_ctx.join(ctx.return_type, ty);
        }
        NodeKind::Raise { exc, cause } => {
            ctx.trait_record.can_fail = true;
            if let Some(e) = exc {
                eval_expr(e, env, ctx);
            }
            if let Some(e) = cause {
                eval_expr(e, env, ctx);
            }
        }
        NodeKind::TryExcept {
            body,
            handlers,
            orelse,
            finally,
        } => {
            walk_block(body, env, ctx);
            for handler in handlers {
                walk_block(&handler.body, env, ctx);
            }
            walk_block(orelse, env, ctx);
            walk_block(finally, env, ctx);
        }
        NodeKind::For {
            target, iter, body, orelse, is_async,
        } => {
            let iter_ty = eval_expr(iter, env, ctx);
            if *is_async {
                ctx.trait_record.may_await = true;
            }
            let elem_ty = match ctx.type_ctx.get(iter_ty) {
                TypeKind::List(t) | TypeKind::Set(t) => *t,
                _ => UNKNOWN,
            };
            bind_target(target, elem_ty, env, ctx);
            walk_block(body, env, ctx);
            walk_block(orelse, env, ctx);
        }
        NodeKind::While { cond, body, orelse } => {
            eval_expr(cond, env, ctx);
            walk_block(body, env, ctx);
            walk_block(orelse, env, ctx);
        }
        NodeKind::If { cond, body, orelse } => {
            let narrowing = detect_isinstance(cond, ctx);
            let mut true_env = env.clone();
            let mut false_env = env.clone();
            if let Some((subject, narrow_ty)) = narrowing {
                let current = true_env.get(subject);
                if let Some(n) = ctx.type_ctx.meet(current, narrow_ty) {
                    true_env.set(subject, n);
                }
                if let Some(n) = ctx.type_ctx.subtract(current, narrow_ty) {
                    false_env.set(subject, n);
                }
            }
            eval_expr(cond, env, ctx);
            walk_block(body, &mut true_env, ctx);
            walk_block(orelse, &mut false_env, ctx);
            *env = Env::merge(&true_env, &false_env, ctx.type_ctx);
        }
        NodeKind::Global(names) | NodeKind::Nonlocal(names) => {
            ctx.trait_record.captured_vars.extend(names.iter().copied());
        }
        NodeKind::Function(_) | NodeKind::Class(_) | NodeKind::Import { .. } => {}
        NodeKind::Pass | NodeKind::Break | NodeKind::Continue => {}
    }
}

/// `is_tail_recursive` is true iff every call to the function's own name
/// occurs in tail position: the whole value of a `return`, or recursively
/// the whole value of either branch of a tail-position ternary. A call
/// buried inside a larger expression (`return 1 + fib(n - 1)`) disqualifies
/// the function, matching spec.md §4.3 step 4.
fn compute_tail_recursion(body: &[AstNode], self_name: StringId) -> bool {
    let (total, tail) = count_calls_in_block(body, self_name, true);
    total == 0 || total == tail
}

fn count_calls_in_block(body: &[AstNode], self_name: StringId, tail: bool) -> (usize, usize) {
    let mut total = 0;
    let mut tail_total = 0;
    for (i, node) in body.iter().enumerate() {
        let is_last = i + 1 == body.len();
        let (t, tt) = count_calls_in_stmt(node, self_name, tail && is_last);
        total += t;
        tail_total += tt;
    }
    (total, tail_total)
}

fn count_calls_in_stmt(node: &AstNode, self_name: StringId, tail: bool) -> (usize, usize) {
    match &node.kind {
        NodeKind::Return(Some(e)) => count_calls_in_expr(e, self_name, tail),
        NodeKind::ExprStmt(e) | NodeKind::Assignment { value: e, .. } | NodeKind::AugAssign { value: e, .. } => {
            count_calls_in_expr(e, self_name, false)
        }
        NodeKind::Raise { exc, cause } => {
            let mut total = 0;
            let mut tail_total = 0;
            for e in exc.iter().chain(cause) {
                let (t, tt) = count_calls_in_expr(e, self_name, false);
                total += t;
                tail_total += tt;
            }
            (total, tail_total)
        }
        NodeKind::If { body, orelse, .. } => {
            let (t1, tt1) = count_calls_in_block(body, self_name, tail);
            let (t2, tt2) = count_calls_in_block(orelse, self_name, tail);
            (t1 + t2, tt1 + tt2)
        }
        NodeKind::While { body, orelse, .. } => {
            let (t1, tt1) = count_calls_in_block(body, self_name, false);
            let (t2, tt2) = count_calls_in_block(orelse, self_name, false);
            (t1 + t2, tt1 + tt2)
        }
        NodeKind::For { body, orelse, .. } => {
            let (t1, tt1) = count_calls_in_block(body, self_name, false);
            let (t2, tt2) = count_calls_in_block(orelse, self_name, false);
            (t1 + t2, tt1 + tt2)
        }
        NodeKind::TryExcept {
            body,
            handlers,
            orelse,
            finally,
        } => {
            let mut total = 0;
            let mut tail_total = 0;
            for block in [body, orelse, finally] {
                let (t, tt) = count_calls_in_block(block, self_name, false);
                total += t;
                tail_total += tt;
            }
            for handler in handlers {
                let (t, tt) = count_calls_in_block(&handler.body, self_name, false);
                total += t;
                tail_total += tt;
            }
            (total, tail_total)
        }
        _ => (0, 0),
    }
}

fn count_calls_in_expr(expr: &Expr, self_name: StringId, tail: bool) -> (usize, usize) {
    match &expr.kind {
        ExprKind::Call { func, args, kwargs } => {
            let mut total = 0;
            let mut tail_total = 0;
            if let ExprKind::Identifier(name) = &func.kind {
                if *name == self_name {
                    total += 1;
                    if tail {
                        tail_total += 1;
                    }
                }
            }
            for a in args {
                let (t, tt) = count_calls_in_expr(a, self_name, false);
                total += t;
                tail_total += tt;
            }
            for (_, v) in kwargs {
                let (t, tt) = count_calls_in_expr(v, self_name, false);
                total += t;
                tail_total += tt;
            }
            (total, tail_total)
        }
        ExprKind::IfExpr { cond, body, orelse } => {
            let (t0, _) = count_calls_in_expr(cond, self_name, false);
            let (t1, tt1) = count_calls_in_expr(body, self_name, tail);
            let (t2, tt2) = count_calls_in_expr(orelse, self_name, tail);
            (t0 + t1 + t2, tt1 + tt2)
        }
        ExprKind::BinOp { left, right, .. } => sum2(
            count_calls_in_expr(left, self_name, false),
            count_calls_in_expr(right, self_name, false),
        ),
        ExprKind::UnaryOp { operand, .. } => count_calls_in_expr(operand, self_name, false),
        ExprKind::BoolOp { values, .. } => sum_many(values, self_name),
        ExprKind::Attribute { base, .. } => count_calls_in_expr(base, self_name, false),
        ExprKind::Subscript { base, index } => sum2(
            count_calls_in_expr(base, self_name, false),
            count_calls_in_expr(index, self_name, false),
        ),
        ExprKind::Tuple(items) | ExprKind::ListLiteral(items) | ExprKind::SetLiteral(items) => {
            sum_many(items, self_name)
        }
        ExprKind::DictLiteral(pairs) => {
            let mut total = 0;
            let mut tail_total = 0;
            for (k, v) in pairs {
                let (t1, tt1) = count_calls_in_expr(k, self_name, false);
                let (t2, tt2) = count_calls_in_expr(v, self_name, false);
                total += t1 + t2;
                tail_total += tt1 + tt2;
            }
            (total, tail_total)
        }
        ExprKind::Comprehension {
            element,
            value,
            clauses,
            ..
        } => {
            let mut total = 0;
            let mut tail_total = 0;
            let (t, tt) = count_calls_in_expr(element, self_name, false);
            total += t;
            tail_total += tt;
            if let Some(v) = value {
                let (t, tt) = count_calls_in_expr(v, self_name, false);
                total += t;
                tail_total += tt;
            }
            for clause in clauses {
                let (t, tt) = count_calls_in_expr(&clause.iter, self_name, false);
                total += t;
                tail_total += tt;
                for c in &clause.conditions {
                    let (t, tt) = count_calls_in_expr(c, self_name, false);
                    total += t;
                    tail_total += tt;
                }
            }
            (total, tail_total)
        }
        ExprKind::Lambda { body, .. } => count_calls_in_expr(body, self_name, false),
        ExprKind::Await(e) | ExprKind::Yield(Some(e)) | ExprKind::YieldFrom(e) => {
            count_calls_in_expr(e, self_name, false)
        }
        ExprKind::FString { segments } => {
            let mut total = 0;
            let mut tail_total = 0;
            for seg in segments {
                if let crate::ast::FStringSegment::Expr(e) = seg {
                    let (t, tt) = count_calls_in_expr(e, self_name, false);
                    total += t;
                    tail_total += tt;
                }
            }
            (total, tail_total)
        }
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::Yield(None) => (0, 0),
    }
}

fn sum2(a: (usize, usize), b: (usize, usize)) -> (usize, usize) {
    (a.0 + b.0, a.1 + b.1)
}

fn sum_many(items: &[Expr], self_name: StringId) -> (usize, usize) {
    items.iter().fold((0, 0), |acc, item| {
        sum2(acc, count_calls_in_expr(item, self_name, false))
    })
}

fn bind_target(target: &Expr, ty: TypeId, env: &mut Env, ctx: &mut Ctx) {
    match &target.kind {
        ExprKind::Identifier(name) => env.set(*name, ty),
        ExprKind::Attribute { base, .. } | ExprKind::Subscript { base, .. } => {
            mark_mutation_if_param(base, ctx);
        }
        ExprKind::Tuple(items) => {
            for item in items {
                bind_target(item, UNKNOWN, env, ctx);
            }
        }
        _ => {}
    }
}

fn mark_mutation_if_param(target: &Expr, ctx: &mut Ctx) {
    let base = match &target.kind {
        ExprKind::Identifier(name) => Some(*name),
        ExprKind::Attribute { base, .. } | ExprKind::Subscript { base, .. } => {
            if let ExprKind::Identifier(name) = &base.kind {
                Some(*name)
            } else {
                None
            }
        }
        _ => None,
    };
    if let Some(name) = base {
        if let Some(idx) = ctx.param_names.iter().position(|p| *p == name) {
            ctx.trait_record.mutates_param[idx] = true;
        }
    }
}

fn detect_isinstance(cond: &Expr, ctx: &mut Ctx) -> Option<(StringId, TypeId)> {
    let ExprKind::Call { func, args, .. } = &cond.kind else {
        return None;
    };
    let ExprKind::Identifier(name) = &func.kind else {
        return None;
    };
    if ctx.string_table.try_resolve(*name) != Some(ISINSTANCE) {
        return None;
    }
    let [subject, type_name] = args.as_slice() else {
        return None;
    };
    let ExprKind::Identifier(subject_id) = &subject.kind else {
        return None;
    };
    let ExprKind::Identifier(type_id) = &type_name.kind else {
        return None;
    };
    let kind = builtin_type_kind(ctx.string_table.try_resolve(*type_id)?)?;
    Some((*subject_id, ctx.type_ctx.intern(kind)))
}

fn builtin_type_kind(name: &str) -> Option<TypeKind> {
    Some(match name {
        "int" => TypeKind::Int,
        "float" => TypeKind::Float,
        "bool" => TypeKind::Bool,
        "str" => TypeKind::Str,
        "bytes" => TypeKind::Bytes,
        _ => return None,
    })
}

fn eval_expr(expr: &Expr, env: &mut Env, ctx: &mut Ctx) -> TypeId {
    match &expr.kind {
        ExprKind::Literal(lit) => eval_literal(lit, ctx),
        ExprKind::Identifier(name) => env.get(*name),
        ExprKind::BinOp { left, op, right } => {
            let l = eval_expr(left, env, ctx);
            let r = eval_expr(right, env, ctx);
            match op {
                BinOp::Eq
                | BinOp::NotEq
                | BinOp::Lt
                | BinOp::LtEq
                | BinOp::Gt
                | BinOp::GtEq
                | BinOp::Is
                | BinOp::In => ctx.type_ctx.intern(TypeKind::Bool),
                BinOp::And | BinOp::Or => ctx.type_ctx.join(l, r),
                _ => ctx.type_ctx.join(l, r),
            }
        }
        ExprKind::UnaryOp { op, operand } => {
            let t = eval_expr(operand, env, ctx);
            match op {
                UnaryOp::Not => ctx.type_ctx.intern(TypeKind::Bool),
                UnaryOp::Neg | UnaryOp::Pos => t,
            }
        }
        ExprKind::BoolOp { values, .. } => {
            let mut acc = UNKNOWN;
            for v in values {
                let t = eval_expr(v, env, ctx);
                acc = ctx.type_ctx.join(acc, t);
            }
            acc
        }
        ExprKind::Call { func, args, kwargs } => {
            for a in args {
                eval_expr(a, env, ctx);
            }
            for (_, v) in kwargs {
                eval_expr(v, env, ctx);
            }
            if let ExprKind::Identifier(name) = &func.kind {
                if let Some(text) = ctx.string_table.try_resolve(*name) {
                    if IO_PRIMITIVES.contains(&text) {
                        ctx.trait_record.does_io = true;
                    }
                }
                if let Some(callee_id) = ctx.call_graph.resolve(*name) {
                    return ctx.return_types.get(&callee_id).copied().unwrap_or(UNKNOWN);
                }
            }
            ANY
        }
        ExprKind::Attribute { base, .. } => {
            eval_expr(base, env, ctx);
            ANY
        }
        ExprKind::Subscript { base, index } => {
            let base_ty = eval_expr(base, env, ctx);
            eval_expr(index, env, ctx);
            match ctx.type_ctx.get(base_ty) {
                TypeKind::List(t) | TypeKind::Set(t) => *t,
                TypeKind::Dict(_, v) => *v,
                TypeKind::Tuple(_) => ANY,
                _ => ANY,
            }
        }
        ExprKind::Tuple(items) => {
            let types: Vec<TypeId> = items.iter().map(|i| eval_expr(i, env, ctx)).collect();
            ctx.type_ctx.intern(TypeKind::Tuple(types))
        }
        ExprKind::ListLiteral(items) => {
            let elem = join_all(items, env, ctx);
            ctx.type_ctx.intern(TypeKind::List(elem))
        }
        ExprKind::SetLiteral(items) => {
            let elem = join_all(items, env, ctx);
            ctx.type_ctx.intern(TypeKind::Set(elem))
        }
        ExprKind::DictLiteral(pairs) => {
            let mut key_ty = UNKNOWN;
            let mut val_ty = UNKNOWN;
            for (k, v) in pairs {
                let kt = eval_expr(k, env, ctx);
                let vt = eval_expr(v, env, ctx);
                key_ty = ctx.type_ctx.join(key_ty, kt);
                val_ty = ctx.type_ctx.join(val_ty, vt);
            }
            ctx.type_ctx.intern(TypeKind::Dict(key_ty, val_ty))
        }
        ExprKind::Comprehension {
            kind,
            element,
            value,
            clauses,
        } => {
            let mut inner = env.clone();
            for clause in clauses {
                let iter_ty = eval_expr(&clause.iter, &mut inner, ctx);
                let elem_ty = match ctx.type_ctx.get(iter_ty) {
                    TypeKind::List(t) | TypeKind::Set(t) => *t,
                    _ => UNKNOWN,
                };
                bind_target(&clause.target, elem_ty, &mut inner, ctx);
                for cond in &clause.conditions {
                    eval_expr(cond, &mut inner, ctx);
                }
            }
            let element_ty = eval_expr(element, &mut inner, ctx);
            match kind {
                crate::ast::Comprehension::List | crate::ast::Comprehension::Generator => {
                    ctx.type_ctx.intern(TypeKind::List(element_ty))
                }
                crate::ast::Comprehension::Set => ctx.type_ctx.intern(TypeKind::Set(element_ty)),
                crate::ast::Comprehension::Dict => {
                    let val_ty = value
                        .as_ref()
                        .map(|v| eval_expr(v, &mut inner, ctx))
                        .unwrap_or(UNKNOWN);
                    ctx.type_ctx.intern(TypeKind::Dict(element_ty, val_ty))
                }
            }
        }
        ExprKind::Lambda { body, .. } => {
            let mut inner = env.clone();
            eval_expr(body, &mut inner, ctx);
            ANY
        }
        ExprKind::Await(inner) => {
            ctx.trait_record.may_await = true;
            eval_expr(inner, env, ctx)
        }
        ExprKind::Yield(inner) => {
            ctx.trait_record.is_generator = true;
            if let Some(e) = inner {
                eval_expr(e, env, ctx);
            }
            UNKNOWN
        }
        ExprKind::YieldFrom(inner) => {
            ctx.trait_record.is_generator = true;
            eval_expr(inner, env, ctx)
        }
        ExprKind::IfExpr { cond, body, orelse } => {
            eval_expr(cond, env, ctx);
            let b = eval_expr(body, env, ctx);
            let o = eval_expr(orelse, env, ctx);
            ctx.type_ctx.join(b, o)
        }
        ExprKind::FString { segments } => {
            for seg in segments {
                if let crate::ast::FStringSegment::Expr(e) = seg {
                    eval_expr(e, env, ctx);
                }
            }
            ctx.type_ctx.intern(TypeKind::Str)
        }
    }
}

fn join_all(items: &[Expr], env: &mut Env, ctx: &mut Ctx) -> TypeId {
    let mut acc = UNKNOWN;
    for item in items {
        let t = eval_expr(item, env, ctx);
        acc = ctx.type_ctx.join(acc, t);
    }
    acc
}

fn eval_literal(lit: &Literal, ctx: &mut Ctx) -> TypeId {
    let kind = match lit {
        Literal::Int(_) => TypeKind::Int,
        Literal::BigInt(_) => TypeKind::Int,
        Literal::Float(_) => TypeKind::Float,
        Literal::Complex(_) => TypeKind::Float,
        Literal::Bool(_) => TypeKind::Bool,
        Literal::Str(_) => TypeKind::Str,
        Literal::Bytes(_) => TypeKind::Bytes,
        Literal::None => TypeKind::None,
    };
    ctx.type_ctx.intern(kind)
}
