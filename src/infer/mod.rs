//! C3: whole-program trait & type inference (spec.md §4.3).
//!
//! Split the way the teacher splits its borrow checker: a graph-building
//! pre-pass (`call_graph`) feeding a worklist-driven dataflow engine
//! (`dataflow`), mirroring `borrow_checker/place_registry.rs` feeding
//! `borrow_checker/dataflow.rs`.

pub mod call_graph;
pub mod dataflow;

use crate::ast::Module;
use crate::string_interning::StringTable;
use crate::traits::{FunctionId, FunctionTrait};
use crate::types::{TypeContext, TypeId};
use call_graph::CallGraph;
use rustc_hash::FxHashMap;

pub struct InferenceOutcome {
    pub call_graph: CallGraph,
    pub return_types: FxHashMap<FunctionId, TypeId>,
    pub traits: FxHashMap<FunctionId, FunctionTrait>,
    pub param_types: FxHashMap<FunctionId, Vec<TypeId>>,
}

/// Runs the full C3 pipeline over one module: builds the call graph, then
/// iterates the dataflow fixed point until every function's return type
/// and trait record stabilize (or is forcibly widened past the join
/// budget).
pub fn infer(module: &Module, type_ctx: &mut TypeContext, string_table: &StringTable) -> InferenceOutcome {
    let call_graph = CallGraph::build(module);
    let result = dataflow::run(&call_graph, type_ctx, string_table);
    InferenceOutcome {
        call_graph,
        return_types: result.return_types,
        traits: result.traits,
        param_types: result.param_types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use std::path::Path;

    fn infer_source(src: &str) -> (InferenceOutcome, TypeContext) {
        let mut table = StringTable::new();
        let module = Parser::parse_source(src, Path::new("t.ember"), &mut table).unwrap();
        let mut ctx = TypeContext::new();
        let outcome = infer(&module, &mut ctx, &table);
        (outcome, ctx)
    }

    #[test]
    fn fibonacci_is_pure_and_not_tail_recursive() {
        let (outcome, _ctx) = infer_source(
            "def fib(n):\n    if n <= 1:\n        return n\n    return fib(n - 1) + fib(n - 2)\n",
        );
        let id = FunctionId(0);
        let t = &outcome.traits[&id];
        assert!(t.is_pure);
        assert!(!t.is_tail_recursive);
        assert!(!t.can_fail);
    }

    #[test]
    fn tail_recursive_countdown_is_detected() {
        let (outcome, _ctx) = infer_source(
            "def countdown(n):\n    if n <= 0:\n        return 0\n    return countdown(n - 1)\n",
        );
        let t = &outcome.traits[&FunctionId(0)];
        assert!(t.is_tail_recursive);
    }

    #[test]
    fn function_calling_open_is_marked_does_io() {
        let (outcome, _ctx) = infer_source("def read_all(path):\n    return open(path)\n");
        let t = &outcome.traits[&FunctionId(0)];
        assert!(t.does_io);
        assert!(!t.is_pure);
    }

    #[test]
    fn function_with_raise_cannot_fail_is_false_without_raise() {
        let (outcome, _ctx) = infer_source("def safe(x):\n    return x + 1\n");
        let t = &outcome.traits[&FunctionId(0)];
        assert!(!t.can_fail);
    }

    #[test]
    fn mutating_parameter_through_subscript_is_detected() {
        let (outcome, _ctx) = infer_source("def set_first(items):\n    items[0] = 1\n");
        let t = &outcome.traits[&FunctionId(0)];
        assert!(t.mutates_param[0]);
        assert!(!t.is_pure);
    }

    #[test]
    fn async_function_with_await_is_may_await() {
        let (outcome, _ctx) = infer_source("async def fetch(url):\n    result = await get(url)\n    return result\n");
        let t = &outcome.traits[&FunctionId(0)];
        assert!(t.may_await);
    }

    #[test]
    fn generator_with_yield_is_detected() {
        let (outcome, _ctx) = infer_source("def gen(n):\n    for i in range(n):\n        yield i\n");
        let t = &outcome.traits[&FunctionId(0)];
        assert!(t.is_generator);
    }
}
