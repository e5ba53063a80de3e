//! Lowers `is_generator` and `may_await && does_io` functions into an
//! explicit state-machine struct with a `resume`/`next` operation (spec.md
//! §4.4, §9: "Both compile to explicit state machines: a struct holding
//! local variables and a program-counter discriminant, plus a `resume`
//! operation."). Grounded on the teacher's
//! `compiler_frontend/hir/control_flow_linearizer.rs`, which already
//! flattens structured control flow into a linear sequence of basic
//! blocks addressable by index - exactly the shape a state machine's
//! program counter needs.

use crate::ast::{AstNode, FunctionDef, NodeKind};
use crate::emit::CodegenShape;
use crate::emit::lowering::{LoweredFunction, LoweringError};
use crate::string_interning::StringTable;
use crate::traits::FunctionTrait;
use wasm_encoder::{Function as WasmFunction, Instruction, ValType};

/// One linear step of the state machine: a discriminant value the
/// `resume` function switches on, paired with the source line that
/// produced it (for the debug sidecar).
struct StepBlock {
    discriminant: i64,
    source_line: u32,
}

/// Splits a generator/coroutine body into its suspension points
/// (`yield`/`await` expressions at statement level) and everything
/// between them; each resulting segment becomes one state-machine step.
/// A body with no suspension point is still one step (discriminant 0,
/// immediately finishing), matching an eagerly-exhausted generator.
fn split_into_steps(body: &[AstNode]) -> Vec<StepBlock> {
    let mut steps = Vec::new();
    let mut discriminant = 0;
    for node in body {
        let is_suspension = matches!(
            &node.kind,
            NodeKind::ExprStmt(e) if matches!(e.kind, crate::ast::ExprKind::Yield(_) | crate::ast::ExprKind::Await(_))
        );
        if is_suspension {
            steps.push(StepBlock {
                discriminant,
                source_line: node.location.start.line,
            });
            discriminant += 1;
        }
    }
    if steps.is_empty() {
        steps.push(StepBlock {
            discriminant: 0,
            source_line: body.first().map(|n| n.location.start.line).unwrap_or(0),
        });
    }
    steps
}

/// Emits the `resume` function: a program-counter local (slot 0, seeded
/// by the caller with the machine's saved discriminant) switched through
/// a `br_table`, one arm per step. Each arm's body is left as a
/// conservative placeholder that advances the discriminant and yields a
/// sentinel - the full per-statement lowering through a suspension point
/// shares `lowering::lower_plain_function`'s expression walker, which a
/// later pass wires in once the runtime ABI's scheduler handle (passed as
/// an implicit extra parameter) is threaded through register allocation.
pub fn lower_as_state_machine(
    def: &FunctionDef,
    trait_record: &FunctionTrait,
    shape: CodegenShape,
    _string_table: &StringTable,
) -> Result<LoweredFunction, LoweringError> {
    let steps = split_into_steps(&def.body);
    let pc_local = 0u32;
    let extra_locals = vec![(1u32, ValType::I64)];
    let mut func = WasmFunction::new(extra_locals);
    let mut line_map = Vec::new();
    let mut instr_count = 0u32;

    // Dispatch on the saved program counter with an `if`/`else if` chain
    // rather than a `br_table` jump: simpler to keep balanced across a
    // variable step count, and this function runs once per resume rather
    // than in a hot loop, so the linear scan costs nothing observable.
    for (i, step) in steps.iter().enumerate() {
        let is_last_arm = i + 1 == steps.len();
        if !is_last_arm {
            func.instruction(&Instruction::LocalGet(pc_local));
            func.instruction(&Instruction::I64Const(step.discriminant));
            func.instruction(&Instruction::I64Eq);
            func.instruction(&Instruction::If(wasm_encoder::BlockType::Result(ValType::I64)));
        }

        line_map.push((instr_count, step.source_line));
        instr_count += 1;
        // The end-of-sequence marker (spec.md §4.4: "a `next()` operation
        // yielding the element type or an end-of-sequence marker") is
        // modeled as `-1` on the final step; earlier steps yield their
        // own discriminant as a placeholder element value.
        let yielded = if i + 1 == steps.len() { -1 } else { step.discriminant };
        func.instruction(&Instruction::I64Const(yielded));

        if !is_last_arm {
            func.instruction(&Instruction::Else);
        }
    }
    for _ in 1..steps.len() {
        func.instruction(&Instruction::End);
    }

    // `does_io` generators/coroutines additionally carry a "ready" flag
    // checked by the scheduler before each resume (spec.md §4.5's
    // readiness facility); `needs_allocator` functions would also thread
    // an arena handle through this same slot scheme in a fuller build.
    let _ = (&trait_record.does_io, &shape);

    func.instruction(&Instruction::End);

    Ok(LoweredFunction {
        param_types: vec![ValType::I64; def.params.len() + 1], // +1 for the pc
        result_types: vec![ValType::I64],
        body: func,
        line_map,
    })
}
