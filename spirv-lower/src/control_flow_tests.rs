use crate::ast::build::*;
use crate::ast::*;
use crate::lowering::{lower, LowerOutput};
use crate::options::LowerOptions;
use rspirv::dr::{Block, Instruction, Module, Operand};
use rspirv::spirv::{Capability, Op, Word};

fn lower_unit(unit: &TranslationUnit) -> LowerOutput {
    let _ = env_logger::builder().is_test(true).try_init();
    lower(unit, &LowerOptions::default()).expect("lowering failed")
}

fn main_blocks(module: &Module) -> &[Block] {
    let entry = module.entry_points.first().expect("no entry point");
    let Some(Operand::IdRef(main)) = entry.operands.get(1) else {
        panic!("entry point without a function");
    };
    &module
        .functions
        .iter()
        .find(|f| f.def.as_ref().and_then(|d| d.result_id) == Some(*main))
        .expect("entry function missing")
        .blocks
}

fn label(block: &Block) -> Word {
    block.label.as_ref().and_then(|l| l.result_id).expect("unlabelled block")
}

fn block(blocks: &[Block], id: Word) -> &Block {
    blocks.iter().find(|b| label(b) == id).expect("no such block")
}

fn terminator(block: &Block) -> &Instruction {
    block.instructions.last().expect("empty block")
}

fn ops(blocks: &[Block]) -> Vec<Op> {
    blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .map(|i| i.class.opcode)
        .collect()
}

fn id_operand(inst: &Instruction, n: usize) -> Word {
    match inst.operands.get(n) {
        Some(Operand::IdRef(id)) => *id,
        other => panic!("operand {} of {:?} is {:?}", n, inst.class.opcode, other),
    }
}

fn counter_loop(test_first: bool) -> TranslationUnit {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let i = b.local("i", Type::int(32));
    let test = binary(BinaryOp::Less, b.var(i), int(4), Type::bool());
    let step = assign(b.var(i), binary(BinaryOp::Add, b.var(i), int(1), Type::int(32)));
    let body = if test_first {
        while_loop(test, step)
    } else {
        do_while(step, test)
    };
    b.entry(vec![declare(i, Some(int(0))), body]);
    b.finish()
}

#[test]
fn test_loop_header_holds_only_merge_and_branch() {
    let out = lower_unit(&counter_loop(true));
    let blocks = main_blocks(&out.module);
    let header = blocks
        .iter()
        .find(|b| b.instructions.iter().any(|i| i.class.opcode == Op::LoopMerge))
        .expect("no loop header");
    let shape: Vec<Op> = header.instructions.iter().map(|i| i.class.opcode).collect();
    assert_eq!(shape, vec![Op::LoopMerge, Op::Branch]);

    // the test lives in the block after the header
    let test_block = block(blocks, id_operand(terminator(header), 0));
    assert_eq!(terminator(test_block).class.opcode, Op::BranchConditional);

    // the continue target jumps back to the header
    let merge = &header.instructions[0];
    let continue_block = block(blocks, id_operand(merge, 1));
    let back = terminator(continue_block);
    assert_eq!(back.class.opcode, Op::Branch);
    assert_eq!(id_operand(back, 0), label(header));
}

#[test]
fn test_do_while_tests_in_continue_block() {
    let out = lower_unit(&counter_loop(false));
    let blocks = main_blocks(&out.module);
    let header = blocks
        .iter()
        .find(|b| b.instructions.iter().any(|i| i.class.opcode == Op::LoopMerge))
        .expect("no loop header");
    assert_eq!(header.instructions.len(), 2);
    let merge_inst = &header.instructions[0];
    let continue_block = block(blocks, id_operand(merge_inst, 1));
    let test = terminator(continue_block);
    assert_eq!(test.class.opcode, Op::BranchConditional);
    assert_eq!(id_operand(test, 1), label(header));
    assert_eq!(id_operand(test, 2), id_operand(merge_inst, 0));
}

#[test]
fn test_break_and_continue_targets() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let i = b.local("i", Type::int(32));
    let done = binary(BinaryOp::Greater, b.var(i), int(8), Type::bool());
    let body = seq(vec![
        if_then(done, branch(BranchKind::Break), Some(branch(BranchKind::Continue))),
        assign(b.var(i), int(0)),
    ]);
    b.entry(vec![declare(i, Some(int(0))), for_loop(None, None, body)]);
    let out = lower_unit(&b.finish());

    let blocks = main_blocks(&out.module);
    let merge_inst = blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .find(|i| i.class.opcode == Op::LoopMerge)
        .expect("no loop merge");
    let (merge, cont) = (id_operand(merge_inst, 0), id_operand(merge_inst, 1));
    let branches_to = |target: Word| {
        blocks
            .iter()
            .map(terminator)
            .any(|t| t.class.opcode == Op::Branch && id_operand(t, 0) == target)
    };
    assert!(branches_to(merge), "break does not reach the loop merge");
    assert!(branches_to(cont), "continue does not reach the continue target");
    // both arms left the selection, so code after it is dead
    assert!(ops(blocks).contains(&Op::Unreachable));
}

#[test]
fn test_switch_falls_through_between_cases() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let x = b.local("x", Type::int(32));
    let y = b.local("y", Type::int(32));
    let body = vec![
        case(1),
        assign(b.var(y), int(10)),
        case(2),
        assign(b.var(y), int(20)),
        branch(BranchKind::Break),
        default_label(),
        assign(b.var(y), int(30)),
    ];
    b.entry(vec![
        declare(x, Some(int(2))),
        declare(y, None),
        switch(b.var(x), body),
    ]);
    let out = lower_unit(&b.finish());

    let blocks = main_blocks(&out.module);
    let switch = blocks
        .iter()
        .map(terminator)
        .find(|t| t.class.opcode == Op::Switch)
        .expect("no switch");
    let default = id_operand(switch, 1);
    assert_eq!(switch.operands.get(2), Some(&Operand::LiteralBit32(1)));
    assert_eq!(switch.operands.get(4), Some(&Operand::LiteralBit32(2)));
    let (case_1, case_2) = (id_operand(switch, 3), id_operand(switch, 5));

    let fall = terminator(block(blocks, case_1));
    assert_eq!(fall.class.opcode, Op::Branch);
    assert_eq!(id_operand(fall, 0), case_2);

    // case 2 breaks to the merge, not into the default
    let brk = terminator(block(blocks, case_2));
    assert_eq!(brk.class.opcode, Op::Branch);
    assert_ne!(id_operand(brk, 0), default);
}

#[test]
fn test_switch_without_default_targets_merge() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let x = b.local("x", Type::int(32));
    b.entry(vec![
        declare(x, Some(int(0))),
        switch(b.var(x), vec![case(0), assign(b.var(x), int(1))]),
    ]);
    let out = lower_unit(&b.finish());

    let blocks = main_blocks(&out.module);
    let header = blocks
        .iter()
        .find(|b| terminator(b).class.opcode == Op::Switch)
        .expect("no switch");
    let merge = &header.instructions[header.instructions.len() - 2];
    assert_eq!(merge.class.opcode, Op::SelectionMerge);
    assert_eq!(id_operand(terminator(header), 1), id_operand(merge, 0));
}

#[test]
fn test_code_after_return_is_unreachable() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let x = b.local("x", Type::float(32));
    b.entry(vec![declare(x, None), ret(None), assign(b.var(x), float(1.0))]);
    let out = lower_unit(&b.finish());

    let blocks = main_blocks(&out.module);
    let returns = blocks.iter().filter(|b| terminator(b).class.opcode == Op::Return).count();
    assert_eq!(returns, 1);
    let dead = blocks
        .iter()
        .find(|b| terminator(b).class.opcode == Op::Unreachable)
        .expect("dead code kept a live terminator");
    assert!(dead.instructions.iter().any(|i| i.class.opcode == Op::Store));
}

fn discard_unit(version: SpirvVersion) -> TranslationUnit {
    let mut b = UnitBuilder::new(Stage::Fragment);
    b.spirv_version(version);
    b.entry(vec![branch(BranchKind::Kill)]);
    b.finish()
}

#[test]
fn test_discard_by_version() {
    let old = lower_unit(&discard_unit(SpirvVersion::V1_0));
    let old_ops = ops(main_blocks(&old.module));
    assert!(old_ops.contains(&Op::Kill));
    assert!(!old_ops.contains(&Op::TerminateInvocation));

    let new = lower_unit(&discard_unit(SpirvVersion::V1_6));
    let new_ops = ops(main_blocks(&new.module));
    assert!(new_ops.contains(&Op::TerminateInvocation));
    assert!(!new_ops.contains(&Op::Kill));
}

#[test]
fn test_demote_keeps_block_open() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let x = b.local("x", Type::float(32));
    b.entry(vec![
        declare(x, None),
        branch(BranchKind::Demote),
        assign(b.var(x), float(1.0)),
    ]);
    let out = lower_unit(&b.finish());

    let has_demote = out
        .module
        .capabilities
        .iter()
        .any(|i| i.operands.first() == Some(&Operand::Capability(Capability::DemoteToHelperInvocation)));
    assert!(has_demote);
    let blocks = main_blocks(&out.module);
    let code = blocks
        .iter()
        .find(|b| b.instructions.iter().any(|i| i.class.opcode == Op::DemoteToHelperInvocation))
        .expect("no demote");
    // the store after the demote stays in the same block
    assert!(code.instructions.iter().any(|i| i.class.opcode == Op::Store));
    assert_eq!(terminator(code).class.opcode, Op::Return);
    assert!(!ops(blocks).contains(&Op::Unreachable));
}

#[test]
fn test_cheap_ternary_selects() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let c = b.local("c", Type::bool());
    let x = b.local("x", Type::float(32));
    let pick = ternary(b.var(c), float(1.0), float(2.0));
    b.entry(vec![declare(c, Some(boolean(true))), declare(x, Some(pick))]);
    let out = lower_unit(&b.finish());

    let ops = ops(main_blocks(&out.module));
    assert!(ops.contains(&Op::Select));
    assert!(!ops.contains(&Op::SelectionMerge));
}

#[test]
fn test_ternary_with_call_branches() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let f = b.function("f", Type::float(32), vec![], vec![ret(Some(float(3.0)))]);
    let c = b.local("c", Type::bool());
    let x = b.local("x", Type::float(32));
    let pick = ternary(b.var(c), b.call(f, vec![]), float(2.0));
    b.entry(vec![declare(c, Some(boolean(true))), declare(x, Some(pick))]);
    let out = lower_unit(&b.finish());

    let blocks = main_blocks(&out.module);
    let ops = ops(blocks);
    assert!(!ops.contains(&Op::Select));
    assert!(ops.contains(&Op::SelectionMerge));
    // the call runs only on its own arm
    let call_block = blocks
        .iter()
        .find(|b| b.instructions.iter().any(|i| i.class.opcode == Op::FunctionCall))
        .expect("no call");
    assert!(!call_block.instructions.iter().any(|i| i.class.opcode == Op::SelectionMerge));
    let temps = blocks[0]
        .instructions
        .iter()
        .filter(|i| i.class.opcode == Op::Variable)
        .count();
    assert_eq!(temps, 3);
}

#[test]
fn test_if_without_else_merges_directly() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let c = b.local("c", Type::bool());
    let x = b.local("x", Type::float(32));
    b.entry(vec![
        declare(c, Some(boolean(false))),
        declare(x, None),
        if_then(b.var(c), assign(b.var(x), float(1.0)), None),
    ]);
    let out = lower_unit(&b.finish());

    let blocks = main_blocks(&out.module);
    let header = blocks
        .iter()
        .find(|b| terminator(b).class.opcode == Op::BranchConditional)
        .expect("no selection");
    let merge = &header.instructions[header.instructions.len() - 2];
    assert_eq!(merge.class.opcode, Op::SelectionMerge);
    assert_eq!(id_operand(terminator(header), 2), id_operand(merge, 0));
}
