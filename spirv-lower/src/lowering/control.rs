//! Structured control flow: selections, loops, switches and early exits.
//!
//! Every construct allocates its blocks up front. Code after a terminator
//! goes into a fresh block nothing branches to, and such dead blocks end in
//! `OpUnreachable` instead of branching on.

use super::{BreakTarget, Lowered, LowerCtx};
use crate::ast::{BranchKind, LoopHints, Node, NodeKind, SelectionHints, SpirvVersion};
use crate::decorations::{Needs, DEMOTE_TO_HELPER, TERMINATE_INVOCATION};
use crate::error::Result;
use crate::visitor;
use crate::{bail_internal, bail_internal_at};
use log::trace;
use rspirv::dr::Operand;
use rspirv::spirv::{Capability, LoopControl, Op, SelectionControl, Word};

fn selection_control(hints: SelectionHints) -> SelectionControl {
    let mut control = SelectionControl::NONE;
    if hints.flatten {
        control |= SelectionControl::FLATTEN;
    }
    if hints.dont_flatten {
        control |= SelectionControl::DONT_FLATTEN;
    }
    control
}

/// Loop control mask and its literal parameters. Dependency hints only
/// exist from SPIR-V 1.1.
fn loop_control(hints: LoopHints, version: SpirvVersion) -> (LoopControl, Vec<Operand>) {
    let mut control = LoopControl::NONE;
    let mut params = Vec::new();
    if hints.unroll {
        control |= LoopControl::UNROLL;
    }
    if hints.dont_unroll {
        control |= LoopControl::DONT_UNROLL;
    }
    if version >= SpirvVersion::V1_1 {
        if hints.dependency_infinite {
            control |= LoopControl::DEPENDENCY_INFINITE;
        }
        if let Some(length) = hints.dependency_length {
            control |= LoopControl::DEPENDENCY_LENGTH;
            params.push(Operand::LiteralBit32(length));
        }
    }
    (control, params)
}

/// A run of switch statements entered through one or more labels.
#[derive(Debug, Default)]
struct Segment<'n> {
    labels: Vec<BranchKind>,
    statements: Vec<&'n Node>,
}

/// Split a flat switch body at its case and default labels. Consecutive
/// labels share a segment; a trailing label gets an empty one.
fn switch_segments(body: &[Node]) -> Vec<Segment<'_>> {
    let mut segments: Vec<Segment<'_>> = Vec::new();
    for stmt in body {
        match &stmt.kind {
            NodeKind::Branch { kind, .. } if kind.is_label() => {
                let start_new = segments.last().map_or(true, |s| !s.statements.is_empty());
                if start_new {
                    segments.push(Segment::default());
                }
                if let Some(segment) = segments.last_mut() {
                    segment.labels.push(*kind);
                }
            }
            // statements before the first label can never run
            _ => {
                if let Some(segment) = segments.last_mut() {
                    segment.statements.push(stmt);
                }
            }
        }
    }
    segments
}

impl<'a> LowerCtx<'a> {
    /// Begin a block, keeping it dead when no live edge leads to it.
    fn enter_block(&mut self, block: Word, live: bool) -> Result<()> {
        self.ctor.begin_block(block)?;
        if !live {
            self.ctor.mark_unreachable();
        }
        Ok(())
    }

    pub(super) fn lower_selection(&mut self, node: &Node) -> Result<Lowered> {
        let NodeKind::Selection {
            condition,
            then_branch,
            else_branch,
            evaluate_both,
            hints,
        } = &node.kind
        else {
            bail_internal_at!(node.span, "not a selection");
        };
        if node.ty.is_void() {
            self.lower_if(condition, then_branch.as_deref(), else_branch.as_deref(), *hints)?;
            return Ok(Lowered::Void);
        }
        let (Some(then_value), Some(else_value)) = (then_branch, else_branch) else {
            bail_internal_at!(node.span, "conditional expression without both values");
        };
        self.lower_ternary(condition, then_value, else_value, *evaluate_both, *hints, node)
    }

    fn lower_if(
        &mut self,
        condition: &Node,
        then_branch: Option<&Node>,
        else_branch: Option<&Node>,
        hints: SelectionHints,
    ) -> Result<()> {
        let (cond, _) = self.lower_rvalue(condition)?;
        let live = self.ctor.is_reachable();
        let then_block = self.ctor.new_block();
        let merge = self.ctor.new_block();
        let else_block = if else_branch.is_some() {
            self.ctor.new_block()
        } else {
            merge
        };
        self.ctor.builder.selection_merge(merge, selection_control(hints))?;
        self.ctor.builder.branch_conditional(cond, then_block, else_block, [])?;

        self.enter_block(then_block, live)?;
        if let Some(then_branch) = then_branch {
            self.lower_statement(then_branch)?;
        }
        let mut merge_live = self.ctor.is_reachable();
        self.ctor.close_block(merge)?;

        match else_branch {
            Some(else_branch) => {
                self.enter_block(else_block, live)?;
                self.lower_statement(else_branch)?;
                merge_live |= self.ctor.is_reachable();
                self.ctor.close_block(merge)?;
            }
            None => merge_live = live,
        }
        self.enter_block(merge, merge_live)
    }

    /// `c ? a : b`. Cheap operands become one `OpSelect`; anything else
    /// branches and writes into a shared temporary.
    fn lower_ternary(
        &mut self,
        condition: &Node,
        then_value: &Node,
        else_value: &Node,
        evaluate_both: bool,
        hints: SelectionHints,
        node: &Node,
    ) -> Result<Lowered> {
        let result_ty = self.value_type(&node.ty)?;
        let version_14 = self.ctor.version() >= SpirvVersion::V1_4;
        let safe = |n: &Node| visitor::is_trivial(n) && !visitor::has_side_effects(n);
        let cheap = evaluate_both || (safe(then_value) && safe(else_value));
        let selectable = node.ty.is_scalar() || node.ty.is_vector() || (version_14 && !node.ty.is_opaque());

        if cheap && selectable && condition.ty.is_scalar() {
            let (mut cond, _) = self.lower_rvalue(condition)?;
            let (t, _) = self.lower_rvalue(then_value)?;
            let (e, _) = self.lower_rvalue(else_value)?;
            if node.ty.is_vector() && !version_14 {
                cond = self.splat(cond, &condition.ty, &node.ty)?;
            }
            let id = self.ctor.emit(
                Op::Select,
                result_ty,
                vec![Operand::IdRef(cond), Operand::IdRef(t), Operand::IdRef(e)],
            )?;
            return Ok(Lowered::Value { id, ty: result_ty });
        }

        let temp = self.ctor.declare_variable("ternary", result_ty)?;
        let (cond, _) = self.lower_rvalue(condition)?;
        let live = self.ctor.is_reachable();
        let then_block = self.ctor.new_block();
        let else_block = self.ctor.new_block();
        let merge = self.ctor.new_block();
        self.ctor.builder.selection_merge(merge, selection_control(hints))?;
        self.ctor.builder.branch_conditional(cond, then_block, else_block, [])?;

        for (block, value) in [(then_block, then_value), (else_block, else_value)] {
            self.enter_block(block, live)?;
            let (id, ty) = self.lower_rvalue(value)?;
            let id = self.ctor.convert_representation(id, ty, result_ty)?;
            self.ctor.builder.store(temp, id, None, [])?;
            self.ctor.close_block(merge)?;
        }
        self.enter_block(merge, live)?;
        let id = self.ctor.builder.load(result_ty, None, temp, None, [])?;
        Ok(Lowered::Value { id, ty: result_ty })
    }

    /// Loops have a header holding only the merge annotation and a branch.
    /// Test-first loops evaluate the test in its own block after the header;
    /// test-last loops evaluate it in the continue block.
    pub(super) fn lower_loop(
        &mut self,
        test: Option<&Node>,
        body: Option<&Node>,
        terminal: Option<&Node>,
        test_first: bool,
        hints: LoopHints,
    ) -> Result<()> {
        let live = self.ctor.is_reachable();
        let header = self.ctor.new_block();
        let body_block = self.ctor.new_block();
        let continue_block = self.ctor.new_block();
        let merge = self.ctor.new_block();
        let (control, params) = loop_control(hints, self.ctor.version());
        trace!("loop header %{} merge %{} continue %{}", header, merge, continue_block);

        self.ctor.close_block(header)?;
        self.enter_block(header, live)?;
        self.ctor.builder.loop_merge(merge, continue_block, control, params)?;

        match test {
            Some(test) if test_first => {
                let test_block = self.ctor.new_block();
                self.ctor.branch(test_block)?;
                self.enter_block(test_block, live)?;
                let (cond, _) = self.lower_rvalue(test)?;
                self.ctor.builder.branch_conditional(cond, body_block, merge, [])?;
            }
            _ => self.ctor.branch(body_block)?,
        }

        self.break_targets.push(BreakTarget::Loop {
            merge,
            continue_target: continue_block,
        });
        self.enter_block(body_block, live)?;
        if let Some(body) = body {
            self.lower_statement(body)?;
        }
        self.ctor.close_block(continue_block)?;
        self.break_targets.pop();

        self.enter_block(continue_block, live)?;
        if let Some(terminal) = terminal {
            self.lower_statement(terminal)?;
        }
        match test {
            Some(test) if !test_first => {
                let (cond, _) = self.lower_rvalue(test)?;
                self.ctor.builder.branch_conditional(cond, header, merge, [])?;
            }
            _ => self.ctor.branch(header)?,
        }
        self.enter_block(merge, live)
    }

    /// Switches lower to one block per segment. A segment that runs off its
    /// end branches into the next one, so fallthrough needs no extra code.
    pub(super) fn lower_switch(&mut self, selector: &Node, body: &[Node], hints: SelectionHints) -> Result<()> {
        let (sel, _) = self.lower_rvalue(selector)?;
        let live = self.ctor.is_reachable();
        let wide = selector.ty.bit_width() == 64;
        let segments = switch_segments(body);
        let blocks: Vec<Word> = segments.iter().map(|_| self.ctor.new_block()).collect();
        let merge = self.ctor.new_block();

        let mut default = merge;
        let mut targets = Vec::new();
        for (segment, &block) in segments.iter().zip(&blocks) {
            for label in &segment.labels {
                match *label {
                    BranchKind::Default => default = block,
                    BranchKind::Case(value) => {
                        let literal = if wide {
                            Operand::LiteralBit64(value as u64)
                        } else {
                            Operand::LiteralBit32(value as u32)
                        };
                        targets.push((literal, block));
                    }
                    _ => {}
                }
            }
        }
        self.ctor.builder.selection_merge(merge, selection_control(hints))?;
        self.ctor.builder.switch(sel, default, targets)?;

        self.break_targets.push(BreakTarget::Switch { merge });
        for (i, segment) in segments.iter().enumerate() {
            self.enter_block(blocks[i], live)?;
            for stmt in &segment.statements {
                self.lower_statement(stmt)?;
            }
            let next = blocks.get(i + 1).copied().unwrap_or(merge);
            self.ctor.close_block(next)?;
        }
        self.break_targets.pop();
        self.enter_block(merge, live)
    }

    pub(super) fn lower_branch(&mut self, kind: BranchKind, value: Option<&Node>, node: &Node) -> Result<()> {
        match kind {
            BranchKind::Break => {
                let Some(target) = self.break_targets.last().copied() else {
                    bail_internal_at!(node.span, "break outside of a loop or switch");
                };
                let merge = match target {
                    BreakTarget::Loop { merge, .. } | BreakTarget::Switch { merge } => merge,
                };
                self.exit_to(merge)
            }
            BranchKind::Continue => {
                let target = self.break_targets.iter().rev().find_map(|t| match t {
                    BreakTarget::Loop { continue_target, .. } => Some(*continue_target),
                    BreakTarget::Switch { .. } => None,
                });
                let Some(target) = target else {
                    bail_internal_at!(node.span, "continue outside of a loop");
                };
                self.exit_to(target)
            }
            BranchKind::Return => self.lower_return(value, node),
            BranchKind::Kill => {
                if self.ctor.version() >= SpirvVersion::V1_6 {
                    self.ctor.emit_terminator(Op::TerminateInvocation, vec![])
                } else {
                    self.ctor.emit_terminator(Op::Kill, vec![])
                }
            }
            BranchKind::TerminateInvocation => {
                self.ctor.add_incorporated_extension(TERMINATE_INVOCATION);
                self.ctor.emit_terminator(Op::TerminateInvocation, vec![])
            }
            BranchKind::Demote => {
                // not a terminator: the invocation keeps running as a helper
                self.ctor.apply(
                    Needs::cap(Capability::DemoteToHelperInvocation).with_ext(DEMOTE_TO_HELPER),
                );
                self.ctor.emit_void(Op::DemoteToHelperInvocation, vec![])
            }
            BranchKind::IgnoreIntersection => self.ctor.emit_terminator(Op::IgnoreIntersectionKHR, vec![]),
            BranchKind::TerminateRay => self.ctor.emit_terminator(Op::TerminateRayKHR, vec![]),
            BranchKind::Case(_) | BranchKind::Default => {
                bail_internal!("case label outside of a switch body")
            }
        }
    }

    fn exit_to(&mut self, target: Word) -> Result<()> {
        self.ctor.close_block(target)?;
        self.ctor.begin_unreachable_block()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::{branch, case, default_label, int};

    #[test]
    fn test_segments_share_consecutive_labels() {
        let body = vec![
            case(1),
            case(2),
            branch(BranchKind::Break),
            default_label(),
            int(3),
        ];
        let segments = switch_segments(&body);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].labels, vec![BranchKind::Case(1), BranchKind::Case(2)]);
        assert_eq!(segments[0].statements.len(), 1);
        assert_eq!(segments[1].labels, vec![BranchKind::Default]);
    }

    #[test]
    fn test_trailing_label_gets_empty_segment() {
        let body = vec![case(1), int(0), case(2)];
        let segments = switch_segments(&body);
        assert_eq!(segments.len(), 2);
        assert!(segments[1].statements.is_empty());
    }

    #[test]
    fn test_dependency_hints_need_1_1() {
        let hints = LoopHints {
            dependency_length: Some(4),
            ..Default::default()
        };
        let (control, params) = loop_control(hints, SpirvVersion::V1_0);
        assert_eq!(control, LoopControl::NONE);
        assert!(params.is_empty());
        let (control, params) = loop_control(hints, SpirvVersion::V1_3);
        assert_eq!(control, LoopControl::DEPENDENCY_LENGTH);
        assert_eq!(params, vec![Operand::LiteralBit32(4)]);
    }
}
