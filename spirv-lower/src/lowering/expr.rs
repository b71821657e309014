use super::{scalar_bits, LowerCtx, SymbolBinding};
use crate::access_chain::{AccessChain, CoherencyFlags};
use crate::ast::{
    ArraySize, BasicType, BinaryOp, ConstantValue, Node, NodeKind, Packing, SymbolId, Type, UnaryOp,
};
use crate::decorations::{self, DESCRIPTOR_INDEXING};
use crate::diags::format_binary_op;
use crate::error::{CompilerError, Result};
use crate::layout::Layout;
use crate::visitor;
use crate::{bail_internal, bail_internal_at};
use log::trace;
use rspirv::dr::Operand;
use rspirv::spirv::{Op, StorageClass, Word};

/// What lowering a node produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Lowered {
    /// An SSA value of IR type `ty`.
    Value { id: Word, ty: Word },
    /// Something addressable or indexable, not yet loaded.
    Chain(AccessChain),
    /// Statements and calls to void functions.
    Void,
}

/// Operand classes that pick between float, signed, unsigned and boolean
/// instruction variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Float,
    Signed,
    Unsigned,
    Bool,
    Other,
}

fn class_of(ty: &Type) -> Class {
    match ty.basic {
        BasicType::Float(_) => Class::Float,
        BasicType::Int(_) => Class::Signed,
        BasicType::Uint(_) => Class::Unsigned,
        BasicType::Bool => Class::Bool,
        _ => Class::Other,
    }
}

fn binary_opcode(op: BinaryOp, ty: &Type) -> Option<Op> {
    use BinaryOp::*;
    let class = class_of(ty);
    let opcode = match (op, class) {
        (Add, Class::Float) => Op::FAdd,
        (Sub, Class::Float) => Op::FSub,
        (Mul, Class::Float) => Op::FMul,
        (Div, Class::Float) => Op::FDiv,
        (Mod, Class::Float) => Op::FMod,
        (Equal, Class::Float) => Op::FOrdEqual,
        (NotEqual, Class::Float) => Op::FUnordNotEqual,
        (Less, Class::Float) => Op::FOrdLessThan,
        (Greater, Class::Float) => Op::FOrdGreaterThan,
        (LessEqual, Class::Float) => Op::FOrdLessThanEqual,
        (GreaterEqual, Class::Float) => Op::FOrdGreaterThanEqual,

        (Add, Class::Signed | Class::Unsigned) => Op::IAdd,
        (Sub, Class::Signed | Class::Unsigned) => Op::ISub,
        (Mul, Class::Signed | Class::Unsigned) => Op::IMul,
        (Div, Class::Signed) => Op::SDiv,
        (Div, Class::Unsigned) => Op::UDiv,
        (Mod, Class::Signed) => Op::SMod,
        (Mod, Class::Unsigned) => Op::UMod,
        (ShiftLeft, Class::Signed | Class::Unsigned) => Op::ShiftLeftLogical,
        (ShiftRight, Class::Signed) => Op::ShiftRightArithmetic,
        (ShiftRight, Class::Unsigned) => Op::ShiftRightLogical,
        (BitAnd, Class::Signed | Class::Unsigned) => Op::BitwiseAnd,
        (BitOr, Class::Signed | Class::Unsigned) => Op::BitwiseOr,
        (BitXor, Class::Signed | Class::Unsigned) => Op::BitwiseXor,
        (Equal, Class::Signed | Class::Unsigned) => Op::IEqual,
        (NotEqual, Class::Signed | Class::Unsigned) => Op::INotEqual,
        (Less, Class::Signed) => Op::SLessThan,
        (Greater, Class::Signed) => Op::SGreaterThan,
        (LessEqual, Class::Signed) => Op::SLessThanEqual,
        (GreaterEqual, Class::Signed) => Op::SGreaterThanEqual,
        (Less, Class::Unsigned) => Op::ULessThan,
        (Greater, Class::Unsigned) => Op::UGreaterThan,
        (LessEqual, Class::Unsigned) => Op::ULessThanEqual,
        (GreaterEqual, Class::Unsigned) => Op::UGreaterThanEqual,

        (Equal, Class::Bool) => Op::LogicalEqual,
        (NotEqual | LogicalXor | BitXor, Class::Bool) => Op::LogicalNotEqual,
        (BitAnd, Class::Bool) => Op::LogicalAnd,
        (BitOr, Class::Bool) => Op::LogicalOr,
        _ => return None,
    };
    Some(opcode)
}

fn is_comparison(op: BinaryOp) -> bool {
    use BinaryOp::*;
    matches!(op, Equal | NotEqual | Less | Greater | LessEqual | GreaterEqual)
}

impl<'a> LowerCtx<'a> {
    pub(super) fn lower_node(&mut self, node: &Node) -> Result<Lowered> {
        trace!("lower {:?}", std::mem::discriminant(&node.kind));
        match &node.kind {
            NodeKind::Symbol(id) => Ok(Lowered::Chain(self.symbol_chain(*id)?)),
            NodeKind::Constant(value) => {
                let ty = self.value_type(&node.ty)?;
                let id = self.constant(value, &node.ty)?;
                Ok(Lowered::Value { id, ty })
            }
            NodeKind::Binary { op, left, right } => self.lower_binary(*op, left, right, node),
            NodeKind::Unary { op, operand } => self.lower_unary(*op, operand, node),
            NodeKind::Swizzle { base, components } => self.lower_swizzle(base, components, node),
            NodeKind::Sequence(nodes) => {
                let mut last = Lowered::Void;
                for n in nodes {
                    last = self.lower_node(n)?;
                }
                Ok(last)
            }
            NodeKind::Call { function, args } => self.lower_call(*function, args, node),
            NodeKind::Construct(args) => self.lower_construct(args, node),
            NodeKind::Builtin { op, args } => self.lower_builtin(*op, args, node),
            NodeKind::Selection { .. } => self.lower_selection(node),
            NodeKind::Switch { selector, body, hints } => {
                self.lower_switch(selector, body, *hints)?;
                Ok(Lowered::Void)
            }
            NodeKind::Loop {
                test,
                body,
                terminal,
                test_first,
                hints,
            } => {
                self.lower_loop(test.as_deref(), body.as_deref(), terminal.as_deref(), *test_first, *hints)?;
                Ok(Lowered::Void)
            }
            NodeKind::Branch { kind, value } => {
                self.lower_branch(*kind, value.as_deref(), node)?;
                Ok(Lowered::Void)
            }
            NodeKind::Declare { symbol, init } => {
                self.lower_declare(*symbol, init.as_deref())?;
                Ok(Lowered::Void)
            }
        }
    }

    /// Lower a node for its effects only.
    pub(super) fn lower_statement(&mut self, node: &Node) -> Result<()> {
        self.lower_node(node).map(|_| ())
    }

    /// Lower a node to a value in its logical IR type.
    pub(super) fn lower_rvalue(&mut self, node: &Node) -> Result<(Word, Word)> {
        let logical = self.value_type(&node.ty)?;
        match self.lower_node(node)? {
            Lowered::Value { id, ty } if ty == logical => Ok((id, ty)),
            Lowered::Value { id, ty } => Ok((self.ctor.convert_representation(id, ty, logical)?, logical)),
            Lowered::Chain(chain) => Ok((chain.load(&mut self.ctor, logical)?, logical)),
            Lowered::Void => bail_internal_at!(node.span, "void expression used as a value"),
        }
    }

    /// Lower a node to an access chain; plain values become rvalue chains.
    pub(super) fn lower_chain(&mut self, node: &Node) -> Result<AccessChain> {
        match self.lower_node(node)? {
            Lowered::Chain(chain) => Ok(chain),
            Lowered::Value { id, ty } => Ok(AccessChain::rvalue(id, ty)),
            Lowered::Void => bail_internal_at!(node.span, "void expression used as an operand"),
        }
    }

    /// Record missing functionality and produce a null placeholder of `ty`.
    pub(super) fn placeholder(&mut self, message: impl Into<String>, ty: Word, node: &Node) -> Word {
        self.diags.missing_functionality(message, Some(node.span));
        self.ctor.const_null(ty)
    }

    pub(super) fn missing(&mut self, message: impl Into<String>, node: &Node) -> Result<Lowered> {
        if node.ty.is_void() {
            self.diags.missing_functionality(message, Some(node.span));
            return Ok(Lowered::Void);
        }
        let ty = self.value_type(&node.ty)?;
        let id = self.placeholder(message, ty, node);
        Ok(Lowered::Value { id, ty })
    }

    pub(super) fn current_block(&self) -> Result<Word> {
        self.ctor
            .current_block()
            .ok_or_else(|| CompilerError::Internal("no block is open".into(), None))
    }

    pub(super) fn emit2(&mut self, op: Op, ty: Word, a: Word, b: Word) -> Result<Word> {
        self.ctor.emit(op, ty, vec![Operand::IdRef(a), Operand::IdRef(b)])
    }

    // --- Constants ---

    pub(super) fn constant(&mut self, value: &ConstantValue, ty: &Type) -> Result<Word> {
        let ir = self.value_type(ty)?;
        match value {
            ConstantValue::Composite(parts) => {
                let types = self.constituent_types(ty, parts.len())?;
                let mut ids = Vec::with_capacity(parts.len());
                for (part, part_ty) in parts.iter().zip(&types) {
                    ids.push(self.constant(part, part_ty)?);
                }
                Ok(self.ctor.const_composite(ir, ids))
            }
            scalar if ty.is_scalar() => {
                let bits = scalar_bits(scalar, ty);
                Ok(if ty.is_bool() {
                    self.ctor.const_bool(bits != 0)
                } else {
                    self.ctor.const_bits(ir, bits)
                })
            }
            scalar => {
                // one scalar filling a vector or matrix diagonal-free shape
                let element = if ty.is_matrix() { ty.column_type() } else { ty.scalar_type() };
                let count = if ty.is_matrix() { ty.matrix_cols } else { ty.component_count() };
                let part = self.constant(scalar, &element)?;
                Ok(self.ctor.const_composite(ir, vec![part; count as usize]))
            }
        }
    }

    // --- Binary operators ---

    fn lower_binary(&mut self, op: BinaryOp, left: &Node, right: &Node, node: &Node) -> Result<Lowered> {
        match op {
            _ if op.is_assignment() => self.lower_assign(op, left, right, node),
            BinaryOp::Index | BinaryOp::IndexDirect => self.lower_index(left, right, node).map(Lowered::Chain),
            BinaryOp::IndexStruct => self.lower_member(left, right).map(Lowered::Chain),
            BinaryOp::LogicalAnd | BinaryOp::LogicalOr => self.lower_short_circuit(op, left, right),
            _ => {
                let (l, _) = self.lower_rvalue(left)?;
                let (r, _) = self.lower_rvalue(right)?;
                let id = self.arith(op, (l, &left.ty), (r, &right.ty), &node.ty, node)?;
                let ty = self.value_type(&node.ty)?;
                Ok(Lowered::Value { id, ty })
            }
        }
    }

    /// `left op= right`: the left chain is formed before the right side is
    /// evaluated; compound forms re-read the left side afterwards.
    fn lower_assign(&mut self, op: BinaryOp, left: &Node, right: &Node, node: &Node) -> Result<Lowered> {
        let chain = self.lower_chain(left)?;
        if chain.is_rvalue {
            bail_internal_at!(left.span, "assignment to a value that has no storage");
        }
        let (rhs, rhs_ty) = self.lower_rvalue(right)?;
        let (value, value_ty) = match op.compound_base() {
            Some(base) => {
                let logical = self.value_type(&left.ty)?;
                let current = chain.load(&mut self.ctor, logical)?;
                let id = self.arith(base, (current, &left.ty), (rhs, &right.ty), &left.ty, node)?;
                (id, logical)
            }
            None => (rhs, rhs_ty),
        };
        chain.store(&mut self.ctor, value, value_ty)?;
        Ok(Lowered::Value {
            id: value,
            ty: value_ty,
        })
    }

    fn lower_index(&mut self, base: &Node, index: &Node, node: &Node) -> Result<AccessChain> {
        let mut chain = self.lower_chain(base)?;
        let (index_id, _) = self.lower_rvalue(index)?;
        let non_uniform = index.ty.qualifier.non_uniform || node.ty.qualifier.non_uniform;
        let dynamic = index.as_constant().is_none();
        if base.ty.is_array() && dynamic {
            if let Some(cap) = decorations::array_indexing_capability(&base.ty.element_type(), non_uniform) {
                self.ctor.add_capability(cap);
                if non_uniform {
                    self.ctor.add_incorporated_extension(DESCRIPTOR_INDEXING);
                }
            }
        }
        let coherency = if non_uniform {
            CoherencyFlags::NON_UNIFORM
        } else {
            CoherencyFlags::empty()
        };
        let alignment = if chain.storage == StorageClass::PhysicalStorageBuffer && base.ty.is_array() {
            Layout::new(self.unit, Packing::Std430).array_stride(&base.ty, false)
        } else {
            0
        };
        chain.push_index(&mut self.ctor, index_id, coherency, alignment)?;
        Ok(chain)
    }

    fn lower_member(&mut self, base: &Node, index: &Node) -> Result<AccessChain> {
        let Some(source_index) = index.as_constant().and_then(ConstantValue::as_u32) else {
            bail_internal_at!(index.span, "member selector is not a constant");
        };
        let (mut chain, struct_id) = match base.ty.basic {
            BasicType::Reference(id) if !base.ty.is_array() => {
                let (ptr, _) = self.lower_rvalue(base)?;
                let pointee = self.reference_pointee(id)?;
                let chain = AccessChain::lvalue(ptr, pointee, StorageClass::PhysicalStorageBuffer)
                    .with_alignment(self.reference_alignment(id));
                (chain, id)
            }
            _ => {
                let Some(id) = base.ty.struct_id() else {
                    bail_internal_at!(base.span, "member access on a non-struct value");
                };
                (self.lower_chain(base)?, id)
            }
        };
        let ir_index = self.member_index(struct_id, source_index)?;
        let Some(member) = self
            .unit
            .struct_def(struct_id)
            .and_then(|def| def.members.get(source_index as usize))
        else {
            bail_internal!("struct {} has no member {}", struct_id.0, source_index);
        };
        let (_, needs) = decorations::builtin(member.ty.qualifier.builtin, self.stage(), false);
        self.ctor.apply(needs);

        let is_image = matches!(member.ty.basic, BasicType::Sampler(_));
        let coherency = CoherencyFlags::from_qualifier(&member.ty.qualifier, is_image);
        let alignment = if chain.storage == StorageClass::PhysicalStorageBuffer {
            self.member_offset(struct_id, source_index)
        } else {
            0
        };
        chain.push_member(&mut self.ctor, ir_index, coherency, alignment)?;
        Ok(chain)
    }

    fn lower_swizzle(&mut self, base: &Node, components: &[u32], node: &Node) -> Result<Lowered> {
        if base.ty.is_scalar() {
            // `f.xxx` replicates a scalar
            let (value, _) = self.lower_rvalue(base)?;
            if components.len() == 1 {
                let ty = self.value_type(&node.ty)?;
                return Ok(Lowered::Value { id: value, ty });
            }
            let ty = self.value_type(&node.ty)?;
            let id = self
                .ctor
                .builder
                .composite_construct(ty, None, vec![value; components.len()])?;
            return Ok(Lowered::Value { id, ty });
        }
        let mut chain = self.lower_chain(base)?;
        let vector_ty = chain.ty;
        chain.push_swizzle(components, vector_ty, CoherencyFlags::empty(), 0)?;
        Ok(Lowered::Chain(chain))
    }

    /// Short-circuit `&&` / `||`. A cheap side-effect-free right operand is
    /// evaluated unconditionally, anything else behind a branch and a phi.
    fn lower_short_circuit(&mut self, op: BinaryOp, left: &Node, right: &Node) -> Result<Lowered> {
        let bool_ty = self.ctor.type_bool();
        let (lhs, _) = self.lower_rvalue(left)?;
        if visitor::is_trivial(right) && !visitor::has_side_effects(right) {
            let (rhs, _) = self.lower_rvalue(right)?;
            let opcode = if op == BinaryOp::LogicalAnd {
                Op::LogicalAnd
            } else {
                Op::LogicalOr
            };
            let id = self.emit2(opcode, bool_ty, lhs, rhs)?;
            return Ok(Lowered::Value { id, ty: bool_ty });
        }

        let left_block = self.current_block()?;
        let rhs_block = self.ctor.new_block();
        let merge = self.ctor.new_block();
        if op == BinaryOp::LogicalAnd {
            self.ctor.branch_conditional(lhs, rhs_block, merge, merge)?;
        } else {
            self.ctor.branch_conditional(lhs, merge, rhs_block, merge)?;
        }
        self.ctor.begin_block(rhs_block)?;
        let (rhs, _) = self.lower_rvalue(right)?;
        let rhs_end = self.current_block()?;
        self.ctor.branch(merge)?;
        self.ctor.begin_block(merge)?;
        let id = self
            .ctor
            .builder
            .phi(bool_ty, None, [(lhs, left_block), (rhs, rhs_end)])?;
        Ok(Lowered::Value { id, ty: bool_ty })
    }

    /// Arithmetic, bitwise and comparison operators on lowered operands.
    pub(super) fn arith(
        &mut self,
        op: BinaryOp,
        left: (Word, &Type),
        right: (Word, &Type),
        result: &Type,
        node: &Node,
    ) -> Result<Word> {
        use BinaryOp::*;
        let result_ty = self.value_type(result)?;
        let (mut l, lt) = left;
        let (mut r, rt) = right;

        match op {
            VectorTimesScalar | MatrixTimesScalar => {
                let ((v, vt), (s, st)) = if lt.is_scalar() { (right, left) } else { (left, right) };
                if vt.is_float() {
                    let opcode = if op == VectorTimesScalar {
                        Op::VectorTimesScalar
                    } else {
                        Op::MatrixTimesScalar
                    };
                    return self.emit2(opcode, result_ty, v, s);
                }
                let splat = self.splat(s, st, vt)?;
                return self.emit2(Op::IMul, result_ty, v, splat);
            }
            VectorTimesMatrix => return self.emit2(Op::VectorTimesMatrix, result_ty, l, r),
            MatrixTimesVector => return self.emit2(Op::MatrixTimesVector, result_ty, l, r),
            MatrixTimesMatrix => return self.emit2(Op::MatrixTimesMatrix, result_ty, l, r),
            _ => {}
        }

        if lt.is_struct() || lt.is_array() || rt.is_struct() || rt.is_array() {
            let message = format!("'{}' on aggregate operands", format_binary_op(op));
            return Ok(self.placeholder(message, result_ty, node));
        }
        if lt.is_matrix() || rt.is_matrix() {
            return self.matrix_componentwise(op, (l, lt), (r, rt), result_ty, node);
        }

        let shift = matches!(op, ShiftLeft | ShiftRight);
        if lt.is_vector() && rt.is_scalar() {
            r = self.splat(r, rt, lt)?;
        } else if lt.is_scalar() && rt.is_vector() && !shift {
            l = self.splat(l, lt, rt)?;
        }
        let operand_ty = if rt.is_vector() && !lt.is_vector() { rt } else { lt };
        let Some(opcode) = binary_opcode(op, operand_ty) else {
            let message = format!("'{}' on {:?} operands", format_binary_op(op), operand_ty.basic);
            return Ok(self.placeholder(message, result_ty, node));
        };

        // == and != on vectors compare to a single bool
        if matches!(op, Equal | NotEqual) && operand_ty.is_vector() && result.is_scalar() {
            let bool_ty = self.ctor.type_bool();
            let bvec = self.ctor.type_vector(bool_ty, operand_ty.vector_size);
            let per_component = self.emit2(opcode, bvec, l, r)?;
            let reduce = if op == Equal { Op::All } else { Op::Any };
            return self.ctor.emit(reduce, result_ty, vec![Operand::IdRef(per_component)]);
        }
        if is_comparison(op) && class_of(operand_ty) == Class::Other {
            return Ok(self.placeholder("comparison of opaque values", result_ty, node));
        }
        self.emit2(opcode, result_ty, l, r)
    }

    /// Replicate a scalar across the component count of `like`.
    pub(super) fn splat(&mut self, scalar: Word, scalar_ty: &Type, like: &Type) -> Result<Word> {
        let count = if like.is_matrix() { like.matrix_rows } else { like.component_count() };
        let vector = scalar_ty.scalar_type().vector(count);
        let ty = self.value_type(&vector)?;
        Ok(self
            .ctor
            .builder
            .composite_construct(ty, None, vec![scalar; count as usize])?)
    }

    /// Matrices have no component-wise instructions; apply the operator
    /// column by column.
    fn matrix_componentwise(
        &mut self,
        op: BinaryOp,
        left: (Word, &Type),
        right: (Word, &Type),
        result_ty: Word,
        node: &Node,
    ) -> Result<Word> {
        let matrix = if left.1.is_matrix() { left.1 } else { right.1 };
        let opcode = match binary_opcode(op, matrix) {
            Some(opcode) if matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div) => opcode,
            _ => {
                let message = format!("'{}' on matrix operands", format_binary_op(op));
                return Ok(self.placeholder(message, result_ty, node));
            }
        };
        let column = matrix.column_type();
        let column_ty = self.value_type(&column)?;
        let mut columns = Vec::with_capacity(matrix.matrix_cols as usize);
        for c in 0..matrix.matrix_cols {
            let l = self.matrix_operand_column(left, c, &column, column_ty)?;
            let r = self.matrix_operand_column(right, c, &column, column_ty)?;
            columns.push(self.emit2(opcode, column_ty, l, r)?);
        }
        Ok(self.ctor.builder.composite_construct(result_ty, None, columns)?)
    }

    fn matrix_operand_column(&mut self, operand: (Word, &Type), c: u32, column: &Type, column_ty: Word) -> Result<Word> {
        let (value, ty) = operand;
        if ty.is_matrix() {
            Ok(self.ctor.builder.composite_extract(column_ty, None, value, [c])?)
        } else {
            self.splat(value, ty, column)
        }
    }

    // --- Unary operators ---

    fn lower_unary(&mut self, op: UnaryOp, operand: &Node, node: &Node) -> Result<Lowered> {
        match op {
            UnaryOp::PreIncrement | UnaryOp::PreDecrement | UnaryOp::PostIncrement | UnaryOp::PostDecrement => {
                if operand.ty.is_matrix() {
                    return self.missing("increment of a matrix", node);
                }
                let chain = self.lower_chain(operand)?;
                let ty = self.value_type(&operand.ty)?;
                let old = chain.load(&mut self.ctor, ty)?;
                let one = self.ctor.const_splat(ty, 1);
                let increment = matches!(op, UnaryOp::PreIncrement | UnaryOp::PostIncrement);
                let opcode = match (operand.ty.is_float(), increment) {
                    (true, true) => Op::FAdd,
                    (true, false) => Op::FSub,
                    (false, true) => Op::IAdd,
                    (false, false) => Op::ISub,
                };
                let new = self.emit2(opcode, ty, old, one)?;
                chain.store(&mut self.ctor, new, ty)?;
                let id = if matches!(op, UnaryOp::PreIncrement | UnaryOp::PreDecrement) {
                    new
                } else {
                    old
                };
                Ok(Lowered::Value { id, ty })
            }
            UnaryOp::ArrayLength => self.lower_array_length(operand, node),
            UnaryOp::Convert => {
                let (value, _) = self.lower_rvalue(operand)?;
                let id = self.convert(value, &operand.ty, &node.ty, node)?;
                let ty = self.value_type(&node.ty)?;
                Ok(Lowered::Value { id, ty })
            }
            UnaryOp::Negate | UnaryOp::LogicalNot | UnaryOp::BitwiseNot => {
                let (value, ty) = self.lower_rvalue(operand)?;
                let opcode = match (op, class_of(&operand.ty)) {
                    (UnaryOp::Negate, Class::Float) => Op::FNegate,
                    (UnaryOp::Negate, Class::Signed | Class::Unsigned) => Op::SNegate,
                    (UnaryOp::LogicalNot, Class::Bool) => Op::LogicalNot,
                    (UnaryOp::BitwiseNot, Class::Signed | Class::Unsigned) => Op::Not,
                    _ => return self.missing(format!("unary {:?} on {:?}", op, operand.ty.basic), node),
                };
                if operand.ty.is_matrix() {
                    let column = operand.ty.column_type();
                    let column_ty = self.value_type(&column)?;
                    let mut columns = Vec::with_capacity(operand.ty.matrix_cols as usize);
                    for c in 0..operand.ty.matrix_cols {
                        let col = self.ctor.builder.composite_extract(column_ty, None, value, [c])?;
                        columns.push(self.ctor.emit(opcode, column_ty, vec![Operand::IdRef(col)])?);
                    }
                    let id = self.ctor.builder.composite_construct(ty, None, columns)?;
                    return Ok(Lowered::Value { id, ty });
                }
                let id = self.ctor.emit(opcode, ty, vec![Operand::IdRef(value)])?;
                Ok(Lowered::Value { id, ty })
            }
        }
    }

    /// `.length()`: a literal for sized arrays, `OpArrayLength` on the
    /// enclosing block for the runtime-sized last member.
    fn lower_array_length(&mut self, operand: &Node, node: &Node) -> Result<Lowered> {
        let result_ty = self.value_type(&node.ty)?;
        if let Some(ArraySize::Sized(n)) = operand.ty.arrays.first() {
            let id = self.ctor.const_bits(result_ty, u64::from(*n));
            return Ok(Lowered::Value { id, ty: result_ty });
        }
        let NodeKind::Binary {
            op: BinaryOp::IndexStruct,
            left,
            right,
        } = &operand.kind
        else {
            return self.missing("length() of an array that is not a block member", node);
        };
        let Some(struct_id) = left.ty.struct_id() else {
            return self.missing("length() through a buffer reference", node);
        };
        let Some(source_index) = right.as_constant().and_then(ConstantValue::as_u32) else {
            bail_internal_at!(right.span, "member selector is not a constant");
        };
        let block = self.lower_chain(left)?;
        let member = self.member_index(struct_id, source_index)?;
        let ptr = block.pointer(&mut self.ctor)?;
        let uint = self.ctor.type_u32();
        let mut id = self.ctor.emit(
            Op::ArrayLength,
            uint,
            vec![Operand::IdRef(ptr), Operand::LiteralBit32(member)],
        )?;
        if result_ty != uint {
            id = self.ctor.emit(Op::Bitcast, result_ty, vec![Operand::IdRef(id)])?;
        }
        Ok(Lowered::Value { id, ty: result_ty })
    }

    /// Numeric conversion between scalar or vector types of equal shape.
    pub(super) fn convert(&mut self, value: Word, from: &Type, to: &Type, node: &Node) -> Result<Word> {
        let from_ty = self.value_type(from)?;
        let to_ty = self.value_type(to)?;
        if from_ty == to_ty {
            return Ok(value);
        }
        if from.is_matrix() || to.is_matrix() || from.is_array() || to.is_array() || from.is_struct() {
            return Ok(self.placeholder("conversion between composite types", to_ty, node));
        }
        use BasicType::*;
        let opcode = match (from.basic, to.basic) {
            (Bool, Float(_) | Int(_) | Uint(_)) => {
                let one = self.one(to)?;
                let zero = self.zero(to)?;
                return self.ctor.emit(
                    Op::Select,
                    to_ty,
                    vec![Operand::IdRef(value), Operand::IdRef(one), Operand::IdRef(zero)],
                );
            }
            (Int(_) | Uint(_), Bool) => {
                let zero = self.zero(from)?;
                return self.emit2(Op::INotEqual, to_ty, value, zero);
            }
            (Float(_), Bool) => {
                let zero = self.zero(from)?;
                return self.emit2(Op::FUnordNotEqual, to_ty, value, zero);
            }
            (Float(_), Float(_)) => Op::FConvert,
            (Float(_), Int(_)) => Op::ConvertFToS,
            (Float(_), Uint(_)) => Op::ConvertFToU,
            (Int(_), Float(_)) => Op::ConvertSToF,
            (Uint(_), Float(_)) => Op::ConvertUToF,
            (Int(_), Int(_)) => Op::SConvert,
            (Uint(_), Uint(_)) => Op::UConvert,
            (Int(a), Uint(b)) | (Uint(a), Int(b)) if a == b => Op::Bitcast,
            (Int(_), Uint(width)) | (Uint(_), Int(width)) => {
                // change width in the source signedness, then reinterpret
                let mid = to.with_basic(if from.is_signed_int() { Int(width) } else { Uint(width) });
                let mid_ty = self.value_type(&mid)?;
                let widen = if from.is_signed_int() { Op::SConvert } else { Op::UConvert };
                let resized = self.ctor.emit(widen, mid_ty, vec![Operand::IdRef(value)])?;
                return self.ctor.emit(Op::Bitcast, to_ty, vec![Operand::IdRef(resized)]);
            }
            _ => {
                let message = format!("conversion from {:?} to {:?}", from.basic, to.basic);
                return Ok(self.placeholder(message, to_ty, node));
            }
        };
        self.ctor.emit(opcode, to_ty, vec![Operand::IdRef(value)])
    }

    fn one(&mut self, ty: &Type) -> Result<Word> {
        let ir = self.value_type(ty)?;
        Ok(self.ctor.const_splat(ir, 1))
    }

    fn zero(&mut self, ty: &Type) -> Result<Word> {
        let ir = self.value_type(ty)?;
        Ok(self.ctor.const_splat(ir, 0))
    }

    // --- Constructors ---

    fn lower_construct(&mut self, args: &[Node], node: &Node) -> Result<Lowered> {
        let ty = &node.ty;
        let ir = self.value_type(ty)?;
        let id = if ty.is_opaque() && !ty.is_array() {
            // sampler2D(texture, sampler)
            let [image, sampler] = args else {
                return self.missing("constructor of an opaque type", node);
            };
            let (image, _) = self.lower_rvalue(image)?;
            let (sampler, _) = self.lower_rvalue(sampler)?;
            self.emit2(Op::SampledImage, ir, image, sampler)?
        } else if ty.is_array() || ty.is_struct() {
            let member_types = self.constituent_types(ty, args.len())?;
            let mut parts = Vec::with_capacity(args.len());
            for (arg, member_ty) in args.iter().zip(&member_types) {
                let (value, value_ty) = self.lower_rvalue(arg)?;
                let want = self.value_type(member_ty)?;
                parts.push(if value_ty == want {
                    value
                } else {
                    self.ctor.convert_representation(value, value_ty, want)?
                });
            }
            self.ctor.builder.composite_construct(ir, None, parts)?
        } else if ty.is_matrix() {
            self.construct_matrix(args, node, ir)?
        } else if ty.is_vector() {
            self.construct_vector(args, node, ir)?
        } else {
            let Some(arg) = args.first() else {
                bail_internal_at!(node.span, "scalar constructor without arguments");
            };
            let first = self.scalar_components(arg, 1)?;
            let Some(&value) = first.first() else {
                bail_internal_at!(arg.span, "constructor argument has no components");
            };
            self.convert(value, &arg.ty.scalar_type(), ty, node)?
        };
        Ok(Lowered::Value { id, ty: ir })
    }

    /// Lower an argument and split it into at most `limit` scalars.
    fn scalar_components(&mut self, arg: &Node, limit: u32) -> Result<Vec<Word>> {
        let (value, _) = self.lower_rvalue(arg)?;
        let scalar_ty = self.value_type(&arg.ty.scalar_type())?;
        let mut out = Vec::new();
        if arg.ty.is_scalar() {
            out.push(value);
        } else if arg.ty.is_matrix() {
            'columns: for c in 0..arg.ty.matrix_cols {
                for r in 0..arg.ty.matrix_rows {
                    if out.len() as u32 >= limit {
                        break 'columns;
                    }
                    out.push(self.ctor.builder.composite_extract(scalar_ty, None, value, [c, r])?);
                }
            }
        } else if arg.ty.is_vector() {
            for i in 0..arg.ty.vector_size.min(limit) {
                out.push(self.ctor.builder.composite_extract(scalar_ty, None, value, [i])?);
            }
        } else {
            bail_internal_at!(arg.span, "constructor argument is not numeric");
        }
        Ok(out)
    }

    /// Scalars of all arguments in order, converted to `scalar`.
    fn flatten_arguments(&mut self, args: &[Node], scalar: &Type, count: u32, node: &Node) -> Result<Vec<Word>> {
        let mut out = Vec::with_capacity(count as usize);
        for arg in args {
            let remaining = count.saturating_sub(out.len() as u32).max(1);
            let components = self.scalar_components(arg, remaining)?;
            let from = arg.ty.scalar_type();
            for c in components {
                if out.len() as u32 == count {
                    break;
                }
                out.push(self.convert(c, &from, scalar, node)?);
            }
        }
        if (out.len() as u32) < count {
            bail_internal_at!(node.span, "constructor has {} of {} components", out.len(), count);
        }
        Ok(out)
    }

    fn construct_vector(&mut self, args: &[Node], node: &Node, ir: Word) -> Result<Word> {
        let ty = &node.ty;
        let count = ty.vector_size;
        let scalar = ty.scalar_type();
        if let [arg] = args {
            if arg.ty.is_scalar() {
                let (value, _) = self.lower_rvalue(arg)?;
                let value = self.convert(value, &arg.ty, &scalar, node)?;
                return Ok(self
                    .ctor
                    .builder
                    .composite_construct(ir, None, vec![value; count as usize])?);
            }
            if arg.ty.is_vector() && arg.ty.vector_size == count {
                let (value, _) = self.lower_rvalue(arg)?;
                return self.convert(value, &arg.ty, ty, node);
            }
        }
        let direct = args
            .iter()
            .all(|a| (a.ty.is_scalar() || a.ty.is_vector()) && a.ty.basic == ty.basic)
            && args.iter().map(|a| a.ty.component_count()).sum::<u32>() == count;
        let parts = if direct {
            let mut parts = Vec::with_capacity(args.len());
            for arg in args {
                parts.push(self.lower_rvalue(arg)?.0);
            }
            parts
        } else {
            self.flatten_arguments(args, &scalar, count, node)?
        };
        Ok(self.ctor.builder.composite_construct(ir, None, parts)?)
    }

    fn construct_matrix(&mut self, args: &[Node], node: &Node, ir: Word) -> Result<Word> {
        let ty = &node.ty;
        let (cols, rows) = (ty.matrix_cols, ty.matrix_rows);
        let scalar = ty.scalar_type();
        let column_ty = self.value_type(&ty.column_type())?;
        let scalar_ty = self.value_type(&scalar)?;
        let zero = self.ctor.const_splat(scalar_ty, 0);
        let one = self.ctor.const_splat(scalar_ty, 1);

        let mut cells: Vec<Vec<Word>> = Vec::with_capacity(cols as usize);
        match args {
            [arg] if arg.ty.is_scalar() => {
                // diagonal
                let (value, _) = self.lower_rvalue(arg)?;
                let value = self.convert(value, &arg.ty, &scalar, node)?;
                for c in 0..cols {
                    cells.push((0..rows).map(|r| if r == c { value } else { zero }).collect());
                }
            }
            [arg] if arg.ty.is_matrix() => {
                // resize, filling from the identity
                let (value, _) = self.lower_rvalue(arg)?;
                let source_scalar = arg.ty.scalar_type();
                let source_scalar_ty = self.value_type(&source_scalar)?;
                for c in 0..cols {
                    let mut column = Vec::with_capacity(rows as usize);
                    for r in 0..rows {
                        let cell = if c < arg.ty.matrix_cols && r < arg.ty.matrix_rows {
                            let cell = self
                                .ctor
                                .builder
                                .composite_extract(source_scalar_ty, None, value, [c, r])?;
                            self.convert(cell, &source_scalar, &scalar, node)?
                        } else if r == c {
                            one
                        } else {
                            zero
                        };
                        column.push(cell);
                    }
                    cells.push(column);
                }
            }
            _ => {
                let flat = self.flatten_arguments(args, &scalar, cols * rows, node)?;
                for chunk in flat.chunks(rows as usize) {
                    cells.push(chunk.to_vec());
                }
            }
        }
        let mut columns = Vec::with_capacity(cols as usize);
        for column in cells {
            columns.push(self.ctor.builder.composite_construct(column_ty, None, column)?);
        }
        Ok(self.ctor.builder.composite_construct(ir, None, columns)?)
    }

    // --- Declarations ---

    fn lower_declare(&mut self, symbol: SymbolId, init: Option<&Node>) -> Result<()> {
        let decl = self.symbol_decl(symbol)?;
        let q = &decl.ty.qualifier;
        if q.spec_constant || (q.storage == crate::ast::StorageQualifier::Const && decl.value.is_some()) {
            self.symbol_binding(symbol)?;
            return Ok(());
        }
        let binding = self.symbol_binding(symbol)?;
        let Some(init) = init else {
            return Ok(());
        };
        let (value, value_ty) = self.lower_rvalue(init)?;
        match binding {
            SymbolBinding::Variable { ptr, pointee, storage } => {
                AccessChain::lvalue(ptr, pointee, storage).store(&mut self.ctor, value, value_ty)
            }
            SymbolBinding::Value { .. } => {
                bail_internal_at!(init.span, "initializer for '{}' which has no storage", decl.name)
            }
        }
    }
}
