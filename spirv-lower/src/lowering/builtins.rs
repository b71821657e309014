//! Built-in function calls.
//!
//! `builtin_registry` says how each built-in lowers and which arguments are
//! addresses; this module turns that into instructions.

use super::{Lowered, LowerCtx};
use crate::access_chain::AccessChain;
use crate::ast::{
    BasicType, BuiltinOp, ConstantValue, ImageFormat, Node, SamplerDesc, SamplerDim, SamplerKind, SpirvVersion,
    Stage, Type,
};
use crate::builtin_registry::{self, BuiltinImpl, CustomImpl};
use crate::constructor::IrType;
use crate::error::Result;
use crate::{bail_internal, bail_internal_at};
use log::trace;
use rspirv::dr::Operand;
use rspirv::spirv::{Capability, GroupOperation, ImageOperands, MemorySemantics, Op, Scope, StorageClass, Word};

/// An address argument that had no storage of its own: the instruction
/// writes a scratch variable, copied back into the chain afterwards.
struct Writeback {
    chain: AccessChain,
    scratch: Word,
    ty: Word,
}

/// Built-ins that accept a scalar where the other operands are vectors.
fn splats_scalars(op: BuiltinOp) -> bool {
    use BuiltinOp as B;
    matches!(
        op,
        B::Min | B::Max | B::Clamp | B::Mix | B::Step | B::SmoothStep | B::Mod | B::Fma
    )
}

fn pick<T>(ty: &Type, float: T, signed: T, unsigned: T) -> T {
    match ty.basic {
        BasicType::Int(_) => signed,
        BasicType::Uint(_) => unsigned,
        _ => float,
    }
}

fn all_memory() -> MemorySemantics {
    MemorySemantics::ACQUIRE_RELEASE
        | MemorySemantics::UNIFORM_MEMORY
        | MemorySemantics::WORKGROUP_MEMORY
        | MemorySemantics::IMAGE_MEMORY
}

fn ids(values: &[Word]) -> Vec<Operand> {
    values.iter().copied().map(Operand::IdRef).collect()
}

impl<'a> LowerCtx<'a> {
    pub(super) fn lower_builtin(&mut self, op: BuiltinOp, args: &[Node], node: &Node) -> Result<Lowered> {
        trace!("builtin {:?}", op);
        self.ctor.apply(builtin_registry::requirements(op));
        let first = args.first().map(|a| &a.ty);
        match builtin_registry::implementation(op) {
            BuiltinImpl::GlslExt(instruction) => self.glsl_ext(op, instruction, args, node),
            BuiltinImpl::GlslExtTyped {
                float,
                signed,
                unsigned,
            } => {
                let instruction = first.map_or(float, |ty| pick(ty, float, signed, unsigned));
                self.glsl_ext(op, instruction, args, node)
            }
            BuiltinImpl::SpirvOp(opcode) => self.spirv_op(op, opcode, args, node),
            BuiltinImpl::SpirvOpTyped {
                float,
                signed,
                unsigned,
            } => {
                let opcode = first.map_or(float, |ty| pick(ty, float, signed, unsigned));
                if opcode == Op::Nop {
                    return self.missing(format!("{:?} on floating-point operands", op), node);
                }
                self.spirv_op(op, opcode, args, node)
            }
            BuiltinImpl::Custom(custom) => match custom {
                CustomImpl::Compare(binary) => {
                    let [a, b] = args else {
                        bail_internal_at!(node.span, "{:?} takes two arguments", op);
                    };
                    let (l, _) = self.lower_rvalue(a)?;
                    let (r, _) = self.lower_rvalue(b)?;
                    let id = self.arith(binary, (l, &a.ty), (r, &b.ty), &node.ty, node)?;
                    let ty = self.value_type(&node.ty)?;
                    Ok(Lowered::Value { id, ty })
                }
                CustomImpl::ExtendedArith(opcode) => self.extended_arith(op, opcode, args, node),
                CustomImpl::Image => self.lower_image(op, args, node),
                CustomImpl::ImageAtomic(opcode) => self.image_atomic(op, opcode, args, node),
                CustomImpl::Atomic(opcode) => self.atomic(op, opcode, args, node),
                CustomImpl::Barrier => self.barrier(op),
                CustomImpl::Primitive(opcode) => {
                    self.ctor.emit_void(opcode, vec![])?;
                    Ok(Lowered::Void)
                }
                CustomImpl::Subgroup => self.subgroup(op, args, node),
                CustomImpl::RayQuery(opcode) => self.ray_query(op, opcode, args, node),
                CustomImpl::RayTracing(opcode) => self.spirv_op(op, opcode, args, node),
                CustomImpl::Mesh(Op::EmitMeshTasksEXT) => {
                    let (values, _) = self.builtin_operands(op, args)?;
                    self.ctor.emit_terminator(Op::EmitMeshTasksEXT, ids(&values))?;
                    Ok(Lowered::Void)
                }
                CustomImpl::Mesh(opcode) => self.spirv_op(op, opcode, args, node),
            },
        }
    }

    fn builtin_result(&self, id: Word, ty: Word, node: &Node) -> Lowered {
        if node.ty.is_void() {
            Lowered::Void
        } else {
            Lowered::Value { id, ty }
        }
    }

    /// Lower arguments in order, as pointers where the built-in takes an
    /// address and as values everywhere else.
    fn builtin_operands(&mut self, op: BuiltinOp, args: &[Node]) -> Result<(Vec<Word>, Vec<Writeback>)> {
        let addresses = builtin_registry::lvalue_operands(op);
        let mut values = Vec::with_capacity(args.len());
        let mut writebacks = Vec::new();
        for (i, arg) in args.iter().enumerate() {
            if !addresses.contains(&i) {
                values.push(self.lower_rvalue(arg)?.0);
                continue;
            }
            let chain = self.lower_chain(arg)?;
            if chain.is_addressable() {
                values.push(chain.pointer(&mut self.ctor)?);
            } else {
                let ty = self.value_type(&arg.ty)?;
                let scratch = self.ctor.declare_variable("scratch", ty)?;
                values.push(scratch);
                writebacks.push(Writeback { chain, scratch, ty });
            }
        }
        Ok((values, writebacks))
    }

    fn write_back(&mut self, writebacks: Vec<Writeback>) -> Result<()> {
        for w in writebacks {
            let value = self.ctor.builder.load(w.ty, None, w.scratch, None, [])?;
            w.chain.store(&mut self.ctor, value, w.ty)?;
        }
        Ok(())
    }

    /// Widen scalar operands of component-wise built-ins to the result shape.
    fn splat_operands(&mut self, op: BuiltinOp, values: &mut [Word], args: &[Node], node: &Node) -> Result<()> {
        if !node.ty.is_vector() || !splats_scalars(op) {
            return Ok(());
        }
        for (value, arg) in values.iter_mut().zip(args) {
            if arg.ty.is_scalar() {
                *value = self.splat(*value, &arg.ty, &node.ty)?;
            }
        }
        Ok(())
    }

    fn glsl_ext(&mut self, op: BuiltinOp, instruction: u32, args: &[Node], node: &Node) -> Result<Lowered> {
        let result_ty = self.value_type(&node.ty)?;
        if op == BuiltinOp::Mix && args.get(2).map_or(false, |a| a.ty.is_bool()) {
            return self.select_mix(args, node, result_ty);
        }
        let (mut values, writebacks) = self.builtin_operands(op, args)?;
        self.splat_operands(op, &mut values, args, node)?;
        let set = self.ctor.glsl_std_450();
        let id = self
            .ctor
            .builder
            .ext_inst(result_ty, None, set, instruction, ids(&values))?;
        self.write_back(writebacks)?;
        Ok(self.builtin_result(id, result_ty, node))
    }

    /// `mix(x, y, a)` with a boolean selector picks `y` where `a` holds.
    fn select_mix(&mut self, args: &[Node], node: &Node, result_ty: Word) -> Result<Lowered> {
        let [x, y, a] = args else {
            bail_internal_at!(node.span, "mix takes three arguments");
        };
        let (x, _) = self.lower_rvalue(x)?;
        let (y, _) = self.lower_rvalue(y)?;
        let (mut selector, _) = self.lower_rvalue(a)?;
        if node.ty.is_vector() && a.ty.is_scalar() {
            selector = self.splat(selector, &a.ty, &node.ty)?;
        }
        let id = self.ctor.emit(Op::Select, result_ty, ids(&[selector, y, x]))?;
        Ok(Lowered::Value { id, ty: result_ty })
    }

    fn spirv_op(&mut self, op: BuiltinOp, opcode: Op, args: &[Node], node: &Node) -> Result<Lowered> {
        let (mut values, writebacks) = self.builtin_operands(op, args)?;
        self.splat_operands(op, &mut values, args, node)?;
        if node.ty.is_void() {
            self.ctor.emit_void(opcode, ids(&values))?;
            self.write_back(writebacks)?;
            return Ok(Lowered::Void);
        }
        let result_ty = self.value_type(&node.ty)?;
        let id = self.ctor.emit(opcode, result_ty, ids(&values))?;
        self.write_back(writebacks)?;
        Ok(Lowered::Value { id, ty: result_ty })
    }

    /// `{T, T}` struct produced by the extended arithmetic instructions.
    fn result_struct(&mut self, member: Word) -> Word {
        if let Some(&id) = self.result_structs.get(&member) {
            return id;
        }
        let id = self.ctor.type_struct(vec![member, member], "ResType");
        self.result_structs.insert(member, id);
        id
    }

    /// uaddCarry/usubBorrow return the sum and write the carry; the
    /// multiplies write `msb` then `lsb` and return nothing.
    fn extended_arith(&mut self, op: BuiltinOp, opcode: Op, args: &[Node], node: &Node) -> Result<Lowered> {
        let Some(first) = args.first() else {
            bail_internal_at!(node.span, "{:?} needs two operands", opcode);
        };
        let member_ty = self.value_type(&first.ty)?;
        let (values, writebacks) = self.builtin_operands(op, args)?;
        let [x, y, outputs @ ..] = values.as_slice() else {
            bail_internal_at!(node.span, "{:?} needs two operands", opcode);
        };
        let pair_ty = self.result_struct(member_ty);
        let pair = self.emit2(opcode, pair_ty, *x, *y)?;
        let low = self.ctor.builder.composite_extract(member_ty, None, pair, [0])?;
        let high = self.ctor.builder.composite_extract(member_ty, None, pair, [1])?;
        let result = match (opcode, outputs) {
            (Op::IAddCarry | Op::ISubBorrow, [carry]) => {
                self.ctor.builder.store(*carry, high, None, [])?;
                Lowered::Value {
                    id: low,
                    ty: member_ty,
                }
            }
            (Op::UMulExtended | Op::SMulExtended, [msb, lsb]) => {
                self.ctor.builder.store(*msb, high, None, [])?;
                self.ctor.builder.store(*lsb, low, None, [])?;
                Lowered::Void
            }
            _ => bail_internal_at!(node.span, "{:?} with {} output(s)", opcode, outputs.len()),
        };
        self.write_back(writebacks)?;
        Ok(result)
    }

    // --- Images ---

    fn image_of(&mut self, image: Word, image_ty: Word, desc: &SamplerDesc) -> Result<Word> {
        if desc.kind != SamplerKind::Combined {
            return Ok(image);
        }
        let Some(IrType::SampledImage { image: underlying }) = self.ctor.ir_type(image_ty).cloned() else {
            bail_internal!("combined sampler %{} has no image type", image_ty);
        };
        self.ctor.emit(Op::Image, underlying, vec![Operand::IdRef(image)])
    }

    fn lower_image(&mut self, op: BuiltinOp, args: &[Node], node: &Node) -> Result<Lowered> {
        let Some(image_arg) = args.first() else {
            bail_internal_at!(node.span, "{:?} without an image", op);
        };
        let BasicType::Sampler(desc) = image_arg.ty.basic else {
            bail_internal_at!(image_arg.span, "{:?} on a non-image operand", op);
        };
        let format = image_arg.ty.qualifier.layout.format;
        let (image, image_ty) = self.lower_rvalue(image_arg)?;
        let mut rest = Vec::with_capacity(args.len().saturating_sub(1));
        for arg in &args[1..] {
            rest.push(self.lower_rvalue(arg)?.0);
        }
        let result_ty = self.value_type(&node.ty)?;
        let coord_components = args.get(1).map_or(1, |a| a.ty.component_count());
        let cube_array_shadow = desc.shadow && desc.dim == SamplerDim::Cube && desc.arrayed;

        use BuiltinOp as B;
        let (opcode, operands) = match op {
            B::Texture | B::TextureLod | B::TextureGrad => {
                let Some(&coord) = rest.first() else {
                    bail_internal_at!(node.span, "{:?} without coordinates", op);
                };
                let mut operands = ids(&[image, coord]);
                let dref = if !desc.shadow {
                    None
                } else if cube_array_shadow && op == B::Texture {
                    rest.get(1).copied()
                } else {
                    let float = self.ctor.type_float(32);
                    Some(
                        self.ctor
                            .builder
                            .composite_extract(float, None, coord, [coord_components - 1])?,
                    )
                };
                if let Some(dref) = dref {
                    operands.push(Operand::IdRef(dref));
                }
                let implicit = op == B::Texture && self.stage() == Stage::Fragment;
                match op {
                    B::Texture if implicit => {
                        let bias = if cube_array_shadow { None } else { rest.get(1) };
                        if let Some(&bias) = bias {
                            operands.push(Operand::ImageOperands(ImageOperands::BIAS));
                            operands.push(Operand::IdRef(bias));
                        }
                    }
                    B::Texture => {
                        let zero = self.ctor.const_f32(0.0);
                        operands.push(Operand::ImageOperands(ImageOperands::LOD));
                        operands.push(Operand::IdRef(zero));
                    }
                    B::TextureLod => {
                        let Some(&lod) = rest.get(1) else {
                            bail_internal_at!(node.span, "textureLod without a level");
                        };
                        operands.push(Operand::ImageOperands(ImageOperands::LOD));
                        operands.push(Operand::IdRef(lod));
                    }
                    _ => {
                        let (Some(&dx), Some(&dy)) = (rest.get(1), rest.get(2)) else {
                            bail_internal_at!(node.span, "textureGrad without derivatives");
                        };
                        operands.push(Operand::ImageOperands(ImageOperands::GRAD));
                        operands.push(Operand::IdRef(dx));
                        operands.push(Operand::IdRef(dy));
                    }
                }
                let opcode = match (implicit, dref.is_some()) {
                    (true, false) => Op::ImageSampleImplicitLod,
                    (true, true) => Op::ImageSampleDrefImplicitLod,
                    (false, false) => Op::ImageSampleExplicitLod,
                    (false, true) => Op::ImageSampleDrefExplicitLod,
                };
                (opcode, operands)
            }
            B::TextureGather => {
                let Some(&coord) = rest.first() else {
                    bail_internal_at!(node.span, "textureGather without coordinates");
                };
                let extra = match rest.get(1) {
                    Some(&id) => id,
                    None if desc.shadow => bail_internal_at!(node.span, "shadow gather without a reference"),
                    None => self.ctor.const_i32(0),
                };
                let opcode = if desc.shadow { Op::ImageDrefGather } else { Op::ImageGather };
                (opcode, ids(&[image, coord, extra]))
            }
            B::TexelFetch => {
                let image = self.image_of(image, image_ty, &desc)?;
                let Some(&coord) = rest.first() else {
                    bail_internal_at!(node.span, "texelFetch without coordinates");
                };
                let mut operands = ids(&[image, coord]);
                if let Some(&extra) = rest.get(1) {
                    let mask = if desc.ms { ImageOperands::SAMPLE } else { ImageOperands::LOD };
                    operands.push(Operand::ImageOperands(mask));
                    operands.push(Operand::IdRef(extra));
                }
                (Op::ImageFetch, operands)
            }
            B::TextureSize | B::ImageSize => {
                let image = self.image_of(image, image_ty, &desc)?;
                let lodless = desc.ms
                    || desc.dim == SamplerDim::Buffer
                    || matches!(desc.kind, SamplerKind::Image | SamplerKind::Subpass);
                if lodless {
                    (Op::ImageQuerySize, ids(&[image]))
                } else {
                    let lod = match rest.first() {
                        Some(&lod) => lod,
                        None => self.ctor.const_i32(0),
                    };
                    (Op::ImageQuerySizeLod, ids(&[image, lod]))
                }
            }
            B::TextureQueryLevels => {
                let image = self.image_of(image, image_ty, &desc)?;
                (Op::ImageQueryLevels, ids(&[image]))
            }
            B::ImageLoad | B::SubpassLoad => {
                if op == B::ImageLoad && format == ImageFormat::Unknown {
                    self.ctor.add_capability(Capability::StorageImageReadWithoutFormat);
                }
                let (coord, sample) = if op == B::SubpassLoad {
                    let int = self.ctor.type_i32();
                    let ivec2 = self.ctor.type_vector(int, 2);
                    (self.ctor.const_splat(ivec2, 0), rest.first().copied())
                } else {
                    let Some(&coord) = rest.first() else {
                        bail_internal_at!(node.span, "imageLoad without coordinates");
                    };
                    (coord, rest.get(1).copied())
                };
                let mut operands = ids(&[image, coord]);
                if let Some(sample) = sample.filter(|_| desc.ms) {
                    operands.push(Operand::ImageOperands(ImageOperands::SAMPLE));
                    operands.push(Operand::IdRef(sample));
                }
                (Op::ImageRead, operands)
            }
            B::ImageStore => {
                if format == ImageFormat::Unknown {
                    self.ctor.add_capability(Capability::StorageImageWriteWithoutFormat);
                }
                let (Some(&coord), Some(&texel)) = (rest.first(), rest.last()) else {
                    bail_internal_at!(node.span, "imageStore without coordinates and texel");
                };
                let mut operands = ids(&[image, coord, texel]);
                if desc.ms && rest.len() == 3 {
                    operands.push(Operand::ImageOperands(ImageOperands::SAMPLE));
                    operands.push(Operand::IdRef(rest[1]));
                }
                self.ctor.emit_void(Op::ImageWrite, operands)?;
                return Ok(Lowered::Void);
            }
            _ => return self.missing(format!("image built-in {:?}", op), node),
        };
        let id = self.ctor.emit(opcode, result_ty, operands)?;
        Ok(Lowered::Value { id, ty: result_ty })
    }

    fn image_atomic(&mut self, op: BuiltinOp, opcode: Op, args: &[Node], node: &Node) -> Result<Lowered> {
        let (values, writebacks) = self.builtin_operands(op, args)?;
        let &[image, coord, data] = values.as_slice() else {
            bail_internal_at!(node.span, "image atomic takes image, coordinate and value");
        };
        // a texel pointer into a scratch copy would update the copy only
        if !writebacks.is_empty() {
            bail_internal_at!(node.span, "image atomic on an image without storage");
        }
        let texel_ty = self.value_type(&node.ty)?;
        let texel_ptr = self.ctor.type_pointer(StorageClass::Image, texel_ty);
        let sample = self.ctor.const_u32(0);
        let texel = self
            .ctor
            .emit(Op::ImageTexelPointer, texel_ptr, ids(&[image, coord, sample]))?;
        let scope = self.ctor.const_u32(Scope::Device as u32);
        let semantics = self.ctor.const_u32(0);
        let id = self.ctor.emit(
            opcode,
            texel_ty,
            vec![
                Operand::IdRef(texel),
                Operand::IdScope(scope),
                Operand::IdMemorySemantics(semantics),
                Operand::IdRef(data),
            ],
        )?;
        Ok(Lowered::Value { id, ty: texel_ty })
    }

    // --- Atomics and barriers ---

    fn atomic(&mut self, op: BuiltinOp, opcode: Op, args: &[Node], node: &Node) -> Result<Lowered> {
        let Some(target) = args.first() else {
            bail_internal_at!(node.span, "{:?} without a target", op);
        };
        let value_ty = target.ty.clone();
        if value_ty.is_float() && !matches!(opcode, Op::AtomicExchange | Op::AtomicLoad | Op::AtomicStore) {
            return self.missing(format!("floating-point {:?}", op), node);
        }
        let (values, writebacks) = self.builtin_operands(op, args)?;
        if !writebacks.is_empty() {
            bail_internal_at!(target.span, "atomic on a value without storage");
        }
        if value_ty.bit_width() == 64 {
            self.ctor.add_capability(Capability::Int64Atomics);
        }
        let opcode = match (opcode, value_ty.is_unsigned_int()) {
            (Op::AtomicSMin, true) => Op::AtomicUMin,
            (Op::AtomicSMax, true) => Op::AtomicUMax,
            (opcode, _) => opcode,
        };
        let ty = self.value_type(&value_ty)?;
        let scope = self.ctor.const_u32(Scope::Device as u32);
        let relaxed = self.ctor.const_u32(0);
        let mut operands = vec![
            Operand::IdRef(values[0]),
            Operand::IdScope(scope),
            Operand::IdMemorySemantics(relaxed),
        ];
        match opcode {
            Op::AtomicLoad => {}
            Op::AtomicStore => {
                operands.extend(ids(&values[1..]));
                self.ctor.emit_void(opcode, operands)?;
                return Ok(Lowered::Void);
            }
            Op::AtomicCompareExchange => {
                let (Some(&compare), Some(&data)) = (values.get(1), values.get(2)) else {
                    bail_internal_at!(node.span, "atomicCompSwap takes comparator and value");
                };
                operands.push(Operand::IdMemorySemantics(relaxed));
                operands.push(Operand::IdRef(data));
                operands.push(Operand::IdRef(compare));
            }
            _ => operands.extend(ids(&values[1..])),
        }
        let id = self.ctor.emit(opcode, ty, operands)?;
        Ok(Lowered::Value { id, ty })
    }

    fn barrier(&mut self, op: BuiltinOp) -> Result<Lowered> {
        use BuiltinOp as B;
        let (control, memory_scope, semantics) = match op {
            B::Barrier if self.stage() == Stage::TessControl => (true, Scope::Invocation, MemorySemantics::NONE),
            B::Barrier => (
                true,
                Scope::Workgroup,
                MemorySemantics::ACQUIRE_RELEASE | MemorySemantics::WORKGROUP_MEMORY,
            ),
            B::MemoryBarrier => (false, Scope::Device, all_memory()),
            B::MemoryBarrierBuffer => (
                false,
                Scope::Device,
                MemorySemantics::ACQUIRE_RELEASE | MemorySemantics::UNIFORM_MEMORY,
            ),
            B::MemoryBarrierShared => (
                false,
                Scope::Device,
                MemorySemantics::ACQUIRE_RELEASE | MemorySemantics::WORKGROUP_MEMORY,
            ),
            B::MemoryBarrierImage => (
                false,
                Scope::Device,
                MemorySemantics::ACQUIRE_RELEASE | MemorySemantics::IMAGE_MEMORY,
            ),
            _ => (false, Scope::Workgroup, all_memory()),
        };
        let memory_scope = self.ctor.const_u32(memory_scope as u32);
        let semantics = self.ctor.const_u32(semantics.bits());
        if control {
            let execution = self.ctor.const_u32(Scope::Workgroup as u32);
            self.ctor.emit_void(
                Op::ControlBarrier,
                vec![
                    Operand::IdScope(execution),
                    Operand::IdScope(memory_scope),
                    Operand::IdMemorySemantics(semantics),
                ],
            )?;
        } else {
            self.ctor.emit_void(
                Op::MemoryBarrier,
                vec![Operand::IdScope(memory_scope), Operand::IdMemorySemantics(semantics)],
            )?;
        }
        Ok(Lowered::Void)
    }

    fn subgroup(&mut self, op: BuiltinOp, args: &[Node], node: &Node) -> Result<Lowered> {
        if self.ctor.version() < SpirvVersion::V1_3 {
            return self.missing(format!("{:?} before SPIR-V 1.3", op), node);
        }
        let scope = self.ctor.const_u32(Scope::Subgroup as u32);
        use BuiltinOp as B;
        if op == B::SubgroupBarrier {
            let semantics = self.ctor.const_u32(all_memory().bits());
            self.ctor.emit_void(
                Op::ControlBarrier,
                vec![
                    Operand::IdScope(scope),
                    Operand::IdScope(scope),
                    Operand::IdMemorySemantics(semantics),
                ],
            )?;
            return Ok(Lowered::Void);
        }
        let (values, _) = self.builtin_operands(op, args)?;
        let result_ty = self.value_type(&node.ty)?;
        let mut operands = vec![Operand::IdScope(scope)];
        let opcode = match op {
            B::SubgroupElect => Op::GroupNonUniformElect,
            B::SubgroupAll => Op::GroupNonUniformAll,
            B::SubgroupAny => Op::GroupNonUniformAny,
            B::SubgroupBroadcastFirst => Op::GroupNonUniformBroadcastFirst,
            B::SubgroupAdd | B::SubgroupMin | B::SubgroupMax => {
                operands.push(Operand::GroupOperation(GroupOperation::Reduce));
                match op {
                    B::SubgroupAdd => pick(&node.ty, Op::GroupNonUniformFAdd, Op::GroupNonUniformIAdd, Op::GroupNonUniformIAdd),
                    B::SubgroupMin => pick(&node.ty, Op::GroupNonUniformFMin, Op::GroupNonUniformSMin, Op::GroupNonUniformUMin),
                    _ => pick(&node.ty, Op::GroupNonUniformFMax, Op::GroupNonUniformSMax, Op::GroupNonUniformUMax),
                }
            }
            _ => return self.missing(format!("subgroup built-in {:?}", op), node),
        };
        operands.extend(ids(&values));
        let id = self.ctor.emit(opcode, result_ty, operands)?;
        Ok(Lowered::Value { id, ty: result_ty })
    }

    fn ray_query(&mut self, op: BuiltinOp, opcode: Op, args: &[Node], node: &Node) -> Result<Lowered> {
        let (mut values, _) = self.builtin_operands(op, args)?;
        if matches!(opcode, Op::RayQueryGetIntersectionTypeKHR | Op::RayQueryGetIntersectionTKHR) {
            // candidate (0) or committed (1) must be a literal constant
            let committed = match args.get(1).and_then(Node::as_constant) {
                Some(ConstantValue::Bool(b)) => u32::from(*b),
                Some(other) => other.as_u32().unwrap_or(0),
                None => bail_internal_at!(node.span, "{:?} needs a constant intersection selector", op),
            };
            if let Some(selector) = values.get_mut(1) {
                *selector = self.ctor.const_u32(committed);
            }
        }
        if node.ty.is_void() {
            self.ctor.emit_void(opcode, ids(&values))?;
            return Ok(Lowered::Void);
        }
        let result_ty = self.value_type(&node.ty)?;
        let id = self.ctor.emit(opcode, result_ty, ids(&values))?;
        Ok(Lowered::Value { id, ty: result_ty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_by_scalar_kind() {
        assert_eq!(pick(&Type::float(32), 1, 2, 3), 1);
        assert_eq!(pick(&Type::int(32).vector(3), 1, 2, 3), 2);
        assert_eq!(pick(&Type::uint(16), 1, 2, 3), 3);
        assert_eq!(pick(&Type::bool(), 1, 2, 3), 1);
    }

    #[test]
    fn test_scalar_widening_builtins() {
        assert!(splats_scalars(BuiltinOp::Clamp));
        assert!(splats_scalars(BuiltinOp::Mod));
        assert!(!splats_scalars(BuiltinOp::Dot));
        assert!(!splats_scalars(BuiltinOp::Ldexp));
    }
}
