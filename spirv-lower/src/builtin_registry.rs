// Centralized builtin function table
// Says how each builtin lowers, which arguments are passed by address,
// and what the module must declare to use it

use crate::ast::{BinaryOp, BuiltinOp};
use crate::decorations::{Needs, MESH_SHADER, RAY_QUERY, RAY_TRACING};
use rspirv::spirv::{Capability, Op};

/// Implementation strategy for a builtin function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinImpl {
    /// GLSL.std.450 extended instruction
    GlslExt(u32),

    /// GLSL.std.450 instruction chosen by the scalar kind of the first argument
    GlslExtTyped { float: u32, signed: u32, unsigned: u32 },

    /// Core SPIR-V instruction taking the arguments as operands
    SpirvOp(Op),

    /// Core SPIR-V instruction chosen by the scalar kind of the first argument
    SpirvOpTyped { float: Op, signed: Op, unsigned: Op },

    /// Needs dedicated lowering
    Custom(CustomImpl),
}

/// Families of builtins with bespoke lowering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomImpl {
    /// Component-wise comparison, lowered like the binary operator
    Compare(BinaryOp),
    /// Two-result integer arithmetic returning a struct
    ExtendedArith(Op),
    /// Sampling, fetches, queries and storage image access
    Image,
    /// Atomic on a texel pointer
    ImageAtomic(Op),
    /// Atomic on memory; signed/unsigned variants picked by type
    Atomic(Op),
    Barrier,
    /// Geometry stream output
    Primitive(Op),
    Subgroup,
    RayQuery(Op),
    RayTracing(Op),
    Mesh(Op),
}

pub fn implementation(op: BuiltinOp) -> BuiltinImpl {
    use BuiltinImpl::*;
    use BuiltinOp as B;
    match op {
        B::Radians => GlslExt(11),
        B::Degrees => GlslExt(12),
        B::Sin => GlslExt(13),
        B::Cos => GlslExt(14),
        B::Tan => GlslExt(15),
        B::Asin => GlslExt(16),
        B::Acos => GlslExt(17),
        B::Atan => GlslExt(18),
        B::Atan2 => GlslExt(25),
        B::Sinh => GlslExt(19),
        B::Cosh => GlslExt(20),
        B::Tanh => GlslExt(21),

        B::Pow => GlslExt(26),
        B::Exp => GlslExt(27),
        B::Log => GlslExt(28),
        B::Exp2 => GlslExt(29),
        B::Log2 => GlslExt(30),
        B::Sqrt => GlslExt(31),
        B::InverseSqrt => GlslExt(32),

        B::Abs => GlslExtTyped { float: 4, signed: 5, unsigned: 5 },
        B::Sign => GlslExtTyped { float: 6, signed: 7, unsigned: 7 },
        B::Floor => GlslExt(8),
        B::Trunc => GlslExt(3),
        B::Round => GlslExt(1),
        B::RoundEven => GlslExt(2),
        B::Ceil => GlslExt(9),
        B::Fract => GlslExt(10),
        B::Mod => SpirvOpTyped {
            float: Op::FMod,
            signed: Op::SMod,
            unsigned: Op::UMod,
        },
        B::Modf => GlslExt(35),
        B::Min => GlslExtTyped { float: 37, signed: 39, unsigned: 38 },
        B::Max => GlslExtTyped { float: 40, signed: 42, unsigned: 41 },
        B::Clamp => GlslExtTyped { float: 43, signed: 45, unsigned: 44 },
        B::Mix => GlslExt(46),
        B::Step => GlslExt(48),
        B::SmoothStep => GlslExt(49),
        B::Fma => GlslExt(50),
        B::Frexp => GlslExt(51),
        B::Ldexp => GlslExt(53),
        B::IsNan => SpirvOp(Op::IsNan),
        B::IsInf => SpirvOp(Op::IsInf),
        B::FloatBitsToInt | B::FloatBitsToUint | B::IntBitsToFloat | B::UintBitsToFloat => SpirvOp(Op::Bitcast),

        B::PackHalf2x16 => GlslExt(58),
        B::UnpackHalf2x16 => GlslExt(62),
        B::PackUnorm4x8 => GlslExt(55),
        B::UnpackUnorm4x8 => GlslExt(64),

        B::Length => GlslExt(66),
        B::Distance => GlslExt(67),
        B::Dot => SpirvOp(Op::Dot),
        B::Cross => GlslExt(68),
        B::Normalize => GlslExt(69),
        B::FaceForward => GlslExt(70),
        B::Reflect => GlslExt(71),
        B::Refract => GlslExt(72),

        B::OuterProduct => SpirvOp(Op::OuterProduct),
        B::Transpose => SpirvOp(Op::Transpose),
        B::Determinant => GlslExt(33),
        B::Inverse => GlslExt(34),

        B::LessThan => Custom(CustomImpl::Compare(BinaryOp::Less)),
        B::LessThanEqual => Custom(CustomImpl::Compare(BinaryOp::LessEqual)),
        B::GreaterThan => Custom(CustomImpl::Compare(BinaryOp::Greater)),
        B::GreaterThanEqual => Custom(CustomImpl::Compare(BinaryOp::GreaterEqual)),
        B::VectorEqual => Custom(CustomImpl::Compare(BinaryOp::Equal)),
        B::VectorNotEqual => Custom(CustomImpl::Compare(BinaryOp::NotEqual)),
        B::Any => SpirvOp(Op::Any),
        B::All => SpirvOp(Op::All),
        B::Not => SpirvOp(Op::LogicalNot),

        B::UaddCarry => Custom(CustomImpl::ExtendedArith(Op::IAddCarry)),
        B::UsubBorrow => Custom(CustomImpl::ExtendedArith(Op::ISubBorrow)),
        B::UmulExtended => Custom(CustomImpl::ExtendedArith(Op::UMulExtended)),
        B::ImulExtended => Custom(CustomImpl::ExtendedArith(Op::SMulExtended)),
        B::BitfieldExtract => SpirvOpTyped {
            float: Op::Nop,
            signed: Op::BitFieldSExtract,
            unsigned: Op::BitFieldUExtract,
        },
        B::BitfieldInsert => SpirvOp(Op::BitFieldInsert),
        B::BitfieldReverse => SpirvOp(Op::BitReverse),
        B::BitCount => SpirvOp(Op::BitCount),
        B::FindLsb => GlslExt(73),
        B::FindMsb => GlslExtTyped { float: 74, signed: 74, unsigned: 75 },

        B::DPdx => SpirvOp(Op::DPdx),
        B::DPdy => SpirvOp(Op::DPdy),
        B::Fwidth => SpirvOp(Op::Fwidth),
        B::InterpolateAtCentroid => GlslExt(76),
        B::InterpolateAtSample => GlslExt(77),
        B::InterpolateAtOffset => GlslExt(78),

        B::Texture
        | B::TextureLod
        | B::TextureGrad
        | B::TextureGather
        | B::TexelFetch
        | B::TextureSize
        | B::TextureQueryLevels
        | B::ImageLoad
        | B::ImageStore
        | B::ImageSize
        | B::SubpassLoad => Custom(CustomImpl::Image),
        B::ImageAtomicAdd => Custom(CustomImpl::ImageAtomic(Op::AtomicIAdd)),
        B::ImageAtomicExchange => Custom(CustomImpl::ImageAtomic(Op::AtomicExchange)),

        B::AtomicAdd => Custom(CustomImpl::Atomic(Op::AtomicIAdd)),
        B::AtomicMin => Custom(CustomImpl::Atomic(Op::AtomicSMin)),
        B::AtomicMax => Custom(CustomImpl::Atomic(Op::AtomicSMax)),
        B::AtomicAnd => Custom(CustomImpl::Atomic(Op::AtomicAnd)),
        B::AtomicOr => Custom(CustomImpl::Atomic(Op::AtomicOr)),
        B::AtomicXor => Custom(CustomImpl::Atomic(Op::AtomicXor)),
        B::AtomicExchange => Custom(CustomImpl::Atomic(Op::AtomicExchange)),
        B::AtomicCompSwap => Custom(CustomImpl::Atomic(Op::AtomicCompareExchange)),
        B::AtomicLoad => Custom(CustomImpl::Atomic(Op::AtomicLoad)),
        B::AtomicStore => Custom(CustomImpl::Atomic(Op::AtomicStore)),

        B::Barrier
        | B::MemoryBarrier
        | B::MemoryBarrierBuffer
        | B::MemoryBarrierShared
        | B::MemoryBarrierImage
        | B::GroupMemoryBarrier => Custom(CustomImpl::Barrier),

        B::EmitVertex => Custom(CustomImpl::Primitive(Op::EmitVertex)),
        B::EndPrimitive => Custom(CustomImpl::Primitive(Op::EndPrimitive)),

        B::SubgroupBarrier
        | B::SubgroupElect
        | B::SubgroupAll
        | B::SubgroupAny
        | B::SubgroupBroadcastFirst
        | B::SubgroupAdd
        | B::SubgroupMin
        | B::SubgroupMax => Custom(CustomImpl::Subgroup),

        B::RayQueryInitialize => Custom(CustomImpl::RayQuery(Op::RayQueryInitializeKHR)),
        B::RayQueryProceed => Custom(CustomImpl::RayQuery(Op::RayQueryProceedKHR)),
        B::RayQueryTerminate => Custom(CustomImpl::RayQuery(Op::RayQueryTerminateKHR)),
        B::RayQueryGetIntersectionType => Custom(CustomImpl::RayQuery(Op::RayQueryGetIntersectionTypeKHR)),
        B::RayQueryGetIntersectionT => Custom(CustomImpl::RayQuery(Op::RayQueryGetIntersectionTKHR)),

        B::TraceRay => Custom(CustomImpl::RayTracing(Op::TraceRayKHR)),
        B::ExecuteCallable => Custom(CustomImpl::RayTracing(Op::ExecuteCallableKHR)),
        B::ReportIntersection => Custom(CustomImpl::RayTracing(Op::ReportIntersectionKHR)),

        B::SetMeshOutputs => Custom(CustomImpl::Mesh(Op::SetMeshOutputsEXT)),
        B::EmitMeshTasks => Custom(CustomImpl::Mesh(Op::EmitMeshTasksEXT)),
    }
}

/// Argument positions passed by address rather than by value.
pub fn lvalue_operands(op: BuiltinOp) -> &'static [usize] {
    use BuiltinOp as B;
    match op {
        B::Modf | B::Frexp => &[1],
        B::UaddCarry | B::UsubBorrow => &[2],
        B::UmulExtended | B::ImulExtended => &[2, 3],
        B::InterpolateAtCentroid | B::InterpolateAtSample | B::InterpolateAtOffset => &[0],
        B::AtomicAdd
        | B::AtomicMin
        | B::AtomicMax
        | B::AtomicAnd
        | B::AtomicOr
        | B::AtomicXor
        | B::AtomicExchange
        | B::AtomicCompSwap
        | B::AtomicLoad
        | B::AtomicStore => &[0],
        B::ImageAtomicAdd | B::ImageAtomicExchange => &[0],
        B::RayQueryInitialize
        | B::RayQueryProceed
        | B::RayQueryTerminate
        | B::RayQueryGetIntersectionType
        | B::RayQueryGetIntersectionT => &[0],
        B::TraceRay => &[10],
        B::ExecuteCallable => &[1],

        B::Radians
        | B::Degrees
        | B::Sin
        | B::Cos
        | B::Tan
        | B::Asin
        | B::Acos
        | B::Atan
        | B::Atan2
        | B::Sinh
        | B::Cosh
        | B::Tanh
        | B::Pow
        | B::Exp
        | B::Log
        | B::Exp2
        | B::Log2
        | B::Sqrt
        | B::InverseSqrt
        | B::Abs
        | B::Sign
        | B::Floor
        | B::Trunc
        | B::Round
        | B::RoundEven
        | B::Ceil
        | B::Fract
        | B::Mod
        | B::Min
        | B::Max
        | B::Clamp
        | B::Mix
        | B::Step
        | B::SmoothStep
        | B::Fma
        | B::Ldexp
        | B::IsNan
        | B::IsInf
        | B::FloatBitsToInt
        | B::FloatBitsToUint
        | B::IntBitsToFloat
        | B::UintBitsToFloat
        | B::PackHalf2x16
        | B::UnpackHalf2x16
        | B::PackUnorm4x8
        | B::UnpackUnorm4x8
        | B::Length
        | B::Distance
        | B::Dot
        | B::Cross
        | B::Normalize
        | B::FaceForward
        | B::Reflect
        | B::Refract
        | B::OuterProduct
        | B::Transpose
        | B::Determinant
        | B::Inverse
        | B::LessThan
        | B::LessThanEqual
        | B::GreaterThan
        | B::GreaterThanEqual
        | B::VectorEqual
        | B::VectorNotEqual
        | B::Any
        | B::All
        | B::Not
        | B::BitfieldExtract
        | B::BitfieldInsert
        | B::BitfieldReverse
        | B::BitCount
        | B::FindLsb
        | B::FindMsb
        | B::DPdx
        | B::DPdy
        | B::Fwidth
        | B::Texture
        | B::TextureLod
        | B::TextureGrad
        | B::TextureGather
        | B::TexelFetch
        | B::TextureSize
        | B::TextureQueryLevels
        | B::ImageLoad
        | B::ImageStore
        | B::ImageSize
        | B::SubpassLoad
        | B::Barrier
        | B::MemoryBarrier
        | B::MemoryBarrierBuffer
        | B::MemoryBarrierShared
        | B::MemoryBarrierImage
        | B::GroupMemoryBarrier
        | B::EmitVertex
        | B::EndPrimitive
        | B::SubgroupBarrier
        | B::SubgroupElect
        | B::SubgroupAll
        | B::SubgroupAny
        | B::SubgroupBroadcastFirst
        | B::SubgroupAdd
        | B::SubgroupMin
        | B::SubgroupMax
        | B::ReportIntersection
        | B::SetMeshOutputs
        | B::EmitMeshTasks => &[],
    }
}

/// Capabilities and extensions a use of the builtin requires.
pub fn requirements(op: BuiltinOp) -> Needs {
    use BuiltinOp as B;
    match op {
        B::InterpolateAtCentroid | B::InterpolateAtSample | B::InterpolateAtOffset => {
            Needs::cap(Capability::InterpolationFunction)
        }
        B::TextureSize | B::TextureQueryLevels | B::ImageSize => Needs::cap(Capability::ImageQuery),
        B::SubgroupBarrier => Needs::none(),
        B::SubgroupElect => Needs::cap(Capability::GroupNonUniform),
        B::SubgroupAll | B::SubgroupAny => {
            Needs::cap(Capability::GroupNonUniform).with_cap(Capability::GroupNonUniformVote)
        }
        B::SubgroupBroadcastFirst => {
            Needs::cap(Capability::GroupNonUniform).with_cap(Capability::GroupNonUniformBallot)
        }
        B::SubgroupAdd | B::SubgroupMin | B::SubgroupMax => {
            Needs::cap(Capability::GroupNonUniform).with_cap(Capability::GroupNonUniformArithmetic)
        }
        B::RayQueryInitialize
        | B::RayQueryProceed
        | B::RayQueryTerminate
        | B::RayQueryGetIntersectionType
        | B::RayQueryGetIntersectionT => Needs::cap(Capability::RayQueryKHR).with_ext(RAY_QUERY),
        B::TraceRay | B::ExecuteCallable | B::ReportIntersection => {
            Needs::cap(Capability::RayTracingKHR).with_ext(RAY_TRACING)
        }
        B::SetMeshOutputs | B::EmitMeshTasks => Needs::cap(Capability::MeshShadingEXT).with_ext(MESH_SHADER),
        B::EmitVertex | B::EndPrimitive => Needs::cap(Capability::Geometry),
        B::Radians
        | B::Degrees
        | B::Sin
        | B::Cos
        | B::Tan
        | B::Asin
        | B::Acos
        | B::Atan
        | B::Atan2
        | B::Sinh
        | B::Cosh
        | B::Tanh
        | B::Pow
        | B::Exp
        | B::Log
        | B::Exp2
        | B::Log2
        | B::Sqrt
        | B::InverseSqrt
        | B::Abs
        | B::Sign
        | B::Floor
        | B::Trunc
        | B::Round
        | B::RoundEven
        | B::Ceil
        | B::Fract
        | B::Mod
        | B::Min
        | B::Max
        | B::Clamp
        | B::Mix
        | B::Step
        | B::SmoothStep
        | B::Fma
        | B::Ldexp
        | B::IsNan
        | B::IsInf
        | B::FloatBitsToInt
        | B::FloatBitsToUint
        | B::IntBitsToFloat
        | B::UintBitsToFloat
        | B::PackHalf2x16
        | B::UnpackHalf2x16
        | B::PackUnorm4x8
        | B::UnpackUnorm4x8
        | B::Length
        | B::Distance
        | B::Dot
        | B::Cross
        | B::Normalize
        | B::FaceForward
        | B::Reflect
        | B::Refract
        | B::OuterProduct
        | B::Transpose
        | B::Determinant
        | B::Inverse
        | B::LessThan
        | B::LessThanEqual
        | B::GreaterThan
        | B::GreaterThanEqual
        | B::VectorEqual
        | B::VectorNotEqual
        | B::Any
        | B::All
        | B::Not
        | B::BitfieldExtract
        | B::BitfieldInsert
        | B::BitfieldReverse
        | B::BitCount
        | B::FindLsb
        | B::FindMsb
        | B::DPdx
        | B::DPdy
        | B::Fwidth
        | B::Modf
        | B::Frexp
        | B::UaddCarry
        | B::UsubBorrow
        | B::UmulExtended
        | B::ImulExtended
        | B::Texture
        | B::TextureLod
        | B::TextureGrad
        | B::TextureGather
        | B::TexelFetch
        | B::ImageLoad
        | B::ImageStore
        | B::ImageAtomicAdd
        | B::ImageAtomicExchange
        | B::SubpassLoad
        | B::AtomicAdd
        | B::AtomicMin
        | B::AtomicMax
        | B::AtomicAnd
        | B::AtomicOr
        | B::AtomicXor
        | B::AtomicExchange
        | B::AtomicCompSwap
        | B::AtomicLoad
        | B::AtomicStore
        | B::Barrier
        | B::MemoryBarrier
        | B::MemoryBarrierBuffer
        | B::MemoryBarrierShared
        | B::MemoryBarrierImage
        | B::GroupMemoryBarrier => Needs::none(),
    }
}

/// Builtins whose evaluation is observable beyond their result.
pub fn has_side_effects(op: BuiltinOp) -> bool {
    use BuiltinOp as B;
    match op {
        B::Modf
        | B::Frexp
        | B::UaddCarry
        | B::UsubBorrow
        | B::UmulExtended
        | B::ImulExtended
        | B::ImageStore
        | B::ImageAtomicAdd
        | B::ImageAtomicExchange
        | B::AtomicAdd
        | B::AtomicMin
        | B::AtomicMax
        | B::AtomicAnd
        | B::AtomicOr
        | B::AtomicXor
        | B::AtomicExchange
        | B::AtomicCompSwap
        | B::AtomicStore
        | B::Barrier
        | B::MemoryBarrier
        | B::MemoryBarrierBuffer
        | B::MemoryBarrierShared
        | B::MemoryBarrierImage
        | B::GroupMemoryBarrier
        | B::EmitVertex
        | B::EndPrimitive
        | B::SubgroupBarrier
        | B::RayQueryInitialize
        | B::RayQueryProceed
        | B::RayQueryTerminate
        | B::TraceRay
        | B::ExecuteCallable
        | B::ReportIntersection
        | B::SetMeshOutputs
        | B::EmitMeshTasks => true,

        B::Radians
        | B::Degrees
        | B::Sin
        | B::Cos
        | B::Tan
        | B::Asin
        | B::Acos
        | B::Atan
        | B::Atan2
        | B::Sinh
        | B::Cosh
        | B::Tanh
        | B::Pow
        | B::Exp
        | B::Log
        | B::Exp2
        | B::Log2
        | B::Sqrt
        | B::InverseSqrt
        | B::Abs
        | B::Sign
        | B::Floor
        | B::Trunc
        | B::Round
        | B::RoundEven
        | B::Ceil
        | B::Fract
        | B::Mod
        | B::Min
        | B::Max
        | B::Clamp
        | B::Mix
        | B::Step
        | B::SmoothStep
        | B::Fma
        | B::Ldexp
        | B::IsNan
        | B::IsInf
        | B::FloatBitsToInt
        | B::FloatBitsToUint
        | B::IntBitsToFloat
        | B::UintBitsToFloat
        | B::PackHalf2x16
        | B::UnpackHalf2x16
        | B::PackUnorm4x8
        | B::UnpackUnorm4x8
        | B::Length
        | B::Distance
        | B::Dot
        | B::Cross
        | B::Normalize
        | B::FaceForward
        | B::Reflect
        | B::Refract
        | B::OuterProduct
        | B::Transpose
        | B::Determinant
        | B::Inverse
        | B::LessThan
        | B::LessThanEqual
        | B::GreaterThan
        | B::GreaterThanEqual
        | B::VectorEqual
        | B::VectorNotEqual
        | B::Any
        | B::All
        | B::Not
        | B::BitfieldExtract
        | B::BitfieldInsert
        | B::BitfieldReverse
        | B::BitCount
        | B::FindLsb
        | B::FindMsb
        | B::DPdx
        | B::DPdy
        | B::Fwidth
        | B::InterpolateAtCentroid
        | B::InterpolateAtSample
        | B::InterpolateAtOffset
        | B::Texture
        | B::TextureLod
        | B::TextureGrad
        | B::TextureGather
        | B::TexelFetch
        | B::TextureSize
        | B::TextureQueryLevels
        | B::ImageLoad
        | B::ImageSize
        | B::SubpassLoad
        | B::AtomicLoad
        | B::SubgroupElect
        | B::SubgroupAll
        | B::SubgroupAny
        | B::SubgroupBroadcastFirst
        | B::SubgroupAdd
        | B::SubgroupMin
        | B::SubgroupMax
        | B::RayQueryGetIntersectionType
        | B::RayQueryGetIntersectionT => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_parameters_are_addresses() {
        assert_eq!(lvalue_operands(BuiltinOp::Modf), &[1]);
        assert_eq!(lvalue_operands(BuiltinOp::UmulExtended), &[2, 3]);
        assert_eq!(lvalue_operands(BuiltinOp::AtomicCompSwap), &[0]);
        assert!(lvalue_operands(BuiltinOp::Sin).is_empty());
        assert!(lvalue_operands(BuiltinOp::ImageStore).is_empty());
    }

    #[test]
    fn test_typed_glsl_opcodes() {
        assert_eq!(
            implementation(BuiltinOp::Min),
            BuiltinImpl::GlslExtTyped { float: 37, signed: 39, unsigned: 38 }
        );
        assert_eq!(implementation(BuiltinOp::Length), BuiltinImpl::GlslExt(66));
        assert_eq!(implementation(BuiltinOp::Dot), BuiltinImpl::SpirvOp(Op::Dot));
    }

    #[test]
    fn test_subgroup_requirements() {
        let needs = requirements(BuiltinOp::SubgroupAdd);
        assert!(needs.capabilities.contains(&Capability::GroupNonUniform));
        assert!(needs.capabilities.contains(&Capability::GroupNonUniformArithmetic));
        assert!(requirements(BuiltinOp::Sqrt).is_empty());
    }

    #[test]
    fn test_side_effects() {
        assert!(has_side_effects(BuiltinOp::AtomicAdd));
        assert!(has_side_effects(BuiltinOp::Barrier));
        assert!(has_side_effects(BuiltinOp::ImageStore));
        assert!(has_side_effects(BuiltinOp::Modf));
        assert!(!has_side_effects(BuiltinOp::AtomicLoad));
        assert!(!has_side_effects(BuiltinOp::Texture));
        assert!(!has_side_effects(BuiltinOp::Dot));
        assert!(has_side_effects(BuiltinOp::UaddCarry));
        assert!(has_side_effects(BuiltinOp::EmitVertex));
        assert!(has_side_effects(BuiltinOp::RayQueryProceed));
        assert!(!has_side_effects(BuiltinOp::RayQueryGetIntersectionT));
        assert!(!has_side_effects(BuiltinOp::SubgroupAdd));
    }

    #[test]
    fn test_side_effects_agree_with_address_operands() {
        // every builtin writing through an address is observable, apart from
        // the read-only address uses
        let read_only = [
            BuiltinOp::InterpolateAtCentroid,
            BuiltinOp::InterpolateAtSample,
            BuiltinOp::InterpolateAtOffset,
            BuiltinOp::AtomicLoad,
            BuiltinOp::RayQueryGetIntersectionType,
            BuiltinOp::RayQueryGetIntersectionT,
        ];
        for op in [
            BuiltinOp::Modf,
            BuiltinOp::Frexp,
            BuiltinOp::UsubBorrow,
            BuiltinOp::ImulExtended,
            BuiltinOp::AtomicCompSwap,
            BuiltinOp::ImageAtomicExchange,
            BuiltinOp::RayQueryInitialize,
            BuiltinOp::ExecuteCallable,
        ] {
            assert!(!lvalue_operands(op).is_empty());
            assert!(has_side_effects(op), "{:?}", op);
        }
        for op in read_only {
            assert!(!lvalue_operands(op).is_empty());
            assert!(!has_side_effects(op), "{:?}", op);
        }
    }
}
