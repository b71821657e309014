//! Qualifier, built-in and stage translation tables.
//!
//! Every function here is total over its input enumeration and side-effect
//! free: required capabilities and extensions come back as [`Needs`] and are
//! registered by the constructor.

use crate::access_chain::CoherencyFlags;
use crate::ast::{
    AuxStorage, BasicType, BuiltInKind, ImageFormat, Interpolation, MatrixLayout, MemoryQualifiers,
    Precision, Qualifier, SamplerDesc, SamplerDim, SamplerKind, SpirvVersion, Stage, StorageQualifier,
    TargetEnv, Type,
};
use rspirv::spirv::{self, BuiltIn, Capability, Decoration, StorageClass};

/// An extension together with the SPIR-V version that absorbed it into core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Extension {
    pub name: &'static str,
    pub core_in: Option<SpirvVersion>,
}

impl Extension {
    const fn new(name: &'static str) -> Self {
        Extension { name, core_in: None }
    }

    const fn core(name: &'static str, version: SpirvVersion) -> Self {
        Extension {
            name,
            core_in: Some(version),
        }
    }
}

pub const STORAGE_BUFFER_STORAGE_CLASS: Extension =
    Extension::core("SPV_KHR_storage_buffer_storage_class", SpirvVersion::V1_3);
pub const SHADER_DRAW_PARAMETERS: Extension =
    Extension::core("SPV_KHR_shader_draw_parameters", SpirvVersion::V1_3);
pub const MULTIVIEW: Extension = Extension::core("SPV_KHR_multiview", SpirvVersion::V1_3);
pub const DEVICE_GROUP: Extension = Extension::core("SPV_KHR_device_group", SpirvVersion::V1_3);
pub const STORAGE_16BIT: Extension = Extension::core("SPV_KHR_16bit_storage", SpirvVersion::V1_3);
pub const STORAGE_8BIT: Extension = Extension::core("SPV_KHR_8bit_storage", SpirvVersion::V1_5);
pub const DESCRIPTOR_INDEXING: Extension =
    Extension::core("SPV_EXT_descriptor_indexing", SpirvVersion::V1_5);
pub const PHYSICAL_STORAGE_BUFFER: Extension =
    Extension::core("SPV_KHR_physical_storage_buffer", SpirvVersion::V1_5);
pub const VULKAN_MEMORY_MODEL: Extension =
    Extension::core("SPV_KHR_vulkan_memory_model", SpirvVersion::V1_5);
pub const VIEWPORT_INDEX_LAYER: Extension =
    Extension::core("SPV_EXT_shader_viewport_index_layer", SpirvVersion::V1_5);
pub const DEMOTE_TO_HELPER: Extension =
    Extension::core("SPV_EXT_demote_to_helper_invocation", SpirvVersion::V1_6);
pub const TERMINATE_INVOCATION: Extension =
    Extension::core("SPV_KHR_terminate_invocation", SpirvVersion::V1_6);
pub const STENCIL_EXPORT: Extension = Extension::new("SPV_EXT_shader_stencil_export");
pub const FRAGMENT_SHADING_RATE: Extension = Extension::new("SPV_KHR_fragment_shading_rate");
pub const RAY_TRACING: Extension = Extension::new("SPV_KHR_ray_tracing");
pub const RAY_QUERY: Extension = Extension::new("SPV_KHR_ray_query");
pub const MESH_SHADER: Extension = Extension::new("SPV_EXT_mesh_shader");

/// Capabilities and extensions a translation depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Needs {
    pub capabilities: Vec<Capability>,
    pub extensions: Vec<Extension>,
}

impl Needs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn cap(cap: Capability) -> Self {
        Needs {
            capabilities: vec![cap],
            extensions: Vec::new(),
        }
    }

    pub fn with_cap(mut self, cap: Capability) -> Self {
        self.capabilities.push(cap);
        self
    }

    pub fn with_ext(mut self, ext: Extension) -> Self {
        self.extensions.push(ext);
        self
    }

    pub fn merge(&mut self, other: Needs) {
        self.capabilities.extend(other.capabilities);
        self.extensions.extend(other.extensions);
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty() && self.extensions.is_empty()
    }
}

pub fn precision_decoration(precision: Precision) -> Option<Decoration> {
    match precision {
        Precision::Low | Precision::Medium => Some(Decoration::RelaxedPrecision),
        Precision::High | Precision::None => None,
    }
}

pub fn interpolation_decoration(interpolation: Interpolation) -> Option<Decoration> {
    match interpolation {
        Interpolation::Flat => Some(Decoration::Flat),
        Interpolation::NoPerspective => Some(Decoration::NoPerspective),
        Interpolation::Smooth | Interpolation::None => None,
    }
}

pub fn aux_storage_decoration(aux: AuxStorage, stage: Stage) -> (Option<Decoration>, Needs) {
    match aux {
        AuxStorage::None => (None, Needs::none()),
        AuxStorage::Centroid => (Some(Decoration::Centroid), Needs::none()),
        AuxStorage::Sample => (Some(Decoration::Sample), Needs::cap(Capability::SampleRateShading)),
        AuxStorage::Patch => (Some(Decoration::Patch), Needs::none()),
        AuxStorage::PerPrimitive => {
            let needs = if stage == Stage::Fragment {
                Needs::cap(Capability::MeshShadingEXT).with_ext(MESH_SHADER)
            } else {
                Needs::none()
            };
            (Some(Decoration::PerPrimitiveEXT), needs)
        }
    }
}

pub fn invariant_decoration(qualifier: &Qualifier) -> Option<Decoration> {
    qualifier.invariant.then_some(Decoration::Invariant)
}

pub fn precise_decoration(qualifier: &Qualifier) -> Option<Decoration> {
    qualifier.precise.then_some(Decoration::NoContraction)
}

pub fn non_uniform_decoration(qualifier: &Qualifier) -> (Option<Decoration>, Needs) {
    if qualifier.non_uniform {
        (
            Some(Decoration::NonUniform),
            Needs::cap(Capability::ShaderNonUniform).with_ext(DESCRIPTOR_INDEXING),
        )
    } else {
        (None, Needs::none())
    }
}

/// Member/variable decorations for memory qualifiers. Coherence and
/// volatility move into memory operands under the Vulkan memory model.
pub fn memory_decorations(memory: MemoryQualifiers, vulkan_memory_model: bool) -> Vec<Decoration> {
    let mut out = Vec::new();
    if !vulkan_memory_model {
        if memory.intersects(
            MemoryQualifiers::COHERENT
                | MemoryQualifiers::DEVICE_COHERENT
                | MemoryQualifiers::QUEUE_FAMILY_COHERENT
                | MemoryQualifiers::WORKGROUP_COHERENT
                | MemoryQualifiers::SUBGROUP_COHERENT
                | MemoryQualifiers::SHADER_CALL_COHERENT,
        ) {
            out.push(Decoration::Coherent);
        }
        if memory.contains(MemoryQualifiers::VOLATILE) {
            out.push(Decoration::Volatile);
        }
    }
    if memory.contains(MemoryQualifiers::RESTRICT) {
        out.push(Decoration::Restrict);
    }
    if memory.contains(MemoryQualifiers::READ_ONLY) {
        out.push(Decoration::NonWritable);
    }
    if memory.contains(MemoryQualifiers::WRITE_ONLY) {
        out.push(Decoration::NonReadable);
    }
    out
}

pub fn matrix_layout_decoration(layout: MatrixLayout, row_major_default: bool) -> Decoration {
    match layout {
        MatrixLayout::RowMajor => Decoration::RowMajor,
        MatrixLayout::ColumnMajor => Decoration::ColMajor,
        MatrixLayout::None if row_major_default => Decoration::RowMajor,
        MatrixLayout::None => Decoration::ColMajor,
    }
}

/// Whether storage buffers use the `StorageBuffer` class rather than
/// `Uniform` + `BufferBlock`.
pub fn uses_storage_buffer_class(target: &TargetEnv) -> bool {
    target.spirv_version >= SpirvVersion::V1_3
}

/// Block decoration for an interface aggregate with the given storage.
pub fn block_decoration(storage: StorageQualifier, target: &TargetEnv) -> Option<Decoration> {
    match storage {
        StorageQualifier::Uniform => Some(Decoration::Block),
        StorageQualifier::Buffer if uses_storage_buffer_class(target) => Some(Decoration::Block),
        StorageQualifier::Buffer => Some(Decoration::BufferBlock),
        StorageQualifier::VaryingIn | StorageQualifier::VaryingOut => Some(Decoration::Block),
        StorageQualifier::TaskPayload => None,
        StorageQualifier::Temporary
        | StorageQualifier::Global
        | StorageQualifier::Const
        | StorageQualifier::Shared
        | StorageQualifier::In
        | StorageQualifier::Out
        | StorageQualifier::InOut
        | StorageQualifier::ConstIn
        | StorageQualifier::RayPayload
        | StorageQualifier::RayPayloadIn
        | StorageQualifier::HitAttribute
        | StorageQualifier::CallableData
        | StorageQualifier::CallableDataIn => None,
    }
}

/// Storage class of a variable of the given type.
pub fn storage_class(ty: &Type, target: &TargetEnv) -> StorageClass {
    let q = &ty.qualifier;
    match q.storage {
        StorageQualifier::VaryingIn => StorageClass::Input,
        StorageQualifier::VaryingOut => StorageClass::Output,
        StorageQualifier::Uniform if q.layout.push_constant => StorageClass::PushConstant,
        StorageQualifier::Uniform if ty.is_opaque() => StorageClass::UniformConstant,
        StorageQualifier::Uniform => StorageClass::Uniform,
        StorageQualifier::Buffer if q.layout.push_constant => StorageClass::PushConstant,
        StorageQualifier::Buffer if uses_storage_buffer_class(target) => StorageClass::StorageBuffer,
        StorageQualifier::Buffer => StorageClass::Uniform,
        StorageQualifier::Shared => StorageClass::Workgroup,
        StorageQualifier::Global | StorageQualifier::Const => StorageClass::Private,
        StorageQualifier::Temporary
        | StorageQualifier::In
        | StorageQualifier::Out
        | StorageQualifier::InOut
        | StorageQualifier::ConstIn => StorageClass::Function,
        StorageQualifier::RayPayload => StorageClass::RayPayloadKHR,
        StorageQualifier::RayPayloadIn => StorageClass::IncomingRayPayloadKHR,
        StorageQualifier::HitAttribute => StorageClass::HitAttributeKHR,
        StorageQualifier::CallableData => StorageClass::CallableDataKHR,
        StorageQualifier::CallableDataIn => StorageClass::IncomingCallableDataKHR,
        StorageQualifier::TaskPayload => StorageClass::TaskPayloadWorkgroupEXT,
    }
}

/// Built-in translation. `member_declaration` marks a built-in that only
/// appears as a block member, which does not by itself require the
/// capabilities that using it would.
pub fn builtin(kind: BuiltInKind, stage: Stage, member_declaration: bool) -> (Option<BuiltIn>, Needs) {
    let on_use = |caps: Needs| if member_declaration { Needs::none() } else { caps };
    match kind {
        BuiltInKind::None => (None, Needs::none()),
        BuiltInKind::Position => (Some(BuiltIn::Position), Needs::none()),
        BuiltInKind::PointSize => {
            let needs = match stage {
                Stage::Geometry => Needs::cap(Capability::GeometryPointSize),
                Stage::TessControl | Stage::TessEvaluation => {
                    Needs::cap(Capability::TessellationPointSize)
                }
                _ => Needs::none(),
            };
            (Some(BuiltIn::PointSize), on_use(needs))
        }
        BuiltInKind::ClipDistance => (
            Some(BuiltIn::ClipDistance),
            on_use(Needs::cap(Capability::ClipDistance)),
        ),
        BuiltInKind::CullDistance => (
            Some(BuiltIn::CullDistance),
            on_use(Needs::cap(Capability::CullDistance)),
        ),
        BuiltInKind::VertexIndex => (Some(BuiltIn::VertexIndex), Needs::none()),
        BuiltInKind::InstanceIndex => (Some(BuiltIn::InstanceIndex), Needs::none()),
        BuiltInKind::VertexId => (Some(BuiltIn::VertexId), Needs::none()),
        BuiltInKind::InstanceId => (Some(BuiltIn::InstanceId), Needs::none()),
        BuiltInKind::DrawIndex => (
            Some(BuiltIn::DrawIndex),
            Needs::cap(Capability::DrawParameters).with_ext(SHADER_DRAW_PARAMETERS),
        ),
        BuiltInKind::BaseVertex => (
            Some(BuiltIn::BaseVertex),
            Needs::cap(Capability::DrawParameters).with_ext(SHADER_DRAW_PARAMETERS),
        ),
        BuiltInKind::BaseInstance => (
            Some(BuiltIn::BaseInstance),
            Needs::cap(Capability::DrawParameters).with_ext(SHADER_DRAW_PARAMETERS),
        ),
        BuiltInKind::FragCoord => (Some(BuiltIn::FragCoord), Needs::none()),
        BuiltInKind::FrontFacing => (Some(BuiltIn::FrontFacing), Needs::none()),
        BuiltInKind::PointCoord => (Some(BuiltIn::PointCoord), Needs::none()),
        BuiltInKind::FragDepth => (Some(BuiltIn::FragDepth), Needs::none()),
        BuiltInKind::FragStencilRef => (
            Some(BuiltIn::FragStencilRefEXT),
            Needs::cap(Capability::StencilExportEXT).with_ext(STENCIL_EXPORT),
        ),
        BuiltInKind::SampleId => (
            Some(BuiltIn::SampleId),
            on_use(Needs::cap(Capability::SampleRateShading)),
        ),
        BuiltInKind::SamplePosition => (
            Some(BuiltIn::SamplePosition),
            on_use(Needs::cap(Capability::SampleRateShading)),
        ),
        BuiltInKind::SampleMask => (Some(BuiltIn::SampleMask), Needs::none()),
        BuiltInKind::HelperInvocation => (Some(BuiltIn::HelperInvocation), Needs::none()),
        BuiltInKind::Layer => {
            let needs = match stage {
                Stage::Vertex | Stage::TessControl | Stage::TessEvaluation => {
                    Needs::cap(Capability::ShaderViewportIndexLayerEXT).with_ext(VIEWPORT_INDEX_LAYER)
                }
                Stage::Fragment => Needs::cap(Capability::Geometry),
                _ => Needs::none(),
            };
            (Some(BuiltIn::Layer), on_use(needs))
        }
        BuiltInKind::ViewportIndex => {
            let mut needs = Needs::cap(Capability::MultiViewport);
            if matches!(stage, Stage::Vertex | Stage::TessControl | Stage::TessEvaluation) {
                needs = needs
                    .with_cap(Capability::ShaderViewportIndexLayerEXT)
                    .with_ext(VIEWPORT_INDEX_LAYER);
            }
            (Some(BuiltIn::ViewportIndex), on_use(needs))
        }
        BuiltInKind::PrimitiveId => {
            let needs = if stage == Stage::Fragment {
                Needs::cap(Capability::Geometry)
            } else {
                Needs::none()
            };
            (Some(BuiltIn::PrimitiveId), on_use(needs))
        }
        BuiltInKind::InvocationId => (Some(BuiltIn::InvocationId), Needs::none()),
        BuiltInKind::TessLevelOuter => (Some(BuiltIn::TessLevelOuter), Needs::none()),
        BuiltInKind::TessLevelInner => (Some(BuiltIn::TessLevelInner), Needs::none()),
        BuiltInKind::TessCoord => (Some(BuiltIn::TessCoord), Needs::none()),
        BuiltInKind::PatchVertices => (Some(BuiltIn::PatchVertices), Needs::none()),
        BuiltInKind::NumWorkGroups => (Some(BuiltIn::NumWorkgroups), Needs::none()),
        BuiltInKind::WorkGroupSize => (Some(BuiltIn::WorkgroupSize), Needs::none()),
        BuiltInKind::WorkGroupId => (Some(BuiltIn::WorkgroupId), Needs::none()),
        BuiltInKind::LocalInvocationId => (Some(BuiltIn::LocalInvocationId), Needs::none()),
        BuiltInKind::GlobalInvocationId => (Some(BuiltIn::GlobalInvocationId), Needs::none()),
        BuiltInKind::LocalInvocationIndex => (Some(BuiltIn::LocalInvocationIndex), Needs::none()),
        BuiltInKind::SubgroupSize => (
            Some(BuiltIn::SubgroupSize),
            Needs::cap(Capability::GroupNonUniform),
        ),
        BuiltInKind::SubgroupInvocationId => (
            Some(BuiltIn::SubgroupLocalInvocationId),
            Needs::cap(Capability::GroupNonUniform),
        ),
        BuiltInKind::ViewIndex => (
            Some(BuiltIn::ViewIndex),
            Needs::cap(Capability::MultiView).with_ext(MULTIVIEW),
        ),
        BuiltInKind::DeviceIndex => (
            Some(BuiltIn::DeviceIndex),
            Needs::cap(Capability::DeviceGroup).with_ext(DEVICE_GROUP),
        ),
        BuiltInKind::LaunchId => (Some(BuiltIn::LaunchIdKHR), Needs::none()),
        BuiltInKind::LaunchSize => (Some(BuiltIn::LaunchSizeKHR), Needs::none()),
        BuiltInKind::PrimitiveShadingRate => (
            Some(BuiltIn::PrimitiveShadingRateKHR),
            Needs::cap(Capability::FragmentShadingRateKHR).with_ext(FRAGMENT_SHADING_RATE),
        ),
        BuiltInKind::PrimitivePointIndices => (Some(BuiltIn::PrimitivePointIndicesEXT), Needs::none()),
        BuiltInKind::PrimitiveLineIndices => (Some(BuiltIn::PrimitiveLineIndicesEXT), Needs::none()),
        BuiltInKind::PrimitiveTriangleIndices => {
            (Some(BuiltIn::PrimitiveTriangleIndicesEXT), Needs::none())
        }
        BuiltInKind::CullPrimitive => (Some(BuiltIn::CullPrimitiveEXT), Needs::none()),
    }
}

pub fn execution_model(stage: Stage) -> (spirv::ExecutionModel, Needs) {
    use spirv::ExecutionModel as Em;
    let rt = || Needs::cap(Capability::RayTracingKHR).with_ext(RAY_TRACING);
    let mesh = || Needs::cap(Capability::MeshShadingEXT).with_ext(MESH_SHADER);
    match stage {
        Stage::Vertex => (Em::Vertex, Needs::none()),
        Stage::TessControl => (Em::TessellationControl, Needs::cap(Capability::Tessellation)),
        Stage::TessEvaluation => (Em::TessellationEvaluation, Needs::cap(Capability::Tessellation)),
        Stage::Geometry => (Em::Geometry, Needs::cap(Capability::Geometry)),
        Stage::Fragment => (Em::Fragment, Needs::none()),
        Stage::Compute => (Em::GLCompute, Needs::none()),
        Stage::RayGen => (Em::RayGenerationKHR, rt()),
        Stage::Intersect => (Em::IntersectionKHR, rt()),
        Stage::AnyHit => (Em::AnyHitKHR, rt()),
        Stage::ClosestHit => (Em::ClosestHitKHR, rt()),
        Stage::Miss => (Em::MissKHR, rt()),
        Stage::Callable => (Em::CallableKHR, rt()),
        Stage::Task => (Em::TaskEXT, mesh()),
        Stage::Mesh => (Em::MeshEXT, mesh()),
    }
}

/// Image dimensionality plus the capabilities its use implies.
pub fn image_dim(desc: &SamplerDesc) -> (spirv::Dim, Needs) {
    use spirv::Dim;
    let storage = desc.kind == SamplerKind::Image;
    let mut needs = Needs::none();
    let dim = match desc.dim {
        SamplerDim::Dim1D => {
            needs = Needs::cap(if storage { Capability::Image1D } else { Capability::Sampled1D });
            Dim::Dim1D
        }
        SamplerDim::Dim2D => Dim::Dim2D,
        SamplerDim::Dim3D => Dim::Dim3D,
        SamplerDim::Cube => {
            if desc.arrayed {
                needs = Needs::cap(if storage {
                    Capability::ImageCubeArray
                } else {
                    Capability::SampledCubeArray
                });
            }
            Dim::DimCube
        }
        SamplerDim::Rect => {
            needs = Needs::cap(if storage { Capability::ImageRect } else { Capability::SampledRect });
            Dim::DimRect
        }
        SamplerDim::Buffer => {
            needs = Needs::cap(if storage {
                Capability::ImageBuffer
            } else {
                Capability::SampledBuffer
            });
            Dim::DimBuffer
        }
        SamplerDim::SubpassData => {
            needs = Needs::cap(Capability::InputAttachment);
            Dim::DimSubpassData
        }
    };
    if desc.ms && storage {
        needs.merge(Needs::cap(Capability::StorageImageMultisample));
        if desc.arrayed {
            needs.merge(Needs::cap(Capability::ImageMSArray));
        }
    }
    (dim, needs)
}

pub fn image_format(format: ImageFormat) -> (spirv::ImageFormat, Needs) {
    use spirv::ImageFormat as F;
    let extended = || Needs::cap(Capability::StorageImageExtendedFormats);
    match format {
        ImageFormat::Unknown => (F::Unknown, Needs::none()),
        ImageFormat::Rgba32f => (F::Rgba32f, Needs::none()),
        ImageFormat::Rgba16f => (F::Rgba16f, Needs::none()),
        ImageFormat::Rg32f => (F::Rg32f, extended()),
        ImageFormat::Rg16f => (F::Rg16f, extended()),
        ImageFormat::R32f => (F::R32f, Needs::none()),
        ImageFormat::R16f => (F::R16f, extended()),
        ImageFormat::Rgba8 => (F::Rgba8, Needs::none()),
        ImageFormat::Rgba8Snorm => (F::Rgba8Snorm, Needs::none()),
        ImageFormat::Rgba32i => (F::Rgba32i, Needs::none()),
        ImageFormat::R32i => (F::R32i, Needs::none()),
        ImageFormat::Rgba32ui => (F::Rgba32ui, Needs::none()),
        ImageFormat::R32ui => (F::R32ui, Needs::none()),
    }
}

/// Capability for indexing an array of the given resource type with a
/// dynamic index. `None` when dynamic indexing needs nothing extra.
pub fn array_indexing_capability(element: &Type, non_uniform: bool) -> Option<Capability> {
    let q = &element.qualifier;
    match element.basic {
        BasicType::Sampler(desc) => match (desc.kind, desc.is_texel_buffer(), non_uniform) {
            (SamplerKind::Subpass, _, true) => Some(Capability::InputAttachmentArrayNonUniformIndexing),
            (SamplerKind::Subpass, _, false) => Some(Capability::InputAttachmentArrayDynamicIndexing),
            (SamplerKind::Image, true, true) => Some(Capability::StorageTexelBufferArrayNonUniformIndexing),
            (SamplerKind::Image, true, false) => Some(Capability::StorageTexelBufferArrayDynamicIndexing),
            (SamplerKind::Image, false, true) => Some(Capability::StorageImageArrayNonUniformIndexing),
            (_, true, true) => Some(Capability::UniformTexelBufferArrayNonUniformIndexing),
            (_, true, false) => Some(Capability::UniformTexelBufferArrayDynamicIndexing),
            (_, false, true) => Some(Capability::SampledImageArrayNonUniformIndexing),
            (_, false, false) => None,
        },
        BasicType::Block(_) if non_uniform => match q.storage {
            StorageQualifier::Buffer => Some(Capability::StorageBufferArrayNonUniformIndexing),
            StorageQualifier::Uniform => Some(Capability::UniformBufferArrayNonUniformIndexing),
            _ => None,
        },
        _ => None,
    }
}

/// Memory operand mask for an access with the given coherency. Empty
/// outside the Vulkan memory model and for image accesses.
pub fn memory_access(flags: CoherencyFlags, vulkan_memory_model: bool) -> (spirv::MemoryAccess, Needs) {
    let mut mask = spirv::MemoryAccess::NONE;
    if !vulkan_memory_model || flags.contains(CoherencyFlags::IS_IMAGE) {
        return (mask, Needs::none());
    }
    if flags.contains(CoherencyFlags::VOLATILE) || flags.any_coherent() {
        mask |= spirv::MemoryAccess::MAKE_POINTER_AVAILABLE | spirv::MemoryAccess::MAKE_POINTER_VISIBLE;
    }
    if flags.contains(CoherencyFlags::NON_PRIVATE) {
        mask |= spirv::MemoryAccess::NON_PRIVATE_POINTER;
    }
    if flags.contains(CoherencyFlags::VOLATILE) {
        mask |= spirv::MemoryAccess::VOLATILE;
    }
    let needs = if mask.is_empty() {
        Needs::none()
    } else {
        Needs::cap(Capability::VulkanMemoryModel)
    };
    (mask, needs)
}

/// Scope operand paired with [`memory_access`].
pub fn memory_scope(flags: CoherencyFlags, vulkan_memory_model: bool) -> (Option<spirv::Scope>, Needs) {
    if !vulkan_memory_model {
        return (None, Needs::none());
    }
    let scope = if flags.intersects(CoherencyFlags::VOLATILE | CoherencyFlags::COHERENT) {
        Some(spirv::Scope::Device)
    } else if flags.contains(CoherencyFlags::QUEUE_FAMILY_COHERENT) {
        Some(spirv::Scope::QueueFamily)
    } else if flags.contains(CoherencyFlags::DEVICE_COHERENT) {
        Some(spirv::Scope::Device)
    } else if flags.contains(CoherencyFlags::WORKGROUP_COHERENT) {
        Some(spirv::Scope::Workgroup)
    } else if flags.contains(CoherencyFlags::SUBGROUP_COHERENT) {
        Some(spirv::Scope::Subgroup)
    } else if flags.contains(CoherencyFlags::SHADER_CALL_COHERENT) {
        Some(spirv::Scope::ShaderCallKHR)
    } else {
        None
    };
    let needs = if scope == Some(spirv::Scope::Device) {
        Needs::cap(Capability::VulkanMemoryModelDeviceScope)
    } else {
        Needs::none()
    };
    (scope, needs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_declaration_suppresses_use_capabilities() {
        let (decoration, needs) = builtin(BuiltInKind::ClipDistance, Stage::Vertex, true);
        assert_eq!(decoration, Some(BuiltIn::ClipDistance));
        assert!(needs.is_empty());

        let (_, needs) = builtin(BuiltInKind::ClipDistance, Stage::Vertex, false);
        assert_eq!(needs.capabilities, vec![Capability::ClipDistance]);
    }

    #[test]
    fn test_point_size_capability_depends_on_stage() {
        let (_, needs) = builtin(BuiltInKind::PointSize, Stage::Vertex, false);
        assert!(needs.is_empty());
        let (_, needs) = builtin(BuiltInKind::PointSize, Stage::Geometry, false);
        assert_eq!(needs.capabilities, vec![Capability::GeometryPointSize]);
    }

    #[test]
    fn test_draw_parameters_extension_is_core_in_1_3() {
        let (_, needs) = builtin(BuiltInKind::DrawIndex, Stage::Vertex, false);
        assert_eq!(needs.extensions, vec![SHADER_DRAW_PARAMETERS]);
        assert_eq!(needs.extensions[0].core_in, Some(SpirvVersion::V1_3));
    }

    #[test]
    fn test_buffer_storage_class_by_version() {
        let ty = Type::new(BasicType::Block(crate::ast::StructId(0)))
            .with_storage(StorageQualifier::Buffer);
        let old = TargetEnv {
            spirv_version: SpirvVersion::V1_0,
            ..Default::default()
        };
        let new = TargetEnv {
            spirv_version: SpirvVersion::V1_3,
            ..Default::default()
        };
        assert_eq!(storage_class(&ty, &old), StorageClass::Uniform);
        assert_eq!(block_decoration(StorageQualifier::Buffer, &old), Some(Decoration::BufferBlock));
        assert_eq!(storage_class(&ty, &new), StorageClass::StorageBuffer);
        assert_eq!(block_decoration(StorageQualifier::Buffer, &new), Some(Decoration::Block));
    }

    #[test]
    fn test_memory_access_under_vulkan_memory_model() {
        let flags = CoherencyFlags::DEVICE_COHERENT | CoherencyFlags::NON_PRIVATE;
        let (mask, needs) = memory_access(flags, true);
        assert!(mask.contains(spirv::MemoryAccess::MAKE_POINTER_AVAILABLE));
        assert!(mask.contains(spirv::MemoryAccess::MAKE_POINTER_VISIBLE));
        assert!(mask.contains(spirv::MemoryAccess::NON_PRIVATE_POINTER));
        assert_eq!(needs.capabilities, vec![Capability::VulkanMemoryModel]);

        let (scope, needs) = memory_scope(flags, true);
        assert_eq!(scope, Some(spirv::Scope::Device));
        assert_eq!(needs.capabilities, vec![Capability::VulkanMemoryModelDeviceScope]);

        let (mask, _) = memory_access(flags, false);
        assert!(mask.is_empty());
    }

    #[test]
    fn test_memory_decorations_without_memory_model() {
        let memory = MemoryQualifiers::COHERENT | MemoryQualifiers::READ_ONLY;
        assert_eq!(
            memory_decorations(memory, false),
            vec![Decoration::Coherent, Decoration::NonWritable]
        );
        assert_eq!(memory_decorations(memory, true), vec![Decoration::NonWritable]);
    }

    #[test]
    fn test_non_uniform_sampler_array_indexing() {
        let sampler = Type::sampler(SamplerDesc::combined(SamplerDim::Dim2D));
        assert_eq!(
            array_indexing_capability(&sampler, true),
            Some(Capability::SampledImageArrayNonUniformIndexing)
        );
        assert_eq!(array_indexing_capability(&sampler, false), None);
    }
}
