//! Source type system as delivered by the front end.
//!
//! Types are plain values. Aggregates are referenced through `StructId`
//! indices into `TranslationUnit::structs`, which keeps self-referential
//! buffer references (a block holding a reference to itself) representable
//! without cycles.

use super::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerDim {
    Dim1D,
    Dim2D,
    Dim3D,
    Cube,
    Rect,
    Buffer,
    SubpassData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    /// Pure `sampler` object.
    Sampler,
    /// Separate sampled image, e.g. `texture2D`.
    Texture,
    /// Combined image-sampler, e.g. `sampler2D`.
    Combined,
    /// Storage image.
    Image,
    /// Subpass input attachment.
    Subpass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampledType {
    Float,
    Int,
    Uint,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub kind: SamplerKind,
    pub dim: SamplerDim,
    pub sampled_type: SampledType,
    pub arrayed: bool,
    pub ms: bool,
    pub shadow: bool,
}

impl SamplerDesc {
    pub fn combined(dim: SamplerDim) -> Self {
        SamplerDesc {
            kind: SamplerKind::Combined,
            dim,
            sampled_type: SampledType::Float,
            arrayed: false,
            ms: false,
            shadow: false,
        }
    }

    pub fn image(dim: SamplerDim, sampled_type: SampledType) -> Self {
        SamplerDesc {
            kind: SamplerKind::Image,
            dim,
            sampled_type,
            arrayed: false,
            ms: false,
            shadow: false,
        }
    }

    pub fn is_texel_buffer(&self) -> bool {
        self.dim == SamplerDim::Buffer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasicType {
    Void,
    Bool,
    /// Signed integer of the given bit width.
    Int(u32),
    Uint(u32),
    Float(u32),
    Sampler(SamplerDesc),
    Struct(StructId),
    /// Interface block (uniform, buffer, in/out block).
    Block(StructId),
    AccelerationStructure,
    RayQuery,
    /// Buffer reference to the block with the given id.
    Reference(StructId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArraySize {
    Sized(u32),
    Unsized,
    /// Length given by a specialization constant symbol.
    SpecConstant(SymbolId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StorageQualifier {
    #[default]
    Temporary,
    /// Module-scope variable without an interface role.
    Global,
    Const,
    VaryingIn,
    VaryingOut,
    Uniform,
    Buffer,
    Shared,
    /// Function parameters.
    In,
    Out,
    InOut,
    ConstIn,
    RayPayload,
    RayPayloadIn,
    HitAttribute,
    CallableData,
    CallableDataIn,
    TaskPayload,
}

impl StorageQualifier {
    pub fn is_pipe_io(self) -> bool {
        matches!(self, StorageQualifier::VaryingIn | StorageQualifier::VaryingOut)
    }

    pub fn is_param_output(self) -> bool {
        matches!(self, StorageQualifier::Out | StorageQualifier::InOut)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Precision {
    #[default]
    None,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interpolation {
    #[default]
    None,
    Smooth,
    Flat,
    NoPerspective,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AuxStorage {
    #[default]
    None,
    Centroid,
    Sample,
    Patch,
    PerPrimitive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Packing {
    #[default]
    None,
    Std140,
    Std430,
    Scalar,
    Shared,
    Packed,
}

impl Packing {
    /// Whether members get explicit offsets and strides.
    pub fn is_explicit(self) -> bool {
        matches!(self, Packing::Std140 | Packing::Std430 | Packing::Scalar)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MatrixLayout {
    #[default]
    None,
    ColumnMajor,
    RowMajor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ImageFormat {
    #[default]
    Unknown,
    Rgba32f,
    Rgba16f,
    Rg32f,
    Rg16f,
    R32f,
    R16f,
    Rgba8,
    Rgba8Snorm,
    Rgba32i,
    R32i,
    Rgba32ui,
    R32ui,
}

bitflags::bitflags! {
    /// Memory qualifiers as written in the source.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct MemoryQualifiers: u32 {
        const COHERENT = 0x1;
        const DEVICE_COHERENT = 0x2;
        const QUEUE_FAMILY_COHERENT = 0x4;
        const WORKGROUP_COHERENT = 0x8;
        const SUBGROUP_COHERENT = 0x10;
        const SHADER_CALL_COHERENT = 0x20;
        const NON_PRIVATE = 0x40;
        const VOLATILE = 0x80;
        const RESTRICT = 0x100;
        const READ_ONLY = 0x200;
        const WRITE_ONLY = 0x400;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LayoutQualifier {
    pub packing: Packing,
    pub matrix: MatrixLayout,
    pub location: Option<u32>,
    pub component: Option<u32>,
    pub binding: Option<u32>,
    pub set: Option<u32>,
    /// Explicit member `offset`.
    pub offset: Option<u32>,
    pub align: Option<u32>,
    pub xfb_buffer: Option<u32>,
    pub xfb_stride: Option<u32>,
    pub xfb_offset: Option<u32>,
    pub format: ImageFormat,
    pub push_constant: bool,
    pub buffer_reference: bool,
    pub buffer_reference_align: Option<u32>,
    pub spec_id: Option<u32>,
    pub input_attachment_index: Option<u32>,
}

/// Built-in variables recognised by the lowering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuiltInKind {
    #[default]
    None,
    Position,
    PointSize,
    ClipDistance,
    CullDistance,
    VertexIndex,
    InstanceIndex,
    VertexId,
    InstanceId,
    DrawIndex,
    BaseVertex,
    BaseInstance,
    FragCoord,
    FrontFacing,
    PointCoord,
    FragDepth,
    FragStencilRef,
    SampleId,
    SamplePosition,
    SampleMask,
    HelperInvocation,
    Layer,
    ViewportIndex,
    PrimitiveId,
    InvocationId,
    TessLevelOuter,
    TessLevelInner,
    TessCoord,
    PatchVertices,
    NumWorkGroups,
    WorkGroupSize,
    WorkGroupId,
    LocalInvocationId,
    GlobalInvocationId,
    LocalInvocationIndex,
    SubgroupSize,
    SubgroupInvocationId,
    ViewIndex,
    DeviceIndex,
    LaunchId,
    LaunchSize,
    PrimitiveShadingRate,
    PrimitivePointIndices,
    PrimitiveLineIndices,
    PrimitiveTriangleIndices,
    CullPrimitive,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Qualifier {
    pub storage: StorageQualifier,
    pub precision: Precision,
    pub interpolation: Interpolation,
    pub aux: AuxStorage,
    pub memory: MemoryQualifiers,
    pub layout: LayoutQualifier,
    pub builtin: BuiltInKind,
    pub invariant: bool,
    pub precise: bool,
    pub non_uniform: bool,
    /// Specialization constant; always an rvalue.
    pub spec_constant: bool,
}

impl Qualifier {
    pub fn with_storage(storage: StorageQualifier) -> Self {
        Qualifier {
            storage,
            ..Default::default()
        }
    }

    pub fn is_uniform_or_buffer(&self) -> bool {
        matches!(self.storage, StorageQualifier::Uniform | StorageQualifier::Buffer)
    }

    /// Qualifiers that change a struct's IR members beyond packing and
    /// majorness, so such structs bypass the struct cache.
    pub fn affects_members(&self) -> bool {
        self.storage.is_pipe_io()
            || (self.storage == StorageQualifier::Buffer && !self.memory.is_empty())
    }

    pub fn is_coherent(&self) -> bool {
        self.memory.intersects(
            MemoryQualifiers::COHERENT
                | MemoryQualifiers::DEVICE_COHERENT
                | MemoryQualifiers::QUEUE_FAMILY_COHERENT
                | MemoryQualifiers::WORKGROUP_COHERENT
                | MemoryQualifiers::SUBGROUP_COHERENT
                | MemoryQualifiers::SHADER_CALL_COHERENT,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    pub basic: BasicType,
    /// Component count for vectors; 0 or 1 for scalars and matrices.
    pub vector_size: u32,
    pub matrix_cols: u32,
    pub matrix_rows: u32,
    /// Array dimensions, outermost first.
    pub arrays: Vec<ArraySize>,
    pub qualifier: Qualifier,
}

impl Type {
    pub fn new(basic: BasicType) -> Self {
        Type {
            basic,
            vector_size: 0,
            matrix_cols: 0,
            matrix_rows: 0,
            arrays: Vec::new(),
            qualifier: Qualifier::default(),
        }
    }

    pub fn void() -> Self {
        Self::new(BasicType::Void)
    }

    pub fn bool() -> Self {
        Self::new(BasicType::Bool)
    }

    pub fn int(bits: u32) -> Self {
        Self::new(BasicType::Int(bits))
    }

    pub fn uint(bits: u32) -> Self {
        Self::new(BasicType::Uint(bits))
    }

    pub fn float(bits: u32) -> Self {
        Self::new(BasicType::Float(bits))
    }

    pub fn sampler(desc: SamplerDesc) -> Self {
        Self::new(BasicType::Sampler(desc))
    }

    pub fn structure(id: StructId) -> Self {
        Self::new(BasicType::Struct(id))
    }

    pub fn block(id: StructId, qualifier: Qualifier) -> Self {
        Self::new(BasicType::Block(id)).with_qualifier(qualifier)
    }

    pub fn reference(id: StructId) -> Self {
        Self::new(BasicType::Reference(id))
    }

    pub fn vector(mut self, size: u32) -> Self {
        self.vector_size = size;
        self
    }

    pub fn matrix_of(mut self, cols: u32, rows: u32) -> Self {
        self.vector_size = 0;
        self.matrix_cols = cols;
        self.matrix_rows = rows;
        self
    }

    /// Add an outer array dimension.
    pub fn array(mut self, size: ArraySize) -> Self {
        self.arrays.insert(0, size);
        self
    }

    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifier = qualifier;
        self
    }

    pub fn with_storage(mut self, storage: StorageQualifier) -> Self {
        self.qualifier.storage = storage;
        self
    }

    pub fn is_void(&self) -> bool {
        self.basic == BasicType::Void && self.arrays.is_empty()
    }

    pub fn is_array(&self) -> bool {
        !self.arrays.is_empty()
    }

    pub fn is_unsized_array(&self) -> bool {
        matches!(self.arrays.first(), Some(ArraySize::Unsized))
    }

    pub fn is_matrix(&self) -> bool {
        !self.is_array() && self.matrix_cols > 0
    }

    pub fn matrix(&self) -> Option<(u32, u32)> {
        if self.matrix_cols > 0 {
            Some((self.matrix_cols, self.matrix_rows))
        } else {
            None
        }
    }

    pub fn is_vector(&self) -> bool {
        !self.is_array() && self.matrix_cols == 0 && self.vector_size > 1
    }

    pub fn is_scalar(&self) -> bool {
        !self.is_array()
            && self.matrix_cols == 0
            && self.vector_size <= 1
            && matches!(
                self.basic,
                BasicType::Bool | BasicType::Int(_) | BasicType::Uint(_) | BasicType::Float(_)
            )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.basic, BasicType::Struct(_) | BasicType::Block(_))
    }

    pub fn struct_id(&self) -> Option<StructId> {
        match self.basic {
            BasicType::Struct(id) | BasicType::Block(id) => Some(id),
            _ => None,
        }
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.basic, BasicType::Reference(_))
    }

    pub fn is_opaque(&self) -> bool {
        matches!(
            self.basic,
            BasicType::Sampler(_) | BasicType::AccelerationStructure | BasicType::RayQuery
        )
    }

    pub fn is_bool(&self) -> bool {
        self.basic == BasicType::Bool
    }

    pub fn is_float(&self) -> bool {
        matches!(self.basic, BasicType::Float(_))
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(self.basic, BasicType::Int(_))
    }

    pub fn is_unsigned_int(&self) -> bool {
        matches!(self.basic, BasicType::Uint(_))
    }

    pub fn is_integer(&self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    /// Scalar bit width, 32 for everything that is not a sized numeric.
    pub fn bit_width(&self) -> u32 {
        match self.basic {
            BasicType::Int(bits) | BasicType::Uint(bits) | BasicType::Float(bits) => bits,
            BasicType::Reference(_) => 64,
            _ => 32,
        }
    }

    /// Number of scalar components of a scalar or vector.
    pub fn component_count(&self) -> u32 {
        if self.vector_size > 1 {
            self.vector_size
        } else {
            1
        }
    }

    /// The type one array level down.
    pub fn element_type(&self) -> Type {
        let mut elem = self.clone();
        if !elem.arrays.is_empty() {
            elem.arrays.remove(0);
        }
        elem
    }

    /// Column type of a matrix.
    pub fn column_type(&self) -> Type {
        let mut col = Type::new(self.basic).vector(self.matrix_rows);
        col.qualifier = self.qualifier.clone();
        col
    }

    /// Scalar type of a scalar, vector or matrix.
    pub fn scalar_type(&self) -> Type {
        let mut scalar = Type::new(self.basic);
        scalar.qualifier.precision = self.qualifier.precision;
        scalar
    }

    /// Same shape with a different scalar base.
    pub fn with_basic(&self, basic: BasicType) -> Type {
        let mut ty = self.clone();
        ty.basic = basic;
        ty
    }

    /// Shape equality ignoring qualifiers.
    pub fn same_shape(&self, other: &Type) -> bool {
        self.basic == other.basic
            && self.vector_size.max(1) == other.vector_size.max(1)
            && self.matrix_cols == other.matrix_cols
            && self.matrix_rows == other.matrix_rows
            && self.arrays == other.arrays
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: Type,
    /// Present in the source but absent from the IR aggregate.
    pub hidden: bool,
    /// Source extension that must be enabled for the member to exist.
    pub required_extension: Option<String>,
}

impl StructMember {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        StructMember {
            name: name.into(),
            ty,
            hidden: false,
            required_extension: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<StructMember>,
    /// Declaration qualifier of a block; default for plain structs. Buffer
    /// references resolve their pointee layout through it.
    pub qualifier: Qualifier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_type_strips_outermost_dimension() {
        let ty = Type::float(32).array(ArraySize::Sized(3)).array(ArraySize::Sized(2));
        assert_eq!(ty.arrays, vec![ArraySize::Sized(2), ArraySize::Sized(3)]);
        let elem = ty.element_type();
        assert_eq!(elem.arrays, vec![ArraySize::Sized(3)]);
        assert!(elem.element_type().is_scalar());
    }

    #[test]
    fn test_matrix_queries() {
        let m = Type::float(32).matrix_of(3, 4);
        assert!(m.is_matrix());
        assert!(!m.is_vector());
        let col = m.column_type();
        assert!(col.is_vector());
        assert_eq!(col.vector_size, 4);
    }

    #[test]
    fn test_member_affecting_qualifiers() {
        let mut q = Qualifier::with_storage(StorageQualifier::Buffer);
        assert!(!q.affects_members());
        q.memory |= MemoryQualifiers::RESTRICT;
        assert!(q.affects_members());
        assert!(Qualifier::with_storage(StorageQualifier::VaryingOut).affects_members());
        assert!(!Qualifier::with_storage(StorageQualifier::Uniform).affects_members());
    }
}
