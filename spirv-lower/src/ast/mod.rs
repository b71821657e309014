//! The type-checked tree handed over by the front end.
//!
//! Everything here is produced upstream and treated as immutable by the
//! lowering. Symbols and functions are identified by stable indices
//! assigned once per declaration.

pub mod build;
mod ops;
mod types;

pub use ops::*;
pub use types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FunctionId(pub u32);

/// Source position of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Vertex,
    TessControl,
    TessEvaluation,
    Geometry,
    Fragment,
    Compute,
    RayGen,
    Intersect,
    AnyHit,
    ClosestHit,
    Miss,
    Callable,
    Task,
    Mesh,
}

impl Stage {
    pub fn is_ray_tracing(self) -> bool {
        matches!(
            self,
            Stage::RayGen
                | Stage::Intersect
                | Stage::AnyHit
                | Stage::ClosestHit
                | Stage::Miss
                | Stage::Callable
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceLanguage {
    Glsl,
    Essl,
    Hlsl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpirvVersion {
    pub major: u8,
    pub minor: u8,
}

impl SpirvVersion {
    pub const V1_0: SpirvVersion = SpirvVersion { major: 1, minor: 0 };
    pub const V1_1: SpirvVersion = SpirvVersion { major: 1, minor: 1 };
    pub const V1_3: SpirvVersion = SpirvVersion { major: 1, minor: 3 };
    pub const V1_4: SpirvVersion = SpirvVersion { major: 1, minor: 4 };
    pub const V1_5: SpirvVersion = SpirvVersion { major: 1, minor: 5 };
    pub const V1_6: SpirvVersion = SpirvVersion { major: 1, minor: 6 };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetEnv {
    pub spirv_version: SpirvVersion,
    /// Vulkan semantics; OpenGL otherwise.
    pub vulkan: bool,
    pub vulkan_memory_model: bool,
}

impl Default for TargetEnv {
    fn default() -> Self {
        TargetEnv {
            spirv_version: SpirvVersion::V1_0,
            vulkan: true,
            vulkan_memory_model: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthLayout {
    Any,
    Greater,
    Less,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputPrimitive {
    Points,
    Lines,
    LinesAdjacency,
    Triangles,
    TrianglesAdjacency,
    Quads,
    Isolines,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPrimitive {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexSpacing {
    Equal,
    FractionalEven,
    FractionalOdd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexOrder {
    Cw,
    Ccw,
}

/// Stage-level layout declarations that become execution modes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionLayout {
    pub local_size: [u32; 3],
    pub local_size_spec_id: [Option<u32>; 3],
    pub origin_upper_left: bool,
    pub early_fragment_tests: bool,
    pub depth_layout: Option<DepthLayout>,
    pub invocations: Option<u32>,
    pub input_primitive: Option<InputPrimitive>,
    pub output_primitive: Option<OutputPrimitive>,
    pub output_vertices: Option<u32>,
    pub output_primitives: Option<u32>,
    pub vertex_spacing: Option<VertexSpacing>,
    pub vertex_order: Option<VertexOrder>,
    pub point_mode: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SymbolDecl {
    pub name: String,
    pub ty: Type,
    /// Default value of a specialization constant.
    pub value: Option<ConstantValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub return_type: Type,
    pub params: Vec<SymbolId>,
    pub body: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranslationUnit {
    pub stage: Stage,
    pub language: SourceLanguage,
    pub language_version: u32,
    pub target: TargetEnv,
    pub entry_point: String,
    pub structs: Vec<StructDef>,
    /// Indexed by `SymbolId`.
    pub symbols: Vec<SymbolDecl>,
    /// Indexed by `FunctionId`.
    pub functions: Vec<FunctionDef>,
    pub entry_function: FunctionId,
    /// Initializers of module-scope variables, run before the entry body.
    pub global_initializers: Vec<Node>,
    /// Every top-level variable, used or not.
    pub linker_objects: Vec<SymbolId>,
    /// Source extensions enabled by the shader.
    pub extensions: Vec<String>,
    pub layout: ExecutionLayout,
}

impl TranslationUnit {
    pub fn symbol(&self, id: SymbolId) -> Option<&SymbolDecl> {
        self.symbols.get(id.0 as usize)
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionDef> {
        self.functions.get(id.0 as usize)
    }

    pub fn struct_def(&self, id: StructId) -> Option<&StructDef> {
        self.structs.get(id.0 as usize)
    }

    pub fn extension_enabled(&self, name: &str) -> bool {
        self.extensions.iter().any(|e| e == name)
    }

    /// Whether `member` exists in the IR aggregate: not hidden, and its
    /// gating extension (if any) is enabled.
    pub fn member_present(&self, member: &StructMember) -> bool {
        !member.hidden
            && member
                .required_extension
                .as_ref()
                .map_or(true, |ext| self.extension_enabled(ext))
    }
}
