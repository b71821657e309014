//! Typed tree nodes and the operator enumerations they carry.

use super::{FunctionId, Span, SymbolId, Type};

#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Composite(Vec<ConstantValue>),
}

impl ConstantValue {
    pub fn as_u32(&self) -> Option<u32> {
        match *self {
            ConstantValue::Int(v) => Some(v as u32),
            ConstantValue::Uint(v) => Some(v as u32),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    ShiftLeft,
    ShiftRight,
    BitAnd,
    BitOr,
    BitXor,
    Equal,
    NotEqual,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    LogicalAnd,
    LogicalOr,
    LogicalXor,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    ShiftLeftAssign,
    ShiftRightAssign,
    AndAssign,
    OrAssign,
    XorAssign,
    /// Dynamic array/vector/matrix index.
    Index,
    /// Index by a constant right operand.
    IndexDirect,
    /// Struct member selection; the right operand is the constant source
    /// member index.
    IndexStruct,
    VectorTimesScalar,
    MatrixTimesScalar,
    VectorTimesMatrix,
    MatrixTimesVector,
    MatrixTimesMatrix,
}

impl BinaryOp {
    pub fn is_assignment(self) -> bool {
        self.compound_base().is_some() || self == BinaryOp::Assign
    }

    /// For `a op= b` the arithmetic applied before the store.
    pub fn compound_base(self) -> Option<BinaryOp> {
        use BinaryOp::*;
        match self {
            AddAssign => Some(Add),
            SubAssign => Some(Sub),
            MulAssign => Some(Mul),
            DivAssign => Some(Div),
            ModAssign => Some(Mod),
            ShiftLeftAssign => Some(ShiftLeft),
            ShiftRightAssign => Some(ShiftRight),
            AndAssign => Some(BitAnd),
            OrAssign => Some(BitOr),
            XorAssign => Some(BitXor),
            _ => None,
        }
    }

    pub fn is_indexing(self) -> bool {
        matches!(self, BinaryOp::Index | BinaryOp::IndexDirect | BinaryOp::IndexStruct)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Negate,
    LogicalNot,
    BitwiseNot,
    PreIncrement,
    PreDecrement,
    PostIncrement,
    PostDecrement,
    /// Numeric or boolean conversion to the node type.
    Convert,
    /// `.length()` of a runtime-sized array.
    ArrayLength,
}

impl UnaryOp {
    pub fn writes_operand(self) -> bool {
        matches!(
            self,
            UnaryOp::PreIncrement
                | UnaryOp::PreDecrement
                | UnaryOp::PostIncrement
                | UnaryOp::PostDecrement
        )
    }
}

/// Built-in functions. Argument conventions follow the shading language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    // Angle and trigonometry
    Radians,
    Degrees,
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Atan2,
    Sinh,
    Cosh,
    Tanh,
    // Exponential
    Pow,
    Exp,
    Log,
    Exp2,
    Log2,
    Sqrt,
    InverseSqrt,
    // Common
    Abs,
    Sign,
    Floor,
    Trunc,
    Round,
    RoundEven,
    Ceil,
    Fract,
    Mod,
    Modf,
    Min,
    Max,
    Clamp,
    Mix,
    Step,
    SmoothStep,
    Fma,
    Frexp,
    Ldexp,
    IsNan,
    IsInf,
    FloatBitsToInt,
    FloatBitsToUint,
    IntBitsToFloat,
    UintBitsToFloat,
    // Packing
    PackHalf2x16,
    UnpackHalf2x16,
    PackUnorm4x8,
    UnpackUnorm4x8,
    // Geometric
    Length,
    Distance,
    Dot,
    Cross,
    Normalize,
    FaceForward,
    Reflect,
    Refract,
    // Matrix
    OuterProduct,
    Transpose,
    Determinant,
    Inverse,
    // Vector relational
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,
    VectorEqual,
    VectorNotEqual,
    Any,
    All,
    Not,
    // Integer
    UaddCarry,
    UsubBorrow,
    UmulExtended,
    ImulExtended,
    BitfieldExtract,
    BitfieldInsert,
    BitfieldReverse,
    BitCount,
    FindLsb,
    FindMsb,
    // Derivatives and interpolation
    DPdx,
    DPdy,
    Fwidth,
    InterpolateAtCentroid,
    InterpolateAtSample,
    InterpolateAtOffset,
    // Textures and images
    Texture,
    TextureLod,
    TextureGrad,
    TextureGather,
    TexelFetch,
    TextureSize,
    TextureQueryLevels,
    ImageLoad,
    ImageStore,
    ImageSize,
    ImageAtomicAdd,
    ImageAtomicExchange,
    SubpassLoad,
    // Atomics on memory
    AtomicAdd,
    AtomicMin,
    AtomicMax,
    AtomicAnd,
    AtomicOr,
    AtomicXor,
    AtomicExchange,
    AtomicCompSwap,
    AtomicLoad,
    AtomicStore,
    // Barriers
    Barrier,
    MemoryBarrier,
    MemoryBarrierBuffer,
    MemoryBarrierShared,
    MemoryBarrierImage,
    GroupMemoryBarrier,
    // Geometry
    EmitVertex,
    EndPrimitive,
    // Subgroups
    SubgroupBarrier,
    SubgroupElect,
    SubgroupAll,
    SubgroupAny,
    SubgroupBroadcastFirst,
    SubgroupAdd,
    SubgroupMin,
    SubgroupMax,
    // Ray queries
    RayQueryInitialize,
    RayQueryProceed,
    RayQueryTerminate,
    RayQueryGetIntersectionType,
    RayQueryGetIntersectionT,
    // Ray tracing pipeline
    TraceRay,
    ExecuteCallable,
    ReportIntersection,
    // Mesh and task shaders
    SetMeshOutputs,
    EmitMeshTasks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    Break,
    Continue,
    Return,
    /// `discard`
    Kill,
    TerminateInvocation,
    Demote,
    IgnoreIntersection,
    TerminateRay,
    /// Switch case label.
    Case(i64),
    /// Switch default label.
    Default,
}

impl BranchKind {
    pub fn is_label(self) -> bool {
        matches!(self, BranchKind::Case(_) | BranchKind::Default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopHints {
    pub unroll: bool,
    pub dont_unroll: bool,
    pub dependency_infinite: bool,
    pub dependency_length: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectionHints {
    pub flatten: bool,
    pub dont_flatten: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Symbol(SymbolId),
    Constant(ConstantValue),
    Binary {
        op: BinaryOp,
        left: Box<Node>,
        right: Box<Node>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    /// Vector swizzle with constant component selectors.
    Swizzle {
        base: Box<Node>,
        components: Vec<u32>,
    },
    Sequence(Vec<Node>),
    Call {
        function: FunctionId,
        args: Vec<Node>,
    },
    /// Constructor of the node type from the arguments.
    Construct(Vec<Node>),
    Builtin {
        op: BuiltinOp,
        args: Vec<Node>,
    },
    /// `if` statement (void node type) or `?:` expression.
    Selection {
        condition: Box<Node>,
        then_branch: Option<Box<Node>>,
        else_branch: Option<Box<Node>>,
        /// Both sides must be evaluated regardless of the condition.
        evaluate_both: bool,
        hints: SelectionHints,
    },
    Switch {
        selector: Box<Node>,
        /// Flat statement list where case/default branches act as labels.
        body: Vec<Node>,
        hints: SelectionHints,
    },
    Loop {
        test: Option<Box<Node>>,
        body: Option<Box<Node>>,
        /// Continue expression, e.g. the increment of a `for`.
        terminal: Option<Box<Node>>,
        test_first: bool,
        hints: LoopHints,
    },
    Branch {
        kind: BranchKind,
        value: Option<Box<Node>>,
    },
    /// Local variable declaration.
    Declare {
        symbol: SymbolId,
        init: Option<Box<Node>>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub ty: Type,
    pub span: Span,
}

impl Node {
    pub fn new(kind: NodeKind, ty: Type) -> Self {
        Node {
            kind,
            ty,
            span: Span::default(),
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn as_constant(&self) -> Option<&ConstantValue> {
        match &self.kind {
            NodeKind::Constant(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self.kind {
            NodeKind::Symbol(id) => Some(id),
            _ => None,
        }
    }
}
