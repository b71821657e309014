//! Lowering from the typed tree to a SPIR-V module.
//!
//! Functions are lowered on demand: every reachable function gets its id up
//! front so calls can reference callees that have not been emitted yet, and
//! `ensure_lowered` drives each body exactly once. Module-scope symbols are
//! bound the first time anything refers to them.

mod builtins;
mod control;
mod expr;
mod function;
mod types;

use crate::access_chain::{AccessChain, CoherencyFlags};
use crate::ast::{
    BasicType, ConstantValue, DepthLayout, FunctionId, InputPrimitive, OutputPrimitive,
    SourceLanguage, Stage, StorageQualifier, StructId, SymbolDecl, SymbolId, TargetEnv, TranslationUnit, Type,
    VertexOrder, VertexSpacing,
};
use crate::constructor::Constructor;
use crate::decorations;
use crate::diags::Diagnostics;
use crate::error::{CompilerError, Result};
use crate::options::LowerOptions;
use crate::visitor;
use indexmap::IndexSet;
use log::{debug, trace};
use rspirv::dr::Module;
use rspirv::spirv::{self, BuiltIn, Decoration, ExecutionMode, StorageClass, Word};
use std::collections::{HashMap, HashSet};

pub use expr::Lowered;
pub(crate) use function::{FunctionInfo, ParamPolicy};
pub(crate) use types::StructKey;

/// Result of lowering a translation unit.
#[derive(Debug)]
pub struct LowerOutput {
    pub words: Vec<u32>,
    pub module: Module,
    pub diagnostics: Diagnostics,
}

/// How a symbol is reached from lowered code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SymbolBinding {
    /// Pointer to storage holding a value of `pointee`.
    Variable {
        ptr: Word,
        pointee: Word,
        storage: StorageClass,
    },
    /// SSA value, e.g. a specialization constant or a `const in` parameter.
    Value { id: Word, ty: Word },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LowerState {
    NotStarted,
    InProgress,
    Done,
}

/// A buffer reference pointee: declared with a forward pointer, completed
/// once a full definition is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ForwardPointer {
    Declared(Word),
    Complete(Word),
}

/// Where `break` and `continue` go from inside a construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakTarget {
    Loop { merge: Word, continue_target: Word },
    Switch { merge: Word },
}

pub struct LowerCtx<'a> {
    unit: &'a TranslationUnit,
    target: TargetEnv,
    emit_source: bool,
    emit_uncalled_functions: bool,
    ctor: Constructor,
    diags: Diagnostics,

    symbols: HashMap<SymbolId, SymbolBinding>,
    functions: HashMap<FunctionId, FunctionInfo>,
    state: HashMap<FunctionId, LowerState>,
    globals: IndexSet<SymbolId>,

    struct_cache: HashMap<StructKey, Word>,
    /// Source member index -> IR member index, `None` for members dropped
    /// from the aggregate.
    member_remap: HashMap<StructId, Vec<Option<u32>>>,
    forward_pointers: HashMap<StructId, ForwardPointer>,
    /// Structs whose member types are being produced right now.
    building: HashSet<StructId>,
    /// `{T, T}` result structs of the extended arithmetic instructions.
    result_structs: HashMap<Word, Word>,

    break_targets: Vec<BreakTarget>,
    /// Declared return type of the function being lowered.
    return_type: Option<Type>,
    depth_replacing: bool,
}

impl<'a> LowerCtx<'a> {
    pub fn new(unit: &'a TranslationUnit, options: &LowerOptions) -> Self {
        let mut target = unit.target;
        if let Some(version) = options.spirv_version {
            target.spirv_version = version;
        }
        LowerCtx {
            unit,
            target,
            emit_source: options.emit_source,
            emit_uncalled_functions: options.emit_uncalled_functions,
            ctor: Constructor::new(&target, options),
            diags: Diagnostics::new(),
            symbols: HashMap::new(),
            functions: HashMap::new(),
            state: HashMap::new(),
            globals: IndexSet::new(),
            struct_cache: HashMap::new(),
            member_remap: HashMap::new(),
            forward_pointers: HashMap::new(),
            building: HashSet::new(),
            result_structs: HashMap::new(),
            break_targets: Vec::new(),
            return_type: None,
            depth_replacing: false,
        }
    }

    fn stage(&self) -> Stage {
        self.unit.stage
    }

    fn symbol_decl(&self, id: SymbolId) -> Result<&'a SymbolDecl> {
        self.unit
            .symbol(id)
            .ok_or_else(|| CompilerError::Internal(format!("unknown symbol {}", id.0), None))
    }

    /// Lower a function body if it has not been lowered yet.
    fn ensure_lowered(&mut self, id: FunctionId) -> Result<()> {
        match self.state.get(&id).copied().unwrap_or(LowerState::NotStarted) {
            LowerState::Done | LowerState::InProgress => Ok(()),
            LowerState::NotStarted => {
                self.state.insert(id, LowerState::InProgress);
                self.lower_function(id)?;
                self.state.insert(id, LowerState::Done);
                Ok(())
            }
        }
    }

    pub fn run(mut self) -> Result<LowerOutput> {
        let unit = self.unit;
        let (model, needs) = decorations::execution_model(unit.stage);
        self.ctor.apply(needs);
        if self.emit_source {
            self.emit_source_info();
        }

        let functions: IndexSet<FunctionId> = if self.emit_uncalled_functions {
            let mut all = IndexSet::new();
            all.insert(unit.entry_function);
            all.extend((0..unit.functions.len() as u32).map(FunctionId));
            all
        } else {
            visitor::reachable_functions(unit)
        };
        debug!("lowering {} function(s) for {:?}", functions.len(), unit.stage);
        for &id in &functions {
            self.declare_function(id)?;
        }

        // Every top-level variable exists in the module, used or not.
        for &id in &unit.linker_objects {
            self.symbol_binding(id)?;
        }

        for &id in &functions {
            self.ensure_lowered(id)?;
        }

        let entry = self.function_info(unit.entry_function)?.id;
        let interface = self.entry_interface(&functions);
        self.ctor
            .builder
            .entry_point(model, entry, unit.entry_point.clone(), interface);
        self.execution_modes(entry)?;
        self.complete_forward_pointers()?;

        let (words, module) = self.ctor.finish()?;
        Ok(LowerOutput {
            words,
            module,
            diagnostics: self.diags,
        })
    }

    fn emit_source_info(&mut self) {
        let language = match self.unit.language {
            SourceLanguage::Glsl => spirv::SourceLanguage::GLSL,
            SourceLanguage::Essl => spirv::SourceLanguage::ESSL,
            SourceLanguage::Hlsl => spirv::SourceLanguage::HLSL,
        };
        self.ctor
            .builder
            .source(language, self.unit.language_version, None, None::<String>);
        for ext in &self.unit.extensions {
            self.ctor.builder.source_extension(ext.clone());
        }
    }

    /// Interface variables of the entry point. Before 1.4 only inputs and
    /// outputs are listed; from 1.4 every statically used global is.
    fn entry_interface(&self, functions: &IndexSet<FunctionId>) -> Vec<Word> {
        let declared = self.ctor.interface_variables();
        if self.ctor.version() < crate::ast::SpirvVersion::V1_4 {
            return declared;
        }
        let used: IndexSet<Word> = visitor::referenced_symbols(self.unit, functions)
            .into_iter()
            .filter(|id| self.globals.contains(id))
            .filter_map(|id| match self.symbols.get(&id) {
                Some(SymbolBinding::Variable { ptr, .. }) => Some(*ptr),
                _ => None,
            })
            .collect();
        declared.into_iter().filter(|v| used.contains(v)).collect()
    }

    // --- Symbols ---

    /// Binding for a symbol, creating its storage on first reference.
    fn symbol_binding(&mut self, id: SymbolId) -> Result<SymbolBinding> {
        if let Some(binding) = self.symbols.get(&id) {
            return Ok(*binding);
        }
        let decl = self.symbol_decl(id)?;
        let q = &decl.ty.qualifier;
        let binding = if q.spec_constant {
            self.spec_constant(decl)?
        } else if q.storage == StorageQualifier::Const && decl.value.is_some() {
            let ty = self.value_type(&decl.ty)?;
            let value = decl.value.as_ref().map(|v| self.constant(v, &decl.ty)).transpose()?;
            SymbolBinding::Value {
                id: value.unwrap_or_else(|| self.ctor.const_null(ty)),
                ty,
            }
        } else if self.is_global(id, decl) {
            self.globals.insert(id);
            self.declare_global(decl)?
        } else {
            let ty = self.value_type(&decl.ty)?;
            let ptr = self.ctor.declare_variable(&decl.name, ty)?;
            self.decorate_local(ptr, &decl.ty);
            SymbolBinding::Variable {
                ptr,
                pointee: ty,
                storage: StorageClass::Function,
            }
        };
        trace!("bound symbol {} ({}) as {:?}", id.0, decl.name, binding);
        self.symbols.insert(id, binding);
        Ok(binding)
    }

    fn is_global(&self, id: SymbolId, decl: &SymbolDecl) -> bool {
        if self.unit.linker_objects.contains(&id) {
            return true;
        }
        !matches!(
            decl.ty.qualifier.storage,
            StorageQualifier::Temporary
                | StorageQualifier::In
                | StorageQualifier::Out
                | StorageQualifier::InOut
                | StorageQualifier::ConstIn
                | StorageQualifier::Const
        )
    }

    fn decorate_local(&mut self, ptr: Word, ty: &Type) {
        if let Some(d) = decorations::precision_decoration(ty.qualifier.precision) {
            self.ctor.decorate(ptr, d);
        }
    }

    fn spec_constant(&mut self, decl: &SymbolDecl) -> Result<SymbolBinding> {
        let ty = self.value_type(&decl.ty)?;
        let value = decl.value.clone().unwrap_or(ConstantValue::Int(0));
        let id = match &value {
            ConstantValue::Composite(parts) => {
                let element = self.constituent_types(&decl.ty, parts.len())?;
                let mut ids = Vec::with_capacity(parts.len());
                for (part, part_ty) in parts.iter().zip(&element) {
                    ids.push(self.constant(part, part_ty)?);
                }
                self.ctor.spec_const_composite(ty, ids)
            }
            scalar => {
                let bits = scalar_bits(scalar, &decl.ty);
                self.ctor.spec_const_bits(ty, bits)
            }
        };
        if let Some(spec_id) = decl.ty.qualifier.layout.spec_id {
            self.ctor.decorate_u32(id, Decoration::SpecId, spec_id);
        }
        self.ctor.name(id, &decl.name);
        Ok(SymbolBinding::Value { id, ty })
    }

    /// Packing and majorness a global's aggregate is laid out with.
    fn block_layout(&self, ty: &Type) -> (crate::ast::Packing, bool) {
        use crate::ast::Packing;
        let q = &ty.qualifier;
        let explicit = matches!(ty.basic, BasicType::Block(_))
            && (q.is_uniform_or_buffer() || q.layout.push_constant);
        if !explicit {
            return (Packing::None, false);
        }
        let packing = match q.layout.packing {
            p if p.is_explicit() => p,
            _ if q.storage == StorageQualifier::Buffer || q.layout.push_constant => Packing::Std430,
            _ => Packing::Std140,
        };
        let row_major = q.layout.matrix == crate::ast::MatrixLayout::RowMajor;
        (packing, row_major)
    }

    fn declare_global(&mut self, decl: &SymbolDecl) -> Result<SymbolBinding> {
        let ty = &decl.ty;
        let mut storage = decorations::storage_class(ty, &self.target);
        if storage == StorageClass::Function {
            storage = StorageClass::Private;
        }
        let (packing, row_major) = self.block_layout(ty);
        let pointee = self.type_of_layout(ty, packing, row_major, false)?;
        let ptr = self.ctor.global_variable(pointee, storage, &decl.name, None);
        self.decorate_global(ptr, ty, storage)?;
        debug!("global {} in {:?} -> %{}", decl.name, storage, ptr);
        Ok(SymbolBinding::Variable { ptr, pointee, storage })
    }

    fn decorate_global(&mut self, var: Word, ty: &Type, storage: StorageClass) -> Result<()> {
        let q = &ty.qualifier;
        let stage = self.stage();
        let layout = &q.layout;
        let is_payload = matches!(
            q.storage,
            StorageQualifier::RayPayload
                | StorageQualifier::RayPayloadIn
                | StorageQualifier::CallableData
                | StorageQualifier::CallableDataIn
                | StorageQualifier::HitAttribute
        );
        if !is_payload {
            if let Some(location) = layout.location {
                self.ctor.decorate_u32(var, Decoration::Location, location);
            }
        }
        if let Some(component) = layout.component {
            self.ctor.decorate_u32(var, Decoration::Component, component);
        }
        if let Some(index) = layout.input_attachment_index {
            self.ctor.decorate_u32(var, Decoration::InputAttachmentIndex, index);
        }
        if let Some(set) = layout.set {
            self.ctor.decorate_u32(var, Decoration::DescriptorSet, set);
        } else if layout.binding.is_some() && self.target.vulkan {
            self.ctor.decorate_u32(var, Decoration::DescriptorSet, 0);
        }
        if let Some(binding) = layout.binding {
            self.ctor.decorate_u32(var, Decoration::Binding, binding);
        }

        let (builtin, needs) = decorations::builtin(q.builtin, stage, false);
        self.ctor.apply(needs);
        if let Some(builtin) = builtin {
            self.ctor.decorate_builtin(var, builtin);
            if builtin == BuiltIn::FragDepth {
                self.depth_replacing = true;
            }
            if builtin == BuiltIn::HelperInvocation && self.ctor.version() >= crate::ast::SpirvVersion::V1_6 {
                self.ctor.decorate(var, Decoration::Volatile);
            }
        }

        let flat_allowed = match storage {
            StorageClass::Input => stage != Stage::Vertex,
            StorageClass::Output => stage != Stage::Fragment,
            _ => false,
        };
        if flat_allowed {
            if let Some(d) = decorations::interpolation_decoration(q.interpolation) {
                self.ctor.decorate(var, d);
            }
        }
        let (aux, needs) = decorations::aux_storage_decoration(q.aux, stage);
        if let Some(d) = aux {
            self.ctor.apply(needs);
            self.ctor.decorate(var, d);
        }
        if let Some(d) = decorations::invariant_decoration(q) {
            self.ctor.decorate(var, d);
        }
        if let Some(d) = decorations::precision_decoration(q.precision) {
            self.ctor.decorate(var, d);
        }
        if !matches!(ty.basic, BasicType::Block(_)) {
            for d in decorations::memory_decorations(q.memory, self.ctor.vulkan_memory_model()) {
                self.ctor.decorate(var, d);
            }
            if let Some(offset) = layout.xfb_offset {
                self.ctor.decorate_u32(var, Decoration::Offset, offset);
            }
        }
        if let Some(buffer) = layout.xfb_buffer {
            self.ctor.decorate_u32(var, Decoration::XfbBuffer, buffer);
            self.ctor.add_capability(spirv::Capability::TransformFeedback);
        }
        if let Some(stride) = layout.xfb_stride {
            self.ctor.decorate_u32(var, Decoration::XfbStride, stride);
        }
        Ok(())
    }

    /// Chain designating a symbol's storage or value.
    fn symbol_chain(&mut self, id: SymbolId) -> Result<AccessChain> {
        let binding = self.symbol_binding(id)?;
        let decl = self.symbol_decl(id)?;
        let is_image = matches!(decl.ty.basic, BasicType::Sampler(_));
        Ok(match binding {
            SymbolBinding::Variable { ptr, pointee, storage } => AccessChain::lvalue(ptr, pointee, storage)
                .with_coherency(CoherencyFlags::from_qualifier(&decl.ty.qualifier, is_image)),
            SymbolBinding::Value { id, ty } => AccessChain::rvalue(id, ty),
        })
    }

    // --- Execution modes ---

    fn execution_modes(&mut self, entry: Word) -> Result<()> {
        let unit = self.unit;
        let layout = &unit.layout;
        let mut modes: Vec<(ExecutionMode, Vec<u32>)> = Vec::new();
        match self.stage() {
            Stage::Fragment => {
                let origin = if self.target.vulkan || layout.origin_upper_left {
                    ExecutionMode::OriginUpperLeft
                } else {
                    ExecutionMode::OriginLowerLeft
                };
                modes.push((origin, vec![]));
                if layout.early_fragment_tests {
                    modes.push((ExecutionMode::EarlyFragmentTests, vec![]));
                }
                if self.depth_replacing {
                    modes.push((ExecutionMode::DepthReplacing, vec![]));
                }
                match layout.depth_layout {
                    Some(DepthLayout::Greater) => modes.push((ExecutionMode::DepthGreater, vec![])),
                    Some(DepthLayout::Less) => modes.push((ExecutionMode::DepthLess, vec![])),
                    Some(DepthLayout::Unchanged) => modes.push((ExecutionMode::DepthUnchanged, vec![])),
                    Some(DepthLayout::Any) | None => {}
                }
            }
            Stage::Compute | Stage::Task | Stage::Mesh => {
                let size = layout.local_size.map(|s| s.max(1));
                modes.push((ExecutionMode::LocalSize, size.to_vec()));
                if layout.local_size_spec_id.iter().any(Option::is_some) {
                    self.workgroup_size_constant(size)?;
                }
                if self.stage() == Stage::Mesh {
                    if let Some(n) = layout.output_vertices {
                        modes.push((ExecutionMode::OutputVertices, vec![n]));
                    }
                    if let Some(n) = layout.output_primitives {
                        modes.push((ExecutionMode::OutputPrimitivesEXT, vec![n]));
                    }
                    match layout.output_primitive {
                        Some(OutputPrimitive::Points) => modes.push((ExecutionMode::OutputPoints, vec![])),
                        Some(OutputPrimitive::Lines | OutputPrimitive::LineStrip) => {
                            modes.push((ExecutionMode::OutputLinesEXT, vec![]))
                        }
                        Some(OutputPrimitive::Triangles | OutputPrimitive::TriangleStrip) => {
                            modes.push((ExecutionMode::OutputTrianglesEXT, vec![]))
                        }
                        None => {}
                    }
                }
            }
            Stage::Geometry => {
                modes.push((ExecutionMode::Invocations, vec![layout.invocations.unwrap_or(1)]));
                match layout.input_primitive {
                    Some(InputPrimitive::Points) => modes.push((ExecutionMode::InputPoints, vec![])),
                    Some(InputPrimitive::Lines) => modes.push((ExecutionMode::InputLines, vec![])),
                    Some(InputPrimitive::LinesAdjacency) => modes.push((ExecutionMode::InputLinesAdjacency, vec![])),
                    Some(InputPrimitive::Triangles) => modes.push((ExecutionMode::Triangles, vec![])),
                    Some(InputPrimitive::TrianglesAdjacency) => {
                        modes.push((ExecutionMode::InputTrianglesAdjacency, vec![]))
                    }
                    Some(InputPrimitive::Quads | InputPrimitive::Isolines) | None => {}
                }
                match layout.output_primitive {
                    Some(OutputPrimitive::Points) => modes.push((ExecutionMode::OutputPoints, vec![])),
                    Some(OutputPrimitive::LineStrip | OutputPrimitive::Lines) => {
                        modes.push((ExecutionMode::OutputLineStrip, vec![]))
                    }
                    Some(OutputPrimitive::TriangleStrip | OutputPrimitive::Triangles) => {
                        modes.push((ExecutionMode::OutputTriangleStrip, vec![]))
                    }
                    None => {}
                }
                if let Some(n) = layout.output_vertices {
                    modes.push((ExecutionMode::OutputVertices, vec![n]));
                }
            }
            Stage::TessControl => {
                if let Some(n) = layout.output_vertices {
                    modes.push((ExecutionMode::OutputVertices, vec![n]));
                }
            }
            Stage::TessEvaluation => {
                match layout.input_primitive {
                    Some(InputPrimitive::Triangles) => modes.push((ExecutionMode::Triangles, vec![])),
                    Some(InputPrimitive::Quads) => modes.push((ExecutionMode::Quads, vec![])),
                    Some(InputPrimitive::Isolines) => modes.push((ExecutionMode::Isolines, vec![])),
                    _ => {}
                }
                match layout.vertex_spacing {
                    Some(VertexSpacing::Equal) => modes.push((ExecutionMode::SpacingEqual, vec![])),
                    Some(VertexSpacing::FractionalEven) => {
                        modes.push((ExecutionMode::SpacingFractionalEven, vec![]))
                    }
                    Some(VertexSpacing::FractionalOdd) => modes.push((ExecutionMode::SpacingFractionalOdd, vec![])),
                    None => {}
                }
                match layout.vertex_order {
                    Some(VertexOrder::Cw) => modes.push((ExecutionMode::VertexOrderCw, vec![])),
                    Some(VertexOrder::Ccw) => modes.push((ExecutionMode::VertexOrderCcw, vec![])),
                    None => {}
                }
                if layout.point_mode {
                    modes.push((ExecutionMode::PointMode, vec![]));
                }
            }
            Stage::Vertex
            | Stage::RayGen
            | Stage::Intersect
            | Stage::AnyHit
            | Stage::ClosestHit
            | Stage::Miss
            | Stage::Callable => {}
        }
        for (mode, literals) in modes {
            self.ctor.builder.execution_mode(entry, mode, literals);
        }
        Ok(())
    }

    /// `WorkgroupSize` built-in made of specialization constants where the
    /// source gave a specialization id.
    fn workgroup_size_constant(&mut self, size: [u32; 3]) -> Result<()> {
        let uint = self.ctor.type_u32();
        let uvec3 = self.ctor.type_vector(uint, 3);
        let mut parts = Vec::with_capacity(3);
        let spec_ids = self.unit.layout.local_size_spec_id;
        for (dim, spec_id) in size.iter().zip(spec_ids) {
            let id = match spec_id {
                Some(spec_id) => {
                    let id = self.ctor.spec_const_bits(uint, u64::from(*dim));
                    self.ctor.decorate_u32(id, Decoration::SpecId, spec_id);
                    id
                }
                None => self.ctor.const_u32(*dim),
            };
            parts.push(id);
        }
        let composite = self.ctor.spec_const_composite(uvec3, parts);
        self.ctor.decorate_builtin(composite, BuiltIn::WorkgroupSize);
        Ok(())
    }
}

/// Bit pattern of a scalar constant in the representation of `ty`.
pub(crate) fn scalar_bits(value: &ConstantValue, ty: &Type) -> u64 {
    let as_f64 = match *value {
        ConstantValue::Bool(b) => f64::from(u8::from(b)),
        ConstantValue::Int(v) => v as f64,
        ConstantValue::Uint(v) => v as f64,
        ConstantValue::Float(v) => v,
        ConstantValue::Composite(_) => 0.0,
    };
    let as_i64 = match *value {
        ConstantValue::Bool(b) => i64::from(b),
        ConstantValue::Int(v) => v,
        ConstantValue::Uint(v) => v as i64,
        ConstantValue::Float(v) => v as i64,
        ConstantValue::Composite(_) => 0,
    };
    match ty.basic {
        BasicType::Bool => u64::from(as_i64 != 0),
        BasicType::Float(64) => as_f64.to_bits(),
        BasicType::Float(16) => u64::from(half::f16::from_f64(as_f64).to_bits()),
        BasicType::Float(_) => u64::from((as_f64 as f32).to_bits()),
        // narrow signed literals are sign-extended through the 32-bit word
        BasicType::Int(w) if w < 32 => {
            let shift = 64 - w;
            u64::from(((as_i64 << shift) >> shift) as i32 as u32)
        }
        BasicType::Int(w) | BasicType::Uint(w) if w < 64 => (as_i64 as u64) & ((1u64 << w) - 1),
        _ => as_i64 as u64,
    }
}

/// Lower a translation unit to a SPIR-V module.
pub fn lower(unit: &TranslationUnit, options: &LowerOptions) -> Result<LowerOutput> {
    let ctx = LowerCtx::new(unit, options);
    ctx.run()
}
