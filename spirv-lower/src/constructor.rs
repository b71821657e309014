//! Constructor wraps `rspirv::dr::Builder` with the bookkeeping the lowering
//! needs on top of raw emission:
//! - an arena describing every IR type id it created, so address and
//!   representation logic can reason about IR structure
//! - constant and type caches
//! - ordered, idempotent capability and extension sets
//! - function/block management with a dedicated variables block

use crate::ast::{SpirvVersion, TargetEnv};
use crate::decorations::{Extension, Needs};
use crate::error::{CompilerError, Result};
use crate::options::LowerOptions;
use crate::postprocess;
use indexmap::IndexSet;
use rspirv::binary::Assemble;
use rspirv::dr::{Builder, InsertPoint, Instruction, Module, Operand};
use rspirv::spirv::{self, Capability, Decoration, Op, StorageClass, Word};
use std::collections::HashMap;

/// What the constructor knows about an IR type id.
#[derive(Debug, Clone, PartialEq)]
pub enum IrType {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Word, count: u32 },
    Matrix { column: Word, columns: u32 },
    Array { element: Word, length: Word, stride: Option<u32> },
    RuntimeArray { element: Word, stride: Option<u32> },
    Struct { members: Vec<Word> },
    Pointer { storage: StorageClass, pointee: Option<Word> },
    Image { sampled: Word, dim: spirv::Dim },
    SampledImage { image: Word },
    Sampler,
    AccelerationStructure,
    RayQuery,
    Function { ret: Word, params: Vec<Word> },
}

/// Constant value key for the constant cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ConstKey {
    Scalar(Word, u64),
    Null(Word),
}

pub struct Constructor {
    pub builder: Builder,
    version: SpirvVersion,
    vulkan_memory_model: bool,
    debug_names: bool,

    types: HashMap<Word, IrType>,
    ptr_type_cache: HashMap<(StorageClass, Word), Word>,
    array_type_cache: HashMap<(Word, Word, Option<u32>), Word>,
    runtime_array_cache: HashMap<(Word, Option<u32>), Word>,
    opaque_type_cache: HashMap<Op, Word>,
    const_cache: HashMap<ConstKey, Word>,
    const_values: HashMap<Word, u64>,
    composite_const_cache: HashMap<(Word, Vec<Word>), Word>,

    capabilities: IndexSet<Capability>,
    extensions: IndexSet<&'static str>,
    ext_imports: HashMap<&'static str, Word>,
    addressing_model: spirv::AddressingModel,

    // Current function state
    current_block: Option<Word>,
    reachable: bool,
    variables_block: Option<Word>,
    first_code_block: Option<Word>,

    /// Global variables listed on the entry point.
    interface: IndexSet<Word>,
}

impl Constructor {
    pub fn new(target: &TargetEnv, options: &LowerOptions) -> Self {
        let version = options.spirv_version.unwrap_or(target.spirv_version);
        let mut builder = Builder::new();
        builder.set_version(version.major, version.minor);
        if let Some(header) = builder.module_mut().header.as_mut() {
            header.generator = options.generator;
        }

        let mut ctor = Constructor {
            builder,
            version,
            vulkan_memory_model: target.vulkan_memory_model,
            debug_names: options.debug_names,
            types: HashMap::new(),
            ptr_type_cache: HashMap::new(),
            array_type_cache: HashMap::new(),
            runtime_array_cache: HashMap::new(),
            opaque_type_cache: HashMap::new(),
            const_cache: HashMap::new(),
            const_values: HashMap::new(),
            composite_const_cache: HashMap::new(),
            capabilities: IndexSet::new(),
            extensions: IndexSet::new(),
            ext_imports: HashMap::new(),
            addressing_model: spirv::AddressingModel::Logical,
            current_block: None,
            reachable: false,
            variables_block: None,
            first_code_block: None,
            interface: IndexSet::new(),
        };
        ctor.add_capability(Capability::Shader);
        if target.vulkan_memory_model {
            ctor.add_capability(Capability::VulkanMemoryModel);
            ctor.add_incorporated_extension(crate::decorations::VULKAN_MEMORY_MODEL);
        }
        ctor
    }

    pub fn version(&self) -> SpirvVersion {
        self.version
    }

    pub fn vulkan_memory_model(&self) -> bool {
        self.vulkan_memory_model
    }

    // --- Capabilities and extensions ---

    /// Register a capability; a second registration is a no-op.
    pub fn add_capability(&mut self, cap: Capability) {
        if self.capabilities.insert(cap) {
            log::debug!("capability {:?}", cap);
            self.builder.capability(cap);
        }
    }

    pub fn add_extension(&mut self, name: &'static str) {
        if self.extensions.insert(name) {
            log::debug!("extension {}", name);
            self.builder.extension(name);
        }
    }

    /// Add an extension only when the target predates its promotion to core.
    pub fn add_incorporated_extension(&mut self, ext: Extension) {
        match ext.core_in {
            Some(core) if self.version >= core => {}
            _ => self.add_extension(ext.name),
        }
    }

    pub fn apply(&mut self, needs: Needs) {
        for cap in needs.capabilities {
            self.add_capability(cap);
        }
        for ext in needs.extensions {
            self.add_incorporated_extension(ext);
        }
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.capabilities.iter()
    }

    pub fn extensions(&self) -> impl Iterator<Item = &&'static str> {
        self.extensions.iter()
    }

    pub fn use_physical_storage_buffer(&mut self) {
        self.add_capability(Capability::PhysicalStorageBufferAddresses);
        self.add_incorporated_extension(crate::decorations::PHYSICAL_STORAGE_BUFFER);
        self.addressing_model = spirv::AddressingModel::PhysicalStorageBuffer64;
    }

    pub fn import_ext_inst(&mut self, name: &'static str) -> Word {
        if let Some(&id) = self.ext_imports.get(name) {
            return id;
        }
        let id = self.builder.ext_inst_import(name);
        self.ext_imports.insert(name, id);
        id
    }

    pub fn glsl_std_450(&mut self) -> Word {
        self.import_ext_inst("GLSL.std.450")
    }

    // --- Types ---

    fn record(&mut self, id: Word, ty: IrType) -> Word {
        self.types.entry(id).or_insert(ty);
        id
    }

    pub fn ir_type(&self, id: Word) -> Option<&IrType> {
        self.types.get(&id)
    }

    pub fn type_void(&mut self) -> Word {
        let id = self.builder.type_void();
        self.record(id, IrType::Void)
    }

    pub fn type_bool(&mut self) -> Word {
        let id = self.builder.type_bool();
        self.record(id, IrType::Bool)
    }

    pub fn type_int(&mut self, width: u32, signed: bool) -> Word {
        if width == 64 {
            self.add_capability(Capability::Int64);
        }
        let id = self.builder.type_int(width, signed as u32);
        self.record(id, IrType::Int { width, signed })
    }

    pub fn type_float(&mut self, width: u32) -> Word {
        if width == 64 {
            self.add_capability(Capability::Float64);
        }
        let id = self.builder.type_float(width);
        self.record(id, IrType::Float { width })
    }

    pub fn type_u32(&mut self) -> Word {
        self.type_int(32, false)
    }

    pub fn type_i32(&mut self) -> Word {
        self.type_int(32, true)
    }

    pub fn type_vector(&mut self, component: Word, count: u32) -> Word {
        if count <= 1 {
            return component;
        }
        let id = self.builder.type_vector(component, count);
        self.record(id, IrType::Vector { component, count })
    }

    pub fn type_matrix(&mut self, column: Word, columns: u32) -> Word {
        let id = self.builder.type_matrix(column, columns);
        self.record(id, IrType::Matrix { column, columns })
    }

    pub fn type_pointer(&mut self, storage: StorageClass, pointee: Word) -> Word {
        if let Some(&id) = self.ptr_type_cache.get(&(storage, pointee)) {
            return id;
        }
        let id = self.builder.type_pointer(None, storage, pointee);
        self.ptr_type_cache.insert((storage, pointee), id);
        self.record(
            id,
            IrType::Pointer {
                storage,
                pointee: Some(pointee),
            },
        )
    }

    /// Declare a pointer type whose pointee is defined later.
    pub fn type_forward_pointer(&mut self, storage: StorageClass) -> Word {
        let id = self.builder.id();
        self.builder.module_mut().types_global_values.push(Instruction::new(
            Op::TypeForwardPointer,
            None,
            None,
            vec![Operand::IdRef(id), Operand::StorageClass(storage)],
        ));
        log::debug!("forward pointer %{} in {:?}", id, storage);
        self.record(id, IrType::Pointer { storage, pointee: None })
    }

    /// Emit the `OpTypePointer` completing a forward pointer.
    pub fn complete_forward_pointer(&mut self, id: Word, pointee: Word) -> Result<()> {
        let storage = match self.types.get(&id) {
            Some(IrType::Pointer { storage, pointee: None }) => *storage,
            _ => {
                return Err(CompilerError::Internal(
                    format!("%{} is not an open forward pointer", id),
                    None,
                ))
            }
        };
        self.builder.type_pointer(Some(id), storage, pointee);
        self.types.insert(
            id,
            IrType::Pointer {
                storage,
                pointee: Some(pointee),
            },
        );
        Ok(())
    }

    /// Sized array. Strided arrays get their own id per stride.
    pub fn type_array(&mut self, element: Word, length: Word, stride: Option<u32>) -> Word {
        let key = (element, length, stride);
        if let Some(&id) = self.array_type_cache.get(&key) {
            return id;
        }
        let id = match stride {
            Some(stride) => {
                let id = self.builder.id();
                self.builder.type_array_id(Some(id), element, length);
                self.decorate_u32(id, Decoration::ArrayStride, stride);
                id
            }
            None => self.builder.type_array(element, length),
        };
        self.array_type_cache.insert(key, id);
        self.record(id, IrType::Array { element, length, stride })
    }

    pub fn type_runtime_array(&mut self, element: Word, stride: Option<u32>) -> Word {
        let key = (element, stride);
        if let Some(&id) = self.runtime_array_cache.get(&key) {
            return id;
        }
        let id = match stride {
            Some(stride) => {
                let id = self.builder.id();
                self.builder.type_runtime_array_id(Some(id), element);
                self.decorate_u32(id, Decoration::ArrayStride, stride);
                id
            }
            None => self.builder.type_runtime_array(element),
        };
        self.runtime_array_cache.insert(key, id);
        self.record(id, IrType::RuntimeArray { element, stride })
    }

    /// Always a fresh struct id; deduplication is the caller's business
    /// because decorations hang off the id.
    pub fn type_struct(&mut self, members: Vec<Word>, name: &str) -> Word {
        let id = self.builder.id();
        self.builder.type_struct_id(Some(id), members.iter().copied());
        self.name(id, name);
        log::debug!("struct {} -> %{} ({} members)", name, id, members.len());
        self.record(id, IrType::Struct { members })
    }

    pub fn type_function(&mut self, ret: Word, params: Vec<Word>) -> Word {
        let id = self.builder.type_function(ret, params.iter().copied());
        self.record(id, IrType::Function { ret, params })
    }

    pub fn type_sampler(&mut self) -> Word {
        let id = self.builder.type_sampler();
        self.record(id, IrType::Sampler)
    }

    pub fn type_image(
        &mut self,
        sampled: Word,
        dim: spirv::Dim,
        depth: bool,
        arrayed: bool,
        ms: bool,
        sampled_kind: u32,
        format: spirv::ImageFormat,
    ) -> Word {
        let id = self.builder.type_image(
            sampled,
            dim,
            depth as u32,
            arrayed as u32,
            ms as u32,
            sampled_kind,
            format,
            None,
        );
        self.record(id, IrType::Image { sampled, dim })
    }

    pub fn type_sampled_image(&mut self, image: Word) -> Word {
        let id = self.builder.type_sampled_image(image);
        self.record(id, IrType::SampledImage { image })
    }

    fn opaque_type(&mut self, op: Op, ty: IrType) -> Word {
        if let Some(&id) = self.opaque_type_cache.get(&op) {
            return id;
        }
        let id = self.builder.id();
        self.builder
            .module_mut()
            .types_global_values
            .push(Instruction::new(op, None, Some(id), vec![]));
        self.opaque_type_cache.insert(op, id);
        self.record(id, ty)
    }

    pub fn type_acceleration_structure(&mut self) -> Word {
        self.opaque_type(Op::TypeAccelerationStructureKHR, IrType::AccelerationStructure)
    }

    pub fn type_ray_query(&mut self) -> Word {
        self.opaque_type(Op::TypeRayQueryKHR, IrType::RayQuery)
    }

    // --- Type queries ---

    /// Type reached by one access-chain step into `ty`.
    pub fn contained_type(&self, ty: Word, member: u32) -> Option<Word> {
        match self.types.get(&ty)? {
            IrType::Vector { component, .. } => Some(*component),
            IrType::Matrix { column, .. } => Some(*column),
            IrType::Array { element, .. } | IrType::RuntimeArray { element, .. } => Some(*element),
            IrType::Struct { members } => members.get(member as usize).copied(),
            IrType::Pointer { pointee, .. } => *pointee,
            _ => None,
        }
    }

    pub fn pointee(&self, ptr_ty: Word) -> Option<Word> {
        match self.types.get(&ptr_ty)? {
            IrType::Pointer { pointee, .. } => *pointee,
            _ => None,
        }
    }

    pub fn is_bool_type(&self, ty: Word) -> bool {
        matches!(self.types.get(&ty), Some(IrType::Bool))
    }

    pub fn is_vector_type(&self, ty: Word) -> bool {
        matches!(self.types.get(&ty), Some(IrType::Vector { .. }))
    }

    pub fn is_scalar_type(&self, ty: Word) -> bool {
        matches!(
            self.types.get(&ty),
            Some(IrType::Bool | IrType::Int { .. } | IrType::Float { .. })
        )
    }

    pub fn is_aggregate_type(&self, ty: Word) -> bool {
        matches!(
            self.types.get(&ty),
            Some(IrType::Struct { .. } | IrType::Array { .. } | IrType::RuntimeArray { .. })
        )
    }

    pub fn component_count(&self, ty: Word) -> u32 {
        match self.types.get(&ty) {
            Some(IrType::Vector { count, .. }) => *count,
            _ => 1,
        }
    }

    /// Scalar type of a scalar or vector type.
    pub fn scalar_of(&self, ty: Word) -> Word {
        match self.types.get(&ty) {
            Some(IrType::Vector { component, .. }) => *component,
            _ => ty,
        }
    }

    // --- Constants ---

    pub fn const_bool(&mut self, value: bool) -> Word {
        let ty = self.type_bool();
        let key = ConstKey::Scalar(ty, value as u64);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let id = if value {
            self.builder.constant_true(ty)
        } else {
            self.builder.constant_false(ty)
        };
        self.const_cache.insert(key, id);
        id
    }

    /// Scalar constant from raw bits; width comes from the type.
    pub fn const_bits(&mut self, ty: Word, bits: u64) -> Word {
        let key = ConstKey::Scalar(ty, bits);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let wide = matches!(
            self.types.get(&ty),
            Some(IrType::Int { width: 64, .. } | IrType::Float { width: 64 })
        );
        let id = if wide {
            self.builder.constant_bit64(ty, bits)
        } else {
            self.builder.constant_bit32(ty, bits as u32)
        };
        self.const_cache.insert(key, id);
        self.const_values.insert(id, bits);
        id
    }

    /// Raw bits of a non-specialization scalar constant created here.
    pub fn constant_literal(&self, id: Word) -> Option<u64> {
        self.const_values.get(&id).copied()
    }

    pub fn const_u32(&mut self, value: u32) -> Word {
        let ty = self.type_u32();
        self.const_bits(ty, value as u64)
    }

    pub fn const_i32(&mut self, value: i32) -> Word {
        let ty = self.type_i32();
        self.const_bits(ty, value as u32 as u64)
    }

    pub fn const_f32(&mut self, value: f32) -> Word {
        let ty = self.type_float(32);
        self.const_bits(ty, value.to_bits() as u64)
    }

    /// Constant 1 or 0 of a scalar or vector type, for increments and
    /// bool/uint conversion.
    pub fn const_splat(&mut self, ty: Word, bits: u64) -> Word {
        match self.types.get(&ty).cloned() {
            Some(IrType::Vector { component, count }) => {
                let c = self.const_splat(component, bits);
                self.const_composite(ty, vec![c; count as usize])
            }
            Some(IrType::Float { width }) => {
                let value = bits as f64;
                let raw = match width {
                    64 => value.to_bits(),
                    16 => u64::from(half::f16::from_f64(value).to_bits()),
                    _ => (value as f32).to_bits() as u64,
                };
                self.const_bits(ty, raw)
            }
            Some(IrType::Bool) => self.const_bool(bits != 0),
            _ => self.const_bits(ty, bits),
        }
    }

    pub fn const_composite(&mut self, ty: Word, constituents: Vec<Word>) -> Word {
        let key = (ty, constituents);
        if let Some(&id) = self.composite_const_cache.get(&key) {
            return id;
        }
        let id = self.builder.constant_composite(ty, key.1.iter().copied());
        self.composite_const_cache.insert(key, id);
        id
    }

    pub fn const_null(&mut self, ty: Word) -> Word {
        let key = ConstKey::Null(ty);
        if let Some(&id) = self.const_cache.get(&key) {
            return id;
        }
        let id = self.builder.constant_null(ty);
        self.const_cache.insert(key, id);
        id
    }

    /// Scalar specialization constant; never cached.
    pub fn spec_const_bits(&mut self, ty: Word, bits: u64) -> Word {
        if self.is_bool_type(ty) {
            return if bits != 0 {
                self.builder.spec_constant_true(ty)
            } else {
                self.builder.spec_constant_false(ty)
            };
        }
        let wide = matches!(
            self.types.get(&ty),
            Some(IrType::Int { width: 64, .. } | IrType::Float { width: 64 })
        );
        if wide {
            self.builder.spec_constant_bit64(ty, bits)
        } else {
            self.builder.spec_constant_bit32(ty, bits as u32)
        }
    }

    pub fn spec_const_composite(&mut self, ty: Word, constituents: Vec<Word>) -> Word {
        self.builder.spec_constant_composite(ty, constituents)
    }

    // --- Decorations and names ---

    pub fn decorate(&mut self, id: Word, decoration: Decoration) {
        self.builder.decorate(id, decoration, []);
    }

    pub fn decorate_u32(&mut self, id: Word, decoration: Decoration, value: u32) {
        self.builder.decorate(id, decoration, [Operand::LiteralBit32(value)]);
    }

    pub fn decorate_builtin(&mut self, id: Word, builtin: spirv::BuiltIn) {
        self.builder.decorate(id, Decoration::BuiltIn, [Operand::BuiltIn(builtin)]);
    }

    pub fn member_decorate(&mut self, id: Word, member: u32, decoration: Decoration) {
        self.builder.member_decorate(id, member, decoration, []);
    }

    pub fn member_decorate_u32(&mut self, id: Word, member: u32, decoration: Decoration, value: u32) {
        self.builder
            .member_decorate(id, member, decoration, [Operand::LiteralBit32(value)]);
    }

    pub fn member_decorate_builtin(&mut self, id: Word, member: u32, builtin: spirv::BuiltIn) {
        self.builder
            .member_decorate(id, member, Decoration::BuiltIn, [Operand::BuiltIn(builtin)]);
    }

    pub fn name(&mut self, id: Word, name: &str) {
        if self.debug_names && !name.is_empty() {
            self.builder.name(id, name);
        }
    }

    pub fn member_name(&mut self, id: Word, member: u32, name: &str) {
        if self.debug_names && !name.is_empty() {
            self.builder.member_name(id, member, name);
        }
    }

    // --- Variables ---

    /// Module-scope variable.
    pub fn global_variable(&mut self, value_type: Word, storage: StorageClass, name: &str, init: Option<Word>) -> Word {
        let ptr = self.type_pointer(storage, value_type);
        let id = self.builder.variable(ptr, None, storage, init);
        self.name(id, name);
        let listed = if self.version >= SpirvVersion::V1_4 {
            storage != StorageClass::Function
        } else {
            matches!(storage, StorageClass::Input | StorageClass::Output)
        };
        if listed {
            self.interface.insert(id);
        }
        id
    }

    pub fn interface_variables(&self) -> Vec<Word> {
        self.interface.iter().copied().collect()
    }

    /// Declare a function-local variable in the function's variables block.
    pub fn declare_variable(&mut self, name: &str, value_type: Word) -> Result<Word> {
        let ptr_type = self.type_pointer(StorageClass::Function, value_type);

        // Save current block
        let current_idx = self.builder.selected_block();

        let vars_block = match self.variables_block {
            Some(b) => b,
            None => {
                return Err(CompilerError::Internal(
                    "declare_variable called outside function".into(),
                    None,
                ))
            }
        };
        let vars_idx = self.block_index(vars_block)?;
        self.builder.select_block(Some(vars_idx))?;

        let var_id = self.builder.variable(ptr_type, None, StorageClass::Function, None);

        // Restore current block
        self.builder.select_block(current_idx)?;
        self.name(var_id, name);
        Ok(var_id)
    }

    fn block_index(&self, label: Word) -> Result<usize> {
        let func = self
            .builder
            .module_ref()
            .functions
            .last()
            .ok_or_else(|| CompilerError::Internal("no function under construction".into(), None))?;
        func.blocks
            .iter()
            .position(|b| b.label.as_ref().and_then(|l| l.result_id) == Some(label))
            .ok_or_else(|| CompilerError::Internal(format!("block %{} not found", label), None))
    }

    // --- Functions and blocks ---

    /// Begin a function with a pre-allocated id. Returns parameter ids.
    pub fn begin_function(
        &mut self,
        func_id: Word,
        name: &str,
        return_type: Word,
        param_types: &[Word],
    ) -> Result<Vec<Word>> {
        let func_type = self.type_function(return_type, param_types.to_vec());
        self.builder.begin_function(
            return_type,
            Some(func_id),
            spirv::FunctionControl::NONE,
            func_type,
        )?;
        self.name(func_id, name);

        let mut params = Vec::with_capacity(param_types.len());
        for &ty in param_types {
            params.push(self.builder.function_parameter(ty)?);
        }

        // Two blocks: one for variables, one for code
        let vars_block_id = self.builder.id();
        let code_block_id = self.builder.id();
        self.variables_block = Some(vars_block_id);
        self.first_code_block = Some(code_block_id);

        // Leave the variables block open; it is closed in end_function
        self.builder.begin_block(Some(vars_block_id))?;
        self.builder.select_block(None)?;

        self.builder.begin_block(Some(code_block_id))?;
        self.current_block = Some(code_block_id);
        self.reachable = true;
        Ok(params)
    }

    /// Close the variables block and the function.
    pub fn end_function(&mut self) -> Result<()> {
        if let (Some(vars_block), Some(code_block)) = (self.variables_block, self.first_code_block) {
            let idx = self.block_index(vars_block)?;
            self.builder.select_block(Some(idx))?;
            self.builder.branch(code_block)?;
        }
        self.builder.end_function()?;
        self.current_block = None;
        self.variables_block = None;
        self.first_code_block = None;
        Ok(())
    }

    pub fn new_block(&mut self) -> Word {
        self.builder.id()
    }

    pub fn begin_block(&mut self, block_id: Word) -> Result<()> {
        self.builder.begin_block(Some(block_id))?;
        self.current_block = Some(block_id);
        self.reachable = true;
        Ok(())
    }

    pub fn current_block(&self) -> Option<Word> {
        self.current_block
    }

    /// True while the selected block still lacks a terminator.
    pub fn block_open(&self) -> bool {
        self.builder.selected_block().is_some()
    }

    /// Whether the current block can be reached from the function entry.
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Treat the current block as dead, e.g. a merge block no path reaches.
    pub fn mark_unreachable(&mut self) {
        self.reachable = false;
    }

    /// Continue emission after a terminator in a block nothing branches to.
    pub fn begin_unreachable_block(&mut self) -> Result<()> {
        let id = self.new_block();
        self.begin_block(id)?;
        self.reachable = false;
        Ok(())
    }

    /// Branch to `target` from live code; dead blocks end in OpUnreachable.
    pub fn close_block(&mut self, target: Word) -> Result<()> {
        if self.reachable {
            self.branch(target)
        } else {
            self.close_with(Op::Unreachable, vec![])
        }
    }

    pub fn branch(&mut self, target: Word) -> Result<()> {
        self.builder.branch(target)?;
        Ok(())
    }

    /// Conditional branch with a selection merge.
    pub fn branch_conditional(&mut self, cond: Word, true_block: Word, false_block: Word, merge_block: Word) -> Result<()> {
        self.builder.selection_merge(merge_block, spirv::SelectionControl::NONE)?;
        self.builder.branch_conditional(cond, true_block, false_block, [])?;
        Ok(())
    }

    // --- Generic emission ---

    /// Emit an instruction producing a value of `result_type`.
    pub fn emit(&mut self, op: Op, result_type: Word, operands: Vec<Operand>) -> Result<Word> {
        let id = self.builder.id();
        let inst = Instruction::new(op, Some(result_type), Some(id), operands);
        self.builder.insert_into_block(InsertPoint::End, inst)?;
        Ok(id)
    }

    /// Emit an instruction without a result.
    pub fn emit_void(&mut self, op: Op, operands: Vec<Operand>) -> Result<()> {
        let inst = Instruction::new(op, None, None, operands);
        self.builder.insert_into_block(InsertPoint::End, inst)?;
        Ok(())
    }

    /// Emit a block terminator and leave no block selected.
    pub fn close_with(&mut self, op: Op, operands: Vec<Operand>) -> Result<()> {
        self.emit_void(op, operands)?;
        self.builder.select_block(None)?;
        self.current_block = None;
        Ok(())
    }

    /// Emit a block terminator, then continue in a fresh unreachable block.
    pub fn emit_terminator(&mut self, op: Op, operands: Vec<Operand>) -> Result<()> {
        self.close_with(op, operands)?;
        self.begin_unreachable_block()
    }

    /// Set the memory model, run the final post-processing step and assemble.
    pub fn finish(mut self) -> Result<(Vec<u32>, Module)> {
        let inferred = postprocess::infer_capabilities(self.builder.module_ref());
        self.apply(inferred);
        let memory_model = if self.vulkan_memory_model {
            spirv::MemoryModel::Vulkan
        } else {
            spirv::MemoryModel::GLSL450
        };
        self.builder.memory_model(self.addressing_model, memory_model);
        let mut module = self.builder.module();
        postprocess::finalize(&mut module);
        let words = module.assemble();
        Ok((words, module))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctor(version: SpirvVersion) -> Constructor {
        let target = TargetEnv {
            spirv_version: version,
            ..Default::default()
        };
        Constructor::new(&target, &LowerOptions::default())
    }

    #[test]
    fn test_capabilities_are_idempotent() {
        let mut c = ctor(SpirvVersion::V1_0);
        c.add_capability(Capability::Geometry);
        c.add_capability(Capability::Geometry);
        let count = c
            .builder
            .module_ref()
            .capabilities
            .iter()
            .filter(|i| i.operands.first() == Some(&Operand::Capability(Capability::Geometry)))
            .count();
        assert_eq!(count, 1);
        assert_eq!(c.capabilities().filter(|&&cap| cap == Capability::Geometry).count(), 1);
    }

    #[test]
    fn test_extensions_are_idempotent_and_respect_core_version() {
        let mut old = ctor(SpirvVersion::V1_0);
        old.add_incorporated_extension(crate::decorations::SHADER_DRAW_PARAMETERS);
        old.add_incorporated_extension(crate::decorations::SHADER_DRAW_PARAMETERS);
        assert_eq!(old.builder.module_ref().extensions.len(), 1);

        let mut new = ctor(SpirvVersion::V1_3);
        new.add_incorporated_extension(crate::decorations::SHADER_DRAW_PARAMETERS);
        assert!(new.builder.module_ref().extensions.is_empty());
    }

    #[test]
    fn test_strided_arrays_get_distinct_ids() {
        let mut c = ctor(SpirvVersion::V1_0);
        let f = c.type_float(32);
        let four = c.const_u32(4);
        let plain = c.type_array(f, four, None);
        let std140 = c.type_array(f, four, Some(16));
        let std430 = c.type_array(f, four, Some(4));
        assert_ne!(plain, std140);
        assert_ne!(std140, std430);
        assert_eq!(c.type_array(f, four, Some(16)), std140);
        assert_eq!(c.contained_type(std140, 0), Some(f));
    }

    #[test]
    fn test_forward_pointer_completion() {
        let mut c = ctor(SpirvVersion::V1_5);
        let fwd = c.type_forward_pointer(StorageClass::PhysicalStorageBuffer);
        assert_eq!(c.pointee(fwd), None);
        let u = c.type_u32();
        let s = c.type_struct(vec![u, fwd], "Node");
        c.complete_forward_pointer(fwd, s).unwrap();
        assert_eq!(c.pointee(fwd), Some(s));
        assert!(c.complete_forward_pointer(fwd, s).is_err());
    }

    #[test]
    fn test_half_splat_constant() {
        let mut c = ctor(SpirvVersion::V1_5);
        let h = c.type_float(16);
        let one = c.const_splat(h, 1);
        assert_eq!(c.constant_literal(one), Some(0x3c00));
    }
}
