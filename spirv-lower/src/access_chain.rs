//! Deferred address computation.
//!
//! Lowering an lvalue-ish expression does not emit `OpAccessChain` right
//! away; it builds an `AccessChain` that accumulates indices, swizzles and
//! coherency left to right. Only the final load, store or address request
//! emits instructions, so `a.b[i].xy` becomes one `OpAccessChain` and one
//! memory operation.

use crate::constructor::{Constructor, IrType};
use crate::decorations::{self, Needs, DESCRIPTOR_INDEXING};
use crate::error::Result;
use crate::ast::{MemoryQualifiers, Qualifier};
use crate::bail_internal;
use rspirv::dr::Operand;
use rspirv::spirv::{self, Capability, Decoration, Op, StorageClass, Word};

bitflags::bitflags! {
    /// Memory semantics accumulated along a chain.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
    pub struct CoherencyFlags: u32 {
        const COHERENT = 0x1;
        const DEVICE_COHERENT = 0x2;
        const QUEUE_FAMILY_COHERENT = 0x4;
        const WORKGROUP_COHERENT = 0x8;
        const SUBGROUP_COHERENT = 0x10;
        const SHADER_CALL_COHERENT = 0x20;
        const VOLATILE = 0x40;
        const NON_PRIVATE = 0x80;
        const NON_UNIFORM = 0x100;
        const IS_IMAGE = 0x200;
    }
}

impl CoherencyFlags {
    pub fn any_coherent(self) -> bool {
        self.intersects(
            CoherencyFlags::COHERENT
                | CoherencyFlags::DEVICE_COHERENT
                | CoherencyFlags::QUEUE_FAMILY_COHERENT
                | CoherencyFlags::WORKGROUP_COHERENT
                | CoherencyFlags::SUBGROUP_COHERENT
                | CoherencyFlags::SHADER_CALL_COHERENT,
        )
    }

    /// Coherency contributed by one declaration or member qualifier.
    /// Coherent memory is implicitly non-private.
    pub fn from_qualifier(qualifier: &Qualifier, is_image: bool) -> Self {
        let memory = qualifier.memory;
        let mut flags = CoherencyFlags::empty();
        let pairs = [
            (MemoryQualifiers::COHERENT, CoherencyFlags::COHERENT),
            (MemoryQualifiers::DEVICE_COHERENT, CoherencyFlags::DEVICE_COHERENT),
            (MemoryQualifiers::QUEUE_FAMILY_COHERENT, CoherencyFlags::QUEUE_FAMILY_COHERENT),
            (MemoryQualifiers::WORKGROUP_COHERENT, CoherencyFlags::WORKGROUP_COHERENT),
            (MemoryQualifiers::SUBGROUP_COHERENT, CoherencyFlags::SUBGROUP_COHERENT),
            (MemoryQualifiers::SHADER_CALL_COHERENT, CoherencyFlags::SHADER_CALL_COHERENT),
            (MemoryQualifiers::VOLATILE, CoherencyFlags::VOLATILE),
            (MemoryQualifiers::NON_PRIVATE, CoherencyFlags::NON_PRIVATE),
        ];
        for (q, f) in pairs {
            if memory.contains(q) {
                flags |= f;
            }
        }
        if flags.any_coherent() {
            flags |= CoherencyFlags::NON_PRIVATE;
        }
        if qualifier.non_uniform {
            flags |= CoherencyFlags::NON_UNIFORM;
        }
        if is_image {
            flags |= CoherencyFlags::IS_IMAGE;
        }
        flags
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessChain {
    /// Pointer for lvalues, the value itself for rvalues.
    pub base: Word,
    /// Type of the value `base` holds or points to.
    pub base_type: Word,
    pub is_rvalue: bool,
    pub indices: Vec<Word>,
    /// Type reached after applying `indices`.
    pub ty: Word,
    /// Dynamic component select, applied after the swizzle.
    pub component: Option<Word>,
    pub swizzle: Vec<u32>,
    /// Vector type the swizzle selects from.
    pub pre_swizzle_type: Option<Word>,
    pub storage: StorageClass,
    pub coherency: CoherencyFlags,
    /// OR of every alignment pushed; the lowest set bit is the guarantee.
    pub alignment: u32,
}

impl AccessChain {
    pub fn lvalue(pointer: Word, pointee: Word, storage: StorageClass) -> Self {
        AccessChain {
            base: pointer,
            base_type: pointee,
            is_rvalue: false,
            indices: Vec::new(),
            ty: pointee,
            component: None,
            swizzle: Vec::new(),
            pre_swizzle_type: None,
            storage,
            coherency: CoherencyFlags::empty(),
            alignment: 0,
        }
    }

    pub fn rvalue(value: Word, ty: Word) -> Self {
        AccessChain {
            is_rvalue: true,
            ..AccessChain::lvalue(value, ty, StorageClass::Function)
        }
    }

    pub fn with_coherency(mut self, coherency: CoherencyFlags) -> Self {
        self.coherency |= coherency;
        self
    }

    pub fn with_alignment(mut self, alignment: u32) -> Self {
        self.alignment |= alignment;
        self
    }

    /// Type of the value a load of this chain produces.
    pub fn value_type(&self, ctor: &mut Constructor) -> Word {
        if self.component.is_some() {
            ctor.scalar_of(self.ty)
        } else if !self.swizzle.is_empty() {
            let scalar = ctor.scalar_of(self.ty);
            ctor.type_vector(scalar, self.swizzle.len() as u32)
        } else {
            self.ty
        }
    }

    pub fn has_swizzle(&self) -> bool {
        !self.swizzle.is_empty() || self.component.is_some()
    }

    /// Whether `pointer` can hand out an address without a scratch copy.
    pub fn is_addressable(&self) -> bool {
        !self.is_rvalue && self.component.is_none() && self.swizzle.len() <= 1
    }

    fn effective_alignment(&self) -> u32 {
        self.alignment & self.alignment.wrapping_neg()
    }

    /// Append one index. Indexing a vector becomes a component select.
    pub fn push_index(
        &mut self,
        ctor: &mut Constructor,
        index: Word,
        coherency: CoherencyFlags,
        alignment: u32,
    ) -> Result<()> {
        self.coherency |= coherency;
        self.alignment |= alignment;
        if self.has_swizzle() || ctor.is_vector_type(self.ty) {
            return match ctor.constant_literal(index) {
                Some(c) if self.component.is_none() => {
                    let ty = self.ty;
                    self.push_swizzle(&[c as u32], ty, coherency, alignment)
                },
                _ => {
                    if self.component.is_some() {
                        bail_internal!("second dynamic component on an access chain");
                    }
                    self.component = Some(index);
                    Ok(())
                }
            };
        }
        let member = ctor.constant_literal(index).unwrap_or(0) as u32;
        let Some(next) = ctor.contained_type(self.ty, member) else {
            bail_internal!("cannot index into type %{}", self.ty);
        };
        self.indices.push(index);
        self.ty = next;
        Ok(())
    }

    /// Append a constant member/element index.
    pub fn push_member(&mut self, ctor: &mut Constructor, member: u32, coherency: CoherencyFlags, alignment: u32) -> Result<()> {
        let index = ctor.const_i32(member as i32);
        self.push_index(ctor, index, coherency, alignment)
    }

    /// Apply a swizzle, composing with one already present.
    pub fn push_swizzle(
        &mut self,
        components: &[u32],
        vector_type: Word,
        coherency: CoherencyFlags,
        alignment: u32,
    ) -> Result<()> {
        self.coherency |= coherency;
        self.alignment |= alignment;
        if self.component.is_some() {
            bail_internal!("swizzle after a dynamic component select");
        }
        if self.swizzle.is_empty() {
            self.pre_swizzle_type = Some(vector_type);
            self.swizzle = components.to_vec();
        } else {
            let mut composed = Vec::with_capacity(components.len());
            for &c in components {
                match self.swizzle.get(c as usize) {
                    Some(&s) => composed.push(s),
                    None => bail_internal!("swizzle component {} out of range", c),
                }
            }
            self.swizzle = composed;
        }
        Ok(())
    }

    /// A dynamic component on a multi-component swizzle indexes the
    /// swizzle; turn it into a component of the underlying vector.
    fn remap_dynamic_swizzle(&mut self, ctor: &mut Constructor) -> Result<()> {
        let Some(component) = self.component else {
            return Ok(());
        };
        if self.swizzle.len() > 1 {
            let uint = ctor.type_u32();
            let map_type = ctor.type_vector(uint, self.swizzle.len() as u32);
            let elems: Vec<Word> = self.swizzle.iter().map(|&s| ctor.const_u32(s)).collect();
            let map = ctor.const_composite(map_type, elems);
            self.component = Some(ctor.builder.vector_extract_dynamic(uint, None, map, component)?);
            self.swizzle.clear();
            self.pre_swizzle_type = None;
        } else if self.swizzle.len() == 1 {
            self.swizzle.clear();
            self.pre_swizzle_type = None;
        }
        Ok(())
    }

    /// Drop identity swizzles and turn single-component ones on lvalues
    /// into a plain index.
    fn simplify_swizzle(&mut self, ctor: &mut Constructor) {
        let size = ctor.component_count(self.ty) as usize;
        if self.swizzle.len() == size
            && self.swizzle.iter().enumerate().all(|(i, &s)| s as usize == i)
        {
            self.swizzle.clear();
            self.pre_swizzle_type = None;
        }
        if !self.is_rvalue && self.swizzle.len() == 1 && self.component.is_none() {
            let index = ctor.const_u32(self.swizzle[0]);
            self.indices.push(index);
            self.ty = ctor.scalar_of(self.ty);
            self.swizzle.clear();
            self.pre_swizzle_type = None;
        }
    }

    fn literal_indices(&self, ctor: &Constructor) -> Option<Vec<u32>> {
        self.indices
            .iter()
            .map(|&i| ctor.constant_literal(i).map(|v| v as u32))
            .collect()
    }

    fn apply_non_uniform(&self, ctor: &mut Constructor, id: Word) {
        if self.coherency.contains(CoherencyFlags::NON_UNIFORM) {
            ctor.apply(Needs::cap(Capability::ShaderNonUniform).with_ext(DESCRIPTOR_INDEXING));
            ctor.decorate(id, Decoration::NonUniform);
        }
    }

    /// Emit the `OpAccessChain` (if any) and return the pointer.
    fn collapse(&self, ctor: &mut Constructor) -> Result<Word> {
        if self.is_rvalue {
            bail_internal!("address of an rvalue requested");
        }
        if self.indices.is_empty() {
            return Ok(self.base);
        }
        let ptr_type = ctor.type_pointer(self.storage, self.ty);
        let id = ctor
            .builder
            .access_chain(ptr_type, None, self.base, self.indices.iter().copied())?;
        self.apply_non_uniform(ctor, id);
        Ok(id)
    }

    /// Memory-access mask and its extra operands for a load or store.
    fn memory_operands(&self, ctor: &mut Constructor, is_store: bool) -> (Option<spirv::MemoryAccess>, Vec<Operand>) {
        let vmm = ctor.vulkan_memory_model();
        let (mut mask, needs) = decorations::memory_access(self.coherency, vmm);
        ctor.apply(needs);
        if is_store {
            mask.remove(spirv::MemoryAccess::MAKE_POINTER_VISIBLE);
        } else {
            mask.remove(spirv::MemoryAccess::MAKE_POINTER_AVAILABLE);
        }
        let alignment = self.effective_alignment();
        if self.storage == StorageClass::PhysicalStorageBuffer && alignment > 0 {
            mask |= spirv::MemoryAccess::ALIGNED;
        }

        let mut operands = Vec::new();
        if mask.contains(spirv::MemoryAccess::ALIGNED) {
            operands.push(Operand::LiteralBit32(alignment));
        }
        if mask.intersects(spirv::MemoryAccess::MAKE_POINTER_AVAILABLE | spirv::MemoryAccess::MAKE_POINTER_VISIBLE) {
            let (scope, needs) = decorations::memory_scope(self.coherency, vmm);
            ctor.apply(needs);
            let scope = ctor.const_u32(scope.unwrap_or(spirv::Scope::Device) as u32);
            operands.push(Operand::IdScope(scope));
        }
        if mask.is_empty() {
            (None, operands)
        } else {
            (Some(mask), operands)
        }
    }

    fn load_through_pointer(&self, ctor: &mut Constructor) -> Result<Word> {
        let ptr = self.collapse(ctor)?;
        let (mask, operands) = self.memory_operands(ctor, false);
        let id = ctor.builder.load(self.ty, None, ptr, mask, operands)?;
        self.apply_non_uniform(ctor, id);
        Ok(id)
    }

    /// Produce the value the chain designates, converted to `logical_ty`
    /// when the stored representation differs (e.g. `uint` for `bool`).
    pub fn load(&self, ctor: &mut Constructor, logical_ty: Word) -> Result<Word> {
        let mut chain = self.clone();
        chain.remap_dynamic_swizzle(ctor)?;
        chain.simplify_swizzle(ctor);

        let mut value = if chain.is_rvalue {
            if chain.indices.is_empty() {
                chain.base
            } else if let Some(literals) = chain.literal_indices(ctor) {
                ctor.builder.composite_extract(chain.ty, None, chain.base, literals)?
            } else {
                // dynamic index into a value: spill to a temporary
                let var = ctor.declare_variable("indexable", chain.base_type)?;
                ctor.builder.store(var, chain.base, None, [])?;
                chain.base = var;
                chain.is_rvalue = false;
                chain.storage = StorageClass::Function;
                chain.load_through_pointer(ctor)?
            }
        } else {
            chain.load_through_pointer(ctor)?
        };

        let mut value_ty = chain.ty;
        if !chain.swizzle.is_empty() {
            let scalar = ctor.scalar_of(chain.ty);
            if chain.swizzle.len() == 1 {
                value = ctor.builder.composite_extract(scalar, None, value, [chain.swizzle[0]])?;
                value_ty = scalar;
            } else {
                value_ty = ctor.type_vector(scalar, chain.swizzle.len() as u32);
                value = ctor
                    .builder
                    .vector_shuffle(value_ty, None, value, value, chain.swizzle.iter().copied())?;
            }
        }
        if let Some(component) = chain.component {
            let scalar = ctor.scalar_of(value_ty);
            value = ctor.builder.vector_extract_dynamic(scalar, None, value, component)?;
            value_ty = scalar;
        }
        if value_ty != logical_ty {
            value = ctor.convert_representation(value, value_ty, logical_ty)?;
        }
        Ok(value)
    }

    /// Store `value` (of IR type `value_ty`) through the chain.
    pub fn store(&self, ctor: &mut Constructor, value: Word, value_ty: Word) -> Result<()> {
        let mut chain = self.clone();
        chain.remap_dynamic_swizzle(ctor)?;
        chain.simplify_swizzle(ctor);
        if let Some(component) = chain.component.take() {
            chain.indices.push(component);
            chain.ty = ctor.scalar_of(chain.ty);
        }

        let target_ty = chain.ty;
        let mut source = value;
        if !chain.swizzle.is_empty() {
            // write-swizzle: load, shuffle the new components in, store
            let scalar = ctor.scalar_of(target_ty);
            let partial_ty = ctor.type_vector(scalar, chain.swizzle.len() as u32);
            let partial = if value_ty == partial_ty {
                value
            } else {
                ctor.convert_representation(value, value_ty, partial_ty)?
            };
            let whole = chain.load_through_pointer(ctor)?;
            let size = ctor.component_count(target_ty);
            let components: Vec<u32> = (0..size)
                .map(|i| match chain.swizzle.iter().position(|&s| s == i) {
                    Some(p) => size + p as u32,
                    None => i,
                })
                .collect();
            source = ctor
                .builder
                .vector_shuffle(target_ty, None, whole, partial, components)?;
        } else if value_ty != target_ty {
            if ctor.is_aggregate_type(target_ty) {
                return chain.multi_store(ctor, value, value_ty);
            }
            source = ctor.convert_representation(value, value_ty, target_ty)?;
        }

        let ptr = chain.collapse(ctor)?;
        let (mask, operands) = chain.memory_operands(ctor, true);
        ctor.builder.store(ptr, source, mask, operands)?;
        Ok(())
    }

    /// Store an aggregate whose IR type differs from the target's only in
    /// representation (layout decorations or `bool` substitution).
    pub fn multi_store(&self, ctor: &mut Constructor, value: Word, value_ty: Word) -> Result<()> {
        let target_ty = self.ty;
        if value_ty == target_ty {
            return self.store(ctor, value, value_ty);
        }
        if ctor.version() >= crate::ast::SpirvVersion::V1_4 && !ctor.differs_by_bool(value_ty, target_ty) {
            let copied = ctor.emit(Op::CopyLogical, target_ty, vec![Operand::IdRef(value)])?;
            return self.store(ctor, copied, target_ty);
        }
        let value_members = ctor.aggregate_members(value_ty)?;
        for (i, member_ty) in value_members.into_iter().enumerate() {
            let element = ctor.builder.composite_extract(member_ty, None, value, [i as u32])?;
            let mut sub = self.clone();
            sub.push_member(ctor, i as u32, CoherencyFlags::empty(), 0)?;
            sub.store(ctor, element, member_ty)?;
        }
        Ok(())
    }

    /// Pointer to the designated object. Only valid for addressable chains.
    pub fn pointer(&self, ctor: &mut Constructor) -> Result<Word> {
        let mut chain = self.clone();
        chain.simplify_swizzle(ctor);
        if !chain.is_addressable() {
            bail_internal!("access chain is not addressable");
        }
        chain.collapse(ctor)
    }
}

impl Constructor {
    /// Member or element types of a struct or fixed-size array.
    pub fn aggregate_members(&self, ty: Word) -> Result<Vec<Word>> {
        match self.ir_type(ty) {
            Some(IrType::Struct { members }) => Ok(members.clone()),
            Some(IrType::Array { element, length, .. }) => match self.constant_literal(*length) {
                Some(n) => Ok(vec![*element; n as usize]),
                None => bail_internal!("array %{} has no literal length", ty),
            },
            _ => bail_internal!("%{} is not a decomposable aggregate", ty),
        }
    }

    /// Whether two types differ by a `bool`/`uint` substitution somewhere.
    pub fn differs_by_bool(&self, a: Word, b: Word) -> bool {
        if a == b {
            return false;
        }
        match (self.ir_type(a), self.ir_type(b)) {
            (Some(IrType::Bool), Some(IrType::Int { .. })) | (Some(IrType::Int { .. }), Some(IrType::Bool)) => true,
            (Some(IrType::Vector { component: x, .. }), Some(IrType::Vector { component: y, .. })) => {
                self.differs_by_bool(*x, *y)
            }
            (Some(IrType::Array { element: x, .. }), Some(IrType::Array { element: y, .. })) => {
                self.differs_by_bool(*x, *y)
            }
            (Some(IrType::Struct { members: x }), Some(IrType::Struct { members: y })) => {
                x.iter().zip(y.iter()).any(|(&x, &y)| self.differs_by_bool(x, y))
            }
            _ => false,
        }
    }

    /// Convert between two IR representations of the same logical value.
    pub fn convert_representation(&mut self, value: Word, from: Word, to: Word) -> Result<Word> {
        if from == to {
            return Ok(value);
        }
        let from_ir = self.ir_type(from).cloned();
        let to_ir = self.ir_type(to).cloned();
        match (from_ir, to_ir) {
            // bool stored as uint
            (Some(IrType::Int { .. }), Some(IrType::Bool)) => {
                let zero = self.const_splat(from, 0);
                Ok(self.builder.i_not_equal(to, None, value, zero)?)
            }
            (Some(IrType::Bool), Some(IrType::Int { .. })) => {
                let one = self.const_splat(to, 1);
                let zero = self.const_splat(to, 0);
                Ok(self.builder.select(to, None, value, one, zero)?)
            }
            (Some(IrType::Vector { component: fc, .. }), Some(IrType::Vector { component: tc, .. })) => {
                if self.is_bool_type(tc) {
                    let zero = self.const_splat(from, 0);
                    Ok(self.builder.i_not_equal(to, None, value, zero)?)
                } else if self.is_bool_type(fc) {
                    let one = self.const_splat(to, 1);
                    let zero = self.const_splat(to, 0);
                    Ok(self.builder.select(to, None, value, one, zero)?)
                } else {
                    bail_internal!("no representation change from %{} to %{}", from, to)
                }
            }
            (Some(IrType::Struct { .. } | IrType::Array { .. }), Some(IrType::Struct { .. } | IrType::Array { .. })) => {
                if self.version() >= crate::ast::SpirvVersion::V1_4 && !self.differs_by_bool(from, to) {
                    return self.emit(Op::CopyLogical, to, vec![Operand::IdRef(value)]);
                }
                let from_members = self.aggregate_members(from)?;
                let to_members = self.aggregate_members(to)?;
                if from_members.len() != to_members.len() {
                    bail_internal!("aggregates %{} and %{} differ in shape", from, to);
                }
                let mut parts = Vec::with_capacity(to_members.len());
                for (i, (fm, tm)) in from_members.into_iter().zip(to_members).enumerate() {
                    let part = self.builder.composite_extract(fm, None, value, [i as u32])?;
                    parts.push(self.convert_representation(part, fm, tm)?);
                }
                Ok(self.builder.composite_construct(to, None, parts)?)
            }
            _ => bail_internal!("no representation change from %{} to %{}", from, to),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{SpirvVersion, TargetEnv};
    use crate::options::LowerOptions;
    use rspirv::dr::Instruction;

    fn function_ctor(vmm: bool) -> Constructor {
        let target = TargetEnv {
            spirv_version: SpirvVersion::V1_5,
            vulkan_memory_model: vmm,
            ..Default::default()
        };
        let mut ctor = Constructor::new(&target, &LowerOptions::default());
        let void = ctor.type_void();
        let id = ctor.builder.id();
        ctor.begin_function(id, "f", void, &[]).unwrap();
        ctor
    }

    fn code(ctor: &Constructor) -> Vec<Instruction> {
        let module = ctor.builder.module_ref();
        let func = module.functions.last().unwrap();
        func.blocks.iter().flat_map(|b| b.instructions.clone()).collect()
    }

    #[test]
    fn test_from_qualifier_coherent_implies_non_private() {
        let mut q = Qualifier::default();
        q.memory = MemoryQualifiers::WORKGROUP_COHERENT;
        let flags = CoherencyFlags::from_qualifier(&q, false);
        assert!(flags.contains(CoherencyFlags::NON_PRIVATE));
        assert!(flags.any_coherent());
        assert!(!flags.contains(CoherencyFlags::IS_IMAGE));
    }

    #[test]
    fn test_single_access_chain_for_nested_indices() {
        let mut ctor = function_ctor(false);
        let f = ctor.type_float(32);
        let v4 = ctor.type_vector(f, 4);
        let s = ctor.type_struct(vec![f, v4], "S");
        let var = ctor.declare_variable("s", s).unwrap();

        let mut chain = AccessChain::lvalue(var, s, StorageClass::Function);
        chain.push_member(&mut ctor, 1, CoherencyFlags::empty(), 0).unwrap();
        chain.push_swizzle(&[2, 0], v4, CoherencyFlags::empty(), 0).unwrap();
        let v2 = chain.value_type(&mut ctor);
        chain.load(&mut ctor, v2).unwrap();

        let ops: Vec<Op> = code(&ctor).iter().map(|i| i.class.opcode).collect();
        assert_eq!(ops.iter().filter(|&&o| o == Op::AccessChain).count(), 1);
        assert_eq!(ops.iter().filter(|&&o| o == Op::Load).count(), 1);
        assert!(ops.contains(&Op::VectorShuffle));
    }

    #[test]
    fn test_write_swizzle_loads_shuffles_and_stores() {
        let mut ctor = function_ctor(false);
        let f = ctor.type_float(32);
        let v4 = ctor.type_vector(f, 4);
        let v2 = ctor.type_vector(f, 2);
        let var = ctor.declare_variable("v", v4).unwrap();
        let value = ctor.const_null(v2);

        let mut chain = AccessChain::lvalue(var, v4, StorageClass::Function);
        chain.push_swizzle(&[3, 1], v4, CoherencyFlags::empty(), 0).unwrap();
        chain.store(&mut ctor, value, v2).unwrap();

        let insts = code(&ctor);
        let shuffle = insts.iter().find(|i| i.class.opcode == Op::VectorShuffle).unwrap();
        // components x, w<-value[1], z, y<-value[0] ... i.e. [0, 5, 2, 4]
        let literals: Vec<u32> = shuffle.operands[2..]
            .iter()
            .filter_map(|o| match o {
                Operand::LiteralBit32(v) => Some(*v),
                _ => None,
            })
            .collect();
        assert_eq!(literals, vec![0, 5, 2, 4]);
        assert!(insts.iter().any(|i| i.class.opcode == Op::Store));
    }

    #[test]
    fn test_bool_round_trip_through_uint_storage() {
        let mut ctor = function_ctor(false);
        let b = ctor.type_bool();
        let u = ctor.type_u32();
        let var = ctor.declare_variable("flag", u).unwrap();
        let t = ctor.const_bool(true);
        let chain = AccessChain::lvalue(var, u, StorageClass::Function);
        chain.store(&mut ctor, t, b).unwrap();
        let loaded = chain.load(&mut ctor, b).unwrap();

        let insts = code(&ctor);
        assert!(insts.iter().any(|i| i.class.opcode == Op::Select));
        let ne = insts.iter().find(|i| i.class.opcode == Op::INotEqual).unwrap();
        assert_eq!(ne.result_id, Some(loaded));
        assert_eq!(ne.result_type, Some(b));
    }

    #[test]
    fn test_vulkan_memory_model_masks() {
        let mut ctor = function_ctor(true);
        let u = ctor.type_u32();
        let var = ctor.global_variable(u, StorageClass::Workgroup, "shared_value", None);
        let chain = AccessChain::lvalue(var, u, StorageClass::Workgroup)
            .with_coherency(CoherencyFlags::COHERENT | CoherencyFlags::NON_PRIVATE);
        let value = chain.load(&mut ctor, u).unwrap();
        chain.store(&mut ctor, value, u).unwrap();

        let insts = code(&ctor);
        let load = insts.iter().find(|i| i.class.opcode == Op::Load).unwrap();
        let store = insts.iter().find(|i| i.class.opcode == Op::Store).unwrap();
        let load_mask = load
            .operands
            .iter()
            .find_map(|o| match o {
                Operand::MemoryAccess(m) => Some(*m),
                _ => None,
            })
            .unwrap();
        let store_mask = store
            .operands
            .iter()
            .find_map(|o| match o {
                Operand::MemoryAccess(m) => Some(*m),
                _ => None,
            })
            .unwrap();
        assert!(load_mask.contains(spirv::MemoryAccess::MAKE_POINTER_VISIBLE));
        assert!(!load_mask.contains(spirv::MemoryAccess::MAKE_POINTER_AVAILABLE));
        assert!(store_mask.contains(spirv::MemoryAccess::MAKE_POINTER_AVAILABLE));
        assert!(!store_mask.contains(spirv::MemoryAccess::MAKE_POINTER_VISIBLE));
        assert!(ctor.has_capability(Capability::VulkanMemoryModelDeviceScope));
    }

    #[test]
    fn test_rvalue_dynamic_index_spills_to_temporary() {
        let mut ctor = function_ctor(false);
        let f = ctor.type_float(32);
        let four = ctor.const_u32(4);
        let arr = ctor.type_array(f, four, None);
        let value = ctor.const_null(arr);
        let int = ctor.type_i32();
        let i = ctor.builder.undef(int, None);

        let mut chain = AccessChain::rvalue(value, arr);
        chain.push_index(&mut ctor, i, CoherencyFlags::empty(), 0).unwrap();
        chain.load(&mut ctor, f).unwrap();

        let ops: Vec<Op> = code(&ctor).iter().map(|i| i.class.opcode).collect();
        assert!(ops.contains(&Op::Variable));
        assert!(ops.contains(&Op::AccessChain));
    }
}
