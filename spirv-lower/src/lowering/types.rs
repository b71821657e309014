//! Source types to IR types.
//!
//! A source type maps to different IR types depending on where it lives:
//! under an explicit layout `bool` becomes `uint`, arrays and matrices get
//! strides and structs get offsets. Structs are cached per layout so that
//! the same declaration used in two blocks yields two IR structs only when
//! their decorations differ.

use super::{ForwardPointer, LowerCtx, SymbolBinding};
use crate::ast::{
    ArraySize, BasicType, ImageFormat, MatrixLayout, Packing, Qualifier, SamplerDesc, SamplerKind, SampledType,
    StorageQualifier, StructDef, StructId, Type,
};
use crate::decorations::{self, Needs, DESCRIPTOR_INDEXING, RAY_QUERY};
use crate::error::{CompilerError, Result};
use crate::layout::{self, Layout};
use crate::bail_internal;
use log::{debug, trace};
use rspirv::spirv::{Capability, Decoration, StorageClass, Word};

/// Cache key of a laid-out struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct StructKey {
    id: StructId,
    packing: Packing,
    row_major: bool,
    /// Storage of a block, which decides its Block/BufferBlock decoration.
    block: Option<StorageQualifier>,
    /// Element of an array, whose members carry no Location.
    arrayed: bool,
}

/// Default alignment of accesses through a buffer reference.
const DEFAULT_REFERENCE_ALIGN: u32 = 16;

impl<'a> LowerCtx<'a> {
    /// IR type of a value of `ty` outside any explicit layout.
    pub(super) fn value_type(&mut self, ty: &Type) -> Result<Word> {
        let mut plain = ty.clone();
        plain.qualifier = Qualifier::default();
        self.type_of_layout(&plain, Packing::None, false, false)
    }

    /// IR type of `ty` under `packing`. `last_member` marks the final
    /// member of a buffer block, the one place a runtime array needs no
    /// descriptor-indexing support.
    pub(super) fn type_of_layout(&mut self, ty: &Type, packing: Packing, row_major: bool, last_member: bool) -> Result<Word> {
        if let Some(outer) = ty.arrays.first() {
            return self.array_type(ty, outer, packing, row_major, last_member);
        }
        let scalar = match ty.basic {
            BasicType::Void => return Ok(self.ctor.type_void()),
            BasicType::Bool if packing.is_explicit() => self.ctor.type_u32(),
            BasicType::Bool => self.ctor.type_bool(),
            BasicType::Int(width) => self.ctor.type_int(width, true),
            BasicType::Uint(width) => self.ctor.type_int(width, false),
            BasicType::Float(width) => self.ctor.type_float(width),
            BasicType::Sampler(desc) => return self.sampler_type(&desc, ty.qualifier.layout.format),
            BasicType::Struct(id) | BasicType::Block(id) => {
                return self.struct_type(id, &ty.qualifier, packing, row_major, false)
            }
            BasicType::AccelerationStructure => return Ok(self.ctor.type_acceleration_structure()),
            BasicType::RayQuery => {
                self.ctor
                    .apply(Needs::cap(Capability::RayQueryKHR).with_ext(RAY_QUERY));
                return Ok(self.ctor.type_ray_query());
            }
            BasicType::Reference(id) => return self.reference_type(id),
        };
        if ty.matrix_cols > 0 {
            let column = self.ctor.type_vector(scalar, ty.matrix_rows);
            Ok(self.ctor.type_matrix(column, ty.matrix_cols))
        } else {
            Ok(self.ctor.type_vector(scalar, ty.vector_size))
        }
    }

    fn array_type(
        &mut self,
        ty: &Type,
        outer: &ArraySize,
        packing: Packing,
        row_major: bool,
        last_member: bool,
    ) -> Result<Word> {
        let element = ty.element_type();
        let element_id = match element.basic {
            BasicType::Struct(id) | BasicType::Block(id) if element.arrays.is_empty() => {
                self.struct_type(id, &element.qualifier, packing, row_major, true)?
            }
            _ => self.type_of_layout(&element, packing, row_major, false)?,
        };
        // Arrays of resources are descriptor arrays and carry no stride.
        let descriptor_array = ty.is_opaque() || matches!(ty.basic, BasicType::Block(_));
        let stride = if packing.is_explicit() && !descriptor_array {
            Some(Layout::new(self.unit, packing).array_stride(ty, row_major))
        } else {
            None
        };
        match outer {
            ArraySize::Sized(n) => {
                let length = self.ctor.const_u32(*n);
                Ok(self.ctor.type_array(element_id, length, stride))
            }
            ArraySize::SpecConstant(symbol) => {
                let length = match self.symbol_binding(*symbol)? {
                    SymbolBinding::Value { id, .. } => id,
                    SymbolBinding::Variable { .. } => {
                        bail_internal!("array size symbol {} is not a constant", symbol.0)
                    }
                };
                Ok(self.ctor.type_array(element_id, length, stride))
            }
            ArraySize::Unsized => {
                if !last_member {
                    self.ctor.apply(
                        Needs::cap(Capability::RuntimeDescriptorArray).with_ext(DESCRIPTOR_INDEXING),
                    );
                }
                Ok(self.ctor.type_runtime_array(element_id, stride))
            }
        }
    }

    fn sampler_type(&mut self, desc: &SamplerDesc, format: ImageFormat) -> Result<Word> {
        if desc.kind == SamplerKind::Sampler {
            return Ok(self.ctor.type_sampler());
        }
        let sampled = match desc.sampled_type {
            SampledType::Float => self.ctor.type_float(32),
            SampledType::Int => self.ctor.type_int(32, true),
            SampledType::Uint => self.ctor.type_int(32, false),
        };
        let (dim, needs) = decorations::image_dim(desc);
        self.ctor.apply(needs);
        let (format, needs) = if desc.kind == SamplerKind::Image {
            decorations::image_format(format)
        } else {
            (rspirv::spirv::ImageFormat::Unknown, Needs::none())
        };
        self.ctor.apply(needs);
        let sampled_kind = match desc.kind {
            SamplerKind::Image | SamplerKind::Subpass => 2,
            SamplerKind::Sampler | SamplerKind::Texture | SamplerKind::Combined => 1,
        };
        let image = self
            .ctor
            .type_image(sampled, dim, desc.shadow, desc.arrayed, desc.ms, sampled_kind, format);
        Ok(if desc.kind == SamplerKind::Combined {
            self.ctor.type_sampled_image(image)
        } else {
            image
        })
    }

    fn struct_def(&self, id: StructId) -> Result<&'a StructDef> {
        self.unit
            .struct_def(id)
            .ok_or_else(|| CompilerError::Internal(format!("unknown struct {}", id.0), None))
    }

    /// IR struct for a struct or block under the given layout.
    fn struct_type(
        &mut self,
        id: StructId,
        qualifier: &Qualifier,
        packing: Packing,
        row_major: bool,
        arrayed: bool,
    ) -> Result<Word> {
        let def = self.struct_def(id)?;
        let block = self.is_block(id).then_some(qualifier.storage);
        let key = StructKey {
            id,
            packing,
            row_major,
            block,
            arrayed,
        };
        let cacheable = !qualifier.affects_members();
        if cacheable {
            if let Some(&cached) = self.struct_cache.get(&key) {
                return Ok(cached);
            }
        }

        self.building.insert(id);
        let is_buffer = qualifier.storage == StorageQualifier::Buffer;
        let last = def.members.len().saturating_sub(1);
        let mut remap = Vec::with_capacity(def.members.len());
        let mut members = Vec::new();
        let mut visible = Vec::new();
        for (i, member) in def.members.iter().enumerate() {
            if !self.unit.member_present(member) {
                remap.push(None);
                continue;
            }
            remap.push(Some(members.len() as u32));
            let member_row_major = layout::member_row_major(&member.ty, row_major);
            let member_id =
                self.type_of_layout(&member.ty, packing, member_row_major, is_buffer && i == last)?;
            members.push(member_id);
            visible.push(i);
        }
        self.building.remove(&id);
        self.member_remap.insert(id, remap);

        let struct_id = self.ctor.type_struct(members, &def.name);
        self.decorate_struct(struct_id, def, block, qualifier, packing, row_major, arrayed, &visible);
        if cacheable {
            self.struct_cache.insert(key, struct_id);
        }
        trace!("struct {} ({:?}, row_major={}) -> %{}", def.name, packing, row_major, struct_id);
        Ok(struct_id)
    }

    fn is_block(&self, id: StructId) -> bool {
        self.unit.struct_def(id).is_some_and(|def| def.qualifier.storage != StorageQualifier::Temporary)
    }

    #[allow(clippy::too_many_arguments)]
    fn decorate_struct(
        &mut self,
        struct_id: Word,
        def: &StructDef,
        block: Option<StorageQualifier>,
        qualifier: &Qualifier,
        packing: Packing,
        row_major: bool,
        arrayed: bool,
        visible: &[usize],
    ) {
        let stage = self.stage();
        let vmm = self.ctor.vulkan_memory_model();
        let offsets = packing
            .is_explicit()
            .then(|| Layout::new(self.unit, packing).struct_layout(def, row_major).0);
        let laid_out = Layout::new(self.unit, packing);

        for (ir_index, &source_index) in visible.iter().enumerate() {
            let member = &def.members[source_index];
            let mq = &member.ty.qualifier;
            let index = ir_index as u32;
            self.ctor.member_name(struct_id, index, &member.name);

            if let Some(d) = decorations::precision_decoration(mq.precision) {
                self.ctor.member_decorate(struct_id, index, d);
            }
            if qualifier.storage.is_pipe_io() {
                let interpolation = if mq.interpolation != crate::ast::Interpolation::None {
                    mq.interpolation
                } else {
                    qualifier.interpolation
                };
                if let Some(d) = decorations::interpolation_decoration(interpolation) {
                    self.ctor.member_decorate(struct_id, index, d);
                }
                let aux = if mq.aux != crate::ast::AuxStorage::None { mq.aux } else { qualifier.aux };
                let (d, needs) = decorations::aux_storage_decoration(aux, stage);
                if let Some(d) = d {
                    self.ctor.apply(needs);
                    self.ctor.member_decorate(struct_id, index, d);
                }
            }
            if mq.invariant || qualifier.invariant {
                self.ctor.member_decorate(struct_id, index, Decoration::Invariant);
            }
            if qualifier.storage == StorageQualifier::Buffer {
                for d in decorations::memory_decorations(mq.memory | qualifier.memory, vmm) {
                    self.ctor.member_decorate(struct_id, index, d);
                }
            }
            if !arrayed {
                if let Some(location) = mq.layout.location {
                    self.ctor.member_decorate_u32(struct_id, index, Decoration::Location, location);
                }
            }
            if let Some(component) = mq.layout.component {
                self.ctor.member_decorate_u32(struct_id, index, Decoration::Component, component);
            }
            if let Some(xfb_offset) = mq.layout.xfb_offset {
                self.ctor.member_decorate_u32(struct_id, index, Decoration::Offset, xfb_offset);
            } else if let Some(offsets) = &offsets {
                self.ctor
                    .member_decorate_u32(struct_id, index, Decoration::Offset, offsets[source_index]);
            }
            let has_matrix = member.ty.matrix_cols > 0;
            if packing.is_explicit() && has_matrix {
                let member_row_major = layout::member_row_major(&member.ty, row_major);
                let majorness = decorations::matrix_layout_decoration(mq.layout.matrix, row_major);
                self.ctor.member_decorate(struct_id, index, majorness);
                let stride = laid_out.matrix_stride(&member.ty, member_row_major);
                self.ctor
                    .member_decorate_u32(struct_id, index, Decoration::MatrixStride, stride);
            }
            let (builtin, needs) = decorations::builtin(mq.builtin, stage, true);
            self.ctor.apply(needs);
            if let Some(builtin) = builtin {
                self.ctor.member_decorate_builtin(struct_id, index, builtin);
            }
        }

        if let Some(storage) = block {
            if let Some(d) = decorations::block_decoration(storage, &self.target) {
                self.ctor.decorate(struct_id, d);
            }
        }
    }

    /// IR member index of a source member, typing the struct if needed.
    pub(super) fn member_index(&mut self, id: StructId, source_index: u32) -> Result<u32> {
        if !self.member_remap.contains_key(&id) {
            let ty = Type::structure(id);
            self.value_type(&ty)?;
        }
        match self
            .member_remap
            .get(&id)
            .and_then(|remap| remap.get(source_index as usize))
        {
            Some(Some(ir)) => Ok(*ir),
            Some(None) => bail_internal!("member {} of struct {} is not part of the IR aggregate", source_index, id.0),
            None => bail_internal!("struct {} has no member {}", id.0, source_index),
        }
    }

    /// Packing and majorness of a buffer reference's pointee.
    fn referent_layout(&self, def: &StructDef) -> (Packing, bool) {
        let packing = if def.qualifier.layout.packing.is_explicit() {
            def.qualifier.layout.packing
        } else {
            Packing::Std430
        };
        (packing, def.qualifier.layout.matrix == MatrixLayout::RowMajor)
    }

    pub(super) fn reference_alignment(&self, id: StructId) -> u32 {
        self.unit
            .struct_def(id)
            .and_then(|def| def.qualifier.layout.buffer_reference_align)
            .unwrap_or(DEFAULT_REFERENCE_ALIGN)
    }

    /// Byte offset of a member inside a buffer-reference pointee, used to
    /// narrow the alignment of accesses through it.
    pub(super) fn member_offset(&self, id: StructId, source_index: u32) -> u32 {
        let Some(def) = self.unit.struct_def(id) else {
            return 0;
        };
        let (packing, row_major) = self.referent_layout(def);
        let (offsets, _) = Layout::new(self.unit, packing).struct_layout(def, row_major);
        offsets.get(source_index as usize).copied().unwrap_or(0)
    }

    /// Pointer type of a buffer reference. A reference to a struct that is
    /// still being typed gets a forward pointer, completed once the struct
    /// exists.
    fn reference_type(&mut self, id: StructId) -> Result<Word> {
        self.ctor.use_physical_storage_buffer();
        match self.forward_pointers.get(&id) {
            Some(ForwardPointer::Complete(ptr)) | Some(ForwardPointer::Declared(ptr)) => return Ok(*ptr),
            None => {}
        }
        if self.building.contains(&id) {
            let ptr = self.ctor.type_forward_pointer(StorageClass::PhysicalStorageBuffer);
            self.forward_pointers.insert(id, ForwardPointer::Declared(ptr));
            return Ok(ptr);
        }
        let pointee = self.referent_type(id)?;
        let ptr = match self.forward_pointers.get(&id) {
            // typing the pointee declared a forward pointer to itself
            Some(ForwardPointer::Declared(ptr)) => {
                let ptr = *ptr;
                self.ctor.complete_forward_pointer(ptr, pointee)?;
                ptr
            }
            Some(ForwardPointer::Complete(ptr)) => *ptr,
            None => self.ctor.type_pointer(StorageClass::PhysicalStorageBuffer, pointee),
        };
        self.forward_pointers.insert(id, ForwardPointer::Complete(ptr));
        Ok(ptr)
    }

    fn referent_type(&mut self, id: StructId) -> Result<Word> {
        let def = self.struct_def(id)?;
        let (packing, row_major) = self.referent_layout(def);
        self.struct_type(id, &def.qualifier, packing, row_major, false)
    }

    /// Pointee of a buffer reference, completing its forward pointer first.
    pub(super) fn reference_pointee(&mut self, id: StructId) -> Result<Word> {
        let ptr = self.reference_type(id)?;
        if let Some(ForwardPointer::Declared(_)) = self.forward_pointers.get(&id) {
            self.complete_forward_pointer(id, ptr)?;
        }
        self.ctor
            .pointee(ptr)
            .ok_or_else(|| CompilerError::Internal(format!("reference to struct {} has no pointee", id.0), None))
    }

    fn complete_forward_pointer(&mut self, id: StructId, ptr: Word) -> Result<()> {
        let pointee = self.referent_type(id)?;
        self.ctor.complete_forward_pointer(ptr, pointee)?;
        self.forward_pointers.insert(id, ForwardPointer::Complete(ptr));
        debug!("completed forward pointer %{} -> %{}", ptr, pointee);
        Ok(())
    }

    /// Complete every forward pointer still open at the end of lowering.
    pub(super) fn complete_forward_pointers(&mut self) -> Result<()> {
        let mut open: Vec<(StructId, Word)> = self
            .forward_pointers
            .iter()
            .filter_map(|(&id, fp)| match fp {
                ForwardPointer::Declared(ptr) => Some((id, *ptr)),
                ForwardPointer::Complete(_) => None,
            })
            .collect();
        open.sort();
        for (id, ptr) in open {
            self.complete_forward_pointer(id, ptr)?;
        }
        Ok(())
    }

    /// Source types of the constituents of a composite of `ty`.
    pub(super) fn constituent_types(&self, ty: &Type, count: usize) -> Result<Vec<Type>> {
        if ty.is_array() {
            return Ok(vec![ty.element_type(); count]);
        }
        if ty.is_matrix() {
            return Ok(vec![ty.column_type(); count]);
        }
        if let Some(id) = ty.struct_id() {
            let def = self.struct_def(id)?;
            return Ok(def
                .members
                .iter()
                .filter(|m| {
                    !m.hidden
                        && m.required_extension
                            .as_ref()
                            .map_or(true, |ext| self.unit.extension_enabled(ext))
                })
                .map(|m| m.ty.clone())
                .collect());
        }
        Ok(vec![ty.scalar_type(); count])
    }
}
