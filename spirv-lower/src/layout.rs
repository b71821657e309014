//! Explicit memory layout rules (std140, std430, scalar).
//!
//! Offsets and strides are computed over source types. Booleans occupy
//! four bytes, buffer references eight.

use crate::ast::{ArraySize, BasicType, MatrixLayout, Packing, StructDef, TranslationUnit, Type};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeAlign {
    pub size: u32,
    pub align: u32,
}

pub fn round_up(value: u32, align: u32) -> u32 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

pub struct Layout<'a> {
    unit: &'a TranslationUnit,
    packing: Packing,
}

impl<'a> Layout<'a> {
    pub fn new(unit: &'a TranslationUnit, packing: Packing) -> Self {
        Layout { unit, packing }
    }

    pub fn packing(&self) -> Packing {
        self.packing
    }

    fn scalar_bytes(ty: &Type) -> u32 {
        match ty.basic {
            BasicType::Bool => 4,
            BasicType::Reference(_) => 8,
            _ => (ty.bit_width() / 8).max(1),
        }
    }

    /// Rounding applied to arrays and structs; only std140 rounds to vec4.
    fn aggregate_align(&self, align: u32) -> u32 {
        match self.packing {
            Packing::Std140 => round_up(align, 16),
            _ => align,
        }
    }

    fn vector_layout(&self, scalar: u32, count: u32) -> SizeAlign {
        let size = scalar * count;
        let align = match self.packing {
            Packing::Scalar => scalar,
            _ if count == 3 => scalar * 4,
            _ => scalar * count.max(1),
        };
        SizeAlign { size, align }
    }

    /// Stride between columns (or rows when row-major) of a matrix.
    pub fn matrix_stride(&self, ty: &Type, row_major: bool) -> u32 {
        let scalar = Self::scalar_bytes(ty);
        let (cols, rows) = ty.matrix().unwrap_or((1, 1));
        let vec_len = if row_major { cols } else { rows };
        let v = self.vector_layout(scalar, vec_len);
        round_up(v.size, self.aggregate_align(v.align))
    }

    fn array_length(&self, dim: &ArraySize) -> u32 {
        match dim {
            ArraySize::Sized(n) => *n,
            ArraySize::Unsized => 0,
            ArraySize::SpecConstant(sym) => self
                .unit
                .symbol(*sym)
                .and_then(|s| s.value.as_ref())
                .and_then(|v| v.as_u32())
                .unwrap_or(1),
        }
    }

    /// Stride of the outermost array dimension of `ty`.
    pub fn array_stride(&self, ty: &Type, row_major: bool) -> u32 {
        let elem = ty.element_type();
        let inner = self.size_align(&elem, row_major);
        round_up(inner.size, self.aggregate_align(inner.align))
    }

    pub fn size_align(&self, ty: &Type, row_major: bool) -> SizeAlign {
        if let Some(dim) = ty.arrays.first() {
            let stride = self.array_stride(ty, row_major);
            let elem = self.size_align(&ty.element_type(), row_major);
            return SizeAlign {
                size: stride * self.array_length(dim),
                align: self.aggregate_align(elem.align),
            };
        }
        if let Some((cols, rows)) = ty.matrix() {
            let stride = self.matrix_stride(ty, row_major);
            let count = if row_major { rows } else { cols };
            let vec_len = if row_major { cols } else { rows };
            let v = self.vector_layout(Self::scalar_bytes(ty), vec_len);
            return SizeAlign {
                size: stride * count,
                align: self.aggregate_align(v.align),
            };
        }
        match ty.basic {
            BasicType::Struct(id) | BasicType::Block(id) => match self.unit.struct_def(id) {
                Some(def) => self.struct_layout(def, row_major).1,
                None => SizeAlign { size: 0, align: 1 },
            },
            _ => {
                let scalar = Self::scalar_bytes(ty);
                self.vector_layout(scalar, ty.component_count())
            }
        }
    }

    /// Offsets indexed by source member, and the struct's overall size and
    /// alignment. Members absent from the IR take no space; their slot holds
    /// the offset the next present member would start from.
    pub fn struct_layout(&self, def: &StructDef, inherited_row_major: bool) -> (Vec<u32>, SizeAlign) {
        let mut offsets = Vec::with_capacity(def.members.len());
        let mut running = 0u32;
        let mut max_align = 1u32;
        for member in &def.members {
            if !self.unit.member_present(member) {
                offsets.push(running);
                continue;
            }
            let row_major = member_row_major(&member.ty, inherited_row_major);
            let mut sa = self.size_align(&member.ty, row_major);
            if let Some(explicit) = member.ty.qualifier.layout.align {
                sa.align = sa.align.max(explicit);
            }
            let offset = match member.ty.qualifier.layout.offset {
                Some(explicit) => explicit,
                None => round_up(running, sa.align),
            };
            offsets.push(offset);
            running = offset + sa.size;
            max_align = max_align.max(sa.align);
        }
        let align = self.aggregate_align(max_align);
        (offsets, SizeAlign { size: round_up(running, align), align })
    }
}

/// Majorness for a member: its own qualifier wins over the enclosing one.
pub fn member_row_major(ty: &Type, inherited_row_major: bool) -> bool {
    match ty.qualifier.layout.matrix {
        MatrixLayout::RowMajor => true,
        MatrixLayout::ColumnMajor => false,
        MatrixLayout::None => inherited_row_major,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build::UnitBuilder;
    use crate::ast::{Stage, StructMember};

    fn unit_with(members: Vec<StructMember>) -> (TranslationUnit, usize) {
        let mut b = UnitBuilder::new(Stage::Compute);
        let id = b.add_struct("S", members);
        (b.finish(), id.0 as usize)
    }

    #[test]
    fn test_std140_rounds_array_stride_to_vec4() {
        let (unit, _) = unit_with(vec![]);
        let arr = Type::float(32).array(ArraySize::Sized(4));
        assert_eq!(Layout::new(&unit, Packing::Std140).array_stride(&arr, false), 16);
        assert_eq!(Layout::new(&unit, Packing::Std430).array_stride(&arr, false), 4);
        assert_eq!(Layout::new(&unit, Packing::Scalar).array_stride(&arr, false), 4);
    }

    #[test]
    fn test_vec3_followed_by_float_packs_std430() {
        let (unit, s) = unit_with(vec![
            StructMember::new("v", Type::float(32).vector(3)),
            StructMember::new("f", Type::float(32)),
            StructMember::new("m", Type::float(32).matrix_of(4, 4)),
        ]);
        let layout = Layout::new(&unit, Packing::Std430);
        let (offsets, sa) = layout.struct_layout(&unit.structs[s], false);
        assert_eq!(offsets, vec![0, 12, 16]);
        assert_eq!(sa.size, 80);
        assert_eq!(sa.align, 16);
    }

    #[test]
    fn test_scalar_layout_has_no_vec3_padding() {
        let (unit, s) = unit_with(vec![
            StructMember::new("f", Type::float(32)),
            StructMember::new("v", Type::float(32).vector(3)),
        ]);
        let (offsets, _) = Layout::new(&unit, Packing::Scalar).struct_layout(&unit.structs[s], false);
        assert_eq!(offsets, vec![0, 4]);
        let (offsets, _) = Layout::new(&unit, Packing::Std140).struct_layout(&unit.structs[s], false);
        assert_eq!(offsets, vec![0, 16]);
    }

    #[test]
    fn test_matrix_stride_by_majorness() {
        let (unit, _) = unit_with(vec![]);
        let m = Type::float(32).matrix_of(2, 3);
        let std430 = Layout::new(&unit, Packing::Std430);
        // column-major: two columns of vec3
        assert_eq!(std430.matrix_stride(&m, false), 16);
        // row-major: three rows of vec2
        assert_eq!(std430.matrix_stride(&m, true), 8);
        assert_eq!(Layout::new(&unit, Packing::Std140).matrix_stride(&m, true), 16);
    }

    #[test]
    fn test_explicit_offset_overrides_running_offset() {
        let mut late = Type::float(32);
        late.qualifier.layout.offset = Some(64);
        let (unit, s) = unit_with(vec![
            StructMember::new("a", Type::float(32)),
            StructMember::new("b", late),
            StructMember::new("c", Type::float(32)),
        ]);
        let (offsets, _) = Layout::new(&unit, Packing::Std430).struct_layout(&unit.structs[s], false);
        assert_eq!(offsets, vec![0, 64, 68]);
    }

    #[test]
    fn test_absent_members_take_no_space() {
        let mut hidden = StructMember::new("h", Type::float(32).vector(4));
        hidden.hidden = true;
        let mut gated = StructMember::new("g", Type::float(32));
        gated.required_extension = Some("GL_EXT_missing".to_string());
        let (unit, s) = unit_with(vec![
            StructMember::new("a", Type::float(32)),
            hidden,
            StructMember::new("b", Type::float(32)),
            gated,
            StructMember::new("c", Type::float(32)),
        ]);
        let (offsets, sa) = Layout::new(&unit, Packing::Std430).struct_layout(&unit.structs[s], false);
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[2], 4);
        assert_eq!(offsets[4], 8);
        assert_eq!(sa.size, 12);
    }
}
