//! Whole-module fixups run once the builder is done.
//!
//! Lowering only knows the types it asked for; whether an 8- or 16-bit type
//! is merely stored or actually computed with is visible only once every
//! instruction exists, so those capabilities are inferred here.

use crate::decorations::{self, Needs};
use log::debug;
use rspirv::dr::{Instruction, Module, Operand};
use rspirv::spirv::{Capability, Op, StorageClass, Word};
use std::collections::{HashMap, HashSet};

/// Instructions that move narrow values around without computing on them.
fn is_copy(op: Op) -> bool {
    matches!(
        op,
        Op::Load
            | Op::Store
            | Op::CopyMemory
            | Op::CopyObject
            | Op::AccessChain
            | Op::InBoundsAccessChain
            | Op::PtrAccessChain
            | Op::CompositeExtract
            | Op::CompositeConstruct
            | Op::CompositeInsert
            | Op::Variable
            | Op::FunctionParameter
            | Op::Function
            | Op::FunctionCall
            | Op::ReturnValue
            | Op::Phi
    )
}

/// Width facts about the module's types.
#[derive(Default)]
struct Widths {
    /// Scalar type id -> (width, is_float).
    scalars: HashMap<Word, (u32, bool)>,
    /// Type id -> ids it is built from.
    parts: HashMap<Word, Vec<Word>>,
}

impl Widths {
    fn collect(module: &Module) -> Self {
        let mut widths = Widths::default();
        for inst in &module.types_global_values {
            let Some(id) = inst.result_id else { continue };
            match (inst.class.opcode, inst.operands.first()) {
                (Op::TypeInt, Some(Operand::LiteralBit32(w))) => {
                    widths.scalars.insert(id, (*w, false));
                }
                (Op::TypeFloat, Some(Operand::LiteralBit32(w))) => {
                    widths.scalars.insert(id, (*w, true));
                }
                (Op::TypeVector | Op::TypeMatrix | Op::TypeArray | Op::TypeRuntimeArray | Op::TypeStruct, _) => {
                    let members = match inst.class.opcode {
                        Op::TypeStruct => id_refs(&inst.operands),
                        _ => id_refs(&inst.operands[..1]),
                    };
                    widths.parts.insert(id, members);
                }
                _ => {}
            }
        }
        widths
    }

    /// Every scalar width reachable from `ty`.
    fn scalars_of(&self, ty: Word, out: &mut HashSet<(u32, bool)>) {
        if let Some(&scalar) = self.scalars.get(&ty) {
            out.insert(scalar);
        } else if let Some(parts) = self.parts.get(&ty) {
            for &part in parts {
                self.scalars_of(part, out);
            }
        }
    }

    /// Scalar of a scalar or vector type.
    fn component(&self, ty: Word) -> Option<(u32, bool)> {
        match self.scalars.get(&ty) {
            Some(&scalar) => Some(scalar),
            None => match self.parts.get(&ty).map(Vec::as_slice) {
                Some([component]) => self.scalars.get(component).copied(),
                _ => None,
            },
        }
    }
}

fn id_refs(operands: &[Operand]) -> Vec<Word> {
    operands
        .iter()
        .filter_map(|op| match op {
            Operand::IdRef(id) => Some(*id),
            _ => None,
        })
        .collect()
}

fn storage_caps(storage: StorageClass, width: u32) -> Option<(Capability, decorations::Extension)> {
    use Capability as C;
    let ext = if width == 8 {
        decorations::STORAGE_8BIT
    } else {
        decorations::STORAGE_16BIT
    };
    let cap = match (storage, width) {
        (StorageClass::StorageBuffer | StorageClass::PhysicalStorageBuffer, 8) => C::StorageBuffer8BitAccess,
        (StorageClass::StorageBuffer | StorageClass::PhysicalStorageBuffer, 16) => C::StorageBuffer16BitAccess,
        (StorageClass::Uniform, 8) => C::UniformAndStorageBuffer8BitAccess,
        (StorageClass::Uniform, 16) => C::StorageUniform16,
        (StorageClass::PushConstant, 8) => C::StoragePushConstant8,
        (StorageClass::PushConstant, 16) => C::StoragePushConstant16,
        (StorageClass::Input | StorageClass::Output, 16) => C::StorageInputOutput16,
        _ => return None,
    };
    Some((cap, ext))
}

fn arithmetic_cap(width: u32, float: bool) -> Option<Capability> {
    match (width, float) {
        (8, false) => Some(Capability::Int8),
        (16, false) => Some(Capability::Int16),
        (16, true) => Some(Capability::Float16),
        _ => None,
    }
}

/// Capabilities implied by narrow types: storage access by the storage
/// class they live in, arithmetic by any instruction computing on them.
pub fn infer_capabilities(module: &Module) -> Needs {
    let widths = Widths::collect(module);
    let mut needs = Needs::none();
    if widths.scalars.values().all(|&(w, _)| w >= 32) {
        return needs;
    }

    let mut narrow = HashSet::new();
    for inst in &module.types_global_values {
        if inst.class.opcode != Op::TypePointer {
            continue;
        }
        let (Some(Operand::StorageClass(storage)), Some(Operand::IdRef(pointee))) =
            (inst.operands.first(), inst.operands.get(1))
        else {
            continue;
        };
        let mut reached = HashSet::new();
        widths.scalars_of(*pointee, &mut reached);
        for (width, _) in reached {
            if let Some((cap, ext)) = storage_caps(*storage, width) {
                narrow.insert(width);
                needs = needs.with_cap(cap).with_ext(ext);
            }
        }
    }

    let computes = |inst: &Instruction| {
        let scalar = inst.result_type.and_then(|ty| widths.component(ty));
        match (inst.class.opcode, scalar) {
            (Op::Constant | Op::SpecConstant | Op::SpecConstantOp, Some(s)) => Some(s),
            (op, Some(s)) if !is_copy(op) => Some(s),
            _ => None,
        }
    };
    let body = module
        .functions
        .iter()
        .flat_map(|f| f.blocks.iter())
        .flat_map(|b| b.instructions.iter());
    let mut arithmetic = HashSet::new();
    for scalar in module.types_global_values.iter().chain(body).filter_map(computes) {
        arithmetic.insert(scalar);
    }
    for (width, float) in arithmetic {
        if let Some(cap) = arithmetic_cap(width, float) {
            needs = needs.with_cap(cap);
        }
    }
    // a narrow type declared but neither stored nor computed with
    for &(width, float) in widths.scalars.values() {
        if width < 32 && !narrow.contains(&width) {
            if let Some(cap) = arithmetic_cap(width, float) {
                if !needs.capabilities.contains(&cap) {
                    needs = needs.with_cap(cap);
                }
            }
        }
    }
    debug!("inferred {} capability(ies) from narrow types", needs.capabilities.len());
    needs
}

/// Drop repeated decorations and debug names the builder accumulated when
/// the same target was reached by more than one path.
pub fn finalize(module: &mut Module) {
    let mut kept: Vec<Instruction> = Vec::with_capacity(module.annotations.len());
    for inst in module.annotations.drain(..) {
        let repeated = kept
            .iter()
            .any(|k| k.class.opcode == inst.class.opcode && k.operands == inst.operands);
        if !repeated {
            kept.push(inst);
        }
    }
    module.annotations = kept;

    let mut named = HashSet::new();
    module.debug_names.retain(|inst| match (inst.class.opcode, inst.operands.first()) {
        (Op::Name, Some(Operand::IdRef(target))) => named.insert((*target, None)),
        (Op::MemberName, Some(Operand::IdRef(target))) => {
            let member = match inst.operands.get(1) {
                Some(Operand::LiteralBit32(m)) => Some(*m),
                _ => None,
            };
            named.insert((*target, member))
        }
        _ => true,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use rspirv::dr::Builder;

    fn caps(needs: &Needs) -> Vec<Capability> {
        needs.capabilities.clone()
    }

    #[test]
    fn test_wide_types_need_nothing() {
        let mut b = Builder::new();
        let int = b.type_int(32, 1);
        b.type_pointer(None, StorageClass::StorageBuffer, int);
        assert!(infer_capabilities(&b.module()).capabilities.is_empty());
    }

    #[test]
    fn test_stored_half_needs_storage_only() {
        let mut b = Builder::new();
        let half = b.type_float(16);
        let vec = b.type_vector(half, 4);
        let block = b.type_struct([vec]);
        b.type_pointer(None, StorageClass::StorageBuffer, block);
        let needs = infer_capabilities(&b.module());
        assert_eq!(caps(&needs), vec![Capability::StorageBuffer16BitAccess]);
        assert_eq!(needs.extensions, vec![decorations::STORAGE_16BIT]);
    }

    #[test]
    fn test_narrow_constant_needs_arithmetic() {
        let mut b = Builder::new();
        let byte = b.type_int(8, 0);
        b.constant_bit32(byte, 7);
        assert_eq!(caps(&infer_capabilities(&b.module())), vec![Capability::Int8]);
    }

    #[test]
    fn test_finalize_drops_duplicates() {
        let mut b = Builder::new();
        let int = b.type_int(32, 1);
        b.decorate(int, rspirv::spirv::Decoration::RelaxedPrecision, []);
        b.decorate(int, rspirv::spirv::Decoration::RelaxedPrecision, []);
        b.name(int, "a");
        b.name(int, "b");
        let mut module = b.module();
        finalize(&mut module);
        assert_eq!(module.annotations.len(), 1);
        assert_eq!(module.debug_names.len(), 1);
    }
}
