use crate::ast::build::*;
use crate::ast::*;
use crate::lowering::{lower, scalar_bits, LowerOutput};
use crate::options::LowerOptions;
use rspirv::dr::{Instruction, Module, Operand};
use rspirv::spirv::{AddressingModel, Capability, Decoration, Op, Word};

fn lower_unit(unit: &TranslationUnit) -> LowerOutput {
    lower(unit, &LowerOptions::default()).expect("lowering failed")
}

fn count(module: &Module, op: Op) -> usize {
    module.all_inst_iter().filter(|i| i.class.opcode == op).count()
}

fn has_capability(module: &Module, cap: Capability) -> bool {
    module
        .capabilities
        .iter()
        .any(|i| i.operands.first() == Some(&Operand::Capability(cap)))
}

/// Id carrying the debug name `name`.
fn named(module: &Module, name: &str) -> Word {
    module
        .debug_names
        .iter()
        .find_map(|i| match (i.class.opcode, i.operands.as_slice()) {
            (Op::Name, [Operand::IdRef(id), Operand::LiteralString(s)]) if s == name => Some(*id),
            _ => None,
        })
        .unwrap_or_else(|| panic!("nothing named {}", name))
}

/// Instructions of the function named `name`, in block order.
fn body<'m>(module: &'m Module, name: &str) -> Vec<&'m Instruction> {
    let id = named(module, name);
    module
        .functions
        .iter()
        .find(|f| f.def.as_ref().and_then(|d| d.result_id) == Some(id))
        .unwrap_or_else(|| panic!("no function {}", name))
        .blocks
        .iter()
        .flat_map(|b| b.instructions.iter())
        .collect()
}

fn position(insts: &[&Instruction], op: Op) -> usize {
    insts
        .iter()
        .position(|i| i.class.opcode == op)
        .unwrap_or_else(|| panic!("no {:?}", op))
}

fn constant_value(module: &Module, id: Word) -> Option<u32> {
    module
        .types_global_values
        .iter()
        .find(|i| i.result_id == Some(id))
        .and_then(|i| match i.operands.first() {
            Some(Operand::LiteralBit32(v)) => Some(*v),
            _ => None,
        })
}

fn block_qualifier(storage: StorageQualifier, packing: Packing, binding: u32) -> Qualifier {
    let mut q = Qualifier::with_storage(storage);
    q.layout.packing = packing;
    q.layout.binding = Some(binding);
    q
}

#[test]
fn test_vector_types_are_shared() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let vec4 = Type::float(32).vector(4);
    let x = b.local("x", vec4.clone());
    let y = b.local("y", vec4);
    b.entry(vec![declare(x, None), declare(y, None)]);
    let out = lower_unit(&b.finish());

    assert_eq!(count(&out.module, Op::TypeVector), 1);
    assert_eq!(count(&out.module, Op::TypeFloat), 1);
    assert!(out.diagnostics.is_empty());
}

#[test]
fn test_struct_layouts_get_distinct_ids() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let s = b.add_struct(
        "S",
        vec![
            StructMember::new("a", Type::float(32)),
            StructMember::new("b", Type::float(32).vector(3)),
        ],
    );
    let q = block_qualifier(StorageQualifier::Uniform, Packing::Std140, 0);
    let ubo = b.add_block("UBO", vec![StructMember::new("s", Type::structure(s))], q.clone());
    b.global("ubo", Type::block(ubo, q));
    let t = b.local("t", Type::structure(s));
    let u = b.local("u", Type::structure(s));
    b.entry(vec![declare(t, None), declare(u, None)]);
    let out = lower_unit(&b.finish());

    // plain S, laid-out S and the block itself
    assert_eq!(count(&out.module, Op::TypeStruct), 3);
    let offsets = out
        .module
        .annotations
        .iter()
        .filter(|i| i.class.opcode == Op::MemberDecorate && i.operands.get(2) == Some(&Operand::Decoration(Decoration::Offset)))
        .count();
    // two members of the laid-out S, one of the block
    assert_eq!(offsets, 3);
}

#[test]
fn test_bool_in_buffer_is_stored_as_uint() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let q = block_qualifier(StorageQualifier::Buffer, Packing::Std430, 0);
    let block = b.add_block("Flags", vec![StructMember::new("flag", Type::bool())], q.clone());
    let buf = b.global("flags", Type::block(block, q));
    let local = b.local("f", Type::bool());
    let read = b.member(b.var(buf), 0);
    let write = b.member(b.var(buf), 0);
    b.entry(vec![declare(local, Some(read)), assign(write, boolean(true))]);
    let out = lower_unit(&b.finish());

    let main = body(&out.module, "main");
    assert_eq!(main.iter().filter(|i| i.class.opcode == Op::INotEqual).count(), 1);
    assert_eq!(main.iter().filter(|i| i.class.opcode == Op::Select).count(), 1);
}

#[test]
fn test_index_is_evaluated_before_value() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let f = b.function("f", Type::int(32), vec![], vec![ret(Some(int(1)))]);
    let g = b.function("g", Type::float(32), vec![], vec![ret(Some(float(2.0)))]);
    let a = b.local("a", Type::float(32).array(ArraySize::Sized(4)));
    let target = index(b.var(a), b.call(f, vec![]));
    let value = b.call(g, vec![]);
    b.entry(vec![declare(a, None), assign(target, value)]);
    let out = lower_unit(&b.finish());

    let (f_id, g_id) = (named(&out.module, "f"), named(&out.module, "g"));
    let callees: Vec<Word> = body(&out.module, "main")
        .iter()
        .filter(|i| i.class.opcode == Op::FunctionCall)
        .filter_map(|i| match i.operands.first() {
            Some(Operand::IdRef(id)) => Some(*id),
            _ => None,
        })
        .collect();
    assert_eq!(callees, vec![f_id, g_id]);
}

#[test]
fn test_compound_assignment_reads_after_value() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let s = b.add_struct(
        "Pair",
        vec![StructMember::new("x", Type::float(32)), StructMember::new("y", Type::float(32))],
    );
    let h = b.function("h", Type::float(32), vec![], vec![ret(Some(float(1.0)))]);
    let p = b.local("p", Type::structure(s));
    let target = b.member(b.var(p), 1);
    let value = b.call(h, vec![]);
    b.entry(vec![declare(p, None), compound_assign(BinaryOp::AddAssign, target, value)]);
    let out = lower_unit(&b.finish());

    let main = body(&out.module, "main");
    let call = position(&main, Op::FunctionCall);
    let load = position(&main, Op::Load);
    assert!(call < load, "left side read before the right side ran");
    assert!(load < position(&main, Op::FAdd));
    assert!(position(&main, Op::FAdd) < position(&main, Op::Store));
}

#[test]
fn test_capabilities_are_listed_once() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let x = b.local("x", Type::float(64));
    let y = b.local("y", Type::float(64).vector(2));
    let sum = binary(BinaryOp::Add, b.var(x), b.var(x), Type::float(64));
    b.entry(vec![declare(x, None), declare(y, None), assign(b.var(x), sum)]);
    let out = lower_unit(&b.finish());

    let float64 = out
        .module
        .capabilities
        .iter()
        .filter(|i| i.operands.first() == Some(&Operand::Capability(Capability::Float64)))
        .count();
    assert_eq!(float64, 1);
    let shader = out
        .module
        .capabilities
        .iter()
        .filter(|i| i.operands.first() == Some(&Operand::Capability(Capability::Shader)))
        .count();
    assert_eq!(shader, 1);
}

#[test]
fn test_hidden_member_is_skipped() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let mut hidden = StructMember::new("b", Type::float(32));
    hidden.hidden = true;
    let mut gated = StructMember::new("d", Type::float(32));
    gated.required_extension = Some("GL_EXT_not_enabled".to_string());
    let s = b.add_struct(
        "S",
        vec![
            StructMember::new("a", Type::float(32)),
            hidden,
            StructMember::new("c", Type::float(32)),
            gated,
        ],
    );
    let v = b.local("v", Type::structure(s));
    let target = b.member(b.var(v), 2);

    let mut pad = StructMember::new("pad", Type::float(32).vector(4));
    pad.hidden = true;
    let q = block_qualifier(StorageQualifier::Buffer, Packing::Std430, 0);
    let block = b.add_block(
        "Padded",
        vec![
            StructMember::new("first", Type::float(32)),
            pad,
            StructMember::new("second", Type::float(32)),
        ],
        q.clone(),
    );
    let buf = b.global("padded", Type::block(block, q));
    let second = b.member(b.var(buf), 2);
    b.entry(vec![declare(v, None), assign(target, float(1.0)), assign(second, float(2.0))]);
    let out = lower_unit(&b.finish());

    let strukt = out
        .module
        .types_global_values
        .iter()
        .find(|i| i.result_id == Some(named(&out.module, "S")))
        .expect("no struct");
    assert_eq!(strukt.operands.len(), 2);

    // the hidden vec4 takes no space in the laid-out block
    let padded = named(&out.module, "Padded");
    let offsets: Vec<(u32, u32)> = out
        .module
        .annotations
        .iter()
        .filter_map(|i| match i.operands.as_slice() {
            [Operand::IdRef(id), Operand::LiteralBit32(member), Operand::Decoration(Decoration::Offset), Operand::LiteralBit32(offset)]
                if *id == padded =>
            {
                Some((*member, *offset))
            }
            _ => None,
        })
        .collect();
    assert_eq!(offsets, vec![(0, 0), (1, 4)]);

    let main = body(&out.module, "main");
    let chain = main[position(&main, Op::AccessChain)];
    let Some(Operand::IdRef(index)) = chain.operands.last() else {
        panic!("access chain without an index");
    };
    assert_eq!(constant_value(&out.module, *index), Some(1));
}

#[test]
fn test_array_element_struct_is_cached_apart() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let mut color = Type::float(32).vector(4);
    color.qualifier.layout.location = Some(3);
    let s = b.add_struct("Varyings", vec![StructMember::new("color", color)]);
    let many = b.local("many", Type::structure(s).array(ArraySize::Sized(2)));
    let one = b.local("one", Type::structure(s));
    b.entry(vec![declare(many, None), declare(one, None)]);
    let out = lower_unit(&b.finish());

    // the array element comes first and must not hand its undecorated
    // struct to the plain use
    assert_eq!(count(&out.module, Op::TypeStruct), 2);
    let locations = out
        .module
        .annotations
        .iter()
        .filter(|i| i.class.opcode == Op::MemberDecorate && i.operands.get(2) == Some(&Operand::Decoration(Decoration::Location)))
        .count();
    assert_eq!(locations, 1);
}

#[test]
fn test_carry_into_dynamic_component_goes_through_scratch() {
    let mut b = UnitBuilder::new(Stage::Compute);
    let a = b.local("a", Type::uint(32));
    let i = b.local("i", Type::uint(32));
    let carries = b.local("carries", Type::uint(32).vector(4));
    let slot = index(b.var(carries), b.var(i));
    let sum = builtin(BuiltinOp::UaddCarry, vec![b.var(a), b.var(a), slot], Type::uint(32));
    b.entry(vec![
        declare(a, Some(uint(7))),
        declare(i, Some(uint(2))),
        declare(carries, None),
        assign(b.var(a), sum),
    ]);
    let out = lower_unit(&b.finish());

    let scratch = named(&out.module, "scratch");
    let main = body(&out.module, "main");
    let add = position(&main, Op::IAddCarry);
    let stored = main
        .iter()
        .position(|i| i.class.opcode == Op::Store && i.operands.first() == Some(&Operand::IdRef(scratch)))
        .expect("carry never reaches the scratch variable");
    let reloaded = main
        .iter()
        .position(|i| i.class.opcode == Op::Load && i.operands.get(0) == Some(&Operand::IdRef(scratch)))
        .expect("scratch never read back");
    assert!(add < stored && stored < reloaded);
}

#[test]
fn test_self_referential_reference_uses_forward_pointer() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let mut node_q = Qualifier::with_storage(StorageQualifier::Buffer);
    node_q.layout.packing = Packing::Std430;
    node_q.layout.buffer_reference = true;
    let node = b.add_block("Node", vec![], node_q);
    b.set_members(
        node,
        vec![
            StructMember::new("next", Type::reference(node)),
            StructMember::new("value", Type::int(32)),
        ],
    );
    let mut pc_q = Qualifier::with_storage(StorageQualifier::Uniform);
    pc_q.layout.push_constant = true;
    let pc = b.add_block("Push", vec![StructMember::new("head", Type::reference(node))], pc_q.clone());
    let push = b.global("push", Type::block(pc, pc_q));
    let v = b.local("v", Type::int(32));
    let head = b.member(b.var(push), 0);
    let value = b.member(head, 1);
    b.entry(vec![declare(v, Some(value))]);
    let out = lower_unit(&b.finish());

    assert_eq!(count(&out.module, Op::TypeForwardPointer), 1);
    assert!(has_capability(&out.module, Capability::PhysicalStorageBufferAddresses));
    let model = out.module.memory_model.as_ref().expect("no memory model");
    assert_eq!(
        model.operands.first(),
        Some(&Operand::AddressingModel(AddressingModel::PhysicalStorageBuffer64))
    );
    let aligned = body(&out.module, "main").iter().any(|i| {
        i.class.opcode == Op::Load
            && i.operands.iter().any(|o| matches!(o, Operand::MemoryAccess(m) if m.contains(rspirv::spirv::MemoryAccess::ALIGNED)))
    });
    assert!(aligned, "load through a buffer reference carries no alignment");
}

#[test]
fn test_runtime_array_as_last_member() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let q = block_qualifier(StorageQualifier::Buffer, Packing::Std430, 1);
    let block = b.add_block(
        "Data",
        vec![
            StructMember::new("count", Type::uint(32)),
            StructMember::new("values", Type::float(32).array(ArraySize::Unsized)),
        ],
        q.clone(),
    );
    let data = b.global("data", Type::block(block, q));
    let n = b.local("n", Type::int(32));
    let length = unary(UnaryOp::ArrayLength, b.member(b.var(data), 1), Type::int(32));
    b.entry(vec![declare(n, Some(length))]);
    let out = lower_unit(&b.finish());

    assert!(!has_capability(&out.module, Capability::RuntimeDescriptorArray));
    assert_eq!(count(&out.module, Op::TypeRuntimeArray), 1);
    let main = body(&out.module, "main");
    let length = main[position(&main, Op::ArrayLength)];
    assert_eq!(length.operands.get(1), Some(&Operand::LiteralBit32(1)));
    let stride = out.module.annotations.iter().any(|i| {
        i.operands.get(1) == Some(&Operand::Decoration(Decoration::ArrayStride))
            && i.operands.get(2) == Some(&Operand::LiteralBit32(4))
    });
    assert!(stride);
}

#[test]
fn test_spec_constant_gets_spec_id() {
    let mut b = UnitBuilder::new(Stage::Compute);
    let k = b.spec_constant("k", Type::int(32), ConstantValue::Int(7), 3);
    let x = b.local("x", Type::int(32));
    b.entry(vec![declare(k, None), declare(x, Some(b.var(k)))]);
    let out = lower_unit(&b.finish());

    let spec = out
        .module
        .types_global_values
        .iter()
        .find(|i| i.class.opcode == Op::SpecConstant)
        .expect("no spec constant");
    assert_eq!(spec.operands.first(), Some(&Operand::LiteralBit32(7)));
    let id = spec.result_id;
    let decorated = out.module.annotations.iter().any(|i| {
        i.operands.first() == id.map(Operand::IdRef).as_ref()
            && i.operands.get(1) == Some(&Operand::Decoration(Decoration::SpecId))
            && i.operands.get(2) == Some(&Operand::LiteralBit32(3))
    });
    assert!(decorated);
}

#[test]
fn test_narrow_signed_constants_are_sign_extended() {
    assert_eq!(scalar_bits(&ConstantValue::Int(-1), &Type::int(16)), 0xffff_ffff);
    assert_eq!(scalar_bits(&ConstantValue::Int(-2), &Type::int(8)), 0xffff_fffe);
    assert_eq!(scalar_bits(&ConstantValue::Int(5), &Type::int(16)), 5);
    assert_eq!(scalar_bits(&ConstantValue::Uint(0x1_0001), &Type::uint(16)), 1);
    assert_eq!(scalar_bits(&ConstantValue::Bool(true), &Type::bool()), 1);
}

#[test]
fn test_half_constants_round_to_nearest_even() {
    let half = Type::float(16);
    let bits = |v: f64| scalar_bits(&ConstantValue::Float(v), &half);
    assert_eq!(bits(1.0), 0x3c00);
    assert_eq!(bits(-2.0), 0xc000);
    // ties go to the even mantissa
    assert_eq!(bits(1.0 + 2f64.powi(-11)), 0x3c00);
    assert_eq!(bits(1.0 + 3.0 * 2f64.powi(-11)), 0x3c02);
    // subnormals
    assert_eq!(bits(2f64.powi(-24)), 0x0001);
    assert_eq!(bits(2f64.powi(-15)), 0x0200);
    assert_eq!(bits(1e6), 0x7c00);
}

#[test]
fn test_half_in_buffer_needs_only_storage_capability() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let q = block_qualifier(StorageQualifier::Buffer, Packing::Std430, 0);
    let block = b.add_block("Halves", vec![StructMember::new("h", Type::float(16).vector(4))], q.clone());
    b.global("halves", Type::block(block, q));
    b.spirv_version(SpirvVersion::V1_3);
    b.entry(vec![]);
    let out = lower_unit(&b.finish());

    assert!(has_capability(&out.module, Capability::StorageBuffer16BitAccess));
    assert!(!has_capability(&out.module, Capability::Float16));
}

#[test]
fn test_out_argument_is_copied_back() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let r = b.local("r", Type::float(32).with_storage(StorageQualifier::Out));
    let set = b.function("set", Type::void(), vec![r], vec![]);
    b.define_function(set, vec![assign(b.var(r), float(1.0))]);
    let x = b.local("x", Type::float(32));
    let call = b.call(set, vec![b.var(x)]);
    b.entry(vec![declare(x, None), call]);
    let out = lower_unit(&b.finish());

    let main = body(&out.module, "main");
    let call = position(&main, Op::FunctionCall);
    // nothing is copied in for an out parameter
    assert!(main[..call].iter().all(|i| i.class.opcode != Op::Store));
    let after: Vec<Op> = main[call + 1..].iter().map(|i| i.class.opcode).collect();
    let load = after.iter().position(|&op| op == Op::Load).expect("no copy back");
    assert!(after[load..].contains(&Op::Store));
}

#[test]
fn test_aggregate_arithmetic_is_reported() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let s = b.add_struct("S", vec![StructMember::new("a", Type::float(32))]);
    let x = b.local("x", Type::structure(s));
    let sum = binary(BinaryOp::Add, b.var(x), b.var(x), Type::structure(s));
    b.entry(vec![declare(x, None), assign(b.var(x), sum)]);
    let out = lower_unit(&b.finish());

    assert!(out.diagnostics.has_missing_functionality());
    assert_eq!(count(&out.module, Op::ConstantNull), 1);
}

#[test]
fn test_short_circuit_with_call_branches() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let f = b.function("f", Type::bool(), vec![], vec![ret(Some(boolean(true)))]);
    let a = b.local("a", Type::bool());
    let c = b.local("c", Type::bool());
    let both = binary(BinaryOp::LogicalAnd, b.var(a), b.call(f, vec![]), Type::bool());
    let cheap = binary(BinaryOp::LogicalOr, b.var(a), b.var(c), Type::bool());
    b.entry(vec![
        declare(a, Some(boolean(false))),
        declare(c, Some(both)),
        assign(b.var(c), cheap),
    ]);
    let out = lower_unit(&b.finish());

    let main = body(&out.module, "main");
    assert_eq!(main.iter().filter(|i| i.class.opcode == Op::Phi).count(), 1);
    assert_eq!(main.iter().filter(|i| i.class.opcode == Op::LogicalOr).count(), 1);
    assert_eq!(main.iter().filter(|i| i.class.opcode == Op::LogicalAnd).count(), 0);
}

#[test]
fn test_debug_names_can_be_disabled() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let x = b.local("x", Type::float(32));
    b.entry(vec![declare(x, None)]);
    let unit = b.finish();
    let out = lower(&unit, &LowerOptions::default().debug_names(false)).expect("lowering failed");
    assert!(out.module.debug_names.is_empty());
}
