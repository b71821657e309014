//! Whole shaders through the public entry point.

use rspirv::dr::{Instruction, Module, Operand};
use rspirv::spirv::{BuiltIn, Capability, Decoration, ExecutionMode, ImageOperands, Op, Word};
use spirv_lower::ast::build::*;
use spirv_lower::ast::*;
use spirv_lower::options::DEFAULT_GENERATOR;
use spirv_lower::{lower, LowerOptions, LowerOutput};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn compile(unit: &TranslationUnit) -> LowerOutput {
    init();
    lower(unit, &LowerOptions::default()).expect("lowering failed")
}

fn find(module: &Module, op: Op) -> Option<&Instruction> {
    module.all_inst_iter().find(|i| i.class.opcode == op)
}

fn count(module: &Module, op: Op) -> usize {
    module.all_inst_iter().filter(|i| i.class.opcode == op).count()
}

fn sources(module: &Module) -> usize {
    module
        .debug_string_source
        .iter()
        .filter(|i| i.class.opcode == Op::Source)
        .count()
}

fn has_capability(module: &Module, cap: Capability) -> bool {
    module
        .capabilities
        .iter()
        .any(|i| i.operands.first() == Some(&Operand::Capability(cap)))
}

fn interface(module: &Module) -> Vec<Word> {
    let entry = module.entry_points.first().expect("no entry point");
    entry.operands[3..]
        .iter()
        .filter_map(|o| match o {
            Operand::IdRef(id) => Some(*id),
            _ => None,
        })
        .collect()
}

fn modes(module: &Module) -> Vec<(ExecutionMode, Vec<u32>)> {
    module
        .execution_modes
        .iter()
        .filter_map(|i| match i.operands.get(1) {
            Some(Operand::ExecutionMode(mode)) => {
                let literals = i.operands[2..]
                    .iter()
                    .filter_map(|o| match o {
                        Operand::LiteralBit32(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                Some((*mode, literals))
            }
            _ => None,
        })
        .collect()
}

fn storage(storage: StorageQualifier, location: Option<u32>) -> Qualifier {
    let mut q = Qualifier::with_storage(storage);
    q.layout.location = location;
    q
}

/// Pass-through vertex shader writing `gl_Position`, plus a private global
/// that is either touched or left alone.
fn vertex_unit(version: SpirvVersion, touch_private: bool) -> TranslationUnit {
    let mut b = UnitBuilder::new(Stage::Vertex);
    b.spirv_version(version);
    let vec4 = Type::float(32).vector(4);
    let pos = b.global("pos", vec4.clone().with_qualifier(storage(StorageQualifier::VaryingIn, Some(0))));
    let mut position_q = storage(StorageQualifier::VaryingOut, None);
    position_q.builtin = BuiltInKind::Position;
    let position = b.global("gl_Position", vec4.clone().with_qualifier(position_q));
    let scale = b.global("scale", Type::float(32).with_storage(StorageQualifier::Global));
    b.global("unused", Type::float(32).with_storage(StorageQualifier::Global));
    let mut body = vec![assign(b.var(position), b.var(pos))];
    if touch_private {
        body.push(assign(b.var(scale), float(2.0)));
    }
    b.entry(body);
    b.finish()
}

#[test]
fn test_header_words() {
    let out = compile(&vertex_unit(SpirvVersion::V1_0, false));
    assert_eq!(out.words[0], 0x0723_0203);
    assert_eq!(out.words[1], 0x0001_0000);
    assert_eq!(out.words[2], DEFAULT_GENERATOR);

    let unit = vertex_unit(SpirvVersion::V1_0, false);
    let options = LowerOptions::new().spirv_version(SpirvVersion::V1_3).generator(0x1234);
    let out = lower(&unit, &options).expect("lowering failed");
    assert_eq!(out.words[1], 0x0001_0300);
    assert_eq!(out.words[2], 0x1234);
}

#[test]
fn test_interface_before_1_4_lists_inputs_and_outputs() {
    let out = compile(&vertex_unit(SpirvVersion::V1_0, true));
    assert_eq!(interface(&out.module).len(), 2);
}

#[test]
fn test_interface_from_1_4_lists_used_globals() {
    let touched = compile(&vertex_unit(SpirvVersion::V1_4, true));
    assert_eq!(interface(&touched.module).len(), 3);
    let untouched = compile(&vertex_unit(SpirvVersion::V1_4, false));
    assert_eq!(interface(&untouched.module).len(), 2);
}

#[test]
fn test_position_output_is_decorated() {
    let out = compile(&vertex_unit(SpirvVersion::V1_0, false));
    let builtin = out.module.annotations.iter().any(|i| {
        i.operands.get(1) == Some(&Operand::Decoration(Decoration::BuiltIn))
            && i.operands.get(2) == Some(&Operand::BuiltIn(BuiltIn::Position))
    });
    assert!(builtin);
    let location = out.module.annotations.iter().any(|i| {
        i.operands.get(1) == Some(&Operand::Decoration(Decoration::Location))
            && i.operands.get(2) == Some(&Operand::LiteralBit32(0))
    });
    assert!(location);
    // every module-scope variable exists even when unused
    let globals = out
        .module
        .types_global_values
        .iter()
        .filter(|i| i.class.opcode == Op::Variable)
        .count();
    assert_eq!(globals, 4);
}

#[test]
fn test_compute_local_size() {
    let mut b = UnitBuilder::new(Stage::Compute);
    b.layout_mut().local_size = [8, 4, 1];
    b.entry(vec![builtin(BuiltinOp::Barrier, vec![], Type::void())]);
    let out = compile(&b.finish());

    assert_eq!(modes(&out.module), vec![(ExecutionMode::LocalSize, vec![8, 4, 1])]);
    let barrier = find(&out.module, Op::ControlBarrier).expect("no barrier");
    assert_eq!(barrier.operands.len(), 3);
}

#[test]
fn test_unset_local_size_defaults_to_one() {
    let mut b = UnitBuilder::new(Stage::Compute);
    b.entry(vec![]);
    let out = compile(&b.finish());
    assert_eq!(modes(&out.module), vec![(ExecutionMode::LocalSize, vec![1, 1, 1])]);
}

#[test]
fn test_fragment_origin() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    b.entry(vec![]);
    let out = compile(&b.finish());
    assert_eq!(modes(&out.module), vec![(ExecutionMode::OriginUpperLeft, vec![])]);

    let mut b = UnitBuilder::new(Stage::Fragment);
    b.target(TargetEnv {
        vulkan: false,
        ..TargetEnv::default()
    });
    b.entry(vec![]);
    let out = compile(&b.finish());
    assert_eq!(modes(&out.module), vec![(ExecutionMode::OriginLowerLeft, vec![])]);
}

fn sampling_unit(stage: Stage) -> TranslationUnit {
    let mut b = UnitBuilder::new(stage);
    let mut q = Qualifier::with_storage(StorageQualifier::Uniform);
    q.layout.binding = Some(0);
    let tex = b.global("tex", Type::sampler(SamplerDesc::combined(SamplerDim::Dim2D)).with_qualifier(q));
    let color = b.local("color", Type::float(32).vector(4));
    let coord = construct(Type::float(32).vector(2), vec![float(0.5), float(0.5)]);
    let sample = builtin(BuiltinOp::Texture, vec![b.var(tex), coord], Type::float(32).vector(4));
    b.entry(vec![declare(color, Some(sample))]);
    b.finish()
}

#[test]
fn test_fragment_sampling_uses_implicit_lod() {
    let out = compile(&sampling_unit(Stage::Fragment));
    assert!(find(&out.module, Op::ImageSampleImplicitLod).is_some());
    assert!(find(&out.module, Op::ImageSampleExplicitLod).is_none());
    let descriptor_set = out.module.annotations.iter().any(|i| {
        i.operands.get(1) == Some(&Operand::Decoration(Decoration::DescriptorSet))
            && i.operands.get(2) == Some(&Operand::LiteralBit32(0))
    });
    assert!(descriptor_set);
}

#[test]
fn test_vertex_sampling_uses_level_zero() {
    let out = compile(&sampling_unit(Stage::Vertex));
    let sample = find(&out.module, Op::ImageSampleExplicitLod).expect("no explicit sample");
    assert_eq!(sample.operands.get(2), Some(&Operand::ImageOperands(ImageOperands::LOD)));
}

#[test]
fn test_clamp_widens_scalar_bounds() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let vec3 = Type::float(32).vector(3);
    let v = b.local("v", vec3.clone());
    let clamped = builtin(BuiltinOp::Clamp, vec![b.var(v), float(0.0), float(1.0)], vec3);
    b.entry(vec![declare(v, None), assign(b.var(v), clamped)]);
    let out = compile(&b.finish());

    let ext = find(&out.module, Op::ExtInst).expect("no extended instruction");
    assert_eq!(ext.operands.get(1), Some(&Operand::LiteralExtInstInteger(43)));
    assert_eq!(count(&out.module, Op::CompositeConstruct), 2);
    assert_eq!(count(&out.module, Op::ExtInstImport), 1);
}

#[test]
fn test_mix_with_bool_selector_selects() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    let vec3 = Type::float(32).vector(3);
    let x = b.local("x", vec3.clone());
    let y = b.local("y", vec3.clone());
    let c = b.local("c", Type::bool().vector(3));
    let mixed = builtin(BuiltinOp::Mix, vec![b.var(x), b.var(y), b.var(c)], vec3);
    b.entry(vec![declare(x, None), declare(y, None), declare(c, None), assign(b.var(x), mixed)]);
    let out = compile(&b.finish());

    assert!(find(&out.module, Op::ExtInst).is_none());
    assert_eq!(count(&out.module, Op::Select), 1);
}

#[test]
fn test_add_carry_writes_carry() {
    let mut b = UnitBuilder::new(Stage::Compute);
    let a = b.local("a", Type::uint(32));
    let carry = b.local("carry", Type::uint(32));
    let sum = builtin(BuiltinOp::UaddCarry, vec![b.var(a), b.var(a), b.var(carry)], Type::uint(32));
    b.entry(vec![declare(a, Some(uint(7))), declare(carry, None), assign(b.var(a), sum)]);
    let out = compile(&b.finish());

    assert_eq!(count(&out.module, Op::IAddCarry), 1);
    let pair = out
        .module
        .types_global_values
        .iter()
        .filter(|i| i.class.opcode == Op::TypeStruct)
        .collect::<Vec<_>>();
    assert_eq!(pair.len(), 1);
    assert_eq!(pair[0].operands.len(), 2);
    assert_eq!(count(&out.module, Op::CompositeExtract), 2);
}

fn elect_unit(version: SpirvVersion) -> TranslationUnit {
    let mut b = UnitBuilder::new(Stage::Compute);
    b.spirv_version(version);
    let e = b.local("e", Type::bool());
    b.entry(vec![declare(e, Some(builtin(BuiltinOp::SubgroupElect, vec![], Type::bool())))]);
    b.finish()
}

#[test]
fn test_subgroup_needs_1_3() {
    let old = compile(&elect_unit(SpirvVersion::V1_0));
    assert!(old.diagnostics.has_missing_functionality());
    assert!(find(&old.module, Op::GroupNonUniformElect).is_none());

    let new = compile(&elect_unit(SpirvVersion::V1_3));
    assert!(new.diagnostics.is_empty());
    assert!(find(&new.module, Op::GroupNonUniformElect).is_some());
    assert!(has_capability(&new.module, Capability::GroupNonUniform));
}

#[test]
fn test_source_and_uncalled_functions() {
    let mut b = UnitBuilder::new(Stage::Fragment);
    b.function("helper", Type::void(), vec![], vec![]);
    b.entry(vec![]);
    let unit = b.finish();

    let out = compile(&unit);
    assert_eq!(out.module.functions.len(), 1);
    assert_eq!(sources(&out.module), 1);

    let options = LowerOptions::new().emit_source(false).emit_uncalled_functions(true);
    let out = lower(&unit, &options).expect("lowering failed");
    assert_eq!(out.module.functions.len(), 2);
    assert_eq!(sources(&out.module), 0);
}
