//! Benchmarks for the uninlining pipeline.
//!
//! Measures the stages that dominate a full run:
//! - Flag decomposition over a wide flags group
//! - Dataflow analysis of a branchy method
//! - Transforming a batch of classes end to end

extern crate unpick;

use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;
use unpick::{
    analysis::Analyzer,
    bytecode::{ClassNode, MethodAccess, MethodBuilder, MethodNode, Opcode},
    codegen::FlagDecomposer,
    expression::{ConstValue, DataType, Expression},
    group::{GroupKey, GroupStore, Scope},
    resolve::{ClassRegistry, ResolvedConstant},
    UninlineConfig, Uninliner,
};

/// 32 single-bit flags `p/Flags.F0..F31` in group `flags`, the target `p/Api.set(I)V`.
fn flags_setup() -> (ClassRegistry, GroupStore) {
    let mut registry = ClassRegistry::new();
    let mut store = GroupStore::new();
    let group = store
        .declare_group("flags", DataType::Int, true)
        .unwrap();
    for bit in 0..32 {
        let name = format!("F{bit}");
        let value = ConstValue::Int(1i32.wrapping_shl(bit));
        registry.add_constant("p/Flags", &name, ResolvedConstant::new(value.clone(), true));
        group
            .insert(
                Scope::Global,
                &value,
                false,
                Expression::static_field("p/Flags", &name, Some(DataType::Int)),
            )
            .unwrap();
    }
    store.targets_mut().declare_param("p/Api", "set", "(I)V", 0, "flags");
    (registry, store)
}

/// `static void <name>(int x)` passing one of two literals to `Api.set` inside a loop.
fn branchy_method(name: &str, a: i32, b: i32) -> MethodNode {
    MethodBuilder::new(MethodAccess::STATIC, name, "(I)V")
        .label("head")
        .var(Opcode::Iload, 0)
        .jump(Opcode::Ifeq, "else")
        .push_int(a)
        .jump(Opcode::Goto, "join")
        .label("else")
        .push_int(b)
        .label("join")
        .invoke(Opcode::Invokestatic, "p/Api", "set", "(I)V")
        .iinc(0, -1)
        .var(Opcode::Iload, 0)
        .jump(Opcode::Ifne, "head")
        .op(Opcode::Return)
        .build()
        .unwrap()
}

fn bench_flag_decomposition(c: &mut Criterion) {
    let (_, store) = flags_setup();
    let key = GroupKey::Named("flags".into());
    let scopes = store.find_scopes(&key, "p/A", "f", "()V");
    let value = ConstValue::Int(0x5A5A_1234);

    c.bench_function("flags_decompose_32", |b| {
        b.iter(|| {
            let expr = FlagDecomposer::decompose(&scopes, black_box(&value), DataType::Int);
            black_box(expr)
        });
    });
}

fn bench_analysis(c: &mut Criterion) {
    let registry = ClassRegistry::new();
    let method = branchy_method("f", 3, 12);
    let analyzer = Analyzer::new(&registry);

    c.bench_function("analyze_branchy_loop", |b| {
        b.iter(|| {
            let analysis = analyzer.analyze("p/A", black_box(&method)).unwrap();
            black_box(analysis)
        });
    });
}

fn bench_transform_classes(c: &mut Criterion) {
    let (registry, store) = flags_setup();
    let uninliner = Uninliner::new(&store, &registry, &registry, UninlineConfig::default());
    let classes: Vec<ClassNode> = (0..64)
        .map(|i| {
            let mut class = ClassNode::new(&format!("p/C{i}"), Some("java/lang/Object"));
            class.methods = (0..8)
                .map(|m| branchy_method(&format!("m{m}"), i * 8 + m, (i ^ m) << 3))
                .collect();
            class
        })
        .collect();

    c.bench_function("transform_64_classes", |b| {
        b.iter(|| {
            let mut batch = classes.clone();
            let stats = uninliner.transform_classes(black_box(&mut batch));
            black_box(stats)
        });
    });
}

criterion_group!(
    benches,
    bench_flag_decomposition,
    bench_analysis,
    bench_transform_classes
);
criterion_main!(benches);
