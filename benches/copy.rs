use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use fctree::{
    copy_subtree, take_snapshot, Blake3Digest, BytesPayload, InternalDef, LeafDef, NodeId,
    NodeKind, Tree, TypeRegistry,
};
use std::sync::Arc;

const BRANCH: NodeKind = NodeKind::new(200);
const BLOB: NodeKind = NodeKind::new(201);
const FANOUT: usize = 32;

/// A two-level tree with `FANOUT * FANOUT` leaves under `groups` groups.
fn build(groups: usize) -> (Tree, NodeId) {
    let registry = TypeRegistry::with_builtins();
    registry.register(BRANCH, Arc::new(InternalDef::new(FANOUT))).unwrap();
    registry.register(BLOB, Arc::new(LeafDef)).unwrap();
    let mut tree = Tree::new(Arc::new(registry), Arc::new(Blake3Digest));

    let root = tree.new_internal(BRANCH).unwrap();
    for i in 0..groups {
        let mid = tree.new_internal(BRANCH).unwrap();
        for j in 0..FANOUT {
            let leaf = tree.new_leaf(
                BLOB,
                Box::new(BytesPayload::new(vec![i as u8, j as u8, 0, 0, 0, 0, 0, 0])),
            );
            tree.set_child(mid, j, Some(leaf)).unwrap();
        }
        tree.set_child(root, i, Some(mid)).unwrap();
    }
    tree.hash_of(root).unwrap();
    (tree, root)
}

fn bench_snapshot_and_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_and_write");
    for groups in [4, 16, 32] {
        group.bench_with_input(
            BenchmarkId::from_parameter(groups * FANOUT),
            &groups,
            |b, &groups| {
                b.iter_batched(
                    || build(groups),
                    |(mut tree, root)| {
                        let fresh = take_snapshot(&mut tree, root).unwrap();
                        let writable = tree.get_for_modify(fresh, &[0, 0]).unwrap();
                        tree.payload_mut::<BytesPayload>(writable)
                            .unwrap()
                            .set(&b"written"[..]);
                        tree.rebuild(fresh).unwrap();
                        tree.hash_of(fresh).unwrap()
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

fn bench_copy_subtree(c: &mut Criterion) {
    let mut group = c.benchmark_group("copy_subtree");
    for groups in [4, 16, 32] {
        group.bench_with_input(
            BenchmarkId::from_parameter(groups * FANOUT),
            &groups,
            |b, &groups| {
                b.iter_batched(
                    || build(groups),
                    |(mut tree, root)| copy_subtree(&mut tree, None, 0, Some(root)).unwrap(),
                    BatchSize::LargeInput,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_snapshot_and_write, bench_copy_subtree);
criterion_main!(benches);
