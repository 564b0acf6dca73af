use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use gatekeep_auth::resolve_permissions;
use gatekeep_core::{Entity, PermissionId};

#[derive(Debug, Clone)]
struct BenchPermission {
    id: PermissionId,
}

impl Entity for BenchPermission {
    type Id = PermissionId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Direct grants plus `roles` roles of `per_role` permissions each, with half
/// of every role overlapping the previous one.
fn grant_set(roles: usize, per_role: usize) -> (Vec<BenchPermission>, Vec<Vec<BenchPermission>>) {
    let direct = (1..=per_role as i64)
        .map(|id| BenchPermission { id: PermissionId::new(id) })
        .collect();
    let roles = (0..roles)
        .map(|r| {
            let start = (r * per_role / 2) as i64 + 1;
            (start..start + per_role as i64)
                .map(|id| BenchPermission { id: PermissionId::new(id) })
                .collect()
        })
        .collect();
    (direct, roles)
}

criterion_group!(benches, bench_resolve_permissions);
criterion_main!(benches);

fn bench_resolve_permissions(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_permissions");

    for roles in [1usize, 8, 32] {
        let (direct, role_sets) = grant_set(roles, 20);
        let total = direct.len() + role_sets.iter().map(Vec::len).sum::<usize>();
        group.throughput(Throughput::Elements(total as u64));
        group.bench_with_input(BenchmarkId::new("roles", roles), &roles, |b, _| {
            b.iter(|| {
                let resolved =
                    resolve_permissions(black_box(&direct), black_box(role_sets.iter().flatten()));
                black_box(resolved.len())
            });
        });
    }

    group.finish();
}
