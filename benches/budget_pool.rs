use criterion::{black_box, criterion_group, criterion_main, Criterion};
use swarm_orchestrator::domain::models::budget::BudgetPool;

fn reserve_release_cycle(c: &mut Criterion) {
    c.bench_function("budget_pool_reserve_release", |b| {
        b.iter(|| {
            let mut pool = BudgetPool::new(black_box(10_000_000), black_box(1000.0), black_box(150_000));
            for attempt in 1..=4u32 {
                if let Some(alloc) = pool.reserve("bench-task", 7, attempt) {
                    pool.release(alloc, alloc.token_budget / 2, alloc.cost_budget / 2.0);
                }
            }
            black_box(pool.tokens_used)
        });
    });
}

fn reserve_until_exhausted(c: &mut Criterion) {
    c.bench_function("budget_pool_reserve_until_exhausted", |b| {
        b.iter(|| {
            let mut pool = BudgetPool::new(black_box(500_000), black_box(50.0), black_box(20_000));
            let mut reservations = 0u32;
            while pool.reserve(&format!("t-{reservations}"), 5, 1).is_some() {
                reservations += 1;
            }
            black_box(reservations)
        });
    });
}

criterion_group!(benches, reserve_release_cycle, reserve_until_exhausted);
criterion_main!(benches);
