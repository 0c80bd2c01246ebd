use proptest::prelude::*;

/// Tenant id for index `i`; zero-padded so lexical order matches index order
pub fn tenant_name(i: usize) -> String {
    format!("tenant-{i:02}@example.com")
}

/// `n` tenants each submitting `k` tasks, in a random interleaving
///
/// Yields `(n, k, order)` where `order` lists the submitting tenant index for
/// each submission; every index appears exactly `k` times.
pub fn equal_burst_strategy() -> impl Strategy<Value = (usize, usize, Vec<usize>)> {
    (1usize..=5, 1usize..=6).prop_flat_map(|(n, k)| {
        let submissions: Vec<usize> = (0..n).flat_map(|t| std::iter::repeat(t).take(k)).collect();
        (Just(n), Just(k), Just(submissions).prop_shuffle())
    })
}

/// Per-tenant burst sizes for skewed workloads
pub fn skewed_burst_strategy() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..=8, 2..=4)
}
