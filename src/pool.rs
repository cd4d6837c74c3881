use rayon::prelude::*;

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .ok()
}

/// Maps `items` through `fetch`, sequentially when `parallelism <= 1` and on a
/// bounded pool otherwise. Output order always matches input order.
pub fn fetch_all<I, T, F>(items: &[I], parallelism: usize, fetch: F) -> Vec<T>
where
    I: Sync,
    T: Send,
    F: Fn(&I) -> T + Sync + Send,
{
    if parallelism <= 1 || items.len() <= 1 {
        return items.iter().map(fetch).collect();
    }
    match build_fetch_pool(parallelism.min(items.len())) {
        Some(pool) => pool.install(|| items.par_iter().map(&fetch).collect()),
        None => items.iter().map(fetch).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::fetch_all;

    #[test]
    fn parallel_output_keeps_input_order() {
        let items: Vec<u64> = (0..64).collect();
        let sequential = fetch_all(&items, 1, |n| n * 3);
        let parallel = fetch_all(&items, 8, |n| {
            std::thread::sleep(std::time::Duration::from_micros(64 - n));
            n * 3
        });
        assert_eq!(sequential, parallel);
    }
}
