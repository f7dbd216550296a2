//! With a flat likelihood the stationary distribution over partitions is the
//! Ewens distribution, so block counts must follow
//! `P(K = k) = |s(n, k)| alpha^k / (alpha)_n`.

use crp_gibbs::mcmc::history::HistorySummary;
use crp_gibbs::{GibbsConfig, PartitionGibbs};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rv::dist::ChiSquared;
use rv::traits::Cdf;

fn flat(_xs: &[&usize]) -> f64 {
    0.0
}

/// Unsigned Stirling numbers of the first kind, `|s(n, k)|` for `k` in `0..=n`.
fn stirling_row(n: usize) -> Vec<f64> {
    let mut row = vec![1.0];
    for m in 0..n {
        let mut next = vec![0.0; row.len() + 1];
        for (k, s) in row.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let m = m as f64;
            next[k] += m * s;
            next[k + 1] += s;
        }
        row = next;
    }
    row
}

/// `P(K = k)` for `k` in `0..=n`.
fn ewens_block_count_pmf(n: usize, alpha: f64) -> Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    let rising: f64 = (0..n).map(|i| alpha + i as f64).product();
    stirling_row(n)
        .into_iter()
        .zip(0_i32..)
        .map(|(s, k)| s * alpha.powi(k) / rising)
        .collect()
}

#[test]
fn stirling_numbers() {
    assert_eq!(stirling_row(3), vec![0.0, 2.0, 3.0, 1.0]);
    assert_eq!(stirling_row(4), vec![0.0, 6.0, 11.0, 6.0, 1.0]);
    let pmf = ewens_block_count_pmf(3, 1.0);
    assert::close(pmf.iter().sum::<f64>(), 1.0, 1E-12);
}

#[allow(clippy::cast_precision_loss)]
#[test]
fn three_items_follow_ewens() {
    let _ = env_logger::builder().is_test(true).try_init();

    let n = 3;
    let expected = ewens_block_count_pmf(n, 1.0);
    let mut observed = vec![0_usize; n + 1];
    let mut rng = SmallRng::seed_from_u64(0x1234);

    for _ in 0..20 {
        let config = GibbsConfig::default().with_history_interval(10);
        let mut sampler = PartitionGibbs::new(vec![0_usize, 1, 2], flat, config).unwrap();
        sampler.initialize(&mut rng).unwrap();
        assert_eq!(sampler.store().working_count(), 3);
        assert!((1..=3).contains(&sampler.cluster_count()));

        for record in sampler.run(1_000, &mut rng).unwrap() {
            observed[record.cluster_count] += 1;
        }
    }

    let total: usize = observed.iter().sum();
    assert_eq!(total, 2_000);
    assert_eq!(observed[0], 0);

    let stat: f64 = (1..=n)
        .map(|k| {
            let e = expected[k] * total as f64;
            let o = observed[k] as f64;
            (o - e).powi(2) / e
        })
        .sum();
    let p_value = 1.0 - ChiSquared::new((n - 1) as f64).expect("valid degrees of freedom").cdf(&stat);

    assert!(
        p_value > 1E-3,
        "observed {observed:?} vs expected {expected:?}: chi2 = {stat}, p = {p_value}"
    );
}

#[test]
fn mean_block_count_matches_ewens() {
    let n = 10;
    let alpha = 2.0;
    #[allow(clippy::cast_precision_loss)]
    let expected_mean: f64 = (0..n).map(|i| alpha / (alpha + i as f64)).sum();

    let mut rng = SmallRng::seed_from_u64(0xbeef);
    let config = GibbsConfig::default()
        .with_concentration(alpha)
        .with_history_interval(20);
    let data: Vec<usize> = (0..n).collect();
    let mut sampler = PartitionGibbs::new(data, flat, config).unwrap();
    sampler.initialize(&mut rng).unwrap();
    sampler.run(1_000, &mut rng).unwrap();

    let mut summary = HistorySummary::default();
    sampler.run_with_sink(100_000, &mut summary, &mut rng).unwrap();

    assert_eq!(summary.n_records(), 5_000);
    assert::close(summary.mean_cluster_count(), expected_mean, 0.1);
}
