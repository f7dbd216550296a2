//! Under a non-flat likelihood the chain must settle on the exact posterior
//! over partitions, `alpha^K * prod (|b| - 1)! * prod exp L(b)`, which only
//! holds when each block's own likelihood is divided out of its weight.

use crp_gibbs::{GibbsConfig, PartitionGibbs, Sampler};
use rand::SeedableRng;
use rand::rngs::SmallRng;

fn tight_blocks(xs: &[&f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = xs.len() as f64;
    let mean = xs.iter().copied().sum::<f64>() / n;
    let ss: f64 = xs.iter().map(|&&x| (x - mean).powi(2)).sum();
    (-0.5f64).mul_add(ss, 0.7 * n)
}

/// All partitions of three items, as labels in order of first appearance.
const PARTITIONS: [[usize; 3]; 5] = [
    [0, 0, 0],
    [0, 0, 1],
    [0, 1, 0],
    [0, 1, 1],
    [0, 1, 2],
];

fn exact_posterior(data: &[f64], alpha: f64) -> Vec<f64> {
    let weights: Vec<f64> = PARTITIONS
        .iter()
        .map(|z| {
            let k = z.iter().max().map_or(0, |m| m + 1);
            (0..k)
                .map(|label| {
                    let members: Vec<&f64> = z
                        .iter()
                        .zip(data)
                        .filter_map(|(&l, x)| (l == label).then_some(x))
                        .collect();
                    let factorial: f64 = (1..members.len()).map(|i| i as f64).product();
                    alpha * factorial * tight_blocks(&members).exp()
                })
                .product()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}

#[allow(clippy::cast_precision_loss)]
#[test]
fn three_items_follow_exact_posterior() {
    let data = vec![0.0, 0.5, 2.0];
    let alpha = 1.3;
    let expected = exact_posterior(&data, alpha);

    let mut rng = SmallRng::seed_from_u64(0x1234);
    let config = GibbsConfig::default().with_concentration(alpha);
    let mut sampler = PartitionGibbs::new(data, tight_blocks, config).unwrap();
    sampler.initialize(&mut rng).unwrap();
    sampler.multi_step(1_000, &mut rng).unwrap();

    let n_samples = 200_000;
    let mut counts = [0_usize; 5];
    let draws = sampler.iter_sample(&mut rng, |s| {
        s.store().to_partition().map(|p| p.z().clone())
    });
    for z in draws.take(n_samples) {
        let z = z.unwrap().expect("every item to be assigned");
        let ix = PARTITIONS
            .iter()
            .position(|p| p[..] == z[..])
            .expect("a canonical partition of three items");
        counts[ix] += 1;
    }

    for ((count, p), z) in counts.iter().zip(&expected).zip(PARTITIONS) {
        let observed = *count as f64 / n_samples as f64;
        assert!(
            (observed - p).abs() < 0.01,
            "partition {z:?}: observed {observed:.4}, expected {p:.4}"
        );
    }
}

#[test]
fn exact_posterior_differs_from_prior() {
    // Guards the test above against a likelihood too weak to matter.
    let posterior = exact_posterior(&[0.0, 0.5, 2.0], 1.3);
    let prior = exact_posterior_flat(1.3);
    let max_gap = posterior
        .iter()
        .zip(&prior)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0, f64::max);
    assert!(max_gap > 0.05);
}

fn exact_posterior_flat(alpha: f64) -> Vec<f64> {
    let weights: Vec<f64> = PARTITIONS
        .iter()
        .map(|z| {
            let k = z.iter().max().map_or(0, |m| m + 1);
            let sizes: Vec<usize> = (0..k).map(|l| z.iter().filter(|&&x| x == l).count()).collect();
            sizes
                .iter()
                .map(|&s| alpha * (1..s).map(|i| i as f64).product::<f64>())
                .product()
        })
        .collect();
    let total: f64 = weights.iter().sum();
    weights.into_iter().map(|w| w / total).collect()
}
