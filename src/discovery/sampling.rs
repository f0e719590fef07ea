/// Network sampling
///
/// Probing a small, priority-weighted sample first tells us whether a large
/// block is worth sweeping in full. The sample always includes every
/// High-priority target; the rest is a uniform draw from the remainder.

use crate::discovery::prioritize::{PrioritizedTarget, Priority};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Sample size bounds
const MIN_SAMPLE: usize = 10;
const MAX_SAMPLE: usize = 500;

/// Probability a Medium-priority target survives sparse-scan thinning
const SPARSE_MEDIUM_KEEP: f64 = 0.30;

/// What the sampling pass decided about the rest of the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingDecision {
    /// Sampling was not triggered
    NotSampled,
    /// Nearly empty network, stop with the sample results
    TerminateEarly,
    /// Sparse network, thin the remaining targets
    SparseScan,
    /// Dense network, sweep everything
    FullScan,
    /// Middling density, scan the remainder normally
    NormalScan,
}

/// Sampling phase outcome carried into the summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingReport {
    pub used: bool,
    pub sample_size: usize,
    pub tested: usize,
    pub alive: usize,
    pub density: f64,
    pub response_rate: f64,
    pub confidence: f64,
    pub decision: SamplingDecision,
}

impl SamplingReport {
    pub fn not_sampled() -> Self {
        Self {
            used: false,
            sample_size: 0,
            tested: 0,
            alive: 0,
            density: 0.0,
            response_rate: 0.0,
            confidence: 0.0,
            decision: SamplingDecision::NotSampled,
        }
    }
}

/// Compute the sample size for a network of `total` targets
pub fn sample_size(total: usize, sampling_percent: f64) -> usize {
    let raw = (total as f64 * sampling_percent) as usize;
    raw.clamp(MIN_SAMPLE, MAX_SAMPLE).min(total)
}

/// Split prioritized targets into the sample and the remainder
///
/// All High-priority targets enter the sample; the rest of the quota is a
/// Fisher-Yates draw from the remaining targets.
pub fn select_sample<R: Rng>(
    targets: Vec<PrioritizedTarget>,
    size: usize,
    rng: &mut R,
) -> (Vec<PrioritizedTarget>, Vec<PrioritizedTarget>) {
    let (high, mut rest): (Vec<_>, Vec<_>) = targets
        .into_iter()
        .partition(|t| t.priority == Priority::High);

    let mut sample = high;
    if sample.len() < size {
        let draw = size - sample.len();
        rest.shuffle(rng);
        let tail = rest.split_off(draw.min(rest.len()));
        sample.extend(rest);
        rest = tail;
    }

    debug!(
        "sample selected: {} targets ({} remain)",
        sample.len(),
        rest.len()
    );
    (sample, rest)
}

/// Evaluate sample results into a scan decision
///
/// # Arguments
/// * `tested` - Probes completed during the sampling phase
/// * `alive` - Hosts that answered up
/// * `responses` - Probes that produced any definite answer (up or down)
pub fn evaluate(size: usize, tested: usize, alive: usize, responses: usize) -> SamplingReport {
    let density = if tested > 0 {
        alive as f64 / tested as f64
    } else {
        0.0
    };
    let response_rate = if tested > 0 {
        responses as f64 / tested as f64
    } else {
        0.0
    };
    let confidence = (size as f64 / 100.0).min(0.95) * response_rate;

    let decision = if density <= 0.05 && alive < 3 {
        SamplingDecision::TerminateEarly
    } else if density <= 0.05 {
        SamplingDecision::SparseScan
    } else if density >= 0.30 {
        SamplingDecision::FullScan
    } else {
        SamplingDecision::NormalScan
    };

    info!(
        "sampling: {}/{} alive (density {:.3}, confidence {:.2}) -> {:?}",
        alive, tested, density, confidence, decision
    );

    SamplingReport {
        used: true,
        sample_size: size,
        tested,
        alive,
        density,
        response_rate,
        confidence,
        decision,
    }
}

/// Thin the remaining targets for a sparse network
///
/// Keeps every High, each Medium with probability 0.30, and no Low.
pub fn thin_for_sparse<R: Rng>(
    remaining: Vec<PrioritizedTarget>,
    rng: &mut R,
) -> Vec<PrioritizedTarget> {
    let before = remaining.len();
    let thinned: Vec<PrioritizedTarget> = remaining
        .into_iter()
        .filter(|t| match t.priority {
            Priority::High => true,
            Priority::Medium => rng.gen_bool(SPARSE_MEDIUM_KEEP),
            Priority::Low => false,
        })
        .collect();

    debug!("sparse thinning: {} -> {} targets", before, thinned.len());
    thinned
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::net::IpAddr;

    fn target(last: u8, priority: Priority) -> PrioritizedTarget {
        PrioritizedTarget {
            address: IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, last)),
            priority,
            reason: String::new(),
        }
    }

    #[test]
    fn test_sample_size_bounds() {
        assert_eq!(sample_size(4094, 0.10), 409);
        assert_eq!(sample_size(50, 0.10), 10); // floor
        assert_eq!(sample_size(20_000, 0.10), 500); // ceiling
        assert_eq!(sample_size(5, 0.10), 5); // never above total
    }

    #[test]
    fn test_sample_includes_all_high() {
        let mut targets: Vec<_> = (1..=100)
            .map(|i| target(i, Priority::Low))
            .collect();
        targets[3].priority = Priority::High;
        targets[40].priority = Priority::High;
        let high_addrs: Vec<IpAddr> = vec![targets[3].address, targets[40].address];

        let mut rng = StdRng::seed_from_u64(7);
        let (sample, rest) = select_sample(targets, 10, &mut rng);

        assert_eq!(sample.len(), 10);
        for addr in high_addrs {
            assert!(sample.iter().any(|t| t.address == addr));
        }
        assert_eq!(rest.len(), 90);
    }

    #[test]
    fn test_sample_with_more_high_than_quota() {
        let targets: Vec<_> = (1..=20).map(|i| target(i, Priority::High)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let (sample, rest) = select_sample(targets, 10, &mut rng);
        // All High targets are kept even past the quota
        assert_eq!(sample.len(), 20);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_evaluate_terminate_early() {
        let report = evaluate(100, 100, 2, 50);
        assert_eq!(report.decision, SamplingDecision::TerminateEarly);
        assert!((report.density - 0.02).abs() < 1e-9);
    }

    #[test]
    fn test_evaluate_sparse() {
        let report = evaluate(100, 100, 4, 60);
        assert_eq!(report.decision, SamplingDecision::SparseScan);
    }

    #[test]
    fn test_evaluate_full() {
        let report = evaluate(100, 100, 35, 90);
        assert_eq!(report.decision, SamplingDecision::FullScan);
    }

    #[test]
    fn test_evaluate_normal() {
        let report = evaluate(100, 100, 15, 80);
        assert_eq!(report.decision, SamplingDecision::NormalScan);
    }

    #[test]
    fn test_confidence_formula() {
        let report = evaluate(50, 50, 10, 40);
        // min(50/100, 0.95) * (40/50) = 0.5 * 0.8
        assert!((report.confidence - 0.4).abs() < 1e-9);

        let report = evaluate(500, 500, 200, 500);
        // capped at 0.95 * 1.0
        assert!((report.confidence - 0.95).abs() < 1e-9);
    }

    #[test]
    fn test_thin_for_sparse() {
        let mut targets = vec![target(1, Priority::High), target(2, Priority::High)];
        for i in 3..103 {
            targets.push(target(i as u8, Priority::Medium));
        }
        for i in 103..203 {
            targets.push(target((i % 250) as u8, Priority::Low));
        }

        let mut rng = StdRng::seed_from_u64(42);
        let thinned = thin_for_sparse(targets, &mut rng);

        // All High kept, no Low kept, roughly 30% of Medium
        assert!(thinned.iter().filter(|t| t.priority == Priority::High).count() == 2);
        assert!(thinned.iter().all(|t| t.priority != Priority::Low));
        let mediums = thinned.iter().filter(|t| t.priority == Priority::Medium).count();
        assert!(mediums > 10 && mediums < 60, "mediums = {}", mediums);
    }
}
