/// Discovery engine
///
/// Orchestrates the full pipeline: prioritize, validate methods, sample,
/// probe with per-target fallback chains, and merge. The engine always
/// returns a summary; per-target failures become records, never errors.

use crate::config::{DiscoveryConfig, RateProfile};
use crate::discovery::merge::{count_alive, merge_records};
use crate::discovery::methods::MethodProber;
use crate::discovery::prioritize::{prioritize, LocalContext, PrioritizedTarget, Priority};
use crate::discovery::sampling::{
    evaluate, sample_size, select_sample, thin_for_sparse, SamplingDecision, SamplingReport,
};
use crate::discovery::{DiscoveryMethod, DiscoveryRecord, HostState};
use crate::netinfo::{default_gateway, read_arp_cache, InterfaceEnumerator};
use crate::privilege::{recommend_discovery, Capabilities};
use crate::rate::{ProbeOutcome, RateAdjustment, RateController, RateWindow};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// How many High-priority targets each candidate method is validated against
const VALIDATION_TARGETS: usize = 3;

/// Tunables for one discovery invocation
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    pub method_fallback: bool,
    pub sampling_enabled: bool,
    pub sampling_threshold: usize,
    pub sampling_percent: f64,
    pub concurrency: usize,
    pub timeout: Duration,
}

impl DiscoveryOptions {
    pub fn from_config(config: &DiscoveryConfig, profile: &RateProfile) -> Self {
        Self {
            method_fallback: config.method_fallback,
            sampling_enabled: config.sampling_enabled,
            sampling_threshold: config.sampling_threshold,
            sampling_percent: config.sampling_percent,
            concurrency: profile.concurrency,
            timeout: profile.timeout(),
        }
    }
}

/// Per-method send/receive counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodCounts {
    pub sent: u64,
    pub received: u64,
}

/// Aggregate probe counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryStats {
    pub sent: u64,
    pub received: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub by_method: HashMap<String, MethodCounts>,
}

/// Pipeline internals surfaced for analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedStats {
    pub prioritized: bool,
    pub sampling: SamplingReport,
    pub density_estimate: f64,
    pub original_methods: Vec<String>,
    pub actual_methods: Vec<String>,
    pub rate_adjustments: Vec<RateAdjustment>,
    pub window_stats: Vec<RateWindow>,
    pub priority_counts: HashMap<String, usize>,
}

/// The result of one discovery run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub run_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_s: f64,
    pub targets_input: usize,
    pub targets_resolved: usize,
    pub hosts_discovered: usize,
    pub success_rate: f64,
    pub methods_used: Vec<String>,
    pub interface_used: Option<String>,
    pub records: Vec<DiscoveryRecord>,
    pub stats: DiscoveryStats,
    pub privilege_mode: String,
    pub fallback_reasons: Vec<String>,
    pub enhanced: EnhancedStats,
}

impl DiscoverySummary {
    /// Addresses whose calibrated status is up
    pub fn live_hosts(&self) -> Vec<IpAddr> {
        self.records
            .iter()
            .filter(|r| r.status == HostState::Up)
            .map(|r| r.address)
            .collect()
    }
}

/// Discovery orchestrator
pub struct DiscoveryEngine {
    caps: Arc<Capabilities>,
    rate: Arc<RateController>,
    options: DiscoveryOptions,
    cancel: CancellationToken,
}

impl DiscoveryEngine {
    pub fn new(
        caps: Arc<Capabilities>,
        rate: Arc<RateController>,
        options: DiscoveryOptions,
        cancel: CancellationToken,
    ) -> Self {
        info!(
            "discovery engine: concurrency={}, timeout={}ms, fallback={}, sampling={}",
            options.concurrency,
            options.timeout.as_millis(),
            options.method_fallback,
            options.sampling_enabled
        );
        Self {
            caps,
            rate,
            options,
            cancel,
        }
    }

    /// Run the discovery pipeline over an expanded target list
    ///
    /// # Arguments
    /// * `targets` - Expanded addresses (already through the compliance gate)
    /// * `targets_input` - Number of textual inputs before expansion
    /// * `interface_used` - Interface name when `auto` was resolved
    pub async fn discover(
        &self,
        targets: &[IpAddr],
        targets_input: usize,
        interface_used: Option<String>,
    ) -> DiscoverySummary {
        let run_id = Uuid::new_v4().to_string();
        let start = Utc::now();
        info!(run_id = %run_id, targets = targets.len(), "discovery started");

        // (a) Prioritization from local network knowledge
        let context = LocalContext {
            arp_cache: read_arp_cache().await,
            gateway: default_gateway().await,
            local_networks: InterfaceEnumerator::new().local_networks(),
        };
        let prioritized = prioritize(targets, &context);
        let priority_counts = count_priorities(&prioritized);

        let prober = Arc::new(MethodProber::new(
            self.caps.clone(),
            self.options.timeout,
            context.arp_cache.clone(),
        ));

        // (b) Method selection, optionally validated against live targets
        let plan = recommend_discovery(&self.caps);
        let original_methods: Vec<String> = plan.methods.iter().map(|m| m.to_string()).collect();
        let mut fallback_reasons = self.caps.fallback_reasons.clone();
        fallback_reasons.extend(plan.reasons.clone());

        let mut records: Vec<DiscoveryRecord> = Vec::new();
        let methods = if self.options.method_fallback && plan.methods.len() > 1 {
            let (validated, reasons, validation_records) =
                self.validate_methods(&prober, &plan.methods, &prioritized).await;
            fallback_reasons.extend(reasons);
            records.extend(validation_records);
            validated
        } else {
            plan.methods.clone()
        };

        // (c) Sampling for large networks
        let mut sampling = SamplingReport::not_sampled();
        let mut remaining = prioritized;
        if self.options.sampling_enabled && remaining.len() >= self.options.sampling_threshold {
            let size = sample_size(remaining.len(), self.options.sampling_percent);
            let (sample, rest) = {
                let mut rng = rand::thread_rng();
                select_sample(remaining, size, &mut rng)
            };

            let sample_records = self
                .probe_targets(&prober, &methods, &sample, &context.arp_cache)
                .await;

            let merged_sample = merge_records(sample_records.clone());
            let alive = count_alive(&merged_sample);
            let responses = merged_sample
                .iter()
                .filter(|r| matches!(r.status, HostState::Up | HostState::Down))
                .count();
            sampling = evaluate(sample.len(), merged_sample.len(), alive, responses);
            records.extend(sample_records);

            remaining = match sampling.decision {
                SamplingDecision::TerminateEarly => {
                    info!("sampling: network nearly empty, terminating early");
                    Vec::new()
                }
                SamplingDecision::SparseScan => {
                    let mut rng = rand::thread_rng();
                    thin_for_sparse(rest, &mut rng)
                }
                _ => rest,
            };
        }

        // (d) Probe whatever remains
        let swept = self
            .probe_targets(&prober, &methods, &remaining, &context.arp_cache)
            .await;
        records.extend(swept);

        // (e) Deduplicate and calibrate
        let merged = merge_records(records);
        let hosts_discovered = count_alive(&merged);
        let success_rate = if merged.is_empty() {
            0.0
        } else {
            hosts_discovered as f64 / merged.len() as f64
        };

        self.rate.close_window();
        let rate_stats = self.rate.stats();

        let stats = build_stats(&merged, &rate_stats);
        let methods_used = distinct_methods(&merged);
        let density_estimate = if sampling.used {
            sampling.density
        } else {
            success_rate
        };

        let end = Utc::now();
        info!(
            run_id = %run_id,
            hosts = hosts_discovered,
            records = merged.len(),
            "discovery complete"
        );

        DiscoverySummary {
            run_id,
            start,
            end,
            duration_s: (end - start).num_milliseconds() as f64 / 1000.0,
            targets_input,
            targets_resolved: targets.len(),
            hosts_discovered,
            success_rate,
            methods_used,
            interface_used,
            records: merged,
            stats,
            privilege_mode: self.caps.level.to_string(),
            fallback_reasons,
            enhanced: EnhancedStats {
                prioritized: true,
                sampling,
                density_estimate,
                original_methods,
                actual_methods: methods.iter().map(|m| m.to_string()).collect(),
                rate_adjustments: rate_stats.adjustments,
                window_stats: rate_stats.windows,
                priority_counts,
            },
        }
    }

    /// Validate candidate methods against up to three High-priority targets
    ///
    /// A method survives if it produced any definite response or never hit a
    /// permission-class error. An empty survivor set forces tcp-connect.
    async fn validate_methods(
        &self,
        prober: &Arc<MethodProber>,
        candidates: &[DiscoveryMethod],
        prioritized: &[PrioritizedTarget],
    ) -> (Vec<DiscoveryMethod>, Vec<String>, Vec<DiscoveryRecord>) {
        let probe_targets: Vec<IpAddr> = prioritized
            .iter()
            .filter(|t| t.priority == Priority::High)
            .chain(prioritized.iter().filter(|t| t.priority != Priority::High))
            .take(VALIDATION_TARGETS)
            .map(target_address)
            .collect();

        if probe_targets.is_empty() {
            return (candidates.to_vec(), Vec::new(), Vec::new());
        }

        let mut retained = Vec::new();
        let mut reasons = Vec::new();
        let mut records = Vec::new();

        for &method in candidates {
            let mut responded = false;
            let mut permission_error = false;

            for &target in &probe_targets {
                if self.cancel.is_cancelled() {
                    break;
                }
                self.rate.acquire().await;
                match prober.probe(method, target).await {
                    Ok(obs) => {
                        self.rate.record_outcome(outcome_for(obs.status));
                        if matches!(obs.status, HostState::Up | HostState::Down) {
                            responded = true;
                        }
                        records.push(observation_record(target, method, obs));
                    }
                    Err(e) => {
                        self.rate.record_outcome(ProbeOutcome::Error);
                        if e.is_permission_class() {
                            permission_error = true;
                        }
                        records.push(
                            DiscoveryRecord::new(target, HostState::Error, method)
                                .with_detail("error", e.to_string()),
                        );
                    }
                }
            }

            if responded || !permission_error {
                retained.push(method);
            } else {
                warn!("method {} eliminated during validation", method);
                reasons.push(format!(
                    "{} eliminated: permission denied during validation probes",
                    method
                ));
            }
        }

        if retained.is_empty() {
            reasons.push("all methods eliminated, forcing tcp-connect".to_string());
            retained.push(DiscoveryMethod::Tcp);
        }

        (retained, reasons, records)
    }

    /// Probe a set of targets with the method chain, bounded by concurrency
    async fn probe_targets(
        &self,
        prober: &Arc<MethodProber>,
        methods: &[DiscoveryMethod],
        targets: &[PrioritizedTarget],
        arp_cache: &HashSet<IpAddr>,
    ) -> Vec<DiscoveryRecord> {
        if targets.is_empty() {
            return Vec::new();
        }

        debug!(
            "probing {} targets with chain [{}]",
            targets.len(),
            methods
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );

        let results = stream::iter(targets.iter().map(target_address))
            .map(|target| {
                let prober = prober.clone();
                let rate = self.rate.clone();
                let cancel = self.cancel.clone();
                // ARP-cached targets get a free first check before any packet
                let mut chain: Vec<DiscoveryMethod> = Vec::with_capacity(methods.len() + 1);
                if arp_cache.contains(&target) {
                    chain.push(DiscoveryMethod::Arp);
                }
                chain.extend_from_slice(methods);

                async move { probe_one(prober, rate, cancel, target, chain).await }
            })
            .buffer_unordered(self.options.concurrency)
            .collect::<Vec<_>>()
            .await;

        results.into_iter().flatten().collect()
    }
}

/// Sequential method chain for one target; stops at the first up
async fn probe_one(
    prober: Arc<MethodProber>,
    rate: Arc<RateController>,
    cancel: CancellationToken,
    target: IpAddr,
    chain: Vec<DiscoveryMethod>,
) -> Vec<DiscoveryRecord> {
    let mut records = Vec::new();

    for method in chain {
        if cancel.is_cancelled() {
            records.push(cancelled_record(target, method));
            break;
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                records.push(cancelled_record(target, method));
                break;
            }
            _ = rate.acquire() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                rate.record_outcome(ProbeOutcome::Error);
                records.push(cancelled_record(target, method));
                break;
            }
            result = prober.probe(method, target) => result,
        };

        match result {
            Ok(obs) => {
                rate.record_outcome(outcome_for(obs.status));
                crate::log_probe_event!(
                    tracing::Level::DEBUG,
                    target,
                    method,
                    obs.status,
                    "probe completed"
                );
                let is_up = obs.status == HostState::Up;
                records.push(observation_record(target, method, obs));
                if is_up {
                    break;
                }
            }
            Err(e) => {
                // Method-level failure: record it and fall through to the
                // next method rather than failing the target
                rate.record_outcome(ProbeOutcome::Error);
                records.push(
                    DiscoveryRecord::new(target, HostState::Error, method)
                        .with_detail("error", e.to_string()),
                );
            }
        }
    }

    records
}

fn outcome_for(status: HostState) -> ProbeOutcome {
    match status {
        HostState::Up | HostState::Down => ProbeOutcome::Received,
        HostState::Timeout => ProbeOutcome::Timeout,
        HostState::Error => ProbeOutcome::Error,
    }
}

fn observation_record(
    target: IpAddr,
    method: DiscoveryMethod,
    obs: crate::discovery::methods::Observation,
) -> DiscoveryRecord {
    let mut record = DiscoveryRecord::new(target, obs.status, method);
    record.rtt_ms = obs.rtt_ms;
    if let Some(detail) = obs.detail {
        record.details.insert("detail".to_string(), detail);
    }
    record
}

fn cancelled_record(target: IpAddr, method: DiscoveryMethod) -> DiscoveryRecord {
    DiscoveryRecord::new(target, HostState::Error, method).with_detail("reason", "cancelled")
}

fn target_address(t: &PrioritizedTarget) -> IpAddr {
    t.address
}

fn count_priorities(prioritized: &[PrioritizedTarget]) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for target in prioritized {
        *counts.entry(target.priority.to_string()).or_insert(0) += 1;
    }
    counts
}

fn distinct_methods(records: &[DiscoveryRecord]) -> Vec<String> {
    let mut methods = Vec::new();
    for record in records {
        for method in record.method_used.split(',') {
            let method = method.trim().to_string();
            if !method.is_empty() && !methods.contains(&method) {
                methods.push(method);
            }
        }
    }
    methods
}

fn build_stats(records: &[DiscoveryRecord], rate: &crate::rate::RateStats) -> DiscoveryStats {
    let mut by_method: HashMap<String, MethodCounts> = HashMap::new();
    for record in records {
        for method in record.method_used.split(',') {
            let counts = by_method.entry(method.trim().to_string()).or_default();
            counts.sent += 1;
            if matches!(record.status, HostState::Up | HostState::Down) {
                counts.received += 1;
            }
        }
    }

    DiscoveryStats {
        sent: rate.total_sent,
        received: rate.total_received,
        errors: rate.total_errors,
        timeouts: rate.total_timeouts,
        by_method,
    }
}
