//! Ring/tree collective channel search (component E): the per-attempt
//! Hamiltonian ring backtracker, the multi-channel driver, and the
//! two-phase relaxation cascade that picks a speed and a set of
//! path-type ceilings to search at.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{debug, info};

use crate::config::{CrossNic, Options};
use crate::decision_log::{DecisionLog, Phase as LogPhase};
use crate::topology::System;
use crate::types::{
    generation_bucket, speed_array, Channel, CpuArch, CpuVendor, LinkType, Pattern, PathType, TreeWiring,
    CHANNEL_DOUBLE_SPEED_THRESHOLD_GBS, CROSS_CPU_TLP_OVERHEAD, DEFAULT_ATTEMPT_BUDGET, GLOBAL_SEARCH_BUDGET,
    SAME_CHANNEL_ATTEMPT_BUDGET, TREE_ATTEMPT_BUDGET,
};

/// Mutable state threaded through one `run_phase_search` call: the
/// remaining-bandwidth map (keyed by directed GPU pair), discovered
/// channels, and the two iteration counters (spec §4.E.1).
pub struct SearchState {
    remaining: HashMap<(String, String), f64>,
    attempt_iterations: u64,
    global_iterations: u64,
    timed_out: bool,
}

impl SearchState {
    fn new(system: &System) -> Self {
        let mut remaining = HashMap::new();
        let gpus = system.gpu_ids();
        for a in &gpus {
            for b in &gpus {
                if a == b {
                    continue;
                }
                if let Some(p) = system.path(a, b) {
                    remaining.insert((a.clone(), b.clone()), p.bandwidth_gbs);
                }
            }
        }
        SearchState { remaining, attempt_iterations: 0, global_iterations: 0, timed_out: false }
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }
}

/// Applies the cross-CPU TLP overhead to `speed` when `path_type` is
/// worse than `PXB` (spec §4.E.1, "effectiveCost").
fn effective_cost(path_type: PathType, speed: f64) -> f64 {
    if path_type > PathType::Pxb {
        speed * CROSS_CPU_TLP_OVERHEAD
    } else {
        speed
    }
}

/// `[minIntra, maxIntra]` / `[minInter, maxInter]` path-type ranges (spec
/// §4.E.2), with the documented default cascade.
#[derive(Debug, Clone, Copy)]
pub struct PathTypeRanges {
    pub min_intra: PathType,
    pub max_intra: PathType,
    pub min_inter: PathType,
    pub max_inter: PathType,
}

pub fn compute_ranges(system: &System) -> PathTypeRanges {
    let gpus = system.gpu_ids();
    let mut intra_found = false;
    let mut min_intra = PathType::Dis;
    let mut max_intra = PathType::Loc;
    for a in &gpus {
        for b in &gpus {
            if a == b {
                continue;
            }
            if let Some(p) = system.path(a, b) {
                intra_found = true;
                min_intra = min_intra.min(p.path_type);
                max_intra = max_intra.max(p.path_type);
            }
        }
    }
    if !intra_found {
        min_intra = PathType::Pix;
        max_intra = PathType::Phb;
    }

    let mut inter_found = false;
    let mut min_inter = PathType::Dis;
    let mut max_inter = PathType::Loc;
    if system.inter_node {
        let nics = system.nic_ids();
        for g in &gpus {
            for n in &nics {
                if let Some(p) = system.path(g, n) {
                    inter_found = true;
                    min_inter = min_inter.min(p.path_type);
                    max_inter = max_inter.max(p.path_type);
                }
            }
        }
    }
    if !inter_found {
        min_inter = PathType::Sys;
        max_inter = PathType::Net;
    }

    if !intra_found && !inter_found {
        min_intra = PathType::Net;
        max_intra = PathType::Net;
        min_inter = PathType::Net;
        max_inter = PathType::Net;
    }

    PathTypeRanges { min_intra, max_intra, min_inter, max_inter }
}

/// A candidate's score tuple (spec §4.E.3). Field order matches the
/// spec's comparison order; `start_index` is the candidate GPU's
/// creation-order index, the final deterministic tiebreaker.
struct CandidateScore {
    inter_bandwidth: f64,
    inter_pci_bandwidth: f64,
    inter_hop_count: usize,
    intra_bandwidth: f64,
    intra_hop_count: usize,
    start_index: usize,
}

fn score_candidate(system: &System, current: &str, g: &str, intra_path_bandwidth: f64, intra_hop_count: usize, type_inter_ceiling: PathType, cross_nic_relaxed: bool) -> CandidateScore {
    let nics = system.nic_ids();
    let mut best: Option<(&crate::types::Path, f64)> = None;
    for nic in &nics {
        let Some(p) = system.path(g, nic) else { continue };
        if !cross_nic_relaxed && p.path_type > type_inter_ceiling {
            continue;
        }
        let better = match &best {
            None => true,
            Some((b, _)) => p.path_type < b.path_type || (p.path_type == b.path_type && p.bandwidth_gbs > b.bandwidth_gbs),
        };
        if better {
            best = Some((p, p.bandwidth_gbs));
        }
    }
    let (inter_bandwidth, inter_hop_count, inter_pci_bandwidth) = match best {
        None => (0.0, usize::MAX, 0.0),
        Some((p, bw)) => {
            let pci_bw = p.hops.iter().filter(|h| h.link_type == LinkType::Pci).map(|h| h.bandwidth_gbs).fold(0.0f64, f64::max);
            (bw, p.hop_count(), pci_bw)
        }
    };
    let start_index = system.node(g).map(|n| n.index).unwrap_or(usize::MAX);
    CandidateScore { inter_bandwidth, inter_pci_bandwidth, inter_hop_count, intra_bandwidth: intra_path_bandwidth, intra_hop_count, start_index }
}

fn cmp_candidates(a: &CandidateScore, b: &CandidateScore) -> Ordering {
    b.inter_bandwidth
        .partial_cmp(&a.inter_bandwidth)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.inter_pci_bandwidth.partial_cmp(&a.inter_pci_bandwidth).unwrap_or(Ordering::Equal))
        .then_with(|| a.inter_hop_count.cmp(&b.inter_hop_count))
        .then_with(|| b.intra_bandwidth.partial_cmp(&a.intra_bandwidth).unwrap_or(Ordering::Equal))
        .then_with(|| a.intra_hop_count.cmp(&b.intra_hop_count))
        .then_with(|| a.start_index.cmp(&b.start_index))
}

/// Attempt to build one Hamiltonian ring over `gpus` (spec §4.E.4).
fn build_ring(
    system: &System,
    gpus: &[String],
    speed: f64,
    type_intra_ceiling: PathType,
    type_inter_ceiling: PathType,
    cross_nic_relaxed: bool,
    attempt_budget: u64,
    state: &mut SearchState,
) -> Option<Vec<String>> {
    if gpus.len() == 1 {
        return Some(vec![gpus[0].clone()]);
    }
    state.attempt_iterations = 0;
    for start in gpus {
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(start.as_str());
        let mut order = vec![start.clone()];
        if backtrack(system, gpus, start, &mut order, &mut visited, speed, type_intra_ceiling, type_inter_ceiling, cross_nic_relaxed, attempt_budget, state) {
            return Some(order);
        }
        if state.timed_out {
            return None;
        }
    }
    None
}

#[allow(clippy::too_many_arguments)]
fn backtrack<'a>(
    system: &'a System,
    gpus: &'a [String],
    start: &str,
    order: &mut Vec<String>,
    visited: &mut HashSet<&'a str>,
    speed: f64,
    type_intra_ceiling: PathType,
    type_inter_ceiling: PathType,
    cross_nic_relaxed: bool,
    attempt_budget: u64,
    state: &mut SearchState,
) -> bool {
    state.attempt_iterations += 1;
    state.global_iterations += 1;
    if state.attempt_iterations > attempt_budget || state.global_iterations > GLOBAL_SEARCH_BUDGET {
        state.timed_out = true;
        return false;
    }

    if order.len() == gpus.len() {
        let last = order.last().expect("order is non-empty once recursion starts").clone();
        return closes_cycle(system, &last, start, speed, type_intra_ceiling, state);
    }

    let current = order.last().expect("order is non-empty once recursion starts").clone();
    let mut candidates: Vec<(CandidateScore, String, f64)> = Vec::new();
    for g in gpus {
        if visited.contains(g.as_str()) {
            continue;
        }
        let Some(path) = system.path(&current, g) else { continue };
        if path.path_type > type_intra_ceiling {
            continue;
        }
        let cost = effective_cost(path.path_type, speed);
        let avail = state.remaining.get(&(current.clone(), g.clone())).copied().unwrap_or(0.0);
        if avail < cost {
            continue;
        }
        let score = score_candidate(system, &current, g, path.bandwidth_gbs, path.hop_count(), type_inter_ceiling, cross_nic_relaxed);
        candidates.push((score, g.clone(), cost));
    }
    candidates.sort_by(|a, b| cmp_candidates(&a.0, &b.0));

    for (_, g, _cost) in candidates {
        let key = (current.clone(), g.clone());
        *state.remaining.entry(key.clone()).or_insert(0.0) -= speed;
        order.push(g.clone());
        let g_ref: &'a str = gpus
            .iter()
            .find(|x| **x == g)
            .map(|s| s.as_str())
            .expect("candidate g was drawn from gpus");
        visited.insert(g_ref);

        if backtrack(system, gpus, start, order, visited, speed, type_intra_ceiling, type_inter_ceiling, cross_nic_relaxed, attempt_budget, state) {
            return true;
        }
        if state.timed_out {
            return false;
        }
        order.pop();
        visited.remove(g_ref);
        *state.remaining.entry(key).or_insert(0.0) += speed;
    }
    false
}

fn closes_cycle(system: &System, last: &str, start: &str, speed: f64, ceiling: PathType, state: &SearchState) -> bool {
    let Some(path) = system.path(last, start) else { return false };
    if path.path_type > ceiling {
        return false;
    }
    let cost = effective_cost(path.path_type, speed);
    let avail = state.remaining.get(&(last.to_string(), start.to_string())).copied().unwrap_or(0.0);
    avail >= cost
}

/// Checks and, on success, consumes bandwidth for a reused ring ordering
/// under `same-channels = 1` (spec §4.E.5).
fn ring_fits(system: &System, order: &[String], speed: f64, ceiling: PathType, state: &mut SearchState) -> bool {
    let n = order.len();
    for i in 0..n {
        let a = &order[i];
        let b = &order[(i + 1) % n];
        let Some(p) = system.path(a, b) else { return false };
        if p.path_type > ceiling {
            return false;
        }
        let cost = effective_cost(p.path_type, speed);
        let avail = state.remaining.get(&(a.clone(), b.clone())).copied().unwrap_or(0.0);
        if avail < cost {
            return false;
        }
    }
    for i in 0..n {
        let a = order[i].clone();
        let b = order[(i + 1) % n].clone();
        *state.remaining.entry((a, b)).or_insert(0.0) -= speed;
    }
    true
}

pub(crate) fn build_ring_channel(index: usize, speed: f64, order: Vec<String>) -> Channel {
    let n = order.len();
    let mut ring_prev = BTreeMap::new();
    let mut ring_next = BTreeMap::new();
    for i in 0..n {
        let cur = &order[i];
        let prev = &order[(i + n - 1) % n];
        let next = &order[(i + 1) % n];
        ring_prev.insert(cur.clone(), prev.clone());
        ring_next.insert(cur.clone(), next.clone());
    }
    Channel { index, bandwidth_gbs: speed, ring_order: order, ring_prev, ring_next, tree: TreeWiring::default(), tree_up: BTreeMap::new(), tree_down: BTreeMap::new() }
}

/// Multi-channel search at a fixed speed (spec §4.E.5).
#[allow(clippy::too_many_arguments)]
fn search_for_channels(
    system: &System,
    gpus: &[String],
    speed: f64,
    max_channels: u32,
    same_channels: bool,
    type_intra_ceiling: PathType,
    type_inter_ceiling: PathType,
    cross_nic_relaxed: bool,
    attempt_budget: u64,
    state: &mut SearchState,
) -> Vec<Channel> {
    if gpus.len() <= 1 {
        let id = gpus.first().cloned().unwrap_or_default();
        return (0..max_channels).map(|i| Channel::trivial(i as usize, &id)).collect();
    }

    let mut channels = Vec::new();
    let mut first_order: Option<Vec<String>> = None;
    while (channels.len() as u32) < max_channels {
        if state.global_iterations > GLOBAL_SEARCH_BUDGET {
            state.timed_out = true;
            break;
        }
        let order = if let (true, Some(candidate)) = (same_channels, first_order.clone()) {
            if ring_fits(system, &candidate, speed, type_intra_ceiling, state) {
                Some(candidate)
            } else {
                None
            }
        } else {
            match build_ring(system, gpus, speed, type_intra_ceiling, type_inter_ceiling, cross_nic_relaxed, attempt_budget, state) {
                Some(order) => {
                    let last = order.last().expect("ring order is non-empty").clone();
                    let head = order[0].clone();
                    *state.remaining.entry((last, head)).or_insert(0.0) -= speed;
                    Some(order)
                }
                None => None,
            }
        };
        let Some(order) = order else { break };
        if first_order.is_none() {
            first_order = Some(order.clone());
        }
        channels.push(build_ring_channel(channels.len(), speed, order));
    }
    channels
}

fn attempt_budget_for(pattern: Pattern, same_channels: bool) -> u64 {
    match pattern {
        Pattern::BalancedTree => TREE_ATTEMPT_BUDGET,
        Pattern::Ring if same_channels => SAME_CHANNEL_ATTEMPT_BUDGET,
        Pattern::Ring => DEFAULT_ATTEMPT_BUDGET,
    }
}

fn min_gpu_generation(system: &System) -> u32 {
    system
        .nodes_of_kind(crate::types::NodeKind::Gpu)
        .filter_map(|n| match &n.attrs {
            crate::types::NodeAttrs::Gpu { generation_code, .. } => Some(*generation_code),
            _ => None,
        })
        .min()
        .unwrap_or(0)
}

fn cpu_arch_vendor(system: &System) -> Option<(CpuArch, CpuVendor)> {
    system.nodes_of_kind(crate::types::NodeKind::Cpu).find_map(|n| match &n.attrs {
        crate::types::NodeAttrs::Cpu { arch, vendor, .. } => Some((*arch, *vendor)),
        _ => None,
    })
}

/// The result of one two-phase search invocation (spec §4.E.6).
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub channels: Vec<Channel>,
    pub speed_gbs: f64,
    pub link_type: LinkType,
    pub timed_out: bool,
    pub pattern: Pattern,
}

/// Run the full two-phase relaxation cascade for `pattern` (spec §4.E.6).
/// Used both for the ring search proper and, with `pattern =
/// BalancedTree`, to harvest a candidate speed/link-type for the tree
/// graph (the tree's actual channels are derived from ring orderings,
/// spec §4.E.7).
pub fn run_phase_search(system: &System, options: &Options, min_channels: u32, max_channels: u32, mut pattern: Pattern, log: &mut DecisionLog) -> SearchOutcome {
    let gpus = system.gpu_ids();
    let n_gpus = gpus.len();
    let ranges = compute_ranges(system);
    let bucket = generation_bucket(min_gpu_generation(system));

    let speed_array = speed_array(bucket, !system.inter_node);

    let Some(mut speed_idx) = find_start_index(speed_array, system, pattern, n_gpus, min_channels) else {
        log.append(
            LogPhase::RingSearch,
            "no starting speed satisfies the bandwidth feasibility check",
            "every candidate speed exceeded system.maxBandwidth or failed the total-bandwidth check",
            vec!["relax minChannels".to_string()],
            "spec §4.E.6 step 2",
            None,
        );
        return SearchOutcome { channels: Vec::new(), speed_gbs: 0.0, link_type: LinkType::Net, timed_out: false, pattern };
    };

    let mut same_channels = true;
    let mut type_intra = ranges.min_intra;
    let mut type_inter = ranges.min_inter;
    let cross_nic_is_auto = matches!(options.cross_nic(), CrossNic::Auto);
    let mut cross_nic_relaxed = matches!(options.cross_nic(), CrossNic::On);

    let mut state = SearchState::new(system);
    let mut best: Option<(Vec<Channel>, f64)> = None;

    'speeds: while speed_idx < speed_array.len() {
        let speed = speed_array[speed_idx];
        loop {
            if state.global_iterations > GLOBAL_SEARCH_BUDGET {
                state.timed_out = true;
                break 'speeds;
            }
            let attempt_budget = attempt_budget_for(pattern, same_channels);
            let channels = search_for_channels(system, &gpus, speed, max_channels, same_channels, type_intra, type_inter, cross_nic_relaxed, attempt_budget, &mut state);

            if channels.len() as u32 >= min_channels {
                let aggregate = speed * channels.len() as f64;
                let is_better = best.as_ref().map(|(_, agg)| aggregate > *agg).unwrap_or(true);
                if is_better {
                    best = Some((channels.clone(), aggregate));
                }
                if !state.timed_out && speed * channels.len() as f64 >= system.total_bandwidth_gbs {
                    maybe_double(system, &gpus, speed, max_channels, type_intra, type_inter, cross_nic_relaxed, pattern, &mut state, &mut best);
                    break 'speeds;
                }
            }

            maybe_double(system, &gpus, speed, max_channels, type_intra, type_inter, cross_nic_relaxed, pattern, &mut state, &mut best);

            let amd_exception = cpu_arch_vendor(system) == Some((CpuArch::X86, CpuVendor::Amd)) && type_intra == PathType::Sys;
            if same_channels && !amd_exception {
                same_channels = false;
                continue;
            }
            if min_gpu_generation(system) >= 90 && pattern == Pattern::BalancedTree {
                pattern = Pattern::Ring;
                same_channels = true;
                continue;
            }
            if type_intra < ranges.max_intra {
                type_intra = next_path_type(type_intra);
                same_channels = true;
                continue;
            }
            if system.inter_node && type_inter < ranges.max_inter {
                type_inter = next_path_type(type_inter);
                same_channels = true;
                continue;
            }
            if system.inter_node && cross_nic_is_auto && !cross_nic_relaxed {
                cross_nic_relaxed = true;
                same_channels = true;
                continue;
            }
            break;
        }
        speed_idx += 1;
        same_channels = true;
        type_intra = ranges.min_intra;
        type_inter = ranges.min_inter;
    }

    // Phase 2: try higher speeds above the Phase-1 selection, holding
    // type_intra/type_inter/pattern fixed.
    if let Some((_, best_aggregate)) = &best {
        let mut best_aggregate = *best_aggregate;
        for idx in (0..speed_idx.min(speed_array.len())).rev() {
            if state.global_iterations > GLOBAL_SEARCH_BUDGET {
                state.timed_out = true;
                break;
            }
            let speed = speed_array[idx];
            let attempt_budget = attempt_budget_for(pattern, false);
            let channels = search_for_channels(system, &gpus, speed, max_channels, false, type_intra, type_inter, cross_nic_relaxed, attempt_budget, &mut state);
            let aggregate = speed * channels.len() as f64;
            if channels.len() as u32 >= min_channels && aggregate > best_aggregate {
                best_aggregate = aggregate;
                best = Some((channels, aggregate));
            }
        }
    }

    let (channels, speed_gbs) = match best {
        Some((channels, aggregate)) => {
            let speed = if channels.is_empty() { 0.0 } else { aggregate / channels.len() as f64 };
            (channels, speed)
        }
        None => {
            log.append(
                LogPhase::RingSearch,
                "search exhausted all speeds and relaxations with no feasible plan",
                "no attempt at any speed/relaxation tier yielded >= minChannels channels",
                vec!["lower minChannels".to_string()],
                "spec §7 (no-feasible-plan)",
                None,
            );
            (Vec::new(), 0.0)
        }
    };

    info!(pattern = ?pattern, channels = channels.len(), speed = speed_gbs, timed_out = state.timed_out, "search finished");
    SearchOutcome { channels, speed_gbs, link_type: if system.inter_node { LinkType::Net } else { LinkType::Nvl }, timed_out: state.timed_out(), pattern }
}

fn next_path_type(p: PathType) -> PathType {
    use PathType::*;
    match p {
        Loc => Nvl,
        Nvl => Nvb,
        Nvb => C2c,
        C2c => Pix,
        Pix => Pxb,
        Pxb => P2c,
        P2c => Pxn,
        Pxn => Phb,
        Phb => Sys,
        Sys => Net,
        Net => Dis,
        Dis => Dis,
    }
}

#[allow(clippy::too_many_arguments)]
fn maybe_double(
    system: &System,
    gpus: &[String],
    speed: f64,
    max_channels: u32,
    type_intra: PathType,
    type_inter: PathType,
    cross_nic_relaxed: bool,
    pattern: Pattern,
    state: &mut SearchState,
    best: &mut Option<(Vec<Channel>, f64)>,
) {
    let Some((current_channels, current_aggregate)) = best.as_ref() else { return };
    if speed < CHANNEL_DOUBLE_SPEED_THRESHOLD_GBS {
        return;
    }
    let doubled = (current_channels.len() as u32).saturating_mul(2).min(max_channels);
    if doubled <= current_channels.len() as u32 {
        return;
    }
    let attempt_budget = attempt_budget_for(pattern, false);
    let channels = search_for_channels(system, gpus, speed, doubled, false, type_intra, type_inter, cross_nic_relaxed, attempt_budget, state);
    let aggregate = speed * channels.len() as f64;
    if aggregate > *current_aggregate {
        *best = Some((channels, aggregate));
    }
}

fn find_start_index(speed_array: &[f64], system: &System, pattern: Pattern, n_gpus: usize, min_channels: u32) -> Option<usize> {
    for (i, &s) in speed_array.iter().enumerate() {
        if s > system.max_bandwidth_gbs {
            continue;
        }
        let total_check = if pattern == Pattern::BalancedTree && n_gpus > 1 {
            system.total_bandwidth_gbs * n_gpus as f64 / (n_gpus - 1) as f64
        } else {
            system.total_bandwidth_gbs
        };
        if s * min_channels as f64 <= total_check {
            return Some(i);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpuDesc, GpuDesc, HardwareDesc, NicDesc, NvSwitchDesc, Options as Opts, PcieDesc};
    use crate::decision_log::DecisionLog;
    use crate::paths::compute_all_pairs_best_paths;
    use crate::topology::build_system;
    use crate::types::{CpuArch as Arch, CpuVendor as Vendor, GpuVendor};

    fn dgx_like() -> HardwareDesc {
        HardwareDesc {
            name: "dgx-like".into(),
            gpu: GpuDesc { count: 8, vendor: GpuVendor::Nvidia, generation_code: 90, nvlinks_per_pair: 0, gdr_support: true },
            cpu: CpuDesc { count: 2, arch: Arch::X86, vendor: Vendor::Intel, model: crate::types::IntelModel::Srp as i32 },
            nic: NicDesc { count: 8, speed_gbs: 50.0, gdr_support: true, coll_support: true, max_channels: 0 },
            pcie: PcieDesc { gen: 5, width: 16, switches_per_cpu: 2 },
            nvswitch: NvSwitchDesc { count: 4 },
            numa_mapping: vec![0, 0, 0, 0, 1, 1, 1, 1],
        }
    }

    fn dgx_system() -> System {
        let mut log = DecisionLog::new();
        let mut sys = build_system(&dgx_like(), None, &mut log).unwrap();
        let options = Opts::default();
        compute_all_pairs_best_paths(&mut sys, &options, &mut log);
        sys
    }

    #[test]
    fn ring_search_finds_hamiltonian_cycle_at_nvlink_speed() {
        let sys = dgx_system();
        let mut log = DecisionLog::new();
        let outcome = run_phase_search(&sys, &Opts::default(), 1, 64, Pattern::Ring, &mut log);
        assert!(!outcome.channels.is_empty());
        for channel in &outcome.channels {
            let gpu_set: HashSet<&String> = channel.ring_order.iter().collect();
            assert_eq!(gpu_set.len(), sys.gpu_ids().len());
            assert_eq!(channel.ring_order.len(), sys.gpu_ids().len());
        }
    }

    #[test]
    fn single_gpu_system_yields_trivial_channels() {
        let mut hw = dgx_like();
        hw.gpu.count = 1;
        hw.numa_mapping = vec![0];
        let mut log = DecisionLog::new();
        let mut sys = build_system(&hw, None, &mut log).unwrap();
        let options = Opts::default();
        compute_all_pairs_best_paths(&mut sys, &options, &mut log);
        let outcome = run_phase_search(&sys, &options, 1, 4, Pattern::Ring, &mut log);
        assert_eq!(outcome.channels.len(), 4);
        assert!(outcome.channels.iter().all(|c| c.ring_order.len() == 1));
    }

    #[test]
    fn min_channels_equal_max_channels_one_yields_single_channel() {
        let sys = dgx_system();
        let mut log = DecisionLog::new();
        let outcome = run_phase_search(&sys, &Opts::default(), 1, 1, Pattern::Ring, &mut log);
        assert_eq!(outcome.channels.len(), 1);
    }

    /// Boundary (spec §8): two GPUs with no path between them at all can
    /// never close a Hamiltonian cycle, so the search yields zero channels.
    #[test]
    fn mutually_unreachable_gpus_yield_no_feasible_plan() {
        use crate::types::{Node, NodeAttrs};
        let nodes = vec![
            Node { id: "gpu-0".into(), index: 0, label: None, attrs: NodeAttrs::Gpu { device_index: 0, rank: 0, generation_code: 90, gdr: true } },
            Node { id: "gpu-1".into(), index: 1, label: None, attrs: NodeAttrs::Gpu { device_index: 1, rank: 1, generation_code: 90, gdr: true } },
        ];
        let sys = System::test_from_nodes_and_links(nodes, Vec::new(), false);
        let mut log = DecisionLog::new();
        let outcome = run_phase_search(&sys, &Opts::default(), 1, 64, Pattern::Ring, &mut log);
        assert_eq!(outcome.channels.len(), 0);
    }
}
