//! Pre-computed hardware-pattern registry and matcher (component F).
//!
//! A bounded-budget shortcut that recognizes a handful of known hardware
//! shapes by structural signature and returns their pre-computed ring
//! orderings, bypassing the ring search entirely (spec §4.F). Invoked
//! only from the AMD branch of the init driver (spec §4.G step 6).

use std::collections::HashSet;

use crate::config::{option_names, Options};
use crate::decision_log::{DecisionLog, Phase};
use crate::search::build_ring_channel;
use crate::topology::System;
use crate::types::{Channel, LinkType, NodeKind, Pattern, TopoGraph, PATTERN_MATCH_BUDGET};

/// One literal registry record (spec §4.F). The registry is a
/// build-time constant; matching never performs I/O.
struct PatternRecord {
    id: &'static str,
    n_gpus: usize,
    n_cpus: usize,
    n_nics: usize,
    /// GPU model index → NUMA/CPU index.
    gpu_numa: &'static [u32],
    /// NIC model index → NUMA/CPU index.
    nic_numa: &'static [u32],
    /// `n_gpus x n_gpus` row-major connectivity matrix (1 where a direct
    /// GPU-GPU link exists).
    connectivity: &'static [u8],
    /// Optional GPU×NIC GDR-capability matrix. Carried on the record per
    /// spec §4.F but not consulted by the matching algorithm itself.
    #[allow(dead_code)]
    gdr_matrix: Option<&'static [u8]>,
    /// Concatenation, per CPU, of `"<gpuCount><nicCount>"`.
    numa_signature: &'static str,
    /// Pipe-separated pre-computed ring orderings over model GPU
    /// indices; NIC tokens are prefixed `N` and skipped during parsing.
    rings: &'static str,
}

/// One DGX/MI300X-class 8-GPU, 2-CPU, 8-NIC xGMI full-mesh shape: four
/// GPUs and four NICs on each of two NUMA domains.
const MI300X_8GPU: PatternRecord = PatternRecord {
    id: "mi300x-8gpu-fullmesh",
    n_gpus: 8,
    n_cpus: 2,
    n_nics: 8,
    gpu_numa: &[0, 0, 0, 0, 1, 1, 1, 1],
    nic_numa: &[0, 0, 0, 0, 1, 1, 1, 1],
    connectivity: &[
        0, 1, 1, 1, 1, 1, 1, 1,
        1, 0, 1, 1, 1, 1, 1, 1,
        1, 1, 0, 1, 1, 1, 1, 1,
        1, 1, 1, 0, 1, 1, 1, 1,
        1, 1, 1, 1, 0, 1, 1, 1,
        1, 1, 1, 1, 1, 0, 1, 1,
        1, 1, 1, 1, 1, 1, 0, 1,
        1, 1, 1, 1, 1, 1, 1, 0,
    ],
    gdr_matrix: None,
    numa_signature: "4444",
    rings: "0,1,2,3,4,5,6,7|0,2,4,6,1,3,5,7|0,3,6,2,5,1,4,7|0,4,1,5,2,6,3,7|0,5,3,1,6,4,2,7|0,6,5,4,3,2,1,7",
};

/// Build-time registry, iterated in order (spec §4.F, "order of
/// iteration is registry order").
const REGISTRY: &[PatternRecord] = &[MI300X_8GPU];

/// The current topology's structural signature, reconstructed the same
/// way a registry record is described (spec §4.F, "extract the current
/// topology's signature identically").
struct Signature {
    gpu_ids: Vec<String>,
    nic_ids: Vec<String>,
    n_cpus: usize,
    gpu_numa: Vec<usize>,
    nic_numa: Vec<usize>,
    connectivity: Vec<Vec<u8>>,
    xgmi_links_per_gpu: Vec<usize>,
    numa_signature: String,
}

/// Walk outward over `Pci`-typed links (GPU/NIC → switch → CPU, or
/// direct) until a CPU node is reached, mirroring the host-hierarchy
/// wiring `topology::build_single_server` performs (spec §4.C step 2/3).
fn find_owning_cpu(system: &System, start: &str) -> Option<usize> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(start.to_string());
    let mut frontier = vec![start.to_string()];
    for _ in 0..4 {
        let mut next = Vec::new();
        for id in &frontier {
            for link in system.links_from(id) {
                if link.link_type != LinkType::Pci {
                    continue;
                }
                let Some(node) = system.node(&link.destination) else { continue };
                if node.kind() == NodeKind::Cpu {
                    return Some(node.index);
                }
                if visited.insert(link.destination.clone()) {
                    next.push(link.destination.clone());
                }
            }
        }
        frontier = next;
    }
    None
}

fn extract_signature(system: &System) -> Signature {
    let gpu_ids = system.gpu_ids();
    let nic_ids = system.nic_ids();
    let n_cpus = system.nodes_of_kind(NodeKind::Cpu).count();

    let gpu_numa: Vec<usize> = gpu_ids.iter().map(|id| find_owning_cpu(system, id).unwrap_or(0)).collect();
    let nic_numa: Vec<usize> = nic_ids.iter().map(|id| find_owning_cpu(system, id).unwrap_or(0)).collect();

    let n = gpu_ids.len();
    let mut connectivity = vec![vec![0u8; n]; n];
    let mut xgmi_links_per_gpu = vec![0usize; n];
    for (i, gi) in gpu_ids.iter().enumerate() {
        for link in system.links_from(gi) {
            if link.link_type != LinkType::Nvl {
                continue;
            }
            let Some(node) = system.node(&link.destination) else { continue };
            if node.kind() != NodeKind::Gpu {
                continue;
            }
            let Some(j) = gpu_ids.iter().position(|x| x == &link.destination) else { continue };
            connectivity[i][j] = 1;
            xgmi_links_per_gpu[i] += 1;
        }
    }

    let mut gpu_count_by_cpu = vec![0usize; n_cpus];
    let mut nic_count_by_cpu = vec![0usize; n_cpus];
    for &c in &gpu_numa {
        if c < n_cpus {
            gpu_count_by_cpu[c] += 1;
        }
    }
    for &c in &nic_numa {
        if c < n_cpus {
            nic_count_by_cpu[c] += 1;
        }
    }
    let numa_signature: String = (0..n_cpus).map(|i| format!("{}{}", gpu_count_by_cpu[i], nic_count_by_cpu[i])).collect();

    Signature { gpu_ids, nic_ids, n_cpus, gpu_numa, nic_numa, connectivity, xgmi_links_per_gpu, numa_signature }
}

/// Exhaustive backtracking search for a GPU permutation satisfying
/// NUMA-equality and connectivity-matrix equality, bounded by
/// `PATTERN_MATCH_BUDGET` recursive steps (spec §4.F).
fn find_gpu_permutation(pattern: &PatternRecord, sig: &Signature) -> Option<Vec<usize>> {
    let n = pattern.n_gpus;
    let mut perm = vec![usize::MAX; n];
    let mut used = vec![false; n];
    let mut steps = 0u64;

    fn backtrack(sys_i: usize, n: usize, perm: &mut [usize], used: &mut [bool], pattern: &PatternRecord, sig: &Signature, steps: &mut u64) -> bool {
        *steps += 1;
        if *steps > PATTERN_MATCH_BUDGET {
            return false;
        }
        if sys_i == n {
            return true;
        }
        for cand in 0..n {
            if used[cand] || sig.gpu_numa[sys_i] != pattern.gpu_numa[cand] as usize {
                continue;
            }
            let consistent = (0..sys_i).all(|prior| {
                let p = perm[prior];
                sig.connectivity[sys_i][prior] == pattern.connectivity[cand * n + p]
                    && sig.connectivity[prior][sys_i] == pattern.connectivity[p * n + cand]
            });
            if !consistent {
                continue;
            }
            used[cand] = true;
            perm[sys_i] = cand;
            if backtrack(sys_i + 1, n, perm, used, pattern, sig, steps) {
                return true;
            }
            used[cand] = false;
            perm[sys_i] = usize::MAX;
            if *steps > PATTERN_MATCH_BUDGET {
                return false;
            }
        }
        false
    }

    if backtrack(0, n, &mut perm, &mut used, pattern, sig, &mut steps) {
        Some(perm)
    } else {
        None
    }
}

/// Exhaustive backtracking search for a NIC permutation satisfying
/// NUMA-equality only (spec §4.F, "attempt a NIC permutation ... checking
/// NUMA-equality only").
fn find_nic_permutation(pattern: &PatternRecord, sig: &Signature) -> Option<Vec<usize>> {
    let n = pattern.n_nics;
    let mut perm = vec![usize::MAX; n];
    let mut used = vec![false; n];
    let mut steps = 0u64;

    fn backtrack(sys_i: usize, n: usize, perm: &mut [usize], used: &mut [bool], pattern: &PatternRecord, sig: &Signature, steps: &mut u64) -> bool {
        *steps += 1;
        if *steps > PATTERN_MATCH_BUDGET {
            return false;
        }
        if sys_i == n {
            return true;
        }
        for cand in 0..n {
            if used[cand] || sig.nic_numa[sys_i] != pattern.nic_numa[cand] as usize {
                continue;
            }
            used[cand] = true;
            perm[sys_i] = cand;
            if backtrack(sys_i + 1, n, perm, used, pattern, sig, steps) {
                return true;
            }
            used[cand] = false;
            perm[sys_i] = usize::MAX;
            if *steps > PATTERN_MATCH_BUDGET {
                return false;
            }
        }
        false
    }

    if backtrack(0, n, &mut perm, &mut used, pattern, sig, &mut steps) {
        Some(perm)
    } else {
        None
    }
}

/// Parse a pipe-separated ring string into sequences of system GPU
/// identities, translating model indices through `gpu_perm_inverse`
/// (model index → system identity) and skipping any `N`-prefixed NIC
/// token (spec §4.F).
fn parse_ring_string(rings: &str, gpu_perm_inverse: &[String]) -> Vec<Vec<String>> {
    rings
        .split('|')
        .map(|segment| {
            segment
                .split(',')
                .filter_map(|token| {
                    let token = token.trim();
                    if token.is_empty() || token.starts_with('N') {
                        return None;
                    }
                    token.parse::<usize>().ok().and_then(|idx| gpu_perm_inverse.get(idx)).cloned()
                })
                .collect()
        })
        .collect()
}

fn ring_bandwidth(system: &System, first_ring: &[String]) -> f64 {
    if first_ring.len() >= 2 {
        if let Some(p) = system.path(&first_ring[0], &first_ring[1]) {
            return p.bandwidth_gbs;
        }
    }
    system.max_bandwidth_gbs
}

fn channels_from_rings(rings: Vec<Vec<String>>, bandwidth: f64) -> Vec<Channel> {
    rings.into_iter().enumerate().map(|(i, order)| build_ring_channel(i, bandwidth, order)).collect()
}

fn topograph_from_channels(channels: Vec<Channel>, bandwidth: f64) -> TopoGraph {
    TopoGraph { pattern: Pattern::Ring, channels, intra_link_type: LinkType::Nvl, inter_link_type: LinkType::Net, intra_speed_gbs: bandwidth, inter_speed_gbs: bandwidth }
}

fn try_match_record(pattern: &PatternRecord, system: &System, sig: &Signature) -> Option<TopoGraph> {
    if sig.gpu_ids.len() != pattern.n_gpus || sig.n_cpus != pattern.n_cpus || sig.nic_ids.len() != pattern.n_nics {
        return None;
    }
    if sig.numa_signature != pattern.numa_signature {
        return None;
    }

    let gpu_perm = find_gpu_permutation(pattern, sig)?;
    let _nic_perm = find_nic_permutation(pattern, sig)?;

    let mut inverse = vec![String::new(); pattern.n_gpus];
    for (sys_idx, &model_idx) in gpu_perm.iter().enumerate() {
        inverse[model_idx] = sig.gpu_ids[sys_idx].clone();
    }

    let rings = parse_ring_string(pattern.rings, &inverse);
    let bandwidth = rings.first().map(|r| ring_bandwidth(system, r)).unwrap_or(system.max_bandwidth_gbs);
    Some(topograph_from_channels(channels_from_rings(rings, bandwidth), bandwidth))
}

/// Hardcoded 6-link chordal-ring detector: 8 GPUs each with exactly 6
/// NVLink-typed outgoing edges (spec §4.F).
fn chordal_ring_detector(system: &System, sig: &Signature) -> Option<TopoGraph> {
    let n = sig.gpu_ids.len();
    if n != 8 || sig.xgmi_links_per_gpu.iter().any(|&c| c != 6) {
        return None;
    }
    let order: Vec<String> = [0, 2, 4, 6, 1, 3, 5, 7].iter().map(|&i| sig.gpu_ids[i].clone()).collect();
    let bandwidth = ring_bandwidth(system, &order);
    Some(topograph_from_channels(vec![build_ring_channel(0, bandwidth, order)], bandwidth))
}

/// Full-mesh (all-to-all) detector: every GPU connects directly to
/// every other GPU. Emits a predefined 6-ring set for 8 GPUs, else a
/// forward/reverse pair (spec §4.F).
fn all_to_all_detector(system: &System, sig: &Signature) -> Option<TopoGraph> {
    let n = sig.gpu_ids.len();
    if n == 0 || sig.xgmi_links_per_gpu.iter().any(|&c| c != n - 1) {
        return None;
    }

    let orders: Vec<Vec<usize>> = if n == 8 {
        vec![
            vec![0, 1, 2, 3, 4, 5, 6, 7],
            vec![0, 2, 4, 6, 1, 3, 5, 7],
            vec![0, 3, 6, 2, 5, 1, 4, 7],
            vec![0, 4, 1, 5, 2, 6, 3, 7],
            vec![0, 5, 3, 1, 6, 4, 2, 7],
            vec![0, 6, 5, 4, 3, 2, 1, 7],
        ]
    } else {
        let forward: Vec<usize> = (0..n).collect();
        let reverse: Vec<usize> = (0..n).rev().collect();
        vec![forward, reverse]
    };

    let rings: Vec<Vec<String>> = orders.into_iter().map(|order| order.into_iter().map(|i| sig.gpu_ids[i].clone()).collect()).collect();
    let bandwidth = rings.first().map(|r| ring_bandwidth(system, r)).unwrap_or(system.max_bandwidth_gbs);
    Some(topograph_from_channels(channels_from_rings(rings, bandwidth), bandwidth))
}

/// Run the pattern matcher (spec §4.F). Returns `None` (and logs why)
/// when `model-match-disable` is set, when no registry entry matches,
/// and when neither specialized detector fires — the caller then falls
/// through to the ring search.
pub fn match_topology(system: &System, options: &Options, log: &mut DecisionLog) -> Option<(TopoGraph, String)> {
    if options.bool_flag(option_names::MODEL_MATCH_DISABLE) {
        log.append(
            Phase::PatternMatch,
            "skipped pattern matching",
            "model-match-disable is set",
            vec!["attempt pattern matching anyway".to_string()],
            "spec §4.A (model-match-disable), §4.F",
            None,
        );
        return None;
    }

    let sig = extract_signature(system);

    for pattern in REGISTRY {
        if let Some(graph) = try_match_record(pattern, system, &sig) {
            log.append(
                Phase::PatternMatch,
                format!("matched registry pattern '{}' ({} channel(s))", pattern.id, graph.channel_count()),
                "topology signature, NUMA layout and GPU connectivity matched a known hardware shape",
                vec!["fall through to ring/tree search".to_string()],
                "spec §4.F",
                Some(serde_json::json!({ "pattern": pattern.id, "channels": graph.channel_count() })),
            );
            return Some((graph, pattern.id.to_string()));
        }
    }

    if let Some(graph) = chordal_ring_detector(system, &sig) {
        log.append(
            Phase::PatternMatch,
            "matched the 6-link chordal-ring shape",
            "8 GPUs each carry exactly 6 NVLink-typed outgoing edges",
            vec!["fall through to ring/tree search".to_string()],
            "spec §4.F (chordal-ring detector)",
            None,
        );
        return Some((graph, "chordal-ring-8gpu".to_string()));
    }

    if let Some(graph) = all_to_all_detector(system, &sig) {
        log.append(
            Phase::PatternMatch,
            format!("matched the all-to-all shape ({} channel(s))", graph.channel_count()),
            "every GPU carries a direct NVLink-typed edge to every other GPU",
            vec!["fall through to ring/tree search".to_string()],
            "spec §4.F (all-to-all detector)",
            None,
        );
        return Some((graph, "all-to-all".to_string()));
    }

    log.append(
        Phase::PatternMatch,
        "no registry pattern or specialized detector matched",
        "topology signature did not correspond to any known hardware shape",
        vec!["continue to the ring/tree search".to_string()],
        "spec §4.F",
        None,
    );
    None
}
