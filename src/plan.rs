//! Init driver (component G): orchestrates the full pipeline
//! `build → paths → trim → paths → {pattern-match or search} → tree →
//! channel setup → Plan` (spec §4.G).

use tracing::info;

use crate::config::{option_names, HardwareDesc, Options, ScaleUnit};
use crate::decision_log::{DecisionLog, Phase};
use crate::error::Result;
use crate::patterns::match_topology;
use crate::paths::compute_all_pairs_best_paths;
use crate::search::run_phase_search;
use crate::topology::{build_system, System};
use crate::types::{Channel, GpuVendor, Pattern, TopoGraph, TreeWiring};

/// The immutable result of one `init` invocation (spec §6, "Output:
/// Plan").
#[derive(Debug, Clone)]
pub struct Plan {
    pub system: System,
    pub ring_graph: TopoGraph,
    pub tree_graph: TopoGraph,
    pub log: DecisionLog,
    pub matched_pattern_id: Option<String>,
}

/// Derive one tree channel per ring channel: a linear chain following
/// the ring order, root = first GPU, tail = last GPU (spec §4.E.7).
fn tree_channel_from_ring(index: usize, ring: &Channel) -> Channel {
    let order = &ring.ring_order;
    let mut tree_up = std::collections::BTreeMap::new();
    let mut tree_down: std::collections::BTreeMap<String, Vec<String>> = std::collections::BTreeMap::new();
    let mut edges = Vec::new();
    for w in order.windows(2) {
        let (parent, child) = (&w[0], &w[1]);
        edges.push((parent.clone(), child.clone()));
        tree_up.insert(child.clone(), parent.clone());
        tree_down.entry(parent.clone()).or_default().push(child.clone());
    }
    Channel {
        index,
        bandwidth_gbs: ring.bandwidth_gbs,
        ring_order: order.clone(),
        ring_prev: ring.ring_prev.clone(),
        ring_next: ring.ring_next.clone(),
        tree: TreeWiring { edges },
        tree_up,
        tree_down,
    }
}

/// Reverse of [`tree_channel_from_ring`]: same ring order, chain built
/// over the reversed sequence (spec §4.E.7, "channel setup").
fn reverse_tree_channel(index: usize, ring: &Channel) -> Channel {
    let mut reversed = ring.clone();
    reversed.ring_order.reverse();
    tree_channel_from_ring(index, &reversed)
}

/// Channel setup (spec §4.E.7): emit twice as many tree channels as
/// ring channels, forward chain at `2i`, reverse chain at `2i+1`.
fn double_tree_channels(ring_channels: &[Channel]) -> Vec<Channel> {
    let mut out = Vec::with_capacity(ring_channels.len() * 2);
    for ring in ring_channels {
        out.push(tree_channel_from_ring(out.len(), ring));
        out.push(reverse_tree_channel(out.len(), ring));
    }
    out
}

/// Run the full init pipeline (spec §4.G).
pub fn init(
    hw: &HardwareDesc,
    scale: Option<&ScaleUnit>,
    options: &Options,
) -> Result<Plan> {
    let mut log = DecisionLog::new();
    log.append(
        Phase::SearchInit,
        format!("starting init for hardware description '{}'", hw.name),
        "the init driver orchestrates build, path computation, trim, and search in strict sequence",
        vec![],
        "spec §4.G",
        Some(serde_json::json!({
            "gpus": hw.gpu.count,
            "cpus": hw.cpu.count,
            "nics": hw.nic.count,
        })),
    );

    let mut system = build_system(hw, scale, &mut log)?;

    if scale.is_some() {
        log.append(
            Phase::SearchInit,
            "multi-node fast-path deferred",
            "per-server topology analysis is intended to run on a filtered single-server view; computing inter-node paths and search here would be wasted work",
            vec!["compute inter-node paths and search eagerly".to_string()],
            "spec §4.C, §4.G step 3, §9 (deliberate scope boundary)",
            Some(serde_json::json!({ "multi-node-fast-path": true })),
        );
        return Ok(Plan {
            system,
            ring_graph: TopoGraph::empty(Pattern::Ring),
            tree_graph: TopoGraph::empty(Pattern::BalancedTree),
            log,
            matched_pattern_id: None,
        });
    }

    compute_all_pairs_best_paths(&mut system, options, &mut log);
    system = system.trim(&mut log);
    compute_all_pairs_best_paths(&mut system, options, &mut log);

    let (min_channels, max_channels) = options.channel_bounds();

    let is_amd = hw.gpu.vendor == GpuVendor::Amd;
    let model_match_disabled = options.bool_flag(option_names::MODEL_MATCH_DISABLE);

    let mut matched_pattern_id = None;
    let mut ring_graph: Option<TopoGraph> = None;

    if is_amd && !model_match_disabled {
        if let Some((graph, id)) = match_topology(&system, options, &mut log) {
            matched_pattern_id = Some(id);
            ring_graph = Some(graph);
        }
    }

    let ring_graph = match ring_graph {
        Some(g) => g,
        None => {
            let ring_max_channels = (max_channels / 2).max(1);
            let outcome = run_phase_search(&system, options, min_channels, ring_max_channels, Pattern::Ring, &mut log);
            if outcome.channels.is_empty() {
                log.append(
                    Phase::RingSearch,
                    "ring search produced zero channels",
                    "every GPU is disconnected from every other GPU, or all speeds/relaxations were exhausted",
                    vec![],
                    "spec §7 (no-feasible-plan), §8 (disconnected GPU boundary)",
                    None,
                );
            }
            TopoGraph {
                pattern: Pattern::Ring,
                channels: outcome.channels,
                intra_link_type: outcome.link_type,
                inter_link_type: outcome.link_type,
                intra_speed_gbs: outcome.speed_gbs,
                inter_speed_gbs: outcome.speed_gbs,
            }
        }
    };

    let tree_seed_max = ring_graph.channel_count().max(1);
    let tree_outcome = run_phase_search(&system, options, 1, tree_seed_max as u32, Pattern::BalancedTree, &mut log);

    let mut tree_channels = double_tree_channels(&ring_graph.channels);
    let (tree_intra_speed, tree_inter_speed, tree_intra_link, tree_inter_link) =
        if tree_outcome.speed_gbs > 0.0 && !tree_outcome.channels.is_empty() {
            (tree_outcome.speed_gbs, tree_outcome.speed_gbs, tree_outcome.link_type, tree_outcome.link_type)
        } else {
            (ring_graph.intra_speed_gbs, ring_graph.inter_speed_gbs, ring_graph.intra_link_type, ring_graph.inter_link_type)
        };
    for c in &mut tree_channels {
        c.bandwidth_gbs = tree_intra_speed;
    }

    log.append(
        Phase::ChannelSetup,
        format!("doubled {} ring channel(s) into {} tree channel(s)", ring_graph.channel_count(), tree_channels.len()),
        "each ring channel yields a forward and reverse tree chain",
        vec!["emit only the forward chain".to_string()],
        "spec §4.E.7",
        Some(serde_json::json!({
            "ring_channels": ring_graph.channel_count(),
            "tree_channels": tree_channels.len(),
        })),
    );

    let tree_graph = TopoGraph {
        pattern: Pattern::BalancedTree,
        channels: tree_channels,
        intra_link_type: tree_intra_link,
        inter_link_type: tree_inter_link,
        intra_speed_gbs: tree_intra_speed,
        inter_speed_gbs: tree_inter_speed,
    };

    info!(
        ring_channels = ring_graph.channel_count(),
        tree_channels = tree_graph.channel_count(),
        matched = matched_pattern_id.is_some(),
        "init complete"
    );

    Ok(Plan { system, ring_graph, tree_graph, log, matched_pattern_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpuDesc, GpuDesc, NetworkType, NicDesc, NvSwitchDesc, PcieDesc};
    use crate::types::{CpuArch, CpuVendor, IntelModel};

    fn dgx_like() -> HardwareDesc {
        HardwareDesc {
            name: "dgx-like".into(),
            gpu: GpuDesc { count: 8, vendor: GpuVendor::Nvidia, generation_code: 90, nvlinks_per_pair: 0, gdr_support: true },
            cpu: CpuDesc { count: 2, arch: CpuArch::X86, vendor: CpuVendor::Intel, model: IntelModel::Srp as i32 },
            nic: NicDesc { count: 8, speed_gbs: 50.0, gdr_support: true, coll_support: true, max_channels: 0 },
            pcie: PcieDesc { gen: 5, width: 16, switches_per_cpu: 2 },
            nvswitch: NvSwitchDesc { count: 4 },
            numa_mapping: vec![0, 0, 0, 0, 1, 1, 1, 1],
        }
    }

    #[test]
    fn full_pipeline_produces_doubled_tree_channels() {
        let plan = init(&dgx_like(), None, &Options::default()).unwrap();
        assert!(!plan.ring_graph.channels.is_empty());
        assert_eq!(plan.tree_graph.channel_count(), 2 * plan.ring_graph.channel_count());
        for ring in &plan.ring_graph.channels {
            let gpu_set: std::collections::HashSet<&String> = ring.ring_order.iter().collect();
            assert_eq!(gpu_set.len(), plan.system.gpu_ids().len());
        }
    }

    #[test]
    fn multi_server_defers_to_empty_graphs() {
        let su = ScaleUnit { server_count: 4, rail_count: 8, network_type: NetworkType::RailOptimized };
        let plan = init(&dgx_like(), Some(&su), &Options::default()).unwrap();
        assert!(plan.system.inter_node);
        assert_eq!(plan.ring_graph.channel_count(), 0);
        assert_eq!(plan.tree_graph.channel_count(), 0);
    }

    #[test]
    fn forced_single_channel_doubles_to_two_tree_channels() {
        let mut options = Options::default();
        options.set_override(crate::config::option_names::MIN_CHANNELS, crate::config::OptionValue::Int(1));
        options.set_override(crate::config::option_names::MAX_CHANNELS, crate::config::OptionValue::Int(1));
        let plan = init(&dgx_like(), None, &options).unwrap();
        assert_eq!(plan.ring_graph.channel_count(), 1);
        assert_eq!(plan.tree_graph.channel_count(), 2);
    }

    #[test]
    fn amd_fabric_uses_pattern_match_before_search() {
        let hw = HardwareDesc {
            name: "mi300x-like".into(),
            gpu: GpuDesc { count: 8, vendor: GpuVendor::Amd, generation_code: 300, nvlinks_per_pair: 0, gdr_support: true },
            cpu: CpuDesc { count: 2, arch: CpuArch::X86, vendor: CpuVendor::Amd, model: 0 },
            nic: NicDesc { count: 8, speed_gbs: 50.0, gdr_support: true, coll_support: true, max_channels: 0 },
            pcie: PcieDesc { gen: 5, width: 16, switches_per_cpu: 2 },
            nvswitch: NvSwitchDesc { count: 0 },
            numa_mapping: vec![0, 0, 0, 0, 1, 1, 1, 1],
        };
        let plan = init(&hw, None, &Options::default()).unwrap();
        assert_eq!(plan.matched_pattern_id.as_deref(), Some("mi300x-8gpu-fullmesh"));
        assert_eq!(plan.ring_graph.channel_count(), 6);
    }
}
