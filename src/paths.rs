//! All-pairs best-path computation and the peer-proxy (PXN) upgrade pass
//! (component D.1–D.2). Reachability trim lives on [`crate::topology::System::trim`]
//! since it mutates the same aggregate the builder produces.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::config::{option_names, Options};
use crate::decision_log::{DecisionLog, Phase};
use crate::topology::System;
use crate::types::{Hop, LinkType, Node, NodeKind, Path, PathType, LOCAL_LOOP_BANDWIDTH_GBS};

/// Run the layered-BFS all-pairs computation from every GPU and NIC
/// source, then the PXN peer-proxy upgrade pass, populating
/// `system.paths` in place (spec §4.D.1–§4.D.2).
pub fn compute_all_pairs_best_paths(system: &mut System, options: &Options, log: &mut DecisionLog) {
    let sources: Vec<String> = system.gpu_ids().into_iter().chain(system.nic_ids()).collect();
    let mut discovered = 0usize;
    for src in &sources {
        let paths = best_paths_from(system, src, options);
        discovered += paths.len();
        for path in paths {
            system.set_path(path);
        }
    }
    log.append(
        Phase::ComputePaths,
        format!("computed best paths from {} source(s), {discovered} path(s) total", sources.len()),
        "every GPU and NIC is a best-path source; layered BFS settles shortest-hop-count paths first",
        vec!["single-source Dijkstra per pair".to_string()],
        "spec §4.D.1",
        Some(serde_json::json!({ "sources": sources.len(), "paths": discovered })),
    );

    if options.bool_flag(option_names::PXN_DISABLE) {
        log.append(
            Phase::ComputePaths,
            "skipped PXN peer-proxy upgrade pass",
            "pxn-disable is set",
            vec!["run the upgrade pass anyway".to_string()],
            "spec §4.A (pxn-disable), §4.D.2",
            None,
        );
        return;
    }
    let upgraded = pxn_upgrade(system, options);
    log.append(
        Phase::ComputePaths,
        format!("PXN upgrade pass improved {upgraded} GPU->NIC path(s)"),
        "routing a GPU through its NVLink-connected local peer can beat its direct path to a NIC",
        vec!["leave every GPU->NIC path as its direct best path".to_string()],
        "spec §4.D.2",
        Some(serde_json::json!({ "upgraded": upgraded })),
    );
}

#[derive(Clone)]
struct Accum {
    path_type: PathType,
    bandwidth_gbs: f64,
    hops: Vec<Hop>,
}

impl Accum {
    fn hop_count(&self) -> usize {
        self.hops.len()
    }

    fn as_path(&self, source: &str, destination: &str) -> Path {
        Path {
            source: source.to_string(),
            destination: destination.to_string(),
            path_type: self.path_type,
            bandwidth_gbs: self.bandwidth_gbs,
            hops: self.hops.clone(),
        }
    }

    fn dominates(&self, old: &Accum) -> bool {
        old.bandwidth_gbs == 0.0 || (old.hop_count() > self.hop_count() && old.bandwidth_gbs < self.bandwidth_gbs)
    }
}

fn classify_hop(from: &Node, to: &Node, link_type: LinkType, prior_path_type: PathType, new_hop_count: usize) -> PathType {
    if link_type == LinkType::Net {
        return PathType::Loc;
    }
    if from.kind() == NodeKind::PcieSwitch && to.kind() == NodeKind::PcieSwitch {
        return PathType::Pxb;
    }
    if link_type == LinkType::Pci && (from.kind() == NodeKind::Cpu || to.kind() == NodeKind::Cpu) {
        return PathType::Phb;
    }
    if from.kind() == NodeKind::Gpu && prior_path_type == PathType::Nvl && link_type == LinkType::Nvl && new_hop_count > 1 {
        return PathType::Nvb;
    }
    match link_type {
        LinkType::Nvl => PathType::Nvl,
        LinkType::C2c => PathType::C2c,
        LinkType::Pci => PathType::Pix,
        LinkType::Sys | LinkType::Net => PathType::Sys,
    }
}

/// Whether expanding the edge `node -> to` is permitted by the GPU
/// passthrough guard (spec §4.D.1). Only restricts traversal when `node`
/// itself is a non-source GPU being passed through.
fn passthrough_allowed(system: &System, node: &str, src: &str, cur: &Accum, to_kind: NodeKind, nvb_disable: bool) -> bool {
    let Some(n) = system.node(node) else { return true };
    if n.kind() != NodeKind::Gpu || node == src {
        return true;
    }
    !nvb_disable
        && cur.hops.last().map(|h| h.link_type) == Some(LinkType::Nvl)
        && to_kind == NodeKind::Gpu
        && cur.hop_count() <= 1
}

/// Layered breadth-first relaxation from a single source, per spec
/// §4.D.1: all paths of depth `k` settle before depth `k+1` expands.
fn best_paths_from(system: &System, src: &str, options: &Options) -> Vec<Path> {
    let nvb_disable = options.bool_flag(option_names::NVB_DISABLE);
    let mut best: HashMap<String, Accum> = HashMap::new();
    best.insert(src.to_string(), Accum { path_type: PathType::Loc, bandwidth_gbs: LOCAL_LOOP_BANDWIDTH_GBS, hops: Vec::new() });

    let mut frontier = vec![src.to_string()];
    while !frontier.is_empty() {
        let mut next_frontier = Vec::new();
        let mut next_set: HashSet<String> = HashSet::new();
        for node in &frontier {
            let cur = best.get(node).cloned().expect("frontier node must have a settled path");
            for link in system.links_from(node) {
                let to = &link.destination;
                let Some(to_node) = system.node(to) else { continue };
                if !passthrough_allowed(system, node, src, &cur, to_node.kind(), nvb_disable) {
                    continue;
                }
                let from_node = system.node(node).expect("frontier node must exist");
                let new_bandwidth = cur.bandwidth_gbs.min(link.bandwidth_gbs);
                let mut new_hops = cur.hops.clone();
                new_hops.push(Hop { to: to.clone(), bandwidth_gbs: link.bandwidth_gbs, link_type: link.link_type });
                let new_hop_count = new_hops.len();
                let hop_type = classify_hop(from_node, to_node, link.link_type, cur.path_type, new_hop_count);
                let candidate = Accum { path_type: cur.path_type.max(hop_type), bandwidth_gbs: new_bandwidth, hops: new_hops };

                let accept = match best.get(to) {
                    None => true,
                    Some(old) => candidate.dominates(old),
                };
                if accept {
                    best.insert(to.clone(), candidate);
                    if next_set.insert(to.clone()) {
                        next_frontier.push(to.clone());
                    }
                }
            }
        }
        frontier = next_frontier;
    }

    best.into_iter().map(|(dst, accum)| accum.as_path(src, &dst)).collect()
}

/// PXN peer-proxy upgrade pass (spec §4.D.2). Returns the number of
/// GPU→NIC paths replaced.
fn pxn_upgrade(system: &mut System, options: &Options) -> usize {
    let threshold = if options.bool_flag(option_names::PXN_C2C) { PathType::P2c } else { PathType::Pxb };
    let gpu_ids = system.gpu_ids();
    let nic_ids = system.nic_ids();
    let mut upgraded = 0usize;

    for nic in &nic_ids {
        let mut local_gpu: Option<(String, Path)> = None;
        for gpu in &gpu_ids {
            if let Some(p) = system.path(gpu, nic) {
                let better = match &local_gpu {
                    None => true,
                    Some((_, best)) => {
                        p.path_type < best.path_type || (p.path_type == best.path_type && p.bandwidth_gbs > best.bandwidth_gbs)
                    }
                };
                if better {
                    local_gpu = Some((gpu.clone(), p.clone()));
                }
            }
        }
        let Some((local_gpu_id, local_to_nic)) = local_gpu else { continue };
        if local_to_nic.path_type > threshold {
            continue;
        }

        let mut updates: Vec<Path> = Vec::new();
        for g in &gpu_ids {
            if *g == local_gpu_id {
                continue;
            }
            let Some(local_to_g) = system.path(&local_gpu_id, g) else { continue };
            if local_to_g.path_type > PathType::Nvl {
                continue;
            }
            let Some(g_to_local) = system.path(g, &local_gpu_id) else { continue };

            let current = system.path(g, nic);
            let worth_it = match current {
                None => true,
                Some(cur) => local_to_nic.bandwidth_gbs > cur.bandwidth_gbs || cur.path_type > PathType::Pxn,
            };
            if !worth_it {
                continue;
            }

            let mut hops = g_to_local.hops.clone();
            hops.extend(local_to_nic.hops.clone());
            let replacement = Path {
                source: g.clone(),
                destination: nic.clone(),
                path_type: PathType::Pxn,
                bandwidth_gbs: local_to_g.bandwidth_gbs.min(local_to_nic.bandwidth_gbs),
                hops,
            };
            updates.push(replacement);
        }
        for u in updates {
            debug!(gpu = %u.source, nic = %u.destination, "PXN-upgraded GPU->NIC path via local peer {}", local_gpu_id);
            system.set_path(u);
            upgraded += 1;
        }
    }
    upgraded
}
