//! `System` and the topology builder (component C).
//!
//! Materializes nodes and links from a [`HardwareDesc`] (and an optional
//! [`ScaleUnit`]) the way `zenith-runtime-gpu::device::GpuTopology`
//! materializes a `GpuTopology` from discovered devices, except the core
//! never probes hardware: everything here is computed from the
//! declarative description alone.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use crate::config::{CpuDesc, HardwareDesc, NetworkType, NicDesc, ScaleUnit};
use crate::decision_log::{DecisionLog, Phase};
use crate::error::{Error, Result};
use crate::types::{
    cross_socket_bandwidth_gbs, nvlink_bandwidth_gbs, pcie_bandwidth_gbs, xgmi_bandwidth_gbs, GpuVendor, Link,
    LinkType, Node, NodeAttrs, NodeKind, Path,
};

/// The immutable aggregate the topology builder produces and every later
/// stage mutates in place (populating `paths`, trimming unreachable
/// nodes).
#[derive(Debug, Clone)]
pub struct System {
    nodes: Vec<Node>,
    links: Vec<Link>,
    id_to_index: HashMap<String, usize>,
    adjacency: HashMap<String, Vec<usize>>,
    by_type: HashMap<NodeKind, Vec<usize>>,
    pub paths: BTreeMap<(String, String), Path>,
    pub max_bandwidth_gbs: f64,
    pub total_bandwidth_gbs: f64,
    pub inter_node: bool,
}

impl System {
    fn from_nodes_and_links(nodes: Vec<Node>, links: Vec<Link>, inter_node: bool) -> Self {
        let mut id_to_index = HashMap::with_capacity(nodes.len());
        let mut by_type: HashMap<NodeKind, Vec<usize>> = HashMap::new();
        for (i, n) in nodes.iter().enumerate() {
            id_to_index.insert(n.id.clone(), i);
            by_type.entry(n.kind()).or_default().push(i);
        }
        let mut adjacency: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, l) in links.iter().enumerate() {
            adjacency.entry(l.source.clone()).or_default().push(i);
        }
        let mut max_bandwidth_gbs = 0.0f64;
        let mut total_bandwidth_gbs = 0.0f64;
        // Bandwidth appears twice per physical link (once per direction);
        // count each physical link once by summing only the forward half.
        let mut counted: HashSet<(String, String)> = HashSet::new();
        for l in &links {
            let key = (l.destination.clone(), l.source.clone());
            if counted.contains(&key) {
                continue;
            }
            counted.insert((l.source.clone(), l.destination.clone()));
            max_bandwidth_gbs = max_bandwidth_gbs.max(l.bandwidth_gbs);
            total_bandwidth_gbs += l.bandwidth_gbs;
        }
        System {
            nodes,
            links,
            id_to_index,
            adjacency,
            by_type,
            paths: BTreeMap::new(),
            max_bandwidth_gbs,
            total_bandwidth_gbs,
            inter_node,
        }
    }

    /// Test-only constructor for exercising engine invariants (trim,
    /// search) against hand-built graphs that the declarative builder
    /// cannot produce on its own (e.g. a GPU with literally no incident
    /// links, spec §8's disconnected-GPU boundary).
    #[cfg(test)]
    pub(crate) fn test_from_nodes_and_links(nodes: Vec<Node>, links: Vec<Link>, inter_node: bool) -> Self {
        Self::from_nodes_and_links(nodes, links, inter_node)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.id_to_index.get(id).map(|&i| &self.nodes[i])
    }

    /// All nodes, in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Nodes of a given type, in creation order.
    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.by_type.get(&kind).into_iter().flatten().map(move |&i| &self.nodes[i])
    }

    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.links.iter()
    }

    /// Links leaving `id`, in creation order.
    pub fn links_from(&self, id: &str) -> impl Iterator<Item = &Link> {
        self.adjacency.get(id).into_iter().flatten().map(move |&i| &self.links[i])
    }

    pub fn path(&self, source: &str, destination: &str) -> Option<&Path> {
        self.paths.get(&(source.to_string(), destination.to_string()))
    }

    pub fn set_path(&mut self, path: Path) {
        let key = (path.source.clone(), path.destination.clone());
        self.paths.insert(key, path);
    }

    /// Undirected neighbor ids of `id` (visits both link directions).
    pub fn neighbors(&self, id: &str) -> Vec<String> {
        self.links_from(id).map(|l| l.destination.clone()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn gpu_ids(&self) -> Vec<String> {
        self.nodes_of_kind(NodeKind::Gpu).map(|n| n.id.clone()).collect()
    }

    pub fn nic_ids(&self) -> Vec<String> {
        self.nodes_of_kind(NodeKind::Nic).map(|n| n.id.clone()).collect()
    }

    /// Reachability trim (spec §4.D.3): breadth-first from every GPU over
    /// the undirected link graph; drop anything unreached, rebuild the
    /// by-type index, and recompute the inter-node flag.
    pub fn trim(&self, log: &mut DecisionLog) -> System {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        for gpu in self.nodes_of_kind(NodeKind::Gpu) {
            if visited.insert(gpu.id.clone()) {
                queue.push_back(gpu.id.clone());
            }
        }
        while let Some(id) = queue.pop_front() {
            for neighbor in self.neighbors(&id) {
                if visited.insert(neighbor.clone()) {
                    queue.push_back(neighbor);
                }
            }
        }

        let kept_nodes: Vec<Node> = self.nodes.iter().filter(|n| visited.contains(&n.id)).cloned().collect();
        let dropped = self.nodes.len() - kept_nodes.len();
        let kept_links: Vec<Link> = self
            .links
            .iter()
            .filter(|l| visited.contains(&l.source) && visited.contains(&l.destination))
            .cloned()
            .collect();
        let kept_paths: BTreeMap<(String, String), Path> = self
            .paths
            .iter()
            .filter(|(_, p)| visited.contains(&p.source) && visited.contains(&p.destination))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut trimmed = System::from_nodes_and_links(kept_nodes, kept_links, self.inter_node);
        trimmed.paths = kept_paths;

        let inter_node = trimmed.gpu_ids().iter().enumerate().any(|(i, a)| {
            trimmed.gpu_ids()[i + 1..].iter().any(|b| match trimmed.path(a, b) {
                None => true,
                Some(p) => p.path_type >= crate::types::PathType::Net,
            })
        });
        trimmed.inter_node = inter_node;

        log.append(
            Phase::TrimSystem,
            format!("dropped {dropped} unreachable node(s)"),
            "nodes with no path to any GPU are unreachable and cannot participate in any channel",
            vec!["keep unreachable nodes and let search skip them".to_string()],
            "spec §4.D.3",
            Some(serde_json::json!({ "dropped": dropped, "remaining": trimmed.node_count() })),
        );
        trimmed
    }
}

fn mint_id(prefix: &str, kind: NodeKind, index: usize) -> String {
    format!("{prefix}{}-{index}", kind.id_prefix())
}

fn validate(hw: &HardwareDesc) -> Result<()> {
    if hw.numa_mapping.len() != hw.gpu.count as usize {
        return Err(Error::InvalidConfig(format!(
            "numa_mapping has {} entries, expected gpu.count = {}",
            hw.numa_mapping.len(),
            hw.gpu.count
        )));
    }
    for (i, &n) in hw.numa_mapping.iter().enumerate() {
        if n >= hw.cpu.count {
            return Err(Error::InvalidConfig(format!(
                "numa_mapping[{i}] = {n} is out of range for cpu.count = {}",
                hw.cpu.count
            )));
        }
    }
    if hw.pcie.switches_per_cpu > 0 && hw.cpu.count == 0 {
        return Err(Error::InvalidConfig(
            "PCIe-switched wiring demanded but switches_per_cpu * cpu.count == 0".to_string(),
        ));
    }
    if hw.pcie.gen == 0 || hw.pcie.width == 0 {
        return Err(Error::InvalidConfig("PCIe generation/width must be positive".to_string()));
    }
    if hw.nic.count > 0 && hw.nic.speed_gbs <= 0.0 {
        return Err(Error::InvalidConfig("NIC line rate must be positive".to_string()));
    }
    Ok(())
}

struct Builder {
    nodes: Vec<Node>,
    links: Vec<Link>,
}

impl Builder {
    fn new() -> Self {
        Builder { nodes: Vec::new(), links: Vec::new() }
    }

    fn push_node(&mut self, id: String, index: usize, attrs: NodeAttrs) {
        self.nodes.push(Node { id, index, label: None, attrs });
    }

    fn add_bidirectional(&mut self, a: &str, b: &str, link_type: LinkType, bandwidth_gbs: f64) {
        if bandwidth_gbs <= 0.0 {
            return;
        }
        self.links.push(Link { source: a.to_string(), destination: b.to_string(), link_type, bandwidth_gbs });
        self.links.push(Link { source: b.to_string(), destination: a.to_string(), link_type, bandwidth_gbs });
    }

    fn has_link(&self, a: &str, b: &str) -> bool {
        self.links.iter().any(|l| l.source == a && l.destination == b)
    }
}

/// Build a single-server `System` (no network switches, `inter_node =
/// false`), with every node id prefixed by `prefix` (empty for a
/// standalone server, `"sN-"` for server `N` of a scale unit).
fn build_single_server(hw: &HardwareDesc, prefix: &str) -> Builder {
    let mut b = Builder::new();

    // GPUs
    for i in 0..hw.gpu.count {
        b.push_node(
            mint_id(prefix, NodeKind::Gpu, i as usize),
            i as usize,
            NodeAttrs::Gpu { device_index: i, rank: i, generation_code: hw.gpu.generation_code, gdr: hw.gpu.gdr_support },
        );
    }
    // CPUs, one per NUMA domain
    for i in 0..hw.cpu.count {
        b.push_node(
            mint_id(prefix, NodeKind::Cpu, i as usize),
            i as usize,
            NodeAttrs::Cpu { arch: hw.cpu.arch, vendor: hw.cpu.vendor, model: hw.cpu.model, numa_id: i },
        );
    }
    // NICs
    for i in 0..hw.nic.count {
        b.push_node(
            mint_id(prefix, NodeKind::Nic, i as usize),
            i as usize,
            NodeAttrs::Nic {
                device_index: i,
                speed_gbs: hw.nic.speed_gbs,
                gdr: hw.nic.gdr_support,
                coll: hw.nic.coll_support,
                max_channels: hw.nic.max_channels,
            },
        );
    }
    // NVSwitches
    for i in 0..hw.nvswitch.count {
        b.push_node(mint_id(prefix, NodeKind::NvSwitch, i as usize), i as usize, NodeAttrs::NvSwitch);
    }
    // PCIe switches: switches_per_cpu per CPU, assigned in CPU-major order.
    let total_switches = hw.pcie.switches_per_cpu * hw.cpu.count;
    for i in 0..total_switches {
        b.push_node(
            mint_id(prefix, NodeKind::PcieSwitch, i as usize),
            i as usize,
            NodeAttrs::PcieSwitch { generation: hw.pcie.gen, width: hw.pcie.width },
        );
    }

    let pcie_bw = pcie_bandwidth_gbs(hw.pcie.gen, hw.pcie.width);

    // Step 1: GPU fabric.
    if hw.nvswitch.count > 0 {
        let bw = nvlink_bandwidth_gbs(hw.gpu.generation_code);
        for gi in 0..hw.gpu.count {
            let gid = mint_id(prefix, NodeKind::Gpu, gi as usize);
            for si in 0..hw.nvswitch.count {
                let sid = mint_id(prefix, NodeKind::NvSwitch, si as usize);
                b.add_bidirectional(&gid, &sid, LinkType::Nvl, bw);
            }
        }
    } else if hw.gpu.vendor == GpuVendor::Amd {
        let bw = xgmi_bandwidth_gbs(hw.gpu.generation_code);
        for gi in 0..hw.gpu.count {
            for gj in (gi + 1)..hw.gpu.count {
                let a = mint_id(prefix, NodeKind::Gpu, gi as usize);
                let bid = mint_id(prefix, NodeKind::Gpu, gj as usize);
                b.add_bidirectional(&a, &bid, LinkType::Nvl, bw);
            }
        }
    } else if hw.gpu.nvlinks_per_pair > 0 {
        let bw = nvlink_bandwidth_gbs(hw.gpu.generation_code) * hw.gpu.nvlinks_per_pair as f64;
        for gi in 0..hw.gpu.count {
            for gj in (gi + 1)..hw.gpu.count {
                let a = mint_id(prefix, NodeKind::Gpu, gi as usize);
                let bid = mint_id(prefix, NodeKind::Gpu, gj as usize);
                b.add_bidirectional(&a, &bid, LinkType::Nvl, bw);
            }
        }
    }

    // Step 2: host hierarchy for GPUs.
    let switches_per_cpu = hw.pcie.switches_per_cpu as usize;
    let mut gpu_switch_cursor: HashMap<u32, usize> = HashMap::new();
    for gi in 0..hw.gpu.count {
        let numa = hw.numa_mapping[gi as usize];
        let gid = mint_id(prefix, NodeKind::Gpu, gi as usize);
        let cid = mint_id(prefix, NodeKind::Cpu, numa as usize);
        if switches_per_cpu > 0 {
            let cursor = gpu_switch_cursor.entry(numa).or_insert(0);
            let local_switch_idx = *cursor % switches_per_cpu;
            *cursor += 1;
            let global_switch_idx = numa as usize * switches_per_cpu + local_switch_idx;
            let sid = mint_id(prefix, NodeKind::PcieSwitch, global_switch_idx);
            b.add_bidirectional(&gid, &sid, LinkType::Pci, pcie_bw);
            if !b.has_link(&sid, &cid) {
                b.add_bidirectional(&sid, &cid, LinkType::Pci, pcie_bw);
            }
        } else {
            b.add_bidirectional(&gid, &cid, LinkType::Pci, pcie_bw);
        }
    }

    // Step 3: NIC hierarchy (reuses GPU's NUMA if index in range, else
    // round-robins over CPUs).
    let mut nic_switch_cursor: HashMap<u32, usize> = HashMap::new();
    for ni in 0..hw.nic.count {
        let numa = if (ni as usize) < hw.numa_mapping.len() {
            hw.numa_mapping[ni as usize]
        } else if hw.cpu.count > 0 {
            ni % hw.cpu.count
        } else {
            0
        };
        let nid = mint_id(prefix, NodeKind::Nic, ni as usize);
        let cid = mint_id(prefix, NodeKind::Cpu, numa as usize);
        if switches_per_cpu > 0 {
            let cursor = nic_switch_cursor.entry(numa).or_insert(0);
            let local_switch_idx = *cursor % switches_per_cpu;
            *cursor += 1;
            let global_switch_idx = numa as usize * switches_per_cpu + local_switch_idx;
            let sid = mint_id(prefix, NodeKind::PcieSwitch, global_switch_idx);
            b.add_bidirectional(&nid, &sid, LinkType::Pci, pcie_bw);
            if !b.has_link(&sid, &cid) {
                b.add_bidirectional(&sid, &cid, LinkType::Pci, pcie_bw);
            }
        } else {
            b.add_bidirectional(&nid, &cid, LinkType::Pci, pcie_bw);
        }
    }

    // Step 4: cross-socket.
    if hw.cpu.count > 1 {
        let bw = cross_socket_bandwidth_gbs(hw.cpu.arch, hw.cpu.vendor, hw.cpu.model);
        for i in 0..hw.cpu.count {
            for j in (i + 1)..hw.cpu.count {
                let a = mint_id(prefix, NodeKind::Cpu, i as usize);
                let bid = mint_id(prefix, NodeKind::Cpu, j as usize);
                b.add_bidirectional(&a, &bid, LinkType::Sys, bw);
            }
        }
    }

    b
}

/// Build the full `System` from a hardware description and optional
/// scale-unit, logging every structural decision (spec §4.C).
pub fn build_system(hw: &HardwareDesc, scale: Option<&ScaleUnit>, log: &mut DecisionLog) -> Result<System> {
    validate(hw)?;

    match scale {
        None => {
            info!(name = %hw.name, "building single-server topology");
            let b = build_single_server(hw, "");
            let node_count = b.nodes.len();
            log.append(
                Phase::TopoBuild,
                format!("built single-server system '{}' ({} nodes)", hw.name, node_count),
                "no scale-unit provided; topology is one server",
                vec!["treat as a one-server scale unit".to_string()],
                "spec §4.C",
                Some(serde_json::json!({ "nodes": node_count, "links": b.links.len() })),
            );
            Ok(System::from_nodes_and_links(b.nodes, b.links, false))
        }
        Some(su) => {
            info!(servers = su.server_count, "building multi-server topology");
            let mut nodes = Vec::new();
            let mut links = Vec::new();
            for s in 0..su.server_count {
                let prefix = format!("s{s}-");
                let b = build_single_server(hw, &prefix);
                nodes.extend(b.nodes);
                links.extend(b.links);
            }

            let switch_count = match su.network_type {
                NetworkType::RailOptimized => su.rail_count,
                NetworkType::FatTree => 1,
            };
            for i in 0..switch_count {
                nodes.push(Node { id: format!("net-{i}"), index: i as usize, label: None, attrs: NodeAttrs::NetSwitch });
            }

            for s in 0..su.server_count {
                for ni in 0..hw.nic.count {
                    let nic_id = format!("s{s}-nic-{ni}");
                    let switch_idx = match su.network_type {
                        NetworkType::RailOptimized => ni % su.rail_count,
                        NetworkType::FatTree => 0,
                    };
                    let switch_id = format!("net-{switch_idx}");
                    if hw.nic.speed_gbs > 0.0 {
                        links.push(Link { source: nic_id.clone(), destination: switch_id.clone(), link_type: LinkType::Net, bandwidth_gbs: hw.nic.speed_gbs });
                        links.push(Link { source: switch_id, destination: nic_id, link_type: LinkType::Net, bandwidth_gbs: hw.nic.speed_gbs });
                    }
                }
            }

            debug!(switches = switch_count, "emitted network-switch nodes for scale unit");
            log.append(
                Phase::TopoBuild,
                format!("built {}-server scale unit with {switch_count} network switch(es)", su.server_count),
                "multi-server topologies wire NICs to rail/fat-tree switches and defer per-server path analysis",
                vec!["compute inter-node paths eagerly".to_string()],
                "spec §4.C, §9 (deferred multi-server path computation)",
                Some(serde_json::json!({ "servers": su.server_count, "switches": switch_count })),
            );
            let mut system = System::from_nodes_and_links(nodes, links, true);
            system.inter_node = true;
            Ok(system)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CpuDesc as Cpu, GpuDesc as Gpu, NicDesc as Nic, NvSwitchDesc, PcieDesc};
    use crate::types::{CpuArch, CpuVendor};

    fn dgx_like() -> HardwareDesc {
        HardwareDesc {
            name: "dgx-like".into(),
            gpu: Gpu { count: 8, vendor: GpuVendor::Nvidia, generation_code: 90, nvlinks_per_pair: 0, gdr_support: true },
            cpu: Cpu { count: 2, arch: CpuArch::X86, vendor: CpuVendor::Intel, model: crate::types::IntelModel::Srp as i32 },
            nic: Nic { count: 8, speed_gbs: 50.0, gdr_support: true, coll_support: true, max_channels: 0 },
            pcie: PcieDesc { gen: 5, width: 16, switches_per_cpu: 2 },
            nvswitch: NvSwitchDesc { count: 4 },
            numa_mapping: vec![0, 0, 0, 0, 1, 1, 1, 1],
        }
    }

    #[test]
    fn single_server_builds_expected_node_counts() {
        let mut log = DecisionLog::new();
        let sys = build_system(&dgx_like(), None, &mut log).unwrap();
        assert_eq!(sys.nodes_of_kind(NodeKind::Gpu).count(), 8);
        assert_eq!(sys.nodes_of_kind(NodeKind::Cpu).count(), 2);
        assert_eq!(sys.nodes_of_kind(NodeKind::Nic).count(), 8);
        assert_eq!(sys.nodes_of_kind(NodeKind::NvSwitch).count(), 4);
        assert_eq!(sys.nodes_of_kind(NodeKind::PcieSwitch).count(), 4);
        assert!(!sys.inter_node);
    }

    #[test]
    fn every_link_has_a_reverse_twin() {
        let mut log = DecisionLog::new();
        let sys = build_system(&dgx_like(), None, &mut log).unwrap();
        for l in sys.links() {
            let reverse_exists = sys.links_from(&l.destination).any(|r| r.destination == l.source && r.link_type == l.link_type && (r.bandwidth_gbs - l.bandwidth_gbs).abs() < 1e-9);
            assert!(reverse_exists, "missing reverse of {} -> {}", l.source, l.destination);
        }
    }

    #[test]
    fn invalid_numa_mapping_is_rejected() {
        let mut hw = dgx_like();
        hw.numa_mapping[0] = 9;
        let mut log = DecisionLog::new();
        assert!(build_system(&hw, None, &mut log).is_err());
    }

    #[test]
    fn trim_keeps_gpus_as_bfs_seeds_even_when_mutually_unreachable() {
        let nodes = vec![
            Node { id: "gpu-0".into(), index: 0, label: None, attrs: NodeAttrs::Gpu { device_index: 0, rank: 0, generation_code: 90, gdr: true } },
            Node { id: "gpu-1".into(), index: 1, label: None, attrs: NodeAttrs::Gpu { device_index: 1, rank: 1, generation_code: 90, gdr: true } },
        ];
        // gpu-0 and gpu-1 share no links at all (spec §8, disconnected GPU).
        // Every GPU is itself a BFS seed (spec §4.D.3), so trim keeps both;
        // it is the absence of any path between them that later surfaces as
        // a no-feasible-plan ring search (see search.rs tests).
        let sys = System::test_from_nodes_and_links(nodes, Vec::new(), false);
        let mut log = DecisionLog::new();
        let trimmed = sys.trim(&mut log);
        assert_eq!(trimmed.node_count(), 2);
    }

    #[test]
    fn scale_unit_marks_inter_node_and_emits_rail_switches() {
        let hw = dgx_like();
        let su = ScaleUnit { server_count: 4, rail_count: 8, network_type: NetworkType::RailOptimized };
        let mut log = DecisionLog::new();
        let sys = build_system(&hw, Some(&su), &mut log).unwrap();
        assert!(sys.inter_node);
        assert_eq!(sys.nodes_of_kind(NodeKind::NetSwitch).count(), 8);
        assert_eq!(sys.nodes_of_kind(NodeKind::Gpu).count(), 32);
    }
}
