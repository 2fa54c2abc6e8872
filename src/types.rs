//! Node/link/path taxonomies, bandwidth tables, speed arrays and search
//! timeouts (component A).

use std::collections::BTreeMap;

/// The named constant driving the inside-Phase-1 channel-doubling step
/// (spec §4.E.6, "channel doubling inside Phase 1"). Treated as a literal
/// per the open-question resolution in spec §9.
pub const CHANNEL_DOUBLE_SPEED_THRESHOLD_GBS: f64 = 25.0;

/// Self-loop bandwidth seeded at the source of every best-path computation.
pub const LOCAL_LOOP_BANDWIDTH_GBS: f64 = 5000.0;

/// TLP overhead applied to bandwidth accounting when a search hop crosses
/// a CPU bridge (worse than `Pxb`).
pub const CROSS_CPU_TLP_OVERHEAD: f64 = 6.0 / 5.0;

/// Per-attempt iteration budget when `same_channels` constrains the ring
/// to reuse the first channel's ordering.
pub const SAME_CHANNEL_ATTEMPT_BUDGET: u64 = 256;
/// Per-attempt iteration budget for balanced-tree search attempts.
pub const TREE_ATTEMPT_BUDGET: u64 = 16_384;
/// Per-attempt iteration budget for every other search attempt.
pub const DEFAULT_ATTEMPT_BUDGET: u64 = 16_384;
/// Iteration budget shared across every attempt of a single search call.
pub const GLOBAL_SEARCH_BUDGET: u64 = 524_288;
/// Hard cap on the number of channels a plan may contain.
pub const MAX_CHANNELS: u32 = 64;

/// Per-pattern permutation-search budget for the pattern matcher.
pub const PATTERN_MATCH_BUDGET: u64 = 100_000;

/// A node's category. Used both as a discriminant tag and as the key into
/// `System`'s by-type secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeKind {
    Gpu,
    Cpu,
    Nic,
    NvSwitch,
    PcieSwitch,
    NetSwitch,
}

impl NodeKind {
    /// The identity prefix used when minting node ids (spec §6, "node
    /// identity convention").
    pub fn id_prefix(self) -> &'static str {
        match self {
            NodeKind::Gpu => "gpu",
            NodeKind::Cpu => "cpu",
            NodeKind::Nic => "nic",
            NodeKind::NvSwitch => "nvs",
            NodeKind::PcieSwitch => "pci",
            NodeKind::NetSwitch => "net",
        }
    }
}

/// CPU instruction-set architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CpuArch {
    X86,
    Power,
    Arm,
}

/// CPU vendor, used to select the cross-socket bandwidth table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum CpuVendor {
    Intel,
    Amd,
    Zhaoxin,
}

/// GPU device family, used to pick the GPU fabric wiring rule (spec
/// §4.C, step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum GpuVendor {
    Nvidia,
    Amd,
}

/// Per-node-type attribute payload (spec §9, "polymorphic node
/// attributes" — modeled as a tagged variant rather than an optional
/// bundle attached to a common record).
#[derive(Debug, Clone)]
pub enum NodeAttrs {
    Gpu {
        device_index: u32,
        rank: u32,
        generation_code: u32,
        gdr: bool,
    },
    Cpu {
        arch: CpuArch,
        vendor: CpuVendor,
        model: i32,
        numa_id: u32,
    },
    Nic {
        device_index: u32,
        speed_gbs: f64,
        gdr: bool,
        coll: bool,
        max_channels: u32,
    },
    NvSwitch,
    PcieSwitch {
        generation: u32,
        width: u32,
    },
    NetSwitch,
}

impl NodeAttrs {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeAttrs::Gpu { .. } => NodeKind::Gpu,
            NodeAttrs::Cpu { .. } => NodeKind::Cpu,
            NodeAttrs::Nic { .. } => NodeKind::Nic,
            NodeAttrs::NvSwitch => NodeKind::NvSwitch,
            NodeAttrs::PcieSwitch { .. } => NodeKind::PcieSwitch,
            NodeAttrs::NetSwitch => NodeKind::NetSwitch,
        }
    }
}

/// A single node in the topology graph.
#[derive(Debug, Clone)]
pub struct Node {
    /// Stable identity string, unique across the system (e.g. `gpu-0`,
    /// `s1-nic-2`).
    pub id: String,
    /// Zero-based index within this node's type.
    pub index: usize,
    /// Optional display label, not used by any algorithmic decision.
    pub label: Option<String>,
    pub attrs: NodeAttrs,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.attrs.kind()
    }
}

/// Directed link type. `Loc` (the implicit self-loop) is never stored as
/// a `Link`; it exists only as a `PathType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkType {
    Nvl,
    C2c,
    Pci,
    Sys,
    Net,
}

/// A directed edge between two nodes. Every configured link appears in
/// both directions with identical bandwidth (spec §3 invariant).
#[derive(Debug, Clone)]
pub struct Link {
    pub source: String,
    pub destination: String,
    pub link_type: LinkType,
    pub bandwidth_gbs: f64,
}

/// Ranked path-type classification; lower is better. The discriminants
/// below preserve the exact numeric ordering from spec §3 and double as
/// the `Ord` implementation everything else relies on (domination
/// tie-breaks, relaxation-cascade comparisons, reporting).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PathType {
    Loc = 0,
    Nvl = 1,
    Nvb = 2,
    C2c = 3,
    Pix = 4,
    Pxb = 5,
    P2c = 6,
    Pxn = 7,
    Phb = 8,
    Sys = 9,
    Net = 10,
    Dis = 11,
}

/// One hop within a `Path`: the destination of the hop and the
/// bandwidth/type of the link traversed to reach it.
#[derive(Debug, Clone)]
pub struct Hop {
    pub to: String,
    pub bandwidth_gbs: f64,
    pub link_type: LinkType,
}

/// The best known route between two endpoints.
#[derive(Debug, Clone)]
pub struct Path {
    pub source: String,
    pub destination: String,
    pub path_type: PathType,
    pub bandwidth_gbs: f64,
    pub hops: Vec<Hop>,
}

impl Path {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }

    /// A newly discovered path `self` dominates `old` iff
    /// `old.bandwidth == 0 OR (old.hop_count > self.hop_count AND old.bandwidth < self.bandwidth)`.
    /// Domination is decided purely on hop count and bandwidth; the
    /// ranked path type never participates (spec §4.D.1).
    pub fn dominates(&self, old: &Path) -> bool {
        old.bandwidth_gbs == 0.0
            || (old.hop_count() > self.hop_count() && old.bandwidth_gbs < self.bandwidth_gbs)
    }
}

/// The tree wiring derived from one ring channel: a flat parent→child
/// edge list plus the lookups derived from it.
#[derive(Debug, Clone, Default)]
pub struct TreeWiring {
    /// Flat parent → child edges, in chain order.
    pub edges: Vec<(String, String)>,
}

/// One collective channel. Ring and tree fields are always present
/// (possibly empty) rather than optional, per spec §9's guidance on
/// search-only fields attached after the fact.
#[derive(Debug, Clone)]
pub struct Channel {
    pub index: usize,
    pub bandwidth_gbs: f64,
    /// Ordered sequence of all GPU identities, visited exactly once,
    /// closing back to the head.
    pub ring_order: Vec<String>,
    /// GPU identity → identity of its ring predecessor (closed loop).
    pub ring_prev: BTreeMap<String, String>,
    /// GPU identity → identity of its ring successor (closed loop).
    pub ring_next: BTreeMap<String, String>,
    pub tree: TreeWiring,
    /// GPU identity → its tree parent, if any.
    pub tree_up: BTreeMap<String, String>,
    /// GPU identity → its tree children.
    pub tree_down: BTreeMap<String, Vec<String>>,
}

impl Channel {
    pub fn trivial(index: usize, gpu_id: &str) -> Self {
        Channel {
            index,
            bandwidth_gbs: 0.0,
            ring_order: vec![gpu_id.to_string()],
            ring_prev: BTreeMap::new(),
            ring_next: BTreeMap::new(),
            tree: TreeWiring::default(),
            tree_up: BTreeMap::new(),
            tree_down: BTreeMap::new(),
        }
    }
}

/// Which collective pattern a `TopoGraph` implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Ring,
    BalancedTree,
}

/// A collection of channels for one pattern.
#[derive(Debug, Clone)]
pub struct TopoGraph {
    pub pattern: Pattern,
    pub channels: Vec<Channel>,
    pub intra_link_type: LinkType,
    pub inter_link_type: LinkType,
    pub intra_speed_gbs: f64,
    pub inter_speed_gbs: f64,
}

impl TopoGraph {
    pub fn empty(pattern: Pattern) -> Self {
        TopoGraph {
            pattern,
            channels: Vec::new(),
            intra_link_type: LinkType::Nvl,
            inter_link_type: LinkType::Net,
            intra_speed_gbs: 0.0,
            inter_speed_gbs: 0.0,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Per-link NVLink (or NVLink-equivalent fabric) bandwidth, keyed by GPU
/// generation code.
pub fn nvlink_bandwidth_gbs(generation_code: u32) -> f64 {
    match generation_code {
        g if g >= 100 => 28.0,
        g if g >= 90 => 20.6,
        86 => 14.0,
        g if g >= 80 => 20.0,
        g if g >= 70 => 25.0,
        g if g >= 60 => 20.0,
        _ => 0.0,
    }
}

/// Per-link xGMI bandwidth for AMD GPUs, keyed by architecture family
/// (reusing the GPU's generation code field to carry the family number,
/// matching the single-field "generation code" abstraction the rest of
/// the core uses for NVIDIA GPUs too).
pub fn xgmi_bandwidth_gbs(family_code: u32) -> f64 {
    match family_code {
        f if f >= 300 => 48.0,
        f if f >= 200 => 32.0,
        _ => 16.0,
    }
}

/// PCIe bandwidth: `12.0 x (gen/3) x (width/16)`, baseline Gen3 x16.
pub fn pcie_bandwidth_gbs(generation: u32, width: u32) -> f64 {
    12.0 * (generation as f64 / 3.0) * (width as f64 / 16.0)
}

/// Cross-socket (SYS) interconnect bandwidth.
pub fn cross_socket_bandwidth_gbs(arch: CpuArch, vendor: CpuVendor, model: i32) -> f64 {
    match (arch, vendor) {
        (CpuArch::X86, CpuVendor::Intel) => match model {
            m if m == IntelModel::Skl as i32 => 10.0,
            m if m == IntelModel::Srp as i32 => 22.0,
            m if m == IntelModel::Erp as i32 => 40.0,
            _ => 6.0, // default BDW
        },
        (CpuArch::X86, CpuVendor::Zhaoxin) => {
            if model == ZhaoxinModel::Yongfeng as i32 {
                9.0
            } else {
                6.0
            }
        }
        (CpuArch::X86, CpuVendor::Amd) => 16.0,
        (CpuArch::Power, _) => 32.0,
        (CpuArch::Arm, _) => 6.0,
    }
}

/// Named Intel model codes referenced by the cross-socket bandwidth
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntelModel {
    Bdw = 0,
    Skl = 1,
    Srp = 2,
    Erp = 3,
}

/// Named Zhaoxin model codes referenced by the cross-socket bandwidth
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZhaoxinModel {
    Generic = 0,
    Yongfeng = 1,
}

/// Which speed-array bucket a system falls into, by minimum GPU
/// generation across the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationBucket {
    Sub90,
    Sm90,
    Sm100,
}

pub fn generation_bucket(min_generation_code: u32) -> GenerationBucket {
    if min_generation_code >= 100 {
        GenerationBucket::Sm100
    } else if min_generation_code >= 90 {
        GenerationBucket::Sm90
    } else {
        GenerationBucket::Sub90
    }
}

/// The candidate ring/tree channel speeds to try, in descending order,
/// for a given generation bucket and intra/inter-node scope.
pub fn speed_array(bucket: GenerationBucket, intra: bool) -> &'static [f64] {
    match (bucket, intra) {
        (GenerationBucket::Sub90, true) => &[40.0, 30.0, 20.0, 18.0, 15.0, 12.0, 10.0, 9.0, 7.0, 6.0, 5.0, 4.0, 3.0],
        (GenerationBucket::Sub90, false) => &[
            48.0, 30.0, 28.0, 24.0, 20.0, 18.0, 15.0, 12.0, 10.0, 9.0, 7.0, 6.0, 5.0, 4.0, 3.0, 2.4, 1.2, 0.24, 0.12,
        ],
        (GenerationBucket::Sm90, true) => &[60.0, 50.0, 40.0, 30.0, 24.0, 20.0, 15.0, 12.0, 11.0, 6.0, 3.0],
        (GenerationBucket::Sm90, false) => &[
            48.0, 45.0, 42.0, 40.0, 30.0, 24.0, 22.0, 20.0, 17.5, 15.0, 12.0, 6.0, 3.0, 2.4, 1.2, 0.24, 0.12,
        ],
        (GenerationBucket::Sm100, true) => &[90.0, 80.0, 70.0, 60.0, 50.0, 45.0, 40.0, 30.0, 24.0, 20.0, 19.0, 18.0],
        (GenerationBucket::Sm100, false) => &[
            96.0, 48.0, 45.1, 42.0, 40.0, 30.0, 24.0, 22.0, 20.0, 17.5, 15.0, 12.0, 6.0, 3.0, 2.4, 1.2, 0.24, 0.12,
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_type_ordering_matches_spec() {
        assert!(PathType::Loc < PathType::Nvl);
        assert!(PathType::Nvl < PathType::Nvb);
        assert!(PathType::Nvb < PathType::C2c);
        assert!(PathType::C2c < PathType::Pix);
        assert!(PathType::Pix < PathType::Pxb);
        assert!(PathType::Pxb < PathType::P2c);
        assert!(PathType::P2c < PathType::Pxn);
        assert!(PathType::Pxn < PathType::Phb);
        assert!(PathType::Phb < PathType::Sys);
        assert!(PathType::Sys < PathType::Net);
        assert!(PathType::Net < PathType::Dis);
    }

    #[test]
    fn pcie_bandwidth_matches_known_points() {
        assert!((pcie_bandwidth_gbs(4, 16) - 16.0).abs() < 1e-9);
        assert!((pcie_bandwidth_gbs(5, 16) - 20.0).abs() < 1e-9);
        assert!((pcie_bandwidth_gbs(3, 16) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn cross_socket_bandwidth_skylake() {
        let bw = cross_socket_bandwidth_gbs(CpuArch::X86, CpuVendor::Intel, IntelModel::Skl as i32);
        assert!((bw - 10.0).abs() < 1e-9);
    }

    #[test]
    fn nvlink_bandwidth_sm90_and_sm80() {
        assert!((nvlink_bandwidth_gbs(90) - 20.6).abs() < 1e-9);
        assert!((nvlink_bandwidth_gbs(80) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn path_domination_requires_strict_improvement() {
        let old = Path {
            source: "gpu-0".into(),
            destination: "gpu-1".into(),
            path_type: PathType::Nvl,
            bandwidth_gbs: 10.0,
            hops: vec![Hop { to: "gpu-1".into(), bandwidth_gbs: 10.0, link_type: LinkType::Nvl }],
        };
        let worse = Path {
            bandwidth_gbs: 5.0,
            hops: vec![
                Hop { to: "nvs-0".into(), bandwidth_gbs: 5.0, link_type: LinkType::Nvl },
                Hop { to: "gpu-1".into(), bandwidth_gbs: 5.0, link_type: LinkType::Nvl },
            ],
            ..old.clone()
        };
        assert!(!worse.dominates(&old));
        let better = Path { bandwidth_gbs: 20.0, hops: vec![old.hops[0].clone()], ..old.clone() };
        assert!(!better.dominates(&old)); // same hop_count, not strictly fewer hops
    }

    proptest::proptest! {
        /// Domination (spec §4.D.1) never accepts a candidate with more
        /// hops and no bandwidth improvement, for any bandwidth/hop-count
        /// pair drawn at random.
        #[test]
        fn domination_never_prefers_more_hops_without_more_bandwidth(
            old_bw in 0.01f64..1000.0,
            old_hops in 1usize..20,
            new_bw in 0.0f64..1000.0,
            extra_hops in 0usize..20,
        ) {
            let old = Path {
                source: "a".into(),
                destination: "b".into(),
                path_type: PathType::Nvl,
                bandwidth_gbs: old_bw,
                hops: (0..old_hops).map(|_| Hop { to: "b".into(), bandwidth_gbs: old_bw, link_type: LinkType::Nvl }).collect(),
            };
            let new_hops = old_hops + extra_hops;
            let new = Path {
                bandwidth_gbs: new_bw,
                hops: (0..new_hops).map(|_| Hop { to: "b".into(), bandwidth_gbs: new_bw, link_type: LinkType::Nvl }).collect(),
                ..old.clone()
            };
            if new_hops >= old_hops {
                prop_assert!(!new.dominates(&old));
            }
        }

        /// PCIe bandwidth is monotone non-decreasing in both generation
        /// and width.
        #[test]
        fn pcie_bandwidth_is_monotone(gen in 3u32..6, width in 1u32..32) {
            let base = pcie_bandwidth_gbs(gen, width);
            let wider = pcie_bandwidth_gbs(gen, width + 1);
            let newer = pcie_bandwidth_gbs(gen + 1, width);
            prop_assert!(wider >= base);
            prop_assert!(newer >= base);
        }
    }
}
