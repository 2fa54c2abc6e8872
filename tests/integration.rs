//! Integration Tests - End-to-end planner scenarios
//!
//! These exercise the full `init` pipeline (build -> paths -> trim ->
//! paths -> {pattern-match or search} -> tree -> channel setup) against
//! the worked scenarios a caller of this crate actually runs.

use std::collections::HashSet;

use zenith_fabric_planner::config::{
    CpuDesc, GpuDesc, HardwareDesc, NetworkType, NicDesc, NvSwitchDesc, OptionValue, Options, PcieDesc, ScaleUnit,
};
use zenith_fabric_planner::types::{CpuArch, CpuVendor, GpuVendor, IntelModel, PathType};
use zenith_fabric_planner::{init, config::option_names};

fn hw(gpus: u32, nvswitches: u32, gen: u32, cpu_vendor: CpuVendor, cpu_model: i32, nics: u32, nic_speed: f64, pcie_gen: u32, pcie_width: u32, cpus: u32) -> HardwareDesc {
    let per_cpu = gpus / cpus.max(1);
    HardwareDesc {
        name: "scenario".into(),
        gpu: GpuDesc { count: gpus, vendor: GpuVendor::Nvidia, generation_code: gen, nvlinks_per_pair: 0, gdr_support: true },
        cpu: CpuDesc { count: cpus, arch: CpuArch::X86, vendor: cpu_vendor, model: cpu_model },
        nic: NicDesc { count: nics, speed_gbs: nic_speed, gdr_support: true, coll_support: true, max_channels: 0 },
        pcie: PcieDesc { gen: pcie_gen, width: pcie_width, switches_per_cpu: 2 },
        nvswitch: NvSwitchDesc { count: nvswitches },
        numa_mapping: (0..gpus).map(|i| i / per_cpu.max(1)).collect(),
    }
}

/// Scenario 1: DGX-class, 8 GPUs + 4 NVSwitches, SM90, Intel SRP, 8x 50
/// GB/s NICs, Gen5 x16 PCIe, 2 sockets.
#[test]
fn scenario_dgx_class_sm90() {
    let desc = hw(8, 4, 90, CpuVendor::Intel, IntelModel::Srp as i32, 8, 50.0, 5, 16, 2);
    let plan = init(&desc, None, &Options::default()).unwrap();

    for a in plan.system.gpu_ids() {
        for b in plan.system.gpu_ids() {
            if a == b {
                continue;
            }
            let p = plan.system.path(&a, &b).unwrap();
            assert_eq!(p.path_type, PathType::Nvl);
            assert!((p.bandwidth_gbs - 20.6).abs() < 1e-9);
        }
    }
    for g in plan.system.gpu_ids() {
        for n in plan.system.nic_ids() {
            let p = plan.system.path(&g, &n).unwrap();
            assert!(p.path_type <= PathType::Phb);
        }
    }
    assert!(!plan.ring_graph.channels.is_empty());
    for ch in &plan.ring_graph.channels {
        let set: HashSet<&String> = ch.ring_order.iter().collect();
        assert_eq!(set.len(), 8);
    }
    assert_eq!(plan.tree_graph.channel_count(), 2 * plan.ring_graph.channel_count());
}

/// Scenario 2: A100-class, 8 GPUs + 6 NVSwitches, SM80, Intel SKL, 8x 25
/// GB/s NICs, Gen4 x16 PCIe.
#[test]
fn scenario_a100_class_sm80() {
    let desc = hw(8, 6, 80, CpuVendor::Intel, IntelModel::Skl as i32, 8, 25.0, 4, 16, 2);
    let plan = init(&desc, None, &Options::default()).unwrap();

    for a in plan.system.gpu_ids() {
        for b in plan.system.gpu_ids() {
            if a == b {
                continue;
            }
            let p = plan.system.path(&a, &b).unwrap();
            assert_eq!(p.path_type, PathType::Nvl);
            assert!((p.bandwidth_gbs - 20.0).abs() < 1e-9);
        }
    }
    for cpu in plan.system.nodes_of_kind(zenith_fabric_planner::types::NodeKind::Cpu) {
        let sys_bw = plan
            .system
            .links_from(&cpu.id)
            .find(|l| l.link_type == zenith_fabric_planner::types::LinkType::Sys)
            .map(|l| l.bandwidth_gbs);
        if let Some(bw) = sys_bw {
            assert!((bw - 10.0).abs() < 1e-9);
        }
    }
    let pcie_bw = plan
        .system
        .links()
        .find(|l| l.link_type == zenith_fabric_planner::types::LinkType::Pci)
        .map(|l| l.bandwidth_gbs)
        .unwrap();
    assert!((pcie_bw - 16.0).abs() < 1e-9);
}

/// Scenario 3: MI300X-class, 8 GPUs, xGMI full mesh, 2x AMD Genoa, 8x 50
/// GB/s NICs, Gen5 x16 PCIe; pattern matcher fires before search.
#[test]
fn scenario_mi300x_pattern_match() {
    let mut desc = hw(8, 0, 300, CpuVendor::Amd, 0, 8, 50.0, 5, 16, 2);
    desc.gpu.vendor = GpuVendor::Amd;
    let plan = init(&desc, None, &Options::default()).unwrap();

    assert_eq!(plan.matched_pattern_id.as_deref(), Some("mi300x-8gpu-fullmesh"));
    assert_eq!(plan.ring_graph.channel_count(), 6);
    for a in plan.system.gpu_ids() {
        for b in plan.system.gpu_ids() {
            if a == b {
                continue;
            }
            let p = plan.system.path(&a, &b).unwrap();
            assert_eq!(p.path_type, PathType::Nvl);
            assert!((p.bandwidth_gbs - 48.0).abs() < 1e-9);
        }
    }
}

/// Scenario 3b: same hardware with matching disabled falls through to
/// search and still produces valid Hamiltonian rings.
#[test]
fn scenario_mi300x_matching_disabled_falls_through_to_search() {
    let mut desc = hw(8, 0, 300, CpuVendor::Amd, 0, 8, 50.0, 5, 16, 2);
    desc.gpu.vendor = GpuVendor::Amd;
    let mut options = Options::default();
    options.set_override(option_names::MODEL_MATCH_DISABLE, OptionValue::Bool(true));
    let plan = init(&desc, None, &options).unwrap();

    assert!(plan.matched_pattern_id.is_none());
    assert!(!plan.ring_graph.channels.is_empty());
    for ch in &plan.ring_graph.channels {
        let set: HashSet<&String> = ch.ring_order.iter().collect();
        assert_eq!(set.len(), 8);
    }
}

/// Scenario 4: disabled NVB means no path ever carries type NVB.
#[test]
fn scenario_nvb_disabled_forbids_bounce_paths() {
    let desc = hw(8, 4, 90, CpuVendor::Intel, IntelModel::Srp as i32, 8, 50.0, 5, 16, 2);
    let mut options = Options::default();
    options.set_override(option_names::NVB_DISABLE, OptionValue::Bool(true));
    let plan = init(&desc, None, &options).unwrap();

    assert!(plan.system.paths.values().all(|p| p.path_type != PathType::Nvb));
    for a in plan.system.gpu_ids() {
        for b in plan.system.gpu_ids() {
            if a == b {
                continue;
            }
            assert_eq!(plan.system.path(&a, &b).unwrap().path_type, PathType::Nvl);
        }
    }
}

/// Scenario 5: multi-node, 4 servers x DGX-class, rail-optimized with 8
/// rails; the init driver takes the multi-node fast path.
#[test]
fn scenario_multi_node_rail_optimized() {
    let desc = hw(8, 4, 90, CpuVendor::Intel, IntelModel::Srp as i32, 8, 50.0, 5, 16, 2);
    let scale = ScaleUnit { server_count: 4, rail_count: 8, network_type: NetworkType::RailOptimized };
    let plan = init(&desc, Some(&scale), &Options::default()).unwrap();

    assert!(plan.system.inter_node);
    assert_eq!(plan.system.nodes_of_kind(zenith_fabric_planner::types::NodeKind::NetSwitch).count(), 8);
    for s in 0..4 {
        for i in 0..8u32 {
            let nic_id = format!("s{s}-nic-{i}");
            let expected_switch = format!("net-{}", i % 8);
            let linked = plan.system.links_from(&nic_id).any(|l| l.destination == expected_switch);
            assert!(linked, "nic {nic_id} should link to {expected_switch}");
        }
    }
    assert_eq!(plan.ring_graph.channel_count(), 0);
    assert_eq!(plan.tree_graph.channel_count(), 0);
    assert!(plan.log.filter_by_phase(zenith_fabric_planner::decision_log::Phase::SearchInit).iter().any(|e| e.action.contains("fast-path")));
}

/// Scenario 6: forcing min-channels = max-channels = 1 yields exactly
/// one ring channel and two tree channels (unless the system is fully
/// disconnected).
#[test]
fn scenario_forced_single_channel() {
    let desc = hw(8, 4, 90, CpuVendor::Intel, IntelModel::Srp as i32, 8, 50.0, 5, 16, 2);
    let mut options = Options::default();
    options.set_override(option_names::MIN_CHANNELS, OptionValue::Int(1));
    options.set_override(option_names::MAX_CHANNELS, OptionValue::Int(1));
    let plan = init(&desc, None, &options).unwrap();

    assert_eq!(plan.ring_graph.channel_count(), 1);
    assert_eq!(plan.tree_graph.channel_count(), 2);
}

/// Boundary: a single-GPU system yields `max_channels` trivial ring
/// channels of length 1 and the log is non-empty regardless.
#[test]
fn boundary_single_gpu_trivial_channels() {
    let mut desc = hw(1, 0, 90, CpuVendor::Intel, IntelModel::Srp as i32, 1, 50.0, 5, 16, 1);
    desc.numa_mapping = vec![0];
    let mut options = Options::default();
    options.set_override(option_names::MAX_CHANNELS, OptionValue::Int(4));
    let plan = init(&desc, None, &options).unwrap();

    assert_eq!(plan.ring_graph.channel_count(), 4);
    assert!(plan.ring_graph.channels.iter().all(|c| c.ring_order.len() == 1));
    assert!(!plan.log.is_empty());
}

/// Determinism: running the pipeline twice on identical input yields
/// byte-identical ring orderings and channel counts.
#[test]
fn determinism_repeated_runs_produce_identical_rings() {
    let desc = hw(8, 4, 90, CpuVendor::Intel, IntelModel::Srp as i32, 8, 50.0, 5, 16, 2);
    let options = Options::default();
    let plan_a = init(&desc, None, &options).unwrap();
    let plan_b = init(&desc, None, &options).unwrap();

    let orders_a: Vec<&Vec<String>> = plan_a.ring_graph.channels.iter().map(|c| &c.ring_order).collect();
    let orders_b: Vec<&Vec<String>> = plan_b.ring_graph.channels.iter().map(|c| &c.ring_order).collect();
    assert_eq!(orders_a, orders_b);
    assert_eq!(plan_a.tree_graph.channel_count(), plan_b.tree_graph.channel_count());
}
