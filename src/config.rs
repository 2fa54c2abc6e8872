//! External input surfaces (spec §6): `HardwareDesc`, `ScaleUnit` and
//! `Options`. These are caller-constructed value types — the core never
//! reads files or environment variables to populate them, mirroring
//! `zenith-runtime-gpu::config::GpuRuntimeConfig` and
//! `zenith-scheduler::config::SchedulerConfig`, which are likewise plain
//! serde structs handed in by the caller rather than loaded in-crate.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{CpuArch, CpuVendor, GpuVendor};

/// GPU population descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GpuDesc {
    pub count: u32,
    pub vendor: GpuVendor,
    /// Generation code (NVIDIA SM family) or, for AMD GPUs, the xGMI
    /// architecture family number.
    pub generation_code: u32,
    pub nvlinks_per_pair: u32,
    pub gdr_support: bool,
}

/// CPU population descriptor (one node per NUMA domain).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CpuDesc {
    pub count: u32,
    pub arch: CpuArch,
    pub vendor: CpuVendor,
    pub model: i32,
}

/// NIC population descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NicDesc {
    pub count: u32,
    pub speed_gbs: f64,
    pub gdr_support: bool,
    pub coll_support: bool,
    /// Per-NIC maximum channel cap; `0` means unconstrained.
    pub max_channels: u32,
}

/// PCIe fabric descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcieDesc {
    /// PCIe generation (3, 4 or 5).
    pub gen: u32,
    /// Lane width (8 or 16).
    pub width: u32,
    pub switches_per_cpu: u32,
}

/// NVSwitch population descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvSwitchDesc {
    pub count: u32,
}

/// Declarative single-server hardware description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareDesc {
    pub name: String,
    pub gpu: GpuDesc,
    pub cpu: CpuDesc,
    pub nic: NicDesc,
    pub pcie: PcieDesc,
    pub nvswitch: NvSwitchDesc,
    /// `numa_mapping[gpu_index]` is the CPU/NUMA index that GPU owns;
    /// each value must be `< cpu.count`.
    pub numa_mapping: Vec<u32>,
}

/// Multi-server (scale-unit) network topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    RailOptimized,
    FatTree,
}

/// Optional multi-server description. When present, the topology builder
/// replicates `HardwareDesc` once per server and wires NICs to network
/// switches per §4.C.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScaleUnit {
    pub server_count: u32,
    pub rail_count: u32,
    pub network_type: NetworkType,
}

/// The type tag attached to an option descriptor; purely informational,
/// consumed by external UI collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionType {
    Bool,
    IntOrAuto,
    String,
}

/// The grouping tag attached to an option descriptor; purely
/// informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionCategory {
    PathSearch,
    RingSearch,
    ChannelBounds,
    Tuning,
    PatternMatch,
}

/// A resolved option value: a boolean flag, an explicit integer, or the
/// literal `"auto"` sentinel (used by `cross-nic`, `min-channels` and
/// `max-channels`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Auto,
}

impl OptionValue {
    pub fn as_bool(&self) -> bool {
        matches!(self, OptionValue::Bool(true))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            OptionValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, OptionValue::Auto)
    }
}

/// `{default, override?, type, category}` descriptor for a single option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionEntry {
    pub default: OptionValue,
    pub override_value: Option<OptionValue>,
    pub option_type: OptionType,
    pub category: OptionCategory,
}

impl OptionEntry {
    fn new(default: OptionValue, option_type: OptionType, category: OptionCategory) -> Self {
        OptionEntry { default, override_value: None, option_type, category }
    }

    /// The effective value: the override if present, else the default.
    pub fn effective(&self) -> &OptionValue {
        self.override_value.as_ref().unwrap_or(&self.default)
    }
}

/// Option names recognized by the core (spec §4.A).
pub mod option_names {
    pub const NVB_DISABLE: &str = "nvb-disable";
    pub const PXN_DISABLE: &str = "pxn-disable";
    pub const PXN_C2C: &str = "pxn-c2c";
    pub const CROSS_NIC: &str = "cross-nic";
    pub const MIN_CHANNELS: &str = "min-channels";
    pub const MAX_CHANNELS: &str = "max-channels";
    pub const ALGO_FORCE: &str = "algo-force";
    pub const PROTO_FORCE: &str = "proto-force";
    pub const THREADS_FORCE: &str = "threads-force";
    pub const MODEL_MATCH_DISABLE: &str = "model-match-disable";
}

/// The full option set, mapping name to descriptor. The effective value
/// of each option is override-if-present-else-default (spec §4.A).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    entries: BTreeMap<String, OptionEntry>,
}

impl Default for Options {
    fn default() -> Self {
        use option_names::*;
        let mut entries = BTreeMap::new();
        entries.insert(NVB_DISABLE.into(), OptionEntry::new(OptionValue::Bool(false), OptionType::Bool, OptionCategory::PathSearch));
        entries.insert(PXN_DISABLE.into(), OptionEntry::new(OptionValue::Bool(false), OptionType::Bool, OptionCategory::PathSearch));
        entries.insert(PXN_C2C.into(), OptionEntry::new(OptionValue::Bool(false), OptionType::Bool, OptionCategory::PathSearch));
        entries.insert(CROSS_NIC.into(), OptionEntry::new(OptionValue::Auto, OptionType::IntOrAuto, OptionCategory::RingSearch));
        entries.insert(MIN_CHANNELS.into(), OptionEntry::new(OptionValue::Auto, OptionType::IntOrAuto, OptionCategory::ChannelBounds));
        entries.insert(MAX_CHANNELS.into(), OptionEntry::new(OptionValue::Auto, OptionType::IntOrAuto, OptionCategory::ChannelBounds));
        entries.insert(ALGO_FORCE.into(), OptionEntry::new(OptionValue::Auto, OptionType::String, OptionCategory::Tuning));
        entries.insert(PROTO_FORCE.into(), OptionEntry::new(OptionValue::Auto, OptionType::String, OptionCategory::Tuning));
        entries.insert(THREADS_FORCE.into(), OptionEntry::new(OptionValue::Auto, OptionType::String, OptionCategory::Tuning));
        entries.insert(MODEL_MATCH_DISABLE.into(), OptionEntry::new(OptionValue::Bool(false), OptionType::Bool, OptionCategory::PatternMatch));
        Options { entries }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an override for a recognized option name. Unknown names are
    /// ignored (external callers surface invalid names; the core does
    /// not treat this as `invalid-config`, since option misuse is not a
    /// topology-structural failure).
    pub fn set_override(&mut self, name: &str, value: OptionValue) -> &mut Self {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.override_value = Some(value);
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&OptionEntry> {
        self.entries.get(name)
    }

    pub fn bool_flag(&self, name: &str) -> bool {
        self.get(name).map(|e| e.effective().as_bool()).unwrap_or(false)
    }

    /// Resolve `cross-nic`: explicit `0`/`1` or `auto` (the option's
    /// default).
    pub fn cross_nic(&self) -> CrossNic {
        match self.get(option_names::CROSS_NIC).map(|e| e.effective()) {
            Some(OptionValue::Int(0)) => CrossNic::Off,
            Some(OptionValue::Int(_)) => CrossNic::On,
            _ => CrossNic::Auto,
        }
    }

    /// Resolve `min-channels`/`max-channels` to a concrete `[min, max]`
    /// pair, clamped per spec §4.G step 5 / §8 boundary behaviors.
    pub fn channel_bounds(&self) -> (u32, u32) {
        let min_raw = self.get(option_names::MIN_CHANNELS).and_then(|e| e.effective().as_int());
        let max_raw = self.get(option_names::MAX_CHANNELS).and_then(|e| e.effective().as_int());
        let min = min_raw.map(|v| v.max(1) as u32).unwrap_or(1);
        let max = max_raw
            .map(|v| (v.max(1) as u32).min(crate::types::MAX_CHANNELS))
            .unwrap_or(crate::types::MAX_CHANNELS);
        if min > max {
            let repaired = min.min(crate::types::MAX_CHANNELS);
            (repaired, repaired)
        } else {
            (min, max)
        }
    }
}

/// The resolved `cross-nic` relaxation tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossNic {
    Off,
    On,
    Auto,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_channel_bounds_are_full_range() {
        let opts = Options::default();
        assert_eq!(opts.channel_bounds(), (1, 64));
    }

    #[test]
    fn min_greater_than_max_is_repaired_to_equality() {
        let mut opts = Options::default();
        opts.set_override(option_names::MIN_CHANNELS, OptionValue::Int(10));
        opts.set_override(option_names::MAX_CHANNELS, OptionValue::Int(4));
        assert_eq!(opts.channel_bounds(), (10, 10));
    }

    #[test]
    fn max_channels_clamps_to_64() {
        let mut opts = Options::default();
        opts.set_override(option_names::MAX_CHANNELS, OptionValue::Int(999));
        assert_eq!(opts.channel_bounds().1, 64);
    }

    #[test]
    fn cross_nic_defaults_to_auto() {
        assert_eq!(Options::default().cross_nic(), CrossNic::Auto);
    }
}
