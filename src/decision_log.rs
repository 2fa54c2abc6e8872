//! Append-only, step-numbered decision log (component B).
//!
//! Every phase of the planner appends to a single `DecisionLog`, which is
//! threaded explicitly through the pipeline and returned as part of
//! `Plan` rather than kept in a global (spec §9, "side logs").

use chrono::{DateTime, Utc};

/// The closed set of phases a decision entry may belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    TopoBuild,
    ComputePaths,
    TrimSystem,
    SearchInit,
    RingSearch,
    TreeSearch,
    ChannelSetup,
    PatternMatch,
}

/// One append-only record: what was decided, why, what the alternatives
/// were, and where in the spec this decision comes from.
#[derive(Debug, Clone, serde::Serialize)]
pub struct DecisionEntry {
    pub step: u64,
    pub phase: Phase,
    pub action: String,
    pub rationale: String,
    pub alternatives: Vec<String>,
    pub source_ref: String,
    pub payload: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

/// A process-local, append-only decision log.
#[derive(Debug, Clone, Default)]
pub struct DecisionLog {
    entries: Vec<DecisionEntry>,
}

impl DecisionLog {
    pub fn new() -> Self {
        DecisionLog { entries: Vec::new() }
    }

    /// Append a new entry; returns its step index.
    pub fn append(
        &mut self,
        phase: Phase,
        action: impl Into<String>,
        rationale: impl Into<String>,
        alternatives: Vec<String>,
        source_ref: impl Into<String>,
        payload: Option<serde_json::Value>,
    ) -> u64 {
        let step = self.entries.len() as u64;
        self.entries.push(DecisionEntry {
            step,
            phase,
            action: action.into(),
            rationale: rationale.into(),
            alternatives,
            source_ref: source_ref.into(),
            payload,
            timestamp: Utc::now(),
        });
        step
    }

    /// A defensive copy of every entry recorded so far.
    pub fn snapshot(&self) -> Vec<DecisionEntry> {
        self.entries.clone()
    }

    /// Entries belonging to a single phase, in step order.
    pub fn filter_by_phase(&self, phase: Phase) -> Vec<&DecisionEntry> {
        self.entries.iter().filter(|e| e.phase == phase).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_increase_monotonically() {
        let mut log = DecisionLog::new();
        let s0 = log.append(Phase::TopoBuild, "a", "r", vec![], "spec §4.C", None);
        let s1 = log.append(Phase::ComputePaths, "b", "r", vec![], "spec §4.D", None);
        assert_eq!(s0, 0);
        assert_eq!(s1, 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn filter_by_phase_preserves_order() {
        let mut log = DecisionLog::new();
        log.append(Phase::TopoBuild, "a", "r", vec![], "x", None);
        log.append(Phase::RingSearch, "b", "r", vec![], "x", None);
        log.append(Phase::TopoBuild, "c", "r", vec![], "x", None);
        let topo = log.filter_by_phase(Phase::TopoBuild);
        assert_eq!(topo.len(), 2);
        assert_eq!(topo[0].action, "a");
        assert_eq!(topo[1].action, "c");
    }

    #[test]
    fn snapshot_is_defensive_copy() {
        let mut log = DecisionLog::new();
        log.append(Phase::TopoBuild, "a", "r", vec![], "x", None);
        let snap = log.snapshot();
        log.append(Phase::TopoBuild, "b", "r", vec![], "x", None);
        assert_eq!(snap.len(), 1);
        assert_eq!(log.len(), 2);
    }
}
