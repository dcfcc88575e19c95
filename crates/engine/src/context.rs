//! Per-run counters.
//!
//! Every identifier handed out during one pass (error anchors, block ids)
//! comes from a [`RunContext`] owned by that pass, so two runs in the same
//! process never share numbering.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::summary::model::RestartKind;

/// Cross-reference id attached to error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnchorId(pub u32);

/// Id of one opened block, used by renderers as a collapse target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub u32);

impl std::fmt::Display for AnchorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anchor{}", self.0)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct RunContext {
    last_anchor: u32,
    last_block: u32,
    restarts: BTreeMap<RestartKind, usize>,
    jobs: usize,
}

impl RunContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_anchor(&mut self) -> AnchorId {
        self.last_anchor += 1;
        AnchorId(self.last_anchor)
    }

    /// The most recently allocated anchor, if any.
    pub fn current_anchor(&self) -> Option<AnchorId> {
        (self.last_anchor > 0).then_some(AnchorId(self.last_anchor))
    }

    pub fn next_block(&mut self) -> BlockId {
        self.last_block += 1;
        BlockId(self.last_block)
    }

    /// 0-based index of the next restart event of `kind`.
    pub fn next_restart(&mut self, kind: RestartKind) -> usize {
        let slot = self.restarts.entry(kind).or_default();
        let index = *slot;
        *slot += 1;
        index
    }

    pub fn next_job(&mut self) -> usize {
        self.jobs += 1;
        self.jobs - 1
    }

    /// Index of the most recently started job.
    pub fn current_job(&self) -> Option<usize> {
        self.jobs.checked_sub(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_monotonic_and_independent() {
        let mut ctx = RunContext::new();
        assert_eq!(ctx.current_anchor(), None);
        assert_eq!(ctx.next_anchor(), AnchorId(1));
        assert_eq!(ctx.next_block(), BlockId(1));
        assert_eq!(ctx.next_anchor(), AnchorId(2));
        assert_eq!(ctx.current_anchor(), Some(AnchorId(2)));
    }

    #[test]
    fn test_separate_runs_do_not_share_counters() {
        let mut first = RunContext::new();
        first.next_anchor();
        first.next_anchor();
        let mut second = RunContext::new();
        assert_eq!(second.next_anchor(), AnchorId(1));
    }

    #[test]
    fn test_restart_indices_are_per_kind() {
        let mut ctx = RunContext::new();
        assert_eq!(ctx.next_restart(RestartKind::KlippyStart), 0);
        assert_eq!(ctx.next_restart(RestartKind::KlippyStart), 1);
        assert_eq!(ctx.next_restart(RestartKind::SdCardStart), 0);
        assert_eq!(ctx.current_job(), None);
        assert_eq!(ctx.next_job(), 0);
        assert_eq!(ctx.current_job(), Some(0));
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(AnchorId(3).to_string(), "anchor3");
        assert_eq!(BlockId(7).to_string(), "block7");
    }
}
