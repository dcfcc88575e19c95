//! Block kinds, families and the open-block state.
//!
//! Blocks belong to one of four families. At most one block per family is
//! open at a time, and the coexistence table below decides which families
//! may stay open next to each other.

use serde::{Deserialize, Serialize};

use crate::context::{AnchorId, BlockId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Config,
    BuildConfig,
    MeshPoints,
    Sent,
    Receive,
    Received,
    QueuedMoves,
    McuClockTrace,
    McuReceive,
    AutotuneTrace,
    Webhooks,
    PrintCommentStats,
    Traceback,
    FileNotFoundSpan,
    SerialPortSpan,
    PredictionReset,
    GitInfo,
    ArgsSpan,
    VirtualSdcardBuffer,
    VirtualSdcardUpcoming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    /// Config dumps; nothing else may be open alongside
    Exclusive,
    /// Error spans and git info, untagged lines
    FreeForm,
    /// Runs of lines sharing a prefix
    Tagged,
    /// Opens and closes on the same line
    Inline,
}

impl BlockKind {
    pub fn family(self) -> Family {
        use BlockKind::*;
        match self {
            Config | BuildConfig => Family::Exclusive,
            Traceback | FileNotFoundSpan | SerialPortSpan | GitInfo => Family::FreeForm,
            ArgsSpan | VirtualSdcardBuffer | VirtualSdcardUpcoming => Family::Inline,
            MeshPoints | Sent | Receive | Received | QueuedMoves | McuClockTrace | McuReceive
            | AutotuneTrace | Webhooks | PrintCommentStats | PredictionReset => Family::Tagged,
        }
    }
}

/// Whether a block of family `open` may stay open while one of `opening` opens.
pub fn may_coexist(open: Family, opening: Family) -> bool {
    use Family::*;
    match (open, opening) {
        (Exclusive, _) | (_, Exclusive) => false,
        (FreeForm, FreeForm) | (Tagged, Tagged) => false,
        (FreeForm, Tagged) | (Tagged, FreeForm) => true,
        (Inline, _) | (_, Inline) => true,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenBlock {
    pub kind: BlockKind,
    pub id: BlockId,
    pub opened_at: usize,
    /// Error anchor taken when the block opened, if it reports one
    pub anchor: Option<AnchorId>,
}

/// Currently open blocks, one slot per long-lived family.
#[derive(Debug, Default)]
pub struct BlockState {
    exclusive: Option<OpenBlock>,
    free_form: Option<OpenBlock>,
    tagged: Option<OpenBlock>,
}

impl BlockState {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&mut self, family: Family) -> Option<&mut Option<OpenBlock>> {
        match family {
            Family::Exclusive => Some(&mut self.exclusive),
            Family::FreeForm => Some(&mut self.free_form),
            Family::Tagged => Some(&mut self.tagged),
            Family::Inline => None,
        }
    }

    /// Close whatever may not coexist with `block`, then record it as open.
    ///
    /// Returns the displaced blocks, oldest family first. Inline blocks are
    /// never recorded.
    pub fn open(&mut self, block: OpenBlock) -> Vec<OpenBlock> {
        let family = block.kind.family();
        let mut displaced = Vec::new();
        for other in [Family::Exclusive, Family::FreeForm, Family::Tagged] {
            if !may_coexist(other, family) {
                if let Some(prev) = self.slot(other).and_then(|slot| slot.take()) {
                    displaced.push(prev);
                }
            }
        }
        if let Some(slot) = self.slot(family) {
            *slot = Some(block);
        }
        displaced
    }

    pub fn close_tagged(&mut self) -> Option<OpenBlock> {
        self.tagged.take()
    }

    pub fn close_free_form(&mut self) -> Option<OpenBlock> {
        self.free_form.take()
    }

    pub fn close_exclusive(&mut self) -> Option<OpenBlock> {
        self.exclusive.take()
    }

    /// Close everything; used by restart markers and end of input.
    pub fn close_all(&mut self) -> Vec<OpenBlock> {
        [self.exclusive.take(), self.free_form.take(), self.tagged.take()]
            .into_iter()
            .flatten()
            .collect()
    }

    pub fn exclusive(&self) -> Option<&OpenBlock> {
        self.exclusive.as_ref()
    }

    pub fn free_form(&self) -> Option<&OpenBlock> {
        self.free_form.as_ref()
    }

    pub fn tagged(&self) -> Option<&OpenBlock> {
        self.tagged.as_ref()
    }

}

#[cfg(test)]
impl BlockState {
    fn is_open(&self, kind: BlockKind) -> bool {
        [self.exclusive, self.free_form, self.tagged]
            .iter()
            .flatten()
            .any(|b| b.kind == kind)
    }

    fn open_count(&self) -> usize {
        [self.exclusive, self.free_form, self.tagged].iter().flatten().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(kind: BlockKind, id: u32) -> OpenBlock {
        OpenBlock {
            kind,
            id: BlockId(id),
            opened_at: id as usize,
            anchor: None,
        }
    }

    #[test]
    fn test_every_kind_has_a_family() {
        assert_eq!(BlockKind::Config.family(), Family::Exclusive);
        assert_eq!(BlockKind::GitInfo.family(), Family::FreeForm);
        assert_eq!(BlockKind::MeshPoints.family(), Family::Tagged);
        assert_eq!(BlockKind::ArgsSpan.family(), Family::Inline);
    }

    #[test]
    fn test_coexistence_table() {
        assert!(may_coexist(Family::FreeForm, Family::Tagged));
        assert!(may_coexist(Family::Tagged, Family::FreeForm));
        assert!(!may_coexist(Family::Tagged, Family::Tagged));
        assert!(!may_coexist(Family::Exclusive, Family::Tagged));
        assert!(!may_coexist(Family::FreeForm, Family::Exclusive));
        assert!(may_coexist(Family::FreeForm, Family::Inline));
    }

    #[test]
    fn test_free_form_and_tagged_stay_open_together() {
        let mut state = BlockState::new();
        assert!(state.open(block(BlockKind::Traceback, 1)).is_empty());
        assert!(state.open(block(BlockKind::Sent, 2)).is_empty());
        assert_eq!(state.open_count(), 2);
    }

    #[test]
    fn test_new_tagged_kind_displaces_previous() {
        let mut state = BlockState::new();
        state.open(block(BlockKind::Sent, 1));
        let displaced = state.open(block(BlockKind::Receive, 2));
        assert_eq!(displaced, vec![block(BlockKind::Sent, 1)]);
        assert!(state.is_open(BlockKind::Receive));
    }

    #[test]
    fn test_config_closes_everything_else() {
        let mut state = BlockState::new();
        state.open(block(BlockKind::GitInfo, 1));
        state.open(block(BlockKind::Webhooks, 2));
        let displaced = state.open(block(BlockKind::Config, 3));
        assert_eq!(displaced.len(), 2);
        assert_eq!(state.open_count(), 1);
        assert_eq!(state.exclusive().map(|b| b.kind), Some(BlockKind::Config));
    }

    #[test]
    fn test_inline_is_not_recorded() {
        let mut state = BlockState::new();
        state.open(block(BlockKind::Sent, 1));
        assert!(state.open(block(BlockKind::ArgsSpan, 2)).is_empty());
        assert_eq!(state.open_count(), 1);
    }

    #[test]
    fn test_close_all_drains() {
        let mut state = BlockState::new();
        state.open(block(BlockKind::Traceback, 1));
        state.open(block(BlockKind::Sent, 2));
        assert_eq!(state.close_all().len(), 2);
        assert_eq!(state.open_count(), 0);
    }
}
