//! Per-mip texture layout tracking.
//!
//! Every texture carries a [`LayoutTracker`]. Transitions hand back the
//! layouts they replaced as [`LayoutChange`] runs, which is exactly what a
//! backend needs to build image barriers. Callers that know what layout they
//! expect use [`LayoutTracker::transition_from`] and get
//! [`Error::LayoutMismatch`] instead of a silently wrong barrier.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::types::TextureLayout;

/// A run of consecutive mips that moved from one layout to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutChange {
    pub mips: Range<u32>,
    pub old: TextureLayout,
    pub new: TextureLayout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutTracker {
    mips: Vec<TextureLayout>,
}

impl LayoutTracker {
    pub fn new(mip_level_count: u32, initial: TextureLayout) -> Self {
        Self {
            mips: vec![initial; mip_level_count.max(1) as usize],
        }
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mips.len() as u32
    }

    pub fn get(&self, mip: u32) -> Option<TextureLayout> {
        self.mips.get(mip as usize).copied()
    }

    /// The layout shared by every mip, if they all agree.
    pub fn uniform(&self) -> Option<TextureLayout> {
        let first = self.mips[0];
        self.mips.iter().all(|l| *l == first).then_some(first)
    }

    /// Layout reported for the texture as a whole: the shared layout, or
    /// mip 0's when mips disagree.
    pub fn current(&self) -> TextureLayout {
        self.uniform().unwrap_or(self.mips[0])
    }

    fn clamp(&self, mips: Range<u32>) -> Range<u32> {
        let end = mips.end.min(self.mip_level_count());
        mips.start.min(end)..end
    }

    /// Move `mips` to `new`, returning the replaced layouts grouped into
    /// runs. Mips already in `new` produce no change.
    pub fn transition(
        &mut self,
        mips: Range<u32>,
        new: TextureLayout,
    ) -> Vec<LayoutChange> {
        let mut changes: Vec<LayoutChange> = Vec::new();
        for mip in self.clamp(mips) {
            let old = std::mem::replace(&mut self.mips[mip as usize], new);
            if old == new {
                continue;
            }
            match changes.last_mut() {
                Some(last) if last.old == old && last.mips.end == mip => {
                    last.mips.end = mip + 1;
                }
                _ => changes.push(LayoutChange {
                    mips: mip..mip + 1,
                    old,
                    new,
                }),
            }
        }
        changes
    }

    /// Like [`LayoutTracker::transition`], but first checks every mip in
    /// range is in `expected`. [`TextureLayout::Undefined`] as `expected`
    /// discards contents and is accepted from any layout.
    pub fn transition_from(
        &mut self,
        mips: Range<u32>,
        expected: TextureLayout,
        new: TextureLayout,
    ) -> Result<Vec<LayoutChange>> {
        let mips = self.clamp(mips);
        if expected != TextureLayout::Undefined {
            for mip in mips.clone() {
                let actual = self.mips[mip as usize];
                if actual != expected {
                    return Err(Error::LayoutMismatch {
                        mip_level: mip,
                        expected,
                        actual,
                    });
                }
            }
        }
        let mut changes = self.transition(mips, new);
        if expected == TextureLayout::Undefined {
            for change in &mut changes {
                change.old = TextureLayout::Undefined;
            }
        }
        Ok(changes)
    }

    /// Overwrite the tracked layout without producing a change, for layouts
    /// reached implicitly (render pass final layouts, presentation).
    pub fn assume(&mut self, mips: Range<u32>, layout: TextureLayout) {
        for mip in self.clamp(mips) {
            self.mips[mip as usize] = layout;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_reports_runs() {
        let mut tracker = LayoutTracker::new(4, TextureLayout::Undefined);
        tracker.transition(1..2, TextureLayout::TransferSrc);

        let changes = tracker.transition(0..4, TextureLayout::ShaderReadOnly);
        assert_eq!(
            changes,
            vec![
                LayoutChange {
                    mips: 0..1,
                    old: TextureLayout::Undefined,
                    new: TextureLayout::ShaderReadOnly,
                },
                LayoutChange {
                    mips: 1..2,
                    old: TextureLayout::TransferSrc,
                    new: TextureLayout::ShaderReadOnly,
                },
                LayoutChange {
                    mips: 2..4,
                    old: TextureLayout::Undefined,
                    new: TextureLayout::ShaderReadOnly,
                },
            ]
        );
        assert_eq!(tracker.uniform(), Some(TextureLayout::ShaderReadOnly));
    }

    #[test]
    fn noop_transition_is_empty() {
        let mut tracker = LayoutTracker::new(2, TextureLayout::General);
        assert!(tracker.transition(0..2, TextureLayout::General).is_empty());
    }

    #[test]
    fn expected_layout_is_checked() {
        let mut tracker = LayoutTracker::new(3, TextureLayout::TransferDst);
        let err = tracker
            .transition_from(
                0..3,
                TextureLayout::ColorAttachment,
                TextureLayout::ShaderReadOnly,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LayoutMismatch {
                mip_level: 0,
                expected: TextureLayout::ColorAttachment,
                actual: TextureLayout::TransferDst,
            }
        ));
        // Failed check leaves state untouched.
        assert_eq!(tracker.uniform(), Some(TextureLayout::TransferDst));
    }

    #[test]
    fn undefined_expected_discards() {
        let mut tracker = LayoutTracker::new(2, TextureLayout::ShaderReadOnly);
        let changes = tracker
            .transition_from(
                0..2,
                TextureLayout::Undefined,
                TextureLayout::TransferDst,
            )
            .unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old, TextureLayout::Undefined);
        assert_eq!(tracker.get(1), Some(TextureLayout::TransferDst));
    }

    #[test]
    fn out_of_range_mips_are_clamped() {
        let mut tracker = LayoutTracker::new(2, TextureLayout::Undefined);
        let changes = tracker.transition(1..9, TextureLayout::General);
        assert_eq!(changes[0].mips, 1..2);
        assert_eq!(tracker.get(5), None);
        assert_eq!(tracker.current(), TextureLayout::Undefined);
    }
}
