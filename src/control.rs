// ==============================================================================
// control.rs - FOLLOW SELECTION SHARED WITH SPECTATOR CONNECTIONS
// ------------------------------------------------------------------------------
// One AtomicU64 holds both halves of the selection:
//   bits 0..32  selected racer id
//   bit  32     auto-follow flag
// Writers and the tick loop each touch the word exactly once per operation, so
// "new selection" and "auto-follow off" are always observed together.
// ==============================================================================

use std::sync::atomic::{AtomicU64, Ordering};

const AUTO_FOLLOW_BIT: u64 = 1 << 32;
const SELECTED_MASK: u64 = AUTO_FOLLOW_BIT - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowSelection {
    pub selected: usize,
    pub auto_follow: bool,
}

impl FollowSelection {
    fn pack(self) -> u64 {
        let selected = (self.selected as u64).min(SELECTED_MASK);
        if self.auto_follow {
            selected | AUTO_FOLLOW_BIT
        } else {
            selected
        }
    }

    fn unpack(word: u64) -> Self {
        Self {
            selected: (word & SELECTED_MASK) as usize,
            auto_follow: word & AUTO_FOLLOW_BIT != 0,
        }
    }
}

impl Default for FollowSelection {
    fn default() -> Self {
        Self {
            selected: 0,
            auto_follow: true,
        }
    }
}

#[derive(Debug)]
pub struct FollowControl {
    word: AtomicU64,
}

impl FollowControl {
    pub fn new() -> Self {
        Self {
            word: AtomicU64::new(FollowSelection::default().pack()),
        }
    }

    /// Read once at the start of a tick.
    pub fn load(&self) -> FollowSelection {
        FollowSelection::unpack(self.word.load(Ordering::Acquire))
    }

    /// Pin a racer (turns auto-follow off).
    pub fn select_racer(&self, id: usize) {
        let next = FollowSelection {
            selected: id,
            auto_follow: false,
        };
        self.word.store(next.pack(), Ordering::Release);
    }

    pub fn set_auto_follow(&self, enabled: bool) {
        // never fails: the closure always returns Some
        let _ = self
            .word
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some(if enabled {
                    word | AUTO_FOLLOW_BIT
                } else {
                    word & !AUTO_FOLLOW_BIT
                })
            });
    }

    /// Back to automatic leader tracking from racer 0.
    pub fn follow_leader(&self) {
        self.word
            .store(FollowSelection::default().pack(), Ordering::Release);
    }
}

impl Default for FollowControl {
    fn default() -> Self {
        Self::new()
    }
}
