//! Update priorities.
//!
//! A `Lane` is a single bit; `Lanes` is any set of them. Lower bits are more
//! urgent, so the highest-priority lane of a set is its lowest set bit.

use bitflags::bitflags;

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Lanes: u32 {
        const SYNC             = 0b00001;
        const INPUT_CONTINUOUS = 0b00010;
        const DEFAULT          = 0b00100;
        const TRANSITION       = 0b01000;
        const IDLE             = 0b10000;
    }
}

/// A single-bit member of [`Lanes`]. `Lane::NONE` (no bit) is included in
/// every filter.
pub type Lane = Lanes;

impl Lanes {
    pub const NONE: Lanes = Lanes::empty();

    /// Lowest set bit, i.e. the most urgent lane of the set.
    pub fn highest_priority(self) -> Lane {
        let bits = self.bits();
        Lanes::from_bits_truncate(bits & bits.wrapping_neg())
    }
}

pub fn merge_lanes(a: Lanes, b: Lanes) -> Lanes {
    a | b
}

/// `true` when `subset` is eligible under the render filter `set`.
pub fn is_subset_of_lanes(set: Lanes, subset: Lanes) -> bool {
    set.contains(subset)
}

pub fn highest_priority_lane(lanes: Lanes) -> Lane {
    lanes.highest_priority()
}

/// Scheduler-side priority levels. Ordering follows urgency:
/// `Immediate < UserBlocking < ... < Idle`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchedulerPriority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

impl SchedulerPriority {
    /// How long a task of this priority may be starved before it is run
    /// without yielding. `None` never expires.
    pub fn timeout(self) -> Option<std::time::Duration> {
        use std::time::Duration;
        match self {
            SchedulerPriority::Immediate => Some(Duration::ZERO),
            SchedulerPriority::UserBlocking => Some(Duration::from_millis(250)),
            SchedulerPriority::Normal => Some(Duration::from_millis(5000)),
            SchedulerPriority::Low => Some(Duration::from_millis(10000)),
            SchedulerPriority::Idle => None,
        }
    }
}

pub fn lanes_to_scheduler_priority(lanes: Lanes) -> SchedulerPriority {
    let lane = lanes.highest_priority();
    if lane == Lanes::SYNC {
        SchedulerPriority::Immediate
    } else if lane == Lanes::INPUT_CONTINUOUS {
        SchedulerPriority::UserBlocking
    } else if lane == Lanes::DEFAULT {
        SchedulerPriority::Normal
    } else if lane == Lanes::TRANSITION {
        SchedulerPriority::Low
    } else {
        SchedulerPriority::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highest_priority_is_lowest_bit() {
        let set = Lanes::DEFAULT | Lanes::TRANSITION | Lanes::SYNC;
        assert_eq!(set.highest_priority(), Lanes::SYNC);
        assert_eq!((Lanes::DEFAULT | Lanes::IDLE).highest_priority(), Lanes::DEFAULT);
        assert_eq!(Lanes::NONE.highest_priority(), Lanes::NONE);
    }

    #[test]
    fn no_lane_is_always_included() {
        assert!(is_subset_of_lanes(Lanes::SYNC, Lanes::NONE));
        assert!(is_subset_of_lanes(Lanes::DEFAULT, Lanes::DEFAULT));
        assert!(!is_subset_of_lanes(Lanes::SYNC, Lanes::DEFAULT));
    }

    #[test]
    fn lane_to_priority() {
        assert_eq!(
            lanes_to_scheduler_priority(Lanes::SYNC | Lanes::DEFAULT),
            SchedulerPriority::Immediate
        );
        assert_eq!(
            lanes_to_scheduler_priority(Lanes::TRANSITION),
            SchedulerPriority::Low
        );
        assert!(SchedulerPriority::Immediate < SchedulerPriority::Idle);
    }
}
