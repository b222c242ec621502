use bitflags::bitflags;

bitflags! {
    /// Effects a work unit asks the commit phase to perform.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct Flags: u32 {
        /// Insert or move the unit's host nodes.
        const PLACEMENT      = 0b00001;
        const UPDATE         = 0b00010;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 0b00100;
        const PASSIVE_EFFECT = 0b01000;
        const REF            = 0b10000;
    }
}

impl Flags {
    pub const NONE: Flags = Flags::empty();
    pub const MUTATION_MASK: Flags = Flags::PLACEMENT
        .union(Flags::UPDATE)
        .union(Flags::CHILD_DELETION)
        .union(Flags::REF);
    pub const LAYOUT_MASK: Flags = Flags::REF;
    pub const PASSIVE_MASK: Flags = Flags::PASSIVE_EFFECT.union(Flags::CHILD_DELETION);
}

bitflags! {
    /// Tag on an effect record.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct HookFlags: u8 {
        const PASSIVE    = 0b01;
        /// Dependencies changed; the effect must re-run on the next flush.
        const HAS_EFFECT = 0b10;
    }
}
