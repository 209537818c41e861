//! Side-effect flags carried by nodes and effect records.

bitflags::bitflags! {
    /// Work a node asks the commit phase to perform.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u32 {
        /// Insert (or move) the node's host content.
        const PLACEMENT = 1 << 0;
        /// Apply new props or text to the realized handle.
        const UPDATE = 1 << 1;
        /// `deletions` holds children to remove.
        const CHILD_DELETION = 1 << 2;
        /// Deferred effects must be (re)run.
        const PASSIVE = 1 << 3;
        /// The reference binding changed.
        const REF = 1 << 4;
        /// An offscreen subtree toggled between shown and hidden.
        const VISIBILITY = 1 << 5;
        /// A boundary captured a suspension or failure during this render.
        const DID_CAPTURE = 1 << 6;
        /// Set on a boundary during throw; turned into `DID_CAPTURE` by unwind.
        const SHOULD_CAPTURE = 1 << 12;
    }
}

/// Flags handled by the mutation pass.
pub const MUTATION_MASK: Flags =
    Flags::PLACEMENT.union(Flags::UPDATE).union(Flags::CHILD_DELETION).union(Flags::REF).union(Flags::VISIBILITY);

/// Flags handled after the tree swap.
pub const LAYOUT_MASK: Flags = Flags::REF;

/// Flags that queue deferred effects.
pub const PASSIVE_MASK: Flags = Flags::PASSIVE.union(Flags::CHILD_DELETION);

/// Flags preserved on a boundary when unwinding to it.
pub const HOST_EFFECT_MASK: Flags =
    MUTATION_MASK.union(LAYOUT_MASK).union(PASSIVE_MASK).union(Flags::DID_CAPTURE);

bitflags::bitflags! {
    /// Tag bits on an effect record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookFlags: u8 {
        /// Dependencies changed: run teardown then setup on the next flush.
        const HAS_EFFECT = 1 << 0;
        /// Deferred (post-commit) effect.
        const PASSIVE = 1 << 1;
    }
}
