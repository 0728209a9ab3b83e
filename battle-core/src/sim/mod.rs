pub mod creature;
pub mod effect;
pub mod effects;
pub mod field;
pub mod moves;

pub use creature::Creature;
pub use field::{Field, TurnOrder};

/// Stable handle to a creature in the field's arena: party index and
/// position within that party's roster. Effects and events refer to
/// creatures exclusively through these, never through references.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CreatureId {
    pub party: usize,
    pub index: usize,
}

impl CreatureId {
    pub fn new(party: usize, index: usize) -> Self {
        Self { party, index }
    }
}
