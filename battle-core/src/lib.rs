//! Core battle engine: creatures, effects, the field and its event stream.
//!
//! The main entry point is [`sim::field::Field`]; the network layer drives
//! it one round at a time and observes it through [`events::EventSink`].

pub mod data;
pub mod dex;
pub mod events;
pub mod mechanics;
pub mod sim;
pub mod testkit;

/// Commonly used exports for external consumers.
pub mod prelude {
    pub use crate::dex::{CreatureSpec, Dex, DexRef, Gender, MoveCategory, TargetClass};
    pub use crate::events::{BattleEvent, Delivery, EventSink, NullSink, RecordingSink};
    pub use crate::mechanics::Generation;
    pub use crate::sim::field::{Field, TurnOrder, TEAM_COUNT};
    pub use crate::sim::{Creature, CreatureId};
}
