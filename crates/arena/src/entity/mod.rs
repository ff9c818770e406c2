//! Arena entities.
//!
//! Players own their body segments. Food is placed by the spawner and
//! destroyed when eaten. Every entity records the tick it last changed in
//! `version`, which the synchronizer diffs against.

mod food;
mod player;

pub use food::{Food, FoodArchetype};
pub use player::{Cosmetic, Player, Segment};

/// Player id, one per connection.
pub type PlayerId = u32;
/// Food id, allocated by the store.
pub type FoodId = u32;

/// Id of any entity in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityId {
    Player(PlayerId),
    Food(FoodId),
}

impl EntityId {
    pub fn key(self) -> protocol::packets::EntityKey {
        use protocol::EntityKind;
        match self {
            EntityId::Player(id) => protocol::packets::EntityKey {
                kind: EntityKind::Player,
                id,
            },
            EntityId::Food(id) => protocol::packets::EntityKey {
                kind: EntityKind::Food,
                id,
            },
        }
    }
}

/// Borrowed view of a stored entity.
#[derive(Debug, Clone, Copy)]
pub enum EntityRef<'a> {
    Player(&'a Player),
    Food(&'a Food),
}

impl EntityRef<'_> {
    pub fn version(&self) -> u64 {
        match self {
            EntityRef::Player(p) => p.version,
            EntityRef::Food(f) => f.version,
        }
    }
}
