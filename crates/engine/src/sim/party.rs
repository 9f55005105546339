use super::components::Faction;
use super::world::{EntityId, EntityStore, Vec2};

/// Party-wide bookkeeping that is not a component of any one entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartyState {
    /// The player-controlled member. AI skips it; allies follow it.
    pub leader: Option<EntityId>,
    /// Fallback destination for party members the sanity pass cannot place.
    pub spawn_point: Vec2,
    pub wipe_cooldown: f32,
}

impl PartyState {
    pub fn new(spawn_point: Vec2) -> Self {
        Self {
            leader: None,
            spawn_point,
            wipe_cooldown: 0.0,
        }
    }

    /// Leader id, if it still resolves and is not dead or downed.
    pub fn standing_leader(&self, store: &EntityStore) -> Option<EntityId> {
        self.leader.filter(|leader| store.is_standing(*leader))
    }
}

/// Live party members with health, in slot order. Includes downed members.
pub fn party_members(store: &EntityStore) -> Vec<EntityId> {
    store
        .factions
        .iter()
        .filter(|(id, faction)| {
            **faction == Faction::Party
                && store.is_alive(*id)
                && store.healths.contains(*id)
                && !store.dead.contains(*id)
        })
        .map(|(id, _)| id)
        .collect()
}
