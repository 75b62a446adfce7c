//! Target Set
//!
//! The explicit targets supplied by a cast's initiator. The set is mutable
//! throughout the Action's life: the resolver corrects incompatible explicit
//! targets, channel handoff rewrites the unit target, and entity-relative
//! locations are re-evaluated at every access because the referenced entity
//! keeps moving underneath the in-flight cast.

use bevy::prelude::*;

use crate::world::unit::ItemId;

/// Bits recording which parts of a target set are populated.
pub mod target_flags {
    pub const UNIT: u32 = 1 << 0;
    pub const ITEM: u32 = 1 << 1;
    pub const GAME_OBJECT: u32 = 1 << 2;
    pub const SOURCE_LOCATION: u32 = 1 << 3;
    pub const DEST_LOCATION: u32 = 1 << 4;
    pub const TRAJECTORY: u32 = 1 << 5;
}

/// A world position that is either fixed or pinned to an entity (and thus
/// re-evaluated every time it is read).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SpellLocation {
    Fixed(Vec3),
    Relative { entity: Entity, offset: Vec3 },
}

impl SpellLocation {
    /// Resolve to a concrete position. Entity-relative locations return None
    /// once the anchor entity is gone.
    pub fn resolve(&self, lookup: &dyn Fn(Entity) -> Option<Vec3>) -> Option<Vec3> {
        match self {
            SpellLocation::Fixed(pos) => Some(*pos),
            SpellLocation::Relative { entity, offset } => {
                lookup(*entity).map(|pos| pos + *offset)
            }
        }
    }
}

/// Launch parameters for trajectory (missile-arc) spells.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Trajectory {
    /// Launch elevation angle in radians.
    pub elevation: f32,
    /// Launch speed in units/second.
    pub speed: f32,
}

/// The explicit targets of one cast.
#[derive(Clone, Debug, Default)]
pub struct SpellTargets {
    mask: u32,
    unit: Option<Entity>,
    item: Option<(Entity, ItemId)>,
    game_object: Option<Entity>,
    source: Option<SpellLocation>,
    dest: Option<SpellLocation>,
    trajectory: Option<Trajectory>,
}

impl SpellTargets {
    pub fn mask(&self) -> u32 {
        self.mask
    }

    pub fn has(&self, flag: u32) -> bool {
        self.mask & flag != 0
    }

    pub fn unit(&self) -> Option<Entity> {
        self.unit
    }

    pub fn set_unit(&mut self, unit: Entity) {
        self.unit = Some(unit);
        self.mask |= target_flags::UNIT;
    }

    pub fn clear_unit(&mut self) {
        self.unit = None;
        self.mask &= !target_flags::UNIT;
    }

    /// Item target: the owning entity plus the item id inside its inventory.
    pub fn item(&self) -> Option<(Entity, ItemId)> {
        self.item
    }

    pub fn set_item(&mut self, owner: Entity, item: ItemId) {
        self.item = Some((owner, item));
        self.mask |= target_flags::ITEM;
    }

    pub fn game_object(&self) -> Option<Entity> {
        self.game_object
    }

    pub fn set_game_object(&mut self, object: Entity) {
        self.game_object = Some(object);
        self.mask |= target_flags::GAME_OBJECT;
    }

    pub fn clear_game_object(&mut self) {
        self.game_object = None;
        self.mask &= !target_flags::GAME_OBJECT;
    }

    pub fn source(&self) -> Option<&SpellLocation> {
        self.source.as_ref()
    }

    pub fn set_source(&mut self, location: SpellLocation) {
        self.source = Some(location);
        self.mask |= target_flags::SOURCE_LOCATION;
    }

    pub fn dest(&self) -> Option<&SpellLocation> {
        self.dest.as_ref()
    }

    pub fn set_dest(&mut self, location: SpellLocation) {
        self.dest = Some(location);
        self.mask |= target_flags::DEST_LOCATION;
    }

    pub fn trajectory(&self) -> Option<Trajectory> {
        self.trajectory
    }

    pub fn set_trajectory(&mut self, trajectory: Trajectory) {
        self.trajectory = Some(trajectory);
        self.mask |= target_flags::TRAJECTORY;
    }

    /// Convenience constructor for the common single-unit cast.
    pub fn on_unit(unit: Entity) -> Self {
        let mut targets = Self::default();
        targets.set_unit(unit);
        targets
    }

    /// Convenience constructor for a destination cast.
    pub fn at_dest(dest: Vec3) -> Self {
        let mut targets = Self::default();
        targets.set_dest(SpellLocation::Fixed(dest));
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_tracks_population() {
        let mut targets = SpellTargets::default();
        assert_eq!(targets.mask(), 0);

        targets.set_unit(Entity::from_raw(1));
        assert!(targets.has(target_flags::UNIT));

        targets.set_dest(SpellLocation::Fixed(Vec3::ZERO));
        assert!(targets.has(target_flags::DEST_LOCATION));

        targets.clear_unit();
        assert!(!targets.has(target_flags::UNIT));
        assert!(targets.has(target_flags::DEST_LOCATION));
    }

    #[test]
    fn test_relative_location_follows_entity() {
        let anchor = Entity::from_raw(5);
        let location = SpellLocation::Relative {
            entity: anchor,
            offset: Vec3::new(0.0, 0.0, 1.0),
        };

        let at_origin = |e: Entity| {
            if e == anchor {
                Some(Vec3::new(3.0, 0.0, 0.0))
            } else {
                None
            }
        };
        assert_eq!(
            location.resolve(&at_origin),
            Some(Vec3::new(3.0, 0.0, 1.0))
        );

        // Anchor left the world: the location no longer resolves.
        let gone = |_: Entity| None;
        assert_eq!(location.resolve(&gone), None);
    }
}
