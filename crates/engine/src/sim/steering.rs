use super::components::Velocity;
use super::config::NavigationTuning;
use super::world::{ComponentKind, ComponentSet, EntityStore, Query, Vec2};

const MIN_DIRECTION_LENGTH: f32 = 1e-6;

pub const STEERING_QUERY: Query = Query::new(
    ComponentSet::EMPTY
        .with(ComponentKind::NavPath)
        .with(ComponentKind::Position)
        .with(ComponentKind::MoveSpeed),
    ComponentSet::EMPTY,
);

/// Turns each NavPath into a Velocity toward its current waypoint. Arrived
/// paths are removed and leave the entity at rest.
pub(crate) fn run_steering(store: &mut EntityStore, tuning: &NavigationTuning, dt_seconds: f32) {
    for id in store.query(STEERING_QUERY) {
        if store.dead.contains(id) || store.downed.contains(id) {
            store.nav_paths.remove(id);
            store.velocities.insert(id, Velocity(Vec2::ZERO));
            continue;
        }
        let (Some(position), Some(speed)) = (store.position_of(id), store.move_speeds.get(id))
        else {
            continue;
        };
        let speed = speed.0
            * store
                .status_effects
                .get(id)
                .map(|statuses| statuses.speed_multiplier())
                .unwrap_or(1.0);

        let Some(path) = store.nav_paths.get_mut(id) else {
            continue;
        };
        while let Some(waypoint) = path.current_waypoint() {
            if position.distance(waypoint) > tuning.waypoint_arrival_distance {
                break;
            }
            path.advance_waypoint();
        }
        let Some(waypoint) = path.current_waypoint() else {
            store.nav_paths.remove(id);
            store.velocities.insert(id, Velocity(Vec2::ZERO));
            continue;
        };

        let offset = waypoint - position;
        let distance = offset.length();
        let direction = offset.normalized_or_zero(MIN_DIRECTION_LENGTH);
        // Never overshoot the waypoint in one step.
        let step_speed = if dt_seconds > 0.0 && speed * dt_seconds > distance {
            distance / dt_seconds
        } else {
            speed
        };
        store
            .velocities
            .insert(id, Velocity(direction * step_speed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::components::{Downed, Faction, NavPath, StatusEffectSpec, StatusKind};
    use crate::sim::test_support::spawn_fighter;

    #[test]
    fn velocity_points_at_current_waypoint() {
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 5, 0);
        store.nav_paths.insert(
            id,
            NavPath::new(Vec2::new(5.5, 1.5), vec![Vec2::new(5.5, 1.5)]),
        );

        run_steering(&mut store, &NavigationTuning::default(), 0.1);

        let velocity = store.velocities.get(id).expect("velocity").0;
        assert!((velocity.x - 4.0).abs() < 1e-5);
        assert!(velocity.y.abs() < 1e-5);
    }

    #[test]
    fn final_step_is_scaled_to_land_on_waypoint() {
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 5, 0);
        store.nav_paths.insert(
            id,
            NavPath::new(Vec2::new(1.7, 1.5), vec![Vec2::new(1.7, 1.5)]),
        );

        run_steering(&mut store, &NavigationTuning::default(), 0.1);

        let velocity = store.velocities.get(id).expect("velocity").0;
        assert!((velocity.x * 0.1 - 0.2).abs() < 1e-4);
    }

    #[test]
    fn arrival_removes_path_and_stops() {
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 5, 0);
        store.velocities.insert(id, Velocity(Vec2::new(3.0, 0.0)));
        store.nav_paths.insert(
            id,
            NavPath::new(Vec2::new(1.55, 1.5), vec![Vec2::new(1.55, 1.5)]),
        );

        run_steering(&mut store, &NavigationTuning::default(), 0.1);

        assert!(store.nav_paths.get(id).is_none());
        assert_eq!(store.velocities.get(id).map(|v| v.0), Some(Vec2::ZERO));
    }

    #[test]
    fn rooted_entity_keeps_path_but_does_not_move() {
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 5, 0);
        store
            .status_effects
            .get_mut(id)
            .expect("statuses")
            .apply(
                StatusEffectSpec {
                    kind: StatusKind::Root,
                    duration: 1.0,
                    magnitude: 0.0,
                },
                None,
            );
        store.nav_paths.insert(
            id,
            NavPath::new(Vec2::new(5.5, 1.5), vec![Vec2::new(5.5, 1.5)]),
        );

        run_steering(&mut store, &NavigationTuning::default(), 0.1);

        assert!(store.nav_paths.get(id).is_some());
        assert_eq!(store.velocities.get(id).map(|v| v.0), Some(Vec2::ZERO));
    }

    #[test]
    fn downed_entity_loses_its_path() {
        let mut store = EntityStore::default();
        let id = spawn_fighter(&mut store, Vec2::new(1.5, 1.5), Faction::Party, 5, 0);
        store.downed.insert(id, Downed::default());
        store.nav_paths.insert(
            id,
            NavPath::new(Vec2::new(5.5, 1.5), vec![Vec2::new(5.5, 1.5)]),
        );

        run_steering(&mut store, &NavigationTuning::default(), 0.1);

        assert!(store.nav_paths.get(id).is_none());
    }
}
