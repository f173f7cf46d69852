//! Ballistic projectiles.
//!
//! A projectile is launched on a constant-gravity arc toward a fixed
//! target point and carries an area-damage payload. Each tick it either
//! stays in flight, arrives (passes within the arrival distance of its
//! target during the tick) or expires after its maximum lifetime.
//!
//! The tracker only moves projectiles. Applying the payload is left to the
//! caller, which owns the directory and grid.

use serde::{Deserialize, Serialize};

use crate::combat::AreaDamage;
use crate::components::{DamageType, TeamId};
use crate::config::EngineConfig;
use crate::math::{fixed_serde, fixed_sqrt, Fixed, Vec3Fixed};

/// Identifier of a projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectileId(pub u64);

/// Damage carried by a projectile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectilePayload {
    /// Base damage.
    #[serde(with = "fixed_serde")]
    pub damage: Fixed,
    /// Blast radius on arrival.
    #[serde(with = "fixed_serde")]
    pub aoe_radius: Fixed,
    /// Damage classification.
    pub damage_type: DamageType,
    /// Team of the shooter.
    pub team: TeamId,
}

impl Default for ProjectilePayload {
    fn default() -> Self {
        Self {
            damage: Fixed::from_num(10),
            aoe_radius: Fixed::from_num(10),
            damage_type: DamageType::Normal,
            team: TeamId::NEUTRAL,
        }
    }
}

/// A projectile in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Projectile {
    /// Identifier.
    pub id: ProjectileId,
    /// Current position.
    pub position: Vec3Fixed,
    /// Current velocity.
    pub velocity: Vec3Fixed,
    /// Point the projectile is flying toward.
    pub target: Vec3Fixed,
    /// Damage delivered on arrival.
    pub payload: ProjectilePayload,
    /// Seconds since launch.
    #[serde(with = "fixed_serde")]
    pub age: Fixed,
}

/// What happened to a projectile that left flight this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectileEvent {
    /// Reached its target; the payload should be applied.
    Arrived {
        /// Projectile that arrived.
        id: ProjectileId,
        /// Area strike to resolve.
        strike: AreaDamage,
    },
    /// Flew past its maximum lifetime without arriving.
    Expired {
        /// Projectile that expired.
        id: ProjectileId,
        /// Where it was when it expired.
        position: Vec3Fixed,
    },
}

/// Flight constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ballistics {
    /// Downward acceleration.
    pub gravity: Fixed,
    /// Fraction of velocity lost per second.
    pub drag: Fixed,
    /// Arrival distance.
    pub arrival_epsilon: Fixed,
    /// Maximum flight time.
    pub max_lifetime: Fixed,
}

impl Ballistics {
    /// Flight constants from an engine config.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            gravity: config.projectile_gravity,
            drag: config.projectile_drag,
            arrival_epsilon: config.projectile_arrival_epsilon,
            max_lifetime: config.projectile_max_lifetime,
        }
    }
}

impl Default for Ballistics {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// Launch velocity for an arc from `origin` to `target` under `gravity`.
///
/// The horizontal component moves at `speed`; the vertical component is
/// whatever makes the arc land on the target. Purely vertical shots use
/// `speed` along the vertical distance to set the flight time. Returns
/// `None` for a non-positive speed.
#[must_use]
pub fn launch_velocity(
    origin: Vec3Fixed,
    target: Vec3Fixed,
    speed: Fixed,
    gravity: Fixed,
) -> Option<Vec3Fixed> {
    if speed <= Fixed::ZERO {
        return None;
    }

    let dx = target.x.saturating_sub(origin.x);
    let dy = target.y.saturating_sub(origin.y);
    let dz = target.z.saturating_sub(origin.z);
    let horizontal = fixed_sqrt(dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy)));

    let flight_time = horizontal.max(dz.saturating_abs()).saturating_div(speed);
    if flight_time == Fixed::ZERO {
        return Some(Vec3Fixed::ZERO);
    }

    let lift = gravity.saturating_mul(flight_time) / 2;
    Some(Vec3Fixed::new(
        dx / flight_time,
        dy / flight_time,
        (dz / flight_time).saturating_add(lift),
    ))
}

/// All projectiles currently in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectileTracker {
    projectiles: Vec<Projectile>,
    next_id: u64,
}

impl ProjectileTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch a projectile from `origin` toward `target`.
    ///
    /// Returns `None` if no arc exists (non-positive speed).
    pub fn launch(
        &mut self,
        origin: Vec3Fixed,
        target: Vec3Fixed,
        speed: Fixed,
        payload: ProjectilePayload,
        gravity: Fixed,
    ) -> Option<ProjectileId> {
        let velocity = launch_velocity(origin, target, speed, gravity)?;
        let id = ProjectileId(self.next_id);
        self.next_id += 1;

        self.projectiles.push(Projectile {
            id,
            position: origin,
            velocity,
            target,
            payload,
            age: Fixed::ZERO,
        });
        Some(id)
    }

    /// Advance every projectile by `dt` seconds.
    ///
    /// Returns an event for each projectile that arrived or expired; those
    /// projectiles are removed. Events are in launch order.
    pub fn advance(&mut self, dt: Fixed, ballistics: &Ballistics) -> Vec<ProjectileEvent> {
        let dt = dt.max(Fixed::ZERO);
        let damping = (Fixed::ONE - ballistics.drag.saturating_mul(dt)).max(Fixed::ZERO);
        let fall = ballistics.gravity.saturating_mul(dt).saturating_mul(dt) / 2;
        let epsilon_sq = ballistics
            .arrival_epsilon
            .saturating_mul(ballistics.arrival_epsilon);

        let mut events = Vec::new();
        self.projectiles.retain_mut(|projectile| {
            let start = projectile.position;
            projectile.velocity = projectile.velocity.scale(damping);

            let mut end = start + projectile.velocity.scale(dt);
            end.z = end.z.saturating_sub(fall);
            projectile.velocity.z = projectile
                .velocity
                .z
                .saturating_sub(ballistics.gravity.saturating_mul(dt));
            projectile.position = end;
            projectile.age = projectile.age.saturating_add(dt);

            let closest = start.closest_point_on_segment(end, projectile.target);
            if closest.distance_squared(projectile.target) <= epsilon_sq {
                events.push(ProjectileEvent::Arrived {
                    id: projectile.id,
                    strike: AreaDamage {
                        center: closest,
                        radius: projectile.payload.aoe_radius,
                        amount: projectile.payload.damage,
                        damage_type: projectile.payload.damage_type,
                        own_team: projectile.payload.team,
                    },
                });
                return false;
            }

            if projectile.age >= ballistics.max_lifetime {
                events.push(ProjectileEvent::Expired {
                    id: projectile.id,
                    position: end,
                });
                return false;
            }

            true
        });

        events
    }

    /// Look up a projectile in flight.
    #[must_use]
    pub fn get(&self, id: ProjectileId) -> Option<&Projectile> {
        self.projectiles.iter().find(|p| p.id == id)
    }

    /// Projectiles in flight, in launch order.
    pub fn iter(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.iter()
    }

    /// Number of projectiles in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    /// Whether nothing is in flight.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(n: f64) -> Fixed {
        Fixed::from_num(n)
    }

    fn fly(
        tracker: &mut ProjectileTracker,
        ballistics: &Ballistics,
        dt: Fixed,
        max_ticks: usize,
    ) -> Vec<ProjectileEvent> {
        for _ in 0..max_ticks {
            let events = tracker.advance(dt, ballistics);
            if !events.is_empty() {
                return events;
            }
        }
        Vec::new()
    }

    #[test]
    fn test_launch_rejects_non_positive_speed() {
        let mut tracker = ProjectileTracker::new();
        let id = tracker.launch(
            Vec3Fixed::ZERO,
            Vec3Fixed::from_ints(100, 0, 0),
            Fixed::ZERO,
            ProjectilePayload::default(),
            fx(980.0),
        );
        assert!(id.is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_projectile_arrives_and_carries_payload() {
        let mut tracker = ProjectileTracker::new();
        let payload = ProjectilePayload {
            damage: fx(25.0),
            aoe_radius: fx(150.0),
            damage_type: DamageType::Blunt,
            team: TeamId(2),
        };
        let target = Vec3Fixed::from_ints(1200, 300, 0);
        let id = tracker
            .launch(Vec3Fixed::from_ints(0, 0, 180), target, fx(800.0), payload, fx(980.0))
            .unwrap();

        let events = fly(&mut tracker, &Ballistics::default(), fx(0.05), 200);
        assert_eq!(events.len(), 1);
        match events[0] {
            ProjectileEvent::Arrived { id: arrived, strike } => {
                assert_eq!(arrived, id);
                assert!(strike.center.distance_squared(target) <= fx(900.0));
                assert_eq!(strike.amount, fx(25.0));
                assert_eq!(strike.radius, fx(150.0));
                assert_eq!(strike.damage_type, DamageType::Blunt);
                assert_eq!(strike.own_team, TeamId(2));
            }
            ref other => panic!("expected arrival, got {other:?}"),
        }
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_fast_projectile_does_not_tunnel() {
        let mut tracker = ProjectileTracker::new();
        tracker.launch(
            Vec3Fixed::ZERO,
            Vec3Fixed::from_ints(3000, 0, 0),
            fx(5000.0),
            ProjectilePayload::default(),
            fx(980.0),
        );
        // 500 units per tick, far more than the arrival distance.
        let events = fly(&mut tracker, &Ballistics::default(), fx(0.1), 20);
        assert!(matches!(events.first(), Some(ProjectileEvent::Arrived { .. })));
    }

    #[test]
    fn test_unreachable_projectile_expires() {
        let mut tracker = ProjectileTracker::new();
        let id = tracker
            .launch(
                Vec3Fixed::ZERO,
                Vec3Fixed::from_ints(1000, 0, 0),
                fx(500.0),
                ProjectilePayload::default(),
                fx(980.0),
            )
            .unwrap();
        // Flying under much stronger gravity than it was aimed for.
        let ballistics = Ballistics {
            gravity: fx(5000.0),
            max_lifetime: fx(3.0),
            ..Ballistics::default()
        };

        let events = fly(&mut tracker, &ballistics, fx(0.1), 100);
        assert!(matches!(
            events.first(),
            Some(ProjectileEvent::Expired { id: expired, .. }) if *expired == id
        ));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_zero_distance_arrives_immediately() {
        let mut tracker = ProjectileTracker::new();
        let here = Vec3Fixed::from_ints(5, 5, 5);
        tracker.launch(here, here, fx(100.0), ProjectilePayload::default(), fx(980.0));
        let events = tracker.advance(fx(0.05), &Ballistics::default());
        assert!(matches!(events.first(), Some(ProjectileEvent::Arrived { .. })));
    }

    #[test]
    fn test_ids_are_sequential() {
        let mut tracker = ProjectileTracker::new();
        let target = Vec3Fixed::from_ints(100, 0, 0);
        let a = tracker.launch(Vec3Fixed::ZERO, target, fx(100.0), ProjectilePayload::default(), fx(980.0));
        let b = tracker.launch(Vec3Fixed::ZERO, target, fx(100.0), ProjectilePayload::default(), fx(980.0));
        assert_eq!(a, Some(ProjectileId(0)));
        assert_eq!(b, Some(ProjectileId(1)));
        assert!(tracker.get(ProjectileId(1)).is_some());
    }
}
