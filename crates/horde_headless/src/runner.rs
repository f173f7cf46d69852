//! Headless battle runner.
//!
//! A minimal behaviour layer on top of [`SimulationEngine`]: units march to
//! their team's rally point, close on the first enemy their tracker reports,
//! and strike it on a cooldown. The dead are handed to deferred destruction.
//! Every decision is made in handle order, so a scenario always plays out
//! the same way.

use std::collections::{BTreeMap, BTreeSet};

use horde_core::command::EngineCommand;
use horde_core::components::{
    CollisionBody, DamageType, Defence, EnemyTracker, EntityHandle, TeamFilter, TeamId,
};
use horde_core::config::EngineConfig;
use horde_core::math::{Fixed, Vec3Fixed};
use horde_core::projectile::ProjectilePayload;
use horde_core::simulation::{fixed_tick_delta, EntitySpawnParams, SimulationEngine};

use crate::metrics::{BattleReport, MetricsCollector, Outcome};
use crate::scenario::{BattleScenario, SquadPlacement, VolleyPlan};

/// Seconds a corpse lingers before removal.
const CORPSE_DELAY: Fixed = Fixed::ONE;

/// Seconds between enemy scans.
const SCAN_PERIOD: Fixed = Fixed::from_bits(0x4CCC_CCCC); // ~0.3

/// Enemies each unit keeps track of.
const TRACKED_ENEMIES: usize = 4;

/// Combat stats of one unit.
#[derive(Debug, Clone, Copy)]
struct UnitStats {
    damage: Fixed,
    damage_type: DamageType,
    range: Fixed,
    speed: Fixed,
    attack_interval: Fixed,
}

impl UnitStats {
    fn from_squad(squad: &SquadPlacement) -> Self {
        let rate = Fixed::from_num(squad.attack_rate.max(1));
        Self {
            damage: Fixed::from_num(squad.damage.max(0)),
            damage_type: squad.damage_type,
            range: Fixed::from_num(squad.range.max(0)),
            speed: Fixed::from_num(squad.speed.max(0)),
            attack_interval: Fixed::from_num(10) / rate,
        }
    }
}

/// Runner-side state of one unit.
#[derive(Debug, Clone)]
struct UnitState {
    team: i32,
    stats: UnitStats,
    cooldown: Fixed,
    fallen: bool,
}

/// Decision made for one unit this tick.
#[derive(Debug, Clone, Copy)]
enum Order {
    Strike {
        attacker: EntityHandle,
        target: EntityHandle,
    },
    Step {
        handle: EntityHandle,
        position: Vec3Fixed,
    },
}

/// Drives one battle scenario to completion.
pub struct BattleRunner {
    engine: SimulationEngine,
    scenario: BattleScenario,
    units: BTreeMap<EntityHandle, UnitState>,
    volley_owners: BTreeMap<u64, i32>,
    metrics: MetricsCollector,
}

impl BattleRunner {
    /// Build the engine and spawn the scenario's units.
    #[must_use]
    pub fn new(scenario: BattleScenario, config: EngineConfig) -> Self {
        let mut runner = Self {
            engine: SimulationEngine::with_config(config),
            scenario,
            units: BTreeMap::new(),
            volley_owners: BTreeMap::new(),
            metrics: MetricsCollector::new(),
        };
        runner.spawn_teams();
        runner
    }

    /// Engine being driven.
    #[must_use]
    pub fn engine(&self) -> &SimulationEngine {
        &self.engine
    }

    /// Counters gathered so far.
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    fn spawn_teams(&mut self) {
        let teams = self.scenario.teams.clone();
        for setup in &teams {
            let mut spawned = Vec::new();
            for squad in &setup.squads {
                let stats = UnitStats::from_squad(squad);
                for slot in 0..squad.count {
                    let (x, y) = squad.slot_position(slot);
                    let handle = self.engine.spawn_entity(EntitySpawnParams {
                        position: Some(Vec3Fixed::from_ints(x, y, 0)),
                        team: Some(setup.team),
                        defence: Some(Defence::new(Fixed::from_num(squad.hp.max(1)), squad.armor)),
                        agent_radius: Some(Fixed::from_num(squad.radius.max(0))),
                        enemy_tracker: Some(EnemyTracker::new(
                            SCAN_PERIOD,
                            Fixed::from_num(squad.sight.max(0)),
                            TRACKED_ENEMIES,
                        )),
                        collision: Some(CollisionBody::default()),
                        ..Default::default()
                    });
                    self.units.insert(
                        handle,
                        UnitState {
                            team: setup.team,
                            stats,
                            cooldown: Fixed::ZERO,
                            fallen: false,
                        },
                    );
                    spawned.push(handle);
                }
            }
            self.metrics.team_mut(setup.team).units_spawned += spawned.len() as u32;

            let (x, y) = setup.advance_to;
            self.engine.apply_command(EngineCommand::MoveTo {
                units: spawned,
                destination: Vec3Fixed::from_ints(x, y, 0),
                team: TeamFilter::Only(TeamId(setup.team)),
            });
        }

        tracing::info!(
            scenario = %self.scenario.name,
            units = self.units.len(),
            teams = teams.len(),
            "Scenario spawned"
        );
    }

    /// Teams that still have living units.
    #[must_use]
    pub fn living_teams(&self) -> BTreeSet<i32> {
        self.units
            .values()
            .filter(|u| !u.fallen)
            .map(|u| u.team)
            .collect()
    }

    /// Advance the battle by one tick.
    pub fn step(&mut self) {
        let dt = fixed_tick_delta();
        let tick = self.engine.tick_count();

        self.fire_due_volleys(tick);

        for order in self.decide(dt) {
            match order {
                Order::Strike { attacker, target } => self.strike(tick, attacker, target),
                Order::Step { handle, position } => {
                    self.engine.set_position(handle, position);
                }
            }
        }

        let events = self.engine.tick(dt);
        let owners = &self.volley_owners;
        self.metrics
            .record_tick(&events, |id| owners.get(&id).copied());
        for handle in &events.destroyed {
            self.units.remove(handle);
        }

        self.collect_casualties();
    }

    fn fire_due_volleys(&mut self, tick: u64) {
        let due: Vec<VolleyPlan> = self
            .scenario
            .volleys
            .iter()
            .filter(|v| v.at_tick == tick)
            .cloned()
            .collect();

        for volley in due {
            let payload = ProjectilePayload {
                damage: Fixed::from_num(volley.damage.max(0)),
                aoe_radius: Fixed::from_num(volley.aoe_radius.max(0)),
                damage_type: volley.damage_type,
                team: TeamId(volley.team),
            };
            let from = Vec3Fixed::from_ints(volley.from.0, volley.from.1, 0);
            let target = Vec3Fixed::from_ints(volley.target.0, volley.target.1, 0);
            let speed = Fixed::from_num(volley.speed);

            match self.engine.fire_projectile(from, target, speed, payload) {
                Some(id) => {
                    self.volley_owners.insert(id.0, volley.team);
                    self.metrics.record_launch();
                    tracing::debug!(tick, team = volley.team, id = id.0, "Volley fired");
                }
                None => tracing::warn!(tick, speed = volley.speed, "Volley rejected"),
            }
        }
    }

    /// Choose an order for every living unit, in handle order.
    fn decide(&mut self, dt: Fixed) -> Vec<Order> {
        let mut orders = Vec::new();
        let engine = &self.engine;

        for (&handle, state) in &mut self.units {
            if state.fallen {
                continue;
            }
            let Some(entity) = engine.entity(handle) else {
                continue;
            };
            let Some(position) = entity.position() else {
                continue;
            };
            state.cooldown = (state.cooldown - dt).max(Fixed::ZERO);

            let target = entity.enemy_tracker.as_ref().and_then(|tracker| {
                tracker.enemies.iter().copied().find_map(|enemy| {
                    let e = engine.entity(enemy)?;
                    if e.is_alive() {
                        Some((enemy, e.position()?))
                    } else {
                        None
                    }
                })
            });

            let max_step = state.stats.speed.saturating_mul(dt);
            match target {
                Some((enemy, enemy_position)) => {
                    let range = state.stats.range;
                    if position.distance_squared(enemy_position) <= range.saturating_mul(range) {
                        if state.cooldown == Fixed::ZERO {
                            state.cooldown = state.stats.attack_interval;
                            orders.push(Order::Strike {
                                attacker: handle,
                                target: enemy,
                            });
                        }
                    } else {
                        orders.push(Order::Step {
                            handle,
                            position: step_toward(position, enemy_position, max_step),
                        });
                    }
                }
                None => {
                    if let Some(locomotion) = &entity.locomotion {
                        if position != locomotion.walk_target {
                            orders.push(Order::Step {
                                handle,
                                position: step_toward(position, locomotion.walk_target, max_step),
                            });
                        }
                    }
                }
            }
        }

        orders
    }

    fn strike(&mut self, tick: u64, attacker: EntityHandle, target: EntityHandle) {
        let Some(state) = self.units.get(&attacker) else {
            return;
        };
        let (team, stats) = (state.team, state.stats);

        let outcome = self.engine.apply_command(EngineCommand::Strike {
            target,
            amount: stats.damage,
            damage_type: stats.damage_type,
        });
        if !outcome.is_applied() {
            return;
        }

        let killed = self
            .engine
            .entity(target)
            .is_some_and(|e| !e.is_alive())
            && self.units.get(&target).is_some_and(|u| !u.fallen);
        self.metrics.record_strike(tick, team, killed);
        if killed {
            tracing::trace!(%attacker, %target, "Strike killed target");
            self.mark_fallen(target);
        }
    }

    /// Catch units killed by anything other than a strike.
    fn collect_casualties(&mut self) {
        let dead: Vec<EntityHandle> = self
            .units
            .iter()
            .filter(|(_, u)| !u.fallen)
            .filter(|(&h, _)| self.engine.entity(h).is_some_and(|e| !e.is_alive()))
            .map(|(&h, _)| h)
            .collect();
        for handle in dead {
            self.mark_fallen(handle);
        }
    }

    fn mark_fallen(&mut self, handle: EntityHandle) {
        let Some(state) = self.units.get_mut(&handle) else {
            return;
        };
        state.fallen = true;
        let team = state.team;
        self.metrics.record_loss(team);
        self.engine.apply_command(EngineCommand::Destroy {
            handle,
            delay: CORPSE_DELAY,
        });
    }

    /// Run until one team is left or `max_ticks` have passed.
    ///
    /// `max_ticks` overrides the scenario's own limit.
    #[must_use]
    pub fn run(mut self, max_ticks: Option<u64>) -> BattleReport {
        let limit = max_ticks
            .or(self.scenario.time_limit_ticks)
            .unwrap_or(u64::MAX);

        let outcome = loop {
            if self.living_teams().len() <= 1 {
                break if self.living_teams().is_empty() {
                    Outcome::MutualDestruction
                } else {
                    Outcome::Elimination
                };
            }
            if self.engine.tick_count() >= limit {
                break Outcome::TimeLimit;
            }
            self.step();
        };

        let living = self.living_teams();
        let winner = match (outcome, living.first()) {
            (Outcome::Elimination, Some(&team)) => Some(team),
            _ => None,
        };
        for setup in &self.scenario.teams {
            let alive = self
                .units
                .values()
                .filter(|u| u.team == setup.team && !u.fallen)
                .count() as u32;
            self.metrics.team_mut(setup.team).units_alive = alive;
        }

        let ticks = self.engine.tick_count();
        let hash = self.engine.state_hash();
        tracing::info!(ticks, ?outcome, ?winner, state_hash = hash, "Battle finished");

        let name = self.scenario.name.clone();
        self.metrics.finish(&name, ticks, winner, outcome, hash)
    }
}

/// Move at most `max_step` from `from` toward `to` on the ground plane.
fn step_toward(from: Vec3Fixed, to: Vec3Fixed, max_step: Fixed) -> Vec3Fixed {
    let mut goal = to;
    goal.z = from.z;
    if from.distance_squared(goal) <= max_step.saturating_mul(max_step) {
        return goal;
    }
    from + (goal - from).normalize().scale(max_step)
}
