//! Roll requests, outcomes and the frame-stepped driver
//!
//! A [`DiceSimulation`] owns the die registry and at most one running roll.
//! Starting a roll validates the request before any body exists; starting
//! another roll or cancelling drops the whole world.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::consts::{MAX_FRAME_DT, MAX_SUBSTEPS, SIM_DT};
use crate::dice::{DieRegistry, DieSpec, DieType};
use crate::error::{DiceError, DiceResult};
use crate::reconcile::{self, Divergence, ReconcilePolicy};
use crate::settings::Settings;
use crate::sim::{self, CollisionWorld, SettleEvent};

/// Most dice a single notation term may ask for
const MAX_DICE_PER_TERM: usize = 100;

/// One die of a roll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DieRequest {
    pub die_type: DieType,
    /// Pre-resolved value from an external source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<u32>,
}

impl DieRequest {
    pub fn new(die_type: DieType) -> Self {
        Self {
            die_type,
            expected_value: None,
        }
    }

    pub fn expecting(die_type: DieType, value: u32) -> Self {
        Self {
            die_type,
            expected_value: Some(value),
        }
    }
}

/// Throw strength, scaled by the settings multipliers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrowParams {
    pub force: f32,
    pub spin: f32,
    /// Fixed seed for a reproducible roll
    pub seed: Option<u64>,
}

impl Default for ThrowParams {
    fn default() -> Self {
        Self {
            force: 1.0,
            spin: 1.0,
            seed: None,
        }
    }
}

/// How dice enter the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ThrowMode {
    /// Thrown and tumbling
    #[default]
    Animated,
    /// Placed at rest showing their expected (or a random) face
    Instant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollRequest {
    pub dice: Vec<DieRequest>,
    #[serde(default)]
    pub modifier: i32,
    #[serde(default)]
    pub throw: ThrowParams,
    #[serde(default)]
    pub mode: ThrowMode,
}

impl RollRequest {
    pub fn new(dice: Vec<DieRequest>) -> Self {
        Self {
            dice,
            modifier: 0,
            throw: ThrowParams::default(),
            mode: ThrowMode::Animated,
        }
    }

    /// Parse dice notation such as `2d6+3`, `d20 - 1` or `d%+d10`
    pub fn parse(notation: &str) -> DiceResult<Self> {
        let cleaned: String = notation.chars().filter(|c| !c.is_whitespace()).collect();
        if cleaned.is_empty() {
            return Err(DiceError::EmptyRoll);
        }

        let mut dice = Vec::new();
        let mut modifier = 0;
        let mut sign = 1;
        let mut term = String::new();
        for (i, c) in cleaned.char_indices() {
            if c == '+' || c == '-' {
                if term.is_empty() && i > 0 {
                    return Err(DiceError::InvalidDieSpec(format!(
                        "misplaced '{c}' in '{notation}'"
                    )));
                }
                if !term.is_empty() {
                    parse_term(&term, sign, &mut dice, &mut modifier)?;
                    term.clear();
                }
                sign = if c == '-' { -1 } else { 1 };
            } else {
                term.push(c);
            }
        }
        if term.is_empty() {
            return Err(DiceError::InvalidDieSpec(format!(
                "'{notation}' ends with a sign"
            )));
        }
        parse_term(&term, sign, &mut dice, &mut modifier)?;

        let mut request = Self::new(dice);
        request.modifier = modifier;
        Ok(request)
    }

    pub fn with_modifier(mut self, modifier: i32) -> Self {
        self.modifier = modifier;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.throw.seed = Some(seed);
        self
    }

    pub fn with_mode(mut self, mode: ThrowMode) -> Self {
        self.mode = mode;
        self
    }

    /// Check the request without touching any simulation state
    pub fn validate(&self) -> DiceResult<()> {
        if self.dice.is_empty() {
            return Err(DiceError::EmptyRoll);
        }
        for die in &self.dice {
            if let Some(value) = die.expected_value {
                if !die.die_type.is_valid_value(value) {
                    return Err(DiceError::InvalidExpectedValue {
                        die: die.die_type,
                        value,
                    });
                }
            }
        }
        for (name, value) in [("force", self.throw.force), ("spin", self.throw.spin)] {
            if !value.is_finite() || value < 0.0 {
                return Err(DiceError::InvalidConfig(format!(
                    "throw {name} must be zero or positive, got {value}"
                )));
            }
        }
        Ok(())
    }
}

fn parse_term(term: &str, sign: i32, dice: &mut Vec<DieRequest>, modifier: &mut i32) -> DiceResult<()> {
    let lower = term.to_lowercase();
    let Some(d) = lower.find('d') else {
        let value: i32 = lower
            .parse()
            .map_err(|_| DiceError::InvalidDieSpec(format!("bad modifier '{term}'")))?;
        *modifier += sign * value;
        return Ok(());
    };

    if sign < 0 {
        return Err(DiceError::InvalidDieSpec(format!("cannot subtract dice '{term}'")));
    }
    let count = match &lower[..d] {
        "" => 1,
        digits => digits
            .parse::<usize>()
            .map_err(|_| DiceError::InvalidDieSpec(format!("bad dice count in '{term}'")))?,
    };
    if count == 0 || count > MAX_DICE_PER_TERM {
        return Err(DiceError::InvalidDieSpec(format!(
            "dice count must be 1..={MAX_DICE_PER_TERM} in '{term}'"
        )));
    }
    let die_type: DieType = lower[d..].parse()?;
    dice.extend(std::iter::repeat_n(DieRequest::new(die_type), count));
    Ok(())
}

/// Per-roll diagnostics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollDiagnostics {
    pub seed: u64,
    pub policy: ReconcilePolicy,
    /// Values read from the dice, before reconciliation
    pub physics_values: Vec<u32>,
    pub timed_out: Vec<bool>,
    pub nudged: Vec<bool>,
    pub divergences: Vec<Divergence>,
    pub steps: u64,
    pub simulated_time: f32,
}

/// Final result of a roll, in request order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollOutcome {
    pub die_types: Vec<DieType>,
    pub per_die_values: Vec<u32>,
    pub modifier: i32,
    pub total: i32,
    /// Simulated seconds until each die locked
    pub settle_durations: Vec<f32>,
    pub diagnostics: RollDiagnostics,
}

/// What a step or frame produced
#[derive(Debug, Clone, PartialEq)]
pub enum RollProgress {
    /// No roll is running
    Idle,
    Rolling,
    /// Every die is locked; reported once per roll
    Complete(RollOutcome),
}

#[derive(Debug)]
struct ActiveRoll {
    request: RollRequest,
    world: CollisionWorld,
    events: Vec<SettleEvent>,
    complete: bool,
}

impl ActiveRoll {
    fn outcome(&self, policy: ReconcilePolicy) -> RollOutcome {
        let world = &self.world;
        let physics_values: Vec<u32> = world
            .bodies
            .iter()
            .map(|b| {
                b.result_value()
                    .unwrap_or_else(|| b.spec.read_value(b.pose.orientation))
            })
            .collect();
        let expected: Vec<Option<u32>> = self.request.dice.iter().map(|d| d.expected_value).collect();
        let reconciled = reconcile::reconcile(policy, &physics_values, &expected, self.request.modifier);

        RollOutcome {
            die_types: self.request.dice.iter().map(|d| d.die_type).collect(),
            per_die_values: reconciled.values,
            modifier: self.request.modifier,
            total: reconciled.total,
            settle_durations: world
                .bodies
                .iter()
                .map(|b| b.settle_time.unwrap_or(world.time))
                .collect(),
            diagnostics: RollDiagnostics {
                seed: world.seed,
                policy,
                physics_values,
                timed_out: world.bodies.iter().map(|b| b.timed_out).collect(),
                nudged: world.bodies.iter().map(|b| b.nudged).collect(),
                divergences: reconciled.divergences,
                steps: world.steps,
                simulated_time: world.time,
            },
        }
    }
}

/// Dice roller owning the registry and the current roll
#[derive(Debug)]
pub struct DiceSimulation {
    settings: Settings,
    registry: DieRegistry,
    active: Option<ActiveRoll>,
    accumulator: f32,
}

impl DiceSimulation {
    /// Validate settings and build every die type
    pub fn new(settings: Settings) -> DiceResult<Self> {
        settings.validate()?;
        let registry = DieRegistry::new(settings.die_radius)?;
        Ok(Self {
            settings,
            registry,
            active: None,
            accumulator: 0.0,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn registry(&self) -> &DieRegistry {
        &self.registry
    }

    /// World of the current or just-finished roll, for rendering
    pub fn world(&self) -> Option<&CollisionWorld> {
        self.active.as_ref().map(|a| &a.world)
    }

    /// Settlement events of the current roll so far
    pub fn events(&self) -> &[SettleEvent] {
        self.active
            .as_ref()
            .map(|a| a.events.as_slice())
            .unwrap_or_default()
    }

    pub fn is_rolling(&self) -> bool {
        self.active.as_ref().is_some_and(|a| !a.complete)
    }

    /// Start a roll, replacing any previous one. Returns the seed used.
    pub fn start_roll(&mut self, request: RollRequest) -> DiceResult<u64> {
        request.validate()?;
        let capacity = sim::throw::capacity(&self.settings);
        if request.dice.len() > capacity {
            return Err(DiceError::InvalidConfig(format!(
                "arena holds at most {capacity} dice, {} requested",
                request.dice.len()
            )));
        }

        self.cancel();

        let seed = request.throw.seed.unwrap_or_else(rand::random::<u64>);
        let mut world = CollisionWorld::new(&self.settings, seed);
        let specs: Vec<Arc<DieSpec>> = request
            .dice
            .iter()
            .map(|d| Arc::clone(self.registry.get(d.die_type)))
            .collect();

        match request.mode {
            ThrowMode::Animated => sim::spawn_animated(
                &mut world,
                &specs,
                &self.settings,
                request.throw.force,
                request.throw.spin,
            ),
            ThrowMode::Instant => {
                let faces: Vec<Option<usize>> = request
                    .dice
                    .iter()
                    .zip(&specs)
                    .map(|(d, spec)| d.expected_value.and_then(|v| spec.face_of(v)))
                    .collect();
                sim::spawn_instant(&mut world, &specs, &faces, &self.settings);
            }
        }

        log::info!(
            "Rolling {} dice ({:?}, seed {seed}, modifier {:+})",
            request.dice.len(),
            request.mode,
            request.modifier
        );
        self.active = Some(ActiveRoll {
            request,
            world,
            events: Vec::new(),
            complete: false,
        });
        Ok(seed)
    }

    /// Advance the current roll by one fixed step
    pub fn step(&mut self) -> RollProgress {
        let Some(active) = self.active.as_mut() else {
            return RollProgress::Idle;
        };
        if active.complete {
            return RollProgress::Idle;
        }

        let events = sim::tick(&mut active.world, &self.settings, SIM_DT);
        active.events.extend(events);
        if !active.world.all_locked() {
            return RollProgress::Rolling;
        }

        active.complete = true;
        let outcome = active.outcome(self.settings.policy);
        log::info!(
            "Roll complete: {:?} {:+} = {} ({:.2}s simulated)",
            outcome.per_die_values,
            outcome.modifier,
            outcome.total,
            outcome.diagnostics.simulated_time
        );
        RollProgress::Complete(outcome)
    }

    /// Advance by a frame's wall time, running at most `MAX_SUBSTEPS` steps
    pub fn advance(&mut self, frame_dt: f32) -> RollProgress {
        if !self.is_rolling() {
            return RollProgress::Idle;
        }
        self.accumulator += frame_dt.clamp(0.0, MAX_FRAME_DT);

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            self.accumulator -= SIM_DT;
            substeps += 1;
            if let RollProgress::Complete(outcome) = self.step() {
                self.accumulator = 0.0;
                return RollProgress::Complete(outcome);
            }
        }
        if substeps == MAX_SUBSTEPS {
            self.accumulator = self.accumulator.min(SIM_DT);
        }
        RollProgress::Rolling
    }

    /// Drop the current roll and every body in it
    pub fn cancel(&mut self) {
        if let Some(active) = self.active.take() {
            if !active.complete {
                log::info!("Roll cancelled after {} steps", active.world.steps);
            }
        }
        self.accumulator = 0.0;
    }

    /// Run a roll to completion
    pub fn roll(&mut self, request: RollRequest) -> DiceResult<RollOutcome> {
        self.start_roll(request)?;
        loop {
            if let RollProgress::Complete(outcome) = self.step() {
                return Ok(outcome);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn simulation() -> DiceSimulation {
        DiceSimulation::new(Settings::default()).unwrap()
    }

    #[test]
    fn test_parse_notation() {
        let r = RollRequest::parse("2d6+3").unwrap();
        assert_eq!(r.dice, vec![DieRequest::new(DieType::D6); 2]);
        assert_eq!(r.modifier, 3);

        let r = RollRequest::parse(" d20 - 1 + d% ").unwrap();
        assert_eq!(r.dice.len(), 2);
        assert_eq!(r.dice[1].die_type, DieType::D100);
        assert_eq!(r.modifier, -1);

        assert!(matches!(RollRequest::parse(""), Err(DiceError::EmptyRoll)));
        assert!(RollRequest::parse("2d7").is_err());
        assert!(RollRequest::parse("0d6").is_err());
        assert!(RollRequest::parse("d6+").is_err());
        assert!(RollRequest::parse("d6++1").is_err());
        assert!(RollRequest::parse("-d6").is_err());
        assert!(RollRequest::parse("d6+x").is_err());
    }

    #[test]
    fn test_request_json_defaults() {
        let r: RollRequest =
            serde_json::from_str(r#"{ "dice": [{ "die_type": "d20", "expected_value": 12 }] }"#)
                .unwrap();
        assert_eq!(r.dice[0], DieRequest::expecting(DieType::D20, 12));
        assert_eq!(r.modifier, 0);
        assert_eq!(r.throw, ThrowParams::default());
        assert_eq!(r.mode, ThrowMode::Animated);
    }

    #[test]
    fn test_expected_authoritative_two_d6() {
        let settings = Settings {
            policy: ReconcilePolicy::ExpectedAuthoritative,
            ..Settings::default()
        };
        let mut sim = DiceSimulation::new(settings).unwrap();
        let request = RollRequest::new(vec![
            DieRequest::expecting(DieType::D6, 4),
            DieRequest::expecting(DieType::D6, 6),
        ])
        .with_modifier(3)
        .with_seed(2024);
        let outcome = sim.roll(request).unwrap();
        assert_eq!(outcome.per_die_values, vec![4, 6]);
        assert_eq!(outcome.total, 13);
        assert_eq!(outcome.diagnostics.physics_values.len(), 2);
    }

    #[test]
    fn test_instant_roll_shows_expected_faces() {
        let mut sim = simulation();
        let request = RollRequest::new(vec![
            DieRequest::expecting(DieType::D20, 17),
            DieRequest::expecting(DieType::D10, 0),
            DieRequest::expecting(DieType::D100, 30),
            DieRequest::expecting(DieType::D4, 2),
        ])
        .with_mode(ThrowMode::Instant)
        .with_seed(5);
        let outcome = sim.roll(request).unwrap();
        assert_eq!(outcome.diagnostics.physics_values, vec![17, 0, 30, 2]);
        assert_eq!(outcome.total, 49);
        assert!(outcome.diagnostics.timed_out.iter().all(|t| !t));
    }

    #[test]
    fn test_instant_roll_shows_every_face() {
        // Chunks small enough to stay on the floor row of the spawn grid
        for die_type in DieType::ALL {
            for values in die_type.values().chunks(10) {
                let dice = values
                    .iter()
                    .map(|&v| DieRequest::expecting(die_type, v))
                    .collect();
                let request = RollRequest::new(dice)
                    .with_mode(ThrowMode::Instant)
                    .with_seed(3);
                let outcome = simulation().roll(request).unwrap();
                assert_eq!(outcome.diagnostics.physics_values, values, "{die_type}");
                assert!(
                    outcome.diagnostics.timed_out.iter().all(|t| !t),
                    "{die_type} {values:?} timed out"
                );
                assert!(outcome.diagnostics.nudged.iter().all(|n| !n));
            }
        }
    }

    #[test]
    fn test_single_throws_settle_before_timeout() {
        let mut timeouts = Vec::new();
        let mut longest: f32 = 0.0;
        for die_type in DieType::ALL {
            for seed in 0..6 {
                let request = RollRequest::new(vec![DieRequest::new(die_type)]).with_seed(seed);
                let outcome = simulation().roll(request).unwrap();
                if outcome.diagnostics.timed_out[0] {
                    timeouts.push((die_type, seed));
                }
                longest = longest.max(outcome.settle_durations[0]);
            }
        }
        assert!(timeouts.len() <= 2, "timed out: {timeouts:?}");
        assert!(longest > 0.0);
    }

    #[test]
    fn test_mixed_throws_rarely_time_out() {
        let mut dice = 0;
        let mut timeouts = 0;
        for seed in 0..4 {
            let request = RollRequest::parse("d4+d6+d8+d10+d12+d20+d%")
                .unwrap()
                .with_seed(seed);
            let outcome = simulation().roll(request).unwrap();
            dice += outcome.per_die_values.len();
            timeouts += outcome.diagnostics.timed_out.iter().filter(|t| **t).count();
        }
        assert_eq!(dice, 28);
        assert!(timeouts * 10 <= dice, "{timeouts} of {dice} dice timed out");
    }

    #[test]
    fn test_log_divergence_keeps_physics_values() {
        let settings = Settings {
            policy: ReconcilePolicy::LogDivergence,
            ..Settings::default()
        };
        let mut sim = DiceSimulation::new(settings).unwrap();
        let request = RollRequest::new(vec![
            DieRequest::expecting(DieType::D8, 1),
            DieRequest::expecting(DieType::D8, 8),
        ])
        .with_seed(31);
        let outcome = sim.roll(request).unwrap();
        assert_eq!(outcome.per_die_values, outcome.diagnostics.physics_values);

        let expected = [1, 8];
        let mismatches = outcome
            .per_die_values
            .iter()
            .zip(expected)
            .filter(|(p, e)| **p != *e)
            .count();
        let divergences = &outcome.diagnostics.divergences;
        assert_eq!(divergences.len(), mismatches);
        for d in divergences {
            assert_eq!(d.physics_value, outcome.per_die_values[d.die_index]);
            assert_ne!(d.physics_value, d.expected_value);
        }
    }

    #[test]
    fn test_invalid_requests_create_no_bodies() {
        let mut sim = simulation();
        assert!(matches!(
            sim.start_roll(RollRequest::new(Vec::new())),
            Err(DiceError::EmptyRoll)
        ));
        assert!(matches!(
            sim.start_roll(RollRequest::new(vec![DieRequest::expecting(DieType::D6, 7)])),
            Err(DiceError::InvalidExpectedValue { value: 7, .. })
        ));
        assert!(sim.world().is_none());

        let too_many = RollRequest::new(vec![DieRequest::new(DieType::D6); 1000]);
        assert!(matches!(sim.start_roll(too_many), Err(DiceError::InvalidConfig(_))));
        assert!(sim.world().is_none());
    }

    #[test]
    fn test_cancel_discards_world() {
        let mut sim = simulation();
        sim.start_roll(RollRequest::parse("3d6").unwrap()).unwrap();
        sim.step();
        assert!(sim.is_rolling());
        sim.cancel();
        assert!(sim.world().is_none());
        assert!(!sim.is_rolling());
        assert_eq!(sim.step(), RollProgress::Idle);
    }

    #[test]
    fn test_new_roll_replaces_previous_world() {
        let mut sim = simulation();
        sim.start_roll(RollRequest::parse("4d8").unwrap()).unwrap();
        for _ in 0..10 {
            sim.step();
        }
        sim.start_roll(RollRequest::parse("d20").unwrap()).unwrap();
        let world = sim.world().unwrap();
        assert_eq!(world.bodies.len(), 1);
        assert_eq!(world.steps, 0);
        assert!(sim.events().is_empty());
    }

    #[test]
    fn test_outcome_reported_once() {
        let mut sim = simulation();
        let request = RollRequest::new(vec![DieRequest::expecting(DieType::D12, 9)])
            .with_mode(ThrowMode::Instant);
        sim.roll(request).unwrap();
        assert!(!sim.is_rolling());
        assert_eq!(sim.step(), RollProgress::Idle);
        assert_eq!(sim.advance(1.0), RollProgress::Idle);
        // The finished world stays available for rendering
        assert!(sim.world().unwrap().all_locked());
    }

    #[test]
    fn test_advance_caps_substeps() {
        let mut sim = simulation();
        sim.start_roll(RollRequest::parse("d6").unwrap().with_seed(1)).unwrap();
        assert_eq!(sim.advance(10.0), RollProgress::Rolling);
        let steps = sim.world().unwrap().steps;
        assert!((1..=MAX_SUBSTEPS as u64).contains(&steps));
    }

    #[test]
    fn test_same_seed_same_outcome() {
        let request = RollRequest::parse("d6+d10+d20").unwrap().with_seed(77);
        let a = simulation().roll(request.clone()).unwrap();
        let b = simulation().roll(request).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.diagnostics.seed, 77);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_random_throws_always_lock(
            seed in any::<u64>(),
            types in prop::collection::vec(0usize..7, 1..4),
            modifier in -5i32..5,
        ) {
            let dice: Vec<DieRequest> = types.iter().map(|&t| DieRequest::new(DieType::ALL[t])).collect();
            let request = RollRequest::new(dice).with_modifier(modifier).with_seed(seed);
            let mut sim = simulation();
            let outcome = sim.roll(request).unwrap();

            let max_duration = sim.settings().max_duration;
            prop_assert!(outcome.diagnostics.simulated_time <= max_duration + SIM_DT);
            prop_assert!(sim.world().unwrap().all_locked());
            for (value, die_type) in outcome.per_die_values.iter().zip(&outcome.die_types) {
                prop_assert!(die_type.is_valid_value(*value));
            }
            let sum: i32 = outcome.per_die_values.iter().map(|&v| v as i32).sum();
            prop_assert_eq!(outcome.total, sum + modifier);
            prop_assert!(outcome.diagnostics.nudged.len() == types.len());
        }
    }
}
