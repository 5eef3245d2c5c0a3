use std::f32::consts::PI;

use crate::environment::{ContinuousActionSpace, Environment, StepResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MAX_SPEED: f32 = 8.0;
const MAX_TORQUE: f32 = 2.0;
const DT: f32 = 0.05;
const G: f32 = 10.0;
const M: f32 = 1.0;
const L: f32 = 1.0;

/// Inverted pendulum swing-up with a continuous torque action.
///
/// State is `[cos θ, sin θ, θ̇]` with θ = 0 upright. The reward is
/// `-(θ² + 0.1·θ̇² + 0.001·u²)`, so the best achievable return is 0.
/// Episodes never terminate, they are truncated after `step_limit` steps.
pub struct Pendulum {
    pub theta: f32,
    pub theta_dot: f32,
    pub step_limit: usize,
    pub step_count: usize,
    rng: StdRng,
}

impl Default for Pendulum {
    fn default() -> Self {
        Self::new()
    }
}

impl Pendulum {
    pub fn new() -> Self {
        Self::with_step_limit(200)
    }

    pub fn with_step_limit(step_limit: usize) -> Self {
        Self {
            theta: 0.0,
            theta_dot: 0.0,
            step_limit,
            step_count: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn observation(&self) -> [f32; 3] {
        [self.theta.cos(), self.theta.sin(), self.theta_dot]
    }
}

/// Wrap an angle into `[-π, π)`.
fn angle_normalize(x: f32) -> f32 {
    (x + PI).rem_euclid(2.0 * PI) - PI
}

impl Environment for Pendulum {
    type State = [f32; 3];
    type Action = Vec<f32>; // [torque]
    type Reward = f32;

    fn reset(&mut self) -> Self::State {
        self.theta = self.rng.random_range(-PI..PI);
        self.theta_dot = self.rng.random_range(-1.0..1.0);
        self.step_count = 0;
        self.observation()
    }

    fn step(&mut self, action: &Self::Action) -> StepResult<Self::State, Self::Reward> {
        let u = action.first().copied().unwrap_or(0.0).clamp(-MAX_TORQUE, MAX_TORQUE);

        let cost = angle_normalize(self.theta).powi(2)
            + 0.1 * self.theta_dot.powi(2)
            + 0.001 * u.powi(2);

        // θ̈ = 3g/(2l)·sin θ + 3/(m·l²)·u
        let theta_acc = 3.0 * G / (2.0 * L) * self.theta.sin() + 3.0 / (M * L * L) * u;
        self.theta_dot = (self.theta_dot + theta_acc * DT).clamp(-MAX_SPEED, MAX_SPEED);
        self.theta += self.theta_dot * DT;
        self.step_count += 1;

        StepResult {
            next_state: self.observation(),
            reward: -cost,
            done: false,
            truncated: self.step_count >= self.step_limit,
        }
    }

    fn current_state(&self) -> Self::State {
        self.observation()
    }

    fn action_space(&self) -> usize {
        1
    }

    fn state_dim(&self) -> usize {
        3
    }
}

impl ContinuousActionSpace for Pendulum {
    fn action_bounds(&self) -> (Vec<f32>, Vec<f32>) {
        (vec![-MAX_TORQUE], vec![MAX_TORQUE])
    }
}
