use crate::environment::{Environment, StepResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const MIN_POSITION: f32 = -1.2;
const MAX_POSITION: f32 = 0.6;
const MAX_SPEED: f32 = 0.07;
const GOAL_POSITION: f32 = 0.5;
const FORCE: f32 = 0.001;
const GRAVITY: f32 = 0.0025;

/// Mountain Car 环境，状态为 [position, velocity]
///
/// An underpowered car sits in a valley and has to rock back and forth to
/// reach the flag at `position >= 0.5`. Every step costs -1.
pub struct MountainCar {
    pub state: [f32; 2],
    pub step_limit: usize,
    pub step_count: usize,
    rng: StdRng,
}

impl Default for MountainCar {
    fn default() -> Self {
        Self::new()
    }
}

impl MountainCar {
    pub fn new() -> Self {
        Self::with_step_limit(200)
    }

    pub fn with_step_limit(step_limit: usize) -> Self {
        Self {
            state: [-0.5, 0.0],
            step_limit,
            step_count: 0,
            rng: StdRng::from_os_rng(),
        }
    }

    // 固定 reset 的初始位置序列
    pub fn seed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    fn is_done(&self, state: &[f32; 2]) -> bool {
        state[0] >= GOAL_POSITION
    }

    pub fn step(
        &mut self,
        action: &<MountainCar as Environment>::Action,
    ) -> StepResult<<MountainCar as Environment>::State, <MountainCar as Environment>::Reward> {
        let [mut position, mut velocity] = self.state;

        // 0: push left, 1: no push, 2: push right
        let push = (*action).clamp(0, 2) - 1;

        velocity += push as f32 * FORCE - GRAVITY * (3.0 * position).cos();
        velocity = velocity.clamp(-MAX_SPEED, MAX_SPEED);
        position = (position + velocity).clamp(MIN_POSITION, MAX_POSITION);
        if position == MIN_POSITION && velocity < 0.0 {
            velocity = 0.0;
        }

        self.state = [position, velocity];
        self.step_count += 1;

        let done = self.is_done(&self.state);

        StepResult {
            next_state: self.state,
            reward: -1.0,
            done,
            truncated: !done && self.step_count >= self.step_limit,
        }
    }
}

impl Environment for MountainCar {
    type State = [f32; 2];
    type Action = i64; // 0: left, 1: none, 2: right
    type Reward = f32;

    fn reset(&mut self) -> Self::State {
        self.state = [self.rng.random_range(-0.6..-0.4), 0.0];
        self.step_count = 0;
        self.state
    }

    fn step(&mut self, action: &Self::Action) -> StepResult<Self::State, Self::Reward> {
        self.step(action)
    }

    fn current_state(&self) -> Self::State {
        self.state
    }

    fn action_space(&self) -> usize {
        3
    }

    fn state_dim(&self) -> usize {
        2 // [position, velocity]
    }
}
