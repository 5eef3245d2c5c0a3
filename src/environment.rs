// environment trait
pub struct StepResult<S, R> {
    pub next_state: S,
    pub reward: R,
    /// terminal state reached, no bootstrapping past it
    pub done: bool,
    /// episode cut by a time limit
    pub truncated: bool,
}

impl<S, R> StepResult<S, R> {
    /// Whether the episode is over for either reason.
    pub fn is_last(&self) -> bool {
        self.done || self.truncated
    }
}

pub trait Environment {
    type State;
    type Action;
    type Reward: Copy + Into<f32>;

    fn reset(&mut self) -> Self::State;
    fn step(&mut self, action: &Self::Action) -> StepResult<Self::State, Self::Reward>;

    /// 获取当前状态
    fn current_state(&self) -> Self::State;

    /// 动作空间维度: number of discrete actions, or the length of a continuous action
    fn action_space(&self) -> usize;

    /// 状态空间维度
    fn state_dim(&self) -> usize;
}

/// Environments whose actions are real vectors within per-dimension bounds.
pub trait ContinuousActionSpace: Environment {
    /// `(low, high)`, each of length `action_space()`
    fn action_bounds(&self) -> (Vec<f32>, Vec<f32>);
}
