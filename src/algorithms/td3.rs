//! Twin Delayed Deep Deterministic Policy Gradient (TD3)
//!
//! The actor works in `[-1, 1]^n`; only the environment sees rescaled actions.

use std::marker::PhantomData;
use std::path::Path;

use rand::Rng;
use rand::rngs::StdRng;
use tch::nn::{Module, OptimizerConfig};
use tch::{Device, Kind, Reduction, Tensor, nn};
use tracing::debug;

use crate::agent::{Agent, EpisodeStats};
use crate::config::Td3Config;
use crate::environment::ContinuousActionSpace;
use crate::error::{Error, Result};
use crate::networks::{Activation, MLP, construct_nn, hard_update, soft_update};
use crate::policy::Policy;
use crate::replay_buffer::ReplayBuffer;
use crate::utils::ToTensor;

const ACTOR_FILE: &str = "actor.ot";
const CRITIC_FILE: &str = "critic.ot";

/// 目标策略平滑: clipped Gaussian noise on the target action
pub fn smoothed_target_actions(target_actions: &Tensor, noise_std: f64, noise_clip: f64) -> Tensor {
    let noise = (target_actions.randn_like() * noise_std).clamp(-noise_clip, noise_clip);
    (target_actions + noise).clamp(-1.0, 1.0)
}

// 探索噪声
pub fn exploration_actions(actions: &Tensor, noise_std: f64) -> Tensor {
    (actions + actions.randn_like() * noise_std).clamp(-1.0, 1.0)
}

// Q1, Q2 share one VarStore
pub struct TwinCritic {
    pub var_store: nn::VarStore,
    q1: nn::Sequential,
    q2: nn::Sequential,
}

impl TwinCritic {
    pub fn new(vs: nn::VarStore, state_dim: usize, action_dim: usize, hidden: &[i64]) -> Result<Self> {
        let mut sizes = vec![(state_dim + action_dim) as i64];
        sizes.extend_from_slice(hidden);
        sizes.push(1);

        let q1 = construct_nn(&(&vs.root() / "q1"), &sizes, Activation::Identity)?;
        let q2 = construct_nn(&(&vs.root() / "q2"), &sizes, Activation::Identity)?;
        Ok(TwinCritic {
            var_store: vs,
            q1,
            q2,
        })
    }

    // each [batch, 1]
    pub fn forward(&self, state: &Tensor, action: &Tensor) -> (Tensor, Tensor) {
        let xs = Tensor::cat(&[state, action], 1);
        (self.q1.forward(&xs), self.q2.forward(&xs))
    }

    pub fn q1(&self, state: &Tensor, action: &Tensor) -> Tensor {
        self.q1.forward(&Tensor::cat(&[state, action], 1))
    }
}

pub struct Td3Agent<E: ContinuousActionSpace> {
    actor: MLP,
    target_actor: MLP,
    critic: TwinCritic,
    target_critic: TwinCritic,
    actor_optimizer: nn::Optimizer,
    critic_optimizer: nn::Optimizer,
    replay_buffer: ReplayBuffer,
    config: Td3Config,
    action_low: Vec<f32>,
    action_high: Vec<f32>,
    total_steps: usize,
    updates: usize,
    rng: StdRng,
    device: Device,
    _env: PhantomData<fn() -> E>,
}

impl<E> Td3Agent<E>
where
    E: ContinuousActionSpace<Action = Vec<f32>>,
    E::State: ToTensor,
{
    pub fn new(
        state_dim: usize,
        action_low: Vec<f32>,
        action_high: Vec<f32>,
        config: Td3Config,
        device: Device,
    ) -> Result<Self> {
        config.validate()?;
        if action_low.is_empty() || action_low.len() != action_high.len() {
            return Err(Error::invalid_config(
                "action bounds must be non-empty and of equal length",
            ));
        }
        if action_low.iter().zip(&action_high).any(|(lo, hi)| lo >= hi) {
            return Err(Error::invalid_config("action low bound must be below high bound"));
        }

        let rng = super::seeded_rng(config.seed);
        let action_dim = action_low.len();

        let actor = MLP::with_hidden(
            nn::VarStore::new(device),
            state_dim,
            &config.actor_hidden_sizes,
            action_dim,
            Activation::Tanh,
        )?;
        let mut target_actor = MLP::with_hidden(
            nn::VarStore::new(device),
            state_dim,
            &config.actor_hidden_sizes,
            action_dim,
            Activation::Tanh,
        )?;
        hard_update(&mut target_actor.var_store, actor.var_store())?;
        target_actor.var_store.freeze();

        let critic = TwinCritic::new(
            nn::VarStore::new(device),
            state_dim,
            action_dim,
            &config.critic_hidden_sizes,
        )?;
        let mut target_critic = TwinCritic::new(
            nn::VarStore::new(device),
            state_dim,
            action_dim,
            &config.critic_hidden_sizes,
        )?;
        hard_update(&mut target_critic.var_store, &critic.var_store)?;
        target_critic.var_store.freeze();

        let actor_optimizer =
            nn::Adam::default().build(actor.var_store(), config.actor_learning_rate)?;
        let critic_optimizer =
            nn::Adam::default().build(&critic.var_store, config.critic_learning_rate)?;
        let replay_buffer =
            ReplayBuffer::new(state_dim, action_dim, config.buffer_capacity, device)?;

        Ok(Td3Agent {
            actor,
            target_actor,
            critic,
            target_critic,
            actor_optimizer,
            critic_optimizer,
            replay_buffer,
            config,
            action_low,
            action_high,
            total_steps: 0,
            updates: 0,
            rng,
            device,
            _env: PhantomData,
        })
    }

    pub fn from_env(env: &E, config: Td3Config, device: Device) -> Result<Self> {
        let (low, high) = env.action_bounds();
        Self::new(env.state_dim(), low, high, config, device)
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    fn action_dim(&self) -> usize {
        self.action_low.len()
    }

    pub fn scale_action(&self, normalized: &[f32]) -> Vec<f32> {
        normalized
            .iter()
            .zip(self.action_low.iter().zip(&self.action_high))
            .map(|(a, (lo, hi))| lo + (a.clamp(-1.0, 1.0) + 1.0) * 0.5 * (hi - lo))
            .collect()
    }

    // 确定性策略输出, [1, action_dim]
    fn actor_output(&self, state: &E::State) -> Tensor {
        let _no_grad_guard = tch::no_grad_guard();
        self.actor.forward(&state.to_tensor().to_device(self.device))
    }

    fn row_to_vec(&self, row: &Tensor) -> Vec<f32> {
        (0..self.action_dim())
            .map(|i| row.double_value(&[0, i as i64]) as f32)
            .collect()
    }

    // uniform before learning_starts
    fn act(&mut self, state: &E::State) -> Vec<f32> {
        if self.total_steps < self.config.learning_starts {
            return (0..self.action_dim())
                .map(|_| self.rng.random_range(-1.0f32..=1.0))
                .collect();
        }

        let noisy = exploration_actions(&self.actor_output(state), self.config.exploration_noise);
        self.row_to_vec(&noisy)
    }

    fn update(&mut self) -> Result<f64> {
        self.updates += 1;
        let batch = self
            .replay_buffer
            .sample_batch(self.config.batch_size, &mut self.rng)?;

        let targets = tch::no_grad(|| {
            let next_actions = smoothed_target_actions(
                &self.target_actor.forward(&batch.next_obs),
                self.config.target_policy_noise,
                self.config.target_noise_clip,
            );
            let (q1, q2) = self.target_critic.forward(&batch.next_obs, &next_actions);
            let min_q = q1.minimum(&q2).squeeze_dim(1);
            &batch.rew + self.config.gamma * (1.0 - &batch.done) * min_q
        });

        let (q1, q2) = self.critic.forward(&batch.obs, &batch.act);
        let critic_loss = q1.squeeze_dim(1).mse_loss(&targets, Reduction::Mean)
            + q2.squeeze_dim(1).mse_loss(&targets, Reduction::Mean);
        self.critic_optimizer.backward_step(&critic_loss);

        if self.updates % self.config.policy_delay == 0 {
            let actions = self.actor.forward(&batch.obs);
            let actor_loss = -self.critic.q1(&batch.obs, &actions).mean(Kind::Float);
            self.actor_optimizer.backward_step(&actor_loss);

            soft_update(
                &self.target_actor.var_store,
                self.actor.var_store(),
                self.config.tau,
            )?;
            soft_update(
                &self.target_critic.var_store,
                &self.critic.var_store,
                self.config.tau,
            )?;
            debug!(
                update = self.updates,
                actor_loss = actor_loss.double_value(&[]),
                "actor updated"
            );
        }

        Ok(critic_loss.double_value(&[]))
    }

    fn sync_targets(&mut self) -> Result<()> {
        hard_update(&mut self.target_actor.var_store, self.actor.var_store())?;
        hard_update(&mut self.target_critic.var_store, &self.critic.var_store)
    }
}

impl<E> Policy<E::State, E::Action> for Td3Agent<E>
where
    E: ContinuousActionSpace<Action = Vec<f32>>,
    E::State: ToTensor,
{
    fn select_action(&self, state: &E::State) -> Vec<f32> {
        let normalized = self.row_to_vec(&self.actor_output(state));
        self.scale_action(&normalized)
    }
}

impl<E> Agent<E> for Td3Agent<E>
where
    E: ContinuousActionSpace<Action = Vec<f32>>,
    E::State: ToTensor,
{
    fn train_episode(&mut self, env: &mut E) -> Result<EpisodeStats> {
        let mut state = env.reset();
        let mut total_reward = 0.0f32;
        let mut steps = 0;
        let mut losses = Vec::new();

        loop {
            let action = self.act(&state);
            let stepresult = env.step(&self.scale_action(&action));
            let reward: f32 = stepresult.reward.into();
            total_reward += reward;
            steps += 1;
            self.total_steps += 1;

            self.replay_buffer.put(
                &state.to_tensor(),
                &Tensor::from_slice(&action),
                reward,
                &stepresult.next_state.to_tensor(),
                stepresult.done,
            )?;

            if self.total_steps >= self.config.learning_starts
                && self.replay_buffer.len() >= self.config.batch_size
            {
                losses.push(self.update()?);
            }

            if stepresult.is_last() {
                break;
            }
            state = stepresult.next_state;
        }

        let mean_loss = (!losses.is_empty()).then(|| losses.iter().sum::<f64>() / losses.len() as f64);
        debug!(reward = total_reward, steps, updates = self.updates, "episode finished");

        Ok(EpisodeStats {
            reward: total_reward,
            steps,
            mean_loss,
        })
    }

    // path is a directory: actor.ot + critic.ot
    fn save(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        self.actor.var_store().save(path.join(ACTOR_FILE))?;
        self.critic.var_store.save(path.join(CRITIC_FILE))?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.actor.var_store.load(path.join(ACTOR_FILE))?;
        self.critic.var_store.load(path.join(CRITIC_FILE))?;
        self.sync_targets()
    }
}
