//! Double DQN: online net picks the next action, target net scores it.

use std::marker::PhantomData;
use std::path::Path;

use rand::Rng;
use rand::rngs::StdRng;
use tch::nn::OptimizerConfig;
use tch::{Device, Kind, Reduction, Tensor, nn};
use tracing::debug;

use crate::agent::{Agent, EpisodeStats};
use crate::config::DdqnConfig;
use crate::environment::Environment;
use crate::error::Result;
use crate::networks::{Activation, MLP, hard_update};
use crate::policy::Policy;
use crate::replay_buffer::ReplayBuffer;
use crate::utils::ToTensor;

/// Double DQN 目标: `r + γ (1 - done) Q_target(s', argmax Q_online(s', ·))`
pub fn double_q_targets(
    online_next: &Tensor,
    target_next: &Tensor,
    rew: &Tensor,
    done: &Tensor,
    gamma: f64,
) -> Tensor {
    let next_actions = online_next.argmax(1, true);
    let next_q = target_next.gather(1, &next_actions, false).squeeze_dim(1);
    rew + gamma * next_q * (1.0 - done)
}

pub struct DdqnAgent<E: Environment> {
    online_net: MLP,
    target_net: MLP,
    replay_buffer: ReplayBuffer,
    optimizer: nn::Optimizer,
    config: DdqnConfig,
    action_dim: usize,
    total_steps: usize,
    rng: StdRng,
    device: Device,
    _env: PhantomData<fn() -> E>,
}

impl<E: Environment> DdqnAgent<E>
where
    E::State: ToTensor,
    E::Action: Into<i64> + From<i64>,
{
    pub fn new(
        state_dim: usize,
        action_dim: usize,
        config: DdqnConfig,
        device: Device,
    ) -> Result<Self> {
        config.validate()?;
        let rng = super::seeded_rng(config.seed);

        let online_net = MLP::with_hidden(
            nn::VarStore::new(device),
            state_dim,
            &config.hidden_sizes,
            action_dim,
            Activation::Identity,
        )?;
        let mut target_net = MLP::with_hidden(
            nn::VarStore::new(device),
            state_dim,
            &config.hidden_sizes,
            action_dim,
            Activation::Identity,
        )?;
        hard_update(&mut target_net.var_store, online_net.var_store())?;
        target_net.var_store.freeze();

        let optimizer = nn::Adam::default().build(online_net.var_store(), config.learning_rate)?;
        let replay_buffer = ReplayBuffer::new(state_dim, 1, config.buffer_capacity, device)?;

        Ok(DdqnAgent {
            online_net,
            target_net,
            replay_buffer,
            optimizer,
            config,
            action_dim,
            total_steps: 0,
            rng,
            device,
            _env: PhantomData,
        })
    }

    pub fn from_env(env: &E, config: DdqnConfig, device: Device) -> Result<Self> {
        Self::new(env.state_dim(), env.action_space(), config, device)
    }

    pub fn epsilon(&self) -> f64 {
        self.config.epsilon_at(self.total_steps)
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn replay_len(&self) -> usize {
        self.replay_buffer.len()
    }

    // [1, action_dim]
    pub fn q_values(&self, state: &E::State) -> Tensor {
        let _no_grad_guard = tch::no_grad_guard();
        self.online_net
            .forward(&state.to_tensor().to_device(self.device))
    }

    // ε-greedy
    fn act(&mut self, state: &E::State) -> E::Action {
        if self.rng.random::<f64>() < self.epsilon() {
            let action = self.rng.random_range(0..self.action_dim as i64);
            E::Action::from(action)
        } else {
            self.select_action(state)
        }
    }

    fn update_online_network(&mut self) -> Result<f64> {
        let batch = self
            .replay_buffer
            .sample_batch(self.config.batch_size, &mut self.rng)?;

        let actions = batch.act.to_kind(Kind::Int64);
        let q_values = self
            .online_net
            .forward(&batch.obs)
            .gather(1, &actions, false)
            .squeeze_dim(1);

        let targets = tch::no_grad(|| {
            double_q_targets(
                &self.online_net.forward(&batch.next_obs),
                &self.target_net.forward(&batch.next_obs),
                &batch.rew,
                &batch.done,
                self.config.gamma,
            )
        });

        let loss = q_values.mse_loss(&targets, Reduction::Mean);
        match self.config.gradient_clip {
            Some(max_norm) => self.optimizer.backward_step_clip_norm(&loss, max_norm),
            None => self.optimizer.backward_step(&loss),
        }

        Ok(loss.double_value(&[]))
    }

    fn update_target_network(&mut self) -> Result<()> {
        hard_update(&mut self.target_net.var_store, self.online_net.var_store())
    }
}

impl<E: Environment> Policy<E::State, E::Action> for DdqnAgent<E>
where
    E::State: ToTensor,
    E::Action: Into<i64> + From<i64>,
{
    fn select_action(&self, state: &E::State) -> E::Action {
        let action: i64 = self.q_values(state).argmax(1, false).int64_value(&[0]);
        E::Action::from(action)
    }
}

impl<E: Environment> Agent<E> for DdqnAgent<E>
where
    E::State: ToTensor,
    E::Action: Into<i64> + From<i64>,
{
    fn train_episode(&mut self, env: &mut E) -> Result<EpisodeStats> {
        let mut state = env.reset();
        let mut total_reward = 0.0f32;
        let mut steps = 0;
        let mut losses = Vec::new();

        loop {
            let action = self.act(&state);
            let stepresult = env.step(&action);
            let reward: f32 = stepresult.reward.into();
            total_reward += reward;
            steps += 1;
            self.total_steps += 1;

            let action_index: i64 = action.into();
            self.replay_buffer.put(
                &state.to_tensor(),
                &Tensor::from_slice(&[action_index as f32]),
                reward,
                &stepresult.next_state.to_tensor(),
                stepresult.done,
            )?;

            if self.total_steps >= self.config.learning_starts
                && self.replay_buffer.len() >= self.config.batch_size
                && self.total_steps % self.config.train_interval == 0
            {
                losses.push(self.update_online_network()?);
            }

            if self.total_steps % self.config.target_update_interval == 0 {
                self.update_target_network()?;
                debug!(step = self.total_steps, "synced target network");
            }

            if stepresult.is_last() {
                break;
            }
            state = stepresult.next_state;
        }

        let mean_loss = (!losses.is_empty()).then(|| losses.iter().sum::<f64>() / losses.len() as f64);
        debug!(
            reward = total_reward,
            steps,
            epsilon = self.epsilon(),
            "episode finished"
        );

        Ok(EpisodeStats {
            reward: total_reward,
            steps,
            mean_loss,
        })
    }

    // 只保存 online 网络, load 时同步 target
    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        self.online_net.var_store().save(path)?;
        Ok(())
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        self.online_net.var_store.load(path)?;
        self.update_target_network()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environments::MountainCar;
    use crate::error::Error;

    fn small_config() -> DdqnConfig {
        DdqnConfig {
            hidden_sizes: vec![16],
            batch_size: 8,
            buffer_capacity: 256,
            learning_starts: 16,
            epsilon_decay_steps: 100,
            target_update_interval: 1_000_000,
            seed: Some(11),
            ..Default::default()
        }
    }

    fn max_weight_diff(agent: &DdqnAgent<MountainCar>) -> f64 {
        let target = agent.target_net.var_store.variables();
        agent
            .online_net
            .var_store
            .variables()
            .iter()
            .map(|(name, t)| (t - &target[name]).abs().max().double_value(&[]))
            .fold(0.0, f64::max)
    }

    #[test]
    fn starts_with_synced_target() {
        let agent = DdqnAgent::<MountainCar>::new(2, 3, small_config(), Device::Cpu).unwrap();
        assert_eq!(max_weight_diff(&agent), 0.0);
        assert_eq!(agent.epsilon(), 1.0);
        assert_eq!(agent.q_values(&[-0.5, 0.0]).size(), vec![1, 3]);
    }

    #[test]
    fn updates_move_online_net_only_until_sync() {
        let mut env = MountainCar::with_step_limit(40);
        let mut agent = DdqnAgent::from_env(&env, small_config(), Device::Cpu).unwrap();

        let stats = agent.train_episode(&mut env).unwrap();
        assert_eq!(stats.steps, 40);
        assert_eq!(stats.reward, -40.0);
        assert!(stats.mean_loss.is_some_and(f64::is_finite));
        assert!(max_weight_diff(&agent) > 0.0);
        assert!(agent.epsilon() < 1.0);
        assert_eq!(agent.replay_len(), 40);

        agent.update_target_network().unwrap();
        assert_eq!(max_weight_diff(&agent), 0.0);
    }

    #[test]
    fn no_updates_before_learning_starts() {
        let mut env = MountainCar::with_step_limit(10);
        let config = DdqnConfig {
            learning_starts: 100,
            ..small_config()
        };
        let mut agent = DdqnAgent::from_env(&env, config, Device::Cpu).unwrap();
        let stats = agent.train_episode(&mut env).unwrap();
        assert_eq!(stats.mean_loss, None);
        assert_eq!(max_weight_diff(&agent), 0.0);
    }

    #[test]
    fn greedy_action_is_a_valid_index() {
        let agent = DdqnAgent::<MountainCar>::new(2, 3, small_config(), Device::Cpu).unwrap();
        for state in [[-0.5, 0.0], [0.3, 0.05], [-1.2, -0.07]] {
            let action = agent.select_action(&state);
            assert!((0..3).contains(&action));
        }
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = DdqnConfig {
            batch_size: 0,
            ..small_config()
        };
        assert!(DdqnAgent::<MountainCar>::new(2, 3, config, Device::Cpu).is_err());
    }

    #[test]
    fn target_uses_online_argmax_and_target_values() {
        // online prefers actions [1, 0], target alone would prefer [2, 2]
        let online_next = Tensor::from_slice(&[1.0f32, 5.0, 2.0, 3.0, 0.0, 1.0]).view([2, 3]);
        let target_next = Tensor::from_slice(&[10.0f32, 2.0, 30.0, 4.0, 7.0, 9.0]).view([2, 3]);
        let rew = Tensor::from_slice(&[1.0f32, 1.0]);
        let done = Tensor::from_slice(&[0.0f32, 1.0]);

        let targets = double_q_targets(&online_next, &target_next, &rew, &done, 0.5);
        assert_eq!(Vec::<f32>::try_from(&targets).unwrap(), vec![2.0, 1.0]);

        let not_done = Tensor::from_slice(&[0.0f32, 0.0]);
        let targets = double_q_targets(&online_next, &target_next, &rew, &not_done, 0.5);
        assert_eq!(Vec::<f32>::try_from(&targets).unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn target_syncs_every_interval_steps() {
        let config = DdqnConfig {
            batch_size: 1,
            learning_starts: 0,
            target_update_interval: 5,
            ..small_config()
        };
        let mut env = MountainCar::with_step_limit(4);
        let mut agent = DdqnAgent::from_env(&env, config, Device::Cpu).unwrap();

        agent.train_episode(&mut env).unwrap();
        assert_eq!(agent.total_steps(), 4);
        assert!(max_weight_diff(&agent) > 0.0);

        env.step_limit = 1;
        agent.train_episode(&mut env).unwrap();
        assert_eq!(agent.total_steps(), 5);
        assert_eq!(max_weight_diff(&agent), 0.0);

        agent.train_episode(&mut env).unwrap();
        assert_eq!(agent.total_steps(), 6);
        assert!(max_weight_diff(&agent) > 0.0);
    }

    #[test]
    fn misreported_state_dim_is_an_error() {
        let mut env = MountainCar::with_step_limit(10);
        let mut agent = DdqnAgent::<MountainCar>::new(3, 3, small_config(), Device::Cpu).unwrap();
        assert!(matches!(
            agent.train_episode(&mut env),
            Err(Error::ShapeMismatch { field: "obs", expected: 3, actual: 2 })
        ));
    }
}
