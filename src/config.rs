//! Experiment configuration, loaded from TOML.
//!
//! Every section is optional; missing fields fall back to the defaults below.
//!
//! ```toml
//! [training]
//! episodes = 300
//!
//! [ddqn]
//! hidden_sizes = [128, 128]
//! epsilon_decay_steps = 20000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub training: TrainingConfig,
    pub ddqn: DdqnConfig,
    pub td3: Td3Config,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    pub eval_episodes: usize,
    /// episodes between logged summaries
    pub log_interval: usize,
    /// environment step limit per episode
    pub max_episode_steps: usize,
    pub plot_path: Option<PathBuf>,
    pub checkpoint_path: Option<PathBuf>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            episodes: 500,
            eval_episodes: 10,
            log_interval: 10,
            max_episode_steps: 200,
            plot_path: None,
            checkpoint_path: None,
        }
    }
}

/// Double DQN hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DdqnConfig {
    pub hidden_sizes: Vec<i64>,
    pub learning_rate: f64,
    pub gamma: f64,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    /// environment steps over which epsilon decays linearly
    pub epsilon_decay_steps: usize,
    pub learning_starts: usize,
    pub train_interval: usize,
    /// environment steps between hard target syncs
    pub target_update_interval: usize,
    pub gradient_clip: Option<f64>,
    pub seed: Option<u64>,
}

impl Default for DdqnConfig {
    fn default() -> Self {
        Self {
            hidden_sizes: vec![64, 64],
            learning_rate: 1e-3,
            gamma: 0.99,
            batch_size: 64,
            buffer_capacity: 50_000,
            epsilon_start: 1.0,
            epsilon_end: 0.05,
            epsilon_decay_steps: 10_000,
            learning_starts: 1_000,
            train_interval: 1,
            target_update_interval: 500,
            gradient_clip: None,
            seed: None,
        }
    }
}

/// TD3 hyperparameters. Noise scales are relative to the normalized `[-1, 1]` action range.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Td3Config {
    pub actor_hidden_sizes: Vec<i64>,
    pub critic_hidden_sizes: Vec<i64>,
    pub actor_learning_rate: f64,
    pub critic_learning_rate: f64,
    pub gamma: f64,
    pub tau: f64,
    pub policy_delay: usize,
    pub target_policy_noise: f64,
    pub target_noise_clip: f64,
    pub exploration_noise: f64,
    pub batch_size: usize,
    pub buffer_capacity: usize,
    pub learning_starts: usize,
    pub seed: Option<u64>,
}

impl Default for Td3Config {
    fn default() -> Self {
        Self {
            actor_hidden_sizes: vec![256, 256],
            critic_hidden_sizes: vec![256, 256],
            actor_learning_rate: 3e-4,
            critic_learning_rate: 3e-4,
            gamma: 0.99,
            tau: 0.005,
            policy_delay: 2,
            target_policy_noise: 0.2,
            target_noise_clip: 0.5,
            exploration_noise: 0.1,
            batch_size: 256,
            buffer_capacity: 200_000,
            learning_starts: 1_000,
            seed: None,
        }
    }
}

fn check(ok: bool, message: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(Error::invalid_config(message))
    }
}

fn check_hidden(sizes: &[i64], name: &str) -> Result<()> {
    check(
        !sizes.is_empty() && sizes.iter().all(|&s| s > 0),
        &format!("{name} must be a non-empty list of positive sizes"),
    )
}

impl ExperimentConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.ddqn.validate()?;
        self.td3.validate()
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        check(self.log_interval > 0, "training.log_interval must be positive")?;
        check(
            self.max_episode_steps > 0,
            "training.max_episode_steps must be positive",
        )
    }
}

impl DdqnConfig {
    pub fn validate(&self) -> Result<()> {
        check_hidden(&self.hidden_sizes, "ddqn.hidden_sizes")?;
        check(self.learning_rate > 0.0, "ddqn.learning_rate must be positive")?;
        check((0.0..=1.0).contains(&self.gamma), "ddqn.gamma must be in [0, 1]")?;
        check(self.batch_size > 0, "ddqn.batch_size must be positive")?;
        check(
            self.buffer_capacity >= self.batch_size,
            "ddqn.buffer_capacity must be at least batch_size",
        )?;
        check(
            (0.0..=1.0).contains(&self.epsilon_start) && (0.0..=1.0).contains(&self.epsilon_end),
            "ddqn epsilon values must be in [0, 1]",
        )?;
        check(self.train_interval > 0, "ddqn.train_interval must be positive")?;
        check(
            self.target_update_interval > 0,
            "ddqn.target_update_interval must be positive",
        )?;
        check(
            self.gradient_clip.is_none_or(|c| c > 0.0),
            "ddqn.gradient_clip must be positive",
        )
    }

    /// Exploration rate after `step` environment steps.
    pub fn epsilon_at(&self, step: usize) -> f64 {
        if self.epsilon_decay_steps == 0 {
            return self.epsilon_end;
        }
        let progress = (step as f64 / self.epsilon_decay_steps as f64).min(1.0);
        self.epsilon_start + (self.epsilon_end - self.epsilon_start) * progress
    }
}

impl Td3Config {
    pub fn validate(&self) -> Result<()> {
        check_hidden(&self.actor_hidden_sizes, "td3.actor_hidden_sizes")?;
        check_hidden(&self.critic_hidden_sizes, "td3.critic_hidden_sizes")?;
        check(
            self.actor_learning_rate > 0.0 && self.critic_learning_rate > 0.0,
            "td3 learning rates must be positive",
        )?;
        check((0.0..=1.0).contains(&self.gamma), "td3.gamma must be in [0, 1]")?;
        check(self.tau > 0.0 && self.tau <= 1.0, "td3.tau must be in (0, 1]")?;
        check(self.policy_delay > 0, "td3.policy_delay must be positive")?;
        check(
            self.target_policy_noise >= 0.0
                && self.target_noise_clip >= 0.0
                && self.exploration_noise >= 0.0,
            "td3 noise scales must be non-negative",
        )?;
        check(self.batch_size > 0, "td3.batch_size must be positive")?;
        check(
            self.buffer_capacity >= self.batch_size,
            "td3.buffer_capacity must be at least batch_size",
        )
    }
}
