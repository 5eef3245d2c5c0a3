use std::path::Path;

use tracing::info;

use crate::environment::Environment;
use crate::error::Result;
use crate::logger::{Logger, Summary};
use crate::policy::Policy;

/// Outcome of a single training episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeStats {
    pub reward: f32,
    pub steps: usize,
    /// mean loss over the gradient updates of the episode, if any ran
    pub mean_loss: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub episodes: Vec<EpisodeStats>,
}

impl TrainingReport {
    pub fn rewards(&self) -> Vec<f32> {
        self.episodes.iter().map(|e| e.reward).collect()
    }

    /// Mean reward of the last `last_n` episodes.
    pub fn mean_reward(&self, last_n: usize) -> Option<f32> {
        let n = last_n.min(self.episodes.len());
        if n == 0 {
            return None;
        }
        let tail = &self.episodes[self.episodes.len() - n..];
        Some(tail.iter().map(|e| e.reward).sum::<f32>() / n as f32)
    }
}

pub trait Agent<E: Environment> {
    // 训练一个episode
    fn train_episode(&mut self, env: &mut E) -> Result<EpisodeStats>;

    fn save(&self, path: &Path) -> Result<()>;

    fn load(&mut self, path: &Path) -> Result<()>;

    /// Runs `num_episodes` training episodes, logging a summary every
    /// `log_interval` episodes.
    fn train(
        &mut self,
        env: &mut E,
        num_episodes: usize,
        log_interval: usize,
    ) -> Result<TrainingReport> {
        let log_interval = log_interval.max(1);
        let mut logger = Logger::new();
        logger.add_attribute(
            "reward",
            &[Summary::Mean, Summary::Std, Summary::Min, Summary::Max],
        )?;
        logger.add_attribute("steps", &[Summary::Mean])?;
        logger.add_attribute("loss", &[Summary::Mean])?;

        let mut report = TrainingReport::default();
        for episode in 1..=num_episodes {
            let stats = self.train_episode(env)?;
            logger.put("reward", stats.reward as f64)?;
            logger.put("steps", stats.steps as f64)?;
            if let Some(loss) = stats.mean_loss {
                logger.put("loss", loss)?;
            }
            report.episodes.push(stats);

            if episode % log_interval == 0 || episode == num_episodes {
                let summary = logger.summarize_fmt(None, false)?;
                info!(episode, "{summary}");
            }
        }

        Ok(report)
    }
}

/// Mean return of `episodes` greedy rollouts.
pub fn evaluate<E, P>(policy: &P, env: &mut E, episodes: usize) -> f32
where
    E: Environment,
    P: Policy<E::State, E::Action>,
{
    if episodes == 0 {
        return 0.0;
    }

    let mut total: f32 = 0.0;
    for _ in 0..episodes {
        let mut state = env.reset();
        loop {
            let action = policy.select_action(&state);
            let result = env.step(&action);
            let reward: f32 = result.reward.into();
            total += reward;
            if result.is_last() {
                break;
            }
            state = result.next_state;
        }
    }
    total / episodes as f32
}
