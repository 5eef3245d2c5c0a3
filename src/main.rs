use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tch::Device;
use tracing::info;

use deeprl::agent::{Agent, evaluate};
use deeprl::algorithms::ddqn::DdqnAgent;
use deeprl::algorithms::td3::Td3Agent;
use deeprl::config::{ExperimentConfig, TrainingConfig};
use deeprl::environments::{MountainCar, Pendulum};
use deeprl::utils::{init_logging, plot_rewards};

#[derive(Parser)]
#[command(name = "deeprl", about = "Train TD3 and Double DQN agents")]
struct Cli {
    /// TOML experiment config
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Double DQN on mountain car
    Ddqn(RunArgs),
    /// TD3 on pendulum
    Td3(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    #[arg(long)]
    episodes: Option<usize>,

    #[arg(long)]
    eval_episodes: Option<usize>,

    /// Write a reward plot (PNG) here
    #[arg(long)]
    plot: Option<PathBuf>,

    /// Save the trained agent here
    #[arg(long)]
    save: Option<PathBuf>,

    /// Start from a saved agent
    #[arg(long)]
    load: Option<PathBuf>,

    #[arg(long)]
    seed: Option<u64>,
}

impl RunArgs {
    fn apply(&self, training: &mut TrainingConfig) {
        if let Some(episodes) = self.episodes {
            training.episodes = episodes;
        }
        if let Some(eval_episodes) = self.eval_episodes {
            training.eval_episodes = eval_episodes;
        }
        if self.plot.is_some() {
            training.plot_path = self.plot.clone();
        }
        if self.save.is_some() {
            training.checkpoint_path = self.save.clone();
        }
    }
}

fn run<E, A>(
    mut agent: A,
    mut env: E,
    training: &TrainingConfig,
    load: Option<&Path>,
    title: &str,
) -> anyhow::Result<()>
where
    E: deeprl::environment::Environment,
    A: Agent<E> + deeprl::policy::Policy<E::State, E::Action>,
{
    if let Some(path) = load {
        agent
            .load(path)
            .with_context(|| format!("loading agent from {}", path.display()))?;
        info!(path = %path.display(), "loaded agent");
    }

    let report = agent.train(&mut env, training.episodes, training.log_interval)?;
    if let Some(mean) = report.mean_reward(training.log_interval) {
        info!(mean_reward = mean, "training finished");
    }

    if training.eval_episodes > 0 {
        let score = evaluate(&agent, &mut env, training.eval_episodes);
        info!(episodes = training.eval_episodes, mean_reward = score, "evaluation");
    }

    if let Some(path) = &training.plot_path {
        plot_rewards(&report.rewards(), path, title)
            .with_context(|| format!("plotting to {}", path.display()))?;
    }

    if let Some(path) = &training.checkpoint_path {
        agent
            .save(path)
            .with_context(|| format!("saving agent to {}", path.display()))?;
        info!(path = %path.display(), "saved agent");
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => ExperimentConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };

    let args = match &cli.command {
        Command::Ddqn(args) | Command::Td3(args) => args,
    };
    args.apply(&mut config.training);
    if let Some(seed) = args.seed {
        config.ddqn.seed = Some(seed);
        config.td3.seed = Some(seed);
    }
    config.validate()?;

    let device = Device::cuda_if_available();
    info!(?device, "starting");
    let training = &config.training;

    match &cli.command {
        Command::Ddqn(_) => {
            let mut env = MountainCar::with_step_limit(training.max_episode_steps);
            if let Some(seed) = config.ddqn.seed {
                env.seed(seed);
            }
            let agent = DdqnAgent::from_env(&env, config.ddqn.clone(), device)?;
            run(agent, env, training, args.load.as_deref(), "Double DQN - Mountain Car")
        }
        Command::Td3(_) => {
            let mut env = Pendulum::with_step_limit(training.max_episode_steps);
            if let Some(seed) = config.td3.seed {
                env.seed(seed);
            }
            let agent = Td3Agent::from_env(&env, config.td3.clone(), device)?;
            run(agent, env, training, args.load.as_deref(), "TD3 - Pendulum")
        }
    }
}
