use deeprl::agent::{Agent, evaluate};
use deeprl::algorithms::ddqn::DdqnAgent;
use deeprl::algorithms::td3::Td3Agent;
use deeprl::config::{DdqnConfig, ExperimentConfig, Td3Config};
use deeprl::environment::Environment;
use deeprl::environments::{MountainCar, Pendulum};
use deeprl::policy::Policy;

fn ddqn_config() -> DdqnConfig {
    DdqnConfig {
        hidden_sizes: vec![32],
        batch_size: 16,
        buffer_capacity: 1_000,
        learning_starts: 32,
        epsilon_decay_steps: 200,
        target_update_interval: 50,
        gradient_clip: Some(10.0),
        seed: Some(1),
        ..Default::default()
    }
}

fn td3_config() -> Td3Config {
    Td3Config {
        actor_hidden_sizes: vec![32],
        critic_hidden_sizes: vec![32],
        batch_size: 16,
        buffer_capacity: 1_000,
        learning_starts: 32,
        seed: Some(2),
        ..Default::default()
    }
}

#[test]
fn ddqn_mountain_car_test() {
    let device = tch::Device::Cpu;
    let mut env = MountainCar::with_step_limit(50);
    let mut agent = DdqnAgent::from_env(&env, ddqn_config(), device).unwrap();

    let report = agent.train(&mut env, 3, 1).unwrap();
    assert_eq!(report.episodes.len(), 3);
    for episode in &report.episodes {
        // -1 per step, and the car cannot reach the flag in 50 steps
        assert_eq!(episode.steps, 50);
        assert_eq!(episode.reward, -50.0);
        assert!(episode.mean_loss.is_some_and(f64::is_finite));
    }
    assert_eq!(agent.total_steps(), 150);

    let score = evaluate(&agent, &mut env, 2);
    assert_eq!(score, -50.0);
}

#[test]
fn td3_pendulum_test() {
    let device = tch::Device::Cpu;
    let mut env = Pendulum::with_step_limit(40);
    let mut agent = Td3Agent::from_env(&env, td3_config(), device).unwrap();

    let report = agent.train(&mut env, 2, 1).unwrap();
    assert_eq!(report.rewards().len(), 2);
    assert!(report.rewards().iter().all(|r| r.is_finite() && *r <= 0.0));
    // 40 + 40 steps, updates start at step 32
    assert_eq!(agent.updates(), 49);

    let score = evaluate(&agent, &mut env, 1);
    assert!(score.is_finite() && score <= 0.0);
}

#[test]
fn ddqn_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("ddqn.ot");

    let mut env = MountainCar::with_step_limit(40);
    let mut trained = DdqnAgent::from_env(&env, ddqn_config(), tch::Device::Cpu).unwrap();
    trained.train(&mut env, 2, 1).unwrap();
    trained.save(&path).unwrap();

    let fresh_config = DdqnConfig {
        seed: Some(99),
        ..ddqn_config()
    };
    let mut restored = DdqnAgent::<MountainCar>::from_env(&env, fresh_config, tch::Device::Cpu).unwrap();
    restored.load(&path).unwrap();

    for state in [[-0.5, 0.0], [-0.9, 0.03], [0.2, -0.04]] {
        let expected = trained.q_values(&state);
        let actual = restored.q_values(&state);
        assert!(expected.allclose(&actual, 1e-6, 1e-6, false));
        assert_eq!(trained.select_action(&state), restored.select_action(&state));
    }
}

#[test]
fn td3_checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();

    let mut env = Pendulum::with_step_limit(40);
    let mut trained = Td3Agent::from_env(&env, td3_config(), tch::Device::Cpu).unwrap();
    trained.train(&mut env, 1, 1).unwrap();
    trained.save(dir.path()).unwrap();
    assert!(dir.path().join("actor.ot").exists());
    assert!(dir.path().join("critic.ot").exists());

    let mut restored = Td3Agent::<Pendulum>::from_env(&env, td3_config(), tch::Device::Cpu).unwrap();
    restored.load(dir.path()).unwrap();

    let state = env.reset();
    let expected = trained.select_action(&state);
    let actual = restored.select_action(&state);
    assert!((expected[0] - actual[0]).abs() < 1e-5);
}

#[test]
fn loading_a_missing_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let env = MountainCar::new();
    let mut agent = DdqnAgent::<MountainCar>::from_env(&env, ddqn_config(), tch::Device::Cpu).unwrap();
    assert!(agent.load(&dir.path().join("absent.ot")).is_err());
}

#[test]
fn agents_build_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experiment.toml");
    std::fs::write(
        &path,
        r#"
        [training]
        episodes = 1
        max_episode_steps = 20

        [ddqn]
        hidden_sizes = [8]
        batch_size = 4
        learning_starts = 4

        [td3]
        actor_hidden_sizes = [8]
        critic_hidden_sizes = [8]
        batch_size = 4
        learning_starts = 4
        "#,
    )
    .unwrap();

    let config = ExperimentConfig::from_file(&path).unwrap();
    config.validate().unwrap();
    let steps = config.training.max_episode_steps;

    let mut car = MountainCar::with_step_limit(steps);
    let mut ddqn = DdqnAgent::from_env(&car, config.ddqn.clone(), tch::Device::Cpu).unwrap();
    let report = ddqn.train(&mut car, config.training.episodes, 1).unwrap();
    assert_eq!(report.episodes[0].steps, 20);

    let mut pendulum = Pendulum::with_step_limit(steps);
    let mut td3 = Td3Agent::from_env(&pendulum, config.td3.clone(), tch::Device::Cpu).unwrap();
    let report = td3.train(&mut pendulum, config.training.episodes, 1).unwrap();
    assert_eq!(report.episodes[0].steps, 20);
    assert_eq!(pendulum.state_dim(), 3);
}

#[test]
fn seeded_warmup_runs_repeat() {
    // warm-up actions come from the agent's StdRng only
    let config = Td3Config {
        learning_starts: 10_000,
        ..td3_config()
    };
    let rewards = |seed: u64| {
        let mut env = Pendulum::with_step_limit(30);
        env.seed(seed);
        let mut agent = Td3Agent::from_env(&env, config.clone(), tch::Device::Cpu).unwrap();
        agent.train(&mut env, 3, 1).unwrap().rewards()
    };
    assert_eq!(rewards(7), rewards(7));
    assert_ne!(rewards(7), rewards(8));
}
