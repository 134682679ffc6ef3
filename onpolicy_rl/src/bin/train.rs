//! Train an actor-critic policy on CartPole.
//!
//! ```bash
//! cargo run --release --bin train -- ppo
//! cargo run --release --bin train -- a2c
//! cargo run --release --bin train -- recurrent-ppo
//!
//! # GPU backend
//! cargo run --release --features wgpu --bin train -- ppo
//! ```
//!
//! Progress is also logged through `log`; set `RUST_LOG=info` (or `debug` for
//! KL early-stop messages).

use std::process::ExitCode;

use burn::backend::Autodiff;
use burn::tensor::backend::Backend;
use onpolicy_rl::{AlgorithmKind, CartPoleEnv, TrainConfig, TrainError, Trainer};

#[cfg(not(feature = "wgpu"))]
type B = Autodiff<burn::backend::NdArray<f32>>;
#[cfg(feature = "wgpu")]
type B = Autodiff<burn::backend::Wgpu>;

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let config = match args.get(1).map(String::as_str) {
        None | Some("ppo") => TrainConfig::new(),
        Some("a2c") => TrainConfig::new()
            .with_algorithm(AlgorithmKind::A2c)
            .with_num_steps(5)
            .with_learning_rate(7e-4),
        Some("recurrent-ppo") => TrainConfig::new()
            .with_recurrent(true)
            .with_num_mini_batch(4),
        Some(other) => {
            println!("Unknown algorithm: {}", other);
            println!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };
    let config = config.with_max_frames(200_000).with_log_interval(10);

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Training failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(config: TrainConfig) -> Result<(), TrainError> {
    let config = config.build()?;

    println!("=== {} Trainer (CartPole) ===", config.algorithm);
    println!("Configuration:");
    println!(
        "  Rollout: {} steps x {} envs = {} frames per update",
        config.num_steps,
        config.num_envs,
        config.frames_per_update()
    );
    println!("  Updates: {}", config.num_updates());
    println!("  Recurrent: {}", config.recurrent);
    println!("  LR decay: {}", config.use_lr_decay);
    println!();

    let device: <B as Backend>::Device = Default::default();
    println!("Using device: {:?}", device);
    println!();

    let env = CartPoleEnv::new(config.num_envs, config.seed);
    let mut trainer = Trainer::<B, _>::new(config, env, device)?;

    println!("Starting training...");
    println!();
    let summary = trainer.run(|report| println!("{}", report))?;

    println!();
    println!(
        "Done: {} updates, {} frames, {} episodes",
        summary.updates, summary.total_frames, summary.episodes
    );
    if let Some(reward) = summary.average_reward {
        println!("Final average reward: {:.1}", reward);
    }
    Ok(())
}

fn print_usage() {
    println!("Usage: train [ALGORITHM]");
    println!();
    println!("Algorithms:");
    println!("  ppo            Feed-forward PPO (default)");
    println!("  a2c            Feed-forward A2C");
    println!("  recurrent-ppo  GRU policy trained with PPO");
}
