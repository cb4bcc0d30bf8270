use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use epidemic_dqn::agent::DqnAgentBuilder;
use epidemic_dqn::config::RunConfig;
use epidemic_dqn::env::EpidemicGridEnv;
use epidemic_dqn::error::Result;
use epidemic_dqn::trainer::train;

#[derive(Parser)]
#[command(name = "epidemic-dqn")]
#[command(version, about = "Train a DQN agent to vaccinate grid blocks against an epidemic")]
struct Cli {
    /// JSON run configuration; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of training episodes
    #[arg(long)]
    episodes: Option<usize>,

    /// Step bound per episode
    #[arg(long)]
    max_steps: Option<usize>,

    /// Transitions per update
    #[arg(long)]
    batch_size: Option<usize>,

    /// Use the fully-connected network on flattened grids instead of the convolutional one
    #[arg(long)]
    dense: bool,

    /// Seed for the environment and the agent
    #[arg(long)]
    seed: Option<u64>,

    /// Append every episode summary to this file as JSON lines while training
    #[arg(long)]
    rewards_out: Option<PathBuf>,

    /// Save the trained network here
    #[arg(long)]
    checkpoint: Option<PathBuf>,

    /// Log filter, e.g. "info" or "epidemic_dqn=debug"
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(episodes) = cli.episodes {
        config.training.max_episodes = episodes;
    }
    if let Some(max_steps) = cli.max_steps {
        config.training.max_steps = max_steps;
    }
    if let Some(batch_size) = cli.batch_size {
        config.training.batch_size = batch_size;
    }
    if cli.dense {
        config.agent.use_conv = false;
    }
    if let Some(seed) = cli.seed {
        config.agent.seed = Some(seed);
        config.environment.seed = Some(seed.wrapping_add(1));
    }
    config.validate()?;

    let mut env = EpidemicGridEnv::new(config.environment.clone())?;
    let mut agent = DqnAgentBuilder::from_config(config.agent.clone()).build(&env)?;
    info!(
        use_conv = config.agent.use_conv,
        actions = env.num_blocks() + 1,
        episodes = config.training.max_episodes,
        "starting training"
    );

    let mut stream = match &cli.rewards_out {
        Some(path) => Some(fs::File::create(path)?),
        None => None,
    };
    let mut write_error = None;
    let log = train(&mut env, &mut agent, &config.training, |summary| {
        if let Some(file) = stream.as_mut() {
            let written = serde_json::to_writer(&mut *file, summary)
                .map_err(std::io::Error::from)
                .and_then(|_| file.write_all(b"\n"));
            if let Err(e) = written {
                write_error.get_or_insert(e);
            }
        }
    })?;
    if let Some(e) = write_error {
        return Err(e.into());
    }

    info!(
        episodes = log.len(),
        mean_reward = log.rolling_mean(log.len()).unwrap_or(0.0),
        updates = agent.train_steps,
        "training finished"
    );

    if let Some(path) = &cli.checkpoint {
        agent.save(path)?;
        info!(path = %path.display(), "saved checkpoint");
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cli.log_level))
        .with_writer(std::io::stderr)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
