//! Umbra command line shell
//!
//! Thin wrapper that loads configuration, sets up logging and hands each
//! subcommand to the replacement engine. The engine lives for one process,
//! so budget spent by `replace` is not carried over between runs.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use umbra_core::{AppConfig, NoiseMechanism};
use umbra_dp::{QueryCost, Replacement, ReplacementEngine, ReplacementMethod};

#[derive(Debug, Parser)]
#[command(name = "umbra")]
#[command(version)]
#[command(about = "Differentially-private token replacement", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Override the initial epsilon
    #[arg(long, global = true)]
    epsilon: Option<f64>,

    /// Seed the engine for reproducible output
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Replace tokens with private alternatives
    Replace {
        /// Tokens to replace
        #[arg(required = true)]
        tokens: Vec<String>,

        /// Surrounding text used for contextual scoring
        #[arg(long)]
        context: Option<String>,

        /// Accept every suggestion, charging the budget under `on_accept`
        #[arg(long)]
        accept: bool,
    },

    /// List replacement candidates for a token
    Candidates {
        /// Token to look up
        token: String,
    },

    /// Release a number with additive noise
    Noise {
        /// True value
        value: f64,

        /// Sensitivity of the value
        #[arg(long, default_value_t = 1.0)]
        sensitivity: f64,

        /// Epsilon for this release (defaults to the configured epsilon)
        #[arg(long = "noise-epsilon")]
        noise_epsilon: Option<f64>,

        /// Delta for the Gaussian mechanism (defaults to the configured delta)
        #[arg(long)]
        delta: Option<f64>,

        /// Noise mechanism: laplace or gaussian
        #[arg(short, long, default_value = "laplace")]
        mechanism: NoiseMechanism,
    },

    /// Show the privacy budget and cluster sizes
    Report,

    /// Total privacy cost of a batch of queries
    Compose {
        /// Query costs as `epsilon:delta`
        #[arg(short, long = "query", value_parser = parse_query, required = true)]
        queries: Vec<QueryCost>,

        /// Use advanced composition with this delta'
        #[arg(long)]
        advanced: Option<f64>,
    },

    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

fn parse_query(s: &str) -> std::result::Result<QueryCost, String> {
    let (epsilon, delta) = s.split_once(':').unwrap_or((s, "0"));
    let epsilon: f64 = epsilon
        .trim()
        .parse()
        .map_err(|e| format!("invalid epsilon '{epsilon}': {e}"))?;
    let delta: f64 = delta
        .trim()
        .parse()
        .map_err(|e| format!("invalid delta '{delta}': {e}"))?;
    Ok(QueryCost::new(epsilon, delta))
}

/// Initialize tracing subscriber for logging
fn init_tracing(default_filter: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let init = matches!(cli.command, Commands::Config { init: true });
    let mut config = match &cli.config {
        Some(path) if init && !path.exists() => {
            let mut config = AppConfig::default();
            config.apply_env_overrides();
            config
        }
        Some(path) => {
            let mut config = AppConfig::load_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            config
        }
        None => AppConfig::load_with_env().context("failed to load config")?,
    };

    if let Some(epsilon) = cli.epsilon {
        config.privacy.epsilon = epsilon;
    }
    if let Some(seed) = cli.seed {
        config.replacement.seed = Some(seed);
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn describe(replacement: &Replacement) -> String {
    match &replacement.method {
        ReplacementMethod::Exponential {
            probability,
            candidates,
        } => format!(
            "{} (exponential, p={probability:.3} of {candidates})",
            replacement.text
        ),
        ReplacementMethod::Censored { reason } => {
            format!("{} (censored: {reason:?})", replacement.text)
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn build_engine(config: &AppConfig) -> Result<ReplacementEngine> {
    ReplacementEngine::from_config(config).context("failed to build replacement engine")
}

fn show_config(cli: &Cli, config: &AppConfig, init: bool) -> Result<()> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::config_path().context("cannot resolve config path")?,
    };

    if init {
        if path.exists() {
            bail!("config file already exists at {}", path.display());
        }
        config
            .save_to(&path)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        info!("Wrote config to {}", path.display());
    }

    if !cli.json {
        println!("# config: {}", path.display());
        if let Ok(data_dir) = AppConfig::data_dir() {
            println!("# data:   {}", data_dir.display());
        }
    }
    print_json(config)
}

fn run(cli: &Cli, config: &AppConfig) -> Result<()> {
    match &cli.command {
        Commands::Replace {
            tokens,
            context,
            accept,
        } => {
            let mut engine = build_engine(config)?;
            let mut results = Vec::with_capacity(tokens.len());
            for token in tokens {
                let replacement = engine.suggest(token, context.as_deref())?;
                if *accept {
                    engine.accept(&replacement);
                }
                results.push(replacement);
            }

            if cli.json {
                print_json(&results)?;
            } else {
                for replacement in &results {
                    println!("{}", describe(replacement));
                }
            }
            info!(
                remaining = engine.budget_status().epsilon,
                spent = engine.stats().epsilon_spent,
                "replacement run finished"
            );
        }
        Commands::Candidates { token } => {
            let candidates = build_engine(config)?.find_candidates(token)?;
            if cli.json {
                print_json(&candidates)?;
            } else if candidates.is_empty() {
                println!("no candidates");
            } else {
                println!("{}", candidates.join(", "));
            }
        }
        Commands::Noise {
            value,
            sensitivity,
            noise_epsilon,
            delta,
            mechanism,
        } => {
            let epsilon = noise_epsilon.unwrap_or(config.privacy.epsilon);
            let noisy = build_engine(config)?
                .perturb_numeric(*value, *sensitivity, epsilon, *delta, *mechanism)
                .with_context(|| format!("{mechanism} release failed"))?;
            if cli.json {
                print_json(&serde_json::json!({
                    "value": noisy,
                    "mechanism": mechanism,
                    "epsilon": epsilon,
                }))?;
            } else {
                println!("{noisy}");
            }
        }
        Commands::Report => {
            let engine = build_engine(config)?;
            let report = engine.report();
            let clusters = engine.cluster_stats()?;
            if cli.json {
                print_json(&serde_json::json!({
                    "budget": report,
                    "clusters": clusters,
                }))?;
            } else {
                println!("{}: {}", report.mechanism, report.guarantee);
                println!("{}", report.description);
                if report.exhausted {
                    println!("budget exhausted");
                }
                for (category, count) in &clusters {
                    println!("  {category}: {count}");
                }
            }
        }
        Commands::Compose { queries, advanced } => {
            let engine = build_engine(config)?;
            let composed = match advanced {
                Some(delta_prime) => engine.compose_advanced(queries, *delta_prime)?,
                None => engine.compose_basic(queries),
            };
            if cli.json {
                print_json(&composed)?;
            } else {
                println!(
                    "{:?}: epsilon={} delta={}",
                    composed.kind, composed.epsilon, composed.delta
                );
            }
        }
        Commands::Config { init } => show_config(cli, config, *init)?,
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    init_tracing(&config.logging.filter);
    info!("Starting Umbra v{}", env!("CARGO_PKG_VERSION"));

    run(&cli, &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query() {
        let query = parse_query("1.5:0.01").expect("parse");
        assert!((query.epsilon - 1.5).abs() < f64::EPSILON);
        assert!((query.delta - 0.01).abs() < f64::EPSILON);

        let query = parse_query("2").expect("delta defaults to zero");
        assert!(query.delta.abs() < f64::EPSILON);

        assert!(parse_query("abc:0.1").is_err());
    }

    #[test]
    fn test_cli_replace_args() {
        let cli = Cli::try_parse_from([
            "umbra", "replace", "Canada", "Paris", "--context", "trip", "--seed", "4",
        ])
        .expect("parse args");

        assert_eq!(cli.seed, Some(4));
        match cli.command {
            Commands::Replace {
                tokens, context, ..
            } => {
                assert_eq!(tokens, vec!["Canada", "Paris"]);
                assert_eq!(context.as_deref(), Some("trip"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_noise_mechanism() {
        let cli = Cli::try_parse_from(["umbra", "noise", "10", "--mechanism", "gaussian"])
            .expect("parse args");
        assert!(matches!(
            cli.command,
            Commands::Noise {
                mechanism: NoiseMechanism::Gaussian,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["umbra", "noise", "10", "-m", "uniform"]).is_err());
    }

    #[test]
    fn test_cli_requires_tokens() {
        assert!(Cli::try_parse_from(["umbra", "replace"]).is_err());
        assert!(Cli::try_parse_from(["umbra", "compose"]).is_err());
    }

    #[test]
    fn test_config_init_writes_file() {
        let dir = tempfile::TempDir::new().expect("create temp dir");
        let path = dir.path().join("umbra").join("config.toml");

        let cli = Cli::try_parse_from([
            "umbra",
            "config",
            "--init",
            "--json",
            "--config",
            path.to_str().expect("utf-8 temp path"),
        ])
        .expect("parse args");
        run(&cli, &AppConfig::default()).expect("write config");

        let loaded = AppConfig::load_from(&path).expect("reload written config");
        assert!((loaded.privacy.epsilon - 1.0).abs() < f64::EPSILON);
        // Refuses to overwrite
        assert!(run(&cli, &AppConfig::default()).is_err());
    }

    #[test]
    fn test_run_with_seeded_config() {
        let cli = Cli::try_parse_from(["umbra", "candidates", "Canada"]).expect("parse args");
        let mut config = AppConfig::default();
        config.replacement.seed = Some(1);
        assert!(run(&cli, &config).is_ok());
    }
}
