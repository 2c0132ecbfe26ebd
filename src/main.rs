use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate::matcher::{self, AuthResponse, Identification};
use facegate::storage::{FaceRecord, Store};
use facegate::{config, Detection, Embedding, Pipeline};
use facegate_vision::{similarity, CaptureError, FaceLocator, FixedRegion, WholeFrame};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facegate")]
#[command(version, about = "Face embedding enrollment and authentication")]
struct Cli {
    /// Config file (defaults to the compiled-in location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face image for a user, replacing any previous enrollment
    Enroll {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: PathBuf,
        /// Face region as x,y,w,h (defaults to the whole image)
        #[arg(long, value_parser = parse_region)]
        region: Option<Detection>,
    },
    /// Authenticate a face image against one user's enrollment
    Verify {
        #[arg(short, long)]
        user: String,
        #[arg(short, long)]
        image: PathBuf,
        #[arg(long, value_parser = parse_region)]
        region: Option<Detection>,
        /// Override the configured threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        #[arg(long)]
        json: bool,
    },
    /// Find the best-matching enrolled user for a face image
    Identify {
        #[arg(short, long)]
        image: PathBuf,
        #[arg(long, value_parser = parse_region)]
        region: Option<Detection>,
        #[arg(short, long)]
        threshold: Option<f32>,
        #[arg(long)]
        json: bool,
    },
    /// Print the similarity between two face images
    Compare {
        first: PathBuf,
        second: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// List enrolled users
    List,
    /// Remove a user's enrollment
    Remove {
        #[arg(short, long)]
        user: String,
    },
    /// Remove every enrollment
    Purge {
        /// Confirm dropping all enrolled users
        #[arg(long)]
        yes: bool,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<ExitCode> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;
    let store = Store::open(&cfg.store_dir);

    match cli.command {
        Commands::Enroll {
            user,
            image,
            region,
        } => enroll(&cfg, &store, &user, &image, region),
        Commands::Verify {
            user,
            image,
            region,
            threshold,
            json,
        } => verify(&cfg, &store, &user, &image, region, threshold, json),
        Commands::Identify {
            image,
            region,
            threshold,
            json,
        } => identify(&cfg, &store, &image, region, threshold, json),
        Commands::Compare {
            first,
            second,
            json,
        } => compare(&cfg, &first, &second, json),
        Commands::List => list(&store),
        Commands::Remove { user } => remove(&store, &user),
        Commands::Purge { yes } => purge(&store, yes),
        Commands::Config => open_config(&cfg, cli.config.as_deref()),
    }
}

fn parse_region(raw: &str) -> Result<Detection, String> {
    let parts: Vec<f32> = raw
        .split(',')
        .map(|p| p.trim().parse::<f32>())
        .collect::<Result<_, _>>()
        .map_err(|e| format!("invalid region {raw:?}: {e}"))?;
    match parts[..] {
        [x, y, w, h] if w > 0.0 && h > 0.0 => Ok(Detection::new(x, y, w, h)),
        _ => Err(format!("region must be x,y,w,h with positive size, got {raw:?}")),
    }
}

fn locator(region: Option<Detection>) -> Box<dyn FaceLocator> {
    match region {
        Some(d) => Box::new(FixedRegion(d)),
        None => Box::new(WholeFrame),
    }
}

fn capture(pipeline: &Pipeline, path: &Path) -> Result<Embedding> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to open {}", path.display()))?;
    match pipeline.extract_from_bytes(&bytes) {
        Ok(embedding) => Ok(embedding),
        Err(CaptureError::NoFace) => {
            anyhow::bail!("No face detected in {}", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to process {}", path.display())),
    }
}

fn threshold_or_default(cfg: &config::Config, threshold: Option<f32>) -> Result<f32> {
    let threshold = threshold.unwrap_or(cfg.threshold);
    if !(-1.0..=1.0).contains(&threshold) {
        anyhow::bail!("threshold {threshold} is outside [-1, 1]");
    }
    Ok(threshold)
}

fn report(response: &AuthResponse, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(response)?);
    } else {
        if let Some(confidence) = response.confidence {
            info!("Confidence: {:.1}%", confidence);
        }
        if response.authenticated {
            info!("✓ {}", response.message);
        } else {
            warn!("{}", response.message);
        }
    }
    Ok(if response.authenticated {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn enroll(
    cfg: &config::Config,
    store: &Store,
    user: &str,
    image: &Path,
    region: Option<Detection>,
) -> Result<ExitCode> {
    info!("Enrolling user: {}", user);
    let pipeline = cfg
        .build_pipeline(locator(region))
        .context("Failed to initialize face pipeline")?;
    let embedding = capture(&pipeline, image)?;

    let replaced = store
        .enroll(FaceRecord::new(user, &embedding))
        .context("Failed to save face record")?;
    if replaced {
        info!("Replaced previous enrollment for user: {}", user);
    }
    info!("✓ Face enrolled successfully for user: {}", user);
    Ok(ExitCode::SUCCESS)
}

fn verify(
    cfg: &config::Config,
    store: &Store,
    user: &str,
    image: &Path,
    region: Option<Detection>,
    threshold: Option<f32>,
    json: bool,
) -> Result<ExitCode> {
    let threshold = threshold_or_default(cfg, threshold)?;
    info!("Verifying user: {} (threshold {:.3})", user, threshold);

    if !store.contains(user).context("Failed to load face records")? {
        anyhow::bail!("User \"{}\" not found. Run 'enroll' first.", user);
    }

    let pipeline = cfg
        .build_pipeline(locator(region))
        .context("Failed to initialize face pipeline")?;
    let probe = capture(&pipeline, image)?;
    let verdict = matcher::verify(store, user, &probe, threshold)?;
    report(&AuthResponse::from_verdict(user, verdict), json)
}

fn identify(
    cfg: &config::Config,
    store: &Store,
    image: &Path,
    region: Option<Detection>,
    threshold: Option<f32>,
    json: bool,
) -> Result<ExitCode> {
    let threshold = threshold_or_default(cfg, threshold)?;
    let snapshot = store.snapshot().context("Failed to load face records")?;
    info!("Found {} enrolled user(s)", snapshot.len());

    let outcome = if snapshot.is_empty() {
        Identification::NoCandidates
    } else {
        let pipeline = cfg
            .build_pipeline(locator(region))
            .context("Failed to initialize face pipeline")?;
        let probe = capture(&pipeline, image)?;
        matcher::identify(&snapshot, &probe, threshold)?
    };
    report(&AuthResponse::from_identification(&outcome), json)
}

fn compare(cfg: &config::Config, first: &Path, second: &Path, json: bool) -> Result<ExitCode> {
    let pipeline = cfg
        .build_pipeline(Box::new(WholeFrame))
        .context("Failed to initialize face pipeline")?;
    let a = capture(&pipeline, first)?;
    let b = capture(&pipeline, second)?;
    let score = similarity(&a, &b)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "similarity": score,
                "confidence": matcher::confidence(score),
            })
        );
    } else {
        info!(
            "{} <-> {}: {:.4} ({:.1}%)",
            first.display(),
            second.display(),
            score,
            matcher::confidence(score)
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn list(store: &Store) -> Result<ExitCode> {
    let users = store.list().context("Failed to load face records")?;
    for user in &users {
        println!("{user}");
    }
    info!("{} user(s) enrolled", users.len());
    Ok(ExitCode::SUCCESS)
}

fn remove(store: &Store, user: &str) -> Result<ExitCode> {
    if store.remove(user).context("Failed to remove face record")? {
        info!("✓ Removed enrollment for user: {}", user);
        Ok(ExitCode::SUCCESS)
    } else {
        warn!("User \"{}\" was not enrolled", user);
        Ok(ExitCode::FAILURE)
    }
}

fn purge(store: &Store, yes: bool) -> Result<ExitCode> {
    if !yes {
        anyhow::bail!("Refusing to purge without --yes");
    }
    info!("Purging all enrollments in {}", store.path().display());

    let count = store.purge().context("Failed to purge face records")?;

    info!("✓ Purged {} enrollment(s)", count);
    Ok(ExitCode::SUCCESS)
}

fn open_config(cfg: &config::Config, path: Option<&Path>) -> Result<ExitCode> {
    let config_path = path.unwrap_or(&config::CONFIG_PATH);
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    if !config_path.exists() {
        info!("Writing default config to {}", config_path.display());
        config::save_config(cfg, Some(config_path)).context("Failed to write config")?;
    }

    info!("Opening config file: {}", config_path.display());

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(ExitCode::SUCCESS)
}
