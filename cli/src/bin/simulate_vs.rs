use anyhow::Context;
use clap::Parser;
use combat_engine::api::{SimulationConfig, simulate_many};
use combat_engine::content::{builtin_protagonist, protagonist_from_json_str, protagonist_from_yaml_str};
use combat_engine::{Catalog, Stance};
use encoding_rs::Encoding;
use std::{fs, path::Path, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "simulate-vs")]
#[command(about = "Monte Carlo sim: every stance against one adversary")]
struct Args {
    /// Adversary id from the catalog
    #[arg(long, default_value = "goblin")]
    adversary: String,

    /// Number of encounters per stance
    #[arg(long, default_value_t = 1000)]
    trials: u32,

    /// Safety cap on simulated seconds per encounter
    #[arg(long, default_value_t = 600.0)]
    max_seconds: f64,

    /// Nominal frame length in seconds
    #[arg(long, default_value_t = 1.0 / 60.0)]
    frame_time: f64,

    /// RNG base seed (trial i uses seed+i)
    #[arg(long, default_value_t = 12345)]
    seed: u64,

    /// Optional catalog JSON/YAML (falls back to the built-in catalog)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Optional protagonist JSON/YAML (falls back to the built-in Squire)
    #[arg(long)]
    file: Option<PathBuf>,
}

fn read_text_auto(path: &Path) -> anyhow::Result<String> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    if let Some((enc, bom_len)) = Encoding::for_bom(&bytes) {
        let (cow, _, _) = enc.decode(&bytes[bom_len..]);
        Ok(cow.into_owned())
    } else {
        Ok(String::from_utf8(bytes)?)
    }
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let protagonist = match args.file.as_deref() {
        Some(path) => {
            let text = read_text_auto(path)?;
            let stats = if is_yaml(path) {
                protagonist_from_yaml_str(&text)
            } else {
                protagonist_from_json_str(&text)
            };
            stats.with_context(|| format!("parsing protagonist {}", path.display()))?
        }
        None => builtin_protagonist()?,
    };
    let catalog = match args.catalog.as_deref() {
        Some(path) => {
            let text = read_text_auto(path)?;
            let catalog = if is_yaml(path) {
                Catalog::from_yaml_str(&text)
            } else {
                Catalog::from_json_str(&text)
            };
            catalog.with_context(|| format!("parsing catalog {}", path.display()))?
        }
        None => Catalog::builtin()?,
    };
    let Some(adversary) = catalog.adversary(&args.adversary).cloned() else {
        anyhow::bail!("adversary '{}' not found", args.adversary);
    };

    println!("simulate-vs results");
    println!("-------------------");
    println!("trials per stance:  {}", args.trials);
    println!(
        "protagonist:        {} (HP {}, every {:.2}s)",
        protagonist.name,
        protagonist.max_hp(),
        protagonist.attack_speed
    );
    println!(
        "adversary:          {} (HP {}, dmg {}, every {:.2}s)",
        adversary.name(),
        adversary.max_hp,
        adversary.damage,
        adversary.attack_speed
    );
    println!();
    println!(
        "{:<10} {:>8} {:>10} {:>10} {:>10} {:>9}",
        "stance", "win %", "avg time", "swings/s", "avg dmg", "avg gold"
    );

    for stance in Stance::ALL.into_iter().filter(|s| *s != Stance::None) {
        let cfg = SimulationConfig {
            adversary_id: args.adversary.clone(),
            catalog: Some(catalog.clone()),
            protagonist: Some(protagonist.clone()),
            stance,
            seed: args.seed,
            frame_time: args.frame_time,
            max_seconds: args.max_seconds,
            ..SimulationConfig::default()
        };
        let summary = simulate_many(&cfg, args.trials)?;
        tracing::debug!(%stance, wins = summary.protagonist_wins, "stance batch done");
        println!(
            "{:<10} {:>7.1}% {:>9.2}s {:>10.3} {:>10.1} {:>9.1}",
            stance.to_string(),
            summary.win_rate * 100.0,
            summary.avg_elapsed,
            summary.protagonist_swing_rate,
            summary.avg_damage_dealt,
            summary.avg_gold
        );
    }

    Ok(())
}
