use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use combat_engine::api::{SimulationConfig, describe_rewards, simulate_encounter, simulate_many};
use combat_engine::content::{builtin_protagonist, protagonist_from_json_str, protagonist_from_yaml_str};
use combat_engine::{
    Catalog, Dice, ProtagonistStats, Stance, build_adversary_snapshot, build_protagonist_snapshot,
    effective_armor, preview_attacker_vs_defender, preview_defender_vs_attacker, roll_rewards,
};
use encoding_rs::Encoding;
use std::{fs, path::Path, path::PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Copy, Clone, ValueEnum)]
enum StanceArg {
    None,
    Berserker,
    Defensive,
    Precision,
}

#[derive(Args)]
struct ContentArgs {
    /// Catalog JSON/YAML with adversaries and reward tables (built-in when omitted)
    #[arg(long)]
    catalog: Option<PathBuf>,
    /// Protagonist sheet JSON/YAML (built-in Squire when omitted)
    #[arg(long)]
    protagonist: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Cmd {
    /// Show both sides' hit and crit odds without fighting
    Preview {
        /// Adversary id from the catalog
        #[arg(long, default_value = "goblin")]
        adversary: String,
        /// Protagonist stance
        #[arg(long, value_enum, default_value_t = StanceArg::Defensive)]
        stance: StanceArg,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Simulate one encounter and print its log
    Fight {
        /// Adversary id from the catalog
        #[arg(long, default_value = "goblin")]
        adversary: String,
        /// Protagonist stance (none falls back to the default stance)
        #[arg(long, value_enum, default_value_t = StanceArg::None)]
        stance: StanceArg,
        /// RNG seed for determinism
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Cap on simulated seconds
        #[arg(long, default_value_t = 600.0)]
        max_seconds: f64,
        /// Print the full report as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Simulate many encounters and summarize the outcomes
    Batch {
        /// Adversary id from the catalog
        #[arg(long, default_value = "goblin")]
        adversary: String,
        /// Protagonist stance (none falls back to the default stance)
        #[arg(long, value_enum, default_value_t = StanceArg::None)]
        stance: StanceArg,
        /// RNG base seed (sample i uses seed+i)
        #[arg(long, default_value_t = 12345)]
        seed: u64,
        /// Number of encounters
        #[arg(long, default_value_t = 200)]
        samples: u32,
        /// Print the summary as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// Roll a reward table several times
    Loot {
        /// Reward table id from the catalog
        #[arg(long)]
        table: String,
        /// Number of rolls
        #[arg(long, default_value_t = 10)]
        rolls: u32,
        /// RNG seed for determinism
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[command(flatten)]
        content: ContentArgs,
    },
    /// List the adversaries and reward tables in the catalog
    List {
        #[command(flatten)]
        content: ContentArgs,
    },
}

#[derive(Parser)]
#[command(name = "combat")]
#[command(about = "Real-time combat encounter harness")]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,
}

fn to_stance(s: StanceArg) -> Stance {
    match s {
        StanceArg::None => Stance::None,
        StanceArg::Berserker => Stance::Berserker,
        StanceArg::Defensive => Stance::Defensive,
        StanceArg::Precision => Stance::Precision,
    }
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

fn load_catalog(path: Option<&Path>) -> anyhow::Result<Catalog> {
    let Some(path) = path else {
        return Ok(Catalog::builtin()?);
    };
    tracing::debug!(path = %path.display(), "loading catalog");
    let text = read_text_auto(path)?;
    let catalog = if is_yaml(path) {
        Catalog::from_yaml_str(&text)
    } else {
        Catalog::from_json_str(&text)
    };
    catalog.with_context(|| format!("parsing catalog {}", path.display()))
}

fn load_protagonist(path: Option<&Path>) -> anyhow::Result<ProtagonistStats> {
    let Some(path) = path else {
        return Ok(builtin_protagonist()?);
    };
    tracing::debug!(path = %path.display(), "loading protagonist");
    let text = read_text_auto(path)?;
    let stats = if is_yaml(path) {
        protagonist_from_yaml_str(&text)
    } else {
        protagonist_from_json_str(&text)
    };
    stats.with_context(|| format!("parsing protagonist {}", path.display()))
}

fn simulation_config(
    adversary: String,
    stance: StanceArg,
    seed: u64,
    content: &ContentArgs,
) -> anyhow::Result<SimulationConfig> {
    Ok(SimulationConfig {
        adversary_id: adversary,
        catalog: Some(load_catalog(content.catalog.as_deref())?),
        protagonist: Some(load_protagonist(content.protagonist.as_deref())?),
        stance: to_stance(stance),
        seed,
        ..SimulationConfig::default()
    })
}

fn preview(adversary_id: &str, stance: Stance, content: &ContentArgs) -> anyhow::Result<()> {
    let catalog = load_catalog(content.catalog.as_deref())?;
    let hero = load_protagonist(content.protagonist.as_deref())?;
    let Some(adversary) = catalog.adversary(adversary_id) else {
        bail!("adversary '{}' not found", adversary_id);
    };

    let hero_snap = build_protagonist_snapshot(&hero);
    let foe_snap = build_adversary_snapshot(adversary);
    let hero_odds = preview_attacker_vs_defender(&hero_snap, stance, adversary.evasion);
    let foe_odds = preview_defender_vs_attacker(&foe_snap, adversary.hit_chance, hero.evasion_bonus());

    let label = format!("{stance} {}", stance.describe_effects());
    println!("{} vs {} [{}]", hero.name, adversary.name(), label.trim_end());
    println!(
        "  {:<14} hit {:>5.1}%  crit {:>5.1}%  dmg {:>4}  armor {:>3}  hp {:>4}  every {:.2}s",
        hero.name,
        hero_odds.hit * 100.0,
        hero_odds.crit * 100.0,
        hero_snap.base_damage,
        effective_armor(stance, hero_snap.armor),
        hero.starting_health().hp,
        hero.attack_speed
    );
    println!(
        "  {:<14} hit {:>5.1}%  crit {:>5.1}%  dmg {:>4}  armor {:>3}  hp {:>4}  every {:.2}s",
        adversary.name(),
        foe_odds.hit * 100.0,
        foe_odds.crit * 100.0,
        foe_snap.base_damage,
        foe_snap.armor,
        adversary.starting_health().hp,
        adversary.attack_speed
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Cmd::Preview {
            adversary,
            stance,
            content,
        } => preview(&adversary, to_stance(stance), &content)?,
        Cmd::Fight {
            adversary,
            stance,
            seed,
            max_seconds,
            json,
            content,
        } => {
            let cfg = SimulationConfig {
                max_seconds,
                ..simulation_config(adversary, stance, seed, &content)?
            };
            let report = simulate_encounter(&cfg)?;
            tracing::info!(winner = %report.winner, elapsed = report.elapsed, "fight finished");
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                for line in &report.log {
                    println!("{line}");
                }
                println!(
                    "winner={} elapsed={:.2}s hp={}/{} swings={}/{}",
                    report.winner,
                    report.elapsed,
                    report.protagonist_hp_end,
                    report.adversary_hp_end,
                    report.stats.protagonist_swings,
                    report.stats.adversary_swings
                );
            }
        }
        Cmd::Batch {
            adversary,
            stance,
            seed,
            samples,
            json,
            content,
        } => {
            let cfg = simulation_config(adversary, stance, seed, &content)?;
            let summary = simulate_many(&cfg, samples)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("batch results");
                println!("-------------");
                println!("adversary:          {}", summary.adversary_id);
                println!("stance:             {}", summary.stance);
                println!("samples:            {}", summary.samples);
                println!();
                println!("win rate:           {:.1}%", summary.win_rate * 100.0);
                println!("losses:             {}", summary.adversary_wins);
                println!("undecided:          {}", summary.undecided);
                println!("avg fight length:   {:.2}s", summary.avg_elapsed);
                println!("swings/s (you):     {:.3}", summary.protagonist_swing_rate);
                println!("swings/s (foe):     {:.3}", summary.adversary_swing_rate);
                println!("avg damage dealt:   {:.1}", summary.avg_damage_dealt);
                println!("avg gold:           {:.1}", summary.avg_gold);
            }
        }
        Cmd::Loot {
            table,
            rolls,
            seed,
            content,
        } => {
            let catalog = load_catalog(content.catalog.as_deref())?;
            let Some(loot) = catalog.reward_table(&table) else {
                bail!("reward table '{}' not found", table);
            };
            let mut dice = Dice::from_seed(seed);
            for i in 1..=rolls {
                let bundle = roll_rewards(loot, &mut dice);
                println!("#{i}: {}", describe_rewards(&bundle));
            }
        }
        Cmd::List { content } => {
            let catalog = load_catalog(content.catalog.as_deref())?;
            println!("adversaries:");
            for a in catalog.adversaries() {
                let loot = if a.loot_table.is_empty() { "-" } else { a.loot_table.as_str() };
                println!(
                    "  {:<16} {:<18} lvl {:>2}  hp {:>4}  loot {}",
                    a.id,
                    a.name(),
                    a.level,
                    a.max_hp,
                    loot
                );
            }
            println!("reward tables:");
            for t in catalog.reward_tables() {
                println!("  {:<16} {} drops, {} xp", t.id, t.drops.len(), t.xp_on_kill);
            }
        }
    }
    Ok(())
}
