use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use protocell_core::{CellWorld, ProtocellConfig};
use protocell_render::{Lens, render};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "protocell", about = "Grid-of-programs artificial life simulation")]
struct Cli {
    /// TOML configuration file; missing keys fall back to defaults.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Number of steps to run.
    #[arg(long, default_value_t = 600)]
    ticks: u64,
    /// Override the configured RNG seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Directory to write PNG frames into; no frames without it.
    #[arg(long)]
    frames: Option<PathBuf>,
    /// Steps between exported frames.
    #[arg(long, default_value_t = 60)]
    frame_interval: u64,
    /// Lens used for exported frames.
    #[arg(long, value_enum, default_value = "energy")]
    lens: LensArg,
    /// Steps between logged summaries; 0 silences them.
    #[arg(long, default_value_t = 100)]
    log_interval: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LensArg {
    Energy,
    Age,
    Genome,
    Feed,
}

impl From<LensArg> for Lens {
    fn from(arg: LensArg) -> Self {
        match arg {
            LensArg::Energy => Self::Energy,
            LensArg::Age => Self::Age,
            LensArg::Genome => Self::Genome,
            LensArg::Feed => Self::Feed,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    info!(
        width = config.grid_width,
        height = config.grid_height,
        genome_len = config.genome_len,
        seed_count = config.seed_count,
        "Starting Protocell simulation shell"
    );

    let mut world = CellWorld::new(config)?;
    if let Some(dir) = &cli.frames {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    for step in 1..=cli.ticks {
        let events = world.step();
        if events.reseeded {
            warn!(step, "population collapsed; world reseeded");
        }
        if cli.log_interval > 0 && step % cli.log_interval == 0 {
            if let Some(summary) = world.history().last() {
                info!(
                    step,
                    tick = summary.tick.0,
                    live = summary.live_cells,
                    avg_energy = summary.average_energy,
                    step_ms = world.tick_duration().as_secs_f64() * 1e3,
                    "advanced"
                );
            }
        }
        if let Some(dir) = &cli.frames {
            if cli.frame_interval > 0 && step % cli.frame_interval == 0 {
                save_frame(&world, cli.lens.into(), dir, step)?;
            }
        }
    }

    if let Some(summary) = world.history().last() {
        info!(
            live = summary.live_cells,
            total_energy = summary.total_energy,
            "Run complete"
        );
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(cli: &Cli) -> Result<ProtocellConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => ProtocellConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.rng_seed = Some(seed);
    }
    Ok(config)
}

fn save_frame(world: &CellWorld, lens: Lens, dir: &Path, step: u64) -> Result<()> {
    let buffer = render(world, lens);
    let image = image::RgbaImage::from_raw(buffer.width, buffer.height, buffer.data)
        .context("pixel buffer dimensions disagree with contents")?;
    let path = dir.join(format!("frame_{step:06}.png"));
    image
        .save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_flag_overrides_the_config_file() {
        let cli = Cli::parse_from(["protocell", "--seed", "17"]);
        let config = load_config(&cli).expect("config");
        assert_eq!(config.rng_seed, Some(17));
    }

    #[test]
    fn partial_toml_documents_fill_from_defaults() {
        let config: ProtocellConfig =
            toml::from_str("grid_width = 32\ngrid_height = 32\nseed_count = 100").expect("toml");
        assert_eq!(config.grid_width, 32);
        assert_eq!(config.seed_count, 100);
        assert_eq!(
            config.acceleration,
            ProtocellConfig::default().acceleration
        );
    }

    #[test]
    fn lens_flags_map_onto_render_lenses() {
        assert_eq!(Lens::from(LensArg::Age), Lens::Age);
        assert_eq!(Lens::from(LensArg::Feed), Lens::Feed);
    }
}
