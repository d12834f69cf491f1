// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use vxlit::{DisplayTarget, RenderMode};

mod cli;

#[derive(Parser)]
#[command(name = "vxlit")]
#[command(about = "Depth camera to volumetric display pipeline")]
#[command(version = vxlit::constants::app_info::version())]
struct Cli {
    /// Config file (default: <config dir>/vxlit/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render frames of a procedural scene from an orbiting camera
    Simulate {
        /// Number of frames to render
        #[arg(short, long, default_value = "8")]
        frames: usize,

        /// Capture resolution (overrides the config)
        #[arg(short, long)]
        resolution: Option<u32>,

        /// Render mode (overrides the config)
        #[arg(short, long, value_enum)]
        mode: Option<ModeArg>,

        /// Display target (overrides the config)
        #[arg(short, long, value_enum)]
        target: Option<TargetArg>,

        /// Draw every captured sample instead of the nearest per line
        #[arg(long)]
        xray: bool,

        /// Write the last frame's points to this LAS file
        #[arg(long)]
        las: Option<PathBuf>,
    },

    /// Render one frame from a 16-bit depth PNG and a colour PNG
    Render {
        /// 16-bit grayscale depth image
        #[arg(short, long)]
        depth: PathBuf,

        /// RGB colour image of the same size
        #[arg(short, long)]
        color: PathBuf,

        /// Write the resolved points to this LAS file
        #[arg(long)]
        las: Option<PathBuf>,
    },

    /// Dump one procedural frame as depth and colour PNGs
    Capture {
        /// Capture resolution (overrides the config)
        #[arg(short, long)]
        resolution: Option<u32>,

        /// Output directory (default: <data dir>/vxlit)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print buffer sizing for each display target
    Info {
        /// Capture resolution (overrides the config)
        #[arg(short, long)]
        resolution: Option<u32>,
    },

    /// Print the effective config, optionally writing it out
    Config {
        /// Save the effective config to the config path
        #[arg(long)]
        save: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Batched,
    DepthWalk,
    Single,
    Raw,
}

impl From<ModeArg> for RenderMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Batched => RenderMode::Batched,
            ModeArg::DepthWalk => RenderMode::DepthWalk,
            ModeArg::Single => RenderMode::SingleCall,
            ModeArg::Raw => RenderMode::RawBatched,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum TargetArg {
    Led,
    Voxiebox,
}

impl From<TargetArg> for DisplayTarget {
    fn from(target: TargetArg) -> Self {
        match target {
            TargetArg::Led => DisplayTarget::Led,
            TargetArg::Voxiebox => DisplayTarget::VoxieBox,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=vxlit=trace, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(vxlit::Config::default_path);

    match cli.command {
        Commands::Simulate {
            frames,
            resolution,
            mode,
            target,
            xray,
            las,
        } => {
            let mut config = vxlit::Config::load_or_default(&config_path)?;
            if let Some(r) = resolution {
                config.resolution = r;
            }
            if let Some(m) = mode {
                config.render_mode = m.into();
            }
            if let Some(t) = target {
                config.display_target = t.into();
            }
            if xray {
                config.camera_occluding = false;
            }
            cli::simulate(config, frames, las)
        }
        Commands::Render { depth, color, las } => {
            let config = vxlit::Config::load_or_default(&config_path)?;
            cli::render_images(config, &depth, &color, las)
        }
        Commands::Capture { resolution, output } => {
            let mut config = vxlit::Config::load_or_default(&config_path)?;
            if let Some(r) = resolution {
                config.resolution = r;
            }
            cli::capture(&config, output)
        }
        Commands::Info { resolution } => {
            let config = vxlit::Config::load_or_default(&config_path)?;
            cli::info(resolution.unwrap_or(config.resolution), config.headroom)
        }
        Commands::Config { save } => {
            let config = vxlit::Config::load_or_default(&config_path)?;
            cli::show_config(&config, &config_path, save)
        }
    }
}
