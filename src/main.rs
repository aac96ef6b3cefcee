mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{measure_stars, show_growth, show_profile, show_sky};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Measure {
            fits,
            stars,
            bands,
            zero_point,
            format,
            aperture,
            exposure,
        } => {
            let params = aperture.to_aperture_params()?;
            measure_stars(&fits, &stars, &bands, zero_point, &params, &exposure, &format)?;
        }
        Commands::Sky {
            fits,
            x,
            y,
            plane,
            format,
            aperture,
        } => {
            let params = aperture.to_aperture_params()?;
            show_sky(&fits, x, y, plane, &params, &format)?;
        }
        Commands::Profile {
            fits,
            x,
            y,
            radius,
            plane,
            points,
            format,
            aperture,
            exposure,
        } => {
            let params = aperture.to_aperture_params()?;
            show_profile(
                &fits, x, y, radius, plane, points, &params, &exposure, &format,
            )?;
        }
        Commands::Growth {
            fits,
            x,
            y,
            steps,
            plane,
            tolerance,
            format,
            aperture,
        } => {
            let params = aperture.to_aperture_params()?;
            show_growth(&fits, x, y, steps, plane, tolerance, &params, &format)?;
        }
    }

    Ok(())
}
