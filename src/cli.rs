// ============================================================================
// SkinPaint CLI — headless batch processing via command-line arguments
// ============================================================================
//
// Usage examples:
//   skinpaint segment --input skin.png --output project.skp --threshold 30
//   skinpaint segment -i skin.png -o project.skp --noise --slim
//   skinpaint export -i project.skp -o flat.png
//   skinpaint info -i project.skp
//
// All processing runs synchronously on the current thread; the offload
// mirror is never spawned in CLI mode.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::{Parser, Subcommand};

use crate::document::Document;
use crate::io;
use crate::ops::segment::{SegmentOptions, segment_into_document};
use crate::topology::ModelVariant;
use crate::{log_err, log_info};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// SkinPaint headless skin processor.
///
/// Segment Minecraft skin textures into layered projects and export
/// composites — no GUI required.
#[derive(Parser, Debug)]
#[command(
    name = "skinpaint",
    about = "SkinPaint headless skin processor",
    long_about = "Segment Minecraft skin PNGs into layered .skp projects, flatten\n\
                  projects back to PNG, and inspect project files.\n\n\
                  Example:\n  \
                  skinpaint segment --input skin.png --output project.skp --threshold 30\n  \
                  skinpaint export -i project.skp -o flat.png"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Segment a skin PNG into a layered project file.
    Segment {
        /// Input skin PNG (non-64×64 images are resampled).
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output .skp project path.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Color-similarity threshold (Euclidean RGB distance, 0–441).
        #[arg(short, long, default_value_t = 30.0, value_name = "DIST")]
        threshold: f32,

        /// Derive per-layer noise defaults from the threshold.
        #[arg(long)]
        noise: bool,

        /// Use the slim model (3-pixel-wide arms) instead of the wide one.
        #[arg(long)]
        slim: bool,
    },

    /// Flatten a project (or a skin PNG) to a composite PNG.
    Export {
        /// Input .skp project or skin PNG.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output PNG path.
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,
    },

    /// Print a summary of a project file.
    Info {
        /// Input .skp project.
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run the CLI and return an OS exit code.
/// `0` = success, `1` = failure.
pub fn run(args: CliArgs) -> ExitCode {
    let start = Instant::now();
    let result = match args.command {
        Command::Segment { input, output, threshold, noise, slim } => {
            run_segment(&input, &output, threshold, noise, slim)
        }
        Command::Export { input, output } => run_export(&input, &output),
        Command::Info { input } => run_info(&input),
    };

    match result {
        Ok(()) => {
            log_info!("cli: done in {:.0}ms", start.elapsed().as_secs_f64() * 1000.0);
            ExitCode::SUCCESS
        }
        Err(msg) => {
            eprintln!("error: {msg}");
            log_err!("cli: {msg}");
            ExitCode::FAILURE
        }
    }
}

fn run_segment(
    input: &PathBuf,
    output: &PathBuf,
    threshold: f32,
    noise: bool,
    slim: bool,
) -> Result<(), String> {
    let image = io::load_skin_png(input)
        .map_err(|e| format!("could not read '{}': {}", input.display(), e))?;

    let variant = if slim { ModelVariant::Slim } else { ModelVariant::Wide };
    let mut doc = Document::new(variant);
    let options = SegmentOptions { threshold, apply_noise_from_threshold: noise };
    let ids = segment_into_document(&mut doc, &image, &options, &mut rand::thread_rng());

    io::save_project(&doc, output)
        .map_err(|e| format!("could not write '{}': {}", output.display(), e))?;
    println!("{} layer(s) → {}", ids.len(), output.display());
    Ok(())
}

fn run_export(input: &PathBuf, output: &PathBuf) -> Result<(), String> {
    let is_project = input.extension().and_then(|e| e.to_str()) == Some("skp");

    let mut doc = if is_project {
        io::load_project(input)
            .map_err(|e| format!("could not read '{}': {}", input.display(), e))?
    } else {
        // Treat any other input as a skin image: a single direct layer.
        let image = io::load_skin_png(input)
            .map_err(|e| format!("could not read '{}': {}", input.display(), e))?;
        let mut doc = Document::default();
        let id = doc.add_layer(
            input.file_stem().and_then(|s| s.to_str()).unwrap_or("skin").to_string(),
            crate::color::Rgba::opaque(0, 0, 0),
            crate::document::LayerType::Direct,
        );
        if let Some(layer) = doc.layer_mut(id) {
            layer.pixels = image;
        }
        doc
    };

    let flat = doc.composite();
    io::write_png(output, doc.width(), doc.height(), &flat)
        .map_err(|e| format!("could not write '{}': {}", output.display(), e))?;
    println!("{} → {}", input.display(), output.display());
    Ok(())
}

fn run_info(input: &PathBuf) -> Result<(), String> {
    let doc = io::load_project(input)
        .map_err(|e| format!("could not read '{}': {}", input.display(), e))?;

    let variant = match doc.variant {
        ModelVariant::Wide => "wide",
        ModelVariant::Slim => "slim",
    };
    println!("{}", input.display());
    println!("  model:   {variant}");
    println!("  layers:  {}", doc.layers().len());
    println!("  groups:  {}", doc.groups().len());
    println!("  palette: {} entr{}", doc.palette.len(), if doc.palette.len() == 1 { "y" } else { "ies" });
    for layer in doc.layers() {
        println!(
            "    [{}] {} — {} px, order {}, {}",
            if layer.visible { "x" } else { " " },
            layer.name,
            layer.pixels.count_set(),
            layer.order,
            if layer.group_id.is_some() { "grouped" } else { "ungrouped" },
        );
    }
    Ok(())
}
