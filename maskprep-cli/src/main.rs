use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};

use maskprep_core::config::TaxonomyConfig;
use maskprep_core::mask_io::{
    color_mask_file_name, is_generated_file, is_label_file, label_file_name, list_image_files,
    load_class_array, load_color_mask, save_class_array, save_color_mask,
};
use maskprep_core::taxonomy::resolve_taxonomy as builtin_taxonomy;
use maskprep_core::{image_from_class_array, image_to_class_array_with_summary, ForwardTable};

#[cfg(feature = "video")]
use maskprep_core::sampling::{
    FrameFormat, SamplingPlan, DEFAULT_JPEG_QUALITY, DEFAULT_PNG_COMPRESSION,
};

#[derive(Parser)]
#[command(
    name = "maskprep",
    about = "Convert segmentation color masks to class-label images and sample video frames"
)]
struct Cli {
    /// Taxonomy JSON file (overrides --taxonomy)
    #[arg(long, global = true, env = "MASKPREP_TAXONOMY")]
    config: Option<PathBuf>,

    /// Built-in taxonomy name
    #[arg(long, global = true, default_value = "cca")]
    taxonomy: String,

    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert color masks to <stem>_intLabels.png class-label images
    Labels {
        /// Mask file or directory of masks
        #[arg(default_value = "colormasks")]
        input: PathBuf,

        /// Directory to write label images to
        #[arg(long, short, default_value = "out")]
        output_dir: PathBuf,
    },

    /// Convert class-label images back to <stem>_colorMask.png color masks
    Colorize {
        /// Label image or directory of label images
        #[arg(default_value = "out")]
        input: PathBuf,

        /// Directory to write color masks to
        #[arg(long, short, default_value = "out")]
        output_dir: PathBuf,
    },

    /// Print the active taxonomy
    Show {
        /// Print as a taxonomy JSON file
        #[arg(long)]
        json: bool,
    },

    /// Sample still images from MP4 videos every N frames
    #[cfg(feature = "video")]
    Sample {
        /// Number of frames between sampled images
        sampling_interval: u64,

        /// Output image format: png, jpeg, jpg
        img_format: String,

        /// Videos to sample
        #[arg(required = true)]
        video_paths: Vec<PathBuf>,

        /// JPEG quality level (1-100)
        #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
        quality: u8,

        /// PNG compression level (0-9)
        #[arg(long, default_value_t = DEFAULT_PNG_COMPRESSION)]
        compression: u8,

        /// Frame to start at
        #[arg(long, default_value_t = 0)]
        start_frame: u64,

        /// Frame to end at (negative: whole video)
        #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
        end_frame: i64,

        /// Directory to save sampled images in
        #[arg(long, default_value = "out")]
        save_dir: PathBuf,
    },
}

fn resolve_taxonomy(config: Option<&Path>, name: &str) -> Result<ForwardTable> {
    if let Some(path) = config {
        let table = TaxonomyConfig::from_path(path)
            .and_then(TaxonomyConfig::into_table)
            .with_context(|| format!("loading taxonomy from {}", path.display()))?;
        info!("Using taxonomy file {}", path.display());
        return Ok(table);
    }

    Ok(builtin_taxonomy(name)?)
}

/// A single file, or every image file in a directory that passes `keep`.
fn collect_inputs(input: &Path, keep: fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    if input.is_dir() {
        let files = list_image_files(input)
            .with_context(|| format!("reading directory {}", input.display()))?;
        Ok(files.into_iter().filter(|p| keep(p)).collect())
    } else if input.is_file() {
        Ok(vec![input.to_path_buf()])
    } else {
        bail!("{} does not exist", input.display())
    }
}

/// Run `convert` on every input, logging failures instead of stopping.
fn run_each(
    inputs: &[PathBuf],
    output_dir: &Path,
    mut convert: impl FnMut(&Path, &Path) -> Result<PathBuf>,
) -> Result<()> {
    if inputs.is_empty() {
        info!("No images found");
        return Ok(());
    }

    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;

    let mut errors: Vec<String> = Vec::new();
    for input in inputs {
        match convert(input, output_dir) {
            Ok(output) => info!("{} -> {}", input.display(), output.display()),
            Err(e) => {
                let msg = format!("{}: {:#}", input.display(), e);
                error!("{}", msg);
                errors.push(msg);
            }
        }
    }

    info!(
        "Done! Converted: {}, Errors: {}",
        inputs.len() - errors.len(),
        errors.len()
    );
    if !errors.is_empty() {
        bail!("{} of {} files failed", errors.len(), inputs.len());
    }
    Ok(())
}

fn convert_to_labels(table: &ForwardTable, input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let mask = load_color_mask(input, table.channel_order())?;
    let (classes, summary) = image_to_class_array_with_summary(&mask, table);
    log::debug!(
        "{}: {} exact, {} nearest, {} rejected",
        input.display(),
        summary.exact,
        summary.nearest,
        summary.rejected
    );

    let output = output_dir.join(label_file_name(input));
    save_class_array(&classes, &output)?;
    Ok(output)
}

fn convert_to_colors(table: &ForwardTable, input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let classes = load_class_array(input)?;
    let colors = image_from_class_array(&classes, &table.reverse())?;

    let output = output_dir.join(color_mask_file_name(input));
    save_color_mask(&colors, table.channel_order(), &output)?;
    Ok(output)
}

fn cmd_show(table: &ForwardTable, json: bool) -> Result<()> {
    if json {
        println!("{}", TaxonomyConfig::from_table(table).to_json_pretty()?);
        return Ok(());
    }

    println!("Channel order: {:?}", table.channel_order());
    for entry in table.entries() {
        println!("  {:>3}  {}  {}", entry.id, entry.color.to_hex(), entry.name);
    }
    let fallback = table.fallback();
    match fallback.max_distance {
        Some(d) => println!(
            "Unmatched colors: nearest class within {}, else class {}",
            d, fallback.sentinel
        ),
        None => println!("Unmatched colors: nearest class"),
    }
    Ok(())
}

#[cfg(feature = "video")]
#[allow(clippy::too_many_arguments)]
fn cmd_sample(
    interval: u64,
    img_format: &str,
    videos: &[PathBuf],
    quality: u8,
    compression: u8,
    start_frame: u64,
    end_frame: i64,
    save_dir: &Path,
) -> Result<()> {
    let format = FrameFormat::parse(img_format, quality, compression)?;
    let plan = SamplingPlan::from_signed_end(interval, start_frame, end_frame)?;

    std::fs::create_dir_all(save_dir)
        .with_context(|| format!("creating {}", save_dir.display()))?;

    let mut failed = 0usize;
    for video in videos {
        match maskprep_core::video::sample_video(video, &plan, format, save_dir) {
            Ok(report) => info!("{}: saved {} frames", video.display(), report.saved.len()),
            Err(e) => {
                error!("{}", e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} videos failed", failed, videos.len());
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Commands::Labels { input, output_dir } => {
            let table = resolve_taxonomy(cli.config.as_deref(), &cli.taxonomy)?;
            let inputs = collect_inputs(&input, |p| !is_generated_file(p))?;
            run_each(&inputs, &output_dir, |path, dir| {
                convert_to_labels(&table, path, dir)
            })?;
        }

        Commands::Colorize { input, output_dir } => {
            let table = resolve_taxonomy(cli.config.as_deref(), &cli.taxonomy)?;
            let inputs = collect_inputs(&input, is_label_file)?;
            run_each(&inputs, &output_dir, |path, dir| {
                convert_to_colors(&table, path, dir)
            })?;
        }

        Commands::Show { json } => {
            let table = resolve_taxonomy(cli.config.as_deref(), &cli.taxonomy)?;
            cmd_show(&table, json)?;
        }

        #[cfg(feature = "video")]
        Commands::Sample {
            sampling_interval,
            img_format,
            video_paths,
            quality,
            compression,
            start_frame,
            end_frame,
            save_dir,
        } => {
            cmd_sample(
                sampling_interval,
                &img_format,
                &video_paths,
                quality,
                compression,
                start_frame,
                end_frame,
                &save_dir,
            )?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use image::{GrayImage, RgbImage};
    use maskprep_core::ColorKey;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_resolve_builtin_and_unknown() {
        assert!(resolve_taxonomy(None, "cca").is_ok());
        let err = resolve_taxonomy(None, "nope").unwrap_err();
        assert_eq!(err.to_string(), "unknown taxonomy 'nope', available: cca");
    }

    #[test]
    fn test_resolve_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roads.json");
        std::fs::write(
            &path,
            r##"{ "classes": [
                { "name": "bg", "color": "#000000", "id": 0 },
                { "name": "road", "color": "#808080", "id": 1 }
            ] }"##,
        )
        .unwrap();
        let table = resolve_taxonomy(Some(&path), "cca").unwrap();
        assert_eq!(table.len(), 2);
        assert!(resolve_taxonomy(Some(&dir.path().join("missing.json")), "cca").is_err());
    }

    #[test]
    fn test_labels_then_colorize() {
        let dir = tempfile::tempdir().unwrap();
        let masks = dir.path().join("colormasks");
        let out = dir.path().join("out");
        std::fs::create_dir(&masks).unwrap();
        let pixels = vec![0, 0, 0, 255, 0, 255, 0, 255, 0, 12, 3, 4];
        RgbImage::from_raw(2, 2, pixels)
            .unwrap()
            .save(masks.join("a.png"))
            .unwrap();
        std::fs::write(masks.join("readme.txt"), "not a mask").unwrap();

        let table = resolve_taxonomy(None, "cca").unwrap();
        let inputs = collect_inputs(&masks, |p| !is_generated_file(p)).unwrap();
        assert_eq!(inputs.len(), 1);
        run_each(&inputs, &out, |p, d| convert_to_labels(&table, p, d)).unwrap();

        let labels = out.join("a_intLabels.png");
        let classes = load_class_array(&labels).unwrap();
        assert_eq!(classes.iter().copied().collect::<Vec<_>>(), vec![2, 1, 0, 2]);

        let label_inputs = collect_inputs(&out, is_label_file).unwrap();
        assert_eq!(label_inputs, vec![labels]);
        run_each(&label_inputs, &out, |p, d| convert_to_colors(&table, p, d)).unwrap();
        let colors = load_color_mask(&out.join("a_colorMask.png"), table.channel_order()).unwrap();
        assert_eq!(colors[[1, 1]], ColorKey::new(0, 0, 0));
        assert_eq!(colors[[0, 1]], ColorKey::new(255, 0, 255));
    }

    #[test]
    fn test_colorize_reports_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_intLabels.png");
        GrayImage::from_raw(2, 1, vec![0, 7]).unwrap().save(&path).unwrap();

        let table = resolve_taxonomy(None, "cca").unwrap();
        let err = convert_to_colors(&table, &path, dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("x = 1, y = 0"));
        assert!(!dir.path().join("bad_colorMask.png").exists());

        let result = run_each(&[path], dir.path(), |p, d| convert_to_colors(&table, p, d));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_input() {
        assert!(collect_inputs(Path::new("/definitely/not/here"), is_label_file).is_err());
    }
}
