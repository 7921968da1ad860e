//! coadd_2dspec - coadd the spec2d files of one target and re-extract them.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser};

use coadd2d::exposure::ExposureSource;
use coadd2d::extraction::ExtractionFlags;
use coadd2d::{
    basename_from_spec2d, discover_spec2d, load_spectrograph, Coadd2d, Coadd2dFile, CoaddConfig,
    CoaddRequest, DetectorSelection, FitsExposureSource, FitsOutputWriter, Spectrograph,
};

#[derive(Parser, Debug)]
#[command(name = "coadd_2dspec")]
#[command(about = "Coadd 2D spectra of one target and re-extract the combined frames")]
#[command(version)]
#[command(group(ArgGroup::new("input").required(true).args(["file", "obj"])))]
struct Cli {
    /// coadd2d file listing the configuration and the spec2d files.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Object name used to find `Science/spec2d_*<obj>*` files instead of a coadd2d file.
    #[arg(long)]
    obj: Option<String>,

    /// Only coadd this detector number.
    #[arg(long)]
    det: Option<u8>,

    /// Wavelength grid sampling factor: >1 finer, <1 coarser.
    #[arg(long = "samp_fact", default_value_t = 1.0)]
    samp_fact: f64,

    /// This is a standard star reduction.
    #[arg(long)]
    std: bool,

    /// Log a summary of every extracted object.
    #[arg(long)]
    show: bool,

    /// Log the peaks found by object finding.
    #[arg(long)]
    peaks: bool,

    /// Basename of the output files. Defaults to the token after the first
    /// `_` of the first spec2d file name.
    #[arg(long)]
    basename: Option<String>,

    /// Debug logging.
    #[arg(long)]
    debug: bool,

    /// Reduction root holding `Science/`.
    #[arg(long, default_value = ".")]
    redux_path: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    common::log_setup::setup_logging(level, &cli.redux_path.join("log"), "coadd2d");

    run(&cli)
}

/// Spectrograph, configuration and spec2d files of the run.
fn resolve_inputs(cli: &Cli, science_dir: &Path) -> Result<(Box<dyn Spectrograph>, CoaddConfig, Vec<PathBuf>)> {
    if let Some(file) = &cli.file {
        let coadd_file = Coadd2dFile::from_path(file, science_dir)
            .with_context(|| format!("Failed to read coadd2d file {}", file.display()))?;
        let spectrograph = load_spectrograph(&coadd_file.spectrograph)?;
        let config = spectrograph
            .default_config()
            .merged_with(&coadd_file.config_lines)
            .context("Invalid configuration in the coadd2d file")?;
        return Ok((spectrograph, config, coadd_file.spec2d_files));
    }

    let obj = cli
        .obj
        .as_deref()
        .context("Either --file or --obj must be given")?;
    let files = discover_spec2d(science_dir, obj)?;
    let header = FitsExposureSource.read_header(&files[0])?;
    let name = header
        .get_str("SPECTROG")
        .with_context(|| format!("No SPECTROG keyword in {}", files[0].display()))?;
    let spectrograph = load_spectrograph(name)?;
    let config = spectrograph.default_config();
    Ok((spectrograph, config, files))
}

fn run(cli: &Cli) -> Result<()> {
    let science_dir = cli.redux_path.join("Science");
    let (spectrograph, mut config, spec2d_files) = resolve_inputs(cli, &science_dir)?;

    config.redux_path = cli.redux_path.clone();
    config.combine.samp_fact = cli.samp_fact;
    if let Some(det) = cli.det {
        tracing::info!(det, "Restricting the coadd to one detector");
        config.detnum = DetectorSelection::Single(det);
    }
    config.validate()?;

    let basename = match &cli.basename {
        Some(basename) => basename.clone(),
        None => basename_from_spec2d(&spec2d_files[0]).with_context(|| {
            format!(
                "Cannot derive a basename from {}, pass --basename",
                spec2d_files[0].display()
            )
        })?,
    };

    let request = CoaddRequest {
        spec2d_files,
        basename,
        flags: ExtractionFlags {
            std: cli.std,
            show: cli.show,
            show_peaks: cli.peaks,
        },
    };

    let source = FitsExposureSource;
    let mut writer = FitsOutputWriter::new();
    Coadd2d::new(config, spectrograph.as_ref(), &source)
        .run(&request, &mut writer)
        .context("2D coadd failed")?;

    for path in writer.written() {
        tracing::info!(path = %path.display(), "Output written");
    }
    Ok(())
}
