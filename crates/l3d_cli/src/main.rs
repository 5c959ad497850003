//! Label3D command-line tools
//!
//! Usage:
//!   l3d probe a.mp4 b.mp4
//!   l3d sync a.mp4 b.mp4 c.mp4
//!   l3d new a.mp4 b.mp4 -o session.toml --names left,right
//!   l3d show session.toml

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use l3d_core::config::{ConfigManager, Settings};
use l3d_core::logging::{init_tracing, LogLevel};
use l3d_core::media::{validate_inputs, FfprobeProber, StreamProber};
use l3d_core::params::{self, names, ParamValue};
use l3d_core::project::{Project, SaveReport};
use l3d_core::sync::{CameraStream, SyncMethod, SyncPlan, Synchronizer};

#[derive(Parser, Debug)]
#[command(author, version, about = "Label3D: multi-camera sync and project tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Application settings file (created with defaults if missing)
    #[arg(long, global = true, value_name = "FILE", default_value = ".config/settings.toml")]
    config: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print stream facts for each video
    Probe {
        #[arg(required = true, value_name = "VIDEO")]
        files: Vec<PathBuf>,
    },
    /// Compute timecode offsets between videos
    Sync {
        #[arg(required = true, value_name = "VIDEO")]
        files: Vec<PathBuf>,

        /// Comma-separated camera names (default camA, camB, ...)
        #[arg(long, value_delimiter = ',')]
        names: Option<Vec<String>>,
    },
    /// Create a project file with default parameters and probed video info
    New {
        #[arg(required = true, value_name = "VIDEO")]
        files: Vec<PathBuf>,

        #[arg(short, long, value_name = "PROJECT")]
        output: PathBuf,

        #[arg(long, value_delimiter = ',')]
        names: Option<Vec<String>>,

        /// Overwrite an existing project file
        #[arg(long)]
        force: bool,
    },
    /// Summarize a saved project
    Show {
        #[arg(value_name = "PROJECT")]
        project: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = ConfigManager::new(&cli.config);
    config
        .load_or_create()
        .with_context(|| format!("loading settings from {}", cli.config.display()))?;
    let settings = config.settings().clone();

    let level = if cli.verbose {
        LogLevel::Debug
    } else {
        settings.logging.level
    };
    init_tracing(level);

    match cli.command {
        Command::Probe { files } => probe(&settings, &files),
        Command::Sync { files, names } => sync(&settings, &files, names.as_deref()),
        Command::New {
            files,
            output,
            names,
            force,
        } => new_project(&settings, &files, &output, names.as_deref(), force),
        Command::Show { project } => show(&project),
    }
}

fn prober(settings: &Settings) -> Result<FfprobeProber> {
    let prober = FfprobeProber::new(&settings.paths.ffprobe_path);
    if !prober.is_available() {
        bail!(
            "ffprobe not found at '{}'; set paths.ffprobe_path in the settings file",
            settings.paths.ffprobe_path
        );
    }
    Ok(prober)
}

fn probe(settings: &Settings, files: &[PathBuf]) -> Result<()> {
    validate_inputs(files)?;
    let prober = prober(settings)?;

    for file in files {
        let info = prober.probe(file)?;
        let name = file.file_name().unwrap_or(file.as_os_str()).to_string_lossy();
        println!("{}:", name);
        println!("  frame rate:    {}", info.frame_rate);
        println!("  frames:        {}", info.frame_count);
        println!("  size:          {}x{}", info.width, info.height);
        println!("  audio:         {}", if info.has_audio { "yes" } else { "no" });
        match info.creation_time {
            Some(t) => println!("  created:       {}", t.to_rfc3339()),
            None => println!("  created:       -"),
        }
        match info.timecode {
            Some(tc) => println!("  timecode:      {}", tc),
            None => println!("  timecode:      -"),
        }
        if let Some(start) = info.start_time() {
            println!("  start:         {}", start);
        }
    }
    Ok(())
}

fn camera_streams(
    prober: &dyn StreamProber,
    files: &[PathBuf],
    names: Option<&[String]>,
) -> Result<Vec<CameraStream>> {
    let names = match names {
        Some(n) if n.len() != files.len() => {
            bail!("{} names given for {} videos", n.len(), files.len())
        }
        Some(n) => n.to_vec(),
        None => params::default_camera_names(files.len()),
    };
    files
        .iter()
        .zip(names)
        .map(|(file, name)| Ok(CameraStream::new(name, prober.probe(file)?)))
        .collect()
}

fn print_plan(plan: &SyncPlan) {
    println!("frame rate {}, common length {} frames", plan.frame_rate(), plan.common_length());
    println!("{:<10} {:<26} {:>8} {:>8} {:>14}", "camera", "start", "start", "end", "keep");
    for entry in plan.entries() {
        let keep = plan
            .aligned_range(&entry.camera)
            .map(|r| format!("{}..{}", r.start, r.end))
            .unwrap_or_default();
        println!(
            "{:<10} {:<26} {:>8} {:>8} {:>14}",
            entry.camera,
            entry.start_time.to_string(),
            entry.start_offset,
            entry.end_offset,
            keep
        );
    }
}

fn sync(settings: &Settings, files: &[PathBuf], names: Option<&[String]>) -> Result<()> {
    validate_inputs(files)?;
    let prober = prober(settings)?;
    let cameras = camera_streams(&prober, files, names)?;

    let method = match settings.sync.method {
        SyncMethod::None => SyncMethod::Timecode,
        m => m,
    };
    match Synchronizer::new().run(method, &cameras)? {
        Some(plan) => print_plan(&plan),
        None => println!("no synchronization"),
    }
    Ok(())
}

fn new_project(
    settings: &Settings,
    files: &[PathBuf],
    output: &Path,
    names: Option<&[String]>,
    force: bool,
) -> Result<()> {
    validate_inputs(files)?;
    let prober = prober(settings)?;

    let mut project = Project::new();
    project.set_videos(files, names, settings)?;

    let camera_names = project.camera_names();
    let cameras = camera_streams(&prober, files, Some(camera_names.as_slice()))?;
    for camera in &cameras {
        project.add_video_info(&camera.name, &camera.info)?;
    }

    if cameras.len() > 1 {
        match Synchronizer::new().run(settings.sync.method, &cameras) {
            Ok(Some(plan)) => {
                print_plan(&plan);
                project.set_sync_plan(plan)?;
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("[Sync] Offsets not computed: {}", e),
        }
    }

    match project.save_as(output, force)? {
        SaveReport::Written { path } => println!("wrote {}", path.display()),
        SaveReport::Partial { path, failed } => {
            for f in &failed {
                eprintln!("section {} not written: {}", f.section, f.message);
            }
            bail!("{} written incomplete", path.display());
        }
        SaveReport::SkippedExisting { path } => {
            bail!("{} exists; pass --force to overwrite", path.display())
        }
    }
    Ok(())
}

fn show(path: &Path) -> Result<()> {
    let project = Project::open(path)?;
    let tree = project.parameters();

    println!("{}", path.display());
    for (camera, file) in params::video_files(tree)? {
        let frames = tree
            .value(&format!("{}/{}/{}", names::VIDEOS, camera, names::FRAME_COUNT))
            .ok()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  {:<10} {} ({} frames)", camera, file.display(), frames);
    }

    let offsets = format!("{}/{}", names::SYNCHRONIZATION, names::OFFSETS);
    if let Ok(group) = tree.get(&offsets) {
        println!("offsets:");
        for child in group.children() {
            if let Some(ParamValue::Int(v)) = child.value() {
                println!("  {:<14} {}", child.name, v);
            }
        }
    }

    match project.calibration() {
        Some(c) => println!(
            "calibration: {} cameras, reprojection error {:.4}",
            c.cameras.len(),
            c.reprojection_error
        ),
        None => println!("calibration: none"),
    }
    if let Some(points) = project.points() {
        println!("points: {} rows", points.len());
    }
    Ok(())
}
