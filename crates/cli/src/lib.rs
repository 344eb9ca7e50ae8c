use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use ink_core::{AnnotationSession, DrawSurface, PixmapSurface, RecordingSurface};
use ink_model::{Preferences, SurfaceSize};
use pdf_engine::{default_engine, LopdfAssembler, OpenSource, PdfEngine};
use serde::Serialize;
use settings::Settings;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

pub mod script;

use script::{load_script, replay};

#[derive(Debug, Parser)]
#[command(name = "paperink-cli")]
#[command(about = "Annotate PDF pages with freehand ink and text labels")]
pub struct Cli {
    /// Raise log verbosity (RUST_LOG takes precedence)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print machine-readable PDF metadata.
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Replay a gesture script and export the annotated PDF.
    Annotate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// JSON gesture script; without one the document is exported as-is
        #[arg(long)]
        script: Option<PathBuf>,
        /// The export keeps the input file name inside this directory
        #[arg(long, default_value = "exported")]
        out_dir: PathBuf,
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Render one page with its replayed annotations to PNG.
    RenderPage {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long)]
        script: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        settings: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    file_name: String,
    page_count: u32,
    pages: Vec<PageSizeOutput>,
}

#[derive(Debug, Serialize)]
struct PageSizeOutput {
    page: u32,
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct AnnotateOutput {
    output: String,
    page_count: u32,
    annotations: usize,
}

pub fn run<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => run_info(&file),
        Commands::Annotate { file, script, out_dir, settings } => {
            run_annotate(&file, script.as_deref(), &out_dir, settings.as_deref())
        }
        Commands::RenderPage { file, page, script, output, settings } => {
            run_render_page(&file, page, script.as_deref(), output.as_deref(), settings.as_deref())
        }
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let default_filter = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    let env = env_logger::Env::default().default_filter_or(default_filter);
    let _ = env_logger::Builder::from_env(env).format_timestamp(None).try_init();
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let mut engine = default_engine();
    let handle = engine.open(OpenSource::from(file)).context("failed to open PDF")?;

    let page_count = engine.page_count(handle)?;
    let pages = (1..=page_count)
        .map(|page| -> Result<PageSizeOutput> {
            let size = engine.page_size(handle, page)?;
            Ok(PageSizeOutput { page, width: size.width_pt, height: size.height_pt })
        })
        .collect::<Result<Vec<_>>>()?;

    let payload = InfoOutput {
        path: file.display().to_string(),
        file_name: file_name(file)?,
        page_count,
        pages,
    };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    engine.close(handle)?;

    Ok(())
}

fn run_annotate(
    file: &Path,
    script: Option<&Path>,
    out_dir: &Path,
    settings: Option<&Path>,
) -> Result<()> {
    let preferences = load_preferences(settings)?;
    let events = script.map(load_script).transpose()?.unwrap_or_default();

    let surface = RecordingSurface::new(SurfaceSize::new(1.0, 1.0));
    let mut session = AnnotationSession::new(default_engine(), surface, preferences);
    open_session(&mut session, file)?;
    replay(&mut session, &events)?;

    let exported =
        session.export(&mut LopdfAssembler::new()).context("failed to export annotated PDF")?;

    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let output = out_dir.join(&exported.file_name);
    fs::write(&output, &exported.bytes)
        .with_context(|| format!("failed to write {}", output.display()))?;

    let payload = AnnotateOutput {
        output: output.display().to_string(),
        page_count: exported.page_count,
        annotations: session.store().total_annotations(),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn run_render_page(
    file: &Path,
    page: u32,
    script: Option<&Path>,
    output: Option<&Path>,
    settings: Option<&Path>,
) -> Result<()> {
    if page == 0 {
        anyhow::bail!("--page is 1-based and must be >= 1");
    }

    let preferences = load_preferences(settings)?;
    let events = script.map(load_script).transpose()?.unwrap_or_default();

    let surface = PixmapSurface::new(SurfaceSize::new(1.0, 1.0))?;
    let mut session = AnnotationSession::new(default_engine(), surface, preferences);
    open_session(&mut session, file)?;
    replay(&mut session, &events)?;
    session.go_to_page(page).with_context(|| format!("failed to render page {page}"))?;

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_page_output(file, page));
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    session
        .surface()
        .to_rgba_image()
        .save(&output)
        .with_context(|| format!("failed to write image to {}", output.display()))?;

    println!("{}", output.display());

    Ok(())
}

fn open_session<E, S>(session: &mut AnnotationSession<E, S>, file: &Path) -> Result<()>
where
    E: PdfEngine,
    S: DrawSurface,
{
    ensure_pdf_exists(file)?;

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    session.load(file_name(file)?, bytes).context("failed to open PDF")?;

    Ok(())
}

fn load_preferences(path: Option<&Path>) -> Result<Preferences> {
    let settings = match path {
        Some(path) => Settings::at_path(path),
        None => match Settings::from_default_project() {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("{err}; using default preferences");
                return Ok(Preferences::default());
            }
        },
    };

    settings
        .load_preferences()
        .with_context(|| format!("failed to load settings from {}", settings.path().display()))
}

fn ensure_pdf_exists(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("file does not exist: {}", path.display());
    }

    if !path.is_file() {
        anyhow::bail!("path is not a file: {}", path.display());
    }

    Ok(())
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("path has no file name: {}", path.display()))
}

fn default_page_output(file: &Path, page: u32) -> PathBuf {
    let stem = file.file_stem().and_then(|name| name.to_str()).unwrap_or("page");

    file.with_file_name(format!("{stem}-page-{page}.png"))
}
