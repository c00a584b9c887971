use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use doc_model::{AnnotationSet, DocumentId, FontFamily};
use pdf_engine::{FontAsset, FontLibrary, FontSubsetBuilder, PayloadKind};
use pdf_markup_core::{artifact_name, compose_export, DocumentLoader, EditorConfig, FontPaths};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "pdf-markup-cli")]
#[command(about = "PDF markup CLI")]
pub struct Cli {
    /// Raise log output (-v debug, -vv trace). `RUST_LOG` wins when set.
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
    /// Write an annotation set into a PDF.
    Export {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        /// JSON annotation set (`{"texts": [...], "rects": [...]}`).
        #[arg(long, value_name = "JSON")]
        annotations: PathBuf,
        /// Directory holding `serif.ttf` and `sans.ttf`.
        #[arg(long, value_name = "DIR")]
        fonts: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Display name the output file name is derived from.
        #[arg(long, value_name = "DISPLAY NAME")]
        name: Option<String>,
    },
    /// Subset a font to the characters of a text.
    Subset {
        #[arg(long, value_name = "TTF")]
        font: PathBuf,
        #[arg(long)]
        text: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load a document through the cache-first loader.
    Fetch {
        #[arg(value_name = "ID|URL")]
        target: String,
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print CLI version.
    Version,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    path: String,
    page_count: u32,
    pages: Vec<PageOutput>,
}

#[derive(Debug, Serialize)]
struct PageOutput {
    page: u32,
    width: f32,
    height: f32,
    rotation: i64,
}

#[derive(Debug, Serialize)]
struct SubsetOutput {
    output: String,
    kind: &'static str,
    codepoints: usize,
    glyphs: u16,
    original_bytes: usize,
    subset_bytes: usize,
}

#[derive(Debug, Serialize)]
struct FetchOutput {
    id: String,
    name: Option<String>,
    page_count: u32,
    from_cache: bool,
    modified_at: Option<String>,
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
        Commands::Export { file, annotations, fonts, output, name } => {
            run_export(&file, &annotations, fonts.as_deref(), output.as_deref(), name.as_deref())
        }
        Commands::Subset { font, text, output } => run_subset(&font, &text, output.as_deref()),
        Commands::Fetch { target, config } => run_fetch(&target, config.as_deref()),
        Commands::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

fn run_info(file: &Path) -> Result<()> {
    ensure_pdf_exists(file)?;

    let bytes = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let info = pdf_engine::probe(&bytes).context("failed to open PDF")?;

    let pages = info
        .pages
        .iter()
        .zip(1..)
        .map(|(geometry, page)| PageOutput {
            page,
            width: geometry.width_pt,
            height: geometry.height_pt,
            rotation: geometry.rotation,
        })
        .collect();
    let payload =
        InfoOutput { path: file.display().to_string(), page_count: info.page_count(), pages };

    let json = serde_json::to_string_pretty(&payload)?;
    println!("{json}");

    Ok(())
}

fn run_export(
    file: &Path,
    annotations: &Path,
    fonts: Option<&Path>,
    output: Option<&Path>,
    name: Option<&str>,
) -> Result<()> {
    ensure_pdf_exists(file)?;

    let original = fs::read(file).with_context(|| format!("failed to read {}", file.display()))?;
    let raw = fs::read_to_string(annotations)
        .with_context(|| format!("failed to read annotations from {}", annotations.display()))?;
    let annotations: AnnotationSet =
        serde_json::from_str(&raw).context("annotations file is not a valid annotation set")?;

    let paths = match fonts {
        Some(dir) => FontPaths::in_dir(dir),
        None => EditorConfig::load(None).context("failed to load configuration")?.fonts,
    };
    let library = FontLibrary::load(&paths.serif, &paths.sans);

    let composed = compose_export(&original, &annotations, &library, &FontSubsetBuilder::new())
        .context("export failed")?;

    let display_name = name
        .map(ToOwned::to_owned)
        .or_else(|| file.file_name().map(|name| name.to_string_lossy().into_owned()));
    let output = output
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| file.with_file_name(artifact_name(display_name.as_deref())));

    write_output(&output, &composed.bytes)?;
    log::info!(
        "embedded {} font(s) for {} annotation(s)",
        composed.fonts.len(),
        annotations.len()
    );
    println!("{}", output.display());

    Ok(())
}

fn run_subset(font: &Path, text: &str, output: Option<&Path>) -> Result<()> {
    let asset = FontAsset::load(FontFamily::Sans, font)
        .with_context(|| format!("failed to load font {}", font.display()))?;

    let codepoints = text.chars().collect::<BTreeSet<_>>();
    if codepoints.is_empty() {
        anyhow::bail!("--text must contain at least one character");
    }

    let payload =
        FontSubsetBuilder::new().build(&asset, &codepoints).context("font cannot be embedded")?;
    let glyphs = ttf_parser::Face::parse(&payload.bytes, 0)
        .context("subset font does not parse")?
        .number_of_glyphs();

    let output = output.map(ToOwned::to_owned).unwrap_or_else(|| default_subset_output(font));
    write_output(&output, &payload.bytes)?;

    let summary = SubsetOutput {
        output: output.display().to_string(),
        kind: match payload.kind {
            PayloadKind::Subset => "subset",
            PayloadKind::Full => "full",
        },
        codepoints: codepoints.len(),
        glyphs,
        original_bytes: asset.bytes().len(),
        subset_bytes: payload.bytes.len(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

fn run_fetch(target: &str, config: Option<&Path>) -> Result<()> {
    let config = EditorConfig::load(config).context("failed to load configuration")?;
    let id = DocumentId::parse(target).context("invalid document reference")?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let loaded = runtime
        .block_on(async {
            let loader = DocumentLoader::from_config(&config).await;
            loader.load(&id).await
        })
        .with_context(|| format!("failed to load {id}"))?;

    let payload = FetchOutput {
        id: loaded.id.to_string(),
        name: loaded.display_name,
        page_count: loaded.document.page_count(),
        from_cache: loaded.from_cache,
        modified_at: loaded.modified_at.map(|time| time.to_rfc3339()),
    };
    println!("{}", serde_json::to_string_pretty(&payload)?);

    Ok(())
}

fn write_output(output: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = output.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, bytes).with_context(|| format!("failed to write {}", output.display()))
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

fn default_subset_output(font: &Path) -> PathBuf {
    let stem = font.file_stem().and_then(|name| name.to_str()).unwrap_or("font");

    font.with_file_name(format!("{stem}-subset.ttf"))
}
