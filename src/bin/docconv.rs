//! CLI binary for edgequake-docconv.
//!
//! A thin shim over the library crate that maps CLI flags to a
//! `ConverterConfig`, builds one request per input and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_docconv::{
    ConversionObserver, ConversionOptions, ConversionRequest, ConversionResult, Converter, ConverterConfig,
    DocumentFormat, EngineAttempt, FormatPair, QualityTier, StyleFlattening, TelemetryEvent,
};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── Progress observer ────────────────────────────────────────────────────────

/// Drives the progress bar from conversion events. Requests finish out of
/// order in batch mode, so the bar only counts completions.
struct CliObserver {
    bar: ProgressBar,
    fallbacks: AtomicUsize,
}

impl CliObserver {
    fn new(total: usize) -> Arc<Self> {
        let bar = ProgressBar::new(total as u64);
        let style = if total > 1 {
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}/{len} files  ⏱ {elapsed_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
        } else {
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
        };
        bar.set_style(style.tick_strings(TICKS));
        bar.set_prefix("Converting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            fallbacks: AtomicUsize::new(0),
        })
    }
}

impl ConversionObserver for CliObserver {
    fn on_conversion_start(&self, pair: FormatPair) {
        self.bar.set_message(pair.to_string());
    }

    fn on_attempt(&self, attempt: &EngineAttempt) {
        if let Some(err) = &attempt.error {
            self.fallbacks.fetch_add(1, Ordering::SeqCst);
            self.bar.println(format!(
                "  {} {:<12} {}",
                cyan("↷"),
                attempt.engine,
                dim(&err.message)
            ));
        }
    }

    fn on_conversion_complete(&self, _event: &TelemetryEvent) {
        self.bar.inc(1);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Single document
  docconv report.docx -o report.pdf

  # Every spreadsheet in a folder to PDF, four at a time
  docconv --to pdf --out-dir out/ -c 4 sheets/*.xlsx

  # Scanned-free PDF back to an editable document
  docconv paper.pdf -o paper.docx

  # Skip the DOCX fidelity fixes, fail after 30 s
  docconv --no-preprocess --timeout 30 letter.docx -o letter.pdf

  # Which engines were found, and where?
  docconv --engines

  # Supported conversions and their engine chains
  docconv --formats --json

ENVIRONMENT VARIABLES:
  DOCCONV_TEMP_ROOT        Scratch directory root (default: <tmp>/edgequake-docconv)
  DOCCONV_SOFFICE_PATH     LibreOffice `soffice` executable
  DOCCONV_CHROMIUM_PATH    Chromium / Chrome executable
  DOCCONV_FORCE_BUNDLED    Only accept engines bundled next to the application
  DOCCONV_MAX_CONVERSIONS  Concurrent engine runs (default: 4)
  PDFIUM_LIB_PATH          libpdfium used for PDF text reconstruction
  RUST_LOG                 Log filter, e.g. edgequake_docconv=debug
"#;

/// Convert office documents, HTML, Markdown and PDFs.
#[derive(Parser, Debug)]
#[command(
    name = "docconv",
    version,
    about = "Convert office documents, HTML, Markdown and PDFs",
    long_about = "Convert documents with LibreOffice and headless Chromium, falling back \
between engines per format. DOCX inputs are rewritten first so the output matches what \
Word would print.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files. Formats are inferred from extensions.
    #[arg(required_unless_present_any = ["engines", "formats"])]
    inputs: Vec<PathBuf>,

    /// Output file (single input only).
    #[arg(short, long, conflicts_with_all = ["to", "out_dir"])]
    output: Option<PathBuf>,

    /// Target format extension, e.g. pdf, docx, txt.
    #[arg(short, long, env = "DOCCONV_TO")]
    to: Option<String>,

    /// Directory for outputs when using --to. Defaults to each input's directory.
    #[arg(long, env = "DOCCONV_OUT_DIR", requires = "to")]
    out_dir: Option<PathBuf>,

    /// Output quality.
    #[arg(long, env = "DOCCONV_QUALITY", value_enum, default_value = "standard")]
    quality: QualityArg,

    /// Overall deadline per document, in seconds.
    #[arg(long, env = "DOCCONV_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Hand DOCX files to the engines untouched.
    #[arg(long, env = "DOCCONV_NO_PREPROCESS")]
    no_preprocess: bool,

    /// Drop style inheritance without copying inherited properties first.
    #[arg(long)]
    strip_styles: bool,

    /// Documents converted concurrently.
    #[arg(short, long, env = "DOCCONV_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// LibreOffice executable (overrides DOCCONV_SOFFICE_PATH).
    #[arg(long)]
    soffice: Option<PathBuf>,

    /// Chromium executable (overrides DOCCONV_CHROMIUM_PATH).
    #[arg(long)]
    chromium: Option<PathBuf>,

    /// libpdfium shared library (overrides PDFIUM_LIB_PATH).
    #[arg(long)]
    pdfium_lib: Option<PathBuf>,

    /// Scratch directory root (overrides DOCCONV_TEMP_ROOT).
    #[arg(long)]
    temp_root: Option<PathBuf>,

    /// Report engine discovery and exit.
    #[arg(long)]
    engines: bool,

    /// List supported conversions and exit.
    #[arg(long)]
    formats: bool,

    /// Print results as JSON.
    #[arg(long, env = "DOCCONV_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCCONV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCCONV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCCONV_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum QualityArg {
    Draft,
    Standard,
    High,
}

impl From<QualityArg> for QualityTier {
    fn from(v: QualityArg) -> Self {
        match v {
            QualityArg::Draft => QualityTier::Draft,
            QualityArg::Standard => QualityTier::Standard,
            QualityArg::High => QualityTier::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.engines && !cli.formats;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    if cli.formats {
        return print_formats(cli.json);
    }

    let requests = if cli.engines { Vec::new() } else { build_requests(&cli)? };
    let observer = show_progress.then(|| CliObserver::new(requests.len()));
    let config = build_config(&cli, observer.clone())?;
    let converter = Converter::new(config).context("Invalid configuration")?;

    if cli.engines {
        return print_engines(&converter, cli.json);
    }

    // ── Run conversions ──────────────────────────────────────────────────
    let total = requests.len();
    let mut results: Vec<(usize, ConversionResult)> = Vec::with_capacity(total);
    let mut stream = converter.convert_batch(requests.clone(), cli.concurrency);
    while let Some((index, result)) = stream.next().await {
        if !cli.quiet && !cli.json {
            let line = summary_line(&requests[index], &result);
            match &observer {
                Some(obs) => obs.bar.println(line),
                None => eprintln!("{line}"),
            }
        }
        results.push((index, result));
    }
    results.sort_by_key(|(i, _)| *i);

    let failed = results.iter().filter(|(_, r)| !r.success).count();
    if let Some(obs) = &observer {
        obs.bar.finish_and_clear();
    }

    if cli.json {
        let json = if total == 1 {
            serde_json::to_string_pretty(&results[0].1)
        } else {
            serde_json::to_string_pretty(&results.iter().map(|(_, r)| r).collect::<Vec<_>>())
        }
        .context("Failed to serialise results")?;
        println!("{json}");
    } else if !cli.quiet && total > 1 {
        let fallbacks = observer.as_ref().map_or(0, |o| o.fallbacks.load(Ordering::SeqCst));
        eprintln!(
            "{} {}/{} converted  {}",
            if failed == 0 { green("✔") } else { red("✘") },
            bold(&(total - failed).to_string()),
            total,
            dim(&format!("{fallbacks} engine fallbacks")),
        );
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {total} conversions failed");
    }
    Ok(())
}

/// Map CLI args to `ConverterConfig`. Explicit flags win over the environment.
fn build_config(cli: &Cli, observer: Option<Arc<CliObserver>>) -> Result<ConverterConfig> {
    let mut builder = ConverterConfig::builder()
        .env_overrides()
        .context("Invalid environment")?
        .preprocess(!cli.no_preprocess);

    if cli.strip_styles {
        builder = builder.style_flattening(StyleFlattening::StripOnly);
    }
    if let Some(ref p) = cli.soffice {
        builder = builder.soffice_path(p);
    }
    if let Some(ref p) = cli.chromium {
        builder = builder.chromium_path(p);
    }
    if let Some(ref p) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(p);
    }
    if let Some(ref p) = cli.temp_root {
        builder = builder.temp_root(p);
    }
    if let Some(obs) = observer {
        builder = builder.observer(obs);
    }
    builder.build().context("Invalid configuration")
}

/// One request per input, with the output path derived from the flags.
fn build_requests(cli: &Cli) -> Result<Vec<ConversionRequest>> {
    if cli.output.is_some() && cli.inputs.len() > 1 {
        anyhow::bail!("--output takes a single input; use --to and --out-dir for several");
    }
    let options = ConversionOptions {
        quality: cli.quality.into(),
        timeout_secs: cli.timeout,
        preprocess: cli.no_preprocess.then_some(false),
    };

    cli.inputs
        .iter()
        .map(|input| {
            let output = match (&cli.output, &cli.to) {
                (Some(out), _) => out.clone(),
                (None, Some(ext)) => derive_output(input, ext, cli.out_dir.as_deref())?,
                (None, None) => anyhow::bail!("either --output or --to is required"),
            };
            let request = ConversionRequest::from_paths(input, &output)
                .with_context(|| format!("Cannot convert {} → {}", input.display(), output.display()))?;
            Ok(request.with_options(options.clone()))
        })
        .collect()
}

fn derive_output(input: &Path, ext: &str, out_dir: Option<&Path>) -> Result<PathBuf> {
    let format = DocumentFormat::from_extension(ext.trim_start_matches('.'))
        .with_context(|| format!("Unknown target format '{ext}'"))?;
    let stem = input
        .file_stem()
        .with_context(|| format!("Input '{}' has no file name", input.display()))?;
    let dir = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    Ok(dir.join(format!("{}.{}", stem.to_string_lossy(), format.extension())))
}

fn summary_line(request: &ConversionRequest, result: &ConversionResult) -> String {
    let name = request.input().display().to_string();
    match (&result.method, &result.error) {
        (Some(engine), _) => format!(
            "  {} {}  →  {}  {}",
            green("✓"),
            name,
            bold(&request.output().display().to_string()),
            dim(&format!("{engine}, {:.1}s", result.duration_ms as f64 / 1000.0)),
        ),
        (None, Some(err)) => format!("  {} {}  {}", red("✗"), name, red(&err.message)),
        (None, None) => format!("  {} {}", red("✗"), name),
    }
}

fn print_engines(converter: &Converter, json: bool) -> Result<()> {
    let report = converter.engine_report();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise engine report")?
        );
        return Ok(());
    }
    for status in report {
        let mark = if status.available { green("✓") } else { red("✗") };
        let location = match (&status.path, &status.source) {
            (Some(path), Some(source)) => format!("{}  {}", path.display(), dim(source)),
            (None, Some(source)) => dim(source),
            _ => String::new(),
        };
        println!("{mark} {:<12} {location}", status.engine.to_string());
        if let Some(detail) = status.detail {
            println!("  {}", dim(&detail));
        }
    }
    Ok(())
}

fn print_formats(json: bool) -> Result<()> {
    if json {
        let pairs: Vec<serde_json::Value> = FormatPair::ALL
            .iter()
            .map(|p| {
                serde_json::json!({
                    "source": p.source().extension(),
                    "target": p.target().extension(),
                    "engines": p.engines(),
                    "preprocessed": p.preprocessable(),
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&pairs).context("Failed to serialise formats")?
        );
        return Ok(());
    }
    for pair in FormatPair::ALL {
        let chain: Vec<&str> = pair.engines().iter().map(|e| e.as_str()).collect();
        println!("{:<12} {}", pair.to_string(), dim(&chain.join(" → ")));
    }
    Ok(())
}
