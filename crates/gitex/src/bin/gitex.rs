use std::path::{Path, PathBuf};

use gitex::config::{self, AnalyzerConfig};
use gitex::extraction;
use gitex::logging;
use gitex::outline;
use gitex::render::{self, Focus, OutputFormat};
use gitex::slice;
use gitex::types::Diagnostic;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "gitex")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Dependency maps and symbol slices for Python codebases")]
struct Cli {
    /// Write logs to this file instead of stderr.
    #[arg(long = "log-file", global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Import, inheritance and call relationships of a project.
    Analyze(AnalyzeArgs),
    /// Files needed to keep one top-level symbol working.
    Slice(SliceArgs),
    /// Top-level classes and functions of a file.
    Symbols(SymbolsArgs),
    /// Signatures and docstrings of a file or symbol.
    Outline(OutlineArgs),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    path: Option<PathBuf>,
    #[arg(short = 'f', long = "focus")]
    focus: Option<Focus>,
    #[arg(short = 'j', long = "json")]
    json: bool,
    /// Extra glob to skip during discovery; repeatable.
    #[arg(short = 'e', long = "exclude")]
    exclude: Vec<String>,
}

#[derive(Debug, Args)]
struct SliceArgs {
    file: PathBuf,
    symbol: String,
    #[arg(short = 'r', long = "root")]
    root: Option<PathBuf>,
    #[arg(short = 'j', long = "json")]
    json: bool,
    #[arg(short = 'e', long = "exclude")]
    exclude: Vec<String>,
}

#[derive(Debug, Args)]
struct SymbolsArgs {
    file: PathBuf,
}

#[derive(Debug, Args)]
struct OutlineArgs {
    file: PathBuf,
    #[arg(short = 's', long = "symbol")]
    symbol: Option<String>,
    #[arg(long = "include-undocumented")]
    include_undocumented: bool,
}

fn main() {
    let cli = Cli::parse();
    let _log_guard = logging::init_tracing(cli.log_file.as_deref());

    match cli.command {
        Command::Analyze(args) => run_analyze(args),
        Command::Slice(args) => run_slice(args),
        Command::Symbols(args) => run_symbols(args),
        Command::Outline(args) => run_outline(args),
    }
}

fn run_analyze(args: AnalyzeArgs) {
    let project_root = resolve_project_root(args.path);
    let mut cfg = load_config_or_exit(&project_root);
    config::add_exclude_patterns(&mut cfg, &args.exclude);

    let files = extraction::scan_directory(&project_root, &cfg);
    if files.is_empty() {
        eprintln!("No Python files found in {}", project_root.display());
    }

    let analysis = extraction::analyze(&project_root, &files, &cfg).unwrap_or_else(|err| {
        eprintln!("Analysis failed: {err}");
        std::process::exit(1);
    });

    report_diagnostics(&analysis.diagnostics);
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Markdown
    };
    println!("{}", render::render_analysis(&analysis, args.focus, format));
}

fn run_slice(args: SliceArgs) {
    let project_root = resolve_project_root(args.root);
    let mut cfg = load_config_or_exit(&project_root);
    config::add_exclude_patterns(&mut cfg, &args.exclude);

    let result = slice::resolve_slice(&project_root, &args.file, &args.symbol, &cfg)
        .unwrap_or_else(|err| {
            eprintln!("Slice failed: {err}");
            std::process::exit(1);
        });

    report_diagnostics(&result.diagnostics);
    if args.json {
        let json = serde_json::to_string_pretty(&result).unwrap_or_default();
        println!("{json}");
        return;
    }
    println!("{}", render::format_slice(&result, &project_root));
}

fn run_symbols(args: SymbolsArgs) {
    let symbols = slice::top_level_symbols(&args.file).unwrap_or_else(|err| {
        eprintln!("Failed to read symbols: {err}");
        std::process::exit(1);
    });

    if symbols.is_empty() {
        println!("No top-level symbols in {}", args.file.display());
        return;
    }
    for symbol in symbols {
        println!("{symbol}");
    }
}

fn run_outline(args: OutlineArgs) {
    let output = outline::extract_outline(
        &args.file,
        args.symbol.as_deref(),
        args.include_undocumented,
    )
    .unwrap_or_else(|err| {
        eprintln!("Outline failed: {err}");
        std::process::exit(1);
    });
    println!("{output}");
}

fn resolve_project_root(path: Option<PathBuf>) -> PathBuf {
    path.unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn load_config_or_exit(project_root: &Path) -> AnalyzerConfig {
    config::load_config(project_root).unwrap_or_else(|err| {
        eprintln!("Failed to load config: {err}");
        std::process::exit(1);
    })
}

fn report_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("Warning: {}: {}", diagnostic.kind, diagnostic.message);
    }
}
