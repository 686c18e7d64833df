use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use bookizip_core::config::{config_path, convert_options_from_config, load_config, AppConfig};
use bookizip_core::convert::Epub;

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "epub2bookizip")]
#[command(about = "Split EPUB books into chapter-per-file bookizip archives")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an EPUB into a bookizip archive
    Convert {
        /// Input EPUB file
        #[arg(required = true)]
        input: String,

        /// Output file (defaults to <input stem>.zip beside the input)
        #[arg(short, long)]
        output: Option<String>,

        /// Identifier the originating system knows this book by
        #[arg(long)]
        source_id: Option<String>,

        /// Mark spine file boundaries in the output
        #[arg(long)]
        info_markers: bool,

        /// Fail when a navigation fragment matches no element
        #[arg(long)]
        strict_anchors: bool,
    },

    /// Show package and navigation info
    Info {
        /// Input EPUB file
        #[arg(required = true)]
        input: String,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Initialize default config file
    Init,
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key (dot-separated path)
        key: String,
        /// Value
        value: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = match &cli.command {
        Commands::Convert {
            input,
            output,
            source_id,
            info_markers,
            strict_anchors,
        } => run_convert(
            input,
            output.as_deref(),
            source_id.as_deref(),
            *info_markers,
            *strict_anchors,
            cli.json,
        ),
        Commands::Info { input } => run_info(input, cli.json),
        Commands::Config { action } => run_config(action, cli.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_convert(
    input: &str,
    output: Option<&str>,
    source_id: Option<&str>,
    info_markers: bool,
    strict_anchors: bool,
    json: bool,
) -> CliResult {
    let input_path = Path::new(input);
    if !input_path.exists() {
        return Err(format!("Input file not found: {}", input_path.display()).into());
    }

    let mut opts = convert_options_from_config(&load_config());
    opts.info_markers |= info_markers;
    opts.strict_anchors |= strict_anchors;

    let mut epub = Epub::open_path(input_path, &opts)?;
    if let Some(id) = source_id {
        epub.register_source_id(id);
    }

    let out_path = output_path(input_path, output);
    tracing::info!(input = %input_path.display(), output = %out_path.display(), "converting");
    let summary = epub.write_bookizip(&out_path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Converted: {} -> {}", input_path.display(), out_path.display());
        println!("Chapters: {}", summary.chapters.len());
        if summary.dropped_chapters > 0 {
            println!("Empty chapters dropped: {}", summary.dropped_chapters);
        }
        println!("Media files: {}", summary.media);
        println!("Identifier: {}", summary.primary_id);
    }
    Ok(())
}

fn output_path(input: &Path, output: Option<&str>) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    match output {
        Some(o) if Path::new(o).is_dir() => Path::new(o).join(format!("{}.zip", stem)),
        Some(o) => PathBuf::from(o),
        None => input
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("{}.zip", stem)),
    }
}

fn run_info(input: &str, json: bool) -> CliResult {
    let opts = convert_options_from_config(&load_config());
    let epub = Epub::open_path(Path::new(input), &opts)?;

    if json {
        println!("{}", epub.raw_json()?);
        return Ok(());
    }

    let metadata = &epub.package.metadata;
    if let Some(title) = metadata.dc("title").first() {
        println!("Title: {}", title.value);
    }
    let creators: Vec<&str> = metadata
        .dc("creator")
        .iter()
        .map(|v| v.value.as_str())
        .collect();
    if !creators.is_empty() {
        println!("Creators: {}", creators.join(", "));
    }
    if let Some(id) = metadata.dc("identifier").first() {
        println!("Identifier: {}", id.value);
    }
    if let Some(lang) = epub.language() {
        println!("Language: {}", lang);
    }
    println!("Manifest items: {}", epub.package.manifest.len());
    println!("Spine items: {}", epub.package.spine.items.len());
    println!("Navigation: {}", epub.nav_path);
    println!(
        "Navigation points: {}",
        epub.find_probable_chapters().serialized.len()
    );
    Ok(())
}

fn run_config(action: &ConfigAction, json: bool) -> CliResult {
    match action {
        ConfigAction::Init => {
            let path = config_path().ok_or("Could not determine config directory")?;
            create_parent(&path)?;
            let toml = toml::to_string_pretty(&AppConfig::default())?;
            std::fs::write(&path, toml)?;
            println!("Wrote default config to {}", path.display());
        }
        ConfigAction::Show => {
            let cfg = load_config();
            if json {
                println!("{}", serde_json::to_string_pretty(&cfg)?);
            } else {
                println!("{}", toml::to_string_pretty(&cfg)?);
            }
        }
        ConfigAction::Set { key, value } => {
            let path = config_path().ok_or("Could not determine config directory")?;
            let mut cfg = load_config();
            set_config_key(&mut cfg, key, value)?;

            create_parent(&path)?;
            let toml = toml::to_string_pretty(&cfg)?;
            std::fs::write(&path, toml)?;
            if !json {
                println!("Updated {}", key);
            }
        }
    }
    Ok(())
}

fn create_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) => std::fs::create_dir_all(dir),
        None => Ok(()),
    }
}

fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> CliResult {
    let flag = || -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        value
            .parse()
            .map_err(|_| format!("Expected true or false for {}, got {}", key, value).into())
    };
    let number = || -> Result<u64, Box<dyn std::error::Error + Send + Sync>> {
        value
            .parse()
            .map_err(|_| format!("Expected a number for {}, got {}", key, value).into())
    };

    let parts: Vec<&str> = key.splitn(2, '.').collect();
    match parts.as_slice() {
        ["conversion", sub] => match *sub {
            "info_markers" => cfg.conversion.info_markers = flag()?,
            "strict_anchors" => cfg.conversion.strict_anchors = flag()?,
            "default_server" => cfg.conversion.default_server = value.to_string(),
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        ["security", sub] => match *sub {
            "max_file_count" => cfg.security.max_file_count = Some(number()?),
            "max_resource_size_mb" => cfg.security.max_resource_size_mb = Some(number()?),
            "max_nesting_depth" | "max_nav_depth" => {
                let depth = u32::try_from(number()?)
                    .map_err(|_| format!("{} is out of range for {}", value, key))?;
                if *sub == "max_nesting_depth" {
                    cfg.security.max_nesting_depth = Some(depth);
                } else {
                    cfg.security.max_nav_depth = Some(depth);
                }
            }
            _ => return Err(format!("Unknown key: {}", key).into()),
        },
        _ => return Err(format!("Unknown key: {}", key).into()),
    }
    Ok(())
}
