use clap::{Parser, Subcommand};
use mewmoire::{cache, config, diary, output, pipeline, scan};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mewmoire")]
#[command(about = "Build tooling for the mewmoire diary")]
#[command(long_about = "\
Build tooling for the mewmoire diary

Keeps the site's CJK font subset in sync with the characters the site uses,
and lists diary entries the way the archive pages group them.

Project layout (defaults, all configurable in mewmoire.toml):

  mewmoire.toml                     # Optional build config
  src/                              # Scanned for characters (.md .njk .json .js .css .txt .html)
  ├── diary/                        # Diary entries
  └── assets/fonts/
      ├── *.subset.woff2            # Generated subset font
      └── *.subset.meta.json        # Record of the last successful build
  .cache/
  ├── fonts/<name>-<version>.ttf    # Downloaded full font, one per version
  └── font-subset/chars.txt         # Characters passed to the subsetter

Environment:
  LXGW_WENKAI_VERSION   Font release tag (default v1.521)
  LXGW_WENKAI_URL       Font download URL ({version} expands)
  ELEVENTY_ENV          'production' enables the /mewmoire/ path prefix
  RUST_LOG              Log filter (overrides -v)

Subsetting requires python3 with fonttools and brotli installed.")]
#[command(version)]
struct Cli {
    /// Project root
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Config file (default: <root>/mewmoire.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the subset font if the character set or font changed
    Font {
        /// Rebuild even if the current subset is up to date
        #[arg(long)]
        force: bool,
    },
    /// Report whether the subset font is current, without building
    FontStatus,
    /// Show the collected character set statistics
    Chars,
    /// List diary entries by year and month with their permalinks
    Diary {
        /// Use the production path prefix
        #[arg(long)]
        production: bool,
    },
    /// Print a stock mewmoire.toml with all options documented
    GenConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let load = || -> Result<(config::SiteConfig, config::BuildPaths), config::ConfigError> {
        let config_path = cli
            .config
            .clone()
            .unwrap_or_else(|| cli.root.join(config::CONFIG_FILENAME));
        let site_config = config::load_config_file(&config_path)?;
        let paths = site_config.paths(&cli.root);
        Ok((site_config, paths))
    };

    match cli.command {
        Command::Font { force } => {
            let (site_config, paths) = load()?;
            let options = pipeline::BuildOptions { force };
            let report = pipeline::build_font(&paths, &site_config, options)?;
            output::print_build(&report, &cli.root);
        }
        Command::FontStatus => {
            let (site_config, paths) = load()?;
            let status = pipeline::font_status(&paths, &site_config)?;
            output::print_status(&status);
        }
        Command::Chars => {
            let (_, paths) = load()?;
            let scan = scan::collect_characters(&paths.source_dir)?;
            let hash = cache::fingerprint(&scan.chars);
            output::print_chars(&scan, &hash, &cli.root);
        }
        Command::Diary { production } => {
            let (_, paths) = load()?;
            let production =
                production || std::env::var("ELEVENTY_ENV").is_ok_and(|v| v == "production");
            let entries = diary::load_entries(&paths.diary_dir)?;
            let groups = diary::group_by_year_month(&entries);
            output::print_diary(&groups, diary::path_prefix(production));
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
