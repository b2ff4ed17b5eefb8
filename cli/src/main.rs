use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use scrapdex_core::cache::CacheStore;
use scrapdex_core::config::Config;
use scrapdex_core::export::write_items_csv;
use scrapdex_core::fetch::{DataSource, HttpSource, LocalSource};
use scrapdex_core::rendering::{render_dashboard, render_detail, render_list, render_view, RenderConfig};
use scrapdex_core::view::{AppState, SortKey, View};
use scrapdex_core::{Catalog, Category, LoadOrigin, Loader, LoaderSettings, ScrapdexError};
use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

type AnyLoader = Loader<Box<dyn DataSource>>;

#[derive(Parser)]
#[command(
    name = "scrapdex",
    version = "0.1.0",
    about = "Browse game item data: values, recipes, quest and project links",
    long_about = None
)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(long, global = true, env = "SCRAPDEX_CONFIG")]
    config: Option<PathBuf>,

    /// Path to SQLite cache file (overrides cache.path)
    #[arg(long, global = true)]
    cache_db: Option<PathBuf>,

    /// Read static JSON datasets from this directory instead of the network
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Do not read or write the local cache
    #[arg(long, global = true, default_value_t = false)]
    no_cache: bool,

    /// Disable colored rarity labels
    #[arg(long, global = true, default_value_t = false)]
    no_color: bool,

    /// Path to log file
    #[arg(long, global = true, default_value = "/tmp/scrapdex.log")]
    log_file: PathBuf,

    /// Verbosity level (repeat for more verbose output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize every category
    Dashboard {
        /// Only count items whose name or id contains this text
        #[arg(long)]
        search: Option<String>,
    },

    /// List items as cards
    List {
        /// quest, project, upgrade or recycle
        #[arg(long)]
        category: Option<Category>,
        /// Case-insensitive name or id filter
        #[arg(long)]
        search: Option<String>,
        /// name, value-high, value-low, rarity or weight
        #[arg(long, default_value = "name")]
        sort: SortKey,
        /// Maximum number of cards to print
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Show one item with everything that references it
    Show {
        /// Item id
        id: String,
    },

    /// Clear the cache and reload from the sources
    Refresh {
        /// Quiet mode (0=show summary, 1=suppress summary)
        #[arg(long, default_value_t = 0)]
        quiet: u8,
    },

    /// Write the processed item list as CSV
    Export {
        /// Output CSV path
        #[arg(long)]
        output: PathBuf,
        /// Restrict to one category
        #[arg(long)]
        category: Option<Category>,
    },

    /// Interactive navigation: dashboard, categories and item details
    Browse,
}

fn setup_logging(verbose: u8, log_file: &std::path::Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    let filter_level = match verbose {
        0 => tracing::Level::ERROR,
        1 => tracing::Level::WARN,
        2 => tracing::Level::INFO,
        3 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    let filter = EnvFilter::from_default_env().add_directive(filter_level.into());

    let file_appender = tracing_appender::rolling::never(
        log_file.parent().unwrap_or(std::path::Path::new(".")),
        log_file.file_name().unwrap_or(std::ffi::OsStr::new("scrapdex.log")),
    );
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::Layer::new().with_writer(std::io::stderr).with_ansi(true))
        .with(fmt::Layer::new().with_writer(non_blocking).with_ansi(false));

    tracing::subscriber::set_global_default(subscriber)?;

    Ok(guard)
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {:?}", path);
            }
            Config::from_file(path)?
        }
        None => Config::default(),
    };
    if let Some(cache_db) = &cli.cache_db {
        config.cache.path = cache_db.clone();
    }
    if let Some(data_dir) = &cli.data_dir {
        config.sources.data_dir = Some(data_dir.clone());
    }
    if cli.no_cache {
        config.cache.enabled = false;
    }
    Ok(config)
}

fn build_loader(config: &Config) -> Result<AnyLoader> {
    let source: Box<dyn DataSource> = match &config.sources.data_dir {
        Some(dir) => {
            if !dir.exists() {
                anyhow::bail!("Data directory not found: {:?}", dir);
            }
            info!("Reading static datasets from {:?}", dir);
            Box::new(LocalSource::new(dir))
        }
        None => {
            info!("Fetching from {}", config.sources.items_url);
            Box::new(HttpSource::new(config.sources.clone(), config.fetch.clone())?)
        }
    };

    let cache = if config.cache.enabled {
        Some(CacheStore::new(&config.cache.path)?)
    } else {
        None
    };

    let settings = LoaderSettings {
        ttl: config.cache.ttl()?,
        policy: config.fetch.clone(),
        classification: config.classification.clone(),
    };
    Ok(Loader::new(source, cache, settings))
}

fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

fn explain_primary_failure(err: ScrapdexError) -> anyhow::Error {
    match err {
        ScrapdexError::PrimaryFetch(_) => {
            anyhow::anyhow!("{}\nRun `scrapdex refresh` to clear the cache and retry.", err)
        }
        other => other.into(),
    }
}

async fn load_catalog(loader: &AnyLoader) -> Result<Catalog> {
    let bar = spinner("Loading item data");
    let result = loader.load(Utc::now()).await;
    bar.finish_and_clear();

    let (catalog, origin) = result.map_err(explain_primary_failure)?;
    match origin {
        LoadOrigin::Cache => info!("Loaded {} items from cache", catalog.items.len()),
        LoadOrigin::Network => info!("Loaded {} items from sources", catalog.items.len()),
    }
    Ok(catalog)
}

async fn refresh_catalog(loader: &AnyLoader) -> Result<Catalog> {
    let bar = spinner("Refreshing item data");
    let result = loader.refresh(Utc::now()).await;
    bar.finish_and_clear();
    result.map_err(explain_primary_failure)
}

fn print_browse_help() {
    println!("Commands:");
    println!("  c <category>   open a category (quest, project, upgrade, recycle)");
    println!("  i <id>         open an item");
    println!("  b              back");
    println!("  h              home (dashboard)");
    println!("  s [text]       search (empty clears)");
    let sorts: Vec<String> = SortKey::ALL.iter().map(|s| s.to_string()).collect();
    println!("  o <sort>       sort ({})", sorts.join(", "));
    println!("  r              clear cache and reload");
    println!("  q              quit");
}

async fn render_current(state: &AppState, loader: &AnyLoader, render: &RenderConfig) -> String {
    if let View::Detail(id) = state.current() {
        if let Ok(detail) = loader.item_detail(state.catalog(), id).await {
            return render_detail(&detail, state.catalog(), render);
        }
    }
    render_view(state, render)
}

async fn browse(loader: &AnyLoader, catalog: Catalog, render: &RenderConfig) -> Result<()> {
    let mut state = AppState::new(catalog);
    print_browse_help();
    println!("\n{}", render_current(&state, loader, render).await);

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        let (cmd, arg) = match line.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (line, ""),
        };

        match cmd {
            "" => continue,
            "q" | "quit" | "exit" => break,
            "c" => match arg.parse::<Category>() {
                Ok(category) => state.open_category(category),
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            },
            "i" => {
                if let Err(e) = state.open_item(arg) {
                    println!("{}", e);
                    continue;
                }
            }
            "b" => {
                state.back();
            }
            "h" => state.home(),
            "s" => state.set_search(arg),
            "o" => match arg.parse::<SortKey>() {
                Ok(sort) => state.set_sort(sort),
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            },
            "r" => match refresh_catalog(loader).await {
                Ok(catalog) => {
                    let (search, sort) = (state.search().to_string(), state.sort());
                    state = AppState::new(catalog);
                    state.set_search(search);
                    state.set_sort(sort);
                }
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            },
            _ => {
                print_browse_help();
                continue;
            }
        }
        println!("\n{}", render_current(&state, loader, render).await);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _guard = setup_logging(cli.verbose, &cli.log_file)?;

    info!("Starting scrapdex CLI");

    let config = load_config(&cli)?;
    let loader = build_loader(&config)?;
    let render = RenderConfig {
        color: !cli.no_color && std::io::stdout().is_terminal(),
    };

    match cli.command {
        Commands::Dashboard { search } => {
            let mut state = AppState::new(load_catalog(&loader).await?);
            if let Some(search) = search {
                state.set_search(search);
            }
            print!("{}", render_dashboard(&state, &render));
        }
        Commands::List { category, search, sort, limit } => {
            let mut state = AppState::new(load_catalog(&loader).await?);
            if let Some(search) = search {
                state.set_search(search);
            }
            state.set_sort(sort);
            let mut items = state.items_in(category);
            if let Some(limit) = limit {
                items.truncate(limit);
            }
            print!("{}", render_list(&items, &render));
        }
        Commands::Show { id } => {
            let catalog = load_catalog(&loader).await?;
            let detail = loader.item_detail(&catalog, &id).await?;
            print!("{}", render_detail(&detail, &catalog, &render));
        }
        Commands::Refresh { quiet } => {
            let catalog = refresh_catalog(&loader).await?;
            if quiet == 0 {
                for category in Category::ALL {
                    println!("{:<16} {}", category.label(), catalog.count(category));
                }
                println!("{} items refreshed", catalog.items.len());
            }
        }
        Commands::Export { output, category } => {
            let state = AppState::new(load_catalog(&loader).await?);
            let items = state.items_in(category);
            let file = std::fs::File::create(&output)?;
            let written = write_items_csv(state.catalog(), &items, file)?;
            info!("Wrote {} items to {:?}", written, output);
            println!("Wrote {} items to {}", written, output.display());
        }
        Commands::Browse => {
            let catalog = load_catalog(&loader).await?;
            browse(&loader, catalog, &render).await?;
        }
    }

    info!("scrapdex CLI finished");
    Ok(())
}
