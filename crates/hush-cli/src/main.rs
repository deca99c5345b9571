//! hush CLI
//!
//! Command line front end for checking requests against filter lists,
//! resolving element hiding selectors, linting lists and downloading
//! subscriptions.

mod http;
mod lint;

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};

use hush_compiler::parse_list;
use hush_core::types::ContentType;
use hush_engine::{AllowReason, EngineConfig, FilterEngine, ReferrerMap, RequestDecision};

use crate::http::HttpWebRequest;
use crate::lint::LintOptions;

#[derive(Parser)]
#[command(name = "hush")]
#[command(about = "Adblock Plus filter list matcher and tools")]
struct Cli {
    /// Engine configuration (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a request URL against filter lists
    Check {
        /// Filter list files
        #[arg(short, long, required = true)]
        list: Vec<String>,

        /// Request URL
        #[arg(short, long)]
        url: String,

        /// Content types, comma separated (image,script,...)
        #[arg(short = 't', long = "type", default_value = "other")]
        content_type: String,

        /// Document chain, immediate parent first
        #[arg(short, long)]
        document: Vec<String>,

        /// Build the chain from `page=referrer` pairs instead
        #[arg(long)]
        referrer: Vec<String>,

        /// Site key offered by the top document
        #[arg(long)]
        sitekey: Option<String>,
    },

    /// Print element hiding selectors for a domain
    Selectors {
        /// Filter list files
        #[arg(short, long, required = true)]
        list: Vec<String>,

        /// Document domain
        #[arg(short, long)]
        domain: String,

        /// Page URL; enables `$document`/`$elemhide` allowlisting checks
        #[arg(short, long)]
        page: Option<String>,

        /// Parent documents of the page, immediate parent first
        #[arg(long)]
        document: Vec<String>,

        /// Skip generic selectors
        #[arg(long)]
        specific_only: bool,

        /// Print a stylesheet instead of one selector per line
        #[arg(long)]
        css: bool,
    },

    /// Report invalid and duplicate filters
    Lint {
        /// Filter list files
        #[arg(short, long, required = true)]
        input: Vec<String>,

        /// Fail when any filter is invalid
        #[arg(long)]
        strict: bool,

        /// List every invalid filter
        #[arg(short, long)]
        verbose: bool,
    },

    /// Download subscriptions and print their state
    Fetch {
        /// Subscription URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = load_config(cli.config.as_ref()).and_then(|config| match cli.command {
        Commands::Check {
            list,
            url,
            content_type,
            document,
            referrer,
            sitekey,
        } => cmd_check(config, &list, &url, &content_type, document, &referrer, sitekey.as_deref()),
        Commands::Selectors {
            list,
            domain,
            page,
            document,
            specific_only,
            css,
        } => cmd_selectors(config, &list, &domain, page.as_deref(), &document, specific_only, css),
        Commands::Lint {
            input,
            strict,
            verbose,
        } => lint::run_lint(LintOptions {
            inputs: input,
            strict,
            verbose,
        }),
        Commands::Fetch { urls } => cmd_fetch(config, &urls),
    });

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig, String> {
    match path {
        Some(path) => EngineConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {}", path.display(), e)),
        None => Ok(EngineConfig::default()),
    }
}

fn build_engine(config: EngineConfig) -> Result<FilterEngine, String> {
    let web_request = HttpWebRequest::new()?;
    FilterEngine::new(config, Arc::new(web_request)).map_err(|e| format!("Failed to create engine: {}", e))
}

/// Load local list files as custom filters.
fn load_lists(engine: &FilterEngine, paths: &[String]) -> Result<(), String> {
    let start = Instant::now();
    for path in paths {
        let content = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read '{}': {}", path, e))?;
        let parsed = parse_list(&content);
        for line in &parsed.lines {
            engine.add_filter(&engine.get_filter(line));
        }
        log::info!("Loaded {} lines from '{}'", parsed.lines.len(), path);
    }

    let stats = engine.stats();
    log::info!(
        "{} active filters ({} blocking, {} exceptions) in {:.1}ms",
        stats.active_filters,
        stats.matcher.blocking,
        stats.matcher.exceptions,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(())
}

fn cmd_check(
    config: EngineConfig,
    lists: &[String],
    url: &str,
    content_type: &str,
    mut document: Vec<String>,
    referrers: &[String],
    sitekey: Option<&str>,
) -> Result<(), String> {
    let content_type = ContentType::parse_list(content_type)
        .filter(|mask| !mask.is_empty())
        .ok_or_else(|| format!("Unknown content type '{}'", content_type))?;

    if !referrers.is_empty() {
        let map = ReferrerMap::with_capacity(config.max_referrer_chain, config.max_referrer_entries);
        for pair in referrers {
            let (page, referrer) = pair
                .split_once('=')
                .ok_or_else(|| format!("Expected url=referrer, got '{}'", pair))?;
            map.add(page, referrer);
        }
        document = map.build_chain(url);
    }

    let engine = build_engine(config)?;
    load_lists(&engine, lists)?;

    let decision = engine.check_request(url, content_type, &document, sitekey);
    match decision {
        RequestDecision::Blocked(filter) => println!("BLOCKED  {}", filter.text),
        RequestDecision::Allowed(AllowReason::Filter(filter)) => println!("ALLOWED  {}", filter.text),
        RequestDecision::Allowed(AllowReason::Document) => println!("ALLOWED  (document allowlisted)"),
        RequestDecision::NoMatch => println!("NO MATCH"),
    }
    if !document.is_empty() {
        println!("  chain: {}", document.join(" <- "));
    }
    Ok(())
}

fn cmd_selectors(
    config: EngineConfig,
    lists: &[String],
    domain: &str,
    page: Option<&str>,
    document: &[String],
    specific_only: bool,
    css: bool,
) -> Result<(), String> {
    let engine = build_engine(config)?;
    load_lists(&engine, lists)?;

    let specific_only = match page {
        Some(page) => match engine.page_hiding_mode(page, document, None, specific_only) {
            Some(specific_only) => specific_only,
            None => {
                println!("(element hiding allowlisted on {})", page);
                return Ok(());
            }
        },
        None => specific_only,
    };

    if css {
        print!("{}", engine.element_hiding_stylesheet(domain, specific_only));
    } else {
        for selector in engine.element_hiding_selectors(domain, specific_only) {
            println!("{}", selector);
        }
    }

    for emulation in engine.element_hiding_emulation_selectors(domain) {
        println!("emulation: {}  ({})", emulation.selector, emulation.text);
    }
    Ok(())
}

fn cmd_fetch(config: EngineConfig, urls: &[String]) -> Result<(), String> {
    let engine = build_engine(config)?;
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;

    let mut failures = 0usize;
    for url in urls {
        engine.add_subscription(url);
        let start = Instant::now();
        if let Err(e) = runtime.block_on(engine.update_subscription(url)) {
            eprintln!("  {}: {}", url, e);
            failures += 1;
        }

        let sub = engine.get_subscription(url);
        println!("{}", sub.title);
        println!("  URL:      {}", sub.url);
        println!("  Status:   {}", sub.synchronization_status.as_str());
        println!("  Filters:  {}", sub.filter_count);
        if let Some(version) = &sub.version {
            println!("  Version:  {}", version);
        }
        println!("  Time:     {:.1}ms", start.elapsed().as_secs_f64() * 1000.0);
    }

    if failures > 0 {
        return Err(format!("{} of {} subscription(s) failed", failures, urls.len()));
    }
    Ok(())
}
