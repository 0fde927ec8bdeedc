//! Review Gate CLI
//!
//! Command-line interface for the review classifier.
//!
//! # Overview
//!
//! Review Gate sorts location reviews into policy categories (valid,
//! advertisement, irrelevant content, rant without visit). Obvious cases are
//! caught by a textual pre-filter; everything else is classified by an
//! ensemble of local language models that vote, each prompted with policy
//! passages and exemplars retrieved for the review.
//!
//! # Dry Run Mode
//!
//! `--dry-run` runs the pre-filter and retrieval and prints the prompt that
//! would be sent, without calling any model.
//!
//! # Reversibility
//!
//! Only `init` writes anything, and it refuses to overwrite without `--force`.

use clap::{Parser, Subcommand, ValueEnum};
use review_contract::{
    AuditEntry, BatchMetadata, ClassificationRequest, ClassificationResult, ClassifierConfig,
    ContractError, Plan, ReviewClassifier, ReviewItem, ShopInfo,
};
use review_oracle::PreFilter;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::Level;

/// Where `init` writes, and where the config is looked up by default
const LOCAL_CONFIG: &str = ".review-gate/config.json";

/// Output format for results
#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine processing
    Json,
    /// Compact single-line output (JSON lines for batches)
    Compact,
}

/// Verbosity level
#[derive(Debug, Clone, ValueEnum)]
enum Verbosity {
    /// Errors only
    Quiet,
    /// Warnings and errors
    Normal,
    /// Pipeline progress
    Verbose,
    /// Debug output including internal state
    Debug,
}

impl Verbosity {
    fn level(&self) -> Level {
        match self {
            Verbosity::Quiet => Level::ERROR,
            Verbosity::Normal => Level::WARN,
            Verbosity::Verbose => Level::INFO,
            Verbosity::Debug => Level::DEBUG,
        }
    }
}

#[derive(Parser)]
#[command(name = "review-gate")]
#[command(author = "Jonathan D.A. Jewell <jonathan@hyperpolymath.org>")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Retrieval-augmented LLM ensemble for review policy classification")]
#[command(long_about = r#"
Review Gate - Policy Classification for Location Reviews

OVERVIEW
  Classifies reviews into a fixed label set:
  1. Pre-filter: textual rules for obvious cases (links, promo codes,
     "never been here"); no model is called
  2. Retrieval: nearest policy passages and exemplars for the review
  3. Ensemble: every configured model classifies the same prompt
  4. Vote: majority label, ties broken by the configured tie-break

EXAMPLES
  review-gate classify "Best pizza in town"        # Classify inline text
  review-gate classify -f review.txt --format json # From a file, JSON out
  echo "..." | review-gate classify -              # From stdin
  review-gate batch reviews.json --metadata shops.json
  review-gate prefilter "use code SAVE10"          # Rules only
  review-gate retrieve "cold pasta" --top-k 5      # Show context passages
  review-gate config --format json                 # Effective configuration

EXIT CODES
  0  Review classified
  2  Classification undetermined (unknown or error label)
  3  Error during execution

MORE INFO
  https://github.com/hyperpolymath/review-gate
"#)]
#[command(after_help = r#"
CONFIGURATION
  Looked up in order: --config, $REVIEW_GATE_CONFIG, .review-gate/config.json,
  built-in defaults. --ollama-url and --model override the file.

DRY RUN
  Use --dry-run on classify to see the prompt that would be sent
  without calling any model.

SHELL COMPLETIONS
  Generate completions with:
    review-gate completions bash > /etc/bash_completion.d/review-gate
    review-gate completions zsh > ~/.zfunc/_review-gate
    review-gate completions fish > ~/.config/fish/completions/review-gate.fish
"#)]
struct Cli {
    /// Output verbosity level
    #[arg(short, long, value_enum, default_value = "normal", global = true)]
    verbosity: Verbosity,

    /// Dry run mode - show what would be done without doing it
    #[arg(long, global = true)]
    dry_run: bool,

    /// Configuration file (JSON)
    #[arg(short, long, global = true, env = "REVIEW_GATE_CONFIG")]
    config: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, global = true, env = "OLLAMA_HOST")]
    ollama_url: Option<String>,

    /// Ensemble model (repeat to set several; replaces the configured list)
    #[arg(short, long = "model", global = true)]
    models: Vec<String>,

    /// Emit one JSON audit record per classification on stderr
    #[arg(long, global = true)]
    audit: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single review
    ///
    /// Reads the review from the argument, --file, or stdin ('-' or nothing).
    ///
    /// EXAMPLES
    ///   review-gate classify "Visit www.pizzapromo.com for a discount!"
    ///   review-gate classify "Lovely staff" --shop Name="Pizza Town" --shop Type=Restaurant
    #[command(visible_alias = "c")]
    Classify {
        /// Review text ('-' for stdin)
        #[arg(group = "input")]
        text: Option<String>,

        /// File containing the review
        #[arg(short, long, group = "input")]
        file: Option<PathBuf>,

        /// Shop metadata as key=value (repeatable)
        #[arg(short, long)]
        shop: Vec<String>,

        /// Number of context passages to retrieve
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Omit per-model votes from the result
        #[arg(long)]
        no_rationale: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Classify a batch of reviews from a JSON file
    ///
    /// INPUT FORMAT
    ///   Either all strings:   ["review one", "review two"]
    ///   or all pairs:         [["review one", "Pizza Town"], ...]
    ///
    /// METADATA FORMAT
    ///   {"global": {"Name": "..."}, "by_business": {"Pizza Town": {"Type": "..."}}}
    ///   Plain reviews use "global"; pairs look up their business.
    #[command(visible_alias = "b")]
    Batch {
        /// Reviews JSON file ('-' for stdin)
        input: PathBuf,

        /// Shop metadata JSON file
        #[arg(long)]
        metadata: Option<PathBuf>,

        /// Include per-model votes in each result
        #[arg(long)]
        rationale: bool,

        /// Output format
        #[arg(long, value_enum, default_value = "compact")]
        format: OutputFormat,
    },

    /// Run only the pre-filter rules
    #[command(visible_alias = "p")]
    Prefilter {
        /// Review text ('-' for stdin)
        text: Option<String>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show the passages retrieved for a review
    #[command(visible_alias = "r")]
    Retrieve {
        /// Review text ('-' for stdin)
        text: Option<String>,

        /// Number of passages
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Display the effective configuration
    Config {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Write the default configuration to .review-gate/config.json
    ///
    /// REVERSIBILITY
    ///   Remove with: rm -rf .review-gate/
    #[command(visible_alias = "i")]
    Init {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Generate shell completions
    ///
    /// Outputs shell completion scripts to stdout.
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },

    /// Generate man page
    ///
    /// EXAMPLE
    ///   review-gate man > /usr/local/share/man/man1/review-gate.1
    Man,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity.level())
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let exit_code = match &cli.command {
        Commands::Classify {
            text,
            file,
            shop,
            top_k,
            no_rationale,
            format,
        } => {
            classify_review(
                &cli,
                text.as_deref(),
                file.as_deref(),
                shop,
                *top_k,
                !*no_rationale,
                format,
            )
            .await
        }
        Commands::Batch {
            input,
            metadata,
            rationale,
            format,
        } => classify_batch(&cli, input, metadata.as_deref(), *rationale, format).await,
        Commands::Prefilter { text, format } => prefilter_review(&cli, text.as_deref(), format),
        Commands::Retrieve {
            text,
            top_k,
            format,
        } => retrieve_passages(&cli, text.as_deref(), *top_k, format).await,
        Commands::Config { format } => show_config(&cli, format),
        Commands::Init { force } => {
            if cli.dry_run {
                println!("[dry-run] Would write {}", LOCAL_CONFIG);
                println!("[dry-run] Force: {}", force);
                0
            } else {
                init_config(*force)
            }
        }
        Commands::Completions { shell } => {
            generate_completions(*shell);
            0
        }
        Commands::Man => {
            generate_man_page();
            0
        }
    };

    std::process::exit(exit_code);
}

// ============ Configuration ============

fn load_config(cli: &Cli) -> Result<ClassifierConfig, ContractError> {
    let local = PathBuf::from(LOCAL_CONFIG);
    let mut config = match &cli.config {
        Some(path) => ClassifierConfig::load(path)?,
        None if local.exists() => ClassifierConfig::load(&local)?,
        None => ClassifierConfig::default(),
    };

    if let Some(url) = &cli.ollama_url {
        config.ollama_url = normalize_url(url);
    }
    if !cli.models.is_empty() {
        config.models = cli.models.clone();
    }

    config.validate()?;
    Ok(config)
}

/// `OLLAMA_HOST` is often set without a scheme (`127.0.0.1:11434`).
fn normalize_url(url: &str) -> String {
    if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    }
}

async fn build_classifier(cli: &Cli) -> Result<ReviewClassifier, ContractError> {
    let config = load_config(cli)?;
    ReviewClassifier::from_config(&config).await
}

// ============ Input ============

fn read_input(text: Option<&str>, file: Option<&Path>) -> Result<String, std::io::Error> {
    match (text, file) {
        (_, Some(path)) => std::fs::read_to_string(path),
        (Some(t), None) if t != "-" => Ok(t.to_string()),
        _ => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn parse_shop_pairs(pairs: &[String]) -> Result<ShopInfo, String> {
    let mut info = ShopInfo::new();
    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("shop metadata '{}' is not key=value", pair))?;
        info.insert(key.trim(), value.trim());
    }
    Ok(info)
}

// ============ Commands ============

async fn classify_review(
    cli: &Cli,
    text: Option<&str>,
    file: Option<&Path>,
    shop: &[String],
    top_k: Option<usize>,
    show_rationale: bool,
    format: &OutputFormat,
) -> i32 {
    let review = match read_input(text, file) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to read review: {}", e);
            return 3;
        }
    };
    let shop_info = match parse_shop_pairs(shop) {
        Ok(info) => info,
        Err(e) => {
            eprintln!("{}", e);
            return 3;
        }
    };

    let mut request = ClassificationRequest::new(review.trim_end())
        .with_shop_info(shop_info)
        .with_rationale(show_rationale);
    if let Some(k) = top_k {
        request = request.with_top_k(k);
    }

    let classifier = match build_classifier(cli).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to initialize classifier: {}", e);
            return 3;
        }
    };

    if cli.dry_run {
        return match classifier.plan(&request).await {
            Ok(Plan::ShortCircuit(hit)) => {
                println!("[dry-run] Pre-filter rule '{}' fires: {}", hit.rule, hit.label);
                println!("[dry-run] No model would be called");
                0
            }
            Ok(Plan::Ensemble { passages, prompt }) => {
                println!(
                    "[dry-run] Would call {} model(s): {}",
                    classifier.models().len(),
                    classifier.models().join(", ")
                );
                println!("[dry-run] Retrieved {} passage(s); prompt follows\n", passages.len());
                println!("{}", prompt);
                0
            }
            Err(e) => {
                eprintln!("Error preparing classification: {}", e);
                3
            }
        };
    }

    match classifier.classify(&request).await {
        Ok(result) => {
            if cli.audit {
                emit_audit(&AuditEntry::from_result(&request, &result));
            }
            print_result(&result, format);
            result.exit_code()
        }
        Err(e) => {
            eprintln!("Error classifying review: {}", e);
            3
        }
    }
}

async fn classify_batch(
    cli: &Cli,
    input: &Path,
    metadata: Option<&Path>,
    show_rationale: bool,
    format: &OutputFormat,
) -> i32 {
    let raw = match read_input(None, (input != Path::new("-")).then_some(input)) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to read batch input: {}", e);
            return 3;
        }
    };
    let items = match serde_json::from_str::<serde_json::Value>(&raw)
        .map_err(ContractError::from)
        .and_then(|value| ReviewItem::parse_list(&value))
    {
        Ok(items) => items,
        Err(e) => {
            eprintln!("Invalid batch input: {}", e);
            return 3;
        }
    };

    let metadata: BatchMetadata = match metadata {
        None => BatchMetadata::default(),
        Some(path) => match std::fs::read_to_string(path)
            .map_err(ContractError::from)
            .and_then(|s| serde_json::from_str(&s).map_err(ContractError::from))
        {
            Ok(m) => m,
            Err(e) => {
                eprintln!("Invalid metadata file: {}", e);
                return 3;
            }
        },
    };

    if cli.dry_run {
        println!("[dry-run] Would classify {} review(s)", items.len());
        println!(
            "[dry-run] Metadata: {} global key(s), {} business(es)",
            metadata.global.len(),
            metadata.by_business.len()
        );
        return 0;
    }

    let classifier = match build_classifier(cli).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to initialize classifier: {}", e);
            return 3;
        }
    };

    let results = match classifier
        .classify_batch(&items, &metadata, show_rationale)
        .await
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Batch rejected: {}", e);
            return 3;
        }
    };

    if cli.audit {
        for (item, result) in items.iter().zip(&results) {
            emit_audit(&AuditEntry::from_text(item.text(), result));
        }
    }

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&results) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize results: {}", e);
                return 3;
            }
        },
        OutputFormat::Compact => {
            for result in &results {
                match result.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => {
                        eprintln!("Failed to serialize result: {}", e);
                        return 3;
                    }
                }
            }
        }
        OutputFormat::Text => {
            for (i, (item, result)) in items.iter().zip(&results).enumerate() {
                println!("{:>4}  {:<20} {}", i, result.label, preview(item.text(), 60));
            }
        }
    }

    let undetermined = results.iter().filter(|r| !r.is_determined()).count();
    eprintln!(
        "classified={} undetermined={}",
        results.len() - undetermined,
        undetermined
    );

    if undetermined > 0 {
        2
    } else {
        0
    }
}

fn prefilter_review(cli: &Cli, text: Option<&str>, format: &OutputFormat) -> i32 {
    let review = match read_input(text, None) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to read review: {}", e);
            return 3;
        }
    };
    let prefilter = match load_config(cli)
        .and_then(|c| PreFilter::new(&c.prefilter, &c.labels).map_err(ContractError::from))
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to load pre-filter rules: {}", e);
            return 3;
        }
    };

    let hit = prefilter.check(&review);
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&hit) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize: {}", e);
                return 3;
            }
        },
        OutputFormat::Compact => match &hit {
            Some(h) => println!("{} rule={} evidence={:?}", h.label, h.rule, h.evidence),
            None => println!("none"),
        },
        OutputFormat::Text => match &hit {
            Some(h) => {
                println!("Label: {}", h.label);
                println!("Rule: {}", h.rule);
                println!("Evidence: {:?}", h.evidence);
            }
            None => println!("No pre-filter rule matched; the ensemble would decide."),
        },
    }
    0
}

async fn retrieve_passages(
    cli: &Cli,
    text: Option<&str>,
    top_k: Option<usize>,
    format: &OutputFormat,
) -> i32 {
    let review = match read_input(text, None) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to read review: {}", e);
            return 3;
        }
    };
    let config = match load_config(cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return 3;
        }
    };
    let classifier = match ReviewClassifier::from_config(&config).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to initialize retriever: {}", e);
            return 3;
        }
    };

    let k = top_k.unwrap_or(config.top_k);
    let passages = match classifier.retriever().query(review.trim(), k).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Retrieval failed: {}", e);
            return 3;
        }
    };

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&passages) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize: {}", e);
                return 3;
            }
        },
        OutputFormat::Compact => {
            for p in &passages {
                println!("{:.4} {:?} {}", p.score, p.source, preview(&p.text, 80));
            }
        }
        OutputFormat::Text => {
            println!("=== Top {} Passages ===\n", passages.len());
            for (i, p) in passages.iter().enumerate() {
                println!("{}. [{:.4}] ({:?})", i + 1, p.score, p.source);
                println!("   {}\n", p.text);
            }
        }
    }
    0
}

fn show_config(cli: &Cli, format: &OutputFormat) -> i32 {
    let config = match load_config(cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            return 3;
        }
    };

    match format {
        OutputFormat::Json => match config.to_json_pretty() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Failed to serialize configuration: {}", e);
                return 3;
            }
        },
        OutputFormat::Compact => {
            println!(
                "config models={} labels={} top_k={} rules={} url={}",
                config.models.len(),
                config.labels.len(),
                config.top_k,
                config.prefilter.len(),
                config.ollama_url
            );
        }
        OutputFormat::Text => {
            println!("=== Review Gate Configuration ===\n");
            println!("MODELS (vote order):");
            for model in &config.models {
                println!("  {}", model);
            }
            println!("\nLABELS (priority order):");
            for label in config.labels.labels() {
                println!("  {}", label);
            }
            println!("\nPRE-FILTER RULES (first match wins):");
            for rule in &config.prefilter {
                println!("  {} -> {}", rule.name, rule.label);
            }
            println!("\nRETRIEVAL:");
            println!("  top_k: {}", config.top_k);
            println!("  embedding: {:?}", config.embedding);
            println!("  policies: {}", config.assets.policies.display());
            println!("  exemplars: {}", config.assets.exemplars.display());
            println!("\nENSEMBLE:");
            println!("  ollama_url: {}", config.ollama_url);
            println!(
                "  decoding: num_ctx={} temperature={} top_p={}",
                config.decoding.num_ctx, config.decoding.temperature, config.decoding.top_p
            );
            println!("  timeout: {}s", config.request_timeout_secs);
            println!("  tie_break: {:?}", config.tie_break);
            println!("  batch_concurrency: {}", config.batch_concurrency());
        }
    }
    0
}

fn init_config(force: bool) -> i32 {
    let config_path = PathBuf::from(LOCAL_CONFIG);

    if config_path.exists() && !force {
        eprintln!("Configuration already exists. Use --force to overwrite.");
        return 3;
    }

    if let Some(dir) = config_path.parent() {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Failed to create {}: {}", dir.display(), e);
            return 3;
        }
    }

    if let Err(e) = std::fs::write(&config_path, include_str!("../config/review-gate.json")) {
        eprintln!("Failed to write {}: {}", LOCAL_CONFIG, e);
        return 3;
    }

    println!("Initialized Review Gate configuration in {}", LOCAL_CONFIG);
    println!();
    println!("To revert: rm -rf .review-gate/");

    0
}

fn generate_completions(shell: clap_complete::Shell) {
    use clap::CommandFactory;
    clap_complete::generate(
        shell,
        &mut Cli::command(),
        "review-gate",
        &mut std::io::stdout(),
    );
}

fn generate_man_page() {
    use clap::CommandFactory;
    let man = clap_mangen::Man::new(Cli::command());
    let mut buffer: Vec<u8> = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        eprintln!("Failed to generate man page: {}", e);
        std::process::exit(3);
    }
    print!("{}", String::from_utf8_lossy(&buffer));
}

// ============ Output ============

fn print_result(result: &ClassificationResult, format: &OutputFormat) {
    match format {
        OutputFormat::Json => match result.to_json_pretty() {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Failed to serialize result: {}", e),
        },
        OutputFormat::Compact => {
            let votes = result
                .votes
                .as_ref()
                .map(|tally| {
                    tally
                        .iter()
                        .map(|(label, count)| format!("{}:{}", label, count))
                        .collect::<Vec<_>>()
                        .join(",")
                })
                .unwrap_or_default();
            println!(
                "{} stage={} votes={} duration_us={}",
                result.label,
                result.stage.as_str(),
                votes,
                result.duration_us
            );
        }
        OutputFormat::Text => {
            println!("=== Review Classification ===\n");
            println!("Label: {}", result.label);
            println!("Stage: {}", result.stage.as_str());
            if let Some(rule) = &result.prefilter_rule {
                println!("Pre-filter rule: {}", rule);
            }
            println!("Passages retrieved: {}", result.passages_retrieved);

            if let Some(tally) = &result.votes {
                println!("\nVOTES:");
                for (label, count) in tally.iter() {
                    println!("  {:<20} {}", label.as_str(), count);
                }
            }

            if let Some(outputs) = &result.model_outputs {
                println!("\nMODEL OUTPUTS:");
                for vote in outputs {
                    println!("  [{}] {} - {}", vote.model, vote.label, preview(&vote.rationale, 100));
                }
            }

            if let Some(error) = &result.error {
                println!("\nERROR: {}", error);
            }
        }
    }
}

fn emit_audit(entry: &AuditEntry) {
    match entry.to_json() {
        Ok(line) => eprintln!("{}", line),
        Err(e) => eprintln!("Failed to serialize audit entry: {}", e),
    }
}

/// First `max` characters on one line
fn preview(text: &str, max: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_config_matches_defaults() {
        let bundled = ClassifierConfig::from_json(include_str!("../config/review-gate.json")).unwrap();
        assert_eq!(bundled, ClassifierConfig::default());
    }

    #[test]
    fn test_parse_shop_pairs() {
        let info = parse_shop_pairs(&["Name=Pizza Town".to_string(), "Type = Restaurant".to_string()])
            .unwrap();
        assert_eq!(info.get("Name"), Some("Pizza Town"));
        assert_eq!(info.get("Type"), Some("Restaurant"));
        assert!(parse_shop_pairs(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_normalize_url_adds_scheme() {
        assert_eq!(normalize_url("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(normalize_url("https://ollama.local"), "https://ollama.local");
    }

    #[test]
    fn test_preview_truncates_on_one_line() {
        assert_eq!(preview("a\nb  c", 10), "a b c");
        assert_eq!(preview("abcdefghijkl", 8), "abcde...");
    }

    #[test]
    fn test_cli_parses_global_flags() {
        use clap::CommandFactory;
        Cli::command().debug_assert();

        let cli = Cli::try_parse_from([
            "review-gate",
            "classify",
            "Great pizza",
            "--model",
            "gemma3:4b",
            "--shop",
            "Name=Pizza Town",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.dry_run);
        assert_eq!(cli.models, vec!["gemma3:4b"]);
    }

    #[test]
    fn test_long_help_does_not_promise_one_tie_break() {
        use clap::CommandFactory;
        let long_about = Cli::command()
            .get_long_about()
            .map(|s| s.to_string())
            .unwrap_or_default();
        assert!(long_about.contains("ties broken by the configured tie-break"));
        assert!(!long_about.contains("label priority"));
    }
}
