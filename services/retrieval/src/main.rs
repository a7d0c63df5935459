use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use generation::{GenerationConfig, HuggingFaceClient};
use indexer::{DEFAULT_MAX_PASSAGE_WORDS, build_passages, load_corpus, summarize_corpus};
use rand::{SeedableRng, rngs::StdRng};
use retrieval::{
    DEFAULT_BOOTSTRAP_RUNS, DEFAULT_TOP_K,
    api::{ClaimAnalyzer, process_claim_text},
    bootstrap_retrieve, passage_stability,
};
use store::LexicalIndex;
use verdict::ExplanationGenerator;

#[derive(Debug, Parser)]
#[command(name = "bhedi", about = "Evidence-backed verdicts for paranormal claims")]
struct Cli {
    /// Corpus file: a JSON array of documents, or JSON Lines with `.jsonl`.
    #[arg(long, env = "BHEDI_CORPUS_PATH", global = true)]
    corpus: Option<PathBuf>,

    #[arg(
        long,
        env = "BHEDI_MAX_PASSAGE_WORDS",
        default_value_t = DEFAULT_MAX_PASSAGE_WORDS,
        global = true
    )]
    max_passage_words: usize,

    /// Log filter, overriding RUST_LOG (e.g. `debug`, `store=debug`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze one or more claims and print the results as JSON.
    Analyze(AnalyzeArgs),
    /// Measure retrieval stability under seeded query perturbation.
    Bootstrap(BootstrapArgs),
    /// Print corpus and index statistics.
    Stats,
    /// Serve the analyzer over HTTP.
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct AnalyzeArgs {
    #[arg(required = true)]
    claims: Vec<String>,

    #[arg(long, env = "BHEDI_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    #[arg(long)]
    domain: Option<String>,

    /// Ask the configured generation service for explanations.
    #[arg(long, env = "BHEDI_GENERATION_ENABLED")]
    generate: bool,
}

#[derive(Debug, Args)]
struct BootstrapArgs {
    claim: String,

    #[arg(long, env = "BHEDI_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    #[arg(long, default_value_t = DEFAULT_BOOTSTRAP_RUNS)]
    runs: usize,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long)]
    domain: Option<String>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, env = "BHEDI_BIND", default_value = "127.0.0.1:8080")]
    bind: String,

    #[arg(long, env = "BHEDI_HTTP_WORKERS")]
    http_workers: Option<usize>,

    #[arg(long, env = "BHEDI_TOP_K", default_value_t = DEFAULT_TOP_K)]
    top_k: usize,

    #[arg(long, env = "BHEDI_GENERATION_ENABLED")]
    generate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let corpus_path = cli
        .corpus
        .clone()
        .context("corpus path is required (--corpus or BHEDI_CORPUS_PATH)")?;
    let index = load_index(&corpus_path, cli.max_passage_words)?;

    match cli.command {
        Command::Analyze(args) => run_analyze(&index, args),
        Command::Bootstrap(args) => run_bootstrap(&index, args),
        Command::Stats => {
            let stats = index.index_stats();
            println!(
                "{}",
                serde_json::json!({
                    "passages": stats.passage_count,
                    "vocabulary": stats.vocabulary_size,
                    "domains": stats.domains,
                })
            );
            Ok(())
        }
        Command::Serve(args) => run_serve(index, args),
    }
}

fn init_logging(log_level: Option<&str>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(filters) = log_level {
        builder.parse_filters(filters);
    }
    builder.init();
}

fn load_index(path: &std::path::Path, max_passage_words: usize) -> Result<LexicalIndex> {
    if max_passage_words == 0 {
        bail!("max passage words must be positive");
    }
    let documents = load_corpus(path)
        .with_context(|| format!("failed loading corpus '{}'", path.display()))?;
    let passages = build_passages(&documents, max_passage_words)
        .with_context(|| format!("failed segmenting corpus '{}'", path.display()))?;
    let summary = summarize_corpus(&documents, &passages);
    log::info!(
        "corpus segmented: documents={}, passages={}, domains={:?}",
        summary.documents,
        summary.passages,
        summary.passages_per_domain
    );

    let mut index = LexicalIndex::new();
    index.build(passages).context("failed building lexical index")?;
    Ok(index)
}

fn build_explainer(generate: bool) -> ExplanationGenerator {
    if !generate {
        return ExplanationGenerator::deterministic();
    }
    match HuggingFaceClient::new(GenerationConfig::from_env()) {
        Ok(client) => {
            let config = client.config();
            log::info!(
                "generation enabled: model={}, endpoint={}, temperature={}, max_length={}",
                config.model,
                config.endpoint,
                config.temperature,
                config.max_length
            );
            ExplanationGenerator::with_generator(Box::new(client))
        }
        Err(err) => {
            log::warn!("generation unavailable, using rule-based explanations: {err}");
            ExplanationGenerator::deterministic()
        }
    }
}

fn run_analyze(index: &LexicalIndex, args: AnalyzeArgs) -> Result<()> {
    let analyzer = ClaimAnalyzer::new(build_explainer(args.generate)).with_top_k(args.top_k);
    for claim in &args.claims {
        let analysis = analyzer
            .analyze(index, claim, args.domain.as_deref())
            .with_context(|| format!("failed analyzing claim '{claim}'"))?;
        let result = analysis.result();
        log::info!(
            "claim analyzed: verdict={}, confidence={:.2}, evidence={}",
            result.verdict,
            result.confidence,
            analysis.evidence.len()
        );
        println!("{}", serde_json::to_string_pretty(&analysis)?);
    }
    Ok(())
}

fn run_bootstrap(index: &LexicalIndex, args: BootstrapArgs) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(args.seed);
    let processed = process_claim_text(&args.claim);
    let runs = bootstrap_retrieve(
        index,
        &processed,
        args.top_k,
        args.runs,
        args.domain.as_deref(),
        &mut rng,
    )
    .context("bootstrap retrieval failed")?;
    let stability = passage_stability(&runs);
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "claim": args.claim,
            "seed": args.seed,
            "runs": runs,
            "stability": stability,
        }))?
    );
    Ok(())
}

#[cfg(feature = "async-transport")]
fn run_serve(index: LexicalIndex, args: ServeArgs) -> Result<()> {
    let workers = args
        .http_workers
        .filter(|workers| *workers > 0)
        .unwrap_or_else(default_http_workers);
    let analyzer = ClaimAnalyzer::new(build_explainer(args.generate)).with_top_k(args.top_k);
    log::info!(
        "bhedi transport listening on http://{}, workers={workers}",
        args.bind
    );
    retrieval::transport_axum::serve_http_with_axum(index, analyzer, &args.bind, workers)
        .map_err(anyhow::Error::msg)
}

#[cfg(not(feature = "async-transport"))]
fn run_serve(_index: LexicalIndex, _args: ServeArgs) -> Result<()> {
    bail!("`serve` requires build feature 'async-transport'")
}

#[cfg(feature = "async-transport")]
fn default_http_workers() -> usize {
    std::thread::available_parallelism()
        .map(|parallelism| parallelism.get().clamp(1, 32))
        .unwrap_or(4)
}
