use anyhow::Context;
use clap::Parser;
use std::sync::Arc;

/// Docketd serves the legal-document processing pipeline: ingest,
/// extraction, classification, storage, and search.
#[derive(Debug, Parser)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// The port to listen on for API requests.
    #[clap(long, default_value = "8080", env = "API_PORT")]
    api_port: u16,

    /// Object-store bucket for document binaries.
    #[clap(long, env = "STORAGE_BUCKET")]
    bucket: String,
    /// Object-store region.
    #[clap(long, env = "STORAGE_REGION")]
    region: Option<String>,
    /// S3-compatible endpoint override (MinIO, localstack).
    #[clap(long, env = "STORAGE_ENDPOINT")]
    storage_endpoint: Option<url::Url>,
    /// CDN base URL fronting the bucket. Unset disables the CDN path.
    #[clap(long, env = "CDN_URL")]
    cdn_url: Option<url::Url>,

    /// Search index endpoint.
    #[clap(long, env = "INDEX_URL", default_value = "http://localhost:9200")]
    index_url: url::Url,
    /// Search index name.
    #[clap(long, env = "INDEX_NAME", default_value = "documents")]
    index_name: String,

    /// Classification providers to try, in order.
    #[clap(long, env = "CLASSIFIERS", default_value = "openai,anthropic,rules",
           value_delimiter = ',')]
    classifiers: Vec<String>,
    #[clap(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    openai_api_key: Option<String>,
    #[clap(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    anthropic_api_key: Option<String>,
    /// Baseline classifier call rate (requests per second); the adaptive
    /// limiter adjusts around it.
    #[clap(long, env = "CLASSIFIER_RATE", default_value = "5.0")]
    classifier_rate: f64,

    /// Shared secret for verifying bearer tokens (HS256).
    #[clap(long, env = "AUTH_SECRET", hide_env_values = true)]
    auth_secret: Option<String>,
    /// Path to the identity provider's RS256 public key (PEM).
    #[clap(long, env = "AUTH_PUBLIC_KEY")]
    auth_public_key: Option<std::path::PathBuf>,
    /// Required token issuer.
    #[clap(long, env = "AUTH_ISSUER")]
    auth_issuer: Option<String>,

    /// Upload size ceiling in bytes.
    #[clap(long, env = "MAX_FILE_SIZE", default_value = "52428800")]
    max_file_size: u64,
    /// Bound of each stage's admission queue.
    #[clap(long, env = "QUEUE_SIZE", default_value = "100")]
    queue_size: usize,
    /// Workers per pipeline stage.
    #[clap(long, env = "STAGE_WORKERS", default_value = "4")]
    stage_workers: usize,

    /// Path to the poppler pdftotext binary.
    #[clap(long, env = "PDFTOTEXT_PATH", default_value = "pdftotext")]
    pdftotext: std::path::PathBuf,
    /// Path to the poppler pdfinfo binary.
    #[clap(long, env = "PDFINFO_PATH", default_value = "pdfinfo")]
    pdfinfo: std::path::PathBuf,
}

fn main() -> anyhow::Result<()> {
    // Reasonable defaults for printing structured logs to stderr.
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(!matches!(std::env::var("NO_COLOR"), Ok(v) if v == "1"))
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting tracing default failed");

    let args = Args::parse();
    tracing::info!(?args, "started!");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = runtime.block_on(async_main(args));
    tracing::info!(?result, "main function completed, shutting down runtime");
    runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    result
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    // Bind early so requests dispatched as soon as the process is up don't
    // bounce off a closed port.
    let listener = tokio::net::TcpListener::bind(format!("[::]:{}", args.api_port))
        .await
        .context("failed to bind server port")?;

    let prometheus = api::install_metrics_recorder()?;

    let storage = Arc::new(
        storage::StorageClient::connect(storage::StorageConfig {
            bucket: args.bucket.clone(),
            region: args.region.clone(),
            endpoint: args.storage_endpoint.clone(),
            cdn: args.cdn_url.clone().map(storage::CdnConfig::new),
        })
        .await,
    );

    let index = Arc::new(search::IndexClient::new(search::IndexConfig {
        base_url: args.index_url.clone(),
        index: args.index_name.clone(),
        timeout: std::time::Duration::from_secs(30),
    }));
    if let Err(err) = index.ensure_index().await {
        // The index stage retries; boot shouldn't hard-fail on a slow index.
        tracing::warn!(error = %err, "could not ensure the search index at boot");
    }

    let chain = Arc::new(classify::FallbackChain::new(
        build_providers(&args)?,
        Arc::new(limiter::AdaptiveLimiter::new(limiter::AdaptiveConfig {
            base_rate: args.classifier_rate,
            min_rate: (args.classifier_rate / 10.0).max(0.1),
            max_rate: args.classifier_rate * 4.0,
            ..limiter::AdaptiveConfig::default()
        })),
        classify::ChainConfig::default(),
    ));

    let extractor = Arc::new(extract::Extractor::new(extract::ExtractConfig {
        pdftotext_path: args.pdftotext.clone(),
        pdfinfo_path: args.pdfinfo.clone(),
        ..extract::ExtractConfig::default()
    }));

    let pipeline = Arc::new(pipeline::Pipeline::new(
        pipeline::PipelineConfig {
            download_queue_size: args.queue_size,
            extract_queue_size: args.queue_size,
            classify_queue_size: args.queue_size,
            index_queue_size: args.queue_size * 2,
            download_workers: args.stage_workers,
            extract_workers: args.stage_workers,
            classify_workers: args.stage_workers.div_ceil(2),
            index_workers: args.stage_workers,
            max_file_size: args.max_file_size,
            ..pipeline::PipelineConfig::default()
        },
        storage,
        extractor.clone(),
        chain,
        index,
    ));
    pipeline.start().context("starting pipeline")?;

    let auth = build_auth(&args)?;
    let app = Arc::new(api::App {
        pipeline: pipeline.clone(),
        extractor,
        auth,
        prometheus,
        started_at: chrono::Utc::now(),
    });

    tracing::info!(port = args.api_port, "serving api");
    axum::serve(listener, api::build_router(app))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("interrupt received");
        })
        .await
        .context("serving api")?;

    pipeline.shutdown().await;
    Ok(())
}

fn build_providers(args: &Args) -> anyhow::Result<Vec<Arc<dyn classify::Provider>>> {
    let mut providers: Vec<Arc<dyn classify::Provider>> = Vec::new();
    for name in &args.classifiers {
        match name.trim() {
            "openai" => providers.push(Arc::new(classify::OpenAiProvider::new(
                classify::OpenAiConfig {
                    api_key: args.openai_api_key.clone(),
                    ..classify::OpenAiConfig::default()
                },
            ))),
            "anthropic" => providers.push(Arc::new(classify::AnthropicProvider::new(
                classify::AnthropicConfig {
                    api_key: args.anthropic_api_key.clone(),
                    ..classify::AnthropicConfig::default()
                },
            ))),
            "rules" => providers.push(Arc::new(classify::RuleBasedProvider)),
            other => anyhow::bail!("unknown classifier provider '{other}'"),
        }
    }
    anyhow::ensure!(!providers.is_empty(), "at least one classifier is required");
    Ok(providers)
}

fn build_auth(args: &Args) -> anyhow::Result<api::AuthVerifier> {
    if let Some(path) = &args.auth_public_key {
        let pem = std::fs::read(path)
            .with_context(|| format!("reading auth public key {}", path.display()))?;
        return api::AuthVerifier::rs256_pem(&pem, args.auth_issuer.as_deref());
    }
    let secret = args
        .auth_secret
        .as_deref()
        .context("either --auth-secret or --auth-public-key is required")?;
    Ok(api::AuthVerifier::hs256(secret, args.auth_issuer.as_deref()))
}
