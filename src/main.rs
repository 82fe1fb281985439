use std::sync::Arc;

use leadwise::api::{AppState, api_routes};
use leadwise::config::AppConfig;
use leadwise::llm::create_provider;
use leadwise::mail::{HttpMailProvider, MailProvider};
use leadwise::pipeline::{Classifier, Ingestor, spawn_ingest_loop};
use leadwise::reply::ReplyGenerator;
use leadwise::store::{LeadStore, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  LEADWISE_GMAIL_TOKEN and LEADWISE_OPENAI_API_KEY are required.");
        std::process::exit(1);
    });

    eprintln!("📬 LeadWise v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   API: http://{}/api", config.server.bind_addr);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path_ref = std::path::Path::new(&config.db_path);
    let store: Arc<dyn LeadStore> = Arc::new(
        LibSqlBackend::new_local(db_path_ref)
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {}: {}", config.db_path, e);
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {}", config.db_path);

    // ── Pipeline ─────────────────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let provider: Arc<dyn MailProvider> = Arc::new(HttpMailProvider::new(&config.mail)?);

    let classifier = Classifier::new(
        llm.clone(),
        Arc::clone(&store),
        config.pipeline.confidence_floor,
    );
    let ingestor = Arc::new(Ingestor::new(
        Arc::clone(&provider),
        classifier,
        Arc::clone(&store),
        config.pipeline.clone(),
    ));
    let replies = Arc::new(ReplyGenerator::new(llm, Arc::clone(&store)));

    // ── Scheduler ────────────────────────────────────────────────────────
    let _schedule_handle = if config.schedule.users.is_empty() {
        eprintln!("   Scheduler: disabled (set LEADWISE_POLL_USERS to enable)");
        None
    } else {
        eprintln!(
            "   Scheduler: enabled (every {}s for {} user(s))",
            config.schedule.interval_secs,
            config.schedule.users.len(),
        );
        Some(spawn_ingest_loop(
            config.schedule.clone(),
            Arc::clone(&ingestor),
        ))
    };

    eprintln!(
        "   Service access: {}\n",
        if config.server.service_key.is_some() {
            "enabled"
        } else {
            "disabled"
        }
    );

    // ── API server ───────────────────────────────────────────────────────
    let app = api_routes(AppState {
        store,
        provider,
        ingestor,
        replies,
        pipeline: config.pipeline.clone(),
        service_key: config.server.service_key.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(addr = %config.server.bind_addr, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
