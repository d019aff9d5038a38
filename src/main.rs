use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tabletide::config::Config;
use tabletide::db::{create_pool, init_db, queries, AppState};
use tabletide::handlers;
use tabletide::models::CreateSubscription;
use tabletide::util::SECONDS_PER_DAY;

/// Webhook ledger rows older than this are pruned by the retention sweep.
const WEBHOOK_RETENTION_DAYS: i64 = 90;

/// How often the retention sweep runs. The first sweep fires at startup.
const RETENTION_SWEEP_INTERVAL_SECS: u64 = 3600;

#[derive(Parser, Debug)]
#[command(name = "tabletide")]
#[command(about = "License validation and device-session coordination for the TableTide POS")]
struct Cli {
    /// Seed the database with a dev trial subscription and print its token
    #[arg(long)]
    seed: bool,

    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

fn run_retention_sweep(conn: &rusqlite::Connection) {
    let cutoff = queries::now() - WEBHOOK_RETENTION_DAYS * SECONDS_PER_DAY;
    match queries::prune_webhook_events(conn, cutoff) {
        Ok(0) => {}
        Ok(n) => tracing::info!("Pruned {} webhook ledger rows past retention", n),
        Err(e) => tracing::warn!("Webhook ledger prune failed: {}", e),
    }

    let counter_cutoff = queries::now() - tabletide::rate_limit::COUNTER_RETENTION_SECS;
    if let Err(e) = queries::prune_validation_counters(conn, counter_cutoff) {
        tracing::warn!("Validation counter prune failed: {}", e);
    }
}

fn seed_dev_subscription(state: &AppState, trial_days: i64) {
    let conn = state.db.get().expect("Failed to get db connection for seed");

    let input = CreateSubscription {
        email: "dev@tabletide.local".to_string(),
        trial_days,
    };
    let (subscription, token) =
        queries::create_subscription(&conn, &input).expect("Failed to seed subscription");

    tracing::info!("Seeded trial subscription {}", subscription.id);
    // The raw token is only ever printed here; storage keeps the hash
    println!("Dev subscription: email={} token={}", subscription.email, token);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tabletide=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    if cli.ephemeral && !config.dev_mode {
        eprintln!("--ephemeral requires TABLETIDE_ENV=dev");
        std::process::exit(1);
    }

    let pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = pool.get().expect("Failed to get db connection");
        init_db(&conn).expect("Failed to initialize schema");
    }

    let state = AppState {
        db: pool,
        webhook_secret: config.webhook_secret.clone(),
        heartbeat_interval_secs: config.heartbeat_interval_secs,
        grace_days: config.grace_days,
        validate_rate_limit_per_minute: config.validate_rate_limit_per_minute,
    };

    let sweep_pool = state.db.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(
            RETENTION_SWEEP_INTERVAL_SECS,
        ));
        loop {
            tick.tick().await;
            match sweep_pool.get() {
                Ok(conn) => run_retention_sweep(&conn),
                Err(e) => tracing::warn!("Retention sweep skipped, pool error: {}", e),
            }
        }
    });

    if cli.seed {
        seed_dev_subscription(&state, config.trial_days);
    }

    let app: Router = handlers::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listener");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install ctrl-c handler");
            tracing::info!("Shutting down");
        })
        .await
        .expect("Server error");

    if cli.ephemeral {
        if let Err(e) = std::fs::remove_file(&config.database_path) {
            tracing::warn!("Failed to remove ephemeral database: {}", e);
        }
    }
}
