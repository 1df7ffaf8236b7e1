//! Fumode API server

use clap::Parser;
use fumode_api::{run_server, AdminSeed, ApiConfig, StorageBackend};
use fumode_core::LimiterConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fumode-api")]
#[command(about = "HTTP API server for the Fumode furniture store")]
#[command(version)]
struct Args {
    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0", env = "FUMODE_HOST")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "4000", env = "FUMODE_PORT")]
    port: u16,

    /// Environment (development|staging|production)
    #[arg(long, default_value = "development", env = "FUMODE_ENV")]
    env: String,

    /// Rate limiter maximum requests per second
    #[arg(long = "limiter-rps", default_value = "2", env = "LIMITER_RPS")]
    limiter_rps: f64,

    /// Rate limiter maximum burst
    #[arg(long = "limiter-burst", default_value = "4", env = "LIMITER_BURST")]
    limiter_burst: u32,

    /// Disable the rate limiter
    #[arg(long = "no-limiter", env = "LIMITER_DISABLED")]
    no_limiter: bool,

    /// Cap on concurrent uploads per request (unbounded when unset)
    #[arg(long, env = "MAX_CONCURRENT_UPLOADS")]
    max_concurrent_uploads: Option<usize>,

    /// Seconds allowed for listener close and background drain
    #[arg(long, default_value = "20", env = "SHUTDOWN_DEADLINE_SECS")]
    shutdown_deadline: u64,

    /// S3-compatible endpoint for image uploads (in-memory storage when unset)
    #[arg(long, env = "S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// Bucket images are written to
    #[arg(long, default_value = "fumode", env = "S3_BUCKET")]
    s3_bucket: String,

    /// Base URL of returned image locators, if it differs from the endpoint
    #[arg(long, env = "S3_PUBLIC_URL")]
    s3_public_url: Option<String>,

    /// Bearer token for the object store
    #[arg(long, env = "S3_ACCESS_TOKEN")]
    s3_access_token: Option<String>,

    /// Seconds a connection may stay silent before it is closed
    #[arg(long, default_value = "60", env = "IDLE_TIMEOUT_SECS")]
    idle_timeout: u64,

    /// Name of the admin account created at startup
    #[arg(long, default_value = "Administrator", env = "ADMIN_NAME")]
    admin_name: String,

    /// Email of the admin account created at startup
    #[arg(long, env = "ADMIN_EMAIL", requires = "admin_password")]
    admin_email: Option<String>,

    /// Password of the admin account created at startup
    #[arg(long, env = "ADMIN_PASSWORD", requires = "admin_email", hide_env_values = true)]
    admin_password: Option<String>,

    /// JWT secret for signing and validating tokens
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, env = "FUMODE_JSON_LOGS")]
    json_logs: bool,

    /// Enable debug logging
    #[arg(short, long, env = "FUMODE_DEBUG")]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("fumode_api={log_level},fumode_core={log_level},fumode_storage={log_level},tower_http=debug").into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if args.jwt_secret.is_none() {
        tracing::warn!("JWT_SECRET is not set - login and admin routes will fail");
    }

    let storage = match args.s3_endpoint {
        Some(endpoint) => StorageBackend::Http {
            endpoint,
            bucket: args.s3_bucket,
            public_base_url: args.s3_public_url,
            access_token: args.s3_access_token,
        },
        None => StorageBackend::Memory {
            bucket: args.s3_bucket,
        },
    };

    let admin = match (args.admin_email, args.admin_password) {
        (Some(email), Some(password)) => Some(AdminSeed {
            name: args.admin_name,
            email,
            password,
        }),
        _ => None,
    };

    let config = ApiConfig {
        host: args.host,
        port: args.port,
        env: args.env,
        limiter: LimiterConfig {
            rps: args.limiter_rps,
            burst: args.limiter_burst,
            enabled: !args.no_limiter,
        },
        max_concurrent_transfers: args.max_concurrent_uploads,
        shutdown_deadline_secs: args.shutdown_deadline,
        idle_timeout_secs: args.idle_timeout,
        storage,
        jwt_secret: args.jwt_secret,
        admin,
        ..Default::default()
    };

    run_server(config).await
}
