use clap::Parser;
use rysto_auth::DEFAULT_SESSION_TTL_HOURS;
use rysto_service::{
    auth_router, init_tracing, AuthSettings, AuthState, CommonArgs, SessionSource,
    AUTH_REQUEST_TIMEOUT,
};
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rysto-authd", version, about = "Rysto accounts and sessions service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080", env = "RYSTO_AUTH_LISTEN")]
    listen: SocketAddr,
    /// Reported by the profile endpoint.
    #[arg(long, default_value = "rysto/auth", env = "PROJECT_URL")]
    project_url: String,
    /// Lifetime of a login session.
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_HOURS, env = "RYSTO_SESSION_TTL_HOURS")]
    session_ttl_hours: i64,
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    if cli.session_ttl_hours <= 0 {
        anyhow::bail!("--session-ttl-hours must be positive");
    }
    let settings = AuthSettings {
        project_url: cli.project_url.clone(),
        session_ttl: chrono::Duration::hours(cli.session_ttl_hours),
        timeout: cli.common.request_timeout(AUTH_REQUEST_TIMEOUT)?,
    };
    let platform = cli.common.platform(SessionSource::InProcess).await?;
    let app = auth_router(AuthState::new(&platform, settings));

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("rysto-authd listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
