use clap::Parser;
use rysto_auth::DEFAULT_SESSION_TTL_HOURS;
use rysto_service::{
    auth_router, init_tracing, story_router, vote_router, AuthSettings, AuthState, CommonArgs,
    SessionSource, StoryState, VoteState, AUTH_REQUEST_TIMEOUT, CONTENT_REQUEST_TIMEOUT,
};
use std::net::SocketAddr;
use tracing::info;

/// All three services in one process over one platform. The only layout in
/// which in-memory storage and stateful session checks work together.
#[derive(Debug, Parser)]
#[command(name = "rysto-platformd", version, about = "Rysto accounts, stories and voting in one process")]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8080", env = "RYSTO_AUTH_LISTEN")]
    auth_listen: SocketAddr,
    #[arg(long, default_value = "127.0.0.1:8081", env = "RYSTO_STORY_LISTEN")]
    story_listen: SocketAddr,
    #[arg(long, default_value = "127.0.0.1:8082", env = "RYSTO_VOTE_LISTEN")]
    vote_listen: SocketAddr,
    /// Reported by the profile endpoint.
    #[arg(long, default_value = "rysto/auth", env = "PROJECT_URL")]
    project_url: String,
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_HOURS, env = "RYSTO_SESSION_TTL_HOURS")]
    session_ttl_hours: i64,
    #[command(flatten)]
    common: CommonArgs,
}

async fn serve(addr: SocketAddr, app: axum::Router, name: &'static str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("{name} listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
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
    let content_timeout = cli.common.request_timeout(CONTENT_REQUEST_TIMEOUT)?;
    let platform = cli.common.platform(SessionSource::InProcess).await?;

    let auth = tokio::spawn(serve(
        cli.auth_listen,
        auth_router(AuthState::new(&platform, settings)),
        "auth",
    ));
    let stories = tokio::spawn(serve(
        cli.story_listen,
        story_router(StoryState::new(&platform, content_timeout)),
        "stories",
    ));
    let votes = tokio::spawn(serve(
        cli.vote_listen,
        vote_router(VoteState::new(&platform, content_timeout)),
        "voting",
    ));

    tokio::select! {
        result = auth => result??,
        result = stories => result??,
        result = votes => result??,
    }

    Ok(())
}
