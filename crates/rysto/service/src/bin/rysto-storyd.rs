use clap::Parser;
use rysto_service::{
    init_tracing, story_router, CommonArgs, SessionSource, StoryState, CONTENT_REQUEST_TIMEOUT,
};
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rysto-storyd", version, about = "Rysto stories and continuations service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8081
    #[arg(long, default_value = "127.0.0.1:8081", env = "RYSTO_STORY_LISTEN")]
    listen: SocketAddr,
    #[command(flatten)]
    common: CommonArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let timeout = cli.common.request_timeout(CONTENT_REQUEST_TIMEOUT)?;
    let platform = cli.common.platform(SessionSource::External).await?;
    let app = story_router(StoryState::new(&platform, timeout));

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("rysto-storyd listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
