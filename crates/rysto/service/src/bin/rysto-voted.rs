use clap::Parser;
use rysto_service::{
    init_tracing, vote_router, CommonArgs, SessionSource, VoteState, CONTENT_REQUEST_TIMEOUT,
};
use std::net::SocketAddr;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "rysto-voted", version, about = "Rysto voting service")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8082
    #[arg(long, default_value = "127.0.0.1:8082", env = "RYSTO_VOTE_LISTEN")]
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
    let app = vote_router(VoteState::new(&platform, timeout));

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("rysto-voted listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
