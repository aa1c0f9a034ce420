use clap::Parser;
use taskgate_server::config::ServerConfig;
use taskgate_server::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    init_tracing(config.log_format);

    if let Err(err) = config.validate() {
        tracing::error!(error = %err, "invalid configuration");
        return Err(err.into());
    }

    taskgate_server::serve(config).await
}
