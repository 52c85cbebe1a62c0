mod cli;
mod server;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::GasExtenderd::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.verbose.tracing_level_filter())
        .init();

    let mut config = gas_extender::config::load_config(args.config.as_ref())?;

    if let Some(listen) = args.listen {
        let (host, port) = listen
            .rsplit_once(':')
            .ok_or_else(|| anyhow::anyhow!("--listen must be host:port, got {listen:?}"))?;
        config.server.host = host.to_string();
        config.server.port = port
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid port in --listen: {port:?}"))?;
    }

    server::run(config).await
}
