use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use grader::config::{CliArgs, Config};
use grader::language::Toolchains;
use grader::pipeline::Pipeline;
use grader::web_server::build_server;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    log::info!("Starting grader");

    let cli = CliArgs::parse();
    let Config {
        server: server_config,
        sandbox: sandbox_config,
        languages: language_config,
    } = cli.to_config().context("Failed to load configuration")?;

    let shutdown_token = CancellationToken::new();
    let pipeline = Pipeline::new(&sandbox_config, Toolchains::new(&language_config))
        .context("Failed to prepare the work directory")?
        .with_shutdown(shutdown_token.clone());

    let (address, port) = server_config.address();
    let server = build_server(server_config, pipeline).context("Failed to build server")?;
    log::info!("Listening on {address}:{port}");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. Stop accepting submissions and let in-flight ones finish
    server_handle.stop(true).await;

    // 2. Kill whatever is still running
    shutdown_token.cancel();

    log::info!("Grader has stopped");
    Ok(())
}
