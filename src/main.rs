use std::sync::Arc;

use rendergit_mcp::{
    build_app, config::Config, logging, mcp::stream::StreamSettings, renderer::CommandRenderer,
    AppState,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?;
    let bind_socket = config.bind_socket()?;

    let renderer = Arc::new(CommandRenderer::new(config.render_command.clone()));
    let stream = StreamSettings::new(config.keep_alive());
    let state = AppState::new(
        renderer,
        config.output_layout(),
        config.max_file_bytes,
        stream.clone(),
    );
    let app = build_app(state);
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        render_command = %config.render_command,
        output_root = %config.output_root.display(),
        "server starting"
    );

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal(stream))
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal(stream: StreamSettings) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown requested; closing event streams");
    stream.begin_shutdown();
}
