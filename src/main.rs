use std::{net::SocketAddr, process::ExitCode};

use folio::{
    config::Config,
    error::StartupError,
    model::database,
    render::{templates, SiteSettings},
    router, AppState,
};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), StartupError> {
    let path = std::env::args().nth(1).ok_or(StartupError::Usage)?;
    let config = Config::load(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::debug!("{:#?}", config);

    let pool = database::connect(&config.db.sqlite_file).await?;
    database::bootstrap(&pool).await?;

    let state = AppState::new(pool, templates()?, SiteSettings::from_config(&config));
    let app = router(state, config.site.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(config.net.bind).await?;
    tracing::info!(bind = %config.net.bind, site = %config.net.proto_host, "listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown())
    .await?;

    Ok(())
}

async fn shutdown() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "couldn't listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
