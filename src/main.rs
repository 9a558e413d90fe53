use std::error::Error;

use foodgram::{routes::routes, Config, State};
use log::{info, warn};
use simple_logger::SimpleLogger;
use sqlx::postgres::PgPoolOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = Config::load()?;
    SimpleLogger::new().with_level(config.log_level).init()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied");

    let bind_addr = config.bind_addr;
    let state = State::new(config, pool)?;

    let (addr, server) = warp::serve(routes(state)).try_bind_with_graceful_shutdown(bind_addr, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for shutdown signal: {e}");
        }
    })?;

    info!("Listening on {addr}");
    server.await;
    info!("Shut down");

    Ok(())
}
