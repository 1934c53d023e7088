use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use docfx::interface::FunctionInterface;
use docfx::memory::MemoryBackend;
use docfx::server::router;
use docfx::settings::{DEFAULT_CONFIG_FILE, Settings};
use docfx::todos;

#[tokio::main]
async fn main() -> docfx::Result<()> {
    let config_file = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_owned());
    let settings = Settings::load(&config_file)?;

    let filter = EnvFilter::try_new(&settings.log.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let schema = todos::schema()?;
    info!(tables = schema.tables().count(), "schema loaded");
    let backend = MemoryBackend::new(schema).with_max_page_size(settings.store.max_page_size);
    let interface = Arc::new(FunctionInterface::new(Arc::new(backend), todos::functions()));
    info!(functions = interface.functions().len(), "functions registered");

    let addr = settings.server.socket_addr();
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, router(interface)).await?;
    Ok(())
}
