// Review Insights - Web Server
// REST API with Axum over the review store, loaded once at startup

use anyhow::{Context, Result};
use review_insights::api::{router, AppState};
use review_insights::{init_logging, open_dataset, Config};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    init_logging(&config);

    println!("🌐 Review Insights - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let dataset = open_dataset(&config.db_path)
        .with_context(|| format!("Failed to load review store {:?}", config.db_path))?;
    println!("✓ Loaded {} reviews from {:?}", dataset.reviews().len(), config.db_path);

    let addr = config.server_addr;
    let app = router(AppState::new(dataset, config));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(%addr, "server listening");
    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/dashboard", addr);
    println!("   UI:  http://{}", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server error")?;

    Ok(())
}
