//! order-watch: follow a tenant's live order list from the terminal
//!
//! Usage: `order-watch <tenant_id> [restaurant_id]`

use anyhow::Context;
use order_sync::logger;
use order_sync::{OrderQuery, Role, Session, SyncConfig, SyncContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment and logging
    dotenv::dotenv().ok();
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let json = std::env::var("LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    let log_dir = std::env::var("LOG_DIR").ok();
    logger::init_logger_with_file(&level, json, log_dir.as_deref())?;

    let mut args = std::env::args().skip(1);
    let tenant_id = args.next().context("usage: order-watch <tenant_id> [restaurant_id]")?;
    let restaurant_id = args.next();

    // 2. Configuration and session
    let config = SyncConfig::from_env();
    let user_id = std::env::var("ORDER_SYNC_USER_ID").unwrap_or_else(|_| "order-watch".to_string());
    let role = match std::env::var("ORDER_SYNC_ROLE") {
        Ok(role) => role.parse::<Role>().map_err(anyhow::Error::msg)?,
        Err(_) => Role::Manager,
    };
    let per_page = config.per_page;
    let sync = SyncContext::from_config(config, Session::new(user_id, role))?;

    // 3. Start syncing and load the first page
    sync.start(&tenant_id).await;
    let mut query = OrderQuery::page(1, per_page);
    if let Some(restaurant_id) = restaurant_id {
        query = query.with_restaurant(restaurant_id);
    }
    if let Err(e) = sync.fetch_page(query).await {
        tracing::error!(error = %e, "Initial fetch failed");
    }

    // 4. Report every change until interrupted
    let mut revisions = sync.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                let window = sync.window();
                tracing::info!(
                    connection = %sync.connection_state(),
                    page = window.page(),
                    total_pages = window.total_pages(),
                    total_count = window.total_count(),
                    visible = window.len(),
                    loading = sync.is_loading(),
                    "Orders updated"
                );
            }
        }
    }

    sync.stop();
    tracing::info!("order-watch stopped");
    Ok(())
}
