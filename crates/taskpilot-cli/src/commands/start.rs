use std::sync::Arc;
use tracing::{info, warn};

use taskpilot_config::TaskPilotConfig;

pub(super) async fn cmd_start(
    config: TaskPilotConfig,
    listen: Option<String>,
) -> anyhow::Result<()> {
    let listen = listen.unwrap_or_else(|| config.server.listen.clone());

    println!("TaskPilot v{}", env!("CARGO_PKG_VERSION"));
    println!("   Model: {}", config.agent.model);
    println!("   Store: {}", config.storage.resolved_db_path().display());
    println!(
        "   Reminders: {:?}h before due ({})",
        config.reminders.offsets_hours,
        if config.reminders.durable {
            "durable"
        } else {
            "in-memory"
        }
    );
    println!("   Listening: http://{}", listen);

    let router = super::build_model_router(&config);
    let providers = router.provider_names();
    if providers.is_empty() {
        println!("   Providers: none");
    } else {
        println!("   Providers: {}", providers.join(", "));
    }
    println!();

    for (provider, result) in router.health_check_all().await {
        match result {
            Ok(()) => info!(provider = %provider, "provider healthy"),
            Err(e) => warn!(provider = %provider, error = %e, "provider health check failed"),
        }
    }

    let registry = super::build_registry(&config, Arc::new(router))?;
    let restored = registry.restore().await?;
    if restored > 0 {
        info!(sessions = restored, "restored sessions with pending reminders");
    }

    taskpilot_server::start_server(&listen, registry).await?;
    Ok(())
}
