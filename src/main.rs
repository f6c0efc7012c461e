use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use webpilot::config::{SafetyPolicy, Settings};
use webpilot::planner::provider_from_settings;
use webpilot::runtime::AgentRuntime;
use webpilot::server;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let settings = Settings::from_env();
    let runtime = AgentRuntime::new(SafetyPolicy::default());

    match provider_from_settings(&settings) {
        Some(planner) => {
            runtime.set_planner(planner);
            info!(
                provider = ?settings.provider,
                model = %settings.model,
                "planner configured"
            );
        }
        None => {
            warn!(
                provider = ?settings.provider,
                "no API key configured; the planner is disabled and task creation will be rejected"
            );
        }
    }

    server::serve(runtime, settings.port).await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
