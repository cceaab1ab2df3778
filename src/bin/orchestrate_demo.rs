//! Demo: one orchestration over scripted adapters for a sample ICP, result printed as JSON.

use multi_source_leads::source::mock::{raw, ScriptedAdapter};
use multi_source_leads::{
    config, AdapterError, AdapterRegistry, Icp, LeadEngine, PerformanceHistory, Platform,
    RunOverrides,
};
use serde_json::json;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let registry = AdapterRegistry::new()
        .with(
            ScriptedAdapter::new(Platform::Github)
                .with_latency(Duration::from_millis(120))
                .returning(vec![
                    raw(json!({
                        "login": "janedoe",
                        "name": "Jane Doe",
                        "company": "@acme",
                        "bio": "CTO at Acme. We're hiring Rust engineers.",
                        "followers": 1200,
                        "public_repos": 48,
                        "updated_at": "2026-09-30T10:00:00Z"
                    })),
                    raw(json!({ "login": "kpatel", "name": "Kiran Patel", "blog": "kiran.dev" })),
                ]),
        )
        .with(
            ScriptedAdapter::new(Platform::Linkedin)
                .with_latency(Duration::from_millis(200))
                .returning(vec![raw(json!({
                    "full_name": "Jane Doe",
                    "headline": "Chief Technology Officer",
                    "company": "Acme",
                    "profile_url": "https://www.linkedin.com/in/janedoe",
                    "email": "jane@acme.io"
                }))]),
        )
        .with(
            ScriptedAdapter::new(Platform::Twitter)
                .failing_first(1, AdapterError::RateLimited { retry_after: Some(Duration::from_millis(300)) })
                .returning(vec![raw(json!({
                    "user": { "name": "Jane Doe", "username": "janedoe", "description": "CTO @acme" },
                    "created_at": "2026-10-01T08:00:00Z"
                }))]),
        )
        .with(ScriptedAdapter::new(Platform::StackOverflow).always_failing(AdapterError::Unavailable("503".into())))
        .with(ScriptedAdapter::new(Platform::GoogleSearch).returning(vec![]));

    let engine = LeadEngine::new(config::load_default()?, registry);
    let icp = Icp::new("technology")
        .with_roles(["CTO", "VP Engineering"])
        .with_company_size("51-200")
        .with_descriptors(["rust", "b2b"]);

    let mut history = PerformanceHistory::default();
    let result = engine
        .run_orchestration(&icp, &RunOverrides::default().with_max_run_time(Duration::from_secs(20)), &mut history)
        .await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    println!("history: {}", serde_json::to_string(&history)?);
    Ok(())
}
