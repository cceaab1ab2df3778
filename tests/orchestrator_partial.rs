// tests/orchestrator_partial.rs
use multi_source_leads::source::mock::{raw, ScriptedAdapter};
use multi_source_leads::{
    AdapterError, AdapterRegistry, CancellationToken, Icp, LeadError, Orchestrator,
    OrchestratorConfig, Platform, SearchStrategy, SourceConfig, SourceStatus,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// Fast settings so failing sources give up quickly.
fn cfg() -> OrchestratorConfig {
    OrchestratorConfig {
        call_timeout_secs: 0.2,
        run_deadline_secs: 10.0,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
        ..OrchestratorConfig::default()
    }
}

fn src(platform: Platform) -> SourceConfig {
    SourceConfig::new(platform, 5).with_rate_limit_delay(0.0)
}

fn strategies(platforms: &[Platform]) -> BTreeMap<Platform, SearchStrategy> {
    platforms.iter().map(|p| (*p, SearchStrategy::new(["q"]))).collect()
}

fn person(login: &str, name: &str) -> serde_json::Map<String, serde_json::Value> {
    raw(json!({ "login": login, "name": name }))
}

fn linkedin(name: &str, slug: &str) -> serde_json::Map<String, serde_json::Value> {
    raw(json!({ "full_name": name, "profile_url": format!("https://www.linkedin.com/in/{slug}") }))
}

#[tokio::test]
async fn three_of_five_failing_still_returns_result() {
    let platforms = [
        Platform::Github,
        Platform::Linkedin,
        Platform::Twitter,
        Platform::Reddit,
        Platform::StackOverflow,
    ];
    let registry = AdapterRegistry::new()
        .with(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]))
        .with(ScriptedAdapter::new(Platform::Linkedin).returning(vec![linkedin("Grace Hopper", "ghopper")]))
        .with(ScriptedAdapter::new(Platform::Twitter).always_failing(AdapterError::Unavailable("503".into())))
        .with(ScriptedAdapter::new(Platform::Reddit).with_auth_failures(10))
        .with(ScriptedAdapter::new(Platform::StackOverflow).hanging());
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();

    let out = Orchestrator::new(cfg())
        .run(&sources, &strategies(&platforms), &registry, &Icp::default())
        .await
        .expect("two usable sources meet the floor");

    // listed in platform order
    assert_eq!(out.successful_sources, vec![Platform::Linkedin, Platform::Github]);
    assert_eq!(out.failed_sources.len(), 3);
    assert_eq!(out.prospects.len(), 2);
    assert!(!out.timed_out && !out.cancelled);

    let tw = out.metrics(Platform::Twitter).unwrap();
    assert_eq!(tw.status, SourceStatus::Failed);
    assert_eq!(tw.error_count, 3);
    assert_eq!(tw.retries, 2);

    let so = out.metrics(Platform::StackOverflow).unwrap();
    assert_eq!(so.status, SourceStatus::Failed);
    assert!(so.last_error.as_deref().unwrap_or_default().contains("timed out"));

    let rd = out.metrics(Platform::Reddit).unwrap();
    assert!(rd.last_error.as_deref().unwrap_or_default().contains("authentication"));
}

#[tokio::test]
async fn one_success_is_insufficient() {
    let platforms = [Platform::Github, Platform::Twitter];
    let registry = AdapterRegistry::new()
        .with(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]))
        .with(ScriptedAdapter::new(Platform::Twitter).always_failing(AdapterError::Unavailable("down".into())));
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();

    let err = Orchestrator::new(cfg())
        .run(&sources, &strategies(&platforms), &registry, &Icp::default())
        .await
        .unwrap_err();
    assert_eq!(err, LeadError::InsufficientSources { required: 2, succeeded: 1 });
}

#[tokio::test]
async fn empty_source_counts_as_success_but_not_for_floor() {
    let platforms = [Platform::Github, Platform::Reddit];
    let registry = AdapterRegistry::new()
        .with(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]))
        .with(ScriptedAdapter::new(Platform::Reddit).returning(vec![]));
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let out = orch
        .run(&sources, &strategies(&platforms), &registry, &Icp::default())
        .await
        .unwrap();
    assert_eq!(out.metrics(Platform::Reddit).unwrap().status, SourceStatus::Empty);
    assert!(out.successful_sources.contains(&Platform::Reddit));
    assert!(out.failed_sources.is_empty());
}

#[tokio::test]
async fn cancel_after_floor_returns_scored_partial_result() {
    let platforms = [Platform::Github, Platform::Linkedin, Platform::StackOverflow];
    let registry = AdapterRegistry::new()
        .with(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]))
        .with(ScriptedAdapter::new(Platform::Linkedin).returning(vec![linkedin("Grace Hopper", "ghopper")]))
        .with(ScriptedAdapter::new(Platform::StackOverflow).hanging());
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();
    let orch = Orchestrator::new(OrchestratorConfig {
        call_timeout_secs: 60.0,
        run_deadline_secs: 60.0,
        ..cfg()
    });

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let out = orch
        .run_with_cancel(&sources, &strategies(&platforms), &registry, &Icp::default(), &token)
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(out.cancelled);
    assert!(!out.timed_out);
    assert_eq!(out.pending_sources, vec![Platform::StackOverflow]);
    assert_eq!(out.prospects.len(), 2);
    assert!(out.prospects.iter().all(|p| p.relevance_score > 0.0));
    assert!(out.prospects[0].relevance_score >= out.prospects[1].relevance_score);
}

#[tokio::test]
async fn deadline_marks_in_flight_sources_pending() {
    let platforms = [Platform::Github, Platform::Linkedin, Platform::Medium];
    let registry = AdapterRegistry::new()
        .with(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]))
        .with(ScriptedAdapter::new(Platform::Linkedin).returning(vec![linkedin("Grace Hopper", "ghopper")]))
        .with(ScriptedAdapter::new(Platform::Medium).hanging());
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();
    let orch = Orchestrator::new(OrchestratorConfig {
        call_timeout_secs: 60.0,
        run_deadline_secs: 0.4,
        ..cfg()
    });

    let started = Instant::now();
    let out = orch
        .run(&sources, &strategies(&platforms), &registry, &Icp::default())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(out.timed_out);
    assert_eq!(out.metrics(Platform::Medium).unwrap().status, SourceStatus::Pending);
    assert_eq!(out.pending_sources, vec![Platform::Medium]);
    assert!(out.is_partial());
}

#[tokio::test]
async fn fallback_runs_when_primary_is_empty() {
    let github = Arc::new(
        ScriptedAdapter::new(Platform::Github)
            .on_query("primary", vec![])
            .on_query("backup", vec![person("ada", "Ada Lovelace")]),
    );
    let mut registry = AdapterRegistry::new();
    registry.register(github.clone());
    let mut strategies = BTreeMap::new();
    strategies.insert(
        Platform::Github,
        SearchStrategy::new(["primary"]).with_fallback(["backup"]),
    );
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let out = orch
        .run(&[src(Platform::Github)], &strategies, &registry, &Icp::default())
        .await
        .unwrap();
    let m = out.metrics(Platform::Github).unwrap();
    assert!(m.used_fallback);
    assert_eq!(m.total_queries, 2);
    assert_eq!(m.normalized_records, 1);
    assert_eq!(github.calls(), vec!["primary", "backup"]);
}

#[tokio::test]
async fn fallback_runs_when_primary_quality_is_low() {
    let junk = raw(json!({ "score": 3 }));
    let github = Arc::new(
        ScriptedAdapter::new(Platform::Github)
            .on_query("primary", vec![junk.clone(), junk, person("bob", "Bob Ross")])
            .on_query("backup", vec![person("ada", "Ada Lovelace")]),
    );
    let mut registry = AdapterRegistry::new();
    registry.register(github.clone());
    let mut strategies = BTreeMap::new();
    strategies.insert(
        Platform::Github,
        SearchStrategy::new(["primary"])
            .with_fallback(["backup"])
            .with_quality_threshold(0.5),
    );
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let out = orch
        .run(&[src(Platform::Github)], &strategies, &registry, &Icp::default())
        .await
        .unwrap();
    let m = out.metrics(Platform::Github).unwrap();
    assert!(m.used_fallback);
    assert_eq!(m.normalized_records, 2);
    assert_eq!(m.data_quality_failures, 2);
}

#[tokio::test]
async fn good_primary_skips_fallback() {
    let github = Arc::new(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]));
    let mut registry = AdapterRegistry::new();
    registry.register(github.clone());
    let mut strategies = BTreeMap::new();
    strategies.insert(Platform::Github, SearchStrategy::new(["primary"]).with_fallback(["backup"]));
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let out = orch
        .run(&[src(Platform::Github)], &strategies, &registry, &Icp::default())
        .await
        .unwrap();
    assert!(!out.metrics(Platform::Github).unwrap().used_fallback);
    assert_eq!(github.calls(), vec!["primary"]);
}

#[tokio::test]
async fn rate_limited_calls_back_off_and_recover() {
    let github = Arc::new(
        ScriptedAdapter::new(Platform::Github)
            .returning(vec![person("ada", "Ada Lovelace")])
            .failing_first(2, AdapterError::RateLimited { retry_after: Some(Duration::from_millis(50)) }),
    );
    let mut registry = AdapterRegistry::new();
    registry.register(github.clone());
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let started = Instant::now();
    let out = orch
        .run(&[src(Platform::Github)], &strategies(&[Platform::Github]), &registry, &Icp::default())
        .await
        .unwrap();
    // two waits of at least retry_after
    assert!(started.elapsed() >= Duration::from_millis(100));
    let m = out.metrics(Platform::Github).unwrap();
    assert_eq!(m.status, SourceStatus::Succeeded);
    assert_eq!(m.retries, 2);
    assert_eq!(m.error_count, 2);
    assert_eq!(github.calls().len(), 3);
}

#[tokio::test]
async fn exhausted_retries_give_up() {
    let github = Arc::new(
        ScriptedAdapter::new(Platform::Github)
            .returning(vec![person("ada", "Ada Lovelace")])
            .failing_first(5, AdapterError::Unavailable("502".into())),
    );
    let mut registry = AdapterRegistry::new();
    registry.register(github.clone());
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 0, ..cfg() });

    let out = orch
        .run(&[src(Platform::Github)], &strategies(&[Platform::Github]), &registry, &Icp::default())
        .await
        .unwrap();
    assert_eq!(out.metrics(Platform::Github).unwrap().status, SourceStatus::Failed);
    assert_eq!(github.calls().len(), 3);
}

#[tokio::test]
async fn auth_failure_is_retried_once() {
    let once = Arc::new(
        ScriptedAdapter::new(Platform::Github)
            .with_auth_failures(1)
            .returning(vec![person("ada", "Ada Lovelace")]),
    );
    let twice = Arc::new(
        ScriptedAdapter::new(Platform::Linkedin)
            .with_auth_failures(2)
            .returning(vec![linkedin("Grace Hopper", "ghopper")]),
    );
    let mut registry = AdapterRegistry::new();
    registry.register(once.clone());
    registry.register(twice.clone());
    let platforms = [Platform::Github, Platform::Linkedin];
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let out = orch
        .run(&sources, &strategies(&platforms), &registry, &Icp::default())
        .await
        .unwrap();
    assert_eq!(once.auth_attempts(), 2);
    assert_eq!(out.metrics(Platform::Github).unwrap().status, SourceStatus::Succeeded);

    assert_eq!(twice.auth_attempts(), 2);
    assert!(twice.calls().is_empty());
    assert_eq!(out.metrics(Platform::Linkedin).unwrap().status, SourceStatus::Failed);
}

#[tokio::test]
async fn partial_query_failure_is_degraded() {
    let github = Arc::new(
        ScriptedAdapter::new(Platform::Github)
            .on_query("good", vec![person("ada", "Ada Lovelace")])
            .on_query("bad", vec![])
            .failing_first(1, AdapterError::Malformed("truncated body".into())),
    );
    let mut registry = AdapterRegistry::new();
    registry.register(github.clone());
    let mut strategies = BTreeMap::new();
    // first call ("bad") hits the malformed error, second ("good") succeeds
    strategies.insert(Platform::Github, SearchStrategy::new(["bad", "good"]));
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let out = orch
        .run(&[src(Platform::Github)], &strategies, &registry, &Icp::default())
        .await
        .unwrap();
    let m = out.metrics(Platform::Github).unwrap();
    assert_eq!(m.status, SourceStatus::Degraded);
    assert_eq!(m.successful_queries, 1);
    assert_eq!(m.total_queries, 2);
    assert!(out.successful_sources.contains(&Platform::Github));
}

#[tokio::test]
async fn fail_fast_returns_once_floor_is_met() {
    let platforms = [Platform::Github, Platform::Linkedin, Platform::Medium];
    let registry = AdapterRegistry::new()
        .with(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]))
        .with(ScriptedAdapter::new(Platform::Linkedin).returning(vec![linkedin("Grace Hopper", "ghopper")]))
        .with(
            ScriptedAdapter::new(Platform::Medium)
                .with_latency(Duration::from_secs(3))
                .returning(vec![raw(json!({ "name": "Slow Poke", "email": "slow@poke.io" }))]),
        );
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();
    let orch = Orchestrator::new(OrchestratorConfig {
        fail_fast: true,
        call_timeout_secs: 10.0,
        ..cfg()
    });

    let started = Instant::now();
    let out = orch
        .run(&sources, &strategies(&platforms), &registry, &Icp::default())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(out.pending_sources, vec![Platform::Medium]);
    assert_eq!(out.prospects.len(), 2);
    assert!(!out.timed_out);
}

#[tokio::test]
async fn concurrency_cap_serialises_sources() {
    let platforms = [Platform::Github, Platform::Linkedin];
    let registry = AdapterRegistry::new()
        .with(
            ScriptedAdapter::new(Platform::Github)
                .with_latency(Duration::from_millis(150))
                .returning(vec![person("ada", "Ada Lovelace")]),
        )
        .with(
            ScriptedAdapter::new(Platform::Linkedin)
                .with_latency(Duration::from_millis(150))
                .returning(vec![linkedin("Grace Hopper", "ghopper")]),
        );
    let sources: Vec<_> = platforms.iter().map(|p| src(*p)).collect();
    let orch = Orchestrator::new(OrchestratorConfig { max_concurrency: 1, ..cfg() });

    let started = Instant::now();
    orch.run(&sources, &strategies(&platforms), &registry, &Icp::default())
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(290));
}

#[tokio::test]
async fn token_bucket_spaces_calls_to_one_platform() {
    let registry = AdapterRegistry::new()
        .with(ScriptedAdapter::new(Platform::Github).returning(vec![person("ada", "Ada Lovelace")]));
    let mut strategies = BTreeMap::new();
    strategies.insert(Platform::Github, SearchStrategy::new(["a", "b", "c"]));
    let source = SourceConfig::new(Platform::Github, 5).with_rate_limit_delay(0.2);
    let orch = Orchestrator::new(OrchestratorConfig { min_sources: 1, ..cfg() });

    let started = Instant::now();
    let out = orch
        .run(&[source], &strategies, &registry, &Icp::default())
        .await
        .unwrap();
    // three calls, two refills
    assert!(started.elapsed() >= Duration::from_millis(350));
    let m = out.metrics(Platform::Github).unwrap();
    assert_eq!(m.total_queries, 3);
    // same profile three times within one platform
    assert_eq!(m.duplicate_records, 2);
    assert_eq!(m.normalized_records, 1);
}
