// tests/load_balancer_tests.rs
use std::sync::Arc;

use aegis_balancer::circuit_breaker::{CircuitBreaker, CircuitBreakerState};
use aegis_balancer::config::{BackendInfo, StrategyConfig};
use aegis_balancer::dispatcher::Dispatcher;
use aegis_balancer::health::HealthMonitor;
use aegis_balancer::registry::BackendRegistry;
use aegis_balancer::strategy::create_strategy;
use hyper::{Body, Request};

fn strategy_cfg(name: &str) -> StrategyConfig {
    StrategyConfig {
        name: name.to_string(),
        properties: serde_yaml::Value::Null,
    }
}

async fn get(dispatcher: &Dispatcher, path: &str) -> hyper::Response<Body> {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    dispatcher.dispatch(req).await
}

#[tokio::test]
async fn test_round_robin_distribution() {
    let mut servers = Vec::new();
    let mut infos = Vec::new();
    for _ in 0..3 {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;
        let url = url::Url::parse(&server.url()).unwrap();
        let host = url.host_str().unwrap().to_string();
        let port = url.port().unwrap();
        infos.push(BackendInfo::new(host, port).unwrap());
        servers.push(server);
    }

    let strategy = create_strategy(&strategy_cfg("ROUND_ROBIN"), infos.len()).unwrap();
    let registry = Arc::new(BackendRegistry::new(&infos, strategy, reqwest::Client::new()));
    let dispatcher = Dispatcher::new(registry, false);

    for _ in 0..4 {
        let resp = get(&dispatcher, "/").await;
        assert_eq!(resp.status(), hyper::StatusCode::OK);
    }
}

#[tokio::test]
async fn test_circuit_breaker_opens_on_failures() {
    let config = aegis_balancer::circuit_breaker::CircuitBreakerConfig {
        failure_threshold: 2,
        success_threshold: 1,
        open_timeout: std::time::Duration::from_secs(30),
    };
    let breaker = CircuitBreaker::new(config);

    assert!(breaker.call_permitted().await);
    breaker.record_failure().await;
    assert_eq!(breaker.get_state().await, CircuitBreakerState::Closed);
    breaker.record_failure().await;
    assert_eq!(breaker.get_state().await, CircuitBreakerState::Open);
    assert!(!breaker.call_permitted().await);
}

#[tokio::test]
async fn test_health_check_removes_unhealthy_backends() {
    // All three backends point at closed local ports: every proxy attempt
    // fails immediately with a connection error.
    let infos = vec![
        BackendInfo::new("127.0.0.1", 1).unwrap(),
        BackendInfo::new("127.0.0.1", 2).unwrap(),
        BackendInfo::new("127.0.0.1", 3).unwrap(),
    ];

    let strategy = create_strategy(&strategy_cfg("ROUND_ROBIN"), infos.len()).unwrap();
    let registry = Arc::new(BackendRegistry::new(&infos, strategy, reqwest::Client::new()));
    let monitor = HealthMonitor::new(Arc::downgrade(&registry), reqwest::Client::new());
    registry.attach_monitor(monitor.clone());

    let dispatcher = Dispatcher::new(registry.clone(), false);
    let resp = get(&dispatcher, "/").await;

    assert_eq!(resp.status(), hyper::StatusCode::BAD_GATEWAY);

    let views = registry.views().await;
    assert!(views.iter().all(|v| !v.alive));
    assert_eq!(monitor.recovery_task_count(), 3);
}
