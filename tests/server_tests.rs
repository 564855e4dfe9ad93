use std::time::Duration;

use axum::Router;
use order_fulfillment::{
    api::router,
    config::Config,
    geo::Coordinate,
    orders::Order,
    simulate::{SimConfig, run_simulation},
    state::AppState,
};
use reqwest::StatusCode;
use serde_json::json;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn spawn_server() -> (String, tokio::task::JoinHandle<()>, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let state = AppState::new(config).unwrap();
    let app: Router = router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let base = format!("http://{}", addr);

    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let ok = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let probe = client
                .post(format!("{}/delivery/validate", base))
                .json(&json!({
                    "restaurantId": "spice-route",
                    "userLocation": { "latitude": 28.6139, "longitude": 77.2090 }
                }))
                .send()
                .await;
            if let Ok(r) = probe {
                if r.status().is_success() {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .is_ok();
    assert!(ok, "server did not become ready in time");

    (base, handle, dir)
}

#[tokio::test]
async fn test_concurrent_status_updates_never_lose_history() {
    let (base, server, _tmpdir) = spawn_server().await;
    let client = reqwest::Client::new();

    let order: Order = client
        .post(format!("{}/orders", base))
        .bearer_auth("dev-customer")
        .json(&json!({ "restaurantId": "spice-route", "totalAmount": 42.0 }))
        .send()
        .await
        .expect("place order")
        .json()
        .await
        .expect("order body");

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let client = client.clone();
        let url = format!("{}/orders/{}/status", base, order.id);
        tasks.push(tokio::spawn(async move {
            client
                .patch(url)
                .bearer_auth("dev-owner-spice")
                .json(&json!({ "status": "preparing" }))
                .send()
                .await
                .expect("patch")
                .status()
        }));
    }

    let mut ok = 0;
    let mut conflicts = 0;
    for task in tasks {
        match task.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::CONFLICT => conflicts += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert!(ok >= 1);
    assert_eq!(ok + conflicts, 16);

    let stored: Order = client
        .get(format!("{}/orders/{}", base, order.id))
        .bearer_auth("dev-owner-spice")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stored.status_history.len(), 1 + ok);
    assert_eq!(stored.version, ok as u64);

    server.abort();
}

#[tokio::test]
async fn test_simulation_runs_against_live_server() {
    let (base, server, _tmpdir) = spawn_server().await;

    let cfg = SimConfig {
        api_base: base,
        customer_token: "dev-customer".into(),
        owner_token: "dev-owner-spice".into(),
        restaurant_id: "spice-route".into(),
        restaurant_location: Coordinate::new(28.6139, 77.2090),
        orders: 3,
        run_secs: Some(1),
        rate_hz: 50.0,
        jitter_km: 4.0,
    };
    let stats = run_simulation(cfg, CancellationToken::new())
        .await
        .expect("simulation");

    assert_eq!(stats.placed, 3);
    assert_eq!(stats.other_failures, 0);
    assert!(stats.updated + stats.rejected + stats.conflicts > 0);
    assert!(stats.deliverable + stats.undeliverable > 0);

    server.abort();
}

#[tokio::test]
async fn test_cancelled_simulation_stops_early() {
    let (base, server, _tmpdir) = spawn_server().await;

    let token = CancellationToken::new();
    token.cancel();
    let cfg = SimConfig {
        api_base: base,
        customer_token: "dev-customer".into(),
        owner_token: "dev-owner-spice".into(),
        restaurant_id: "spice-route".into(),
        restaurant_location: Coordinate::new(28.6139, 77.2090),
        orders: 1,
        run_secs: None,
        rate_hz: 0.5,
        jitter_km: 1.0,
    };
    let stats = tokio::time::timeout(Duration::from_secs(5), run_simulation(cfg, token))
        .await
        .expect("simulation should stop on cancel")
        .expect("simulation");
    assert_eq!(stats.placed, 1);

    server.abort();
}
