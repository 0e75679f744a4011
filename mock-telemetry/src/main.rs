//! Mock telemetry emitter.
//!
//! Streams randomized AUV telemetry frames over a WebSocket so the insight
//! engine can be exercised without a live fleet. Scenarios are weighted to
//! straddle the engine's environmental threshold bands.
//!
//! # Environment variables
//! | Var                   | Default        |
//! |-----------------------|----------------|
//! | `MOCK_TELEMETRY_ADDR` | `0.0.0.0:8001` |

use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use rand::Rng;
use tower_http::trace::TraceLayer;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mock_telemetry=info".parse()?),
        )
        .json()
        .init();

    let addr = std::env::var("MOCK_TELEMETRY_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:8001".to_string());

    let app = Router::new()
        .route("/ws/telemetry", get(ws_handler))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr, "mock-telemetry listening");

    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(stream_telemetry)
}

async fn stream_telemetry(mut socket: WebSocket) {
    info!("client connected");
    loop {
        let (frame, delay) = next_frame();
        if socket.send(Message::Text(frame.to_string())).await.is_err() {
            break;
        }
        tokio::time::sleep(delay).await;
    }
    info!("client disconnected");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scenario {
    Normal,
    TempWarning,
    TempCritical,
    TurbidityWarning,
    TurbidityCritical,
}

// 30% normal, 70% various alerts.
fn pick_scenario(rng: &mut impl Rng) -> Scenario {
    match rng.gen_range(0..10) {
        0..=2 => Scenario::Normal,
        3..=4 => Scenario::TempWarning,
        5 => Scenario::TempCritical,
        6..=8 => Scenario::TurbidityWarning,
        _ => Scenario::TurbidityCritical,
    }
}

fn temperature_for(scenario: Scenario, rng: &mut impl Rng) -> f64 {
    match scenario {
        // Just outside the warning band [1.5, 2.5].
        Scenario::TempWarning => {
            if rng.gen_bool(0.5) {
                rng.gen_range(1.0..1.4)
            } else {
                rng.gen_range(2.6..3.0)
            }
        }
        // Outside the critical band [1.0, 3.0].
        Scenario::TempCritical => {
            if rng.gen_bool(0.5) {
                rng.gen_range(0.5..0.9)
            } else {
                rng.gen_range(3.1..3.5)
            }
        }
        _ => rng.gen_range(1.8..2.4),
    }
}

fn turbidity_for(scenario: Scenario, rng: &mut impl Rng) -> f64 {
    match scenario {
        // Just outside the warning band [0.05, 0.25].
        Scenario::TurbidityWarning => {
            if rng.gen_bool(0.5) {
                rng.gen_range(0.01..0.04)
            } else {
                rng.gen_range(0.26..0.29)
            }
        }
        // Outside the critical band [0.0, 0.3].
        Scenario::TurbidityCritical => {
            if rng.gen_bool(0.5) {
                rng.gen_range(-0.1..-0.01)
            } else {
                rng.gen_range(0.31..0.4)
            }
        }
        _ => rng.gen_range(0.1..0.2),
    }
}

fn next_frame() -> (serde_json::Value, Duration) {
    let mut rng = rand::thread_rng();
    let scenario = pick_scenario(&mut rng);

    let frame = serde_json::json!({
        "auv_id": format!("AUV-{}", rng.gen_range(1..=9)),
        "timestamp": Utc::now().to_rfc3339(),
        "location": {
            "lat": rng.gen_range(-9.0..-8.0),
            "lon": rng.gen_range(-147.0..-146.0),
        },
        "depth_m": rng.gen_range(4000.0..4500.0),
        "zone_id": format!("ISA-ZONE-{}", rng.gen_range(1..=10)),
        "velocity_knots": rng.gen_range(1.5..3.5),
        "temperature_c": temperature_for(scenario, &mut rng),
        "turbidity": turbidity_for(scenario, &mut rng),
    });
    let delay = Duration::from_millis(rng.gen_range(8_000..13_000));
    (frame, delay)
}
