use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    control::{Control, ControlSender, RunContext},
    scanner::SharedProgress,
};

/// What the status API needs to observe and steer one run.
#[derive(Clone)]
pub struct AppState {
    pub progress: SharedProgress,
    pub ctx: RunContext,
    pub controls: ControlSender,
}

/// Routes under `/api`: progress, findings, and pause/resume/stop controls.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/findings", get(get_findings))
        .route("/pause", post(post_pause))
        .route("/resume", post(post_resume))
        .route("/stop", post(post_stop))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(bind, "status API listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(app.progress.snapshot(&app.ctx)))
}

async fn get_findings(State(app): State<AppState>) -> impl IntoResponse {
    let findings = app.progress.findings.lock().await.clone();
    (StatusCode::OK, Json(findings))
}

async fn post_pause(State(app): State<AppState>) -> impl IntoResponse {
    send_control(&app, Control::Pause)
}

async fn post_resume(State(app): State<AppState>) -> impl IntoResponse {
    send_control(&app, Control::Resume)
}

async fn post_stop(State(app): State<AppState>) -> impl IntoResponse {
    send_control(&app, Control::Stop)
}

fn send_control(app: &AppState, msg: Control) -> StatusCode {
    match app.controls.send(msg) {
        Ok(()) => StatusCode::ACCEPTED,
        // control task is gone: the run already stopped
        Err(_) => StatusCode::CONFLICT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::control_channel;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state() -> (AppState, tokio::sync::mpsc::UnboundedReceiver<Control>) {
        let (tx, rx) = control_channel();
        let st = AppState {
            progress: SharedProgress::new(),
            ctx: RunContext::new(),
            controls: tx,
        };
        (st, rx)
    }

    #[tokio::test]
    async fn status_reports_idle_snapshot() {
        let (st, _rx) = state();
        let resp = router(st)
            .oneshot(Request::get("/api/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["phase"], "idle");
        assert_eq!(v["findings"], 0);
        assert_eq!(v["paused"], false);
    }

    #[tokio::test]
    async fn control_routes_forward_messages() {
        let (st, mut rx) = state();
        let app = router(st);
        for (path, want) in [
            ("/api/pause", Control::Pause),
            ("/api/resume", Control::Resume),
            ("/api/stop", Control::Stop),
        ] {
            let resp = app
                .clone()
                .oneshot(Request::post(path).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::ACCEPTED);
            assert_eq!(rx.recv().await, Some(want));
        }
    }

    #[tokio::test]
    async fn control_after_run_is_conflict() {
        let (st, rx) = state();
        drop(rx);
        let resp = router(st)
            .oneshot(Request::post("/api/stop").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CONFLICT);
    }
}
