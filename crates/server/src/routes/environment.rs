// crates/server/src/routes/environment.rs
//! Host environment diagnostics.
//!
//! - GET /check-environment: PowerShell version plus installed ARI and Az modules

use std::sync::Arc;
use std::time::Duration;

use ari_web_core::{run_collect, CommandSpec};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Trimmed stdout of each diagnostic command.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct EnvironmentResponse {
    pub powershell: String,
    pub ari_module: String,
    pub azure_modules: String,
}

/// GET /api/check-environment: run the three diagnostics concurrently.
///
/// Any dispatch failure, timeout or non-zero exit turns into a 500.
pub async fn check_environment(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<EnvironmentResponse>> {
    let checks = state.launcher.environment_checks();
    let timeout = state.config.check_timeout;

    let (powershell, ari_module, azure_modules) = tokio::try_join!(
        run_check(&checks.powershell, timeout),
        run_check(&checks.ari_module, timeout),
        run_check(&checks.azure_modules, timeout),
    )?;

    Ok(Json(EnvironmentResponse {
        powershell,
        ari_module,
        azure_modules,
    }))
}

async fn run_check(spec: &CommandSpec, timeout: Duration) -> ApiResult<String> {
    let output = run_collect(spec, timeout).await?;
    if !output.success() {
        let stderr = output.stderr.trim();
        let message = if stderr.is_empty() {
            format!("{} exited with code {}", spec.program, output.exit_code)
        } else {
            stderr.to_string()
        };
        return Err(ApiError::Environment(message));
    }
    Ok(output.stdout.trim().to_string())
}

/// Build the environment router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/check-environment", get(check_environment))
}
