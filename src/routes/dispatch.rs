use crate::{
    app_state::AppState,
    fan_out::{DeliveryReport, DispatchOutcome},
    utils::{e409, e500, HttpError},
};
use axum::{extract::State, routing::post, Json, Router};

pub fn router() -> Router<AppState> {
    Router::new().route("/dispatch", post(dispatch))
}

/// Runs one fan-out right away, outside of the daily schedule.
#[tracing::instrument(name = "Manual fan-out", skip(app_state))]
async fn dispatch(
    State(app_state): State<AppState>,
) -> Result<Json<DeliveryReport>, HttpError<&'static str>> {
    match app_state.dispatcher.dispatch().await {
        DispatchOutcome::Completed(report) => Ok(Json(report)),
        DispatchOutcome::AlreadyRunning => Err(e409("A fan-out run is already in progress")),
        DispatchOutcome::SubscribersUnavailable => Err(e500("Failed to list subscribers")),
    }
}
