use crate::{
    app_state::AppState,
    subscriber_store::StoreError,
    utils::{e500, HttpError},
};
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

pub fn router() -> Router<AppState> {
    Router::new().route("/stats", get(stats))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SubscriberStats {
    pub total: usize,
    pub subscribed: usize,
    pub blocked: usize,
    pub receiving_notifications: usize,
}

#[tracing::instrument(name = "Subscriber stats", skip(app_state))]
async fn stats(
    State(app_state): State<AppState>,
) -> Result<Json<SubscriberStats>, HttpError<StoreError>> {
    let subscribers = app_state.store.list_all().await.map_err(e500)?;

    let stats = subscribers
        .iter()
        .fold(SubscriberStats::default(), |mut stats, subscriber| {
            stats.total += 1;
            stats.subscribed += usize::from(subscriber.subscribed);
            stats.blocked += usize::from(subscriber.blocked);
            stats.receiving_notifications += usize::from(subscriber.receives_notifications());
            stats
        });

    Ok(Json(stats))
}
