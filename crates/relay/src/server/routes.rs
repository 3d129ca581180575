use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use super::Server;
use crate::{
    alert::Batch,
    handler::{Event, Handler},
    metrics::gather_metrics,
    Result,
};

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

pub async fn metrics() -> String {
    gather_metrics()
}

pub async fn receive_event(
    State(server): State<Arc<Server>>,
    Json(event): Json<Event>,
) -> Response {
    dispatch(&server, move |handler, cancel| async move {
        handler.process_event(event, &cancel).await
    })
    .await
}

pub async fn receive_batch(
    State(server): State<Arc<Server>>,
    Path(topic): Path<String>,
    Json(batch): Json<Batch>,
) -> Response {
    dispatch(&server, move |handler, cancel| async move {
        handler.process_batch(&topic, batch, &cancel).await
    })
    .await
}

/// Runs one delivery in its own task so that a client hanging up does not
/// abort it midway. Past the invocation deadline the delivery is cancelled
/// and given the chance to finish its emergency fallback.
async fn dispatch<F, Fut>(server: &Server, work: F) -> Response
where
    F: FnOnce(Handler, CancellationToken) -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let event_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let deadline = server.invocation_timeout;
    let delivery = work(server.handler.clone(), cancel.clone());

    let task = tokio::spawn(
        async move {
            tokio::pin!(delivery);
            tokio::select! {
                result = &mut delivery => result,
                _ = tokio::time::sleep(deadline) => {
                    info!("Invocation deadline reached, cancelling");
                    cancel.cancel();
                    delivery.await
                }
            }
        }
        .instrument(info_span!("delivery", %event_id)),
    );

    match task.await {
        Ok(Ok(())) => Json(json!({ "status": "ok", "event_id": event_id })).into_response(),
        Ok(Err(e)) if e.is_contention() => {
            info!(%event_id, "Delivery deferred by lock contention: {}", e);
            (
                StatusCode::CONFLICT,
                Json(json!({ "error": e.to_string(), "event_id": event_id })),
            )
                .into_response()
        }
        Ok(Err(e)) => {
            error!(%event_id, "Delivery failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string(), "event_id": event_id })),
            )
                .into_response()
        }
        Err(e) => {
            error!(%event_id, "Delivery task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
