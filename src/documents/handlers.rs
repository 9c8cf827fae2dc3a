use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use time::OffsetDateTime;
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tracing::{instrument, warn};

use crate::{auth::AuthUser, state::AppState};

use super::dto::{RecordGenerationRequest, RecordScanningRequest, ScannedQuery};
use super::live::Dashboard;
use super::model::DocumentRecord;
use super::stats::{recent_scanned_documents, user_document_stats, DocumentStats};
use super::titles::{generation_title, is_valid_document_type, normalize_document_type, scan_title};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/documents/stats", get(get_stats))
        .route(
            "/documents/scanned",
            get(list_recent_scanned).post(record_scanning),
        )
        .route("/documents/generated", post(record_generation))
        .route("/documents/dashboard/live", get(live_dashboard))
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn get_stats(State(state): State<AppState>, user: AuthUser) -> Json<DocumentStats> {
    Json(user_document_stats(state.store.as_ref(), &user.user_id).await)
}

#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn list_recent_scanned(
    State(state): State<AppState>,
    user: AuthUser,
    Query(q): Query<ScannedQuery>,
) -> Json<Vec<DocumentRecord>> {
    let limit = q.resolve(state.config.recent_scanned_limit);
    Json(recent_scanned_documents(state.store.as_ref(), &user.user_id, limit).await)
}

/// POST /documents/generated. Always 202 once validated; tracking runs detached.
#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn record_generation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<RecordGenerationRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    let document_type = normalize_document_type(&body.document_type).unwrap_or_default();
    if !document_type.is_empty() && !is_valid_document_type(&document_type) {
        warn!(document_type = %body.document_type, "invalid document type");
        return Err((StatusCode::BAD_REQUEST, "Invalid document type".into()));
    }

    let title = match body.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => generation_title(&document_type, body.party_name.as_deref()),
    };
    let language = body.language.clone().unwrap_or_default();
    let metadata = body.into_metadata();

    let tracker = state.tracker.clone();
    tokio::spawn(async move {
        tracker
            .record_generation(&user.user_id, &document_type, &title, &language, Some(metadata))
            .await;
    });
    Ok(StatusCode::ACCEPTED)
}

/// POST /documents/scanned. Always 202; tracking runs detached.
#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn record_scanning(
    State(state): State<AppState>,
    user: AuthUser,
    body: Option<Json<RecordScanningRequest>>,
) -> StatusCode {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let title = match body.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => scan_title(OffsetDateTime::now_utc().date()),
    };

    let tracker = state.tracker.clone();
    tokio::spawn(async move {
        tracker
            .record_scanning(&user.user_id, &title, body.simplified_language.as_deref())
            .await;
    });
    StatusCode::ACCEPTED
}

/// Server-sent snapshots of one mounted dashboard; unmounted when the client goes away.
#[instrument(skip(state, user), fields(user_id = %user.user_id))]
pub async fn live_dashboard(
    State(state): State<AppState>,
    user: AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let dashboard = Dashboard::mount(
        state.store.clone(),
        user.user_id,
        state.config.recent_scanned_limit,
    );
    let snapshots = WatchStream::new(dashboard.state());
    let stream = snapshots.map(move |snapshot| {
        // The stream owns the dashboard; dropping it unmounts.
        let _mounted = &dashboard;
        let event = Event::default()
            .event("dashboard")
            .json_data(&snapshot)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()));
        Ok(event)
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::memory::{Fault, MemoryRecordStore};
    use crate::documents::model::{NewRecord, RecordDetails};
    use axum::response::IntoResponse;
    use crate::documents::store::{QueryOrder, RecordStore};
    use std::sync::Arc;

    fn state() -> (MemoryRecordStore, AppState) {
        let store = MemoryRecordStore::new();
        let state = AppState::with_store(Arc::new(store.clone()));
        (store, state)
    }

    fn user() -> AuthUser {
        AuthUser {
            user_id: "U".into(),
            display_name: Some("Test User".into()),
        }
    }

    async fn settle(store: &MemoryRecordStore, expected: usize) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while store.len() < expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("tracking write never landed");
    }

    #[tokio::test]
    async fn generation_derives_title_and_metadata() {
        let (store, state) = state();
        let body = RecordGenerationRequest {
            document_type: "NDA".into(),
            title: None,
            language: None,
            party_name: Some("Acme".into()),
            effective_date: Some("2026-11-01".into()),
            metadata: Default::default(),
        };

        let status = record_generation(State(state), user(), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        settle(&store, 1).await;

        let records = store.find_by_user("U", QueryOrder::Unordered).await.unwrap();
        assert_eq!(records[0].title, "Non-Disclosure Agreement - Acme");
        match &records[0].details {
            RecordDetails::Generated {
                document_type,
                language,
                metadata,
            } => {
                assert_eq!(document_type.as_deref(), Some("nda"));
                assert_eq!(language, "en");
                assert_eq!(metadata["effectiveDate"], "2026-11-01");
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[tokio::test]
    async fn generation_rejects_bad_document_type() {
        let (_, state) = state();
        let body = RecordGenerationRequest {
            document_type: "rent agreement!".into(),
            title: None,
            language: None,
            party_name: None,
            effective_date: None,
            metadata: Default::default(),
        };
        let err = record_generation(State(state), user(), Json(body))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn tracking_failure_still_accepts() {
        let (store, state) = state();
        store.fail_inserts(Some(Fault::Unavailable));

        let status = record_scanning(State(state), user(), None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn stats_degrade_to_zero_when_store_is_down() {
        let (store, state) = state();
        store.fail_ordered_queries(Some(Fault::Unavailable));
        store.fail_unordered_queries(Some(Fault::Unavailable));

        let Json(stats) = get_stats(State(state), user()).await;
        assert_eq!(stats, DocumentStats::default());
    }

    #[tokio::test]
    async fn scanned_listing_respects_limit() {
        let (store, state) = state();
        for i in 0..4 {
            record_scanning(
                State(state.clone()),
                user(),
                Some(Json(RecordScanningRequest {
                    title: Some(format!("scan {i}")),
                    simplified_language: None,
                })),
            )
            .await;
            settle(&store, i + 1).await;
        }

        let Json(two) =
            list_recent_scanned(State(state.clone()), user(), Query(ScannedQuery { limit: Some(2) }))
                .await;
        assert_eq!(two.len(), 2);
        assert_eq!(two[0].title, "scan 3");

        let Json(none) =
            list_recent_scanned(State(state.clone()), user(), Query(ScannedQuery { limit: Some(0) }))
                .await;
        assert!(none.is_empty());

        let Json(capped) =
            list_recent_scanned(State(state), user(), Query(ScannedQuery { limit: Some(500) })).await;
        assert_eq!(capped.len(), 4);
    }

    #[tokio::test]
    async fn live_dashboard_streams_until_the_client_disconnects() {
        let (store, state) = state();
        store.insert(NewRecord::scanned("U", "scan", None)).await.unwrap();

        let mut body = live_dashboard(State(state), user())
            .await
            .into_response()
            .into_body()
            .into_data_stream();
        let mut received = String::new();
        tokio::time::timeout(Duration::from_secs(2), async {
            while !received.contains("\"totalDocuments\":1") {
                let chunk = body.next().await.expect("event stream ended").unwrap();
                received.push_str(&String::from_utf8_lossy(&chunk));
            }
        })
        .await
        .expect("no populated dashboard event");
        assert!(received.contains("event: dashboard"));

        drop(body);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let calls = store.query_calls();
        store.insert(NewRecord::scanned("U", "after disconnect", None)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.query_calls(), calls);
    }
}
