use std::collections::BTreeMap;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use holidaycache_core::parse_date;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub years: Vec<i32>,
    pub ages: BTreeMap<i32, String>,
    pub refresh_running: bool,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

async fn resolve_date(state: &AppState, raw: Option<&str>) -> Response {
    let Some(raw) = raw else {
        return error_response(StatusCode::BAD_REQUEST, "missing parameter: date");
    };
    let Some(date) = parse_date(raw) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("invalid date {:?}, expected YYYY-MM-DD", raw),
        );
    };

    let resolution = state.resolver.resolve(date).await;
    debug!(%date, kind = %resolution.record.kind, degraded = resolution.is_degraded(), "Query resolved");
    (StatusCode::OK, Json(resolution)).into_response()
}

/// `GET /health`
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /status`
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        years: state.cache.years().into_iter().collect(),
        ages: state.cache.cache_ages(),
        refresh_running: state.scheduler.is_running(),
    })
}

/// `GET /query?date=YYYY-MM-DD`
pub async fn query(State(state): State<AppState>, Query(params): Query<DateQuery>) -> Response {
    resolve_date(&state, params.date.as_deref()).await
}

/// `POST /api/query` with `{"date": "YYYY-MM-DD"}`
pub async fn query_post(State(state): State<AppState>, Json(body): Json<DateQuery>) -> Response {
    resolve_date(&state, body.date.as_deref()).await
}

/// `GET /refresh?force=bool`
pub async fn refresh(State(state): State<AppState>, Query(params): Query<RefreshQuery>) -> Response {
    match state.scheduler.refresh_targets(params.force).await {
        Some(report) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "updated": report.updated,
                "unchanged": report.unchanged,
                "failed": report.failed,
            })),
        )
            .into_response(),
        None => (
            StatusCode::CONFLICT,
            Json(json!({ "ok": false, "error": "refresh already running" })),
        )
            .into_response(),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::path::PathBuf;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::body::to_bytes;
    use chrono::{FixedOffset, NaiveDate};
    use holidaycache_core::config::ScheduleConfig;
    use holidaycache_core::{
        CacheManager, DatasetSource, FetchError, HolidayRecord, HolidayResolver, HolidayType,
        RefreshScheduler, YearDataset,
    };

    /// Serves one year; every other year is unpublished.
    struct FixedSource(YearDataset);

    impl DatasetSource for FixedSource {
        fn fetch(
            &self,
            year: i32,
        ) -> Pin<Box<dyn Future<Output = Result<YearDataset, FetchError>> + Send + '_>> {
            Box::pin(async move {
                if year == self.0.year {
                    Ok(self.0.clone())
                } else {
                    Err(FetchError::NotFound(year))
                }
            })
        }
    }

    fn scratch_dir(label: &str) -> PathBuf {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let dir = std::env::temp_dir().join(format!(
            "holidaycache-server-{}-{}-{}",
            label,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn dataset_2025() -> YearDataset {
        YearDataset::new(
            2025,
            vec![HolidayRecord::new(
                NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
                "国庆节",
                HolidayType::Statutory,
            )],
            None,
        )
    }

    fn state(label: &str) -> AppState {
        let cache = Arc::new(CacheManager::new(scratch_dir(label)).unwrap());
        let source = Arc::new(FixedSource(dataset_2025()));
        let resolver = Arc::new(HolidayResolver::new(Arc::clone(&cache), source.clone()));
        let scheduler = Arc::new(RefreshScheduler::new(
            Arc::clone(&cache),
            source,
            ScheduleConfig {
                hour: 3,
                minute: 0,
                utc_offset: FixedOffset::east_opt(8 * 3600).unwrap(),
                prefetch_from_year: None,
            },
        ));
        AppState {
            cache,
            resolver,
            scheduler,
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn date_query(date: &str) -> Query<DateQuery> {
        Query(DateQuery {
            date: Some(date.to_string()),
        })
    }

    #[tokio::test]
    async fn test_query_statutory_holiday() {
        let state = state("statutory");
        let response = query(State(state), date_query("2025-10-01")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["date"], "2025-10-01");
        assert_eq!(body["is_holiday"], true);
        assert_eq!(body["name"], "国庆节");
        assert_eq!(body["type"], "statutory");
        assert_eq!(body["weekday"], "周三");
        assert!(body.get("warning").is_none());
    }

    #[tokio::test]
    async fn test_query_unlisted_weekend() {
        let state = state("weekend");
        let body = body_json(query(State(state), date_query("2025-10-04")).await).await;
        assert_eq!(body["type"], "weekend");
        assert_eq!(body["is_holiday"], true);
    }

    #[tokio::test]
    async fn test_query_unpublished_year_is_unknown_not_error() {
        let state = state("unknown");
        let response = query(State(state), date_query("2030-01-01")).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["type"], "unknown");
        assert_eq!(body["is_holiday"], false);
        assert!(body["warning"].is_string());
    }

    #[tokio::test]
    async fn test_query_rejects_malformed_dates() {
        for raw in ["2025/10/01", "2025-10-32", "yesterday", "", " 2025-10-01"] {
            let response = query(State(state("malformed")), date_query(raw)).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{:?}", raw);
            assert!(body_json(response).await["error"].is_string());
        }

        let missing = query(State(state("missing")), Query(DateQuery { date: None })).await;
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_query_post() {
        let response = query_post(
            State(state("post")),
            Json(DateQuery {
                date: Some("2025-10-01".to_string()),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["type"], "statutory");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_status_lists_cached_years() {
        let state = state("status");
        state.cache.put(2025, dataset_2025()).unwrap();

        let Json(status) = status(State(state)).await;
        assert_eq!(status.years, vec![2025]);
        assert_eq!(status.ages.get(&2025).map(String::as_str), Some("just now"));
        assert!(!status.refresh_running);
    }

    #[tokio::test]
    async fn test_refresh_reports_per_year_outcome() {
        let state = state("refresh");
        let response = refresh(State(state), Query(RefreshQuery { force: false })).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["ok"], true);
        // The fixed source only knows 2025, so current/next years are reported
        // as either refreshed or failed, never dropped
        let reported = body["updated"].as_array().unwrap().len()
            + body["unchanged"].as_array().unwrap().len()
            + body["failed"].as_array().unwrap().len();
        assert_eq!(reported, 2);
    }
}
