use anyhow::anyhow;
use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::directory::{DirectoryEntry, ProfileSummary};
use crate::search::{ListingPage, ListingRequest, MapRequest};

#[derive(Debug, Default, Deserialize)]
pub struct ListingParams {
    pub name: Option<String>,
    pub city: Option<String>,
    pub tag: Option<String>,
    pub page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MapParams {
    pub city: Option<String>,
    #[serde(rename = "type")]
    pub category: Option<String>,
    pub specialty: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DetailParams {
    pub id: Option<String>,
}

/// Map results are always an array, even when nothing matches.
#[derive(Debug, Serialize)]
pub struct MapResponse {
    pub results: Vec<ProfileSummary>,
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow!("Worker task failed: {}", e)))?
        .map_err(ApiError::Internal)
}

fn parse_page(raw: Option<&str>) -> Result<u32, ApiError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(1),
        Some(raw) => raw,
    };
    match raw.parse::<u32>() {
        Ok(page) if page >= 1 => Ok(page),
        _ => Err(ApiError::BadRequest(format!(
            "page must be a positive integer, got {:?}",
            raw
        ))),
    }
}

pub async fn health() -> &'static str {
    "OK"
}

pub async fn list_profiles(
    State(state): State<AppState>,
    Query(params): Query<ListingParams>,
) -> Result<Json<ListingPage>, ApiError> {
    let request = ListingRequest {
        page: parse_page(params.page.as_deref())?,
        name: params.name.unwrap_or_default(),
        city: params.city.unwrap_or_default(),
        tag: params.tag.unwrap_or_default(),
    };

    let engine = state.engine.clone();
    let page = blocking(move || engine.listing(&request)).await?;
    Ok(Json(page))
}

pub async fn map_profiles(
    State(state): State<AppState>,
    Query(params): Query<MapParams>,
) -> Result<Json<MapResponse>, ApiError> {
    let request = MapRequest {
        city: params.city.unwrap_or_default(),
        category: params.category.unwrap_or_default(),
        specialty: params.specialty.unwrap_or_default(),
    };

    let engine = state.engine.clone();
    let results = blocking(move || engine.map_pins(&request)).await?;
    Ok(Json(MapResponse { results }))
}

pub async fn profile_detail(
    State(state): State<AppState>,
    Query(params): Query<DetailParams>,
) -> Result<Json<DirectoryEntry>, ApiError> {
    let raw = params
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing id".to_string()))?;
    let id = Uuid::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("invalid id {:?}", raw)))?;

    let engine = state.engine.clone();
    blocking(move || engine.detail(id))
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("profile {} not found", id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteDb;
    use crate::db::DirectoryStore;
    use crate::directory::{Address, EntityType, NewEntry};
    use crate::search::SearchEngine;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use std::sync::Arc;

    fn state_with(entries: &[(EntityType, &str, &str)]) -> (AppState, Vec<Uuid>) {
        let db = SqliteDb::open_in_memory().unwrap();
        db.initialize().unwrap();
        let ids = entries
            .iter()
            .map(|(ty, name, city)| {
                let mut entry = NewEntry::new(*ty, name, Some(city));
                entry.profile_data.addresses.push(Address {
                    full_address: "Calle Mayor 1".to_string(),
                    city: city.to_string(),
                    ..Default::default()
                });
                db.upsert_profile(&entry.prepare().unwrap()).unwrap().0
            })
            .collect();
        (AppState::new(SearchEngine::new(Arc::new(db))), ids)
    }

    fn listing(page: Option<&str>) -> ListingParams {
        ListingParams {
            page: page.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_page() {
        assert_eq!(parse_page(None).unwrap(), 1);
        assert_eq!(parse_page(Some(" ")).unwrap(), 1);
        assert_eq!(parse_page(Some("3")).unwrap(), 3);
        assert!(matches!(parse_page(Some("0")), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_page(Some("-1")), Err(ApiError::BadRequest(_))));
        assert!(matches!(parse_page(Some("two")), Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_health() {
        assert_eq!(health().await, "OK");
    }

    #[tokio::test]
    async fn test_listing_envelope() {
        let (state, _) = state_with(&[
            (EntityType::Clinic, "Clínica Sol", "Madrid"),
            (EntityType::Hospital, "Hospital Sur", "Sevilla"),
        ]);

        let Json(page) = list_profiles(State(state.clone()), Query(listing(None)))
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.page, 1);
        assert_eq!(page.limit, 10);

        let params = ListingParams {
            city: Some("sevilla".to_string()),
            ..Default::default()
        };
        let Json(page) = list_profiles(State(state.clone()), Query(params)).await.unwrap();
        assert_eq!(page.profiles.len(), 1);
        assert_eq!(page.profiles[0].name, "Hospital Sur");

        let Json(empty) = list_profiles(State(state), Query(listing(Some("5"))))
            .await
            .unwrap();
        let body = serde_json::to_value(&empty).unwrap();
        assert_eq!(body["profiles"], serde_json::json!([]));
        assert_eq!(body["total"], 2);
    }

    #[tokio::test]
    async fn test_listing_rejects_bad_page() {
        let (state, _) = state_with(&[]);
        let err = list_profiles(State(state), Query(listing(Some("abc"))))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_map_results_are_never_null() {
        let (state, _) = state_with(&[
            (EntityType::Clinic, "Clínica Sol", "Madrid"),
            (EntityType::HomeVet, "Vet en Casa", "Madrid"),
        ]);

        let params = MapParams {
            city: Some("Madrid".to_string()),
            category: Some("fichas_veterinarios".to_string()),
            ..Default::default()
        };
        let Json(response) = map_profiles(State(state.clone()), Query(params)).await.unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].entity_type, EntityType::HomeVet);

        let params = MapParams {
            city: Some("Oviedo".to_string()),
            ..Default::default()
        };
        let Json(response) = map_profiles(State(state), Query(params)).await.unwrap();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "results": [] })
        );
    }

    #[tokio::test]
    async fn test_detail_status_codes() {
        let (state, ids) = state_with(&[(EntityType::Clinic, "Clínica Sol", "Madrid")]);

        let Json(entry) = profile_detail(
            State(state.clone()),
            Query(DetailParams { id: Some(ids[0].to_string()) }),
        )
        .await
        .unwrap();
        assert_eq!(entry.name, "Clínica Sol");

        let missing = profile_detail(State(state.clone()), Query(DetailParams::default()))
            .await
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let invalid = profile_detail(
            State(state.clone()),
            Query(DetailParams { id: Some("42".to_string()) }),
        )
        .await
        .unwrap_err();
        assert_eq!(invalid.status(), StatusCode::BAD_REQUEST);

        let absent = profile_detail(
            State(state),
            Query(DetailParams { id: Some(Uuid::new_v4().to_string()) }),
        )
        .await
        .unwrap_err();
        assert_eq!(absent.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_error_body() {
        let response = ApiError::NotFound("profile x not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, serde_json::json!({ "error": "profile x not found" }));
    }
}
