use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use pubsearch_core::persist::{load_snapshot, save_snapshot, IndexPaths};
use pubsearch_core::scorer::round4;
use parking_lot::Mutex;
use pubsearch_core::{
    BuildReport, DocId, Document, DocumentStore, EngineConfig, Error, MemoryStore, SearchEngine, SearchHit,
    TextPreprocessor, UpdateReport,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

type ApiError = (StatusCode, Json<Value>);

#[derive(Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_size")]
    pub size: usize,
}
fn default_page() -> usize { 1 }
fn default_size() -> usize { 10 }

#[derive(Deserialize)]
pub struct DetailParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_size")]
    pub k: usize,
}

#[derive(Deserialize)]
pub struct SampleParams {
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
}
fn default_sample_size() -> usize { 50 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub results: Vec<PublicationHit>,
    pub total: usize,
    pub page: usize,
    pub size: usize,
    pub query: String,
    pub search_time_ms: f64,
}

#[derive(Serialize)]
pub struct PublicationHit {
    pub id: DocId,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub link: Option<String>,
    pub published_date: Option<String>,
    pub authors: Vec<String>,
    pub relevance_score: f64,
}

#[derive(Serialize)]
pub struct IndexInfoEntry {
    pub term: String,
    pub document_id: DocId,
    pub document_title: Option<String>,
    pub tfidf_score: f64,
    pub term_frequency: u32,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub store: Arc<MemoryStore>,
    pub index_paths_root: PathBuf,
    pub admin_token: Option<String>,
    /// Held across an admin mutation and the snapshot save that follows it.
    pub admin_lock: Arc<Mutex<()>>,
}

/// `admin_token` guards the admin endpoints; with `None` they always answer 401.
pub fn build_app(index_dir: String, config: EngineConfig, admin_token: Option<String>) -> Result<Router> {
    // Load the saved snapshot at startup
    let snapshot = load_snapshot(&IndexPaths::new(&index_dir))?;
    let store = Arc::new(MemoryStore::from_documents(snapshot.documents));
    let engine = Arc::new(SearchEngine::new(store.clone(), Arc::new(TextPreprocessor::new()), config));
    engine.restore(snapshot.index);
    tracing::info!(index_dir = %index_dir, num_docs = snapshot.meta.num_docs, created_at = %snapshot.meta.created_at, "index loaded");

    let app_state = AppState {
        engine,
        store,
        index_paths_root: PathBuf::from(&index_dir),
        admin_token,
        admin_lock: Arc::new(Mutex::new(())),
    };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api", get(api_root))
        .route("/api/search", get(search_handler))
        .route("/api/search/details", get(search_details_handler))
        .route("/api/index-info", get(index_info))
        .route("/api/index-stats", get(index_stats))
        .route("/api/documents/:doc_id", get(doc_handler))
        .route("/api/index/rebuild", post(rebuild_index))
        .route("/api/index/documents", post(upsert_document))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    Ok(app)
}

async fn api_root() -> Json<Value> {
    Json(json!({
        "message": "Publication search API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "search": "/api/search?query=<terms>&page=1&size=10",
            "search_details": "/api/search/details?query=<terms>&k=10",
            "index_info": "/api/index-info?sample_size=50",
            "index_stats": "/api/index-stats",
            "document": "/api/documents/<id>",
            "rebuild": "POST /api/index/rebuild",
            "upsert_document": "POST /api/index/documents",
        }
    }))
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let query = params.query.trim().to_string();
    if query.is_empty() {
        return Err(bad_request("query parameter is required", Some("/api/search?query=machine+learning")));
    }
    let start = Instant::now();
    let page = state.engine.search_page(&query, params.page, params.size).map_err(search_failed)?;

    let results = hydrate(state.store.as_ref(), page.hits).map_err(search_failed)?;
    let search_time_ms = (start.elapsed().as_secs_f64() * 100_000.0).round() / 100.0;
    Ok(Json(SearchResponse { results, total: page.total, page: page.page, size: page.size, query, search_time_ms }))
}

fn hydrate(store: &dyn DocumentStore, hits: Vec<SearchHit>) -> pubsearch_core::Result<Vec<PublicationHit>> {
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let Some(doc) = store.get_document(hit.doc_id)? else {
            tracing::warn!(doc_id = hit.doc_id, "indexed document missing from store, hit dropped");
            continue;
        };
        results.push(PublicationHit {
            id: doc.id,
            title: doc.title,
            abstract_text: doc.abstract_text,
            link: doc.link,
            published_date: doc.published_date,
            authors: doc.authors,
            relevance_score: hit.score,
        });
    }
    Ok(results)
}

async fn search_details_handler(State(state): State<AppState>, Query(params): Query<DetailParams>) -> Result<Json<Value>, ApiError> {
    if params.query.trim().is_empty() {
        return Err(bad_request("query parameter is required", None));
    }
    let details = state.engine.search_with_details(&params.query, params.k).map_err(search_failed)?;
    Ok(Json(json!(details)))
}

async fn index_info(State(state): State<AppState>, Query(params): Query<SampleParams>) -> Result<Json<Value>, ApiError> {
    let mut entries = Vec::new();
    for entry in state.engine.sample_entries(params.sample_size) {
        let title = state.store.get_document(entry.doc_id).map_err(internal)?.map(|d| d.title);
        entries.push(IndexInfoEntry {
            term: entry.term,
            document_id: entry.doc_id,
            document_title: title,
            tfidf_score: round4(entry.tfidf_score),
            term_frequency: entry.term_frequency,
        });
    }
    Ok(Json(json!({ "sample_size": entries.len(), "entries": entries })))
}

async fn index_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let stats = state.engine.stats().map_err(internal)?;
    let mut body = json!(stats);
    if let Some(cache) = state.engine.cache() {
        body["cache"] = json!({ "capacity": cache.capacity(), "entries": cache.len(), "hit_rate": cache.hit_rate() });
    }
    Ok(Json(body))
}

async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<DocId>) -> Result<Json<Document>, ApiError> {
    match state.engine.document(doc_id) {
        Ok(doc) => Ok(Json(doc)),
        Err(err @ Error::DocumentNotFound(_)) => Err((StatusCode::NOT_FOUND, Json(json!({ "error": err.to_string() })))),
        Err(err) => Err(internal(err)),
    }
}

// --- Admin endpoints ---
//
// A failed snapshot save is reported as a 500, but the change it follows is already live
// in memory and stays live; the next successful save writes it out.

async fn rebuild_index(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<BuildReport>, ApiError> {
    authorize(&state, &headers)?;
    let worker = state.clone();
    let report = tokio::task::spawn_blocking(move || -> Result<BuildReport, ApiError> {
        let _admin = worker.admin_lock.lock();
        let report = worker.engine.rebuild().map_err(internal)?;
        persist(&worker).map_err(not_persisted)?;
        Ok(report)
    })
    .await
    .map_err(internal)??;
    Ok(Json(report))
}

async fn upsert_document(State(state): State<AppState>, headers: HeaderMap, Json(mut doc): Json<Document>) -> Result<Json<UpdateReport>, ApiError> {
    authorize(&state, &headers)?;
    doc.updated_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .ok();
    let worker = state.clone();
    let report = tokio::task::spawn_blocking(move || -> Result<UpdateReport, ApiError> {
        let _admin = worker.admin_lock.lock();
        let previous = worker.store.get_document(doc.id).map_err(internal)?;
        worker.store.upsert(doc.clone());
        let report = match worker.engine.update_one(&doc) {
            Ok(report) => report,
            Err(err) => {
                // The index was not touched; put the store back in line with it.
                match previous {
                    Some(previous) => { worker.store.upsert(previous); }
                    None => { worker.store.remove(doc.id); }
                }
                return Err(internal(err));
            }
        };
        persist(&worker).map_err(not_persisted)?;
        Ok(report)
    })
    .await
    .map_err(internal)??;
    Ok(Json(report))
}

// Callers hold `admin_lock`, so the index and documents written belong together.
fn persist(state: &AppState) -> Result<()> {
    let created_at = time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default();
    let paths = IndexPaths::new(&state.index_paths_root);
    save_snapshot(&paths, &state.engine.snapshot(), &state.store.all_documents()?, created_at)
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "ADMIN_TOKEN not set" })))),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, Json(json!({ "error": "invalid admin token" }))))
    }
}

fn bad_request(message: &str, example: Option<&str>) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message, "example": example })))
}

fn search_failed(err: Error) -> ApiError {
    tracing::error!(error = %err, "search failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string(), "message": "Search failed. Index may not be built yet." })))
}

fn not_persisted(err: anyhow::Error) -> ApiError {
    tracing::error!(error = %err, "snapshot save failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string(), "message": "Change applied in memory but the snapshot was not saved." })),
    )
}

fn internal(err: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %err, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": err.to_string() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrate_skips_hits_missing_from_store() {
        let store = MemoryStore::from_documents(vec![Document::new(1, "Rust", ""), Document::new(3, "Zig", "")]);
        let hits = vec![
            SearchHit { doc_id: 3, score: 2.0 },
            SearchHit { doc_id: 2, score: 1.5 },
            SearchHit { doc_id: 1, score: 1.0 },
        ];
        let results = hydrate(&store, hits).unwrap();
        let ids: Vec<DocId> = results.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1]);
        assert_eq!(results[0].title, "Zig");
        assert_eq!(results[1].relevance_score, 1.0);
    }
}
