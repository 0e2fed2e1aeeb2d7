//! The JSON-over-HTTP RPC surface.
//!
//! Two services on the twirp path convention: `spell.Check` for read traffic
//! and `spell.Dictionaries` for overlay management. Check traffic never
//! touches the database; dictionary management always goes through the store
//! so every instance converges via the notification channel.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::checker::{CheckError, EntryLevel, Misspelled, Suggestion};
use crate::store::{EntryData, EntryRow, EntryStore, ListEntriesParams, StoreError};
use crate::sync::LanguageMap;

pub mod auth;

pub use self::auth::{AuthInfo, AuthParser, StaticTokens};

/// Scope required by every `spell.Dictionaries` method.
pub const SCOPE_SPELL_WRITE: &str = "spell_write";

/// Page size of `ListEntries`.
const LIST_PAGE_SIZE: i64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub languages: Arc<LanguageMap>,
    pub store: EntryStore,
    pub auth: Arc<dyn AuthParser>,
}

/// Builds the twirp route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/twirp/spell.Check/Text", post(text))
        .route("/twirp/spell.Check/Suggestions", post(suggestions))
        .route("/twirp/spell.Dictionaries/SetEntry", post(set_entry))
        .route("/twirp/spell.Dictionaries/GetEntry", post(get_entry))
        .route("/twirp/spell.Dictionaries/ListEntries", post(list_entries))
        .route("/twirp/spell.Dictionaries/DeleteEntry", post(delete_entry))
        .route(
            "/twirp/spell.Dictionaries/ListDictionaries",
            post(list_dictionaries),
        )
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// A twirp error body: `{"code": ..., "msg": ...}` with the matching HTTP
/// status.
#[derive(Debug)]
pub struct TwirpError {
    status: StatusCode,
    code: &'static str,
    msg: String,
}

impl TwirpError {
    pub fn unauthenticated() -> TwirpError {
        TwirpError {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthenticated",
            msg: "unauthenticated".into(),
        }
    }

    pub fn permission_denied(scope: &str) -> TwirpError {
        TwirpError {
            status: StatusCode::FORBIDDEN,
            code: "permission_denied",
            msg: format!("missing required scope {scope:?}"),
        }
    }

    pub fn invalid_argument(argument: &str, reason: impl Into<String>) -> TwirpError {
        TwirpError {
            status: StatusCode::BAD_REQUEST,
            code: "invalid_argument",
            msg: format!("{argument}: {}", reason.into()),
        }
    }

    pub fn required_argument(argument: &str) -> TwirpError {
        TwirpError::invalid_argument(argument, "is required")
    }

    pub fn not_found(msg: impl Into<String>) -> TwirpError {
        TwirpError {
            status: StatusCode::NOT_FOUND,
            code: "not_found",
            msg: msg.into(),
        }
    }

    pub fn internal(context: &str, err: impl std::fmt::Display) -> TwirpError {
        log::error!("{context}: {err}");

        TwirpError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            msg: format!("{context}: {err}"),
        }
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for TwirpError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "code": self.code,
            "msg": self.msg,
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<StoreError> for TwirpError {
    fn from(err: StoreError) -> TwirpError {
        match err {
            StoreError::NotFound => TwirpError::not_found("entry not found"),
            other => TwirpError::internal("read from database", other),
        }
    }
}

impl From<CheckError> for TwirpError {
    fn from(err: CheckError) -> TwirpError {
        TwirpError::internal("check text", err)
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TextRequest {
    pub language: String,
    pub text: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct TextResponse {
    pub misspelled: Vec<Misspelled>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SuggestionsRequest {
    pub language: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestionsResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CustomEntry {
    pub language: String,
    pub text: String,
    pub status: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub common_mistakes: Vec<String>,
    pub level: EntryLevel,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub forms: HashMap<String, String>,
}

impl From<EntryRow> for CustomEntry {
    fn from(row: EntryRow) -> CustomEntry {
        CustomEntry {
            language: row.language,
            text: row.entry,
            status: row.status,
            description: row.description,
            common_mistakes: row.common_mistakes,
            level: EntryLevel::parse(&row.level),
            forms: row.data.map(|data| data.0.forms).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetEntryRequest {
    pub entry: Option<CustomEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryKeyRequest {
    pub language: String,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct GetEntryResponse {
    pub entry: CustomEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListEntriesRequest {
    pub language: String,
    pub prefix: String,
    pub status: String,
    pub page: i64,
}

#[derive(Debug, Serialize)]
pub struct ListEntriesResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<CustomEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomDictionary {
    pub language: String,
    pub entry_count: i64,
}

#[derive(Debug, Serialize)]
pub struct ListDictionariesResponse {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dictionaries: Vec<CustomDictionary>,
}

// ---------------------------------------------------------------------------
// spell.Check
// ---------------------------------------------------------------------------

async fn text(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<TextRequest>,
) -> Result<Json<TextResponse>, TwirpError> {
    authenticate(&state, &headers)?;

    let checker = language_checker(&state, &req.language)?;

    let mut misspelled = Vec::with_capacity(req.text.len());

    for text in &req.text {
        misspelled.push(checker.check(text, false).await?);
    }

    Ok(Json(TextResponse { misspelled }))
}

async fn suggestions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SuggestionsRequest>,
) -> Result<Json<SuggestionsResponse>, TwirpError> {
    authenticate(&state, &headers)?;

    if req.text.is_empty() {
        return Err(TwirpError::required_argument("text"));
    }

    let checker = language_checker(&state, &req.language)?;

    Ok(Json(SuggestionsResponse {
        suggestions: checker.suggestions(&req.text),
    }))
}

// ---------------------------------------------------------------------------
// spell.Dictionaries
// ---------------------------------------------------------------------------

async fn set_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetEntryRequest>,
) -> Result<Json<serde_json::Value>, TwirpError> {
    let auth = require_scope(&state, &headers, SCOPE_SPELL_WRITE)?;

    let Some(entry) = req.entry else {
        return Err(TwirpError::required_argument("entry"));
    };

    if entry.language.is_empty() {
        return Err(TwirpError::required_argument("entry.language"));
    }

    let language = entry.language.to_lowercase();

    if !state.languages.contains_key(&language) {
        return Err(TwirpError::invalid_argument(
            "entry.language",
            format!("unknown language {:?}", entry.language),
        ));
    }

    if entry.text.is_empty() {
        return Err(TwirpError::required_argument("entry.text"));
    }

    if entry.status.is_empty() {
        return Err(TwirpError::required_argument("entry.status"));
    }

    let data = (!entry.forms.is_empty()).then(|| {
        sqlx::types::Json(EntryData {
            forms: entry.forms,
        })
    });

    let row = EntryRow {
        language,
        entry: entry.text,
        status: entry.status,
        description: entry.description,
        common_mistakes: entry.common_mistakes,
        level: entry.level.as_str().to_owned(),
        data,
        updated: Utc::now(),
        updated_by: auth.subject,
    };

    state
        .store
        .set_entry(&row)
        .await
        .map_err(|err| TwirpError::internal("write to database", err))?;

    Ok(Json(serde_json::json!({})))
}

async fn get_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EntryKeyRequest>,
) -> Result<Json<GetEntryResponse>, TwirpError> {
    require_scope(&state, &headers, SCOPE_SPELL_WRITE)?;
    require_entry_key(&req)?;

    let row = state.store.get_entry(&req.language, &req.text).await?;

    Ok(Json(GetEntryResponse { entry: row.into() }))
}

async fn list_entries(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ListEntriesRequest>,
) -> Result<Json<ListEntriesResponse>, TwirpError> {
    require_scope(&state, &headers, SCOPE_SPELL_WRITE)?;

    let pattern = prefix_pattern(&req.prefix)?;

    let params = ListEntriesParams {
        language: (!req.language.is_empty()).then(|| req.language.clone()),
        pattern,
        status: (!req.status.is_empty()).then(|| req.status.clone()),
        limit: LIST_PAGE_SIZE,
        offset: LIST_PAGE_SIZE * req.page.max(0),
    };

    let rows = state.store.list_entries(&params).await?;

    Ok(Json(ListEntriesResponse {
        entries: rows.into_iter().map(CustomEntry::from).collect(),
    }))
}

async fn delete_entry(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<EntryKeyRequest>,
) -> Result<Json<serde_json::Value>, TwirpError> {
    require_scope(&state, &headers, SCOPE_SPELL_WRITE)?;
    require_entry_key(&req)?;

    state
        .store
        .delete_entry(&req.language, &req.text)
        .await
        .map_err(|err| TwirpError::internal("write to database", err))?;

    Ok(Json(serde_json::json!({})))
}

async fn list_dictionaries(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ListDictionariesResponse>, TwirpError> {
    require_scope(&state, &headers, SCOPE_SPELL_WRITE)?;

    let rows = state.store.list_dictionaries().await?;

    Ok(Json(ListDictionariesResponse {
        dictionaries: rows
            .into_iter()
            .map(|row| CustomDictionary {
                language: row.language,
                entry_count: row.entries,
            })
            .collect(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthInfo, TwirpError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(TwirpError::unauthenticated)?;

    state
        .auth
        .parse(token)
        .ok_or_else(TwirpError::unauthenticated)
}

fn require_scope(
    state: &AppState,
    headers: &HeaderMap,
    scope: &str,
) -> Result<AuthInfo, TwirpError> {
    let auth = authenticate(state, headers)?;

    if !auth.has_scope(scope) {
        return Err(TwirpError::permission_denied(scope));
    }

    Ok(auth)
}

fn language_checker<'a>(
    state: &'a AppState,
    language: &str,
) -> Result<&'a Arc<crate::checker::LanguageChecker>, TwirpError> {
    let code = language.to_lowercase();

    state.languages.get(&code).ok_or_else(|| {
        TwirpError::invalid_argument("language", format!("unsupported language {language:?}"))
    })
}

fn require_entry_key(req: &EntryKeyRequest) -> Result<(), TwirpError> {
    if req.language.is_empty() {
        return Err(TwirpError::required_argument("language"));
    }

    if req.text.is_empty() {
        return Err(TwirpError::required_argument("text"));
    }

    Ok(())
}

/// Turns a user-supplied prefix into a `LIKE` pattern, refusing wildcards so
/// a caller cannot widen the filter.
fn prefix_pattern(prefix: &str) -> Result<Option<String>, TwirpError> {
    if prefix.contains('%') {
        return Err(TwirpError::invalid_argument(
            "prefix",
            "prefix cannot contain '%'",
        ));
    }

    if prefix.is_empty() {
        return Ok(None);
    }

    Ok(Some(format!("{prefix}%")))
}
