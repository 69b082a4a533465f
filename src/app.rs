use axum::{
    Extension, Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::Path as FsPath;
use std::sync::{Arc, RwLock};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::catalog::{Catalog, CatalogQuery, CatalogView, Selection};
use crate::config::Config;
use crate::downloader::{to_csv, to_xlsx};
use crate::error::{PortalError, Result};
use crate::history::{HistoryEntry, distinct_users, entries_for, sort_newest_first, stats};
use crate::loader::{LoadOutcome, MenuSource, SheetFormat, load_menu, parse_menu};
use crate::login::{
    CredentialVerifier, CurrentSession, HashedRoster, StaticRoster, handle_login, handle_logout,
    require_auth, serve_login_page,
};
use crate::meal_template::TemplateFetcher;
use crate::remote::{RemoteStorage, SIGNED_URL_SECONDS, XLSX_CONTENT_TYPE, encode_path};
use crate::render::Renderer;
use crate::saving::{list_local_uploads, resolve_upload};
use crate::session::{Session, SessionStore};
use crate::storage::{
    CsvSubmissionLog, LocalUploadStore, ObjectSink, RecordSink, Recorder, Submission,
};
use crate::submission::{
    CivilTime, MealType, ascii_slug, check_upload_name, civil_now, format_civil,
};

/// Largest accepted request body (uploads included).
pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub recorder: Recorder,
    pub local_log: Arc<CsvSubmissionLog>,
    pub remote: Option<Arc<RemoteStorage>>,
    pub templates: TemplateFetcher,
    pub renderer: Renderer,
    catalog: RwLock<Arc<Catalog>>,
}

impl AppState {
    /// Wire the sinks described by `config` around an already loaded catalog.
    pub fn new(
        config: Config,
        catalog: Catalog,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Result<Self> {
        let remote = match &config.remote {
            Some(remote) => Some(Arc::new(RemoteStorage::new(remote.clone())?)),
            None => None,
        };
        let local_log = Arc::new(CsvSubmissionLog::new(&config.log_file));

        let mut objects: Vec<Arc<dyn ObjectSink>> = Vec::new();
        let mut records: Vec<Arc<dyn RecordSink>> = vec![local_log.clone()];
        if let Some(remote) = &remote {
            objects.push(remote.clone());
            records.push(remote.clone());
        }
        objects.push(Arc::new(LocalUploadStore::new(&config.upload_dir)));
        let recorder = Recorder::new(objects, records);

        if let Some(remote) = &remote {
            info!("Remote storage enabled, bucket '{}'", remote.bucket());
        }
        info!(
            "Files go to [{}], records go to [{}]",
            recorder.object_sinks().collect::<Vec<_>>().join(", "),
            recorder.record_sinks().collect::<Vec<_>>().join(", ")
        );

        Ok(AppState {
            templates: TemplateFetcher::from_config(&config)?,
            renderer: Renderer::new()?,
            sessions: SessionStore::default(),
            recorder,
            catalog: RwLock::new(Arc::new(catalog)),
            credentials,
            local_log,
            remote,
            config,
        })
    }

    /// Load the roster and the catalog named by `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let credentials: Arc<dyn CredentialVerifier> = match &config.users_file {
            Some(path) => {
                let roster = HashedRoster::load(path)?;
                if roster.is_empty() {
                    warn!("Users file {} has no users; nobody can log in", path.display());
                }
                info!("Loaded {} users from {}", roster.len(), path.display());
                Arc::new(roster)
            }
            None => Arc::new(StaticRoster::builtin()),
        };

        let catalog = Catalog::from_outcome(load_menu(None, &config.menu_paths));
        AppState::new(config, catalog, credentials)
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        self.catalog.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn replace_catalog(&self, catalog: Catalog) {
        *self.catalog.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(catalog);
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let protected = Router::new()
        .route("/", get(|| async { Redirect::to("/submit") }))
        .route("/submit", get(serve_submit_page))
        .route("/submit/meal-type", post(select_meal_type))
        .route("/submit/start", post(start_task))
        .route("/submit/reset", post(reset_task))
        .route("/submit/upload", post(upload_submission))
        .route("/templates/:meal_type", get(download_template))
        .route("/catalog", get(serve_catalog_page))
        .route("/api/catalog", get(catalog_json))
        .route("/admin/history.csv", get(export_history_csv))
        .route("/admin/history.xlsx", get(export_history_xlsx))
        .route("/admin/files/:user", get(list_user_files))
        .route("/admin/download/:file", get(download_local_file))
        .route("/admin/signed/*path", get(redirect_to_signed_url))
        .route("/admin/catalog", post(replace_catalog))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/login", get(serve_login_page).post(handle_login))
        .route("/logout", post(handle_logout))
        .route("/healthz", get(|| async { "ok" }))
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> Result<()> {
    let addr = config.addr;
    let state = Arc::new(AppState::from_config(config)?);

    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                warn!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn require_admin(current: &CurrentSession) -> Result<()> {
    if current.session.is_admin() {
        Ok(())
    } else {
        Err(PortalError::Forbidden)
    }
}

fn submit_page_data(session: &Session, now: &CivilTime) -> Value {
    let selected = session.meal_type();
    let meal_types: Vec<Value> = MealType::ALL
        .iter()
        .map(|m| json!({ "letter": m.letter(), "label": m.label(), "selected": *m == selected }))
        .collect();

    json!({
        "user": session.user(),
        "meal_type": selected.label(),
        "templates": meal_types,
        "meal_types": meal_types,
        "started_at": session.started_at().map(|t| format_civil(&t)),
        "elapsed_seconds": session.elapsed_seconds(now),
    })
}

fn render_submit_page(
    state: &AppState,
    session: &Session,
    upload_error: Option<&str>,
    status: StatusCode,
) -> Response {
    let mut data = submit_page_data(session, &civil_now());
    data["upload_error"] = json!(upload_error);
    state.renderer.page("submit", &data, status)
}

async fn serve_submit_page(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Response {
    if current.session.is_admin() {
        return serve_admin_page(&state, &current).await;
    }
    render_submit_page(&state, &current.session, None, StatusCode::OK)
}

#[derive(Deserialize)]
struct MealTypeForm {
    meal_type: String,
}

async fn select_meal_type(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    axum::Form(form): axum::Form<MealTypeForm>,
) -> Result<Redirect> {
    let meal_type: MealType = form.meal_type.parse()?;
    state
        .sessions
        .update(&current.id, |s| s.select_meal_type(meal_type))
        .ok_or(PortalError::Unauthorized)?;
    Ok(Redirect::to("/submit"))
}

async fn start_task(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Redirect> {
    let started_at = state
        .sessions
        .update(&current.id, |s| s.start_task(civil_now()))
        .ok_or(PortalError::Unauthorized)??;
    info!("User '{}' started at {}", current.user(), format_civil(&started_at));
    Ok(Redirect::to("/submit"))
}

async fn reset_task(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Redirect {
    state.sessions.update(&current.id, Session::reset_task);
    Redirect::to("/submit")
}

struct UploadedFile {
    file_name: String,
    bytes: Bytes,
}

/// The multipart field named `file`, if one with content was sent.
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadedFile>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PortalError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PortalError::Validation(e.to_string()))?;
        if file_name.is_empty() && bytes.is_empty() {
            return Ok(None);
        }
        return Ok(Some(UploadedFile { file_name, bytes }));
    }
    Ok(None)
}

async fn upload_submission(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    mut multipart: Multipart,
) -> Response {
    let session = &current.session;
    let upload = match read_file_field(&mut multipart).await {
        Ok(Some(upload)) => upload,
        Ok(None) => {
            return render_submit_page(
                &state,
                session,
                Some("업로드할 파일을 선택해주세요."),
                StatusCode::BAD_REQUEST,
            );
        }
        Err(e) => {
            return render_submit_page(&state, session, Some(&e.to_string()), StatusCode::BAD_REQUEST);
        }
    };

    if let Err(e) = check_upload_name(&upload.file_name) {
        return render_submit_page(&state, session, Some(&e.to_string()), StatusCode::BAD_REQUEST);
    }

    let submission = Submission {
        user: current.user().to_string(),
        meal_type: session.meal_type(),
        started_at: session.started_at(),
        submitted_at: civil_now(),
        original_filename: upload.file_name,
        bytes: upload.bytes,
    };

    match state.recorder.record(submission).await {
        Ok(receipt) => {
            state.sessions.update(&current.id, Session::finish_submission);
            let record = &receipt.record;
            let data = json!({
                "user": record.user,
                "meal_type": record.meal_type.label(),
                "duration_seconds": record.duration_seconds,
                "submitted_at": format_civil(&record.submitted_at),
                "saved_as": receipt.saved_as,
                "storage_path": record.storage_path,
                "warnings": receipt.warnings,
            });
            state.renderer.page("receipt", &data, StatusCode::OK)
        }
        Err(e) => {
            warn!("Submission by '{}' failed: {e}", current.user());
            render_submit_page(
                &state,
                session,
                Some(&format!("❌ 제출 실패: {e}")),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

/// Response that makes the browser save `bytes` as `file_name`.
fn attachment(file_name: &str, content_type: &str, bytes: Vec<u8>) -> Response {
    let disposition = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_slug(file_name),
        urlencoding::encode(file_name)
    );
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response()
}

async fn download_template(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(meal_type): Path<String>,
) -> Response {
    let meal_type: MealType = match meal_type.parse() {
        Ok(meal_type) => meal_type,
        Err(e) => return e.into_response(),
    };

    match state.templates.fetch(meal_type).await {
        Ok(bytes) => attachment(meal_type.download_file_name(), XLSX_CONTENT_TYPE, bytes),
        Err(e) => state.renderer.notice(
            Some(current.user()),
            "템플릿 다운로드 실패",
            &e.to_string(),
            "/submit",
            StatusCode::BAD_GATEWAY,
        ),
    }
}

#[derive(Serialize)]
struct CatalogPage<'a> {
    user: &'a str,
    #[serde(flatten)]
    view: CatalogView<'a>,
}

async fn serve_catalog_page(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Query(query): Query<CatalogQuery>,
) -> Response {
    let catalog = state.catalog();
    let page = CatalogPage {
        user: current.user(),
        view: catalog.view(&Selection::from(query)),
    };
    state.renderer.page("catalog", &page, StatusCode::OK)
}

async fn catalog_json(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CatalogQuery>,
) -> Response {
    let catalog = state.catalog();
    Json(catalog.view(&Selection::from(query))).into_response()
}

struct History {
    entries: Vec<HistoryEntry>,
    remote: bool,
    warnings: Vec<String>,
}

impl History {
    fn newest_first(&self) -> Vec<&HistoryEntry> {
        let mut ordered: Vec<&HistoryEntry> = self.entries.iter().collect();
        sort_newest_first(&mut ordered);
        ordered
    }
}

/// Remote table when configured and non-empty, else the local log.
async fn load_history(state: &AppState) -> History {
    let mut warnings = Vec::new();

    if let Some(remote) = &state.remote {
        match remote.list().await {
            Ok(entries) if !entries.is_empty() => {
                return History { entries, remote: true, warnings };
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to fetch remote history: {e}");
                warnings.push(format!("원격 기록을 불러오지 못해 로컬 기록을 표시합니다: {e}"));
            }
        }
    }

    let entries = state.local_log.entries().await.unwrap_or_else(|e| {
        warn!("Failed to read {}: {e}", state.local_log.path().display());
        warnings.push(format!("로컬 기록을 읽지 못했습니다: {e}"));
        Vec::new()
    });
    History { entries, remote: false, warnings }
}

/// Download link for a stored file: local copies are served directly,
/// remote objects through a signed URL.
fn entry_link(state: &AppState, entry: &HistoryEntry) -> Option<String> {
    let path = entry.storage_path.as_deref()?;
    if FsPath::new(path).starts_with(&state.config.upload_dir) {
        let name = FsPath::new(path).file_name()?.to_str()?;
        return Some(format!("/admin/download/{}", urlencoding::encode(name)));
    }
    state.remote.as_ref()?;
    Some(format!("/admin/signed/{}", encode_path(path)))
}

async fn serve_admin_page(state: &AppState, current: &CurrentSession) -> Response {
    let history = load_history(state).await;
    let ordered = history.newest_first();
    let today = civil_now().format("%Y-%m-%d").to_string();

    let rows: Vec<Value> = ordered
        .iter()
        .map(|entry| {
            json!({
                "user": entry.user,
                "started_at": entry.started_at,
                "submitted_at": entry.submitted_display(),
                "duration_seconds": entry.duration_seconds,
                "meal_type": entry.meal_type,
                "original_filename": entry.original_filename,
                "link": entry_link(state, entry),
            })
        })
        .collect();

    let source = if history.remote { "원격 저장소" } else { "로컬 로그" };
    let catalog = state.catalog();
    let data = json!({
        "user": current.user(),
        "stats": stats(&history.entries, &today),
        "source": source,
        "entries": rows,
        "users": distinct_users(&history.entries),
        "warnings": history.warnings,
        "catalog_rows": catalog.len(),
        "catalog_source": catalog.source().map(MenuSource::to_string),
    });
    state.renderer.page("admin", &data, StatusCode::OK)
}

async fn export_history_csv(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Response> {
    require_admin(&current)?;
    let history = load_history(&state).await;
    let entries: Vec<HistoryEntry> = history.newest_first().into_iter().cloned().collect();
    Ok(attachment("submissions.csv", "text/csv; charset=utf-8", to_csv(&entries)?))
}

async fn export_history_xlsx(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
) -> Result<Response> {
    require_admin(&current)?;
    let history = load_history(&state).await;
    let entries: Vec<HistoryEntry> = history.newest_first().into_iter().cloned().collect();
    Ok(attachment("submissions.xlsx", XLSX_CONTENT_TYPE, to_xlsx(&entries)?))
}

async fn list_user_files(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(user): Path<String>,
) -> Result<Response> {
    require_admin(&current)?;
    let files = list_local_uploads(&state.config.upload_dir, &user);

    let history = load_history(&state).await;
    let submissions: Vec<Value> = entries_for(&history.entries, &user)
        .into_iter()
        .map(|entry| {
            json!({
                "submitted_at": entry.submitted_display(),
                "meal_type": entry.meal_type,
                "duration_seconds": entry.duration_seconds,
                "original_filename": entry.original_filename,
                "link": entry_link(&state, entry),
            })
        })
        .collect();

    let data = json!({
        "user": current.user(),
        "owner": user,
        "files": files,
        "submissions": submissions,
        "warnings": history.warnings,
    });
    Ok(state.renderer.page("files", &data, StatusCode::OK))
}

async fn download_local_file(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(file): Path<String>,
) -> Result<Response> {
    require_admin(&current)?;
    let path = resolve_upload(&state.config.upload_dir, &file)?;
    let bytes = tokio::fs::read(&path).await?;
    Ok(attachment(&file, XLSX_CONTENT_TYPE, bytes))
}

async fn redirect_to_signed_url(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    Path(path): Path<String>,
) -> Result<Response> {
    require_admin(&current)?;
    let path = path.trim_start_matches('/');

    let signed = match &state.remote {
        Some(remote) => remote.signed_url(path, SIGNED_URL_SECONDS).await,
        None => Err(PortalError::RemoteDisabled),
    };

    Ok(match signed {
        Ok(url) => Redirect::to(&url).into_response(),
        Err(e) => {
            warn!("No signed URL for {path}: {e}");
            state.renderer.notice(
                Some(current.user()),
                "다운로드 링크 생성 실패",
                &format!("⚠️ 로컬 파일만 있습니다 ({path}): {e}"),
                "/submit",
                StatusCode::BAD_GATEWAY,
            )
        }
    })
}

async fn replace_catalog(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentSession>,
    mut multipart: Multipart,
) -> Result<Response> {
    require_admin(&current)?;
    let notice = |message: &str, status| {
        state
            .renderer
            .notice(Some(current.user()), "메뉴 데이터 교체", message, "/submit", status)
    };

    let upload = match read_file_field(&mut multipart).await? {
        Some(upload) => upload,
        None => return Ok(notice("업로드할 파일을 선택해주세요.", StatusCode::BAD_REQUEST)),
    };

    let format = SheetFormat::from_path(FsPath::new(&upload.file_name))
        .unwrap_or_else(|_| SheetFormat::sniff(&upload.bytes));

    match parse_menu(&upload.bytes, format) {
        Ok(rows) => {
            let count = rows.len();
            state.replace_catalog(Catalog::from_outcome(LoadOutcome::Loaded {
                source: MenuSource::Payload,
                rows,
            }));
            info!("Catalog replaced by '{}' with {count} rows", current.user());
            Ok(notice(&format!("✅ {count}개 메뉴를 불러왔습니다."), StatusCode::OK))
        }
        Err(e) => {
            warn!("Rejected catalog upload '{}': {e}", upload.file_name);
            Ok(notice(&format!("❌ 메뉴 파일을 읽지 못했습니다: {e}"), StatusCode::BAD_REQUEST))
        }
    }
}
