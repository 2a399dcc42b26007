use crate::errors::{bad_request, forbidden, ApiError, ApiResult};
use crate::middleware::check_access::check_access;
use crate::model::article::{Article, ArticleForm, ArticleListQuery, ArticleRow, ArticleUpdate, NONE_SENTINEL};
use crate::model::column::Column;
use crate::model::user::User;
use crate::service::avatar_service::{AvatarService, StoredAvatar};
use crate::util::common::format_millis;
use crate::util::extractor::{Path, Query};
use crate::AppState;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
#[cfg(not(debug_assertions))]
use include_dir::{include_dir, Dir};
use minijinja::{context, Environment};
use std::sync::Arc;
use tracing::{error, info, warn};
use validator::Validate;

type HtmlResult = Result<Html<String>, HtmlError>;

type Templates = Arc<Environment<'static>>;

pub fn create_routes(state: AppState) -> Router<AppState> {
    let mut env = Environment::new();
    load_templates(&mut env);
    env.add_filter("datetime", format_millis);

    let protected = Router::new()
        .route("/create", get(create_form).post(create_article))
        .route("/update/{id}", get(update_form).post(update_article))
        .route("/delete/{id}", post(delete_article))
        .route_layer(middleware::from_fn_with_state(state, check_access));

    Router::new()
        .route("/list", get(article_list))
        .route("/detail/{id}", get(article_detail))
        .merge(protected)
        .layer(Extension(Arc::new(env)))
}

async fn article_list(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
    Extension(env): Extension<Templates>,
) -> HtmlResult {
    let page = Article::list_page(&state.db, &query).await?;
    let columns = Column::all(&state.db).await?;

    let template = env.get_template("list.html")?;
    Ok(Html(template.render(context! {
        page,
        columns,
        upload_url => upload_url(&state),
    })?))
}

async fn article_detail(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Extension(env): Extension<Templates>,
) -> HtmlResult {
    let detail = Article::detail(&state.db, id).await?;

    let template = env.get_template("detail.html")?;
    Ok(Html(template.render(context! {
        article => detail.article,
        html => detail.html,
        toc => detail.toc,
        comments => detail.comments,
        upload_url => upload_url(&state),
    })?))
}

// Avatar paths are relative to the configured upload mount.
fn upload_url(state: &AppState) -> &str {
    state.config.upload.base_url.trim_end_matches('/')
}

async fn create_form(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Extension(env): Extension<Templates>,
) -> HtmlResult {
    let columns = Column::all(&state.db).await?;

    let template = env.get_template("create.html")?;
    Ok(Html(template.render(context! { user, columns })?))
}

async fn create_article(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let avatars = AvatarService::new(state.config.upload.clone());
    let (form, avatar) = accept_submission(&avatars, &mut multipart).await?;

    let avatar_name = avatar.as_ref().map(|a| a.name.as_str());
    match Article::create(&state.db, user.id, &form, avatar_name).await {
        Ok(created) => {
            info!(id = created.id, user = %user.username, "article created");
            Ok(Redirect::to("/article/list"))
        }
        Err(err) => {
            if let Some(avatar) = avatar {
                avatar.discard().await;
            }
            Err(err)
        }
    }
}

async fn update_form(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Extension(env): Extension<Templates>,
) -> HtmlResult {
    let article = Article::find_with_tags(&state.db, id).await?;
    ensure_author(&user, &article.row)?;
    let columns = Column::all(&state.db).await?;

    let template = env.get_template("update.html")?;
    Ok(Html(template.render(context! {
        user,
        columns,
        tags => article.tags.join(", "),
        article,
    })?))
}

async fn update_article(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<Redirect> {
    let article = Article::find_with_tags(&state.db, id).await?;
    ensure_author(&user, &article.row)?;

    let avatars = AvatarService::new(state.config.upload.clone());
    let (form, avatar) = accept_submission(&avatars, &mut multipart).await?;

    let update = ArticleUpdate::from_form(form, avatar.as_ref().map(|a| a.name.clone()));
    if let Err(err) = Article::update_fields(&state.db, id, &update).await {
        if let Some(avatar) = avatar {
            avatar.discard().await;
        }
        return Err(err);
    }

    // The replaced image is no longer referenced
    if let (Some(_), Some(old)) = (&avatar, article.row.avatar) {
        discard_stored(&avatars, old).await;
    }

    info!(id, user = %user.username, "article updated");
    Ok(Redirect::to(&format!("/article/detail/{id}")))
}

async fn delete_article(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> ApiResult<Redirect> {
    let article = Article::find_with_tags(&state.db, id).await?;
    if article.row.author_id != user.id && !user.is_admin {
        return Err(forbidden("You are not allowed to delete this article"));
    }

    Article::delete(&state.db, id).await?;

    if let Some(old) = article.row.avatar {
        let avatars = AvatarService::new(state.config.upload.clone());
        discard_stored(&avatars, old).await;
    }

    info!(id, user = %user.username, "article deleted");
    Ok(Redirect::to("/article/list"))
}

fn ensure_author(user: &User, article: &ArticleRow) -> ApiResult<()> {
    if article.author_id != user.id {
        return Err(forbidden("Only the author can edit this article"));
    }
    Ok(())
}

async fn discard_stored(avatars: &AvatarService, name: String) {
    let avatar = StoredAvatar {
        path: avatars.path_of(&name),
        name,
    };
    avatar.discard().await;
}

/// Reads and validates a submitted article form, then resizes its avatar.
/// A stored avatar is removed again whenever the submission is rejected.
async fn accept_submission(
    avatars: &AvatarService,
    multipart: &mut Multipart,
) -> ApiResult<(ArticleForm, Option<StoredAvatar>)> {
    let (form, avatar) = read_article_form(avatars, multipart).await?;

    if let Err(err) = form.validate() {
        if let Some(avatar) = avatar {
            avatar.discard().await;
        }
        return Err(err.into());
    }

    if let Some(ref stored) = avatar {
        if let Err(err) = avatars.process(stored).await {
            warn!("cannot process avatar {}: {:?}", stored.name, err);
            stored.discard().await;
            return Err(bad_request("Avatar is not a valid image"));
        }
    }

    Ok((form, avatar))
}

async fn read_article_form(
    avatars: &AvatarService,
    multipart: &mut Multipart,
) -> ApiResult<(ArticleForm, Option<StoredAvatar>)> {
    let mut form = ArticleForm::default();
    let mut column: Option<String> = None;
    let mut avatar: Option<StoredAvatar> = None;

    let result = async {
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => form.title = field.text().await?.trim().to_string(),
                "body" => form.body = field.text().await?,
                "column" => column = Some(field.text().await?),
                "tags" => form.tags.extend(split_tags(&field.text().await?)),
                "avatar" => {
                    // Browsers send an empty file part when nothing was chosen
                    if field.file_name().is_some_and(|n| !n.is_empty()) {
                        if let Some(previous) = avatar.take() {
                            previous.discard().await;
                        }
                        avatar = Some(avatars.stream_to_file(field).await?);
                    }
                }
                _ => {}
            }
        }
        form.column_id = parse_column(column.as_deref())?;
        Ok::<(), ApiError>(())
    }
    .await;

    if let Err(err) = result {
        if let Some(avatar) = avatar {
            avatar.discard().await;
        }
        return Err(err);
    }

    Ok((form, avatar))
}

/// `none` or an empty value means no column.
fn parse_column(value: Option<&str>) -> ApiResult<Option<i64>> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) if value == NONE_SENTINEL => Ok(None),
        Some(value) if value.chars().all(|ch| ch.is_ascii_digit()) => value
            .parse::<i64>()
            .map(Some)
            .map_err(|_| bad_request("Invalid column")),
        Some(_) => Err(bad_request("Invalid column")),
    }
}

fn split_tags(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Debug)]
enum HtmlError {
    NotFound,
    Api(ApiError),
    TemplateError(minijinja::Error),
}

impl From<ApiError> for HtmlError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::NotFound(_) => HtmlError::NotFound,
            err => HtmlError::Api(err),
        }
    }
}

impl From<minijinja::Error> for HtmlError {
    fn from(err: minijinja::Error) -> Self {
        HtmlError::TemplateError(err)
    }
}

impl IntoResponse for HtmlError {
    fn into_response(self) -> Response {
        match self {
            HtmlError::NotFound => (StatusCode::NOT_FOUND, Html(PAGE_404)).into_response(),
            HtmlError::Api(err) if err.code() < 500 => err.into_response(),
            HtmlError::Api(err) => {
                error!("page error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, Html(PAGE_500)).into_response()
            }
            HtmlError::TemplateError(err) => {
                error!("template error: {:?}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, Html(PAGE_500)).into_response()
            }
        }
    }
}

static PAGE_404: &str = include_str!("../../templates/404.html");
static PAGE_500: &str = include_str!("../../templates/500.html");

#[cfg(not(debug_assertions))]
static TEMPLATES_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/templates");

#[cfg(debug_assertions)]
fn load_templates(env: &mut Environment<'static>) {
    use minijinja::path_loader;
    // Templates are re-read from disk while developing
    env.set_loader(path_loader("templates"));
}

#[cfg(not(debug_assertions))]
fn load_templates(env: &mut Environment<'static>) {
    for file in TEMPLATES_DIR.files() {
        if let (Some(name), Some(content)) = (file.path().to_str(), file.contents_utf8()) {
            if let Err(e) = env.add_template(name, content) {
                error!("cannot load template {}: {}", name, e);
            }
        }
    }
}
