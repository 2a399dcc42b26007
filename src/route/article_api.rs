use crate::errors::ApiResult;
use crate::middleware::check_access::check_access;
use crate::model::article::{Article, ArticleDetail, ArticleListQuery, ArticlePage};
use crate::model::column::{Column, ColumnCreate};
use crate::model::tag::{Tag, TagWithArticleCount};
use crate::model::user::User;
use crate::util::extractor::{Json, Path, Query, ValidatedJson};
use crate::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tracing::info;

pub fn create_routes(state: AppState) -> Router<AppState> {
    let auth = middleware::from_fn_with_state(state, check_access);

    Router::new()
        .route("/articles", get(get_articles))
        .route("/articles/{id}", get(get_article))
        // Reading columns is public, creating one needs a login
        .route(
            "/columns",
            get(get_columns).merge(post(create_column).route_layer(auth)),
        )
        .route("/tags", get(get_tags))
}

async fn get_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticleListQuery>,
) -> ApiResult<Json<ArticlePage>> {
    let page = Article::list_page(&state.db, &query).await?;
    Ok(Json(page))
}

async fn get_article(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ArticleDetail>> {
    let detail = Article::detail(&state.db, id).await?;
    Ok(Json(detail))
}

async fn get_columns(State(state): State<AppState>) -> ApiResult<Json<Vec<Column>>> {
    let columns = Column::all(&state.db).await?;
    Ok(Json(columns))
}

async fn create_column(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    ValidatedJson(payload): ValidatedJson<ColumnCreate>,
) -> ApiResult<(StatusCode, Json<Column>)> {
    let column = Column::create(&state.db, payload.title.trim()).await?;
    info!(id = column.id, user = %user.username, "column created");
    Ok((StatusCode::CREATED, Json(column)))
}

async fn get_tags(State(state): State<AppState>) -> ApiResult<Json<Vec<TagWithArticleCount>>> {
    let tags = Tag::get_all_with_article_count(&state.db).await?;
    Ok(Json(tags))
}
