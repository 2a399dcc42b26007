use crate::errors::{bad_request, ApiError, ApiResult};
use crate::model::article::{
    Article, ArticleDetail, ArticleFilter, ArticleForm, ArticleListQuery, ArticleOrder,
    ArticlePage, ArticleRow, ArticleUpdate, CreateResponse, PageWindow, ARTICLES_PER_PAGE,
};
use crate::model::column::Column;
use crate::model::comment::Comment;
use crate::model::tag::Tag;
use crate::service::markup_service::MarkupRenderer;
use crate::util::common::now_millis;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashMap;
use tracing::debug;

const ARTICLE_SELECT: &str = r#"
    SELECT a.id, a.author_id, u.username AS author, a.title, a.body, a.column_id,
           c.title AS column_title, a.avatar, a.created, a.updated, a.total_views
    FROM articles a
    INNER JOIN users u ON u.id = a.author_id
    LEFT JOIN article_columns c ON c.id = a.column_id
"#;

/// One predicate of the list query. Clauses are collected from an
/// [`ArticleFilter`] and compiled into a single `WHERE` joined with `AND`.
#[derive(Debug, Clone, PartialEq)]
enum Clause {
    /// Case-insensitive substring of the title or the body
    Search(String),
    Column(i64),
    Tag(String),
}

impl Clause {
    fn collect(filter: &ArticleFilter) -> Vec<Clause> {
        let mut clauses = Vec::new();
        if let Some(ref search) = filter.search {
            clauses.push(Clause::Search(search.clone()));
        }
        if let Some(column_id) = filter.column_id {
            clauses.push(Clause::Column(column_id));
        }
        if let Some(ref tag) = filter.tag {
            clauses.push(Clause::Tag(tag.clone()));
        }
        clauses
    }

    fn compile(clauses: &[Clause], builder: &mut QueryBuilder<'_, Sqlite>) {
        builder.push(" WHERE 1 = 1 ");

        for clause in clauses {
            match clause {
                Clause::Search(search) => {
                    let pattern = format!("%{}%", escape_like(search));
                    builder
                        .push(" AND (a.title LIKE ")
                        .push_bind(pattern.clone())
                        .push(" ESCAPE '\\' OR a.body LIKE ")
                        .push_bind(pattern)
                        .push(" ESCAPE '\\') ");
                }
                Clause::Column(column_id) => {
                    builder.push(" AND a.column_id = ").push_bind(*column_id);
                }
                Clause::Tag(tag) => {
                    builder
                        .push(
                            r#" AND EXISTS (
                                SELECT 1 FROM article_tags at
                                INNER JOIN tags t ON t.id = at.tag_id
                                WHERE at.article_id = a.id AND t.name = "#,
                        )
                        .push_bind(tag.clone())
                        .push(") ");
                }
            }
        }
    }
}

fn order_clause(order: ArticleOrder) -> &'static str {
    match order {
        ArticleOrder::TotalViews => " ORDER BY a.total_views DESC, a.created DESC, a.id DESC ",
        ArticleOrder::Created => " ORDER BY a.created DESC, a.id DESC ",
    }
}

impl Article {
    pub async fn find_by_id(pool: &SqlitePool, id: i64) -> ApiResult<Option<ArticleRow>> {
        let row = sqlx::query_as::<_, ArticleRow>(&format!("{ARTICLE_SELECT} WHERE a.id = ?"))
            .bind(id)
            .fetch_optional(pool)
            .await?;

        Ok(row)
    }

    pub async fn find_with_tags(pool: &SqlitePool, id: i64) -> ApiResult<Article> {
        let row = Article::find_by_id(pool, id).await?.ok_or_else(article_not_found)?;
        let mut article = Article::from(row);
        article.tags = Tag::tags_of(pool, id).await?;
        Ok(article)
    }

    pub async fn count(pool: &SqlitePool, filter: &ArticleFilter) -> ApiResult<i64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM articles a");
        Clause::compile(&Clause::collect(filter), &mut builder);

        let count = builder.build_query_scalar::<i64>().fetch_one(pool).await?;
        Ok(count)
    }

    /// Filtered and ordered slice of the article collection.
    pub async fn filter_and_order(
        pool: &SqlitePool,
        filter: &ArticleFilter,
        limit: i64,
        offset: i64,
    ) -> ApiResult<Vec<Article>> {
        let mut builder = QueryBuilder::<Sqlite>::new(ARTICLE_SELECT);
        Clause::compile(&Clause::collect(filter), &mut builder);

        builder.push(order_clause(filter.order));
        builder.push(" LIMIT ").push_bind(limit);
        builder.push(" OFFSET ").push_bind(offset);

        let mut articles = builder
            .build_query_as::<ArticleRow>()
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(Article::from)
            .collect::<Vec<_>>();

        Self::attach_tags(pool, &mut articles).await?;

        Ok(articles)
    }

    /// Normalizes the raw list parameters and returns the requested page,
    /// clamped into the valid page range.
    pub async fn list_page(pool: &SqlitePool, query: &ArticleListQuery) -> ApiResult<ArticlePage> {
        let filter = query.filter();
        let total = Article::count(pool, &filter).await?;
        let window = PageWindow::clamp(query.requested_page(), total, ARTICLES_PER_PAGE);

        debug!(?filter, total, page = window.page, "listing articles");

        let articles = Article::filter_and_order(pool, &filter, window.limit, window.offset).await?;

        Ok(ArticlePage {
            articles,
            page: window.page,
            num_pages: window.num_pages,
            total,
            has_previous: window.has_previous(),
            has_next: window.has_next(),
            search: filter.search.unwrap_or_default(),
            column: filter.column_id,
            tag: filter.tag,
            order: filter.order,
        })
    }

    pub async fn create(
        pool: &SqlitePool,
        author_id: i64,
        form: &ArticleForm,
        avatar: Option<&str>,
    ) -> ApiResult<CreateResponse> {
        if let Some(column_id) = form.column_id {
            ensure_column_exists(pool, column_id).await?;
        }

        let now = now_millis();
        let mut tx = pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO articles (author_id, title, body, column_id, avatar, created, updated, total_views)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            RETURNING id
            "#,
        )
        .bind(author_id)
        .bind(&form.title)
        .bind(&form.body)
        .bind(form.column_id)
        .bind(avatar)
        .bind(now)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        Tag::set_tags_in(&mut tx, id, &form.tags).await?;

        tx.commit().await?;

        debug!(id, author_id, "article created");
        Ok(CreateResponse { id, created: now })
    }

    /// Writes the present fields, refreshes `updated` and replaces the tag set when given.
    /// The view counter is never touched here, see [`Article::increment_views`].
    pub async fn update_fields(pool: &SqlitePool, id: i64, update: &ArticleUpdate) -> ApiResult<()> {
        if let Some(Some(column_id)) = update.column_id.as_ref().into_option() {
            ensure_column_exists(pool, *column_id).await?;
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE articles SET ");
        builder.push("updated = ").push_bind(now_millis());

        update.title.if_present(|title| {
            builder.push(", title = ").push_bind(title.clone());
        });

        update.body.if_present(|body| {
            builder.push(", body = ").push_bind(body.clone());
        });

        update.column_id.if_present(|column_id| {
            builder.push(", column_id = ").push_bind(*column_id);
        });

        update.avatar.if_present(|avatar| {
            builder.push(", avatar = ").push_bind(avatar.clone());
        });

        builder.push(" WHERE id = ").push_bind(id);

        let mut tx = pool.begin().await?;

        let result = builder.build().execute(&mut *tx).await?;
        if result.rows_affected() == 0 {
            return Err(article_not_found());
        }

        if let Some(tags) = update.tags.as_ref().into_option() {
            Tag::set_tags_in(&mut tx, id, tags).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// The views-only update: a single atomic increment of `total_views`.
    /// No other column changes, so concurrent readers cannot lose increments.
    pub async fn increment_views(pool: &SqlitePool, id: i64) -> ApiResult<()> {
        let result = sqlx::query("UPDATE articles SET total_views = total_views + 1 WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(article_not_found());
        }
        Ok(())
    }

    /// Counts one view and returns the article as it is after the increment.
    pub async fn view(pool: &SqlitePool, id: i64) -> ApiResult<Article> {
        Article::increment_views(pool, id).await?;
        Article::find_with_tags(pool, id).await
    }

    /// The detail view: counts the view, renders the body and loads the comments.
    /// Rendering only happens here, its output is never stored.
    pub async fn detail(pool: &SqlitePool, id: i64) -> ApiResult<ArticleDetail> {
        let article = Article::view(pool, id).await?;
        let rendered = MarkupRenderer::render(&article.row.body)?;
        let comments = Comment::find_by_article(pool, id).await?;

        Ok(ArticleDetail {
            article,
            html: rendered.html,
            toc: rendered.toc,
            comments,
        })
    }

    /// Deletes the article with its tag links and comments. Columns and tags stay.
    pub async fn delete(pool: &SqlitePool, id: i64) -> ApiResult<()> {
        let result = sqlx::query("DELETE FROM articles WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(article_not_found());
        }
        Ok(())
    }

    async fn attach_tags(pool: &SqlitePool, articles: &mut [Article]) -> ApiResult<()> {
        if articles.is_empty() {
            return Ok(());
        }

        let article_ids: Vec<i64> = articles.iter().map(|article| article.row.id).collect();
        let article_ids = serde_json::to_string(&article_ids).map_err(anyhow::Error::from)?;

        let rows = sqlx::query_as::<_, (i64, String)>(
            r#"
            SELECT at.article_id, t.name
            FROM article_tags at
            INNER JOIN tags t ON at.tag_id = t.id
            WHERE at.article_id IN (SELECT value FROM json_each(?1))
            ORDER BY t.name
            "#,
        )
        .bind(article_ids)
        .fetch_all(pool)
        .await?;

        let mut tags: HashMap<i64, Vec<String>> = HashMap::new();
        for (article_id, name) in rows {
            tags.entry(article_id).or_default().push(name);
        }

        for article in articles.iter_mut() {
            article.tags = tags.remove(&article.row.id).unwrap_or_default();
        }

        Ok(())
    }
}

// Helper functions
async fn ensure_column_exists(pool: &SqlitePool, column_id: i64) -> ApiResult<()> {
    if Column::exists(pool, column_id).await? {
        Ok(())
    } else {
        Err(bad_request("Column does not exist"))
    }
}

/// Escapes `LIKE` wildcards so the search text matches literally.
fn escape_like(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn article_not_found() -> ApiError {
    ApiError::NotFound("article not found".to_owned())
}
