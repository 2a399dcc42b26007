use crate::model::comment::Comment;
use crate::model::validator::validate_tag_names;
use crate::util::maybe::MaybeAbsent;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Number of articles on one page of the feed.
pub const ARTICLES_PER_PAGE: i64 = 3;

/// Sentinel meaning "no tag filter" / "no column" in query strings and forms.
pub const NONE_SENTINEL: &str = "none";

// which Rust types correspond to which sqlite column types:
// https://docs.rs/sqlx/latest/sqlx/sqlite/types/index.html
#[derive(Debug, Serialize, FromRow, Clone)]
pub struct ArticleRow {
    pub id: i64,
    pub author_id: i64,
    pub author: String,
    pub title: String,
    pub body: String,
    pub column_id: Option<i64>,
    pub column_title: Option<String>,
    pub avatar: Option<String>,
    pub created: i64,
    pub updated: i64,
    pub total_views: i64,
}

#[derive(Debug, Serialize, Clone)]
pub struct Article {
    #[serde(flatten)]
    pub row: ArticleRow,

    pub tags: Vec<String>,
}

impl From<ArticleRow> for Article {
    fn from(row: ArticleRow) -> Self {
        Self { row, tags: vec![] }
    }
}

#[derive(Debug, Serialize, Deserialize, Display, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ArticleOrder {
    #[default]
    #[display("created")]
    Created,
    #[display("total_views")]
    TotalViews,
}

/// Raw list parameters exactly as they arrive in the query string.
/// Every field is optional and malformed values are ignored rather than rejected.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct ArticleListQuery {
    pub search: Option<String>,
    pub order: Option<String>,
    pub column: Option<String>,
    pub tag: Option<String>,
    pub page: Option<String>,
}

/// Normalized filter criteria; every `Some` field is ANDed into the query.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ArticleFilter {
    pub search: Option<String>,
    pub column_id: Option<i64>,
    pub tag: Option<String>,
    pub order: ArticleOrder,
}

impl ArticleListQuery {
    pub fn filter(&self) -> ArticleFilter {
        let search = self
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(String::from);

        // Only plain digit strings select a column, `-1` or `3a` are ignored
        let column_id = self
            .column
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty() && c.chars().all(|ch| ch.is_ascii_digit()))
            .and_then(|c| c.parse::<i64>().ok());

        let tag = self
            .tag
            .as_deref()
            .filter(|t| !t.is_empty() && *t != NONE_SENTINEL)
            .map(String::from);

        let order = match self.order.as_deref() {
            Some("total_views") => ArticleOrder::TotalViews,
            _ => ArticleOrder::Created,
        };

        ArticleFilter {
            search,
            column_id,
            tag,
            order,
        }
    }

    /// The requested page number, or 1 when absent or not an integer. Integers
    /// outside the i64 range saturate so they still clamp to the nearest end.
    pub fn requested_page(&self) -> i64 {
        let Some(page) = self.page.as_deref().map(str::trim) else {
            return 1;
        };
        if let Ok(page) = page.parse::<i64>() {
            return page;
        }

        // Integers too large for i64 still mean "past the end"
        let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
        match page.strip_prefix('-') {
            Some(rest) if digits(rest) => i64::MIN,
            None if digits(page.strip_prefix('+').unwrap_or(page)) => i64::MAX,
            _ => 1,
        }
    }
}

/// Position of one page inside an ordered result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub page: i64,
    pub num_pages: i64,
    pub offset: i64,
    pub limit: i64,
}

impl PageWindow {
    /// Clamps `requested` into `1..=num_pages`. An empty result still has one (empty) page.
    pub fn clamp(requested: i64, total: i64, per_page: i64) -> Self {
        let num_pages = if total <= 0 { 1 } else { (total + per_page - 1) / per_page };
        let page = requested.clamp(1, num_pages);

        PageWindow {
            page,
            num_pages,
            offset: (page - 1) * per_page,
            limit: per_page,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.num_pages
    }
}

#[derive(Debug, Serialize)]
pub struct ArticlePage {
    pub articles: Vec<Article>,
    pub page: i64,
    pub num_pages: i64,
    pub total: i64,
    pub has_previous: bool,
    pub has_next: bool,

    // echoed filter state
    pub search: String,
    pub column: Option<i64>,
    pub tag: Option<String>,
    pub order: ArticleOrder,
}

/// Submitted create/update form.
#[derive(Debug, Default, Clone, Validate)]
pub struct ArticleForm {
    #[validate(length(min = 1, max = 100, message = "must be between 1 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "can not be empty"))]
    pub body: String,
    pub column_id: Option<i64>,
    #[validate(custom(function = "validate_tag_names"))]
    pub tags: Vec<String>,
}

/// Partial update of an article's content. Absent fields keep their stored value;
/// `tags`, when present, replaces the whole tag set.
#[derive(Debug, Default)]
pub struct ArticleUpdate {
    pub title: MaybeAbsent<String>,
    pub body: MaybeAbsent<String>,
    pub column_id: MaybeAbsent<Option<i64>>,
    pub avatar: MaybeAbsent<Option<String>>,
    pub tags: MaybeAbsent<Vec<String>>,
}

impl ArticleUpdate {
    /// Everything the update form carries; the avatar only when a new image was uploaded.
    pub fn from_form(form: ArticleForm, avatar: Option<String>) -> Self {
        ArticleUpdate {
            title: MaybeAbsent::Present(form.title),
            body: MaybeAbsent::Present(form.body),
            column_id: MaybeAbsent::Present(form.column_id),
            avatar: avatar.map(Some).into(),
            tags: MaybeAbsent::Present(form.tags),
        }
    }
}

/// One viewed article with its rendered body and the comments attached to it.
#[derive(Debug, Serialize)]
pub struct ArticleDetail {
    pub article: Article,
    pub html: String,
    pub toc: String,
    pub comments: Vec<Comment>,
}

#[derive(Debug, Serialize)]
pub struct CreateResponse {
    pub id: i64,
    pub created: i64,
}
