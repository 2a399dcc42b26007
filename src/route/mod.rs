pub mod article_api;
pub mod article_page;
