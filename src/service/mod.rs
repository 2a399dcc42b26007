pub mod article_service;
pub mod auth_service;
pub mod avatar_service;
pub mod column_service;
pub mod comment_service;
pub mod markup_service;
pub mod tag_service;
