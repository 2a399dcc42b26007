pub mod article;
pub mod column;
pub mod comment;
pub mod tag;
pub mod user;
pub mod validator;
