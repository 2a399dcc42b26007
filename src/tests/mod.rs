mod common;
mod route;
mod service;
