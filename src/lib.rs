pub mod api;
pub mod catalog;
pub mod config;
pub mod geo;
pub mod models;
pub mod redirect;
pub mod selection;
pub mod storage;
