pub mod blocks;
pub mod compat;
pub mod config;
pub mod error;
pub mod menu;
pub mod middleware;
pub mod model;
pub mod page;
pub mod publication;
pub mod render;
pub mod richtext;
pub mod search;
pub mod views;

pub use views::{router, AppState};
