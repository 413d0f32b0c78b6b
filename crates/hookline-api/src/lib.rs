//! HTTP surface for the hookline broker.
//!
//! A thin handler layer over the core repositories: producer publish,
//! admin CRUD for channels, producers, and consumers, and paginated
//! message listings. All interesting behavior lives in `hookline-core`;
//! handlers translate between HTTP and the domain error set.

#![forbid(unsafe_code)]

pub mod config;
pub mod handlers;
pub mod server;

pub use config::Config;
pub use server::{create_router, start_server};
