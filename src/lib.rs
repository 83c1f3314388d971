pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod filter;
pub mod http_client;
pub mod modal;
pub mod models;
pub mod resources;
pub mod storage;
pub mod version_check;

pub use cache::{CacheKey, CachePolicy, CacheService, Resource, ResourceSpec, ResourceState};
pub use client::TrackerClient;
pub use config::ClientConfig;
pub use error::ApiError;
pub use fetcher::{Fetcher, Transport};
pub use filter::{FilterAction, FilterSeed, FilterState, FilterUpdate, ScoreFilterStore};
