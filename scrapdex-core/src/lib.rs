//! Core library for fetching, normalizing and classifying game item data.

pub mod cache;
pub mod classify;
pub mod config;
pub mod error;
pub mod export;
pub mod fetch;
pub mod file_utils;
pub mod linker;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod rendering;
pub mod view;

pub use error::{Result, ScrapdexError};
pub use loader::{LoadOrigin, Loader, LoaderSettings};
pub use models::{Catalog, Category, Item, Rarity};
