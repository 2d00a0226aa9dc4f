//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest` with rustls
//! - Platform data/export directory discovery using `dirs`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{default_data_dir, ReqwestHttpClient};
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let data_dir = default_data_dir()?;
//! ```

mod http;
mod paths;

pub use http::ReqwestHttpClient;
pub use paths::{
    database_url_in, default_data_dir, default_export_dir, APP_DIR_NAME, DATABASE_FILE_NAME,
};
