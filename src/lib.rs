//! douyin-sync: copy a Douyin profile's videos into a Feishu/Lark Bitable table.
//!
//! The pipeline is strictly sequential: [`scrapers`] pages through the
//! profile's post listing, [`bitable`] upserts the flattened records, and
//! [`services::SyncService`] ties the two together.

pub mod bitable;
pub mod config;
pub mod logging;
pub mod mapper;
pub mod models;
pub mod retry;
pub mod scrapers;
pub mod services;

pub use config::{load_settings, Settings};
pub use models::{RecordStatus, SyncResult, VideoRecord};
pub use services::{SyncError, SyncRequest, SyncService};
