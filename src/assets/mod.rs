//! Asset model and session-wide asset table

pub mod table;
pub mod types;

pub use table::{AssetCounts, AssetTable};
pub use types::{
    classify, classify_by_extension, default_critical, Asset, AssetType, DiscoveryMethod,
    DownloadStatus,
};
