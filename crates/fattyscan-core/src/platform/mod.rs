/// Platform-specific functionality — volume enumeration, volume usage,
/// and per-entry hazard attributes (links and offline files).

pub mod attributes;
pub mod drives;

pub use attributes::{is_link, is_offline};
pub use drives::{is_volume_root, list_volumes, volume_used_bytes, volumes, VolumeInfo};
