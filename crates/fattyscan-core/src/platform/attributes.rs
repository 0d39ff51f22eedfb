/// Per-entry hazard checks applied by the walker and the lazy reader.
///
/// Links (symlinks, junctions, other reparse points) are never followed:
/// they can form cycles and do not represent local storage. Offline files
/// are skipped so reading their size never triggers a remote recall.
use std::fs::Metadata;

/// Returns `true` if the entry is a link of any kind.
///
/// `metadata` must come from `symlink_metadata` / `DirEntry::metadata`,
/// which do not traverse links.
pub fn is_link(metadata: &Metadata) -> bool {
    if metadata.file_type().is_symlink() {
        return true;
    }
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        use windows::Win32::Storage::FileSystem::FILE_ATTRIBUTE_REPARSE_POINT;
        metadata.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT.0 != 0
    }
    #[cfg(not(windows))]
    {
        false
    }
}

/// Returns `true` if the file's data is not stored locally.
#[cfg(windows)]
pub fn is_offline(metadata: &Metadata) -> bool {
    use std::os::windows::fs::MetadataExt;
    use windows::Win32::Storage::FileSystem::{
        FILE_ATTRIBUTE_OFFLINE, FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS,
    };
    let mask = FILE_ATTRIBUTE_OFFLINE.0 | FILE_ATTRIBUTE_RECALL_ON_DATA_ACCESS.0;
    metadata.file_attributes() & mask != 0
}

/// Returns `true` if the file's data is not stored locally.
///
/// No portable offline flag exists outside Windows.
#[cfg(not(windows))]
pub fn is_offline(_metadata: &Metadata) -> bool {
    false
}
