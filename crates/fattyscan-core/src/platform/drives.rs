/// Volume enumeration.
///
/// Windows lists logical drives through the Windows API; other platforms
/// use `sysinfo` mount points. Both report total/free space so the progress
/// estimator can size a whole-volume scan upfront.
use std::path::{Path, PathBuf};

/// A mounted volume and its space figures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Root path, e.g. `C:\` or `/home`.
    pub root: PathBuf,
    /// Total capacity in bytes.
    pub total_bytes: u64,
    /// Free space in bytes.
    pub free_bytes: u64,
}

impl VolumeInfo {
    /// Bytes in use (capacity − free space).
    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.free_bytes)
    }
}

/// Volume root paths as strings, sorted and deduplicated.
pub fn list_volumes() -> Vec<String> {
    let mut roots: Vec<String> = volumes()
        .into_iter()
        .map(|v| v.root.to_string_lossy().into_owned())
        .collect();
    roots.sort();
    roots.dedup();
    roots
}

/// Used bytes of the volume rooted exactly at `root`, if it is one.
pub fn volume_used_bytes(root: &Path) -> Option<u64> {
    volumes()
        .into_iter()
        .find(|v| same_root(&v.root, root))
        .map(|v| v.used_bytes())
}

/// Whether `path` is the root of a volume rather than an arbitrary folder.
pub fn is_volume_root(path: &Path) -> bool {
    #[cfg(windows)]
    {
        use std::path::Component;
        // `C:\` is a prefix plus a root separator and nothing else.
        let mut components = path.components();
        matches!(
            (components.next(), components.next(), components.next()),
            (Some(Component::Prefix(_)), Some(Component::RootDir), None)
        )
    }
    #[cfg(not(windows))]
    {
        path == Path::new("/") || volumes().iter().any(|v| same_root(&v.root, path))
    }
}

/// Compare two roots ignoring trailing separators (and case on Windows).
fn same_root(a: &Path, b: &Path) -> bool {
    let normalise = |p: &Path| {
        let s = p.to_string_lossy();
        let trimmed = s.trim_end_matches(['/', '\\']);
        let trimmed = if trimmed.is_empty() { &s[..1.min(s.len())] } else { trimmed };
        if cfg!(windows) {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        }
    };
    normalise(a) == normalise(b)
}

/// Enumerate all available local drives on the system.
///
/// Network/remote drives are excluded — scanning them would force slow
/// remote reads.
#[cfg(windows)]
pub fn volumes() -> Vec<VolumeInfo> {
    use std::ffi::OsString;
    use std::os::windows::ffi::OsStringExt;
    use windows::Win32::Storage::FileSystem::{
        GetDiskFreeSpaceExW, GetDriveTypeW, GetLogicalDriveStringsW,
    };

    // Drive type constant from the Windows API.
    const DRIVE_REMOTE_VAL: u32 = 4;

    let mut volumes = Vec::new();

    // GetLogicalDriveStringsW returns null-separated drive root strings.
    let mut buffer = [0u16; 256];
    let len = unsafe { GetLogicalDriveStringsW(Some(&mut buffer)) };

    if len == 0 {
        tracing::warn!("GetLogicalDriveStringsW returned 0");
        return volumes;
    }

    let full = OsString::from_wide(&buffer[..len as usize]);
    let full_str = full.to_string_lossy();

    for root in full_str.split('\0').filter(|s| !s.is_empty()) {
        let root_wide: Vec<u16> = root.encode_utf16().chain(std::iter::once(0)).collect();
        let root_pcwstr = windows::core::PCWSTR(root_wide.as_ptr());

        if unsafe { GetDriveTypeW(root_pcwstr) } == DRIVE_REMOTE_VAL {
            continue;
        }

        let mut free_caller: u64 = 0;
        let mut total: u64 = 0;
        let mut free_total: u64 = 0;
        let has_space = unsafe {
            GetDiskFreeSpaceExW(
                root_pcwstr,
                Some(&mut free_caller as *mut u64),
                Some(&mut total as *mut u64),
                Some(&mut free_total as *mut u64),
            )
            .is_ok()
        };

        let (total_bytes, free_bytes) = if has_space { (total, free_total) } else { (0, 0) };

        volumes.push(VolumeInfo {
            root: PathBuf::from(root),
            total_bytes,
            free_bytes,
        });
    }

    volumes
}

/// Enumerate mounted filesystems through `sysinfo`.
#[cfg(not(windows))]
pub fn volumes() -> Vec<VolumeInfo> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .map(|d| VolumeInfo {
            root: d.mount_point().to_path_buf(),
            total_bytes: d.total_space(),
            // sysinfo only reports space available to unprivileged users,
            // which excludes reserved blocks, so used bytes read slightly
            // high. It is the closest free figure sysinfo offers.
            free_bytes: d.available_space(),
        })
        .collect()
}
