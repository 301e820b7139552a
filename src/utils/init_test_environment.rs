use std::path::PathBuf;

use tempfile::TempDir;

use crate::mkfs::mkfs;

/// create a temp dir holding a freshly formatted image; the image goes away
/// together with the returned [TempDir]
pub fn init_test_environment() -> anyhow::Result<(TempDir, PathBuf)> {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new()?;
    let image = dir.path().join("volume.img");
    mkfs(&image)?;
    Ok((dir, image))
}
