//! create our filesystem
use anyhow::Context;
use byte_unit::Byte;
use log::info;
use std::path::Path;

use crate::{
    block_device::{BlockDevice, ImageDisk},
    fs::Volume,
    utils::fs_size_calculator,
};

/// create a new filesystem image at `image_file_path`, replacing any file already there
/// # Params
/// - `image_file_path`: the path of the image file
///
/// # Return
/// an [anyhow::Result] type to indicate whether the operation is successful
pub fn mkfs<P>(image_file_path: P) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let image_file_path = image_file_path.as_ref();
    ImageDisk::create(image_file_path)
        .with_context(|| format!("failed to create image {}", image_file_path.display()))?;
    let mut disk = ImageDisk::open_image(image_file_path)
        .with_context(|| format!("failed to open image {}", image_file_path.display()))?;
    Volume::format(&mut disk)
        .with_context(|| format!("failed to format image {}", image_file_path.display()))?;
    disk.close()?;

    info!(
        "created a {} volume at {}",
        Byte::from_bytes(fs_size_calculator::image_size() as _).get_appropriate_unit(true),
        image_file_path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{fs::SuperBlock, utils::init_test_environment::init_test_environment};

    #[test]
    fn test_mkfs() -> anyhow::Result<()> {
        let (_dir, image) = init_test_environment()?;
        assert_eq!(
            std::fs::metadata(&image)?.len(),
            fs_size_calculator::image_size()
        );

        let volume = Volume::mount(ImageDisk::open_image(&image)?)?;
        assert_eq!(volume.superblock(), &SuperBlock::new());
        assert_eq!(volume.stats().file_count, 0);
        volume.unmount()?;
        Ok(())
    }

    #[test]
    fn test_mkfs_resets_used_image() -> anyhow::Result<()> {
        let (_dir, image) = init_test_environment()?;
        let mut volume = Volume::mount(ImageDisk::open_image(&image)?)?;
        volume.create("old")?;
        volume.unmount()?;

        mkfs(&image)?;
        let volume = Volume::mount(ImageDisk::open_image(&image)?)?;
        assert!(!volume.exists("old"));
        assert_eq!(volume.stats().free_blocks, 4096);
        Ok(())
    }
}
