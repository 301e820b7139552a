//! open an image file and mount the volume on it
use anyhow::Context;
use std::path::Path;

use crate::{block_device::ImageDisk, fs::Volume};

/// mount the volume stored in `image_path`; hand the result back to
/// [Volume::unmount] to persist the metadata
pub fn mount<P>(image_path: P) -> anyhow::Result<Volume<ImageDisk>>
where
    P: AsRef<Path>,
{
    let image_path = image_path.as_ref();
    let disk = ImageDisk::open_image(image_path)
        .with_context(|| format!("failed to open image {}", image_path.display()))?;
    Volume::mount(disk).with_context(|| format!("failed to mount {}", image_path.display()))
}
