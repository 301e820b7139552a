//! carry out a parsed [VdiskCli] against an image file
use std::{io::Write, path::Path};

use anyhow::{anyhow, Context};
use byte_unit::Byte;
use log::info;

use super::{GetArgs, PutArgs, VdiskCli};
use crate::{mkfs::mkfs, mount::mount};

/// run one subcommand; listings and file contents go to `out`
pub fn run<W: Write>(cli: VdiskCli, out: &mut W) -> anyhow::Result<()> {
    match cli {
        VdiskCli::Mkfs(args) => mkfs(args.image_file_path)?,
        VdiskCli::Info(args) => {
            let volume = mount(&args.image_file_path)?;
            let superblock = volume.superblock();
            let stats = volume.stats();
            if let Some(path) = volume.device().path() {
                writeln!(out, "image:            {}", path.display())?;
            }
            writeln!(out, "directory offset: {}", superblock.directory_offset)?;
            writeln!(out, "table offset:     {}", superblock.table_offset)?;
            writeln!(out, "data offset:      {}", superblock.data_offset)?;
            writeln!(out, "files:            {}/{}", stats.file_count, stats.max_files)?;
            writeln!(
                out,
                "free blocks:      {}/{} ({})",
                stats.free_blocks,
                stats.data_blocks,
                Byte::from_bytes(stats.free_bytes() as _).get_appropriate_unit(true)
            )?;
            volume.unmount()?;
        }
        VdiskCli::Ls(args) => {
            let volume = mount(&args.image_file_path)?;
            for file in volume.list() {
                writeln!(
                    out,
                    "{:<15} {:>8} {}..={}",
                    file.name, file.size, file.start_block, file.end_block
                )?;
            }
            volume.unmount()?;
        }
        VdiskCli::Put(args) => put(args)?,
        VdiskCli::Get(args) => get(args, out)?,
        VdiskCli::Rm(args) => {
            let mut volume = mount(&args.image_file_path)?;
            volume
                .delete(&args.name)
                .with_context(|| format!("failed to delete {:?}", args.name))?;
            volume.unmount()?;
        }
    }
    Ok(())
}

fn put(args: PutArgs) -> anyhow::Result<()> {
    let name = match args.name {
        Some(name) => name,
        None => Path::new(&args.source)
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_owned)
            .ok_or_else(|| anyhow!("cannot derive a file name from {:?}", args.source))?,
    };
    let data =
        std::fs::read(&args.source).with_context(|| format!("failed to read {}", args.source))?;

    let mut volume = mount(&args.image_file_path)?;
    if volume.exists(&name) {
        volume.delete(&name)?;
    }
    volume
        .create(&name)
        .with_context(|| format!("failed to create {name:?}"))?;
    let fd = volume.open(&name)?;
    if let Err(e) = volume.write(fd, &data) {
        // leave no half written file behind
        volume.close(fd)?;
        volume.delete(&name)?;
        volume.unmount()?;
        return Err(e).with_context(|| format!("failed to write {name:?}"));
    }
    volume.close(fd)?;
    volume.unmount()?;
    info!("stored {} as {name:?}, {} byte(s)", args.source, data.len());
    Ok(())
}

fn get<W: Write>(args: GetArgs, out: &mut W) -> anyhow::Result<()> {
    let mut volume = mount(&args.image_file_path)?;
    let fd = volume
        .open(&args.name)
        .with_context(|| format!("failed to open {:?}", args.name))?;
    let size = volume.get_size(fd)?;
    let data = volume.read(fd, size as usize)?;
    volume.close(fd)?;
    volume.unmount()?;

    match args.output {
        Some(output) => {
            std::fs::write(&output, &data).with_context(|| format!("failed to write {output}"))?
        }
        None => out.write_all(&data)?,
    }
    Ok(())
}
