use clap::Parser;
use vdiskfs::cli_interface::{run, VdiskCli};
/// a CLI interface to users to create a volume image,
/// inspect it, and copy files in and out of it.
///
/// Every subcommand mounts the image, does its work and unmounts again.
fn main() -> anyhow::Result<()> {
    env_logger::builder().format_timestamp_nanos().init();
    let args = VdiskCli::parse();
    run(args, &mut std::io::stdout().lock())
}
