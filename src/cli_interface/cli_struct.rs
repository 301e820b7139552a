use clap::Parser;

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum VdiskCli {
    /// create a new, empty volume image
    Mkfs(ImageArgs),
    /// print the superblock and usage counters of a volume
    Info(ImageArgs),
    /// list the files stored in a volume
    Ls(ImageArgs),
    /// copy a host file into a volume
    Put(PutArgs),
    /// copy a file out of a volume
    Get(GetArgs),
    /// delete a file from a volume
    Rm(RmArgs),
}

/// subcommands that only need the image
#[derive(clap::Args, Debug, PartialEq)]
pub struct ImageArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
}

#[derive(clap::Args, Debug, PartialEq)]
#[command(about = "copy a host file into a volume")]
pub struct PutArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the host file to copy
    #[clap(short, long)]
    pub source: String,
    /// the name inside the volume, defaults to the source file name
    #[clap(short, long)]
    pub name: Option<String>,
}

#[derive(clap::Args, Debug, PartialEq)]
#[command(about = "copy a file out of a volume")]
pub struct GetArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the name inside the volume
    #[clap(short, long)]
    pub name: String,
    /// where to write the content, stdout if omitted
    #[clap(short, long)]
    pub output: Option<String>,
}

#[derive(clap::Args, Debug, PartialEq)]
#[command(about = "delete a file from a volume")]
pub struct RmArgs {
    /// the path of the volume image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the name inside the volume
    #[clap(short, long)]
    pub name: String,
}
