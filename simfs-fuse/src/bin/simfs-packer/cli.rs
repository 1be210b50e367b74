use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
pub struct Cli {
    /// Host directory whose regular files are packed into the volume
    #[arg(long, short)]
    pub source: PathBuf,

    /// Output directory for the volume image
    #[arg(long, short = 'O')]
    pub out_dir: PathBuf,
}
