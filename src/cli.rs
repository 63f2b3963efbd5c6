use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "blockyail",
    about = "Compile App Inventor block documents (.bky) and projects (.aia) to Yail."
)]
pub struct Args {
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Output `.yail` file, or the output directory for `.aia` input.
    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "OLD=NEW",
        help = "Rename a procedure and all of its callers before generating. Repeatable."
    )]
    pub rename_procedure: Vec<String>,

    #[arg(
        long,
        value_name = "PATH",
        help = "Write the (renamed) blocks back out: a .bky for .bky input, a .aia for .aia input."
    )]
    pub emit_blocks: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Write diagnostics as JSON to this path.")]
    pub diagnostics_json: Option<PathBuf>,

    #[arg(long, help = "Do not report top-level blocks outside any definition.")]
    pub no_orphan_warnings: bool,

    #[arg(long, help = "Exit with an error when any error diagnostic is reported.")]
    pub strict: bool,

    #[arg(short, long, help = "Enable debug logging.")]
    pub verbose: bool,
}
