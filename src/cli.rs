//! Command-line interface for the `dbn` binary
//!
//! This module holds the argument surface and the small helpers the binary
//! uses; the binary itself lives in `src/bin/dbn.rs`.

use std::path::PathBuf;

use clap::Parser;

/// Command-line arguments for dbn
#[derive(Parser, Debug)]
#[command(name = "dbn")]
#[command(about = "A Design By Numbers compiler and bytecode virtual machine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// DBN source file
    pub file: PathBuf,

    /// Print the assembled bytecode instead of running it
    #[arg(short = 'c', long = "compile")]
    pub compile: bool,

    /// Show numeric opcodes in the bytecode listing
    #[arg(short = 'n', long = "numbers")]
    pub numbers: bool,

    /// Output image path (defaults to the source file with a .bmp extension)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Trace each instruction as it executes
    #[arg(short = 't', long = "trace")]
    pub trace: bool,

    /// Disable color output
    #[arg(long = "no-color")]
    pub no_color: bool,
}

impl Cli {
    /// Where the rendered image goes
    pub fn output_path(&self) -> PathBuf {
        match &self.output {
            Some(path) => path.clone(),
            None => self.file.with_extension("bmp"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["dbn", "sketch.dbn"]).unwrap();
        assert!(!cli.compile);
        assert!(!cli.trace);
        assert!(!cli.numbers);
        assert_eq!(cli.output_path(), PathBuf::from("sketch.bmp"));
    }

    #[test]
    fn explicit_output_wins() {
        let cli = Cli::try_parse_from(["dbn", "-o", "art/out.bmp", "sketch.dbn"]).unwrap();
        assert_eq!(cli.output_path(), PathBuf::from("art/out.bmp"));
    }

    #[test]
    fn compile_and_numbers_flags() {
        let cli = Cli::try_parse_from(["dbn", "-c", "-n", "sketch.dbn"]).unwrap();
        assert!(cli.compile);
        assert!(cli.numbers);
    }

    #[test]
    fn a_source_file_is_required() {
        assert!(Cli::try_parse_from(["dbn"]).is_err());
    }
}
