use std::fs;
use std::io::{self, stderr, Write};
use std::process::ExitCode;

use clap::Parser;

use crossterm::{
    style::{Color, Print, ResetColor, SetForegroundColor},
    tty::IsTty,
    ExecutableCommand,
};

use dbn::cli::Cli;
use dbn::compiler::listing;
use dbn::{Error, Interpreter};

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_error(&error, cli.no_color);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let code = dbn::compile_file(&cli.file)?;

    if cli.compile {
        print!("{}", listing(&code, cli.numbers));
        return Ok(());
    }

    let mut vm = Interpreter::new(code);
    if cli.trace {
        let stdout = io::stdout();
        vm.run_traced(&mut stdout.lock())?;
    } else {
        vm.run()?;
    }

    fs::write(cli.output_path(), vm.canvas().to_bmp())?;
    Ok(())
}

/// Prints the error in red when stderr is a tty and color is allowed
fn report_error(error: &Error, no_color: bool) {
    let mut err = stderr();
    if !no_color && err.is_tty() {
        let _ = err
            .execute(SetForegroundColor(Color::Red))
            .and_then(|e| e.execute(Print(format!("{error}\n"))))
            .and_then(|e| e.execute(ResetColor));
    } else {
        let _ = writeln!(err, "{error}");
    }
}
