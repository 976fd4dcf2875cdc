use std::process::ExitCode;

use clap::Parser;

mod ansi;
mod args;
mod commands;
mod context;
mod error;
mod log;
mod output;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = args::Args::parse();

    if let Err(err) = log::launch(&args.logging()) {
        eprintln!("Error: could not set up logging: {err}");
        return ExitCode::FAILURE;
    }

    match args.execute().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}Error:{} {err}", ansi::RED, ansi::RESET);
            err.exit_code()
        }
    }
}

#[macro_export]
macro_rules! println {
    ($($t:tt)*) => {{
        #[allow(clippy::disallowed_macros)]
        let x = anstream::println!($($t)*);
        x
    }};
}

#[macro_export]
macro_rules! eprintln {
    ($($t:tt)*) => {{
        #[allow(clippy::disallowed_macros)]
        let x = anstream::eprintln!($($t)*);
        x
    }};
}

#[macro_export]
macro_rules! print {
    ($($t:tt)*) => {{
        #[allow(clippy::disallowed_macros)]
        let x = anstream::print!($($t)*);
        x
    }};
}
