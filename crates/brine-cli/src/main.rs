//! The brine launcher: file runner, inline runner, and REPL.

use std::{
    env, fs,
    io::{self, BufRead, Read, Write},
    process::ExitCode,
};

use brine::{ReplError, ReplSession, RunError, run_source};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();

    match arg_refs.as_slice() {
        [] => repl(ReplSession::new()),
        ["-i"] => {
            let mut source = String::new();
            if io::stdin().read_to_string(&mut source).is_err() {
                eprintln!("error: could not read standard input");
                return ExitCode::FAILURE;
            }
            run_program(&source)
        }
        ["-c", rest @ ..] if !rest.is_empty() => run_program(&rest.join(" ")),
        ["-r", path] => match read_file(path) {
            Ok(source) => match run_source(&source) {
                Ok(state) => repl(ReplSession::with_state(state)),
                Err(err) => report_failure(&err),
            },
            Err(message) => {
                eprintln!("error: {message}");
                ExitCode::FAILURE
            }
        },
        [path] if !path.starts_with('-') => match read_file(path) {
            Ok(source) => run_program(&source),
            Err(message) => {
                eprintln!("error: {message}");
                ExitCode::FAILURE
            }
        },
        _ => {
            usage();
            ExitCode::FAILURE
        }
    }
}

fn usage() {
    eprintln!("Invalid arguments. Valid execution modes:");
    eprintln!("brine : open the REPL");
    eprintln!("brine path/to/file : run a program from a file");
    eprintln!("brine -r path/to/file : run a program from a file and open the REPL");
    eprintln!("brine -c 'program' : run a program specified in the arguments after -c");
    eprintln!("brine -i : run a program read from the standard input");
}

fn read_file(path: &str) -> Result<String, String> {
    fs::read_to_string(path).map_err(|err| format!("could not read {path}: {err}"))
}

fn run_program(source: &str) -> ExitCode {
    match run_source(source) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

fn report_failure(err: &RunError) -> ExitCode {
    eprintln!("{}", err.diagnostic());
    ExitCode::FAILURE
}

fn repl(mut session: ReplSession) -> ExitCode {
    let stdin = io::stdin();
    let mut pending = String::new();

    loop {
        let prompt = if pending.is_empty() { ">>> " } else { "... " };
        print!("{prompt}");
        let _ = io::stdout().flush();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => {
                println!();
                break;
            }
            Ok(_) => {}
        }

        if pending.is_empty() && line.trim() == "quit!" {
            println!("Bye for now.");
            break;
        }

        pending.push_str(&line);
        match session.execute(&pending) {
            Ok(()) => pending.clear(),
            Err(ReplError::Incomplete) => {}
            Err(ReplError::Parse(err)) => {
                eprintln!("{err}");
                pending.clear();
            }
            Err(ReplError::Run(err)) => {
                eprintln!("{}", err.diagnostic());
                pending.clear();
            }
        }
    }
    ExitCode::SUCCESS
}
