use std::io::{self, Read};
use std::process::ExitCode;

use torque_script::{Interpreter, InterpreterConfig, NullPlatformContext, TorqueError};

fn main() -> ExitCode {
    if std::env::args().any(|a| a == "--help") {
        println!("torque-script: reads a TorqueScript program from stdin, compiles, disassembles, and runs it.");
        return ExitCode::SUCCESS;
    }

    let mut source = String::new();
    if let Err(err) = io::stdin().read_to_string(&mut source) {
        eprintln!("error reading stdin: {err}");
        return ExitCode::FAILURE;
    }

    let mut interp = Interpreter::new(InterpreterConfig::default(), Box::new(NullPlatformContext));

    let code = match interp.compile(&source) {
        Ok(code) => code,
        Err(TorqueError::Parse(err)) => {
            for message in &err.messages {
                eprintln!("{message}");
            }
            return ExitCode::FAILURE;
        }
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    print!("{}", interp.disassemble_code(&code));

    match interp.execute(&code) {
        Ok(value) => {
            println!("=> {}", value.to_torque_string());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
