//! Weft CLI: flatten wiring configurations to their element graph.
//!
//! The compiler core treats primitive element classes as opaque, so the
//! tool takes the class vocabulary on the command line:
//!
//! ```text
//! weft flatten router.weft --class Source --class Queue --class Sink
//! ```

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use weft::dsl::{CompileErrors, Compiler};
use weft::graph::OpaqueClass;

#[derive(Parser)]
#[command(
    name = "weft",
    about = "Compiler for the Weft element-graph wiring language"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten a source file and print the element graph
    Flatten {
        /// Path to a .weft source file
        file: PathBuf,
        /// Primitive element class to predefine (repeatable)
        #[arg(short, long = "class", value_name = "NAME")]
        classes: Vec<String>,
        /// Emit the graph as JSON instead of Weft syntax
        #[arg(long)]
        json: bool,
    },
    /// Parse a source file and report diagnostics only
    Check {
        /// Path to a .weft source file
        file: PathBuf,
        /// Primitive element class to predefine (repeatable)
        #[arg(short, long = "class", value_name = "NAME")]
        classes: Vec<String>,
    },
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default()).init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("weft: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> io::Result<ExitCode> {
    match cli.command {
        Commands::Flatten {
            file,
            classes,
            json,
        } => {
            let source = std::fs::read_to_string(&file)?;
            let mut compiler = build_compiler(&classes);
            match compiler.compile(&source, &file.display().to_string()) {
                Ok(graph) => {
                    if json {
                        let out = serde_json::to_string_pretty(&graph).map_err(io::Error::other)?;
                        println!("{out}");
                    } else {
                        print!("{graph}");
                    }
                    Ok(ExitCode::SUCCESS)
                }
                Err(errors) => {
                    report(&errors);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Check { file, classes } => {
            let source = std::fs::read_to_string(&file)?;
            let mut compiler = build_compiler(&classes);
            match compiler.compile(&source, &file.display().to_string()) {
                Ok(_) => {
                    eprintln!("{}: ok", file.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(errors) => {
                    report(&errors);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn build_compiler(classes: &[String]) -> Compiler {
    let mut compiler = Compiler::new();
    for name in classes {
        compiler.add_primitive(Box::new(OpaqueClass::new(name)));
    }
    compiler
}

fn report(errors: &CompileErrors) {
    for diagnostic in &errors.diagnostics {
        eprintln!("{diagnostic}");
    }
    eprintln!("weft: {}", errors);
}
