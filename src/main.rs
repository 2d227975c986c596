use bfc_bytecode::{
    compile_native, compress, execute, generate_c, load, load_str, CCompiler, Error, RawProgram,
};
use clap::Parser;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "bfc-bytecode", version)]
#[command(about = "Run a BF program, or compile it to a native executable through C")]
struct Cli {
    /// Read the program from this argument
    #[arg(short = 'c', value_name = "CODE", conflicts_with = "file")]
    code: Option<String>,

    /// Read the program from this file (default: stdin)
    #[arg(short = 'f', value_name = "FILE")]
    file: Option<PathBuf>,

    /// Compile with a C compiler, using C as the intermediate language
    #[arg(short = 'g', conflicts_with = "emit_c")]
    native: bool,

    /// Write the generated C source instead of running the program
    #[arg(long)]
    emit_c: bool,

    /// Print the compressed bytecode to stderr before doing anything else
    #[arg(long)]
    dump_bytecode: bool,

    /// Write to this file instead of stdout. With -g, the executable
    /// path (default: a.out)
    #[arg(short = 'o', value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// C compiler used by -g
    #[arg(long, env = "CC", default_value = "gcc")]
    cc: String,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // stdout belongs to the BF program.
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(&cli) {
        eprintln!("{}", e.render());
        process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let program = load_program(cli)?;
    let bytecode = compress(program);

    if cli.dump_bytecode {
        eprintln!("{}", bytecode);
    }

    if cli.native {
        let artifact = cli
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from("a.out"));
        compile_native(&bytecode, &CCompiler::new(cli.cc.as_str()), &artifact)
    } else if cli.emit_c {
        let mut sink = open_output(cli.output.as_deref())?;
        sink.write_all(generate_c(&bytecode).as_bytes())
            .and_then(|_| sink.flush())
            .map_err(Error::OutputUnavailable)
    } else {
        let sink = open_output(cli.output.as_deref())?;
        let stdin = io::stdin();
        execute(&bytecode, stdin.lock(), sink).map(|_| ())
    }
}

fn load_program(cli: &Cli) -> Result<RawProgram, Error> {
    match (&cli.code, &cli.file) {
        (Some(code), _) => load_str(code),
        (None, Some(path)) => {
            info!(path = %path.display(), "loading program");
            let file = File::open(path).map_err(Error::InputUnavailable)?;
            load(file)
        }
        (None, None) => {
            let stdin = io::stdin();
            load(stdin.lock())
        }
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, Error> {
    match path {
        Some(path) => {
            let file = File::create(path).map_err(Error::OutputUnavailable)?;
            Ok(Box::new(file))
        }
        None => Ok(Box::new(io::stdout())),
    }
}
