use clap::{Parser, Subcommand};
use rporth::codegen::{CodeGenerator, Target};
use rporth::config::Config;
use rporth::loader;
use rporth::program::Program;
use rporth::toolchain::{SystemRunner, Toolchain};
use rporth::vm::VirtualMachine;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser, Debug)]
#[command(name = "rporth")]
#[command(about = "Simulate or compile a stack-language program")]
struct Cli {
    /// Path to a TOML config file (defaults to ./rporth.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Simulate the program
    Sim {
        /// Source file
        file: PathBuf,
    },
    /// Compile the program to a native executable
    Com {
        /// Source file
        file: PathBuf,

        /// Target platform, overriding the config file
        #[arg(long, value_enum)]
        target: Option<Target>,

        /// Base path for generated files, overriding the config file
        #[arg(short, long)]
        output: Option<String>,

        /// Only write the assembly; do not run the assembler or linker
        #[arg(long)]
        no_build: bool,
    },
}

/// Loads the program or exits with a diagnostic naming the file.
fn load_or_exit(path: &Path) -> Program {
    match loader::load(path) {
        Ok(program) => program,
        Err(loader::LoadError::Token {
            line,
            column,
            source,
        }) => {
            log::error!("{}:{}:{}: {}", path.display(), line, column, source);
            process::exit(1);
        }
        Err(e) => {
            log::error!("{}", e);
            process::exit(1);
        }
    }
}

/// Rejects a program that would pop an empty stack before anything runs, so
/// neither backend starts producing output it cannot finish.
fn check_depth_or_exit(file: &Path, program: &Program) {
    match program.check_stack_depth() {
        Ok(max_depth) => log::debug!("Maximum stack depth: {}", max_depth),
        Err(e) => {
            log::error!("{}: {}", file.display(), e);
            process::exit(1);
        }
    }
}

fn simulate(config: &Config, file: &Path) {
    let program = load_or_exit(file);
    check_depth_or_exit(file, &program);

    let mut vm = VirtualMachine::with_capacity(config.simulator.max_stack_depth);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    if let Err(e) = vm.execute(&program, &mut out) {
        drop(out);
        log::error!("{}: {}", file.display(), e);
        process::exit(1);
    }
}

fn compile(config: &Config, file: &Path, build: bool) {
    let program = load_or_exit(file);
    check_depth_or_exit(file, &program);

    let target = config.compiler.target;
    let output = Path::new(&config.compiler.output);
    let toolchain = Toolchain::for_target(target, output, &config.toolchain);
    let generator = CodeGenerator::new(target);
    if let Err(e) = generator.write_module(&program, toolchain.assembly()) {
        log::error!("{}", e);
        process::exit(1);
    }

    if !build {
        return;
    }

    if let Err(e) = toolchain.build(&mut SystemRunner) {
        log::error!("{}", e);
        process::exit(1);
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match Config::discover(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            log::error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    // Command-line overrides go through the same validation as the file.
    if let Command::Com { target, output, .. } = &cli.command {
        if let Some(target) = target {
            config.compiler.target = *target;
        }
        if let Some(output) = output {
            config.compiler.output = output.clone();
        }
    }

    if let Err(e) = config.validate() {
        log::error!("{}", e);
        process::exit(1);
    }

    match cli.command {
        Command::Sim { file } => simulate(&config, &file),
        Command::Com { file, no_build, .. } => compile(&config, &file, !no_build),
    }
}
