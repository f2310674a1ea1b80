use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wsvm::{decode, load, Vm, VmConfig};

fn args() -> ArgMatches {
    Command::new("wsvm")
        .about("a lightweight whitespace interpreter")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .required(true)
                .help("whitespace source file to interpret"),
        )
        .arg(
            Arg::new("ir")
                .short('i')
                .long("ir")
                .action(ArgAction::SetTrue)
                .help("prints the decoded instructions instead of running them"),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("traces the machine state before each executed instruction"),
        )
        .arg(
            Arg::new("debug-heap")
                .short('m')
                .long("debug-heap")
                .action(ArgAction::SetTrue)
                .help("traces a heap dump before each executed instruction"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("suppresses all output other than what the whitespace program is producing"),
        )
        .get_matches()
}

/// Logs go to stderr so they never interleave with what the program prints. `RUST_LOG` overrides
/// the filter derived from the flags.
fn init_logging(quiet: bool, debug: bool) {
    let default = if debug {
        "wsvm=trace"
    } else if quiet {
        "wsvm=warn"
    } else {
        "wsvm=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = args();
    let file_name = args
        .get_one::<String>("file")
        .context("missing source file")?;
    let ir = args.get_flag("ir");
    let debug_heap = args.get_flag("debug-heap");
    let debug = args.get_flag("debug") || debug_heap;
    let quiet = args.get_flag("quiet");
    init_logging(quiet, debug);

    info!("loading and decoding {}", file_name);
    let start = Instant::now();
    let symbols = load(file_name)?;
    let program = decode(&symbols).with_context(|| format!("failed to decode {}", file_name))?;
    let elapsed = start.elapsed();
    info!(
        instructions = program.len(),
        labels = program.labels().len(),
        "decoded in {} ms ({} ns)",
        elapsed.as_millis(),
        elapsed.as_nanos()
    );

    if ir {
        for (index, instruction) in program.instructions().iter().enumerate() {
            println!("{}: {}", index, instruction);
        }

        return Ok(());
    }

    let config = VmConfig::new(debug, debug_heap, false);
    let mut vm = Vm::stdio(program, config);
    info!("starting to execute whitespace routine");
    let start = Instant::now();
    vm.run()
        .with_context(|| format!("failed to execute {}", file_name))?;
    let elapsed = start.elapsed();
    info!(
        "routine took {} ms ({} ns)",
        elapsed.as_millis(),
        elapsed.as_nanos()
    );

    Ok(())
}
