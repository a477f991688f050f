//! The command-line interface to the resolver.
//!
//! Reads hex-encoded bytecode from standard input, and prints either a listing
//! of the disassembled program or the resolved calls and storage writes.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use evm_call_resolver::{
    extractor::contract::{CodeLayout, Contract},
    program::Program,
    resolver,
    Phases,
};
use tracing::warn;

#[derive(Debug, Parser)]
#[command(name = "evm-call-resolver", version, about)]
struct Args {
    /// Keep the Swarm metadata trailer that solc appends to the bytecode,
    /// rather than removing it before analysis.
    #[arg(long)]
    keep_metadata: bool,

    /// The bytecode includes the constructor, which is analyzed separately
    /// from the runtime code.
    #[arg(long)]
    ctor: bool,

    /// Print logging output to stderr.
    #[arg(long)]
    log: bool,

    /// Print the resolved calls and storage writes instead of the listing.
    #[arg(long)]
    calls: bool,

    /// Print call records as JSON.
    #[arg(long)]
    json: bool,

    /// Print the Swarm hash if one is found.
    #[arg(long)]
    print_swarm: bool,

    /// The maximum depth of each backward trace.
    #[arg(long, default_value_t = resolver::Config::default().maximum_trace_depth)]
    max_trace_depth: usize,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.log {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"));
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("Could not read from stdin")?;

    let layout = if args.ctor {
        CodeLayout::WithConstructor
    } else {
        CodeLayout::RuntimeOnly
    };
    let contract = Contract::from_hex(&input, layout)
        .context("Could not decode bytecode")?
        .with_strip_metadata(!args.keep_metadata);

    if args.print_swarm {
        if let Some(metadata) = contract.swarm_metadata() {
            if args.json {
                let record = serde_json::json!({ "swarmHash": metadata.to_string() });
                println!("{record}");
            } else {
                println!("{metadata}");
            }
        }
    }

    let config = resolver::Config::default().with_maximum_trace_depth(args.max_trace_depth);
    let extractor = evm_call_resolver::new(contract, config)
        .disassemble()
        .context("Could not disassemble bytecode")?;
    let phases = if args.calls {
        extractor.resolve().phases().clone()
    } else {
        extractor.phases().clone()
    };

    match &phases {
        Phases::Runtime(program) => print_program(program, &args)?,
        Phases::Split {
            constructor,
            runtime,
        } => {
            println!("// # Constructor part -------------------------");
            print_program(constructor, &args)?;
            println!("// # Code part -------------------------");
            print_program(runtime, &args)?;
        }
    }

    Ok(())
}

fn print_program(program: &Program, args: &Args) -> Result<()> {
    if !args.calls {
        if args.json {
            warn!("JSON output is only supported with --calls");
        }
        print!("{program}");
        return Ok(());
    }

    for instruction in program.instructions() {
        if let Some(store) = &instruction.annotations.store {
            if !args.json {
                println!("{store}");
            }
        }
        if let Some(call) = &instruction.annotations.call {
            if args.json {
                println!("{}", serde_json::to_string(&call.to_output())?);
            } else {
                println!("{call}");
            }
        }
    }

    Ok(())
}
