//! Command line driver.
//!
//! Usage:
//!   `cilverify verify <file.il> [--arg <type>]... [--returns <type>] [--instance-of <type>]`
//!   `cilverify decode <file.bin>`
//!
//! Set `RUST_LOG=cilverify=debug` to see each accepted instruction.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use cilverify::bytecode::{assemble, disassemble, BytecodeWriter};
use cilverify::symboltable::SymbolTable;
use cilverify::types::{Environment, MethodInfo, TypeInfo, TypeRef, BUILTINS};
use cilverify::verifier::{MethodDescriptor, Verifier, DEFAULT_MAX_STACK};

#[derive(Parser, Debug)]
#[command(name = "cilverify")]
#[command(about = "Assemble, verify and decode CIL method bodies")]
struct Args {
  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Assemble and verify a method body, then print the bytes it encodes to
  Verify {
    /// Assembly source
    file: PathBuf,

    /// Parameter type, once per parameter in order
    #[arg(long = "arg", value_name = "TYPE")]
    args: Vec<String>,

    /// Return type; the method returns nothing if omitted
    #[arg(long, value_name = "TYPE")]
    returns: Option<String>,

    /// Make the method an instance method of this type
    #[arg(long, value_name = "TYPE")]
    instance_of: Option<String>,

    /// Maximum evaluation stack depth
    #[arg(long, default_value_t = DEFAULT_MAX_STACK)]
    max_stack: usize,

    /// The method's locals are not zero-initialized
    #[arg(long)]
    no_locals_init: bool,
  },

  /// Print the instructions in a raw bytecode file
  Decode {
    file: PathBuf,
  },
}

fn init_logging() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
  fmt().with_env_filter(filter).with_target(false).init();
}

fn resolve(environment: &Environment, name: &str) -> anyhow::Result<TypeRef> {
  environment.type_named(name).ok_or_else(|| anyhow!("unknown type {}", name))
}

fn verify(
  file           : PathBuf,
  args           : Vec<String>,
  returns        : Option<String>,
  instance_of    : Option<String>,
  max_stack      : usize,
  no_locals_init : bool
) -> anyhow::Result<()>
{
  let text = fs::read_to_string(&file).with_context(|| format!("reading {}", file.display()))?;
  let environment = Environment::new();

  let parameters =
    args.iter()
        .map(|name| resolve(&environment, name))
        .collect::<anyhow::Result<Vec<TypeRef>>>()?;
  let return_type = returns.as_deref().map(|name| resolve(&environment, name)).transpose()?;
  let (owner, is_static) =
    match instance_of {
      Some(name) => (resolve(&environment, &name)?, false),
      None       => (TypeInfo::class("Program", Some(BUILTINS.object.clone())), true)
    };
  let method = Arc::new(MethodInfo::new(&owner, "Main", parameters, return_type, is_static));
  info!(%method, "verifying {}", file.display());

  let descriptor =
    MethodDescriptor::new(method)
      .with_max_stack(max_stack)
      .with_locals_zeroed(!no_locals_init);
  let mut verifier = Verifier::new(descriptor, BytecodeWriter::new(SymbolTable::new()));

  if let Err(e) = assemble(&text, &environment, &mut verifier) {
    warn!("rejected {}", file.display());
    println!("{}", verifier);
    return Err(e.into());
  }

  let writer = verifier.into_inner();
  print!("{}", disassemble(writer.bytes())?);
  for (token, symbol) in writer.tokens().entries() {
    println!("  {} = {}", token, symbol);
  }
  Ok(())
}

fn decode(file: PathBuf) -> anyhow::Result<()> {
  let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
  print!("{}", disassemble(&bytes)?);
  Ok(())
}

fn main() {
  init_logging();

  let result =
    match Args::parse().command {
      Command::Verify { file, args, returns, instance_of, max_stack, no_locals_init } => {
        verify(file, args, returns, instance_of, max_stack, no_locals_init)
      }
      Command::Decode { file } => decode(file)
    };

  if let Err(e) = result {
    eprintln!("error: {:#}", e);
    process::exit(1);
  }
}
