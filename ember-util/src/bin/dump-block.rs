//! `dump-block`: reads a raw serialized block from a file and prints it as
//! JSON, for inspecting blocks pulled off the wire or out of a store dump
//! without spinning up a full node.

use std::{fs::File, path::PathBuf};

use color_eyre::eyre::{Result, WrapErr};
use ember_chain::{block::Block, BitcoinDeserialize};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "dump-block",
    about = "Decode a raw serialized Bitcoin block and print it as JSON"
)]
struct Args {
    /// Path to a file containing exactly one serialized block.
    #[structopt(parse(from_os_str))]
    block_file: PathBuf,

    /// Pretty-print the JSON output.
    #[structopt(short, long)]
    pretty: bool,
}

fn main() -> Result<()> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_writer(std::io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
    color_eyre::install()?;

    let args = Args::from_args();

    let file = File::open(&args.block_file)
        .wrap_err_with(|| format!("failed to open {}", args.block_file.display()))?;
    let block = Block::bitcoin_deserialize(file)
        .wrap_err_with(|| format!("failed to parse a block from {}", args.block_file.display()))?;

    let json = if args.pretty {
        serde_json::to_string_pretty(&block)
    } else {
        serde_json::to_string(&block)
    }
    .wrap_err("failed to serialize the decoded block as JSON")?;

    println!("{}", json);
    Ok(())
}
