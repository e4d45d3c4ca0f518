//! Local driver for the selection engine. Not part of spec §6's HTTP
//! surface -- this is a thin CLI front end in the teacher's
//! `structopt` + `env_logger` style, the natural way to exercise a
//! core library from the command line the way `music2bin`'s binary
//! drives its own encode/decode core.

use env_logger::Env;
use log::info;
use mei_select::error::Error;
use mei_select::{self, DocInfoSummary, MeiTree, ResponseKind};
use std::fs;
use std::path::PathBuf;
use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "mode")]
enum Mode {
    /// Print the document's measure/staff/meter inventory instead of
    /// slicing (spec §6's `info.json`, rendered as plain text here).
    #[structopt(name = "info")]
    Info,
}

#[derive(Debug, Clone, StructOpt)]
#[structopt(
    name = "mei-select",
    about = "Selects a musical-notation address (measures/staves/beats) out of an MEI document."
)]
struct CliOpts {
    #[structopt(short = "i", long = "input", parse(from_os_str))]
    input: PathBuf,

    #[structopt(short = "o", long = "output", parse(from_os_str))]
    output: Option<PathBuf>,

    #[structopt(short = "m", long = "measures", default_value = "all")]
    measures: String,

    #[structopt(short = "s", long = "staves", default_value = "all")]
    staves: String,

    #[structopt(short = "b", long = "beats", default_value = "@all")]
    beats: String,

    /// Comma-separated subset of `raw,signature,nospace,cut`, or the
    /// literal `compile` to print the canonical expression instead of
    /// slicing (spec §6).
    #[structopt(short = "c", long = "completeness")]
    completeness: Option<String>,

    #[structopt(subcommand)]
    mode: Option<Mode>,
}

fn main() -> Result<(), Error> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli_opt = CliOpts::from_args();
    let bytes = fs::read(&cli_opt.input)?;
    let tree = MeiTree::parse(&bytes)?;
    let doc_info = mei_select::compute_doc_info(&tree)?;

    match cli_opt.mode {
        Some(Mode::Info) => {
            print_info(&doc_info);
            return Ok(());
        }
        None => {}
    }

    info!(
        "selecting {}/{}/{} ({})",
        cli_opt.measures,
        cli_opt.staves,
        cli_opt.beats,
        cli_opt.completeness.as_deref().unwrap_or("<none>")
    );

    let response = mei_select::handle_address(
        tree,
        &bytes,
        &doc_info,
        &cli_opt.measures,
        &cli_opt.staves,
        &cli_opt.beats,
        cli_opt.completeness.as_deref(),
    )?;

    match response {
        ResponseKind::Mei(bytes) => match cli_opt.output {
            Some(path) => fs::write(path, bytes)?,
            None => {
                let text = String::from_utf8_lossy(&bytes);
                println!("{text}");
            }
        },
        ResponseKind::Compiled(expr) => println!("{expr}"),
    }

    Ok(())
}

fn print_info(info: &mei_select::DocInfo) {
    let summary = DocInfoSummary::from(info);
    println!("measures: {}", summary.measures);
    println!("measure_labels: {:?}", summary.measure_labels);
    println!("staves:");
    for (k, v) in &summary.staves {
        println!("  {k}: {v:?}");
    }
    println!("beats:");
    for (k, v) in &summary.beats {
        println!("  {k}: {{count: {}, unit: {}}}", v.count, v.unit);
    }
    println!("completeness options: {:?}", summary.completeness);
}
