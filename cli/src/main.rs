use std::path::PathBuf;

use log::LevelFilter;
use structopt::StructOpt;

mod commands;

pub const FAILURE: i32 = 1;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "blastmail",
    about = "Send templated emails to a spreadsheet of recipients through BlastEngine."
)]
struct Opt {
    /// Verbose output (-v, -vv)
    #[structopt(short, long, parse(from_occurrences), global = true)]
    verbose: u8,

    /// Load environment from this file instead of ./.env
    #[structopt(long, parse(from_os_str), global = true)]
    env_file: Option<PathBuf>,

    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Convert a plain-text template (or a directory of them) into HTML templates
    Txt2html {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
    },

    /// Check a send list without sending anything
    Check {
        #[structopt(parse(from_os_str))]
        file: PathBuf,

        #[structopt(flatten)]
        list: commands::ListOpt,
    },

    /// Send emails to every row of a send list
    Send {
        #[structopt(parse(from_os_str))]
        file: PathBuf,

        #[structopt(flatten)]
        list: commands::ListOpt,

        /// Validate only (default)
        #[structopt(long)]
        dryrun: bool,

        /// Actually submit to BlastEngine
        #[structopt(long)]
        no_dryrun: bool,

        /// Do not ask for confirmation
        #[structopt(short, long)]
        yes: bool,
    },

    /// Fetch delivery results for a run log and write a report
    Results {
        #[structopt(parse(from_os_str))]
        logfile: PathBuf,

        /// Output directory
        #[structopt(long, parse(from_os_str), default_value = "result")]
        out: PathBuf,
    },

    /// Print the loaded settings
    Env,
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    env_logger::builder()
        .format_timestamp_micros()
        .filter_level(level)
        .parse_default_env()
        .init();
}

async fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    blastmail::config::load_env_file(opt.env_file.as_deref())?;

    match opt.cmd {
        Command::Txt2html { path } => commands::txt2html(&path),
        Command::Check { file, list } => commands::check(&file, &list),
        Command::Send {
            file,
            list,
            dryrun,
            no_dryrun,
            yes,
        } => {
            if dryrun && no_dryrun {
                return Err("--dryrun and --no-dryrun are mutually exclusive".into());
            }
            commands::send(&file, &list, !no_dryrun, yes).await
        }
        Command::Results { logfile, out } => commands::results(&logfile, &out).await,
        Command::Env => commands::env(),
    }
}

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();

    init_logger(opt.verbose);

    if let Err(e) = run(opt).await {
        log::error!("{}", e);
        std::process::exit(FAILURE);
    }
}
