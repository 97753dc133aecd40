use std::path::Path;

use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use structopt::StructOpt;

use blastmail::blastengine::BlastEngineClient;
use blastmail::config::Settings;
use blastmail::delivery::{self, Delivery, Layout};
use blastmail::pipeline::{self, Mode};
use blastmail::runlog::RunLog;
use blastmail::template::Templates;
use blastmail::{report, sheet, txt2html};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Options shared by commands that read a send list
#[derive(Debug, StructOpt)]
pub struct ListOpt {
    /// Sheet to read (defaults to SEND_LIST_SHEETNAME)
    #[structopt(long)]
    sheet: Option<String>,

    /// Spreadsheet layout: invoice or notice (defaults to LAYOUT)
    #[structopt(long)]
    layout: Option<Layout>,
}

fn load_settings(list: Option<&ListOpt>) -> Result<Settings> {
    let mut settings = Settings::load()?;

    if let Some(layout) = list.and_then(|l| l.layout) {
        settings.layout = layout;
    }

    Ok(settings)
}

fn load_deliveries(file: &Path, list: &ListOpt, settings: &Settings) -> Result<Vec<Delivery>> {
    let sheet_name = list
        .sheet
        .as_deref()
        .unwrap_or(&settings.send_list_sheetname);

    let rows = sheet::read_rows(file, sheet_name, settings.layout)?;
    let deliveries = delivery::build_deliveries(&rows, settings.layout, &settings.cc_list())?;

    Ok(deliveries)
}

fn deliveries_detail(deliveries: &[Delivery]) -> serde_json::Value {
    serde_json::json!({
        "count": deliveries.len(),
        "first_email": deliveries.first().map(Delivery::to_addr),
        "last_email": deliveries.last().map(Delivery::to_addr),
    })
}

fn confirm(prompt: &str) -> Result<bool> {
    let answer = Confirm::new().with_prompt(prompt).default(false).interact()?;
    Ok(answer)
}

fn progress_bar(total: usize, message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")?
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    Ok(pb)
}

pub fn txt2html(path: &Path) -> Result<()> {
    log::debug!("Converting {}", path.display());

    for target in txt2html::convert_path(path)? {
        println!("{}", target.display());
    }

    Ok(())
}

pub fn check(file: &Path, list: &ListOpt) -> Result<()> {
    let settings = load_settings(Some(list))?;
    let templates = Templates::load(&settings)?;
    let deliveries = load_deliveries(file, list, &settings)?;

    log::info!("Deliveries: {}", deliveries_detail(&deliveries));

    let problems = pipeline::preflight(&deliveries, &settings, &templates)?;

    for (idx, e) in &problems {
        log::error!("{}: {}", deliveries[*idx].to_addr(), e);
    }

    if problems.is_empty() {
        log::info!("All {} deliveries OK", deliveries.len());
        Ok(())
    } else {
        Err(format!("{} of {} deliveries have problems", problems.len(), deliveries.len()).into())
    }
}

pub async fn send(file: &Path, list: &ListOpt, dryrun: bool, yes: bool) -> Result<()> {
    let settings = load_settings(Some(list))?;
    let templates = Templates::load(&settings)?;

    let mut runlog = RunLog::create(&settings.log_dir)?;
    if let Some(path) = runlog.path() {
        log::info!("Logging this run to {}", path.display());
    }
    runlog.info("Settings", settings.summary())?;

    let deliveries = load_deliveries(file, list, &settings)?;

    let detail = deliveries_detail(&deliveries);
    log::info!("Deliveries: {}", detail);
    runlog.info("Deliveries", serde_json::json!({ "detail": detail }))?;

    if deliveries.is_empty() {
        log::warn!("Nothing to send");
        return Ok(());
    }

    let (mode, prompt) = if dryrun {
        (Mode::DryRun, "Run the check (dry-run)?")
    } else {
        (Mode::Live, "Send for real?")
    };

    if !yes && !confirm(prompt)? {
        log::info!("Aborted by user");
        runlog.info("Aborted by user", serde_json::Value::Null)?;
        return Ok(());
    }

    let client = BlastEngineClient::from_settings(&settings)?;
    let pb = progress_bar(deliveries.len(), "Sending")?;
    let summary = pipeline::send_all(
        &deliveries,
        &settings,
        &templates,
        &client,
        mode,
        &mut runlog,
        |summary| {
            pb.set_position(summary.attempted as u64);
            if summary.errors > 0 {
                pb.set_message(format!("Sending ({} errors)", summary.errors));
            }
        },
    )
    .await;
    pb.finish();
    let summary = summary?;

    println!(
        "attempted: {}, succeeded: {}, errors: {}",
        summary.attempted,
        summary.succeeded(),
        summary.errors
    );

    Ok(())
}

pub async fn results(logfile: &Path, out: &Path) -> Result<()> {
    let settings = load_settings(None)?;
    let client = BlastEngineClient::from_settings(&settings)?;

    let pb = progress_bar(0, "Fetching results")?;
    let files = report::build_report(logfile, out, &client, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    })
    .await;
    pb.finish();
    let files = files?;

    println!("{}", files.results.display());
    println!("{}", files.report.display());

    Ok(())
}

pub fn env() -> Result<()> {
    let settings = load_settings(None)?;
    println!("{}", serde_json::to_string_pretty(&settings.summary())?);
    Ok(())
}
