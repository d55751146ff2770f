use clap::Parser;
use helpdesk_export::{init_tracing_once, ArchiveStore, ExportError, ExportOptions, Exporter, TarArchiver, TextMode};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// Export a helpdesk support site into an import archive (export_<site>.tgz).
#[derive(Parser, Debug)]
#[command(name = "helpdesk-export", version, about, long_about = None)]
struct Cli {
    /// Login email for the source helpdesk.
    #[arg(short, long, env = "HELPDESK_EMAIL")]
    email: String,

    /// Password for the source helpdesk.
    #[arg(short, long, env = "HELPDESK_PASSWORD", hide_env_values = true)]
    password: String,

    /// Site subdomain (<subdomain>.zendesk.com); also names the archive.
    #[arg(short, long, env = "HELPDESK_SUBDOMAIN")]
    subdomain: String,

    /// Override the API base URL (self-hosted or proxied instances).
    #[arg(long)]
    base_url: Option<String>,

    /// Keep entities in memory and write them only when packaging.
    #[arg(long)]
    buffered: bool,

    /// Directory the temporary export tree is created in.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Directory the archive is written to.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Seconds to wait after a throttled (503) response.
    #[arg(long, default_value_t = 30)]
    throttle_wait_secs: u64,

    /// Give up after this many throttled retries of one request (default: never).
    #[arg(long)]
    max_throttle_retries: Option<u32>,

    /// HTML-to-text converter, called as `<PROGRAM> <file>`.
    #[arg(long, value_name = "PROGRAM", default_value = "html2text")]
    html2text: String,

    /// Strip HTML in-process instead of calling a converter.
    #[arg(long, conflicts_with = "html2text")]
    builtin_text: bool,

    /// Do not export open tickets.
    #[arg(long)]
    skip_tickets: bool,

    /// Disable progress spinners.
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    fn into_options(self) -> ExportOptions {
        let text = if self.builtin_text {
            TextMode::Builtin
        } else {
            TextMode::Command { program: self.html2text, args: Vec::new() }
        };
        let mut opts = ExportOptions::new(self.subdomain, self.email, self.password)
            .with_buffered(self.buffered)
            .with_out_dir(&self.out_dir)
            .with_throttle_wait(Duration::from_secs(self.throttle_wait_secs))
            .with_max_throttle_retries(self.max_throttle_retries)
            .with_text_mode(text)
            .with_tickets(!self.skip_tickets)
            .with_progress(!self.no_progress);
        if let Some(dir) = self.work_dir {
            opts = opts.with_work_dir(dir);
        }
        if let Some(url) = self.base_url {
            opts = opts.with_base_url(url);
        }
        opts
    }
}

fn main() -> ExitCode {
    init_tracing_once();
    let opts = Cli::parse().into_options();
    let mut exporter = match Exporter::from_options(&opts) {
        Ok(exporter) => exporter,
        Err(e) => {
            print_failure(&e);
            return ExitCode::FAILURE;
        }
    };

    match exporter.run(&TarArchiver) {
        Ok(archive) => {
            print!("{}", summary(exporter.store()));
            println!("Archive: {}", archive.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            print_failure(&e);
            if let Err(cleanup) = exporter.discard() {
                tracing::warn!("could not remove export dir: {cleanup:#}");
            }
            eprint!("{}", summary(exporter.store()));
            ExitCode::FAILURE
        }
    }
}

fn print_failure(e: &anyhow::Error) {
    match e.downcast_ref::<ExportError>() {
        Some(fatal) => eprintln!("export aborted: {fatal}\n  caused by: {e:#}"),
        None => eprintln!("export failed: {e:#}"),
    }
}

/// Stats and report lines, printed after every run that got as far as the store.
fn summary(store: &ArchiveStore) -> String {
    let mut out = format!("Stats:\n{}", store.stats());
    if store.report().is_empty() {
        out.push_str("Report: no problems\n");
    } else {
        out.push_str(&format!("Report ({} problems):\n", store.report().len()));
        for line in store.report() {
            out.push_str(&format!("  {line}\n"));
        }
    }
    out
}
