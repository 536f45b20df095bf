pub mod config;
pub mod export;
pub mod models;
pub mod report;
pub mod setlistfm;
pub mod utils;

use tracing::{error, info, warn};

use config::Settings;
use report::{Issue, RunReport};
use setlistfm::Transport;

/// Fetches every attended setlist, then writes `list.json` and one file per
/// event under `settings.output_path`.
///
/// Nothing is written when the first page cannot be fetched, so a previous
/// export stays intact.
pub fn run<T>(settings: &Settings, transport: &T) -> RunReport
where
    T: Transport + ?Sized,
{
    let mut report = RunReport::default();

    let attended = match setlistfm::fetch_attended(settings, transport) {
        Ok(attended) => attended,
        Err(err) => {
            error!("fetching attended setlists for {} failed: {err}", settings.user);
            report.fatal = Some(err.to_string());
            return report;
        }
    };
    report.total = attended.total;
    report.pages = attended.pages;
    report.fetched = attended.setlists.len();
    report.issues.extend(attended.issues);
    info!(
        "fetched {} of {} attended setlists",
        report.fetched, report.total
    );

    for setlist in export::undated(&attended.setlists) {
        warn!(
            "setlist {} has unparseable event date {:?}",
            setlist.id, setlist.event_date
        );
        report.issues.push(Issue::EventDate {
            id: setlist.id.clone(),
            raw: setlist.event_date.clone(),
        });
    }

    if let Err(source) = utils::ensure_dir(&settings.output_path) {
        warn!(
            "cannot prepare {}: {source}",
            settings.output_path.display()
        );
        report.issues.push(Issue::OutputDir {
            path: settings.output_path.clone(),
            source,
        });
    }

    let list = export::write_list(&attended.setlists, &settings.output_path);
    report.list_written = list.written == 1;
    report.issues.extend(list.issues);

    let files = export::write_event_files(&attended.setlists, &settings.output_path);
    report.event_files_written = files.written;
    report.issues.extend(files.issues);

    report
}
