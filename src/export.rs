use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{EventList, EventSummary, Setlist};
use crate::report::Issue;

pub const LIST_FILE: &str = "list.json";

const EVENT_DATE_FORMAT: &str = "%d-%m-%Y";
const ISO_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("cannot encode json: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("cannot create the file: {0}")]
    Create(io::Error),
    #[error("cannot write json: {0}")]
    Write(io::Error),
}

/// Result of one writing pass. Failed files show up in `issues`.
#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: usize,
    pub issues: Vec<Issue>,
}

impl ExportReport {
    fn record(&mut self, path: PathBuf, result: Result<(), ExportError>) {
        match result {
            Ok(()) => {
                debug!("wrote {}", path.display());
                self.written += 1;
            }
            Err(err) => {
                warn!("{}: {err}", path.display());
                self.issues.push(Issue::Write { path, source: err });
            }
        }
    }
}

/// Lower-cased, hyphenated and free of quotes and path separators.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .replace([' ', '/', '\\'], "-")
        .replace('&', "+")
        .chars()
        .filter(|ch| {
            !matches!(
                ch,
                '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}'
            )
        })
        .collect()
}

pub fn parse_event_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), EVENT_DATE_FORMAT).ok()
}

/// `dd-MM-yyyy` to `yyyy-MM-dd`. Unparseable input becomes `0001-01-01`.
pub fn iso_date(raw: &str) -> String {
    parse_event_date(raw)
        .or_else(|| NaiveDate::from_ymd_opt(1, 1, 1))
        .map(|date| date.format(ISO_DATE_FORMAT).to_string())
        .unwrap_or_default()
}

/// Setlists whose event date cannot be read.
pub fn undated(setlists: &[Setlist]) -> impl Iterator<Item = &Setlist> {
    setlists
        .iter()
        .filter(|setlist| parse_event_date(&setlist.event_date).is_none())
}

pub fn summarize(setlist: &Setlist) -> EventSummary {
    EventSummary {
        id: setlist.id.clone(),
        date: iso_date(&setlist.event_date),
        venue: setlist.venue.name.clone(),
        city: setlist.venue.city.name.clone(),
        state: setlist.venue.city.state.clone(),
        artist: setlist.artist.name.clone(),
        tour: String::new(),
        songs_played: 0,
        link: setlist.url.clone(),
    }
}

pub fn event_file_name(setlist: &Setlist) -> String {
    format!(
        "{}-{}.json",
        iso_date(&setlist.event_date),
        slug(&setlist.artist.name)
    )
}

/// Pretty JSON indented with tabs, no trailing newline.
pub fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;
    Ok(out)
}

/// Removes whatever a prior run left at `path`, then writes `value` fresh.
fn replace_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ExportError> {
    let bytes = to_pretty_json(value)?;
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => debug!("could not remove {}: {err}", path.display()),
    }
    let mut file = File::create(path).map_err(ExportError::Create)?;
    file.write_all(&bytes).map_err(ExportError::Write)?;
    file.flush().map_err(ExportError::Write)
}

pub fn write_list(setlists: &[Setlist], dir: &Path) -> ExportReport {
    let list = EventList {
        events: setlists.iter().map(summarize).collect(),
    };
    let path = dir.join(LIST_FILE);
    let mut report = ExportReport::default();
    let result = replace_json(&path, &list);
    report.record(path, result);
    report
}

pub fn write_event_files(setlists: &[Setlist], dir: &Path) -> ExportReport {
    let mut report = ExportReport::default();
    let mut seen: HashSet<String> = HashSet::with_capacity(setlists.len());

    for setlist in setlists {
        let name = event_file_name(setlist);
        if !seen.insert(name.clone()) {
            warn!("{name} is produced by more than one setlist; {} overwrites it", setlist.id);
        }
        let path = dir.join(&name);
        let result = replace_json(&path, setlist);
        report.record(path, result);
    }

    report
}
