use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Report status filter offered by the portal's billing report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReportStatus {
    Ativos,
    Pendentes,
    Terminados,
}

impl ReportStatus {
    pub const ALL: [ReportStatus; 3] = [
        ReportStatus::Ativos,
        ReportStatus::Pendentes,
        ReportStatus::Terminados,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Ativos => "ativos",
            ReportStatus::Pendentes => "pendentes",
            ReportStatus::Terminados => "terminados",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ativos" => Some(ReportStatus::Ativos),
            "pendentes" => Some(ReportStatus::Pendentes),
            "terminados" => Some(ReportStatus::Terminados),
            _ => None,
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Date filter for the report form, as the portal expects it (`dd/mm/yyyy`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: String,
    pub end: String,
}

/// São Paulo has had no DST since 2019.
fn sao_paulo() -> FixedOffset {
    FixedOffset::west_opt(3 * 3600).expect("UTC-3 is a valid offset")
}

fn local_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&sao_paulo()).date_naive()
}

/// Yesterday through today, in São Paulo local time.
pub fn report_window(now: DateTime<Utc>) -> ReportWindow {
    let today = local_date(now);
    let yesterday = today.pred_opt().unwrap_or(today);
    ReportWindow {
        start: yesterday.format("%d/%m/%Y").to_string(),
        end: today.format("%d/%m/%Y").to_string(),
    }
}

pub fn archive_name(status: &str, now: DateTime<Utc>) -> String {
    format!("relatorio_{}_{}.csv", status, now.timestamp_millis())
}

pub fn merged_name(now: DateTime<Utc>) -> String {
    format!("relatorio_cobranca_{}.csv", local_date(now).format("%Y%m%d"))
}

/// `dir/name`, or `dir/<stem>_2.csv`, `_3`, ... if that is taken.
fn unused_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name.trim_end_matches(".csv");
    (2..)
        .map(|n| dir.join(format!("{}_{}.csv", stem, n)))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Move a freshly downloaded export to `dest_dir/relatorio_<status>_<millis>.csv`.
pub fn archive_download(
    file: &Path,
    dest_dir: &Path,
    status: &str,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    fs::create_dir_all(dest_dir)
        .with_context(|| format!("creating output directory {}", dest_dir.display()))?;
    let target = unused_path(dest_dir, &archive_name(status, now));

    if let Err(e) = fs::rename(file, &target) {
        // download dir and output dir may sit on different filesystems
        debug!(
            from = %file.display(),
            to = %target.display(),
            error = %e,
            "rename failed, copying instead"
        );
        fs::copy(file, &target).with_context(|| {
            format!("copying {} to {}", file.display(), target.display())
        })?;
        fs::remove_file(file).with_context(|| format!("removing {}", file.display()))?;
    }

    info!(from = %file.display(), to = %target.display(), "saved report CSV");
    Ok(target)
}
