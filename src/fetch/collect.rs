use anyhow::Result;
use chrono::Utc;
use std::path::PathBuf;
use tracing::info;

use super::{archive_download, merged_name, report_window, DownloadWatcher, ReportStatus};
use crate::{
    config::Config,
    process::{merge_files, tag_file},
};

/// What a `collect` run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collected {
    /// Tagged per-status files, in the order the statuses were requested.
    pub reports: Vec<PathBuf>,
    pub merged: PathBuf,
    pub rows: usize,
}

/// For each status in turn: wait for its export in the download directory,
/// move it into the output directory, tag it with the status. Then merge all
/// of them into `relatorio_cobranca_<date>.csv`.
///
/// Unless `include_existing` is set, files already in the download directory
/// when the run starts are ignored.
pub async fn collect(
    statuses: &[ReportStatus],
    include_existing: bool,
    config: &Config,
) -> Result<Collected> {
    let mut watcher = DownloadWatcher::from_config(&config.download);
    if !include_existing {
        watcher.ignore_existing().await?;
    }

    let window = report_window(Utc::now());
    info!(start = %window.start, end = %window.end, dir = %watcher.dir().display(), "waiting for exports");

    let mut reports = Vec::with_capacity(statuses.len());
    for &status in statuses {
        info!(%status, "waiting for CSV");
        let downloaded = watcher.next_file().await?;
        let archived = archive_download(
            &downloaded,
            &config.output_directory,
            status.as_str(),
            Utc::now(),
        )?;
        // output dir may be the download dir
        watcher.claim(archived.clone());

        tokio::task::spawn_blocking({
            let archived = archived.clone();
            let config = config.clone();
            move || tag_file(&archived, status.as_str(), &config)
        })
        .await??;
        reports.push(archived);
    }

    let merged = config.output_directory.join(merged_name(Utc::now()));
    let rows = tokio::task::spawn_blocking({
        let reports = reports.clone();
        let merged = merged.clone();
        let config = config.clone();
        move || merge_files(&reports, &merged, &config)
    })
    .await??;

    info!(rows, output = %merged.display(), "all done");
    Ok(Collected {
        reports,
        merged,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DownloadConfig;
    use std::fs;
    use tempfile::TempDir;
    use tokio::time::{sleep, Duration};

    fn config_for(downloads: &std::path::Path, output: &std::path::Path) -> Config {
        Config {
            output_directory: output.to_path_buf(),
            download: DownloadConfig {
                directory: downloads.to_path_buf(),
                extensions: vec!["csv".into()],
                poll_interval_ms: 10,
                timeout_secs: 5,
            },
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_collect_into_download_dir() -> Result<()> {
        let dir = TempDir::new()?;
        fs::write(dir.path().join("a.csv"), "Nome,Valor\nAna,10\n")?;
        fs::write(dir.path().join("b.csv"), "Nome,Vencimento\nBia,05/01\n")?;

        let config = config_for(dir.path(), dir.path());
        let out = collect(
            &[ReportStatus::Ativos, ReportStatus::Pendentes],
            true,
            &config,
        )
        .await?;

        assert_eq!(out.reports.len(), 2);
        assert_ne!(out.reports[0], out.reports[1]);
        assert!(!dir.path().join("a.csv").exists());
        assert!(!dir.path().join("b.csv").exists());

        let first = out.reports[0].file_name().unwrap().to_string_lossy().into_owned();
        assert!(first.starts_with("relatorio_ativos_"), "{}", first);
        assert_eq!(
            fs::read_to_string(&out.reports[0])?,
            "nome,valor,status\nAna,10,ativos\n"
        );
        assert_eq!(
            fs::read_to_string(&out.reports[1])?,
            "nome,vencimento,status\nBia,05/01,pendentes\n"
        );

        assert_eq!(out.rows, 2);
        assert_eq!(out.merged.parent(), Some(dir.path()));
        assert!(out
            .merged
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("relatorio_cobranca_"));
        assert_eq!(
            fs::read_to_string(&out.merged)?,
            "nome,valor,status,vencimento\nAna,10,ativos,\nBia,,pendentes,05/01\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_collect_ignores_files_present_at_start() -> Result<()> {
        let downloads = TempDir::new()?;
        let output = TempDir::new()?;
        fs::write(downloads.path().join("old.csv"), "x\nstale\n")?;

        let writer = {
            let target = downloads.path().join("export.csv");
            tokio::spawn(async move {
                sleep(Duration::from_millis(50)).await;
                tokio::fs::write(&target, "x\nfresh\n").await
            })
        };

        let config = config_for(downloads.path(), output.path());
        let out = collect(&[ReportStatus::Terminados], false, &config).await?;
        writer.await??;

        assert!(downloads.path().join("old.csv").exists());
        assert_eq!(
            fs::read_to_string(&out.merged)?,
            "x,status\nfresh,terminados\n"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_collect_times_out_without_download() -> Result<()> {
        let dir = TempDir::new()?;
        let mut config = config_for(dir.path(), dir.path());
        config.download.timeout_secs = 0;

        let err = collect(&[ReportStatus::Ativos], false, &config)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"), "{}", err);
        Ok(())
    }
}
