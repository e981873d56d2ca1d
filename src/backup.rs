use std::time::Duration;

use gloo_timers::future::sleep;
use leptos::prelude::*;
use leptos::task::spawn_local;

use crate::api::{ApiClient, BackupEntry, BackupJob, JobState};
use crate::dialog::Dialogs;

const POLL_INTERVAL_MS: u64 = 1000;
const FINISH_HOLD_MS: u64 = 1000;

/// 1024-based size with the unit spelled out, trailing zeros trimmed.
pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    let exp = (((bytes as f64).ln() / 1024_f64.ln()).floor() as usize).min(UNITS.len() - 1);
    let value = bytes as f64 / 1024_f64.powi(exp as i32);
    let mut rounded = format!("{:.2}", (value * 100.0).round() / 100.0);
    while rounded.ends_with('0') {
        rounded.pop();
    }
    if rounded.ends_with('.') {
        rounded.pop();
    }
    format!("{rounded} {}", UNITS[exp])
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PollStep {
    Continue { progress: u32, detail: String },
    Done,
    Failed(String),
}

/// Maps one polled status onto what the UI should do next. The loop stops
/// only on a terminal status or a transport error.
pub fn poll_step(job: &BackupJob) -> PollStep {
    match job.status {
        JobState::Running => PollStep::Continue {
            progress: job.progress,
            detail: job.current_file.clone(),
        },
        JobState::Completed => PollStep::Done,
        JobState::Failed => PollStep::Failed(
            job.error
                .clone()
                .unwrap_or_else(|| "Backup failed".to_string()),
        ),
    }
}

#[derive(Clone, PartialEq)]
enum BackupListState {
    Loading,
    Ready(Vec<BackupEntry>),
    Failed,
}

#[derive(Clone, PartialEq)]
struct Progress {
    percent: u32,
    detail: String,
}

async fn refresh_backups(client: &ApiClient, list: RwSignal<BackupListState>) {
    list.set(BackupListState::Loading);
    match client.list_backups().await {
        Ok(backups) => list.set(BackupListState::Ready(backups)),
        Err(err) => {
            leptos::logging::error!("failed to load backups: {err}");
            list.set(BackupListState::Failed);
        }
    }
}

#[component]
pub fn BackupPanel() -> impl IntoView {
    let client = expect_context::<ApiClient>();
    let dialogs = expect_context::<Dialogs>();

    let list = RwSignal::new(BackupListState::Loading);
    // Disabling the trigger is the only guard against concurrent jobs.
    let busy = RwSignal::new(false);
    let progress = RwSignal::new(None::<Progress>);

    {
        let client = client.clone();
        Effect::new(move |_| {
            let client = client.clone();
            spawn_local(async move {
                refresh_backups(&client, list).await;
            });
        });
    }

    let start_backup = {
        let client = client.clone();
        move |_| {
            if busy.get() {
                return;
            }
            busy.set(true);
            progress.set(Some(Progress {
                percent: 0,
                detail: "Starting...".to_string(),
            }));
            let client = client.clone();
            spawn_local(async move {
                let failed = move |message: String| async move {
                    dialogs.message("Error", &message).await;
                    progress.set(None);
                    busy.set(false);
                };
                let status_url = match client.start_backup().await {
                    Ok(url) => url,
                    Err(err) => {
                        leptos::logging::error!("failed to start backup: {err}");
                        failed("Failed to start backup".to_string()).await;
                        return;
                    }
                };
                loop {
                    let job = match client.backup_status(&status_url).await {
                        Ok(job) => job,
                        Err(err) => {
                            leptos::logging::error!("backup status poll failed: {err}");
                            failed(format!("Backup failed: {}", err.user_message())).await;
                            return;
                        }
                    };
                    match poll_step(&job) {
                        PollStep::Continue { progress: percent, detail } => {
                            progress.set(Some(Progress { percent, detail }));
                        }
                        PollStep::Done => {
                            progress.set(Some(Progress {
                                percent: 100,
                                detail: "Backup completed".to_string(),
                            }));
                            sleep(Duration::from_millis(FINISH_HOLD_MS)).await;
                            progress.set(None);
                            busy.set(false);
                            refresh_backups(&client, list).await;
                            return;
                        }
                        PollStep::Failed(message) => {
                            failed(format!("Backup failed: {message}")).await;
                            return;
                        }
                    }
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
            });
        }
    };

    let delete_backup = {
        let client = client.clone();
        move |name: String| {
            let client = client.clone();
            spawn_local(async move {
                let confirmed = dialogs
                    .confirm("Delete Backup", "Are you sure you want to delete this backup?")
                    .await;
                if !confirmed {
                    return;
                }
                match client.delete_backup(&name).await {
                    Ok(()) => refresh_backups(&client, list).await,
                    Err(err) => {
                        leptos::logging::error!("failed to delete backup: {err}");
                        dialogs.message("Error", "Failed to delete backup").await;
                    }
                }
            });
        }
    };

    let backup_list = move || match list.get() {
        BackupListState::Loading => {
            view! { <div class="empty-message">"Loading backups..."</div> }.into_any()
        }
        BackupListState::Failed => {
            view! { <div class="error-message">"Failed to load backups"</div> }.into_any()
        }
        BackupListState::Ready(backups) => {
            if backups.is_empty() {
                return view! { <div class="empty-message">"No backups found"</div> }.into_any();
            }
            backups
                .into_iter()
                .map(|backup| {
                    let delete_backup = delete_backup.clone();
                    let name = backup.name.clone();
                    let meta = format!("{} \u{2022} {}", backup.date, format_bytes(backup.size));
                    view! {
                        <div class="file-item">
                            <div class="file-info">
                                <div class="file-icon">
                                    <i class="fa fa-file-zip-o"></i>
                                </div>
                                <div class="file-details">
                                    <span class="file-name" title=backup.name.clone()>
                                        {backup.name.clone()}
                                    </span>
                                    <span class="file-meta">{meta}</span>
                                </div>
                            </div>
                            <div class="file-actions">
                                <a
                                    href=backup.url.clone()
                                    class="download-file-btn"
                                    title="Download"
                                    download=""
                                >
                                    <i class="fa fa-download"></i>
                                </a>
                                <button
                                    class="delete-file-btn"
                                    title="Delete"
                                    on:click=move |_| delete_backup(name.clone())
                                >
                                    <i class="fa fa-trash"></i>
                                </button>
                            </div>
                        </div>
                    }
                })
                .collect::<Vec<_>>()
                .into_any()
        }
    };

    view! {
        <div class="backup-tab">
            <div class="tab-header">
                <button
                    class="primary-button create-backup-btn"
                    prop:disabled=move || busy.get()
                    on:click=start_backup
                >
                    <i class="fa fa-archive"></i>
                    " Create Backup"
                </button>
            </div>
            {move || {
                progress
                    .get()
                    .map(|p| {
                        view! {
                            <div class="backup-progress-container">
                                <div class="backup-progress">
                                    <div
                                        class="backup-progress-bar"
                                        style:width=format!("{}%", p.percent)
                                    ></div>
                                </div>
                                <span class="backup-progress-text">
                                    {format!("{}%", p.percent)}
                                </span>
                                <div class="backup-progress-details">{p.detail}</div>
                            </div>
                        }
                    })
            }}
            <div class="backup-list">{backup_list}</div>
        </div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(progress: u32, file: &str) -> BackupJob {
        BackupJob {
            status: JobState::Running,
            progress,
            current_file: file.to_string(),
            error: None,
        }
    }

    #[test]
    fn formats_byte_sizes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(1_048_576), "1 MB");
        assert_eq!(format_bytes(1_258_291), "1.2 MB");
    }

    #[test]
    fn poll_sequence_reports_progress_in_order_and_completes_once() {
        let statuses = [
            running(10, "docs/a.md"),
            running(55, "docs/b.md"),
            BackupJob {
                status: JobState::Completed,
                progress: 100,
                current_file: String::new(),
                error: None,
            },
        ];

        let mut seen = Vec::new();
        let mut completions = 0;
        for job in &statuses {
            match poll_step(job) {
                PollStep::Continue { progress, .. } => seen.push(progress),
                PollStep::Done => {
                    completions += 1;
                    break;
                }
                PollStep::Failed(err) => panic!("unexpected failure: {err}"),
            }
        }

        assert_eq!(seen, vec![10, 55]);
        assert_eq!(completions, 1);
    }

    #[test]
    fn failed_job_carries_the_server_error() {
        let job = BackupJob {
            status: JobState::Failed,
            progress: 40,
            current_file: String::new(),
            error: Some("disk full".to_string()),
        };
        assert_eq!(poll_step(&job), PollStep::Failed("disk full".to_string()));

        let job = BackupJob {
            status: JobState::Failed,
            progress: 40,
            current_file: String::new(),
            error: None,
        };
        assert_eq!(poll_step(&job), PollStep::Failed("Backup failed".to_string()));
    }
}
