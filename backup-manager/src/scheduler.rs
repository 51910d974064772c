use crate::config::ScheduleConfig;
use crate::service::BackupService;
use backup_engine::models::{BackupProfile, Frequency};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

/// Cron expression (sec min hour day month weekday) for a frequency policy.
/// Scheduled backups run at 08:00.
pub fn backup_cron(frequency: Frequency) -> &'static str {
    match frequency {
        Frequency::Daily => "0 0 8 * * *",
        Frequency::Weekly => "0 0 8 * * Mon",
        Frequency::Monthly => "0 0 8 1 * *",
    }
}

/// Cron expression for a `H:MM` report time, `None` if it does not parse.
pub fn report_cron(time: &str) -> Option<String> {
    let (hour, minute) = time.trim().split_once(':')?;
    let hour: u32 = hour.parse().ok()?;
    let minute: u32 = minute.parse().ok()?;
    (hour < 24 && minute < 60).then(|| format!("0 {minute} {hour} * * *"))
}

/// What [`BackupScheduler::start`] registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulePlan {
    /// `None` when backing up the configured default sources.
    pub profile_id: Option<i64>,
    pub backup_cron: String,
    pub report_cron: Option<String>,
}

impl SchedulePlan {
    /// Take the policy from `profile` when there is one, otherwise from the
    /// `[schedule]` section.
    pub fn resolve(profile: Option<&BackupProfile>, fallback: &ScheduleConfig) -> Self {
        let (profile_id, frequency, report_enabled, report_time) = match profile {
            Some(p) => (
                Some(p.id),
                p.backup_frequency.as_str(),
                p.daily_report_enable,
                p.daily_report_time.as_str(),
            ),
            None => (
                None,
                fallback.frequency.as_str(),
                fallback.daily_report_enable,
                fallback.daily_report_time.as_str(),
            ),
        };

        let frequency = Frequency::parse(frequency).unwrap_or_else(|| {
            tracing::warn!(frequency, "Unknown backup frequency, using daily");
            Frequency::Daily
        });
        let report_cron = report_enabled.then(|| {
            report_cron(report_time).unwrap_or_else(|| {
                tracing::warn!(time = report_time, "Invalid daily report time, using 8:00");
                "0 0 8 * * *".to_string()
            })
        });

        Self {
            profile_id,
            backup_cron: backup_cron(frequency).to_string(),
            report_cron,
        }
    }
}

pub struct BackupScheduler {
    scheduler: Mutex<JobScheduler>,
    service: Arc<BackupService>,
    fallback: ScheduleConfig,
    cancel: CancellationToken,
    backup_running: Arc<AtomicBool>,
}

impl BackupScheduler {
    pub async fn new(service: Arc<BackupService>, fallback: ScheduleConfig) -> anyhow::Result<Self> {
        let scheduler = JobScheduler::new().await?;
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            service,
            fallback,
            cancel: CancellationToken::new(),
            backup_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Resolve the profile (explicit id, else the default one), register its
    /// jobs and start ticking.
    pub async fn start(&self, profile_id: Option<i64>) -> anyhow::Result<SchedulePlan> {
        let store = self.service.store().clone();
        let profile = tokio::task::spawn_blocking(move || match profile_id {
            Some(id) => store.get_profile(id),
            None => store.default_profile(),
        })
        .await??;

        if let (Some(id), None) = (profile_id, &profile) {
            anyhow::bail!("backup profile {id} not found");
        }

        let plan = SchedulePlan::resolve(profile.as_ref(), &self.fallback);
        self.schedule_backup(&plan).await?;
        if let Some(cron) = &plan.report_cron {
            self.schedule_report(cron).await?;
        }

        self.scheduler.lock().await.start().await?;
        tracing::info!(
            profile_id = ?plan.profile_id,
            cron = %plan.backup_cron,
            report = ?plan.report_cron,
            "Backup scheduler started"
        );
        Ok(plan)
    }

    async fn schedule_backup(&self, plan: &SchedulePlan) -> anyhow::Result<()> {
        let service = self.service.clone();
        let cancel = self.cancel.clone();
        let running = self.backup_running.clone();
        let profile_id = plan.profile_id;

        let job = Job::new_async(plan.backup_cron.as_str(), move |_uuid, _lock| {
            let service = service.clone();
            let cancel = cancel.clone();
            let running = running.clone();
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return;
                }
                if running.swap(true, Ordering::SeqCst) {
                    tracing::warn!("Skipping scheduled run: previous backup still running");
                    return;
                }

                tracing::info!(profile_id = ?profile_id, "Starting scheduled backup");
                let result = tokio::task::spawn_blocking(move || match profile_id {
                    Some(id) => service.run_backup_from_profile(Some(id)),
                    None => service.run_backup_from_sources(&[], None),
                })
                .await;
                running.store(false, Ordering::SeqCst);

                match result {
                    Ok(outcome) if outcome.ok => tracing::info!("Scheduled backup completed"),
                    Ok(outcome) => tracing::error!(
                        error = outcome.error.as_deref().unwrap_or("backup recorded as FAILED"),
                        "Scheduled backup failed"
                    ),
                    Err(e) => tracing::error!(error = %e, "Scheduled backup task panicked"),
                }
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %plan.backup_cron, "Backup job scheduled");
        Ok(())
    }

    async fn schedule_report(&self, cron: &str) -> anyhow::Result<()> {
        let service = self.service.clone();
        let cancel = self.cancel.clone();

        let job = Job::new_async(cron, move |_uuid, _lock| {
            let service = service.clone();
            let cancel = cancel.clone();
            Box::pin(async move {
                if cancel.is_cancelled() {
                    return;
                }
                tracing::info!("Sending daily report");
                match tokio::task::spawn_blocking(move || service.send_daily_report_now()).await {
                    Ok(outcome) if outcome.ok => {}
                    Ok(_) => tracing::error!("Daily report could not be sent"),
                    Err(e) => tracing::error!(error = %e, "Daily report task panicked"),
                }
            })
        })?;

        self.scheduler.lock().await.add(job).await?;
        tracing::info!(cron = %cron, "Daily report scheduled");
        Ok(())
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.cancel.cancel();
        self.scheduler.lock().await.shutdown().await?;
        tracing::info!("Backup scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use backup_engine::models::NewProfile;
    use backup_engine::notify::TracingNotifier;
    use backup_engine::{EngineConfig, HistoryStore, SqliteHistory};
    use tempfile::TempDir;

    fn profile(frequency: &str, report: bool, time: &str) -> BackupProfile {
        BackupProfile {
            id: 7,
            name: "p".into(),
            sources: "/data".into(),
            backup_directory: "/backups".into(),
            restore_directory: "/restore".into(),
            backup_frequency: frequency.into(),
            daily_report_enable: report,
            daily_report_time: time.into(),
            recipient_email: None,
            is_default: true,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    #[test]
    fn test_frequency_crons() {
        assert_eq!(backup_cron(Frequency::Daily), "0 0 8 * * *");
        assert_eq!(backup_cron(Frequency::Weekly), "0 0 8 * * Mon");
        assert_eq!(backup_cron(Frequency::Monthly), "0 0 8 1 * *");
    }

    #[test]
    fn test_report_cron() {
        assert_eq!(report_cron("8:00").as_deref(), Some("0 0 8 * * *"));
        assert_eq!(report_cron("21:45").as_deref(), Some("0 45 21 * * *"));
        assert_eq!(report_cron("25:00"), None);
        assert_eq!(report_cron("noon"), None);
    }

    #[test]
    fn test_plan_from_profile() {
        let plan = SchedulePlan::resolve(Some(&profile("weekly", true, "19:30")), &ScheduleConfig::default());
        assert_eq!(
            plan,
            SchedulePlan {
                profile_id: Some(7),
                backup_cron: "0 0 8 * * Mon".into(),
                report_cron: Some("0 30 19 * * *".into()),
            }
        );
    }

    #[test]
    fn test_unknown_frequency_falls_back_to_daily() {
        let plan = SchedulePlan::resolve(Some(&profile("hourly", false, "8:00")), &ScheduleConfig::default());
        assert_eq!(plan.backup_cron, "0 0 8 * * *");
        assert_eq!(plan.report_cron, None);
    }

    #[test]
    fn test_plan_without_profile_uses_config() {
        let fallback = ScheduleConfig {
            frequency: "monthly".into(),
            daily_report_enable: true,
            daily_report_time: "bogus".into(),
        };
        let plan = SchedulePlan::resolve(None, &fallback);
        assert_eq!(plan.profile_id, None);
        assert_eq!(plan.backup_cron, "0 0 8 1 * *");
        assert_eq!(plan.report_cron.as_deref(), Some("0 0 8 * * *"));
    }

    fn service(temp: &TempDir) -> Arc<BackupService> {
        let store: Arc<dyn HistoryStore> =
            Arc::new(SqliteHistory::open(&temp.path().join("history.db")).unwrap());
        Arc::new(BackupService::new(
            EngineConfig::new(temp.path().join("backups"), temp.path().join("restore")),
            Vec::new(),
            store,
            Arc::new(TracingNotifier),
            None,
            None,
        ))
    }

    #[tokio::test]
    async fn test_start_and_stop() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let service = service(&temp);
        let mut data = NewProfile::new("p", vec!["/data".into()], "/b", "/r");
        data.is_default = true;
        data.backup_frequency = "weekly".into();
        let created = service.store().create_profile(&data)?;

        let scheduler = BackupScheduler::new(service, ScheduleConfig::default()).await?;
        let plan = scheduler.start(None).await?;
        assert_eq!(plan.profile_id, Some(created.id));
        assert_eq!(plan.backup_cron, "0 0 8 * * Mon");

        scheduler.stop().await?;
        assert!(scheduler.cancel.is_cancelled());
        Ok(())
    }

    #[tokio::test]
    async fn test_start_with_unknown_profile_fails() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let scheduler = BackupScheduler::new(service(&temp), ScheduleConfig::default()).await?;
        assert!(scheduler.start(Some(99)).await.is_err());
        Ok(())
    }
}
