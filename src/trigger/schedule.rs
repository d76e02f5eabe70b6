use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

use crate::cli::config::ScheduleSettings;
use crate::trigger::ScrapeService;

/// Build the recurring full-run job
pub fn scrape_job(service: ScrapeService, cron: &str) -> Result<Job> {
    Job::new_async(cron, move |_uuid, _l| {
        let service = service.clone();
        Box::pin(async move {
            service.scheduled_run().await;
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))
}

/// Start the cron scheduler. `None` when scheduling is disabled.
///
/// The returned scheduler must be kept alive for ticks to keep firing.
pub async fn start(service: ScrapeService, settings: &ScheduleSettings) -> Result<Option<JobScheduler>> {
    if !settings.enabled {
        info!("Scheduled scraping disabled");
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    sched
        .add(scrape_job(service, &settings.cron)?)
        .await
        .context("adding scheduler job")?;
    sched.start().await.context("starting scheduler")?;

    info!("Scheduled scraping with cron: {}", settings.cron);
    Ok(Some(sched))
}
