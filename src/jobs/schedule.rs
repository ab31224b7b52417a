use std::sync::Arc;

use sqlx::MySqlPool;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::config::Config;
use crate::jobs::engine::run_daily_check;
use crate::jobs::store::MySqlNotificationStore;

/// Registers the daily notification check and starts the scheduler.
/// The cron expression is evaluated in UTC.
pub async fn start_scheduler(pool: MySqlPool, config: &Config) -> anyhow::Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let store = Arc::new(MySqlNotificationStore::new(pool));
    let policy = config.salary.clone();

    let job = Job::new_async(config.notification_cron.as_str(), move |_id, _scheduler| {
        let store = Arc::clone(&store);
        let policy = policy.clone();

        Box::pin(async move {
            let today = super::today();
            if let Err(e) = run_daily_check(store.as_ref(), &policy, today).await {
                error!(error = %e, "Daily notification check failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    info!(cron = %config.notification_cron, "Notification scheduler started");
    Ok(scheduler)
}
