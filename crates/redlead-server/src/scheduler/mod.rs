//! Background job scheduler.
//!
//! Optional alternative to an external cron hitting `/api/v1/cron/*`: when
//! `REDLEAD_SCHEDULER_ENABLED` is set, each pipeline stage runs on its own
//! schedule inside the server process. Stages whose clients are not
//! configured are not registered.

mod jobs;

use std::future::Future;

use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::api::AppState;

/// Every 15 minutes; monitors that are not due are skipped by the scanner.
const SCAN_SCHEDULE: &str = "0 */15 * * * *";
const QUALIFY_SCHEDULE: &str = "0 */5 * * * *";
const POST_SCHEDULE: &str = "0 */2 * * * *";
const ENGAGEMENT_SCHEDULE: &str = "0 30 * * * *";
/// Daily at 14:00 UTC.
const WARMUP_SCHEDULE: &str = "0 0 14 * * *";

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process. Dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// a job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(state: AppState) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;

    if state.reddit.is_some() {
        register(&scheduler, SCAN_SCHEDULE, "scan", state.clone(), jobs::scan).await?;
        register(&scheduler, POST_SCHEDULE, "post", state.clone(), jobs::post).await?;
        register(
            &scheduler,
            ENGAGEMENT_SCHEDULE,
            "engagement",
            state.clone(),
            jobs::engagement,
        )
        .await?;
    } else {
        tracing::warn!("scheduler: Reddit client not configured; scan, post and engagement jobs disabled");
    }

    if state.llm.is_some() {
        register(&scheduler, QUALIFY_SCHEDULE, "qualify", state.clone(), jobs::qualify).await?;
    } else {
        tracing::warn!("scheduler: OpenAI client not configured; qualify job disabled");
    }

    if state.reddit.is_some() && state.llm.is_some() {
        register(&scheduler, WARMUP_SCHEDULE, "warmup", state, jobs::warmup).await?;
    }

    scheduler.start().await?;
    Ok(scheduler)
}

async fn register<F, Fut>(
    scheduler: &JobScheduler,
    schedule: &str,
    name: &'static str,
    state: AppState,
    run: F,
) -> Result<(), JobSchedulerError>
where
    F: Fn(AppState) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let run = run(state.clone());
        Box::pin(async move {
            tracing::info!(job = name, "scheduler: job starting");
            run.await;
            tracing::info!(job = name, "scheduler: job finished");
        })
    })?;

    scheduler.add(job).await?;
    tracing::info!(job = name, schedule, "scheduler: job registered");
    Ok(())
}
