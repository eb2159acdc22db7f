//! Operations CLI library.
//!
//! Backs the `clawdctl` binary. Handlers write to any `Write` so tests can
//! capture their output.

use std::io::Write;

use anyhow::Context;
use clawd_jobs::{FailedJob, Job};
use serde_json::{json, Value};

use crate::Coordinator;

/// Global options that apply to all clawdctl commands
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    /// Directory holding `default.toml` and friends
    pub config_dir: String,
    /// Output in JSON format instead of human-readable text
    pub json: bool,
}

impl Default for GlobalOptions {
    fn default() -> Self {
        Self {
            config_dir: "./config".to_string(),
            json: false,
        }
    }
}

/// Load configuration and connect to the store.
pub async fn connect(opts: &GlobalOptions) -> anyhow::Result<Coordinator> {
    Coordinator::bootstrap(&opts.config_dir)
        .await
        .with_context(|| format!("failed to load configuration from '{}'", opts.config_dir))
}

fn parse_job(text: &str) -> anyhow::Result<Job> {
    serde_json::from_str(text).with_context(|| format!("job is not valid JSON: {text}"))
}

/// Probe the store. Fails when the store is unhealthy.
pub async fn health<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
) -> anyhow::Result<()> {
    let health = coordinator.health().await;

    if opts.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&health)?)?;
    } else {
        writeln!(out, "Store Health")?;
        writeln!(out, "============")?;
        writeln!(out, "Backend: {}", coordinator.client().kind())?;
        writeln!(
            out,
            "Status: {}",
            if health.is_healthy() { "healthy" } else { "unhealthy" }
        )?;
        if let Some(clients) = health.connected_clients {
            writeln!(out, "Connected clients: {}", clients)?;
        }
        if let Some(memory) = &health.used_memory_human {
            writeln!(out, "Used memory: {}", memory)?;
        }
        if let Some(uptime) = health.uptime_seconds {
            writeln!(out, "Uptime: {}s", uptime)?;
        }
        if let Some(commands) = health.total_commands_processed {
            writeln!(out, "Commands processed: {}", commands)?;
        }
        if let Some(error) = &health.error {
            writeln!(out, "Error: {}", error)?;
        }
    }

    if !health.is_healthy() {
        anyhow::bail!("store is unhealthy");
    }
    Ok(())
}

/// Show queue depths
pub async fn queue_stats<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    name: &str,
) -> anyhow::Result<()> {
    let stats = coordinator.queue(name).stats().await;

    if opts.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
    } else {
        writeln!(out, "Queue: {}", stats.queue)?;
        writeln!(out, "  Pending:    {}", stats.pending)?;
        writeln!(out, "  Processing: {}", stats.processing)?;
        writeln!(out, "  Failed:     {}", stats.failed)?;
    }

    Ok(())
}

/// List the most recent failed jobs
pub async fn queue_failed<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    name: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let failed = coordinator.queue(name).failed_jobs(limit).await;

    if opts.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&failed)?)?;
        return Ok(());
    }

    if failed.is_empty() {
        writeln!(out, "No failed jobs in '{}'", name)?;
        return Ok(());
    }

    writeln!(out, "{:<27}  {:<30}  Job", "Failed At", "Error")?;
    writeln!(out, "{}", "-".repeat(90))?;
    for FailedJob {
        job,
        error,
        failed_at,
    } in &failed
    {
        let at = failed_at
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        writeln!(out, "{:<27}  {:<30}  {}", at, error, job)?;
    }

    Ok(())
}

/// List jobs claimed by workers and not yet acknowledged
pub async fn queue_processing<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    name: &str,
    limit: usize,
) -> anyhow::Result<()> {
    let jobs = coordinator.queue(name).processing_jobs(limit).await;

    if opts.json {
        writeln!(out, "{}", serde_json::to_string_pretty(&jobs)?)?;
    } else if jobs.is_empty() {
        writeln!(out, "No jobs in progress in '{}'", name)?;
    } else {
        for job in &jobs {
            writeln!(out, "{}", job)?;
        }
    }

    Ok(())
}

/// Enqueue a job given as JSON text
pub async fn queue_push<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    name: &str,
    job: &str,
) -> anyhow::Result<()> {
    let job = parse_job(job)?;
    if !coordinator.queue(name).push(&job).await {
        anyhow::bail!("failed to push job to '{}'", name);
    }

    if opts.json {
        writeln!(out, "{}", json!({"queue": name, "pushed": true, "job": job}))?;
    } else {
        writeln!(out, "Pushed to '{}': {}", name, job)?;
    }
    Ok(())
}

/// Move a job stuck in processing back to the pending list
pub async fn queue_requeue<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    name: &str,
    job: &str,
) -> anyhow::Result<()> {
    let job = parse_job(job)?;
    if !coordinator.queue(name).requeue(&job).await {
        anyhow::bail!("failed to requeue job in '{}'", name);
    }

    if opts.json {
        writeln!(out, "{}", json!({"queue": name, "requeued": true, "job": job}))?;
    } else {
        writeln!(out, "Requeued in '{}': {}", name, job)?;
    }
    Ok(())
}

/// Show the current budget of a configured rate limiter
pub async fn limiter_status<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    name: &str,
) -> anyhow::Result<()> {
    let limiter = coordinator.rate_limiter(name)?;
    let remaining = limiter.remaining().await;
    let wait = limiter.wait_time().await;

    if opts.json {
        let json_output = json!({
            "name": limiter.name(),
            "max_requests": limiter.max_requests(),
            "window_secs": limiter.window().as_secs(),
            "remaining": remaining,
            "wait_secs": wait.as_secs_f64(),
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&json_output)?)?;
    } else {
        writeln!(out, "Limiter: {}", limiter.name())?;
        writeln!(
            out,
            "  Limit:     {} per {}s",
            limiter.max_requests(),
            limiter.window().as_secs()
        )?;
        writeln!(out, "  Remaining: {}", remaining)?;
        writeln!(out, "  Wait:      {:.3}s", wait.as_secs_f64())?;
    }

    Ok(())
}

/// Print a cached value
pub async fn cache_get<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    key: &str,
) -> anyhow::Result<()> {
    let value: Option<Value> = coordinator.cache().get(key).await;

    match value {
        Some(value) if opts.json => writeln!(out, "{}", serde_json::to_string_pretty(&value)?)?,
        Some(value) => writeln!(out, "{}", value)?,
        None if opts.json => writeln!(out, "null")?,
        None => writeln!(out, "(miss)")?,
    }
    Ok(())
}

/// Drop a cached value
pub async fn cache_delete<W: Write>(
    coordinator: &Coordinator,
    opts: &GlobalOptions,
    out: &mut W,
    key: &str,
) -> anyhow::Result<()> {
    if !coordinator.cache().delete(key).await {
        anyhow::bail!("failed to delete '{}'", key);
    }

    if opts.json {
        writeln!(out, "{}", json!({"key": key, "deleted": true}))?;
    } else {
        writeln!(out, "Deleted '{}'", key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clawd_config::AppConfig;
    use clawd_store::StoreClient;
    use std::time::Duration;

    fn coordinator() -> Coordinator {
        Coordinator::with_client(AppConfig::default(), StoreClient::memory())
    }

    fn text() -> GlobalOptions {
        GlobalOptions::default()
    }

    fn json_opts() -> GlobalOptions {
        GlobalOptions {
            json: true,
            ..GlobalOptions::default()
        }
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_memory_store() {
        let mut out = Vec::new();
        health(&coordinator(), &json_opts(), &mut out).await.unwrap();

        let report: Value = serde_json::from_str(&output(out)).unwrap();
        assert_eq!(report["status"], "healthy");
    }

    #[tokio::test]
    async fn test_health_fails_on_disabled_store() {
        let coordinator = Coordinator::with_client(AppConfig::default(), StoreClient::disabled());
        let mut out = Vec::new();
        let result = health(&coordinator, &text(), &mut out).await;

        assert!(result.is_err());
        assert!(output(out).contains("Status: unhealthy"));
    }

    #[tokio::test]
    async fn test_queue_push_and_stats() {
        let coordinator = coordinator();
        let mut out = Vec::new();
        queue_push(&coordinator, &text(), &mut out, "sync_tasks", r#"{"task":"sync"}"#)
            .await
            .unwrap();
        assert!(output(out).starts_with("Pushed to 'sync_tasks'"));

        let mut out = Vec::new();
        queue_stats(&coordinator, &json_opts(), &mut out, "sync_tasks")
            .await
            .unwrap();
        let stats: Value = serde_json::from_str(&output(out)).unwrap();
        assert_eq!(stats["pending"], 1);
        assert_eq!(stats["processing"], 0);
    }

    #[tokio::test]
    async fn test_queue_push_rejects_bad_json() {
        let mut out = Vec::new();
        let err = queue_push(&coordinator(), &text(), &mut out, "sync_tasks", "{not json")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_failed_listing() {
        let coordinator = coordinator();
        let queue = coordinator.queue("sync_tasks");
        queue.push(&json!({"task": "sync"})).await;
        let job = queue.pop(Duration::ZERO).await.unwrap();
        queue.fail(&job, "timeout").await;

        let mut out = Vec::new();
        queue_failed(&coordinator, &json_opts(), &mut out, "sync_tasks", 10)
            .await
            .unwrap();
        let failed: Value = serde_json::from_str(&output(out)).unwrap();
        assert_eq!(failed[0]["error"], "timeout");
        assert_eq!(failed[0]["job"]["task"], "sync");
    }

    #[tokio::test]
    async fn test_requeue_stuck_job() {
        let coordinator = coordinator();
        let queue = coordinator.queue("sync_tasks");
        queue.push(&json!({"task": "sync"})).await;
        queue.pop(Duration::ZERO).await.unwrap();

        let mut out = Vec::new();
        queue_requeue(&coordinator, &text(), &mut out, "sync_tasks", r#"{"task":"sync"}"#)
            .await
            .unwrap();
        assert_eq!(queue.size().await, 1);
        assert_eq!(queue.processing_count().await, 0);

        let mut out = Vec::new();
        assert!(queue_requeue(&coordinator, &text(), &mut out, "sync_tasks", r#"{"task":"sync"}"#)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_processing_listing() {
        let coordinator = coordinator();
        let queue = coordinator.queue("notifications");
        queue.push(&json!({"kind": "email"})).await;
        queue.pop(Duration::ZERO).await.unwrap();

        let mut out = Vec::new();
        queue_processing(&coordinator, &text(), &mut out, "notifications", 10)
            .await
            .unwrap();
        assert_eq!(output(out).trim(), r#"{"kind":"email"}"#);
    }

    #[tokio::test]
    async fn test_limiter_status() {
        let coordinator = coordinator();
        let limiter = coordinator.rate_limiter("github_api").unwrap();
        assert!(limiter.allow().await);

        let mut out = Vec::new();
        limiter_status(&coordinator, &json_opts(), &mut out, "github_api")
            .await
            .unwrap();
        let status: Value = serde_json::from_str(&output(out)).unwrap();
        assert_eq!(status["max_requests"], 30);
        assert_eq!(status["remaining"], 29);
        assert_eq!(status["wait_secs"], 0.0);
    }

    #[tokio::test]
    async fn test_limiter_status_unknown_preset() {
        let mut out = Vec::new();
        assert!(limiter_status(&coordinator(), &text(), &mut out, "unknown")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_cache_get_and_delete() {
        let coordinator = coordinator();
        coordinator
            .cache()
            .set("weather:Berlin", &json!({"temp": 3}), Duration::from_secs(60))
            .await;

        let mut out = Vec::new();
        cache_get(&coordinator, &text(), &mut out, "weather:Berlin")
            .await
            .unwrap();
        assert_eq!(output(out).trim(), r#"{"temp":3}"#);

        let mut out = Vec::new();
        cache_delete(&coordinator, &text(), &mut out, "weather:Berlin")
            .await
            .unwrap();

        let mut out = Vec::new();
        cache_get(&coordinator, &text(), &mut out, "weather:Berlin")
            .await
            .unwrap();
        assert_eq!(output(out).trim(), "(miss)");
    }
}
