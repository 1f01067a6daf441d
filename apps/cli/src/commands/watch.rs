//! `percolate watch`

use anyhow::{Context, Result, bail};
use percolate_poll::{Endpoint, HttpTransport, PollEvent, PollOutcome, PollingRegistry};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::WatchArgs;
use crate::settings::Settings;

pub async fn run(args: WatchArgs, settings: Settings) -> Result<()> {
    let mut endpoints: Vec<(String, Endpoint)> = settings
        .endpoints
        .iter()
        .map(|entry| {
            (
                entry.key.clone(),
                Endpoint::new(entry.url.clone(), entry.method, entry.body.clone()),
            )
        })
        .collect();
    endpoints.extend(
        args.targets
            .iter()
            .map(|target| (target.key.clone(), Endpoint::get(target.url.clone()))),
    );
    if endpoints.is_empty() {
        bail!("nothing to watch: pass KEY=URL targets or list [[endpoints]] in the config file");
    }

    let transport = HttpTransport::new().context("failed to create HTTP client")?;
    let registry = PollingRegistry::builder(transport)
        .config(settings.engine)
        .build()
        .context("invalid engine configuration")?;

    let (tx, mut events) = mpsc::unbounded_channel();
    for (key, endpoint) in endpoints {
        let mut subscription = registry.start(key, endpoint, settings.defaults.clone());
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
    }
    drop(tx);

    info!(keys = ?registry.active_keys(), "watching");

    let mut printed = 0usize;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                info!("interrupted");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{}", render(&event, args.json));
                printed += 1;
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
        }
    }

    registry.stop_all();
    Ok(())
}

fn render(event: &PollEvent, as_json: bool) -> String {
    if as_json {
        return describe(event).to_string();
    }
    match event {
        PollEvent::Transition(record) => format!(
            "{} changed: +{} -{} ~{}",
            record.key,
            record.delta.added.len(),
            record.delta.removed.len(),
            record.delta.updated.len()
        ),
        PollEvent::Attempt { key, outcome, meta } => match outcome {
            PollOutcome::NotModified => format!("{key} unchanged (request {})", meta.request_count),
            PollOutcome::Success(payload) => format!("{key} {payload}"),
            PollOutcome::Failure(failure) => format!(
                "{key} failed [{}] after {} retries: {}",
                failure.severity, meta.consecutive_errors, failure.error
            ),
        },
    }
}

fn describe(event: &PollEvent) -> Value {
    match event {
        PollEvent::Transition(record) => json!({
            "key": record.key,
            "event": "transition",
            "added": record.delta.added,
            "removed": record.delta.removed,
            "updated": record.delta.updated,
        }),
        PollEvent::Attempt { key, outcome, meta } => {
            let mut value = json!({
                "key": key,
                "background": meta.is_background,
                "request_count": meta.request_count,
                "consecutive_errors": meta.consecutive_errors,
            });
            let detail = match outcome {
                PollOutcome::NotModified => json!({"event": "not_modified"}),
                PollOutcome::Success(payload) => json!({"event": "success", "payload": payload}),
                PollOutcome::Failure(failure) => json!({
                    "event": "failure",
                    "error": failure.error.to_string(),
                    "severity": failure.severity,
                    "surface": failure.surface,
                }),
            };
            if let (Some(target), Value::Object(detail)) = (value.as_object_mut(), detail) {
                target.extend(detail);
            }
            value
        }
    }
}
