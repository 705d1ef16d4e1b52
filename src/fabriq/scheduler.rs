// SPDX-License-Identifier: MIT

//! Scheduler - runs async functions at wall-clock times
//!
//! Each async function gets one tokio task that sleeps until the next
//! matching time, runs its system, and repeats.

use crate::adk::error::FabriqError;
use crate::fabriq::config::{AsyncFunctionConfig, EngineConfig, Frequency, ScheduleConfig};
use crate::fabriq::graph::EventKind;
use crate::fabriq::runtime::Engine;
use chrono::{DateTime, TimeZone};
use cron::Schedule;
use futures::StreamExt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const OUTPUT_PREVIEW_CHARS: usize = 200;

/// Six-field cron expression (`sec min hour day-of-month month day-of-week`)
/// for a schedule
pub fn cron_expression(schedule: &ScheduleConfig) -> Result<String, FabriqError> {
    let hour = schedule.hour;
    match schedule.frequency {
        Frequency::Daily => Ok(format!("0 0 {} * * *", hour)),
        Frequency::Weekly => match schedule.weekday() {
            Some(weekday) => Ok(format!("0 0 {} * * {}", hour, weekday)),
            None => Err(FabriqError::config("Weekly schedule needs a valid day_of_week")),
        },
        Frequency::Monthly => match schedule.day_of_month {
            Some(day) => Ok(format!("0 0 {} {} * *", hour, day)),
            None => Err(FabriqError::config("Monthly schedule needs day_of_month")),
        },
    }
}

/// Parsed cron schedule for `schedule`
pub fn cron_schedule(schedule: &ScheduleConfig) -> Result<Schedule, FabriqError> {
    let expression = cron_expression(schedule)?;
    Schedule::from_str(&expression)
        .map_err(|e| FabriqError::config(format!("Invalid schedule '{}': {}", expression, e)))
}

/// First time strictly after `after` at which `schedule` fires
pub fn next_fire<Tz: TimeZone>(
    schedule: &ScheduleConfig,
    after: &DateTime<Tz>,
) -> Option<DateTime<Tz>> {
    cron_schedule(schedule).ok()?.after(after).next()
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(OUTPUT_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// Run one async function to completion, logging its outcome
pub async fn run_async_function(
    engine: &Engine,
    config: &EngineConfig,
    func: &AsyncFunctionConfig,
) {
    log::info!("Running async function for system '{}'", func.system_id);

    let system = match config.get_system(&func.system_id) {
        Ok(system) => system,
        Err(e) => {
            log::error!("Async function error: {}", e);
            return;
        }
    };

    let mut events = engine.execute_run(system, func.prompt.clone()).await;
    let mut output = None;
    while let Some(event) = events.next().await {
        match event.kind {
            EventKind::Token => output = Some(event.content),
            EventKind::Error => {
                log::error!(
                    "Async function '{}' error: {}",
                    func.system_id,
                    event.content
                );
            }
            _ => {}
        }
    }

    if let Some(output) = output {
        log::info!(
            "Async function '{}' completed. Output: {}",
            func.system_id,
            preview(&output)
        );
    }
}

/// Owns the scheduled tasks
#[derive(Default)]
pub struct Scheduler {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any running schedule with the async functions of `config`
    pub async fn start(&self, config: Arc<EngineConfig>, engine: Engine) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }

        for func in config.async_functions.iter().cloned() {
            log::info!(
                "Scheduled async function: system={}, frequency={}, hour={}",
                func.system_id,
                func.schedule.frequency,
                func.schedule.hour
            );
            let schedule = match cron_schedule(&func.schedule) {
                Ok(schedule) => schedule,
                Err(e) => {
                    log::error!("Not scheduling '{}': {}", func.system_id, e);
                    continue;
                }
            };
            let config = config.clone();
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let now = chrono::Local::now();
                    let Some(next) = schedule.after(&now).next() else {
                        log::error!("Schedule for '{}' never fires, stopping", func.system_id);
                        return;
                    };
                    let wait = (next - now).to_std().unwrap_or_default();
                    tokio::time::sleep(wait).await;
                    run_async_function(&engine, &config, &func).await;
                }
            }));
        }
    }

    /// Abort every scheduled task
    pub async fn shutdown(&self) {
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            handle.abort();
        }
    }

    /// Number of scheduled tasks
    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
