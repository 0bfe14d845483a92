use anyhow::{Result, anyhow};
use chrono::{DateTime, Local};
use cron::Schedule;
use log::{info, warn};
use std::{
    str::FromStr,
    sync::Arc,
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::Duration,
};

use crate::config::Config;
use crate::domain::digest::Period;
use crate::pipeline::{DigestPipeline, RunOutcome};

const SLEEP_SLICE: Duration = Duration::from_secs(1);

/// Parse a cron expression. Five-field expressions get a leading seconds
/// field of `0`.
pub fn parse_schedule(expr: &str) -> Result<Schedule, cron::error::Error> {
    let expr = expr.trim();
    if expr.split_whitespace().count() == 5 {
        Schedule::from_str(&format!("0 {expr}"))
    } else {
        Schedule::from_str(expr)
    }
}

pub fn next_fire(schedule: &Schedule, after: DateTime<Local>) -> Option<DateTime<Local>> {
    schedule.after(&after).next()
}

/// The earlier of the two upcoming cycles. Ties go to the morning run.
pub fn next_due(
    morning: &Schedule,
    evening: &Schedule,
    now: DateTime<Local>,
) -> Option<(Period, DateTime<Local>)> {
    let m = next_fire(morning, now).map(|at| (Period::Morning, at));
    let e = next_fire(evening, now).map(|at| (Period::Evening, at));
    match (m, e) {
        (Some(m), Some(e)) => Some(if e.1 < m.1 { e } else { m }),
        (m, e) => m.or(e),
    }
}

fn sleep_until(at: DateTime<Local>, running: &AtomicBool) {
    while running.load(Ordering::SeqCst) && Local::now() < at {
        thread::sleep(SLEEP_SLICE);
    }
}

/// Run morning and evening cycles on their schedules until Ctrl-C.
pub fn run_daemon(pipeline: &DigestPipeline, cfg: &Config) -> Result<()> {
    let morning = parse_schedule(cfg.schedule(Period::Morning))?;
    let evening = parse_schedule(cfg.schedule(Period::Evening))?;

    let running = Arc::new(AtomicBool::new(true));
    let r2 = running.clone();
    ctrlc::set_handler(move || {
        r2.store(false, Ordering::SeqCst);
    })?;

    while running.load(Ordering::SeqCst) {
        let (period, at) = next_due(&morning, &evening, Local::now())
            .ok_or_else(|| anyhow!("neither schedule has an upcoming run"))?;
        info!("Next {period} digest at {}", at.format("%Y-%m-%d %H:%M:%S"));

        sleep_until(at, &running);
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let outcome = match period {
            Period::Morning => pipeline.run_morning_cycle(),
            Period::Evening => pipeline.run_evening_cycle(),
        };
        if let RunOutcome::Failed { state, .. } = outcome {
            warn!("{period} cycle failed in {state:?}; waiting for the next slot");
        }
    }

    info!("Scheduler stopped");
    Ok(())
}
