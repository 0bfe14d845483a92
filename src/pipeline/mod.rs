//! One digest run: fetch, normalize, summarize, aggregate, deliver.
//!
//! Nothing escapes [`DigestPipeline::run`]. Errors and panics inside a phase
//! end the run in [`RunState::Failed`] and are logged with the period.

use anyhow::Result;
use chrono::Local;
use log::{error, info, warn};
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};

use crate::config::Config;
use crate::delivery::DigestDelivery;
use crate::digest::build_digest;
use crate::domain::digest::{DigestReport, Period};
use crate::domain::email::EmailMessage;
use crate::mail::MailSource;
use crate::mail::normalize::normalize;
use crate::summarizer::Summarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Fetching,
    Summarizing,
    Aggregating,
    Done,
    Failed,
}

#[derive(Debug)]
pub enum RunOutcome {
    /// Nothing arrived in the lookback window; no digest was produced.
    Empty,
    Completed {
        report: DigestReport,
        delivered: bool,
    },
    /// `state` is the phase that was running when the run failed.
    Failed { state: RunState, reason: String },
}

impl RunOutcome {
    pub fn final_state(&self) -> RunState {
        match self {
            RunOutcome::Empty | RunOutcome::Completed { .. } => RunState::Done,
            RunOutcome::Failed { .. } => RunState::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub morning_lookback_hours: u32,
    pub evening_lookback_hours: u32,
    pub max_emails: usize,
}

impl PipelineSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            morning_lookback_hours: cfg.lookback_hours(Period::Morning),
            evening_lookback_hours: cfg.lookback_hours(Period::Evening),
            max_emails: cfg.digest.max_emails_per_digest,
        }
    }

    pub fn lookback_hours(&self, period: Period) -> u32 {
        match period {
            Period::Morning => self.morning_lookback_hours,
            Period::Evening => self.evening_lookback_hours,
        }
    }
}

pub struct DigestPipeline {
    source: Box<dyn MailSource>,
    summarizer: Summarizer,
    delivery: Box<dyn DigestDelivery>,
    settings: PipelineSettings,
    state: Cell<RunState>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl DigestPipeline {
    pub fn new(
        source: Box<dyn MailSource>,
        summarizer: Summarizer,
        delivery: Box<dyn DigestDelivery>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            source,
            summarizer,
            delivery,
            settings,
            state: Cell::new(RunState::Idle),
        }
    }

    /// State reached by the most recent run, `Idle` before the first.
    pub fn state(&self) -> RunState {
        self.state.get()
    }

    fn enter(&self, period: Period, state: RunState) {
        info!("[{period}] {:?} -> {state:?}", self.state.get());
        self.state.set(state);
    }

    pub fn run_morning_cycle(&self) -> RunOutcome {
        self.run(Period::Morning)
    }

    pub fn run_evening_cycle(&self) -> RunOutcome {
        self.run(Period::Evening)
    }

    pub fn run(&self, period: Period) -> RunOutcome {
        self.state.set(RunState::Idle);
        info!(
            "Starting {period} digest run via {} / {}",
            self.source.name(),
            self.summarizer.model_name()
        );

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_phases(period)));
        let reason = match result {
            Ok(Ok(outcome)) => {
                self.enter(period, RunState::Done);
                return outcome;
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(payload) => format!("panic: {}", panic_message(payload.as_ref())),
        };

        let failed_in = self.state.get();
        error!("{period} digest run failed during {failed_in:?}: {reason}");
        self.enter(period, RunState::Failed);
        RunOutcome::Failed {
            state: failed_in,
            reason,
        }
    }

    fn run_phases(&self, period: Period) -> Result<RunOutcome> {
        self.enter(period, RunState::Fetching);
        let lookback = self.settings.lookback_hours(period);
        let raw = self.source.fetch(lookback, self.settings.max_emails)?;
        if raw.is_empty() {
            info!("No emails in the last {lookback}h, skipping {period} digest");
            return Ok(RunOutcome::Empty);
        }
        let emails: Vec<EmailMessage> = raw.iter().map(normalize).collect();
        info!("Fetched {} emails for the {period} digest", emails.len());

        self.enter(period, RunState::Summarizing);
        let summaries = self.summarizer.summarize_all(&emails);
        if summaries.is_empty() {
            warn!("None of {} emails could be summarized", emails.len());
        }

        self.enter(period, RunState::Aggregating);
        let report = build_digest(summaries, period, Local::now());
        info!(
            "Digest {}: {} emails, {} high priority",
            report.report_id, report.email_count, report.high_priority_count
        );

        let delivered = self.delivery.deliver(&report);
        if !delivered {
            warn!("Digest {} was built but not delivered", report.report_id);
        }
        Ok(RunOutcome::Completed { report, delivered })
    }
}
