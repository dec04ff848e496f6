//! Execution strategies: how one pipeline invocation is split.
//!
//! A pipeline without a `microbatch` variables sub-record runs once (full
//! strategy). With one, the invocation becomes an ascending list of
//! half-open batch windows derived from the stored cursor, `begin`/`end`,
//! `batch_size`, and `lookback`. All window math takes `now` as an
//! argument so plans are reproducible under a frozen clock.

use chrono::{DateTime, Duration, NaiveDateTime};
use dft_types::state::LAST_PROCESSED_TIMESTAMP;
use dft_types::time::parse_timestamp;
use dft_types::{BatchWindow, MicrobatchConfig, Pipeline, StateMap};

use crate::error::{EngineError, Result};

/// The derived, transient plan for one pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionPlan {
    /// One run, no window.
    Full,
    /// One run per window, in ascending order.
    Microbatch { windows: Vec<BatchWindow> },
}

impl ExecutionPlan {
    /// Number of runner invocations this plan produces.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        match self {
            Self::Full => 1,
            Self::Microbatch { windows } => windows.len(),
        }
    }
}

/// Build the plan for one pipeline.
///
/// # Errors
///
/// Returns [`EngineError::MicrobatchConfig`] for a malformed sub-record,
/// an unparseable or inverted `begin`/`end`, or a first run without
/// `begin`.
pub fn build_plan(
    pipeline: &Pipeline,
    state: &StateMap,
    now: NaiveDateTime,
    full_refresh: bool,
) -> Result<ExecutionPlan> {
    let Some(config) = pipeline
        .microbatch()
        .map_err(EngineError::MicrobatchConfig)?
    else {
        return Ok(ExecutionPlan::Full);
    };
    let windows = compute_windows(&config, state, now, full_refresh)?;
    Ok(ExecutionPlan::Microbatch { windows })
}

fn parse_bound(field: &str, value: Option<&str>) -> Result<Option<NaiveDateTime>> {
    match value {
        None => Ok(None),
        Some(raw) => parse_timestamp(raw).map(Some).ok_or_else(|| {
            EngineError::MicrobatchConfig(format!("invalid {field} '{raw}'"))
        }),
    }
}

/// Enumerate the windows to process in this invocation.
///
/// # Errors
///
/// Returns [`EngineError::MicrobatchConfig`] as described on
/// [`build_plan`].
pub fn compute_windows(
    config: &MicrobatchConfig,
    state: &StateMap,
    now: NaiveDateTime,
    full_refresh: bool,
) -> Result<Vec<BatchWindow>> {
    let size = config.batch_size.duration();
    let begin = parse_bound("begin", config.begin.as_deref())?;
    let end_config = parse_bound("end", config.end.as_deref())?;
    if let (Some(begin), Some(end)) = (begin, end_config) {
        if end < begin {
            return Err(EngineError::MicrobatchConfig(format!(
                "end '{end}' precedes begin '{begin}'"
            )));
        }
    }

    let stored_cursor = if full_refresh {
        None
    } else {
        state
            .get(LAST_PROCESSED_TIMESTAMP)
            .and_then(serde_json::Value::as_str)
            .and_then(parse_timestamp)
    };
    let cursor = stored_cursor.or(begin).ok_or_else(|| {
        EngineError::MicrobatchConfig(
            "begin is required when no cursor is stored".to_string(),
        )
    })?;

    let mut start = cursor - size * i32::try_from(config.lookback).unwrap_or(i32::MAX);
    if let Some(begin) = begin {
        if start < begin {
            start = begin;
        }
    }

    let end_limit = end_config.map_or(now, |end| end.min(now));
    let end = truncate_to_period(end_limit, size);

    let mut windows = Vec::new();
    let mut window_start = start;
    while window_start < end {
        let window_end = (window_start + size).min(end);
        windows.push(BatchWindow {
            start: window_start,
            end: window_end,
            period: config.batch_size,
            event_time_column: config.event_time_column.clone(),
        });
        window_start = window_end;
    }
    Ok(windows)
}

/// Truncate down to a multiple of `size` aligned to the epoch.
fn truncate_to_period(ts: NaiveDateTime, size: Duration) -> NaiveDateTime {
    let step = size.num_seconds();
    let truncated = ts.and_utc().timestamp().div_euclid(step) * step;
    DateTime::from_timestamp(truncated, 0)
        .expect("truncated timestamp is in range")
        .naive_utc()
}
