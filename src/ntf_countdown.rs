// Live countdowns for scheduled arrivals
//
// Schedule times arrive as civil "YYYY-MM-DD HH:MM:SS" strings in Hong Kong
// time. They are read in a fixed UTC+8 frame; no timezone database involved.
use crate::ntf_models::{ArrivalSlot, Direction, ScheduleResult};
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const HKT_OFFSET_SECS: i32 = 8 * 3600;
pub const SCHEDULE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Remaining-Time Calculator
// ============================================================================

fn hkt() -> FixedOffset {
    FixedOffset::east_opt(HKT_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parse a schedule time string into an instant. `None` when empty or malformed.
pub fn parse_schedule_time(scheduled_time: &str) -> Option<DateTime<FixedOffset>> {
    let scheduled_time = scheduled_time.trim();
    if scheduled_time.is_empty() {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(scheduled_time, SCHEDULE_TIME_FORMAT).ok()?;
    hkt().from_local_datetime(&naive).single()
}

/// Seconds from `now_utc` until `scheduled_time`, rounded up. Negative once the train is due.
pub fn remaining_seconds(scheduled_time: &str, now_utc: DateTime<Utc>) -> Option<i64> {
    let target = parse_schedule_time(scheduled_time)?;
    let diff_ms = (target.with_timezone(&Utc) - now_utc).num_milliseconds();

    let whole = diff_ms.div_euclid(1000);
    Some(if diff_ms.rem_euclid(1000) > 0 { whole + 1 } else { whole })
}

/// Scheduled wall-clock time as "HH:MM", or "--:--".
pub fn format_schedule_clock(scheduled_time: &str) -> String {
    match parse_schedule_time(scheduled_time) {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

// ============================================================================
// Presentation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Critical,
    Urgent,
    Normal,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub remaining: Option<i64>,
}

impl Countdown {
    pub fn new(remaining: Option<i64>) -> Self {
        Countdown { remaining }
    }

    pub fn at(scheduled_time: &str, now_utc: DateTime<Utc>) -> Self {
        Countdown::new(remaining_seconds(scheduled_time, now_utc))
    }

    pub fn urgency(&self) -> Urgency {
        match self.remaining {
            None => Urgency::Unknown,
            Some(r) if r <= 0 => Urgency::Critical,
            Some(r) if r < 60 => Urgency::Urgent,
            Some(_) => Urgency::Normal,
        }
    }

    /// Unknown times read "N/A" rather than "Arriving", so a bad timestamp is not mistaken for a due train.
    pub fn display(&self) -> String {
        match self.remaining {
            None => "N/A".to_string(),
            Some(r) if r <= 0 => "Arriving".to_string(),
            Some(r) => format!("{}:{:02}", r / 60, r % 60),
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

// ============================================================================
// Countdown Timers
// ============================================================================

/// A recomputed countdown for one visible arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub board: u64,
    pub slot: ArrivalSlot,
    pub countdown: Countdown,
}

/// Periodic task for a single arrival. Stops when dropped.
pub struct CountdownTimer {
    handle: JoinHandle<()>,
}

impl CountdownTimer {
    /// Publish a countdown for `slot` now and then every `period`.
    ///
    /// The arrival is looked up in `store` on every tick. The task ends by
    /// itself when the slot disappears or nobody listens any more.
    pub fn start(
        board: u64,
        slot: ArrivalSlot,
        store: watch::Receiver<Option<ScheduleResult>>,
        clock: Arc<dyn Clock>,
        period: Duration,
        ticks: mpsc::UnboundedSender<CountdownTick>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;

                let scheduled_time = match store.borrow().as_ref().and_then(|r| r.arrival(slot)) {
                    Some(arrival) => arrival.scheduled_time.clone(),
                    None => break,
                };

                let countdown = Countdown::at(&scheduled_time, clock.now());
                if ticks.send(CountdownTick { board, slot, countdown }).is_err() {
                    break;
                }
            }
            debug!("Countdown for {:?} on board {} finished", slot, board);
        });

        CountdownTimer { handle }
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Timers for the arrivals currently on screen (one direction of one schedule).
pub struct CountdownBoard {
    id: u64,
    direction: Direction,
    timers: Vec<CountdownTimer>,
}

impl CountdownBoard {
    pub fn start(
        id: u64,
        direction: Direction,
        store: &watch::Receiver<Option<ScheduleResult>>,
        clock: Arc<dyn Clock>,
        period: Duration,
        ticks: &mpsc::UnboundedSender<CountdownTick>,
    ) -> Self {
        let count = store.borrow().as_ref().map(|r| r.arrivals(direction).len()).unwrap_or(0);
        let timers = (0..count)
            .map(|index| {
                let slot = ArrivalSlot { direction, index };
                CountdownTimer::start(id, slot, store.clone(), Arc::clone(&clock), period, ticks.clone())
            })
            .collect();

        debug!("Board {} started {} countdown(s) for {:?}", id, count, direction);
        CountdownBoard { id, direction, timers }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }
}

#[cfg(test)]
impl CountdownTimer {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }
}

#[cfg(test)]
impl CountdownBoard {
    pub fn running(&self) -> usize {
        self.timers.iter().filter(|t| t.is_running()).count()
    }
}
