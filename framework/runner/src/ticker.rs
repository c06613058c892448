use std::time::Duration;
use tokio::time::Instant;

/// A scheduled instant at which one iteration should begin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Position of the tick in its scenario's schedule, starting from 0.
    pub seq: u64,
    /// When the tick was due. The difference to when it actually fired is the schedule lag.
    pub scheduled_at: Instant,
}

/// Produces ticks at a constant rate for a bounded duration.
///
/// The deadline of tick `k` is `start + k * time_unit / rate`, computed from the tick index in
/// integer nanoseconds. Deadlines therefore never depend on when earlier ticks actually fired, so a
/// late wake up does not push back the rest of the schedule and rounding errors do not accumulate.
#[derive(Debug)]
pub struct Ticker {
    start: Instant,
    rate: u64,
    time_unit_nanos: u128,
    duration: Duration,
    max_ticks: Option<u64>,
    next_seq: u64,
}

impl Ticker {
    pub fn new(
        start: Instant,
        rate: u64,
        time_unit: Duration,
        duration: Duration,
        max_ticks: Option<u64>,
    ) -> Self {
        Self {
            start,
            rate,
            time_unit_nanos: time_unit.as_nanos(),
            duration,
            max_ticks,
            next_seq: 0,
        }
    }

    /// Offset of tick `seq` from the start of the schedule.
    pub fn offset_of(&self, seq: u64) -> Duration {
        nominal_offset(self.rate, self.time_unit_nanos, seq)
    }

    /// The instant at which the schedule ends, whether or not all ticks have been consumed.
    pub fn end(&self) -> Instant {
        self.start + self.duration
    }

    /// The number of ticks that have been produced so far.
    pub fn produced(&self) -> u64 {
        self.next_seq
    }

    /// The deadline of the next tick, or `None` if the schedule is complete.
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.rate == 0 || self.max_ticks.is_some_and(|max| self.next_seq >= max) {
            return None;
        }

        let offset = self.offset_of(self.next_seq);
        if offset >= self.duration {
            return None;
        }

        Some(self.start + offset)
    }

    /// Wait for the next tick. Returns `None` once the schedule is complete.
    ///
    /// This is cancel safe. If the returned future is dropped before it completes then the tick is
    /// not consumed and the next call waits for the same deadline.
    pub async fn next_tick(&mut self) -> Option<Tick> {
        let deadline = self.next_deadline()?;
        tokio::time::sleep_until(deadline).await;

        let tick = Tick {
            seq: self.next_seq,
            scheduled_at: deadline,
        };
        self.next_seq += 1;

        Some(tick)
    }
}

/// The number of ticks a schedule will produce if it runs to completion.
pub fn expected_ticks(
    rate: u64,
    time_unit: Duration,
    duration: Duration,
    max_ticks: Option<u64>,
) -> u64 {
    let time_unit_nanos = time_unit.as_nanos();
    if rate == 0 || time_unit_nanos == 0 {
        return 0;
    }

    // Ticks fire at offsets strictly below the duration, so this is ceil(duration * rate / unit).
    let scheduled = (duration.as_nanos() * rate as u128).div_ceil(time_unit_nanos);
    let scheduled = u64::try_from(scheduled).unwrap_or(u64::MAX);

    match max_ticks {
        Some(max) => scheduled.min(max),
        None => scheduled,
    }
}

fn nominal_offset(rate: u64, time_unit_nanos: u128, seq: u64) -> Duration {
    let nanos = time_unit_nanos * seq as u128 / rate as u128;
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_evenly_spaced() {
        let ticker = Ticker::new(
            Instant::now(),
            20,
            Duration::from_secs(1),
            Duration::from_secs(1),
            None,
        );

        assert_eq!(Duration::ZERO, ticker.offset_of(0));
        assert_eq!(Duration::from_millis(50), ticker.offset_of(1));
        assert_eq!(Duration::from_millis(950), ticker.offset_of(19));
    }

    #[test]
    fn offsets_do_not_accumulate_rounding() {
        // 3 per second does not divide evenly into nanoseconds
        let ticker = Ticker::new(
            Instant::now(),
            3,
            Duration::from_secs(1),
            Duration::from_secs(3600),
            None,
        );

        assert_eq!(Duration::from_secs(1), ticker.offset_of(3));
        assert_eq!(Duration::from_secs(3000), ticker.offset_of(9000));
    }

    #[test]
    fn expected_tick_counts() {
        let second = Duration::from_secs(1);
        assert_eq!(20, expected_ticks(20, second, second, None));
        assert_eq!(600, expected_ticks(20, second, Duration::from_secs(30), None));
        assert_eq!(10, expected_ticks(20, second, second, Some(10)));
        assert_eq!(
            2,
            expected_ticks(3, second, Duration::from_millis(500), None)
        );
        assert_eq!(
            5,
            expected_ticks(1, Duration::from_millis(200), second, None)
        );
        assert_eq!(0, expected_ticks(0, second, second, None));
    }

    #[tokio::test(start_paused = true)]
    async fn produces_every_scheduled_tick_in_order() {
        let start = Instant::now();
        let mut ticker = Ticker::new(
            start,
            20,
            Duration::from_secs(1),
            Duration::from_secs(1),
            None,
        );

        let mut ticks = Vec::new();
        while let Some(tick) = ticker.next_tick().await {
            ticks.push(tick);
        }

        assert_eq!(20, ticks.len());
        for (i, tick) in ticks.iter().enumerate() {
            assert_eq!(i as u64, tick.seq);
            assert_eq!(start + Duration::from_millis(50 * i as u64), tick.scheduled_at);
        }
        assert_eq!(20, ticker.produced());
        assert_eq!(None, ticker.next_deadline());
    }

    #[tokio::test(start_paused = true)]
    async fn late_wake_up_does_not_shift_the_schedule() {
        let start = Instant::now();
        let mut ticker = Ticker::new(
            start,
            10,
            Duration::from_secs(1),
            Duration::from_secs(1),
            None,
        );

        ticker.next_tick().await.unwrap();
        // Stall well past the next two deadlines.
        tokio::time::sleep(Duration::from_millis(250)).await;

        let late = ticker.next_tick().await.unwrap();
        assert_eq!(start + Duration::from_millis(100), late.scheduled_at);

        let next = ticker.next_tick().await.unwrap();
        assert_eq!(start + Duration::from_millis(200), next.scheduled_at);

        let on_time = ticker.next_tick().await.unwrap();
        assert_eq!(start + Duration::from_millis(300), on_time.scheduled_at);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_at_tick_limit() {
        let mut ticker = Ticker::new(
            Instant::now(),
            100,
            Duration::from_secs(1),
            Duration::from_secs(60),
            Some(3),
        );

        let mut count = 0;
        while ticker.next_tick().await.is_some() {
            count += 1;
        }
        assert_eq!(3, count);
    }
}
