use rust_decimal::Decimal;
use time::OffsetDateTime;

/// Result of pricing one rental window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingQuote {
    duration_minutes: i64,
    billed_hours: i64,
    total_cost: Decimal,
}

impl BillingQuote {
    pub fn duration_minutes(&self) -> i64 {
        self.duration_minutes
    }

    pub fn billed_hours(&self) -> i64 {
        self.billed_hours
    }

    pub fn total_cost(&self) -> Decimal {
        self.total_cost
    }
}

/// Prices the elapsed window at `hourly_rate`.
///
/// Policy: elapsed time is rounded to whole minutes (half-up on seconds),
/// then billed in whole hours, rounding partial hours up. A zero-length
/// window bills zero. `ended_at` earlier than `started_at` is clamped to
/// zero rather than trusted, so clock skew can never produce a negative
/// charge.
pub fn quote(
    started_at: OffsetDateTime,
    ended_at: OffsetDateTime,
    hourly_rate: Decimal,
) -> BillingQuote {
    let elapsed_seconds = (ended_at - started_at).whole_seconds().max(0);
    let duration_minutes = (elapsed_seconds + 30) / 60;
    // `i64::div_ceil` is still unstable (int_roundings); duration_minutes is
    // non-negative here, so this is the exact equivalent on stable.
    let billed_hours = (duration_minutes + 59) / 60;
    BillingQuote {
        duration_minutes,
        billed_hours,
        total_cost: hourly_rate * Decimal::from(billed_hours),
    }
}

#[cfg(test)]
mod test {
    use rust_decimal::Decimal;
    use time::{Duration, OffsetDateTime};

    use super::quote;

    const T0: OffsetDateTime = OffsetDateTime::UNIX_EPOCH;

    fn rate(units: i64) -> Decimal {
        Decimal::new(units, 0)
    }

    #[test]
    fn ninety_minutes_bills_two_hours() {
        let q = quote(T0, T0 + Duration::minutes(90), rate(10));
        assert_eq!(q.duration_minutes(), 90);
        assert_eq!(q.billed_hours(), 2);
        assert_eq!(q.total_cost(), rate(20));
    }

    #[test]
    fn zero_length_window_bills_zero() {
        let q = quote(T0, T0, rate(10));
        assert_eq!(q.duration_minutes(), 0);
        assert_eq!(q.billed_hours(), 0);
        assert_eq!(q.total_cost(), Decimal::ZERO);
    }

    #[test]
    fn exact_hour_is_not_rounded_up() {
        let q = quote(T0, T0 + Duration::hours(1), rate(10));
        assert_eq!(q.billed_hours(), 1);
        assert_eq!(q.total_cost(), rate(10));
    }

    #[test]
    fn one_minute_over_bills_next_hour() {
        let q = quote(T0, T0 + Duration::minutes(61), rate(10));
        assert_eq!(q.billed_hours(), 2);
        assert_eq!(q.total_cost(), rate(20));
    }

    #[test]
    fn seconds_round_half_up_to_minutes() {
        let q = quote(T0, T0 + Duration::seconds(29), rate(10));
        assert_eq!(q.duration_minutes(), 0);
        assert_eq!(q.total_cost(), Decimal::ZERO);

        let q = quote(T0, T0 + Duration::seconds(30), rate(10));
        assert_eq!(q.duration_minutes(), 1);
        assert_eq!(q.billed_hours(), 1);
        assert_eq!(q.total_cost(), rate(10));
    }

    #[test]
    fn skewed_clock_clamps_to_zero() {
        let q = quote(T0, T0 - Duration::minutes(5), rate(10));
        assert_eq!(q.duration_minutes(), 0);
        assert_eq!(q.total_cost(), Decimal::ZERO);
    }

    #[test]
    fn fractional_rate_multiplies_exactly() {
        // 2.50 per hour, 3 billed hours.
        let q = quote(T0, T0 + Duration::minutes(125), Decimal::new(250, 2));
        assert_eq!(q.billed_hours(), 3);
        assert_eq!(q.total_cost(), Decimal::new(750, 2));
    }
}
