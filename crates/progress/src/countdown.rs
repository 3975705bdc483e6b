//! Human-readable countdown text.

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 3600;

/// Renders a remaining duration, e.g. `Approximately 1 hour, 5 minutes left.`
///
/// From one hour up the text is whole hours plus rounded minutes (omitted
/// when zero). Below that it is rounded minutes, then plain seconds. Rounding
/// is half-to-even.
pub fn human_readable_countdown(secs: u64) -> String {
    if secs >= SECS_PER_HOUR {
        let mut hours = secs / SECS_PER_HOUR;
        let mut minutes = round_minutes(secs % SECS_PER_HOUR);
        if minutes == 60 {
            hours += 1;
            minutes = 0;
        }
        let hours_text = plural(hours, "hour");
        if minutes == 0 {
            return format!("Approximately {hours_text} left.");
        }
        return format!(
            "Approximately {hours_text}, {} left.",
            plural(minutes, "minute")
        );
    }

    if secs >= SECS_PER_MINUTE {
        return format!("Approximately {} left.", plural(round_minutes(secs), "minute"));
    }

    format!("Approximately {} left.", plural(secs, "second"))
}

fn round_minutes(secs: u64) -> u64 {
    (secs as f64 / SECS_PER_MINUTE as f64).round_ties_even() as u64
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit}")
    } else {
        format!("{count} {unit}s")
    }
}
