//! Console rendering helpers: price levels colored by bucket, delta values
//! highlighted green/red once their per-second velocity crosses a threshold,
//! and timestamped output lines.

use crossterm::style::{Color, Stylize};
use std::time::Duration;

/// Palette cycled over bucket indices so adjacent price levels stay visually
/// distinct as the ticker walks through them.
const PRICE_COLORS: [Color; 7] = [
    Color::White,
    Color::Red,
    Color::Blue,
    Color::Green,
    Color::Magenta,
    Color::Cyan,
    Color::DarkGrey,
];

/// Formatting knobs for one rendered value.
#[derive(Clone, Copy, Debug)]
pub struct ValueFormat {
    /// Per-second velocity magnitude before highlighting. `None` uses the
    /// style's default threshold.
    pub threshold: Option<f64>,
    pub pad: usize,
    pub decimals: usize,
    /// Force a leading `+` on positive values.
    pub plus: bool,
}

impl Default for ValueFormat {
    fn default() -> Self {
        Self {
            threshold: None,
            pad: 12,
            decimals: 0,
            plus: false,
        }
    }
}

/// Shared rendering context: whether color is enabled, the bucket step used
/// for price coloring, and the default highlight threshold.
#[derive(Clone, Debug)]
pub struct Style {
    colors: bool,
    step: f64,
    threshold: f64,
}

impl Style {
    pub fn new(step: f64, threshold: f64) -> Self {
        Self {
            colors: true,
            step,
            threshold,
        }
    }

    /// Same context with all coloring stripped, for non-tty output.
    pub fn plain(step: f64, threshold: f64) -> Self {
        Self {
            colors: false,
            step,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Render a price level, colored by its bucket index.
    pub fn price(&self, price: f64) -> String {
        let text = format!("{:>7}", group_thousands(price, 0, false));
        if !self.colors {
            return text;
        }
        let index = ((price / self.step) as i64).rem_euclid(PRICE_COLORS.len() as i64) as usize;
        text.with(PRICE_COLORS[index]).to_string()
    }

    /// Render a delta accumulated over `duration` with default formatting.
    pub fn value(&self, value: f64, duration: Duration) -> String {
        self.value_with(value, duration, ValueFormat::default())
    }

    /// Render a delta accumulated over `duration`. Highlighted green (red)
    /// when `value / duration` exceeds the (negated) threshold. A zero
    /// duration renders without highlighting.
    pub fn value_with(&self, value: f64, duration: Duration, format: ValueFormat) -> String {
        let text = format!(
            "{:>pad$}",
            group_thousands(value, format.decimals, format.plus),
            pad = format.pad
        );
        if !self.colors || duration.is_zero() {
            return text;
        }

        let per_sec = value / duration.as_secs_f64();
        let threshold = format.threshold.unwrap_or(self.threshold);
        if per_sec >= threshold {
            text.with(Color::Green).to_string()
        } else if per_sec <= -threshold {
            text.with(Color::Red).to_string()
        } else {
            text
        }
    }
}

/// Format `value` with thousands separators, e.g. `-12345.6` -> `-12,345.6`.
pub fn group_thousands(value: f64, decimals: usize, forced_sign: bool) -> String {
    let raw = if forced_sign {
        format!("{value:+.decimals$}")
    } else {
        format!("{value:.decimals$}")
    };

    let (mantissa, fraction) = match raw.split_once('.') {
        Some((mantissa, fraction)) => (mantissa, Some(fraction)),
        None => (raw.as_str(), None),
    };
    let (sign, digits) = match mantissa.strip_prefix(['-', '+']) {
        Some(digits) => (&mantissa[..1], digits),
        None => ("", mantissa),
    };

    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (position, ch) in digits.chars().enumerate() {
        let remaining = digits.len() - position;
        if position > 0 && remaining % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    match fraction {
        Some(fraction) => format!("{sign}{grouped}.{fraction}"),
        None => format!("{sign}{grouped}"),
    }
}

/// Prefix `text` with a local `%m-%d %H:%M:%S` timestamp, matching the
/// tracker's console line format.
pub fn timestamped(text: &str) -> String {
    format!("{} {}", chrono::Local::now().format("%m-%d %H:%M:%S"), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESC: char = '\u{1b}';

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0.0, 0, false), "0");
        assert_eq!(group_thousands(999.0, 0, false), "999");
        assert_eq!(group_thousands(11000.0, 0, false), "11,000");
        assert_eq!(group_thousands(1234567.0, 0, false), "1,234,567");
        assert_eq!(group_thousands(-12345.61, 1, false), "-12,345.6");
        assert_eq!(group_thousands(42.0, 0, true), "+42");
        assert_eq!(group_thousands(-500.0, 0, true), "-500");
    }

    #[test]
    fn test_plain_style_has_no_escape_codes() {
        let style = Style::plain(10.0, 5000.0);
        let line = format!(
            "{} {}",
            style.price(10234.5),
            style.value(1_000_000.0, Duration::from_secs(5))
        );
        assert!(!line.contains(ESC));
    }

    #[test]
    fn test_value_highlighted_above_threshold() {
        let style = Style::new(10.0, 5000.0);
        // 50_000 / 5s = 10_000/s, above the 5_000/s threshold.
        let hot = style.value(50_000.0, Duration::from_secs(5));
        assert!(hot.contains(ESC));

        let cold = style.value(1_000.0, Duration::from_secs(5));
        assert!(!cold.contains(ESC));

        let negative = style.value(-50_000.0, Duration::from_secs(5));
        assert!(negative.contains(ESC));
    }

    #[test]
    fn test_unbounded_duration_never_highlights() {
        let style = Style::new(10.0, 5000.0);
        assert!(!style.value(1e12, Duration::ZERO).contains(ESC));
    }

    #[test]
    fn test_price_pads_to_seven() {
        let style = Style::plain(10.0, 5000.0);
        assert_eq!(style.price(9500.0), "  9,500");
    }

    #[test]
    fn test_adjacent_buckets_color_differently() {
        let style = Style::new(10.0, 5000.0);
        assert_ne!(style.price(10230.0), style.price(10240.0));
    }
}
