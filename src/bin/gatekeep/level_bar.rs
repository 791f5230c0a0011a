//! One-line ASCII level display for the terminal while listening.

/// Characters for the meter bar.
const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';
const THRESHOLD_MARKER: char = '│';

/// Meter display configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BarConfig {
    /// Level at the left edge (dBFS)
    pub min_db: f32,
    /// Level at the right edge (dBFS)
    pub max_db: f32,
    /// Width in characters
    pub width: usize,
}

impl Default for BarConfig {
    fn default() -> Self {
        Self {
            min_db: -60.0,
            max_db: 0.0,
            width: 30,
        }
    }
}

fn position(db: f32, config: &BarConfig) -> usize {
    let range = config.max_db - config.min_db;
    if range <= 0.0 || !db.is_finite() {
        return 0;
    }
    let ratio = ((db - config.min_db) / range).clamp(0.0, 1.0);
    (ratio * config.width as f32) as usize
}

/// Horizontal bar filled up to `level_db`, with the gate threshold marked when
/// it falls in the unfilled part.
#[must_use]
pub(crate) fn format_level_bar(level_db: f32, threshold_db: f32, config: &BarConfig) -> String {
    let filled = position(level_db, config);
    let marker = position(threshold_db, config);
    (0..config.width)
        .map(|i| {
            if i < filled {
                BAR_FULL
            } else if i == marker {
                THRESHOLD_MARKER
            } else {
                BAR_EMPTY
            }
        })
        .collect()
}

/// Bar plus the numeric level, e.g. `██████░░░│░░ -42 dB`.
#[must_use]
pub(crate) fn format_level_line(level_db: f32, threshold_db: f32) -> String {
    let bar = format_level_bar(level_db, threshold_db, &BarConfig::default());
    format!("{bar} {level_db:>4.0} dB")
}
