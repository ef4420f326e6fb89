//! Seeded synthetic bar series for demos, benches and tests.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::Bar;

const FAST_WINDOW: usize = 10;
const SLOW_WINDOW: usize = 30;

fn start() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2020, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

/// A daily random walk from 100.0 with a moving-average crossover signal.
///
/// Signal is +1 while the fast mean is above the slow mean, -1 while below,
/// and 0 until the slow window fills. Same `(n, seed)` yields the same bars.
pub fn random_walk(n: usize, seed: u64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::with_capacity(n);
    let mut price = 100.0_f64;
    let t0 = start();

    for i in 0..n {
        let daily_return: f64 = rng.gen_range(-0.03..0.03);
        let open = price;
        let close = price * (1.0 + daily_return);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64) as f64;

        bars.push(Bar {
            timestamp: t0 + Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume,
            signal: 0,
        });
        price = close;
    }

    apply_crossover_signal(&mut bars, FAST_WINDOW, SLOW_WINDOW);
    bars
}

/// Overwrite `signal` with a fast/slow simple moving average crossover.
pub fn apply_crossover_signal(bars: &mut [Bar], fast: usize, slow: usize) {
    if fast == 0 || slow == 0 {
        return;
    }
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let mean = |end: usize, window: usize| -> f64 {
        closes[end + 1 - window..=end].iter().sum::<f64>() / window as f64
    };

    for (i, bar) in bars.iter_mut().enumerate() {
        bar.signal = if i + 1 < slow.max(fast) {
            0
        } else {
            let diff = mean(i, fast) - mean(i, slow);
            if diff > 0.0 {
                1
            } else if diff < 0.0 {
                -1
            } else {
                0
            }
        };
    }
}
