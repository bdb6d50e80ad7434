use num_integer::gcd;
use std::fs;
use yaml_rust::{Yaml, YamlLoader};

use crate::dag_task::TaskSet;
use crate::error::AnalysisError;

/// Digits of the fixed integer unit: input milliseconds become microseconds.
pub const TIME_UNIT_DIGITS: u32 = 3;

pub fn load_yaml(file_path: &str) -> Result<Vec<Yaml>, AnalysisError> {
    let content = fs::read_to_string(file_path)?;
    Ok(YamlLoader::load_from_str(&content)?)
}

/// Least common multiple of the periods, or `None` when it does not fit in an `i64`.
pub fn get_hyper_period(periods: &[i32]) -> Option<i64> {
    periods.iter().try_fold(1i64, |hyper_period, &period| {
        let period = period as i64;
        (hyper_period / gcd(hyper_period, period)).checked_mul(period)
    })
}

/// Number of vertex instances released during one hyperperiod of the task set.
/// `None` when the hyperperiod or the count overflows.
pub fn get_total_jobs_per_hyper_period(task_set: &TaskSet) -> Option<i64> {
    let periods = task_set
        .tasks
        .iter()
        .map(|task| task.period)
        .collect::<Vec<_>>();
    let hyper_period = get_hyper_period(&periods)?;
    task_set.tasks.iter().try_fold(0i64, |jobs, task| {
        (hyper_period / task.period as i64)
            .checked_mul(task.vertex_count() as i64)
            .and_then(|task_jobs| jobs.checked_add(task_jobs))
    })
}

/// Converts a non-negative decimal duration into integer units of `10^-digits`,
/// rounding up. Plain decimal notation is converted on its digits, so the result is
/// exact and preserves ordering; exponent notation falls back to `f64`.
///
/// Returns `None` for negative, non-numeric or out-of-range input.
pub fn scale_to_integer_units(text: &str, digits: u32) -> Option<i32> {
    let text = text.trim();
    let text = text.strip_prefix('+').unwrap_or(text);
    if text.is_empty() || text.starts_with('-') {
        return None;
    }
    if text.contains(['e', 'E']) {
        let value = text.parse::<f64>().ok()?;
        if !value.is_finite() || value < 0.0 {
            return None;
        }
        let scaled = (value * 10f64.powi(digits as i32)).ceil();
        return if scaled <= i32::MAX as f64 {
            Some(scaled as i32)
        } else {
            None
        };
    }

    let (integer_part, fraction_part) = match text.split_once('.') {
        Some((integer_part, fraction_part)) => (integer_part, fraction_part),
        None => (text, ""),
    };
    let is_digits = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if (integer_part.is_empty() && fraction_part.is_empty())
        || !is_digits(integer_part)
        || !is_digits(fraction_part)
    {
        return None;
    }

    let mut scaled: i64 = 0;
    for c in integer_part.chars() {
        scaled = scaled
            .checked_mul(10)?
            .checked_add(c.to_digit(10)? as i64)?;
    }
    for position in 0..digits as usize {
        let digit = fraction_part
            .chars()
            .nth(position)
            .and_then(|c| c.to_digit(10))
            .unwrap_or(0);
        scaled = scaled.checked_mul(10)?.checked_add(digit as i64)?;
    }
    if fraction_part
        .chars()
        .skip(digits as usize)
        .any(|c| c != '0')
    {
        scaled = scaled.checked_add(1)?;
    }
    i32::try_from(scaled).ok()
}
