use crate::cache::Flight;
use crate::db::{DbPair, repository};
use crate::db::repository::CourseTotal;
use crate::error::AppError;

/// Aggregate statistics are never cached as data: every call window
/// recomputes them from the store. Only the in-flight query is shared, so N
/// concurrent identical requests still cost one query.
pub struct StatsService {
    totals: Flight<String, Vec<CourseTotal>>,
    gpas: Flight<String, Vec<f64>>,
}

impl Default for StatsService {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsService {
    pub fn new() -> Self {
        Self {
            totals: Flight::new(),
            gpas: Flight::new(),
        }
    }

    pub async fn course_total_scores(
        &self,
        db: &DbPair,
        course_id: &str,
    ) -> Result<Vec<CourseTotal>, AppError> {
        self.totals
            .run(course_id.to_string(), || async {
                Ok(repository::course_total_scores(db.read(), course_id).await?)
            })
            .await
    }

    pub async fn gpa_distribution(&self, db: &DbPair) -> Result<Vec<f64>, AppError> {
        self.gpas
            .run(String::new(), || async {
                Ok(repository::gpa_distribution(db.read()).await?)
            })
            .await
    }
}

// ---------- score statistics helpers ----------

pub fn average_int(values: &[i64], default: f64) -> f64 {
    if values.is_empty() {
        return default;
    }
    values.iter().sum::<i64>() as f64 / values.len() as f64
}

pub fn max_int(values: &[i64], default: i64) -> i64 {
    values.iter().copied().max().unwrap_or(default)
}

pub fn min_int(values: &[i64], default: i64) -> i64 {
    values.iter().copied().min().unwrap_or(default)
}

fn std_dev_int(values: &[i64], avg: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|&v| (v as f64 - avg).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Deviation score: 50 when the population has no spread.
pub fn t_score_int(value: i64, values: &[i64]) -> f64 {
    let avg = average_int(values, 0.0);
    let std_dev = std_dev_int(values, avg);
    if std_dev == 0.0 {
        50.0
    } else {
        (value as f64 - avg) / std_dev * 10.0 + 50.0
    }
}

pub fn average_float(values: &[f64], default: f64) -> f64 {
    if values.is_empty() {
        return default;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn max_float(values: &[f64], default: f64) -> f64 {
    values.iter().copied().fold(None::<f64>, |acc, v| {
        Some(match acc {
            Some(m) => m.max(v),
            None => v,
        })
    })
    .unwrap_or(default)
}

pub fn min_float(values: &[f64], default: f64) -> f64 {
    values.iter().copied().fold(None::<f64>, |acc, v| {
        Some(match acc {
            Some(m) => m.min(v),
            None => v,
        })
    })
    .unwrap_or(default)
}

fn std_dev_float(values: &[f64], avg: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|&v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn t_score_float(value: f64, values: &[f64]) -> f64 {
    let avg = average_float(values, 0.0);
    let std_dev = std_dev_float(values, avg);
    if std_dev == 0.0 {
        50.0
    } else {
        (value - avg) / std_dev * 10.0 + 50.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_statistics() {
        let values = [40, 60];
        assert_eq!(average_int(&values, 0.0), 50.0);
        assert_eq!(max_int(&values, 0), 60);
        assert_eq!(min_int(&values, 0), 40);
        // avg 50, std dev 10: one sigma above lands at 60.
        assert!((t_score_int(60, &values) - 60.0).abs() < 1e-9);
        assert!((t_score_int(40, &values) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_and_uniform_populations() {
        assert_eq!(average_int(&[], 0.0), 0.0);
        assert_eq!(max_int(&[], 0), 0);
        assert_eq!(min_float(&[], 0.0), 0.0);
        // No spread: t-score pins to 50.
        assert_eq!(t_score_int(70, &[70, 70, 70]), 50.0);
        assert_eq!(t_score_float(1.5, &[]), 50.0);
    }
}
