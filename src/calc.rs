//! Client-side reductions behind the dashboards and reports. Every function
//! works over the full result set of a query; nothing here talks to the
//! store.

use crate::model::{AttendanceStatus, EnrollmentStatus, Level};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::hash::Hash;

/// One-decimal rounding used for every percentage shown to a user.
pub fn round_1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AttendanceTally {
    pub present: usize,
    pub absent: usize,
    pub late: usize,
}

impl AttendanceTally {
    pub fn total(&self) -> usize {
        self.present + self.absent + self.late
    }

    fn add(&mut self, status: AttendanceStatus) {
        match status {
            AttendanceStatus::Present => self.present += 1,
            AttendanceStatus::Absent => self.absent += 1,
            AttendanceStatus::Late => self.late += 1,
        }
    }
}

pub fn tally<I>(statuses: I) -> AttendanceTally
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let mut t = AttendanceTally::default();
    for s in statuses {
        t.add(s);
    }
    t
}

/// Present rows over all rows, as a percentage. Late counts against the
/// rate. No rows gives 0.
pub fn attendance_rate<I>(statuses: I) -> f64
where
    I: IntoIterator<Item = AttendanceStatus>,
{
    let t = tally(statuses);
    if t.total() == 0 {
        return 0.0;
    }
    (t.present as f64 / t.total() as f64) * 100.0
}

pub fn sum_amounts<I>(amounts: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    amounts.into_iter().fold(0.0, |acc, a| acc + a)
}

pub fn distinct_count<I, T>(ids: I) -> usize
where
    I: IntoIterator<Item = T>,
    T: Eq + Hash,
{
    ids.into_iter().collect::<HashSet<_>>().len()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelCount {
    pub name: Level,
    pub value: usize,
}

/// Students per level, in level order, omitting empty levels.
pub fn level_distribution<I>(levels: I) -> Vec<LevelCount>
where
    I: IntoIterator<Item = Level>,
{
    let mut counts = [0usize; 4];
    for level in levels {
        counts[level_slot(level)] += 1;
    }
    Level::ALL
        .iter()
        .filter(|l| counts[level_slot(**l)] > 0)
        .map(|l| LevelCount {
            name: *l,
            value: counts[level_slot(*l)],
        })
        .collect()
}

fn level_slot(level: Level) -> usize {
    match level {
        Level::Qaida => 0,
        Level::Nazra => 1,
        Level::Hifz => 2,
        Level::Tajweed => 3,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthAttendance {
    pub month_key: String,
    pub month: String,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
}

/// Buckets attendance by calendar month, oldest first. Rows whose date
/// does not parse are skipped.
pub fn attendance_by_month<'a, I>(records: I) -> Vec<MonthAttendance>
where
    I: IntoIterator<Item = (&'a str, AttendanceStatus)>,
{
    let mut buckets: BTreeMap<String, (String, AttendanceTally)> = BTreeMap::new();
    for (date, status) in records {
        let Some((key, label)) = month_of(date) else {
            continue;
        };
        buckets
            .entry(key)
            .or_insert_with(|| (label, AttendanceTally::default()))
            .1
            .add(status);
    }
    buckets
        .into_iter()
        .map(|(month_key, (month, t))| MonthAttendance {
            month_key,
            month,
            present: t.present,
            absent: t.absent,
            late: t.late,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthEnrollments {
    pub month_key: String,
    pub month: String,
    pub enrollments: usize,
}

/// Active enrollments per month of their enrollment date. A month with only
/// inactive enrollments still appears, with a zero count.
pub fn enrollments_by_month<'a, I>(records: I) -> Vec<MonthEnrollments>
where
    I: IntoIterator<Item = (&'a str, EnrollmentStatus)>,
{
    let mut buckets: BTreeMap<String, (String, usize)> = BTreeMap::new();
    for (date, status) in records {
        let Some((key, label)) = month_of(date) else {
            continue;
        };
        let slot = buckets.entry(key).or_insert_with(|| (label, 0));
        if status == EnrollmentStatus::Active {
            slot.1 += 1;
        }
    }
    buckets
        .into_iter()
        .map(|(month_key, (month, enrollments))| MonthEnrollments {
            month_key,
            month,
            enrollments,
        })
        .collect()
}

fn month_of(date: &str) -> Option<(String, String)> {
    let day = date.get(..10).unwrap_or(date);
    let parsed = NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
    Some((
        parsed.format("%Y-%m").to_string(),
        parsed.format("%b").to_string(),
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PerformanceAverages {
    pub memorization: f64,
    pub tajweed: f64,
    pub attendance: f64,
}

/// Mean memorization, tajweed and attendance percentage over progress
/// reports, each rounded to one decimal. No reports gives zeros.
pub fn performance_averages<I>(reports: I) -> PerformanceAverages
where
    I: IntoIterator<Item = (f64, f64, f64)>,
{
    let mut n = 0usize;
    let (mut mem, mut taj, mut att) = (0.0, 0.0, 0.0);
    for (m, t, a) in reports {
        n += 1;
        mem += m;
        taj += t;
        att += a;
    }
    let d = n.max(1) as f64;
    PerformanceAverages {
        memorization: round_1(mem / d),
        tajweed: round_1(taj / d),
        attendance: round_1(att / d),
    }
}

/// Splits homework ids into (pending, submitted) by whether the student has
/// a submission. Due dates play no part: past-due work without a
/// submission stays pending.
pub fn split_homework<'a, I>(
    homework_ids: I,
    submitted: &HashSet<String>,
) -> (Vec<&'a str>, Vec<&'a str>)
where
    I: IntoIterator<Item = &'a str>,
{
    homework_ids
        .into_iter()
        .partition(|id| !submitted.contains(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use AttendanceStatus::*;

    #[test]
    fn attendance_rate_counts_only_present() {
        let rate = attendance_rate([Present, Present, Absent, Late]);
        assert_eq!(rate, 50.0);
        assert_eq!(attendance_rate(std::iter::empty()), 0.0);
        assert_eq!(round_1(attendance_rate([Present, Absent, Absent])), 33.3);
    }

    #[test]
    fn tally_counts_each_status() {
        let t = tally([Late, Present, Late, Absent]);
        assert_eq!(
            t,
            AttendanceTally {
                present: 1,
                absent: 1,
                late: 2
            }
        );
        assert_eq!(t.total(), 4);
    }

    #[test]
    fn level_distribution_skips_empty_levels() {
        let d = level_distribution([Level::Hifz, Level::Qaida, Level::Hifz]);
        assert_eq!(
            d,
            vec![
                LevelCount {
                    name: Level::Qaida,
                    value: 1
                },
                LevelCount {
                    name: Level::Hifz,
                    value: 2
                },
            ]
        );
    }

    #[test]
    fn months_are_kept_apart_across_years() {
        let rows = vec![
            ("2024-01-15", Present),
            ("2025-01-03", Absent),
            ("2024-01-20", Late),
            ("not a date", Present),
        ];
        let months = attendance_by_month(rows.iter().map(|(d, s)| (*d, *s)));
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].month_key, "2024-01");
        assert_eq!(months[0].month, "Jan");
        assert_eq!((months[0].present, months[0].late), (1, 1));
        assert_eq!(months[1].absent, 1);
    }

    #[test]
    fn enrollment_months_count_active_only() {
        let rows = vec![
            ("2024-09-01", EnrollmentStatus::Active),
            ("2024-09-12T10:00:00Z", EnrollmentStatus::Dropped),
            ("2024-10-02", EnrollmentStatus::Active),
        ];
        let months = enrollments_by_month(rows.iter().map(|(d, s)| (*d, *s)));
        assert_eq!(months.len(), 2);
        assert_eq!(months[0].enrollments, 1);
        assert_eq!(months[1].month, "Oct");
    }

    #[test]
    fn performance_averages_handle_empty_input() {
        let avg = performance_averages(std::iter::empty());
        assert_eq!(avg.memorization, 0.0);
        let avg = performance_averages([(80.0, 70.0, 90.0), (60.0, 75.0, 100.0)]);
        assert_eq!(avg.memorization, 70.0);
        assert_eq!(avg.tajweed, 72.5);
        assert_eq!(avg.attendance, 95.0);
    }

    #[test]
    fn past_due_homework_without_submission_stays_pending() {
        let submitted: HashSet<String> = ["hw-2".to_string()].into_iter().collect();
        let (pending, done) = split_homework(["hw-1", "hw-2", "hw-3"], &submitted);
        assert_eq!(pending, vec!["hw-1", "hw-3"]);
        assert_eq!(done, vec!["hw-2"]);
    }

    #[test]
    fn distinct_count_collapses_repeats() {
        assert_eq!(distinct_count(["a", "b", "a"]), 2);
    }
}
