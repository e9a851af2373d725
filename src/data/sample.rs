//! Synthetic HR records.
//!
//! Field values are drawn inside the canonical bounds with loose correlations
//! (income follows job level, tenure follows age). The label comes from a
//! latent logistic score driven by overtime, income, satisfaction, tenure,
//! travel and marital status, plus Gaussian noise, so the data has learnable
//! but imperfect signal.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{Label, RawRecord, RawValue};
use crate::error::AppError;
use crate::math::sigmoid;

#[derive(Debug, Clone, Copy)]
pub struct SyntheticConfig {
    pub rows: usize,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self { rows: 1470, seed: 42 }
    }
}

#[derive(Debug, Clone)]
pub struct SyntheticRow {
    pub record: RawRecord,
    pub label: Label,
}

const EDUCATION_FIELDS: [&str; 6] = [
    "Life Sciences",
    "Medical",
    "Marketing",
    "Technical Degree",
    "Other",
    "Human Resources",
];

pub fn generate_rows(config: &SyntheticConfig) -> Result<Vec<SyntheticRow>, AppError> {
    if config.rows == 0 {
        return Err(AppError::InvalidConfig("row count must be > 0".into()));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::<f64>::new(0.0, 1.0).map_err(|e| AppError::Numerical(format!("noise distribution error: {e}")))?;

    let mut out = Vec::with_capacity(config.rows);
    for _ in 0..config.rows {
        let age = (37.0 + 9.0 * normal.sample(&mut rng)).round().clamp(18.0, 60.0) as i64;
        let job_level = rng.gen_range(1..=5i64);
        let income = (2000.0 * job_level as f64 + 1500.0 * normal.sample(&mut rng)).clamp(1000.0, 20_000.0);
        let income = (income * 100.0).round() / 100.0;
        let total_years = rng.gen_range(0..=(age - 18).min(40));
        let years_at_company = rng.gen_range(0..=total_years);
        let since_promotion = rng.gen_range(0..=years_at_company.min(15));
        let job_satisfaction = rng.gen_range(1..=4i64);
        let env_satisfaction = rng.gen_range(1..=4i64);
        let work_life = rng.gen_range(1..=4i64);

        let overtime = rng.gen_range(0.0..1.0) < 0.28;
        let travel = pick(&mut rng, &[("Non-Travel", 0.1), ("Travel_Rarely", 0.7), ("Travel_Frequently", 0.2)]);
        let marital = pick(&mut rng, &[("Single", 0.32), ("Married", 0.46), ("Divorced", 0.22)]);
        let department = pick(
            &mut rng,
            &[("Research & Development", 0.65), ("Sales", 0.3), ("Human Resources", 0.05)],
        );
        let role = job_role(&mut rng, department);
        let gender = pick(&mut rng, &[("Male", 0.6), ("Female", 0.4)]);
        let education_field = EDUCATION_FIELDS[rng.gen_range(0..EDUCATION_FIELDS.len())];

        let score = -1.9
            + if overtime { 1.4 } else { 0.0 }
            - 0.00025 * (income - 6500.0)
            - 0.3 * (job_satisfaction as f64 - 2.5)
            - 0.3 * (env_satisfaction as f64 - 2.5)
            - 0.25 * (work_life as f64 - 2.5)
            - 0.07 * (years_at_company as f64 - 5.0)
            - 0.03 * (age as f64 - 37.0)
            + match travel {
                "Travel_Frequently" => 0.8,
                "Non-Travel" => -0.4,
                _ => 0.0,
            }
            + if marital == "Single" { 0.6 } else { 0.0 }
            + 0.5 * normal.sample(&mut rng);
        let label = u8::from(rng.gen_range(0.0..1.0) < sigmoid(score));

        let mut record = RawRecord::new();
        let mut int = |name: &str, v: i64| {
            record.insert(name.to_string(), RawValue::Int(v));
        };
        int("Age", age);
        int("DailyRate", rng.gen_range(100..=1500));
        int("DistanceFromHome", rng.gen_range(1..=29));
        int("Education", rng.gen_range(1..=5));
        int("EnvironmentSatisfaction", env_satisfaction);
        int("HourlyRate", rng.gen_range(30..=100));
        int("JobInvolvement", rng.gen_range(1..=4));
        int("JobLevel", job_level);
        int("JobSatisfaction", job_satisfaction);
        int("MonthlyRate", rng.gen_range(2000..=27_000));
        int("NumCompaniesWorked", rng.gen_range(0..=9));
        int("PercentSalaryHike", rng.gen_range(11..=25));
        int("PerformanceRating", rng.gen_range(3..=4));
        int("RelationshipSatisfaction", rng.gen_range(1..=4));
        int("StockOptionLevel", rng.gen_range(0..=3));
        int("TotalWorkingYears", total_years);
        int("TrainingTimesLastYear", rng.gen_range(0..=6));
        int("WorkLifeBalance", work_life);
        int("YearsAtCompany", years_at_company);
        int("YearsSinceLastPromotion", since_promotion);

        record.insert("MonthlyIncome".into(), RawValue::Float(income));
        for (name, value) in [
            ("BusinessTravel", travel),
            ("Department", department),
            ("EducationField", education_field),
            ("Gender", gender),
            ("JobRole", role),
            ("MaritalStatus", marital),
            ("OverTime", if overtime { "Yes" } else { "No" }),
        ] {
            record.insert(name.into(), RawValue::from(value));
        }

        out.push(SyntheticRow { record, label });
    }

    let positives = out.iter().filter(|r| r.label == 1).count();
    tracing::info!(rows = out.len(), attrition = positives, seed = config.seed, "generated synthetic records");
    Ok(out)
}

fn pick<'a>(rng: &mut StdRng, options: &[(&'a str, f64)]) -> &'a str {
    let total: f64 = options.iter().map(|(_, w)| w).sum();
    let mut draw = rng.gen_range(0.0..total);
    for &(value, weight) in options {
        if draw < weight {
            return value;
        }
        draw -= weight;
    }
    options[options.len() - 1].0
}

fn job_role(rng: &mut StdRng, department: &str) -> &'static str {
    let roles: &[&'static str] = match department {
        "Sales" => &["Sales Executive", "Sales Representative", "Manager"],
        "Human Resources" => &["Human Resources", "Manager"],
        _ => &[
            "Research Scientist",
            "Laboratory Technician",
            "Manufacturing Director",
            "Healthcare Representative",
            "Research Director",
            "Manager",
        ],
    };
    roles[rng.gen_range(0..roles.len())]
}

/// A fully valid record for a 30-year-old research scientist working overtime.
pub fn reference_record() -> RawRecord {
    let mut rec = RawRecord::new();
    for (name, v) in [
        ("Age", 30),
        ("DailyRate", 800),
        ("DistanceFromHome", 5),
        ("Education", 3),
        ("EnvironmentSatisfaction", 2),
        ("HourlyRate", 60),
        ("JobInvolvement", 3),
        ("JobLevel", 2),
        ("JobSatisfaction", 3),
        ("MonthlyIncome", 5000),
        ("MonthlyRate", 5000),
        ("NumCompaniesWorked", 2),
        ("PercentSalaryHike", 15),
        ("PerformanceRating", 3),
        ("RelationshipSatisfaction", 2),
        ("StockOptionLevel", 1),
        ("TotalWorkingYears", 10),
        ("TrainingTimesLastYear", 2),
        ("WorkLifeBalance", 3),
        ("YearsAtCompany", 5),
        ("YearsSinceLastPromotion", 1),
    ] {
        rec.insert(name.into(), RawValue::Int(v));
    }
    for (name, v) in [
        ("BusinessTravel", "Travel_Rarely"),
        ("Department", "Research & Development"),
        ("EducationField", "Life Sciences"),
        ("Gender", "Male"),
        ("JobRole", "Research Scientist"),
        ("MaritalStatus", "Single"),
        ("OverTime", "Yes"),
    ] {
        rec.insert(name.into(), RawValue::from(v));
    }
    rec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn generated_rows_pass_the_canonical_schema() {
        let schema = Schema::canonical();
        let rows = generate_rows(&SyntheticConfig { rows: 500, seed: 3 }).unwrap();
        for row in &rows {
            if let Err(report) = schema.validate(&row.record) {
                panic!("generated row failed validation: {report}");
            }
        }
    }

    #[test]
    fn attrition_is_the_minority_but_present() {
        let rows = generate_rows(&SyntheticConfig { rows: 1000, seed: 9 }).unwrap();
        let rate = rows.iter().filter(|r| r.label == 1).count() as f64 / 1000.0;
        assert!(rate > 0.08 && rate < 0.4, "attrition rate {rate}");
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = generate_rows(&SyntheticConfig { rows: 50, seed: 1 }).unwrap();
        let b = generate_rows(&SyntheticConfig { rows: 50, seed: 1 }).unwrap();
        assert!(a.iter().zip(b.iter()).all(|(x, y)| x.record == y.record && x.label == y.label));
    }

    #[test]
    fn ages_are_rounded_normal_draws_within_bounds() {
        let rows = generate_rows(&SyntheticConfig { rows: 300, seed: 5 }).unwrap();
        let ages: Vec<f64> = rows.iter().map(|r| r.record["Age"].as_number().unwrap()).collect();
        assert!(ages.iter().all(|a| a.fract() == 0.0 && (18.0..=60.0).contains(a)));
        let mean = ages.iter().sum::<f64>() / ages.len() as f64;
        assert!((mean - 37.0).abs() < 3.0, "mean age {mean}");
    }

    #[test]
    fn zero_rows_is_a_config_error() {
        assert!(generate_rows(&SyntheticConfig { rows: 0, seed: 1 }).is_err());
    }
}
