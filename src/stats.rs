//! Statistical routines: descriptive statistics, two-sample t-tests, one-way
//! ANOVA, Tukey's HSD and multiple-comparison corrections.
//!
//! Distribution functions come from `statrs`. The studentized range
//! distribution, which `statrs` does not provide, is integrated numerically
//! with Gauss-Legendre quadrature (Copenhaver & Holland, 1988).

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, FisherSnedecor, StudentsT};
use statrs::function::erf::erfc;
use statrs::function::gamma::ln_gamma;

use crate::error::{AnalysisError, AnalysisResult};

/// Arithmetic mean, NaN for an empty slice
pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Sample variance (n-1 denominator), NaN below two observations
pub fn variance(xs: &[f64]) -> f64 {
    let n = xs.len();
    if n < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n as f64 - 1.0)
}

/// Sample standard deviation (n-1 denominator)
pub fn std_dev(xs: &[f64]) -> f64 {
    variance(xs).sqrt()
}

/// Quantile with linear interpolation between order statistics
pub fn quantile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let h = (sorted.len() - 1) as f64 * p.clamp(0.0, 1.0);
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

/// Count, moments and five-number summary of one cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    pub std: f64,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl Describe {
    pub fn of(xs: &[f64]) -> Self {
        let mut sorted = xs.to_vec();
        sorted.sort_by(f64::total_cmp);
        Describe {
            count: xs.len(),
            mean: mean(xs),
            std: std_dev(xs),
            min: sorted.first().copied().unwrap_or(f64::NAN),
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max: sorted.last().copied().unwrap_or(f64::NAN),
        }
    }
}

/// Result of a two-sample t-test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TTest {
    /// t statistic for `mean(a) - mean(b)`
    pub statistic: f64,
    pub df: f64,
    /// Two-sided p-value
    pub p_value: f64,
}

/// Student's two-sample t-test with pooled variance
pub fn student_t_test(a: &[f64], b: &[f64]) -> AnalysisResult<TTest> {
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let df = na + nb - 2.0;
    if a.len() < 2 || b.len() < 2 {
        return Err(AnalysisError::Computation("t-test needs two observations per sample".to_string()));
    }

    let pooled = ((na - 1.0) * variance(a) + (nb - 1.0) * variance(b)) / df;
    if pooled <= 0.0 {
        return Err(AnalysisError::Computation("zero variance in both samples".to_string()));
    }
    let se = (pooled * (1.0 / na + 1.0 / nb)).sqrt();
    let statistic = (mean(a) - mean(b)) / se;

    Ok(TTest {
        statistic,
        df,
        p_value: t_two_sided(statistic, df)?,
    })
}

/// Welch's t-test (unequal variances)
pub fn welch_t_test(a: &[f64], b: &[f64]) -> AnalysisResult<TTest> {
    if a.len() < 2 || b.len() < 2 {
        return Err(AnalysisError::Computation("t-test needs two observations per sample".to_string()));
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let va = variance(a) / na;
    let vb = variance(b) / nb;
    let se2 = va + vb;
    if se2 <= 0.0 {
        return Err(AnalysisError::Computation("zero variance in both samples".to_string()));
    }

    let statistic = (mean(a) - mean(b)) / se2.sqrt();
    // Welch-Satterthwaite
    let df = se2.powi(2) / (va.powi(2) / (na - 1.0) + vb.powi(2) / (nb - 1.0));

    Ok(TTest {
        statistic,
        df,
        p_value: t_two_sided(statistic, df)?,
    })
}

fn t_two_sided(t: f64, df: f64) -> AnalysisResult<f64> {
    if !t.is_finite() || !df.is_finite() {
        return Err(AnalysisError::Computation(format!("non-finite t statistic ({}, df {})", t, df)));
    }
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| AnalysisError::Computation(format!("invalid t distribution: {}", e)))?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

/// One-way ANOVA table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OneWayAnova {
    pub df_between: f64,
    pub df_within: f64,
    pub ss_between: f64,
    pub ss_within: f64,
    pub ms_between: f64,
    pub ms_within: f64,
    pub f_statistic: f64,
    pub p_value: f64,
}

/// One-way ANOVA across `samples`
pub fn one_way_anova(samples: &[&[f64]]) -> AnalysisResult<OneWayAnova> {
    let k = samples.len();
    let total: usize = samples.iter().map(|s| s.len()).sum();
    if k < 2 {
        return Err(AnalysisError::Computation("ANOVA needs at least two samples".to_string()));
    }
    if total <= k || samples.iter().any(|s| s.is_empty()) {
        return Err(AnalysisError::Computation("ANOVA has no within-sample degrees of freedom".to_string()));
    }

    let grand = samples.iter().flat_map(|s| s.iter()).sum::<f64>() / total as f64;
    let ss_between: f64 = samples
        .iter()
        .map(|s| s.len() as f64 * (mean(s) - grand).powi(2))
        .sum();
    let ss_within: f64 = samples
        .iter()
        .map(|s| {
            let m = mean(s);
            s.iter().map(|x| (x - m).powi(2)).sum::<f64>()
        })
        .sum();

    let df_between = (k - 1) as f64;
    let df_within = (total - k) as f64;
    let ms_between = ss_between / df_between;
    let ms_within = ss_within / df_within;
    if ms_within <= 0.0 {
        return Err(AnalysisError::Computation("zero within-sample variance".to_string()));
    }

    let f_statistic = ms_between / ms_within;
    let dist = FisherSnedecor::new(df_between, df_within)
        .map_err(|e| AnalysisError::Computation(format!("invalid F distribution: {}", e)))?;

    Ok(OneWayAnova {
        df_between,
        df_within,
        ss_between,
        ss_within,
        ms_between,
        ms_within,
        f_statistic,
        p_value: dist.sf(f_statistic),
    })
}

/// One pairwise comparison from Tukey's HSD
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TukeyPair {
    pub first: usize,
    pub second: usize,
    /// `mean(second) - mean(first)`
    pub mean_diff: f64,
    /// Studentized range statistic
    pub q: f64,
    pub p_value: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Tukey's honestly significant difference test for all pairs `i < j`
pub fn tukey_hsd(samples: &[&[f64]], anova: &OneWayAnova, alpha: f64) -> AnalysisResult<Vec<TukeyPair>> {
    let k = samples.len() as f64;
    let df = anova.df_within;
    if df < 2.0 {
        return Err(AnalysisError::Computation(format!(
            "Tukey HSD needs at least 2 within-sample degrees of freedom, got {}",
            df
        )));
    }
    let q_crit = studentized_range_quantile(1.0 - alpha, k, df);

    let mut pairs = Vec::new();
    for i in 0..samples.len() {
        for j in (i + 1)..samples.len() {
            let (ni, nj) = (samples[i].len() as f64, samples[j].len() as f64);
            let se = (anova.ms_within / 2.0 * (1.0 / ni + 1.0 / nj)).sqrt();
            let mean_diff = mean(samples[j]) - mean(samples[i]);
            let q = mean_diff.abs() / se;
            if !q.is_finite() {
                return Err(AnalysisError::Computation(format!("non-finite studentized range ({})", q)));
            }
            let p_value = (1.0 - studentized_range_cdf(q, k, df)).clamp(0.0, 1.0);
            pairs.push(TukeyPair {
                first: i,
                second: j,
                mean_diff,
                q,
                p_value,
                ci_lower: mean_diff - q_crit * se,
                ci_upper: mean_diff + q_crit * se,
            });
        }
    }
    Ok(pairs)
}

/// Bonferroni-adjusted p-values: `min(1, p * m)`
pub fn bonferroni(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len() as f64;
    p_values.iter().map(|p| (p * m).min(1.0)).collect()
}

/// Holm step-down adjusted p-values
pub fn holm(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; m];
    let mut running: f64 = 0.0;
    for (rank, &idx) in order.iter().enumerate() {
        let candidate = ((m - rank) as f64 * p_values[idx]).min(1.0);
        running = running.max(candidate);
        adjusted[idx] = running;
    }
    adjusted
}

fn std_normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}

const FRAC_1_SQRT_2PI: f64 = 0.398_942_280_401_432_7;

/// Probability that the range of `cc` standard normals is below `w`,
/// raised to the `rr`-th power
fn wprob(w: f64, rr: f64, cc: f64) -> f64 {
    const NLEG: usize = 12;
    const IHALF: usize = 6;
    const C1: f64 = -30.0;
    const C2: f64 = -50.0;
    const C3: f64 = 60.0;
    const BB: f64 = 8.0;
    const WLAR: f64 = 3.0;
    const WINCR1: usize = 2;
    const WINCR2: usize = 3;
    const XLEG: [f64; IHALF] = [
        0.981_560_634_246_719_250_690_549_090_149,
        0.904_117_256_370_474_856_678_465_866_119,
        0.769_902_674_194_304_687_036_893_833_213,
        0.587_317_954_286_617_447_296_702_418_941,
        0.367_831_498_998_180_193_752_691_536_644,
        0.125_233_408_511_468_915_472_441_369_464,
    ];
    const ALEG: [f64; IHALF] = [
        0.047_175_336_386_511_827_194_615_961_485,
        0.106_939_325_995_318_430_960_254_718_194,
        0.160_078_328_543_346_226_334_652_529_543,
        0.203_167_426_723_065_921_749_064_455_810,
        0.233_492_536_538_354_808_760_849_898_925,
        0.249_147_045_813_402_785_000_562_436_043,
    ];

    let qsqz = w * 0.5;
    if qsqz >= BB {
        return 1.0;
    }

    let mut pr_w = 2.0 * std_normal_cdf(qsqz) - 1.0;
    pr_w = if pr_w >= (C2 / cc).exp() { pr_w.powf(cc) } else { 0.0 };

    let wincr = if w > WLAR { WINCR1 } else { WINCR2 };
    let mut blb = qsqz;
    let binc = (BB - qsqz) / wincr as f64;
    let mut bub = blb + binc;
    let mut einsum = 0.0;
    let cc1 = cc - 1.0;

    for _ in 0..wincr {
        let mut elsum = 0.0;
        let a = 0.5 * (bub + blb);
        let b = 0.5 * (bub - blb);

        for jj in 1..=NLEG {
            let (j, xx) = if IHALF < jj {
                let j = NLEG - jj;
                (j, XLEG[j])
            } else {
                let j = jj - 1;
                (j, -XLEG[j])
            };
            let ac = a + b * xx;
            let qexpo = ac * ac;
            if qexpo > C3 {
                break;
            }

            let pplus = 2.0 * std_normal_cdf(ac);
            let pminus = 2.0 * std_normal_cdf(ac - w);
            let rinsum = pplus * 0.5 - pminus * 0.5;
            if rinsum >= (C1 / cc1).exp() {
                elsum += ALEG[j] * (-(0.5 * qexpo)).exp() * rinsum.powf(cc1);
            }
        }
        elsum *= 2.0 * b * cc * FRAC_1_SQRT_2PI;
        einsum += elsum;
        blb = bub;
        bub += binc;
    }

    pr_w += einsum;
    if pr_w <= (C1 / rr).exp() {
        return 0.0;
    }
    pr_w = pr_w.powf(rr);
    pr_w.min(1.0)
}

/// CDF of the studentized range distribution for `k` means and `df`
/// degrees of freedom. NaN when `k < 2` or `df < 2`.
pub fn studentized_range_cdf(q: f64, k: f64, df: f64) -> f64 {
    const NLEGQ: usize = 16;
    const IHALFQ: usize = 8;
    const EPS1: f64 = -30.0;
    const EPS2: f64 = 1.0e-14;
    const DHAF: f64 = 100.0;
    const DQUAR: f64 = 800.0;
    const DEIGH: f64 = 5000.0;
    const DLARG: f64 = 25000.0;
    const XLEGQ: [f64; IHALFQ] = [
        0.989_400_934_991_649_932_596_154_173_450,
        0.944_575_023_073_232_576_077_988_415_535,
        0.865_631_202_387_831_743_880_467_897_712,
        0.755_404_408_355_003_033_895_101_194_847,
        0.617_876_244_402_643_748_446_671_764_049,
        0.458_016_777_657_227_386_342_419_442_984,
        0.281_603_550_779_258_913_230_460_501_460,
        0.095_012_509_837_637_440_185_319_335_425,
    ];
    const ALEGQ: [f64; IHALFQ] = [
        0.027_152_459_411_754_094_851_780_572_456,
        0.062_253_523_938_647_892_862_843_836_994_4,
        0.095_158_511_682_492_784_809_925_107_602_2,
        0.124_628_971_255_533_872_052_476_282_192,
        0.149_595_988_816_576_732_081_501_730_547,
        0.169_156_519_395_002_538_189_312_079_030,
        0.182_603_415_044_923_588_866_763_667_969,
        0.189_450_610_455_068_496_285_396_723_208,
    ];
    let rr = 1.0;

    if q.is_nan() || k < 2.0 || df < 2.0 {
        return f64::NAN;
    }
    if q <= 0.0 {
        return 0.0;
    }
    if q.is_infinite() {
        return 1.0;
    }
    if df > DLARG {
        return wprob(q, rr, k);
    }

    let f2 = df * 0.5;
    let ulen = if df <= DHAF {
        1.0
    } else if df <= DQUAR {
        0.5
    } else if df <= DEIGH {
        0.25
    } else {
        0.125
    };
    let f2lf = f2 * df.ln() - df * std::f64::consts::LN_2 - ln_gamma(f2) + f64::ln(ulen);
    let f21 = f2 - 1.0;
    let ff4 = df * 0.25;

    let mut ans = 0.0;
    let mut otsum = 0.0;
    for i in 1..=50 {
        otsum = 0.0;
        let twa1 = (2 * i - 1) as f64 * ulen;

        for jj in 1..=NLEGQ {
            let (j, upper) = if IHALFQ < jj { (jj - IHALFQ - 1, true) } else { (jj - 1, false) };
            let x = XLEGQ[j] * ulen;
            let t1 = if upper {
                f2lf + f21 * (twa1 + x).ln() - (x + twa1) * ff4
            } else {
                f2lf + f21 * (twa1 - x).ln() + (x - twa1) * ff4
            };

            if t1 >= EPS1 {
                let qsqz = if upper {
                    q * ((x + twa1) * 0.5).sqrt()
                } else {
                    q * ((twa1 - x) * 0.5).sqrt()
                };
                otsum += wprob(qsqz, rr, k) * ALEGQ[j] * t1.exp();
            }
        }

        if i as f64 * ulen >= 1.0 && otsum <= EPS2 {
            break;
        }
        ans += otsum;
    }

    if otsum > EPS2 {
        log::debug!("studentized range integral did not converge (q={}, k={}, df={})", q, k, df);
    }
    ans.min(1.0)
}

/// Inverse of [`studentized_range_cdf`] by bisection
pub fn studentized_range_quantile(p: f64, k: f64, df: f64) -> f64 {
    if !(0.0..1.0).contains(&p) || k < 2.0 || df < 2.0 {
        return f64::NAN;
    }
    if p == 0.0 {
        return 0.0;
    }

    let mut hi = 1.0;
    while studentized_range_cdf(hi, k, df) < p && hi < 1.0e4 {
        hi *= 2.0;
    }
    let mut lo = 0.0;
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if studentized_range_cdf(mid, k, df) < p {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo < 1.0e-10 {
            break;
        }
    }
    0.5 * (lo + hi)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64, tol: f64) -> bool {
        (a - b).abs() <= tol
    }

    #[test]
    fn test_mean_and_std() {
        let xs = [10.0, 20.0, 30.0];
        assert_eq!(mean(&xs), 20.0);
        assert!(close(std_dev(&xs), 10.0, 1e-12));
        assert!(std_dev(&[5.0]).is_nan());
        assert!(mean(&[]).is_nan());
    }

    #[test]
    fn test_describe_quartiles() {
        let d = Describe::of(&[4.0, 1.0, 3.0, 2.0]);
        assert_eq!(d.count, 4);
        assert_eq!(d.min, 1.0);
        assert_eq!(d.max, 4.0);
        assert!(close(d.median, 2.5, 1e-12));
        assert!(close(d.q1, 1.75, 1e-12));
        assert!(close(d.q3, 3.25, 1e-12));
    }

    #[test]
    fn test_student_t_test() {
        // pooled variance 2, se sqrt(2), t = -20 / sqrt(2), df = 2
        let t = student_t_test(&[10.0, 12.0], &[30.0, 32.0]).unwrap();
        assert!(close(t.statistic, -14.142_135_623_730_95, 1e-9));
        assert_eq!(t.df, 2.0);
        assert!(close(t.p_value, 0.004_963, 1e-5));
    }

    #[test]
    fn test_student_t_identical_means() {
        let t = student_t_test(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(t.statistic, 0.0);
        assert!(close(t.p_value, 1.0, 1e-12));
    }

    #[test]
    fn test_zero_variance_is_error() {
        let err = student_t_test(&[1.0, 1.0], &[2.0, 2.0]).unwrap_err();
        assert!(matches!(err, AnalysisError::Computation(_)));
        assert!(welch_t_test(&[1.0, 1.0], &[2.0, 2.0]).is_err());
    }

    #[test]
    fn test_welch_equal_sizes_matches_student_statistic() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let s = student_t_test(&a, &b).unwrap();
        let w = welch_t_test(&a, &b).unwrap();
        assert!(close(s.statistic, w.statistic, 1e-12));
        assert!(w.df < s.df);
        assert!(w.p_value >= s.p_value);
    }

    #[test]
    fn test_one_way_anova() {
        let a = [23.0, 20.0, 25.0];
        let b = [45.0, 44.0, 46.0];
        let c = [33.0, 34.0, 35.0];
        let samples: [&[f64]; 3] = [&a, &b, &c];
        let anova = one_way_anova(&samples).unwrap();
        assert_eq!(anova.df_between, 2.0);
        assert_eq!(anova.df_within, 6.0);
        // means 22.667, 45, 34; grand 33.889
        assert!(close(anova.ss_between, 748.222_222, 1e-4));
        assert!(close(anova.ss_within, 16.666_667, 1e-4));
        assert!(anova.f_statistic > 100.0);
        assert!(anova.p_value < 1e-4);
    }

    #[test]
    fn test_anova_needs_two_samples() {
        let only: [&[f64]; 1] = [&[1.0, 2.0]];
        assert!(one_way_anova(&only).is_err());
    }

    #[test]
    fn test_studentized_range_two_means_matches_t() {
        // For two means, q = |t| * sqrt(2)
        let df = 10.0;
        let q = 3.0;
        let t = StudentsT::new(0.0, 1.0, df).unwrap();
        let expected = 1.0 - 2.0 * t.sf(q / std::f64::consts::SQRT_2);
        assert!(close(studentized_range_cdf(q, 2.0, df), expected, 1e-6));
    }

    #[test]
    fn test_studentized_range_table_value() {
        // Tabulated upper 5% point for k = 3, df = 10 is 3.877
        assert!(close(studentized_range_cdf(3.877, 3.0, 10.0), 0.95, 1e-3));
        assert!(close(studentized_range_quantile(0.95, 3.0, 10.0), 3.877, 2e-3));
    }

    #[test]
    fn test_studentized_range_edges() {
        assert_eq!(studentized_range_cdf(0.0, 3.0, 10.0), 0.0);
        assert_eq!(studentized_range_cdf(f64::INFINITY, 3.0, 10.0), 1.0);
        assert!(studentized_range_cdf(1.0, 1.0, 10.0).is_nan());
        assert!(studentized_range_cdf(1.0, 3.0, 1.0).is_nan());
    }

    #[test]
    fn test_tukey_hsd() {
        let a = [23.0, 20.0, 25.0];
        let b = [45.0, 44.0, 46.0];
        let c = [33.0, 34.0, 35.0];
        let samples: [&[f64]; 3] = [&a, &b, &c];
        let anova = one_way_anova(&samples).unwrap();
        let pairs = tukey_hsd(&samples, &anova, 0.05).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!((pairs[0].first, pairs[0].second), (0, 1));
        assert!(close(pairs[0].mean_diff, 22.333_333, 1e-4));
        assert!(pairs.iter().all(|p| p.p_value < 0.01));
        assert!(pairs.iter().all(|p| p.ci_lower <= p.mean_diff && p.mean_diff <= p.ci_upper));
    }

    #[test]
    fn test_bonferroni() {
        let adjusted = bonferroni(&[0.01, 0.02, 0.5]);
        assert!(close(adjusted[0], 0.03, 1e-12));
        assert!(close(adjusted[1], 0.06, 1e-12));
        assert_eq!(adjusted[2], 1.0);
    }

    #[test]
    fn test_holm() {
        let raw = [0.01, 0.04, 0.03];
        let adjusted = holm(&raw);
        // sorted: 0.01*3 = 0.03, 0.03*2 = 0.06, 0.04*1 = 0.04 -> max(0.06, 0.04)
        assert!(close(adjusted[0], 0.03, 1e-12));
        assert!(close(adjusted[2], 0.06, 1e-12));
        assert!(close(adjusted[1], 0.06, 1e-12));
        for (a, r) in adjusted.iter().zip(raw.iter()) {
            assert!(a >= r && *a <= 1.0);
        }
    }
}
