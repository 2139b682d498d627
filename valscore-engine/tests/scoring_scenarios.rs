//! End-to-end scoring scenarios and invariant properties.

use chrono::NaiveDate;
use proptest::prelude::*;
use test_case::test_case;
use valscore_common::{Config, PercentileConfig, RegimeConfig, ValuationConfig};
use valscore_engine::model::{AuditOpinion, EventFlags, Recommendation, StockRecord};
use valscore_engine::percentile::{
    DistributionSnapshot, Metric, MetricDistribution, PercentileContextualizer,
};
use valscore_engine::quality::{DataQualityGuard, QualityCode};
use valscore_engine::regime::RegimeParameterProvider;
use valscore_engine::risk::RiskCode;
use valscore_engine::scoring::{downgrade, RecordScorer};
use valscore_engine::valuation::{JustifiedValuationCalculator, ValuationDiagnostic};
use valscore_engine::BatchScorer;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
}

fn record(symbol: &str, sector: &str, per: f64, pbr: f64, roe: f64) -> StockRecord {
    StockRecord {
        symbol: symbol.into(),
        name: format!("{} Corp", symbol),
        sector: sector.into(),
        price: 25_000.0,
        market_cap: Some(3e11),
        per: Some(per),
        pbr: Some(pbr),
        roe: Some(roe),
        debt_ratio: Some(90.0),
        current_ratio: Some(1.6),
        operating_cash_flows: Some(vec![10.0, 12.0, 11.0]),
        net_incomes: Some(vec![5.0, 5.5, 6.0]),
        audit_opinion: Some(AuditOpinion::Unqualified),
        trading_value: Some(2e9),
        price_asof: today(),
        financial_asof: NaiveDate::from_ymd_opt(2026, 6, 30).unwrap(),
        ..StockRecord::default()
    }
}

/// 40 peers in sector X plus 60 records spread over two other sectors.
fn universe() -> Vec<StockRecord> {
    let mut records: Vec<StockRecord> = (0..40u32)
        .map(|i| {
            let i = f64::from(i);
            record(&format!("X{:02}", i), "X", 8.0 + i * 0.4, 0.7 + i * 0.04, 4.0 + i * 0.15)
        })
        .collect();
    records.extend((0..30u32).map(|i| {
        let i = f64::from(i);
        record(&format!("Y{:02}", i), "Y", 12.0 + i, 1.0 + i * 0.1, 6.0 + i * 0.3)
    }));
    records.extend((0..30u32).map(|i| {
        let i = f64::from(i);
        record(&format!("Z{:02}", i), "Z", 5.0 + i * 0.5, 0.4 + i * 0.05, 2.0 + i * 0.4)
    }));
    records
}

struct Fixture {
    scorer: RecordScorer,
    snapshot: DistributionSnapshot,
    regimes: RegimeParameterProvider,
}

fn fixture() -> Fixture {
    Fixture {
        scorer: RecordScorer::new(&Config::default()),
        snapshot: DistributionSnapshot::build(today(), &universe()),
        regimes: RegimeParameterProvider::new(RegimeConfig::default()).unwrap(),
    }
}

fn tier_index(r: Recommendation) -> usize {
    Recommendation::ALL.iter().position(|t| *t == r).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_reference_record_lands_in_top_tier() {
    let f = fixture();
    let result = f
        .scorer
        .evaluate(&record("REF", "X", 6.0, 0.5, 12.0), &f.snapshot, &f.regimes, today())
        .unwrap();

    let g = result.valuation.implied_growth.unwrap();
    assert!((g - 0.042).abs() < 1e-12);
    assert!((result.valuation.justified_pbr.unwrap() - 1.345).abs() < 1e-3);
    assert!((result.valuation.margin_pbr.unwrap() - 1.69).abs() < 1e-2);
    assert_eq!(result.sub_scores.margin_of_safety, 25.0);

    assert_eq!(result.sector_sample_size, 40);
    assert_eq!(result.recommendation, Recommendation::StrongBuy);
    assert!(result.risk_reasons.is_empty());
    assert!(result.total_score <= 100.0);
}

#[test_case(6.0, 0.5, 12.0 ; "cheap and profitable")]
#[test_case(14.0, 1.2, 8.0 ; "sector median")]
#[test_case(20.0, 2.0, 5.0 ; "expensive")]
#[test_case(9.0, 0.9, 10.0 ; "mildly cheap")]
fn test_admin_issue_moves_at_most_one_tier_down(per: f64, pbr: f64, roe: f64) {
    let f = fixture();
    let clean = record("A", "X", per, pbr, roe);
    let flagged = StockRecord {
        flags: EventFlags {
            administrative_issue: true,
            ..EventFlags::default()
        },
        ..clean.clone()
    };

    let before = f.scorer.evaluate(&clean, &f.snapshot, &f.regimes, today()).unwrap();
    let after = f.scorer.evaluate(&flagged, &f.snapshot, &f.regimes, today()).unwrap();

    assert_eq!(after.base_score, before.base_score);
    assert!(after.risk_codes().contains(&RiskCode::AdministrativeIssue.as_str()));
    assert!(after.total_score <= before.total_score);

    let (b, a) = (tier_index(before.recommendation), tier_index(after.recommendation));
    assert!(a >= b, "flag must never upgrade");
    assert!(a - b <= 1, "flag moves at most one tier");
}

#[test]
fn test_small_sector_uses_market_distribution() {
    let f = fixture();
    let mut universe = universe();
    universe.extend((0..5u32).map(|i| record(&format!("T{}", i), "Tiny", 3.0, 0.3, 20.0 + f64::from(i))));
    let snapshot = DistributionSnapshot::build(today(), &universe);

    let result = f
        .scorer
        .evaluate(&record("T9", "Tiny", 12.0, 1.0, 8.0), &snapshot, &f.regimes, today())
        .unwrap();
    assert_eq!(result.sector_sample_size, 0);
    assert_eq!(result.confidence, valscore_engine::model::Confidence::Low);
    assert_eq!(result.sub_scores.sector_fit, 0.0);
}

#[test]
fn test_batch_of_prefetched_records() {
    let scorer = BatchScorer::new(Config::default()).unwrap();
    let mut records = universe();
    let mut stale = record("OLD", "X", 6.0, 0.5, 12.0);
    stale.price_asof = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap();
    records.push(stale);

    let report = tokio_test::block_on(scorer.score_records(records, today()));

    assert_eq!(report.scored_count(), 100);
    assert_eq!(report.excluded_count(), 1);
    assert_eq!(report.exclusion_counts.get("stale_price"), Some(&1));
    assert!(report.calibration.drift_evaluated);
    assert!(report.proposed_cutoffs.is_some());
    assert!(report
        .scored
        .windows(2)
        .all(|w| w[0].total_score >= w[1].total_score));
}

// ============================================================================
// Properties
// ============================================================================

fn global() -> MetricDistribution {
    MetricDistribution::from_breakpoints([4.0, 7.0, 11.0, 17.0, 28.0], 800)
}

proptest! {
    #[test]
    fn prop_total_score_is_bounded(
        per in -50.0f64..200.0,
        pbr in -5.0f64..30.0,
        roe in -100.0f64..150.0,
        debt in 0.0f64..600.0,
        admin in any::<bool>(),
        caution in any::<bool>(),
    ) {
        let f = fixture();
        let mut rec = record("P", "X", per, pbr, roe);
        rec.debt_ratio = Some(debt);
        rec.flags.administrative_issue = admin;
        rec.flags.trading_caution = caution;

        let regime = f.regimes.lookup("X");
        let result = f.scorer.score(&rec, &f.snapshot, regime, Vec::new());

        prop_assert!(result.total_score >= 0.0);
        prop_assert!(result.total_score <= 100.0);
        prop_assert!(result.sub_scores.margin_of_safety <= 25.0);
        prop_assert!(result.base_score <= 100.0);
        prop_assert!(result.risk_penalty <= 0.0);
    }

    #[test]
    fn prop_divergent_growth_zeroes_mos(
        per in 1.0f64..100.0,
        pbr in 0.05f64..20.0,
        roe in 1.0f64..100.0,
        b in 0.05f64..0.95,
        frac in 0.01f64..=1.0,
    ) {
        let g = roe / 100.0 * b;
        let r = g * frac;
        let out = JustifiedValuationCalculator::new(ValuationConfig::default(), 25.0)
            .compute(per, pbr, roe, r, b);

        prop_assert_eq!(out.mos_score, 0.0);
        let is_divergent = matches!(out.diagnostic, ValuationDiagnostic::Divergent { .. });
        prop_assert!(is_divergent);
        prop_assert!(out.justified_pbr.is_none());
    }

    #[test]
    fn prop_percentile_is_monotonic(v1 in -20.0f64..60.0, v2 in -20.0f64..60.0, n in 0usize..60) {
        let (lo, hi) = if v1 <= v2 { (v1, v2) } else { (v2, v1) };
        let ctx = PercentileContextualizer::new(PercentileConfig::default());
        let sector = MetricDistribution::from_breakpoints([5.0, 8.0, 12.0, 18.0, 30.0], n);
        let g = global();

        let roe_lo = ctx.rank(Metric::Roe, lo, "x", Some(&sector), Some(&g));
        let roe_hi = ctx.rank(Metric::Roe, hi, "x", Some(&sector), Some(&g));
        prop_assert!(roe_lo.percentile <= roe_hi.percentile);

        let per_lo = ctx.rank(Metric::Per, lo, "x", Some(&sector), Some(&g));
        let per_hi = ctx.rank(Metric::Per, hi, "x", Some(&sector), Some(&g));
        prop_assert!(per_lo.percentile >= per_hi.percentile);
        prop_assert!(per_lo.raw_percentile <= per_hi.raw_percentile);

        for rank in [&roe_lo, &roe_hi, &per_lo, &per_hi] {
            prop_assert!((0.0..=100.0).contains(&rank.percentile));
        }
    }

    #[test]
    fn prop_small_sample_equals_no_sector(v in -20.0f64..60.0) {
        let ctx = PercentileContextualizer::new(PercentileConfig::default());
        let small = MetricDistribution::from_breakpoints([1.0, 2.0, 3.0, 4.0, 5.0], 5);
        let g = global();

        let with_small = ctx.rank(Metric::Pbr, v, "x", Some(&small), Some(&g));
        let without = ctx.rank(Metric::Pbr, v, "x", None, Some(&g));
        prop_assert_eq!(with_small.percentile, without.percentile);
        prop_assert_eq!(with_small.raw_percentile, without.raw_percentile);
        prop_assert_eq!(with_small.source, without.source);
    }

    #[test]
    fn prop_look_ahead_always_rejected(
        per in 1.0f64..30.0,
        pbr in 0.1f64..5.0,
        roe in 1.0f64..40.0,
        lag_days in 0i64..60,
    ) {
        let mut rec = record("L", "X", per, pbr, roe);
        rec.price_asof = today() - chrono::Duration::days(lag_days);
        rec.financial_asof = rec.price_asof + chrono::Duration::days(1);

        let verdict = DataQualityGuard::new(Config::default().quality).check(&rec, today());
        prop_assert!(!verdict.usable);
        prop_assert!(verdict.has(QualityCode::LookAhead));
    }
}

#[test]
fn test_downgrade_idempotent_at_worst_tier() {
    assert_eq!(downgrade(Recommendation::WORST), Recommendation::WORST);
    for tier in Recommendation::ALL {
        let next = downgrade(tier);
        assert!(tier_index(next) - tier_index(tier) <= 1);
        assert!(!tier.is_worse_than(next));
    }
}
