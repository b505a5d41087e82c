//! 2단계 합성 분류 산출

use chrono::Utc;
use triage_core::{
    CaseEntity, LegacyRiskTier, NeuroTestType, RiskBucket, Stage2ModelOutput, SubScoreBand,
};

use crate::hash::hash01;

pub(crate) const MODEL_VERSION: &str = "synthetic-v1";

/// 2단계 분류 산출물 계산
///
/// 레거시 위험 등급, CDR/GDS, MMSE, 신경심리검사 가중치를 시드 지터와 섞어
/// 중증도 스칼라를 만들고, (정상+악화)² 전개로 세 확률을 유도한다.
/// 확률 합은 전개식 특성상 정확히 1이다.
pub fn compute_stage2_output(case: &CaseEntity) -> Stage2ModelOutput {
    let jitter = hash01(&format!("{}:stage2", case.case_id));

    let tier_weight = match case.legacy_risk_tier {
        LegacyRiskTier::High => 0.25,
        LegacyRiskTier::Mid => 0.12,
        LegacyRiskTier::Low => 0.0,
    };
    let cdr_weight = case
        .stage2_required
        .cdr_gds
        .map(|v| (v / 3.0).clamp(0.0, 1.0) * 0.25)
        .unwrap_or(0.0);
    let mmse_weight = case
        .stage2_required
        .mmse
        .map(|m| ((30 - m).max(0) as f64 / 30.0) * 0.2)
        .unwrap_or(0.0);
    let neuro_weight = match case.stage2_required.neuro_test_type {
        Some(NeuroTestType::Snsb) => 0.05,
        Some(NeuroTestType::CeradK) => 0.04,
        Some(NeuroTestType::Lica) => 0.03,
        None => 0.0,
    };

    let severity = (jitter * 0.3 + tier_weight + cdr_weight + mmse_weight + neuro_weight)
        .clamp(0.0, 1.0);

    // (q + p)^2 = q^2 + 2pq + p^2, p = severity
    let prob_ad = severity * severity;
    let prob_mci = 2.0 * severity * (1.0 - severity);
    let prob_normal = (1.0 - severity) * (1.0 - severity);

    let raw_sub = severity * 0.7 + hash01(&format!("{}:mci", case.case_id)) * 0.3;
    let mci_sub_score = (raw_sub * 100.0).round().min(100.0) as u8;
    let sub_score_band = SubScoreBand::from_score(mci_sub_score);

    let predicted = if severity >= 0.75 {
        RiskBucket::Ad
    } else if severity < 0.35 {
        RiskBucket::Normal
    } else {
        match sub_score_band {
            SubScoreBand::Good => RiskBucket::MciLow,
            SubScoreBand::Mid => RiskBucket::MciMid,
            SubScoreBand::High => RiskBucket::MciHigh,
        }
    };

    tracing::debug!(
        "Computed stage-2 output for case {}: severity {:.3}, predicted {:?}",
        case.case_id,
        severity,
        predicted
    );

    Stage2ModelOutput {
        prob_normal,
        prob_mci,
        prob_ad,
        predicted,
        mci_sub_score,
        sub_score_band,
        model_version: MODEL_VERSION.to_string(),
        computed_at: Utc::now(),
        confirmed_label: None,
    }
}
