//! 3단계 합성 위험 산출

use triage_core::{CaseEntity, RiskBucket, RiskLabel, Stage3ModelOutput, TestPolarity, TrackType};

use crate::hash::hash01;

/// 검사 결과 극성 가중치 (+0.14 양성, 음성은 검사별 계수, +0.03 미상)
fn polarity_weight(polarity: Option<TestPolarity>, negative: f64) -> f64 {
    match polarity {
        Some(TestPolarity::Positive) => 0.14,
        Some(TestPolarity::Negative) => negative,
        Some(TestPolarity::Unknown) | None => 0.03,
    }
}

/// 3단계 위험 산출물 계산
///
/// 2단계 유효 라벨 기반 기저 위험에 바이오마커/뇌영상 극성을 더해 위험 스칼라를
/// 만든다. 추적 유형에 따라 전환 위험 전망 또는 현재 위험 지수 하나만 산출한다.
pub fn compute_stage3_output(case: &CaseEntity) -> Option<Stage3ModelOutput> {
    let profile = case.stage3_profile.as_ref()?;
    let bucket = case.effective_stage2_bucket()?;

    let base = match bucket {
        RiskBucket::Ad => 0.62,
        RiskBucket::MciHigh => 0.55,
        RiskBucket::MciMid => 0.42,
        RiskBucket::MciLow => 0.30,
        RiskBucket::Normal => 0.18,
    };
    let biomarker = polarity_weight(case.stage3_required.biomarker_result, -0.07);
    let imaging = polarity_weight(case.stage3_required.imaging_result, -0.08);
    let jitter = (hash01(&format!("{}:stage3", case.case_id)) - 0.5) * 0.08;

    let risk = (base + biomarker + imaging + jitter).clamp(0.0, 1.0);
    let label = RiskLabel::from_score(risk);

    tracing::debug!(
        "Computed stage-3 output for case {}: risk {:.3}, label {:?}",
        case.case_id,
        risk,
        label
    );

    let output = match profile.track {
        TrackType::PreventiveTracking => Stage3ModelOutput::Conversion {
            year1: (risk * 0.6).min(1.0),
            year2: (risk * 0.8).min(1.0),
            year3: risk,
            label,
        },
        TrackType::AdManagement => Stage3ModelOutput::CurrentIndex {
            index: (risk * 100.0).round() as u8,
            label,
        },
    };
    Some(output)
}
