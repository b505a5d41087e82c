//! 대시보드 집계
//!
//! 필터링된 엔티티 집합으로부터 매 호출 시 새로 계산한다: 증분 집계 없음.

use serde::{Deserialize, Serialize};
use triage_core::{
    CaseEntity, CaseStage, CaseStatus, ContactExecutionStatus, LinkageStatus, RiskBucket,
};

/// 파이프라인 깔때기 단계
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunnelStage {
    pub name: String,
    pub entered: usize,
    pub rate: f64,              // 직전 단계 대비 진입률
    pub dropped: usize,         // 직전 단계 대비 이탈 수
    pub average_wait_days: f64, // 해당 단계 체류 평균 (일)
}

/// 대시보드 집계
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_cases: usize,
    pub contact_needed: usize,
    pub stage2_waiting: usize,
    pub stage3_waiting: usize,
    pub high_risk_mci: usize,
    pub churn_risk: usize,
    pub funnel: Vec<FunnelStage>,
}

/// 깔때기 진행 수준 (0=접수만, 4=장기 추적 도달)
fn funnel_level(case: &CaseEntity) -> usize {
    match case.stage {
        CaseStage::Tracking => 4,
        CaseStage::Evaluation => {
            if matches!(
                case.status,
                CaseStatus::ClassConfirmed | CaseStatus::NextStepSet
            ) {
                3
            } else {
                2
            }
        }
        CaseStage::Initial => {
            if case.contact_plan.execution == ContactExecutionStatus::Pending {
                0
            } else {
                1
            }
        }
    }
}

/// 대시보드 집계 계산
pub fn compute_dashboard_stats(cases: &[CaseEntity]) -> DashboardStats {
    let total_cases = cases.len();

    let contact_needed = cases
        .iter()
        .filter(|c| {
            c.stage == CaseStage::Initial
                && matches!(
                    c.contact_plan.execution,
                    ContactExecutionStatus::Pending
                        | ContactExecutionStatus::AwaitingRecontact
                        | ContactExecutionStatus::Scheduled
                )
        })
        .count();
    let stage2_waiting = cases
        .iter()
        .filter(|c| c.stage == CaseStage::Evaluation && c.status == CaseStatus::WaitingResults)
        .count();
    let stage3_waiting = cases
        .iter()
        .filter(|c| c.stage == CaseStage::Tracking && c.status == CaseStatus::WaitingResults)
        .count();
    let high_risk_mci = cases
        .iter()
        .filter(|c| {
            matches!(
                c.effective_stage2_bucket(),
                Some(RiskBucket::MciMid | RiskBucket::MciHigh)
            )
        })
        .count();
    let churn_risk = cases
        .iter()
        .filter(|c| {
            c.contact_plan.linkage == LinkageStatus::Dropped
                || c.contact_plan.execution == ContactExecutionStatus::Declined
                || c.contact_plan.switched_to_hybrid
        })
        .count();

    let funnel = compute_funnel(cases);

    DashboardStats {
        total_cases,
        contact_needed,
        stage2_waiting,
        stage3_waiting,
        high_risk_mci,
        churn_risk,
        funnel,
    }
}

/// 5단계 깔때기: 접수 → 초기 접촉 → 정밀 평가 → 분류 확정 → 장기 추적
fn compute_funnel(cases: &[CaseEntity]) -> Vec<FunnelStage> {
    let names = ["접수", "초기 접촉", "정밀 평가", "분류 확정", "장기 추적"];
    let mut entered = [0usize; 5];
    let mut wait_days_sum = [0f64; 5];

    for case in cases {
        let level = funnel_level(case);
        // 도달한 단계까지 전부 진입으로 센다
        for stage_entered in entered.iter_mut().take(level + 1) {
            *stage_entered += 1;
        }
        let wait = (case.updated_at - case.created_at).num_hours() as f64 / 24.0;
        wait_days_sum[level] += wait;
    }

    let mut funnel = Vec::with_capacity(5);
    let mut prev = cases.len();
    for (idx, name) in names.iter().enumerate() {
        let count = entered[idx];
        let rate = if prev == 0 {
            0.0
        } else {
            count as f64 / prev as f64
        };
        let dropped = prev.saturating_sub(count);
        let stayers = cases
            .iter()
            .filter(|c| funnel_level(c) == idx)
            .count();
        let average_wait_days = if stayers == 0 {
            0.0
        } else {
            wait_days_sum[idx] / stayers as f64
        };
        funnel.push(FunnelStage {
            name: name.to_string(),
            entered: count,
            rate,
            dropped,
            average_wait_days,
        });
        prev = count;
    }
    funnel
}
