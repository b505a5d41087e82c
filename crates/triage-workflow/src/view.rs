//! 3단계 뷰 도출기
//!
//! 복구된 케이스로부터 UI 무관 뷰모델(4개 단계 카드, 위험 배지, 기본 행동)을
//! 구성한다. 내부에서 항상 정합성 복구를 먼저 수행한다.

use serde::{Deserialize, Serialize};
use triage_core::{CaseEntity, LoopStatus, TrackType, TrackingModelStatus};

use crate::reconcile::{reconcile, ReconcilePolicy};

/// 단계 카드 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StepCardState {
    Locked,
    Todo,
    InProgress,
    Done,
}

/// 단계 카드
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepCard {
    pub step: u8,
    pub label: String,
    pub state: StepCardState,
}

/// 위험 배지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RiskBadge {
    /// 모델 준비 + 결과 존재일 때만. 라벨 문구는 추적 유형에 따라 다르다.
    Ready { label: String, summary: String },
    Pending { reason: String },
}

/// 기본 행동(call-to-action)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PrimaryAction {
    /// 전역 보류/제외: 사유 확인
    ConfirmHoldReason { status: LoopStatus },
    /// 첫 미완료 단계 열기
    OpenStep { step: u8, label: String },
    /// 루프 완결
    LoopComplete,
}

/// 3단계 뷰모델
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage3ViewModel {
    pub case_id: String,
    pub step_cards: Vec<StepCard>,
    pub risk_badge: RiskBadge,
    pub primary_action: PrimaryAction,
    pub inconsistency_flags: Vec<String>,
}

const STEP_LABELS: [&str; 4] = ["진단 결과 확인", "위험도 산출", "결과 확정", "관리 계획 수립"];

/// 복구된 상태로부터 3단계 뷰모델 도출
pub fn derive_stage3_view(case: &CaseEntity, policy: &ReconcilePolicy) -> Stage3ViewModel {
    let reconciled = reconcile(case, policy);
    let case = &reconciled.next_case;
    let held = case.stage3_loop.status.is_held();

    let mut step_cards = Vec::with_capacity(4);
    for step in 1..=4u8 {
        let done = case.stage3_loop.completed.get(step).is_some();
        let prereq_done = step == 1 || case.stage3_loop.completed.get(step - 1).is_some();

        let state = if done {
            StepCardState::Done
        } else if held || !prereq_done {
            StepCardState::Locked
        } else if step == 2
            && matches!(
                case.tracking_model.status,
                TrackingModelStatus::Running | TrackingModelStatus::Queued
            )
        {
            StepCardState::InProgress
        } else if step == 3
            && case.tracking_model.status == TrackingModelStatus::Ready
            && !case.tracking_model.confirmed
        {
            StepCardState::InProgress
        } else {
            StepCardState::Todo
        };

        step_cards.push(StepCard {
            step,
            label: STEP_LABELS[(step - 1) as usize].to_string(),
            state,
        });
    }

    let risk_badge = build_risk_badge(case);

    let primary_action = if held {
        PrimaryAction::ConfirmHoldReason {
            status: case.stage3_loop.status,
        }
    } else if let Some(card) = step_cards.iter().find(|c| c.state != StepCardState::Done) {
        PrimaryAction::OpenStep {
            step: card.step,
            label: card.label.clone(),
        }
    } else {
        PrimaryAction::LoopComplete
    };

    Stage3ViewModel {
        case_id: case.case_id.clone(),
        step_cards,
        risk_badge,
        primary_action,
        inconsistency_flags: reconciled.inconsistency_flags,
    }
}

fn build_risk_badge(case: &CaseEntity) -> RiskBadge {
    let ready = case.tracking_model.status == TrackingModelStatus::Ready
        && case.tracking_model.result.is_some();
    if !ready {
        return RiskBadge::Pending {
            reason: "위험도 산출 대기 중".to_string(),
        };
    }

    let track = case.stage3_profile.as_ref().map(|p| p.track);
    let label = match track {
        Some(TrackType::AdManagement) => "현재 위험 지수".to_string(),
        _ => "N년 AD 전환 위험".to_string(),
    };
    let summary = match case.tracking_model.result.as_ref() {
        Some(triage_core::Stage3ModelOutput::CurrentIndex { index, label }) => {
            format!("{} ({:?})", index, label)
        }
        Some(triage_core::Stage3ModelOutput::Conversion {
            year1,
            year2,
            year3,
            label,
        }) => format!(
            "1년 {:.0}% / 2년 {:.0}% / 3년 {:.0}% ({:?})",
            year1 * 100.0,
            year2 * 100.0,
            year3 * 100.0,
            label
        ),
        None => String::new(),
    };
    RiskBadge::Ready { label, summary }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use triage_core::{
        AssigneeInfo, CaseStage, LegacyRiskTier, PatientInfo, PriorDiagnosis, RegionInfo,
        RiskLabel, RouteChannel, Stage3ModelOutput,
    };

    fn tracking_case(case_id: &str) -> CaseEntity {
        let mut case = CaseEntity::new_registered(
            case_id,
            PatientInfo {
                name: "한복동".to_string(),
                age: 79,
                phone: "010-5555-6666".to_string(),
                guardian: None,
                prior_diagnosis: PriorDiagnosis::None,
                complaint_history: false,
                refusal_history: false,
                comprehension_difficulty: false,
            },
            RegionInfo {
                sido: "인천".to_string(),
                sigungu: "연수구".to_string(),
            },
            AssigneeInfo {
                assignee_id: "A-04".to_string(),
                assignee_name: "오담당".to_string(),
            },
            LegacyRiskTier::Mid,
            RouteChannel::Center,
        );
        case.stage = CaseStage::Tracking;
        case
    }

    #[test]
    fn test_running_model_with_stale_result_shows_pending_badge() {
        let mut case = tracking_case("IC-000001");
        case.tracking_model.status = TrackingModelStatus::Running;
        case.tracking_model.result = Some(Stage3ModelOutput::CurrentIndex {
            index: 55,
            label: RiskLabel::Mid,
        });

        let view = derive_stage3_view(&case, &ReconcilePolicy::default());
        assert!(matches!(view.risk_badge, RiskBadge::Pending { .. }));
    }

    #[test]
    fn test_on_hold_cards_never_in_progress_or_inferred_done() {
        let mut case = tracking_case("IC-000002");
        case.stage3_loop.status = LoopStatus::OnHold;
        case.tracking_model.status = TrackingModelStatus::Running;

        let view = derive_stage3_view(&case, &ReconcilePolicy::default());
        for card in &view.step_cards {
            assert!(
                matches!(card.state, StepCardState::Locked | StepCardState::Todo),
                "card {} is {:?}",
                card.step,
                card.state
            );
        }
        assert!(matches!(
            view.primary_action,
            PrimaryAction::ConfirmHoldReason {
                status: LoopStatus::OnHold
            }
        ));
    }

    #[test]
    fn test_step_states_follow_prerequisites() {
        let mut case = tracking_case("IC-000003");
        case.stage3_loop.completed.set(1, Utc::now());
        case.tracking_model.status = TrackingModelStatus::Queued;

        let view = derive_stage3_view(&case, &ReconcilePolicy::default());
        assert_eq!(view.step_cards[0].state, StepCardState::Done);
        assert_eq!(view.step_cards[1].state, StepCardState::InProgress);
        assert_eq!(view.step_cards[2].state, StepCardState::Locked);
        assert_eq!(view.step_cards[3].state, StepCardState::Locked);
        assert!(matches!(
            view.primary_action,
            PrimaryAction::OpenStep { step: 2, .. }
        ));
    }

    #[test]
    fn test_all_done_yields_loop_complete() {
        let mut case = tracking_case("IC-000004");
        for step in 1..=4u8 {
            case.stage3_loop.completed.set(step, Utc::now());
        }
        case.stage3_loop.status = LoopStatus::Done;

        let view = derive_stage3_view(&case, &ReconcilePolicy::default());
        assert!(view
            .step_cards
            .iter()
            .all(|c| c.state == StepCardState::Done));
        assert!(matches!(view.primary_action, PrimaryAction::LoopComplete));
    }
}
