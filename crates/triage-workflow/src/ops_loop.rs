//! 운영 루프 상태 계산기
//!
//! 케이스의 이벤트 유형 타임라인을 4개 범용 단계로 재생한다. 하류 진행 이벤트가
//! 있으면 상류 단계도 일어난 것으로 추론한다(직접 이벤트가 없더라도). 저장된
//! 상태와 새로 계산한 상태가 어긋나면 불일치 진단 문자열을 낸다.

use serde::{Deserialize, Serialize};
use triage_core::{CaseEntity, CaseEvent, CaseEventType, CaseStage};

/// 재생된 단일 단계
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsStep {
    pub step: u8,
    pub label: String,
    pub done: bool,
    pub inferred: bool, // 직접 이벤트 없이 하류 진행으로 추론된 완료
}

/// 재생된 운영 루프 상태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsLoopState {
    pub steps: Vec<OpsStep>,
    pub current_step: u8,
}

/// 단계 라벨: 단계(stage)별로 이름만 다르고 구조는 같다
fn step_labels(stage: CaseStage) -> [&'static str; 4] {
    match stage {
        CaseStage::Initial => ["접수", "초기 상담", "분류", "연계"],
        CaseStage::Evaluation => ["검사 접수", "검사 입력", "AI 분석", "결과 확정"],
        CaseStage::Tracking => ["진단 확인", "위험도 산출", "결과 확정", "관리 계획"],
    }
}

/// 이벤트 타임라인을 4단계로 재생
pub fn compute_ops_loop(stage: CaseStage, events: &[CaseEvent]) -> OpsLoopState {
    let has = |event_type: CaseEventType| events.iter().any(|e| e.event_type == event_type);

    // 단계별 직접 이벤트
    let direct = match stage {
        CaseStage::Initial => [
            has(CaseEventType::CaseRegistered),
            has(CaseEventType::ContactAttempted) || has(CaseEventType::ContactOutcome),
            has(CaseEventType::ModelExecuted),
            has(CaseEventType::NextStepSet) || has(CaseEventType::StagePromoted),
        ],
        CaseStage::Evaluation | CaseStage::Tracking => [
            has(CaseEventType::CaseRegistered),
            has(CaseEventType::EvidenceUpdated),
            has(CaseEventType::ModelExecuted),
            has(CaseEventType::ModelConfirmed) || has(CaseEventType::NextStepSet),
        ],
    };

    // 하류 진행이 있으면 상류 단계는 일어난 것으로 본다
    let downstream_progress = has(CaseEventType::ModelExecuted)
        || has(CaseEventType::ModelConfirmed)
        || has(CaseEventType::NextStepSet)
        || has(CaseEventType::StagePromoted);

    let labels = step_labels(stage);
    let mut steps = Vec::with_capacity(4);
    for (idx, label) in labels.iter().enumerate() {
        let step = (idx + 1) as u8;
        let inferred = !direct[idx] && step <= 2 && downstream_progress;
        steps.push(OpsStep {
            step,
            label: label.to_string(),
            done: direct[idx] || inferred,
            inferred,
        });
    }

    // 현재 단계: 첫 미완료, 전부 완료면 4
    let current_step = steps
        .iter()
        .find(|s| !s.done)
        .map(|s| s.step)
        .unwrap_or(4);

    OpsLoopState {
        steps,
        current_step,
    }
}

/// 저장 상태와 재생 상태의 불일치 진단
pub fn diagnose_mismatch(case: &CaseEntity, computed: &OpsLoopState) -> Vec<String> {
    let mut diagnostics = Vec::new();

    if case.stage == CaseStage::Tracking {
        let persisted_step = case.stage3_loop.step;
        if persisted_step != computed.current_step {
            diagnostics.push(format!(
                "저장된 현재 단계 {}와 이벤트 재생 단계 {}가 불일치",
                persisted_step, computed.current_step
            ));
        }
    }

    let persisted_done = case.model2.is_some();
    let replayed_model = computed
        .steps
        .get(2)
        .map(|s| s.done && !s.inferred)
        .unwrap_or(false);
    if case.stage == CaseStage::Evaluation && persisted_done && !replayed_model {
        diagnostics.push("모델 산출물이 있으나 모델 실행 이벤트가 없음".to_string());
    }

    if !diagnostics.is_empty() {
        tracing::warn!(
            "Ops loop mismatch for case {}: {} issue(s)",
            case.case_id,
            diagnostics.len()
        );
    }
    diagnostics
}
