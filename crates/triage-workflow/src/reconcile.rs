//! 3단계 정합성 복구 엔진
//!
//! 운영 루프와 모델/결과 짝의 구조 불변식을 점검하고, 위반을 자가 복구하면서
//! 패치 이력을 남긴다. 순수 함수이며 멱등하다: 자기 출력에 다시 적용하면
//! 추가 패치가 없어야 한다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_core::{CaseEntity, LoopStatus, TrackingModelStatus};

/// 복구 정책: 외부 정책 스위치는 이것 하나뿐이다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilePolicy {
    /// 모델 결과가 준비되어 있으면 1단계를 자동 완료 처리할지 여부.
    /// false면 변이 없이 불일치 플래그만 남긴다.
    pub auto_complete_step1: bool,
}

impl Default for ReconcilePolicy {
    fn default() -> Self {
        Self {
            auto_complete_step1: true,
        }
    }
}

/// 복구 패치 코드: 수행한 복구 동작으로 명명한다
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatchCode {
    StrayResultCleared,   // 비준비 상태의 잔존 결과 제거
    OrphanStepCleared,    // 선행 단계 없는 완료 타임스탬프 제거
    AutoStep1Stamped,     // 모델 준비 기반 1단계 자동 완료
    DiagnosisFastForward, // 진단 확정 케이스의 단계 자동 완료
    StepRecomputed,       // 접두 규칙으로 현재 단계 보정
    DoneStepStamped,      // 완료 상태 루프의 누락 타임스탬프 보정
}

/// 단건 복구 패치
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub code: PatchCode,
    pub detail: String,
}

/// 자가 복구 감사 기록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub summary: String,
}

/// 복구 결과
#[derive(Debug, Clone)]
pub struct Reconciled {
    pub next_case: CaseEntity,
    pub patches: Vec<Patch>,
    pub inconsistency_flags: Vec<String>,
    pub audit: Option<AuditEntry>,
}

/// 케이스의 3단계 구조 불변식을 점검·복구한다
///
/// 구조 복구(잔존 결과 제거, 고아 타임스탬프 제거, 단계 재계산)는 항상 수행하고,
/// 스탬핑 복구(1단계 자동 완료, 진단 확정 패스트포워드, 완료 보정)는 루프가
/// 보류/제외 상태가 아닐 때에만 수행한다.
pub fn reconcile(case: &CaseEntity, policy: &ReconcilePolicy) -> Reconciled {
    let mut next = case.clone();
    let mut patches = Vec::new();
    let mut flags = Vec::new();
    let mut audit_lines: Vec<String> = Vec::new();

    let held = next.stage3_loop.status.is_held();

    // 비준비 상태에서 결과가 남아 있으면 제거한다
    if next.tracking_model.status != TrackingModelStatus::Ready
        && next.tracking_model.result.is_some()
    {
        next.tracking_model.result = None;
        patches.push(Patch {
            code: PatchCode::StrayResultCleared,
            detail: format!(
                "모델 상태 {:?}에서 잔존 결과 제거",
                next.tracking_model.status
            ),
        });
    }

    // 선행 단계 없는 완료 타임스탬프는 순서대로(N=2,3,4) 제거한다
    for step in 2..=4u8 {
        if next.stage3_loop.completed.get(step).is_some()
            && next.stage3_loop.completed.get(step - 1).is_none()
        {
            next.stage3_loop.completed.clear(step);
            patches.push(Patch {
                code: PatchCode::OrphanStepCleared,
                detail: format!("STEP{} 고아 타임스탬프 제거", step),
            });
        }
    }

    // 모델 준비 + 결과 존재인데 1단계 미완료인 경우
    let model_ready =
        next.tracking_model.status == TrackingModelStatus::Ready && next.tracking_model.result.is_some();
    if model_ready && next.stage3_loop.completed.step1_at.is_none() {
        if held {
            flags.push("모델 결과가 준비되었으나 STEP1이 미완료 상태입니다".to_string());
        } else if policy.auto_complete_step1 {
            let stamp = next.tracking_model.computed_at.unwrap_or(next.updated_at);
            next.stage3_loop.completed.set(1, stamp);
            patches.push(Patch {
                code: PatchCode::AutoStep1Stamped,
                detail: "모델 산출 시각으로 STEP1 자동 완료".to_string(),
            });
            audit_lines.push("STEP1 자동 완료 처리".to_string());
        } else {
            flags.push("모델 결과가 준비되었으나 STEP1이 미완료 상태입니다".to_string());
        }
    }

    // 진단 확정(편입 프로파일 보유) 케이스는 점검 단계를 건너뛴 것으로 본다.
    // 기존 시스템의 동작을 보존한 것으로, 사람 검토 누락을 가릴 수 있어
    // 제품 측 확인 대상이다.
    if next.stage3_profile.is_some() && !held {
        let stamp = next.tracking_model.computed_at.unwrap_or(next.updated_at);
        let mut stamped = Vec::new();
        for step in 1..=2u8 {
            if next.stage3_loop.completed.get(step).is_none() {
                next.stage3_loop.completed.set(step, stamp);
                stamped.push(step);
            }
        }
        if next.tracking_model.status == TrackingModelStatus::Ready
            && next.stage3_loop.completed.step3_at.is_none()
        {
            next.stage3_loop.completed.set(3, stamp);
            stamped.push(3);
        }
        if !stamped.is_empty() {
            let steps: Vec<String> = stamped.iter().map(|s| format!("STEP{}", s)).collect();
            patches.push(Patch {
                code: PatchCode::DiagnosisFastForward,
                detail: format!("진단 확정 케이스 {} 자동 완료", steps.join(", ")),
            });
            audit_lines.push(format!("진단 확정 패스트포워드: {}", steps.join(", ")));
        }
    }

    // 완료 상태 루프는 전 단계 타임스탬프가 있어야 한다
    if next.stage3_loop.status == LoopStatus::Done {
        let now = Utc::now();
        let mut stamped = Vec::new();
        for step in 1..=4u8 {
            if next.stage3_loop.completed.get(step).is_none() {
                next.stage3_loop.completed.set(step, now);
                stamped.push(step);
            }
        }
        if !stamped.is_empty() {
            let steps: Vec<String> = stamped.iter().map(|s| format!("STEP{}", s)).collect();
            patches.push(Patch {
                code: PatchCode::DoneStepStamped,
                detail: format!("완료 상태 루프의 {} 보정", steps.join(", ")),
            });
            audit_lines.push(format!("완료 루프 타임스탬프 보정: {}", steps.join(", ")));
        }
    }

    // 현재 단계는 항상 완료 접두 규칙에서 재유도한다
    let derived = next.stage3_loop.completed.derived_step();
    if next.stage3_loop.step != derived {
        patches.push(Patch {
            code: PatchCode::StepRecomputed,
            detail: format!(
                "현재 단계 {} → {} 보정",
                next.stage3_loop.step, derived
            ),
        });
        next.stage3_loop.step = derived;
    }

    next.stage3_loop.blockers = compute_blockers(&next);

    if !patches.is_empty() {
        tracing::info!(
            "Reconciled case {} with {} patch(es)",
            next.case_id,
            patches.len()
        );
    }

    let audit = if audit_lines.is_empty() {
        None
    } else {
        Some(AuditEntry {
            at: Utc::now(),
            summary: audit_lines.join("; "),
        })
    };

    Reconciled {
        next_case: next,
        patches,
        inconsistency_flags: flags,
        audit,
    }
}

/// 차단 사유 재계산
///
/// 보류/제외 상태에서는 상태 설명 하나로 접고, 그 외에는 첫 미완료 단계부터의
/// 완료 필요 목록을 만든다.
fn compute_blockers(case: &CaseEntity) -> Vec<String> {
    match case.stage3_loop.status {
        LoopStatus::OnHold => vec!["보류 상태: 보류 사유 확인 필요".to_string()],
        LoopStatus::Excluded => vec!["제외 상태: 제외 사유 확인 필요".to_string()],
        LoopStatus::Done => Vec::new(),
        LoopStatus::Active => (1..=4u8)
            .filter(|&step| case.stage3_loop.completed.get(step).is_none())
            .map(|step| format!("STEP{} 완료 필요", step))
            .collect(),
    }
}
