//! 1단계 상세 프로젝션
//!
//! 읽기 위주 파생 구조로, 케이스가 바뀔 때마다 전체를 다시 구성한다
//! (케이스 전환 간 증분 패치를 하지 않는다).

use serde::{Deserialize, Serialize};
use triage_core::{CaseEntity, CaseEvent, CaseEventType, ContactStrategy, LegacyRiskTier};

use crate::contact::{classify_pretriage, ContactTrigger, PretriageInput};

/// 정책 관문 종류: 접촉 실행 전 충족해야 하는 전제
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PolicyGateKind {
    Consent,           // 동의
    PurposeNotice,     // 목적 고지
    Contactability,    // 연락 가능 여부
    PhoneVerification, // 전화번호 검증
    GuardianInfo,      // 보호자 정보
}

impl PolicyGateKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Consent => "수집·이용 동의",
            Self::PurposeNotice => "목적 고지",
            Self::Contactability => "연락 가능",
            Self::PhoneVerification => "전화번호 검증",
            Self::GuardianInfo => "보호자 정보",
        }
    }
}

/// 정책 관문 상태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyGate {
    pub kind: PolicyGateKind,
    pub label: String,
    pub satisfied: bool,
}

/// 개입 수준: 트리거 수에 비례
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InterventionLevel {
    Standard,  // 트리거 없음
    Elevated,  // 1~2개
    Intensive, // 3개 이상
}

/// 헤더 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Header {
    pub case_id: String,
    pub patient_name: String,
    pub age: u8,
    pub region: String,
    pub assignee_name: String,
    pub status_label: String,
}

/// 점수 요약
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub legacy_risk_tier: LegacyRiskTier,
    pub trigger_count: usize,
    pub strategy: ContactStrategy,
}

/// 할 일 항목
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub label: String,
    pub done: bool,
}

/// 접촉 타임라인 항목 (최신 우선)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactTimelineEntry {
    pub at: chrono::DateTime<chrono::Utc>,
    pub actor_id: String,
    pub summary: String,
}

/// 1단계 상세 뷰
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage1Detail {
    pub header: Stage1Header,
    pub policy_gates: Vec<PolicyGate>,
    pub intervention_level: InterventionLevel,
    pub risk_evidence: Vec<String>,
    pub score_summary: ScoreSummary,
    pub todos: Vec<TodoItem>,
    pub contact_timeline: Vec<ContactTimelineEntry>,
}

/// 1단계 상세 프로젝션 구성
pub fn build_stage1_detail(case: &CaseEntity, events: &[CaseEvent]) -> Stage1Detail {
    let decision = classify_pretriage(&PretriageInput::from_patient(&case.patient));
    let vulnerability_triggers: Vec<&ContactTrigger> = decision
        .triggers
        .iter()
        .filter(|t| !matches!(t, ContactTrigger::StandardContactPath))
        .collect();

    let intervention_level = match vulnerability_triggers.len() {
        0 => InterventionLevel::Standard,
        1 | 2 => InterventionLevel::Elevated,
        _ => InterventionLevel::Intensive,
    };

    let risk_evidence = vulnerability_triggers
        .iter()
        .map(|t| t.as_str().to_string())
        .collect();

    let has_guardian = case.patient.guardian.is_some();
    let has_phone = !case.patient.phone.is_empty();
    let policy_gates = vec![
        gate(PolicyGateKind::Consent, true), // 시드 등록 시 동의 확보가 전제
        gate(PolicyGateKind::PurposeNotice, true),
        gate(PolicyGateKind::Contactability, has_phone || has_guardian),
        gate(PolicyGateKind::PhoneVerification, has_phone),
        gate(PolicyGateKind::GuardianInfo, has_guardian),
    ];

    let contacted = events
        .iter()
        .any(|e| matches!(e.event_type, CaseEventType::ContactOutcome));
    let todos = vec![
        TodoItem {
            label: "초기 접촉 수행".to_string(),
            done: contacted,
        },
        TodoItem {
            label: "2단계 평가 연계".to_string(),
            done: case.stage.number() >= 2,
        },
    ];

    let contact_timeline = events
        .iter()
        .filter(|e| {
            matches!(
                e.event_type,
                CaseEventType::ContactAttempted | CaseEventType::ContactOutcome
            )
        })
        .map(|e| ContactTimelineEntry {
            at: e.at,
            actor_id: e.actor_id.clone(),
            summary: e
                .payload
                .get("outcome")
                .and_then(|v| v.as_str())
                .unwrap_or("접촉 시도")
                .to_string(),
        })
        .collect();

    Stage1Detail {
        header: Stage1Header {
            case_id: case.case_id.clone(),
            patient_name: case.patient.name.clone(),
            age: case.patient.age,
            region: format!("{} {}", case.region.sido, case.region.sigungu),
            assignee_name: case.assignee.assignee_name.clone(),
            status_label: case.status.label().to_string(),
        },
        policy_gates,
        intervention_level,
        risk_evidence,
        score_summary: ScoreSummary {
            legacy_risk_tier: case.legacy_risk_tier,
            trigger_count: vulnerability_triggers.len(),
            strategy: decision.strategy,
        },
        todos,
        contact_timeline,
    }
}

fn gate(kind: PolicyGateKind, satisfied: bool) -> PolicyGate {
    PolicyGate {
        label: kind.label().to_string(),
        kind,
        satisfied,
    }
}
