//! 1단계 접촉 엔진
//!
//! 서로 독립적인 두 순수 함수를 제공한다:
//! - 사전 분류기: 취약 트리거 집합으로부터 사람 우선/AI 우선 전략 결정
//! - 결과 전이 함수: 접촉 결과 코드와 현재 상태로부터 다음 실행/연계 상태와
//!   재접촉 지연 결정

use serde::{Deserialize, Serialize};
use triage_core::{
    ContactChannel, ContactExecutionStatus, ContactPlanState, ContactStrategy, LinkageStatus,
    PatientInfo, PriorDiagnosis,
};

/// 사전 분류 트리거 코드
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactTrigger {
    AgeOver80,
    PriorCognitiveHistory,
    ComplaintHistory,
    RefusalHistory,
    GuardianPrimary,
    ComprehensionDifficulty,
    StandardContactPath,
}

impl ContactTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgeOver80 => "AGE_OVER_80",
            Self::PriorCognitiveHistory => "PRIOR_COGNITIVE_HISTORY",
            Self::ComplaintHistory => "COMPLAINT_HISTORY",
            Self::RefusalHistory => "REFUSAL_HISTORY",
            Self::GuardianPrimary => "GUARDIAN_PRIMARY",
            Self::ComprehensionDifficulty => "COMPREHENSION_DIFFICULTY",
            Self::StandardContactPath => "STANDARD_CONTACT_PATH",
        }
    }
}

/// 사전 분류 입력
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretriageInput {
    pub age: u8,
    pub prior_diagnosis: PriorDiagnosis,
    pub complaint_history: bool,
    pub refusal_history: bool,
    pub guardian_is_primary: bool,
    pub comprehension_difficulty: bool,
}

impl PretriageInput {
    /// 대상자 정보에서 분류 입력 구성
    pub fn from_patient(patient: &PatientInfo) -> Self {
        Self {
            age: patient.age,
            prior_diagnosis: patient.prior_diagnosis,
            complaint_history: patient.complaint_history,
            refusal_history: patient.refusal_history,
            guardian_is_primary: patient
                .guardian
                .as_ref()
                .map(|g| g.is_primary_contact)
                .unwrap_or(false),
            comprehension_difficulty: patient.comprehension_difficulty,
        }
    }
}

/// 사전 분류 결과
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PretriageDecision {
    pub triggers: Vec<ContactTrigger>,
    pub strategy: ContactStrategy,
}

impl PretriageDecision {
    pub fn has_trigger(&self, code: &str) -> bool {
        self.triggers.iter().any(|t| t.as_str() == code)
    }
}

/// 사전 분류기
///
/// 취약 트리거(80세 이상, MCI/치매 이력, 민원/거부 이력, 보호자 1차 연락,
/// 이해 곤란) 중 하나라도 있으면 사람 우선, 전부 없으면 AI 우선에
/// `STANDARD_CONTACT_PATH` 합성 트리거를 부여한다.
pub fn classify_pretriage(input: &PretriageInput) -> PretriageDecision {
    let mut triggers = Vec::new();

    if input.age >= 80 {
        triggers.push(ContactTrigger::AgeOver80);
    }
    if matches!(
        input.prior_diagnosis,
        PriorDiagnosis::Mci | PriorDiagnosis::Dementia
    ) {
        triggers.push(ContactTrigger::PriorCognitiveHistory);
    }
    if input.complaint_history {
        triggers.push(ContactTrigger::ComplaintHistory);
    }
    if input.refusal_history {
        triggers.push(ContactTrigger::RefusalHistory);
    }
    if input.guardian_is_primary {
        triggers.push(ContactTrigger::GuardianPrimary);
    }
    if input.comprehension_difficulty {
        triggers.push(ContactTrigger::ComprehensionDifficulty);
    }

    let strategy = if triggers.is_empty() {
        triggers.push(ContactTrigger::StandardContactPath);
        ContactStrategy::AiFirst
    } else {
        ContactStrategy::HumanFirst
    };

    PretriageDecision { triggers, strategy }
}

/// 접촉 결과 코드
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactOutcome {
    ContinueSelf,
    ScheduleLater,
    NoResponse,
    Refuse,
    RequestHuman,
    RequestGuardian,
    Confused,
    Emotional,
}

impl ContactOutcome {
    /// 사람 이관이 필요한 결과인지
    pub fn requires_handoff(&self) -> bool {
        matches!(
            self,
            Self::RequestHuman | Self::RequestGuardian | Self::Confused | Self::Emotional
        )
    }
}

/// 재접촉 지연 시간 (시간 단위)
fn recontact_delay_hours(outcome: ContactOutcome) -> i64 {
    match outcome {
        ContactOutcome::ScheduleLater => 72,
        ContactOutcome::NoResponse => 24,
        ContactOutcome::Refuse => 168,
        _ => 48,
    }
}

/// 접촉 결과 전이 함수
///
/// 현재 계획 상태를 변경하지 않고 다음 상태를 새로 만들어 돌려준다.
/// 하이브리드 채널 전환은 한 번 일어나면 이후 어떤 결과로도 되돌리지 않는다.
pub fn apply_outcome(outcome: ContactOutcome, current: &ContactPlanState) -> ContactPlanState {
    let mut next = current.clone();
    next.recontact_after_hours = Some(recontact_delay_hours(outcome));
    next.handoff_memo_required = false;

    match outcome {
        ContactOutcome::ContinueSelf => {
            next.execution = ContactExecutionStatus::AiInProgress;
            next.linkage = LinkageStatus::InProgress;
            next.recontact_after_hours = None;
        }
        ContactOutcome::ScheduleLater => {
            next.execution = ContactExecutionStatus::Scheduled;
        }
        ContactOutcome::NoResponse => {
            next.execution = ContactExecutionStatus::AwaitingRecontact;
            next.retry_count = current.retry_count + 1;
            if next.retry_count >= 2 {
                next.switched_to_hybrid = true;
            }
        }
        ContactOutcome::Refuse => {
            next.execution = ContactExecutionStatus::Declined;
            next.linkage = LinkageStatus::Dropped;
        }
        ContactOutcome::RequestHuman
        | ContactOutcome::RequestGuardian
        | ContactOutcome::Confused
        | ContactOutcome::Emotional => {
            next.execution = ContactExecutionStatus::HandoffToHuman;
            next.handoff_memo_required = true;
        }
    }

    // 하이브리드 전환은 일방향이다
    if current.switched_to_hybrid {
        next.switched_to_hybrid = true;
    }
    if next.switched_to_hybrid {
        next.channel = ContactChannel::Hybrid;
    }

    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> PretriageInput {
        PretriageInput {
            age: 72,
            prior_diagnosis: PriorDiagnosis::None,
            complaint_history: false,
            refusal_history: false,
            guardian_is_primary: false,
            comprehension_difficulty: false,
        }
    }

    #[test]
    fn test_no_triggers_yields_ai_first_with_standard_path() {
        let decision = classify_pretriage(&base_input());
        assert_eq!(decision.strategy, ContactStrategy::AiFirst);
        assert_eq!(decision.triggers, vec![ContactTrigger::StandardContactPath]);
        assert!(decision.has_trigger("STANDARD_CONTACT_PATH"));
    }

    #[test]
    fn test_age83_with_primary_guardian_forces_human_first() {
        let input = PretriageInput {
            age: 83,
            guardian_is_primary: true,
            ..base_input()
        };
        let decision = classify_pretriage(&input);
        assert_eq!(decision.strategy, ContactStrategy::HumanFirst);
        assert!(decision.has_trigger("GUARDIAN_PRIMARY"));
        assert!(decision.has_trigger("AGE_OVER_80"));
    }

    #[test]
    fn test_recontact_delays() {
        let state = ContactPlanState::default();
        assert_eq!(
            apply_outcome(ContactOutcome::ScheduleLater, &state).recontact_after_hours,
            Some(72)
        );
        assert_eq!(
            apply_outcome(ContactOutcome::NoResponse, &state).recontact_after_hours,
            Some(24)
        );
        assert_eq!(
            apply_outcome(ContactOutcome::Refuse, &state).recontact_after_hours,
            Some(168)
        );
        assert_eq!(
            apply_outcome(ContactOutcome::Confused, &state).recontact_after_hours,
            Some(48)
        );
    }

    #[test]
    fn test_handoff_outcomes_require_memo() {
        let state = ContactPlanState::default();
        for outcome in [
            ContactOutcome::RequestHuman,
            ContactOutcome::RequestGuardian,
            ContactOutcome::Confused,
            ContactOutcome::Emotional,
        ] {
            let next = apply_outcome(outcome, &state);
            assert_eq!(next.execution, ContactExecutionStatus::HandoffToHuman);
            assert!(next.handoff_memo_required);
        }
    }

    #[test]
    fn test_double_no_response_forces_sticky_hybrid() {
        let state = ContactPlanState::default();
        let after_first = apply_outcome(ContactOutcome::NoResponse, &state);
        assert_eq!(after_first.retry_count, 1);
        assert!(!after_first.switched_to_hybrid);

        let after_second = apply_outcome(ContactOutcome::NoResponse, &after_first);
        assert_eq!(after_second.retry_count, 2);
        assert!(after_second.switched_to_hybrid);
        assert_eq!(after_second.channel, ContactChannel::Hybrid);

        // 이후 결과가 와도 하이브리드 전환은 유지된다
        let after_continue = apply_outcome(ContactOutcome::ContinueSelf, &after_second);
        assert!(after_continue.switched_to_hybrid);
        assert_eq!(after_continue.channel, ContactChannel::Hybrid);
    }
}
