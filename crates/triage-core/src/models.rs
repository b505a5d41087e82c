//! 핵심 데이터 모델 정의
//!
//! 대상자(케이스) 엔티티와 단계별 상태·근거·모델 산출물 구조를 정의한다.
//! 모든 상태 값은 닫힌 열거형으로 표현하며, 파생 필드는 외부에서 직접 세팅하지 않는다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 트리아지 단계 (1=초기 접촉, 2=정밀 평가, 3=장기 추적)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseStage {
    Initial,    // 1단계: 초기 접촉
    Evaluation, // 2단계: 정밀 평가
    Tracking,   // 3단계: 장기 추적
}

impl CaseStage {
    /// 단계 번호 (1..=3)
    pub fn number(&self) -> u8 {
        match self {
            Self::Initial => 1,
            Self::Evaluation => 2,
            Self::Tracking => 3,
        }
    }
}

/// 케이스 상태
///
/// `Closed`/`Excluded`는 종결 상태이며, 엔티티 삭제 대신 사용한다.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseStatus {
    Open,           // 접수됨
    WaitingResults, // 검사 결과 대기
    ResultReady,    // 모델 결과 산출됨
    ClassConfirmed, // 분류 확정
    NextStepSet,    // 다음 경로 결정됨
    InTracking,     // 추적 관리 중
    Closed,         // 종결
    OnHold,         // 보류
    Excluded,       // 제외
}

impl CaseStatus {
    /// 화면 표기용 상태 라벨
    pub fn label(&self) -> &'static str {
        match self {
            Self::Open => "접수",
            Self::WaitingResults => "결과 대기",
            Self::ResultReady => "결과 산출",
            Self::ClassConfirmed => "분류 확정",
            Self::NextStepSet => "경로 결정",
            Self::InTracking => "추적 중",
            Self::Closed => "종결",
            Self::OnHold => "보류",
            Self::Excluded => "제외",
        }
    }
}

/// 운영 단계 (케이스 처리 진행 위치)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum OperationStep {
    Registration,       // 접수
    EvidenceCollection, // 근거(검사) 수집
    ModelRun,           // 모델 실행
    ResultReview,       // 결과 검토
    NextStepDecision,   // 경로 결정
    Tracking,           // 추적 관리
}

/// 케이스 수준 모델 실행 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaseModelStatus {
    Pending,    // 실행 전
    Processing, // 실행 중 (UI 폴링 플래그)
    Done,       // 실행 완료
}

/// 2단계 평가 경로
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RouteChannel {
    Hospital, // 협약 병원 경로
    Center,   // 센터 자체 경로
}

/// 레거시 위험 등급 (기존 선별검사에서 넘어온 값)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LegacyRiskTier {
    Low,
    Mid,
    High,
}

/// 보호자 정보
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GuardianInfo {
    pub name: String,
    pub phone: String,
    pub is_primary_contact: bool, // 보호자가 1차 연락 대상인지
}

/// 과거 진단 이력
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PriorDiagnosis {
    None,
    Mci,
    Dementia,
}

/// 대상자 기본 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientInfo {
    pub name: String,
    pub age: u8,
    pub phone: String,
    pub guardian: Option<GuardianInfo>,
    pub prior_diagnosis: PriorDiagnosis,
    pub complaint_history: bool,         // 민원 이력
    pub refusal_history: bool,           // 거부 이력
    pub comprehension_difficulty: bool,  // 의사소통/이해 곤란
}

/// 지역 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionInfo {
    pub sido: String,    // 시/도
    pub sigungu: String, // 시/군/구
}

/// 담당자 정보
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssigneeInfo {
    pub assignee_id: String,
    pub assignee_name: String,
}

/// 신경심리검사 종류
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NeuroTestType {
    Snsb,
    CeradK,
    Lica,
}

/// 검사 결과 극성
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TestPolarity {
    Positive,
    Negative,
    Unknown,
}

/// 2단계 필수 검사 입력 (미입력 필드는 None)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage2Required {
    pub specialist_exam_done: Option<bool>,     // 전문의 진찰 여부
    pub cdr_gds: Option<f64>,                   // CDR/GDS 점수
    pub neuro_test_type: Option<NeuroTestType>, // 신경심리검사 종류
    pub mmse: Option<i32>,                      // MMSE 점수 (병원 경로만 필수)
}

/// 3단계 필수 검사 입력
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stage3Required {
    pub biomarker_done: Option<bool>,            // 바이오마커 검사 여부
    pub biomarker_result: Option<TestPolarity>,  // 바이오마커 결과
    pub imaging_done: Option<bool>,              // 뇌영상 검사 여부
    pub imaging_result: Option<TestPolarity>,    // 뇌영상 결과
    pub examined_at: Option<DateTime<Utc>>,      // 검사일
}

/// 근거 완결성 평가 결과 (파생 전용, 직접 세팅 금지)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceState {
    pub completed: bool,
    pub missing: Vec<String>,
}

/// 위험 분류 버킷
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RiskBucket {
    Normal,
    MciLow,
    MciMid,
    MciHigh,
    Ad,
}

impl RiskBucket {
    /// 3단계 편입 대상 여부: MCI-MID/MCI-HIGH/AD만 편입된다
    pub fn stage3_eligible(&self) -> bool {
        matches!(self, Self::MciMid | Self::MciHigh | Self::Ad)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Normal => "정상",
            Self::MciLow => "MCI-저위험",
            Self::MciMid => "MCI-중위험",
            Self::MciHigh => "MCI-고위험",
            Self::Ad => "AD",
        }
    }
}

/// MCI 세부 점수 구간 (40/70 기준)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SubScoreBand {
    Good, // 양호 (<40)
    Mid,  // 중간 (<70)
    High, // 위험 (>=70)
}

impl SubScoreBand {
    pub fn from_score(score: u8) -> Self {
        if score < 40 {
            Self::Good
        } else if score < 70 {
            Self::Mid
        } else {
            Self::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Good => "양호",
            Self::Mid => "중간",
            Self::High => "위험",
        }
    }
}

/// 2단계 모델 산출물
///
/// 모델 실행이 명시적으로 트리거된 경우에만 존재한다. 근거가 완결되었다는
/// 사실만으로 결과가 합성되지 않는다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage2ModelOutput {
    pub prob_normal: f64,
    pub prob_mci: f64,
    pub prob_ad: f64,
    pub predicted: RiskBucket,
    pub mci_sub_score: u8, // 0..=100
    pub sub_score_band: SubScoreBand,
    pub model_version: String,
    pub computed_at: DateTime<Utc>,
    pub confirmed_label: Option<RiskBucket>, // 사람이 확정한 라벨 (생성 라벨 우선 대체)
}

impl Stage2ModelOutput {
    /// 확정 라벨이 있으면 확정 라벨, 없으면 생성 라벨
    pub fn effective_bucket(&self) -> RiskBucket {
        self.confirmed_label.unwrap_or(self.predicted)
    }
}

/// 위험 라벨 (0.70 이상 HIGH, 0.45 이상 MID)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLabel {
    Low,
    Mid,
    High,
}

impl RiskLabel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.70 {
            Self::High
        } else if score >= 0.45 {
            Self::Mid
        } else {
            Self::Low
        }
    }
}

/// 추적 유형: 두 유형의 산출물 형태는 상호 배타적이다
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackType {
    PreventiveTracking, // 예방 추적 (MCI 계열)
    AdManagement,       // AD 관리
}

/// 3단계 편입 프로파일
///
/// 2단계 유효 버킷이 {MCI-MID, MCI-HIGH, AD}일 때에만 존재하며,
/// 이 프로파일의 부여가 3단계 전환의 유일한 관문이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage3Profile {
    pub track: TrackType,
    pub assigned_at: DateTime<Utc>,
}

impl TrackType {
    /// 버킷으로부터 추적 유형 결정 (편입 비대상 버킷은 None)
    pub fn from_bucket(bucket: RiskBucket) -> Option<Self> {
        match bucket {
            RiskBucket::Ad => Some(Self::AdManagement),
            RiskBucket::MciMid | RiskBucket::MciHigh => Some(Self::PreventiveTracking),
            RiskBucket::Normal | RiskBucket::MciLow => None,
        }
    }
}

/// 3단계 추적 모델 실행 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TrackingModelStatus {
    Idle,
    Queued,
    Running,
    Ready,
}

/// 3단계 모델 산출물: 추적 유형에 따라 형태가 갈린다
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Stage3ModelOutput {
    /// 예방 추적: 1/2/3년 AD 전환 위험 전망
    Conversion {
        year1: f64,
        year2: f64,
        year3: f64,
        label: RiskLabel,
    },
    /// AD 관리: 현재 위험 지수 (0..=100)
    CurrentIndex { index: u8, label: RiskLabel },
}

impl Stage3ModelOutput {
    pub fn label(&self) -> RiskLabel {
        match self {
            Self::Conversion { label, .. } => *label,
            Self::CurrentIndex { label, .. } => *label,
        }
    }
}

/// 3단계 추적 모델 블록
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingModel {
    pub status: TrackingModelStatus,
    pub result: Option<Stage3ModelOutput>,
    pub computed_at: Option<DateTime<Utc>>,
    pub confirmed: bool, // 결과에 대한 담당자 확정 여부
    pub model_version: Option<String>,
}

impl Default for TrackingModel {
    fn default() -> Self {
        Self {
            status: TrackingModelStatus::Idle,
            result: None,
            computed_at: None,
            confirmed: false,
            model_version: None,
        }
    }
}

/// 3단계 운영 루프 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LoopStatus {
    Active,
    Done,
    OnHold,
    Excluded,
}

impl LoopStatus {
    /// 전역 보류/제외 상태 여부
    pub fn is_held(&self) -> bool {
        matches!(self, Self::OnHold | Self::Excluded)
    }
}

/// 4단계 체크리스트 완료 타임스탬프
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoopCompleted {
    pub step1_at: Option<DateTime<Utc>>,
    pub step2_at: Option<DateTime<Utc>>,
    pub step3_at: Option<DateTime<Utc>>,
    pub step4_at: Option<DateTime<Utc>>,
}

impl LoopCompleted {
    pub fn get(&self, step: u8) -> Option<DateTime<Utc>> {
        match step {
            1 => self.step1_at,
            2 => self.step2_at,
            3 => self.step3_at,
            4 => self.step4_at,
            _ => None,
        }
    }

    pub fn set(&mut self, step: u8, at: DateTime<Utc>) {
        match step {
            1 => self.step1_at = Some(at),
            2 => self.step2_at = Some(at),
            3 => self.step3_at = Some(at),
            4 => self.step4_at = Some(at),
            _ => {}
        }
    }

    pub fn clear(&mut self, step: u8) {
        match step {
            1 => self.step1_at = None,
            2 => self.step2_at = None,
            3 => self.step3_at = None,
            4 => self.step4_at = None,
            _ => {}
        }
    }

    /// 완료 접두(prefix) 규칙으로부터 현재 단계 유도
    ///
    /// 1..=4 중 첫 미완료 단계, 전부 완료면 4.
    pub fn derived_step(&self) -> u8 {
        for step in 1..=4u8 {
            if self.get(step).is_none() {
                return step;
            }
        }
        4
    }
}

/// 3단계 운영 루프 (4단계 체크리스트)
///
/// `step`은 항상 `completed`의 접두 규칙으로 재유도 가능해야 한다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stage3Loop {
    pub step: u8, // 1..=4
    pub completed: LoopCompleted,
    pub status: LoopStatus,
    pub blockers: Vec<String>,
}

impl Default for Stage3Loop {
    fn default() -> Self {
        Self {
            step: 1,
            completed: LoopCompleted::default(),
            status: LoopStatus::Active,
            blockers: Vec::new(),
        }
    }
}

/// 2단계 이후 경로 결정
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NextStep {
    Followup2y, // 2년 후 재평가
    Stage3,     // 3단계 편입
    DiffPath,   // 감별 진료 경로
}

/// 1단계 접촉 전략
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactStrategy {
    HumanFirst,
    AiFirst,
}

/// 접촉 채널
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContactChannel {
    Call,
    Sms,
    Hybrid,
}

/// 접촉 실행 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContactExecutionStatus {
    Pending,          // 실행 전
    AiInProgress,     // AI 접촉 진행 중
    Scheduled,        // 재접촉 예약됨
    AwaitingRecontact, // 무응답 후 재시도 대기
    HandoffToHuman,   // 사람 담당자 이관
    Declined,         // 거부
    Completed,        // 접촉 완료
}

/// 2단계 연계 상태
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LinkageStatus {
    NotLinked,
    InProgress,
    LinkedStage2,
    Dropped,
}

/// 1단계 접촉 계획/진행 상태
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactPlanState {
    pub strategy: Option<ContactStrategy>,
    pub execution: ContactExecutionStatus,
    pub linkage: LinkageStatus,
    pub channel: ContactChannel,
    pub retry_count: u32,
    pub switched_to_hybrid: bool, // 하이브리드 전환 후에는 되돌리지 않는다
    pub handoff_memo_required: bool,
    pub recontact_after_hours: Option<i64>,
}

impl Default for ContactPlanState {
    fn default() -> Self {
        Self {
            strategy: None,
            execution: ContactExecutionStatus::Pending,
            linkage: LinkageStatus::NotLinked,
            channel: ContactChannel::Call,
            retry_count: 0,
            switched_to_hybrid: false,
            handoff_memo_required: false,
            recontact_after_hours: None,
        }
    }
}

/// 케이스 이벤트 유형
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CaseEventType {
    CaseRegistered,
    EvidenceUpdated,
    EvidenceRejected,
    ModelExecuted,
    ModelRunRejected,
    ModelConfirmed,
    NextStepSet,
    NextStepRejected,
    StagePromoted,
    StageDemoted,
    LoopStepCompleted,
    LoopStepRejected,
    ContactAttempted,
    ContactOutcome,
    StatusChanged,
    AutoRepair,
}

/// 케이스 이벤트: 추가 전용, 수정/삭제 금지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEvent {
    pub event_id: Uuid,
    pub case_id: String,
    pub at: DateTime<Utc>,
    pub actor_id: String,
    pub event_type: CaseEventType,
    pub payload: serde_json::Value,
}

impl CaseEvent {
    pub fn new(
        case_id: &str,
        actor_id: &str,
        event_type: CaseEventType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            case_id: case_id.to_string(),
            at: Utc::now(),
            actor_id: actor_id.to_string(),
            event_type,
            payload,
        }
    }
}

/// 케이스 엔티티: 저장소의 단일 진실 원천
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseEntity {
    pub case_id: String, // 생성 후 불변, 전역 유일
    pub stage: CaseStage,
    pub status: CaseStatus,
    pub operation_step: OperationStep,
    pub model_status: CaseModelStatus,
    pub patient: PatientInfo,
    pub region: RegionInfo,
    pub assignee: AssigneeInfo,
    pub legacy_risk_tier: LegacyRiskTier,
    pub route_channel: RouteChannel,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>, // 변이마다 단조 증가

    // 파생/계산 필드
    pub stage2_required: Stage2Required,
    pub stage2_evidence: EvidenceState,
    pub stage3_required: Stage3Required,
    pub stage3_evidence: EvidenceState,
    pub model2: Option<Stage2ModelOutput>, // None == 미산출
    pub tracking_model: TrackingModel,
    pub stage3_profile: Option<Stage3Profile>,
    pub stage3_loop: Stage3Loop,
    pub next_step: Option<NextStep>,
    pub contact_plan: ContactPlanState,
}

impl CaseEntity {
    /// 접수 시점 엔티티 생성: 저장소 초기화 시 시드 레코드로만 생성된다
    pub fn new_registered(
        case_id: &str,
        patient: PatientInfo,
        region: RegionInfo,
        assignee: AssigneeInfo,
        legacy_risk_tier: LegacyRiskTier,
        route_channel: RouteChannel,
    ) -> Self {
        let now = Utc::now();
        Self {
            case_id: case_id.to_string(),
            stage: CaseStage::Initial,
            status: CaseStatus::Open,
            operation_step: OperationStep::Registration,
            model_status: CaseModelStatus::Pending,
            patient,
            region,
            assignee,
            legacy_risk_tier,
            route_channel,
            created_at: now,
            updated_at: now,
            stage2_required: Stage2Required::default(),
            stage2_evidence: EvidenceState::default(),
            stage3_required: Stage3Required::default(),
            stage3_evidence: EvidenceState::default(),
            model2: None,
            tracking_model: TrackingModel::default(),
            stage3_profile: None,
            stage3_loop: Stage3Loop::default(),
            next_step: None,
            contact_plan: ContactPlanState::default(),
        }
    }

    /// 2단계 유효 버킷 (확정 라벨 우선)
    pub fn effective_stage2_bucket(&self) -> Option<RiskBucket> {
        self.model2.as_ref().map(|m| m.effective_bucket())
    }
}
