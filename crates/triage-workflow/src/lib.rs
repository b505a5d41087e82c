//! # 트리아지 워크플로 모듈
//!
//! 대상자 생애주기 상태 엔진의 구현을 제공한다:
//! - 근거 평가기: 단계별 필수 검사 완결성과 누락 목록 계산
//! - 케이스 저장소: 단일 진실 원천 엔티티 맵과 변이 파이프라인, 구독/통지
//! - 이벤트 로그: 케이스별 추가 전용 이력
//! - 3단계 정합성 복구 엔진: 운영 루프 구조 불변식의 자가 복구
//! - 3단계 뷰 도출기: UI 무관 뷰모델(단계 카드, 배지, 기본 행동) 구성
//! - 1단계 접촉 엔진: 사전 분류기와 접촉 결과 전이 함수
//! - 운영 루프 계산기: 이벤트 재생 기반 단계 추론과 불일치 진단

pub mod contact;
pub mod evidence;
pub mod events;
pub mod ops_loop;
pub mod reconcile;
pub mod stage1;
pub mod stats;
pub mod store;
pub mod view;

// 주요 타입 재수출
pub use contact::{
    apply_outcome, classify_pretriage, ContactOutcome, ContactTrigger, PretriageDecision,
    PretriageInput,
};
pub use evidence::{evaluate_stage2, evaluate_stage3};
pub use events::EventLog;
pub use ops_loop::{compute_ops_loop, diagnose_mismatch, OpsLoopState, OpsStep};
pub use reconcile::{reconcile, AuditEntry, Patch, PatchCode, Reconciled, ReconcilePolicy};
pub use stage1::{build_stage1_detail, InterventionLevel, PolicyGate, PolicyGateKind, Stage1Detail};
pub use stats::{compute_dashboard_stats, DashboardStats, FunnelStage};
pub use store::{CaseFilter, CaseStore, StoreOverview};
pub use view::{
    derive_stage3_view, PrimaryAction, RiskBadge, Stage3ViewModel, StepCard, StepCardState,
};
