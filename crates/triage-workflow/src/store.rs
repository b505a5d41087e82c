//! 케이스 엔티티 저장소
//!
//! 단일 진실 원천인 케이스 맵과 변이 파이프라인을 소유한다. 모든 변이는
//! 복제-수정-치환 방식으로 끝까지 실행된 뒤에야 읽기 측에 보이며, 변이마다
//! 고정 파이프라인(근거 재계산 → 모델 가용성 동기화 → 3단계 복구 → 이벤트
//! 기록 → 버전 증가 → 구독자 통지)을 거친다.
//!
//! 거부되는 연산은 예외를 던지지 않고 `Ok(false)`를 돌려주며, 거부 사유를
//! 이벤트 페이로드에 남긴다. `Err`는 알 수 없는 케이스 ID 등 호출자 오류에만
//! 쓴다.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use triage_core::{
    CaseEntity, CaseEvent, CaseEventType, CaseModelStatus, CaseStage, CaseStatus, LoopStatus,
    NextStep, OperationStep, Result, RiskBucket, Stage2Required, Stage3Required, TrackType,
    TrackingModel, TrackingModelStatus, TriageError,
};
use triage_model::RiskModel;

use crate::contact::{apply_outcome, ContactOutcome};
use crate::evidence::{evaluate_stage2, evaluate_stage3};
use crate::reconcile::{reconcile, ReconcilePolicy};
use crate::stats::{compute_dashboard_stats, DashboardStats};

/// 목록 조회 필터
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseFilter {
    pub stage: Option<CaseStage>,
    pub status: Option<CaseStatus>,
    pub sido: Option<String>,
    pub sigungu: Option<String>,
    pub assignee_id: Option<String>,
    /// 케이스 ID / 이름 / 전화번호 / 상태 라벨 / 단계 번호에 대한 자유 검색
    pub keyword: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Default for CaseFilter {
    fn default() -> Self {
        Self {
            stage: None,
            status: None,
            sido: None,
            sigungu: None,
            assignee_id: None,
            keyword: None,
            limit: Some(50),
            offset: Some(0),
        }
    }
}

/// 저장소 개요
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreOverview {
    pub total_cases: usize,
    pub stage1_cases: usize,
    pub stage2_cases: usize,
    pub stage3_cases: usize,
    pub total_events: usize,
    pub version: u64,
}

/// 구독자 ID
pub type SubscriberId = Uuid;

/// 케이스 엔티티 저장소
pub struct CaseStore {
    cases: HashMap<String, CaseEntity>,
    events: crate::events::EventLog,
    version: u64,
    subscribers: HashMap<SubscriberId, Box<dyn Fn(u64)>>,
    model: Box<dyn RiskModel>,
    policy: ReconcilePolicy,
}

impl std::fmt::Debug for CaseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaseStore")
            .field("cases", &self.cases.len())
            .field("version", &self.version)
            .field("subscribers", &self.subscribers.len())
            .field("model", &self.model)
            .finish()
    }
}

impl CaseStore {
    /// 빈 저장소 생성
    pub fn new(model: Box<dyn RiskModel>, policy: ReconcilePolicy) -> Self {
        Self {
            cases: HashMap::new(),
            events: crate::events::EventLog::new(),
            version: 0,
            subscribers: HashMap::new(),
            model,
            policy,
        }
    }

    /// 시드 레코드로 저장소 초기화
    ///
    /// 엔티티는 이 시점에만 생성된다. 이후 임의 생성은 없다.
    pub fn with_seed(
        seed: Vec<CaseEntity>,
        model: Box<dyn RiskModel>,
        policy: ReconcilePolicy,
    ) -> Self {
        let mut store = Self::new(model, policy);
        for mut case in seed {
            case.stage2_evidence = evaluate_stage2(&case.stage2_required, case.route_channel);
            case.stage3_evidence = evaluate_stage3(&case.stage3_required);
            store.events.append(CaseEvent::new(
                &case.case_id,
                "system",
                CaseEventType::CaseRegistered,
                json!({ "stage": case.stage.number() }),
            ));
            store.cases.insert(case.case_id.clone(), case);
        }
        store.version = 1;
        tracing::info!("Case store seeded with {} case(s)", store.cases.len());
        store
    }

    // ── 구독 ──────────────────────────────────────────────

    /// 전역 버전 구독 등록: 어떤 케이스든 변이가 일어나면 통지된다
    pub fn subscribe(&mut self, listener: Box<dyn Fn(u64)>) -> SubscriberId {
        let id = Uuid::new_v4();
        self.subscribers.insert(id, listener);
        id
    }

    /// 구독 해제
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    /// 현재 전역 버전
    pub fn version(&self) -> u64 {
        self.version
    }

    // ── 읽기 표면 ──────────────────────────────────────────

    /// 필터/정렬된 스냅샷 목록 (updated_at 내림차순)
    pub fn list_case_entities(&self, filter: &CaseFilter) -> Vec<CaseEntity> {
        let mut matched: Vec<&CaseEntity> = self
            .cases
            .values()
            .filter(|c| Self::matches(c, filter))
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(50);
        let total = matched.len();
        let start = offset.min(total);
        let end = (start + limit).min(total);
        matched[start..end].iter().map(|c| (*c).clone()).collect()
    }

    /// 단건 조회
    pub fn get_case_entity(&self, case_id: &str) -> Option<&CaseEntity> {
        self.cases.get(case_id)
    }

    /// 케이스 이벤트 이력 (최신 우선)
    pub fn list_case_events(&self, case_id: &str) -> &[CaseEvent] {
        self.events.for_case(case_id)
    }

    /// 대시보드 집계: 필터 적용 후 매 호출 새로 계산
    pub fn dashboard_stats(&self, filter: &CaseFilter) -> DashboardStats {
        let matched: Vec<CaseEntity> = self
            .cases
            .values()
            .filter(|c| Self::matches(c, filter))
            .cloned()
            .collect();
        compute_dashboard_stats(&matched)
    }

    /// 저장소 개요
    pub fn overview(&self) -> StoreOverview {
        let count_stage = |stage: CaseStage| {
            self.cases.values().filter(|c| c.stage == stage).count()
        };
        StoreOverview {
            total_cases: self.cases.len(),
            stage1_cases: count_stage(CaseStage::Initial),
            stage2_cases: count_stage(CaseStage::Evaluation),
            stage3_cases: count_stage(CaseStage::Tracking),
            total_events: self.events.total_events(),
            version: self.version,
        }
    }

    fn matches(case: &CaseEntity, filter: &CaseFilter) -> bool {
        if let Some(stage) = filter.stage {
            if case.stage != stage {
                return false;
            }
        }
        if let Some(status) = filter.status {
            if case.status != status {
                return false;
            }
        }
        if let Some(sido) = &filter.sido {
            if &case.region.sido != sido {
                return false;
            }
        }
        if let Some(sigungu) = &filter.sigungu {
            if &case.region.sigungu != sigungu {
                return false;
            }
        }
        if let Some(assignee_id) = &filter.assignee_id {
            if &case.assignee.assignee_id != assignee_id {
                return false;
            }
        }
        if let Some(keyword) = &filter.keyword {
            let keyword = keyword.to_lowercase();
            let haystacks = [
                case.case_id.to_lowercase(),
                case.patient.name.to_lowercase(),
                case.patient.phone.clone(),
                case.status.label().to_string(),
                case.stage.number().to_string(),
            ];
            if !haystacks.iter().any(|h| h.contains(&keyword)) {
                return false;
            }
        }
        true
    }

    // ── 변이 연산 ──────────────────────────────────────────

    /// 2단계 근거 부분 병합
    ///
    /// 상태를 결과 대기로 되돌리고, 기존 2단계 모델 산출물을 무효화한다.
    /// 산출물이 사라지면 편입 자격도 함께 재평가한다. 1단계 케이스는 거부한다.
    pub fn update_stage2_evidence(
        &mut self,
        case_id: &str,
        patch: Stage2Required,
        actor_id: &str,
    ) -> Result<bool> {
        let mut case = self.cloned_case(case_id)?;

        if case.stage == CaseStage::Initial {
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::EvidenceRejected,
                json!({ "stage": 2, "reason": "초기 접촉 미완료" }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        if patch.specialist_exam_done.is_some() {
            case.stage2_required.specialist_exam_done = patch.specialist_exam_done;
        }
        if patch.cdr_gds.is_some() {
            case.stage2_required.cdr_gds = patch.cdr_gds;
        }
        if patch.neuro_test_type.is_some() {
            case.stage2_required.neuro_test_type = patch.neuro_test_type;
        }
        if patch.mmse.is_some() {
            case.stage2_required.mmse = patch.mmse;
        }

        case.status = CaseStatus::WaitingResults;
        case.operation_step = OperationStep::EvidenceCollection;
        case.model2 = None; // 근거 변경은 기존 산출물을 무효화한다

        let mut events = vec![CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::EvidenceUpdated,
            json!({ "stage": 2 }),
        )];
        self.resync_stage3_eligibility(
            &mut case,
            actor_id,
            "근거 변경으로 산출물 무효화",
            &mut events,
        );
        self.commit(case, events);
        Ok(true)
    }

    /// 3단계 근거 부분 병합
    pub fn update_stage3_evidence(
        &mut self,
        case_id: &str,
        patch: Stage3Required,
        actor_id: &str,
    ) -> Result<()> {
        let mut case = self.cloned_case(case_id)?;

        if patch.biomarker_done.is_some() {
            case.stage3_required.biomarker_done = patch.biomarker_done;
        }
        if patch.biomarker_result.is_some() {
            case.stage3_required.biomarker_result = patch.biomarker_result;
        }
        if patch.imaging_done.is_some() {
            case.stage3_required.imaging_done = patch.imaging_done;
        }
        if patch.imaging_result.is_some() {
            case.stage3_required.imaging_result = patch.imaging_result;
        }
        if patch.examined_at.is_some() {
            case.stage3_required.examined_at = patch.examined_at;
        }

        case.status = CaseStatus::WaitingResults;
        case.tracking_model = TrackingModel::default();

        let event = CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::EvidenceUpdated,
            json!({ "stage": 3 }),
        );
        self.commit(case, vec![event]);
        Ok(())
    }

    /// 2단계 모델 실행
    ///
    /// 근거가 미완결이면 아무것도 바꾸지 않고 `Ok(false)`를 돌려주며,
    /// 거부 사유를 이벤트 페이로드에 남긴다. 성공 시 예측 버킷에 따라
    /// 3단계 편입 프로파일을 부여/해제한다.
    pub fn run_stage2_model(&mut self, case_id: &str, actor_id: &str) -> Result<bool> {
        let mut case = self.cloned_case(case_id)?;

        if case.stage == CaseStage::Initial {
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::ModelRunRejected,
                json!({ "stage": 2, "reason": "초기 접촉 미완료" }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        let evidence = evaluate_stage2(&case.stage2_required, case.route_channel);
        if !evidence.completed {
            tracing::warn!(
                "Rejected stage-2 model run for case {}: evidence incomplete",
                case_id
            );
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::ModelRunRejected,
                json!({ "stage": 2, "reason": "근거 미완결", "missing": evidence.missing }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        let output = self.model.compute_stage2(&case);
        let predicted = output.predicted;
        case.model2 = Some(output);
        case.model_status = CaseModelStatus::Done;
        case.status = CaseStatus::ResultReady;
        case.operation_step = OperationStep::ResultReview;
        self.sync_stage3_profile(&mut case);

        let event = CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::ModelExecuted,
            json!({ "stage": 2, "predicted": predicted.label() }),
        );
        self.commit(case, vec![event]);
        Ok(true)
    }

    /// 3단계 모델 실행
    ///
    /// 편입 프로파일이 없거나 근거가 미완결이면 거부한다.
    pub fn run_stage3_model(&mut self, case_id: &str, actor_id: &str) -> Result<bool> {
        let mut case = self.cloned_case(case_id)?;

        if case.stage3_profile.is_none() {
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::ModelRunRejected,
                json!({ "stage": 3, "reason": "편입 프로파일 없음" }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        let evidence = evaluate_stage3(&case.stage3_required);
        if !evidence.completed {
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::ModelRunRejected,
                json!({ "stage": 3, "reason": "근거 미완결", "missing": evidence.missing }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        match self.model.compute_stage3(&case) {
            Some(result) => {
                case.tracking_model.status = TrackingModelStatus::Ready;
                case.tracking_model.result = Some(result);
                case.tracking_model.computed_at = Some(Utc::now());
                case.tracking_model.confirmed = false;
                case.tracking_model.model_version = Some(self.model.version().to_string());
                case.model_status = CaseModelStatus::Done;
                case.status = CaseStatus::ResultReady;

                let event = CaseEvent::new(
                    case_id,
                    actor_id,
                    CaseEventType::ModelExecuted,
                    json!({ "stage": 3 }),
                );
                self.commit(case, vec![event]);
                Ok(true)
            }
            None => {
                let event = CaseEvent::new(
                    case_id,
                    actor_id,
                    CaseEventType::ModelRunRejected,
                    json!({ "stage": 3, "reason": "2단계 산출물 없음" }),
                );
                self.commit(case, vec![event]);
                Ok(false)
            }
        }
    }

    /// 2단계 결과 확정 (사람 라벨 우선)
    ///
    /// 확정 라벨로 3단계 편입 자격을 재평가한다. 이미 3단계로 승급된
    /// 케이스에서 자격이 철회되면 2단계로 강등하고 3단계 산출물을 폐기한다.
    pub fn confirm_stage2_model(
        &mut self,
        case_id: &str,
        confirmed: RiskBucket,
        actor_id: &str,
    ) -> Result<bool> {
        let mut case = self.cloned_case(case_id)?;

        if case.model2.is_none() {
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::ModelRunRejected,
                json!({ "stage": 2, "reason": "확정할 산출물 없음" }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        if let Some(model2) = case.model2.as_mut() {
            model2.confirmed_label = Some(confirmed);
        }

        let mut events = vec![CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::ModelConfirmed,
            json!({ "stage": 2, "confirmed": confirmed.label() }),
        )];

        self.resync_stage3_eligibility(
            &mut case,
            actor_id,
            "확정 라벨로 편입 자격 철회",
            &mut events,
        );
        // 3단계에 남아 있는 케이스의 추적 상태는 건드리지 않는다
        if case.stage == CaseStage::Evaluation {
            case.status = CaseStatus::ClassConfirmed;
            case.operation_step = OperationStep::NextStepDecision;
        }

        self.commit(case, events);
        Ok(true)
    }

    /// 다음 경로 결정
    ///
    /// `Stage3`는 편입 프로파일이 있을 때만 성공한다. 거부 시 상태는
    /// 분류 확정에 머물고, 사유를 이벤트 페이로드에 남긴다.
    pub fn set_case_next_step(
        &mut self,
        case_id: &str,
        next_step: NextStep,
        actor_id: &str,
    ) -> Result<bool> {
        let mut case = self.cloned_case(case_id)?;

        if next_step == NextStep::Stage3 && case.stage3_profile.is_none() {
            case.status = CaseStatus::ClassConfirmed;
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::NextStepRejected,
                json!({ "next_step": "STAGE3", "reason": "3단계 편입 자격 없음" }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        case.next_step = Some(next_step);
        case.status = CaseStatus::NextStepSet;

        let mut events = vec![CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::NextStepSet,
            json!({ "next_step": format!("{:?}", next_step) }),
        )];

        if next_step == NextStep::Stage3 {
            case.stage = CaseStage::Tracking;
            case.status = CaseStatus::InTracking;
            case.operation_step = OperationStep::Tracking;
            events.push(CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::StagePromoted,
                json!({ "from": 2, "to": 3 }),
            ));
        }

        self.commit(case, events);
        Ok(true)
    }

    /// 1단계 접촉 결과 기록
    pub fn record_contact_outcome(
        &mut self,
        case_id: &str,
        outcome: ContactOutcome,
        actor_id: &str,
    ) -> Result<()> {
        let mut case = self.cloned_case(case_id)?;
        case.contact_plan = apply_outcome(outcome, &case.contact_plan);

        let event = CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::ContactOutcome,
            json!({
                "outcome": serde_json::to_value(outcome)?,
                "retry_count": case.contact_plan.retry_count,
                "channel": serde_json::to_value(case.contact_plan.channel)?,
            }),
        );
        self.commit(case, vec![event]);
        Ok(())
    }

    /// 3단계 운영 루프 단계 완료 처리
    ///
    /// 선행 단계가 미완료이면 거부한다. 4단계까지 모두 완료되면 루프를
    /// 완료 상태로 전환한다.
    pub fn complete_loop_step(
        &mut self,
        case_id: &str,
        step: u8,
        actor_id: &str,
    ) -> Result<bool> {
        if !(1..=4).contains(&step) {
            return Err(TriageError::Validation(format!(
                "운영 루프 단계 범위 초과: {}",
                step
            )));
        }
        let mut case = self.cloned_case(case_id)?;

        if case.stage != CaseStage::Tracking {
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::LoopStepRejected,
                json!({ "step": step, "reason": "3단계 케이스가 아님" }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }
        if step > 1 && case.stage3_loop.completed.get(step - 1).is_none() {
            let event = CaseEvent::new(
                case_id,
                actor_id,
                CaseEventType::LoopStepRejected,
                json!({ "step": step, "reason": "선행 단계 미완료" }),
            );
            self.commit(case, vec![event]);
            return Ok(false);
        }

        case.stage3_loop.completed.set(step, Utc::now());
        if (1..=4u8).all(|s| case.stage3_loop.completed.get(s).is_some()) {
            case.stage3_loop.status = LoopStatus::Done;
        }

        let event = CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::LoopStepCompleted,
            json!({ "step": step }),
        );
        self.commit(case, vec![event]);
        Ok(true)
    }

    /// 3단계 운영 루프 보류/제외/재개
    pub fn set_loop_status(
        &mut self,
        case_id: &str,
        status: LoopStatus,
        actor_id: &str,
    ) -> Result<()> {
        let mut case = self.cloned_case(case_id)?;
        let from = case.stage3_loop.status;
        case.stage3_loop.status = status;
        case.status = match status {
            LoopStatus::OnHold => CaseStatus::OnHold,
            LoopStatus::Excluded => CaseStatus::Excluded,
            LoopStatus::Active | LoopStatus::Done => CaseStatus::InTracking,
        };

        let event = CaseEvent::new(
            case_id,
            actor_id,
            CaseEventType::StatusChanged,
            json!({ "from": format!("{:?}", from), "to": format!("{:?}", status) }),
        );
        self.commit(case, vec![event]);
        Ok(())
    }

    // ── 내부 파이프라인 ────────────────────────────────────

    fn cloned_case(&self, case_id: &str) -> Result<CaseEntity> {
        self.cases
            .get(case_id)
            .cloned()
            .ok_or_else(|| TriageError::NotFound(case_id.to_string()))
    }

    /// 유효 2단계 버킷에 따라 편입 프로파일 부여/해제
    fn sync_stage3_profile(&self, case: &mut CaseEntity) {
        let bucket = case.effective_stage2_bucket();
        match bucket.and_then(TrackType::from_bucket) {
            Some(track) => {
                let changed = case
                    .stage3_profile
                    .as_ref()
                    .map(|p| p.track != track)
                    .unwrap_or(true);
                if changed {
                    case.stage3_profile = Some(triage_core::Stage3Profile {
                        track,
                        assigned_at: Utc::now(),
                    });
                }
            }
            None => {
                case.stage3_profile = None;
            }
        }
    }

    /// 편입 자격 재평가
    ///
    /// 이미 승급된 케이스에서 자격이 철회되면 2단계로 강등하고 3단계 산출물과
    /// 운영 루프를 폐기한다.
    fn resync_stage3_eligibility(
        &self,
        case: &mut CaseEntity,
        actor_id: &str,
        reason: &str,
        events: &mut Vec<CaseEvent>,
    ) {
        self.sync_stage3_profile(case);
        if case.stage == CaseStage::Tracking && case.stage3_profile.is_none() {
            case.stage = CaseStage::Evaluation;
            case.tracking_model = TrackingModel::default();
            case.stage3_loop = Default::default();
            case.next_step = None;
            events.push(CaseEvent::new(
                &case.case_id,
                actor_id,
                CaseEventType::StageDemoted,
                json!({ "from": 3, "to": 2, "reason": reason }),
            ));
            tracing::info!("Demoted case {} back to stage 2", case.case_id);
        }
    }

    /// 변이 파이프라인의 공통 꼬리
    fn commit(&mut self, mut case: CaseEntity, mut new_events: Vec<CaseEvent>) {
        // 근거 재계산: 파생 필드는 항상 여기서만 세팅된다
        case.stage2_evidence = evaluate_stage2(&case.stage2_required, case.route_channel);
        case.stage3_evidence = evaluate_stage3(&case.stage3_required);

        // 모델 가용성 동기화
        if case.model2.is_none() && case.model_status == CaseModelStatus::Done {
            case.model_status = CaseModelStatus::Pending;
        }

        // 3단계 케이스만 정합성 복구를 거친다
        if case.stage == CaseStage::Tracking {
            let reconciled = reconcile(&case, &self.policy);
            if let Some(audit) = &reconciled.audit {
                new_events.push(CaseEvent::new(
                    &case.case_id,
                    "system",
                    CaseEventType::AutoRepair,
                    json!({
                        "summary": audit.summary,
                        "patch_count": reconciled.patches.len(),
                    }),
                ));
            }
            case = reconciled.next_case;
        }

        // 변이마다 단조 증가하는 updated_at
        let previous = self.cases.get(&case.case_id).map(|c| c.updated_at);
        let now = Utc::now();
        case.updated_at = match previous {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        };

        self.cases.insert(case.case_id.clone(), case);
        for event in new_events {
            self.events.append(event);
        }

        self.version += 1;
        for listener in self.subscribers.values() {
            listener(self.version);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;
    use triage_core::{
        AssigneeInfo, LegacyRiskTier, NeuroTestType, PatientInfo, PriorDiagnosis, RegionInfo,
        RouteChannel, Stage2ModelOutput, Stage3ModelOutput, TestPolarity,
    };
    use triage_model::HashSeededModel;

    fn seed_case(case_id: &str, name: &str) -> CaseEntity {
        let mut case = CaseEntity::new_registered(
            case_id,
            PatientInfo {
                name: name.to_string(),
                age: 76,
                phone: "010-3333-4444".to_string(),
                guardian: None,
                prior_diagnosis: PriorDiagnosis::None,
                complaint_history: false,
                refusal_history: false,
                comprehension_difficulty: false,
            },
            RegionInfo {
                sido: "경기".to_string(),
                sigungu: "성남시".to_string(),
            },
            AssigneeInfo {
                assignee_id: "A-10".to_string(),
                assignee_name: "문담당".to_string(),
            },
            LegacyRiskTier::Mid,
            RouteChannel::Center,
        );
        case.stage = CaseStage::Evaluation;
        case.status = CaseStatus::Open;
        case
    }

    fn seeded_store() -> CaseStore {
        CaseStore::with_seed(
            vec![
                seed_case("GG-000001", "강대상"),
                seed_case("GG-000002", "나대상"),
            ],
            Box::new(HashSeededModel),
            ReconcilePolicy::default(),
        )
    }

    fn fill_stage2_evidence(store: &mut CaseStore, case_id: &str) {
        store
            .update_stage2_evidence(
                case_id,
                Stage2Required {
                    specialist_exam_done: Some(true),
                    cdr_gds: Some(1.0),
                    neuro_test_type: Some(NeuroTestType::Snsb),
                    mmse: Some(21),
                },
                "A-10",
            )
            .unwrap();
    }

    fn fill_stage3_evidence(store: &mut CaseStore, case_id: &str) {
        store
            .update_stage3_evidence(
                case_id,
                Stage3Required {
                    biomarker_done: Some(true),
                    biomarker_result: Some(TestPolarity::Positive),
                    imaging_done: Some(true),
                    imaging_result: Some(TestPolarity::Negative),
                    examined_at: Some(Utc::now()),
                },
                "A-10",
            )
            .unwrap();
    }

    #[test]
    fn test_model_run_rejected_on_incomplete_evidence() {
        let mut store = seeded_store();
        store
            .update_stage2_evidence(
                "GG-000001",
                Stage2Required {
                    specialist_exam_done: Some(false),
                    ..Default::default()
                },
                "A-10",
            )
            .unwrap();

        let accepted = store.run_stage2_model("GG-000001", "A-10").unwrap();
        assert!(!accepted);

        let case = store.get_case_entity("GG-000001").unwrap();
        assert!(case.model2.is_none());
        assert_eq!(case.model_status, CaseModelStatus::Pending);

        let newest = &store.list_case_events("GG-000001")[0];
        assert_eq!(newest.event_type, CaseEventType::ModelRunRejected);
        assert_eq!(newest.payload["reason"], "근거 미완결");
    }

    #[test]
    fn test_model_run_populates_output_and_profile_follows_bucket() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");

        let accepted = store.run_stage2_model("GG-000001", "A-10").unwrap();
        assert!(accepted);

        let case = store.get_case_entity("GG-000001").unwrap();
        let model2 = case.model2.as_ref().unwrap();
        let sum = model2.prob_normal + model2.prob_mci + model2.prob_ad;
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(case.model_status, CaseModelStatus::Done);
        assert_eq!(case.status, CaseStatus::ResultReady);

        // 프로파일은 예측 버킷의 자격과 정확히 일치해야 한다
        assert_eq!(
            case.stage3_profile.is_some(),
            model2.effective_bucket().stage3_eligible()
        );
    }

    #[test]
    fn test_evidence_update_invalidates_model_output() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        assert!(store.get_case_entity("GG-000001").unwrap().model2.is_some());

        store
            .update_stage2_evidence(
                "GG-000001",
                Stage2Required {
                    cdr_gds: Some(2.0),
                    ..Default::default()
                },
                "A-10",
            )
            .unwrap();

        let case = store.get_case_entity("GG-000001").unwrap();
        assert!(case.model2.is_none());
        assert_eq!(case.status, CaseStatus::WaitingResults);
        assert_eq!(case.model_status, CaseModelStatus::Pending);
    }

    #[test]
    fn test_stage3_promotion_guard() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        // 확정 라벨로 자격을 강제 해제한다
        store
            .confirm_stage2_model("GG-000001", RiskBucket::Normal, "A-10")
            .unwrap();

        let accepted = store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();
        assert!(!accepted);

        let case = store.get_case_entity("GG-000001").unwrap();
        assert_eq!(case.stage, CaseStage::Evaluation);
        assert_eq!(case.status, CaseStatus::ClassConfirmed);

        let newest = &store.list_case_events("GG-000001")[0];
        assert_eq!(newest.event_type, CaseEventType::NextStepRejected);
        assert_eq!(newest.payload["reason"], "3단계 편입 자격 없음");
    }

    #[test]
    fn test_confirm_normal_after_promotion_demotes_case() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        store
            .confirm_stage2_model("GG-000001", RiskBucket::MciHigh, "A-10")
            .unwrap();
        let promoted = store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();
        assert!(promoted);
        assert_eq!(
            store.get_case_entity("GG-000001").unwrap().stage,
            CaseStage::Tracking
        );

        // 3단계 산출물까지 만들어 둔 뒤 정상으로 확정한다
        fill_stage3_evidence(&mut store, "GG-000001");
        store.run_stage3_model("GG-000001", "A-10").unwrap();
        assert!(store
            .get_case_entity("GG-000001")
            .unwrap()
            .tracking_model
            .result
            .is_some());

        store
            .confirm_stage2_model("GG-000001", RiskBucket::Normal, "A-10")
            .unwrap();

        let case = store.get_case_entity("GG-000001").unwrap();
        assert_eq!(case.stage, CaseStage::Evaluation);
        assert!(case.stage3_profile.is_none());
        assert!(case.tracking_model.result.is_none());
        assert!(store
            .list_case_events("GG-000001")
            .iter()
            .any(|e| e.event_type == CaseEventType::StageDemoted));
    }

    #[test]
    fn test_stage3_model_requires_profile_and_evidence() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        store
            .confirm_stage2_model("GG-000001", RiskBucket::Ad, "A-10")
            .unwrap();
        store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();

        // 근거 미완결 → 거부
        let accepted = store.run_stage3_model("GG-000001", "A-10").unwrap();
        assert!(!accepted);

        fill_stage3_evidence(&mut store, "GG-000001");
        let accepted = store.run_stage3_model("GG-000001", "A-10").unwrap();
        assert!(accepted);

        let case = store.get_case_entity("GG-000001").unwrap();
        assert_eq!(case.tracking_model.status, TrackingModelStatus::Ready);
        assert!(case.tracking_model.result.is_some());
        // 복구 엔진이 루프 단계를 자동 스탬핑했는지
        assert!(case.stage3_loop.completed.step1_at.is_some());
    }

    #[test]
    fn test_subscribers_receive_monotone_versions() {
        let mut store = seeded_store();
        let seen: Rc<RefCell<Vec<u64>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = store.subscribe(Box::new(move |v| sink.borrow_mut().push(v)));

        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();

        let versions = seen.borrow().clone();
        assert_eq!(versions.len(), 2);
        assert!(versions.windows(2).all(|w| w[0] < w[1]));

        assert!(store.unsubscribe(id));
        fill_stage2_evidence(&mut store, "GG-000002");
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn test_keyword_filter_and_sorting() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000002");

        let filter = CaseFilter {
            keyword: Some("나대상".to_string()),
            ..Default::default()
        };
        let matched = store.list_case_entities(&filter);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].case_id, "GG-000002");

        // 최근 변이 케이스가 먼저 온다
        let all = store.list_case_entities(&CaseFilter::default());
        assert_eq!(all[0].case_id, "GG-000002");
    }

    #[test]
    fn test_unknown_case_id_is_an_error() {
        let mut store = seeded_store();
        let err = store.run_stage2_model("NOPE-000001", "A-10").unwrap_err();
        assert!(matches!(err, TriageError::NotFound(_)));
    }

    #[test]
    fn test_every_write_appends_an_event() {
        let mut store = seeded_store();
        let before = store.list_case_events("GG-000001").len();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        let after = store.list_case_events("GG-000001").len();
        assert!(after >= before + 2);
        // 최신 우선 순서
        let events = store.list_case_events("GG-000001");
        assert!(events.windows(2).all(|w| w[0].at >= w[1].at));
    }

    #[test]
    fn test_evidence_update_revokes_stage3_eligibility() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        store
            .confirm_stage2_model("GG-000001", RiskBucket::MciHigh, "A-10")
            .unwrap();
        assert!(store
            .get_case_entity("GG-000001")
            .unwrap()
            .stage3_profile
            .is_some());

        store
            .update_stage2_evidence(
                "GG-000001",
                Stage2Required {
                    mmse: Some(28),
                    ..Default::default()
                },
                "A-10",
            )
            .unwrap();

        // 산출물이 사라지면 편입 프로파일도 함께 사라져야 한다
        let case = store.get_case_entity("GG-000001").unwrap();
        assert!(case.model2.is_none());
        assert!(case.stage3_profile.is_none());

        let accepted = store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();
        assert!(!accepted);
        assert_eq!(
            store.get_case_entity("GG-000001").unwrap().stage,
            CaseStage::Evaluation
        );
    }

    #[test]
    fn test_evidence_update_after_promotion_demotes_case() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        store
            .confirm_stage2_model("GG-000001", RiskBucket::MciHigh, "A-10")
            .unwrap();
        store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();
        assert_eq!(
            store.get_case_entity("GG-000001").unwrap().stage,
            CaseStage::Tracking
        );

        store
            .update_stage2_evidence(
                "GG-000001",
                Stage2Required {
                    cdr_gds: Some(0.5),
                    ..Default::default()
                },
                "A-10",
            )
            .unwrap();

        let case = store.get_case_entity("GG-000001").unwrap();
        assert_eq!(case.stage, CaseStage::Evaluation);
        assert!(case.stage3_profile.is_none());
        assert!(case.next_step.is_none());
        assert!(store
            .list_case_events("GG-000001")
            .iter()
            .any(|e| e.event_type == CaseEventType::StageDemoted));
    }

    #[test]
    fn test_reconfirm_eligible_label_keeps_tracking_state() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        store
            .confirm_stage2_model("GG-000001", RiskBucket::MciHigh, "A-10")
            .unwrap();
        store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();

        // 자격이 유지되는 재확정은 3단계 추적 상태를 건드리지 않는다
        store
            .confirm_stage2_model("GG-000001", RiskBucket::Ad, "A-10")
            .unwrap();

        let case = store.get_case_entity("GG-000001").unwrap();
        assert_eq!(case.stage, CaseStage::Tracking);
        assert_eq!(case.status, CaseStatus::InTracking);
        assert_eq!(case.operation_step, OperationStep::Tracking);
        assert_eq!(
            case.stage3_profile.as_ref().map(|p| p.track),
            Some(TrackType::AdManagement)
        );
    }

    #[test]
    fn test_stage3_version_stamp_follows_injected_model() {
        #[derive(Debug)]
        struct RelabeledModel;

        impl RiskModel for RelabeledModel {
            fn compute_stage2(&self, case: &CaseEntity) -> Stage2ModelOutput {
                HashSeededModel.compute_stage2(case)
            }
            fn compute_stage3(&self, case: &CaseEntity) -> Option<Stage3ModelOutput> {
                HashSeededModel.compute_stage3(case)
            }
            fn version(&self) -> &str {
                "field-v2"
            }
        }

        let mut store = CaseStore::with_seed(
            vec![seed_case("GG-000001", "강대상")],
            Box::new(RelabeledModel),
            ReconcilePolicy::default(),
        );
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        store
            .confirm_stage2_model("GG-000001", RiskBucket::Ad, "A-10")
            .unwrap();
        store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();
        fill_stage3_evidence(&mut store, "GG-000001");
        store.run_stage3_model("GG-000001", "A-10").unwrap();

        let case = store.get_case_entity("GG-000001").unwrap();
        assert_eq!(case.tracking_model.model_version.as_deref(), Some("field-v2"));
    }

    #[test]
    fn test_loop_step_rejection_uses_dedicated_event() {
        let mut store = seeded_store();
        fill_stage2_evidence(&mut store, "GG-000001");
        store.run_stage2_model("GG-000001", "A-10").unwrap();
        store
            .confirm_stage2_model("GG-000001", RiskBucket::MciHigh, "A-10")
            .unwrap();
        store
            .set_case_next_step("GG-000001", NextStep::Stage3, "A-10")
            .unwrap();

        let accepted = store.complete_loop_step("GG-000001", 3, "A-10").unwrap();
        assert!(!accepted);

        let newest = &store.list_case_events("GG-000001")[0];
        assert_eq!(newest.event_type, CaseEventType::LoopStepRejected);
        assert_eq!(newest.payload["reason"], "선행 단계 미완료");
    }

    #[test]
    fn test_stage2_pipeline_rejected_for_initial_stage_case() {
        let mut initial = seed_case("GG-000009", "다대상");
        initial.stage = CaseStage::Initial;
        let mut store = CaseStore::with_seed(
            vec![initial],
            Box::new(HashSeededModel),
            ReconcilePolicy::default(),
        );

        let accepted = store
            .update_stage2_evidence(
                "GG-000009",
                Stage2Required {
                    mmse: Some(20),
                    ..Default::default()
                },
                "A-10",
            )
            .unwrap();
        assert!(!accepted);
        assert_eq!(
            store.list_case_events("GG-000009")[0].event_type,
            CaseEventType::EvidenceRejected
        );

        let accepted = store.run_stage2_model("GG-000009", "A-10").unwrap();
        assert!(!accepted);

        let case = store.get_case_entity("GG-000009").unwrap();
        assert!(case.stage2_required.mmse.is_none());
        assert!(case.model2.is_none());
        assert_eq!(
            store.list_case_events("GG-000009")[0].event_type,
            CaseEventType::ModelRunRejected
        );
        assert_eq!(
            store.list_case_events("GG-000009")[0].payload["reason"],
            "초기 접촉 미완료"
        );
    }
}
