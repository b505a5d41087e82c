//! 케이스 생애주기 엔진 데모
//!
//! 시드 케이스를 만들고 2단계 근거 입력 → 모델 실행 → 분류 확정 → 3단계 편입 →
//! 운영 루프 진행 → 대시보드 집계까지 핵심 흐름을 보여준다.

use chrono::Utc;
use triage_core::{
    AssigneeInfo, CaseEntity, CaseStage, CaseStatus, GuardianInfo, LegacyRiskTier, NeuroTestType,
    NextStep, PatientInfo, PriorDiagnosis, RegionInfo, RiskBucket, RouteChannel, Stage2Required,
    Stage3Required, TestPolarity,
};
use triage_model::HashSeededModel;
use triage_workflow::{
    classify_pretriage, derive_stage3_view, CaseFilter, CaseStore, ContactOutcome,
    PretriageInput, ReconcilePolicy,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로그 초기화
    tracing_subscriber::fmt::init();

    println!("🚀 트리아지 케이스 생애주기 엔진 데모\n");

    // 1. 시드 케이스로 저장소 초기화
    let seed = create_seed_cases();
    let mut store = CaseStore::with_seed(
        seed,
        Box::new(HashSeededModel),
        ReconcilePolicy::default(),
    );
    println!("✅ 저장소 초기화: 케이스 {}건", store.overview().total_cases);

    // 2. 1단계 사전 분류와 접촉 결과
    let case1 = store.get_case_entity("GN-000001").unwrap();
    let decision = classify_pretriage(&PretriageInput::from_patient(&case1.patient));
    println!(
        "📞 GN-000001 사전 분류: 전략 {:?}, 트리거 {:?}",
        decision.strategy,
        decision
            .triggers
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
    );
    store.record_contact_outcome("GN-000001", ContactOutcome::NoResponse, "A-01")?;
    store.record_contact_outcome("GN-000001", ContactOutcome::NoResponse, "A-01")?;
    let case1 = store.get_case_entity("GN-000001").unwrap();
    println!(
        "   무응답 2회 후 채널: {:?} (하이브리드 전환 {})",
        case1.contact_plan.channel, case1.contact_plan.switched_to_hybrid
    );

    // 3. 2단계 근거 입력 후 모델 실행
    store.update_stage2_evidence(
        "GN-000002",
        Stage2Required {
            specialist_exam_done: Some(true),
            cdr_gds: Some(1.5),
            neuro_test_type: Some(NeuroTestType::Snsb),
            mmse: Some(20),
        },
        "A-01",
    )?;
    let accepted = store.run_stage2_model("GN-000002", "A-01")?;
    let case2 = store.get_case_entity("GN-000002").unwrap();
    let model2 = case2.model2.as_ref().unwrap();
    println!(
        "🧠 GN-000002 모델 실행({}): 예측 {} / 확률 N {:.2} M {:.2} A {:.2}",
        accepted,
        model2.predicted.label(),
        model2.prob_normal,
        model2.prob_mci,
        model2.prob_ad
    );

    // 4. 분류 확정과 3단계 편입
    store.confirm_stage2_model("GN-000002", RiskBucket::MciHigh, "A-01")?;
    store.set_case_next_step("GN-000002", NextStep::Stage3, "A-01")?;
    println!(
        "📋 GN-000002 편입: 단계 {:?}, 상태 {:?}",
        store.get_case_entity("GN-000002").unwrap().stage,
        store.get_case_entity("GN-000002").unwrap().status
    );

    // 5. 3단계 근거/모델과 뷰 도출
    store.update_stage3_evidence(
        "GN-000002",
        Stage3Required {
            biomarker_done: Some(true),
            biomarker_result: Some(TestPolarity::Positive),
            imaging_done: Some(true),
            imaging_result: Some(TestPolarity::Negative),
            examined_at: Some(Utc::now()),
        },
        "A-01",
    )?;
    store.run_stage3_model("GN-000002", "A-01")?;
    let view = derive_stage3_view(
        store.get_case_entity("GN-000002").unwrap(),
        &ReconcilePolicy::default(),
    );
    println!("🗂  GN-000002 운영 루프:");
    for card in &view.step_cards {
        println!("   STEP{} {}: {:?}", card.step, card.label, card.state);
    }
    println!("   위험 배지: {:?}", view.risk_badge);

    // 6. 이벤트 이력과 대시보드 집계
    println!(
        "🧾 GN-000002 이벤트 {}건 (최신: {:?})",
        store.list_case_events("GN-000002").len(),
        store.list_case_events("GN-000002")[0].event_type
    );
    let stats = store.dashboard_stats(&CaseFilter::default());
    println!(
        "📊 집계: 접촉 필요 {} / 2단계 대기 {} / 고위험 MCI {}",
        stats.contact_needed, stats.stage2_waiting, stats.high_risk_mci
    );
    for stage in &stats.funnel {
        println!(
            "   {} 진입 {} (진입률 {:.0}%)",
            stage.name,
            stage.entered,
            stage.rate * 100.0
        );
    }

    println!("\n✨ 데모 완료 (저장소 버전 {})", store.version());
    Ok(())
}

/// 데모용 시드 케이스
fn create_seed_cases() -> Vec<CaseEntity> {
    let mut first = CaseEntity::new_registered(
        "GN-000001",
        PatientInfo {
            name: "김순례".to_string(),
            age: 83,
            phone: "010-1111-0001".to_string(),
            guardian: Some(GuardianInfo {
                name: "김보호".to_string(),
                phone: "010-1111-0002".to_string(),
                is_primary_contact: true,
            }),
            prior_diagnosis: PriorDiagnosis::None,
            complaint_history: false,
            refusal_history: false,
            comprehension_difficulty: false,
        },
        RegionInfo {
            sido: "서울".to_string(),
            sigungu: "강남구".to_string(),
        },
        AssigneeInfo {
            assignee_id: "A-01".to_string(),
            assignee_name: "이담당".to_string(),
        },
        LegacyRiskTier::Mid,
        RouteChannel::Center,
    );
    first.status = CaseStatus::Open;

    let mut second = CaseEntity::new_registered(
        "GN-000002",
        PatientInfo {
            name: "박종수".to_string(),
            age: 77,
            phone: "010-2222-0001".to_string(),
            guardian: None,
            prior_diagnosis: PriorDiagnosis::Mci,
            complaint_history: false,
            refusal_history: false,
            comprehension_difficulty: false,
        },
        RegionInfo {
            sido: "서울".to_string(),
            sigungu: "강남구".to_string(),
        },
        AssigneeInfo {
            assignee_id: "A-01".to_string(),
            assignee_name: "이담당".to_string(),
        },
        LegacyRiskTier::High,
        RouteChannel::Hospital,
    );
    second.stage = CaseStage::Evaluation;

    vec![first, second]
}
