//! 근거 평가기
//!
//! 단계별 필수 검사 입력의 완결성과 누락 목록을 계산한다.
//! 순수 함수이며 매 재계산 호출마다 새로 평가한다: 결과를 캐시하지 않는다.

use triage_core::{EvidenceState, RouteChannel, Stage2Required, Stage3Required};

/// 2단계 근거 평가
///
/// 누락 목록은 고정 순서로 적재한다. MMSE는 병원 경로에서만 필수다.
pub fn evaluate_stage2(required: &Stage2Required, route: RouteChannel) -> EvidenceState {
    let mut missing = Vec::new();

    if required.specialist_exam_done != Some(true) {
        missing.push("전문의 진찰 미실시".to_string());
    }
    if required.cdr_gds.is_none() {
        missing.push("CDR/GDS 미입력".to_string());
    }
    if required.neuro_test_type.is_none() {
        missing.push("신경심리검사 종류 미입력".to_string());
    }
    if route == RouteChannel::Hospital && required.mmse.is_none() {
        missing.push("MMSE 미입력".to_string());
    }

    EvidenceState {
        completed: missing.is_empty(),
        missing,
    }
}

/// 3단계 근거 평가
///
/// 결과 미입력 항목은 해당 검사가 실시된 경우에만 누락으로 본다.
pub fn evaluate_stage3(required: &Stage3Required) -> EvidenceState {
    let mut missing = Vec::new();

    if required.biomarker_done != Some(true) {
        missing.push("바이오마커 검사 미실시".to_string());
    } else if required.biomarker_result.is_none() {
        missing.push("바이오마커 결과 미입력".to_string());
    }
    if required.imaging_done != Some(true) {
        missing.push("뇌영상 검사 미실시".to_string());
    } else if required.imaging_result.is_none() {
        missing.push("뇌영상 결과 미입력".to_string());
    }
    if required.examined_at.is_none() {
        missing.push("검사일 미입력".to_string());
    }

    EvidenceState {
        completed: missing.is_empty(),
        missing,
    }
}
