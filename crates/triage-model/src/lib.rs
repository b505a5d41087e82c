//! # 합성 위험 모델 모듈
//!
//! 실제 ML 서비스가 도입되기 전까지의 대역(stand-in)으로, 케이스 ID 시드 기반의
//! 결정적 합성 산출물을 생성한다. 저장소는 `RiskModel` 트레이트와 산출물 형태에만
//! 의존하므로, 실제 모델 호출로 교체할 때 상태 엔진을 건드릴 필요가 없다.

pub mod hash;
mod stage2;
mod stage3;

use triage_core::{CaseEntity, Stage2ModelOutput, Stage3ModelOutput};

pub use hash::hash01;
pub use stage2::compute_stage2_output;
pub use stage3::compute_stage3_output;

/// 위험 모델 호출 경계
///
/// 이 트레이트가 모델 교체의 유일한 경계다. 구현체 내부 공식에 의존하는
/// 코드를 두지 않는다.
pub trait RiskModel: std::fmt::Debug + Send {
    /// 2단계 분류 산출물 계산
    fn compute_stage2(&self, case: &CaseEntity) -> Stage2ModelOutput;

    /// 3단계 위험 산출물 계산: 편입 프로파일이 없으면 None
    fn compute_stage3(&self, case: &CaseEntity) -> Option<Stage3ModelOutput>;

    /// 산출물에 기록할 모델 버전 식별자
    fn version(&self) -> &str;
}

/// 해시 시드 기반 합성 모델 (기본 구현)
#[derive(Debug, Default)]
pub struct HashSeededModel;

impl RiskModel for HashSeededModel {
    fn compute_stage2(&self, case: &CaseEntity) -> Stage2ModelOutput {
        stage2::compute_stage2_output(case)
    }

    fn compute_stage3(&self, case: &CaseEntity) -> Option<Stage3ModelOutput> {
        stage3::compute_stage3_output(case)
    }

    fn version(&self) -> &str {
        stage2::MODEL_VERSION
    }
}
