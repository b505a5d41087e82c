//! 오류 정의 모듈

use thiserror::Error;

/// 트리아지 시스템 통합 오류 타입
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("유효성 오류: {0}")]
    Validation(String),

    #[error("직렬화 오류: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("워크플로 오류: {0}")]
    Workflow(String),

    #[error("대상자 없음: {0}")]
    NotFound(String),

    #[error("잘못된 상태 전이: {from} 상태에서 {event} 불가")]
    InvalidStateTransition { from: String, event: String },

    #[error("시스템 내부 오류: {0}")]
    Internal(String),
}

/// 트리아지 시스템 통합 결과 타입
pub type Result<T> = std::result::Result<T, TriageError>;
