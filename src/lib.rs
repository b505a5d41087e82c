//! 트리아지 워크스페이스 파사드
//!
//! 데모와 외부 소비자가 단일 의존성으로 쓰도록 구성 크레이트를 재수출한다.

pub use triage_core;
pub use triage_model;
pub use triage_workflow;
