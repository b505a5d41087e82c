//! # Triage Core
//!
//! 트리아지 시스템의 핵심 모듈로, 기본 데이터 구조, 오류 정의, 공용 유틸리티를 제공한다.

pub mod error;
pub mod models;
pub mod utils;

pub use error::{Result, TriageError};
pub use models::*;
