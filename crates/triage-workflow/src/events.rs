//! 케이스 이벤트 로그
//!
//! 케이스별 추가 전용 이력. 최신 이벤트가 목록 맨 앞에 온다.
//! 감사(audit) 표시와 운영 루프 재생(`ops_loop`)의 원천 데이터로 쓰인다.

use std::collections::HashMap;
use triage_core::{CaseEvent, CaseEventType};

/// 추가 전용 이벤트 로그
#[derive(Debug, Default)]
pub struct EventLog {
    by_case: HashMap<String, Vec<CaseEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            by_case: HashMap::new(),
        }
    }

    /// 이벤트 추가: 최신 우선으로 맨 앞에 삽입한다
    pub fn append(&mut self, event: CaseEvent) {
        tracing::debug!(
            "Appending event {:?} for case {}",
            event.event_type,
            event.case_id
        );
        self.by_case
            .entry(event.case_id.clone())
            .or_default()
            .insert(0, event);
    }

    /// 케이스의 전체 이력 (최신 우선)
    pub fn for_case(&self, case_id: &str) -> &[CaseEvent] {
        self.by_case
            .get(case_id)
            .map(|events| events.as_slice())
            .unwrap_or(&[])
    }

    /// 해당 유형 이벤트 존재 여부
    pub fn has_event(&self, case_id: &str, event_type: CaseEventType) -> bool {
        self.for_case(case_id)
            .iter()
            .any(|event| event.event_type == event_type)
    }

    /// 전체 이벤트 수
    pub fn total_events(&self) -> usize {
        self.by_case.values().map(|events| events.len()).sum()
    }
}
