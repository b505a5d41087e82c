//! 공용 유틸리티 함수

/// 케이스 ID 생성
///
/// 지역 코드 접두어와 일련번호로 구성한다. 예: `GN-000017`
pub fn generate_case_id(region_code: &str, seq: u32) -> String {
    format!("{}-{:06}", region_code.to_uppercase(), seq)
}

/// 케이스 ID 형식 검증
pub fn is_valid_case_id(case_id: &str) -> bool {
    match case_id.split_once('-') {
        Some((prefix, seq)) => {
            !prefix.is_empty()
                && prefix.chars().all(|c| c.is_ascii_uppercase())
                && seq.len() == 6
                && seq.chars().all(|c| c.is_ascii_digit())
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_case_id() {
        let id = generate_case_id("gn", 17);
        assert_eq!(id, "GN-000017");
        assert!(is_valid_case_id(&id));
    }

    #[test]
    fn test_is_valid_case_id() {
        assert!(is_valid_case_id("SEL-000001"));
        assert!(!is_valid_case_id(""));
        assert!(!is_valid_case_id("SEL000001"));
        assert!(!is_valid_case_id("sel-000001"));
        assert!(!is_valid_case_id("SEL-01"));
    }
}
