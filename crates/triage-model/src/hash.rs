//! 문자열 시드 기반 결정적 의사난수

use sha2::{Digest, Sha256};

/// 시드 문자열을 [0, 1) 구간 값으로 변환
///
/// SHA-256 다이제스트의 앞 8바이트를 u64로 읽어 2^64로 나눈다.
/// 동일 입력에 대해 항상 동일 출력이며, 시계/난수 상태를 쓰지 않는다.
pub fn hash01(seed: &str) -> f64 {
    let digest = Sha256::digest(seed.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    let value = u64::from_be_bytes(bytes);
    value as f64 / (u64::MAX as f64 + 1.0)
}
