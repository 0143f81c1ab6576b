/// 获取当前 UTC 时间戳（毫秒）
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a Snowflake-style i64 for use as resource ID.
///
/// Layout (53 bits, fits in JavaScript's Number.MAX_SAFE_INTEGER):
///   - 41 bits: milliseconds since 2024-01-01 UTC (~69 years)
///   - 12 bits: random (4096 values per ms, collision-free at POS scale)
///
/// Used for order, order-detail, payment and attendance IDs so that
/// every device in the store mints IDs without coordination.
pub fn snowflake_id() -> i64 {
    use rand::Rng;
    // Custom epoch: 2024-01-01 00:00:00 UTC
    const EPOCH_MS: i64 = 1_704_067_200_000;
    let now = now_millis();
    let ts = (now - EPOCH_MS) & 0x1FF_FFFF_FFFF; // 41 bits
    let rand_bits: i64 = rand::thread_rng().gen_range(0..0x1000); // 12 bits
    (ts << 12) | rand_bits
}

/// Generate an unguessable order token for customer-facing URLs.
///
/// UUID v4 — 122 bits of randomness, safe to print on a QR slip.
pub fn order_token() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snowflake_ids_are_positive_and_distinct() {
        let ids: std::collections::HashSet<i64> = (0..64).map(|_| snowflake_id()).collect();
        assert!(ids.iter().all(|id| *id > 0));
        // 12 random bits per millisecond; 64 draws collapsing to one
        // value would mean the RNG is broken.
        assert!(ids.len() > 1);
    }

    #[test]
    fn order_tokens_are_unique() {
        assert_ne!(order_token(), order_token());
    }
}
