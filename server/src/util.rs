use std::time::{Duration, SystemTime, UNIX_EPOCH};

// Current wall-clock time in milliseconds, for chat timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

// Deterministic starter color per session id.
pub fn default_color(session_id: u32) -> String {
    const PALETTE: [&str; 8] = [
        "#3B82F6", "#EF4444", "#22C55E", "#A855F7", "#F97316", "#06B6D4", "#EC4899", "#EAB308",
    ];
    PALETTE[session_id as usize % PALETTE.len()].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_are_valid_hex() {
        for id in 0..20 {
            assert!(shared::valid_color(&default_color(id)));
        }
    }
}
