//! Job-scoped key builders.
//!
//! All pipeline artifacts live under `job:<jobId>:<artifact>`.

/// Key for the durable job metadata record.
pub fn meta(job_id: &str) -> String {
    format!("job:{}:meta", job_id)
}

/// Key for the fetched bills blob.
pub fn bills(job_id: &str) -> String {
    format!("job:{}:bills", job_id)
}

/// Key for the fetched news blob.
pub fn news(job_id: &str) -> String {
    format!("job:{}:news", job_id)
}

/// Key for the generated dialogue script.
pub fn script(job_id: &str) -> String {
    format!("job:{}:script", job_id)
}

/// Key for the written digest blob.
pub fn digest(job_id: &str) -> String {
    format!("job:{}:digest", job_id)
}

/// Key for the base64-encoded audio blob.
pub fn audio(job_id: &str) -> String {
    format!("job:{}:audio", job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_shapes() {
        assert_eq!(meta("brief-1-abcd1234"), "job:brief-1-abcd1234:meta");
        assert_eq!(bills("j"), "job:j:bills");
        assert_eq!(news("j"), "job:j:news");
        assert_eq!(script("j"), "job:j:script");
        assert_eq!(digest("j"), "job:j:digest");
        assert_eq!(audio("j"), "job:j:audio");
    }
}
