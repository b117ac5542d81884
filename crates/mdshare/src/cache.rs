//! `Cache-Control` for preview responses.

/// Cache header for a preview that expires at `expires_at_ms`.
///
/// Previews never change once rendered, so anything still live is cached as
/// immutable for the whole seconds it has left. An expired preview (or one
/// with less than a second left) must not be cached at all.
///
/// ```rust
/// use mdshare::cache_control;
///
/// assert_eq!(cache_control(0, 3_600_000), "public, max-age=3600, immutable");
/// assert_eq!(cache_control(1000, 1000), "no-cache");
/// ```
pub fn cache_control(now_ms: i64, expires_at_ms: i64) -> String {
    let remaining_secs = expires_at_ms.saturating_sub(now_ms).div_euclid(1000);
    if remaining_secs <= 0 {
        "no-cache".to_string()
    } else {
        format!("public, max-age={remaining_secs}, immutable")
    }
}
