use thiserror::Error;

/// One sliding-window budget: at most `count` requests per `period_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub count: u64,
    pub period_secs: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitParseError {
    #[error("invalid rate limit format: {0}")]
    Format(String),
    #[error("unknown time unit: {0}")]
    Unit(String),
}

fn unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "s" | "sec" | "second" => Some(1),
        "m" | "min" | "minute" => Some(60),
        "h" | "hr" | "hour" => Some(3_600),
        "d" | "day" => Some(86_400),
        "mo" | "month" => Some(2_592_000),
        "y" | "year" => Some(31_536_000),
        _ => None,
    }
}

/// Parse a human limit string such as `"10/min, 1000/day"`.
pub fn parse_rate_limit(spec: &str) -> Result<Vec<RateLimit>, RateLimitParseError> {
    let mut limits = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        let Some((count, unit)) = part.split_once('/') else {
            return Err(RateLimitParseError::Format(part.to_string()));
        };
        let count: u64 = count
            .parse()
            .map_err(|_| RateLimitParseError::Format(part.to_string()))?;
        if unit.is_empty() || !unit.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(RateLimitParseError::Format(part.to_string()));
        }
        let period_secs =
            unit_seconds(unit).ok_or_else(|| RateLimitParseError::Unit(unit.to_string()))?;
        limits.push(RateLimit { count, period_secs });
    }
    Ok(limits)
}
