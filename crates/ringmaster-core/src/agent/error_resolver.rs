use super::command::ErrorCode;

/// Map a raw provider/tool error message onto the normalized taxonomy by
/// substring inspection.
pub fn classify_error(raw: &str) -> ErrorCode {
    let lower = raw.to_lowercase();
    if lower.contains("rate limit") || lower.contains("rate_limit") || lower.contains("429") {
        ErrorCode::RateLimited
    } else if lower.contains("timeout") || lower.contains("timed out") {
        ErrorCode::Timeout
    } else if lower.contains("context length")
        || lower.contains("context_length")
        || lower.contains("maximum context")
    {
        ErrorCode::ContextTooLong
    } else if lower.contains("tool") {
        ErrorCode::ToolError
    } else {
        ErrorCode::Unknown
    }
}

/// Produces the user-facing `error_message` for a failure.
///
/// Gateways may install their own resolver (localization, support links);
/// the default maps each code to a stable phrase and appends the raw detail.
pub trait ErrorMessageResolver: Send + Sync {
    fn resolve(&self, code: ErrorCode, raw: &str) -> String;
}

/// Default resolver with stable English phrases.
pub struct DefaultErrorMessageResolver;

impl ErrorMessageResolver for DefaultErrorMessageResolver {
    fn resolve(&self, code: ErrorCode, raw: &str) -> String {
        let phrase = match code {
            ErrorCode::GuardRejected => "Request rejected by policy",
            ErrorCode::RateLimited => "Too many requests, please slow down",
            ErrorCode::Timeout => "The request timed out",
            ErrorCode::ContextTooLong => "The conversation is too long for the model",
            ErrorCode::ToolError => "A tool call failed",
            ErrorCode::PendingApproval => "The request is awaiting approval",
            ErrorCode::Unknown => "Something went wrong",
        };
        if raw.is_empty() {
            phrase.to_string()
        } else {
            format!("{phrase}: {raw}")
        }
    }
}
