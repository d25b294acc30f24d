use regex::Regex;

/// Token the model is instructed to reply with when it cannot produce code.
/// A reply consisting of exactly this token aborts the request.
pub const FAILURE_SENTINEL: &str = "NO_CODE";

pub fn is_refusal(response: &str) -> bool {
    response.trim() == FAILURE_SENTINEL
}

/// Pulls the code payload out of a raw model reply.
///
/// Looks for the first span between an opening fence (three backticks, an
/// optional language tag such as `python`, `c++` or `c#`, then a newline)
/// and a closing fence, shortest match. Without a fence the whole reply is
/// the payload. The payload is split on newlines, empty lines preserved.
pub fn extract_code(response: &str) -> Vec<String> {
    let fence = Regex::new(r"(?s)```(?:[A-Za-z][A-Za-z0-9_+#-]*)?\n(.*?)\n```").unwrap();

    let payload = match fence.captures(response) {
        Some(captures) => captures.get(1).map(|m| m.as_str()).unwrap_or(""),
        None => response,
    };

    payload.split('\n').map(|line| line.to_string()).collect()
}
