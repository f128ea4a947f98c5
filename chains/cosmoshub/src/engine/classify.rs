use once_cell::sync::Lazy;
use regex::Regex;

/// ABCI code the SDK returns when a transaction runs out of gas.
pub const OUT_OF_GAS_CODE: u32 = 11;

static OUT_OF_GAS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"(?i)out\s+of\s+gas").ok());

fn mentions_out_of_gas(raw_log: &str) -> bool {
    match OUT_OF_GAS.as_ref() {
        Some(re) => re.is_match(raw_log),
        None => raw_log.to_lowercase().contains("out of gas"),
    }
}

/// How a transaction result should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// The only retryable verdict.
    OutOfGas,
    Failed,
}

/// Maps an ABCI result code and its log to a verdict. Code 11 without an
/// out-of-gas message is treated as a plain failure.
pub fn classify(code: u32, raw_log: &str) -> Verdict {
    match code {
        0 => Verdict::Success,
        OUT_OF_GAS_CODE if mentions_out_of_gas(raw_log) => Verdict::OutOfGas,
        _ => Verdict::Failed,
    }
}
