//! Human-readable size strings, as taken by `--memory-limit` and `--stack-size`.

use qjs_rs_errors::{qjs_error, Result};

/// The binary shift a size suffix applies, or `None` for an unknown suffix.
fn suffix_shift(suffix: char) -> Option<u32> {
    match suffix {
        'K' | 'k' => Some(10),
        'M' => Some(20),
        'G' => Some(30),
        _ => None,
    }
}

/// Parse a size such as `512K`, `2M`, `1G` or `1.5k` into a byte count.
///
/// A fractional part is applied to the multiplier and then truncated. Anything
/// after the optional suffix is an error, as is a result that does not fit in a
/// `usize`.
pub fn parse_size(s: &str) -> Result<usize> {
    let int_end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    let (int_digits, rest) = s.split_at(int_end);

    let (frac_digits, rest) = match rest.strip_prefix('.') {
        Some(after_dot) => {
            let frac_end = after_dot
                .char_indices()
                .find(|(_, c)| !c.is_ascii_digit())
                .map_or(after_dot.len(), |(i, _)| i);
            after_dot.split_at(frac_end)
        }
        None => ("", rest),
    };

    let mut chars = rest.chars();
    let shift = match chars.next() {
        None => 0,
        Some(c) => match suffix_shift(c) {
            Some(shift) if chars.as_str().is_empty() => shift,
            _ => return Err(qjs_error!("invalid suffix: {}", rest)),
        },
    };

    let too_large = || qjs_error!("size too large: {}", s);

    let whole = if int_digits.is_empty() {
        0
    } else {
        int_digits.parse::<usize>().map_err(|_| too_large())?
    };

    let whole = whole
        .checked_mul(1usize << shift)
        .ok_or_else(too_large)?;

    let fraction = if frac_digits.is_empty() {
        0
    } else {
        let frac = format!("0.{frac_digits}").parse::<f64>().unwrap_or(0.0);
        (frac * (1u64 << shift) as f64) as usize
    };

    whole.checked_add(fraction).ok_or_else(too_large)
}
