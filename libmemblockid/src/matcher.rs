use crate::{
    reader::ProbeBuffer,
    registry::{FormatDescriptor, SignatureRule},
};

/// How strongly a rule matched. Ordered so that the stronger kind compares greater.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RuleMatch {
    /// Magic bytes only, the format declares no further check.
    Magic,
    /// Magic bytes and the format's validator both passed.
    Validated,
}

pub(crate) fn magic_present(rule: &SignatureRule, buffer: &ProbeBuffer<'_>) -> bool {
    match buffer.read_at(rule.b_offset, rule.len()) {
        Ok(bytes) => return bytes == rule.magic,
        Err(_) => return false,
    }
}

/// Test a single rule against the buffer.
///
/// A read that falls outside the buffer is a non-match, never an error.
pub fn match_rule(rule: &SignatureRule, buffer: &ProbeBuffer<'_>) -> Option<RuleMatch> {
    if !magic_present(rule, buffer) {
        return None;
    }

    let Some(validate) = rule.validator else {
        return Some(RuleMatch::Magic);
    };

    match validate(buffer, rule) {
        Ok(()) => return Some(RuleMatch::Validated),
        Err(e) => {
            log::debug!(
                "match_rule - magic {:02x?} at {:#x} rejected: {e}",
                rule.magic,
                rule.b_offset
            );
            return None;
        }
    }
}

/// Whether `rule` matches `buffer`: magic present and, if declared, validator passed.
pub fn matches(rule: &SignatureRule, buffer: &[u8]) -> bool {
    return match_rule(rule, &ProbeBuffer::new(buffer)).is_some();
}

/// First rule of `desc`, in declaration order, that matches the buffer.
pub fn match_format(
    desc: &'static FormatDescriptor,
    buffer: &ProbeBuffer<'_>,
) -> Option<(&'static SignatureRule, RuleMatch)> {
    return desc
        .rules
        .iter()
        .find_map(|rule| match_rule(rule, buffer).map(|kind| (rule, kind)));
}
