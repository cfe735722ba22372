//! Join-key value canonicalization, applied identically to the master
//! dataset side and the extracted-record side so comparison is symmetric.

use std::collections::BTreeMap;

use common::model::config::{JoinNormalize, ZfillSpec};

/// The resolved normalization policy for one mapping run.
///
/// Persisted configs carry `zfill` as either a single width or a per-key
/// map; after template/default layering both can be in play at once, so the
/// effective policy keeps them side by side. A key's width comes from the
/// per-key map first, then the global width.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct JoinKeyPolicy {
    pub strip_non_digits: bool,
    pub zfill_global: Option<u32>,
    pub zfill_per_key: BTreeMap<String, u32>,
}

impl JoinKeyPolicy {
    pub fn from_normalize(normalize: &JoinNormalize) -> Self {
        let mut policy = JoinKeyPolicy {
            strip_non_digits: normalize.strip_non_digits,
            ..JoinKeyPolicy::default()
        };
        match &normalize.zfill {
            Some(ZfillSpec::Global(width)) => policy.zfill_global = Some(*width),
            Some(ZfillSpec::PerKey(widths)) => policy.zfill_per_key = widths.clone(),
            None => {}
        }
        policy
    }

    pub fn zfill_for(&self, key_name: &str) -> Option<u32> {
        self.zfill_per_key
            .get(key_name)
            .copied()
            .or(self.zfill_global)
    }
}

/// Canonicalize one join-key value.
///
/// In strip mode the value collapses to its digits with leading zeros
/// removed, so `"AC-0123"` and `"123"` compare equal; a configured zfill
/// then re-pads both sides to the same fixed width. Empty input stays
/// empty: a blank key is never padded into something that could match a
/// real master key.
pub fn normalize(value: &str, key_name: &str, policy: &JoinKeyPolicy) -> String {
    let base: String = if policy.strip_non_digits {
        let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() && !digits.is_empty() {
            // All zeros is still a value, not a blank key.
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        value.to_string()
    };

    if base.is_empty() {
        return base;
    }

    if let Some(width) = policy.zfill_for(key_name) {
        let width = width as usize;
        let len = base.chars().count();
        if len < width {
            let mut padded = "0".repeat(width - len);
            padded.push_str(&base);
            return padded;
        }
    }

    base
}
