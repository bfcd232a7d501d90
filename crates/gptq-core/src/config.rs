//! Quantization configuration.

use serde::{Deserialize, Serialize};

use crate::{GptqError, Result};

/// Bit widths the packed format supports.
pub const SUPPORTED_NUM_BITS: [u32; 2] = [4, 8];

/// Group sizes accepted in addition to `size_k` itself.
///
/// `-1` means a single group spanning the whole reduction dimension.
pub const SUPPORTED_GROUP_SIZES: [i32; 4] = [-1, 32, 64, 128];

/// Width of a packed container in bits.
pub const CONTAINER_BITS: u32 = 32;

/// Parameters of a GPTQ quantization call.
///
/// Deserializes from the `quantize_config.json` that GPTQ checkpoints ship,
/// so `bits` and `desc_act` are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantConfig {
    /// Bits per quantized weight.
    #[serde(alias = "bits", default = "default_num_bits")]
    pub num_bits: u32,

    /// Rows per quantization group, or `-1` for one group.
    #[serde(default = "default_group_size")]
    pub group_size: i32,

    /// Permute rows across groups (act_order / desc_act).
    #[serde(alias = "desc_act", default)]
    pub act_order: bool,
}

fn default_num_bits() -> u32 {
    4
}

fn default_group_size() -> i32 {
    128
}

impl Default for QuantConfig {
    fn default() -> Self {
        Self {
            num_bits: default_num_bits(),
            group_size: default_group_size(),
            act_order: false,
        }
    }
}

impl QuantConfig {
    /// Create a config without act_order.
    pub fn new(num_bits: u32, group_size: i32) -> Self {
        Self {
            num_bits,
            group_size,
            act_order: false,
        }
    }

    /// Toggle act_order.
    #[must_use]
    pub fn with_act_order(mut self, act_order: bool) -> Self {
        self.act_order = act_order;
        self
    }

    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check the parts of the config that do not depend on the weight shape.
    ///
    /// A group size that is not in [`SUPPORTED_GROUP_SIZES`] may still be
    /// valid if it equals `size_k`; that is checked by
    /// [`QuantConfig::resolve_group_size`].
    pub fn validate(&self) -> Result<()> {
        check_num_bits(self.num_bits)?;
        if self.group_size == 0 || self.group_size < -1 {
            return Err(GptqError::Config(format!(
                "group_size must be positive or -1, got {}",
                self.group_size
            )));
        }
        Ok(())
    }

    /// Concrete group size for a matrix with `size_k` rows.
    pub fn resolve_group_size(&self, size_k: usize) -> Result<usize> {
        resolve_group_size(self.group_size, size_k)
    }

    /// Codes per 32-bit container.
    pub fn pack_factor(&self) -> Result<usize> {
        pack_factor(self.num_bits)
    }

    /// Largest code, `2^num_bits - 1`.
    pub fn max_q_val(&self) -> u32 {
        max_q_val(self.num_bits)
    }

    /// Code representing zero, `2^(num_bits - 1)`.
    pub fn half_q_val(&self) -> u32 {
        half_q_val(self.num_bits)
    }
}

/// Fail unless `num_bits` is a supported width.
pub fn check_num_bits(num_bits: u32) -> Result<()> {
    if SUPPORTED_NUM_BITS.contains(&num_bits) {
        Ok(())
    } else {
        Err(GptqError::UnsupportedNumBits(num_bits))
    }
}

/// Codes per 32-bit container for `num_bits`.
pub fn pack_factor(num_bits: u32) -> Result<usize> {
    check_num_bits(num_bits)?;
    Ok((CONTAINER_BITS / num_bits) as usize)
}

/// Largest code for `num_bits`.
#[inline]
pub fn max_q_val(num_bits: u32) -> u32 {
    (1u32 << num_bits) - 1
}

/// Symmetric zero code for `num_bits`.
#[inline]
pub fn half_q_val(num_bits: u32) -> u32 {
    (max_q_val(num_bits) + 1) / 2
}

/// Apply the `-1` sugar and check `group_size` against `size_k`.
pub fn resolve_group_size(group_size: i32, size_k: usize) -> Result<usize> {
    let supported =
        SUPPORTED_GROUP_SIZES.contains(&group_size) || usize::try_from(group_size).ok() == Some(size_k);
    if !supported {
        return Err(GptqError::UnsupportedGroupSize { group_size, size_k });
    }

    let resolved = if group_size == -1 {
        size_k
    } else {
        group_size as usize
    };

    if resolved > size_k {
        return Err(GptqError::GroupSizeExceedsRows {
            group_size: resolved,
            size_k,
        });
    }
    if resolved == 0 || size_k % resolved != 0 {
        return Err(GptqError::Misaligned {
            dim: "size_k",
            value: size_k,
            multiple: resolved,
        });
    }
    Ok(resolved)
}
