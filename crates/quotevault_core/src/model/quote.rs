//! Quote value type shared by source and mirror models.

use crate::parser::BlockId;

/// One quotation: stripped multi-line text plus its stable id, if bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub text: String,
    pub block_id: Option<BlockId>,
}

impl Quote {
    pub fn new(text: impl Into<String>, block_id: Option<BlockId>) -> Self {
        Self {
            text: text.into(),
            block_id,
        }
    }

    /// Returns whether text or identity differ from `other`.
    pub fn differs_from(&self, other: &Quote) -> bool {
        self.text != other.text || self.block_id != other.block_id
    }
}
