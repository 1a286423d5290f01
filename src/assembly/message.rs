use serde::{Deserialize, Serialize};

use crate::assembly::section::SectionBlock;

/// Message role as understood by the generative backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged text block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// The stable, reusable leading portion of a message sequence.
///
/// Immutable once built. Blocks keep their section provenance so ordering
/// can be asserted structurally and diagnostics can report what rendered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagePrefix {
    blocks: Vec<SectionBlock>,
}

impl MessagePrefix {
    pub fn new(blocks: Vec<SectionBlock>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &[SectionBlock] {
        &self.blocks
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Render the prefix as backend messages, one per block, role derived
    /// from the block's section.
    pub fn messages(&self) -> Vec<Message> {
        self.blocks
            .iter()
            .map(|block| Message {
                role: block.section.role(),
                content: block.text.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::section::Section;

    #[test]
    fn test_messages_preserve_block_order() {
        let prefix = MessagePrefix::new(vec![
            SectionBlock::new(Section::Foundation, "world"),
            SectionBlock::new(Section::Pacing, "slow down"),
        ]);
        let messages = prefix.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "world");
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[1].content, "slow down");
    }
}
