pub mod chapter;
pub mod character;
pub mod scene;
pub mod story;

pub use chapter::Chapter;
pub use character::{Character, Gender};
pub use scene::{ChronicleEntry, ContradictionWarning, InteractionTurn, SceneUnit, Speaker};
pub use story::Story;
