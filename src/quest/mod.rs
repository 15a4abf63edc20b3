//! Quest System Module
//!
//! Multi-step quests loaded from TOML. Each step is an AND-group of
//! requirements fed by domain events; the dispatcher fans events out to
//! every active quest and queues lifecycle notifications.

pub mod definition;
pub mod dispatcher;
pub mod events;
pub mod registry;
pub mod state;

pub use definition::{
    QuestDefinition, RequirementDefinition, RewardBundle, StepCondition, StepDefinition,
};
pub use dispatcher::QuestDispatcher;
pub use events::{DIALOGUE_COMPLETED, DomainEvent, QuestNotification, RewardHook};
pub use registry::QuestRegistry;
pub use state::{QuestInstance, QuestSnapshot, RequirementProgress};
