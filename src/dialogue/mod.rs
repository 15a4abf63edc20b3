//! Dialogue System Module
//!
//! Dialogue content is authored per quest in pack files. The branch resolver
//! filters a node's lines by audience, and the session multiplexer plays the
//! result on presentational surfaces.

pub mod branch;
pub mod multiplexer;
pub mod node;
pub mod pack;
pub mod session;
pub mod surface;

pub use branch::{AllyPredicate, BranchLines, ResolvedLine, Sequence, resolve_lines, should_output};
pub use multiplexer::SessionMultiplexer;
pub use node::{Audience, DialogueNode, LineElement, PlayedFlags};
pub use pack::{DialoguePack, NodeSource, PackRegistry};
pub use session::{CloseReason, CompletionCallback, DialogueSession, LineSource, SessionOutcome};
pub use surface::{DialogueLine, DialogueSurface, SpeakerDefaults};
