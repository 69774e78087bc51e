pub mod composer;
pub mod describer;
pub mod pipeline;
pub mod session;
pub mod suggestions;
pub mod synthesizer;
pub mod types;

pub use pipeline::{Stylist, StylistError};
pub use session::{SessionState, SessionStore};
pub use types::{GeneratedImage, ItemType, OutfitImages};
