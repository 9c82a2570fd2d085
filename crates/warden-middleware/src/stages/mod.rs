//! Pipeline stages.
//!
//! | Order | Stage                  | State after          |
//! |-------|------------------------|----------------------|
//! | 1     | [`ScopeResolverStage`] | `Resolved`           |
//! | 2     | [`PolicyStage`]        | `Authorized`         |
//! | 3..n  | [`HydrateStage`]       | `Hydrated(i)`        |
//! | n+1   | [`GateStage`]          | unchanged            |

mod gate;
mod hydrate;
mod policy;
mod resolve;

pub use gate::GateStage;
pub use hydrate::HydrateStage;
pub use policy::PolicyStage;
pub use resolve::ScopeResolverStage;
