pub mod config;
pub mod decision_chain;
pub mod error;
pub mod identity;
pub mod models;
pub mod providers;
pub mod store;
pub mod upstream;

pub use config::LaminoConfig;
pub use decision_chain::{build_decision_chain, DecisionStep, RoutingTrace, StepKind};
pub use error::{LaminoError, StoreError};
pub use identity::{IdentityClient, IdentityError};
pub use providers::{Provider, ProviderRegistry};
pub use store::{FileStore, InMemoryFileStore, InMemoryWorkspaceStore, WorkspaceStore};
pub use upstream::{ChatUpstream, OpenAiCompatibleClient, UpstreamError};
