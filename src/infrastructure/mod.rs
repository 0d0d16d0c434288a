pub mod observability;
pub mod persistence;
pub mod solver;

pub use persistence::memory_proposal_store::MemoryProposalStore;
pub use persistence::memory_store::MemoryStore;
