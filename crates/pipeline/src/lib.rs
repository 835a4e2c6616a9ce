//! The context assembly pipeline.
//!
//! Seven stages run once per request:
//!
//! | Stage | Work |
//! |-------|------|
//! | 1. Classify | Load the archetype contract and budget profile, classify pre-supplied sources |
//! | 2. Scope | Domain, entity, jurisdiction, classification, role, and temporal filters |
//! | 3. Retrieve | Entity data, KB chunks, cross-agent output, and RAG search, concurrently |
//! | 4. Rank | Stable sort of every slot's items by authority tier |
//! | 5. Budget | Measure each slot, trim on overflow |
//! | 6. Assemble | Finalise the slot mapping |
//! | 7. Tag | Collect every valid provenance tag |
//!
//! Every adapter call sits behind a timeout and a per-call-site
//! [`CircuitBreaker`]; a failing adapter empties its slot instead of
//! failing the run.

pub mod assembler;
pub mod breaker;
pub mod budget;
pub mod rag;
pub mod scoper;
pub mod token;
pub mod trace;

pub use assembler::{AssembledContext, AssemblyMetadata, BudgetSummary, ContextAssembler, ContextRequest, UserContext};
pub use breaker::{BreakerRegistry, BreakerSettings, BreakerState, BreakerStats, CircuitBreaker, CircuitBreakerState};
pub use budget::{BudgetCheck, BudgetReport, SlotUsage, TrimOutcome, allocate_budget, budget_limits, check_budget, trim_to_budget};
pub use rag::RagPipeline;
pub use scoper::{ScopingConfig, apply_all_scopes};
pub use token::{HeuristicCounter, TokenCounter, WhitespaceCounter, estimate_tokens, truncate_to_tokens};
pub use trace::{Stage, StageEvent, StageTrace};
