// src/analyze/mod.rs
// Candidate selection: pure reducers plus the ranking oracle.

pub mod oracle;
pub mod select;

pub use oracle::{build_oracle, DynOracle, OracleSelection, RankingOracle};
pub use select::{capped_ranked_merge, most_recent, oracle_pick, pick_random};
