pub mod bin;
pub mod operation;
pub mod plan;
pub mod position;
pub mod token;

// Re-export for easier access
pub use bin::{ActiveBinSnapshot, BinId, MAX_BIN_ID};
pub use operation::OperationRecord;
pub use plan::{PlannedBin, PositionPlan};
pub use position::{Position, PositionId};
pub use token::Token;
