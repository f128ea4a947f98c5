pub mod allocator;
pub mod gas;

pub use allocator::{allocate, min_send_threshold, Allocation};
pub use gas::{
    calculate_fee, escalate_gas, FeeError, FixedProbe, GasEstimator, GasProbe, PerKind,
    ScriptProbe, TxKind,
};
