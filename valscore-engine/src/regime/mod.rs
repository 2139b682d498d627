//! Sector regime parameters (required return r, retention ratio b).

mod provider;

pub use provider::{
    RefreshSummary, RegimeError, RegimeLookup, RegimeOrigin, RegimeParameterProvider,
    RegimeParameters,
};
