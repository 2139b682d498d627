//! Justified-multiple valuation and margin of safety.

mod justified;

pub use justified::{
    JustifiedValuationCalculator, ValuationDiagnostic, ValuationField, ValuationOutcome,
    WinsorEvent,
};
