mod simulated;

pub use simulated::SimulatedSource;
