pub mod cpu;
pub mod estimator;
pub mod monitor;
pub mod probe;
pub mod sampler;
