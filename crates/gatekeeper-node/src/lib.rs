pub mod startup;

pub use startup::{expand_tilde, init_tracing, load_runtime_config};
