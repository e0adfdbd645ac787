pub mod executor;
pub mod factory;
pub mod stream;

pub use executor::ExecutorRegistry;
pub use factory::ExecutorChoice;
pub use stream::{JsonlObserver, LineSink, TextObserver};
