mod registry;

pub use registry::ExecutorRegistry;
