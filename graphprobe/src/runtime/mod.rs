mod executor;
mod facade;
mod storage;

pub use executor::GraphRuntime;
pub use facade::ExecutorFacade;
