pub mod engine;
pub mod gatherer;
pub mod orchestrator;
pub mod planner;
pub mod result;
pub mod summarizer;
pub mod world_state;
