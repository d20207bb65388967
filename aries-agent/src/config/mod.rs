mod agent;
pub use agent::AgentOptions;

mod mediator;
pub use mediator::MediatorOptions;

mod events;
pub use events::EventsOptions;

mod config;
pub use config::Config;

mod parser;
pub use parser::Parser;
