pub mod config;
pub mod error;
pub mod mutants;
pub mod operators;
pub mod oracle;
pub mod output;
pub mod parser;
pub mod prompts;
pub mod report;
pub mod resolve;
pub mod results;
pub mod runner;
pub mod safety;
pub mod splice;
pub mod state;
pub mod tree;
pub mod workflow;
