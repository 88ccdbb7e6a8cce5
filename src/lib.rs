// Library root: the bot's internals, shared by the binary and integration tests.
// The binary entry point is src/main.rs.

pub mod analytics;
pub mod config;
pub mod consult;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod logger;
pub mod privacy;
pub mod rate_limit;
pub mod storage;
pub mod subsystems;
pub mod supervisor;
