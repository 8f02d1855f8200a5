// Integration test suite for LunaSentri
//
// Organized into focused modules by feature area.
// HTTP-level tests drive the REST surface through a local Rocket client;
// white-box tests drive pub library functions (evaluator, heartbeat sweep,
// dispatch preconditions) against a throwaway store.

mod common;

mod agent_ingest;
mod auth;
mod cascade;
mod notifications;
mod stream_order;
mod users;
