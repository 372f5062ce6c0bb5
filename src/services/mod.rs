/// Chat messages, game history and per-lobby statistics.
pub mod chat_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Player moves and the timers they arm.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Lobby lifecycle: creation, lookup, seats and host actions.
pub mod lobby_service;
/// Debounced write-behind of lobby records.
pub mod persistence;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
