//! External interfaces: HTTP server, provider clients, push relay, task broker

pub mod aftership;
pub mod http;
pub mod push;
pub mod seventeen_track;
pub mod task_queue;
