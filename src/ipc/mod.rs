//! IPC module for daemon-UI communication

mod protocol;
mod server;

pub use protocol::{DaemonStatus, Notification, Request, Response, MAX_MESSAGE_LEN};
pub use server::{read_message, send_message, Server};
