use parley_core::{MessageRole, ThreadStatus};

pub mod memory;
pub mod thread;

pub use memory::InMemoryThreadStore;
pub use thread::SqlThreadStore;

pub(crate) fn status_as_str(status: ThreadStatus) -> &'static str {
    match status {
        ThreadStatus::Active => "active",
        ThreadStatus::Paused => "paused",
        ThreadStatus::Completed => "completed",
    }
}

pub(crate) fn parse_status(value: &str) -> Option<ThreadStatus> {
    match value {
        "active" => Some(ThreadStatus::Active),
        "paused" => Some(ThreadStatus::Paused),
        "completed" => Some(ThreadStatus::Completed),
        _ => None,
    }
}

pub(crate) fn role_as_str(role: MessageRole) -> &'static str {
    match role {
        MessageRole::Buyer => "buyer",
        MessageRole::Supplier => "supplier",
    }
}

pub(crate) fn parse_role(value: &str) -> Option<MessageRole> {
    match value {
        "buyer" => Some(MessageRole::Buyer),
        "supplier" => Some(MessageRole::Supplier),
        _ => None,
    }
}
